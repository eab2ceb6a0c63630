//! Data packets carried by flood routing and their priority byte.
//!
//! Each table slot pairs a packet with a priority:
//! - `0xFF`: free, may be overwritten
//! - even: ready to send, lower is more urgent (`0x00` is fresh)
//! - odd: aging, not sent until the policy makes it even again

use std::fmt;

/// Priority of a free slot.
pub const FREE: u8 = 0xFF;

/// Priority of a packet nobody has sent yet.
pub const FRESH: u8 = 0x00;

pub fn is_free(priority: u8) -> bool {
    priority == FREE
}

/// Even priorities are eligible for the next message.
pub fn is_ready(priority: u8) -> bool {
    priority & 0x01 == 0
}

/// User-defined payload routed by a flood-routing protocol.
///
/// `Default` builds the content of an empty slot.
pub trait DataPacket: Clone + Default + fmt::Debug + 'static {
    /// Whether both packets carry the same datum (same origin and
    /// sequence number, for example), regardless of other content.
    fn same_identity(&self, other: &Self) -> bool;

    /// Copy this packet's content into an existing slot.
    fn copy_to(&self, target: &mut Self) {
        target.clone_from(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Reading {
        origin: u16,
        seq: u16,
        value: i32,
    }

    impl DataPacket for Reading {
        fn same_identity(&self, other: &Self) -> bool {
            self.origin == other.origin && self.seq == other.seq
        }
    }

    #[test]
    fn priority_classes() {
        assert!(is_free(FREE));
        assert!(!is_ready(FREE));
        assert!(is_ready(FRESH));
        assert!(is_ready(0x10));
        assert!(!is_ready(0x11));
    }

    #[test]
    fn copied_packet_has_same_identity() {
        let reading = Reading { origin: 3, seq: 9, value: -4 };
        let mut slot = Reading::default();
        assert!(!slot.same_identity(&reading));
        reading.copy_to(&mut slot);
        assert!(slot.same_identity(&reading));
        assert_eq!(slot, reading);
    }
}
