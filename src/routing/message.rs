//! Radio message produced by a routing table.

use std::any::Any;
use std::fmt;

use super::packet::DataPacket;
use super::policy::Location;

/// Name a routing protocol is registered and addressed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProtocolTag(pub &'static str);

impl fmt::Display for ProtocolTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Packets of one protocol, best first, plus the sender's location.
///
/// The packet type is erased so the engine can demultiplex on the tag
/// before knowing which table, and so which packet type, is addressed.
pub struct RoutingMessage {
    protocol: ProtocolTag,
    location: Location,
    packets: Box<dyn Any>,
    len: usize,
}

impl RoutingMessage {
    pub fn new<P: DataPacket>(protocol: ProtocolTag, location: Location, packets: Vec<P>) -> Self {
        let len = packets.len();
        Self {
            protocol,
            location,
            packets: Box::new(packets),
            len,
        }
    }

    pub fn protocol(&self) -> ProtocolTag {
        self.protocol
    }

    pub fn location(&self) -> Location {
        self.location
    }

    /// Packets as `P`, or `None` if the message carries another type.
    pub fn packets<P: DataPacket>(&self) -> Option<&[P]> {
        self.packets.downcast_ref::<Vec<P>>().map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Debug for RoutingMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingMessage")
            .field("protocol", &self.protocol)
            .field("location", &self.location)
            .field("len", &self.len)
            .finish()
    }
}
