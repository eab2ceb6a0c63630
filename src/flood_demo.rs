//! Broadcast flood used by the command line runner.
//!
//! Every node forwards each reading once, then lets it cool down and
//! eventually forgets it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use wsn_radio_simulator::routing::{DataPacket, FREE, Location, ProtocolTag, RoutingPolicy};
use wsn_radio_simulator::simulation::NodeId;

pub const BROADCAST: ProtocolTag = ProtocolTag("broadcast");

/// Priority after which a cooled-down reading is forgotten.
const FORGET_AFTER: u8 = 0x3F;

/// Sensor reading flooded from a source.
#[derive(Debug, Clone, Default)]
pub struct Reading {
    pub origin: u32,
    pub seq: u16,
    pub value: i32,
}

impl DataPacket for Reading {
    fn same_identity(&self, other: &Self) -> bool {
        self.origin == other.origin && self.seq == other.seq
    }
}

/// Forward once, then age odd priorities up to [`FORGET_AFTER`].
#[derive(Debug, Default)]
pub struct BroadcastPolicy;

impl RoutingPolicy for BroadcastPolicy {
    fn location(&self) -> Location {
        0
    }

    fn sent(&mut self, priority: u8) -> u8 {
        priority | 0x01
    }

    fn accept(&mut self, _location: Location) -> bool {
        true
    }

    /// New readings arrive as `0x00` and go out on the next message;
    /// duplicates leave the stored priority alone.
    fn received(&mut self, _location: Location, priority: u8) -> u8 {
        priority
    }

    fn age(&mut self, priority: u8) -> u8 {
        match priority {
            p if p & 0x01 == 0 => p,
            p if p >= FORGET_AFTER => FREE,
            p => p + 2,
        }
    }
}

/// Readings stored per node, shared by the listeners of every node.
#[derive(Debug, Default, Clone)]
pub struct DeliveryLog(Rc<RefCell<HashMap<NodeId, u32>>>);

impl DeliveryLog {
    /// Listener counting readings stored at `node`.
    pub fn listener(&self, node: NodeId) -> impl FnMut(&Reading) -> bool + 'static {
        let counts = Rc::clone(&self.0);
        move |reading: &Reading| {
            log::trace!("[{}] stored reading {}/{} = {}", node, reading.origin, reading.seq, reading.value);
            *counts.borrow_mut().entry(node).or_insert(0) += 1;
            true
        }
    }

    pub fn received(&self, node: NodeId) -> u32 {
        self.0.borrow().get(&node).copied().unwrap_or(0)
    }
}
