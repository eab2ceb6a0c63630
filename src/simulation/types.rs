//! Type definitions shared across the simulation.
//!
//! Contains the handles used to address nodes and applications, the node
//! position, and the opaque message payload passed over the radio.

use serde::Deserialize;
use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// Index of a node inside the simulation, assigned at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registry key of an application installed on a node.
///
/// The same tag must be used on every node running the same kind of
/// application: a received message is handed to the local application
/// whose tag matches the sender's originating application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AppTag(pub &'static str);

impl fmt::Display for AppTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Token identifying an application timer when it fires.
pub type TimerToken = u64;

/// 3D position of a mote in world units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }
}

/// Message content handed to the MAC layer.
///
/// The same payload is shared by every receiver of a transmission, so it
/// is reference counted and read-only. Applications downcast it to the
/// concrete message type they sent.
#[derive(Clone)]
pub struct Payload(Rc<dyn Any>);

impl Payload {
    pub fn new<T: Any>(message: T) -> Self {
        Self(Rc::new(message))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Whether two payloads are the very same transmitted message.
    pub fn ptr_eq(&self, other: &Payload) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload").finish_non_exhaustive()
    }
}
