//! Generic flood routing on top of the MAC layer.
//!
//! - `packet`: user packet contract and the priority byte
//! - `policy`: strategy deciding priority transitions
//! - `message`: the radio message a table produces
//! - `table`: bounded per-protocol packet store (aging, eviction, selection)
//! - `engine`: per-node application multiplexing tables over one radio

pub mod engine;
pub mod message;
pub mod packet;
pub mod policy;
pub mod table;

pub use engine::{FLOOD_ROUTING, FloodRouting};
pub use message::{ProtocolTag, RoutingMessage};
pub use packet::{DataPacket, FREE, FRESH};
pub use policy::{Location, PacketListener, RoutingPolicy};
pub use table::{RoutingProtocol, RoutingTable, Slot, TableState};
