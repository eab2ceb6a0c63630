//! Pluggable strategies interpreting packet priorities.

/// Protocol-defined position of a node (hop count, coordinate, ...).
pub type Location = i32;

/// Decides how packet priorities evolve in one routing table.
///
/// The table only stores and ranks priorities; every transition comes
/// from here. See [`packet`](super::packet) for what the values mean.
pub trait RoutingPolicy {
    /// Location attached to every message this node sends.
    fn location(&self) -> Location;

    /// Priority of a packet after it went out in a message.
    fn sent(&mut self, priority: u8) -> u8;

    /// Whether to process a message sent from `location` at all.
    fn accept(&mut self, location: Location) -> bool;

    /// Priority of a packet after it was heard from `location`. Called with
    /// `0x00` for packets this node did not have before.
    fn received(&mut self, location: Location, priority: u8) -> u8;

    /// Priority after one clock tick.
    fn age(&mut self, priority: u8) -> u8;
}

/// Hook told about every packet a table stores from the radio.
pub trait PacketListener<P> {
    /// Return false to refuse the packet; its slot is freed.
    fn packet_received(&mut self, packet: &P) -> bool;
}

impl<P, F> PacketListener<P> for F
where
    F: FnMut(&P) -> bool,
{
    fn packet_received(&mut self, packet: &P) -> bool {
        self(packet)
    }
}
