//! Bounded packet store of one routing protocol on one node.

use std::any::Any;

use super::message::{ProtocolTag, RoutingMessage};
use super::packet::{DataPacket, FREE, FRESH, is_free, is_ready};
use super::policy::{PacketListener, RoutingPolicy};

/// Whether a table has anything to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableState {
    /// Every slot is free; aging is skipped.
    Clean,
    /// Occupied slots exist but none is ready to send.
    Aging,
    /// At least one packet is ready to send.
    Sending,
}

#[derive(Debug, Clone)]
pub struct Slot<P> {
    pub priority: u8,
    pub packet: P,
}

enum Lookup {
    /// Occupied slot holding the same datum.
    Match(usize),
    /// Slot to overwrite: the highest priority value, first one on ties.
    Candidate(usize),
}

/// Fixed-capacity packet table interpreted by a [`RoutingPolicy`].
pub struct RoutingTable<P: DataPacket> {
    tag: ProtocolTag,
    slots: Vec<Slot<P>>,
    max_data_per_msg: usize,
    state: TableState,
    policy: Box<dyn RoutingPolicy>,
    listener: Option<Box<dyn PacketListener<P>>>,
    /// Packets of the message currently on air.
    last_sent: Vec<P>,
}

impl<P: DataPacket> RoutingTable<P> {
    /// # Panics
    ///
    /// Panics if `capacity` or `max_data_per_msg` is zero.
    pub fn new(tag: ProtocolTag, capacity: usize, max_data_per_msg: usize, policy: impl RoutingPolicy + 'static) -> Self {
        assert!(capacity > 0, "routing table {tag} needs at least one slot");
        assert!(max_data_per_msg > 0, "routing table {tag} must send at least one packet per message");
        Self {
            tag,
            slots: (0..capacity)
                .map(|_| Slot {
                    priority: FREE,
                    packet: P::default(),
                })
                .collect(),
            max_data_per_msg,
            state: TableState::Clean,
            policy: Box::new(policy),
            listener: None,
            last_sent: Vec::new(),
        }
    }

    pub fn with_listener(mut self, listener: impl PacketListener<P> + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    pub fn tag(&self) -> ProtocolTag {
        self.tag
    }

    pub fn state(&self) -> TableState {
        self.state
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn max_data_per_msg(&self) -> usize {
        self.max_data_per_msg
    }

    pub fn slots(&self) -> &[Slot<P>] {
        &self.slots
    }

    /// Occupied slots in table order.
    pub fn packets(&self) -> impl Iterator<Item = &Slot<P>> {
        self.slots.iter().filter(|slot| !is_free(slot.priority))
    }

    /// Priority of the stored packet with the same identity.
    pub fn priority_of(&self, packet: &P) -> Option<u8> {
        match self.lookup(packet) {
            Lookup::Match(index) => Some(self.slots[index].priority),
            Lookup::Candidate(_) => None,
        }
    }

    /// Free every slot.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.priority = FREE;
            slot.packet = P::default();
        }
        self.state = TableState::Clean;
        self.last_sent.clear();
    }

    fn lookup(&self, packet: &P) -> Lookup {
        let mut candidate = 0;
        for (index, slot) in self.slots.iter().enumerate() {
            if !is_free(slot.priority) && slot.packet.same_identity(packet) {
                return Lookup::Match(index);
            }
            if slot.priority > self.slots[candidate].priority {
                candidate = index;
            }
        }
        Lookup::Candidate(candidate)
    }

    /// One clock tick: age every occupied slot and recompute the state.
    pub fn age(&mut self) {
        if self.state == TableState::Clean {
            return;
        }
        let mut state = TableState::Clean;
        for slot in &mut self.slots {
            if is_free(slot.priority) {
                continue;
            }
            slot.priority = self.policy.age(slot.priority);
            if is_ready(slot.priority) {
                state = TableState::Sending;
            } else if state == TableState::Clean {
                state = TableState::Aging;
            }
        }
        self.state = state;
    }

    /// Indexes of the packets for the next message, most urgent first.
    ///
    /// Bounded insertion into a shortlist of `max_data_per_msg`; equal
    /// priorities keep table order.
    pub fn select(&self) -> Vec<usize> {
        let mut selection: Vec<usize> = Vec::with_capacity(self.max_data_per_msg + 1);
        for (index, slot) in self.slots.iter().enumerate() {
            if !is_ready(slot.priority) {
                continue;
            }
            let position = selection
                .iter()
                .position(|&chosen| slot.priority < self.slots[chosen].priority)
                .unwrap_or(selection.len());
            if position < self.max_data_per_msg {
                selection.insert(position, index);
                selection.truncate(self.max_data_per_msg);
            }
        }
        selection
    }

    /// Build the next message, or fall back to aging if nothing is ready.
    pub fn build_message(&mut self) -> Option<RoutingMessage> {
        let selection = self.select();
        if selection.is_empty() {
            self.state = TableState::Aging;
            return None;
        }
        let packets: Vec<P> = selection.iter().map(|&index| self.slots[index].packet.clone()).collect();
        self.last_sent = packets.clone();
        Some(RoutingMessage::new(self.tag, self.policy.location(), packets))
    }

    /// Merge an inbound message. Returns false if the policy refused it.
    pub fn receive_message(&mut self, message: &RoutingMessage) -> bool {
        let Some(packets) = message.packets::<P>() else {
            log::warn!("Routing table {} got a message with a foreign packet type", self.tag);
            return false;
        };
        let location = message.location();
        if !self.policy.accept(location) {
            return false;
        }

        for packet in packets {
            match self.lookup(packet) {
                Lookup::Match(index) => {
                    let slot = &mut self.slots[index];
                    slot.priority = self.policy.received(location, slot.priority);
                }
                Lookup::Candidate(index) => {
                    let slot = &mut self.slots[index];
                    if slot.priority == FRESH {
                        log::debug!("Routing table {} full of unsent packets, dropping {:?}", self.tag, packet);
                        continue;
                    }
                    packet.copy_to(&mut slot.packet);
                    if let Some(listener) = self.listener.as_mut() {
                        if !listener.packet_received(&slot.packet) {
                            slot.priority = FREE;
                            continue;
                        }
                    }
                    slot.priority = self.policy.received(location, FRESH);
                }
            }
        }
        self.state = TableState::Sending;
        true
    }

    /// Store a locally produced packet as fresh.
    ///
    /// Returns false, changing nothing, if the same datum is already stored.
    pub fn send_data_packet(&mut self, packet: &P) -> bool {
        match self.lookup(packet) {
            Lookup::Match(_) => false,
            Lookup::Candidate(index) => {
                let slot = &mut self.slots[index];
                packet.copy_to(&mut slot.packet);
                slot.priority = FRESH;
                self.state = TableState::Sending;
                true
            }
        }
    }

    /// The last built message never went out. Its packets keep their
    /// priorities and are picked again by the next build.
    pub fn send_abandoned(&mut self) {
        self.last_sent.clear();
    }

    /// The last built message went out.
    pub fn send_done(&mut self) {
        for packet in std::mem::take(&mut self.last_sent) {
            if let Lookup::Match(index) = self.lookup(&packet) {
                let slot = &mut self.slots[index];
                slot.priority = self.policy.sent(slot.priority);
            }
        }
    }
}

/// Type-erased view of a [`RoutingTable`] for the engine.
pub trait RoutingProtocol: Any {
    fn tag(&self) -> ProtocolTag;
    fn state(&self) -> TableState;
    fn age(&mut self);
    fn build_message(&mut self) -> Option<RoutingMessage>;
    fn receive_message(&mut self, message: &RoutingMessage) -> bool;
    fn send_done(&mut self);
    fn send_abandoned(&mut self);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<P: DataPacket> RoutingProtocol for RoutingTable<P> {
    fn tag(&self) -> ProtocolTag {
        self.tag
    }

    fn state(&self) -> TableState {
        self.state
    }

    fn age(&mut self) {
        RoutingTable::age(self)
    }

    fn build_message(&mut self) -> Option<RoutingMessage> {
        RoutingTable::build_message(self)
    }

    fn receive_message(&mut self, message: &RoutingMessage) -> bool {
        RoutingTable::receive_message(self, message)
    }

    fn send_done(&mut self) {
        RoutingTable::send_done(self)
    }

    fn send_abandoned(&mut self) {
        RoutingTable::send_abandoned(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
