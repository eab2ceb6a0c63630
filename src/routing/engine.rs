//! Per-node flood-routing engine.
//!
//! Runs as an ordinary [`Application`]: it owns the routing tables of the
//! node, ages them on a periodic clock and multiplexes their messages over
//! the node's single MAC send buffer.
//!
//! ## Timers
//!
//! - Clock tick: one reusable timer, first fired at a random offset inside
//!   the first period so neighboring nodes do not age in lockstep.
//! - Send attempt: one-shot timer a random fraction of `max_process_time`
//!   ahead, scheduled whenever a table may have something to send.

use std::any::Any;

use crate::scheduler::EventId;
use crate::simulation::signal_calculations::random_part;
use crate::simulation::{AppTag, Application, NodeContext, NodeId, Payload, TimerToken};

use super::message::{ProtocolTag, RoutingMessage};
use super::packet::DataPacket;
use super::table::{RoutingProtocol, RoutingTable, TableState};

/// Tag the engine is installed under on every node.
pub const FLOOD_ROUTING: AppTag = AppTag("flood-routing");

const CLOCK_TICK: TimerToken = 0;
const SEND_ATTEMPT: TimerToken = 1;

#[derive(Default)]
pub struct FloodRouting {
    /// Registered tables, scanned in registration order.
    protocols: Vec<Box<dyn RoutingProtocol>>,
    /// A message of ours sits in the MAC send buffer.
    sending: bool,
    /// Table that built the message in the MAC send buffer.
    in_flight: Option<ProtocolTag>,
    clock: Option<EventId>,
}

impl FloodRouting {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a routing table. Tags must be unique per node.
    pub fn add_protocol<P: DataPacket>(&mut self, table: RoutingTable<P>) -> anyhow::Result<()> {
        if self.find(table.tag()).is_some() {
            anyhow::bail!("routing protocol {} is already registered", table.tag());
        }
        self.protocols.push(Box::new(table));
        Ok(())
    }

    /// Unregister a table. A message it built that is still on air will
    /// complete without a `send_done`.
    pub fn remove_protocol(&mut self, tag: ProtocolTag) -> bool {
        let Some(index) = self.find(tag) else {
            return false;
        };
        self.protocols.remove(index);
        true
    }

    pub fn protocol<P: DataPacket>(&self, tag: ProtocolTag) -> Option<&RoutingTable<P>> {
        let index = self.find(tag)?;
        self.protocols[index].as_any().downcast_ref::<RoutingTable<P>>()
    }

    pub fn protocol_mut<P: DataPacket>(&mut self, tag: ProtocolTag) -> Option<&mut RoutingTable<P>> {
        let index = self.find(tag)?;
        self.protocols[index].as_any_mut().downcast_mut::<RoutingTable<P>>()
    }

    pub fn protocol_tags(&self) -> impl Iterator<Item = ProtocolTag> + '_ {
        self.protocols.iter().map(|protocol| protocol.tag())
    }

    pub fn is_sending(&self) -> bool {
        self.sending
    }

    pub fn in_flight(&self) -> Option<ProtocolTag> {
        self.in_flight
    }

    fn find(&self, tag: ProtocolTag) -> Option<usize> {
        self.protocols.iter().position(|protocol| protocol.tag() == tag)
    }

    /// Inject a locally produced packet into the table registered as `tag`.
    ///
    /// Returns false if the table does not exist, holds another packet
    /// type, or already stores the same datum.
    pub fn send_data_packet<P: DataPacket>(&mut self, ctx: &mut NodeContext<'_>, tag: ProtocolTag, packet: &P) -> bool {
        let Some(table) = self.protocol_mut::<P>(tag) else {
            log::warn!("[{}] no routing protocol {} for this packet type", ctx.node_id(), tag);
            return false;
        };
        if !table.send_data_packet(packet) {
            return false;
        }
        self.schedule_send_attempt(ctx);
        true
    }

    fn schedule_send_attempt(&mut self, ctx: &mut NodeContext<'_>) {
        let max_process_time = ctx.config().flood.max_process_time;
        let delay = random_part(max_process_time, ctx.rng());
        ctx.set_timer(delay, SEND_ATTEMPT);
    }

    fn age(&mut self, ctx: &mut NodeContext<'_>) {
        for index in 0..self.protocols.len() {
            self.protocols[index].age();
            if self.protocols[index].state() == TableState::Sending {
                self.schedule_send_attempt(ctx);
            }
        }
    }

    /// The MAC buffer is free again; retry if anything is left to send.
    fn finish_send(&mut self, ctx: &mut NodeContext<'_>) {
        self.sending = false;
        if self.protocols.iter().any(|protocol| protocol.state() == TableState::Sending) {
            self.schedule_send_attempt(ctx);
        }
    }

    fn try_send(&mut self, ctx: &mut NodeContext<'_>) {
        if self.sending {
            return;
        }
        for protocol in &mut self.protocols {
            if protocol.state() != TableState::Sending {
                continue;
            }
            let Some(message) = protocol.build_message() else {
                continue;
            };
            let tag = protocol.tag();
            log::trace!("[{}] sending {} packets of {}", ctx.node_id(), message.len(), tag);
            if ctx.send_message(Payload::new(message)) {
                self.sending = true;
                self.in_flight = Some(tag);
            } else {
                log::trace!("[{}] MAC busy, {} waits for the next trigger", ctx.node_id(), tag);
            }
            return;
        }
    }
}

impl Application for FloodRouting {
    fn start(&mut self, ctx: &mut NodeContext<'_>) {
        let clock_tick = ctx.config().flood.clock_tick;
        let clock = ctx.create_timer(CLOCK_TICK);
        let first_tick = ctx.now() + random_part(clock_tick, ctx.rng());
        ctx.schedule_timer(clock, first_tick);
        self.clock = Some(clock);
    }

    fn receive_message(&mut self, ctx: &mut NodeContext<'_>, payload: &Payload, sender: NodeId) {
        let Some(message) = payload.downcast_ref::<RoutingMessage>() else {
            log::debug!("[{}] non-routing payload from {} ignored", ctx.node_id(), sender);
            return;
        };
        let Some(index) = self.find(message.protocol()) else {
            log::trace!("[{}] unknown routing protocol {} from {}", ctx.node_id(), message.protocol(), sender);
            return;
        };
        if self.protocols[index].receive_message(message) {
            self.schedule_send_attempt(ctx);
        }
    }

    fn send_message_done(&mut self, ctx: &mut NodeContext<'_>) {
        if let Some(index) = self.in_flight.take().and_then(|tag| self.find(tag)) {
            self.protocols[index].send_done();
        }
        self.finish_send(ctx);
    }

    fn send_message_abandoned(&mut self, ctx: &mut NodeContext<'_>) {
        if let Some(index) = self.in_flight.take().and_then(|tag| self.find(tag)) {
            log::debug!("[{}] message of {} abandoned by the MAC", ctx.node_id(), self.protocols[index].tag());
            self.protocols[index].send_abandoned();
        }
        self.finish_send(ctx);
    }

    fn timer_fired(&mut self, ctx: &mut NodeContext<'_>, token: TimerToken) {
        match token {
            CLOCK_TICK => {
                if let Some(clock) = self.clock {
                    let next = ctx.now() + ctx.config().flood.clock_tick;
                    ctx.schedule_timer(clock, next);
                }
                self.age(ctx);
            }
            SEND_ATTEMPT => self.try_send(ctx),
            other => log::warn!("[{}] unexpected flood-routing timer {}", ctx.node_id(), other),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FloodConfig, SimulationConfig};
    use crate::routing::policy::{Location, RoutingPolicy};
    use crate::scheduler::{ONE_SECOND, SimTime};
    use crate::simulation::{PassiveObserver, Position, RadioModel, ReceptionSink, Simulator};
    use std::cell::RefCell;
    use std::rc::Rc;

    const TAG: ProtocolTag = ProtocolTag("numbers");
    const OTHER: ProtocolTag = ProtocolTag("others");

    /// Clock period long enough that no tick fires during a test.
    const NO_TICK: SimTime = 1 << 40;

    struct Silent;

    impl RadioModel for Silent {
        fn update_neighborhoods(&mut self, _positions: &[Position]) {}
        fn begin_transmission(&mut self, _sender: NodeId, _power: f64, _sink: &mut dyn ReceptionSink) {}
        fn end_transmission(&mut self, _sender: NodeId, _sink: &mut dyn ReceptionSink) {}
    }

    #[derive(Debug, Clone, Default)]
    struct Number(u32);

    impl DataPacket for Number {
        fn same_identity(&self, other: &Self) -> bool {
            self.0 == other.0
        }
    }

    struct Cooldown;

    impl RoutingPolicy for Cooldown {
        fn location(&self) -> Location {
            0
        }
        fn sent(&mut self, priority: u8) -> u8 {
            priority | 0x01
        }
        fn accept(&mut self, _location: Location) -> bool {
            true
        }
        fn received(&mut self, _location: Location, priority: u8) -> u8 {
            priority
        }
        fn age(&mut self, priority: u8) -> u8 {
            if priority & 0x01 == 1 { priority.saturating_add(2).min(0xFD) } else { priority }
        }
    }

    /// Keeps heard packets at an odd priority: stored, never forwarded.
    struct Hold;

    impl RoutingPolicy for Hold {
        fn location(&self) -> Location {
            0
        }
        fn sent(&mut self, priority: u8) -> u8 {
            priority | 0x01
        }
        fn accept(&mut self, _location: Location) -> bool {
            true
        }
        fn received(&mut self, _location: Location, _priority: u8) -> u8 {
            0x03
        }
        fn age(&mut self, priority: u8) -> u8 {
            priority
        }
    }

    /// Protocol of every message handed to the MAC, in order.
    #[derive(Clone, Default)]
    struct OnAir(Rc<RefCell<Vec<ProtocolTag>>>);

    impl PassiveObserver for OnAir {
        fn message_sent(&mut self, _node: NodeId, payload: &Payload) {
            if let Some(message) = payload.downcast_ref::<RoutingMessage>() {
                self.0.borrow_mut().push(message.protocol());
            }
        }
    }

    fn quiet_node(flood: FloodRouting) -> (Simulator, OnAir) {
        let config = SimulationConfig {
            flood: FloodConfig {
                clock_tick: NO_TICK,
                ..FloodConfig::default()
            },
            ..SimulationConfig::default()
        };
        let mut sim = Simulator::new(config, Box::new(Silent));
        let node = sim.add_node(Position::default());
        sim.install_application(node, FLOOD_ROUTING, flood).unwrap();
        let on_air = OnAir::default();
        sim.set_observer(node, on_air.clone()).unwrap();
        (sim, on_air)
    }

    fn lone_node() -> Simulator {
        let mut sim = Simulator::new(SimulationConfig::default(), Box::new(Silent));
        let node = sim.add_node(Position::default());
        let mut flood = FloodRouting::new();
        flood.add_protocol(RoutingTable::<Number>::new(TAG, 4, 2, Cooldown)).unwrap();
        sim.install_application(node, FLOOD_ROUTING, flood).unwrap();
        sim
    }

    #[test]
    fn registry_rejects_duplicates_and_removes_by_tag() {
        let mut flood = FloodRouting::new();
        flood.add_protocol(RoutingTable::<Number>::new(TAG, 2, 1, Cooldown)).unwrap();
        assert!(flood.add_protocol(RoutingTable::<Number>::new(TAG, 2, 1, Cooldown)).is_err());
        flood.add_protocol(RoutingTable::<Number>::new(ProtocolTag("other"), 2, 1, Cooldown)).unwrap();
        assert_eq!(flood.protocol_tags().collect::<Vec<_>>(), vec![TAG, ProtocolTag("other")]);

        assert!(flood.remove_protocol(TAG));
        assert!(!flood.remove_protocol(TAG));
        assert!(flood.protocol::<Number>(TAG).is_none());
        assert!(flood.protocol::<Number>(ProtocolTag("other")).is_some());
    }

    #[test]
    fn protocol_lookup_checks_packet_type() {
        let mut flood = FloodRouting::new();
        flood.add_protocol(RoutingTable::<Number>::new(TAG, 2, 1, Cooldown)).unwrap();
        #[derive(Debug, Clone, Default)]
        struct Other;
        impl DataPacket for Other {
            fn same_identity(&self, _other: &Self) -> bool {
                true
            }
        }
        assert!(flood.protocol::<Other>(TAG).is_none());
    }

    #[test]
    fn clock_starts_with_the_application() {
        let mut sim = lone_node();
        sim.start();
        assert_eq!(sim.pending_events(), 1);
        sim.run_until(3 * ONE_SECOND);
        // The tick reschedules itself.
        assert_eq!(sim.pending_events(), 1);
    }

    #[test]
    fn injected_packet_goes_out_once_and_cools_down() {
        let mut sim = lone_node();
        let sent = sim
            .with_application::<FloodRouting, _>(NodeId(0), FLOOD_ROUTING, |flood, ctx| {
                let first = flood.send_data_packet(ctx, TAG, &Number(5));
                let unknown = flood.send_data_packet(ctx, ProtocolTag("missing"), &Number(6));
                (first, unknown)
            })
            .unwrap();
        assert_eq!(sent, (true, false));

        sim.run_until(3 * ONE_SECOND);
        let flood = sim.application::<FloodRouting>(NodeId(0), FLOOD_ROUTING).unwrap();
        assert!(!flood.is_sending());
        assert_eq!(flood.in_flight(), None);
        let priority = flood.protocol::<Number>(TAG).unwrap().priority_of(&Number(5)).unwrap();
        // Sent once (0x01), then aged by at least two ticks.
        assert!(priority >= 0x05 && priority & 0x01 == 1, "priority {priority:#x}");
        assert_eq!(sim.counters().sent, 1);
    }

    #[test]
    fn tables_send_in_registration_order() {
        let mut flood = FloodRouting::new();
        flood.add_protocol(RoutingTable::<Number>::new(TAG, 4, 2, Cooldown)).unwrap();
        flood.add_protocol(RoutingTable::<Number>::new(OTHER, 4, 2, Cooldown)).unwrap();
        let (mut sim, on_air) = quiet_node(flood);

        // The later table gets its packet first.
        sim.with_application::<FloodRouting, _>(NodeId(0), FLOOD_ROUTING, |flood, ctx| {
            assert!(flood.send_data_packet(ctx, OTHER, &Number(2)));
            assert!(flood.send_data_packet(ctx, TAG, &Number(1)));
        })
        .unwrap();

        // Without clock ticks, the second message can only come from the
        // attempt scheduled when the first one is done.
        sim.run_until(ONE_SECOND / 4);
        assert_eq!(*on_air.0.borrow(), vec![TAG, OTHER]);
        assert_eq!(sim.counters().sent, 2);

        let flood = sim.application::<FloodRouting>(NodeId(0), FLOOD_ROUTING).unwrap();
        assert!(!flood.is_sending());
        for (tag, number) in [(TAG, Number(1)), (OTHER, Number(2))] {
            let table = flood.protocol::<Number>(tag).unwrap();
            assert_eq!(table.priority_of(&number), Some(0x01));
            assert_eq!(table.state(), TableState::Aging);
        }
    }

    #[test]
    fn ready_table_without_packets_is_skipped() {
        let mut flood = FloodRouting::new();
        flood.add_protocol(RoutingTable::<Number>::new(TAG, 4, 2, Hold)).unwrap();
        flood.add_protocol(RoutingTable::<Number>::new(OTHER, 4, 2, Cooldown)).unwrap();
        let heard = RoutingMessage::new(TAG, 0, vec![Number(9)]);
        assert!(flood.protocol_mut::<Number>(TAG).unwrap().receive_message(&heard));
        assert_eq!(flood.protocol::<Number>(TAG).unwrap().state(), TableState::Sending);
        let (mut sim, on_air) = quiet_node(flood);

        sim.with_application::<FloodRouting, _>(NodeId(0), FLOOD_ROUTING, |flood, ctx| flood.send_data_packet(ctx, OTHER, &Number(1)))
            .unwrap();
        sim.run_until(ONE_SECOND / 4);

        assert_eq!(*on_air.0.borrow(), vec![OTHER]);
        let flood = sim.application::<FloodRouting>(NodeId(0), FLOOD_ROUTING).unwrap();
        let held = flood.protocol::<Number>(TAG).unwrap();
        assert_eq!(held.state(), TableState::Aging);
        assert_eq!(held.priority_of(&Number(9)), Some(0x03));
        assert_eq!(flood.protocol::<Number>(OTHER).unwrap().priority_of(&Number(1)), Some(0x01));
    }

    #[test]
    fn first_tick_lands_within_one_period() {
        for seed in 0..16 {
            let config = SimulationConfig {
                seed,
                ..SimulationConfig::default()
            };
            let mut sim = Simulator::new(config, Box::new(Silent));
            let node = sim.add_node(Position::default());
            sim.install_application(node, FLOOD_ROUTING, FloodRouting::new()).unwrap();

            assert!(sim.step());
            let first = sim.now();
            assert!(first < ONE_SECOND, "seed {seed}: first tick at {first}");
            assert!(sim.step());
            assert_eq!(sim.now(), first + ONE_SECOND);
        }
    }

    #[test]
    fn reusable_timer_reports_whether_it_is_pending() {
        let mut sim = lone_node();
        let timer = sim
            .with_application::<FloodRouting, _>(NodeId(0), FLOOD_ROUTING, |_flood, ctx| {
                let timer = ctx.create_timer(SEND_ATTEMPT);
                assert!(!ctx.is_timer_scheduled(timer));
                let at = ctx.now() + 10;
                ctx.schedule_timer(timer, at);
                assert!(ctx.is_timer_scheduled(timer));
                timer
            })
            .unwrap();

        sim.run_until(20);
        let pending = sim
            .with_application::<FloodRouting, _>(NodeId(0), FLOOD_ROUTING, |_flood, ctx| ctx.is_timer_scheduled(timer))
            .unwrap();
        assert!(!pending);
    }
}
