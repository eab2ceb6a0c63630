//! Shared simulation state and the handlers acting on it.
//!
//! `World` owns the scheduler, every node and the shared random source.
//! It carries out the outcomes the MAC layer decides on: scheduling probes
//! and transmission ends, delivering payloads, notifying observers. The
//! radio model is kept outside so it can call back into the world through
//! [`ReceptionSink`] while a transmission begins or ends.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::config::SimulationConfig;
use crate::scheduler::{EventId, EventScheduler, SimTime};

use super::application::{Application, PassiveObserver};
use super::mac::{MacLayer, ProbeOutcome, ReceptionEnd, ReceptionStart, SendDecision};
use super::node::Node;
use super::radio::ReceptionSink;
use super::signal_calculations::{generate_backoff_time, generate_waiting_time};
use super::types::{AppTag, NodeId, Payload, Position, TimerToken};

/// What a scheduled event does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ChannelProbe(NodeId),
    EndTransmission(NodeId),
    Timer { node: NodeId, app: AppTag, token: TimerToken },
}

/// Radio activity totals over the whole run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RadioCounters {
    /// Transmissions put on air.
    pub sent: u64,
    /// Receptions that completed uncorrupted.
    pub received: u64,
    /// Receptions lost to interference.
    pub corrupted: u64,
    /// Sends abandoned after too many busy channel probes.
    pub abandoned: u64,
}

pub struct World {
    pub(crate) config: SimulationConfig,
    pub(crate) scheduler: EventScheduler<Action>,
    pub(crate) nodes: Vec<Node>,
    pub(crate) rng: ChaCha8Rng,
    pub(crate) counters: RadioCounters,
}

impl World {
    pub(crate) fn new(config: SimulationConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self {
            config,
            scheduler: EventScheduler::new(),
            nodes: Vec::new(),
            rng,
            counters: RadioCounters::default(),
        }
    }

    pub(crate) fn add_node(&mut self, position: Position) -> NodeId {
        let id = NodeId(self.nodes.len());
        let probe = self.scheduler.create(Action::ChannelProbe(id));
        let end = self.scheduler.create(Action::EndTransmission(id));
        self.nodes.push(Node::new(id, position, MacLayer::new(probe, end)));
        id
    }

    pub(crate) fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Run `f` on an installed application with a context scoped to it.
    ///
    /// The application is taken out of its node for the duration of the
    /// call, so `f` may freely mutate the rest of the world. Returns `None`
    /// if the node has no application with this tag.
    pub(crate) fn with_app<R>(&mut self, node: NodeId, tag: AppTag, f: impl FnOnce(&mut dyn Application, &mut NodeContext<'_>) -> R) -> Option<R> {
        let index = self.nodes.get(node.0)?.app_index(tag)?;
        let Some(mut app) = self.nodes[node.0].apps[index].app.take() else {
            log::warn!("[{}] application {} re-entered", node, tag);
            return None;
        };
        let result = {
            let mut ctx = NodeContext { world: self, node, app: tag };
            f(&mut *app, &mut ctx)
        };
        self.nodes[node.0].apps[index].app = Some(app);
        Some(result)
    }

    fn notify_observer(&mut self, node: NodeId, f: impl FnOnce(&mut dyn PassiveObserver)) {
        if let Some(observer) = self.nodes[node.0].observer.as_mut() {
            f(observer.as_mut());
        }
    }

    pub(crate) fn start_applications(&mut self) {
        for index in 0..self.nodes.len() {
            let node = NodeId(index);
            let tags: Vec<AppTag> = self.nodes[index].application_tags().collect();
            for tag in tags {
                self.with_app(node, tag, |app, ctx| app.start(ctx));
            }
        }
    }

    /// Hand a message to the node's MAC layer on behalf of `app`.
    pub(crate) fn send_message(&mut self, node: NodeId, app: AppTag, payload: Payload) -> bool {
        match self.nodes[node.0].mac.begin_send(payload.clone(), app) {
            SendDecision::Rejected => {
                log::trace!("[{}] send from {} rejected, MAC busy", node, app);
                return false;
            }
            SendDecision::Postponed => {
                log::trace!("[{}] send from {} postponed until reception ends", node, app);
            }
            SendDecision::Probe => {
                let wait = generate_waiting_time(&self.config.mac, &mut self.rng);
                self.schedule_probe(node, self.scheduler.now() + wait);
            }
        }
        self.notify_observer(node, |observer| observer.message_sent(node, &payload));
        true
    }

    fn schedule_probe(&mut self, node: NodeId, time: SimTime) {
        let probe = self.nodes[node.0].mac.probe_event;
        if self.scheduler.is_scheduled(probe) {
            log::debug!("[{}] channel probe already pending", node);
            return;
        }
        self.scheduler.schedule(probe, time);
    }

    /// Channel probe fired. Returns the transmit power when the node goes
    /// on air; the caller must then start the transmission on the radio.
    pub(crate) fn probe_channel(&mut self, node: NodeId) -> Option<f64> {
        let now = self.scheduler.now();
        match self.nodes[node.0].mac.probe_channel(&self.config.mac) {
            ProbeOutcome::Transmit(power) => {
                let end = self.nodes[node.0].mac.end_transmission_event;
                self.scheduler.schedule(end, now + self.config.mac.transmission_time);
                self.counters.sent += 1;
                log::trace!("[{}] transmitting at {} with power {}", node, now, power);
                Some(power)
            }
            ProbeOutcome::Backoff => {
                let backoff = generate_backoff_time(&self.config.mac, &mut self.rng);
                self.schedule_probe(node, now + backoff);
                None
            }
            ProbeOutcome::GiveUp(app) => {
                self.counters.abandoned += 1;
                log::debug!("[{}] channel busy too long, send abandoned", node);
                if let Some(app) = app {
                    self.with_app(node, app, |app, ctx| app.send_message_abandoned(ctx));
                }
                None
            }
            ProbeOutcome::Ignored => None,
        }
    }

    /// Transmission over; the radio has already been told.
    pub(crate) fn complete_transmission(&mut self, node: NodeId) {
        if let Some(app) = self.nodes[node.0].mac.finish_transmission() {
            self.with_app(node, app, |app, ctx| app.send_message_done(ctx));
        }
    }

    pub(crate) fn fire_timer(&mut self, node: NodeId, app: AppTag, token: TimerToken) {
        if self.with_app(node, app, |app, ctx| app.timer_fired(ctx, token)).is_none() {
            log::warn!("[{}] timer {} for missing application {}", node, token, app);
        }
    }
}

impl ReceptionSink for World {
    fn reception_begin(&mut self, receiver: NodeId, signal: f64, sender: NodeId) {
        let outcome = self.nodes[receiver.0].mac.reception_begin(&self.config.mac, signal, sender);
        match outcome {
            ReceptionStart::Started => {
                log::trace!("[{}] receiving from {} at {:.4}", receiver, sender, signal);
            }
            ReceptionStart::Interference { newly_corrupted } => {
                if self.nodes[receiver.0].observer.is_none() {
                    return;
                }
                let tracked = self.nodes[receiver.0]
                    .mac
                    .tracked_sender()
                    .filter(|_| newly_corrupted)
                    .and_then(|tracked| self.nodes[tracked.0].mac.payload().cloned());
                let interfering = self.nodes[sender.0].mac.payload().cloned();
                self.notify_observer(receiver, |observer| {
                    if let Some(payload) = &tracked {
                        observer.message_corrupted(receiver, payload);
                    }
                    if let Some(payload) = &interfering {
                        observer.message_corrupted(receiver, payload);
                    }
                });
            }
            ReceptionStart::Noise => {}
        }
    }

    fn reception_end(&mut self, receiver: NodeId, signal: f64, sender: NodeId) {
        let ReceptionEnd::Completed { sender, corrupted, resume_send } = self.nodes[receiver.0].mac.reception_end(signal, sender) else {
            return;
        };

        if corrupted {
            self.counters.corrupted += 1;
            log::debug!("[{}] message from {} corrupted", receiver, sender);
        } else {
            let origin = &self.nodes[sender.0].mac;
            if let (Some(payload), Some(tag)) = (origin.payload().cloned(), origin.sender_app()) {
                self.counters.received += 1;
                if self.with_app(receiver, tag, |app, ctx| app.receive_message(ctx, &payload, sender)).is_none() {
                    log::trace!("[{}] no application {} for message from {}", receiver, tag, sender);
                }
                self.notify_observer(receiver, |observer| observer.message_received(receiver, &payload, sender));
            }
        }

        if resume_send {
            let wait = generate_waiting_time(&self.config.mac, &mut self.rng);
            self.schedule_probe(receiver, self.scheduler.now() + wait);
        }
    }
}

/// Handle through which an application acts on its own node.
pub struct NodeContext<'a> {
    world: &'a mut World,
    node: NodeId,
    app: AppTag,
}

impl NodeContext<'_> {
    pub fn node_id(&self) -> NodeId {
        self.node
    }

    pub fn app_tag(&self) -> AppTag {
        self.app
    }

    pub fn now(&self) -> SimTime {
        self.world.scheduler.now()
    }

    pub fn position(&self) -> Position {
        self.world.nodes[self.node.0].position()
    }

    pub fn mac(&self) -> &MacLayer {
        &self.world.nodes[self.node.0].mac
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.world.config
    }

    /// Shared seeded random source.
    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.world.rng
    }

    /// Queue a message for broadcast. False if the MAC layer is still busy
    /// with the previous one.
    pub fn send_message(&mut self, payload: Payload) -> bool {
        self.world.send_message(self.node, self.app, payload)
    }

    /// Create a reusable timer. It does nothing until scheduled.
    pub fn create_timer(&mut self, token: TimerToken) -> EventId {
        let action = self.timer_action(token);
        self.world.scheduler.create(action)
    }

    /// Schedule a reusable timer at absolute `time`.
    ///
    /// # Panics
    ///
    /// Panics if the timer is already pending.
    pub fn schedule_timer(&mut self, timer: EventId, time: SimTime) {
        self.world.scheduler.schedule(timer, time);
    }

    /// One-shot timer firing `delay` ticks from now.
    pub fn set_timer(&mut self, delay: SimTime, token: TimerToken) -> EventId {
        let time = self.now() + delay;
        let action = self.timer_action(token);
        self.world.scheduler.schedule_once(time, action)
    }

    pub fn is_timer_scheduled(&self, timer: EventId) -> bool {
        self.world.scheduler.is_scheduled(timer)
    }

    fn timer_action(&self, token: TimerToken) -> Action {
        Action::Timer {
            node: self.node,
            app: self.app,
            token,
        }
    }
}
