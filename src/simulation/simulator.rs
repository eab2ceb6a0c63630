//! Simulation harness: node setup and the event loop.

use crate::config::SimulationConfig;
use crate::scheduler::SimTime;

use super::application::{Application, PassiveObserver};
use super::node::{InstalledApplication, Node};
use super::radio::RadioModel;
use super::types::{AppTag, NodeId, Payload, Position};
use super::world::{Action, NodeContext, RadioCounters, World};

/// Single-threaded discrete-event simulator.
///
/// Build the topology with [`add_node`](Self::add_node) and
/// [`install_application`](Self::install_application), then call
/// [`run`](Self::run) or drive it with [`step`](Self::step) /
/// [`run_until`](Self::run_until). The first of these calls `start`.
pub struct Simulator {
    world: World,
    radio: Box<dyn RadioModel>,
    started: bool,
}

impl Simulator {
    pub fn new(config: SimulationConfig, radio: Box<dyn RadioModel>) -> Self {
        Self {
            world: World::new(config),
            radio,
            started: false,
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.world.config
    }

    /// Place a new node. Ids are handed out densely from 0.
    ///
    /// # Panics
    ///
    /// Panics once the simulation has started; neighborhoods are fixed.
    pub fn add_node(&mut self, position: Position) -> NodeId {
        assert!(!self.started, "nodes must be placed before the simulation starts");
        self.world.add_node(position)
    }

    /// Install `app` on `node` under `tag`.
    pub fn install_application(&mut self, node: NodeId, tag: AppTag, app: impl Application) -> anyhow::Result<()> {
        let target = self.node_mut(node)?;
        if target.has_application(tag) {
            anyhow::bail!("node {} already runs an application tagged {}", node, tag);
        }
        target.apps.push(InstalledApplication {
            tag,
            app: Some(Box::new(app)),
        });
        if self.started {
            self.world.with_app(node, tag, |app, ctx| app.start(ctx));
        }
        Ok(())
    }

    pub fn set_observer(&mut self, node: NodeId, observer: impl PassiveObserver + 'static) -> anyhow::Result<()> {
        self.node_mut(node)?.observer = Some(Box::new(observer));
        Ok(())
    }

    pub fn set_transmission_strength(&mut self, node: NodeId, strength: f64) -> anyhow::Result<()> {
        self.node_mut(node)?.mac.set_transmission_strength(strength);
        Ok(())
    }

    fn node_mut(&mut self, node: NodeId) -> anyhow::Result<&mut Node> {
        match self.world.nodes.get_mut(node.0) {
            Some(target) => Ok(target),
            None => anyhow::bail!("unknown node {}", node),
        }
    }

    /// Compute neighborhoods and start every application. Idempotent.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        let positions: Vec<Position> = self.world.nodes.iter().map(Node::position).collect();
        self.radio.update_neighborhoods(&positions);
        log::info!("Simulation started with {} nodes", positions.len());
        self.world.start_applications();
    }

    /// Fire the next event. False when nothing is left to do.
    pub fn step(&mut self) -> bool {
        self.start();
        match self.world.scheduler.pop_next() {
            Some(event) => {
                self.fire(event.action);
                true
            }
            None => false,
        }
    }

    /// Fire every event scheduled at or before `bound`, then move the
    /// clock to `bound`.
    pub fn run_until(&mut self, bound: SimTime) {
        self.start();
        while self.world.scheduler.peek_time().is_some_and(|time| time <= bound) {
            self.step();
        }
        self.world.scheduler.advance_to(bound);
    }

    /// Run for the configured duration, or until no event is left.
    pub fn run(&mut self) {
        match self.world.config.duration {
            Some(duration) => self.run_until(duration),
            None => while self.step() {},
        }
        log::info!("Simulation stopped at {}", self.now());
    }

    fn fire(&mut self, action: Action) {
        match action {
            Action::ChannelProbe(node) => {
                if let Some(power) = self.world.probe_channel(node) {
                    self.radio.begin_transmission(node, power, &mut self.world);
                }
            }
            Action::EndTransmission(node) => {
                self.radio.end_transmission(node, &mut self.world);
                self.world.complete_transmission(node);
            }
            Action::Timer { node, app, token } => self.world.fire_timer(node, app, token),
        }
    }

    pub fn now(&self) -> SimTime {
        self.world.scheduler.now()
    }

    /// Number of events waiting to fire.
    pub fn pending_events(&self) -> usize {
        self.world.scheduler.len()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        self.world.node(id)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.world.nodes
    }

    pub fn counters(&self) -> RadioCounters {
        self.world.counters
    }

    /// Borrow an installed application as its concrete type.
    pub fn application<A: Application>(&self, node: NodeId, tag: AppTag) -> Option<&A> {
        self.world.nodes.get(node.0)?.application::<A>(tag)
    }

    pub fn application_mut<A: Application>(&mut self, node: NodeId, tag: AppTag) -> Option<&mut A> {
        self.world.nodes.get_mut(node.0)?.application_mut::<A>(tag)
    }

    /// Act on an application from outside the event loop, with the same
    /// context it gets in its own callbacks.
    pub fn with_application<A: Application, R>(&mut self, node: NodeId, tag: AppTag, f: impl FnOnce(&mut A, &mut NodeContext<'_>) -> R) -> Option<R> {
        self.start();
        self.world
            .with_app(node, tag, |app, ctx| app.as_any_mut().downcast_mut::<A>().map(|app| f(app, ctx)))
            .flatten()
    }

    /// Send a message from `node` as if `tag` had sent it. False if the
    /// MAC layer is busy or the node does not exist.
    pub fn send_message(&mut self, node: NodeId, tag: AppTag, payload: Payload) -> bool {
        if node.0 >= self.world.nodes.len() {
            log::warn!("send from unknown node {}", node);
            return false;
        }
        self.start();
        self.world.send_message(node, tag, payload)
    }
}
