//! Discrete-event radio network simulation.
//!
//! This module provides the node-level simulation built on the event
//! scheduler. It integrates:
//! - Per-node MAC state machine with carrier sense and backoff
//! - Noise accumulation and SNR-driven corruption
//! - Pluggable radio propagation (Gaussian fading with obstacles)
//! - Applications, timers and passive observers installed on nodes
//!
//! ## Module Organization
//!
//! - `types`: Handles and values shared by every layer
//! - `signal_calculations`: SNR, fading and MAC timing helpers
//! - `geometry`: Line-of-sight and obstacle intersection logic
//! - `mac`: MAC layer state machine, decisions only
//! - `radio`: Radio model trait and the Gaussian model
//! - `application`: Application and observer contracts
//! - `node`: Per-mote container
//! - `world`: Shared state and the event handlers acting on it
//! - `simulator`: Setup API and the run loop

pub mod application;
pub mod geometry;
pub mod mac;
pub mod node;
pub mod radio;
pub mod signal_calculations;
pub mod simulator;
pub mod types;
pub mod world;

pub use application::{Application, PassiveObserver};
pub use geometry::Obstacle;
pub use mac::{MacLayer, MacState};
pub use node::Node;
pub use radio::{GaussianRadioModel, GaussianRadioParams, RadioModel, ReceptionSink};
pub use simulator::Simulator;
pub use types::{AppTag, NodeId, Payload, Position, TimerToken};
pub use world::{NodeContext, RadioCounters};
