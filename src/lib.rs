//! Discrete-event simulator of wireless sensor network radios with a
//! generic flood-routing layer.
//!
//! - [`scheduler`]: virtual clock and reproducible event ordering
//! - [`simulation`]: nodes, MAC layer, radio propagation, run loop
//! - [`routing`]: priority-driven flood routing tables and engine
//! - [`config`]: simulation parameters loaded from TOML
//! - [`common`]: scene files

pub mod common;
pub mod config;
pub mod routing;
pub mod scheduler;
pub mod simulation;

pub use config::{FloodConfig, MacConfig, SimulationConfig};
pub use scheduler::{EventId, EventScheduler, ONE_SECOND, SimTime};
