//! Simulation configuration.
//!
//! All MAC and flood-routing constants live here instead of in globals, so
//! two simulations in the same process never share state. Every field has
//! a default; a TOML file only needs to list what it overrides.

use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::scheduler::{ONE_SECOND, SimTime};

/// MAC layer timing and signal thresholds of a Mica2-like mote.
///
/// Times are in simulator ticks (see [`ONE_SECOND`]).
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct MacConfig {
    /// Constant part of the wait before the first channel probe.
    pub min_waiting_time: SimTime,
    /// Random part of the wait before the first channel probe.
    pub random_waiting_time: SimTime,
    /// Constant part of the backoff after a busy channel.
    pub min_backoff_time: SimTime,
    /// Random part of the backoff after a busy channel.
    pub random_backoff_time: SimTime,
    /// Airtime of one message.
    pub transmission_time: SimTime,
    /// Receiver self-noise, added to the noise in every SNR calculation.
    pub noise_floor_variance: f64,
    /// The channel counts as free while noise stays below
    /// `noise_multiplier * noise_floor_variance`.
    pub noise_multiplier: f64,
    /// SNR a signal must exceed to start a reception.
    pub receive_start_threshold: f64,
    /// SNR below which an ongoing reception is corrupted.
    pub corruption_threshold: f64,
    /// Busy channel probes allowed per send, the first one included,
    /// before it is abandoned. `None` retries forever.
    pub max_probe_attempts: Option<u32>,
}

impl Default for MacConfig {
    fn default() -> Self {
        Self {
            min_waiting_time: 200,
            random_waiting_time: 128,
            min_backoff_time: 100,
            random_backoff_time: 30,
            transmission_time: 2133,
            noise_floor_variance: 0.025,
            noise_multiplier: 5.0,
            receive_start_threshold: 4.0,
            corruption_threshold: 2.0,
            max_probe_attempts: None,
        }
    }
}

/// Flood-routing engine timing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FloodConfig {
    /// Period of the aging clock.
    pub clock_tick: SimTime,
    /// Upper bound of the random delay before a send attempt runs.
    pub max_process_time: SimTime,
}

impl Default for FloodConfig {
    fn default() -> Self {
        Self {
            clock_tick: ONE_SECOND,
            max_process_time: ONE_SECOND / 1000,
        }
    }
}

/// Top-level configuration of one simulation run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SimulationConfig {
    /// Seed of the shared random source. Same seed, same run.
    pub seed: u64,
    /// Virtual time after which `run` stops, in ticks. `None` runs until
    /// no event is left.
    pub duration: Option<SimTime>,
    pub mac: MacConfig,
    pub flood: FloodConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 1234,
            duration: None,
            mac: MacConfig::default(),
            flood: FloodConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Load configuration from a TOML file.
    pub fn load(config_path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(config_path).with_context(|| format!("Failed to read config file: {}", config_path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Failed to parse config file: {}", config_path.display()))
    }

    /// Default config location for a scene: `simulation.toml` next to it.
    pub fn path_from_scene(scene_path: &Path) -> PathBuf {
        scene_path.parent().unwrap_or(Path::new(".")).join("simulation.toml")
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall or break the simulation.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.mac.transmission_time == 0 {
            anyhow::bail!("transmission-time must be positive");
        }
        if self.mac.noise_floor_variance <= 0.0 {
            anyhow::bail!("noise-floor-variance must be positive");
        }
        if self.mac.corruption_threshold > self.mac.receive_start_threshold {
            anyhow::bail!(
                "corruption-threshold {} exceeds receive-start-threshold {}",
                self.mac.corruption_threshold,
                self.mac.receive_start_threshold
            );
        }
        if self.mac.max_probe_attempts == Some(0) {
            anyhow::bail!("max-probe-attempts must be at least 1");
        }
        if self.flood.clock_tick == 0 {
            anyhow::bail!("clock-tick must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_mica2_constants() {
        let config = SimulationConfig::default();
        assert_eq!(config.mac.min_waiting_time, 200);
        assert_eq!(config.mac.random_waiting_time, 128);
        assert_eq!(config.mac.min_backoff_time, 100);
        assert_eq!(config.mac.random_backoff_time, 30);
        assert_eq!(config.mac.transmission_time, 2133);
        assert_eq!(config.flood.clock_tick, ONE_SECOND);
        assert_eq!(config.flood.max_process_time, 40);
        assert!(config.mac.max_probe_attempts.is_none());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = SimulationConfig::from_toml(
            r#"
            seed = 7
            duration = 400000

            [mac]
            transmission-time = 1000
            max-probe-attempts = 16
            "#,
        )
        .unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.duration, Some(400_000));
        assert_eq!(config.mac.transmission_time, 1000);
        assert_eq!(config.mac.max_probe_attempts, Some(16));
        assert_eq!(config.mac.min_backoff_time, 100);
        assert_eq!(config.flood.clock_tick, ONE_SECOND);
    }

    #[test]
    fn config_path_sits_next_to_scene() {
        let path = SimulationConfig::path_from_scene(Path::new("scenes/grid/scene.json"));
        assert_eq!(path, Path::new("scenes/grid/simulation.toml"));
    }

    #[test]
    fn inconsistent_thresholds_are_rejected() {
        let result = SimulationConfig::from_toml(
            r#"
            [mac]
            corruption-threshold = 5.0
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn zero_probe_budget_is_rejected() {
        let result = SimulationConfig::from_toml(
            r#"
            [mac]
            max-probe-attempts = 0
            "#,
        );
        assert!(result.is_err());
        assert!(SimulationConfig::from_toml("[mac]\nmax-probe-attempts = 1\n").is_ok());
    }
}
