//! Radio propagation: who hears whom, and how loud.
//!
//! The MAC layer never computes signal strengths itself. When a node starts
//! or stops transmitting, the simulator hands the event to a [`RadioModel`],
//! which calls back into a [`ReceptionSink`] once per node in range.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Deserialize;
use std::collections::HashMap;

use super::geometry::{Obstacle, distance, is_line_of_sight_blocked};
use super::signal_calculations::{calculate_dynamic_strength, calculate_static_fading};
use super::types::{NodeId, Position};

/// Receiving side of a radio model.
pub trait ReceptionSink {
    fn reception_begin(&mut self, receiver: NodeId, signal: f64, sender: NodeId);
    fn reception_end(&mut self, receiver: NodeId, signal: f64, sender: NodeId);
}

/// Propagation model consumed by the MAC layer.
///
/// Implementations must report the same signal strength to a receiver in
/// `end_transmission` as they did in the matching `begin_transmission`;
/// receivers subtract it from their accumulated noise.
pub trait RadioModel {
    /// Called once after every node is placed. Node `i` sits at `positions[i]`.
    fn update_neighborhoods(&mut self, positions: &[Position]);

    fn begin_transmission(&mut self, sender: NodeId, power: f64, sink: &mut dyn ReceptionSink);

    fn end_transmission(&mut self, sender: NodeId, sink: &mut dyn ReceptionSink);
}

/// Parameters of the Gaussian fading model.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GaussianRadioParams {
    /// Exponent of the distance attenuation.
    pub falloff: f64,
    /// Standard deviation of the per-link fading factor.
    pub static_random_factor: f64,
    /// Standard deviation of the per-transmission fading factor.
    pub dynamic_random_factor: f64,
    /// Links with a static fading below this are not neighbors at all.
    pub cutoff: f64,
    /// Distance at which attenuation reaches one half.
    pub distance_unit: f64,
}

impl Default for GaussianRadioParams {
    fn default() -> Self {
        Self {
            falloff: 2.0,
            static_random_factor: 0.3,
            dynamic_random_factor: 0.05,
            cutoff: 0.1,
            distance_unit: 1.0,
        }
    }
}

/// Distance-based model with log-normal-like fading.
///
/// Each ordered pair gets a static fading sampled once; every transmission
/// multiplies it by a fresh dynamic factor. Obstacles cut links entirely.
pub struct GaussianRadioModel {
    params: GaussianRadioParams,
    obstacles: Vec<Obstacle>,
    rng: ChaCha8Rng,
    /// Per sender: receivers and their static fading.
    neighbors: Vec<Vec<(NodeId, f64)>>,
    /// Per transmitting sender: the signal each receiver got.
    active: HashMap<NodeId, Vec<(NodeId, f64)>>,
}

impl GaussianRadioModel {
    pub fn new(params: GaussianRadioParams, obstacles: Vec<Obstacle>, seed: u64) -> Self {
        Self {
            params,
            obstacles,
            rng: ChaCha8Rng::seed_from_u64(seed),
            neighbors: Vec::new(),
            active: HashMap::new(),
        }
    }

    /// Receivers of `sender` with their static fading.
    pub fn neighbors(&self, sender: NodeId) -> &[(NodeId, f64)] {
        self.neighbors.get(sender.0).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_transmitting(&self, sender: NodeId) -> bool {
        self.active.contains_key(&sender)
    }
}

impl RadioModel for GaussianRadioModel {
    fn update_neighborhoods(&mut self, positions: &[Position]) {
        self.neighbors = vec![Vec::new(); positions.len()];
        for (i, from) in positions.iter().enumerate() {
            for (j, to) in positions.iter().enumerate() {
                if i == j || is_line_of_sight_blocked(from, to, &self.obstacles) {
                    continue;
                }
                let fading = calculate_static_fading(
                    distance(from, to),
                    self.params.distance_unit,
                    self.params.falloff,
                    self.params.static_random_factor,
                    &mut self.rng,
                );
                if fading >= self.params.cutoff {
                    self.neighbors[i].push((NodeId(j), fading));
                }
            }
            log::trace!("[{}] {} neighbors", i, self.neighbors[i].len());
        }
    }

    fn begin_transmission(&mut self, sender: NodeId, power: f64, sink: &mut dyn ReceptionSink) {
        let Some(links) = self.neighbors.get(sender.0) else {
            log::warn!("[{}] transmitting without a neighborhood", sender);
            return;
        };
        let signals: Vec<(NodeId, f64)> = links
            .iter()
            .map(|&(receiver, fading)| (receiver, calculate_dynamic_strength(power, fading, self.params.dynamic_random_factor, &mut self.rng)))
            .collect();
        for &(receiver, signal) in &signals {
            sink.reception_begin(receiver, signal, sender);
        }
        if self.active.insert(sender, signals).is_some() {
            log::warn!("[{}] began a transmission while the previous one was still on air", sender);
        }
    }

    fn end_transmission(&mut self, sender: NodeId, sink: &mut dyn ReceptionSink) {
        let Some(signals) = self.active.remove(&sender) else {
            log::warn!("[{}] ended a transmission that never began", sender);
            return;
        };
        for (receiver, signal) in signals {
            sink.reception_end(receiver, signal, sender);
        }
    }
}
