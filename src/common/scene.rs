//! Scene loading, parsing, and validation logic.
//!
//! A scene is a JSON file describing node placement, per-node transmission
//! strength, obstacles and the radio propagation parameters. Scene node ids
//! are free-form; simulator node ids follow the order of the `nodes` array.

use anyhow::Context;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::config::SimulationConfig;
use crate::simulation::geometry::Obstacle;
use crate::simulation::{GaussianRadioModel, GaussianRadioParams, NodeId, Position, Simulator};

/// Mixed into the simulation seed so the radio model draws from its own
/// stream.
const RADIO_SEED_SALT: u64 = 0x5EED_0F_F4D1;

/// Error type for scene loading failures.
#[derive(Debug)]
pub enum SceneLoadError {
    FileReadError(String),
    ParseError(String),
    ValidationError(String),
}

impl std::fmt::Display for SceneLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SceneLoadError::FileReadError(msg) => write!(f, "Failed to read file: {}", msg),
            SceneLoadError::ParseError(msg) => write!(f, "Failed to parse JSON: {}", msg),
            SceneLoadError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for SceneLoadError {}

fn default_transmission_strength() -> f64 {
    1.0
}

/// Node placement entry.
#[derive(Debug, Deserialize, Clone)]
pub struct SceneNode {
    pub node_id: u32,
    pub position: Position,
    /// Transmit power relative to the reference power of 1.0.
    #[serde(default = "default_transmission_strength")]
    pub transmission_strength: f64,
}

/// Root structure representing the entire scene.
#[derive(Debug, Deserialize)]
pub struct Scene {
    /// Gaussian propagation parameters; defaults when omitted.
    #[serde(default)]
    pub radio_parameters: GaussianRadioParams,
    pub nodes: Vec<SceneNode>,
    /// Static obstacles for line-of-sight checks.
    #[serde(default)]
    pub obstacles: Vec<Obstacle>,
}

impl Scene {
    /// Simulator id of the node with the given scene id.
    pub fn node_index(&self, scene_id: u32) -> Option<NodeId> {
        self.nodes.iter().position(|node| node.node_id == scene_id).map(NodeId)
    }

    /// Scene id of a simulator node.
    pub fn scene_id(&self, node: NodeId) -> Option<u32> {
        self.nodes.get(node.0).map(|node| node.node_id)
    }

    /// Create a simulator with every node placed and a Gaussian radio model.
    pub fn build_simulator(&self, config: SimulationConfig) -> anyhow::Result<Simulator> {
        let radio = GaussianRadioModel::new(self.radio_parameters.clone(), self.obstacles.clone(), config.seed ^ RADIO_SEED_SALT);
        let mut simulator = Simulator::new(config, Box::new(radio));
        for node in &self.nodes {
            let id = simulator.add_node(node.position);
            simulator.set_transmission_strength(id, node.transmission_strength)?;
        }
        Ok(simulator)
    }
}

/// Load and parse a scene from a file.
pub fn load_scene(path: &Path) -> Result<Scene, SceneLoadError> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))
        .map_err(|e| SceneLoadError::FileReadError(e.to_string()))?;
    parse_scene(&data)
}

/// Parse and validate a scene from JSON text.
pub fn parse_scene(data: &str) -> Result<Scene, SceneLoadError> {
    let scene: Scene = serde_json::from_str(data)
        .context("Invalid JSON format")
        .map_err(|e| SceneLoadError::ParseError(format!("{:#}", e)))?;

    validate_scene(&scene).map_err(SceneLoadError::ValidationError)?;

    Ok(scene)
}

/// Validate scene configuration.
///
/// Checks for issues that would break or silently skew a run:
/// - Empty or oversized node list, duplicate node ids
/// - Non-finite positions, non-positive transmission strength
/// - Radio parameters outside their meaningful range
/// - Degenerate obstacles (inverted rectangles, zero-radius circles)
pub fn validate_scene(scene: &Scene) -> Result<(), String> {
    const MAX_NODES: usize = 10000;

    if scene.nodes.is_empty() {
        return Err("Scene must contain at least one node".to_string());
    }
    if scene.nodes.len() > MAX_NODES {
        return Err(format!("Node count {} exceeds maximum of {}", scene.nodes.len(), MAX_NODES));
    }

    let mut node_ids = HashSet::new();
    for node in &scene.nodes {
        if !node_ids.insert(node.node_id) {
            return Err(format!("Duplicate node_id found: {}", node.node_id));
        }
        let Position { x, y, z } = node.position;
        if !(x.is_finite() && y.is_finite() && z.is_finite()) {
            return Err(format!("Node {} has a non-finite position", node.node_id));
        }
        if !(node.transmission_strength.is_finite() && node.transmission_strength > 0.0) {
            return Err(format!(
                "Node {} transmission_strength {} must be positive",
                node.node_id, node.transmission_strength
            ));
        }
    }

    let radio = &scene.radio_parameters;
    if radio.distance_unit <= 0.0 {
        return Err("Invalid distance_unit, must be positive".to_string());
    }
    if radio.falloff <= 0.0 {
        return Err("Invalid falloff, must be positive".to_string());
    }
    if radio.static_random_factor < 0.0 || radio.dynamic_random_factor < 0.0 {
        return Err("Random factors must be non-negative".to_string());
    }
    if radio.cutoff < 0.0 {
        return Err("Invalid cutoff, must be non-negative".to_string());
    }

    for (idx, obstacle) in scene.obstacles.iter().enumerate() {
        match obstacle {
            Obstacle::Rectangle { shape } => {
                if shape.top_left.x >= shape.bottom_right.x || shape.top_left.y >= shape.bottom_right.y {
                    return Err(format!(
                        "Obstacle {} (rectangle) has invalid geometry: top-left ({}, {}) must be strictly less than bottom-right ({}, {})",
                        idx, shape.top_left.x, shape.top_left.y, shape.bottom_right.x, shape.bottom_right.y
                    ));
                }
            }
            Obstacle::Circle { shape } => {
                if shape.radius <= 0.0 {
                    return Err(format!("Obstacle {} (circle) has non-positive radius", idx));
                }
            }
        }
    }

    Ok(())
}
