//! Headless flood-routing run over a scene file.
//!
//! ```bash
//! # Flood three readings from the first node of the scene for 30 s
//! wsn-radio-simulator --scene scenes/grid.json
//!
//! # Fixed seed, explicit source, longer run
//! wsn-radio-simulator --scene scenes/grid.json --seed 42 --source 17 --duration-secs 120
//! ```

use anyhow::Context;
use clap::Parser;
use env_logger::Builder;
use log::{LevelFilter, info};
use std::path::PathBuf;

use wsn_radio_simulator::common::scene::load_scene;
use wsn_radio_simulator::routing::{FLOOD_ROUTING, FloodRouting, RoutingTable};
use wsn_radio_simulator::simulation::NodeId;
use wsn_radio_simulator::{ONE_SECOND, SimulationConfig};

mod flood_demo;

use flood_demo::{BROADCAST, BroadcastPolicy, DeliveryLog, Reading};

/// Simulated seconds run when neither the config nor the command line
/// gives a duration.
const DEFAULT_DURATION_SECS: u64 = 30;

/// WSN radio simulator
///
/// Floods sensor readings from one node through every node of the scene
/// and reports how far they got. Reproducible for a given seed.
#[derive(Parser, Debug)]
#[command(name = "wsn-radio-simulator")]
#[command(version, about, long_about = None)]
struct Args {
    /// Scene JSON file with node placement and obstacles
    #[arg(long)]
    scene: PathBuf,

    /// Simulation config TOML. Defaults to simulation.toml next to the scene, if present.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Random seed, overrides the config
    #[arg(long)]
    seed: Option<u64>,

    /// Simulated duration in seconds, overrides the config
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Scene node_id of the source. Defaults to the first scene node.
    #[arg(long)]
    source: Option<u32>,

    /// Number of readings flooded, one per simulated second
    #[arg(long, default_value = "3")]
    readings: u16,

    /// Routing table capacity per node
    #[arg(long, default_value = "8")]
    table_size: usize,

    /// Readings carried by one radio message
    #[arg(long, default_value = "2")]
    packets_per_message: usize,
}

fn load_config(args: &Args) -> anyhow::Result<SimulationConfig> {
    let mut config = match &args.config {
        Some(path) => SimulationConfig::load(path)?,
        None => {
            let path = SimulationConfig::path_from_scene(&args.scene);
            if path.exists() {
                SimulationConfig::load(&path)?
            } else {
                SimulationConfig::default()
            }
        }
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(secs) = args.duration_secs {
        config.duration = Some(secs * ONE_SECOND);
    }
    config.duration.get_or_insert(DEFAULT_DURATION_SECS * ONE_SECOND);
    config.validate()?;
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    // Logging setup
    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter(Some("wsn_radio_simulator"), LevelFilter::Debug)
        .parse_default_env()
        .init();

    let args = Args::parse();
    let scene = load_scene(&args.scene).with_context(|| format!("Failed to load scene {}", args.scene.display()))?;
    let config = load_config(&args)?;
    let duration = config.duration.unwrap_or(DEFAULT_DURATION_SECS * ONE_SECOND);

    info!("Starting simulation: {} nodes, seed {}, {} ticks", scene.nodes.len(), config.seed, duration);

    let mut simulator = scene.build_simulator(config)?;
    let deliveries = DeliveryLog::default();
    for index in 0..scene.nodes.len() {
        let node = NodeId(index);
        let table = RoutingTable::<Reading>::new(BROADCAST, args.table_size, args.packets_per_message, BroadcastPolicy).with_listener(deliveries.listener(node));
        let mut flood = FloodRouting::new();
        flood.add_protocol(table)?;
        simulator.install_application(node, FLOOD_ROUTING, flood)?;
    }

    let source = match args.source {
        Some(id) => scene.node_index(id).with_context(|| format!("Source node {} is not in the scene", id))?,
        None => NodeId(0),
    };
    let origin = scene.scene_id(source).unwrap_or_default();

    for seq in 0..args.readings {
        simulator.run_until(u64::from(seq) * ONE_SECOND);
        let reading = Reading {
            origin,
            seq,
            value: i32::from(seq) * 10,
        };
        let accepted = simulator
            .with_application::<FloodRouting, _>(source, FLOOD_ROUTING, |flood, ctx| flood.send_data_packet(ctx, BROADCAST, &reading))
            .unwrap_or(false);
        info!("[{}] reading {} injected: {}", origin, seq, accepted);
    }
    simulator.run_until(duration);

    let mut reached = 0;
    for (index, node) in scene.nodes.iter().enumerate() {
        let received = deliveries.received(NodeId(index));
        if received > 0 {
            reached += 1;
        }
        info!("[{}] received {} of {} readings", node.node_id, received, args.readings);
    }
    let counters = simulator.counters();
    info!(
        "Reached {} of {} other nodes. Radio: {} sent, {} received, {} corrupted, {} abandoned",
        reached,
        scene.nodes.len().saturating_sub(1),
        counters.sent,
        counters.received,
        counters.corrupted,
        counters.abandoned
    );
    Ok(())
}
