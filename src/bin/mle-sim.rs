//! MLE simulator binary
//!
//! Runs several MLE engines on one simulated radio medium in real time and
//! reports the topology they settle into.

use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::time::Duration;
use thread_mle::{Collaborators, Config, ExtAddress, FileSettings, Mle, MleEvent, Neighbor, SimBus};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{Level, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

/// Thread MLE network simulator
#[derive(Parser, Debug)]
#[command(name = "mle-sim", version, about)]
struct Args {
    /// Path to configuration file (overrides default search paths)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of simulated devices
    #[arg(short, long, default_value_t = 4)]
    nodes: usize,

    /// Run time in seconds; 0 runs until Ctrl+C
    #[arg(short, long, default_value_t = 120)]
    duration: u64,

    /// Received signal strength between every pair of devices, in dBm
    #[arg(long, default_value_t = -60, allow_hyphen_values = true)]
    rss: i8,

    /// Seed for extended addresses and engine randomness
    #[arg(long)]
    seed: Option<u64>,

    /// Delay between starting consecutive devices, in milliseconds
    #[arg(long, default_value_t = 1500)]
    stagger_ms: u64,

    /// Simulation tick in milliseconds
    #[arg(long, default_value_t = 10)]
    tick_ms: u64,

    /// Persist each device's settings as YAML in this directory
    #[arg(long, value_name = "DIR")]
    state_dir: Option<PathBuf>,
}

struct SimNode {
    mle: Mle,
    start_at_ms: u64,
    started: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();

    let (config, loaded_paths) = if let Some(config_path) = &args.config {
        match Config::load_file(config_path) {
            Ok(config) => (config, vec![config_path.clone()]),
            Err(e) => {
                error!("Failed to load configuration from {}: {}", config_path.display(), e);
                std::process::exit(1);
            }
        }
    } else {
        match Config::load() {
            Ok(result) => result,
            Err(e) => {
                error!("Failed to load configuration: {}", e);
                std::process::exit(1);
            }
        }
    };
    if loaded_paths.is_empty() {
        info!("No config files found, using defaults");
    } else {
        for path in &loaded_paths {
            info!(path = %path.display(), "Loaded config file");
        }
    }
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }
    if args.nodes == 0 || args.tick_ms == 0 {
        error!("--nodes and --tick-ms must be positive");
        std::process::exit(1);
    }
    if let Some(dir) = &args.state_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        error!("Failed to create state directory {}: {}", dir.display(), e);
        std::process::exit(1);
    }

    let seed = args.seed.unwrap_or_else(rand::random);
    info!(nodes = args.nodes, seed, rss = args.rss, "MLE simulator starting");

    let bus = SimBus::new(Some(args.rss));
    let mut rng = StdRng::seed_from_u64(seed);
    let mut nodes = Vec::with_capacity(args.nodes);
    for index in 0..args.nodes {
        let mut node_config = config.clone();
        let ext_address = ExtAddress::from_bytes(rng.random());
        node_config.mle.ext_address = Some(ext_address);

        let transport = bus.attach(node_config.network.channel);
        let mut collaborators = match Collaborators::from_config(&node_config, Box::new(transport)) {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to set up device {}: {}", index, e);
                std::process::exit(1);
            }
        };
        if let Some(dir) = &args.state_dir {
            let path = dir.join(format!("{ext_address}.yaml"));
            collaborators = collaborators.with_settings(Box::new(FileSettings::new(path)));
        }
        let mle = Mle::new(node_config, collaborators, seed.wrapping_add(index as u64));
        info!(node = index, ext_address = %ext_address, "Device created");
        nodes.push(SimNode {
            mle,
            start_at_ms: index as u64 * args.stagger_ms,
            started: false,
        });
    }

    info!("Simulation running, press Ctrl+C to exit");

    let began = Instant::now();
    let mut ticker = tokio::time::interval(Duration::from_millis(args.tick_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let deadline_ms = (args.duration > 0).then_some(args.duration * 1000);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now_ms = began.elapsed().as_millis() as u64;
                step(&mut nodes, &bus, now_ms);
                if deadline_ms.is_some_and(|d| now_ms >= d) {
                    info!("Simulation time elapsed");
                    break;
                }
            }
            result = &mut ctrl_c => {
                match result {
                    Ok(()) => info!("Shutdown signal received"),
                    Err(e) => error!("Failed to listen for shutdown signal: {}", e),
                }
                break;
            }
        }
    }

    print_topology(&nodes);

    for node in &mut nodes {
        node.mle.stop();
    }
    info!("MLE simulator shutdown complete");
}

/// Advance every device to `now_ms` and carry frames until the medium is quiet.
fn step(nodes: &mut [SimNode], bus: &SimBus, now_ms: u64) {
    for (index, node) in nodes.iter_mut().enumerate() {
        if !node.started && now_ms >= node.start_at_ms {
            node.started = true;
            if let Err(e) = node.mle.start(now_ms) {
                warn!(node = index, error = %e, "Device failed to start");
            }
        }
        node.mle.poll(now_ms);
    }
    loop {
        let deliveries = bus.drain();
        if deliveries.is_empty() {
            break;
        }
        for d in deliveries {
            nodes[d.to].mle.handle_receive(&d.payload, &d.info, now_ms);
        }
    }
    for (index, node) in nodes.iter_mut().enumerate() {
        for event in node.mle.take_events() {
            log_event(index, &event);
        }
    }
}

fn log_event(index: usize, event: &MleEvent) {
    match event {
        MleEvent::RoleChanged { from, to } => {
            info!(node = index, from = %from, to = %to, "Role changed");
        }
        MleEvent::PartitionChanged { partition_id } => {
            info!(node = index, partition_id = format_args!("{:#010x}", partition_id), "Partition changed");
        }
        MleEvent::ParentChanged { ext_address, rloc16 } => {
            info!(node = index, parent = %ext_address, rloc16 = format_args!("{:#06x}", rloc16), "Parent changed");
        }
        other => info!(node = index, event = ?other, "Neighbor event"),
    }
}

fn print_topology(nodes: &[SimNode]) {
    println!();
    println!(
        "{:<4} {:<18} {:<9} {:<7} {:<11} {:<18} {:>7} {:>8}",
        "node", "ext address", "role", "rloc16", "partition", "parent", "routers", "children"
    );
    for (index, node) in nodes.iter().enumerate() {
        let mle = &node.mle;
        let parent = mle
            .parent()
            .map(|p| p.ext_address().to_string())
            .unwrap_or_else(|| "-".to_string());
        let (rloc16, partition) = if mle.role().is_attached() {
            (format!("{:#06x}", mle.rloc16()), format!("{:#010x}", mle.partition_id()))
        } else {
            ("-".to_string(), "-".to_string())
        };
        println!(
            "{:<4} {:<18} {:<9} {:<7} {:<11} {:<18} {:>7} {:>8}",
            index,
            mle.ext_address().to_string(),
            mle.role().to_string(),
            rloc16,
            partition,
            parent,
            mle.router_table().neighbor_count(),
            mle.child_table().valid_count(),
        );
    }
    let mut partitions: Vec<u32> = nodes
        .iter()
        .filter(|n| n.mle.role().is_attached())
        .map(|n| n.mle.partition_id())
        .collect();
    partitions.sort_unstable();
    partitions.dedup();
    println!();
    println!("{} partition(s)", partitions.len());
}
