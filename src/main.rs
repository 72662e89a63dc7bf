use clap::{Parser, Subcommand};
use routing_switch::classifier::{LearningPathManager, PacketClassifier};
use routing_switch::command::{CommandServer, Dispatcher};
use routing_switch::config;
use routing_switch::controller::Controller;
use routing_switch::firewall::{FirewallCompiler, MemoryRuleStore};
use routing_switch::flow::FlowProgrammer;
use routing_switch::managers::{MemoryUserManager, MemoryVmManager, TopologyHostManager};
use routing_switch::telemetry::{init_logging, ControllerMetrics};
use routing_switch::topology::{HostLearner, Topology};
use routing_switch::transport::SwitchBridge;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

/// Capacity of the switch event queue
const EVENT_QUEUE: usize = 1024;

#[derive(Parser)]
#[command(name = "routing-switch")]
#[command(about = "SDN routing-switch controller with a command protocol, firewall and DoS mitigation")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Run the controller
    Run {
        /// Path to config.lock file
        #[arg(short, long, default_value = "config.lock")]
        config: PathBuf,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Generate config.lock from config.toml
    Generate {
        /// Path to config.toml
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,

        /// Output path for config.lock
        #[arg(short, long, default_value = "config.lock")]
        output: PathBuf,
    },
    /// Validate config.toml without generating lock file
    Validate {
        /// Path to config.toml
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Config { action }) => match action {
            ConfigAction::Generate {
                config: config_path,
                output,
            } => cmd_config_generate(&config_path, &output),
            ConfigAction::Validate {
                config: config_path,
            } => cmd_config_validate(&config_path),
        },
        Some(Commands::Run { config: lock_path }) => cmd_run(&lock_path),
        // Default: run with config.lock
        None => cmd_run(Path::new("config.lock")),
    };

    if let Err(e) = result {
        eprintln!("[ERROR] {}", e);
        std::process::exit(1);
    }
}

fn cmd_run(lock_path: &Path) -> Result<(), String> {
    let lock = config::load_lock(lock_path)
        .map_err(|e| format!("Failed to load {}: {}", lock_path.display(), e))?;
    init_logging(Some(&lock.logging));
    info!(lock = %lock_path.display(), source_hash = %lock.source_hash, "routing-switch starting");

    let server_addr = lock.server_addr().map_err(|e| e.to_string())?;
    let bridge_addr = lock.bridge_addr().map_err(|e| e.to_string())?;

    let store = match &lock.firewall.users_file {
        Some(path) => match MemoryRuleStore::load_users_file(path) {
            Ok(store) => {
                info!(path = %path.display(), rules = store.len(), "firewall rules loaded");
                store
            }
            Err(e) => {
                warn!(path = %path.display(), "starting with no firewall rules: {}", e);
                MemoryRuleStore::new()
            }
        },
        None => MemoryRuleStore::new(),
    };

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to create runtime: {}", e))?;

    rt.block_on(async move {
        let metrics = Arc::new(ControllerMetrics::new());
        let topology = Arc::new(Topology::new());

        let (bridge, gateway) = SwitchBridge::bind(bridge_addr)
            .await
            .map_err(|e| format!("Failed to bind switch bridge on {}: {}", bridge_addr, e))?;
        let programmer = Arc::new(FlowProgrammer::new(
            Arc::new(gateway),
            lock.retry_policy(),
            metrics.clone(),
        ));

        let firewall = Arc::new(FirewallCompiler::new(
            topology.clone(),
            programmer.clone(),
            Arc::new(store),
            lock.firewall.target_policy,
        ));
        let classifier = Arc::new(PacketClassifier::new(
            programmer.clone(),
            Arc::new(HostLearner::new(topology.clone())),
            Arc::new(LearningPathManager::new(topology.clone(), programmer.clone())),
            firewall.clone(),
            lock.mitigation_policy(),
        ));

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(MemoryVmManager::new()),
            Arc::new(MemoryUserManager::new()),
            Arc::new(TopologyHostManager::new(topology.clone())),
            firewall,
            metrics.clone(),
        ));
        let server = CommandServer::bind(server_addr, dispatcher, lock.server_options())
            .await
            .map_err(|e| format!("Failed to bind command server on {}: {}", server_addr, e))?;

        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);
        let controller = Controller::new(topology, programmer, classifier);

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let server_task = tokio::spawn(server.run_until(async move {
            let _ = shutdown_rx.changed().await;
        }));
        let bridge_task = tokio::spawn(bridge.run(events_tx));
        let controller_task = tokio::spawn(controller.run(events_rx));

        info!("routing-switch started");

        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!("failed to listen for ctrl-c: {}", e);
                }
                info!("shutdown requested");
            }
            outcome = bridge_task => {
                warn!("switch bridge stopped: {:?}", outcome);
            }
        }

        let _ = shutdown_tx.send(true);
        match server_task.await {
            Ok(Err(e)) => warn!("command server failed: {}", e),
            Err(e) => warn!("command server task failed: {}", e),
            Ok(Ok(())) => {}
        }
        controller_task.abort();

        for (name, value) in metrics.export() {
            info!(counter = %name, value, "final metric");
        }
        Ok(())
    })
}

fn cmd_config_generate(config_path: &Path, output_path: &Path) -> Result<(), String> {
    println!("[INFO] Loading {}...", config_path.display());

    let content = std::fs::read_to_string(config_path)
        .map_err(|e| format!("Failed to read config file: {}", e))?;

    let cfg = config::parse(&content).map_err(|e| format!("Failed to parse config: {}", e))?;

    let validation = config::validate(&cfg);
    validation.print_diagnostics();

    if validation.has_errors() {
        return Err("Validation failed with errors".to_string());
    }

    let lock = config::generate_lock(&cfg, &content);

    let lock_toml =
        toml::to_string_pretty(&lock).map_err(|e| format!("Failed to serialize lock: {}", e))?;

    let output = format!(
        "# Generated by routing-switch - DO NOT EDIT\n# Source: {} (sha256: {})\n\n{}",
        config_path.display(),
        &lock.source_hash[..16],
        lock_toml
    );

    std::fs::write(output_path, output).map_err(|e| format!("Failed to write lock file: {}", e))?;

    println!("[INFO] Generated {}", output_path.display());
    Ok(())
}

fn cmd_config_validate(config_path: &Path) -> Result<(), String> {
    println!("[INFO] Validating {}...", config_path.display());

    let cfg = config::load(config_path).map_err(|e| format!("Failed to parse config: {}", e))?;

    let validation = config::validate(&cfg);
    validation.print_diagnostics();

    if validation.has_errors() {
        Err("Validation failed".to_string())
    } else {
        println!("[INFO] Configuration is valid");
        Ok(())
    }
}
