//! acbridge - Samsung AC register bridge
//!
//! Validates bridge documents, runs a single poll against the configured
//! transport, or keeps polling until interrupted.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use acbridge_core::config::TransportConfig;
use acbridge_core::logging;
use acbridge_devices::transports::MemoryBus;
use acbridge_devices::{EntityKind, EntityState, RegisterType, SharedTransport};
use acbridge_engine::{BridgeConfig, ModbusController, PollReport};

#[derive(Parser)]
#[command(name = "acbridge")]
#[command(version, about = "Expose Samsung AC registers as sensors, switches and numbers")]
struct Cli {
    /// Override the configured log filter
    #[arg(long, global = true, env = "ACBRIDGE_LOG")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a bridge document and print its entities
    Check {
        /// Bridge document (YAML, TOML or JSON)
        file: PathBuf,
    },
    /// Poll every register once and print the entity states
    Poll {
        /// Bridge document (YAML, TOML or JSON)
        file: PathBuf,
        /// Use an in-memory bus instead of the configured transport
        #[arg(long)]
        simulate: bool,
        /// Print the states as JSON
        #[arg(long)]
        json: bool,
    },
    /// Poll on the configured interval until Ctrl-C
    Run {
        /// Bridge document (YAML, TOML or JSON)
        file: PathBuf,
        /// Use an in-memory bus instead of the configured transport
        #[arg(long)]
        simulate: bool,
    },
}

#[derive(Serialize)]
struct StateRow {
    id: String,
    name: String,
    kind: EntityKind,
    state: EntityState,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let file = match &cli.command {
        Commands::Check { file } | Commands::Poll { file, .. } | Commands::Run { file, .. } => file.clone(),
    };
    let config = load(&file)?;
    init_logging(&config, cli.log_level.as_deref())?;
    info!("Loaded {} entities from {}", config.entity_count(), file.display());

    match cli.command {
        Commands::Check { .. } => check(&config).await,
        Commands::Poll { simulate, json, .. } => poll(&config, simulate, json).await,
        Commands::Run { simulate, .. } => run(&config, simulate).await,
    }
}

fn load(file: &Path) -> Result<BridgeConfig> {
    BridgeConfig::load(file).with_context(|| format!("Invalid bridge document {}", file.display()))
}

fn init_logging(config: &BridgeConfig, log_level: Option<&str>) -> Result<()> {
    let mut logging_config = config.logging.clone();
    if let Some(level) = log_level {
        logging_config.level = level.to_string();
    }
    logging::init_with_config(&logging_config).context("Failed to initialize logging")
}

async fn check(config: &BridgeConfig) -> Result<()> {
    let controller = config.build(Arc::new(MemoryBus::new())).await?;
    controller.dump_config().await;

    println!(
        "OK: controller '{}', {} sensors, {} switches, {} numbers",
        controller.id(),
        config.sensors.len(),
        config.switches.len(),
        config.numbers.len()
    );
    for line in entity_lines(&controller)? {
        println!("  {}", line);
    }
    Ok(())
}

/// One line per entity: kind, id, device, register, table and value type
fn entity_lines(controller: &ModbusController) -> Result<Vec<String>> {
    let lines = controller
        .registry()
        .entities()?
        .iter()
        .map(|entity| {
            let register = entity.register();
            format!(
                "{:<7} {:<24} {} 0x{:04X} {} {}",
                entity.kind(),
                entity.id(),
                register.device_address,
                register.address,
                register.register_type,
                register.value_type
            )
        })
        .collect();
    Ok(lines)
}

async fn poll(config: &BridgeConfig, simulate: bool, json: bool) -> Result<()> {
    let (report, rows) = poll_states(config, simulate).await?;

    if json {
        println!("{}", render_json(&report, &rows)?);
    } else {
        for row in &rows {
            println!("{:<7} {:<24} {:<28} {}", row.kind, row.id, row.name, row.state);
        }
        println!(
            "{} reads, {} updated, {} failed in {:?}",
            report.reads, report.updated, report.failed, report.elapsed
        );
    }
    Ok(())
}

/// Set up a controller, poll once and collect every entity's state
async fn poll_states(config: &BridgeConfig, simulate: bool) -> Result<(PollReport, Vec<StateRow>)> {
    let controller = build(config, simulate).await?;
    controller.setup().await?;
    let report = controller.poll_once().await?;

    let mut rows = Vec::new();
    for entity in controller.registry().entities()? {
        rows.push(StateRow {
            id: entity.id().to_string(),
            name: entity.name().to_string(),
            kind: entity.kind(),
            state: entity.state().await,
        });
    }
    Ok((report, rows))
}

fn render_json(report: &PollReport, rows: &[StateRow]) -> Result<String> {
    Ok(serde_json::to_string_pretty(
        &serde_json::json!({ "report": report, "entities": rows }),
    )?)
}

async fn run(config: &BridgeConfig, simulate: bool) -> Result<()> {
    let controller = build(config, simulate).await?;
    controller.setup().await?;
    controller.dump_config().await;

    let mut events = controller.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!("{} {}: {} -> {}", event.kind, event.entity_id, event.old_state, event.new_state);
        }
    });

    controller
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", e);
            }
        })
        .await?;

    drop(controller);
    printer.abort();
    Ok(())
}

async fn build(config: &BridgeConfig, simulate: bool) -> Result<ModbusController> {
    if !simulate {
        return Ok(config.build_with_configured_transport().await?);
    }
    let transport: SharedTransport = Arc::new(simulated_bus(config).await?);
    Ok(config.build(transport).await?)
}

/// Memory bus seeded from the document, with zeroes for every register it does not mention
async fn simulated_bus(config: &BridgeConfig) -> Result<MemoryBus> {
    let bus = match &config.transport {
        memory @ TransportConfig::Memory { .. } => MemoryBus::from_config(memory)?,
        TransportConfig::Tcp { .. } => MemoryBus::new(),
    };

    let registers = config
        .sensors
        .iter()
        .chain(config.switches.iter())
        .chain(config.numbers.iter().map(|n| &n.entity))
        .map(|e| &e.register);

    for register in registers {
        let device = register.device_address.as_str();
        match register.register_type {
            RegisterType::Coil | RegisterType::DiscreteInput => {
                if bus.bit(device, register.address).await.is_none() {
                    bus.set_bit(device, register.address, false).await;
                }
            }
            RegisterType::Holding | RegisterType::Read => {
                for i in 0..register.register_count() {
                    let address = register.address.wrapping_add(i);
                    if bus.word(device, address).await.is_none() {
                        bus.set_word(device, address, 0).await;
                    }
                }
            }
        }
    }
    Ok(bus)
}
