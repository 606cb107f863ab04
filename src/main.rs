//! CLI Entry Point for pool-sense
//!
//! Provides command-line interface for:
//! - Serving the leak tester (sensor producer + HTTP API)
//! - Probing the sensor from a terminal
//!
//! # Usage
//!
//! Run the service:
//! ```bash
//! pool-sense serve --config config/poolsense.toml
//! ```
//!
//! Run without hardware:
//! ```bash
//! pool-sense serve --simulate --port 8081
//! ```
//!
//! Print five readings:
//! ```bash
//! pool-sense probe --count 5
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pool_core::clock::SystemClock;
use pool_core::session::SessionHandle;
use pool_driver_mock::SimulatedPool;
use pool_sense::config::{PoolSenseConfig, DEFAULT_CONFIG_PATH};
use pool_sense::producer::{ProducerSettings, ReadingProducer, TickOutcome};
use pool_sense::storage::JsonFileStore;
use pool_sense::{logging, sensor, PoolSenseService};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "pool-sense")]
#[command(about = "Pool leak tester for the MS5837 depth sensor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the reading producer and HTTP API until Ctrl+C
    Serve {
        /// Configuration file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Skip the hardware sensor and serve simulated readings
        #[arg(long)]
        simulate: bool,

        /// Override the configured HTTP port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Initialize the sensor and print compensated readings
    Probe {
        /// Configuration file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Number of readings to print
        #[arg(long, default_value = "5")]
        count: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            simulate,
            port,
        } => serve(config, simulate, port).await,
        Commands::Probe { config, count } => probe(config, count).await,
    }
}

fn load_config(path: &Path) -> Result<PoolSenseConfig> {
    let config = PoolSenseConfig::load_from(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
    logging::init_from_config(&config).map_err(|e| anyhow::anyhow!(e))?;
    Ok(config)
}

async fn serve(config_path: PathBuf, simulate: bool, port: Option<u16>) -> Result<()> {
    let mut config = load_config(&config_path)?;
    if let Some(port) = port {
        config.server.port = port;
    }

    info!(
        config = %config_path.display(),
        simulate,
        data_dir = %config.storage.data_dir.display(),
        "Starting {}",
        config.application.name
    );

    let port = sensor::open(&config.sensor, simulate);
    let store = Arc::new(JsonFileStore::new(config.storage.data_dir.clone()));
    let service = PoolSenseService::start(&config, port, Arc::new(SystemClock), store).await?;

    println!("🌊 PoolSense listening on http://{}", service.local_addr());
    println!("   Press Ctrl+C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    service.shutdown().await;
    Ok(())
}

async fn probe(config_path: PathBuf, count: u32) -> Result<()> {
    let config = load_config(&config_path)?;
    let port = sensor::open(&config.sensor, false);
    println!("🔧 Probing {}", port.describe());

    let settings = ProducerSettings::from(&config.sensor);
    let mut producer = ReadingProducer::new(
        port,
        SessionHandle::default(),
        Arc::new(SystemClock),
        settings,
        SimulatedPool::noiseless(),
    );

    let calibration = producer
        .initialize()
        .await
        .context("Sensor initialization failed")?;
    println!("   PROM: {:?}", calibration.words());
    println!();

    for n in 1..=count {
        match producer.tick().await {
            TickOutcome::Reading { reading, .. } => println!(
                "{:>3}  {:>9.2} mbar  {:>6.2} °C  {:>8.1} mm{}",
                n,
                reading.pressure_mbar,
                reading.temperature_c,
                reading.depth_mm,
                if reading.is_simulated() { "  (simulated)" } else { "" }
            ),
            TickOutcome::Skipped(err) => eprintln!("{:>3}  ❌ {}", n, err),
        }
        if n < count {
            tokio::time::sleep(settings.sample_interval).await;
        }
    }
    Ok(())
}
