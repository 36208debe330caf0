//! iotree CLI - Command-line interface for the device tree
//!
//! Provides subcommands for writing a configuration and for booting a device
//! tree, tracking devices, and printing a system-wide read.

use anyhow::{Context as _, Result, bail};
use clap::{Parser, Subcommand};
use futures::future::try_join_all;
use iotree::IotSystem;
use iotree::runtime::RuntimeConfig;
use iotree::runtime::config::{load_config, write_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "iotree")]
#[command(about = "Hierarchical device registry with deadline-bounded reads", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "iotree.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a configuration file
    Init {
        /// Root path segment
        #[arg(long, default_value = "iot")]
        name: String,

        /// Group-level read deadline in milliseconds
        #[arg(long, default_value = "3000")]
        group_timeout_ms: u64,

        /// Manager-level read deadline in milliseconds
        #[arg(long, default_value = "30000")]
        manager_timeout_ms: u64,

        /// Supervisor-level read deadline in milliseconds
        #[arg(long, default_value = "60000")]
        supervisor_timeout_ms: u64,
    },

    /// Boot a device tree, track devices, and print a full read as JSON
    Run {
        /// Device to track, as `manager/group/device` or `manager/group/device=value`
        #[arg(short, long = "device", required = true)]
        devices: Vec<String>,
    },
}

/// A `--device` argument
struct DeviceSpec {
    manager_id: String,
    group_id: String,
    device_id: String,
    value: Option<f64>,
}

fn parse_device(spec: &str) -> Result<DeviceSpec> {
    let (path, value) = match spec.split_once('=') {
        Some((path, value)) => {
            let value = value
                .parse::<f64>()
                .with_context(|| format!("invalid reading in {spec:?}"))?;
            (path, Some(value))
        }
        None => (spec, None),
    };

    let segments: Vec<&str> = path.split('/').collect();
    let [manager_id, group_id, device_id] = segments.as_slice() else {
        bail!("expected manager/group/device, got {spec:?}");
    };
    if segments.iter().any(|segment| segment.is_empty()) {
        bail!("empty id in {spec:?}");
    }

    Ok(DeviceSpec {
        manager_id: manager_id.to_string(),
        group_id: group_id.to_string(),
        device_id: device_id.to_string(),
        value,
    })
}

async fn track(system: &IotSystem, spec: &DeviceSpec) -> Result<()> {
    let device = system
        .track_device(&spec.manager_id, &spec.group_id, &spec.device_id)
        .await?;
    if let Some(value) = spec.value {
        system.record(&device, value).await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init {
            name,
            group_timeout_ms,
            manager_timeout_ms,
            supervisor_timeout_ms,
        } => {
            let config = RuntimeConfig {
                name,
                group_query_timeout_ms: group_timeout_ms,
                manager_query_timeout_ms: manager_timeout_ms,
                supervisor_query_timeout_ms: supervisor_timeout_ms,
            };

            write_config(&cli.config, &config)?;
            println!("Wrote configuration to {:?}", cli.config);
        }

        Commands::Run { devices } => {
            let config = if cli.config.exists() {
                load_config(&cli.config)?
            } else {
                tracing::info!(path = ?cli.config, "no configuration file, using defaults");
                RuntimeConfig::default()
            };

            let specs = devices
                .iter()
                .map(|spec| parse_device(spec))
                .collect::<Result<Vec<_>>>()?;

            let system = IotSystem::start(config)?;
            try_join_all(specs.iter().map(|spec| track(&system, spec))).await?;

            let result = system.read_all().await?;
            println!("{}", serde_json::to_string_pretty(&result)?);

            system.shutdown().await;
        }
    }

    Ok(())
}
