//! LoRa coverage command line tool
//!
//! Ingests gateway bridge logs into a coverage store and exports the coverage
//! of a gateway as a GeoJSON-P script.

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lora_coverage_core::{Config, DataRate, MacAddress, WorkerGuard, init_logging};
use lora_coverage_protocol::{FrameDecryptor, GeoPosition, LoRaWanDecryptor};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;

/// Command line interface for the coverage tool
#[derive(Parser)]
#[command(
    name = "lora-coverage",
    version = env!("CARGO_PKG_VERSION"),
    about = "LoRa gateway log ingestion and coverage map export",
    long_about = "Reads gateway bridge logs, decrypts geolocation uplinks with the configured session keys, stores the receptions in SQLite and exports per-gateway coverage as GeoJSON-P."
)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Log format (json, pretty)
    #[arg(long)]
    log_format: Option<String>,

    /// Structured JSON logs and JSON command output
    #[arg(long)]
    json: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
enum Commands {
    /// Ingest a gateway bridge log file
    Add {
        /// Log file, one JSON event per line
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Export coverage of one gateway and data rate as GeoJSON-P
    Geojson {
        /// Gateway MAC address, 16 hex digits
        #[arg(value_name = "GATEWAY")]
        gateway: MacAddress,

        /// Data rate label such as SF7BW125, or an FSK bit rate
        #[arg(value_name = "DATARATE")]
        data_rate: DataRate,

        /// JSONP callback name (overrides config)
        #[arg(short, long, value_name = "NAME")]
        callback: Option<String>,

        /// Output file (overrides config)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Authenticate and decrypt one base64 frame
    Decode {
        /// Base64 PHY payload as found in the `data` field
        #[arg(value_name = "WIRE")]
        wire: String,
    },

    /// Show or validate configuration
    Config {
        /// Show resolved configuration
        #[arg(short, long)]
        show: bool,

        /// Check that session keys are configured
        #[arg(short, long)]
        validate: bool,
    },
}

/// Main entry point for the coverage tool
///
/// # Errors
///
/// Returns error if configuration, the store or the requested command fails
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    apply_overrides(&mut config, &cli).context("Invalid command line options")?;
    let _guard = start_logging(&config)?;

    match cli.command {
        Commands::Add { file } => add(&config, &file, cli.json).await,
        Commands::Geojson {
            gateway,
            data_rate,
            callback,
            output,
        } => {
            geojson(
                &config,
                &gateway,
                &data_rate,
                callback.as_deref(),
                output.as_deref(),
                cli.json,
            )
            .await
        }
        Commands::Decode { wire } => decode(&config, &wire, cli.json),
        Commands::Config { show, validate } => handle_config_command(&config, show, validate),
    }
}

/// Fold command line logging flags into the loaded configuration
///
/// # Errors
///
/// Returns error if the result no longer validates
fn apply_overrides(config: &mut Config, cli: &Cli) -> lora_coverage_core::Result<()> {
    if let Some(level) = &cli.log_level {
        config.logging.level.clone_from(level);
    }
    if let Some(format) = &cli.log_format {
        config.logging.format.clone_from(format);
    }
    if cli.json {
        config.logging.format = "json".to_string();
    }
    config.validate()
}

/// Initialize logging system
///
/// # Errors
///
/// Returns error if the subscriber cannot be installed
fn start_logging(config: &Config) -> Result<Option<WorkerGuard>> {
    let guard = init_logging(&config.logging).context("Failed to initialize logging")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        log_level = config.logging.level,
        "LoRa coverage starting"
    );

    Ok(guard)
}

/// Ingest a log file and print the summary
///
/// # Errors
///
/// Returns error if keys are missing, the store is unreachable or the file
/// cannot be read
async fn add(config: &Config, file: &Path, json: bool) -> Result<()> {
    let summary = lora_coverage_ingest::ingest_file(config, file)
        .await
        .with_context(|| format!("Failed to ingest {}", file.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{summary}");
    }

    Ok(())
}

/// Export coverage to a GeoJSON-P file
///
/// # Errors
///
/// Returns error if the query or the write fails
async fn geojson(
    config: &Config,
    gateway: &MacAddress,
    data_rate: &DataRate,
    callback: Option<&str>,
    output: Option<&Path>,
    json: bool,
) -> Result<()> {
    let report =
        lora_coverage_ingest::export(config, gateway, data_rate, callback, output)
            .await
            .with_context(|| format!("Failed to export coverage of {gateway} at {data_rate}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Wrote {} points to {}",
            report.features,
            report.path.display()
        );
    }

    Ok(())
}

/// Decrypt a single frame and show its geolocation payload
///
/// # Errors
///
/// Returns error if keys are missing or the frame does not decrypt
fn decode(config: &Config, wire: &str, json: bool) -> Result<()> {
    let keys = config.session_keys()?;
    let frame = LoRaWanDecryptor
        .decrypt(wire, &keys)
        .context("Failed to decode frame")?;
    let position = GeoPosition::decode(&frame.payload);

    if json {
        let position = match &position {
            Ok(p) => json!({
                "latitude": p.latitude,
                "longitude": p.longitude,
                "power": p.power,
            }),
            Err(e) => json!({ "error": e.to_string() }),
        };
        let output = json!({
            "device": frame.dev_addr.to_string(),
            "mtype": frame.mtype.to_string(),
            "fcnt": frame.fcnt,
            "fport": frame.fport,
            "payload": hex::encode(&frame.payload),
            "position": position,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("device    {}", frame.dev_addr);
    println!("type      {}", frame.mtype);
    println!("fcnt      {}", frame.fcnt);
    println!("fport     {}", frame.fport);
    println!("payload   {}", hex::encode(&frame.payload));
    match position {
        Ok(p) => {
            let power = p.power.map_or_else(|| "absent".to_string(), |p| p.to_string());
            println!("position  {:.4}, {:.4} (power {power})", p.latitude, p.longitude);
        }
        Err(e) => println!("position  {e}"),
    }

    Ok(())
}

/// Handle configuration commands
///
/// # Errors
///
/// Returns error if keys are missing when validating, or serialization fails
fn handle_config_command(config: &Config, show: bool, validate: bool) -> Result<()> {
    if validate {
        config.session_keys()?;
        println!("Configuration is valid");
    }

    if show || !validate {
        println!("{}", lora_coverage_ingest::render_config(config)?);
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_are_validated() {
        let cli = Cli::parse_from(["lora-coverage", "--log-format", "xml", "config"]);
        let mut config = Config::default();

        assert!(apply_overrides(&mut config, &cli).is_err());
    }

    #[test]
    fn test_overrides_apply() {
        let cli = Cli::parse_from(["lora-coverage", "--log-level", "debug", "--json", "config"]);
        let mut config = Config::default();

        apply_overrides(&mut config, &cli).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
    }
}
