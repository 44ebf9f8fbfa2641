//! ChainScan CLI: scan a block range of a Substrate chain for events.
//!
//! # Commands
//! ```text
//! chainscan scan --start <n> --end <n> [--endpoint <url>] [--json]
//! chainscan info
//! ```

use std::io::{IsTerminal, Write};
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};

use chainscan_core::{DecodedEvent, ParamValue, ScanProgress, ScanRequest, ScanSession, ScanUpdate};
use chainscan_observability::init_tracing;
use chainscan_substrate::{SubstrateConnector, SYSTEM_EVENTS_KEY};

mod config;

use config::ScanConfig;

#[derive(Parser)]
#[command(
    name = "chainscan",
    about = "Scan a block range of a Substrate chain and print decoded events",
    long_about = "
ChainScan CLI: connect to a Substrate node (Polkadot, Kusama, parachains),
walk a block range and decode every event with the runtime's own metadata.

Progress goes to stderr, events to stdout. Ctrl-C cancels the scan.

ENVIRONMENT VARIABLES:
  RUST_LOG    Log filter, overrides the config file (e.g. chainscan_substrate=debug)
",
    version
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// YAML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan blocks start..=end and print their events
    Scan {
        /// Node WebSocket endpoint (default: config file, then wss://rpc.polkadot.io)
        #[arg(long)]
        endpoint: Option<String>,
        /// First block to scan
        #[arg(long)]
        start: u64,
        /// Last block to scan (clamped to the chain head)
        #[arg(long)]
        end: u64,
        /// Output events as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Show defaults and capabilities
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ScanConfig::load(cli.config.as_deref())?;
    if cli.verbose {
        config.log.level = "debug".into();
    }
    init_tracing(&config.log);

    match cli.command {
        Commands::Scan {
            endpoint,
            start,
            end,
            json,
        } => {
            if let Some(endpoint) = endpoint {
                config.endpoint = endpoint;
            }
            cmd_scan(&config, start, end, json).await
        }

        Commands::Info => cmd_info(&config),
    }
}

// ─── Command implementations ─────────────────────────────────────────────────

async fn cmd_scan(config: &ScanConfig, start: u64, end: u64, as_json: bool) -> Result<()> {
    let connector = SubstrateConnector::new(config.connection());
    let mut session = ScanSession::new(connector, config.session());
    let mut stream = session
        .run(ScanRequest::new(config.endpoint.clone(), start, end))
        .context("cannot start scan")?;

    let show_progress = std::io::stderr().is_terminal();
    let mut stdout = std::io::stdout();
    let mut printed = 0usize;
    let mut cancelled = false;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let update = tokio::select! {
            update = stream.next_update() => update,
            _ = &mut ctrl_c, if !cancelled => {
                tracing::warn!("interrupted, cancelling scan");
                session.cancel();
                cancelled = true;
                continue;
            }
        };

        let Some(update) = update else {
            // the task went away without a terminal update
            clear_progress(show_progress);
            eprintln!("Scan cancelled after {printed} events");
            return Err(anyhow!("scan cancelled"));
        };

        match update {
            ScanUpdate::State(state) => tracing::debug!(%state, "scan state"),
            ScanUpdate::Progress(progress) => render_progress(show_progress, progress),
            ScanUpdate::Snapshot { added, .. } => {
                for event in &added {
                    print_event(&mut stdout, event, as_json)?;
                }
                printed += added.len();
            }
            ScanUpdate::Completed { events } => {
                for event in events.iter().skip(printed) {
                    print_event(&mut stdout, event, as_json)?;
                }
                clear_progress(show_progress);
                eprintln!(
                    "Scanned blocks {start}..={end} of {}: {} events",
                    config.endpoint,
                    events.len()
                );
                return Ok(());
            }
            ScanUpdate::Failed { error, delivered } => {
                clear_progress(show_progress);
                eprintln!("Scan failed after {delivered} events: {error}");
                return Err(error.into());
            }
        }
    }
}

fn render_progress(enabled: bool, progress: ScanProgress) {
    if enabled {
        eprint!("\rScanning... {progress}");
        let _ = std::io::stderr().flush();
    }
}

fn clear_progress(enabled: bool) {
    if enabled {
        eprint!("\r{:20}\r", "");
    }
}

fn print_event(out: &mut impl Write, event: &DecodedEvent, as_json: bool) -> Result<()> {
    if as_json {
        writeln!(out, "{}", serde_json::to_string(event)?)?;
        return Ok(());
    }

    let params: Vec<String> = event
        .params
        .iter()
        .map(|p| format!("{}={}", p.label, display_value(&p.value)))
        .collect();
    writeln!(
        out,
        "#{:<10} {:>4}  {:<40} {:<15} {}",
        event.block,
        event.id,
        event.name,
        event.phase.to_string(),
        params.join(" | ")
    )?;
    Ok(())
}

fn display_value(value: &ParamValue) -> String {
    match value.as_json() {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "-".to_string(),
    }
}

fn cmd_info(config: &ScanConfig) -> Result<()> {
    println!("ChainScan v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Defaults:");
    println!("  Endpoint:           {}", config.endpoint);
    println!("  Connect timeout:    {} ms", config.connect_timeout_ms);
    match config.request_timeout_ms {
        Some(ms) => println!("  Request timeout:    {ms} ms"),
        None => println!("  Request timeout:    none"),
    }
    println!("  Update buffer:      {}", config.channel_capacity);
    println!();
    println!("Capabilities:");
    println!("  ✓ WebSocket JSON-RPC        (tokio-tungstenite, rustls)");
    println!("  ✓ Runtime metadata V14/V15  (frame-metadata, scale-info)");
    println!("  ✓ Event decoding            (scale-value, per-block runtime)");
    println!("  ✓ Cancel by replacement     (one scan per session)");
    println!();
    println!("System.Events key: {SYSTEM_EVENTS_KEY}");
    Ok(())
}
