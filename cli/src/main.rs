// beacon-cli — Desktop companion for the beacon engine
//
// Decode advertisements, estimate distances, run the mock generator and replay
// recorded scan logs through a real scan session, all without a phone.

mod config;

use anyhow::{Context, Result};
use beacon_core::{
    estimate_distance, export_json_pretty, AdvertisementParser, BeaconListener, BeaconRecord,
    BeaconRegistry, Capability, MockBeaconGenerator, ScanError, ScanPlatform, ScanSession,
    UNKNOWN_DISTANCE,
};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(name = "beacon-cli")]
#[command(about = "Bluetooth LE proximity beacon toolkit", long_about = None)]
#[command(version)]
struct Cli {
    /// Log engine activity at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode one raw advertisement (hex)
    Parse {
        hex: String,
        #[arg(short, long, default_value = "00:00:00:00:00:00")]
        address: String,
        #[arg(short, long, default_value_t = -60, allow_hyphen_values = true)]
        rssi: i32,
    },
    /// Estimate distance from RSSI and calibrated 1 m power
    Distance {
        #[arg(allow_hyphen_values = true)]
        rssi: i32,
        #[arg(allow_hyphen_values = true)]
        tx_power: i32,
    },
    /// Run the mock beacon generator
    Simulate {
        #[arg(short, long, default_value = "5")]
        count: u32,
        #[arg(short, long, default_value = "15")]
        seconds: u64,
        /// Print snapshots as export JSON
        #[arg(long)]
        json: bool,
    },
    /// Feed a recorded scan log through a scan session
    Replay {
        /// Lines of `address,rssi,hex`; `#` starts a comment
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Configure settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Show,
    Set { key: String, value: String },
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    // A broken config file must not block `config reset`
    let config = config::Config::load();
    let log_dir = config.as_ref().ok().and_then(|c| c.log_dir.clone());
    let _log_guard = init_tracing(cli.verbose, log_dir.as_deref());

    match cli.command {
        Commands::Parse { hex, address, rssi } => cmd_parse(&hex, address, rssi),
        Commands::Distance { rssi, tx_power } => cmd_distance(rssi, tx_power),
        Commands::Simulate {
            count,
            seconds,
            json,
        } => cmd_simulate(config?, count, seconds, json).await,
        Commands::Replay { file, json } => cmd_replay(config?, file, json).await,
        Commands::Config { action } => cmd_config(config, action),
    }
}

fn init_tracing(verbose: bool, log_dir: Option<&str>) -> Option<WorkerGuard> {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "beacon-cli.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            None
        }
    }
}

// ============================================================================
// PARSE / DISTANCE
// ============================================================================

fn cmd_parse(hex_payload: &str, address: String, rssi: i32) -> Result<()> {
    let data = decode_hex(hex_payload)?;

    match AdvertisementParser::parse(&data) {
        Some(advertisement) => {
            let record = BeaconRecord::from_advertisement(
                address,
                rssi,
                advertisement,
                beacon_core::ble::beacon::now_ms(),
            );
            print_record(&record);
        }
        None => println!("{} ({} bytes)", "Not a beacon".yellow(), data.len()),
    }

    Ok(())
}

fn cmd_distance(rssi: i32, tx_power: i32) -> Result<()> {
    let distance = estimate_distance(rssi, tx_power);
    if distance == UNKNOWN_DISTANCE {
        println!("{}", "Distance unknown".yellow());
    } else {
        println!("{} {:.2} m", "≈".green(), distance);
    }
    Ok(())
}

// ============================================================================
// SIMULATE / REPLAY
// ============================================================================

/// Listener events forwarded to the printing loop
enum Update {
    Beacons(Vec<BeaconRecord>),
    Started,
    Stopped,
    Error(ScanError),
}

struct ChannelListener {
    tx: mpsc::UnboundedSender<Update>,
}

impl ChannelListener {
    fn send(&self, update: Update) {
        // Receiver gone means the command is shutting down
        let _ = self.tx.send(update);
    }
}

impl BeaconListener for ChannelListener {
    fn on_beacons_changed(&self, beacons: Vec<BeaconRecord>) {
        self.send(Update::Beacons(beacons));
    }

    fn on_scan_started(&self) {
        self.send(Update::Started);
    }

    fn on_scan_stopped(&self) {
        self.send(Update::Stopped);
    }

    fn on_error(&self, error: ScanError) {
        self.send(Update::Error(error));
    }
}

async fn cmd_simulate(
    config: config::Config,
    count: u32,
    seconds: u64,
    json: bool,
) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let registry = Arc::new(BeaconRegistry::new());
    let generator = MockBeaconGenerator::with_parts(
        config.mock,
        registry,
        Arc::new(ChannelListener { tx }),
        Handle::current(),
    )
    .context("Failed to create mock generator")?;

    generator
        .start_generating(count)
        .context("Failed to start mock generator")?;

    let deadline = tokio::time::sleep(Duration::from_secs(seconds));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            Some(update) = rx.recv() => render(update, json)?,
        }
    }

    generator.stop_generating();
    while let Ok(update) = rx.try_recv() {
        render(update, json)?;
    }
    Ok(())
}

/// Always-ready radio whose results come from a log file
#[derive(Default)]
struct ReplayPlatform {
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl ScanPlatform for ReplayPlatform {
    fn is_ble_supported(&self) -> bool {
        true
    }

    fn has_scan_permission(&self) -> bool {
        true
    }

    fn is_adapter_enabled(&self) -> bool {
        true
    }

    fn request_capability(&self, capability: Capability) {
        tracing::warn!("Replay platform asked for {}", capability);
    }

    fn start_scan(&self) -> Result<(), ScanError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop_scan(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

async fn cmd_replay(config: config::Config, file: PathBuf, json: bool) -> Result<()> {
    let contents = std::fs::read_to_string(&file)
        .with_context(|| format!("Failed to read scan log {}", file.display()))?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let session = ScanSession::with_parts(
        config.scan,
        Arc::new(ReplayPlatform::default()),
        Arc::new(ChannelListener { tx }),
        Arc::new(BeaconRegistry::new()),
        Handle::current(),
    )
    .context("Failed to create scan session")?;

    session.start().context("Failed to start scan session")?;

    let mut delivered = 0usize;
    let mut malformed = 0usize;
    for (index, line) in contents.lines().enumerate() {
        match parse_scan_line(line) {
            Ok(Some((address, rssi, data))) => {
                session.on_advertisement(address, rssi, data);
                delivered += 1;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Skipping line {}: {:#}", index + 1, e);
                malformed += 1;
            }
        }
    }

    let snapshot = session.snapshot();
    session.stop();

    while let Ok(update) = rx.try_recv() {
        if let Update::Error(error) = update {
            println!("{} {}", "✗".red(), error);
        }
    }

    if json {
        println!("{}", export_json_pretty(&snapshot)?);
    } else {
        println!(
            "{} {} results replayed, {} malformed lines skipped",
            "✓".green(),
            delivered,
            malformed
        );
        println!();
        print_table(&snapshot);
    }
    Ok(())
}

/// `address,rssi,hex`; blank lines and `#` comments yield `None`
fn parse_scan_line(line: &str) -> Result<Option<(String, i32, Vec<u8>)>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut fields = line.splitn(3, ',').map(str::trim);
    let address = fields.next().context("Missing address")?;
    let rssi = fields
        .next()
        .context("Missing RSSI")?
        .parse::<i32>()
        .context("Invalid RSSI")?;
    let data = decode_hex(fields.next().context("Missing payload")?)?;

    Ok(Some((address.to_string(), rssi, data)))
}

fn decode_hex(input: &str) -> Result<Vec<u8>> {
    let cleaned: String = input
        .trim()
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != '-')
        .collect();
    hex::decode(&cleaned).context("Invalid hex payload")
}

// ============================================================================
// CONFIG
// ============================================================================

fn cmd_config(config: Result<config::Config>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = config?;
            println!("{}", "Configuration".bold());
            println!("  {}", config::Config::config_file()?.display().to_string().dimmed());
            println!();

            for (key, value) in config.list() {
                println!("  {:<30} {}", key.bright_cyan(), value);
            }
        }

        ConfigAction::Set { key, value } => {
            let mut config = config?;
            config.set(&key, &value)?;
            println!("{} Set {} = {}", "✓".green(), key.bright_cyan(), value);
        }

        ConfigAction::Reset => {
            config::Config::reset()?;
            println!("{} Configuration reset to defaults", "✓".green());
        }
    }

    Ok(())
}

// ============================================================================
// OUTPUT
// ============================================================================

fn render(update: Update, json: bool) -> Result<()> {
    match update {
        Update::Beacons(beacons) if json => println!("{}", export_json_pretty(&beacons)?),
        Update::Beacons(beacons) => {
            print_table(&beacons);
            println!();
        }
        Update::Started if !json => println!("{} Generator started", "✓".green()),
        Update::Stopped if !json => println!("{} Generator stopped", "✓".green()),
        Update::Error(error) => eprintln!("{} {}", "✗".red(), error),
        _ => {}
    }
    Ok(())
}

fn print_table(beacons: &[BeaconRecord]) {
    if beacons.is_empty() {
        println!("{}", "No beacons in range.".dimmed());
        return;
    }

    println!("{} ({} nearby)", "Beacons".bold(), beacons.len());
    for beacon in beacons {
        println!(
            "  {} {}  {:>4} dBm  {:>8} m  {:<9} {:>5}/{:<5} {}",
            "•".bright_green(),
            beacon.mac_address.bright_cyan(),
            beacon.rssi,
            beacon.distance_label(),
            beacon.kind.as_str(),
            beacon.major,
            beacon.minor,
            beacon.uuid.dimmed()
        );
    }
}

fn print_record(record: &BeaconRecord) {
    println!("{}", "Beacon".bold());
    println!("  Type:     {}", record.kind.as_str().bright_green());
    println!("  UUID:     {}", record.uuid.bright_yellow());
    println!("  Major:    {}", record.major);
    println!("  Minor:    {}", record.minor);
    println!("  TX power: {} dBm", record.tx_power);
    println!("  RSSI:     {} dBm", record.rssi);
    println!("  Distance: {} m", record.distance_label());
    if let Some(name) = &record.name {
        println!("  Name:     {}", name.bright_cyan());
    }
    println!("  Address:  {}", record.mac_address);
    println!("  Seen:     {}", format_timestamp(record.last_seen_at_ms));
}

fn format_timestamp(timestamp_ms: u64) -> String {
    use chrono::{DateTime, Local, Utc};

    let dt = DateTime::from_timestamp_millis(timestamp_ms as i64).unwrap_or_else(Utc::now);
    let local: DateTime<Local> = dt.into();

    local.format("%Y-%m-%d %H:%M:%S").to_string()
}
