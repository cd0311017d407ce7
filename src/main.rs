//! perfpinger - concurrent ICMP echo probing with throughput reporting.
//!
//! This is the command-line interface for the perfpinger library.

use anyhow::Result;
use clap::Parser;
use perfpinger::hosts::{read_host_file, resolve_hosts};
use perfpinger::socket::utils::{has_non_root_capability, is_root};
use perfpinger::{AggregateReport, Pinger, PingerConfig, PingerError, ProbeEvent, SocketMode};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// Get the version string for perfpinger
fn get_version() -> &'static str {
    if cfg!(debug_assertions) {
        concat!(env!("CARGO_PKG_VERSION"), "-UNRELEASED")
    } else {
        env!("CARGO_PKG_VERSION")
    }
}

/// Command-line arguments for the pinger.
#[derive(Parser, Debug)]
#[clap(author, version = get_version(), about = "Concurrent ICMP echo probing with throughput reporting", long_about = None)]
struct Args {
    /// File listing one host per line (blank lines and # comments are ignored)
    hostfile: PathBuf,

    /// Payload size of each echo request in bytes
    size: usize,

    /// Interval between requests to each host in milliseconds
    interval_ms: u64,

    /// Socket mode to use (raw, dgram); by default raw is tried first
    #[clap(long, value_enum)]
    socket_mode: Option<SocketModeArg>,

    /// Stop waiting for unfinished hosts this long after the interrupt
    #[clap(long)]
    shutdown_grace_ms: Option<u64>,

    /// Output the final statistics in JSON format
    #[clap(long)]
    json: bool,

    /// Enable verbose logging on stderr (-v info, -vv debug, -vvv trace)
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum SocketModeArg {
    Raw,
    Dgram,
}

impl From<SocketModeArg> for SocketMode {
    fn from(arg: SocketModeArg) -> Self {
        match arg {
            SocketModeArg::Raw => SocketMode::Raw,
            SocketModeArg::Dgram => SocketMode::Dgram,
        }
    }
}

/// JSON output structure for one host
#[derive(Debug, serde::Serialize)]
struct JsonTarget {
    address: String,
    identifier: u16,
    send_count: u64,
    receive_count: u64,
    loss_percent: f64,
    failure: Option<String>,
}

/// JSON output structure for the whole run
#[derive(Debug, serde::Serialize)]
struct JsonOutput {
    version: String,
    payload_size: usize,
    interval_ms: u64,
    elapsed_secs: f64,
    total_send_count: u64,
    total_receive_count: u64,
    throughput_kbps: f64,
    missing_reports: usize,
    targets: Vec<JsonTarget>,
}

fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(async_main(args)) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Log to stderr; `RUST_LOG` takes precedence over `-v`
fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn async_main(args: Args) -> Result<()> {
    let mut builder = PingerConfig::builder()
        .payload_size(args.size)
        .interval(Duration::from_millis(args.interval_ms));
    if let Some(mode) = args.socket_mode {
        builder = builder.socket_mode(mode.into());
    }
    if let Some(grace_ms) = args.shutdown_grace_ms {
        builder = builder.shutdown_grace(Duration::from_millis(grace_ms));
    }
    let config = builder
        .build()
        .unwrap_or_else(|msg| exit_with_error(PingerError::ConfigError(msg)));

    let hosts = read_host_file(&args.hostfile).unwrap_or_else(|e| exit_with_error(e));
    let addresses = resolve_hosts(&hosts)
        .await
        .unwrap_or_else(|e| exit_with_error(e));
    tracing::info!(hosts = addresses.len(), "Host list loaded");

    let pinger = Pinger::new(config).unwrap_or_else(|e| exit_with_error(e));

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_events(events_rx, args.json));

    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for interrupt, stopping");
        }
    };

    let report = match pinger.run(&addresses, events_tx, interrupt).await {
        Ok(report) => report,
        Err(e) => exit_with_error(e),
    };
    // All senders are gone once the sessions have ended
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "Status line printer failed");
    }

    if args.json {
        display_json_report(&report, pinger.config())?;
    } else {
        println!();
        println!("{}", report);
    }
    Ok(())
}

/// Print status lines as sessions publish them
async fn print_events(mut events: mpsc::UnboundedReceiver<ProbeEvent>, quiet: bool) {
    while let Some(event) = events.recv().await {
        if !quiet {
            println!("{}", event);
        }
    }
}

fn exit_with_error(err: PingerError) -> ! {
    match err {
        PingerError::InsufficientPermissions {
            required,
            suggestion,
        } => {
            eprintln!("Error: Insufficient permissions");
            eprintln!("Required: {}", required);
            eprintln!("Suggestion: {}", suggestion);
            if !is_root() && has_non_root_capability() {
                eprintln!("\nUnprivileged datagram sockets may work: retry with --socket-mode dgram");
            }
        }
        PingerError::NotImplemented { feature } => {
            eprintln!("Error: {} is not yet implemented", feature);
        }
        PingerError::Ipv6NotSupported => {
            eprintln!("Error: IPv6 targets are not supported");
            eprintln!("Please list IPv4 addresses or hostnames that resolve to IPv4.");
        }
        PingerError::ResolutionError(msg) => {
            eprintln!("Error: Failed to resolve {}", msg);
            eprintln!("Please check the host list and your network connection.");
        }
        PingerError::ConfigError(msg) => {
            eprintln!("Error: Invalid configuration - {}", msg);
            eprintln!("Run 'perfpinger --help' for usage information.");
        }
        e => eprintln!("Error: {}", e),
    }
    std::process::exit(1);
}

/// Display the final statistics in JSON format
fn display_json_report(report: &AggregateReport, config: &PingerConfig) -> Result<()> {
    let output = JsonOutput {
        version: get_version().to_string(),
        payload_size: report.payload_size,
        interval_ms: config.interval.as_millis() as u64,
        elapsed_secs: report.elapsed.as_secs_f64(),
        total_send_count: report.total_send_count,
        total_receive_count: report.total_receive_count,
        throughput_kbps: report.throughput_kbps(),
        missing_reports: report.missing_reports,
        targets: report
            .sessions
            .iter()
            .map(|s| JsonTarget {
                address: s.address.to_string(),
                identifier: s.identifier,
                send_count: s.send_count,
                receive_count: s.receive_count,
                loss_percent: s.loss_percent(),
                failure: s.failure.clone(),
            })
            .collect(),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
