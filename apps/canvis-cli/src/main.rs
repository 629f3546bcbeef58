use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use can_dispatch::{
    ChannelSink, DispatchMetrics, EngineConfig, LogSink, MessageProcessor, OpenedInterfaces,
};
use can_transport as can;
use can_transport::CanBus;
use signal_db::{self as sdb, MessageDef, SignalDatabase, SignalValue, SignalValues};

#[derive(Parser, Debug)]
#[command(
    name = "canvis",
    version,
    about = "CAN signal decode/encode and multi-interface monitor",
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Backend {
    Mock,
    Slcan,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load and validate a signal database, then list its messages
    DbCheck {
        /// Descriptor file (.yaml/.yml/.json) or a directory of them
        #[arg(long)]
        db: PathBuf,
        /// Also list every signal
        #[arg(long, action = ArgAction::SetTrue)]
        signals: bool,
    },
    /// Decode one frame payload and print the signals as JSON
    Decode {
        #[arg(long)]
        db: PathBuf,
        /// Frame id, hex with 0x prefix or decimal (e.g., 0x0CF00400)
        #[arg(long)]
        id: String,
        /// Data bytes as hex, space-separated (e.g., "00 00 00 40 1F 00 00 00")
        #[arg(long, value_delimiter = ' ')]
        data: Vec<String>,
        /// Print numbers even where a signal has value labels
        #[arg(long, action = ArgAction::SetTrue)]
        raw: bool,
    },
    /// Encode signal values into a payload
    Encode {
        #[arg(long)]
        db: PathBuf,
        #[arg(long, conflicts_with = "message", required_unless_present = "message")]
        id: Option<String>,
        /// Message name instead of id
        #[arg(long)]
        message: Option<String>,
        /// Signal assignment NAME=VALUE; VALUE may be a number or a choice label
        #[arg(long = "set", value_name = "NAME=VALUE")]
        set: Vec<String>,
    },
    /// Run the engine and print events as JSON lines
    Monitor {
        /// Engine configuration file
        #[arg(long)]
        config: PathBuf,
        /// Exit after this many events
        #[arg(long)]
        count: Option<u64>,
        /// Drive every receiving mock interface with simulated traffic
        #[arg(long, action = ArgAction::SetTrue)]
        simulate: bool,
        /// Print Prometheus metrics to stderr on exit
        #[arg(long, action = ArgAction::SetTrue)]
        metrics: bool,
    },
    /// Encode values and transmit once on a configured interface
    Send {
        #[arg(long)]
        config: PathBuf,
        /// Interface name from the configuration
        #[arg(long)]
        interface: String,
        #[arg(long, conflicts_with = "message", required_unless_present = "message")]
        id: Option<String>,
        #[arg(long)]
        message: Option<String>,
        #[arg(long = "set", value_name = "NAME=VALUE")]
        set: Vec<String>,
    },
    /// List available CAN interfaces
    CanList {
        /// Backend to query
        #[arg(long, value_enum, default_value_t = Backend::Mock)]
        backend: Backend,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::DbCheck { db, signals } => db_check(&db, signals),
        Commands::Decode { db, id, data, raw } => decode_frame(&db, &id, &data, raw),
        Commands::Encode {
            db,
            id,
            message,
            set,
        } => encode_frame(&db, id.as_deref(), message.as_deref(), &set),
        Commands::Monitor {
            config,
            count,
            simulate,
            metrics,
        } => monitor(&config, count, simulate, metrics).await,
        Commands::Send {
            config,
            interface,
            id,
            message,
            set,
        } => send_once(&config, &interface, id.as_deref(), message.as_deref(), &set),
        Commands::CanList { backend } => can_list_backend(backend),
    }
}

fn setup_tracing() {
    // Best-effort; avoid panics if already set
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_db(path: &Path) -> Result<SignalDatabase> {
    let db = if path.is_dir() {
        sdb::load_database_dir(path)?
    } else {
        sdb::load_database_file(path)?
    };
    Ok(db)
}

fn db_check(path: &Path, signals: bool) -> Result<()> {
    let db = load_db(path)?;
    for msg in db.messages() {
        println!(
            "0x{:X}\t{}\tlen={}\t{}\tsignals={}",
            msg.frame_id,
            msg.name,
            msg.byte_length,
            if msg.is_extended() { "ext" } else { "std" },
            msg.signals.len()
        );
        if signals {
            for s in &msg.signals {
                println!(
                    "\t{}\tbits={}+{}\t{:?}\tscale={}\toffset={}\t{}",
                    s.name,
                    s.start_bit,
                    s.bit_length,
                    s.byte_order,
                    s.scale,
                    s.offset,
                    s.unit.as_deref().unwrap_or("")
                );
            }
        }
    }
    println!("ok: {} messages", db.len());
    Ok(())
}

fn decode_frame(path: &Path, id_str: &str, data_hex: &[String], raw: bool) -> Result<()> {
    let db = load_db(path)?;
    let id = parse_id(id_str)?;
    let bytes = parse_hex_bytes(data_hex)?;
    let msg = db
        .lookup(id, true)
        .ok_or_else(|| anyhow!("no message for id 0x{id:X}"))?;
    let signals = sdb::decode_values(msg, &bytes, !raw)?;
    let out = serde_json::json!({
        "frame_id": id,
        "message": msg.name,
        "signals": signals,
    });
    println!("{}", serde_json::to_string(&out)?);
    Ok(())
}

fn encode_frame(
    path: &Path,
    id_str: Option<&str>,
    message: Option<&str>,
    assignments: &[String],
) -> Result<()> {
    let db = load_db(path)?;
    let msg = select_message(&db, id_str, message)?;
    let values = parse_assignments(assignments)?;
    let payload = sdb::encode_values(msg, &values)?;
    let id = msg
        .can_id()
        .ok_or_else(|| anyhow!("message {} has an invalid id", msg.name))?;
    let frame =
        can::CanFrame::new(id, &payload).ok_or_else(|| anyhow!("invalid frame length"))?;
    print_frame(&frame);
    Ok(())
}

async fn monitor(config: &Path, count: Option<u64>, simulate: bool, metrics: bool) -> Result<()> {
    let cfg = EngineConfig::load(config)?;
    let db = Arc::new(cfg.load_database()?);
    let OpenedInterfaces {
        registry,
        mock_handles,
        skipped,
    } = cfg.open_interfaces()?;
    for (name, reason) in &skipped {
        warn!(interface = %name, %reason, "not monitored");
    }
    let receivers: Vec<String> = registry.receivers().map(|e| e.name().to_string()).collect();
    if receivers.is_empty() {
        return Err(anyhow!("no receiving interface could be opened"));
    }

    let (sink, mut events) = ChannelSink::new();
    let processor = Arc::new(
        MessageProcessor::new(Arc::clone(&db), registry, Arc::new(sink))
            .with_options(cfg.processor)
            .with_metrics(DispatchMetrics::new()?),
    );
    let running = processor.start()?;

    let stop = Arc::new(AtomicBool::new(false));
    let mut simulators = Vec::new();
    if simulate {
        for name in &receivers {
            if let Some(handle) = mock_handles.get(name) {
                let sim = can_dispatch::Simulator::new(&db, handle.clone());
                simulators.push(sim.spawn(Arc::clone(&stop))?);
            }
        }
        if simulators.is_empty() {
            warn!("--simulate: no receiving mock interface to drive");
        }
    }
    info!(interfaces = ?receivers, simulators = simulators.len(), "monitoring");

    let mut seen = 0u64;
    loop {
        tokio::select! {
            ev = events.recv() => {
                let Some(ev) = ev else { break };
                println!("{}", serde_json::to_string(&ev)?);
                seen += 1;
                if count.is_some_and(|c| seen >= c) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    stop.store(true, Ordering::Release);
    tokio::task::spawn_blocking(move || {
        for s in simulators {
            let _ = s.join();
        }
    })
    .await?;
    running.shutdown().await;

    if metrics {
        if let Some(m) = processor.metrics() {
            eprint!("{}", m.encode_text());
        }
    }
    Ok(())
}

fn send_once(
    config: &Path,
    interface: &str,
    id_str: Option<&str>,
    message: Option<&str>,
    assignments: &[String],
) -> Result<()> {
    let cfg = EngineConfig::load(config)?;
    let db = Arc::new(cfg.load_database()?);
    let opened = cfg.open_interfaces()?;
    let processor = MessageProcessor::new(Arc::clone(&db), opened.registry, Arc::new(LogSink))
        .with_options(cfg.processor);
    let values = parse_assignments(assignments)?;
    let name = select_message(&db, id_str, message)?.name.clone();
    processor
        .send_by_name(interface, &name, &values)
        .with_context(|| format!("sending {name} on {interface}"))?;
    info!(interface, message = %name, "sent");
    Ok(())
}

fn can_list_backend(backend: Backend) -> Result<()> {
    match backend {
        Backend::Mock => {
            for bus in can::MockBus::list()? {
                println!("{}\t{}", bus.name, bus.driver);
            }
        }
        #[cfg(feature = "slcan")]
        Backend::Slcan => {
            for bus in can::SlcanBus::list()? {
                println!("{}\t{}", bus.name, bus.driver);
            }
        }
        #[cfg(not(feature = "slcan"))]
        Backend::Slcan => return Err(anyhow!("built without the slcan feature")),
    }
    Ok(())
}

fn select_message<'a>(
    db: &'a SignalDatabase,
    id_str: Option<&str>,
    name: Option<&str>,
) -> Result<&'a MessageDef> {
    match (id_str, name) {
        (Some(s), _) => {
            let id = parse_id(s)?;
            db.message_by_id(id)
                .ok_or_else(|| anyhow!("no message for id 0x{id:X}"))
        }
        (None, Some(n)) => db
            .message_by_name(n)
            .ok_or_else(|| anyhow!("no message named {n}")),
        (None, None) => Err(anyhow!("either --id or --message is required")),
    }
}

fn parse_id(s: &str) -> Result<u32> {
    sdb::parse_frame_id(s).ok_or_else(|| anyhow!("invalid frame id: {s}"))
}

fn parse_hex_bytes(items: &[String]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(items.len());
    for s in items.iter().filter(|s| !s.trim().is_empty()) {
        let t = s.trim();
        let no_prefix = t.strip_prefix("0x").unwrap_or(t);
        let b = u8::from_str_radix(no_prefix, 16)
            .map_err(|e| anyhow!("invalid hex byte '{t}': {e}"))?;
        out.push(b);
    }
    Ok(out)
}

/// `NAME=VALUE` pairs; values that do not parse as numbers are taken as labels.
fn parse_assignments(items: &[String]) -> Result<SignalValues> {
    let mut out = SignalValues::new();
    for item in items {
        let (name, value) = item
            .split_once('=')
            .ok_or_else(|| anyhow!("expected NAME=VALUE, got '{item}'"))?;
        let value = value.trim();
        let value = match value.parse::<f64>() {
            Ok(v) => SignalValue::Physical(v),
            Err(_) => SignalValue::Label(value.to_string()),
        };
        out.insert(name.trim().to_string(), value);
    }
    Ok(out)
}

fn print_frame(f: &can::CanFrame) {
    let ts = f.timestamp.map(|t| t.rfc3339()).unwrap_or_default();
    println!(
        "{id}\tlen={len}\t{data}\t{ts}",
        id = f.id,
        len = f.len,
        data = f.data_hex(),
        ts = ts
    );
}
