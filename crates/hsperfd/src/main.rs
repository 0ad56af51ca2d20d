//! hsperfd - JVM performance counter collector daemon.
//!
//! Polls the `hsperfdata` files of running JVMs at a fixed interval and
//! writes one JSON object per process per tick.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use hsperf_core::collector::{JvmCollector, RealFs, current_user};
use hsperf_core::config::CollectorConfig;
use hsperf_core::event::Event;

/// JVM performance counter collector daemon.
#[derive(Parser, Debug)]
#[command(name = "hsperfd", about = "JVM hsperfdata collector daemon", version)]
struct Args {
    /// Collection interval in seconds.
    #[arg(short, long, default_value = "10")]
    interval: u64,

    /// Collect only this pid. Without it every JVM found is collected.
    #[arg(short, long, env = "HSPERFD_PID")]
    pid: Option<String>,

    /// Counters to re-read on every tick even if constant
    /// (e.g. sun.os.hrt.frequency). Repeatable, comma separated.
    #[arg(short, long = "force-collect", value_delimiter = ',')]
    force_collect: Vec<String>,

    /// Directory holding the hsperfdata_<user> directories.
    #[arg(long, env = "HSPERFD_TMP_DIR", default_value_os_t = std::env::temp_dir())]
    tmp_dir: PathBuf,

    /// Look the pid up in this user's directory only.
    #[arg(short, long, requires = "pid", conflicts_with = "mine")]
    user: Option<String>,

    /// Look the pid up in the current user's directory only.
    #[arg(long, requires = "pid")]
    mine: bool,

    /// Write events to this file instead of stdout.
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn collector_config(&self, fs: &RealFs) -> CollectorConfig {
        let user = if self.mine {
            let user = current_user(fs);
            if user.is_none() {
                warn!("Could not determine the current user, searching all users");
            }
            user
        } else {
            self.user.clone()
        };

        CollectorConfig {
            tmp_dir: self.tmp_dir.clone(),
            pid: self.pid.clone(),
            user,
            force_collect: self.force_collect.clone(),
        }
    }
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["hsperfd", "hsperf_core"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    // Logs go to stderr; stdout carries the events.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Line-delimited JSON writer for events.
struct EventSink<W: Write> {
    out: W,
}

impl<W: Write> EventSink<W> {
    fn new(out: W) -> Self {
        Self { out }
    }

    /// Writes one line per event and flushes. Returns the number written.
    fn write_events(&mut self, events: &[Event]) -> io::Result<usize> {
        for event in events {
            serde_json::to_writer(&mut self.out, event)?;
            self.out.write_all(b"\n")?;
        }
        self.out.flush()?;
        Ok(events.len())
    }
}

fn open_output(path: Option<&PathBuf>) -> io::Result<Box<dyn Write>> {
    match path {
        Some(path) => {
            let file = File::options().create(true).append(true).open(path)?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(BufWriter::new(io::stdout()))),
    }
}

fn main() {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    info!("hsperfd {} starting", env!("CARGO_PKG_VERSION"));

    let fs = RealFs::new();
    let config = args.collector_config(&fs);
    info!(
        "Config: interval={}s, tmp={}, pid={}, user={}, force_collect={:?}",
        args.interval,
        config.tmp_dir.display(),
        config.pid.as_deref().unwrap_or("all"),
        config.user.as_deref().unwrap_or("any"),
        config.force_collect
    );

    let out = match open_output(args.output.as_ref()) {
        Ok(out) => out,
        Err(e) => {
            error!("Failed to open output: {}", e);
            std::process::exit(1);
        }
    };
    let mut sink = EventSink::new(out);
    let mut collector = JvmCollector::new(fs, config);

    let interval = Duration::from_secs(args.interval);

    // Setup graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    let mut tick: u64 = 0;
    info!("Starting collection loop");

    while running.load(Ordering::SeqCst) {
        tick += 1;

        match collector.fetch() {
            Ok(events) => match sink.write_events(&events) {
                Ok(written) => {
                    if let Some(timing) = collector.last_timing() {
                        debug!(
                            "Tick #{}: {} events, {} errors in {:?}",
                            tick, written, timing.errors, timing.total
                        );
                    }
                }
                Err(e) => {
                    error!("Failed to write events: {}", e);
                    break;
                }
            },
            Err(e) => {
                error!("Failed to collect: {}", e);
            }
        }

        // Sleep with periodic checks for shutdown signal
        let sleep_interval = Duration::from_millis(100);
        let mut remaining = interval;
        while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
            let sleep_time = remaining.min(sleep_interval);
            std::thread::sleep(sleep_time);
            remaining = remaining.saturating_sub(sleep_time);
        }
    }

    info!("Shutting down after {} ticks", tick);
}
