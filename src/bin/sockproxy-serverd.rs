//! Process bootstrap for `sockproxy-core` (SPEC_FULL.md §1 "Crate
//! framing"): CLI parsing, config file merge, logging init, then wiring of
//! the three threads the library itself only describes (§5) — this binary
//! contains no protocol logic, only the glue.

use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;

use clap::Parser;
use mio::net::UnixListener;
use mio::{Poll, Token, Waker};
use tracing::{error, info};

use sockproxy_core::config::{Config, ConfigError};
use sockproxy_core::{dispatcher, handle_watcher, net_mux, Core};

/// Reserved waker token, mirrored from `dispatcher`'s own reservation.
const WAKER_TOKEN: Token = Token(usize::MAX);

#[derive(Debug, Parser)]
#[command(name = "sockproxy-serverd", about = "Socket-proxy core server")]
struct Cli {
    /// Optional TOML config file; CLI flags below override its fields.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Filesystem path of the root listener clients first connect to.
    #[arg(long)]
    listen_path: Option<PathBuf>,

    /// Buffers to pre-warm into the pool at startup.
    #[arg(long)]
    buffer_pool_prewarm: Option<usize>,

    /// Log level (trace/debug/info/warn/error).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON instead of human-readable text.
    #[arg(long)]
    log_json: bool,
}

fn resolve_config(cli: &Cli) -> Result<Config, ConfigError> {
    let mut config = Config::default();
    if let Some(path) = &cli.config {
        let file = Config::load_file(path)?;
        config = config.merge_file(file);
    }
    if let Some(p) = &cli.listen_path {
        config.listen_path = p.clone();
    }
    if let Some(n) = cli.buffer_pool_prewarm {
        config.buffer_pool_prewarm = n;
    }
    if let Some(level) = &cli.log_level {
        config.log.level = level.clone();
    }
    if cli.log_json {
        config.log.json = true;
    }
    Ok(config)
}

fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_new(&config.log.level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if config.log.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn main() {
    let cli = Cli::parse();
    let config = match resolve_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("sockproxy-serverd: {e}");
            std::process::exit(1);
        }
    };
    init_logging(&config);

    if let Err(e) = run(config) {
        error!(target: "sockproxy_core::bootstrap", error = %e, "server exited with error");
        std::process::exit(1);
    }
}

fn run(config: Config) -> std::io::Result<()> {
    if config.listen_path.exists() {
        std::fs::remove_file(&config.listen_path)?;
    }
    let listener = UnixListener::bind(&config.listen_path)?;
    info!(target: "sockproxy_core::bootstrap", path = %config.listen_path.display(), "listening");

    let rio_poll = Poll::new()?;
    let net_poll = Poll::new()?;
    let handle_poll = Poll::new()?;

    let runner_waker = Arc::new(Waker::new(rio_poll.registry(), WAKER_TOKEN)?);

    let net_registry = net_poll.registry().try_clone()?;
    let handle_registry = handle_poll.registry().try_clone()?;
    let rio_registry = rio_poll.registry().try_clone()?;

    let (job_tx, job_rx) = mpsc::channel();

    let net_waker = runner_waker.clone();
    let net_job_tx = job_tx.clone();
    std::thread::Builder::new()
        .name("sockproxy-net-mux".to_string())
        .spawn(move || net_mux::run(net_poll, net_job_tx, net_waker))?;

    let handle_waker = runner_waker.clone();
    let handle_job_tx = job_tx.clone();
    std::thread::Builder::new()
        .name("sockproxy-handle-watcher".to_string())
        .spawn(move || handle_watcher::run(handle_poll, handle_job_tx, handle_waker))?;

    let core = Core::new(config, net_registry, handle_registry, rio_registry);
    dispatcher::run(core, rio_poll, listener, job_rx);
    Ok(())
}
