//! ndisproc Daemon - Main entry point
//!
//! Loads the configured adapters, registers their endpoints, and serves the
//! namespace over HTTP.

mod api;
mod config;
mod hangcheck;
mod server;
mod sim;
mod state;

use anyhow::Result;
use clap::Parser;
use ndisproc_procfs::{DebugLevel, PAGE_SIZE, ROOT_NAME};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "ndisprocd")]
#[command(about = "Per-device telemetry and settings endpoints for wrapped NDIS adapters")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "ndisprocd.toml")]
    config: PathBuf,

    /// Bind address for the endpoint server
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Render every endpoint once and exit
    #[arg(long)]
    dump: bool,

    /// Write an example configuration to this path and exit
    #[arg(long)]
    example_config: Option<PathBuf>,
}

fn filter_for(level: LevelFilter) -> EnvFilter {
    EnvFilter::default().add_directive(level.into())
}

/// Log level in effect at debug level `n`
fn verbosity(base: LevelFilter, n: u32) -> LevelFilter {
    match n {
        0 => base,
        1 => base.max(LevelFilter::DEBUG),
        _ => LevelFilter::TRACE,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let base = LevelFilter::from_level(level);

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter_for(base))
        .with_target(true)
        .with_filter_reloading();
    let reload = builder.reload_handle();
    tracing::subscriber::set_global_default(builder.finish())?;

    info!("ndisprocd v{}", env!("CARGO_PKG_VERSION"));

    if let Some(path) = args.example_config {
        config::save_default_config(&path)?;
        info!(path = %path.display(), "Wrote example configuration");
        return Ok(());
    }

    // Load configuration
    let mut config = config::load_config(&args.config)?;

    // Override bind address if specified
    if let Some(bind) = args.bind {
        config.daemon.bind = bind;
    }

    // The debug entry raises verbosity above the configured log level
    let observer = reload.clone();
    let debug = DebugLevel::new(config.procfs.debug_level, config.procfs.debug_max)
        .with_observer(move |n| {
            if let Err(e) = observer.reload(filter_for(verbosity(base, n))) {
                warn!(error = %e, "Couldn't apply debug level");
            }
            info!(level = n, "Debug level changed");
        });
    if debug.get() > 0 {
        reload.reload(filter_for(verbosity(base, debug.get())))?;
    }

    let state = state::AppState::new(config.clone(), Arc::new(debug)).await?;

    if args.dump {
        let registry = state.registry.clone();
        let dump = tokio::task::spawn_blocking(move || {
            let mut out = String::new();
            if let Ok(read) = registry.read(ndisproc_procfs::DEBUG_ENTRY, 0, PAGE_SIZE) {
                out.push_str(&format!("== {}/debug\n{}", ROOT_NAME, read.data));
            }
            for device in registry.devices() {
                for entry in registry.entries(&device).unwrap_or_default() {
                    let path = format!("{}/{}", device, entry.name());
                    match registry.read(&path, 0, PAGE_SIZE) {
                        Ok(read) => {
                            out.push_str(&format!("== {}/{}\n{}", ROOT_NAME, path, read.data))
                        }
                        Err(e) => warn!(path = %path, error = %e, "Couldn't read entry"),
                    }
                }
            }
            out
        })
        .await?;
        print!("{}", dump);
        tokio::task::spawn_blocking(move || state.shutdown()).await?;
    } else {
        server::run(state, &config.daemon.bind).await?;
    }

    Ok(())
}
