//! Deck host entry point.
//!
//! Starts the plugin communication broker: socket server, settings
//! persistence, process supervision and the application presence monitor.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use deck_core::SettingsStore;
use deck_host::server::{self, DEFAULT_PORT, HostConfig};
use deck_types::PluginDescriptor;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Deck host - plugin communication broker for the virtual button grid
#[derive(Parser, Debug)]
#[command(name = "deck-host")]
#[command(version, about, long_about = None)]
struct Args {
    /// Listen port (0 picks an ephemeral port)
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Settings file location (defaults to the platform data directory)
    #[arg(long, value_name = "PATH")]
    settings_path: Option<PathBuf>,

    /// JSON file with the installed plugin descriptors
    #[arg(long, value_name = "PATH")]
    plugins: Option<PathBuf>,

    /// Presence monitor poll interval in milliseconds
    #[arg(long, default_value_t = 2000)]
    presence_interval_ms: u64,

    /// Do not spawn plugin executables; expect external connections
    #[arg(long)]
    no_spawn: bool,
}

/// Set up logging with file output for debugging.
/// In debug builds, defaults to debug level and logs to timestamped file.
/// In release builds, defaults to info level and logs to stderr.
fn setup_logging() {
    let default_level = if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("deck={default_level}")));

    if cfg!(debug_assertions) {
        let temp_dir = std::env::temp_dir();
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let log_filename = format!("deck-host-{timestamp}.log");
        let log_path = temp_dir.join(&log_filename);

        #[cfg(unix)]
        {
            let symlink_path = temp_dir.join("deck-host.log");
            let _ = std::fs::remove_file(&symlink_path);
            let _ = std::os::unix::fs::symlink(&log_path, &symlink_path);
        }

        let file_appender = tracing_appender::rolling::never(&temp_dir, &log_filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        std::mem::forget(guard);

        let file_layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_line_number(true);

        let stderr_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(file_layer)
            .with(stderr_layer)
            .with(filter)
            .init();

        eprintln!("Logging to: {} (and stderr)", log_path.display());
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}

fn load_plugins(path: &Path) -> anyhow::Result<Vec<PluginDescriptor>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    setup_logging();

    info!("Starting deck host...");

    let plugins = match &args.plugins {
        Some(path) => load_plugins(path)?,
        None => Vec::new(),
    };
    info!("Loaded {} plugin descriptor(s)", plugins.len());

    let config = HostConfig {
        port: args.port,
        settings_path: args
            .settings_path
            .unwrap_or_else(SettingsStore::default_path),
        plugins,
        presence_interval: Duration::from_millis(args.presence_interval_ms),
        launch_plugins: !args.no_spawn,
    };

    server::run(config).await?;

    info!("Deck host stopped");
    Ok(())
}
