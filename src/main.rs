//! spin-echo: a single-threaded TCP echo server
//!
//! Accepts connections on a configured address, reads whatever bytes a
//! client sends, and writes the same bytes back. All sockets are
//! non-blocking and driven by one busy-polling loop; there is no thread
//! pool and no readiness facility.
//!
//! Features:
//! - Fixed connection capacity (also used as the listen backlog)
//! - Half-duplex per-connection state machine (read, then drain the echo)
//! - Configuration via CLI arguments or TOML file

mod config;
mod runtime;

use config::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        max_clients = config.max_clients,
        buffer_size = config.buffer_size,
        "Starting spin-echo server"
    );

    // Setup failures propagate as a non-zero exit; the serve loop itself
    // never returns in normal operation.
    runtime::run(&config)?;
    Ok(())
}
