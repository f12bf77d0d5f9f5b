//! # Promised Socket Server - Main Entry Point
//!
//! Demo socket server whose event handlers return futures; the
//! handler-wrapping middleware bridges their settlement back to the
//! client's acknowledgment callback.
//!
//! ```bash
//! # Run with default configuration
//! promised_server
//!
//! # Override specific settings
//! promised_server --bind 0.0.0.0:8090 --log-level debug --json-logs
//! ```
//!
//! Configuration is loaded from a TOML file (default: `config.toml`); a
//! default file is created when none exists.

use tracing::error;

mod app;
mod cli;
mod config;
mod logging;
mod transport;

use app::Application;
use cli::CliArgs;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    let application = match Application::new(args).await {
        Ok(application) => application,
        Err(err) => {
            eprintln!("failed to start: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = application.run().await {
        error!("❌ Server exited with error: {err}");
        std::process::exit(1);
    }
}
