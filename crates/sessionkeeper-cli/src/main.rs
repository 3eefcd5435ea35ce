//! sessionkeeper - command line front end for the token lifecycle manager.
//!
//! Builds one `TokenManager` over the on-disk token store, then runs a single
//! command against it (inspect status, import or refresh tokens, manage
//! sessions, or watch the proactive refresh happen).

mod cli;
mod commands;
mod secret;
mod settings;

use std::io;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sessionkeeper_core::{FileBackend, TokenManager};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::Cli;
use secret::StorageSecret;
use settings::Settings;

/// Log file name prefix inside `--log-dir`
const LOG_FILE_PREFIX: &str = "sessionkeeper.log";

/// Initialize the tracing subscriber for logging.
///
/// The returned guard flushes the log file on drop and must live until exit.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=sessionkeeper_core=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_dir.as_deref());
    info!("sessionkeeper starting");

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(url) = cli.api_url {
        settings.core.api_base_url = url;
    }
    if let Some(dir) = cli.data_dir {
        settings.data_dir = Some(dir);
    }
    if settings.core.enable_secure_storage && !settings.explicit_secret {
        settings.core.storage_secret = StorageSecret::resolve(&settings.core.storage_secret);
    }

    let data_dir = settings.data_dir()?;
    debug!(data_dir = %data_dir.display(), api = %settings.core.api_base_url, "Settings loaded");
    let backend = FileBackend::new(&data_dir)
        .with_context(|| format!("Failed to open token storage at {}", data_dir.display()))?;

    let manager = TokenManager::builder(settings.core)
        .backend(Arc::new(backend))
        .build()
        .context("Failed to set up token manager")?;
    manager.initialize().await;

    let result = commands::run(cli.command, &manager).await;

    info!("sessionkeeper shutting down");
    result
}
