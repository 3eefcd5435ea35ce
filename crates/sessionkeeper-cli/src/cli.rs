use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Inspect and drive the sessionkeeper token lifecycle.
#[derive(Debug, Parser)]
#[command(name = "sessionkeeper", version, about)]
pub struct Cli {
    /// Path to config.json (defaults to the platform config directory).
    #[arg(long, global = true, env = "SESSIONKEEPER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Auth API base URL, e.g. https://auth.example.com/api
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Directory holding persisted tokens and the device id.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Also write logs to a daily rolling file in this directory.
    #[arg(long, global = true, env = "SESSIONKEEPER_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show authentication state, current user and refresh schedule.
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Store a token pair obtained from sign-in.
    Import {
        #[arg(long, env = "SESSIONKEEPER_ACCESS_TOKEN", hide_env_values = true)]
        access_token: String,
        #[arg(long, env = "SESSIONKEEPER_REFRESH_TOKEN", hide_env_values = true)]
        refresh_token: String,
    },
    /// Exchange the refresh token for a new pair now.
    Refresh,
    /// List this account's sessions.
    Sessions {
        #[arg(long)]
        json: bool,
    },
    /// Terminate one session by id.
    Terminate { session_id: String },
    /// Terminate every session except this one.
    TerminateOthers,
    /// Forget the stored tokens.
    Logout,
    /// Forget the tokens and everything else in the encrypted namespace.
    Purge,
    /// Print the device id and environment fingerprint.
    Fingerprint,
    /// Keep the manager running and print lifecycle transitions.
    Watch {
        /// Stop after this many seconds.
        #[arg(long, default_value_t = 3600)]
        duration_secs: u64,
    },
}
