//! config/mod.rs
//!
//! Two layers: the command line (`cli`) for the binary, and the TOML file
//! (`settings`) describing the gateway and the connection pool. Both return
//! plain values; nothing here is global.

pub mod cli;
pub mod settings;
pub mod types;

use std::path::PathBuf;

use thiserror::Error;

pub use cli::{CliConfig, NotificationArgs};
pub use settings::{ApnsConfig, GatewaySettings, PoolSettings};
pub use types::LogLevel;

// -----------------------------------------------------------------------------
// ----- Load ------------------------------------------------------------------

/// Reads the file named on the command line and applies the command-line
/// overrides on top of it.
pub async fn load(cli: &CliConfig) -> Result<ApnsConfig, ConfigError> {
    let mut cfg = ApnsConfig::from_file(&cli.config_file_location).await?;

    if let Some(passphrase) = &cli.passphrase {
        cfg.gateway.passphrase = passphrase.clone();
    }
    if let Some(format) = cli.frame_format {
        cfg.pool.frame_format = format;
    }

    Ok(cfg)
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid command line: {0}")]
    Cli(String),

    #[error("required file missing: {} (from {hint})", path.display())]
    MissingFile { path: PathBuf, hint: String },

    #[error("path is not a file: {} (from {hint})", path.display())]
    NotAFile { path: PathBuf, hint: String },

    #[error("read error for {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("toml parse error: {source}")]
    Toml { source: toml::de::Error },

    #[error("invalid or missing field '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    #[error("invalid gateway host {0}")]
    InvalidHost(String),
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
