use clap::Parser;
use secrecy::SecretString;
use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use super::{ConfigError, types::LogLevel};
use crate::wire_protocol::FrameFormat;

// -----------------------------------------------------------------------------
// ----- CliConfig -------------------------------------------------------------

/// One invocation of the binary: where the gateway config lives and the
/// single notification to push.
#[derive(Clone, Debug)]
pub struct CliConfig {
    pub config_file_location: PathBuf,
    pub log_level: LogLevel,
    pub passphrase: Option<SecretString>,
    pub frame_format: Option<FrameFormat>,
    pub notification: NotificationArgs,
}

#[derive(Clone, Debug)]
pub struct NotificationArgs {
    pub device_token: String,
    pub alert: Option<String>,
    pub badge: Option<u32>,
    pub sound: Option<String>,
    pub expires_in: Option<Duration>,
    pub lazy: bool,
}

impl CliConfig {
    /// Parses the process arguments. Exits with usage on `--help` or a
    /// malformed command line.
    pub fn from_args() -> Result<Self, ConfigError> {
        Self::from_parsed(Args::parse())
    }

    pub fn try_parse_from<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let args = Args::try_parse_from(args).map_err(|e| ConfigError::Cli(e.to_string()))?;
        Self::from_parsed(args)
    }
}

// -----------------------------------------------------------------------------
// ----- CliConfig: Private ----------------------------------------------------

impl CliConfig {
    fn from_parsed(args: Args) -> Result<Self, ConfigError> {
        let cfg = Self {
            config_file_location: args.config_file,
            log_level: args.log_level,
            passphrase: args
                .passphrase
                .map(|p| SecretString::new(p.into_boxed_str())),
            frame_format: args.frame_format,
            notification: NotificationArgs {
                device_token: args.token,
                alert: args.alert,
                badge: args.badge,
                sound: args.sound,
                expires_in: args.expiry,
                lazy: args.lazy,
            },
        };

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        must_exist_file(&self.config_file_location, "--config / apnscrab.toml")?;

        if self.notification.device_token.trim().is_empty() {
            return Err(ConfigError::InvalidField {
                field: "token".into(),
                reason: "device token is empty".into(),
            });
        }

        Ok(())
    }
}

// -----------------------------------------------------------------------------
// ----- Args ------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "apnscrab",
    version,
    about = "Send a push notification over the APNs binary gateway"
)]
struct Args {
    // Must exist; no defaults.
    #[arg(long = "config", short = 'c', env = "APNSCRAB_CONFIG_FILE")]
    config_file: PathBuf,

    // Not required via CLI or ENV (defaults to info).
    #[arg(long = "log", default_value = "info")]
    log_level: LogLevel,

    // Overrides [gateway].passphrase from the config file.
    #[arg(
        long = "passphrase",
        env = "APNSCRAB_PASSPHRASE",
        hide_env_values = true
    )]
    passphrase: Option<String>,

    // Overrides [pool].frame_format from the config file.
    #[arg(long = "frame-format", value_enum)]
    frame_format: Option<FrameFormat>,

    // Hex device token.
    #[arg(long = "token", short = 't', env = "APNSCRAB_DEVICE_TOKEN")]
    token: String,

    #[arg(long = "alert", short = 'a')]
    alert: Option<String>,

    #[arg(long = "badge")]
    badge: Option<u32>,

    #[arg(long = "sound")]
    sound: Option<String>,

    // Relative lifetime, e.g. "1h" or "30m". Absent means no storage.
    #[arg(long = "expiry", value_parser = humantime::parse_duration)]
    expiry: Option<Duration>,

    // Power-conserving delivery priority (itemized frames only).
    #[arg(long = "lazy")]
    lazy: bool,
}

// -----------------------------------------------------------------------------
// ----- Private Utils ---------------------------------------------------------

pub(super) fn must_exist_file(path: &Path, hint: &str) -> Result<(), ConfigError> {
    let md = fs::metadata(path).map_err(|_| ConfigError::MissingFile {
        path: path.to_path_buf(),
        hint: hint.to_string(),
    })?;

    if !md.is_file() {
        return Err(ConfigError::NotAFile {
            path: path.to_path_buf(),
            hint: hint.to_string(),
        });
    }

    Ok(())
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
