use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::fs;

use super::{ConfigError, cli::must_exist_file};
use crate::gateway::{GATEWAY_PORT, PRODUCTION_HOST, SANDBOX_HOST};
use crate::notification::DEFAULT_RETRY_BUDGET;
use crate::wire_protocol::FrameFormat;

// -----------------------------------------------------------------------------
// ----- Defaults --------------------------------------------------------------

pub const DEFAULT_POOL_SIZE: usize = 5;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(150);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// -----------------------------------------------------------------------------
// ----- ApnsConfig ------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct ApnsConfig {
    pub gateway: GatewaySettings,
    pub pool: PoolSettings,
}

#[derive(Clone, Debug)]
pub struct GatewaySettings {
    pub host: String,
    pub port: u16,
    pub pem_file: PathBuf,
    pub passphrase: SecretString,
    pub ca_file: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolSettings {
    pub size: usize,
    pub read_timeout: Duration,
    pub connect_timeout: Option<Duration>,
    pub idle_timeout: Option<Duration>,
    pub retries: u32,
    pub frame_format: FrameFormat,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            size: DEFAULT_POOL_SIZE,
            read_timeout: DEFAULT_READ_TIMEOUT,
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            idle_timeout: None,
            retries: DEFAULT_RETRY_BUDGET,
            frame_format: FrameFormat::Enhanced,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- ApnsConfig: Static ----------------------------------------------------

impl ApnsConfig {
    /// Production gateway with default pool settings.
    pub fn new(pem_file: impl Into<PathBuf>, passphrase: impl Into<String>) -> Self {
        Self {
            gateway: GatewaySettings {
                host: PRODUCTION_HOST.to_string(),
                port: GATEWAY_PORT,
                pem_file: pem_file.into(),
                passphrase: SecretString::new(passphrase.into().into_boxed_str()),
                ca_file: None,
            },
            pool: PoolSettings::default(),
        }
    }

    /// Reads and validates a TOML file. Relative paths inside it resolve
    /// against the file's directory.
    pub async fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        let mut cfg = Self::parse(&raw)?;
        if let Some(base) = path.parent() {
            cfg.gateway.pem_file = resolve(base, &cfg.gateway.pem_file);
            cfg.gateway.ca_file = cfg.gateway.ca_file.map(|ca| resolve(base, &ca));
        }

        must_exist_file(&cfg.gateway.pem_file, "[gateway].pem_file")?;
        if let Some(ca) = &cfg.gateway.ca_file {
            must_exist_file(ca, "[gateway].ca_file")?;
        }

        Ok(cfg)
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let doc: ConfigFile = toml::from_str(raw).map_err(|e| ConfigError::Toml { source: e })?;

        let host = doc.gateway.host.unwrap_or_else(|| {
            if doc.gateway.sandbox {
                SANDBOX_HOST.to_string()
            } else {
                PRODUCTION_HOST.to_string()
            }
        });

        let defaults = PoolSettings::default();
        let pool = doc.pool.unwrap_or_default();

        let cfg = Self {
            gateway: GatewaySettings {
                host,
                port: doc.gateway.port.unwrap_or(GATEWAY_PORT),
                pem_file: doc.gateway.pem_file,
                passphrase: SecretString::new(
                    doc.gateway.passphrase.unwrap_or_default().into_boxed_str(),
                ),
                ca_file: doc.gateway.ca_file,
            },
            pool: PoolSettings {
                size: pool.size.unwrap_or(defaults.size),
                read_timeout: pool.read_timeout.unwrap_or(defaults.read_timeout),
                connect_timeout: pool.connect_timeout.or(defaults.connect_timeout),
                idle_timeout: pool.idle_timeout,
                retries: pool.retries.unwrap_or(defaults.retries),
                frame_format: pool.frame_format.unwrap_or(defaults.frame_format),
            },
        };

        cfg.validate()?;
        Ok(cfg)
    }
}

// -----------------------------------------------------------------------------
// ----- ApnsConfig: Builder ---------------------------------------------------

impl ApnsConfig {
    pub fn sandbox(mut self) -> Self {
        self.gateway.host = SANDBOX_HOST.to_string();
        self
    }

    pub fn with_gateway(mut self, host: impl Into<String>, port: u16) -> Self {
        self.gateway.host = host.into();
        self.gateway.port = port;
        self
    }

    pub fn with_ca_file(mut self, ca_file: impl Into<PathBuf>) -> Self {
        self.gateway.ca_file = Some(ca_file.into());
        self
    }

    pub fn with_passphrase(mut self, passphrase: SecretString) -> Self {
        self.gateway.passphrase = passphrase;
        self
    }

    pub fn with_pool(mut self, pool: PoolSettings) -> Self {
        self.pool = pool;
        self
    }
}

// -----------------------------------------------------------------------------
// ----- ApnsConfig: Public ----------------------------------------------------

impl ApnsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway.host.trim().is_empty() {
            return Err(ConfigError::InvalidHost("empty host".into()));
        }
        if self.gateway.port == 0 {
            return Err(invalid("gateway.port", "must be non-zero"));
        }
        if self.gateway.pem_file.as_os_str().is_empty() {
            return Err(invalid("gateway.pem_file", "must be set"));
        }
        if self.pool.size == 0 {
            return Err(invalid("pool.size", "must be at least 1"));
        }
        if self.pool.retries == 0 {
            return Err(invalid("pool.retries", "must be at least 1"));
        }
        if self.pool.read_timeout.is_zero() {
            return Err(invalid("pool.read_timeout", "must be non-zero"));
        }
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// ----- GatewaySettings -------------------------------------------------------

impl GatewaySettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn passphrase_exposed(&self) -> &str {
        self.passphrase.expose_secret()
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: On-disk format ----------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    gateway: GatewayFile,

    #[serde(default)]
    pool: Option<PoolFile>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GatewayFile {
    #[serde(default)]
    sandbox: bool,

    #[serde(default)]
    host: Option<String>,

    #[serde(default)]
    port: Option<u16>,

    pem_file: PathBuf,

    #[serde(default)]
    passphrase: Option<String>,

    #[serde(default)]
    ca_file: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PoolFile {
    #[serde(default)]
    size: Option<usize>,

    #[serde(default, deserialize_with = "de_duration")]
    read_timeout: Option<Duration>,

    #[serde(default, deserialize_with = "de_duration")]
    connect_timeout: Option<Duration>,

    #[serde(default, deserialize_with = "de_duration")]
    idle_timeout: Option<Duration>,

    #[serde(default)]
    retries: Option<u32>,

    #[serde(default)]
    frame_format: Option<FrameFormat>,
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidField {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Human-readable durations: "150ms", "10s", "5m".
fn de_duration<'de, D>(d: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let Some(raw) = Option::<String>::deserialize(d)? else {
        return Ok(None);
    };

    humantime::parse_duration(&raw)
        .map(Some)
        .map_err(|e| D::Error::custom(format!("{raw:?}: {e}")))
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn minimal_file_gets_defaults() {
        let cfg = ApnsConfig::parse(
            r#"
            [gateway]
            pem_file = "apns.pem"
        "#,
        )
        .unwrap();

        assert_eq!(cfg.gateway.host, PRODUCTION_HOST);
        assert_eq!(cfg.gateway.address(), "gateway.push.apple.com:2195");
        assert_eq!(cfg.gateway.passphrase_exposed(), "");
        assert_eq!(cfg.pool, PoolSettings::default());
        assert_eq!(cfg.pool.read_timeout, Duration::from_millis(150));
        assert_eq!(cfg.pool.retries, 3);
    }

    #[test]
    fn sandbox_picks_sandbox_host() {
        let cfg = ApnsConfig::parse(
            r#"
            [gateway]
            sandbox = true
            pem_file = "apns.pem"
        "#,
        )
        .unwrap();
        assert_eq!(cfg.gateway.address(), "gateway.sandbox.push.apple.com:2195");
    }

    #[test]
    fn full_file() {
        let cfg = ApnsConfig::parse(
            r#"
            [gateway]
            sandbox = true
            host = "127.0.0.1"
            port = 12195
            pem_file = "/etc/apns.pem"
            passphrase = "hunter2"
            ca_file = "roots.pem"

            [pool]
            size = 2
            read_timeout = "250ms"
            connect_timeout = "3s"
            idle_timeout = "5m"
            retries = 5
            frame_format = "itemized"
        "#,
        )
        .unwrap();

        assert_eq!(cfg.gateway.address(), "127.0.0.1:12195");
        assert_eq!(cfg.gateway.passphrase_exposed(), "hunter2");
        assert_eq!(cfg.gateway.ca_file, Some(PathBuf::from("roots.pem")));
        assert_eq!(
            cfg.pool,
            PoolSettings {
                size: 2,
                read_timeout: Duration::from_millis(250),
                connect_timeout: Some(Duration::from_secs(3)),
                idle_timeout: Some(Duration::from_secs(300)),
                retries: 5,
                frame_format: FrameFormat::Itemized,
            }
        );
    }

    #[test]
    fn rejects_invalid_values() {
        let cases = [
            ("[gateway]\npem_file = \"a.pem\"\nport = 0", "gateway.port"),
            ("[gateway]\npem_file = \"a.pem\"\n[pool]\nsize = 0", "pool.size"),
            ("[gateway]\npem_file = \"a.pem\"\n[pool]\nretries = 0", "pool.retries"),
        ];

        for (raw, expected) in cases {
            match ApnsConfig::parse(raw).unwrap_err() {
                ConfigError::InvalidField { field, .. } => assert_eq!(field, expected),
                other => panic!("expected InvalidField for {expected}, got {other:?}"),
            }
        }
    }

    #[test]
    fn rejects_bad_duration_and_unknown_keys() {
        let bad_duration = "[gateway]\npem_file = \"a.pem\"\n[pool]\nread_timeout = \"soon\"";
        let err = ApnsConfig::parse(bad_duration).unwrap_err();
        assert!(matches!(err, ConfigError::Toml { .. }));

        let err = ApnsConfig::parse("[gateway]\npem_file = \"a.pem\"\nprot = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Toml { .. }));
    }

    #[tokio::test]
    async fn from_file_resolves_relative_pem_and_checks_it_exists() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("apns.pem"), b"pem").unwrap();

        let config_path = dir.path().join("apnscrab.toml");
        std::fs::write(&config_path, "[gateway]\npem_file = \"apns.pem\"\n").unwrap();

        let cfg = ApnsConfig::from_file(&config_path).await.unwrap();
        assert_eq!(cfg.gateway.pem_file, dir.path().join("apns.pem"));

        std::fs::write(&config_path, "[gateway]\npem_file = \"missing.pem\"\n").unwrap();
        let err = ApnsConfig::from_file(&config_path).await.unwrap_err();
        assert!(matches!(err, ConfigError::MissingFile { .. }));
    }

    #[tokio::test]
    async fn unreadable_file_is_io_error() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[gateway]\n").unwrap();
        let path = file.path().to_path_buf();
        drop(file);

        let err = ApnsConfig::from_file(&path).await.unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn builder_overrides() {
        let cfg = ApnsConfig::new("apns.pem", "pw")
            .sandbox()
            .with_ca_file("roots.pem");
        assert_eq!(cfg.gateway.host, SANDBOX_HOST);
        assert_eq!(cfg.gateway.ca_file, Some(PathBuf::from("roots.pem")));

        let cfg = cfg.with_gateway("localhost", 2196);
        assert_eq!(cfg.gateway.address(), "localhost:2196");
        assert!(cfg.validate().is_ok());
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
