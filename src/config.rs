//! Configuration loading and defaults.
//!
//! Configuration is resolved in order of precedence (highest wins):
//!
//! 1. **Environment variables**: `SMSGATE_LISTEN`, `SMSGATE_MODEM_DEVICE`,
//!    `SMSGATE_OUTGOING_DIR`
//! 2. **Config file**: path via `--config <path>`, or `smsgate.toml` in CWD
//! 3. **Compiled defaults**: see each field's default value below
//!
//! The TOML file mirrors the struct hierarchy:
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:5000"
//!
//! [auth.users]
//! alice = "secret"
//!
//! [spool]
//! outgoing_dir = "/var/spool/sms/outgoing"
//! sent_dir = "/var/spool/sms/sent"
//! prefix = "httpapi_"
//!
//! [modem]
//! device = "/dev/ttyUSB3"
//! # lock_file = "/var/lock/LCK..ttyUSB3"     # derived from device when omitted
//! lock_timeout_secs = 20
//! read_timeout_ms = 1000
//! reset_command = "/opt/httpapi/reset_modem.sh"
//! reset_timestamp_path = "../modem_last_reset"
//! min_reset_interval_secs = 300
//!
//! [smsd]
//! pid_file = "/var/run/smstools/smsd.pid"
//!
//! # Optional per-user destination allow-lists. Users without an entry may
//! # send anywhere.
//! [permissions]
//! alice = ["15551234567"]
//!
//! [logging]
//! level = "info"
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub spool: SpoolConfig,
    #[serde(default)]
    pub modem: ModemConfig,
    #[serde(default)]
    pub smsd: SmsdConfig,
    /// Destination allow-lists keyed by username.
    #[serde(default)]
    pub permissions: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind (default `0.0.0.0:5000`).
    #[serde(default = "default_listen")]
    pub listen: String,
}

/// Basic-auth credentials.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Username → password. An empty table rejects every authenticated route.
    #[serde(default)]
    pub users: HashMap<String, String>,
}

/// Outbound queue layout shared with smsd.
#[derive(Debug, Clone, Deserialize)]
pub struct SpoolConfig {
    /// Directory smsd picks new messages up from.
    #[serde(default = "default_outgoing_dir")]
    pub outgoing_dir: PathBuf,
    /// Directory smsd moves delivered messages into.
    #[serde(default = "default_sent_dir")]
    pub sent_dir: PathBuf,
    /// File name prefix for spooled messages.
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

/// Serial device and reset governor settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ModemConfig {
    /// AT command port (default `/dev/ttyUSB3`).
    #[serde(default = "default_device")]
    pub device: PathBuf,
    /// Lock file guarding the device. Defaults to `/var/lock/LCK..<device name>`.
    pub lock_file: Option<PathBuf>,
    /// Maximum wait for the device lock in seconds (default 20).
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,
    /// Per-line read deadline in milliseconds (default 1000).
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Executable spawned to reset the modem.
    #[serde(default = "default_reset_command")]
    pub reset_command: PathBuf,
    /// File holding the epoch seconds of the last reset.
    #[serde(default = "default_reset_timestamp_path")]
    pub reset_timestamp_path: PathBuf,
    /// Minimum seconds between two resets (default 300).
    #[serde(default = "default_min_reset_interval_secs")]
    pub min_reset_interval_secs: u64,
}

/// smsd process settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SmsdConfig {
    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter level (default `info`). Overridden by `RUST_LOG` env var.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_listen() -> String {
    "0.0.0.0:5000".to_string()
}
fn default_outgoing_dir() -> PathBuf {
    PathBuf::from("/var/spool/sms/outgoing")
}
fn default_sent_dir() -> PathBuf {
    PathBuf::from("/var/spool/sms/sent")
}
fn default_prefix() -> String {
    "httpapi_".to_string()
}
fn default_device() -> PathBuf {
    PathBuf::from("/dev/ttyUSB3")
}
fn default_lock_timeout_secs() -> u64 {
    20
}
fn default_read_timeout_ms() -> u64 {
    1000
}
fn default_reset_command() -> PathBuf {
    PathBuf::from("/opt/httpapi/reset_modem.sh")
}
fn default_reset_timestamp_path() -> PathBuf {
    PathBuf::from("../modem_last_reset")
}
fn default_min_reset_interval_secs() -> u64 {
    300
}
fn default_pid_file() -> PathBuf {
    PathBuf::from("/var/run/smstools/smsd.pid")
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self {
            outgoing_dir: default_outgoing_dir(),
            sent_dir: default_sent_dir(),
            prefix: default_prefix(),
        }
    }
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            lock_file: None,
            lock_timeout_secs: default_lock_timeout_secs(),
            read_timeout_ms: default_read_timeout_ms(),
            reset_command: default_reset_command(),
            reset_timestamp_path: default_reset_timestamp_path(),
            min_reset_interval_secs: default_min_reset_interval_secs(),
        }
    }
}

impl Default for SmsdConfig {
    fn default() -> Self {
        Self {
            pid_file: default_pid_file(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ModemConfig {
    /// Lock file path, deriving the UUCP-style `LCK..<name>` when unset.
    pub fn lock_path(&self) -> PathBuf {
        if let Some(ref p) = self.lock_file {
            return p.clone();
        }
        let name = self
            .device
            .file_name()
            .map_or_else(|| "modem".into(), |n| n.to_string_lossy());
        PathBuf::from(format!("/var/lock/LCK..{name}"))
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Error raised while reading or parsing the config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

impl Config {
    /// Load configuration with the precedence chain: env vars > file > defaults.
    ///
    /// If `path` is `Some`, reads that file. Otherwise looks for
    /// `smsgate.toml` in the current directory, falling back to compiled
    /// defaults.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new("smsgate.toml").exists() => Self::from_file("smsgate.toml")?,
            None => Config::default(),
        };

        // Env var overrides
        if let Ok(listen) = std::env::var("SMSGATE_LISTEN") {
            config.server.listen = listen;
        }
        if let Ok(device) = std::env::var("SMSGATE_MODEM_DEVICE") {
            config.modem.device = PathBuf::from(device);
        }
        if let Ok(dir) = std::env::var("SMSGATE_OUTGOING_DIR") {
            config.spool.outgoing_dir = PathBuf::from(dir);
        }

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    /// Parse a TOML document into a config.
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
