//! Configuration resolution for hookrelay.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Config file (`--config` or `~/.config/hookrelay/config.toml`)
//! 3. Environment variables
//! 4. CLI arguments (highest priority, applied by the binary)

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::queue::OverflowPolicy;

/// Complete hookrelay configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub irc: IrcConfig,
    pub reconnect: ReconnectConfig,
    pub queue: QueueConfig,
    pub delivery: DeliveryConfig,
    pub receiver: ReceiverConfig,
}

/// IRC server and identity settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IrcConfig {
    pub server: String,
    pub port: u16,
    pub tls: bool,
    pub channel: String,
    /// Channel key (`+k`), if the channel requires one.
    pub channel_key: Option<String>,
    pub nickname: String,
    /// Ident sent with `USER`. Defaults to the nickname.
    pub username: Option<String>,
    pub realname: String,
    /// Server password sent with `PASS`.
    pub password: Option<String>,
    pub handshake_timeout_secs: u64,
    pub keepalive_interval_secs: u64,
    pub keepalive_timeout_secs: u64,
    /// A single write stalled longer than this drops the connection.
    pub write_timeout_secs: u64,
}

impl Default for IrcConfig {
    fn default() -> Self {
        Self {
            server: "irc.libera.chat".to_string(),
            port: 6697,
            tls: true,
            channel: String::new(),
            channel_key: None,
            nickname: "hookrelay".to_string(),
            username: None,
            realname: "hookrelay notifier".to_string(),
            password: None,
            handshake_timeout_secs: 30,
            keepalive_interval_secs: 60,
            keepalive_timeout_secs: 180,
            write_timeout_secs: 30,
        }
    }
}

impl IrcConfig {
    pub fn username(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.nickname)
    }

    pub const fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub const fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }

    pub const fn keepalive_timeout(&self) -> Duration {
        Duration::from_secs(self.keepalive_timeout_secs)
    }

    pub const fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

/// Reconnect backoff settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub initial_delay_ms: u64,
    pub max_delay_secs: u64,
    pub multiplier: f64,
    /// Fractional jitter applied to every delay (0.2 = +/-20%).
    pub jitter: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            max_delay_secs: 60,
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

/// Message queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub capacity: usize,
    pub overflow_policy: OverflowPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            overflow_policy: OverflowPolicy::RejectNew,
        }
    }
}

/// Delivery loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub max_retries: u32,
    /// Refill interval of the line rate limiter.
    pub line_interval_ms: u64,
    /// Lines that may be sent back-to-back before the limiter kicks in.
    pub burst: u32,
    /// Longest text payload of a single `PRIVMSG`, in bytes.
    pub max_line_bytes: usize,
    pub shutdown_grace_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            line_interval_ms: 500,
            burst: 4,
            max_line_bytes: 400,
            shutdown_grace_secs: 5,
        }
    }
}

impl DeliveryConfig {
    pub const fn line_interval(&self) -> Duration {
        Duration::from_millis(self.line_interval_ms)
    }

    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Webhook receiver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    pub listen_addr: SocketAddr,
    /// Shared secret for `X-Hub-Signature-256` verification.
    pub webhook_secret: Option<String>,
    pub max_payload_bytes: usize,
    /// Number of recent delivery ids remembered for deduplication.
    pub dedup_window: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            webhook_secret: None,
            max_payload_bytes: 1024 * 1024, // 1 MiB
            dedup_window: 1024,
        }
    }
}

/// Load configuration with hierarchical resolution.
///
/// An explicit `path` must exist; the default path is only used when present.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => load_config_file(path)?,
        None => match default_config_path() {
            Some(default) if default.exists() => load_config_file(&default)?,
            _ => Config::default(),
        },
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

/// Get the default config file path (`~/.config/hookrelay/config.toml` on Linux).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("hookrelay").join("config.toml"))
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    toml::from_str(&content).map_err(|source| Error::ConfigParse {
        path: path.display().to_string(),
        source,
    })
}

/// Apply `HOOKRELAY_*` overrides. `lookup` abstracts the environment for tests.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup("HOOKRELAY_SERVER") {
        config.irc.server = val;
    }
    if let Some(val) = lookup("HOOKRELAY_PORT") {
        config.irc.port = parse_env("HOOKRELAY_PORT", &val)?;
    }
    if let Some(val) = lookup("HOOKRELAY_TLS") {
        config.irc.tls = parse_env("HOOKRELAY_TLS", &val)?;
    }
    if let Some(val) = lookup("HOOKRELAY_CHANNEL") {
        config.irc.channel = val;
    }
    if let Some(val) = lookup("HOOKRELAY_NICKNAME") {
        config.irc.nickname = val;
    }
    if let Some(val) = lookup("HOOKRELAY_IRC_PASSWORD") {
        config.irc.password = Some(val);
    }
    if let Some(val) = lookup("HOOKRELAY_QUEUE_CAPACITY") {
        config.queue.capacity = parse_env("HOOKRELAY_QUEUE_CAPACITY", &val)?;
    }
    if let Some(val) = lookup("HOOKRELAY_OVERFLOW_POLICY") {
        config.queue.overflow_policy = parse_env("HOOKRELAY_OVERFLOW_POLICY", &val)?;
    }
    if let Some(val) = lookup("HOOKRELAY_MAX_RETRIES") {
        config.delivery.max_retries = parse_env("HOOKRELAY_MAX_RETRIES", &val)?;
    }
    if let Some(val) = lookup("HOOKRELAY_WEBHOOK_SECRET") {
        config.receiver.webhook_secret = Some(val);
    }
    if let Some(val) = lookup("HOOKRELAY_LISTEN_ADDR") {
        config.receiver.listen_addr = parse_env("HOOKRELAY_LISTEN_ADDR", &val)?;
    }
    Ok(())
}

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("Invalid value for {key} ({value:?}): {e}")))
}

impl Config {
    /// Check the resolved configuration. Failing here is fatal at startup.
    pub fn validate(&self) -> Result<()> {
        let irc = &self.irc;
        if irc.server.trim().is_empty() {
            return Err(Error::Config("irc.server must not be empty".into()));
        }
        if irc.port == 0 {
            return Err(Error::Config("irc.port must not be 0".into()));
        }
        if !irc.channel.starts_with(['#', '&']) || irc.channel.len() < 2 {
            return Err(Error::Config(format!(
                "irc.channel must start with '#' or '&', got {:?}",
                irc.channel
            )));
        }
        for (field, value) in [
            ("irc.channel", Some(irc.channel.as_str())),
            ("irc.nickname", Some(irc.nickname.as_str())),
            ("irc.username", irc.username.as_deref()),
            ("irc.channel_key", irc.channel_key.as_deref()),
        ] {
            if value.is_some_and(|v| !is_irc_token(v)) {
                return Err(Error::Config(format!(
                    "{field} must be non-empty and free of spaces or control characters"
                )));
            }
        }
        if irc.realname.chars().any(char::is_control) {
            return Err(Error::Config(
                "irc.realname must not contain control characters".into(),
            ));
        }
        if irc.handshake_timeout_secs == 0 {
            return Err(Error::Config("irc.handshake_timeout_secs must be > 0".into()));
        }
        if irc.keepalive_interval_secs == 0
            || irc.keepalive_timeout_secs <= irc.keepalive_interval_secs
        {
            return Err(Error::Config(
                "irc.keepalive_timeout_secs must exceed a non-zero keepalive_interval_secs".into(),
            ));
        }
        if irc.write_timeout_secs == 0 {
            return Err(Error::Config("irc.write_timeout_secs must be > 0".into()));
        }
        if self.reconnect.initial_delay_ms == 0 || self.reconnect.max_delay_secs == 0 {
            return Err(Error::Config(
                "reconnect.initial_delay_ms and reconnect.max_delay_secs must be > 0".into(),
            ));
        }
        if self.reconnect.multiplier < 1.0 || !(0.0..1.0).contains(&self.reconnect.jitter) {
            return Err(Error::Config(
                "reconnect.multiplier must be >= 1 and reconnect.jitter in [0, 1)".into(),
            ));
        }
        if self.queue.capacity == 0 {
            return Err(Error::Config("queue.capacity must be > 0".into()));
        }
        if self.delivery.max_line_bytes < 32 {
            return Err(Error::Config("delivery.max_line_bytes must be >= 32".into()));
        }
        if self.delivery.burst == 0 {
            return Err(Error::Config("delivery.burst must be > 0".into()));
        }
        if self.receiver.dedup_window == 0 {
            return Err(Error::Config("receiver.dedup_window must be > 0".into()));
        }
        Ok(())
    }
}

fn is_irc_token(value: &str) -> bool {
    !value.is_empty()
        && !value
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || c == ',')
}
