//! Service configuration.
//!
//! Loaded from a YAML file; every section and field is optional and falls
//! back to the defaults below. Command-line flags override file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Default MQTT broker address.
pub const DEFAULT_MQTT_URL: &str = "mqtt://127.0.0.1:1883";
/// Default subscription covering every device topic.
pub const DEFAULT_TOPIC_FILTER: &str = "ind/#";
/// Default HTTP listen address.
pub const DEFAULT_LISTEN: &str = ":9090";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mqtt: MqttConfig,
    pub http: HttpConfig,
    pub roster: RosterConfig,
    /// Log level used when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mqtt: MqttConfig::default(),
            http: HttpConfig::default(),
            roster: RosterConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

/// MQTT broker connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker address, `mqtt://[user:pass@]host[:port]`.
    pub url: String,
    /// Client id; random when empty.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub client_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub password: String,
    /// Keep-alive in seconds.
    pub keep_alive: u16,
    /// Subscription re-issued on every connect.
    pub topic_filter: String,
    /// How long startup waits for the first ConnAck before continuing.
    pub connect_timeout_secs: u64,
    /// Delay between reconnection attempts.
    pub retry_delay_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_MQTT_URL.to_string(),
            client_id: String::new(),
            username: String::new(),
            password: String::new(),
            keep_alive: 20,
            topic_filter: DEFAULT_TOPIC_FILTER.to_string(),
            connect_timeout_secs: 30,
            retry_delay_secs: 3,
        }
    }
}

impl MqttConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

/// HTTP query API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Listen address; `:port` binds all interfaces.
    pub listen: String,
    /// Allowed CORS origin; any origin when empty.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub cors_origin: String,
    /// Token required on API requests; no check when empty.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub api_token: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            cors_origin: String::new(),
            api_token: String::new(),
        }
    }
}

/// Device roster source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RosterConfig {
    /// YAML or JSON file listing `{imei, veloId}` rows.
    pub path: PathBuf,
}

impl Config {
    /// Loads the configuration from a YAML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Parses YAML configuration text.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }
}
