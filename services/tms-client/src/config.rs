//! Configuration types for the TMS client

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default = "default_alerts")]
    pub alerts: Vec<AlertConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            channel: ChannelConfig::default(),
            alerts: default_alerts(),
        }
    }
}

/// Backend endpoint settings for the resolver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the local development backend
    #[serde(default = "default_local_url")]
    pub local_url: String,
    /// Base URL of the deployed backend
    #[serde(default = "default_deployed_url")]
    pub deployed_url: String,
    /// Host name that counts as local development
    #[serde(default = "default_local_host")]
    pub local_host: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            local_url: default_local_url(),
            deployed_url: default_deployed_url(),
            local_host: default_local_host(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

/// Notification channel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// WebSocket URL of the notification feed
    #[serde(default = "default_channel_url")]
    pub url: String,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_seconds: u64,
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_seconds: u64,
    /// History window requested by `fetch_notifications`
    #[serde(default = "default_history_hours")]
    pub history_hours: u32,
    #[serde(default = "default_history_limit")]
    pub history_limit: u32,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: default_channel_url(),
            heartbeat_interval_seconds: default_heartbeat_interval(),
            connection_timeout_seconds: default_connection_timeout(),
            history_hours: default_history_hours(),
            history_limit: default_history_limit(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Configuration for automatic reconnection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Enable automatic reconnection when the feed drops
    #[serde(default = "default_reconnect_enabled")]
    pub enabled: bool,
    /// Backoff before the first retry, doubled per failed attempt
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_seconds: u64,
    /// Cap on the doubled backoff
    #[serde(default = "default_max_backoff")]
    pub max_backoff_seconds: u64,
    /// Maximum number of reconnection attempts (None for unlimited)
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: default_reconnect_enabled(),
            initial_backoff_seconds: default_initial_backoff(),
            max_backoff_seconds: default_max_backoff(),
            max_retries: None,
        }
    }
}

/// Alert sink configuration with tagged enum for extensibility
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AlertConfig {
    #[serde(rename = "log")]
    Log,
    #[serde(rename = "webhook")]
    Webhook { url: String },
}

impl AlertConfig {
    pub fn type_name(&self) -> &str {
        match self {
            AlertConfig::Log => "log",
            AlertConfig::Webhook { .. } => "webhook",
        }
    }
}

fn default_local_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_deployed_url() -> String {
    "https://tms-backend.example.com".to_string()
}

fn default_local_host() -> String {
    "localhost".to_string()
}

fn default_request_timeout() -> u64 {
    15
}

fn default_channel_url() -> String {
    "ws://localhost:8000/ws/notifications/".to_string()
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_connection_timeout() -> u64 {
    10
}

fn default_history_hours() -> u32 {
    24
}

fn default_history_limit() -> u32 {
    20
}

fn default_reconnect_enabled() -> bool {
    true
}

fn default_initial_backoff() -> u64 {
    1
}

fn default_max_backoff() -> u64 {
    60
}

fn default_alerts() -> Vec<AlertConfig> {
    vec![AlertConfig::Log]
}

/// Load configuration from a JSON file
pub fn load_config(path: &Path) -> crate::Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        crate::TmsError::Config(format!("Failed to read config file {:?}: {}", path, e))
    })?;
    let config: Config = serde_json::from_str(&content)?;
    Ok(config)
}
