use std::env;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::router::RoutingMode;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    /// Liveness probe interval in seconds (server sends ping)
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    /// Staleness threshold in seconds; twice the ping interval when unset
    #[serde(default)]
    pub pong_timeout: Option<u64>,
    /// Upper bound for a single write in milliseconds
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    /// Routing policy for this deployment
    #[serde(default)]
    pub routing_mode: RoutingMode,
    /// Send the membership announcement to newly joined peers
    #[serde(default = "default_announce_on_join")]
    pub announce_on_join: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Filter used when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_ping_interval() -> u64 {
    5 // 5 seconds
}

fn default_send_timeout_ms() -> u64 {
    5000
}

fn default_announce_on_join() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            .set_default("websocket.ping_interval", default_ping_interval())?
            .set_default("websocket.send_timeout_ms", default_send_timeout_ms())?
            .set_default("websocket.routing_mode", "unicast")?
            .set_default("websocket.announce_on_join", default_announce_on_join())?
            .set_default("log.level", default_log_level())?
            .set_default("log.format", "pretty")?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // RELAY__SERVER__PORT, RELAY__WEBSOCKET__ROUTING_MODE, ...
            .add_source(
                Environment::with_prefix("RELAY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let ws = &self.websocket;
        if ws.ping_interval == 0 {
            return Err(ConfigError::Message(
                "websocket.ping_interval must be greater than zero".to_string(),
            ));
        }
        if ws.pong_timeout() < ws.ping_interval() {
            return Err(ConfigError::Message(
                "websocket.pong_timeout must not be shorter than websocket.ping_interval"
                    .to_string(),
            ));
        }
        if ws.send_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "websocket.send_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl WebSocketConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval)
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout.unwrap_or(self.ping_interval * 2))
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            ping_interval: default_ping_interval(),
            pong_timeout: None,
            send_timeout_ms: default_send_timeout_ms(),
            routing_mode: RoutingMode::default(),
            announce_on_join: default_announce_on_join(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}
