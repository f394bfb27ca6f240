use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("montage grid must have at least one tile")]
    EmptyGrid,
    #[error("no considered classes configured")]
    NoConsideredClasses,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5555))
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_port")]
    pub port: u16,
}

fn default_http_port() -> u16 {
    8080
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: default_http_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    pub model_path: String,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default = "default_considered_classes")]
    pub considered_classes: Vec<String>,
}

fn default_confidence_threshold() -> f32 {
    0.2
}

fn default_considered_classes() -> Vec<String> {
    ["person", "car", "bus", "train", "motorcycle"]
        .into_iter()
        .map(String::from)
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MontageConfig {
    #[serde(default = "default_grid_width")]
    pub grid_width: u32,
    #[serde(default = "default_grid_height")]
    pub grid_height: u32,
    /// Incoming frames are normalized to this width; montage tiles share it.
    #[serde(default = "default_frame_width")]
    pub frame_width: u32,
    #[serde(default = "default_tile_height")]
    pub tile_height: u32,
}

fn default_grid_width() -> u32 {
    2
}

fn default_grid_height() -> u32 {
    2
}

fn default_frame_width() -> u32 {
    400
}

fn default_tile_height() -> u32 {
    300
}

impl Default for MontageConfig {
    fn default() -> Self {
        Self {
            grid_width: default_grid_width(),
            grid_height: default_grid_height(),
            frame_width: default_frame_width(),
            tile_height: default_tile_height(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LivenessConfig {
    #[serde(default = "default_check_period_secs")]
    pub check_period_secs: u64,
    #[serde(default = "default_estimated_devices")]
    pub estimated_devices: u64,
}

fn default_check_period_secs() -> u64 {
    10
}

fn default_estimated_devices() -> u64 {
    4
}

impl LivenessConfig {
    /// Devices silent for longer than this window are evicted. Scaled by the
    /// expected fleet size so round-robin senders are not dropped between turns.
    pub fn active_window(&self) -> Duration {
        Duration::from_secs(self.check_period_secs * self.estimated_devices)
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            check_period_secs: default_check_period_secs(),
            estimated_devices: default_estimated_devices(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_broker_host")]
    pub broker_host: String,
    #[serde(default = "default_broker_port")]
    pub broker_port: u16,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
}

fn default_broker_host() -> String {
    "127.0.0.1".to_string()
}

fn default_broker_port() -> u16 {
    1883
}

fn default_topic() -> String {
    "camhub/control".to_string()
}

fn default_client_id() -> String {
    "camhub".to_string()
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: default_broker_host(),
            broker_port: default_broker_port(),
            topic: default_topic(),
            client_id: default_client_id(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub http: HttpConfig,
    pub detector: DetectorConfig,
    #[serde(default)]
    pub montage: MontageConfig,
    #[serde(default)]
    pub liveness: LivenessConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;

        if config.montage.grid_width == 0 || config.montage.grid_height == 0 {
            return Err(ConfigError::EmptyGrid);
        }
        if config.detector.considered_classes.is_empty() {
            return Err(ConfigError::NoConsideredClasses);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_defaults() {
        let config = Config::from_toml("[detector]\nmodel_path = \"yolo.onnx\"\n").unwrap();
        assert_eq!(config.http.port, 8080);
        assert_eq!(config.montage.grid_width, 2);
        assert_eq!(config.montage.frame_width, 400);
        assert_eq!(config.liveness.active_window(), Duration::from_secs(40));
        assert!(config
            .detector
            .considered_classes
            .contains(&"person".to_string()));
    }

    #[test]
    fn zero_grid_is_rejected() {
        let toml = "[detector]\nmodel_path = \"yolo.onnx\"\n[montage]\ngrid_width = 0\n";
        assert!(matches!(
            Config::from_toml(toml),
            Err(ConfigError::EmptyGrid)
        ));
    }

    #[test]
    fn empty_considered_set_is_rejected() {
        let toml = "[detector]\nmodel_path = \"yolo.onnx\"\nconsidered_classes = []\n";
        assert!(matches!(
            Config::from_toml(toml),
            Err(ConfigError::NoConsideredClasses)
        ));
    }
}
