use courier_core::config::PushConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io")]
    Io,
    #[error("parse")]
    Parse,
    #[error("validation {0}")]
    Validation(String),
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PushdConfig {
    pub redis: RedisConfig,
    pub postgres: PostgresConfig,
    pub bus: BusConfig,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub push: PushConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PostgresConfig {
    pub dsn: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BusConfig {
    #[serde(default = "default_stream")]
    pub stream: String,
    #[serde(default = "default_group")]
    pub group: String,
    pub consumer: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub endpoints: Vec<String>,
    #[serde(default = "default_gateway_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_prometheus_addr")]
    pub prometheus_addr: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            bind_addr: default_bind_addr(),
            prometheus_addr: default_prometheus_addr(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
}

fn default_stream() -> String {
    "courier:to_push".to_string()
}

fn default_group() -> String {
    "courier-push".to_string()
}

fn default_gateway_timeout_ms() -> u64 {
    5000
}

fn default_bind_addr() -> String {
    "127.0.0.1:9170".to_string()
}

fn default_prometheus_addr() -> String {
    "127.0.0.1:9171".to_string()
}

impl PushdConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.redis.url.trim().is_empty() {
            return Err(ConfigError::Validation("redis_url".to_string()));
        }
        if self.postgres.dsn.trim().is_empty() {
            return Err(ConfigError::Validation("postgres_dsn".to_string()));
        }
        if self.bus.consumer.trim().is_empty() {
            return Err(ConfigError::Validation("bus_consumer".to_string()));
        }
        if self.gateway.endpoints.is_empty() {
            return Err(ConfigError::Validation("gateway_endpoints".to_string()));
        }
        if self.gateway.timeout_ms == 0 {
            return Err(ConfigError::Validation("gateway_timeout".to_string()));
        }
        self.bind_addr()?;
        self.prometheus_addr()?;
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.api
            .bind_addr
            .parse()
            .map_err(|_| ConfigError::Validation("api_bind_addr".to_string()))
    }

    pub fn prometheus_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.api
            .prometheus_addr
            .parse()
            .map_err(|_| ConfigError::Validation("prometheus_addr".to_string()))
    }
}

pub fn load_config(path: &Path) -> Result<PushdConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|_| ConfigError::Io)?;
    let parsed: PushdConfig = toml::from_str(&content).map_err(|_| ConfigError::Parse)?;
    parsed.validate()?;
    Ok(parsed)
}
