use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::provider::aliyun::ALIYUN_API_BASE;
use crate::provider::cloudflare::CLOUDFLARE_API_BASE;
use crate::provider::namesilo::NAMESILO_API_BASE;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub endpoints: Endpoints,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Upper bound for each provider call, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub response_format: ResponseFormat,
}

/// Body shape returned to callers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    /// `{"status": ..., "code": ..., "msg": ...}`
    #[default]
    Object,
    /// Bare numeric code.
    Code,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            timeout_secs: default_timeout_secs(),
            response_format: ResponseFormat::default(),
        }
    }
}

impl ServerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Provider API base URLs. Overridable for regional endpoints or test doubles.
#[derive(Debug, Clone, Deserialize)]
pub struct Endpoints {
    #[serde(default = "default_aliyun")]
    pub aliyun: String,
    #[serde(default = "default_cloudflare")]
    pub cloudflare: String,
    #[serde(default = "default_namesilo")]
    pub namesilo: String,
}

fn default_aliyun() -> String {
    ALIYUN_API_BASE.to_string()
}

fn default_cloudflare() -> String {
    CLOUDFLARE_API_BASE.to_string()
}

fn default_namesilo() -> String {
    NAMESILO_API_BASE.to_string()
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            aliyun: default_aliyun(),
            cloudflare: default_cloudflare(),
            namesilo: default_namesilo(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content).with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        if config.server.timeout_secs == 0 {
            anyhow::bail!("server.timeout_secs must be greater than zero");
        }
        Ok(config)
    }
}
