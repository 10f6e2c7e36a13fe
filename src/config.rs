//! Client configuration file
//!
//! Loaded from TOML at startup. A missing or broken file never prevents the
//! client from starting: defaults are used instead and the problem is logged.

use color_eyre::eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::mqtt::codec::DEFAULT_MAX_PACKET_SIZE;
use crate::mqtt::config::ConnectParameters;

const CONFIG_DIR: &str = ".config/mqtt-session";
const CLIENT_CONFIG_FILE: &str = "client.toml";

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
        }
    }
}

impl BrokerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub client_id: String,
    pub keepalive_secs: u16,
    /// Fraction of the keepalive period after which a heartbeat is sent
    pub keepalive_coefficient: f64,
    pub subscriptions: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            client_id: "mqtt-session".to_string(),
            keepalive_secs: 60,
            keepalive_coefficient: 0.8,
            subscriptions: Vec::new(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    pub broker: BrokerConfig,
    pub session: SessionConfig,
    pub max_packet_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            session: SessionConfig::default(),
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
        }
    }
}

impl ClientConfig {
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;
        let config = toml::from_str(&content)
            .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;
        debug!("Loaded client config from {}", path.display());
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| eyre!("Failed to create config directory: {}", e))?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| eyre!("Failed to serialize client config: {}", e))?;
        tokio::fs::write(path, content)
            .await
            .map_err(|e| eyre!("Failed to write config file: {}", e))?;
        Ok(())
    }

    /// Loads the config from `path`, creating it with defaults when missing.
    /// Falls back to defaults when the file cannot be used.
    pub async fn load_or_default(path: &Path) -> Self {
        let exists = tokio::fs::try_exists(path).await.unwrap_or(false);
        if !exists {
            info!("Creating default client config at {}", path.display());
            let config = Self::default();
            if let Err(e) = config.save(path).await {
                warn!("Unable to write default config: {}", e);
            }
            return config;
        }

        match Self::load(path).await {
            Ok(config) => config,
            Err(e) => {
                warn!("{}, using defaults", e);
                Self::default()
            }
        }
    }

    pub fn connect_parameters(&self) -> Result<ConnectParameters> {
        ConnectParameters::new(
            self.session.client_id.clone(),
            self.session.keepalive_secs,
            self.session.keepalive_coefficient,
        )
        .map_err(|e| eyre!("Invalid session configuration: {}", e))
    }
}

pub fn default_config_path() -> PathBuf {
    let mut path = get_home_dir();
    path.push(CONFIG_DIR);
    path.push(CLIENT_CONFIG_FILE);
    path
}

fn get_home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        warn!("Could not determine home directory, using current directory");
        PathBuf::from(".")
    })
}
