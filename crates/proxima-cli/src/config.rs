//! Configuration system for Proxima CLI.

use proxima_core::SessionConfig;
use proxima_transport::{DEFAULT_PORT, TcpRadioConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Proxima configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Node configuration
    #[serde(default)]
    pub node: NodeConfig,
    /// Network configuration
    #[serde(default)]
    pub network: NetworkConfig,
    /// Known peers probed during discovery
    #[serde(default)]
    pub peers: Vec<PeerEntry>,
    /// Session configuration
    #[serde(default)]
    pub session: SessionSettings,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Name shown to other peers
    #[serde(default = "default_display_name")]
    pub display_name: String,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Listen address while advertising
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Hello exchange timeout in milliseconds
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
}

/// One entry of the discovery table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerEntry {
    /// Name the peer advertises
    pub name: String,
    /// `host:port` the peer listens on
    pub addr: String,
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Largest accepted message in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values

fn default_display_name() -> String {
    "proxima".to_string()
}

fn default_listen_addr() -> String {
    format!("0.0.0.0:{DEFAULT_PORT}")
}

fn default_handshake_timeout_ms() -> u64 {
    3000
}

fn default_max_message_size() -> usize {
    proxima_core::DEFAULT_MAX_MESSAGE_SIZE
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            display_name: default_display_name(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_message_size: default_max_message_size(),
            connect_timeout_secs: default_connect_timeout_secs(),
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

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, contents)?;
        Ok(())
    }

    /// Get default config path
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("proxima/config.toml")
    }

    /// Load config from `path`, or fall back to defaults when it does not
    /// exist
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse listen address as `SocketAddr`
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be parsed.
    pub fn parse_listen_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.network.listen_addr.parse()?)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.parse_listen_addr()?;

        if self.node.display_name.is_empty() || self.node.display_name.len() > 255 {
            anyhow::bail!("Display name must be between 1 and 255 bytes");
        }

        if self.network.handshake_timeout_ms == 0 {
            anyhow::bail!("Handshake timeout must be positive");
        }

        for peer in &self.peers {
            if peer.name.is_empty() {
                anyhow::bail!("Peer '{}' has an empty name", peer.addr);
            }
            peer.addr.parse::<SocketAddr>().map_err(|_| {
                anyhow::anyhow!(
                    "Peer '{}' has invalid address '{}' (expected ip:port)",
                    peer.name,
                    peer.addr
                )
            })?;
        }

        if self.session.max_message_size == 0 || self.session.max_message_size > i32::MAX as usize
        {
            anyhow::bail!("Max message size must be between 1 byte and 2GiB");
        }

        if self.session.connect_timeout_secs == 0 {
            anyhow::bail!("Connect timeout must be positive");
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        Ok(())
    }

    /// Radio settings derived from this configuration
    ///
    /// # Errors
    ///
    /// Returns an error if an address cannot be parsed.
    pub fn radio_config(&self) -> anyhow::Result<TcpRadioConfig> {
        let mut radio = TcpRadioConfig::new(self.node.display_name.clone())
            .with_listen_addr(self.parse_listen_addr()?)
            .with_handshake_timeout(Duration::from_millis(self.network.handshake_timeout_ms));

        for peer in &self.peers {
            radio = radio.with_peer(peer.name.clone(), peer.addr.parse()?);
        }
        Ok(radio)
    }

    /// Session settings derived from this configuration
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new()
            .with_max_message_size(self.session.max_message_size)
            .with_connect_timeout(Duration::from_secs(self.session.connect_timeout_secs))
    }
}
