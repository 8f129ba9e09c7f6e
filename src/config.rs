//! Configuration management for the rax-ftpd server
//!
//! Separates startup configuration (requires restart) from runtime configuration
//! (can be changed while the server is running).

use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Complete server configuration with startup/runtime separation
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ServerConfig {
    #[serde(flatten)]
    pub startup: StartupConfig,

    #[serde(flatten)]
    pub runtime: RuntimeConfig,
}

/// Configuration that requires a server restart to take effect
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StartupConfig {
    // ═══ NETWORK ═══
    /// IP address the control listener binds to
    pub bind_address: String,

    /// Port for the control connection
    pub control_port: u16,

    /// Port range for passive data connections. `0`/`0` lets the OS choose.
    pub passive_port_min: u16,
    pub passive_port_max: u16,

    /// Address announced in PASV replies when it differs from the local one
    pub passive_address: Option<IpAddr>,

    /// Fixed local port for active data connections
    pub active_source_port: Option<u16>,

    /// Allow data connections from hosts other than the control peer
    pub promiscuous_data: bool,

    /// Per-request data connection timeout
    pub data_connection_timeout_secs: u64,

    // ═══ PROTOCOL ═══
    pub max_command_length: usize,
    pub max_username_length: usize,
    pub greeting: String,

    // ═══ STORAGE ═══
    pub server_root: String,

    /// Complete uploads on the background transfer worker
    pub deferred_commit: bool,

    /// How long shutdown waits for a running background transfer before
    /// cancelling it
    pub transfer_drain_timeout_secs: u64,

    // ═══ SECURITY ═══
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
    pub tls_handshake_timeout_secs: u64,
    pub allow_anonymous: bool,

    /// Static user table: username → password
    pub users: HashMap<String, String>,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".into(),
            control_port: 2121,
            passive_port_min: 2122,
            passive_port_max: 2222,
            passive_address: None,
            active_source_port: None,
            promiscuous_data: false,
            data_connection_timeout_secs: 10,
            max_command_length: 1024,
            max_username_length: 32,
            greeting: "Welcome to RAX FTP Server".into(),
            server_root: "./server_root".into(),
            deferred_commit: false,
            transfer_drain_timeout_secs: 30,
            tls_cert_path: None,
            tls_key_path: None,
            tls_handshake_timeout_secs: 10,
            allow_anonymous: true,
            users: HashMap::new(),
        }
    }
}

/// Configuration that can be updated while the server is running
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum concurrent clients
    /// Environment: RAX_FTP__MAX_CLIENTS
    pub max_clients: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { max_clients: 10 }
    }
}

/// Thread-safe runtime configuration wrapper
pub type SharedRuntimeConfig = Arc<RwLock<RuntimeConfig>>;

impl ServerConfig {
    /// Load configuration from config.toml with environment overrides
    pub fn load() -> Result<Self, config::ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("rax-ftpd/config").required(false))
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("RAX_FTP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: ServerConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Split into startup (immutable) and runtime (mutable) parts
    pub fn split(self) -> (StartupConfig, SharedRuntimeConfig) {
        let runtime = Arc::new(RwLock::new(self.runtime));
        (self.startup, runtime)
    }

    /// Validation for all configuration values
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let startup = &self.startup;

        if startup.passive_port_min > startup.passive_port_max {
            return Err(config::ConfigError::Message(
                "passive_port_min must not exceed passive_port_max".into(),
            ));
        }

        if (startup.passive_port_min == 0) != (startup.passive_port_max == 0) {
            return Err(config::ConfigError::Message(
                "passive port range must be both zero or both non-zero".into(),
            ));
        }

        if startup.server_root.is_empty() {
            return Err(config::ConfigError::Message(
                "server_root cannot be empty".into(),
            ));
        }

        if startup.max_command_length < 16 {
            return Err(config::ConfigError::Message(
                "max_command_length must be at least 16".into(),
            ));
        }

        if startup.data_connection_timeout_secs == 0 {
            return Err(config::ConfigError::Message(
                "data_connection_timeout_secs must be greater than 0".into(),
            ));
        }

        if startup.tls_cert_path.is_some() != startup.tls_key_path.is_some() {
            return Err(config::ConfigError::Message(
                "tls_cert_path and tls_key_path must be set together".into(),
            ));
        }

        if self.runtime.max_clients == 0 {
            return Err(config::ConfigError::Message(
                "max_clients must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

impl StartupConfig {
    /// Bind address and control port as a socket address string
    pub fn control_socket(&self) -> String {
        format!("{}:{}", self.bind_address, self.control_port)
    }

    pub fn server_root_path(&self) -> PathBuf {
        PathBuf::from(&self.server_root)
    }

    pub fn data_connection_timeout(&self) -> Duration {
        Duration::from_secs(self.data_connection_timeout_secs)
    }

    pub fn tls_handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.tls_handshake_timeout_secs)
    }

    pub fn transfer_drain_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_drain_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.startup.control_socket(), "127.0.0.1:2121");
        assert_eq!(config.runtime.max_clients, 10);
    }

    #[test]
    fn test_rejects_inverted_passive_range() {
        let mut config = ServerConfig::default();
        config.startup.passive_port_min = 3000;
        config.startup.passive_port_max = 2000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_half_configured_tls() {
        let mut config = ServerConfig::default();
        config.startup.tls_cert_path = Some("cert.pem".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ephemeral_passive_range_is_allowed() {
        let mut config = ServerConfig::default();
        config.startup.passive_port_min = 0;
        config.startup.passive_port_max = 0;
        assert!(config.validate().is_ok());
    }
}
