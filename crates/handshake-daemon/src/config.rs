//! Configuration for handshake-daemon

use handshake_types::CredentialRequirement;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Main daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Change watcher configuration
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// Session lifetime configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Identity wallet configuration
    #[serde(default)]
    pub wallet: WalletConfig,

    /// Credentials requested from the device
    #[serde(default = "CredentialRequirement::defaults")]
    pub requirements: Vec<CredentialRequirement>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            watcher: WatcherConfig::default(),
            session: SessionConfig::default(),
            wallet: WalletConfig::default(),
            requirements: CredentialRequirement::defaults(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    pub listen_addr: SocketAddr,

    /// Externally reachable base URL, embedded in callback URLs
    #[serde(default = "default_public_url")]
    pub public_url: String,

    /// Callback used for requests handed to the mobile app by deep link
    #[serde(default = "default_deep_link_callback")]
    pub deep_link_callback: String,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            public_url: default_public_url(),
            deep_link_callback: default_deep_link_callback(),
            enable_cors: true,
        }
    }
}

impl ServerConfig {
    /// Callback URL the device posts its credential response to
    pub fn authentication_callback(&self, session_id: &str) -> String {
        format!(
            "{}/authentication/{}",
            self.public_url.trim_end_matches('/'),
            session_id
        )
    }

    /// Callback URL the device posts its offer response to
    pub fn credential_receive_callback(&self) -> String {
        format!("{}/credential-receive/", self.public_url.trim_end_matches('/'))
    }
}

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (single process, development/testing)
    #[default]
    Memory,

    /// PostgreSQL storage, shared across processes
    Postgres {
        /// Connection URL
        url: String,

        /// Maximum connections in pool
        #[serde(default = "default_pool_size")]
        max_connections: u32,

        /// Connection timeout in seconds
        #[serde(default = "default_connection_timeout")]
        connect_timeout_secs: u64,
    },
}

/// Change watcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Polling interval in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Longest a session is watched before a timeout is raised, in seconds
    #[serde(default = "default_max_wait")]
    pub max_wait_secs: u64,

    /// Maximum store reads in flight during one scan
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_polls: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            max_wait_secs: default_max_wait(),
            max_concurrent_polls: default_max_concurrent(),
        }
    }
}

impl WatcherConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}

/// Session lifetime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Expiry of a pending session nobody completes, in seconds
    #[serde(default = "default_pending_ttl")]
    pub pending_ttl_secs: u64,

    /// Expiry of a completed session nobody collects, in seconds
    #[serde(default = "default_result_ttl")]
    pub result_ttl_secs: u64,

    /// Expiry of offer answers stored by the receive channel, in seconds
    #[serde(default = "default_pending_ttl")]
    pub answer_ttl_secs: u64,

    /// Retries of a single store call on transient failures
    #[serde(default = "default_store_retries")]
    pub store_retries: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pending_ttl_secs: default_pending_ttl(),
            result_ttl_secs: default_result_ttl(),
            answer_ttl_secs: default_pending_ttl(),
            store_retries: default_store_retries(),
        }
    }
}

impl SessionConfig {
    pub fn pending_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_ttl_secs)
    }

    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl_secs)
    }

    pub fn answer_ttl(&self) -> Duration {
        Duration::from_secs(self.answer_ttl_secs)
    }
}

/// Identity wallet configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WalletConfig {
    /// In-process signing wallet
    Local {
        /// Secret the signing key is derived from
        seed: String,

        /// DID this service signs as
        #[serde(default = "default_service_did")]
        did: String,
    },

    /// External identity-wallet service
    Http {
        base_url: String,

        #[serde(default = "default_wallet_timeout")]
        timeout_secs: u64,

        #[serde(default = "default_wallet_retries")]
        max_retries: usize,
    },
}

impl Default for WalletConfig {
    fn default() -> Self {
        WalletConfig::Local {
            seed: "development-seed".to_string(),
            did: default_service_did(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_public_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_deep_link_callback() -> String {
    "demosso://authenticate/".to_string()
}

fn default_pool_size() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    5
}

fn default_poll_interval() -> u64 {
    500
}

fn default_max_wait() -> u64 {
    300
}

fn default_max_concurrent() -> usize {
    16
}

fn default_pending_ttl() -> u64 {
    600
}

fn default_result_ttl() -> u64 {
    120
}

fn default_store_retries() -> usize {
    2
}

fn default_service_did() -> String {
    "did:local:handshake".to_string()
}

fn default_wallet_timeout() -> u64 {
    5
}

fn default_wallet_retries() -> usize {
    3
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration from file
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Add environment variables with HANDSHAKE_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("HANDSHAKE")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations that would leak or lose sessions
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.watcher.max_wait_secs == 0 {
            return Err(config::ConfigError::Message(
                "watcher.max_wait_secs must be greater than zero".to_string(),
            ));
        }
        if self.session.pending_ttl_secs <= self.watcher.max_wait_secs {
            return Err(config::ConfigError::Message(
                "session.pending_ttl_secs must exceed watcher.max_wait_secs".to_string(),
            ));
        }
        Ok(())
    }
}
