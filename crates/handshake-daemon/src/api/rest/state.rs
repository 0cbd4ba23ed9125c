//! Application state for API handlers

use crate::callback::CallbackReceiver;
use crate::config::DaemonConfig;
use crate::gateway::Gateway;
use crate::wallet::CredentialExchange;
use crate::watcher::ChangeWatcher;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Realtime gateway
    pub gateway: Arc<Gateway>,

    /// Credential response intake
    pub receiver: Arc<CallbackReceiver>,

    /// Identity wallet
    pub wallet: Arc<dyn CredentialExchange>,

    /// Change watcher handle
    pub watcher: Arc<ChangeWatcher>,

    /// Effective configuration
    pub config: Arc<DaemonConfig>,

    /// Daemon version
    pub version: String,

    /// Daemon start time
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        gateway: Arc<Gateway>,
        receiver: Arc<CallbackReceiver>,
        wallet: Arc<dyn CredentialExchange>,
        watcher: Arc<ChangeWatcher>,
        config: Arc<DaemonConfig>,
    ) -> Self {
        Self {
            gateway,
            receiver,
            wallet,
            watcher,
            config,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: chrono::Utc::now(),
        }
    }

    /// Get uptime as a human-readable string
    pub fn uptime(&self) -> String {
        let duration = chrono::Utc::now() - self.started_at;
        let secs = duration.num_seconds();

        if secs < 60 {
            format!("{}s", secs)
        } else if secs < 3600 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else if secs < 86400 {
            format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
        } else {
            format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
        }
    }
}
