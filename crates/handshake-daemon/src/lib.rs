//! Handshake daemon library
//!
//! Session correlation and event delivery for a cross-device identity
//! handshake:
//! - Session store backends
//! - Credential exchange adapter
//! - Change watcher
//! - Realtime gateway and callback receiver
//! - REST/WebSocket API and server lifecycle

pub mod api;
pub mod callback;
pub mod config;
pub mod error;
pub mod gateway;
pub mod server;
pub mod storage;
pub mod wallet;
pub mod watcher;

#[cfg(test)]
mod testing;

pub use callback::CallbackReceiver;
pub use config::DaemonConfig;
pub use error::{ApiError, DaemonError, HandshakeError, StorageError, WalletError};
pub use gateway::{Channel, Gateway, SubscriptionRegistry};
pub use server::Server;
pub use storage::{InMemoryStore, KvStore, SessionStore};
pub use watcher::ChangeWatcher;
