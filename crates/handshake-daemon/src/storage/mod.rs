//! Storage layer for handshake-daemon
//!
//! A key/value contract with per-key expiry, and the typed session store
//! built on top of it.

mod memory;
mod postgres;
mod session;
mod traits;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use session::{answer_key, SessionStore, VersionedRecord};
pub use traits::{KvStore, StorageResult};
