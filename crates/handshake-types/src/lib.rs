//! Handshake Types - Core types for cross-device identity handshakes
//!
//! This crate defines the values that flow between the handshake components:
//! - Session identifiers and the persisted session record
//! - Claim sets and the user payload extracted from them
//! - Terminal events raised by the change watcher
//! - Messages pushed down a realtime channel

pub mod events;
pub mod identity;
pub mod ids;
pub mod session;

pub use events::{ErrorCode, GatewayMessage, TerminalEvent, TerminalOutcome};
pub use identity::{ClaimSet, CredentialRequirement, UserData};
pub use ids::{InvalidSessionId, SessionId};
pub use session::{SessionRecord, SessionStatus};
