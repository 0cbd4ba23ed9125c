//! Terminal events and channel messages
//!
//! A `TerminalEvent` is raised in-process by the change watcher, exactly once
//! per watched session. A `GatewayMessage` is what goes over the wire to the
//! party waiting on that session.

use crate::ids::SessionId;
use crate::session::SessionRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a watched session ended
#[derive(Debug, Clone, PartialEq)]
pub enum TerminalOutcome {
    /// The store reported `success`; carries a copy of the record
    Success(SessionRecord),
    /// No transition observed within the configured window
    Timeout,
}

/// Notification that a watched session reached a terminal state
#[derive(Debug, Clone, PartialEq)]
pub struct TerminalEvent {
    pub session_id: SessionId,
    pub outcome: TerminalOutcome,
    pub raised_at: chrono::DateTime<chrono::Utc>,
}

impl TerminalEvent {
    pub fn success(session_id: SessionId, record: SessionRecord) -> Self {
        Self {
            session_id,
            outcome: TerminalOutcome::Success(record),
            raised_at: chrono::Utc::now(),
        }
    }

    pub fn timeout(session_id: SessionId) -> Self {
        Self {
            session_id,
            outcome: TerminalOutcome::Timeout,
            raised_at: chrono::Utc::now(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.outcome, TerminalOutcome::Timeout)
    }
}

/// Failure classes a channel can be told about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    StoreUnavailable,
    AdapterUnavailable,
    InvalidCredential,
    Internal,
}

/// Message pushed down a realtime channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum GatewayMessage {
    // ═══════════════════════════════════════════════════════════════════
    // PROGRESS
    // ═══════════════════════════════════════════════════════════════════
    /// Code minted; the session now waits for the device
    #[serde(rename_all = "camelCase")]
    Pending {
        session_id: SessionId,
        /// Encoded request or offer token
        token: String,
        /// Scannable rendering of the token
        code: String,
    },

    /// Credential offer for the DID that opened the channel
    Offer { token: String, code: String },

    // ═══════════════════════════════════════════════════════════════════
    // TERMINAL
    // ═══════════════════════════════════════════════════════════════════
    /// Session completed; `data` is relayed as stored
    Success { data: Value },

    /// Nobody answered in time
    #[serde(rename_all = "camelCase")]
    Timeout { session_id: SessionId },

    /// The handshake could not proceed
    Error { code: ErrorCode, message: String },
}

impl GatewayMessage {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }

    /// Whether this message ends the conversation on its channel
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending { .. } | Self::Offer { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::UserData;
    use serde_json::json;

    #[test]
    fn test_success_message_shape() {
        let msg = GatewayMessage::Success {
            data: UserData {
                did: "did:x:1".to_string(),
                first_name: Some("Ann".to_string()),
                last_name: None,
                email_address: None,
            }
            .into(),
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"status": "success", "data": {"did": "did:x:1", "firstName": "Ann"}})
        );
        assert!(msg.is_terminal());
    }

    #[test]
    fn test_pending_and_error_shapes() {
        let id = SessionId::new("abc123").unwrap();
        let pending = GatewayMessage::Pending {
            session_id: id.clone(),
            token: "t".to_string(),
            code: "c".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&pending).unwrap(),
            json!({"status": "pending", "sessionId": "abc123", "token": "t", "code": "c"})
        );
        assert!(!pending.is_terminal());

        let err = GatewayMessage::error(ErrorCode::AdapterUnavailable, "down");
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({"status": "error", "code": "adapter_unavailable", "message": "down"})
        );

        let timeout = GatewayMessage::Timeout { session_id: id };
        assert_eq!(
            serde_json::to_value(&timeout).unwrap(),
            json!({"status": "timeout", "sessionId": "abc123"})
        );
    }

    #[test]
    fn test_offer_is_not_terminal() {
        let offer = GatewayMessage::Offer {
            token: "t".to_string(),
            code: "c".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&offer).unwrap(),
            json!({"status": "offer", "token": "t", "code": "c"})
        );
        assert!(!offer.is_terminal());
    }
}
