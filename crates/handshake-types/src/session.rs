//! Persisted session record
//!
//! The record layout is the only schema shared through the session store:
//! `{status, request?, data?}` addressed by session id. `data` is opaque:
//! whoever completes a session decides its shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Handshake status as persisted in the session store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Code issued, waiting for the device to respond
    Pending,
    /// Credential response validated, data available
    Success,
}

/// One handshake attempt as stored under its session id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub status: SessionStatus,

    /// Encoded request token minted at creation, needed to validate the response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,

    /// Result payload, present only once the session succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl SessionRecord {
    pub fn pending(request: impl Into<String>) -> Self {
        Self {
            status: SessionStatus::Pending,
            request: Some(request.into()),
            data: None,
        }
    }

    pub fn success(data: impl Into<Value>) -> Self {
        Self {
            status: SessionStatus::Success,
            request: None,
            data: Some(data.into()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status == SessionStatus::Success
    }
}
