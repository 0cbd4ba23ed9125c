//! Claims, credential requirements and the user payload handed to the UI

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Claims disclosed in a validated credential response, flattened by claim name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimSet(BTreeMap<String, Value>);

impl ClaimSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// String claim, ignoring empty values
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn extend(&mut self, other: ClaimSet) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// User details delivered to the waiting browser.
///
/// Shape: `{firstName, lastName, emailAddress?, did}`; absent claims are omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_address: Option<String>,

    /// DID of the responding identity
    pub did: String,
}

impl UserData {
    /// Build the UI payload from disclosed claims
    pub fn from_claims(claims: &ClaimSet, did: impl Into<String>) -> Self {
        Self {
            first_name: claims.get_str("givenName").map(str::to_string),
            last_name: claims.get_str("familyName").map(str::to_string),
            email_address: claims.get_str("email").map(str::to_string),
            did: did.into(),
        }
    }
}

impl From<UserData> for Value {
    fn from(data: UserData) -> Self {
        let mut map = serde_json::Map::new();
        let optional = [
            ("firstName", data.first_name),
            ("lastName", data.last_name),
            ("emailAddress", data.email_address),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                map.insert(key.to_string(), Value::String(value));
            }
        }
        map.insert("did".to_string(), Value::String(data.did));
        Value::Object(map)
    }
}

/// One credential the handshake asks the device to disclose
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRequirement {
    #[serde(rename = "type")]
    pub credential_type: Vec<String>,

    #[serde(default)]
    pub constraints: Vec<Value>,
}

impl CredentialRequirement {
    pub fn of_type(kind: &str) -> Self {
        Self {
            credential_type: vec!["Credential".to_string(), kind.to_string()],
            constraints: Vec::new(),
        }
    }

    pub fn name() -> Self {
        Self::of_type("ProofOfNameCredential")
    }

    pub fn email() -> Self {
        Self::of_type("ProofOfEmailCredential")
    }

    /// Requirements used when none are configured
    pub fn defaults() -> Vec<Self> {
        vec![Self::name(), Self::email()]
    }
}
