//! Adapter trait definitions

use crate::error::WalletError;
use async_trait::async_trait;
use handshake_types::{ClaimSet, CredentialRequirement};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result type for wallet operations
pub type WalletResult<T> = Result<T, WalletError>;

/// A freshly minted credential request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRequest {
    /// Encoded request handed to the device
    pub encoded: String,
    /// Unique token the response must refer back to
    pub nonce: String,
}

/// A credential response that passed validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedResponse {
    /// DID of the identity that signed the response
    pub issuer_did: String,
    /// Disclosed claims
    pub claims: ClaimSet,
}

/// Descriptive metadata of an issued credential
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialMetadata {
    #[serde(rename = "type")]
    pub credential_type: Vec<String>,
    pub name: String,
    #[serde(default)]
    pub context: Vec<Value>,
}

impl CredentialMetadata {
    /// Credential handed to participants of the offer flow
    pub fn tinkerer() -> Self {
        Self {
            credential_type: vec![
                "Credential".to_string(),
                "ProofOfTinkererCredential".to_string(),
            ],
            name: "Tinkerer".to_string(),
            context: vec![serde_json::json!({
                "ProofOfTinkererCredential":
                    "https://identity.jolocom.com/terms/ProofOfTinkererCredential"
            })],
        }
    }
}

/// Operations delegated to the identity wallet
#[async_trait]
pub trait CredentialExchange: Send + Sync {
    /// Mint a credential request asking for `requirements`, answered at `callback_url`
    async fn create_auth_request(
        &self,
        callback_url: &str,
        requirements: &[CredentialRequirement],
    ) -> WalletResult<AuthRequest>;

    /// Mint a credential offer request answered at `callback_url`
    async fn create_credential_offer(&self, callback_url: &str) -> WalletResult<String>;

    /// Check `response` against the request it claims to answer
    async fn validate_response(
        &self,
        response: &str,
        original_request: &str,
    ) -> WalletResult<VerifiedResponse>;

    /// Check an offer response; returns the DID of the party asking for the credential
    async fn validate_offer_response(&self, response: &str) -> WalletResult<String>;

    /// Sign a credential about `subject_did`
    async fn issue_credential(
        &self,
        subject_did: &str,
        claim: ClaimSet,
        metadata: CredentialMetadata,
    ) -> WalletResult<String>;
}
