//! HTTP client for an external identity-wallet service

use super::traits::*;
use crate::error::WalletError;
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use handshake_types::{ClaimSet, CredentialRequirement};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Forwards adapter calls as JSON POSTs to a wallet service.
///
/// Transient failures (connection errors, 5xx, 429) are retried with
/// exponential backoff; anything else is returned after the first attempt.
#[derive(Debug, Clone)]
pub struct HttpWalletClient {
    client: reqwest::Client,
    base_url: String,
    max_retries: usize,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug)]
struct CallError {
    error: WalletError,
    retryable: bool,
}

impl CallError {
    fn retryable(error: WalletError) -> Self {
        Self {
            error,
            retryable: true,
        }
    }

    fn permanent(error: WalletError) -> Self {
        Self {
            error,
            retryable: false,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ShareRequest<'a> {
    #[serde(rename = "callbackURL")]
    callback_url: &'a str,
    requirements: &'a [CredentialRequirement],
}

#[derive(Serialize)]
struct OfferRequest<'a> {
    #[serde(rename = "callbackURL")]
    callback_url: &'a str,
}

#[derive(Serialize)]
struct ValidateRequest<'a> {
    response: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request: Option<&'a str>,
}

#[derive(Serialize)]
struct IssueRequest<'a> {
    subject: &'a str,
    claim: &'a ClaimSet,
    metadata: &'a CredentialMetadata,
}

#[derive(Deserialize)]
struct Encoded {
    encoded: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Subject {
    subject_did: String,
}

impl HttpWalletClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        max_retries: usize,
    ) -> Result<Self, WalletError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(format!("handshake-daemon/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| WalletError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_retries,
        })
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(200))
            .with_max_delay(Duration::from_secs(2))
            .with_max_times(self.max_retries)
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> WalletResult<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let target = url.as_str();

        (|| async move { self.post_once(target, body).await })
            .retry(self.backoff())
            .when(|e: &CallError| e.retryable)
            .notify(|e: &CallError, delay: Duration| {
                tracing::debug!(url = %target, error = %e.error, ?delay, "Retrying wallet call");
            })
            .await
            .map_err(|e| e.error)
    }

    async fn post_once<B, T>(&self, url: &str, body: &B) -> Result<T, CallError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| CallError::retryable(WalletError::Unavailable(e.to_string())))?;

        let status = response.status();
        if status.is_success() {
            return response.json::<T>().await.map_err(|e| {
                CallError::permanent(WalletError::Unavailable(format!(
                    "unexpected response body: {}",
                    e
                )))
            });
        }

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(CallError::retryable(WalletError::Unavailable(format!(
                "wallet service returned {}",
                status
            ))));
        }

        let body: ErrorBody = response.json().await.unwrap_or(ErrorBody {
            code: String::new(),
            message: status.to_string(),
        });
        let error = match body.code.as_str() {
            "invalid_credential" => WalletError::InvalidCredential(body.message),
            _ => WalletError::Malformed(body.message),
        };
        Err(CallError::permanent(error))
    }
}

#[async_trait]
impl CredentialExchange for HttpWalletClient {
    async fn create_auth_request(
        &self,
        callback_url: &str,
        requirements: &[CredentialRequirement],
    ) -> WalletResult<AuthRequest> {
        self.post(
            "/requests/share",
            &ShareRequest {
                callback_url,
                requirements,
            },
        )
        .await
    }

    async fn create_credential_offer(&self, callback_url: &str) -> WalletResult<String> {
        let encoded: Encoded = self
            .post("/requests/offer", &OfferRequest { callback_url })
            .await?;
        Ok(encoded.encoded)
    }

    async fn validate_response(
        &self,
        response: &str,
        original_request: &str,
    ) -> WalletResult<VerifiedResponse> {
        self.post(
            "/responses/validate",
            &ValidateRequest {
                response,
                request: Some(original_request),
            },
        )
        .await
    }

    async fn validate_offer_response(&self, response: &str) -> WalletResult<String> {
        let subject: Subject = self
            .post(
                "/responses/offer/validate",
                &ValidateRequest {
                    response,
                    request: None,
                },
            )
            .await?;
        Ok(subject.subject_did)
    }

    async fn issue_credential(
        &self,
        subject_did: &str,
        claim: ClaimSet,
        metadata: CredentialMetadata,
    ) -> WalletResult<String> {
        let encoded: Encoded = self
            .post(
                "/credentials/issue",
                &IssueRequest {
                    subject: subject_did,
                    claim: &claim,
                    metadata: &metadata,
                },
            )
            .await?;
        Ok(encoded.encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, retries: usize) -> HttpWalletClient {
        HttpWalletClient::new(server.uri(), Duration::from_secs(2), retries).unwrap()
    }

    #[tokio::test]
    async fn test_share_request_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/requests/share"))
            .and(body_partial_json(json!({"callbackURL": "http://cb/authentication/abc123"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"encoded": "eyJ", "nonce": "n1"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let request = client(&server, 0)
            .create_auth_request("http://cb/authentication/abc123", &CredentialRequirement::defaults())
            .await
            .unwrap();
        assert_eq!(request.encoded, "eyJ");
        assert_eq!(request.nonce, "n1");
    }

    #[tokio::test]
    async fn test_invalid_credential_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/responses/validate"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "code": "invalid_credential",
                "message": "nonce mismatch"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server, 3)
            .validate_response("resp", "req")
            .await
            .unwrap_err();
        assert_eq!(err, WalletError::InvalidCredential("nonce mismatch".to_string()));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_then_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/requests/offer"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let err = client(&server, 2)
            .create_credential_offer("http://cb/credential-receive/")
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_validate_response_returns_claims() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/responses/validate"))
            .and(body_partial_json(json!({"response": "resp", "request": "req"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuerDid": "did:x:1",
                "claims": {"givenName": "Ann"}
            })))
            .mount(&server)
            .await;

        let verified = client(&server, 0)
            .validate_response("resp", "req")
            .await
            .unwrap();
        assert_eq!(verified.issuer_did, "did:x:1");
        assert_eq!(verified.claims.get_str("givenName"), Some("Ann"));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_unavailable() {
        let client = HttpWalletClient::new("http://127.0.0.1:9", Duration::from_millis(200), 0).unwrap();
        let err = client.validate_offer_response("resp").await.unwrap_err();
        assert!(matches!(err, WalletError::Unavailable(_)));
    }
}
