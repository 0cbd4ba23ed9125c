//! Typed session store
//!
//! Serializes `SessionRecord`s into the key/value store under their session id
//! and retries transient failures locally to the call that hit them.

use super::traits::{KvStore, StorageResult};
use crate::error::{HandshakeError, HandshakeResult, StorageError};
use backon::{ExponentialBuilder, Retryable};
use handshake_types::{SessionId, SessionRecord, SessionStatus, UserData};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// A record together with the exact bytes it was read from
#[derive(Debug, Clone)]
pub struct VersionedRecord {
    raw: String,
    pub record: SessionRecord,
}

/// Session persistence on top of a `KvStore`
#[derive(Clone)]
pub struct SessionStore {
    kv: Arc<dyn KvStore>,
    retries: usize,
}

impl SessionStore {
    pub fn new(kv: Arc<dyn KvStore>, retries: usize) -> Self {
        Self { kv, retries }
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(50))
            .with_max_delay(Duration::from_secs(1))
            .with_max_times(self.retries)
    }

    async fn retrying<T, F, Fut>(&self, op: &'static str, call: F) -> StorageResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StorageResult<T>>,
    {
        call.retry(self.backoff())
            .when(StorageError::is_transient)
            .notify(|e: &StorageError, delay: Duration| {
                tracing::debug!(op, error = %e, ?delay, "Retrying store call");
            })
            .await
    }

    fn decode(raw: &str) -> StorageResult<SessionRecord> {
        serde_json::from_str(raw).map_err(|e| StorageError::InvalidData(e.to_string()))
    }

    fn encode(record: &SessionRecord) -> StorageResult<String> {
        serde_json::to_string(record).map_err(|e| StorageError::InvalidData(e.to_string()))
    }

    /// Persist a fresh `pending` session holding the request token
    pub async fn create_pending(
        &self,
        id: &SessionId,
        request: &str,
        ttl: Duration,
    ) -> HandshakeResult<()> {
        let raw = Self::encode(&SessionRecord::pending(request))?;
        self.retrying("put", || self.kv.put(id.as_str(), &raw, Some(ttl)))
            .await?;
        tracing::debug!(session_id = %id, "Pending session stored");
        Ok(())
    }

    /// Read a session with local retries
    pub async fn load(&self, id: &SessionId) -> HandshakeResult<Option<SessionRecord>> {
        Ok(self.load_versioned(id).await?.map(|v| v.record))
    }

    /// Read a session together with its stored version
    pub async fn load_versioned(&self, id: &SessionId) -> HandshakeResult<Option<VersionedRecord>> {
        let raw = self
            .retrying("get", || self.kv.get(id.as_str()))
            .await?;
        raw.map(|raw| {
            let record = Self::decode(&raw)?;
            Ok(VersionedRecord { raw, record })
        })
        .transpose()
    }

    /// Single read without retries, for callers that poll anyway
    pub async fn peek(&self, id: &SessionId) -> StorageResult<Option<SessionRecord>> {
        self.kv
            .get(id.as_str())
            .await?
            .map(|raw| Self::decode(&raw))
            .transpose()
    }

    /// Move a `pending` session to `success`.
    ///
    /// The write only lands if the record is still the version that was read,
    /// so a session transitions at most once even with concurrent submitters.
    pub async fn complete(
        &self,
        id: &SessionId,
        current: &VersionedRecord,
        data: UserData,
        ttl: Duration,
    ) -> HandshakeResult<()> {
        if current.record.status != SessionStatus::Pending {
            return Err(HandshakeError::AlreadyCompleted(id.to_string()));
        }

        let next = Self::encode(&SessionRecord::success(data))?;
        let swapped = self
            .retrying("compare_and_swap", || {
                self.kv
                    .compare_and_swap(id.as_str(), &current.raw, &next, Some(ttl))
            })
            .await?;

        if swapped {
            tracing::info!(session_id = %id, "Session completed");
            return Ok(());
        }

        match self.load(id).await? {
            None => Err(HandshakeError::SessionNotFound(id.to_string())),
            Some(record) if record.is_terminal() => {
                Err(HandshakeError::AlreadyCompleted(id.to_string()))
            }
            Some(_) => Err(HandshakeError::InvalidCredential(
                "session request was replaced".to_string(),
            )),
        }
    }

    /// Delete a session; returns whether it existed
    pub async fn remove(&self, id: &SessionId) -> HandshakeResult<bool> {
        Ok(self
            .retrying("delete", || self.kv.delete(id.as_str()))
            .await?)
    }

    /// Store the answer a credential-offer requester gave, keyed by DID hash
    pub async fn put_answer(&self, did: &str, answer: &str, ttl: Duration) -> HandshakeResult<()> {
        let key = answer_key(did);
        self.retrying("put", || self.kv.put(&key, answer, Some(ttl)))
            .await?;
        Ok(())
    }

    /// Answer previously stored for a DID
    pub async fn answer(&self, did: &str) -> HandshakeResult<Option<String>> {
        let key = answer_key(did);
        Ok(self.retrying("get", || self.kv.get(&key)).await?)
    }
}

/// Key of an offer answer: `ans:<blake3(did)>`
pub fn answer_key(did: &str) -> String {
    format!("ans:{}", blake3::hash(did.as_bytes()).to_hex())
}
