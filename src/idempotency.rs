//! Idempotency key store
//!
//! Gives the transfer gateway at-most-once execution semantics under
//! client retries. The begin operation is a conditional insert, not a
//! read followed by a write: two concurrent requests sharing a fresh
//! key must not both proceed past it.

use crate::models::{IdempotencyKeyRecord, IdempotencyStatus};
use crate::Result;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Outcome of registering an idempotency key for a request.
#[derive(Debug, Clone, PartialEq)]
pub enum BeginOutcome {
    /// No record existed; a pending record was inserted. Proceed.
    Started,
    /// The key completed earlier with the same payload; serve the
    /// cached response verbatim, no new external call.
    Completed(serde_json::Value),
    /// A concurrent attempt with the same key and payload is in flight.
    InProgress,
    /// The key was reused for a different payload.
    Conflict,
}

#[async_trait::async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Atomically insert a pending record for `key`, or classify the
    /// existing one.
    async fn begin(&self, key: &str, owner_id: Uuid, request_hash: &str) -> Result<BeginOutcome>;

    /// Mark the record completed and cache the response verbatim.
    async fn complete(&self, key: &str, response: serde_json::Value) -> Result<()>;

    /// Mark the record failed; a later retry with the same key starts over.
    async fn fail(&self, key: &str) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<IdempotencyKeyRecord>>;
}

//
// ================= Request Hash =================
//

/// Canonical fields of a transfer for hashing purposes. Field order is
/// fixed; two requests hash equal iff these five fields match.
#[derive(Serialize)]
struct CanonicalTransfer<'a> {
    from: Uuid,
    to: Uuid,
    amount: &'a Decimal,
    token: &'a str,
    chain: u64,
}

/// Compute the canonical SHA-256 hash of a transfer payload.
/// Streams JSON directly into the hasher, no intermediate String.
pub fn request_hash(
    from: Uuid,
    to: Uuid,
    amount: &Decimal,
    token_contract: &str,
    chain_id: u64,
) -> String {
    let canonical = CanonicalTransfer {
        from,
        to,
        amount,
        token: token_contract,
        chain: chain_id,
    };

    let mut hasher = Sha256::new();
    if serde_json::to_writer(&mut HashWriter(&mut hasher), &canonical).is_err() {
        return String::new();
    }
    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

//
// ================= In-Memory Store =================
//

/// In-memory store. A single mutex over the map makes begin a true
/// conditional insert: check and insert happen in one critical section.
pub struct InMemoryIdempotencyStore {
    records: Arc<Mutex<HashMap<String, IdempotencyKeyRecord>>>,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryIdempotencyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn begin(&self, key: &str, owner_id: Uuid, request_hash: &str) -> Result<BeginOutcome> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| crate::error::AgentOpsError::Storage("idempotency lock poisoned".into()))?;

        if let Some(existing) = records.get(key) {
            if existing.request_hash != request_hash {
                return Ok(BeginOutcome::Conflict);
            }
            return Ok(match existing.status {
                IdempotencyStatus::Completed => BeginOutcome::Completed(
                    existing.cached_response.clone().unwrap_or(serde_json::Value::Null),
                ),
                IdempotencyStatus::Pending => BeginOutcome::InProgress,
                // A failed attempt releases the key for a fresh try.
                IdempotencyStatus::Failed => {
                    records.insert(
                        key.to_string(),
                        IdempotencyKeyRecord {
                            key: key.to_string(),
                            owner_id,
                            request_hash: request_hash.to_string(),
                            status: IdempotencyStatus::Pending,
                            cached_response: None,
                            created_at: Utc::now(),
                        },
                    );
                    BeginOutcome::Started
                }
            });
        }

        records.insert(
            key.to_string(),
            IdempotencyKeyRecord {
                key: key.to_string(),
                owner_id,
                request_hash: request_hash.to_string(),
                status: IdempotencyStatus::Pending,
                cached_response: None,
                created_at: Utc::now(),
            },
        );
        Ok(BeginOutcome::Started)
    }

    async fn complete(&self, key: &str, response: serde_json::Value) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| crate::error::AgentOpsError::Storage("idempotency lock poisoned".into()))?;

        match records.get_mut(key) {
            Some(record) => {
                record.status = IdempotencyStatus::Completed;
                record.cached_response = Some(response);
                Ok(())
            }
            None => Err(crate::error::AgentOpsError::Storage(format!(
                "idempotency key not found: {}",
                key
            ))),
        }
    }

    async fn fail(&self, key: &str) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| crate::error::AgentOpsError::Storage("idempotency lock poisoned".into()))?;

        if let Some(record) = records.get_mut(key) {
            record.status = IdempotencyStatus::Failed;
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<IdempotencyKeyRecord>> {
        let records = self
            .records
            .lock()
            .map_err(|_| crate::error::AgentOpsError::Storage("idempotency lock poisoned".into()))?;
        Ok(records.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn sample_hash() -> String {
        request_hash(
            Uuid::new_v4(),
            Uuid::new_v4(),
            &Decimal::from_str("10.50").unwrap(),
            "0xToken",
            8453,
        )
    }

    #[test]
    fn test_request_hash_is_deterministic() {
        let from = Uuid::new_v4();
        let to = Uuid::new_v4();
        let amount = Decimal::from_str("25").unwrap();

        let a = request_hash(from, to, &amount, "0xToken", 8453);
        let b = request_hash(from, to, &amount, "0xToken", 8453);
        assert_eq!(a, b);

        let c = request_hash(from, to, &amount, "0xToken", 1);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn test_fresh_key_starts() {
        let store = InMemoryIdempotencyStore::new();
        let hash = sample_hash();

        let outcome = store.begin("key-1", Uuid::new_v4(), &hash).await.unwrap();
        assert_eq!(outcome, BeginOutcome::Started);
    }

    #[tokio::test]
    async fn test_pending_key_reports_in_progress() {
        let store = InMemoryIdempotencyStore::new();
        let owner = Uuid::new_v4();
        let hash = sample_hash();

        store.begin("key-1", owner, &hash).await.unwrap();
        let second = store.begin("key-1", owner, &hash).await.unwrap();
        assert_eq!(second, BeginOutcome::InProgress);
    }

    #[tokio::test]
    async fn test_different_hash_conflicts() {
        let store = InMemoryIdempotencyStore::new();
        let owner = Uuid::new_v4();

        store.begin("key-1", owner, &sample_hash()).await.unwrap();
        let second = store.begin("key-1", owner, &sample_hash()).await.unwrap();
        assert_eq!(second, BeginOutcome::Conflict);
    }

    #[tokio::test]
    async fn test_completed_key_replays_cached_response() {
        let store = InMemoryIdempotencyStore::new();
        let owner = Uuid::new_v4();
        let hash = sample_hash();
        let response = serde_json::json!({"transactionId": "abc", "status": "pending"});

        store.begin("key-1", owner, &hash).await.unwrap();
        store.complete("key-1", response.clone()).await.unwrap();

        let replay = store.begin("key-1", owner, &hash).await.unwrap();
        assert_eq!(replay, BeginOutcome::Completed(response.clone()));

        // Replay is stable across any number of retries.
        let again = store.begin("key-1", owner, &hash).await.unwrap();
        assert_eq!(again, BeginOutcome::Completed(response));
    }

    #[tokio::test]
    async fn test_failed_key_allows_retry() {
        let store = InMemoryIdempotencyStore::new();
        let owner = Uuid::new_v4();
        let hash = sample_hash();

        store.begin("key-1", owner, &hash).await.unwrap();
        store.fail("key-1").await.unwrap();

        let retry = store.begin("key-1", owner, &hash).await.unwrap();
        assert_eq!(retry, BeginOutcome::Started);
    }

    #[tokio::test]
    async fn test_concurrent_begin_admits_exactly_one() {
        let store = Arc::new(InMemoryIdempotencyStore::new());
        let owner = Uuid::new_v4();
        let hash = sample_hash();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let hash = hash.clone();
            handles.push(tokio::spawn(async move {
                store.begin("shared-key", owner, &hash).await.unwrap()
            }));
        }

        let mut started = 0;
        let mut in_progress = 0;
        for handle in handles {
            match handle.await.unwrap() {
                BeginOutcome::Started => started += 1,
                BeginOutcome::InProgress => in_progress += 1,
                other => panic!("unexpected outcome: {:?}", other),
            }
        }
        assert_eq!(started, 1);
        assert_eq!(in_progress, 7);
    }
}
