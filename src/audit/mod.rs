//! Session audit trail
//!
//! Every session that reaches a terminal state, or dies on a fatal error, is
//! recorded with its reasoning trace and a hash of the evidence it ended with.

use crate::models::{AbortReason, Passage};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_AUDIT_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Answered,
    NoAnswer,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: Uuid,
    pub question: String,
    pub status: SessionStatus,
    pub answer: Option<String>,
    pub abort_reason: Option<AbortReason>,
    pub error: Option<String>,
    pub loop_step: u32,
    pub max_retries: u32,
    pub retrievals: u32,
    pub evidence_hash: String,
    pub reasoning_trace: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub execution_time_ms: u64,
}

#[derive(Default)]
struct AuditStore {
    records: HashMap<Uuid, SessionRecord>,
    // insertion order, oldest first
    order: VecDeque<Uuid>,
}

/// Audit trail storage, bounded to the most recent `capacity` sessions
pub struct AuditLog {
    store: Arc<RwLock<AuditStore>>,
    capacity: usize,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_AUDIT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            store: Arc::new(RwLock::new(AuditStore::default())),
            capacity: capacity.max(1),
        }
    }

    /// Store a session record, evicting the oldest once full
    pub async fn record(&self, record: SessionRecord) -> Result<Uuid> {
        let session_id = record.session_id;
        let mut store = self.store.write().await;

        if store.records.insert(session_id, record).is_none() {
            store.order.push_back(session_id);
        }

        while store.order.len() > self.capacity {
            if let Some(evicted) = store.order.pop_front() {
                store.records.remove(&evicted);
                debug!(session_id = %evicted, "Evicted audit record");
            }
        }

        Ok(session_id)
    }

    pub async fn get(&self, session_id: Uuid) -> Result<Option<SessionRecord>> {
        let store = self.store.read().await;
        Ok(store.records.get(&session_id).cloned())
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.records.len()
    }

    /// Most recent sessions first
    pub async fn list_recent(&self, limit: usize) -> Result<Vec<SessionRecord>> {
        let store = self.store.read().await;

        let mut items: Vec<SessionRecord> = store.records.values().cloned().collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        items.truncate(limit);

        Ok(items)
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct EvidenceSnapshot<'a> {
    question: &'a str,
    documents: &'a [Passage],
}

/// SHA-256 over the question and the evidence passages, streamed into the hasher
pub fn compute_evidence_hash(question: &str, documents: &[Passage]) -> Result<String> {
    hash_json(&EvidenceSnapshot {
        question,
        documents,
    })
}

fn hash_json<T: Serialize>(value: &T) -> Result<String> {
    let mut hasher = Sha256::new();
    serde_json::to_writer(&mut HashWriter(&mut hasher), value)?;
    Ok(hex::encode(hasher.finalize()))
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OrchestrationError;
    use chrono::Duration;
    use std::collections::BTreeMap;

    fn record(question: &str, created_at: DateTime<Utc>) -> SessionRecord {
        SessionRecord {
            session_id: Uuid::new_v4(),
            question: question.to_string(),
            status: SessionStatus::Answered,
            answer: Some("answer".to_string()),
            abort_reason: None,
            error: None,
            loop_step: 1,
            max_retries: 3,
            retrievals: 1,
            evidence_hash: compute_evidence_hash(question, &[]).unwrap(),
            reasoning_trace: vec![],
            created_at,
            execution_time_ms: 10,
        }
    }

    #[test]
    fn test_evidence_hash_is_deterministic_and_order_sensitive() {
        let a = Passage::new("a", "first");
        let b = Passage::new("b", "second");

        let forward = compute_evidence_hash("q", &[a.clone(), b.clone()]).unwrap();
        assert_eq!(
            forward,
            compute_evidence_hash("q", &[a.clone(), b.clone()]).unwrap()
        );
        assert_ne!(forward, compute_evidence_hash("q", &[b, a]).unwrap());
        assert_eq!(forward.len(), 64);
    }

    #[tokio::test]
    async fn test_record_and_list_recent() {
        let log = AuditLog::new();
        let now = Utc::now();

        let older = record("older", now - Duration::seconds(10));
        let newer = record("newer", now);
        let newer_id = newer.session_id;

        log.record(older).await.unwrap();
        log.record(newer).await.unwrap();

        let recent = log.list_recent(1).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].question, "newer");

        let fetched = log.get(newer_id).await.unwrap().unwrap();
        assert_eq!(fetched.session_id, newer_id);
        assert!(log.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[test]
    fn test_unserializable_snapshot_is_an_error() {
        // JSON object keys must be strings
        let mut snapshot = BTreeMap::new();
        snapshot.insert(vec![1u8, 2], "evidence");

        let err = hash_json(&snapshot).unwrap_err();
        assert!(matches!(err, OrchestrationError::SerializationError(_)));
    }

    #[tokio::test]
    async fn test_oldest_records_are_evicted_at_capacity() {
        let log = AuditLog::with_capacity(2);
        let now = Utc::now();

        let first = record("first", now - Duration::seconds(2));
        let second = record("second", now - Duration::seconds(1));
        let third = record("third", now);
        let (first_id, second_id, third_id) =
            (first.session_id, second.session_id, third.session_id);

        log.record(first).await.unwrap();
        log.record(second).await.unwrap();
        log.record(third).await.unwrap();

        assert_eq!(log.len().await, 2);
        assert!(log.get(first_id).await.unwrap().is_none());
        assert!(log.get(second_id).await.unwrap().is_some());
        assert!(log.get(third_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_rerecording_a_session_does_not_evict_others() {
        let log = AuditLog::with_capacity(2);
        let a = record("a", Utc::now());
        let b = record("b", Utc::now());
        let a_id = a.session_id;

        log.record(a.clone()).await.unwrap();
        log.record(b).await.unwrap();
        log.record(a).await.unwrap();

        assert_eq!(log.len().await, 2);
        assert!(log.get(a_id).await.unwrap().is_some());
    }
}
