//! Append-only activity ledger
//!
//! Every component writes here; nothing reads it back for control flow.

use crate::models::{ActivityLogEntry, CorrelationId};
use crate::Result;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Trait for the audit trail. Entries are never updated or deleted.
#[async_trait::async_trait]
pub trait ActivityLedger: Send + Sync {
    async fn append(&self, entry: ActivityLogEntry) -> Result<()>;
    async fn entries_for(&self, correlation_id: CorrelationId) -> Result<Vec<ActivityLogEntry>>;
    async fn entries_for_agent(&self, agent_id: Uuid) -> Result<Vec<ActivityLogEntry>>;
}

/// In-memory ledger for development and tests
pub struct InMemoryLedger {
    entries: Arc<RwLock<Vec<ActivityLogEntry>>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ActivityLedger for InMemoryLedger {
    async fn append(&self, entry: ActivityLogEntry) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.push(entry);
        Ok(())
    }

    async fn entries_for(&self, correlation_id: CorrelationId) -> Result<Vec<ActivityLogEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| e.correlation_id == correlation_id)
            .cloned()
            .collect())
    }

    async fn entries_for_agent(&self, agent_id: Uuid) -> Result<Vec<ActivityLogEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| e.agent_id == agent_id)
            .cloned()
            .collect())
    }
}

//
// ================= Audit Trail =================
//

/// One financial audit event, separate from the agent activity log.
/// The transfer gateway and the reconciliation sweep write here.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub correlation_id: Option<CorrelationId>,
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub detail: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl AuditEvent {
    pub fn new(
        correlation_id: Option<CorrelationId>,
        actor_id: Option<Uuid>,
        action: &str,
        detail: serde_json::Value,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            correlation_id,
            actor_id,
            action: action.to_string(),
            detail,
            created_at: chrono::Utc::now(),
        }
    }
}

#[async_trait::async_trait]
pub trait AuditTrail: Send + Sync {
    async fn record(&self, event: AuditEvent) -> Result<()>;
    async fn events_for_action(&self, action: &str) -> Result<Vec<AuditEvent>>;
}

/// In-memory audit trail for development and tests
pub struct InMemoryAuditTrail {
    events: Arc<RwLock<Vec<AuditEvent>>>,
}

impl InMemoryAuditTrail {
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Default for InMemoryAuditTrail {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl AuditTrail for InMemoryAuditTrail {
    async fn record(&self, event: AuditEvent) -> Result<()> {
        let mut events = self.events.write().await;
        events.push(event);
        Ok(())
    }

    async fn events_for_action(&self, action: &str) -> Result<Vec<AuditEvent>> {
        let events = self.events.read().await;
        Ok(events.iter().filter(|e| e.action == action).cloned().collect())
    }
}
