use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::MySqlPool;
use tracing::warn;

/// One recorded state transition
///
/// Audit entries are fire-and-forget: a failed write is logged and swallowed,
/// it never rolls back the financial operation that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub entity_type: String,
    pub entity_id: String,
    pub action: String,
    pub actor_id: String,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        entity_type: &str,
        entity_id: &str,
        action: &str,
        actor_id: &str,
        old_value: Option<serde_json::Value>,
        new_value: Option<serde_json::Value>,
    ) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            action: action.to_string(),
            actor_id: actor_id.to_string(),
            old_value,
            new_value,
            timestamp: Utc::now(),
        }
    }
}

/// Sink for audit events
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Record an event. Implementations must swallow their own failures.
    async fn record(&self, event: AuditEvent);
}

/// Sink that writes audit entries to the structured log
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) {
        tracing::info!(
            entity_type = %event.entity_type,
            entity_id = %event.entity_id,
            action = %event.action,
            actor_id = %event.actor_id,
            "audit"
        );
    }
}

/// Sink that persists audit entries to the audit_log table
pub struct MySqlAuditSink {
    pool: MySqlPool,
}

impl MySqlAuditSink {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for MySqlAuditSink {
    async fn record(&self, event: AuditEvent) {
        let old_value = event
            .old_value
            .as_ref()
            .and_then(|v| serde_json::to_string(v).ok());
        let new_value = event
            .new_value
            .as_ref()
            .and_then(|v| serde_json::to_string(v).ok());

        let result = sqlx::query(
            r#"
            INSERT INTO audit_log (
                entity_type, entity_id, action, actor_id, old_value, new_value, recorded_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.entity_type)
        .bind(&event.entity_id)
        .bind(&event.action)
        .bind(&event.actor_id)
        .bind(old_value)
        .bind(new_value)
        .bind(event.timestamp)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            warn!(
                entity_type = %event.entity_type,
                entity_id = %event.entity_id,
                error = %e,
                "failed to write audit entry, continuing"
            );
        }
    }
}
