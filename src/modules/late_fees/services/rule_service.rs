use std::sync::Arc;
use tracing::info;

use crate::audit::{AuditEvent, AuditSink};
use crate::core::{AppError, Result};
use crate::modules::late_fees::models::{LateFeeRule, MAX_ACTIVE_RULES};
use crate::modules::late_fees::repositories::LateFeeRuleRepository;

/// Administration of the late-fee rule set
pub struct RuleService {
    rules: Arc<dyn LateFeeRuleRepository>,
    audit: Arc<dyn AuditSink>,
}

impl RuleService {
    pub fn new(rules: Arc<dyn LateFeeRuleRepository>, audit: Arc<dyn AuditSink>) -> Self {
        Self { rules, audit }
    }

    /// Register a new active rule, enforcing the active-rule cap
    pub async fn create_rule(&self, rule: LateFeeRule, actor_id: &str) -> Result<LateFeeRule> {
        if rule.active {
            let active = self.rules.count_active().await?;
            if active >= MAX_ACTIVE_RULES {
                return Err(AppError::conflict(format!(
                    "At most {} late-fee rules may be active at once",
                    MAX_ACTIVE_RULES
                )));
            }
        }

        self.rules.create(&rule).await?;
        info!(rule_id = %rule.id, name = %rule.name, "late-fee rule created");
        self.audit
            .record(AuditEvent::new(
                "LateFeeRule",
                &rule.id,
                "created",
                actor_id,
                None,
                Some(serde_json::to_value(&rule)?),
            ))
            .await;
        Ok(rule)
    }

    /// Deactivate a rule. Already-accrued fees are not touched here; the next
    /// sweep reassesses every open invoice under the remaining rules.
    pub async fn deactivate_rule(&self, rule_id: &str, actor_id: &str) -> Result<()> {
        let rule = self
            .rules
            .find_by_id(rule_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Rule '{}' not found", rule_id)))?;

        if !rule.active {
            return Err(AppError::conflict(format!(
                "Rule '{}' is already inactive",
                rule_id
            )));
        }

        self.rules.set_active(rule_id, false).await?;
        info!(rule_id = %rule_id, "late-fee rule deactivated");
        self.audit
            .record(AuditEvent::new(
                "LateFeeRule",
                rule_id,
                "deactivated",
                actor_id,
                Some(serde_json::json!({"active": true})),
                Some(serde_json::json!({"active": false})),
            ))
            .await;
        Ok(())
    }

    pub async fn list_rules(&self) -> Result<Vec<LateFeeRule>> {
        self.rules.list_all().await
    }
}
