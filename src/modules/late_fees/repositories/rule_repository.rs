use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::MySqlPool;
use std::str::FromStr;

use crate::core::{AppError, Result};
use crate::modules::invoices::models::FeeCategory;
use crate::modules::late_fees::models::{LateFeeRule, LateFeeRuleType};

/// Persistence boundary for late-fee rules
#[async_trait]
pub trait LateFeeRuleRepository: Send + Sync {
    async fn create(&self, rule: &LateFeeRule) -> Result<()>;
    async fn find_by_id(&self, id: &str) -> Result<Option<LateFeeRule>>;
    async fn list_all(&self) -> Result<Vec<LateFeeRule>>;
    async fn list_active(&self) -> Result<Vec<LateFeeRule>>;
    async fn count_active(&self) -> Result<u64>;
    async fn set_active(&self, id: &str, active: bool) -> Result<()>;
}

pub struct MySqlLateFeeRuleRepository {
    pool: MySqlPool,
}

impl MySqlLateFeeRuleRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

const SELECT_RULE: &str = r#"
    SELECT id, name, rule_type, value, grace_period_days, applies_to,
           active, created_at, updated_at
    FROM late_fee_rules
"#;

#[async_trait]
impl LateFeeRuleRepository for MySqlLateFeeRuleRepository {
    async fn create(&self, rule: &LateFeeRule) -> Result<()> {
        let applies_to = serde_json::to_string(
            &rule
                .applies_to
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>(),
        )?;

        sqlx::query(
            r#"
            INSERT INTO late_fee_rules (
                id, name, rule_type, value, grace_period_days, applies_to,
                active, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&rule.id)
        .bind(&rule.name)
        .bind(rule.rule_type.to_string())
        .bind(rule.value)
        .bind(rule.grace_period_days)
        .bind(applies_to)
        .bind(rule.active)
        .bind(rule.created_at)
        .bind(rule.updated_at)
        .execute(&self.pool)
        .await
        .map_err(AppError::Database)?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<LateFeeRule>> {
        let row = sqlx::query_as::<_, RuleRow>(&format!("{} WHERE id = ?", SELECT_RULE))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)?;

        row.map(RuleRow::into_rule).transpose()
    }

    async fn list_all(&self) -> Result<Vec<LateFeeRule>> {
        let rows = sqlx::query_as::<_, RuleRow>(&format!("{} ORDER BY created_at", SELECT_RULE))
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::Database)?;

        rows.into_iter().map(RuleRow::into_rule).collect()
    }

    async fn list_active(&self) -> Result<Vec<LateFeeRule>> {
        let rows = sqlx::query_as::<_, RuleRow>(&format!(
            "{} WHERE active = TRUE ORDER BY created_at",
            SELECT_RULE
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        rows.into_iter().map(RuleRow::into_rule).collect()
    }

    async fn count_active(&self) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM late_fee_rules WHERE active = TRUE")
                .fetch_one(&self.pool)
                .await
                .map_err(AppError::Database)?;
        Ok(count as u64)
    }

    async fn set_active(&self, id: &str, active: bool) -> Result<()> {
        let result =
            sqlx::query("UPDATE late_fee_rules SET active = ?, updated_at = ? WHERE id = ?")
                .bind(active)
                .bind(Utc::now())
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(AppError::Database)?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("Rule '{}' not found", id)));
        }
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RuleRow {
    id: String,
    name: String,
    rule_type: String,
    value: Decimal,
    grace_period_days: i64,
    applies_to: String,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RuleRow {
    fn into_rule(self) -> Result<LateFeeRule> {
        let rule_type = LateFeeRuleType::from_str(&self.rule_type)
            .map_err(|e| AppError::internal(format!("Invalid rule type in database: {}", e)))?;

        let category_names: Vec<String> = serde_json::from_str(&self.applies_to)?;
        let applies_to = category_names
            .iter()
            .map(|s| {
                FeeCategory::from_str(s).map_err(|e| {
                    AppError::internal(format!("Invalid category in database: {}", e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(LateFeeRule {
            id: self.id,
            name: self.name,
            rule_type,
            value: self.value,
            grace_period_days: self.grace_period_days,
            applies_to,
            active: self.active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
