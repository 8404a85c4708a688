use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::MySqlPool;
use std::str::FromStr;

use crate::core::{AppError, Result};
use crate::modules::invoices::models::{BillingPlan, FeeCategory};

/// Lookup boundary for billing plans
#[async_trait]
pub trait BillingPlanRepository: Send + Sync {
    async fn create(&self, plan: &BillingPlan) -> Result<()>;
    async fn find_by_id(&self, id: &str) -> Result<Option<BillingPlan>>;
}

pub struct MySqlBillingPlanRepository {
    pool: MySqlPool,
}

impl MySqlBillingPlanRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BillingPlanRepository for MySqlBillingPlanRepository {
    async fn create(&self, plan: &BillingPlan) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO billing_plans (
                id, class_id, name, category, period_fee,
                first_period, period_count, active
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&plan.id)
        .bind(&plan.class_id)
        .bind(&plan.name)
        .bind(plan.category.to_string())
        .bind(plan.period_fee)
        .bind(plan.first_period)
        .bind(plan.period_count)
        .bind(plan.active)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let Some(db_err) = e.as_database_error() {
                if db_err.is_unique_violation() {
                    return AppError::conflict(format!(
                        "Billing plan '{}' already exists",
                        plan.id
                    ));
                }
            }
            AppError::Database(e)
        })?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<BillingPlan>> {
        let row = sqlx::query_as::<_, PlanRow>(
            r#"
            SELECT id, class_id, name, category, period_fee,
                   first_period, period_count, active
            FROM billing_plans
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        row.map(PlanRow::into_plan).transpose()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PlanRow {
    id: String,
    class_id: String,
    name: String,
    category: String,
    period_fee: Decimal,
    first_period: u32,
    period_count: u32,
    active: bool,
}

impl PlanRow {
    fn into_plan(self) -> Result<BillingPlan> {
        let category = FeeCategory::from_str(&self.category)
            .map_err(|e| AppError::internal(format!("Invalid category in database: {}", e)))?;

        Ok(BillingPlan {
            id: self.id,
            class_id: self.class_id,
            name: self.name,
            category,
            period_fee: self.period_fee,
            first_period: self.first_period,
            period_count: self.period_count,
            active: self.active,
        })
    }
}
