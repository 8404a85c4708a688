use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;

use crate::core::{AppError, Result};
use crate::modules::invoices::models::FeeCategory;

/// A student the billing engine may invoice
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BillableStudent {
    pub student_id: String,
    pub name: String,
}

/// Roster boundary: the student/class store lives outside the billing engine
#[async_trait]
pub trait StudentRoster: Send + Sync {
    async fn list_billable_students(&self, class_id: &str) -> Result<Vec<BillableStudent>>;
}

/// Chart-of-accounts boundary: maps a fee category to the income account a
/// line posts to
#[async_trait]
pub trait AccountResolver: Send + Sync {
    async fn resolve_income_account(&self, category: FeeCategory) -> Result<Option<String>>;
}

pub struct MySqlStudentRoster {
    pool: MySqlPool,
}

impl MySqlStudentRoster {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StudentRoster for MySqlStudentRoster {
    async fn list_billable_students(&self, class_id: &str) -> Result<Vec<BillableStudent>> {
        sqlx::query_as::<_, BillableStudent>(
            r#"
            SELECT student_id, name
            FROM students
            WHERE class_id = ? AND active = TRUE
            ORDER BY student_id
            "#,
        )
        .bind(class_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)
    }
}

pub struct MySqlAccountResolver {
    pool: MySqlPool,
}

impl MySqlAccountResolver {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountResolver for MySqlAccountResolver {
    async fn resolve_income_account(&self, category: FeeCategory) -> Result<Option<String>> {
        sqlx::query_scalar("SELECT account_id FROM income_accounts WHERE category = ?")
            .bind(category.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)
    }
}
