use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{MySql, MySqlPool, Transaction};
use std::str::FromStr;

use crate::core::{AppError, Result};
use crate::modules::invoices::models::{
    FeeCategory, Invoice, InvoiceLine, InvoiceMetadata, InvoiceStatus,
};

/// One accrual write, with the optimistic check values read before computing
///
/// Both `expected_*` fields must still match the stored row: a concurrent
/// allocation changes `paid_amount` without touching the fee, and the status
/// it derived must not be clobbered by a stale sweep write.
#[derive(Debug, Clone)]
pub struct AccrualUpdate {
    pub expected_late_fee: Decimal,
    pub expected_paid: Decimal,
    pub late_fee_amount: Decimal,
    pub status: InvoiceStatus,
}

/// Persistence boundary for invoices and their lines
///
/// Every mutating method is one atomic transaction; the optimistic
/// `expected_*` checks serialize writes to the same invoice against
/// concurrent sweeps and allocations.
#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    /// Insert an invoice with its lines
    async fn create(&self, invoice: &Invoice) -> Result<()>;

    /// Insert an invoice and stamp `carried_into` on the source invoices
    /// whose balances it folds in, all in one transaction
    async fn create_with_carry(&self, invoice: &Invoice, carried_sources: &[String])
        -> Result<()>;

    async fn find_by_number(&self, invoice_no: &str) -> Result<Option<Invoice>>;

    /// All invoices in non-terminal states
    async fn list_open(&self) -> Result<Vec<Invoice>>;

    /// All invoices for a student, newest period first
    async fn list_for_student(&self, student_id: &str) -> Result<Vec<Invoice>>;

    /// Open invoices for a student ordered by ascending due date (FIFO order)
    async fn list_open_for_student(&self, student_id: &str) -> Result<Vec<Invoice>>;

    async fn list_for_plan(&self, plan_id: &str) -> Result<Vec<Invoice>>;

    /// Duplicate-generation guard: does an invoice tagged with this
    /// (student, plan, period) already exist?
    async fn exists_for_period(
        &self,
        student_id: &str,
        plan_id: &str,
        period_index: u32,
    ) -> Result<bool>;

    /// Write a recomputed late fee and status; fails with Conflict when the
    /// stored fee or paid amount no longer matches the `expected_*` values
    async fn apply_accrual(&self, invoice_no: &str, update: &AccrualUpdate) -> Result<()>;

    /// Administrative cancel; only succeeds while issued and unpaid
    async fn cancel(&self, invoice_no: &str) -> Result<()>;

    /// Delete and recreate a billing plan's invoices in one transaction
    /// (cascades lines and allocations of the deleted invoices)
    async fn replace_plan(&self, plan_id: &str, invoices: &[Invoice]) -> Result<()>;
}

/// MySQL-backed invoice repository
pub struct MySqlInvoiceRepository {
    pool: MySqlPool,
}

impl MySqlInvoiceRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn insert_invoice_tx(
        tx: &mut Transaction<'_, MySql>,
        invoice: &Invoice,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO invoices (
                invoice_no, student_id, issue_date, due_date,
                total_amount, discount_amount, late_fee_amount, paid_amount,
                status, billing_plan_id, period_index, sequence_index,
                carried_into, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&invoice.invoice_no)
        .bind(&invoice.student_id)
        .bind(invoice.issue_date)
        .bind(invoice.due_date)
        .bind(invoice.total_amount)
        .bind(invoice.discount_amount)
        .bind(invoice.late_fee_amount)
        .bind(invoice.paid_amount)
        .bind(invoice.status.to_string())
        .bind(&invoice.metadata.billing_plan_id)
        .bind(invoice.metadata.period_index)
        .bind(invoice.metadata.sequence_index)
        .bind(&invoice.metadata.carried_into)
        .bind(invoice.created_at)
        .bind(invoice.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            if let Some(db_err) = e.as_database_error() {
                if db_err.is_unique_violation() {
                    return AppError::conflict(format!(
                        "Invoice '{}' already exists",
                        invoice.invoice_no
                    ));
                }
            }
            AppError::Database(e)
        })?;

        for line in &invoice.lines {
            sqlx::query(
                r#"
                INSERT INTO invoice_lines (
                    id, invoice_no, category, description, amount,
                    income_account, carried_from_period
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&line.id)
            .bind(&line.invoice_no)
            .bind(line.category.to_string())
            .bind(&line.description)
            .bind(line.amount)
            .bind(&line.income_account)
            .bind(line.carried_from_period)
            .execute(&mut **tx)
            .await
            .map_err(AppError::Database)?;
        }

        Ok(())
    }

    async fn load_lines(&self, invoice_no: &str) -> Result<Vec<InvoiceLine>> {
        let rows = sqlx::query_as::<_, LineRow>(
            r#"
            SELECT id, invoice_no, category, description, amount,
                   income_account, carried_from_period
            FROM invoice_lines
            WHERE invoice_no = ?
            ORDER BY id
            "#,
        )
        .bind(invoice_no)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        rows.into_iter().map(LineRow::into_line).collect()
    }

    async fn hydrate(&self, rows: Vec<InvoiceRow>) -> Result<Vec<Invoice>> {
        let mut invoices = Vec::with_capacity(rows.len());
        for row in rows {
            let lines = self.load_lines(&row.invoice_no).await?;
            invoices.push(row.into_invoice(lines)?);
        }
        Ok(invoices)
    }
}

const SELECT_INVOICE: &str = r#"
    SELECT invoice_no, student_id, issue_date, due_date,
           total_amount, discount_amount, late_fee_amount, paid_amount,
           status, billing_plan_id, period_index, sequence_index,
           carried_into, created_at, updated_at
    FROM invoices
"#;

#[async_trait]
impl InvoiceRepository for MySqlInvoiceRepository {
    async fn create(&self, invoice: &Invoice) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        Self::insert_invoice_tx(&mut tx, invoice).await?;
        tx.commit().await.map_err(AppError::Database)?;
        Ok(())
    }

    async fn create_with_carry(
        &self,
        invoice: &Invoice,
        carried_sources: &[String],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        Self::insert_invoice_tx(&mut tx, invoice).await?;

        for source in carried_sources {
            let result = sqlx::query(
                r#"
                UPDATE invoices
                SET carried_into = ?, updated_at = ?
                WHERE invoice_no = ? AND carried_into IS NULL
                "#,
            )
            .bind(&invoice.invoice_no)
            .bind(Utc::now())
            .bind(source)
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;

            if result.rows_affected() == 0 {
                return Err(AppError::conflict(format!(
                    "Invoice '{}' was already carried forward",
                    source
                )));
            }
        }

        tx.commit().await.map_err(AppError::Database)?;
        Ok(())
    }

    async fn find_by_number(&self, invoice_no: &str) -> Result<Option<Invoice>> {
        let row = sqlx::query_as::<_, InvoiceRow>(
            &format!("{} WHERE invoice_no = ?", SELECT_INVOICE),
        )
        .bind(invoice_no)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        match row {
            Some(row) => {
                let lines = self.load_lines(invoice_no).await?;
                Ok(Some(row.into_invoice(lines)?))
            }
            None => Ok(None),
        }
    }

    async fn list_open(&self) -> Result<Vec<Invoice>> {
        let rows = sqlx::query_as::<_, InvoiceRow>(&format!(
            "{} WHERE status IN ('issued', 'partially_paid', 'overdue') ORDER BY due_date",
            SELECT_INVOICE
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        self.hydrate(rows).await
    }

    async fn list_for_student(&self, student_id: &str) -> Result<Vec<Invoice>> {
        let rows = sqlx::query_as::<_, InvoiceRow>(&format!(
            "{} WHERE student_id = ? ORDER BY period_index DESC",
            SELECT_INVOICE
        ))
        .bind(student_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        self.hydrate(rows).await
    }

    async fn list_open_for_student(&self, student_id: &str) -> Result<Vec<Invoice>> {
        let rows = sqlx::query_as::<_, InvoiceRow>(&format!(
            "{} WHERE student_id = ? AND status IN ('issued', 'partially_paid', 'overdue') \
             ORDER BY due_date",
            SELECT_INVOICE
        ))
        .bind(student_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        self.hydrate(rows).await
    }

    async fn list_for_plan(&self, plan_id: &str) -> Result<Vec<Invoice>> {
        let rows = sqlx::query_as::<_, InvoiceRow>(&format!(
            "{} WHERE billing_plan_id = ? ORDER BY period_index",
            SELECT_INVOICE
        ))
        .bind(plan_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        self.hydrate(rows).await
    }

    async fn exists_for_period(
        &self,
        student_id: &str,
        plan_id: &str,
        period_index: u32,
    ) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM invoices
            WHERE student_id = ? AND billing_plan_id = ? AND period_index = ?
              AND status != 'cancelled'
            "#,
        )
        .bind(student_id)
        .bind(plan_id)
        .bind(period_index)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(count > 0)
    }

    async fn apply_accrual(&self, invoice_no: &str, update: &AccrualUpdate) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET late_fee_amount = ?, status = ?, updated_at = ?
            WHERE invoice_no = ? AND late_fee_amount = ? AND paid_amount = ?
            "#,
        )
        .bind(update.late_fee_amount)
        .bind(update.status.to_string())
        .bind(Utc::now())
        .bind(invoice_no)
        .bind(update.expected_late_fee)
        .bind(update.expected_paid)
        .execute(&self.pool)
        .await
        .map_err(AppError::Database)?;

        if result.rows_affected() == 0 {
            let exists = self.find_by_number(invoice_no).await?.is_some();
            if exists {
                return Err(AppError::conflict(format!(
                    "Invoice '{}' changed concurrently during accrual",
                    invoice_no
                )));
            }
            return Err(AppError::not_found(format!(
                "Invoice '{}' not found",
                invoice_no
            )));
        }

        Ok(())
    }

    async fn cancel(&self, invoice_no: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET status = 'cancelled', updated_at = ?
            WHERE invoice_no = ? AND status = 'issued' AND paid_amount = 0
            "#,
        )
        .bind(Utc::now())
        .bind(invoice_no)
        .execute(&self.pool)
        .await
        .map_err(AppError::Database)?;

        if result.rows_affected() == 0 {
            let exists = self.find_by_number(invoice_no).await?.is_some();
            if exists {
                return Err(AppError::conflict(format!(
                    "Invoice '{}' can only be cancelled while issued and unpaid",
                    invoice_no
                )));
            }
            return Err(AppError::not_found(format!(
                "Invoice '{}' not found",
                invoice_no
            )));
        }

        Ok(())
    }

    async fn replace_plan(&self, plan_id: &str, invoices: &[Invoice]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        sqlx::query(
            r#"
            DELETE pa FROM payment_allocations pa
            JOIN invoices i ON i.invoice_no = pa.invoice_no
            WHERE i.billing_plan_id = ?
            "#,
        )
        .bind(plan_id)
        .execute(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        sqlx::query(
            r#"
            DELETE il FROM invoice_lines il
            JOIN invoices i ON i.invoice_no = il.invoice_no
            WHERE i.billing_plan_id = ?
            "#,
        )
        .bind(plan_id)
        .execute(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        sqlx::query("DELETE FROM invoices WHERE billing_plan_id = ?")
            .bind(plan_id)
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;

        for invoice in invoices {
            Self::insert_invoice_tx(&mut tx, invoice).await?;
        }

        tx.commit().await.map_err(AppError::Database)?;
        Ok(())
    }
}

// Row structs for database mapping

#[derive(Debug, sqlx::FromRow)]
struct InvoiceRow {
    invoice_no: String,
    student_id: String,
    issue_date: NaiveDate,
    due_date: NaiveDate,
    total_amount: Decimal,
    discount_amount: Decimal,
    late_fee_amount: Decimal,
    paid_amount: Decimal,
    status: String,
    billing_plan_id: String,
    period_index: u32,
    sequence_index: u32,
    carried_into: Option<String>,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
}

impl InvoiceRow {
    fn into_invoice(self, lines: Vec<InvoiceLine>) -> Result<Invoice> {
        let status = InvoiceStatus::from_str(&self.status)
            .map_err(|e| AppError::internal(format!("Invalid status in database: {}", e)))?;

        Ok(Invoice {
            invoice_no: self.invoice_no,
            student_id: self.student_id,
            issue_date: self.issue_date,
            due_date: self.due_date,
            lines,
            total_amount: self.total_amount,
            discount_amount: self.discount_amount,
            late_fee_amount: self.late_fee_amount,
            paid_amount: self.paid_amount,
            status,
            metadata: InvoiceMetadata {
                billing_plan_id: self.billing_plan_id,
                period_index: self.period_index,
                sequence_index: self.sequence_index,
                carried_into: self.carried_into,
            },
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LineRow {
    id: String,
    invoice_no: String,
    category: String,
    description: String,
    amount: Decimal,
    income_account: Option<String>,
    carried_from_period: Option<u32>,
}

impl LineRow {
    fn into_line(self) -> Result<InvoiceLine> {
        let category = FeeCategory::from_str(&self.category)
            .map_err(|e| AppError::internal(format!("Invalid category in database: {}", e)))?;

        Ok(InvoiceLine {
            id: self.id,
            invoice_no: self.invoice_no,
            category,
            description: self.description,
            amount: self.amount,
            income_account: self.income_account,
            carried_from_period: self.carried_from_period,
        })
    }
}
