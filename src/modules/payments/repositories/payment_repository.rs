use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::MySqlPool;
use std::str::FromStr;

use crate::core::{AppError, Result};
use crate::modules::invoices::models::InvoiceStatus;
use crate::modules::payments::models::{Payment, PaymentAllocation, PaymentMethod};

/// Invoice-side effect of one allocation, applied in the same transaction as
/// the payment insert; `expected_paid` is the optimistic row check
#[derive(Debug, Clone)]
pub struct InvoicePaymentUpdate {
    pub invoice_no: String,
    pub expected_paid: Decimal,
    pub paid_amount: Decimal,
    pub status: InvoiceStatus,
}

/// Persistence boundary for payments and allocations
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Reserve the next monotonic receipt sequence value
    async fn next_receipt_sequence(&self) -> Result<u64>;

    /// Insert the payment, its allocations and the invoice paid-amount
    /// updates in a single transaction; any failed optimistic check rolls
    /// the whole payment back
    async fn create_with_allocations(
        &self,
        payment: &Payment,
        allocations: &[PaymentAllocation],
        invoice_updates: &[InvoicePaymentUpdate],
    ) -> Result<()>;

    async fn find_by_receipt(&self, receipt_no: &str) -> Result<Option<Payment>>;

    async fn allocations_for_invoice(&self, invoice_no: &str) -> Result<Vec<PaymentAllocation>>;

    /// Soft-cancel a payment (the allocations stay for the audit trail)
    async fn cancel(&self, receipt_no: &str) -> Result<()>;
}

pub struct MySqlPaymentRepository {
    pool: MySqlPool,
}

impl MySqlPaymentRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentRepository for MySqlPaymentRepository {
    async fn next_receipt_sequence(&self) -> Result<u64> {
        // LAST_INSERT_ID(expr) makes the increment-and-read atomic per
        // connection
        let mut conn = self.pool.acquire().await.map_err(AppError::Database)?;

        sqlx::query("UPDATE receipt_sequence SET value = LAST_INSERT_ID(value + 1) WHERE id = 1")
            .execute(&mut *conn)
            .await
            .map_err(AppError::Database)?;

        let next: u64 = sqlx::query_scalar("SELECT LAST_INSERT_ID()")
            .fetch_one(&mut *conn)
            .await
            .map_err(AppError::Database)?;

        Ok(next)
    }

    async fn create_with_allocations(
        &self,
        payment: &Payment,
        allocations: &[PaymentAllocation],
        invoice_updates: &[InvoicePaymentUpdate],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        sqlx::query(
            r#"
            INSERT INTO payments (
                receipt_no, student_id, amount, method, reference,
                paid_at, cancelled_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&payment.receipt_no)
        .bind(&payment.student_id)
        .bind(payment.amount)
        .bind(payment.method.to_string())
        .bind(&payment.reference)
        .bind(payment.paid_at)
        .bind(payment.cancelled_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let Some(db_err) = e.as_database_error() {
                if db_err.is_unique_violation() {
                    return AppError::conflict(format!(
                        "Receipt '{}' already exists",
                        payment.receipt_no
                    ));
                }
            }
            AppError::Database(e)
        })?;

        for allocation in allocations {
            sqlx::query(
                r#"
                INSERT INTO payment_allocations (id, receipt_no, invoice_no, amount)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(&allocation.id)
            .bind(&allocation.receipt_no)
            .bind(&allocation.invoice_no)
            .bind(allocation.amount)
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;
        }

        for update in invoice_updates {
            let result = sqlx::query(
                r#"
                UPDATE invoices
                SET paid_amount = ?, status = ?, updated_at = ?
                WHERE invoice_no = ? AND paid_amount = ?
                "#,
            )
            .bind(update.paid_amount)
            .bind(update.status.to_string())
            .bind(Utc::now())
            .bind(&update.invoice_no)
            .bind(update.expected_paid)
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;

            if result.rows_affected() == 0 {
                return Err(AppError::conflict(format!(
                    "Invoice '{}' changed concurrently during allocation",
                    update.invoice_no
                )));
            }
        }

        tx.commit().await.map_err(AppError::Database)?;
        Ok(())
    }

    async fn find_by_receipt(&self, receipt_no: &str) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT receipt_no, student_id, amount, method, reference,
                   paid_at, cancelled_at
            FROM payments
            WHERE receipt_no = ?
            "#,
        )
        .bind(receipt_no)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        row.map(PaymentRow::into_payment).transpose()
    }

    async fn allocations_for_invoice(&self, invoice_no: &str) -> Result<Vec<PaymentAllocation>> {
        let rows = sqlx::query_as::<_, AllocationRow>(
            r#"
            SELECT id, receipt_no, invoice_no, amount
            FROM payment_allocations
            WHERE invoice_no = ?
            ORDER BY id
            "#,
        )
        .bind(invoice_no)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows.into_iter().map(AllocationRow::into_allocation).collect())
    }

    async fn cancel(&self, receipt_no: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE payments SET cancelled_at = ? WHERE receipt_no = ? AND cancelled_at IS NULL",
        )
        .bind(Utc::now())
        .bind(receipt_no)
        .execute(&self.pool)
        .await
        .map_err(AppError::Database)?;

        if result.rows_affected() == 0 {
            let exists = self.find_by_receipt(receipt_no).await?.is_some();
            if exists {
                return Err(AppError::conflict(format!(
                    "Payment '{}' is already cancelled",
                    receipt_no
                )));
            }
            return Err(AppError::not_found(format!(
                "Payment '{}' not found",
                receipt_no
            )));
        }

        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    receipt_no: String,
    student_id: String,
    amount: Decimal,
    method: String,
    reference: Option<String>,
    paid_at: DateTime<Utc>,
    cancelled_at: Option<DateTime<Utc>>,
}

impl PaymentRow {
    fn into_payment(self) -> Result<Payment> {
        let method = PaymentMethod::from_str(&self.method)
            .map_err(|e| AppError::internal(format!("Invalid method in database: {}", e)))?;

        Ok(Payment {
            receipt_no: self.receipt_no,
            student_id: self.student_id,
            amount: self.amount,
            method,
            reference: self.reference,
            paid_at: self.paid_at,
            cancelled_at: self.cancelled_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AllocationRow {
    id: String,
    receipt_no: String,
    invoice_no: String,
    amount: Decimal,
}

impl AllocationRow {
    fn into_allocation(self) -> PaymentAllocation {
        PaymentAllocation {
            id: self.id,
            receipt_no: self.receipt_no,
            invoice_no: self.invoice_no,
            amount: self.amount,
        }
    }
}
