use std::str::FromStr;
use std::sync::Arc;

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::core::AppError;
use crate::modules::payments::models::PaymentMethod;
use crate::modules::payments::services::payment_allocator::PaymentAllocator;

/// Body for recording a payment at the cashier window
#[derive(Debug, Deserialize)]
pub struct RecordPaymentRequest {
    pub student_id: String,
    /// 2-dp decimal string, e.g. "1500.00"
    pub amount: String,
    pub method: String,
    /// Bank slip, mobile-money id or cheque number
    pub reference: Option<String>,
}

/// Record a payment and allocate it oldest-due-first
/// POST /payments
pub async fn record_payment(
    allocator: web::Data<Arc<PaymentAllocator>>,
    request: web::Json<RecordPaymentRequest>,
) -> Result<HttpResponse, AppError> {
    let request = request.into_inner();
    let method = PaymentMethod::from_str(&request.method).map_err(AppError::validation)?;

    let outcome = allocator
        .record_payment(
            &request.student_id,
            &request.amount,
            method,
            request.reference,
            "api",
        )
        .await?;
    Ok(HttpResponse::Created().json(outcome))
}

/// Configure payment routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/payments").route("", web::post().to(record_payment)));
}
