use std::str::FromStr;
use std::sync::Arc;

use actix_web::{web, HttpResponse};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::core::{money, AppError};
use crate::modules::invoices::models::{BillingPlan, FeeCategory};
use crate::modules::invoices::services::carry_forward::CarryForwardGenerator;
use crate::modules::invoices::services::invoice_service::InvoiceService;

/// Body for registering a billing plan
#[derive(Debug, Deserialize)]
pub struct CreatePlanRequest {
    pub id: String,
    pub class_id: String,
    pub name: String,
    pub category: String,
    /// 2-dp decimal string
    pub period_fee: String,
    pub first_period: u32,
    pub period_count: u32,
}

impl CreatePlanRequest {
    fn into_plan(self) -> Result<BillingPlan, AppError> {
        let category = FeeCategory::from_str(&self.category).map_err(AppError::validation)?;
        let period_fee: Decimal = money::parse_amount(&self.period_fee)?;
        Ok(BillingPlan {
            id: self.id,
            class_id: self.class_id,
            name: self.name,
            category,
            period_fee,
            first_period: self.first_period,
            period_count: self.period_count,
            active: true,
        })
    }
}

/// Optional assessment date, defaulting to today
#[derive(Debug, Deserialize)]
pub struct AsOfQuery {
    pub as_of: Option<NaiveDate>,
}

impl AsOfQuery {
    fn resolve(&self) -> NaiveDate {
        self.as_of.unwrap_or_else(|| Utc::now().date_naive())
    }
}

#[derive(Debug, Deserialize)]
pub struct RegenerateRequest {
    pub through_period: u32,
}

/// Register a billing plan
/// POST /billing-plans
pub async fn create_plan(
    generator: web::Data<Arc<CarryForwardGenerator>>,
    request: web::Json<CreatePlanRequest>,
) -> Result<HttpResponse, AppError> {
    let plan = generator
        .create_plan(request.into_inner().into_plan()?, "api")
        .await?;
    Ok(HttpResponse::Created().json(plan))
}

/// Generate one period's invoices for every billable student in the plan
/// POST /billing-plans/{id}/periods/{period}/generate
pub async fn generate_period(
    generator: web::Data<Arc<CarryForwardGenerator>>,
    path: web::Path<(String, u32)>,
    query: web::Query<AsOfQuery>,
) -> Result<HttpResponse, AppError> {
    let (plan_id, period_index) = path.into_inner();
    let summary = generator
        .generate_for_plan(&plan_id, period_index, query.resolve())
        .await?;
    Ok(HttpResponse::Ok().json(summary))
}

/// Rebuild a plan's invoices from scratch, discarding recorded payments
/// POST /billing-plans/{id}/regenerate
pub async fn regenerate_plan(
    generator: web::Data<Arc<CarryForwardGenerator>>,
    path: web::Path<String>,
    query: web::Query<AsOfQuery>,
    request: web::Json<RegenerateRequest>,
) -> Result<HttpResponse, AppError> {
    let summary = generator
        .regenerate_plan(&path.into_inner(), request.through_period, query.resolve())
        .await?;
    Ok(HttpResponse::Ok().json(summary))
}

/// Get one invoice
/// GET /invoices/{invoice_no}
pub async fn get_invoice(
    service: web::Data<Arc<InvoiceService>>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let view = service.find(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(view))
}

/// Cancel a mistakenly issued invoice
/// POST /invoices/{invoice_no}/cancel
pub async fn cancel_invoice(
    service: web::Data<Arc<InvoiceService>>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let invoice_no = path.into_inner();
    service.cancel(&invoice_no, "api").await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Overview filters: assessment date and an optional single period
#[derive(Debug, Deserialize)]
pub struct OverviewQuery {
    pub as_of: Option<NaiveDate>,
    pub period: Option<u32>,
}

impl OverviewQuery {
    fn resolve(&self) -> NaiveDate {
        self.as_of.unwrap_or_else(|| Utc::now().date_naive())
    }
}

/// A student's invoices and outstanding balance, fees freshened first
/// GET /students/{student_id}/overview
pub async fn student_overview(
    service: web::Data<Arc<InvoiceService>>,
    path: web::Path<String>,
    query: web::Query<OverviewQuery>,
) -> Result<HttpResponse, AppError> {
    let overview = service
        .student_overview(&path.into_inner(), query.period, query.resolve())
        .await?;
    Ok(HttpResponse::Ok().json(overview))
}

/// Outstanding balances across a whole class
/// GET /classes/{class_id}/overview
pub async fn class_overview(
    service: web::Data<Arc<InvoiceService>>,
    path: web::Path<String>,
    query: web::Query<OverviewQuery>,
) -> Result<HttpResponse, AppError> {
    let overview = service
        .class_overview(&path.into_inner(), query.period, query.resolve())
        .await?;
    Ok(HttpResponse::Ok().json(overview))
}

/// Configure invoice and billing-plan routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/billing-plans")
            .route("", web::post().to(create_plan))
            .route(
                "/{id}/periods/{period}/generate",
                web::post().to(generate_period),
            )
            .route("/{id}/regenerate", web::post().to(regenerate_plan)),
    )
    .service(
        web::scope("/invoices")
            .route("/{invoice_no}", web::get().to(get_invoice))
            .route("/{invoice_no}/cancel", web::post().to(cancel_invoice)),
    )
    .service(
        web::scope("/students").route("/{student_id}/overview", web::get().to(student_overview)),
    )
    .service(
        web::scope("/classes").route("/{class_id}/overview", web::get().to(class_overview)),
    );
}
