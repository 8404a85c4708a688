use std::str::FromStr;
use std::sync::Arc;

use actix_web::{web, HttpResponse};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use crate::core::{money, AppError};
use crate::modules::invoices::models::FeeCategory;
use crate::modules::late_fees::models::{LateFeeRule, LateFeeRuleType};
use crate::modules::late_fees::services::accrual_sweep::{AccrualSweep, CancelFlag};
use crate::modules::late_fees::services::rule_service::RuleService;

/// Body for creating a late-fee rule
#[derive(Debug, Deserialize)]
pub struct CreateRuleRequest {
    pub name: String,
    pub rule_type: String,
    /// Flat birr amount or percentage, as a decimal string
    pub value: String,
    pub grace_period_days: i64,
    pub applies_to: Vec<String>,
}

impl CreateRuleRequest {
    fn into_rule(self) -> Result<LateFeeRule, AppError> {
        let rule_type = LateFeeRuleType::from_str(&self.rule_type).map_err(AppError::validation)?;
        let value = money::parse_amount(&self.value)?;
        let applies_to = self
            .applies_to
            .iter()
            .map(|s| FeeCategory::from_str(s).map_err(AppError::validation))
            .collect::<Result<Vec<_>, _>>()?;
        LateFeeRule::new(&self.name, rule_type, value, self.grace_period_days, applies_to)
    }
}

#[derive(Debug, Deserialize)]
pub struct SweepQuery {
    pub as_of: Option<NaiveDate>,
}

/// Create an active late-fee rule
/// POST /late-fee-rules
pub async fn create_rule(
    service: web::Data<Arc<RuleService>>,
    request: web::Json<CreateRuleRequest>,
) -> Result<HttpResponse, AppError> {
    let rule = service
        .create_rule(request.into_inner().into_rule()?, "api")
        .await?;
    Ok(HttpResponse::Created().json(rule))
}

/// List all rules, active and inactive
/// GET /late-fee-rules
pub async fn list_rules(
    service: web::Data<Arc<RuleService>>,
) -> Result<HttpResponse, AppError> {
    let rules = service.list_rules().await?;
    Ok(HttpResponse::Ok().json(rules))
}

/// Deactivate a rule; the next sweep reassesses open invoices without it
/// POST /late-fee-rules/{id}/deactivate
pub async fn deactivate_rule(
    service: web::Data<Arc<RuleService>>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    service.deactivate_rule(&path.into_inner(), "api").await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Run an accrual sweep over all open invoices
/// POST /accruals/sweep
pub async fn run_sweep(
    sweep: web::Data<Arc<AccrualSweep>>,
    query: web::Query<SweepQuery>,
) -> Result<HttpResponse, AppError> {
    let as_of = query.as_of.unwrap_or_else(|| Utc::now().date_naive());
    let summary = sweep.run(as_of, &CancelFlag::new()).await?;
    Ok(HttpResponse::Ok().json(summary))
}

/// Configure late-fee routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/late-fee-rules")
            .route("", web::post().to(create_rule))
            .route("", web::get().to(list_rules))
            .route("/{id}/deactivate", web::post().to(deactivate_rule)),
    )
    .service(web::scope("/accruals").route("/sweep", web::post().to(run_sweep)));
}
