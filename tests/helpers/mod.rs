#![allow(dead_code)]

//! Shared fixtures for the service-level test suites, built on the in-memory
//! repositories so no database is required.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::Arc;

use temaripay::audit::{AuditSink, TracingAuditSink};
use temaripay::config::{BillingConfig, CalendarConfig};
use temaripay::modules::calendar::PeriodCalendar;
use temaripay::modules::invoices::models::{
    BillingPlan, FeeCategory, Invoice, InvoiceLine, InvoiceMetadata,
};
use temaripay::modules::invoices::repositories::{BillingPlanRepository, InvoiceRepository};
use temaripay::modules::invoices::services::{CarryForwardGenerator, InvoiceService};
use temaripay::modules::late_fees::models::{LateFeeRule, LateFeeRuleType};
use temaripay::modules::late_fees::repositories::LateFeeRuleRepository;
use temaripay::modules::late_fees::services::{AccrualSweep, RuleService};
use temaripay::modules::payments::repositories::PaymentRepository;
use temaripay::modules::payments::services::PaymentAllocator;
use temaripay::modules::roster::{AccountResolver, StudentRoster};
use temaripay::testing::InMemoryStore;

/// Synthetic academic year starting 2023-09-11 with 30-day periods and the
/// short thirteenth period
pub fn calendar() -> PeriodCalendar {
    PeriodCalendar::new(CalendarConfig {
        epoch: NaiveDate::from_ymd_opt(2023, 9, 11).unwrap(),
        period_length_days: 30,
        short_period_index: Some(13),
        short_period_days: 5,
    })
}

pub fn billing_config() -> BillingConfig {
    BillingConfig {
        default_grace_days: 30,
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn store() -> Arc<InMemoryStore> {
    Arc::new(InMemoryStore::new())
}

pub fn sweep(store: &Arc<InMemoryStore>) -> AccrualSweep {
    AccrualSweep::new(
        store.clone() as Arc<dyn InvoiceRepository>,
        store.clone() as Arc<dyn LateFeeRuleRepository>,
        Arc::new(TracingAuditSink) as Arc<dyn AuditSink>,
    )
}

pub fn rule_service(store: &Arc<InMemoryStore>) -> RuleService {
    RuleService::new(
        store.clone() as Arc<dyn LateFeeRuleRepository>,
        Arc::new(TracingAuditSink) as Arc<dyn AuditSink>,
    )
}

pub fn generator(store: &Arc<InMemoryStore>) -> CarryForwardGenerator {
    CarryForwardGenerator::new(
        store.clone() as Arc<dyn InvoiceRepository>,
        store.clone() as Arc<dyn BillingPlanRepository>,
        store.clone() as Arc<dyn LateFeeRuleRepository>,
        store.clone() as Arc<dyn StudentRoster>,
        store.clone() as Arc<dyn AccountResolver>,
        calendar(),
        billing_config(),
        Arc::new(TracingAuditSink) as Arc<dyn AuditSink>,
    )
}

pub fn allocator(store: &Arc<InMemoryStore>) -> PaymentAllocator {
    PaymentAllocator::new(
        store.clone() as Arc<dyn InvoiceRepository>,
        store.clone() as Arc<dyn PaymentRepository>,
        Arc::new(TracingAuditSink) as Arc<dyn AuditSink>,
    )
}

pub fn invoice_service(store: &Arc<InMemoryStore>) -> InvoiceService {
    InvoiceService::new(
        store.clone() as Arc<dyn InvoiceRepository>,
        store.clone() as Arc<dyn PaymentRepository>,
        store.clone() as Arc<dyn StudentRoster>,
        Arc::new(sweep(store)),
        Arc::new(TracingAuditSink) as Arc<dyn AuditSink>,
    )
}

pub fn tuition_plan() -> BillingPlan {
    BillingPlan {
        id: "plan-1".to_string(),
        class_id: "grade-5a".to_string(),
        name: "Grade 5 tuition".to_string(),
        category: FeeCategory::Tuition,
        period_fee: Decimal::from(1000),
        first_period: 1,
        period_count: 13,
        active: true,
    }
}

pub fn fixed_rule(value: Decimal, grace: i64) -> LateFeeRule {
    LateFeeRule::new(
        "Flat penalty",
        LateFeeRuleType::FixedAmount,
        value,
        grace,
        vec![FeeCategory::Tuition, FeeCategory::CarriedBalance],
    )
    .unwrap()
}

pub fn percentage_rule(value: Decimal, grace: i64) -> LateFeeRule {
    LateFeeRule::new(
        "Percentage penalty",
        LateFeeRuleType::Percentage,
        value,
        grace,
        vec![FeeCategory::Tuition, FeeCategory::CarriedBalance],
    )
    .unwrap()
}

/// Build a single-line tuition invoice directly, bypassing the generator
pub fn tuition_invoice(
    invoice_no: &str,
    student_id: &str,
    period_index: u32,
    amount: Decimal,
    issue_date: NaiveDate,
    due_date: NaiveDate,
) -> Invoice {
    let lines = vec![InvoiceLine::new(
        invoice_no,
        FeeCategory::Tuition,
        &format!("Tuition period {}", period_index),
        amount,
        None,
    )
    .unwrap()];
    Invoice::new(
        invoice_no,
        student_id,
        issue_date,
        due_date,
        lines,
        Decimal::ZERO,
        InvoiceMetadata {
            billing_plan_id: "plan-1".to_string(),
            period_index,
            sequence_index: period_index,
            carried_into: None,
        },
    )
    .unwrap()
}
