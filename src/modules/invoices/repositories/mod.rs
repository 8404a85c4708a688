pub mod billing_plan_repository;
pub mod invoice_repository;

pub use billing_plan_repository::{BillingPlanRepository, MySqlBillingPlanRepository};
pub use invoice_repository::{AccrualUpdate, InvoiceRepository, MySqlInvoiceRepository};
