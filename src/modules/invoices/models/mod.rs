pub mod billing_plan;
pub mod invoice;
pub mod line_item;

pub use billing_plan::BillingPlan;
pub use invoice::{Invoice, InvoiceMetadata, InvoiceStatus};
pub use line_item::{FeeCategory, InvoiceLine};
