pub mod carry_forward;
pub mod invoice_service;

pub use carry_forward::{CarryForwardGenerator, GenerationSummary};
pub use invoice_service::{ClassOverview, InvoiceService, InvoiceView, StudentOverview};
