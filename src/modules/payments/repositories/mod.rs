pub mod payment_repository;

pub use payment_repository::{InvoicePaymentUpdate, MySqlPaymentRepository, PaymentRepository};
