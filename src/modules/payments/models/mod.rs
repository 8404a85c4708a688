pub mod payment;

pub use payment::{Payment, PaymentAllocation, PaymentMethod};
