pub mod payment_allocator;

pub use payment_allocator::{AllocationOutcome, PaymentAllocator};
