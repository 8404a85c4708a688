pub mod calendar;
pub mod invoices;
pub mod late_fees;
pub mod payments;
pub mod roster;
