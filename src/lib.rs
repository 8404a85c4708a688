//! TemariPay: billing and late-fee accrual engine for school administration.
//!
//! Generates period invoices on the Ethiopian academic calendar, accrues
//! stacking late-fee penalties, carries unresolved balances forward between
//! periods and allocates payments oldest due date first.

pub mod audit;
pub mod config;
pub mod core;
pub mod modules;
pub mod testing;
