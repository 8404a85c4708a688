pub mod accrual_sweep;
pub mod fee_evaluator;
pub mod rule_service;

pub use accrual_sweep::{AccrualSweep, CancelFlag, SweepSummary};
pub use fee_evaluator::{FeeAssessment, FeeEvaluator};
pub use rule_service::RuleService;
