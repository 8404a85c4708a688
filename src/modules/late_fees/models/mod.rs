pub mod late_fee_rule;

pub use late_fee_rule::{LateFeeRule, LateFeeRuleType, MAX_ACTIVE_RULES};
