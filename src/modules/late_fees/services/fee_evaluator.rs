use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::core::money;
use crate::modules::invoices::models::Invoice;
use crate::modules::late_fees::models::{LateFeeRule, LateFeeRuleType};

/// One rule's contribution to an assessment
#[derive(Debug, Clone, PartialEq)]
pub struct RuleCharge {
    pub rule_id: String,
    pub amount: Decimal,
}

/// Result of evaluating the rule set against one invoice
#[derive(Debug, Clone)]
pub struct FeeAssessment {
    pub total: Decimal,
    pub breakdown: Vec<RuleCharge>,
}

impl FeeAssessment {
    pub fn zero() -> Self {
        Self {
            total: Decimal::ZERO,
            breakdown: Vec::new(),
        }
    }
}

/// Pure evaluation of the late-fee rule set
///
/// The stored due date already includes the shortest active grace period
/// (applied at invoice creation), so rules charge as soon as the assessment
/// date passes it. Rules stack additively; they are not exclusive tiers.
pub struct FeeEvaluator;

impl FeeEvaluator {
    /// Assess the fee owed by `invoice` under `rules` as of `as_of`
    ///
    /// Returns a zero assessment when the invoice is not yet past due or no
    /// active rule matches its line categories. The caller decides what a
    /// zero result means; it must never be written over a non-zero stored
    /// fee outside the explicit deactivation-rollback path.
    pub fn assess(invoice: &Invoice, rules: &[LateFeeRule], as_of: NaiveDate) -> FeeAssessment {
        let days_past_due = (as_of - invoice.due_date).num_days();
        if days_past_due <= 0 {
            return FeeAssessment::zero();
        }

        let categories = invoice.line_categories();
        let mut breakdown = Vec::new();
        let mut total = Decimal::ZERO;

        for rule in rules.iter().filter(|r| r.active) {
            if !rule.applies_to_any(&categories) {
                continue;
            }
            let amount = match rule.rule_type {
                LateFeeRuleType::FixedAmount => rule.value,
                LateFeeRuleType::Percentage => {
                    money::round(invoice.total_amount * rule.value / Decimal::from(100))
                }
            };
            total += amount;
            breakdown.push(RuleCharge {
                rule_id: rule.id.clone(),
                amount,
            });
        }

        FeeAssessment { total, breakdown }
    }

    /// Whether any active rule matches the invoice's line categories at all,
    /// regardless of dates. Distinguishes "nothing applies anymore"
    /// (deactivation rollback) from "nothing to charge today".
    pub fn any_applicable_rule(invoice: &Invoice, rules: &[LateFeeRule]) -> bool {
        let categories = invoice.line_categories();
        rules
            .iter()
            .any(|r| r.active && r.applies_to_any(&categories))
    }

    /// Shortest grace period among active rules, used when computing a new
    /// invoice's due date
    pub fn shortest_active_grace(rules: &[LateFeeRule]) -> Option<i64> {
        rules
            .iter()
            .filter(|r| r.active)
            .map(|r| r.grace_period_days)
            .min()
    }
}
