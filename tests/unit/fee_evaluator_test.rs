// Late-fee rule evaluation: additive stacking, category applicability and
// the grace semantics baked into the stored due date.

#[path = "../helpers/mod.rs"]
mod helpers;

use helpers::{date, fixed_rule, percentage_rule, tuition_invoice};
use rust_decimal_macros::dec;
use temaripay::modules::invoices::models::FeeCategory;
use temaripay::modules::late_fees::models::{LateFeeRule, LateFeeRuleType};
use temaripay::modules::late_fees::services::FeeEvaluator;

fn overdue_invoice() -> temaripay::modules::invoices::models::Invoice {
    tuition_invoice(
        "INV-1",
        "student-1",
        1,
        dec!(1000),
        date(2023, 9, 11),
        date(2023, 10, 11),
    )
}

#[test]
fn test_rules_stack_additively() {
    let invoice = overdue_invoice();
    let rules = vec![fixed_rule(dec!(50), 10), percentage_rule(dec!(10), 10)];

    // 50 flat + 10% of 1000 = 150, both rules charging at once
    let assessment = FeeEvaluator::assess(&invoice, &rules, date(2023, 10, 20));
    assert_eq!(assessment.total, dec!(150));
    assert_eq!(assessment.breakdown.len(), 2);
    assert_eq!(assessment.breakdown[0].amount, dec!(50));
    assert_eq!(assessment.breakdown[1].amount, dec!(100));
}

#[test]
fn test_no_charge_on_or_before_due_date() {
    let invoice = overdue_invoice();
    let rules = vec![fixed_rule(dec!(50), 10)];

    assert_eq!(
        FeeEvaluator::assess(&invoice, &rules, date(2023, 10, 11)).total,
        dec!(0)
    );
    assert_eq!(
        FeeEvaluator::assess(&invoice, &rules, date(2023, 9, 1)).total,
        dec!(0)
    );
    // One day past due is enough; the grace already sits in the due date
    assert_eq!(
        FeeEvaluator::assess(&invoice, &rules, date(2023, 10, 12)).total,
        dec!(50)
    );
}

#[test]
fn test_inactive_rules_never_charge() {
    let invoice = overdue_invoice();
    let mut rule = fixed_rule(dec!(50), 10);
    rule.active = false;

    let assessment = FeeEvaluator::assess(&invoice, &[rule], date(2023, 12, 1));
    assert_eq!(assessment.total, dec!(0));
    assert!(assessment.breakdown.is_empty());
}

#[test]
fn test_category_mismatch_excluded() {
    let invoice = overdue_invoice();
    let transport_only = LateFeeRule::new(
        "Transport penalty",
        LateFeeRuleType::FixedAmount,
        dec!(25),
        5,
        vec![FeeCategory::Transport],
    )
    .unwrap();
    let tuition = fixed_rule(dec!(50), 10);

    let assessment =
        FeeEvaluator::assess(&invoice, &[transport_only.clone(), tuition], date(2023, 12, 1));
    assert_eq!(assessment.total, dec!(50));
    assert_eq!(assessment.breakdown.len(), 1);

    assert!(!FeeEvaluator::any_applicable_rule(&invoice, &[transport_only]));
}

#[test]
fn test_percentage_rounds_to_birr_scale() {
    let invoice = tuition_invoice(
        "INV-1",
        "student-1",
        1,
        dec!(333.33),
        date(2023, 9, 11),
        date(2023, 10, 11),
    );
    let rules = vec![percentage_rule(dec!(2.50), 0)];

    // 2.5% of 333.33 = 8.33325, rounded to 8.33
    let assessment = FeeEvaluator::assess(&invoice, &rules, date(2023, 11, 1));
    assert_eq!(assessment.total, dec!(8.33));
}

#[test]
fn test_percentage_uses_gross_total_not_net() {
    let mut invoice = overdue_invoice();
    invoice.apply_late_fee(dec!(500)).unwrap();

    // The base stays the 1000 principal even with a fee already accrued, so
    // repeated sweeps cannot compound
    let rules = vec![percentage_rule(dec!(10), 10)];
    let assessment = FeeEvaluator::assess(&invoice, &rules, date(2023, 12, 1));
    assert_eq!(assessment.total, dec!(100));
}

#[test]
fn test_shortest_active_grace() {
    let rules = vec![fixed_rule(dec!(50), 10), percentage_rule(dec!(10), 25)];
    assert_eq!(FeeEvaluator::shortest_active_grace(&rules), Some(10));

    let mut inactive = fixed_rule(dec!(50), 1);
    inactive.active = false;
    let rules = vec![inactive, percentage_rule(dec!(10), 25)];
    assert_eq!(FeeEvaluator::shortest_active_grace(&rules), Some(25));

    assert_eq!(FeeEvaluator::shortest_active_grace(&[]), None);
}
