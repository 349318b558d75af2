use crate::ledger::LedgerState;
use crate::render::RenderTree;
use crate::snapshot::Section;

/// Derived totals, recomputed wholesale after every load or edit.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AggregateTotals {
    pub income: f64,
    pub debt: f64,
    pub to_pay: f64,
}

/// Display strings written by the calculation passes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overview {
    pub month_title: String,
    pub income: String,
    pub debt_header: String,
    pub debt_total: String,
    pub to_pay_header: String,
    pub to_pay_total: String,
    pub short: String,
    pub short_class: &'static str,
    pub left: String,
    pub notes_header: String,
}

/// Computes the month's income from what is rendered.
pub trait PayrollCalculator: Send + Sync {
    fn compute_income(&self, tree: &RenderTree) -> f64;
}

/// Income is the income section plus whatever investments are rendered.
#[derive(Debug, Clone, Copy, Default)]
pub struct SectionIncome;

impl PayrollCalculator for SectionIncome {
    fn compute_income(&self, tree: &RenderTree) -> f64 {
        tree.sum(Section::Income) + tree.sum(Section::Investments)
    }
}

/// Two-decimal display of an amount. Negative zero prints as `0.00`.
pub fn format_amount(value: f64) -> String {
    format!("{:.2}", value + 0.0)
}

pub fn income(state: &mut LedgerState, payroll: &dyn PayrollCalculator) -> String {
    let total = payroll.compute_income(&state.tree);
    state.totals.income = total;
    let text = format_amount(total);
    state.overview.income = format!("{}{text}", state.currency);
    text
}

pub fn debt(state: &mut LedgerState) -> String {
    let total = state.tree.sum(Section::Debt);
    state.totals.debt = total;
    let text = format_amount(total);
    state.overview.debt_header = format!(": {}{text}", state.currency);
    state.overview.debt_total = format!("Total: {}{text}", state.currency);
    text
}

pub fn to_pay(state: &mut LedgerState) -> String {
    let total = state.tree.sum(Section::ToPay);
    state.totals.to_pay = total;
    let text = format_amount(total);
    state.overview.to_pay_header = format!(": {}{text}", state.currency);
    state.overview.to_pay_total = format!("Total: {}{text}", state.currency);
    text
}

/// Runs income, debt and to-pay, in that order.
pub fn init(state: &mut LedgerState, payroll: &dyn PayrollCalculator) {
    income(state, payroll);
    debt(state);
    to_pay(state);
}

/// Income minus to-pay, and what is still unpaid this month.
pub fn update_overview(state: &mut LedgerState) {
    let difference = state.totals.income - state.totals.to_pay;
    state.overview.short = format!("{}{}", state.currency, format_amount(difference));
    state.overview.short_class = if difference < 0.0 { "minus" } else { "plus" };

    let left: f64 = state
        .tree
        .fields_in(Section::ToPay)
        .into_iter()
        .filter(|(_, entry)| entry.paid != Some(true))
        .filter_map(|(_, entry)| entry.numeric())
        .fold(0.0, |acc, value| acc + value);
    state.overview.left = format!("{}{}", state.currency, format_amount(left));
    state.overview.month_title = state.date.month_name();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date::DateController;
    use crate::models::ModelRef;
    use crate::render::Renderer;
    use crate::snapshot::Snapshot;
    use chrono::NaiveDate;
    use serde_json::json;

    fn state_for(doc: serde_json::Value) -> LedgerState {
        let mut state = LedgerState::new(
            DateController::at(NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()),
            "$",
        );
        let snapshot = Snapshot::parse("test", &doc).unwrap();
        let mut renderer = Renderer::new(&mut state.tree, &state.date);
        for (section, value) in &snapshot.sections {
            renderer.render_section(*section, value, ModelRef::Local {
                section: section.key().to_string(),
            });
        }
        state
    }

    #[test]
    fn scenario_debt_and_missing_to_pay() {
        let mut state = state_for(json!({
            "income": {"paycheck": 2000},
            "debt": {"credit_cards": {"visa": {"bofa_cash": 150}}}
        }));
        init(&mut state, &SectionIncome);
        assert_eq!(debt(&mut state), "150.00");
        assert_eq!(to_pay(&mut state), "0.00");
        assert_eq!(state.overview.debt_header, ": $150.00");
        assert_eq!(state.overview.debt_total, "Total: $150.00");
        assert_eq!(state.totals.income, 2000.0);
    }

    #[test]
    fn empty_sections_print_positive_zero() {
        let mut state = state_for(json!({}));
        init(&mut state, &SectionIncome);
        update_overview(&mut state);
        assert_eq!(state.overview.income, "$0.00");
        assert_eq!(state.overview.debt_total, "Total: $0.00");
        assert_eq!(state.overview.to_pay_header, ": $0.00");
        assert_eq!(state.overview.left, "$0.00");
        assert_eq!(state.overview.short, "$0.00");
        assert_eq!(format_amount(-0.0), "0.00");
        assert!(state.tree.sum(Section::Debt).is_sign_positive());
    }

    #[test]
    fn sums_at_full_precision_and_rounds_on_write() {
        let mut state = state_for(json!({
            "debt": {"a": 0.105, "b": 0.105, "c": 0.105}
        }));
        assert_eq!(debt(&mut state), format!("{:.2}", 0.105 + 0.105 + 0.105));
        assert!((state.totals.debt - 0.315).abs() < 1e-9);
    }

    #[test]
    fn overview_tracks_short_and_unpaid() {
        let mut state = state_for(json!({
            "income": {"paycheck": 1000},
            "to_pay": {
                "bills": {
                    "rent": {"value": 900, "paid": true},
                    "power": {"value": 150, "paid": false},
                    "phone": 40
                }
            }
        }));
        init(&mut state, &SectionIncome);
        update_overview(&mut state);
        assert_eq!(state.totals.to_pay, 1090.0);
        assert_eq!(state.overview.short, "$-90.00");
        assert_eq!(state.overview.short_class, "minus");
        assert_eq!(state.overview.left, "$190.00");
        assert_eq!(state.overview.month_title, "January");
    }

    struct FixedPayroll(f64);

    impl PayrollCalculator for FixedPayroll {
        fn compute_income(&self, _tree: &RenderTree) -> f64 {
            self.0
        }
    }

    #[test]
    fn income_delegates_to_payroll() {
        let mut state = state_for(json!({"income": {"paycheck": 2000}}));
        assert_eq!(income(&mut state, &FixedPayroll(3210.5)), "3210.50");
        assert_eq!(state.overview.income, "$3210.50");
    }
}
