use crate::models::AverageReport;
use crate::snapshot::{FieldValue, Section};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

const CREDIT_CARDS: &str = "/debt/credit_cards";

/// Averages the to-pay totals of the given months and collects each credit
/// card's balance per month. Months without a card report `0` for it so
/// every series lines up with `dates`.
pub fn build_average(months: &[(String, Value)]) -> AverageReport {
    let mut totals = Vec::with_capacity(months.len());
    let mut balances = Vec::with_capacity(months.len());
    let mut names = BTreeSet::new();

    for (key, document) in months {
        totals.push(to_pay_total(key, document));
        let cards = card_balances(key, document);
        names.extend(cards.keys().cloned());
        balances.push(cards);
    }

    let average = if totals.is_empty() {
        0.0
    } else {
        totals.iter().fold(0.0, |acc, total| acc + total) / totals.len() as f64
    };

    let cards = names
        .into_iter()
        .map(|name| {
            let series = balances
                .iter()
                .map(|month| month.get(&name).copied().unwrap_or(0.0))
                .collect();
            (name, series)
        })
        .collect();

    AverageReport {
        average,
        cards,
        dates: months.iter().map(|(key, _)| key.clone()).collect(),
    }
}

fn total(month_key: &str, value: &Value) -> f64 {
    match FieldValue::parse(month_key, value) {
        Ok(parsed) => parsed.total(),
        Err(err) => {
            warn!("{err}");
            0.0
        }
    }
}

fn to_pay_total(month_key: &str, document: &Value) -> f64 {
    document
        .get(Section::ToPay.key())
        .map_or(0.0, |section| total(month_key, section))
}

fn card_balances(month_key: &str, document: &Value) -> BTreeMap<String, f64> {
    let Some(Value::Object(cards)) = document.pointer(CREDIT_CARDS) else {
        return BTreeMap::new();
    };
    cards
        .iter()
        .map(|(name, card)| (name.clone(), total(month_key, card)))
        .collect()
}
