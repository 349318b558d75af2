use crate::calc::format_amount;
use crate::errors::LedgerError;
use crate::ledger::Ledger;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

pub const STATS_PATH: &str = "data/analysis/stats.json";

/// Display class of the to-pay vs. average difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffClass {
    Plus,
    Negative,
}

impl DiffClass {
    pub fn as_str(self) -> &'static str {
        match self {
            DiffClass::Plus => "plus",
            DiffClass::Negative => "negative",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrendReport {
    pub average: f64,
    pub average_display: String,
    pub diff: f64,
    pub diff_display: String,
    pub class: DiffClass,
}

/// Raw datasets kept for charting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Visualization {
    pub cards: BTreeMap<String, Vec<f64>>,
    pub dates: Vec<String>,
    pub stats: Value,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Compares this month's to-pay total with the cross-month average.
/// A month below average is `plus`; anything else is `negative`.
pub fn compare(to_pay: f64, average: f64, currency: &str) -> TrendReport {
    let average = round2(average);
    let diff = round2(to_pay - average);
    let sign = if diff > 0.0 { "+" } else { "" };
    TrendReport {
        average,
        average_display: format!("{currency}{}", format_amount(average)),
        diff,
        diff_display: format!("({sign}{})", format_amount(diff)),
        class: if diff < 0.0 { DiffClass::Plus } else { DiffClass::Negative },
    }
}

impl Ledger {
    /// Fetches the average and the precomputed statistics together and
    /// only reports a trend when both arrive. Compares against a settled
    /// month only.
    pub async fn compute_trends(&mut self) -> Result<&TrendReport, LedgerError> {
        if !self.state.settled {
            return Err(LedgerError::NotSettled(self.state.date.current().to_string()));
        }
        let server = Arc::clone(&self.server);
        let (average, stats) = tokio::join!(server.fetch_average(), server.fetch_stats(STATS_PATH));

        let (average, stats) = match (average, stats) {
            (Ok(average), Ok(stats)) => (average, stats),
            (average, stats) => {
                if let Err(err) = &average {
                    debug!("average request failed: {err}");
                }
                if let Err(err) = &stats {
                    debug!("stats request failed: {err}");
                }
                return Err(LedgerError::PartialTrendFailure {
                    average: average.is_ok(),
                    stats: stats.is_ok(),
                });
            }
        };

        self.state.visualization = Some(Visualization {
            cards: average.cards,
            dates: average.dates,
            stats,
        });
        let report = compare(self.state.totals.to_pay, average.average, &self.state.currency);
        Ok(self.state.trend.insert(report))
    }
}
