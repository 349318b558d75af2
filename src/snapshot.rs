use crate::errors::LedgerError;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Known top-level sections of a month document, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Section {
    Income,
    Checking,
    Investments,
    Debt,
    ToPay,
    Notes,
}

impl Section {
    pub const ALL: [Section; 6] = [
        Section::Income,
        Section::Checking,
        Section::Investments,
        Section::Debt,
        Section::ToPay,
        Section::Notes,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Section::Income => "income",
            Section::Checking => "checking",
            Section::Investments => "investments",
            Section::Debt => "debt",
            Section::ToPay => "to_pay",
            Section::Notes => "notes",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|section| section.key() == key)
    }

    pub fn title(self) -> String {
        label(self.key())
    }
}

/// Due-date metadata attached to an entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schedule {
    pub date: Option<u32>,
    pub paid: Option<bool>,
    pub next_month: Option<bool>,
    pub link: Option<String>,
}

/// Leaf object such as `{value, info}` or `{date, paid, next_month, link}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Detail {
    pub value: Option<f64>,
    pub info: Option<String>,
    pub schedule: Schedule,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    Detail(Detail),
    Nested(Vec<(String, FieldValue)>),
    Remote(String),
}

const DETAIL_KEYS: [&str; 6] = ["value", "info", "date", "paid", "next_month", "link"];
/// Members that only a leaf carries; other members beside them are ignored.
const LEAF_MARKERS: [&str; 4] = ["value", "date", "paid", "next_month"];

impl FieldValue {
    /// Validates a JSON value into the tagged union.
    pub fn parse(path: &str, value: &Value) -> Result<Self, LedgerError> {
        match value {
            Value::Number(number) => number
                .as_f64()
                .map(FieldValue::Number)
                .ok_or_else(|| schema(path, "number out of range")),
            Value::String(text) => Ok(FieldValue::Text(text.clone())),
            Value::Array(items) => {
                let children = items
                    .iter()
                    .enumerate()
                    .filter_map(|(index, item)| parse_child(path, &index.to_string(), item))
                    .collect();
                Ok(FieldValue::Nested(children))
            }
            Value::Object(map) => Self::parse_object(path, map),
            Value::Bool(_) | Value::Null => Err(schema(path, "expected number, text or object")),
        }
    }

    fn parse_object(path: &str, map: &Map<String, Value>) -> Result<Self, LedgerError> {
        if map.get("remote").and_then(Value::as_bool).unwrap_or(false) {
            return match map.get("file").and_then(Value::as_str) {
                Some(file) if !file.is_empty() => Ok(FieldValue::Remote(file.to_string())),
                _ => Err(schema(path, "remote section without a file")),
            };
        }

        let all_detail = !map.is_empty() && map.keys().all(|key| DETAIL_KEYS.contains(&key.as_str()));
        if all_detail || LEAF_MARKERS.iter().any(|marker| map.contains_key(*marker)) {
            for key in map.keys().filter(|key| !DETAIL_KEYS.contains(&key.as_str())) {
                debug!("ignoring member {key} of {path}");
            }
            return parse_detail(path, map).map(FieldValue::Detail);
        }

        let children = map
            .iter()
            .filter(|(key, _)| key.as_str() != "remote" && key.as_str() != "file")
            .filter_map(|(key, child)| parse_child(path, key, child))
            .collect();
        Ok(FieldValue::Nested(children))
    }

    /// Numeric amount carried by this value, if any.
    pub fn amount(&self) -> Option<f64> {
        match self {
            FieldValue::Number(value) => Some(*value),
            FieldValue::Detail(detail) => detail.value,
            _ => None,
        }
    }

    pub fn has_info(&self) -> bool {
        matches!(self, FieldValue::Detail(Detail { info: Some(_), .. }))
    }

    /// Sum of every amount at or below this value.
    pub fn total(&self) -> f64 {
        match self {
            FieldValue::Nested(children) => children
                .iter()
                .fold(0.0, |acc, (_, child)| acc + child.total()),
            other => other.amount().unwrap_or(0.0),
        }
    }
}

/// Parses one member of a container. A malformed member is logged and left
/// out so its siblings still count.
fn parse_child(path: &str, key: &str, value: &Value) -> Option<(String, FieldValue)> {
    match FieldValue::parse(&format!("{path}.{key}"), value) {
        Ok(parsed) => Some((key.to_string(), parsed)),
        Err(err) => {
            warn!("skipping {err}");
            None
        }
    }
}

fn parse_detail(path: &str, map: &Map<String, Value>) -> Result<Detail, LedgerError> {
    let value = match map.get("value") {
        None | Some(Value::Null) => None,
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => Some(
            text.trim()
                .parse::<f64>()
                .map_err(|_| schema(path, "value is not numeric"))?,
        ),
        Some(_) => return Err(schema(path, "value is not numeric")),
    };
    let date = match map.get("date") {
        None => None,
        Some(Value::Number(number)) => number.as_u64().map(|day| day as u32),
        Some(Value::String(text)) => text.trim().parse::<u32>().ok(),
        Some(_) => return Err(schema(path, "date must be a day of month")),
    };

    Ok(Detail {
        value,
        info: map.get("info").and_then(Value::as_str).map(str::to_string),
        schedule: Schedule {
            date,
            paid: map.get("paid").and_then(Value::as_bool),
            next_month: map.get("next_month").and_then(Value::as_bool),
            link: map.get("link").and_then(Value::as_str).map(str::to_string),
        },
    })
}

fn schema(path: &str, reason: &str) -> LedgerError {
    LedgerError::Schema {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

/// A parsed month document keyed by known section.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub sections: BTreeMap<Section, FieldValue>,
}

impl Snapshot {
    /// Builds the section lookup table for one document. Sections that fail
    /// validation are logged and left out so the rest of the month renders.
    pub fn parse(path: &str, document: &Value) -> Result<Self, LedgerError> {
        let map = document
            .as_object()
            .ok_or_else(|| schema(path, "month document must be an object"))?;

        let mut sections = BTreeMap::new();
        for (key, value) in map {
            let Some(section) = Section::from_key(key) else {
                debug!("ignoring unknown section {key} in {path}");
                continue;
            };
            match FieldValue::parse(&format!("{path}:{key}"), value) {
                Ok(parsed) => {
                    sections.insert(section, parsed);
                }
                Err(err) => warn!("skipping section {key}: {err}"),
            }
        }
        Ok(Self { sections })
    }

    pub fn get(&self, section: Section) -> Option<&FieldValue> {
        self.sections.get(&section)
    }

    /// Remote file backing a section, when the section is a reference.
    pub fn remote_file(&self, section: Section) -> Option<&str> {
        match self.sections.get(&section) {
            Some(FieldValue::Remote(file)) => Some(file),
            _ => None,
        }
    }
}

/// Selects the fragment of a fetched remote document that belongs to `key`.
/// Remote files are usually keyed like a month document; bare fragments are
/// accepted as-is.
pub fn parse_fragment(path: &str, key: &str, document: &Value) -> Result<(FieldValue, bool), LedgerError> {
    match document.get(key) {
        Some(inner) if document.is_object() => Ok((FieldValue::parse(path, inner)?, true)),
        _ => Ok((FieldValue::parse(path, document)?, false)),
    }
}

/// True for keys like `0`, `12`: anonymous list items.
pub fn is_index_key(key: &str) -> bool {
    !key.is_empty()
        && key.bytes().all(|byte| byte.is_ascii_digit())
        && (key == "0" || !key.starts_with('0'))
}

/// `credit_cards` -> `Credit cards`.
pub fn label(key: &str) -> String {
    let spaced = key.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `bofa cash` -> `Bofa Cash`.
pub fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_classifies_leaf_nested_and_remote() {
        let doc = json!({
            "income": {"paycheck": 2000},
            "debt": {"credit_cards": {"visa": {"bofa_cash": 150}}},
            "notes": {"remote": true, "file": "notes/2024_01.json"},
            "weather": "sunny"
        });
        let snapshot = Snapshot::parse("data/2024_01.json", &doc).unwrap();
        assert_eq!(snapshot.sections.len(), 3);
        assert_eq!(snapshot.remote_file(Section::Notes), Some("notes/2024_01.json"));
        assert_eq!(
            snapshot.get(Section::Income),
            Some(&FieldValue::Nested(vec![("paycheck".into(), FieldValue::Number(2000.0))]))
        );
    }

    #[test]
    fn parse_reads_detail_objects() {
        let value = FieldValue::parse("t", &json!({"value": "12.5", "info": "gym"})).unwrap();
        assert_eq!(value.amount(), Some(12.5));
        assert!(value.has_info());

        let value = FieldValue::parse("t", &json!({"date": 15, "paid": false, "next_month": true})).unwrap();
        let FieldValue::Detail(detail) = value else { panic!("expected detail") };
        assert_eq!(detail.value, None);
        assert_eq!(detail.schedule.date, Some(15));
        assert_eq!(detail.schedule.paid, Some(false));
    }

    #[test]
    fn invalid_section_is_skipped_not_fatal() {
        let doc = json!({"income": true, "debt": {"car": 10}});
        let snapshot = Snapshot::parse("x", &doc).unwrap();
        assert!(snapshot.get(Section::Income).is_none());
        assert!(snapshot.get(Section::Debt).is_some());
        assert!(Snapshot::parse("x", &json!([1, 2])).is_err());
    }

    #[test]
    fn invalid_member_is_skipped_without_losing_siblings() {
        let doc = json!({"income": {"paycheck": true, "bonus": 300}});
        let snapshot = Snapshot::parse("x", &doc).unwrap();
        assert_eq!(
            snapshot.get(Section::Income),
            Some(&FieldValue::Nested(vec![("bonus".into(), FieldValue::Number(300.0))]))
        );
    }

    #[test]
    fn detail_with_extra_members_stays_a_leaf() {
        let doc = json!({
            "to_pay": {"bills": {"rent": {"value": 900, "paid": true, "memo": "landlord"}, "power": 80}}
        });
        let snapshot = Snapshot::parse("x", &doc).unwrap();
        let to_pay = snapshot.get(Section::ToPay).expect("to_pay kept");
        assert_eq!(to_pay.total(), 980.0);

        let FieldValue::Nested(sections) = to_pay else { panic!("expected nested") };
        let FieldValue::Nested(bills) = &sections[0].1 else { panic!("expected bills") };
        let rent = bills.iter().find(|(key, _)| key == "rent").map(|(_, value)| value);
        let Some(FieldValue::Detail(detail)) = rent else { panic!("expected rent detail") };
        assert_eq!(detail.value, Some(900.0));
        assert_eq!(detail.schedule.paid, Some(true));
    }

    #[test]
    fn empty_container_totals_positive_zero() {
        assert!(FieldValue::Nested(Vec::new()).total().is_sign_positive());
    }

    #[test]
    fn remote_without_file_is_rejected() {
        assert!(FieldValue::parse("x", &json!({"remote": true})).is_err());
    }

    #[test]
    fn fragment_prefers_matching_key() {
        let doc = json!({"notes": {"groceries": ["milk"]}});
        let (value, keyed) = parse_fragment("n", "notes", &doc).unwrap();
        assert!(keyed);
        assert!(matches!(value, FieldValue::Nested(_)));
        let (_, keyed) = parse_fragment("n", "due_dates", &doc).unwrap();
        assert!(!keyed);
    }

    #[test]
    fn key_helpers() {
        assert!(is_index_key("0"));
        assert!(is_index_key("17"));
        assert!(!is_index_key("07"));
        assert!(!is_index_key("visa"));
        assert_eq!(label("credit_cards"), "Credit cards");
        assert_eq!(title_case("bofa cash"), "Bofa Cash");
    }
}
