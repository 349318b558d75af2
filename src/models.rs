use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Document that owns an entry: the month file itself or a remote fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelRef {
    Local { section: String },
    Remote { file: String, scope: Option<String> },
}

impl ModelRef {
    pub fn is_remote(&self) -> bool {
        matches!(self, ModelRef::Remote { .. })
    }

    /// Top-level key inside the owning document, if any.
    pub fn scope(&self) -> Option<&str> {
        match self {
            ModelRef::Local { section } => Some(section),
            ModelRef::Remote { scope, .. } => scope.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistRequest {
    pub model: ModelRef,
    pub category: String,
    pub key: String,
    pub value: Value,
    pub parent_category: Option<String>,
    pub is_object_field: bool,
    pub month_key: String,
    /// Keys from the model scope down to the entry's container.
    #[serde(default)]
    pub path: Vec<String>,
    /// Sub-field of the entry to set instead of the entry itself (`paid`).
    #[serde(default)]
    pub field: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteRecord {
    pub model: ModelRef,
    pub category: String,
    pub key: String,
    pub value: String,
    pub source_file: Option<String>,
    pub entry_point: Option<String>,
    pub source_date: Option<String>,
    pub current_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteCategoryRequest {
    pub model: ModelRef,
    pub category: String,
    pub current_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMonth {
    pub last_month: String,
    pub file: String,
    pub raw_date: String,
    pub raw_date_last: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AverageReport {
    pub average: f64,
    pub cards: BTreeMap<String, Vec<f64>>,
    pub dates: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MonthExists {
    pub exists: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,
}
