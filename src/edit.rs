use crate::errors::LedgerError;
use crate::ledger::Ledger;
use crate::models::PersistRequest;
use crate::render::{EntryValue, FieldEntry, NodeId, Origin};
use crate::snapshot::Section;
use serde_json::{Value, json};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum EditOutcome {
    Persisted { value: f64 },
    NoteUpdated,
}

/// Strips a leading currency symbol and parses what is left.
pub fn parse_amount(raw: &str, currency: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix(currency).unwrap_or(trimmed).trim();
    trimmed.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Maps an entry back to the document, category and key it came from.
pub fn persist_request(
    key: &str,
    origin: &Origin,
    value: Value,
    month_key: &str,
    field: Option<&str>,
) -> PersistRequest {
    let category = origin
        .path
        .first()
        .map(String::as_str)
        .or(origin.model.scope())
        .unwrap_or(key)
        .to_string();
    let parent_category = (origin.path.len() >= 2)
        .then(|| origin.path.last().cloned())
        .flatten();

    PersistRequest {
        is_object_field: !origin.model.is_remote() && !origin.path.is_empty(),
        model: origin.model.clone(),
        category,
        key: key.to_string(),
        value,
        parent_category,
        month_key: month_key.to_string(),
        path: origin.path.clone(),
        field: field.map(str::to_string),
    }
}

fn current_raw(entry: &FieldEntry) -> String {
    match &entry.value {
        EntryValue::Amount(value) => value.to_string(),
        EntryValue::Text(text) => text.clone(),
        EntryValue::Empty => String::new(),
    }
}

impl Ledger {
    /// Shows the edit input for an entry.
    pub fn open_input(&mut self, id: NodeId) -> Result<(), LedgerError> {
        self.state.tree.entry(id).ok_or(LedgerError::UnknownEntry(id))?;
        self.state.open_inputs.insert(id);
        Ok(())
    }

    /// Submits the value typed into an entry's input.
    ///
    /// Numbers are persisted first; the rendered value and every aggregate
    /// change only once the backend has accepted the edit, and the input is
    /// closed. Anything else is treated as a note update.
    pub async fn submit_edit(&mut self, id: NodeId, raw: &str) -> Result<EditOutcome, LedgerError> {
        if !self.state.is_input_open(id) {
            return Err(LedgerError::InputClosed(id));
        }
        let entry = self.state.tree.entry(id).ok_or(LedgerError::UnknownEntry(id))?;
        let raw = if raw.trim().is_empty() { current_raw(entry) } else { raw.to_string() };

        let Some(amount) = parse_amount(&raw, &self.state.currency) else {
            let record = self.note_record(id, raw.trim())?;
            self.update_note(record).await?;
            return Ok(EditOutcome::NoteUpdated);
        };

        let value = match &entry.info {
            Some(info) => json!({ "value": amount, "info": info }),
            None => json!(amount),
        };
        let request = persist_request(&entry.key_name, &entry.origin, value, self.state.date.current(), None);

        if !self.server.persist(&request).await? {
            warn!("edit of {} rejected, input stays open", request.key);
            return Err(LedgerError::persist(format!("edit of {} rejected", request.key)));
        }

        if let Some(entry) = self.state.tree.entry_mut(id) {
            entry.value = EntryValue::Amount(amount);
        }
        self.state.held_investments.retain(|(held, _)| *held != id);
        self.state.open_inputs.remove(&id);
        self.recalculate();
        info!("{} set to {amount}", request.key);
        Ok(EditOutcome::Persisted { value: amount })
    }

    /// Persists a paid checkbox against the document that supplied the
    /// entry's due date, then refreshes the overview.
    pub async fn toggle_paid(&mut self, id: NodeId, checked: bool) -> Result<(), LedgerError> {
        let entry = self.state.tree.entry(id).ok_or(LedgerError::UnknownEntry(id))?;
        let origin = entry.schedule_origin.as_ref().unwrap_or(&entry.origin);
        let request = persist_request(
            &entry.key_name,
            origin,
            Value::Bool(checked),
            self.state.date.current(),
            Some("paid"),
        );

        if !self.server.persist(&request).await? {
            return Err(LedgerError::persist(format!("paid flag of {} rejected", request.key)));
        }
        if let Some(entry) = self.state.tree.entry_mut(id) {
            entry.paid = Some(checked);
        }
        self.recalculate();
        Ok(())
    }

    /// Counts investments toward income or leaves them out. Excluded
    /// amounts render as zero and come back unchanged when re-included.
    /// Nothing is persisted.
    pub fn toggle_investments(&mut self, include: bool) {
        if include == self.state.investments_included {
            return;
        }
        if include {
            for (id, amount) in std::mem::take(&mut self.state.held_investments) {
                if let Some(entry) = self.state.tree.entry_mut(id) {
                    entry.value = EntryValue::Amount(amount);
                }
            }
        } else {
            let held: Vec<(NodeId, f64)> = self
                .state
                .tree
                .fields_in(Section::Investments)
                .into_iter()
                .filter_map(|(id, entry)| entry.numeric().map(|amount| (id, amount)))
                .collect();
            for (id, _) in &held {
                if let Some(entry) = self.state.tree.entry_mut(*id) {
                    entry.value = EntryValue::Amount(0.0);
                }
            }
            self.state.held_investments = held;
        }
        self.state.investments_included = include;
        self.recalculate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date::DateController;
    use crate::models::ModelRef;
    use crate::server::fake::FakeServer;
    use crate::snapshot::Section;
    use chrono::NaiveDate;
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    fn server() -> Arc<FakeServer> {
        Arc::new(
            FakeServer::default()
                .with_file(
                    "data/2024_03.json",
                    json!({
                        "income": {"paycheck": 2000},
                        "debt": {
                            "credit_cards": {"visa": {"bofa_cash": 150}},
                            "due_dates": {"remote": true, "file": "due_dates/2024_03.json"}
                        },
                        "to_pay": {"bills": {"gym": {"value": 30, "info": "annual"}}},
                        "notes": {"todo": ["call bank"]}
                    }),
                )
                .with_file(
                    "data/due_dates/2024_03.json",
                    json!({"due_dates": {"visa": {"bofa_cash": {"date": 12, "paid": false}}}}),
                ),
        )
    }

    async fn loaded(server: Arc<FakeServer>) -> Ledger {
        let mut ledger = Ledger::new(
            server,
            DateController::at(NaiveDate::from_ymd_opt(2024, 3, 8).unwrap()),
            "$",
        );
        ledger.load().await;
        ledger
    }

    fn find(ledger: &Ledger, section: Section, key: &str) -> NodeId {
        ledger
            .state()
            .tree
            .fields_in(section)
            .into_iter()
            .find(|(_, entry)| entry.key_name == key)
            .map(|(id, _)| id)
            .expect("entry rendered")
    }

    #[test]
    fn currency_prefix_is_stripped() {
        assert_eq!(parse_amount("$120.50", "$"), Some(120.50));
        assert_eq!(parse_amount(" 42 ", "$"), Some(42.0));
        assert_eq!(parse_amount("pick up milk", "$"), None);
        assert_eq!(parse_amount("NaN", "$"), None);
    }

    #[tokio::test]
    async fn numeric_edit_persists_then_recalculates() {
        let server = server();
        let mut ledger = loaded(Arc::clone(&server)).await;
        let id = find(&ledger, Section::Debt, "bofa_cash");
        ledger.open_input(id).unwrap();

        let outcome = ledger.submit_edit(id, "$120.50").await.unwrap();
        assert_eq!(outcome, EditOutcome::Persisted { value: 120.5 });

        let request = server.persisted.lock().unwrap()[0].clone();
        assert_eq!(request.value, json!(120.5));
        assert_eq!(
            request.model,
            ModelRef::Local {
                section: "debt".into()
            }
        );
        assert_eq!(request.category, "credit_cards");
        assert_eq!(request.parent_category.as_deref(), Some("visa"));
        assert_eq!(request.key, "bofa_cash");
        assert!(request.is_object_field);
        assert_eq!(request.month_key, "2024_03");

        assert_eq!(ledger.state().overview.debt_total, "Total: $120.50");
        assert!(!ledger.state().is_input_open(id));
        assert!(matches!(ledger.submit_edit(id, "1").await, Err(LedgerError::InputClosed(_))));
    }

    #[tokio::test]
    async fn investments_can_be_left_out_of_income() {
        let server = Arc::new(FakeServer::default().with_file(
            "data/2024_03.json",
            json!({
                "income": {"paycheck": 2000},
                "investments": 500.25,
                "to_pay": {"rent": 1000}
            }),
        ));
        let mut ledger = loaded(Arc::clone(&server)).await;
        assert_eq!(ledger.state().overview.income, "$2500.25");
        assert_eq!(ledger.state().overview.short, "$1500.25");

        ledger.toggle_investments(false);
        let id = find(&ledger, Section::Investments, "investments");
        assert_eq!(ledger.state().tree.entry(id).unwrap().value, EntryValue::Amount(0.0));
        assert_eq!(ledger.state().overview.income, "$2000.00");
        assert_eq!(ledger.state().overview.short, "$1000.00");
        assert!(!ledger.state().investments_included);

        ledger.toggle_investments(false);
        ledger.toggle_investments(true);
        assert_eq!(ledger.state().tree.entry(id).unwrap().value, EntryValue::Amount(500.25));
        assert_eq!(ledger.state().overview.income, "$2500.25");
        assert!(server.persisted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejected_edit_changes_nothing() {
        let server = server();
        let mut ledger = loaded(Arc::clone(&server)).await;
        server.reject.store(true, Ordering::SeqCst);
        let id = find(&ledger, Section::Debt, "bofa_cash");
        ledger.open_input(id).unwrap();

        assert!(ledger.submit_edit(id, "99").await.is_err());
        let state = ledger.state();
        assert_eq!(state.tree.entry(id).unwrap().numeric(), Some(150.0));
        assert_eq!(state.overview.debt_total, "Total: $150.00");
        assert!(state.is_input_open(id));
    }

    #[tokio::test]
    async fn info_is_sent_alongside_the_value() {
        let server = server();
        let mut ledger = loaded(Arc::clone(&server)).await;
        let id = find(&ledger, Section::ToPay, "gym");
        ledger.open_input(id).unwrap();
        ledger.submit_edit(id, "35").await.unwrap();

        let request = server.persisted.lock().unwrap()[0].clone();
        assert_eq!(request.value, json!({"value": 35.0, "info": "annual"}));
        assert_eq!(request.category, "bills");
        assert_eq!(request.parent_category, None);
        assert_eq!(ledger.state().overview.to_pay_total, "Total: $35.00");
    }

    #[tokio::test]
    async fn text_goes_through_note_update_and_reloads() {
        let server = server();
        let mut ledger = loaded(Arc::clone(&server)).await;
        let id = find(&ledger, Section::Notes, "0");
        ledger.open_input(id).unwrap();

        let outcome = ledger.submit_edit(id, "call the bank twice").await.unwrap();
        assert_eq!(outcome, EditOutcome::NoteUpdated);
        assert!(server.persisted.lock().unwrap().is_empty());
        let (op, record) = server.notes.lock().unwrap()[0].clone();
        assert_eq!(op, "update");
        assert_eq!(record.category, "todo");
        assert_eq!(record.key, "0");
        assert_eq!(record.value, "call the bank twice");
        assert_eq!(server.fetch_count("data/2024_03.json"), 2);
    }

    #[tokio::test]
    async fn paid_toggle_targets_the_due_date_file() {
        let server = server();
        let mut ledger = loaded(Arc::clone(&server)).await;
        let id = find(&ledger, Section::Debt, "bofa_cash");
        ledger.toggle_paid(id, true).await.unwrap();

        let request = server.persisted.lock().unwrap()[0].clone();
        assert_eq!(
            request.model,
            ModelRef::Remote {
                file: "due_dates/2024_03.json".into(),
                scope: Some("due_dates".into())
            }
        );
        assert_eq!(request.path, vec!["visa".to_string()]);
        assert_eq!(request.field.as_deref(), Some("paid"));
        assert!(!request.is_object_field);
        assert_eq!(ledger.state().tree.entry(id).unwrap().paid, Some(true));
    }
}
