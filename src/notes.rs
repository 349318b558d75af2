use crate::errors::LedgerError;
use crate::ledger::{Ledger, LedgerState};
use crate::models::{ModelRef, NoteCategoryRequest, NoteRecord};
use crate::render::NodeId;
use crate::server::remote_path;
use crate::snapshot::Section;
use tracing::{info, warn};

impl NoteRecord {
    /// Normalizes a note change. Notes kept in a remote file carry the
    /// file's entry point and date, e.g. `data/notes/2024_01.json` gives
    /// `notes` and `2024_01`.
    pub fn new(
        model: ModelRef,
        category: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
        current_date: impl Into<String>,
    ) -> Self {
        let (source_file, entry_point, source_date) = match &model {
            ModelRef::Remote { file, .. } => {
                let path = remote_path(file);
                let parts: Vec<&str> = path.split('/').collect();
                let entry_point = parts.get(1).filter(|_| parts.len() > 2).map(|part| part.to_string());
                let date = parts.last().map(|part| part.trim_end_matches(".json").to_string());
                (Some(path.clone()), entry_point, date)
            }
            ModelRef::Local { .. } => (None, None, None),
        };
        Self {
            model,
            category: category.into(),
            key: key.into(),
            value: value.into(),
            source_file,
            entry_point,
            source_date,
            current_date: current_date.into(),
        }
    }
}

/// Marks every note category as accepting new notes and counts them.
pub fn augment(state: &mut LedgerState) {
    let groups = state.tree.groups_in(Section::Notes);
    for id in &groups {
        state.tree.set_accepts_notes(*id);
    }
    state.overview.notes_header = format!("Notes ({})", groups.len());
}

impl Ledger {
    /// Note record addressing a rendered entry.
    pub fn note_record(&self, id: NodeId, value: &str) -> Result<NoteRecord, LedgerError> {
        let entry = self.state.tree.entry(id).ok_or(LedgerError::UnknownEntry(id))?;
        let origin = &entry.origin;
        let category = origin
            .path
            .last()
            .map(String::as_str)
            .or(origin.model.scope())
            .unwrap_or(entry.key_name.as_str())
            .to_string();
        Ok(NoteRecord::new(
            origin.model.clone(),
            category,
            entry.key_name.clone(),
            value,
            self.state.date.current(),
        ))
    }

    /// Appends a note to a category. Empty notes are ignored.
    pub async fn add_note(&mut self, category: &str, value: &str) -> Result<bool, LedgerError> {
        let value = value.trim();
        if value.is_empty() {
            return Ok(false);
        }
        let record = NoteRecord::new(
            self.state.section_model(Section::Notes),
            category,
            "",
            value,
            self.state.date.current(),
        );
        let accepted = self.server.add_note(&record).await?;
        self.reload_after("add note", accepted).await?;
        Ok(true)
    }

    pub async fn update_note(&mut self, record: NoteRecord) -> Result<(), LedgerError> {
        let accepted = self.server.update_note(&record).await?;
        self.reload_after("update note", accepted).await
    }

    pub async fn remove_note(&mut self, id: NodeId) -> Result<(), LedgerError> {
        let record = self.note_record(id, "")?;
        let accepted = self.server.remove_note(&record).await?;
        self.reload_after("remove note", accepted).await
    }

    pub async fn add_note_category(&mut self, name: &str) -> Result<(), LedgerError> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(());
        }
        let request = NoteCategoryRequest {
            model: self.state.section_model(Section::Notes),
            category: name.to_string(),
            current_date: self.state.date.current().to_string(),
        };
        let accepted = self.server.add_note_category(&request).await?;
        self.reload_after("add note category", accepted).await
    }

    // Note indices shift on insert/delete, so the month is always reloaded
    // rather than patched.
    async fn reload_after(&mut self, operation: &str, accepted: bool) -> Result<(), LedgerError> {
        if !accepted {
            warn!("{operation} rejected by backend");
            return Err(LedgerError::persist(format!("{operation} rejected")));
        }
        info!("{operation} stored, reloading {}", self.state.date.current());
        self.load().await;
        Ok(())
    }
}
