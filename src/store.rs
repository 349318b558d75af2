use crate::date::parse_month_key;
use crate::errors::AppError;
use crate::models::{ModelRef, NewMonth, NoteCategoryRequest, NoteRecord, PersistRequest};
use crate::server::{DATA_PREFIX, month_path};
use serde_json::{Map, Value};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// JSON documents under the data directory.
///
/// Every read-modify-write holds `write_lock`, so concurrent edits to the
/// same file are applied one after the other.
#[derive(Debug, Clone)]
pub struct DataStore {
    root: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl DataStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a data-relative path (with or without the `data/` prefix) onto
    /// the data directory, refusing anything that would leave it.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, AppError> {
        let relative = relative.strip_prefix(DATA_PREFIX).unwrap_or(relative);
        let path = Path::new(relative);
        let contained = path.components().all(|part| matches!(part, Component::Normal(_)));
        if relative.is_empty() || !contained {
            return Err(AppError::bad_request(format!("invalid data path: {relative}")));
        }
        Ok(self.root.join(path))
    }

    pub async fn read_document(&self, relative: &str) -> Result<Value, AppError> {
        let path = self.resolve(relative)?;
        let bytes = fs::read(&path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn write_document(&self, relative: &str, document: &Value) -> Result<(), AppError> {
        let path = self.resolve(relative)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(document)?;
        fs::write(&path, payload).await?;
        Ok(())
    }

    async fn exists(&self, relative: &str) -> bool {
        match self.resolve(relative) {
            Ok(path) => fs::try_exists(path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    pub async fn month_exists(&self, month_key: &str) -> bool {
        parse_month_key(month_key).is_some() && self.exists(&month_file(month_key)).await
    }

    /// Writes one edited value back into the document that owns it.
    pub async fn persist(&self, request: &PersistRequest) -> Result<(), AppError> {
        let (file, scope) = owner(&request.model, &request.month_key)?;
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_document(&file).await?;
        apply_persist(&mut document, scope.as_deref(), request)?;
        self.write_document(&file, &document).await?;
        info!("persisted {} in {file}", request.key);
        Ok(())
    }

    /// Creates a month from the previous one. Remote files named after the
    /// previous month are copied under the new month's name, and every
    /// `paid: true` in the copies starts out unpaid again.
    pub async fn create_month(&self, descriptor: &NewMonth) -> Result<(), AppError> {
        let next = descriptor.raw_date.as_str();
        let last = descriptor.raw_date_last.as_str();
        if parse_month_key(next).is_none() || parse_month_key(last).is_none() {
            return Err(AppError::bad_request(format!("invalid month {next} from {last}")));
        }
        if descriptor.file != month_path(next) {
            return Err(AppError::bad_request(format!("{} does not name {next}", descriptor.file)));
        }

        let _guard = self.write_lock.lock().await;
        if self.month_exists(next).await {
            return Err(AppError::conflict(format!("{next} already exists")));
        }

        let mut document = self.read_document(&month_file(last)).await?;
        let mut copies = Vec::new();
        rewrite_remotes(&mut document, last, next, &mut copies);
        clear_paid(&mut document);

        for (from, to) in copies {
            if self.exists(&to).await {
                debug!("{to} already present, keeping it");
                continue;
            }
            match self.read_document(&from).await {
                Ok(mut fragment) => {
                    clear_paid(&mut fragment);
                    self.write_document(&to, &fragment).await?;
                }
                Err(err) => warn!("remote {from} not copied: {}", err.message),
            }
        }

        self.write_document(&month_file(next), &document).await?;
        info!("created {next} from {last}");
        Ok(())
    }

    pub async fn add_note(&self, record: &NoteRecord) -> Result<(), AppError> {
        let note = record.value.trim();
        if note.is_empty() {
            return Err(AppError::bad_request("empty note"));
        }
        self.edit_notes(&record.model, &record.current_date, |scope| {
            match find_key_mut(scope, &record.category) {
                Some(Value::Array(items)) => items.push(Value::String(note.to_string())),
                Some(Value::Object(map)) => {
                    let next = next_index(map);
                    map.insert(next.to_string(), Value::String(note.to_string()));
                }
                Some(_) => return Err(AppError::bad_request(format!("{} is not a category", record.category))),
                None => {
                    as_object(scope)?.insert(record.category.clone(), Value::Array(vec![Value::String(note.to_string())]));
                }
            }
            Ok(())
        })
        .await
    }

    pub async fn update_note(&self, record: &NoteRecord) -> Result<(), AppError> {
        self.edit_notes(&record.model, &record.current_date, |scope| {
            let category = find_key_mut(scope, &record.category).ok_or_else(|| missing(&record.category))?;
            if child(category, &record.key).is_none() {
                return Err(missing(&record.key));
            }
            set_child(category, &record.key, Value::String(record.value.clone()))
        })
        .await
    }

    pub async fn remove_note(&self, record: &NoteRecord) -> Result<(), AppError> {
        self.edit_notes(&record.model, &record.current_date, |scope| {
            let category = find_key_mut(scope, &record.category).ok_or_else(|| missing(&record.category))?;
            let removed = match category {
                Value::Array(items) => match record.key.parse::<usize>() {
                    Ok(index) if index < items.len() => Some(items.remove(index)),
                    _ => None,
                },
                Value::Object(map) => map.remove(&record.key),
                _ => None,
            };
            removed.map(|_| ()).ok_or_else(|| missing(&record.key))
        })
        .await
    }

    pub async fn add_note_category(&self, request: &NoteCategoryRequest) -> Result<(), AppError> {
        let name = request.category.trim();
        if name.is_empty() {
            return Err(AppError::bad_request("empty category name"));
        }
        self.edit_notes(&request.model, &request.current_date, |scope| {
            let map = as_object(scope)?;
            if map.contains_key(name) {
                return Err(AppError::conflict(format!("category {name} already exists")));
            }
            map.insert(name.to_string(), Value::Array(Vec::new()));
            Ok(())
        })
        .await
    }

    async fn edit_notes<F>(&self, model: &ModelRef, month_key: &str, edit: F) -> Result<(), AppError>
    where
        F: FnOnce(&mut Value) -> Result<(), AppError>,
    {
        let (file, scope) = owner(model, month_key)?;
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_document(&file).await?;
        let target = match scope.as_deref() {
            Some(scope) => as_object(&mut document)?
                .entry(scope)
                .or_insert_with(|| Value::Object(Map::new())),
            None => &mut document,
        };
        edit(target)?;
        self.write_document(&file, &document).await?;
        debug!("notes updated in {file}");
        Ok(())
    }

    /// Every `YYYY_MM.json` document in key order, with remote references
    /// replaced by the fragments they point at.
    pub async fn month_documents(&self) -> Result<Vec<(String, Value)>, AppError> {
        let mut keys = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(key) = name.strip_suffix(".json").filter(|key| parse_month_key(key).is_some()) {
                keys.push(key.to_string());
            }
        }
        keys.sort();

        let mut months = Vec::with_capacity(keys.len());
        for key in keys {
            let mut document = match self.read_document(&month_file(&key)).await {
                Ok(document) => document,
                Err(err) => {
                    warn!("skipping {key}: {}", err.message);
                    continue;
                }
            };
            let mut remotes = Vec::new();
            remote_references(&document, String::new(), "", &mut remotes);
            for (pointer, name, file) in remotes {
                let fragment = match self.read_document(&file).await {
                    Ok(fragment) => fragment,
                    Err(err) => {
                        warn!("{key}: remote {file} unavailable: {}", err.message);
                        continue;
                    }
                };
                let fragment = match fragment.get(name.as_str()) {
                    Some(scoped) => scoped.clone(),
                    None => fragment,
                };
                if let Some(slot) = document.pointer_mut(&pointer) {
                    *slot = fragment;
                }
            }
            months.push((key, document));
        }
        Ok(months)
    }
}

fn month_file(month_key: &str) -> String {
    format!("{month_key}.json")
}

/// File and top-level key that own a model's entries.
fn owner(model: &ModelRef, month_key: &str) -> Result<(String, Option<String>), AppError> {
    match model {
        ModelRef::Local { section } => {
            if parse_month_key(month_key).is_none() {
                return Err(AppError::bad_request(format!("invalid month {month_key}")));
            }
            Ok((month_file(month_key), Some(section.clone())))
        }
        ModelRef::Remote { file, scope } => Ok((file.clone(), scope.clone())),
    }
}

/// Applies an edit to an owning document in place.
///
/// The entry is found by walking `scope`, then `path`, then `key`. A bare
/// number sent for an entry stored as `{value, ...}` only replaces `value`.
/// A request whose key is the scope itself with no path replaces the whole
/// top-level value.
pub fn apply_persist(document: &mut Value, scope: Option<&str>, request: &PersistRequest) -> Result<(), AppError> {
    let key = request.key.as_str();
    let whole_section = request.path.is_empty()
        && scope == Some(key)
        && document.get(key).and_then(|section| section.get(key)).is_none();

    let mut container = document;
    if !whole_section {
        if let Some(scope) = scope {
            container = descend(container, scope)?;
        }
        for step in &request.path {
            container = descend(container, step)?;
        }
    }

    match &request.field {
        Some(field) => match child_mut(container, key) {
            Some(Value::Object(entry)) => {
                entry.insert(field.clone(), request.value.clone());
                Ok(())
            }
            Some(_) => Err(AppError::bad_request(format!("{key} has no {field} field"))),
            None => Err(missing(key)),
        },
        None => {
            let value = merged(child(container, key), &request.value);
            set_child(container, key, value)
        }
    }
}

fn merged(existing: Option<&Value>, incoming: &Value) -> Value {
    match (existing, incoming) {
        (Some(Value::Object(current)), Value::Number(_)) if current.contains_key("value") => {
            let mut current = current.clone();
            current.insert("value".to_string(), incoming.clone());
            Value::Object(current)
        }
        (Some(Value::Object(current)), Value::Object(update)) => {
            let mut current = current.clone();
            current.extend(update.clone());
            Value::Object(current)
        }
        _ => incoming.clone(),
    }
}

fn missing(key: &str) -> AppError {
    AppError::not_found(format!("no entry {key}"))
}

fn as_object(value: &mut Value) -> Result<&mut Map<String, Value>, AppError> {
    value
        .as_object_mut()
        .ok_or_else(|| AppError::bad_request("expected an object"))
}

fn child<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|index| items.get(index)),
        _ => None,
    }
}

fn child_mut<'a>(value: &'a mut Value, key: &str) -> Option<&'a mut Value> {
    match value {
        Value::Object(map) => map.get_mut(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|index| items.get_mut(index)),
        _ => None,
    }
}

fn descend<'a>(value: &'a mut Value, key: &str) -> Result<&'a mut Value, AppError> {
    child_mut(value, key).ok_or_else(|| missing(key))
}

fn set_child(container: &mut Value, key: &str, value: Value) -> Result<(), AppError> {
    match container {
        Value::Object(map) => {
            map.insert(key.to_string(), value);
            Ok(())
        }
        Value::Array(items) => match key.parse::<usize>() {
            Ok(index) if index < items.len() => {
                items[index] = value;
                Ok(())
            }
            Ok(index) if index == items.len() => {
                items.push(value);
                Ok(())
            }
            _ => Err(missing(key)),
        },
        _ => Err(AppError::bad_request(format!("cannot set {key} on a plain value"))),
    }
}

/// First object member named `key`, searching breadth of the current level
/// before descending.
fn find_key_mut<'a>(value: &'a mut Value, key: &str) -> Option<&'a mut Value> {
    let Value::Object(map) = value else {
        return None;
    };
    if map.contains_key(key) {
        return map.get_mut(key);
    }
    map.values_mut().find_map(|child| find_key_mut(child, key))
}

fn next_index(map: &Map<String, Value>) -> usize {
    map.keys()
        .filter_map(|key| key.parse::<usize>().ok())
        .max()
        .map_or(0, |last| last + 1)
}

fn is_remote(map: &Map<String, Value>) -> bool {
    map.get("remote").and_then(Value::as_bool).unwrap_or(false)
}

fn rewrite_remotes(value: &mut Value, last: &str, next: &str, copies: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) if is_remote(map) => {
            if let Some(Value::String(file)) = map.get_mut("file") {
                if file.contains(last) {
                    let renamed = file.replace(last, next);
                    let previous = std::mem::replace(file, renamed.clone());
                    copies.push((previous, renamed));
                }
            }
        }
        Value::Object(map) => {
            for child in map.values_mut() {
                rewrite_remotes(child, last, next, copies);
            }
        }
        Value::Array(items) => {
            for item in items {
                rewrite_remotes(item, last, next, copies);
            }
        }
        _ => {}
    }
}

fn clear_paid(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if key == "paid" && *child == Value::Bool(true) {
                    *child = Value::Bool(false);
                } else {
                    clear_paid(child);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(clear_paid),
        _ => {}
    }
}

/// `(json pointer, key, file)` for every remote reference in a document.
fn remote_references(value: &Value, pointer: String, key: &str, out: &mut Vec<(String, String, String)>) {
    match value {
        Value::Object(map) if is_remote(map) => {
            if let Some(file) = map.get("file").and_then(Value::as_str) {
                out.push((pointer, key.to_string(), file.to_string()));
            }
        }
        Value::Object(map) => {
            for (name, child) in map {
                let escaped = name.replace('~', "~0").replace('/', "~1");
                remote_references(child, format!("{pointer}/{escaped}"), name, out);
            }
        }
        _ => {}
    }
}
