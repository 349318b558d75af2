use crate::errors::LedgerError;
use crate::models::{
    Ack, AverageReport, MonthExists, NewMonth, NoteCategoryRequest, NoteRecord, PersistRequest,
};
use crate::stats::build_average;
use crate::store::DataStore;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

pub const DATA_PREFIX: &str = "data/";

/// `data/{YYYY_MM}.json`
pub fn month_path(month_key: &str) -> String {
    format!("{DATA_PREFIX}{month_key}.json")
}

/// `data/{file}` for a remote reference.
pub fn remote_path(file: &str) -> String {
    format!("{DATA_PREFIX}{file}")
}

/// Backend collaborator the ledger engine talks to.
///
/// `Ok(false)` means the backend answered and refused the change;
/// `Err` means the request itself failed.
#[async_trait]
pub trait Server: Send + Sync {
    async fn fetch_file(&self, path: &str) -> Result<Value, LedgerError>;

    async fn fetch_month(&self, month_key: &str) -> Result<Value, LedgerError> {
        self.fetch_file(&month_path(month_key)).await
    }

    async fn fetch_stats(&self, path: &str) -> Result<Value, LedgerError> {
        self.fetch_file(path).await
    }

    async fn month_exists(&self, month_key: &str) -> Result<bool, LedgerError>;
    async fn persist(&self, request: &PersistRequest) -> Result<bool, LedgerError>;
    async fn create_month(&self, descriptor: &NewMonth) -> Result<bool, LedgerError>;
    async fn fetch_average(&self) -> Result<AverageReport, LedgerError>;
    async fn add_note(&self, record: &NoteRecord) -> Result<bool, LedgerError>;
    async fn update_note(&self, record: &NoteRecord) -> Result<bool, LedgerError>;
    async fn remove_note(&self, record: &NoteRecord) -> Result<bool, LedgerError>;
    async fn add_note_category(&self, request: &NoteCategoryRequest) -> Result<bool, LedgerError>;
}

/// Talks to the finances backend over HTTP.
#[derive(Clone)]
pub struct HttpServer {
    client: Client,
    base_url: String,
}

impl HttpServer {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn post<T: Serialize + Sync>(&self, endpoint: &str, body: &T) -> Result<bool, LedgerError> {
        let response = self
            .client
            .post(format!("{}/api/{endpoint}", self.base_url))
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response.text().await.unwrap_or_default();
            warn!("{endpoint} rejected with {status}: {message}");
            return Ok(false);
        }
        let ack: Ack = response.json().await?;
        Ok(ack.ok)
    }
}

#[async_trait]
impl Server for HttpServer {
    async fn fetch_file(&self, path: &str) -> Result<Value, LedgerError> {
        let response = self
            .client
            .get(format!("{}/{path}", self.base_url))
            .send()
            .await
            .map_err(|err| LedgerError::fetch(path, err))?;
        if !response.status().is_success() {
            return Err(LedgerError::fetch(path, response.status()));
        }
        response.json().await.map_err(|err| LedgerError::fetch(path, err))
    }

    async fn month_exists(&self, month_key: &str) -> Result<bool, LedgerError> {
        let exists: MonthExists = self
            .client
            .get(format!("{}/api/months/{month_key}", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(exists.exists)
    }

    async fn persist(&self, request: &PersistRequest) -> Result<bool, LedgerError> {
        self.post("persist", request).await
    }

    async fn create_month(&self, descriptor: &NewMonth) -> Result<bool, LedgerError> {
        self.post("months", descriptor).await
    }

    async fn fetch_average(&self) -> Result<AverageReport, LedgerError> {
        let report = self
            .client
            .post(format!("{}/api/average", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(report)
    }

    async fn add_note(&self, record: &NoteRecord) -> Result<bool, LedgerError> {
        self.post("notes/add", record).await
    }

    async fn update_note(&self, record: &NoteRecord) -> Result<bool, LedgerError> {
        self.post("notes/update", record).await
    }

    async fn remove_note(&self, record: &NoteRecord) -> Result<bool, LedgerError> {
        self.post("notes/remove", record).await
    }

    async fn add_note_category(&self, request: &NoteCategoryRequest) -> Result<bool, LedgerError> {
        self.post("notes/category", request).await
    }
}

/// Serves the engine straight from a data directory, used by the
/// backend's own page rendering.
#[derive(Debug, Clone)]
pub struct LocalServer {
    store: DataStore,
}

impl LocalServer {
    pub fn new(store: DataStore) -> Self {
        Self { store }
    }
}

fn accepted<E: std::fmt::Display>(operation: &str, result: Result<(), E>) -> Result<bool, LedgerError> {
    match result {
        Ok(()) => Ok(true),
        Err(err) => {
            warn!("{operation} rejected: {err}");
            Ok(false)
        }
    }
}

#[async_trait]
impl Server for LocalServer {
    async fn fetch_file(&self, path: &str) -> Result<Value, LedgerError> {
        let relative = path.strip_prefix(DATA_PREFIX).unwrap_or(path);
        self.store
            .read_document(relative)
            .await
            .map_err(|err| LedgerError::fetch(path, err.message))
    }

    async fn month_exists(&self, month_key: &str) -> Result<bool, LedgerError> {
        Ok(self.store.month_exists(month_key).await)
    }

    async fn persist(&self, request: &PersistRequest) -> Result<bool, LedgerError> {
        accepted("persist", self.store.persist(request).await.map_err(|err| err.message))
    }

    async fn create_month(&self, descriptor: &NewMonth) -> Result<bool, LedgerError> {
        accepted("create month", self.store.create_month(descriptor).await.map_err(|err| err.message))
    }

    async fn fetch_average(&self) -> Result<AverageReport, LedgerError> {
        let months = self
            .store
            .month_documents()
            .await
            .map_err(|err| LedgerError::fetch("average", err.message))?;
        Ok(build_average(&months))
    }

    async fn add_note(&self, record: &NoteRecord) -> Result<bool, LedgerError> {
        accepted("add note", self.store.add_note(record).await.map_err(|err| err.message))
    }

    async fn update_note(&self, record: &NoteRecord) -> Result<bool, LedgerError> {
        accepted("update note", self.store.update_note(record).await.map_err(|err| err.message))
    }

    async fn remove_note(&self, record: &NoteRecord) -> Result<bool, LedgerError> {
        accepted("remove note", self.store.remove_note(record).await.map_err(|err| err.message))
    }

    async fn add_note_category(&self, request: &NoteCategoryRequest) -> Result<bool, LedgerError> {
        accepted(
            "add note category",
            self.store.add_note_category(request).await.map_err(|err| err.message),
        )
    }
}
