use crate::date::{DateController, parse_month_key};
use crate::errors::AppError;
use crate::ledger::Ledger;
use crate::models::{Ack, AverageReport, MonthExists, NewMonth, NoteCategoryRequest, NoteRecord, PersistRequest};
use crate::server::LocalServer;
use crate::state::AppState;
use crate::stats::build_average;
use crate::ui::render_page;
use axum::{
    Json,
    extract::{Path, Query, State},
    response::Html,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

const OK: Json<Ack> = Json(Ack { ok: true });

/// Furthest the index page navigates from today, in months.
const MAX_OFFSET: i32 = 12 * 100;

#[derive(Debug, Default, Deserialize)]
pub struct IndexQuery {
    #[serde(default)]
    pub offset: i32,
}

impl IndexQuery {
    fn offset(&self) -> Result<i32, AppError> {
        if self.offset.unsigned_abs() > MAX_OFFSET.unsigned_abs() {
            return Err(AppError::bad_request(format!(
                "offset {} is more than {MAX_OFFSET} months away",
                self.offset
            )));
        }
        Ok(self.offset)
    }
}

/// Renders the month `offset` months away from today.
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<IndexQuery>,
) -> Result<Html<String>, AppError> {
    let offset = query.offset()?;
    let server = Arc::new(LocalServer::new(state.store.clone()));
    let mut ledger = Ledger::new(server, DateController::new(), state.currency.clone());
    ledger.date_mut().advance(offset);
    ledger.load().await;
    Ok(Html(render_page(ledger.state(), offset)))
}

pub async fn data_file(State(state): State<AppState>, Path(path): Path<String>) -> Result<Json<Value>, AppError> {
    Ok(Json(state.store.read_document(&path).await?))
}

pub async fn month_exists(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<MonthExists>, AppError> {
    if parse_month_key(&key).is_none() {
        return Err(AppError::bad_request(format!("invalid month key {key}")));
    }
    let exists = state.store.month_exists(&key).await;
    Ok(Json(MonthExists { exists }))
}

pub async fn persist(
    State(state): State<AppState>,
    Json(request): Json<PersistRequest>,
) -> Result<Json<Ack>, AppError> {
    state.store.persist(&request).await?;
    Ok(OK)
}

pub async fn create_month(
    State(state): State<AppState>,
    Json(descriptor): Json<NewMonth>,
) -> Result<Json<Ack>, AppError> {
    state.store.create_month(&descriptor).await?;
    Ok(OK)
}

pub async fn average(State(state): State<AppState>) -> Result<Json<AverageReport>, AppError> {
    let months = state.store.month_documents().await?;
    Ok(Json(build_average(&months)))
}

pub async fn add_note(State(state): State<AppState>, Json(record): Json<NoteRecord>) -> Result<Json<Ack>, AppError> {
    state.store.add_note(&record).await?;
    Ok(OK)
}

pub async fn update_note(
    State(state): State<AppState>,
    Json(record): Json<NoteRecord>,
) -> Result<Json<Ack>, AppError> {
    state.store.update_note(&record).await?;
    Ok(OK)
}

pub async fn remove_note(
    State(state): State<AppState>,
    Json(record): Json<NoteRecord>,
) -> Result<Json<Ack>, AppError> {
    state.store.remove_note(&record).await?;
    Ok(OK)
}

pub async fn add_note_category(
    State(state): State<AppState>,
    Json(request): Json<NoteCategoryRequest>,
) -> Result<Json<Ack>, AppError> {
    state.store.add_note_category(&request).await?;
    Ok(OK)
}
