use axum::http::StatusCode;
use thiserror::Error;

/// Backend error returned by the HTTP handlers.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: message.into(),
        }
    }

    pub fn internal(err: impl std::error::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            return Self::not_found(err.to_string());
        }
        Self::internal(err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(err)
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        (self.status, self.message).into_response()
    }
}

/// Errors surfaced by the client-side ledger engine.
///
/// None of these are retried; each one ends the single operation that
/// produced it and is reported through the log.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to fetch {path}: {reason}")]
    Fetch { path: String, reason: String },

    #[error("malformed document {path}: {reason}")]
    Schema { path: String, reason: String },

    #[error("persist failed: {reason}")]
    Persist { reason: String },

    #[error("trend data unavailable (average ok: {average}, stats ok: {stats})")]
    PartialTrendFailure { average: bool, stats: bool },

    #[error("input for entry {0} is not open")]
    InputClosed(usize),

    #[error("no rendered entry with id {0}")]
    UnknownEntry(usize),

    #[error("load cycle for {0} has not settled")]
    NotSettled(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl LedgerError {
    pub fn fetch(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::Fetch {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn persist(reason: impl ToString) -> Self {
        Self::Persist {
            reason: reason.to_string(),
        }
    }
}
