use crate::handlers;
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/data/*path", get(handlers::data_file))
        .route("/api/months/:key", get(handlers::month_exists))
        .route("/api/months", post(handlers::create_month))
        .route("/api/persist", post(handlers::persist))
        .route("/api/average", post(handlers::average))
        .route("/api/notes/add", post(handlers::add_note))
        .route("/api/notes/update", post(handlers::update_note))
        .route("/api/notes/remove", post(handlers::remove_note))
        .route("/api/notes/category", post(handlers::add_note_category))
        .with_state(state)
}
