pub mod app;
pub mod calc;
pub mod config;
pub mod date;
pub mod edit;
pub mod errors;
pub mod handlers;
pub mod ledger;
pub mod loader;
pub mod models;
pub mod notes;
pub mod render;
pub mod server;
pub mod snapshot;
pub mod state;
pub mod stats;
pub mod store;
pub mod trends;
pub mod ui;

pub use app::router;
pub use config::Config;
pub use date::DateController;
pub use edit::EditOutcome;
pub use errors::{AppError, LedgerError};
pub use ledger::{Ledger, LedgerState};
pub use server::{HttpServer, LocalServer, Server};
pub use state::AppState;
pub use store::DataStore;
