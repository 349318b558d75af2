use crate::config::Config;
use crate::store::DataStore;

#[derive(Clone)]
pub struct AppState {
    pub store: DataStore,
    pub currency: String,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        Self {
            store: DataStore::new(config.data_dir.clone()),
            currency: config.currency.clone(),
        }
    }
}
