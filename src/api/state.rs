use crate::config::HubConfig;
use crate::reporting::Reporter;
use crate::storage::ResultStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<HubConfig>,
    pub store: ResultStore,
    pub reporter: Reporter,
}

impl AppState {
    pub fn new(config: HubConfig, store: ResultStore) -> Self {
        Self {
            config: Arc::new(config),
            reporter: Reporter::new(store.clone()),
            store,
        }
    }
}
