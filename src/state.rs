use std::sync::Mutex;

use crate::config::Config;
use crate::services::indexing_service::Indexer;
use crate::services::watcher_service::WatcherHandle;

pub struct AppState {
    pub config: Config,
    pub indexer: Indexer,
    pub watcher_handle: Mutex<Option<WatcherHandle>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let indexer = Indexer::from_config(&config);
        Self {
            config,
            indexer,
            watcher_handle: Mutex::new(None),
        }
    }

    pub fn is_watching(&self) -> bool {
        self.watcher_handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }
}
