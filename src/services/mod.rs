pub mod analysis_service;
pub mod change_service;
pub mod indexing_service;
pub mod scanner_service;
pub mod search_service;
pub mod watcher_service;
