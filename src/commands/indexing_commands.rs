use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::error::AppError;
use crate::models::scan::ScanOutcome;
use crate::models::search::IndexStats;
use crate::services::indexing_service;
use crate::services::watcher_service;
use crate::state::AppState;

/// Fire-and-forget scan request; concurrent requests coalesce.
pub fn trigger_scan(state: &AppState) {
    let _ = state.indexer.trigger_scan();
}

/// Runs a scan (or queues a follow-up) and waits for it.
pub async fn scan(state: &AppState) -> ScanOutcome {
    state.indexer.scan().await
}

pub fn get_stats(state: &AppState) -> IndexStats {
    indexing_service::index_stats(state.indexer.store())
}

pub fn remove_from_index(state: &AppState, relative_path: &str) -> Result<bool, AppError> {
    let key = relative_path.trim().trim_start_matches('/').replace('\\', "/");
    if key.is_empty() {
        return Err(AppError::General("empty path".to_string()));
    }
    state.indexer.remove_from_index(&key)
}

/// Starts the watcher once and kicks off a scan when the index is empty or
/// stale. A watcher that cannot start is logged; scans still work.
pub fn start_indexing(state: &AppState, runtime: Handle) -> Result<(), AppError> {
    let mut handle_guard = state
        .watcher_handle
        .lock()
        .map_err(|e| AppError::General(e.to_string()))?;
    if handle_guard.is_some() {
        return Ok(());
    }

    match watcher_service::start_watching(state.indexer.clone(), runtime.clone()) {
        Ok(handle) => *handle_guard = Some(handle),
        Err(e) => warn!(error = %e, "live updates disabled, relying on triggered scans"),
    }

    if state.indexer.needs_initial_scan(state.config.rescan_after()) {
        info!("index empty or stale, starting initial scan");
        let indexer = state.indexer.clone();
        runtime.spawn(async move {
            indexer.scan().await;
        });
    }
    Ok(())
}

pub fn stop_indexing(state: &AppState) -> Result<(), AppError> {
    let mut handle_guard = state
        .watcher_handle
        .lock()
        .map_err(|e| AppError::General(e.to_string()))?;
    if let Some(handle) = handle_guard.take() {
        watcher_service::stop_watching(handle);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::time::Duration;

    fn test_state(root: &std::path::Path, data: &std::path::Path) -> AppState {
        AppState::new(Config {
            root: root.to_path_buf(),
            index_path: Some(data.join("index.json")),
            ..Config::default()
        })
    }

    #[tokio::test]
    async fn scan_and_stats_round_trip() {
        let root = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("river bank.jpg"), "x").unwrap();
        let state = test_state(root.path(), data.path());

        assert_eq!(scan(&state).await.cycles(), 1);

        let stats = get_stats(&state);
        assert_eq!(stats.total_images, 1);
        let entry = state.indexer.store().load().get("river bank.jpg").cloned().unwrap();
        assert_eq!(entry.description, "river bank");
    }

    #[tokio::test]
    async fn trigger_scan_returns_at_once_and_coalesces() {
        use crate::data::store::IndexStore;
        use crate::services::analysis_service::fakes::SleepingAnalyzer;
        use crate::services::analysis_service::AnalysisPool;
        use crate::services::indexing_service::Indexer;
        use std::sync::{Arc, Mutex};

        let root = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("slow.jpg"), "x").unwrap();
        let config = Config {
            root: root.path().to_path_buf(),
            index_path: Some(data.path().join("index.json")),
            ..Config::default()
        };
        let indexer = Indexer::new(
            root.path(),
            config.extensions.clone(),
            config.batch_size,
            IndexStore::new(data.path().join("index.json")),
            AnalysisPool::new(
                Arc::new(SleepingAnalyzer(Duration::from_millis(200))),
                1,
                Duration::from_secs(5),
            ),
        );
        let state = AppState {
            config,
            indexer,
            watcher_handle: Mutex::new(None),
        };

        trigger_scan(&state);
        trigger_scan(&state);
        assert_eq!(state.indexer.completed_cycles(), 0);
        assert_eq!(get_stats(&state).total_images, 0);

        let start = std::time::Instant::now();
        while (state.indexer.completed_cycles() < 2 || state.indexer.is_scanning())
            && start.elapsed() < Duration::from_secs(5)
        {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(state.indexer.completed_cycles(), 2);
        assert_eq!(get_stats(&state).total_images, 1);
    }

    #[tokio::test]
    async fn remove_normalizes_leading_slash() {
        let root = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("album")).unwrap();
        std::fs::write(root.path().join("album/cat.png"), "x").unwrap();
        let state = test_state(root.path(), data.path());
        scan(&state).await;

        assert!(remove_from_index(&state, "/album/cat.png").unwrap());
        assert_eq!(get_stats(&state).total_images, 0);
        assert!(remove_from_index(&state, "  ").is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn start_indexing_is_idempotent_and_bootstraps() {
        let root = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("a.jpg"), "x").unwrap();
        let state = test_state(root.path(), data.path());

        start_indexing(&state, Handle::current()).unwrap();
        start_indexing(&state, Handle::current()).unwrap();
        assert!(state.is_watching());

        let start = std::time::Instant::now();
        while get_stats(&state).total_images == 0 && start.elapsed() < Duration::from_secs(5) {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(get_stats(&state).total_images, 1);

        stop_indexing(&state).unwrap();
        assert!(!state.is_watching());
    }
}
