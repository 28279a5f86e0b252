use std::time::Duration;

use notify::{RecursiveMode, Watcher};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, DebouncedEvent};
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::services::indexing_service::Indexer;
use crate::services::scanner_service;

const DEBOUNCE_TIMEOUT: Duration = Duration::from_millis(500);

/// Keeps the OS watch alive; dropping it stops delivery.
pub struct WatcherHandle {
    _debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
}

/// Watches the indexer's root recursively. Added or modified media files
/// trigger a (coalesced) scan; deleted ones are removed from the index
/// directly. Work is handed to `runtime` so the event thread never blocks.
pub fn start_watching(indexer: Indexer, runtime: Handle) -> Result<WatcherHandle, AppError> {
    let root = indexer.root().to_path_buf();
    if !root.is_dir() {
        return Err(AppError::Watcher(format!(
            "not a directory: {}",
            root.display()
        )));
    }

    let mut debouncer = new_debouncer(
        DEBOUNCE_TIMEOUT,
        move |result: DebounceEventResult| match result {
            Ok(events) => handle_events(&indexer, &runtime, events),
            Err(e) => {
                error!(error = ?e, "watcher error, live updates may be missing until the next scan");
            }
        },
    )
    .map_err(|e| AppError::Watcher(e.to_string()))?;

    debouncer
        .watcher()
        .watch(&root, RecursiveMode::Recursive)
        .map_err(|e| AppError::Watcher(e.to_string()))?;

    info!(root = %root.display(), "watching for changes");
    Ok(WatcherHandle {
        _debouncer: debouncer,
    })
}

pub fn stop_watching(handle: WatcherHandle) {
    drop(handle);
    info!("stopped watching");
}

fn handle_events(indexer: &Indexer, runtime: &Handle, events: Vec<DebouncedEvent>) {
    let mut rescan = false;

    for event in events {
        let path = event.path;
        if !scanner_service::is_media_file(&path, indexer.extensions()) {
            continue;
        }

        if path.exists() {
            debug!(path = %path.display(), "media added or modified");
            rescan = true;
            continue;
        }

        let Some(key) = scanner_service::relative_key(indexer.root(), &path) else {
            warn!(path = %path.display(), "event outside watched root");
            continue;
        };
        let indexer = indexer.clone();
        runtime.spawn_blocking(move || match indexer.remove_from_index(&key) {
            Ok(true) => debug!(path = %key, "deleted file dropped from index"),
            Ok(false) => {}
            Err(e) => error!(path = %key, error = %e, "failed to drop deleted file"),
        });
    }

    if rescan {
        let indexer = indexer.clone();
        runtime.spawn(async move {
            indexer.scan().await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::store::IndexStore;
    use crate::services::analysis_service::fakes::CountingAnalyzer;
    use crate::services::analysis_service::AnalysisPool;
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;

    fn test_indexer(root: &Path, data: &Path) -> Indexer {
        let root = root.canonicalize().unwrap();
        Indexer::new(
            root,
            vec!["jpg".to_string(), "png".to_string()],
            2,
            IndexStore::new(data.join("index.json")),
            AnalysisPool::new(
                Arc::new(CountingAnalyzer::default()),
                2,
                Duration::from_secs(5),
            ),
        )
    }

    async fn poll_until<F>(timeout_ms: u64, check: F) -> bool
    where
        F: Fn() -> bool,
    {
        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(timeout_ms);
        while start.elapsed() < timeout {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        false
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn new_media_file_triggers_scan() {
        let root = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        let indexer = test_indexer(root.path(), data.path());
        let handle = start_watching(indexer.clone(), Handle::current()).unwrap();

        fs::write(indexer.root().join("fresh.png"), "pixels").unwrap();

        let found = poll_until(5000, || indexer.store().load().get("fresh.png").is_some()).await;
        stop_watching(handle);

        assert!(found, "watcher should index a newly created media file");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn deleted_media_file_is_removed_without_a_scan() {
        let root = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        let indexer = test_indexer(root.path(), data.path());
        let doomed = indexer.root().join("doomed.jpg");
        fs::write(&doomed, "bytes").unwrap();
        fs::write(indexer.root().join("stays.jpg"), "bytes").unwrap();
        indexer.scan().await;
        assert_eq!(indexer.completed_cycles(), 1);

        let handle = start_watching(indexer.clone(), Handle::current()).unwrap();
        fs::remove_file(&doomed).unwrap();

        let removed = poll_until(5000, || indexer.store().load().get("doomed.jpg").is_none()).await;
        stop_watching(handle);

        assert!(removed, "watcher should drop deleted files from the index");
        assert_eq!(indexer.completed_cycles(), 1);
        assert!(indexer.store().load().get("stays.jpg").is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn non_media_changes_are_ignored() {
        let root = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        let indexer = test_indexer(root.path(), data.path());
        let handle = start_watching(indexer.clone(), Handle::current()).unwrap();

        fs::write(indexer.root().join("notes.txt"), "hello").unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        stop_watching(handle);

        assert_eq!(indexer.completed_cycles(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn bursts_collapse_into_few_cycles() {
        let root = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        let indexer = test_indexer(root.path(), data.path());
        let handle = start_watching(indexer.clone(), Handle::current()).unwrap();

        for i in 0..20 {
            fs::write(indexer.root().join(format!("burst_{i}.jpg")), format!("{i}")).unwrap();
        }

        let all = poll_until(10_000, || indexer.store().load().len() == 20).await;
        stop_watching(handle);

        assert!(all, "every burst file should end up indexed");
        assert!(indexer.completed_cycles() < 20);
    }

    #[tokio::test]
    async fn invalid_directory_is_rejected() {
        let data = tempfile::tempdir().unwrap();
        let indexer = Indexer::new(
            "/nonexistent/dir/mediadex_xyz",
            vec!["jpg".to_string()],
            2,
            IndexStore::new(data.path().join("index.json")),
            AnalysisPool::new(Arc::new(CountingAnalyzer::default()), 2, Duration::from_secs(5)),
        );
        assert!(start_watching(indexer, Handle::current()).is_err());
    }
}
