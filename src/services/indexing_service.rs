use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::data::store::IndexStore;
use crate::error::AppError;
use crate::models::index_entry::{filename_of, Index, IndexEntry};
use crate::models::scan::{ScanOutcome, ScanSummary};
use crate::models::search::IndexStats;
use crate::services::analysis_service::AnalysisPool;
use crate::services::change_service::{self, Change, FileStat};
use crate::services::scanner_service;

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Totals read from the persisted snapshot.
pub fn index_stats(store: &IndexStore) -> IndexStats {
    let index = store.load();
    let last_scan = (index.last_scan_epoch > 0)
        .then(|| chrono::DateTime::<chrono::Utc>::from_timestamp_millis(index.last_scan_epoch))
        .flatten()
        .map(|t| t.to_rfc3339());

    IndexStats {
        total_images: index.len(),
        last_scan_epoch: index.last_scan_epoch,
        last_scan,
        index_size_bytes: store.size_on_disk(),
    }
}

#[derive(Debug, Default)]
struct ScanState {
    scanning: bool,
    pending: bool,
}

/// A discovered file that must go through analysis this cycle.
#[derive(Debug, Clone)]
struct PendingFile {
    path: PathBuf,
    key: String,
    stat: FileStat,
    content_hash: String,
}

impl PendingFile {
    fn into_entry(self, description: String) -> IndexEntry {
        IndexEntry {
            filename: filename_of(&self.path),
            relative_path: self.key,
            description,
            content_hash: self.content_hash,
            size_bytes: self.stat.size_bytes,
            last_modified_epoch: self.stat.mtime_epoch,
            indexed_at_epoch: now_millis(),
        }
    }
}

/// Keys that sit under paths the walk could not read this cycle.
#[derive(Debug, Default)]
struct UnreadableKeys {
    whole_root: bool,
    prefixes: Vec<String>,
}

impl UnreadableKeys {
    fn record(&mut self, root: &Path, path: &Path) {
        match scanner_service::relative_key(root, path) {
            Some(prefix) => self.prefixes.push(prefix),
            None => self.whole_root = true,
        }
    }

    fn covers(&self, key: &str) -> bool {
        self.whole_root
            || self.prefixes.iter().any(|prefix| {
                key.strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
            })
    }
}

struct CyclePlan {
    index: Index,
    discovered: HashSet<String>,
    unreadable: UnreadableKeys,
    to_analyze: Vec<PendingFile>,
    summary: ScanSummary,
}

struct IndexerInner {
    root: PathBuf,
    extensions: Vec<String>,
    batch_size: usize,
    store: IndexStore,
    pool: AnalysisPool,
    state: Mutex<ScanState>,
    // Serializes every write to the store file.
    store_lock: Mutex<()>,
    // Keys removed while a cycle runs; kept out of the index until it ends.
    deferred_removals: Mutex<HashSet<String>>,
    completed_cycles: AtomicU64,
}

/// Owns scan cycles for one root. Cloning shares the same state machine.
#[derive(Clone)]
pub struct Indexer {
    inner: Arc<IndexerInner>,
}

impl Indexer {
    pub fn new(
        root: impl Into<PathBuf>,
        extensions: Vec<String>,
        batch_size: usize,
        store: IndexStore,
        pool: AnalysisPool,
    ) -> Self {
        Self {
            inner: Arc::new(IndexerInner {
                root: root.into(),
                extensions,
                batch_size: batch_size.max(1),
                store,
                pool,
                state: Mutex::new(ScanState::default()),
                store_lock: Mutex::new(()),
                deferred_removals: Mutex::new(HashSet::new()),
                completed_cycles: AtomicU64::new(0),
            }),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.resolved_root(),
            config.extensions.clone(),
            config.batch_size,
            IndexStore::new(config.resolved_index_path()),
            AnalysisPool::from_config(config),
        )
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn extensions(&self) -> &[String] {
        &self.inner.extensions
    }

    pub fn store(&self) -> &IndexStore {
        &self.inner.store
    }

    pub fn is_scanning(&self) -> bool {
        self.lock_state().scanning
    }

    pub fn completed_cycles(&self) -> u64 {
        self.inner.completed_cycles.load(Ordering::SeqCst)
    }

    /// Runs scan cycles until no follow-up is pending. If a cycle is already
    /// running, records a follow-up request and returns at once.
    pub async fn scan(&self) -> ScanOutcome {
        {
            let mut state = self.lock_state();
            if state.scanning {
                state.pending = true;
                debug!("scan already running, follow-up queued");
                return ScanOutcome::Coalesced;
            }
            state.scanning = true;
        }

        let mut guard = ScanningGuard {
            indexer: self,
            armed: true,
        };
        let mut summaries = Vec::new();
        loop {
            summaries.push(self.run_cycle().await);

            let mut state = self.lock_state();
            if state.pending {
                state.pending = false;
                continue;
            }
            state.scanning = false;
            guard.armed = false;
            break;
        }

        ScanOutcome::Completed(summaries)
    }

    /// Fire-and-forget variant of [`Indexer::scan`].
    pub fn trigger_scan(&self) -> JoinHandle<ScanOutcome> {
        let indexer = self.clone();
        tokio::spawn(async move { indexer.scan().await })
    }

    /// Drops one entry and persists right away. Returns whether it existed.
    pub fn remove_from_index(&self, relative_path: &str) -> Result<bool, AppError> {
        let _store = lock(&self.inner.store_lock);
        if self.is_scanning() {
            lock(&self.inner.deferred_removals).insert(relative_path.to_string());
        }

        let mut index = self.inner.store.load_or_recover();
        if index.remove(relative_path).is_none() {
            return Ok(false);
        }
        self.inner.store.save(&index)?;
        info!(path = relative_path, "removed from index");
        Ok(true)
    }

    /// True when the persisted index is empty or its last scan is older than `max_age`.
    pub fn needs_initial_scan(&self, max_age: Duration) -> bool {
        let index = self.inner.store.load();
        if index.is_empty() {
            return true;
        }
        let age_ms = now_millis().saturating_sub(index.last_scan_epoch);
        age_ms > max_age.as_millis().min(i64::MAX as u128) as i64
    }

    #[tracing::instrument(name = "scan_cycle", skip(self), fields(root = %self.inner.root.display()))]
    async fn run_cycle(&self) -> ScanSummary {
        let started_at = now_millis();
        {
            let _store = lock(&self.inner.store_lock);
            lock(&self.inner.deferred_removals).clear();
        }

        let inner = self.inner.clone();
        let plan = tokio::task::spawn_blocking(move || {
            let index = {
                let _store = lock(&inner.store_lock);
                inner.store.load_or_recover()
            };
            plan_cycle(&inner.root, &inner.extensions, index)
        })
        .await;

        let CyclePlan {
            mut index,
            discovered,
            unreadable,
            to_analyze,
            mut summary,
        } = match plan {
            Ok(plan) => plan,
            Err(e) => {
                error!(error = %e, "scan planning task failed");
                return ScanSummary::default();
            }
        };

        info!(
            total = summary.total,
            to_analyze = to_analyze.len(),
            skipped = summary.skipped,
            "discovery finished"
        );

        for batch in to_analyze.chunks(self.inner.batch_size) {
            let mut tasks = JoinSet::new();
            for file in batch.iter().cloned() {
                let pool = self.inner.pool.clone();
                tasks.spawn(async move {
                    let description = pool.analyze(&file.path).await;
                    file.into_entry(description)
                });
            }

            while let Some(result) = tasks.join_next().await {
                match result {
                    Ok(entry) if self.is_deferred(&entry.relative_path) => {
                        debug!(path = %entry.relative_path, "removed during scan, result dropped");
                    }
                    Ok(entry) => {
                        debug!(path = %entry.relative_path, "indexed");
                        index.upsert(entry);
                        summary.processed += 1;
                    }
                    Err(e) => {
                        error!(error = %e, "analysis task failed");
                        summary.failed += 1;
                    }
                }
            }

            self.persist(&mut index).await;
        }

        if unreadable.whole_root || !unreadable.prefixes.is_empty() {
            warn!(
                prefixes = unreadable.prefixes.len(),
                whole_root = unreadable.whole_root,
                "entries under unreadable paths kept as they are"
            );
        }
        let stale: Vec<String> = index
            .entries
            .keys()
            .filter(|key| !discovered.contains(*key) && !unreadable.covers(key))
            .cloned()
            .collect();
        for key in &stale {
            debug!(path = %key, "removing vanished file");
            index.remove(key);
        }
        summary.removed = stale.len();

        index.mark_scanned(started_at.max(now_millis()));
        self.persist(&mut index).await;
        self.inner.completed_cycles.fetch_add(1, Ordering::SeqCst);

        info!(
            processed = summary.processed,
            skipped = summary.skipped,
            touched = summary.touched,
            removed = summary.removed,
            failed = summary.failed,
            indexed = index.len(),
            "scan cycle complete"
        );
        summary
    }

    fn is_deferred(&self, key: &str) -> bool {
        lock(&self.inner.deferred_removals).contains(key)
    }

    /// Drops deferred removals from `index`, then saves a copy on the
    /// blocking pool. Removals that land while the save waits for the
    /// store lock are applied to that copy too.
    async fn persist(&self, index: &mut Index) {
        for key in lock(&self.inner.deferred_removals).iter() {
            index.remove(key);
        }

        let inner = self.inner.clone();
        let mut snapshot = index.clone();
        let saved = tokio::task::spawn_blocking(move || {
            let _store = lock(&inner.store_lock);
            for key in lock(&inner.deferred_removals).iter() {
                snapshot.remove(key);
            }
            inner.store.save(&snapshot)
        })
        .await;

        match saved {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(path = %self.inner.store.path().display(), error = %e, "failed to save index");
            }
            Err(e) => error!(error = %e, "index save task failed"),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ScanState> {
        lock(&self.inner.state)
    }
}

/// Clears the scanning flag if a cycle unwinds.
struct ScanningGuard<'a> {
    indexer: &'a Indexer,
    armed: bool,
}

impl Drop for ScanningGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.indexer.lock_state().scanning = false;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Walks the root and sorts every file into skip, touch or analyze.
/// Per-file stat and hash errors are logged and the file is left alone,
/// as are entries under directories that could not be read.
fn plan_cycle(root: &Path, extensions: &[String], mut index: Index) -> CyclePlan {
    let mut discovered = HashSet::new();
    let mut unreadable = UnreadableKeys::default();
    let mut to_analyze = Vec::new();
    let mut summary = ScanSummary::default();

    let walk = scanner_service::scan_reporting(root, extensions, |path| unreadable.record(root, path));
    for path in walk {
        let Some(key) = scanner_service::relative_key(root, &path) else {
            continue;
        };
        summary.total += 1;
        discovered.insert(key.clone());

        let stat = match FileStat::read(&path) {
            Ok(stat) => stat,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "stat failed, retrying next scan");
                summary.failed += 1;
                continue;
            }
        };

        let change = match change_service::detect(index.get(&key), &stat, || {
            change_service::hash_file(&path)
        }) {
            Ok(change) => change,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "hash failed, retrying next scan");
                summary.failed += 1;
                continue;
            }
        };

        match change {
            Change::Unchanged => summary.skipped += 1,
            Change::Touched { content_hash } => {
                if let Some(entry) = index.entries.get_mut(&key) {
                    entry.last_modified_epoch = stat.mtime_epoch;
                    entry.size_bytes = stat.size_bytes;
                    entry.content_hash = content_hash;
                }
                summary.touched += 1;
            }
            Change::Modified { content_hash } => to_analyze.push(PendingFile {
                path,
                key,
                stat,
                content_hash,
            }),
            Change::New => match change_service::hash_file(&path) {
                Ok(content_hash) => to_analyze.push(PendingFile {
                    path,
                    key,
                    stat,
                    content_hash,
                }),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "hash failed, retrying next scan");
                    summary.failed += 1;
                }
            },
        }
    }

    CyclePlan {
        index,
        discovered,
        unreadable,
        to_analyze,
        summary,
    }
}
