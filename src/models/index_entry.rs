use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// One indexed media asset, keyed by its path relative to the indexed root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub relative_path: String,
    pub filename: String,
    pub description: String,
    pub content_hash: String,
    pub size_bytes: u64,
    pub last_modified_epoch: i64,
    pub indexed_at_epoch: i64,
}

/// The persisted index for a single root.
///
/// `entries` is ordered so iteration (and therefore search tie-breaking) is
/// stable across loads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Index {
    #[serde(default)]
    pub entries: BTreeMap<String, IndexEntry>,
    #[serde(default)]
    pub last_scan_epoch: i64,
}

impl Index {
    pub fn get(&self, relative_path: &str) -> Option<&IndexEntry> {
        self.entries.get(relative_path)
    }

    pub fn upsert(&mut self, entry: IndexEntry) {
        self.entries.insert(entry.relative_path.clone(), entry);
    }

    pub fn remove(&mut self, relative_path: &str) -> Option<IndexEntry> {
        self.entries.remove(relative_path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Never moves the scan timestamp backwards.
    pub fn mark_scanned(&mut self, epoch_ms: i64) {
        self.last_scan_epoch = self.last_scan_epoch.max(epoch_ms);
    }
}

/// Last path segment of a relative or absolute path.
pub fn filename_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Filename with its final extension stripped; used when analysis yields nothing.
pub fn fallback_description(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| filename_of(path))
}
