use crate::data::store::IndexStore;
use crate::models::index_entry::{Index, IndexEntry};

/// Case-insensitive substring search over a fresh snapshot of the store.
/// Description hits rank before filename-only hits.
pub fn search(store: &IndexStore, query: &str) -> Vec<IndexEntry> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    search_index(&store.load(), trimmed)
}

pub fn search_index(index: &Index, query: &str) -> Vec<IndexEntry> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }

    let mut description_hits = Vec::new();
    let mut filename_hits = Vec::new();

    for entry in index.entries.values() {
        if entry.description.to_lowercase().contains(&needle) {
            description_hits.push(entry.clone());
        } else if format!("{} {}", entry.filename, entry.description)
            .to_lowercase()
            .contains(&needle)
        {
            filename_hits.push(entry.clone());
        }
    }

    description_hits.extend(filename_hits);
    description_hits
}
