use crate::models::index_entry::IndexEntry;
use crate::services::search_service;
use crate::state::AppState;

pub fn search(state: &AppState, query: &str, limit: Option<usize>) -> Vec<IndexEntry> {
    let mut results = search_service::search(state.indexer.store(), query);
    if let Some(limit) = limit {
        results.truncate(limit);
    }
    results
}

pub fn list_entries(state: &AppState) -> Vec<IndexEntry> {
    state.indexer.store().load().entries.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn search_applies_limit_after_ranking() {
        let root = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        for i in 0..5 {
            std::fs::write(root.path().join(format!("common_{i}.jpg")), format!("{i}")).unwrap();
        }
        let state = AppState::new(Config {
            root: root.path().to_path_buf(),
            index_path: Some(data.path().join("index.json")),
            ..Config::default()
        });
        state.indexer.scan().await;

        assert_eq!(search(&state, "common", None).len(), 5);
        assert_eq!(search(&state, "common", Some(2)).len(), 2);
        assert!(search(&state, "", Some(2)).is_empty());
        assert_eq!(list_entries(&state).len(), 5);
    }
}
