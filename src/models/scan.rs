use serde::{Deserialize, Serialize};

/// Counters for one completed scan cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    /// Files sent through analysis.
    pub processed: usize,
    /// Files whose stored entry was left untouched.
    pub skipped: usize,
    /// Files with a new mtime but identical content.
    pub touched: usize,
    pub removed: usize,
    /// Files skipped this cycle because stat or hashing failed.
    pub failed: usize,
    pub total: usize,
}

/// What a call to `Indexer::scan` did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "cycles", rename_all = "camelCase")]
pub enum ScanOutcome {
    /// This call ran one or more cycles; the last entry is the most recent.
    Completed(Vec<ScanSummary>),
    /// A cycle was already running; a follow-up was queued instead.
    Coalesced,
}

impl ScanOutcome {
    pub fn cycles(&self) -> usize {
        match self {
            Self::Completed(summaries) => summaries.len(),
            Self::Coalesced => 0,
        }
    }
}
