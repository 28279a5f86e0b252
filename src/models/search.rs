use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub total_images: usize,
    pub last_scan_epoch: i64,
    /// RFC 3339 rendering of `last_scan_epoch`; absent before the first scan.
    pub last_scan: Option<String>,
    pub index_size_bytes: u64,
}
