use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use crate::models::index_entry::IndexEntry;

/// The subset of file metadata change detection looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size_bytes: u64,
    pub mtime_epoch: i64,
}

impl FileStat {
    pub fn read(path: &Path) -> io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        let modified = metadata.modified()?;
        Ok(Self {
            size_bytes: metadata.len(),
            mtime_epoch: chrono::DateTime::<chrono::Utc>::from(modified).timestamp_millis(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// No prior entry for this path.
    New,
    /// Same mtime as the stored entry; the file was not read.
    Unchanged,
    /// Different mtime but identical bytes.
    Touched { content_hash: String },
    Modified { content_hash: String },
}

impl Change {
    pub fn needs_reanalysis(&self) -> bool {
        matches!(self, Self::New | Self::Modified { .. })
    }
}

/// Classifies a discovered file against its stored entry. `compute_hash` is
/// only called when the modification time differs.
pub fn detect<F>(entry: Option<&IndexEntry>, stat: &FileStat, compute_hash: F) -> io::Result<Change>
where
    F: FnOnce() -> io::Result<String>,
{
    let Some(entry) = entry else {
        return Ok(Change::New);
    };

    if entry.last_modified_epoch == stat.mtime_epoch {
        return Ok(Change::Unchanged);
    }

    let content_hash = compute_hash()?;
    if content_hash == entry.content_hash {
        Ok(Change::Touched { content_hash })
    } else {
        Ok(Change::Modified { content_hash })
    }
}

pub fn needs_reanalysis<F>(entry: Option<&IndexEntry>, stat: &FileStat, compute_hash: F) -> io::Result<bool>
where
    F: FnOnce() -> io::Result<String>,
{
    detect(entry, stat, compute_hash).map(|change| change.needs_reanalysis())
}

/// Hex blake3 digest of the file's bytes, streamed.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = blake3::Hasher::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hasher.finalize().to_hex().to_string())
}
