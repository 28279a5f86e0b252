use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::AppError;
use crate::models::index_entry::Index;

enum LoadFailure {
    Unreadable,
    Corrupt,
}

/// Durable home of one root's [`Index`]: a single JSON file.
#[derive(Debug, Clone)]
pub struct IndexStore {
    path: PathBuf,
}

impl IndexStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the persisted index for reading. A missing, unreadable or
    /// malformed file yields an empty index and is left where it is.
    pub fn load(&self) -> Index {
        self.read_index().unwrap_or_default()
    }

    /// Loads the index ahead of a write. A malformed file is moved aside to
    /// `<name>.corrupt` so the next save does not destroy it. Callers must
    /// hold the writer lock, otherwise a valid file saved in between could
    /// be the one moved.
    pub fn load_or_recover(&self) -> Index {
        match self.read_index() {
            Ok(index) => index,
            Err(LoadFailure::Corrupt) => {
                self.backup_corrupt();
                Index::default()
            }
            Err(LoadFailure::Unreadable) => Index::default(),
        }
    }

    fn read_index(&self) -> Result<Index, LoadFailure> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Index::default()),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "index unreadable, starting empty");
                return Err(LoadFailure::Unreadable);
            }
        };

        serde_json::from_slice::<Index>(&raw).map_err(|e| {
            warn!(path = %self.path.display(), error = %e, "index corrupt, starting empty");
            LoadFailure::Corrupt
        })
    }

    /// Writes to a temp file beside the target, then renames it into place.
    pub fn save(&self, index: &Index) -> Result<(), AppError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, index)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;

        debug!(path = %self.path.display(), entries = index.len(), "index saved");
        Ok(())
    }

    /// Byte length of the persisted file, 0 when it does not exist.
    pub fn size_on_disk(&self) -> u64 {
        std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    fn backup_corrupt(&self) {
        let mut backup = self.path.clone().into_os_string();
        backup.push(".corrupt");
        if let Err(e) = std::fs::rename(&self.path, &backup) {
            warn!(path = %self.path.display(), error = %e, "failed to back up corrupt index");
        }
    }
}
