use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use tracing::warn;

/// True when `path` ends in one of `extensions` (lowercase, no dot).
pub fn is_media_file(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let ext = e.to_lowercase();
            extensions.iter().any(|known| *known == ext)
        })
        .unwrap_or(false)
}

/// Lazily walks `root` in file-name order and yields every regular file with
/// a recognized media extension. Unreadable directories are logged and skipped.
pub fn scan<'a>(root: &'a Path, extensions: &'a [String]) -> impl Iterator<Item = PathBuf> + 'a {
    scan_reporting(root, extensions, |_| {})
}

/// Same walk as [`scan`], but hands every path that exists and could not be
/// read to `on_unreadable`. Paths that vanished mid-walk are not reported.
pub fn scan_reporting<'a, F>(
    root: &'a Path,
    extensions: &'a [String],
    mut on_unreadable: F,
) -> impl Iterator<Item = PathBuf> + 'a
where
    F: FnMut(&Path) + 'a,
{
    walkdir::WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(move |entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                let at = e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                warn!(path = %at, error = %e, "skipping unreadable entry");
                let vanished = e
                    .io_error()
                    .is_some_and(|io| io.kind() == ErrorKind::NotFound);
                if let (Some(path), false) = (e.path(), vanished) {
                    on_unreadable(path);
                }
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(move |path| is_media_file(path, extensions))
}

/// Index key for `path`: relative to `root`, `/`-separated.
pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
