use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Empties `path` without removing it. Entries that cannot be removed are
/// skipped and returned.
pub fn clear_dir(path: &Path) -> Vec<PathBuf> {
    clear_dir_with(path, remove_entry)
}

pub(crate) fn clear_dir_with<F>(path: &Path, mut remove: F) -> Vec<PathBuf>
where
    F: FnMut(&Path) -> io::Result<()>,
{
    let mut skipped = Vec::new();
    if !path.is_dir() {
        return skipped;
    }

    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(err) => {
            debug!(path = %path.display(), "skipping unreadable directory: {err}");
            return skipped;
        }
    };

    for entry in entries.flatten() {
        let entry_path = entry.path();
        if let Err(err) = remove(&entry_path) {
            debug!(path = %entry_path.display(), "failed to remove entry: {err}");
            skipped.push(entry_path);
        }
    }

    skipped
}

pub(crate) fn remove_entry(path: &Path) -> io::Result<()> {
    if fs::symlink_metadata(path)?.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}
