use std::path::{Path, PathBuf};

pub const DEFAULT_STATE_FILE: &str = "/var/lib/dnf/offline-upgrade.json";
pub const DEFAULT_DATA_DIR: &str = "/var/lib/dnf/offline-upgrade";
pub const DEFAULT_DEST_DIR: &str = "/tmp/offline-upgrade";

/// Well-known locations shared by every phase invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeLayout {
    state_file: PathBuf,
    data_dir: PathBuf,
    dest_dir: PathBuf,
}

impl UpgradeLayout {
    pub fn new(
        state_file: impl Into<PathBuf>,
        data_dir: impl Into<PathBuf>,
        dest_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            state_file: state_file.into(),
            data_dir: data_dir.into(),
            dest_dir: dest_dir.into(),
        }
    }

    /// Default layout re-rooted under `root`.
    pub fn under_root(root: &Path) -> Self {
        Self::new(
            reroot(root, DEFAULT_STATE_FILE),
            reroot(root, DEFAULT_DATA_DIR),
            reroot(root, DEFAULT_DEST_DIR),
        )
    }

    pub fn state_file(&self) -> &Path {
        &self.state_file
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn dest_dir(&self) -> &Path {
        &self.dest_dir
    }
}

impl Default for UpgradeLayout {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_FILE, DEFAULT_DATA_DIR, DEFAULT_DEST_DIR)
    }
}

fn reroot(root: &Path, absolute: &str) -> PathBuf {
    root.join(absolute.trim_start_matches('/'))
}
