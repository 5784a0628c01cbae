use std::fs;
use std::io;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::fs_ops::{remove_file_if_exists, write_file_atomic};
use crate::UpgradeState;

#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
    state: UpgradeState,
}

impl StateStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let mut store = Self {
            path: path.into(),
            state: UpgradeState::default(),
        };
        store.load();
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &UpgradeState {
        &self.state
    }

    pub fn load(&mut self) -> &UpgradeState {
        self.state = read_state_file(&self.path);
        &self.state
    }

    pub fn persist(&self) -> Result<()> {
        write_state_file(&self.path, &self.state)
    }

    pub fn reset(&mut self) -> Result<()> {
        remove_file_if_exists(&self.path)
            .with_context(|| format!("failed to remove state file: {}", self.path.display()))?;
        self.state = UpgradeState::default();
        debug!(path = %self.path.display(), "upgrade state reset");
        Ok(())
    }

    pub fn begin(&mut self) -> StateMutation<'_> {
        let draft = self.state.clone();
        StateMutation { store: self, draft }
    }

    pub fn mutate<T, F>(&mut self, update: F) -> Result<T>
    where
        F: FnOnce(&mut UpgradeState) -> Result<T>,
    {
        let mut mutation = self.begin();
        let value = update(&mut mutation.draft)?;
        mutation.commit()?;
        Ok(value)
    }
}

#[derive(Debug)]
pub struct StateMutation<'a> {
    store: &'a mut StateStore,
    draft: UpgradeState,
}

impl StateMutation<'_> {
    pub fn commit(self) -> Result<()> {
        write_state_file(&self.store.path, &self.draft)?;
        self.store.state = self.draft;
        Ok(())
    }
}

impl Deref for StateMutation<'_> {
    type Target = UpgradeState;

    fn deref(&self) -> &Self::Target {
        &self.draft
    }
}

impl DerefMut for StateMutation<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.draft
    }
}

fn read_state_file(path: &Path) -> UpgradeState {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return UpgradeState::default(),
        Err(err) => {
            warn!(path = %path.display(), "ignoring unreadable upgrade state: {err}");
            return UpgradeState::default();
        }
    };

    match serde_json::from_str::<UpgradeState>(&content) {
        Ok(state) => state,
        Err(err) => {
            // Corruption and first run look the same to callers.
            warn!(path = %path.display(), "ignoring malformed upgrade state: {err}");
            UpgradeState::default()
        }
    }
}

fn write_state_file(path: &Path, state: &UpgradeState) -> Result<()> {
    let content = serde_json::to_string_pretty(state)
        .with_context(|| format!("failed serializing upgrade state: {}", path.display()))?;
    write_file_atomic(path, content.as_bytes())
}
