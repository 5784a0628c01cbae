use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Downloading,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpgradeStatus {
    Incomplete,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoAction {
    Enable,
    Disable,
}

/// One `--enablerepo`/`--disablerepo` request, stored as `["pattern", "enable"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoToggle(pub String, pub RepoAction);

impl RepoToggle {
    pub fn enable(pattern: impl Into<String>) -> Self {
        Self(pattern.into(), RepoAction::Enable)
    }

    pub fn disable(pattern: impl Into<String>) -> Self {
        Self(pattern.into(), RepoAction::Disable)
    }

    pub fn pattern(&self) -> &str {
        &self.0
    }

    pub fn action(&self) -> RepoAction {
        self.1
    }
}

/// Everything one invocation hands to the next.
///
/// Every field serializes, including `None` as JSON `null`, so the file always
/// carries the full schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeState {
    #[serde(default)]
    pub allow_erasing: Option<bool>,
    #[serde(default)]
    pub best: Option<bool>,
    #[serde(default)]
    pub destdir: Option<String>,
    #[serde(default)]
    pub distro_sync: Option<bool>,
    #[serde(default)]
    pub download_status: Option<DownloadStatus>,
    #[serde(default)]
    pub enable_disable_repos: Option<Vec<RepoToggle>>,
    #[serde(default)]
    pub exclude: Option<Vec<String>>,
    #[serde(default)]
    pub gpgcheck: Option<bool>,
    #[serde(default)]
    pub install_packages: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default)]
    pub system_releasever: Option<String>,
    #[serde(default)]
    pub target_releasever: Option<String>,
    #[serde(default)]
    pub upgrade_status: Option<UpgradeStatus>,
}

impl UpgradeState {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn is_ready_for_upgrade(&self) -> bool {
        self.upgrade_status == Some(UpgradeStatus::Ready)
    }

    pub fn install_packages_count(&self) -> usize {
        self.install_packages
            .as_ref()
            .map(|packages| packages.values().map(Vec::len).sum())
            .unwrap_or(0)
    }
}
