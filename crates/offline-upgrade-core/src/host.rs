use std::path::{Path, PathBuf};

use anyhow::Result;
use offline_upgrade_state::RepoToggle;

use crate::MarkError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    pub installroot: PathBuf,
    pub cachedir: PathBuf,
    pub destdir: Option<PathBuf>,
    pub releasever: Option<String>,
    pub best: bool,
    pub exclude: Vec<String>,
    pub gpgcheck: bool,
    pub tsflags: Vec<String>,
    pub assumeyes: bool,
    pub distro_sync: bool,
    pub repo_toggles: Vec<RepoToggle>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            installroot: PathBuf::from("/"),
            cachedir: PathBuf::from("/var/cache/dnf"),
            destdir: None,
            releasever: None,
            best: false,
            exclude: Vec::new(),
            gpgcheck: true,
            tsflags: Vec::new(),
            assumeyes: false,
            distro_sync: false,
            repo_toggles: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Demands {
    pub available_repos: bool,
    pub freshest_metadata: bool,
    pub resolving: bool,
    pub root_user: bool,
    pub sack_activation: bool,
    pub cacheonly: bool,
    pub allow_erasing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallCandidate {
    pub name: String,
    pub epoch: u32,
    pub version: String,
    pub release: String,
    pub arch: String,
    pub repo_id: String,
}

impl InstallCandidate {
    pub fn specifier(&self) -> String {
        let epoch = if self.epoch == 0 {
            String::new()
        } else {
            format!("{}:", self.epoch)
        };
        format!(
            "{}-{}{}-{}.{}",
            self.name, epoch, self.version, self.release, self.arch
        )
    }
}

pub trait PackageHost {
    fn config(&self) -> &HostConfig;

    fn config_mut(&mut self) -> &mut HostConfig;

    fn demands(&self) -> &Demands;

    fn demands_mut(&mut self) -> &mut Demands;

    fn detect_releasever(&self, installroot: &Path) -> Result<Option<String>>;

    fn distro_sync(&mut self) -> Result<()>;

    fn install(&mut self, spec: &str, repo_id: &str) -> Result<(), MarkError>;

    fn run_transaction(&mut self) -> Result<()>;

    fn install_set(&self) -> Result<Vec<InstallCandidate>>;
}
