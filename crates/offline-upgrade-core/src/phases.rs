use std::fmt;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use offline_upgrade_state::{DownloadStatus, RepoToggle, StateStore, UpgradeStatus};
use tracing::info;

use crate::{
    capture_install_set, clear_dir, replay_install_set, PackageHost, PhaseError, UpgradeLayout,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subcommand {
    Download,
    Upgrade,
    Clean,
}

impl Subcommand {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Upgrade => "upgrade",
            Self::Clean => "clean",
        }
    }
}

impl fmt::Display for Subcommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One invocation's command-line inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseRequest {
    subcommand: Subcommand,
    releasever_override: Option<String>,
    repo_toggles: Vec<RepoToggle>,
}

impl PhaseRequest {
    pub fn new(
        subcommand: Subcommand,
        releasever_override: Option<String>,
        repo_toggles: Vec<RepoToggle>,
    ) -> Result<Self> {
        if releasever_override.is_some() && subcommand != Subcommand::Download {
            return Err(PhaseError::precondition(format!(
                "--releasever is only accepted by 'download', not '{subcommand}'"
            ))
            .into());
        }

        Ok(Self {
            subcommand,
            releasever_override,
            repo_toggles,
        })
    }

    pub fn subcommand(&self) -> Subcommand {
        self.subcommand
    }

    pub fn releasever_override(&self) -> Option<&str> {
        self.releasever_override.as_deref()
    }

    pub fn repo_toggles(&self) -> &[RepoToggle] {
        &self.repo_toggles
    }
}

pub struct PhaseContext<'a> {
    pub host: &'a mut dyn PackageHost,
    pub store: &'a mut StateStore,
    pub layout: &'a UpgradeLayout,
    pub request: &'a PhaseRequest,
}

/// Sub-steps shared by every subcommand, run in declaration order.
pub trait Phase {
    fn subcommand(&self) -> Subcommand;

    fn pre_configure(&self, _ctx: &mut PhaseContext<'_>) -> Result<()> {
        Ok(())
    }

    fn configure(&self, _ctx: &mut PhaseContext<'_>) -> Result<()> {
        Ok(())
    }

    fn check(&self, _ctx: &mut PhaseContext<'_>) -> Result<()> {
        Ok(())
    }

    fn run(&self, ctx: &mut PhaseContext<'_>) -> Result<()>;

    /// Runs after the host executed the resolved transaction.
    fn post_transaction(&self, _ctx: &mut PhaseContext<'_>) -> Result<()> {
        Ok(())
    }
}

pub fn phase_for(subcommand: Subcommand) -> &'static dyn Phase {
    match subcommand {
        Subcommand::Download => &DownloadPhase,
        Subcommand::Upgrade => &UpgradePhase,
        Subcommand::Clean => &CleanPhase,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DownloadPhase;

#[derive(Debug, Clone, Copy)]
pub struct UpgradePhase;

#[derive(Debug, Clone, Copy)]
pub struct CleanPhase;

impl Phase for DownloadPhase {
    fn subcommand(&self) -> Subcommand {
        Subcommand::Download
    }

    fn pre_configure(&self, ctx: &mut PhaseContext<'_>) -> Result<()> {
        let config = ctx.host.config_mut();
        config.cachedir = ctx.layout.data_dir().to_path_buf();
        config.destdir = Some(ctx.layout.dest_dir().to_path_buf());
        Ok(())
    }

    fn configure(&self, ctx: &mut PhaseContext<'_>) -> Result<()> {
        let demands = ctx.host.demands_mut();
        demands.available_repos = true;
        demands.freshest_metadata = true;
        demands.resolving = true;
        demands.root_user = true;
        demands.sack_activation = true;

        // Resolve, download and test the transaction without installing anything.
        let config = ctx.host.config_mut();
        if !config.tsflags.iter().any(|flag| flag == "test") {
            config.tsflags.push("test".to_string());
        }
        config.assumeyes = true;
        Ok(())
    }

    fn check(&self, ctx: &mut PhaseContext<'_>) -> Result<()> {
        check_release_ver(&*ctx.host, ctx.request.releasever_override())?;

        let config = ctx.host.config();
        fs::create_dir_all(&config.cachedir)
            .with_context(|| format!("failed to create {}", config.cachedir.display()))?;
        if let Some(destdir) = &config.destdir {
            fs::create_dir_all(destdir)
                .with_context(|| format!("failed to create {}", destdir.display()))?;
        }
        Ok(())
    }

    fn run(&self, ctx: &mut PhaseContext<'_>) -> Result<()> {
        ctx.host.distro_sync()?;

        let config = ctx.host.config().clone();
        ctx.store.mutate(|state| {
            state.destdir = config.destdir.as_ref().map(|dir| dir.display().to_string());
            state.download_status = Some(DownloadStatus::Downloading);
            state.exclude = Some(config.exclude.clone());
            state.target_releasever = config.releasever.clone();
            Ok(())
        })
    }

    fn post_transaction(&self, ctx: &mut PhaseContext<'_>) -> Result<()> {
        let install_packages = capture_install_set(&ctx.host.install_set()?);
        let config = ctx.host.config().clone();
        let allow_erasing = ctx.host.demands().allow_erasing;
        let system_releasever = ctx.host.detect_releasever(&config.installroot)?;
        let repo_toggles = ctx.request.repo_toggles().to_vec();

        ctx.store.mutate(|state| {
            state.allow_erasing = Some(allow_erasing);
            state.best = Some(config.best);
            state.destdir = config.destdir.as_ref().map(|dir| dir.display().to_string());
            state.distro_sync = Some(true);
            state.download_status = Some(DownloadStatus::Complete);
            state.enable_disable_repos = Some(repo_toggles);
            state.gpgcheck = Some(config.gpgcheck);
            state.install_packages = Some(install_packages);
            state.system_releasever = system_releasever;
            state.target_releasever = config.releasever.clone();
            state.upgrade_status = Some(UpgradeStatus::Ready);
            Ok(())
        })?;

        info!("Download complete! Use 'offline-upgrade upgrade' to start the upgrade");
        info!("To remove cached metadata and transaction use 'offline-upgrade clean'");
        Ok(())
    }
}

impl Phase for UpgradePhase {
    fn subcommand(&self) -> Subcommand {
        Subcommand::Upgrade
    }

    fn pre_configure(&self, ctx: &mut PhaseContext<'_>) -> Result<()> {
        let state = ctx.store.state();
        let config = ctx.host.config_mut();
        config.cachedir = ctx.layout.data_dir().to_path_buf();
        config.destdir = state.destdir.as_ref().map(PathBuf::from);
        if let Some(toggles) = state
            .enable_disable_repos
            .as_ref()
            .filter(|toggles| !toggles.is_empty())
        {
            config.repo_toggles = toggles.clone();
        }
        // The second resolve must target the release the download resolved against.
        config.releasever = state.target_releasever.clone();
        Ok(())
    }

    fn configure(&self, ctx: &mut PhaseContext<'_>) -> Result<()> {
        let state = ctx.store.state();

        let demands = ctx.host.demands_mut();
        demands.available_repos = true;
        demands.resolving = true;
        demands.root_user = true;
        demands.sack_activation = true;
        demands.allow_erasing = state.allow_erasing.unwrap_or(false);
        demands.cacheonly = true;

        let config = ctx.host.config_mut();
        config.distro_sync = true;
        if let Some(best) = state.best {
            config.best = best;
        }
        if let Some(exclude) = &state.exclude {
            config.exclude = exclude.clone();
        }
        if let Some(gpgcheck) = state.gpgcheck {
            config.gpgcheck = gpgcheck;
        }
        config.assumeyes = true;
        Ok(())
    }

    fn check(&self, ctx: &mut PhaseContext<'_>) -> Result<()> {
        match ctx.store.state().upgrade_status {
            Some(UpgradeStatus::Ready) => Ok(()),
            Some(UpgradeStatus::Incomplete) => Err(PhaseError::precondition(
                "a previous upgrade did not finish; use 'offline-upgrade download' to begin the upgrade",
            )
            .into()),
            None => Err(PhaseError::precondition(
                "use 'offline-upgrade download' to begin the upgrade",
            )
            .into()),
        }
    }

    fn run(&self, ctx: &mut PhaseContext<'_>) -> Result<()> {
        // Left behind on crash so a later run can tell the upgrade was interrupted.
        ctx.store.mutate(|state| {
            state.upgrade_status = Some(UpgradeStatus::Incomplete);
            Ok(())
        })?;

        info!("Starting system upgrade. This will take a while.");

        let captured = ctx
            .store
            .state()
            .install_packages
            .clone()
            .unwrap_or_default();
        replay_install_set(&mut *ctx.host, &captured)?;
        Ok(())
    }

    fn post_transaction(&self, ctx: &mut PhaseContext<'_>) -> Result<()> {
        info!("Upgrade complete! Cleaning up...");
        clean_downloaded_data(ctx)
    }
}

impl Phase for CleanPhase {
    fn subcommand(&self) -> Subcommand {
        Subcommand::Clean
    }

    fn pre_configure(&self, ctx: &mut PhaseContext<'_>) -> Result<()> {
        let destdir = ctx.store.state().destdir.as_ref().map(PathBuf::from);
        let config = ctx.host.config_mut();
        config.cachedir = ctx.layout.data_dir().to_path_buf();
        config.destdir = destdir;
        Ok(())
    }

    fn configure(&self, ctx: &mut PhaseContext<'_>) -> Result<()> {
        ctx.host.demands_mut().root_user = true;
        Ok(())
    }

    fn run(&self, ctx: &mut PhaseContext<'_>) -> Result<()> {
        clean_downloaded_data(ctx)
    }
}

fn check_release_ver(host: &dyn PackageHost, releasever_override: Option<&str>) -> Result<()> {
    let config = host.config();
    let Some(target) = config.releasever.as_deref() else {
        return Err(PhaseError::precondition(
            "Need a --releasever greater than the current system version",
        )
        .into());
    };

    let current = host.detect_releasever(&config.installroot)?;
    if current.as_deref() == Some(target) {
        return Err(PhaseError::precondition(
            "Need a --releasever greater than the current system version",
        )
        .into());
    }

    // The override only lives for this process, so the offline run could not honor it.
    if let Some(requested) = releasever_override {
        if requested != target {
            return Err(PhaseError::precondition(format!(
                "--releasever {requested} conflicts with the configured target release {target}; \
                 set the target release in one place before 'download'"
            ))
            .into());
        }
    }

    Ok(())
}

fn clean_downloaded_data(ctx: &mut PhaseContext<'_>) -> Result<()> {
    info!("Cleaning up downloaded data...");
    let config = ctx.host.config();
    clear_dir(&config.cachedir);
    if let Some(destdir) = &config.destdir {
        clear_dir(destdir);
    }
    ctx.store.reset()
}
