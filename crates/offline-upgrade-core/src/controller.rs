use std::fmt;

use anyhow::Result;
use offline_upgrade_state::{DownloadStatus, StateStore, UpgradeState, UpgradeStatus};
use tracing::debug;

use crate::{phase_for, PackageHost, PhaseContext, PhaseRequest, Subcommand, UpgradeLayout};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhaseState {
    Idle,
    DownloadCheck,
    Downloading,
    DownloadComplete,
    UpgradeCheck,
    Upgrading,
    UpgradeComplete,
    Cleaned,
}

impl PhaseState {
    /// Where a fresh invocation starts, judged from what earlier ones persisted.
    pub fn from_record(state: &UpgradeState) -> Self {
        match (state.upgrade_status, state.download_status) {
            (Some(UpgradeStatus::Incomplete), _) => Self::Upgrading,
            (_, Some(DownloadStatus::Complete)) => Self::DownloadComplete,
            (_, Some(DownloadStatus::Downloading)) => Self::Downloading,
            _ => Self::Idle,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::DownloadCheck => "download-check",
            Self::Downloading => "downloading",
            Self::DownloadComplete => "download-complete",
            Self::UpgradeCheck => "upgrade-check",
            Self::Upgrading => "upgrading",
            Self::UpgradeComplete => "upgrade-complete",
            Self::Cleaned => "cleaned",
        }
    }
}

impl fmt::Display for PhaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drives one subcommand through pre-configure, configure, check, run and,
/// when the phase resolves a transaction, the post-transaction hook.
#[derive(Debug)]
pub struct PhaseController {
    layout: UpgradeLayout,
    store: StateStore,
    state: PhaseState,
}

impl PhaseController {
    pub fn new(layout: UpgradeLayout) -> Self {
        let store = StateStore::open(layout.state_file());
        Self::with_store(layout, store)
    }

    pub fn with_store(layout: UpgradeLayout, store: StateStore) -> Self {
        let state = PhaseState::from_record(store.state());
        Self {
            layout,
            store,
            state,
        }
    }

    pub fn state(&self) -> PhaseState {
        self.state
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn layout(&self) -> &UpgradeLayout {
        &self.layout
    }

    pub fn execute(
        &mut self,
        request: &PhaseRequest,
        host: &mut dyn PackageHost,
    ) -> Result<PhaseState> {
        let subcommand = request.subcommand();
        let phase = phase_for(subcommand);
        let mut ctx = PhaseContext {
            host,
            store: &mut self.store,
            layout: &self.layout,
            request,
        };

        phase.pre_configure(&mut ctx)?;
        phase.configure(&mut ctx)?;

        if let Some(next) = check_state(subcommand) {
            transition(&mut self.state, next);
        }
        phase.check(&mut ctx)?;

        if let Some(next) = run_state(subcommand) {
            transition(&mut self.state, next);
        }
        phase.run(&mut ctx)?;

        if ctx.host.demands().resolving {
            ctx.host.run_transaction()?;
            if subcommand == Subcommand::Upgrade {
                transition(&mut self.state, PhaseState::UpgradeComplete);
            }
            phase.post_transaction(&mut ctx)?;
        }

        transition(&mut self.state, complete_state(subcommand));
        Ok(self.state)
    }
}

fn check_state(subcommand: Subcommand) -> Option<PhaseState> {
    match subcommand {
        Subcommand::Download => Some(PhaseState::DownloadCheck),
        Subcommand::Upgrade => Some(PhaseState::UpgradeCheck),
        Subcommand::Clean => None,
    }
}

fn run_state(subcommand: Subcommand) -> Option<PhaseState> {
    match subcommand {
        Subcommand::Download => Some(PhaseState::Downloading),
        Subcommand::Upgrade => Some(PhaseState::Upgrading),
        Subcommand::Clean => None,
    }
}

fn complete_state(subcommand: Subcommand) -> PhaseState {
    match subcommand {
        Subcommand::Download => PhaseState::DownloadComplete,
        Subcommand::Upgrade | Subcommand::Clean => PhaseState::Cleaned,
    }
}

fn transition(state: &mut PhaseState, next: PhaseState) {
    if *state != next {
        debug!(from = %state, to = %next, "phase transition");
        *state = next;
    }
}
