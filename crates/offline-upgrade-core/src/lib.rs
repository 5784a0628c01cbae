mod capture;
mod controller;
mod error;
mod fs_ops;
mod host;
mod layout;
mod phases;

pub use capture::{capture_install_set, replay_install_set, ReplaySummary};
pub use controller::{PhaseController, PhaseState};
pub use error::{MarkError, PhaseError};
pub use fs_ops::clear_dir;
pub use host::{Demands, HostConfig, InstallCandidate, PackageHost};
pub use layout::{UpgradeLayout, DEFAULT_DATA_DIR, DEFAULT_DEST_DIR, DEFAULT_STATE_FILE};
pub use offline_upgrade_state::{
    DownloadStatus, RepoAction, RepoToggle, StateStore, UpgradeState, UpgradeStatus,
};
pub use phases::{
    phase_for, CleanPhase, DownloadPhase, Phase, PhaseContext, PhaseRequest, Subcommand,
    UpgradePhase,
};
