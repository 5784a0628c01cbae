mod fs_ops;
mod record;
mod store;

pub use record::{DownloadStatus, RepoAction, RepoToggle, UpgradeState, UpgradeStatus};
pub use store::{StateMutation, StateStore};

#[cfg(test)]
mod tests;
