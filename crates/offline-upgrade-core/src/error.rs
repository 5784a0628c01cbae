use thiserror::Error;

/// Failures that end an invocation with a user-facing message.
#[derive(Debug, Error)]
pub enum PhaseError {
    #[error("{0}")]
    Precondition(String),

    #[error("Unable to match some of packages: {}", .unmatched.join(", "))]
    Marking { unmatched: Vec<String> },
}

impl PhaseError {
    pub(crate) fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }
}

/// Outcome of asking the host to mark one specifier for install.
#[derive(Debug, Error)]
pub enum MarkError {
    #[error("no package matched '{spec}' in repository '{repo_id}'")]
    NoMatch { spec: String, repo_id: String },

    #[error(transparent)]
    Host(#[from] anyhow::Error),
}
