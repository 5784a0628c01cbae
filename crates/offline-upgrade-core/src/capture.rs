use std::collections::BTreeMap;

use anyhow::Result;
use tracing::{debug, info};

use crate::{InstallCandidate, MarkError, PackageHost, PhaseError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub attempted: usize,
    pub installed: usize,
    pub unmatched: Vec<String>,
}

pub fn capture_install_set(install_set: &[InstallCandidate]) -> BTreeMap<String, Vec<String>> {
    let mut captured: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for candidate in install_set {
        captured
            .entry(candidate.repo_id.clone())
            .or_default()
            .push(candidate.specifier());
    }
    captured
}

pub fn replay_install_set<H>(
    host: &mut H,
    captured: &BTreeMap<String, Vec<String>>,
) -> Result<ReplaySummary>
where
    H: PackageHost + ?Sized,
{
    let mut summary = ReplaySummary::default();

    for (repo_id, specs) in captured {
        for spec in specs {
            summary.attempted += 1;
            match host.install(spec, repo_id) {
                Ok(()) => summary.installed += 1,
                Err(MarkError::NoMatch { .. }) => {
                    info!("Unable to match package: {spec} {repo_id}");
                    summary.unmatched.push(spec.clone());
                }
                Err(MarkError::Host(err)) => {
                    return Err(err.context(format!(
                        "failed to mark {spec} from repository {repo_id} for install"
                    )));
                }
            }
        }
    }

    debug!(
        attempted = summary.attempted,
        installed = summary.installed,
        unmatched = summary.unmatched.len(),
        "replayed captured transaction"
    );

    if !summary.unmatched.is_empty() {
        return Err(PhaseError::Marking {
            unmatched: summary.unmatched,
        }
        .into());
    }

    Ok(summary)
}
