use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{anyhow, Context, Result};
use indicatif::ProgressBar;
use offline_upgrade_core::{
    Demands, HostConfig, InstallCandidate, MarkError, PackageHost, RepoAction,
};
use tracing::{debug, info};

use crate::render::{start_spinner, OutputStyle};

const RPM_QUERY_FORMAT: &str = "%{NAME}\\t%{EPOCHNUM}\\t%{VERSION}\\t%{RELEASE}\\t%{ARCH}\\n";

/// Runs a prepared command and returns its stdout, or fails with `context_message`.
pub(crate) type CommandExecutor = Box<dyn Fn(&mut Command, &str) -> Result<String>>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum PendingTransaction {
    Nothing,
    DistroSync,
    Marked(Vec<(String, String)>),
}

/// [`PackageHost`] backed by the `dnf` and `rpm` command-line tools.
pub(crate) struct DnfHost {
    config: HostConfig,
    demands: Demands,
    dnf: PathBuf,
    rpm: PathBuf,
    style: OutputStyle,
    pending: PendingTransaction,
    spinner: Option<ProgressBar>,
    known_repos: Option<BTreeSet<String>>,
    executor: CommandExecutor,
}

impl DnfHost {
    pub(crate) fn new(
        config: HostConfig,
        demands: Demands,
        dnf: PathBuf,
        rpm: PathBuf,
        style: OutputStyle,
    ) -> Self {
        Self::with_executor(config, demands, dnf, rpm, style, Box::new(run_command_output))
    }

    pub(crate) fn with_executor(
        config: HostConfig,
        demands: Demands,
        dnf: PathBuf,
        rpm: PathBuf,
        style: OutputStyle,
        executor: CommandExecutor,
    ) -> Self {
        Self {
            config,
            demands,
            dnf,
            rpm,
            style,
            pending: PendingTransaction::Nothing,
            spinner: None,
            known_repos: None,
            executor,
        }
    }

    fn dnf_command(&self, with_repo_toggles: bool) -> Command {
        let mut command = Command::new(&self.dnf);
        command.args(dnf_common_args(&self.config, &self.demands, with_repo_toggles));
        command
    }

    fn transaction_command(&self) -> Option<Command> {
        match &self.pending {
            PendingTransaction::Nothing => None,
            PendingTransaction::DistroSync => {
                let mut command = self.dnf_command(true);
                command.arg("distro-sync");
                Some(command)
            }
            PendingTransaction::Marked(marks) if marks.is_empty() => None,
            PendingTransaction::Marked(marks) => {
                let mut command = self.dnf_command(true);
                command.arg(if self.config.distro_sync {
                    "distro-sync"
                } else {
                    "install"
                });
                command.args(marks.iter().map(|(_, spec)| spec));
                Some(command)
            }
        }
    }

    fn repo_is_known(&mut self, repo_id: &str) -> Result<bool> {
        if self.known_repos.is_none() {
            let mut command = self.dnf_command(false);
            command.args(["repolist", "--all", "--quiet"]);
            let stdout = (self.executor)(&mut command, "failed to list configured repositories")?;
            self.known_repos = Some(parse_repolist(&stdout));
        }
        Ok(self
            .known_repos
            .as_ref()
            .is_some_and(|repos| repos.contains(repo_id)))
    }

    fn finish_spinner(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}

impl PackageHost for DnfHost {
    fn config(&self) -> &HostConfig {
        &self.config
    }

    fn config_mut(&mut self) -> &mut HostConfig {
        &mut self.config
    }

    fn demands(&self) -> &Demands {
        &self.demands
    }

    fn demands_mut(&mut self) -> &mut Demands {
        &mut self.demands
    }

    fn detect_releasever(&self, installroot: &Path) -> Result<Option<String>> {
        let mut command = Command::new(&self.rpm);
        command
            .arg("--root")
            .arg(installroot)
            .args(["-q", "--whatprovides", "system-release", "--qf", "%{VERSION}\\n"]);

        // Nothing providing system-release is not an error for the caller.
        match (self.executor)(&mut command, "failed to detect installed release version") {
            Ok(stdout) => Ok(parse_releasever(&stdout)),
            Err(err) => {
                debug!("{err:#}");
                Ok(None)
            }
        }
    }

    fn distro_sync(&mut self) -> Result<()> {
        self.pending = PendingTransaction::DistroSync;
        Ok(())
    }

    fn install(&mut self, spec: &str, repo_id: &str) -> Result<(), MarkError> {
        if self.spinner.is_none() {
            self.spinner = start_spinner(self.style, "matching packages");
        }
        if let Some(spinner) = &self.spinner {
            spinner.inc(1);
        }

        // dnf refuses `--repo` for an id it does not know, which is a no-match here.
        if !self.repo_is_known(repo_id)? {
            return Err(MarkError::NoMatch {
                spec: spec.to_string(),
                repo_id: repo_id.to_string(),
            });
        }

        let mut command = self.dnf_command(false);
        command
            .arg(format!("--repo={repo_id}"))
            .args(["repoquery", "--quiet", "--qf", "%{name}"])
            .arg(spec);
        let stdout = (self.executor)(
            &mut command,
            &format!("failed to query {spec} in repository {repo_id}"),
        )?;
        if stdout.trim().is_empty() {
            return Err(MarkError::NoMatch {
                spec: spec.to_string(),
                repo_id: repo_id.to_string(),
            });
        }

        let mark = (repo_id.to_string(), spec.to_string());
        match &mut self.pending {
            PendingTransaction::Marked(marks) => marks.push(mark),
            pending => *pending = PendingTransaction::Marked(vec![mark]),
        }
        Ok(())
    }

    fn run_transaction(&mut self) -> Result<()> {
        self.finish_spinner();
        let Some(mut command) = self.transaction_command() else {
            debug!("nothing marked; skipping transaction");
            return Ok(());
        };

        if self.pending == PendingTransaction::DistroSync {
            let removed = prune_cached_packages(&self.config.cachedir)?;
            if removed > 0 {
                debug!(removed, "removed packages left by an earlier download");
            }
        }

        let spinner = start_spinner(self.style, "running transaction");
        let result = (self.executor)(&mut command, "dnf transaction failed");
        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }
        for line in result?.lines() {
            info!(target: "dnf", "{line}");
        }
        Ok(())
    }

    fn install_set(&self) -> Result<Vec<InstallCandidate>> {
        let downloaded = collect_cached_packages(&self.config.cachedir)?;
        let mut install_set = Vec::new();
        for (repo_id, packages) in downloaded {
            let mut command = Command::new(&self.rpm);
            command
                .args(["-qp", "--nosignature", "--nodigest", "--qf", RPM_QUERY_FORMAT])
                .args(&packages);
            let stdout = (self.executor)(
                &mut command,
                &format!("failed to read downloaded packages from {repo_id}"),
            )?;
            install_set.extend(parse_rpm_query_lines(&stdout, &repo_id)?);
        }
        Ok(install_set)
    }
}

pub(crate) fn dnf_common_args(
    config: &HostConfig,
    demands: &Demands,
    with_repo_toggles: bool,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();
    let mut installroot = OsString::from("--installroot=");
    installroot.push(&config.installroot);
    args.push(installroot);

    if let Some(releasever) = &config.releasever {
        args.push(format!("--releasever={releasever}").into());
    }

    let mut cachedir = OsString::from("--setopt=cachedir=");
    cachedir.push(&config.cachedir);
    args.push(cachedir);
    if let Some(destdir) = &config.destdir {
        let mut arg = OsString::from("--setopt=destdir=");
        arg.push(destdir);
        args.push(arg);
    }
    args.push("--setopt=keepcache=True".into());
    args.push(format!("--setopt=best={}", dnf_bool(config.best)).into());
    if !config.gpgcheck {
        args.push("--nogpgcheck".into());
    }
    for pattern in &config.exclude {
        args.push(format!("--exclude={pattern}").into());
    }
    if with_repo_toggles {
        for toggle in &config.repo_toggles {
            let flag = match toggle.action() {
                RepoAction::Enable => "--enablerepo",
                RepoAction::Disable => "--disablerepo",
            };
            args.push(format!("{flag}={}", toggle.pattern()).into());
        }
    }
    if !config.tsflags.is_empty() {
        args.push(format!("--setopt=tsflags={}", config.tsflags.join(",")).into());
    }
    if demands.cacheonly {
        args.push("--cacheonly".into());
    }
    if demands.freshest_metadata {
        args.push("--refresh".into());
    }
    if demands.allow_erasing {
        args.push("--allowerasing".into());
    }
    if config.assumeyes {
        args.push("--assumeyes".into());
    }
    args
}

/// Downloaded RPMs grouped by repository, read from dnf's
/// `<cachedir>/<repoid>-<hash>/packages/` layout.
pub(crate) fn collect_cached_packages(cachedir: &Path) -> Result<BTreeMap<String, Vec<PathBuf>>> {
    let mut grouped: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    if !cachedir.is_dir() {
        return Ok(grouped);
    }

    for entry in fs::read_dir(cachedir)
        .with_context(|| format!("failed to read cache directory {}", cachedir.display()))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let Some(repo_id) = entry.file_name().to_str().and_then(repo_id_from_cache_dir) else {
            continue;
        };
        let packages_dir = entry.path().join("packages");
        if !packages_dir.is_dir() {
            continue;
        }

        let mut packages = Vec::new();
        for package in fs::read_dir(&packages_dir)
            .with_context(|| format!("failed to read {}", packages_dir.display()))?
        {
            let path = package?.path();
            if path.extension().and_then(|value| value.to_str()) == Some("rpm") {
                packages.push(path);
            }
        }
        if packages.is_empty() {
            continue;
        }
        packages.sort();
        grouped.entry(repo_id).or_default().extend(packages);
    }

    Ok(grouped)
}

/// Install sets are read back from the cache, so it must hold only what the
/// next transaction downloads.
pub(crate) fn prune_cached_packages(cachedir: &Path) -> Result<usize> {
    let mut removed = 0;
    for package in collect_cached_packages(cachedir)?.into_values().flatten() {
        fs::remove_file(&package)
            .with_context(|| format!("failed to remove stale package {}", package.display()))?;
        removed += 1;
    }
    Ok(removed)
}

/// `fedora-2d95c80a1fa0a67d` -> `fedora`.
pub(crate) fn repo_id_from_cache_dir(dir_name: &str) -> Option<String> {
    let (repo_id, hash) = dir_name.rsplit_once('-')?;
    if repo_id.is_empty() || hash.len() != 16 || !hash.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return None;
    }
    Some(repo_id.to_string())
}

pub(crate) fn parse_rpm_query_lines(stdout: &str, repo_id: &str) -> Result<Vec<InstallCandidate>> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let fields = line.split('\t').collect::<Vec<_>>();
            let &[name, epoch, version, release, arch] = fields.as_slice() else {
                return Err(anyhow!("unexpected rpm query output line: {line}"));
            };
            let epoch = epoch
                .parse::<u32>()
                .with_context(|| format!("invalid epoch in rpm query output line: {line}"))?;
            Ok(InstallCandidate {
                name: name.to_string(),
                epoch,
                version: version.to_string(),
                release: release.to_string(),
                arch: arch.to_string(),
                repo_id: repo_id.to_string(),
            })
        })
        .collect()
}

pub(crate) fn parse_repolist(stdout: &str) -> BTreeSet<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("repo id"))
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

pub(crate) fn parse_releasever(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with("no package provides"))
        .map(str::to_string)
}

pub(crate) fn run_command_output(command: &mut Command, context_message: &str) -> Result<String> {
    let output = command
        .output()
        .with_context(|| format!("{context_message}: command failed to start"))?;
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if output.status.success() {
        return Ok(stdout);
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(anyhow!(
        "{context_message}: status={} stdout='{}' stderr='{}'",
        output.status,
        stdout.trim(),
        stderr.trim()
    ))
}

fn dnf_bool(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}
