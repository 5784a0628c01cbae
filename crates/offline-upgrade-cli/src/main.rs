use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser, ValueEnum};
use offline_upgrade_core::{
    PhaseController, PhaseRequest, PhaseState, RepoAction, RepoToggle, Subcommand,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod config;
mod dnf_host;
mod render;

use config::{load_config, resolve_config_location, CONFIG_PATH_ENV};
use dnf_host::DnfHost;
use render::{current_output_style, render_status_line, OutputStyle};

#[derive(Parser, Debug)]
#[command(name = "offline-upgrade")]
#[command(
    about = "Prepare system for an offline upgrade to a new release",
    long_about = None
)]
struct Cli {
    /// Configuration file (defaults to /etc/dnf/offline-upgrade.toml)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Target release version; only accepted by `download`
    #[arg(long)]
    releasever: Option<String>,
    #[arg(long, value_name = "REPO")]
    enablerepo: Vec<String>,
    #[arg(long, value_name = "REPO")]
    disablerepo: Vec<String>,
    #[arg(value_enum, value_name = "download|upgrade|clean")]
    subcommand: SubcommandArg,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum SubcommandArg {
    Download,
    Upgrade,
    Clean,
}

impl From<SubcommandArg> for Subcommand {
    fn from(value: SubcommandArg) -> Self {
        match value {
            SubcommandArg::Download => Self::Download,
            SubcommandArg::Upgrade => Self::Upgrade,
            SubcommandArg::Clean => Self::Clean,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let (cli, repo_toggles) = match parse_cli(std::env::args_os()) {
        Ok(parsed) => parsed,
        Err(err) => err.exit(),
    };

    let output_style = current_output_style();
    match run_cli(cli, repo_toggles, output_style) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!(
                "{}",
                render_status_line(output_style, "error", &format!("{err:#}"))
            );
            ExitCode::FAILURE
        }
    }
}

fn parse_cli<I, T>(args: I) -> Result<(Cli, Vec<RepoToggle>), clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = Cli::command().try_get_matches_from(args)?;
    let cli = Cli::from_arg_matches(&matches)?;
    let repo_toggles = ordered_repo_toggles(&cli, &matches);
    Ok((cli, repo_toggles))
}

/// Interleaves `--enablerepo` and `--disablerepo` in command-line order, which
/// is the order dnf applies them in.
fn ordered_repo_toggles(cli: &Cli, matches: &ArgMatches) -> Vec<RepoToggle> {
    let mut indexed = Vec::new();
    for (id, values, action) in [
        ("enablerepo", &cli.enablerepo, RepoAction::Enable),
        ("disablerepo", &cli.disablerepo, RepoAction::Disable),
    ] {
        let indices = matches.indices_of(id).into_iter().flatten();
        for (index, value) in indices.zip(values) {
            indexed.push((index, RepoToggle(value.clone(), action)));
        }
    }
    indexed.sort_by_key(|(index, _)| *index);
    indexed.into_iter().map(|(_, toggle)| toggle).collect()
}

fn run_cli(cli: Cli, repo_toggles: Vec<RepoToggle>, output_style: OutputStyle) -> Result<()> {
    let location =
        resolve_config_location(cli.config.as_deref(), std::env::var_os(CONFIG_PATH_ENV));
    let config = load_config(&location)?;
    let request = PhaseRequest::new(
        cli.subcommand.into(),
        cli.releasever.clone(),
        repo_toggles,
    )?;

    let mut host = DnfHost::new(
        config.host_config(cli.releasever.as_deref()),
        config.demands(),
        config.dnf_program(),
        config.rpm_program(),
        output_style,
    );
    let mut controller = PhaseController::new(config.layout());
    debug!(
        config = %location.path.display(),
        state_file = %controller.layout().state_file().display(),
        phase = %controller.state(),
        "loaded offline upgrade state"
    );

    let reached = controller.execute(&request, &mut host)?;
    println!(
        "{}",
        render_status_line(
            output_style,
            "ok",
            &completion_message(request.subcommand(), reached)
        )
    );
    Ok(())
}

fn completion_message(subcommand: Subcommand, reached: PhaseState) -> String {
    match subcommand {
        Subcommand::Download => format!("download finished; state is {reached}"),
        Subcommand::Upgrade => format!("upgrade finished; state is {reached}"),
        Subcommand::Clean => "removed downloaded data and upgrade state".to_string(),
    }
}
