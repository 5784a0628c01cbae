use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use offline_upgrade_core::{
    Demands, HostConfig, UpgradeLayout, DEFAULT_DATA_DIR, DEFAULT_DEST_DIR, DEFAULT_STATE_FILE,
};
use serde::Deserialize;

pub(crate) const DEFAULT_CONFIG_PATH: &str = "/etc/dnf/offline-upgrade.toml";
pub(crate) const CONFIG_PATH_ENV: &str = "OFFLINE_UPGRADE_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct OfflineUpgradeConfig {
    #[serde(default = "config_version")]
    pub(crate) version: u32,
    pub(crate) state_file: Option<PathBuf>,
    pub(crate) data_dir: Option<PathBuf>,
    pub(crate) dest_dir: Option<PathBuf>,
    pub(crate) installroot: Option<PathBuf>,
    pub(crate) releasever: Option<String>,
    pub(crate) best: Option<bool>,
    pub(crate) gpgcheck: Option<bool>,
    #[serde(default)]
    pub(crate) exclude: Vec<String>,
    pub(crate) allow_erasing: Option<bool>,
    pub(crate) dnf: Option<PathBuf>,
    pub(crate) rpm: Option<PathBuf>,
}

impl Default for OfflineUpgradeConfig {
    fn default() -> Self {
        Self {
            version: config_version(),
            state_file: None,
            data_dir: None,
            dest_dir: None,
            installroot: None,
            releasever: None,
            best: None,
            gpgcheck: None,
            exclude: Vec::new(),
            allow_erasing: None,
            dnf: None,
            rpm: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ConfigLocation {
    pub(crate) path: PathBuf,
    pub(crate) explicit: bool,
}

impl OfflineUpgradeConfig {
    pub(crate) fn layout(&self) -> UpgradeLayout {
        UpgradeLayout::new(
            self.state_file
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE)),
            self.data_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            self.dest_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DEST_DIR)),
        )
    }

    /// The configured target wins; a one-shot `--releasever` only fills the gap.
    pub(crate) fn host_config(&self, releasever_override: Option<&str>) -> HostConfig {
        let defaults = HostConfig::default();
        HostConfig {
            installroot: self.installroot.clone().unwrap_or(defaults.installroot),
            releasever: self
                .releasever
                .clone()
                .or_else(|| releasever_override.map(str::to_string)),
            best: self.best.unwrap_or(defaults.best),
            gpgcheck: self.gpgcheck.unwrap_or(defaults.gpgcheck),
            exclude: self.exclude.clone(),
            ..defaults
        }
    }

    pub(crate) fn demands(&self) -> Demands {
        Demands {
            allow_erasing: self.allow_erasing.unwrap_or(false),
            ..Demands::default()
        }
    }

    pub(crate) fn dnf_program(&self) -> PathBuf {
        self.dnf.clone().unwrap_or_else(|| PathBuf::from("dnf"))
    }

    pub(crate) fn rpm_program(&self) -> PathBuf {
        self.rpm.clone().unwrap_or_else(|| PathBuf::from("rpm"))
    }
}

pub(crate) fn resolve_config_location(
    flag: Option<&Path>,
    env_value: Option<OsString>,
) -> ConfigLocation {
    if let Some(path) = flag {
        return ConfigLocation {
            path: path.to_path_buf(),
            explicit: true,
        };
    }
    if let Some(value) = env_value.filter(|value| !value.is_empty()) {
        return ConfigLocation {
            path: PathBuf::from(value),
            explicit: true,
        };
    }
    ConfigLocation {
        path: PathBuf::from(DEFAULT_CONFIG_PATH),
        explicit: false,
    }
}

/// A missing default file means defaults; a missing explicit file is an error.
pub(crate) fn load_config(location: &ConfigLocation) -> Result<OfflineUpgradeConfig> {
    let content = match fs::read_to_string(&location.path) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound && !location.explicit => {
            return Ok(OfflineUpgradeConfig::default());
        }
        Err(err) => {
            return Err(err).with_context(|| {
                format!("failed reading configuration: {}", location.path.display())
            });
        }
    };

    parse_config(&content)
        .with_context(|| format!("failed parsing configuration: {}", location.path.display()))
}

pub(crate) fn parse_config(content: &str) -> Result<OfflineUpgradeConfig> {
    let config = toml::from_str::<OfflineUpgradeConfig>(content)?;
    let expected = config_version();
    if config.version != expected {
        anyhow::bail!(
            "unsupported configuration version {} (expected {})",
            config.version,
            expected
        );
    }
    Ok(config)
}

fn config_version() -> u32 {
    1
}
