// ABOUTME: Configuration for tidewatch, built once at startup and passed explicitly.
// ABOUTME: Layers defaults, an optional YAML file, then env vars and CLI flags.

mod label;

pub use label::LabelSelector;

use crate::checker::{CheckOptions, Selection};
use crate::error::{Error, Result};
use crate::runtime::RuntimeConfig;
use nonempty::NonEmpty;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "tidewatch.yml";
pub const CONFIG_FILENAME_ALT: &str = "tidewatch.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".tidewatch/config.yml";

/// Settings as written in `tidewatch.yml`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Container names to check.
    pub containers: Vec<String>,

    /// Check containers carrying this label.
    #[serde(deserialize_with = "label::deserialize_label")]
    pub label: Option<LabelSelector>,

    /// Check every running container.
    pub all: bool,

    /// Pull updated images but leave containers running.
    pub no_restart: bool,

    /// Re-run the check on this interval instead of exiting.
    #[serde(with = "humantime_serde")]
    pub interval: Option<Duration>,

    pub log_level: Option<String>,

    pub runtime: RuntimeConfig,

    pub check: CheckOptions,

    #[serde(with = "humantime_serde")]
    pub stop_timeout: Option<Duration>,
}

impl FileConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty file deserializes as YAML null.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load the first config file found in `dir`, or defaults if there is none.
    pub fn discover(dir: &Path) -> Result<Self> {
        match Self::find(dir) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading config file");
                Self::load(&path)
            }
            None => Ok(Self::default()),
        }
    }

    fn find(dir: &Path) -> Option<PathBuf> {
        [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ]
        .into_iter()
        .find(|path| path.is_file())
    }
}

/// Values from the command line or environment. `None`/empty means "not given".
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub names: Vec<String>,
    pub label: Option<LabelSelector>,
    pub all: bool,
    pub no_restart: bool,
    pub interval: Option<Duration>,
    pub log_level: Option<String>,
    pub max_concurrency: Option<usize>,
    pub probe_timeout: Option<Duration>,
}

impl Overrides {
    fn selects(&self) -> bool {
        !self.names.is_empty() || self.label.is_some() || self.all
    }
}

/// Fully resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub selection: Selection,
    pub no_restart: bool,
    pub interval: Option<Duration>,
    pub log_level: Option<String>,
    pub runtime: RuntimeConfig,
    pub check: CheckOptions,
    pub stop_timeout: Duration,
}

fn default_stop_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Config {
    /// Merge file settings with overrides and validate the result.
    ///
    /// A selection given on the command line replaces the file's selection
    /// outright rather than combining with it.
    pub fn resolve(file: FileConfig, overrides: Overrides) -> Result<Self> {
        let (names, label, all) = if overrides.selects() {
            (overrides.names, overrides.label, overrides.all)
        } else {
            (file.containers, file.label, file.all)
        };

        let selection = selection(names, label, all)?;

        let check = CheckOptions {
            max_concurrency: overrides.max_concurrency.or(file.check.max_concurrency),
            probe_timeout: overrides.probe_timeout.or(file.check.probe_timeout),
        };
        if check.max_concurrency == Some(0) {
            return Err(Error::InvalidConfig(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if check.probe_timeout == Some(Duration::ZERO) {
            return Err(Error::InvalidConfig(
                "probe_timeout must be greater than zero".to_string(),
            ));
        }

        let interval = overrides.interval.or(file.interval);
        if interval == Some(Duration::ZERO) {
            return Err(Error::InvalidConfig(
                "interval must be greater than zero".to_string(),
            ));
        }

        Ok(Config {
            selection,
            no_restart: overrides.no_restart || file.no_restart,
            interval,
            log_level: overrides.log_level.or(file.log_level),
            runtime: file.runtime,
            check,
            stop_timeout: file.stop_timeout.unwrap_or_else(default_stop_timeout),
        })
    }
}

fn selection(names: Vec<String>, label: Option<LabelSelector>, all: bool) -> Result<Selection> {
    let names: Vec<String> = names
        .into_iter()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .collect();

    match (NonEmpty::from_vec(names), label, all) {
        (Some(names), None, false) => Ok(Selection::Names(names)),
        (None, Some(label), false) => Ok(Selection::Label {
            key: label.key,
            value: label.value,
        }),
        (None, None, true) => Ok(Selection::All),
        (None, None, false) => Err(Error::InvalidConfig(
            "specify container names, --label, or --all".to_string(),
        )),
        _ => Err(Error::InvalidConfig(
            "container names, --label, and --all cannot be combined".to_string(),
        )),
    }
}
