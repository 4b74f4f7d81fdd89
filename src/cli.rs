// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Every option also reads a TIDEWATCH_* environment variable.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tidewatch::config::{LabelSelector, Overrides};

#[derive(Parser)]
#[command(name = "tidewatch")]
#[command(about = "Check running containers for newer upstream images and roll them forward")]
#[command(version)]
pub struct Cli {
    /// Names of the containers to check
    #[arg(value_name = "CONTAINER")]
    pub containers: Vec<String>,

    /// Check containers labelled tidewatch.update=true
    #[arg(long, env = "TIDEWATCH_LABEL")]
    pub label: bool,

    /// Check containers carrying this label instead (KEY=VALUE)
    #[arg(long, value_name = "KEY=VALUE", value_parser = LabelSelector::parse, env = "TIDEWATCH_LABEL_FILTER")]
    pub label_filter: Option<LabelSelector>,

    /// Check every running container
    #[arg(long, env = "TIDEWATCH_ALL")]
    pub all: bool,

    /// Pull newer images but do not recreate containers
    #[arg(long, env = "TIDEWATCH_NO_RESTART")]
    pub no_restart: bool,

    /// Keep running and re-check on this interval (e.g. 30m, 6h)
    #[arg(long, value_parser = humantime::parse_duration, env = "TIDEWATCH_INTERVAL")]
    pub interval: Option<Duration>,

    /// Maximum number of registry probes in flight
    #[arg(long, env = "TIDEWATCH_MAX_CONCURRENCY")]
    pub max_concurrency: Option<usize>,

    /// Give up on a single image after this long (e.g. 30s)
    #[arg(long, value_parser = humantime::parse_duration, env = "TIDEWATCH_PROBE_TIMEOUT")]
    pub probe_timeout: Option<Duration>,

    /// Configuration file (default: tidewatch.yml in the current directory)
    #[arg(short, long, env = "TIDEWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level filter (e.g. debug, info, warn)
    #[arg(long, env = "TIDEWATCH_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Only print the summary
    #[arg(short, long, conflicts_with = "json")]
    pub quiet: bool,

    /// Print results as JSON lines
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        let label = match (&self.label_filter, self.label) {
            (Some(selector), _) => Some(selector.clone()),
            (None, true) => Some(LabelSelector::default()),
            (None, false) => None,
        };

        Overrides {
            names: self.containers.clone(),
            label,
            all: self.all,
            no_restart: self.no_restart,
            interval: self.interval,
            log_level: self.log_level.clone(),
            max_concurrency: self.max_concurrency,
            probe_timeout: self.probe_timeout,
        }
    }
}
