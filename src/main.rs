// ABOUTME: Entry point for the tidewatch CLI application.
// ABOUTME: Loads configuration, connects to the runtime, and runs the checks.

mod cli;

use clap::Parser;
use cli::Cli;
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tidewatch::checker::{CheckErrorKind, Checker};
use tidewatch::config::{Config, FileConfig};
use tidewatch::error::{Error, Result};
use tidewatch::output::{Output, OutputMode};
use tidewatch::runner::Runner;
use tidewatch::runtime::{BollardRuntime, RuntimeError, resolve_runtime};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Some images could not be checked.
const EXIT_PARTIAL: u8 = 2;
/// Interrupted before the check finished.
const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let output = Output::new(output_mode(&cli));

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(cli.verbose, config.log_level.as_deref());

    match run(config, output).await {
        Ok(code) => code,
        Err(Error::Check(e)) if e.kind() == CheckErrorKind::Cancelled => {
            ExitCode::from(EXIT_INTERRUPTED)
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn output_mode(cli: &Cli) -> OutputMode {
    if cli.json {
        OutputMode::Json
    } else if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::discover(&env::current_dir()?)?,
    };
    Config::resolve(file, cli.overrides())
}

/// `RUST_LOG` wins, then `--verbose`, then the configured level.
fn init_tracing(verbose: bool, log_level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::try_new(log_level.unwrap_or("warn"))
                .unwrap_or_else(|_| EnvFilter::new("warn"))
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(config: Config, output: Output) -> Result<ExitCode> {
    let info = resolve_runtime(&config.runtime).map_err(RuntimeError::from)?;
    tracing::info!(runtime = %info.runtime_type, socket = %info.socket_path, "using container runtime");
    let runtime = Arc::new(
        BollardRuntime::connect(&info)
            .await
            .map_err(RuntimeError::from)?,
    );

    let checker =
        Checker::new(runtime.clone(), runtime.clone()).with_options(config.check.clone());
    let scheduled = config.interval.is_some();
    let runner = Runner::new(config, checker, runtime, output);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, cancelling");
            on_signal.cancel();
        }
    });

    if scheduled {
        runner.run_scheduled(&cancel).await?;
        return Ok(ExitCode::SUCCESS);
    }

    let report = runner.run_once(&cancel).await?;
    let code = match report.check_error() {
        None => ExitCode::SUCCESS,
        Some(e) if e.kind() == CheckErrorKind::Cancelled => ExitCode::from(EXIT_INTERRUPTED),
        Some(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(EXIT_PARTIAL)
        }
    };
    Ok(code)
}
