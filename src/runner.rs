// ABOUTME: Runs checks once or on an interval and applies updates they find.
// ABOUTME: Pulls newer images and recreates the containers using them unless disabled.

use crate::checker::{BatchCheckResult, CheckError, Checker};
use crate::config::Config;
use crate::diagnostics::{Diagnostics, Warning};
use crate::error::Result;
use crate::output::Output;
use crate::runtime::{ContainerInfo, ContainerUpdater};
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// What one run checked and changed.
#[derive(Debug)]
pub struct RunReport {
    pub batch: BatchCheckResult,
    /// Images pulled because a newer version was found.
    pub pulled: Vec<String>,
    /// Names of containers moved onto a newer image.
    pub recreated: Vec<String>,
    pub diagnostics: Diagnostics,
}

impl RunReport {
    /// Batch-level error, if any probe failed or the batch was cancelled.
    pub fn check_error(&self) -> Option<&CheckError> {
        self.batch.error()
    }
}

/// Drives checks for one resolved configuration.
pub struct Runner {
    config: Config,
    checker: Checker,
    updater: Arc<dyn ContainerUpdater>,
    output: Output,
}

impl Runner {
    pub fn new(
        config: Config,
        checker: Checker,
        updater: Arc<dyn ContainerUpdater>,
        output: Output,
    ) -> Self {
        Self {
            config,
            checker,
            updater,
            output,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Check once, then pull and recreate for every updated image.
    ///
    /// Fails only when containers cannot be resolved. Probe failures and
    /// cancellation are reported through [`RunReport::check_error`].
    pub async fn run_once(&self, cancel: &CancellationToken) -> Result<RunReport> {
        self.output
            .progress(&format!("Checking {}...", self.config.selection));

        let batch = self
            .checker
            .check(&self.config.selection, Some(&self.output), cancel)
            .await?;
        self.output.summary(&batch.summary);

        let mut report = RunReport {
            batch,
            pulled: Vec::new(),
            recreated: Vec::new(),
            diagnostics: Diagnostics::default(),
        };

        if cancel.is_cancelled() {
            return Ok(report);
        }

        let updated: Vec<String> = report
            .batch
            .updated_images()
            .map(|r| r.image.clone())
            .collect();

        for image in updated {
            if cancel.is_cancelled() {
                break;
            }
            self.apply_update(&image, &mut report).await;
        }

        for warning in report.diagnostics.warnings() {
            self.output
                .warning(&format!("{}: {}", warning.subject, warning.message));
        }

        Ok(report)
    }

    async fn apply_update(&self, image: &str, report: &mut RunReport) {
        self.output.progress(&format!("  → Pulling {image}..."));
        if let Err(e) = self.updater.pull(image).await {
            report
                .diagnostics
                .warn(Warning::pull_failed(image, e.to_string()));
            return;
        }
        report.pulled.push(image.to_string());

        if self.config.no_restart {
            tracing::info!(%image, "image pulled, restart disabled");
            return;
        }

        let containers: Vec<ContainerInfo> =
            report.batch.containers_using(image).cloned().collect();
        for container in &containers {
            self.output
                .progress(&format!("  → Recreating {}...", container.name));
            match self
                .updater
                .recreate(container, self.config.stop_timeout)
                .await
            {
                Ok(id) => {
                    self.output.progress(&format!(
                        "  ✓ {} now runs {} ({})",
                        container.name,
                        image,
                        id.short()
                    ));
                    report.recreated.push(container.name.clone());
                }
                Err(e) => report
                    .diagnostics
                    .warn(Warning::recreate_failed(&container.name, e.to_string())),
            }
        }
    }

    /// Run immediately, then again every `interval`, until `cancel` fires.
    ///
    /// Without an interval this is a single [`Runner::run_once`]. A failed
    /// cycle is logged and the schedule carries on.
    pub async fn run_scheduled(&self, cancel: &CancellationToken) -> Result<()> {
        let Some(interval) = self.config.interval else {
            return self.run_once(cancel).await.map(|_| ());
        };

        tracing::info!(interval = %humantime::format_duration(interval), "starting scheduled checks");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.run_once(cancel).await {
                Ok(report) => {
                    if let Some(error) = report.check_error() {
                        tracing::warn!(%error, "scheduled check finished with errors");
                    }
                }
                Err(error) => {
                    tracing::error!(%error, "scheduled check failed");
                    self.output.error(&error.to_string());
                }
            }
        }

        tracing::info!("scheduled checks stopped");
        Ok(())
    }
}
