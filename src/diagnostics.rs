// ABOUTME: Diagnostics accumulator for non-fatal warnings while applying updates.
// ABOUTME: Pull and recreate failures are reported without aborting the run.

/// Collects non-fatal warnings raised while acting on a check.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!(kind = ?warning.kind, subject = %warning.subject, "{}", warning.message);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// A non-fatal warning about one image or container.
#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    /// Image reference or container name the warning is about.
    pub subject: String,
    pub message: String,
}

impl Warning {
    pub fn pull_failed(image: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::PullFailed,
            subject: image.into(),
            message: message.into(),
        }
    }

    pub fn recreate_failed(container: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::RecreateFailed,
            subject: container.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Updated image could not be pulled; its containers were left alone.
    PullFailed,
    /// Container could not be moved onto the new image.
    RecreateFailed,
}
