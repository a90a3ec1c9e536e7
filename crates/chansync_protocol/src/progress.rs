//! Progress milestones reported while a run is in flight.

/// How a run ended, if it has.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    /// The run is still in progress.
    None,
    /// The run finished successfully.
    Completed {
        /// Whether resources were imported as part of the run.
        resources_included: bool,
    },
    /// The run failed.
    Failed {
        /// Operator-facing description of the failure.
        error: String,
    },
}

/// A progress report.
///
/// Percent values are milestone telemetry only; nothing reads them back
/// to make decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncProgress {
    /// Completion percentage, 0 to 100.
    pub percent: u8,
    /// Human-readable milestone description.
    pub message: String,
    /// Terminal status.
    pub terminal: Terminal,
}

impl SyncProgress {
    /// Creates an intermediate milestone. Percent is clamped to 100.
    pub fn milestone(percent: u8, message: impl Into<String>) -> Self {
        Self {
            percent: percent.min(100),
            message: message.into(),
            terminal: Terminal::None,
        }
    }

    /// Creates a successful terminal report.
    pub fn completed(resources_included: bool, message: impl Into<String>) -> Self {
        Self {
            percent: 100,
            message: message.into(),
            terminal: Terminal::Completed { resources_included },
        }
    }

    /// Creates a failed terminal report.
    ///
    /// The percent is the last milestone reached before the failure.
    pub fn failed(percent: u8, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            percent: percent.min(100),
            message: format!("Failed: {}", error),
            terminal: Terminal::Failed { error },
        }
    }

    /// Returns true once the run has ended.
    pub fn is_terminal(&self) -> bool {
        !matches!(self.terminal, Terminal::None)
    }

    /// Returns true if the run completed successfully.
    pub fn is_completed(&self) -> bool {
        matches!(self.terminal, Terminal::Completed { .. })
    }

    /// Returns the resources flag of a completed run.
    pub fn resources_included(&self) -> Option<bool> {
        match self.terminal {
            Terminal::Completed { resources_included } => Some(resources_included),
            _ => None,
        }
    }
}
