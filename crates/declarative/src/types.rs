//! Core result types for dep resolution

use serde::Serialize;
use std::process::Output;

/// Result of a `met?` check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetResult {
    /// Desired state already holds
    Met,
    /// Desired state does not hold; `meet` may fix it
    NotMet,
    /// Desired state does not hold and cannot be brought about automatically
    Unmeetable { reason: String },
}

impl MetResult {
    /// Create an unmeetable result
    pub fn unmeetable(reason: impl Into<String>) -> Self {
        Self::Unmeetable {
            reason: reason.into(),
        }
    }

    pub fn is_met(&self) -> bool {
        matches!(self, Self::Met)
    }
}

impl From<bool> for MetResult {
    fn from(met: bool) -> Self {
        if met { Self::Met } else { Self::NotMet }
    }
}

/// Final outcome of processing one dep
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Already satisfied; nothing ran
    Met,
    /// `meet` ran and the re-check passed
    Changed,
    /// Dry run: `meet` would have run
    WouldChange,
    /// Something went wrong while meeting this dep or a requirement
    Failed {
        reason: String,
        /// Requirement whose failure caused this one
        prerequisite: Option<String>,
    },
    /// The dep cannot be met automatically
    Unmeetable {
        reason: String,
        /// Deps on the dependency cycle, when that is the cause
        cycle: Option<Vec<String>>,
    },
}

impl Outcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
            prerequisite: None,
        }
    }

    pub fn unmeetable(reason: impl Into<String>) -> Self {
        Self::Unmeetable {
            reason: reason.into(),
            cycle: None,
        }
    }

    /// Check if the outcome leaves the dep satisfied (or would, in a dry run)
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Met | Self::Changed | Self::WouldChange)
    }

    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }

    /// Short label for display
    pub fn label(&self) -> &'static str {
        match self {
            Self::Met => "met",
            Self::Changed => "changed",
            Self::WouldChange => "would change",
            Self::Failed { .. } => "failed",
            Self::Unmeetable { .. } => "unmeetable",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Failed { reason, .. } | Self::Unmeetable { reason, .. } => Some(reason),
            _ => None,
        }
    }

    pub fn cycle(&self) -> Option<&[String]> {
        match self {
            Self::Unmeetable {
                cycle: Some(chain), ..
            } => Some(chain),
            _ => None,
        }
    }
}

/// Counts of outcomes over one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub met: usize,
    pub changed: usize,
    pub would_change: usize,
    pub failed: usize,
    pub unmeetable: usize,
}

impl RunSummary {
    /// Add an outcome to the summary
    pub fn add_outcome(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Met => self.met += 1,
            Outcome::Changed => self.changed += 1,
            Outcome::WouldChange => self.would_change += 1,
            Outcome::Failed { .. } => self.failed += 1,
            Outcome::Unmeetable { .. } => self.unmeetable += 1,
        }
    }

    /// Check if the run was fully successful
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.unmeetable == 0
    }

    /// Label of the worst outcome seen, or `None` for an empty run
    pub fn worst(&self) -> Option<&'static str> {
        [
            (self.failed, "failed"),
            (self.unmeetable, "unmeetable"),
            (self.would_change, "would change"),
            (self.changed, "changed"),
            (self.met, "met"),
        ]
        .into_iter()
        .find(|(count, _)| *count > 0)
        .map(|(_, label)| label)
    }

    /// Total number of deps processed
    pub fn total(&self) -> usize {
        self.met + self.changed + self.would_change + self.failed + self.unmeetable
    }
}

/// Output from a shell command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub success: bool,
    pub status: Option<i32>,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            success: output.status.success(),
            status: output.status.code(),
        }
    }
}

impl CommandOutput {
    /// Get stdout as a string
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_met_result_from_bool() {
        assert_eq!(MetResult::from(true), MetResult::Met);
        assert_eq!(MetResult::from(false), MetResult::NotMet);
        assert!(!MetResult::unmeetable("no").is_met());
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = RunSummary::default();
        summary.add_outcome(&Outcome::Met);
        summary.add_outcome(&Outcome::Changed);
        summary.add_outcome(&Outcome::WouldChange);
        assert!(summary.is_success());

        summary.add_outcome(&Outcome::unmeetable("manual step"));
        assert!(!summary.is_success());
        assert_eq!(summary.total(), 4);
        assert_eq!(summary.worst(), Some("unmeetable"));
        assert_eq!(RunSummary::default().worst(), None);
        assert_eq!(summary.unmeetable, 1);
    }

    #[test]
    fn test_outcome_accessors() {
        let outcome = Outcome::Unmeetable {
            reason: "cycle".into(),
            cycle: Some(vec!["a".into(), "b".into(), "a".into()]),
        };
        assert_eq!(outcome.label(), "unmeetable");
        assert_eq!(outcome.reason(), Some("cycle"));
        assert_eq!(outcome.cycle().map(<[String]>::len), Some(3));
        assert!(Outcome::WouldChange.is_success());
    }
}
