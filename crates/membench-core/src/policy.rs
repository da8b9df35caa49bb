//! Error policy for engine failures.
//!
//! Copy and timing failures either halt the suite immediately or are recorded
//! and skipped over, depending on [`ErrorPolicy`]. Allocation and setup
//! failures always propagate; content mismatches never do.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{BenchError, FailureKind, Result};
use crate::report::{Phase, RecordedFailure};

/// What to do when an engine operation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Propagate the first failure and stop the suite.
    Halt,
    /// Record the failure, keep measuring.
    Continue,
}

impl ErrorPolicy {
    /// Parse policy from string.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "halt" | "abort" | "strict" => Ok(Self::Halt),
            "continue" | "record" | "lenient" => Ok(Self::Continue),
            _ => Err(BenchError::InvalidConfig(format!(
                "Unknown error policy '{}'. Valid options: halt, continue",
                s
            ))),
        }
    }

    /// Label used in output.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorPolicy::Halt => "halt",
            ErrorPolicy::Continue => "continue",
        }
    }
}

impl Default for ErrorPolicy {
    /// Diagnostic builds halt, optimized builds keep going.
    fn default() -> Self {
        if cfg!(debug_assertions) {
            ErrorPolicy::Halt
        } else {
            ErrorPolicy::Continue
        }
    }
}

/// Failures recorded while running under [`ErrorPolicy::Continue`].
#[derive(Debug, Default)]
pub struct FailureLog {
    entries: Vec<RecordedFailure>,
}

impl FailureLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure.
    pub fn record(&mut self, phase: Phase, kind: FailureKind, message: impl Into<String>) {
        self.entries.push(RecordedFailure {
            phase,
            kind,
            message: message.into(),
        });
    }

    /// Recorded failures so far.
    pub fn entries(&self) -> &[RecordedFailure] {
        &self.entries
    }

    /// Number of recorded failures.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Take the recorded failures, leaving the log empty.
    pub fn take(&mut self) -> Vec<RecordedFailure> {
        std::mem::take(&mut self.entries)
    }
}

/// Applies an [`ErrorPolicy`] to engine results.
#[derive(Debug)]
pub struct PolicyGuard {
    policy: ErrorPolicy,
    log: FailureLog,
}

impl PolicyGuard {
    /// Create a guard for a policy.
    pub fn new(policy: ErrorPolicy) -> Self {
        Self {
            policy,
            log: FailureLog::new(),
        }
    }

    /// Pass a result through the policy.
    ///
    /// Returns `Ok(Some(value))` on success. On a recoverable failure under
    /// [`ErrorPolicy::Continue`] the failure is logged and `Ok(None)` is
    /// returned. Everything else propagates.
    pub fn check<T>(&mut self, phase: Phase, result: Result<T>) -> Result<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(e) if self.policy == ErrorPolicy::Continue && e.is_recoverable() => {
                warn!(phase = phase.range_label(), kind = e.kind().label(), "{}", e);
                self.log.record(phase, e.kind(), e.to_string());
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Record a content mismatch. Mismatches never halt.
    pub fn record_mismatch(&mut self, phase: Phase, message: impl Into<String>) {
        self.log.record(phase, FailureKind::Mismatch, message);
    }

    /// Access the failure log.
    pub fn log(&self) -> &FailureLog {
        &self.log
    }

    /// Consume the guard and return recorded failures.
    pub fn into_failures(mut self) -> Vec<RecordedFailure> {
        self.log.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn copy_error() -> BenchError {
        BenchError::TransferFailed {
            direction: "H2D",
            reason: "injected".to_string(),
        }
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!(ErrorPolicy::parse("halt").unwrap(), ErrorPolicy::Halt);
        assert_eq!(ErrorPolicy::parse("CONTINUE").unwrap(), ErrorPolicy::Continue);
        assert!(ErrorPolicy::parse("retry").is_err());
    }

    #[test]
    fn test_default_follows_build_profile() {
        let expected = if cfg!(debug_assertions) {
            ErrorPolicy::Halt
        } else {
            ErrorPolicy::Continue
        };
        assert_eq!(ErrorPolicy::default(), expected);
    }

    #[test]
    fn test_halt_propagates() {
        let mut guard = PolicyGuard::new(ErrorPolicy::Halt);
        let result: Result<Option<()>> = guard.check(Phase::TransfersPinned, Err(copy_error()));
        assert!(result.is_err());
        assert!(guard.log().is_empty());
    }

    #[test]
    fn test_continue_records() {
        let mut guard = PolicyGuard::new(ErrorPolicy::Continue);
        let result: Option<()> = guard
            .check(Phase::TransfersPageable, Err(copy_error()))
            .unwrap();
        assert!(result.is_none());
        assert_eq!(guard.log().len(), 1);

        let failure = &guard.log().entries()[0];
        assert_eq!(failure.phase, Phase::TransfersPageable);
        assert_eq!(failure.kind, FailureKind::Copy);
        assert!(failure.message.contains("injected"));
    }

    #[test]
    fn test_continue_still_propagates_allocation_failure() {
        let mut guard = PolicyGuard::new(ErrorPolicy::Continue);
        let result: Result<Option<()>> = guard.check(
            Phase::DeviceToDevice,
            Err(BenchError::DeviceAllocationFailed {
                size: 64,
                reason: "out of memory".to_string(),
            }),
        );
        assert!(result.is_err());
        assert!(guard.log().is_empty());
    }

    #[test]
    fn test_success_passes_through() {
        let mut guard = PolicyGuard::new(ErrorPolicy::Halt);
        assert_eq!(guard.check(Phase::DeviceToDevice, Ok(7)).unwrap(), Some(7));
    }

    #[test]
    fn test_mismatch_recorded() {
        let mut guard = PolicyGuard::new(ErrorPolicy::Halt);
        guard.record_mismatch(Phase::HostToHostPinned, "element 3 differs");
        let failures = guard.into_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, FailureKind::Mismatch);
    }
}
