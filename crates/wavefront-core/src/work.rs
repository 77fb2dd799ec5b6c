use crate::error::Result;
use crate::sandbox::SandboxHandle;
use crate::ticket::Ticket;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ---------------------------------------------------------------------------
// TestCounts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCounts {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
}

// ---------------------------------------------------------------------------
// WorkResult
// ---------------------------------------------------------------------------

/// The output record of one unit of work. Immutable once produced; owned by
/// the orchestrator after the worker returns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkResult {
    pub ticket_id: String,
    pub success: bool,
    pub diff: String,
    pub logs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_counts: Option<TestCounts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time: Duration,
}

impl WorkResult {
    /// Synthesize a failed result from a fault message. Used when the worker
    /// itself errors or panics so that siblings are unaffected.
    pub fn failure(
        ticket_id: impl Into<String>,
        error: impl Into<String>,
        logs: Vec<String>,
        execution_time: Duration,
    ) -> Self {
        Self {
            ticket_id: ticket_id.into(),
            success: false,
            diff: String::new(),
            logs,
            test_counts: None,
            error: Some(error.into()),
            execution_time,
        }
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// The unit-of-work contract. The orchestrator only calls `execute` and never
/// inspects its internals.
///
/// The returned ticket carries any acceptance-criterion updates made during
/// execution; the orchestrator merges it back into the live ticket set.
pub trait Worker: Send + Sync + 'static {
    fn execute(
        &self,
        ticket: Ticket,
        sandbox: SandboxHandle,
    ) -> BoxFuture<'static, Result<(Ticket, WorkResult)>>;
}

/// Adapter turning a closure into a [`Worker`]. Mostly a test convenience.
pub struct FnWorker<F>(pub F);

impl<F> Worker for FnWorker<F>
where
    F: Fn(Ticket, SandboxHandle) -> BoxFuture<'static, Result<(Ticket, WorkResult)>>
        + Send
        + Sync
        + 'static,
{
    fn execute(
        &self,
        ticket: Ticket,
        sandbox: SandboxHandle,
    ) -> BoxFuture<'static, Result<(Ticket, WorkResult)>> {
        (self.0)(ticket, sandbox)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_result_carries_error() {
        let r = WorkResult::failure("TKT-001", "boom", vec!["log".into()], Duration::ZERO);
        assert!(!r.success);
        assert_eq!(r.error.as_deref(), Some("boom"));
        assert!(r.diff.is_empty());
        assert!(r.test_counts.is_none());
    }

    #[test]
    fn work_result_json_roundtrip() {
        let r = WorkResult {
            ticket_id: "TKT-001".into(),
            success: true,
            diff: "--- a\n+++ b\n".into(),
            logs: vec!["started".into(), "done".into()],
            test_counts: Some(TestCounts {
                total: 5,
                passed: 3,
                failed: 2,
                skipped: 0,
            }),
            error: None,
            execution_time: Duration::from_millis(1234),
        };
        let json = serde_json::to_string(&r).unwrap();
        let parsed: WorkResult = serde_json::from_str(&json).unwrap();
        assert!(parsed.success);
        assert_eq!(parsed.test_counts.unwrap().failed, 2);
        assert_eq!(parsed.execution_time, Duration::from_millis(1234));
    }
}
