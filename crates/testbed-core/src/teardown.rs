// crates/testbed-core/src/teardown.rs
// ============================================================================
// Module: Teardown Stack
// Description: LIFO stack of cleanup actions with exactly-once execution.
// Purpose: Guarantee fixture teardown on every exit path, in reverse
//          acquisition order.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! A [`TeardownStack`] collects labeled cleanup actions as a fixture acquires
//! resources. [`TeardownStack::run`] executes them last-in-first-out, so a
//! fixture built on top of another releases before its dependency. If the
//! consuming test body panics or returns early without calling `run`, the
//! stack's `Drop` implementation executes the remaining actions instead.
//!
//! ## Invariants
//! - Actions execute exactly once per stack, on every exit path.
//! - One failing action does not skip the actions below it; all failures are
//!   collected and reported together.
//! - Running an exhausted stack is a no-op, not an error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// One failed teardown action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownFailure {
    /// Label the action was registered under.
    pub label: String,
    /// Failure message from the action.
    pub message: String,
}

impl fmt::Display for TeardownFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label, self.message)
    }
}

/// Aggregate teardown error listing every failed action.
#[derive(Debug, Error)]
#[error("teardown failed: {}", format_failures(failures))]
pub struct TeardownError {
    /// Failures in execution (reverse acquisition) order.
    pub failures: Vec<TeardownFailure>,
}

/// Joins failure summaries for the error display.
fn format_failures(failures: &[TeardownFailure]) -> String {
    failures.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

// ============================================================================
// SECTION: Teardown Stack
// ============================================================================

/// A teardown action; the message is the failure description.
type TeardownAction = Box<dyn FnOnce() -> Result<(), String> + Send>;

/// LIFO stack of labeled teardown actions.
#[derive(Default)]
pub struct TeardownStack {
    /// Pending actions in acquisition order; executed from the back.
    actions: Vec<(String, TeardownAction)>,
}

impl fmt::Debug for TeardownStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<&str> = self.actions.iter().map(|(label, _)| label.as_str()).collect();
        f.debug_struct("TeardownStack").field("pending", &labels).finish()
    }
}

impl TeardownStack {
    /// Creates an empty stack.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            actions: Vec::new(),
        }
    }

    /// Registers a teardown action under a label used in failure reports.
    pub fn push<F>(&mut self, label: &str, action: F)
    where
        F: FnOnce() -> Result<(), String> + Send + 'static,
    {
        self.actions.push((label.to_string(), Box::new(action)));
    }

    /// Returns how many actions are still pending.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.actions.len()
    }

    /// Executes all pending actions last-in-first-out.
    ///
    /// Every action runs even when an earlier one fails; a second call on an
    /// exhausted stack is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`TeardownError`] listing every action that failed.
    pub fn run(&mut self) -> Result<(), TeardownError> {
        let mut failures = Vec::new();
        while let Some((label, action)) = self.actions.pop() {
            if let Err(message) = action() {
                failures.push(TeardownFailure {
                    label,
                    message,
                });
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(TeardownError {
                failures,
            })
        }
    }
}

impl Drop for TeardownStack {
    fn drop(&mut self) {
        // Last-resort path for panicking test bodies; failures here have no
        // caller to report to. Explicit `run` is how failures surface.
        let _ = self.run();
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;

    use super::TeardownStack;

    /// Shared trace of executed action names.
    type Trace = Arc<Mutex<Vec<&'static str>>>;

    /// Records `name` into the trace when the action runs.
    fn record(
        trace: &Trace,
        name: &'static str,
    ) -> impl FnOnce() -> Result<(), String> + Send + use<> {
        let trace = Arc::clone(trace);
        move || {
            trace.lock().map_err(|_| "trace lock poisoned".to_string())?.push(name);
            Ok(())
        }
    }

    #[test]
    fn actions_run_in_reverse_acquisition_order() -> Result<(), String> {
        let trace: Trace = Arc::new(Mutex::new(Vec::new()));
        let mut stack = TeardownStack::new();
        stack.push("database", record(&trace, "database"));
        stack.push("bucket", record(&trace, "bucket"));
        stack.push("override", record(&trace, "override"));
        stack.run().map_err(|err| err.to_string())?;
        let observed = trace.lock().map_err(|_| "trace lock poisoned".to_string())?.clone();
        assert_eq!(observed, vec!["override", "bucket", "database"]);
        Ok(())
    }

    #[test]
    fn second_run_is_a_no_op() -> Result<(), String> {
        let trace: Trace = Arc::new(Mutex::new(Vec::new()));
        let mut stack = TeardownStack::new();
        stack.push("only", record(&trace, "only"));
        stack.run().map_err(|err| err.to_string())?;
        stack.run().map_err(|err| err.to_string())?;
        let observed = trace.lock().map_err(|_| "trace lock poisoned".to_string())?.clone();
        assert_eq!(observed, vec!["only"]);
        Ok(())
    }

    #[test]
    fn failures_do_not_skip_remaining_actions() -> Result<(), String> {
        let trace: Trace = Arc::new(Mutex::new(Vec::new()));
        let mut stack = TeardownStack::new();
        stack.push("bottom", record(&trace, "bottom"));
        stack.push("broken", || Err("sequence reset failed".to_string()));
        let err = match stack.run() {
            Err(err) => err,
            Ok(()) => return Err("expected teardown failure".to_string()),
        };
        assert_eq!(err.failures.len(), 1);
        assert_eq!(err.failures[0].label, "broken");
        let observed = trace.lock().map_err(|_| "trace lock poisoned".to_string())?.clone();
        assert_eq!(observed, vec!["bottom"]);
        Ok(())
    }

    #[test]
    fn drop_executes_pending_actions() -> Result<(), String> {
        let trace: Trace = Arc::new(Mutex::new(Vec::new()));
        {
            let mut stack = TeardownStack::new();
            stack.push("scoped", record(&trace, "scoped"));
            assert_eq!(stack.pending(), 1);
        }
        let observed = trace.lock().map_err(|_| "trace lock poisoned".to_string())?.clone();
        assert_eq!(observed, vec!["scoped"]);
        Ok(())
    }

    #[test]
    fn drop_after_run_does_not_rerun() -> Result<(), String> {
        let trace: Trace = Arc::new(Mutex::new(Vec::new()));
        {
            let mut stack = TeardownStack::new();
            stack.push("once", record(&trace, "once"));
            stack.run().map_err(|err| err.to_string())?;
        }
        let observed = trace.lock().map_err(|_| "trace lock poisoned".to_string())?.clone();
        assert_eq!(observed, vec!["once"]);
        Ok(())
    }
}
