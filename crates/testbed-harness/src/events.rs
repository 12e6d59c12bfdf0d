// crates/testbed-harness/src/events.rs
// ============================================================================
// Module: Fixture Events
// Description: Observability hooks for fixture setup and teardown.
// Purpose: Let suites observe lifecycle phases without a hard logging dep.
// Dependencies: none beyond std
// ============================================================================

//! ## Overview
//! A thin event interface for fixture lifecycle observation. The harness
//! emits one event per resource per phase; sinks decide what to do with
//! them. The interface is intentionally dependency-light so suites can plug
//! in structured logging or metrics without redesign.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;

// ============================================================================
// SECTION: Events
// ============================================================================

/// Lifecycle phase an event belongs to.
///
/// # Invariants
/// - Variants are stable for sink labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixturePhase {
    /// Resource acquisition.
    Setup,
    /// Resource release.
    Teardown,
}

impl FixturePhase {
    /// Returns a stable label for the phase.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Teardown => "teardown",
        }
    }
}

/// One fixture lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureEvent {
    /// Phase the resource is in.
    pub phase: FixturePhase,
    /// Stable resource label (e.g. `database`, `bucket`).
    pub resource: &'static str,
}

/// Sink for fixture lifecycle events.
pub trait FixtureEventSink: Send + Sync {
    /// Records one event.
    fn record(&self, event: FixtureEvent);
}

/// Sink that discards every event.
#[derive(Debug, Default)]
pub struct NoopEventSink;

impl FixtureEventSink for NoopEventSink {
    fn record(&self, _event: FixtureEvent) {}
}

/// Sink that retains events in order, for suite assertions.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    /// Recorded events in emission order.
    events: Mutex<Vec<FixtureEvent>>,
}

impl RecordingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the recorded events.
    #[must_use]
    pub fn snapshot(&self) -> Vec<FixtureEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }
}

impl FixtureEventSink for RecordingEventSink {
    fn record(&self, event: FixtureEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::FixtureEvent;
    use super::FixtureEventSink;
    use super::FixturePhase;
    use super::RecordingEventSink;

    #[test]
    fn recording_sink_preserves_order() {
        let sink = RecordingEventSink::new();
        sink.record(FixtureEvent {
            phase: FixturePhase::Setup,
            resource: "database",
        });
        sink.record(FixtureEvent {
            phase: FixturePhase::Teardown,
            resource: "database",
        });
        let events = sink.snapshot();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].phase, FixturePhase::Setup);
        assert_eq!(events[1].phase.as_str(), "teardown");
    }
}
