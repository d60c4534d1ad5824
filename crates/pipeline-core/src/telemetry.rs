// crates/pipeline-core/src/telemetry.rs
// ============================================================================
// Module: Engine Event Telemetry
// Description: Dependency-light structured event sink for engine internals.
// Purpose: Surface circuit-breaker transitions, stage dispatch attempts, and
//          tenant-route resolutions without pulling in an external logging
//          crate.
// Dependencies: serde, std::fs, std::io
// ============================================================================

//! ## Overview
//! This deliberately does not depend on `tracing` or `log`: internal events
//! are a small, closed set of structured variants delivered to an
//! [`EventSink`] implementation, the same dependency-light pattern used
//! elsewhere in this workspace for audit trails. Sinks must never let an
//! internal failure (a full disk, a serialization error) propagate back to
//! the caller that triggered the event — recording telemetry is always
//! best-effort.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io::Write as _;
use std::sync::Mutex;

use serde::Serialize;

// ============================================================================
// SECTION: Engine Event
// ============================================================================

/// A structured internal engine event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A circuit breaker changed phase.
    CircuitTransitioned {
        /// Breaker name.
        name: String,
        /// New phase label (`closed`/`open`/`half_open`).
        to: String,
    },
    /// A stage dispatch attempt completed (success or failure).
    StageDispatched {
        /// Execution id.
        execution_id: String,
        /// Stage id.
        stage_id: String,
        /// Outcome label.
        outcome: String,
        /// Attempt number (1-based).
        attempt: u32,
    },
    /// The tenant router resolved (or failed to resolve) an account's route.
    TenantRouted {
        /// Account id.
        account_id: String,
        /// Whether the account resolved to a dedicated data plane.
        is_private: bool,
        /// Whether this was served from the in-process cache.
        cache_hit: bool,
    },
    /// An execution suspended pending approval.
    ExecutionSuspended {
        /// Execution id.
        execution_id: String,
        /// Stage awaiting approval.
        stage_id: String,
    },
    /// A previously suspended execution resumed.
    ExecutionResumed {
        /// Execution id.
        execution_id: String,
        /// Stage outcome that triggered the resumption.
        stage_outcome: String,
    },
}

// ============================================================================
// SECTION: Event Sink
// ============================================================================

/// Destination for [`EngineEvent`] values.
///
/// # Invariants
/// - Implementations must not panic and must not propagate their own
///   internal I/O or serialization failures to the caller.
pub trait EventSink: Send + Sync {
    /// Records one event. Must never fail visibly to the caller.
    fn record(&self, event: EngineEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn record(&self, _event: EngineEvent) {}
}

/// Writes one JSON line per event to stderr, swallowing write failures.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrEventSink;

impl EventSink for StderrEventSink {
    fn record(&self, event: EngineEvent) {
        if let Ok(line) = serde_json::to_string(&event) {
            let mut stderr = std::io::stderr();
            let _ = writeln!(stderr, "{line}");
        }
    }
}

/// Appends one JSON line per event to a file, swallowing I/O and
/// serialization failures.
pub struct FileEventSink {
    /// Open file handle, guarded for concurrent append.
    file: Mutex<std::fs::File>,
}

impl FileEventSink {
    /// Opens (creating if needed) `path` for append.
    ///
    /// # Errors
    /// Returns the underlying [`std::io::Error`] if the file cannot be
    /// opened.
    pub fn open(path: &std::path::Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file: Mutex::new(file) })
    }
}

impl EventSink for FileEventSink {
    fn record(&self, event: EngineEvent) {
        let Ok(line) = serde_json::to_string(&event) else { return };
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{line}");
            let _ = file.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::EngineEvent;
    use super::EventSink;
    use super::FileEventSink;

    #[test]
    fn file_sink_appends_json_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("events.jsonl");
        let sink = FileEventSink::open(&path).expect("open sink");
        sink.record(EngineEvent::TenantRouted {
            account_id: "acct-1".to_owned(),
            is_private: false,
            cache_hit: false,
        });
        let contents = std::fs::read_to_string(&path).expect("read events");
        assert!(contents.contains("tenant_routed"));
    }
}
