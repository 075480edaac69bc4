//! Run logging.
//!
//! The worker reports progress, per-record failures and run summaries to a
//! [`SyncLogger`]. The default [`TracingLogger`] turns them into `tracing`
//! events; without an installed subscriber nothing is printed.

use crate::context::{RecordFailure, RunReport};
use gatesync_store::RemoteId;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

/// Receiver of run events.
pub trait SyncLogger: Send + Sync {
    /// A run made progress.
    fn progress(&self, entity_type: &str, message: &str);

    /// A run finished.
    fn summary(&self, report: &RunReport);

    /// A record failed with a record-fatal error.
    fn record_error(&self, failure: &RecordFailure);

    /// A hook skipped a step. Only called when skip tracing is enabled.
    fn skipped(&self, entity_type: &str, remote_id: &RemoteId, step: &str) {
        let _ = (entity_type, remote_id, step);
    }
}

/// Emits run events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl SyncLogger for TracingLogger {
    fn progress(&self, entity_type: &str, message: &str) {
        debug!(entity_type, "{message}");
    }

    fn summary(&self, report: &RunReport) {
        if report.is_nested() {
            debug!(
                entity_type = %report.entity_type,
                duration_ms = report.duration.as_millis() as u64,
                "{}",
                report.summary()
            );
        } else {
            info!(
                entity_type = %report.entity_type,
                duration_ms = report.duration.as_millis() as u64,
                "{}",
                report.summary()
            );
        }
    }

    fn record_error(&self, failure: &RecordFailure) {
        warn!(
            entity_type = %failure.entity_type,
            remote_id = ?failure.remote_id,
            association = ?failure.association,
            raw = ?failure.raw,
            "record failed: {}",
            failure.reason
        );
    }

    fn skipped(&self, entity_type: &str, remote_id: &RemoteId, step: &str) {
        debug!(entity_type, remote_id = %remote_id, step, "skipped by hook");
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl SyncLogger for NoopLogger {
    fn progress(&self, _entity_type: &str, _message: &str) {}

    fn summary(&self, _report: &RunReport) {}

    fn record_error(&self, _failure: &RecordFailure) {}
}

/// An event captured by a [`RecordingLogger`].
#[derive(Debug, Clone, PartialEq)]
pub enum LogEvent {
    /// Progress message.
    Progress {
        /// Entity type of the run.
        entity_type: String,
        /// Message text.
        message: String,
    },
    /// Run summary line.
    Summary(String),
    /// Record-fatal failure.
    RecordError(RecordFailure),
    /// Step skipped by a hook.
    Skipped {
        /// Entity type of the record.
        entity_type: String,
        /// Remote identity of the record.
        remote_id: RemoteId,
        /// Skipped step.
        step: String,
    },
}

/// Captures events in memory for inspection.
#[derive(Debug, Default)]
pub struct RecordingLogger {
    events: Mutex<Vec<LogEvent>>,
}

impl RecordingLogger {
    /// Creates an empty logger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the captured events, in order.
    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().clone()
    }

    /// Returns the captured summary lines, in order.
    pub fn summaries(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                LogEvent::Summary(line) => Some(line.clone()),
                _ => None,
            })
            .collect()
    }

    /// Returns the captured failures, in order.
    pub fn failures(&self) -> Vec<RecordFailure> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                LogEvent::RecordError(failure) => Some(failure.clone()),
                _ => None,
            })
            .collect()
    }

    /// Forgets the captured events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl SyncLogger for RecordingLogger {
    fn progress(&self, entity_type: &str, message: &str) {
        self.events.lock().push(LogEvent::Progress {
            entity_type: entity_type.to_string(),
            message: message.to_string(),
        });
    }

    fn summary(&self, report: &RunReport) {
        self.events.lock().push(LogEvent::Summary(report.summary()));
    }

    fn record_error(&self, failure: &RecordFailure) {
        self.events
            .lock()
            .push(LogEvent::RecordError(failure.clone()));
    }

    fn skipped(&self, entity_type: &str, remote_id: &RemoteId, step: &str) {
        self.events.lock().push(LogEvent::Skipped {
            entity_type: entity_type.to_string(),
            remote_id: remote_id.clone(),
            step: step.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunContext;
    use crate::error::SyncError;
    use gatesync_codec::Record;

    #[test]
    fn recording_logger_captures_in_order() {
        let logger = RecordingLogger::new();
        logger.progress("book", "processing 2 records");
        logger.record_error(&RecordFailure::new(
            "book",
            None,
            Record::new(),
            &SyncError::gateway("boom"),
        ));
        logger.skipped("book", &RemoteId::from(1), "record_sync");
        logger.summary(&RunContext::open("book", None, 0).close(0, 0));

        let events = logger.events();
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], LogEvent::Progress { .. }));
        assert_eq!(logger.failures().len(), 1);
        assert_eq!(
            logger.summaries(),
            vec!["book: 0 before, 0 after, 0 deleted (0 created, 0 updated, 0 skipped, 0 failed)"]
        );

        logger.clear();
        assert!(logger.events().is_empty());
    }

    #[test]
    fn tracing_logger_without_subscriber_is_silent() {
        let logger = TracingLogger;
        logger.progress("book", "processing");
        logger.summary(&RunContext::open("book", None, 0).close(0, 0));
        logger.skipped("book", &RemoteId::from(1), "sync");
    }
}
