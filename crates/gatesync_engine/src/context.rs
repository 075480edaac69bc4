//! Run contexts and reports.
//!
//! A [`RunContext`] accumulates the outcome of one worker invocation while it
//! runs. Closing it produces a [`RunReport`], the immutable summary handed
//! back to the caller. Association runs produce their own reports, which are
//! attached to the report of the run that triggered them.

use crate::error::SyncError;
use crate::unit::SyncUnit;
use gatesync_codec::Record;
use gatesync_store::{EntityId, RemoteId};
use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, Instant};

/// A record that failed with a record-fatal error.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFailure {
    /// Entity type of the run the failure belongs to.
    pub entity_type: String,
    /// Remote identity, when it could be extracted.
    pub remote_id: Option<RemoteId>,
    /// Association the failed item was reached through. `None` for records
    /// of the batch itself.
    pub association: Option<String>,
    /// The raw record being processed. For association items, the raw
    /// record of the parent unit.
    pub raw: Record,
    /// Error message.
    pub reason: String,
}

impl RecordFailure {
    /// Creates a failure from the error that caused it.
    pub fn new(
        entity_type: impl Into<String>,
        remote_id: Option<RemoteId>,
        raw: Record,
        error: &SyncError,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            remote_id,
            association: None,
            raw,
            reason: error.to_string(),
        }
    }

    /// Marks the failure as belonging to an association item.
    #[must_use]
    pub fn with_association(mut self, name: impl Into<String>) -> Self {
        self.association = Some(name.into());
        self
    }
}

/// Mutable state of a run in progress.
#[derive(Debug)]
pub struct RunContext {
    entity_type: String,
    parent_type: Option<String>,
    parent_remote_id: Option<RemoteId>,
    before_count: usize,
    created: usize,
    updated: usize,
    skipped: usize,
    failures: Vec<RecordFailure>,
    inconsistent: Vec<EntityId>,
    children: Vec<RunReport>,
    seen: HashSet<RemoteId>,
    started: Instant,
}

impl RunContext {
    /// Opens a context for a run over `entity_type`.
    pub fn open(entity_type: &str, parent: Option<&SyncUnit<'_>>, before_count: usize) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            parent_type: parent.map(|p| p.entity_type().to_string()),
            parent_remote_id: parent.map(|p| p.remote_id().clone()),
            before_count,
            created: 0,
            updated: 0,
            skipped: 0,
            failures: Vec::new(),
            inconsistent: Vec::new(),
            children: Vec::new(),
            seen: HashSet::new(),
            started: Instant::now(),
        }
    }

    /// Entity type of the run.
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Returns true for association runs.
    pub fn is_nested(&self) -> bool {
        self.parent_type.is_some()
    }

    pub(crate) fn record_created(&mut self) {
        self.created += 1;
    }

    pub(crate) fn record_updated(&mut self) {
        self.updated += 1;
    }

    pub(crate) fn record_skipped(&mut self) {
        self.skipped += 1;
    }

    pub(crate) fn record_failure(&mut self, failure: RecordFailure) {
        self.failures.push(failure);
    }

    /// Flags an entity that was created but could not be linked.
    pub(crate) fn flag_inconsistent(&mut self, local_id: EntityId) {
        self.inconsistent.push(local_id);
    }

    pub(crate) fn attach(&mut self, child: RunReport) {
        self.children.push(child);
    }

    /// Notes a remote identity present in the batch.
    pub(crate) fn mark_seen(&mut self, remote_id: RemoteId) {
        self.seen.insert(remote_id);
    }

    pub(crate) fn has_seen(&self, remote_id: &RemoteId) -> bool {
        self.seen.contains(remote_id)
    }

    /// Closes the context.
    pub fn close(self, after_count: usize, deleted_count: usize) -> RunReport {
        RunReport {
            entity_type: self.entity_type,
            parent_type: self.parent_type,
            parent_remote_id: self.parent_remote_id,
            before_count: self.before_count,
            after_count,
            deleted_count,
            created: self.created,
            updated: self.updated,
            skipped: self.skipped,
            failures: self.failures,
            inconsistent: self.inconsistent,
            children: self.children,
            duration: self.started.elapsed(),
        }
    }
}

/// The outcome of a run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Entity type of the run.
    pub entity_type: String,
    /// Entity type of the parent unit, for association runs.
    pub parent_type: Option<String>,
    /// Remote identity of the parent unit, for association runs.
    pub parent_remote_id: Option<RemoteId>,
    /// Local entities of the type when the run started.
    pub before_count: usize,
    /// Local entities of the type when the run ended.
    pub after_count: usize,
    /// Entities deleted because they were missing from the batch.
    pub deleted_count: usize,
    /// Entities created.
    pub created: usize,
    /// Entities updated.
    pub updated: usize,
    /// Records skipped by a hook.
    pub skipped: usize,
    /// Record-fatal failures, in processing order.
    pub failures: Vec<RecordFailure>,
    /// Entities created but left without a linkage row.
    pub inconsistent: Vec<EntityId>,
    /// Reports of the association runs, in processing order.
    pub children: Vec<RunReport>,
    /// Wall-clock duration.
    pub duration: Duration,
}

impl RunReport {
    /// One-line summary, e.g.
    /// `book: 3 before, 5 after, 0 deleted (2 created, 1 updated, 0 skipped, 1 failed)`.
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{}: {} before, {} after, {} deleted ({} created, {} updated, {} skipped, {} failed)",
            self.entity_type,
            self.before_count,
            self.after_count,
            self.deleted_count,
            self.created,
            self.updated,
            self.skipped,
            self.failures.len(),
        );
        if let Some(parent) = &self.parent_type {
            line.push_str(&format!(" [parent: {parent}]"));
        }
        line
    }

    /// Returns true for association runs.
    pub fn is_nested(&self) -> bool {
        self.parent_type.is_some()
    }

    /// Returns true if this run or any nested run recorded a failure.
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty() || self.children.iter().any(RunReport::has_failures)
    }

    /// Failures of this run and every nested run, depth first.
    pub fn all_failures(&self) -> Vec<&RecordFailure> {
        let mut out: Vec<&RecordFailure> = self.failures.iter().collect();
        for child in &self.children {
            out.extend(child.all_failures());
        }
        out
    }

    /// Entities created by this run and every nested run.
    pub fn total_created(&self) -> usize {
        self.created + self.children.iter().map(RunReport::total_created).sum::<usize>()
    }

    /// Entities updated by this run and every nested run.
    pub fn total_updated(&self) -> usize {
        self.updated + self.children.iter().map(RunReport::total_updated).sum::<usize>()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}
