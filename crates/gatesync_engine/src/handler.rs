//! Per-record error containment.

use crate::context::{RecordFailure, RunContext};
use crate::error::{SyncError, SyncResult};
use crate::logger::SyncLogger;
use gatesync_codec::Record;
use gatesync_store::RemoteId;

/// Wraps the processing of one record.
///
/// Record-fatal errors are logged, recorded in the run context and
/// swallowed so the batch continues. Any other error is returned and aborts
/// the run.
#[derive(Clone, Copy)]
pub struct ErrorHandler<'a> {
    logger: &'a dyn SyncLogger,
}

impl<'a> ErrorHandler<'a> {
    /// Creates a handler reporting to `logger`.
    pub fn new(logger: &'a dyn SyncLogger) -> Self {
        Self { logger }
    }

    /// Runs `work` for one record.
    ///
    /// Returns `Ok(true)` if the work completed and `Ok(false)` if it failed
    /// with a record-fatal error that was recorded.
    ///
    /// # Errors
    ///
    /// Returns every error that is not record-fatal.
    pub fn handle<F>(
        &self,
        ctx: &mut RunContext,
        raw: &Record,
        remote_id: Option<&RemoteId>,
        work: F,
    ) -> SyncResult<bool>
    where
        F: FnOnce(&mut RunContext) -> SyncResult<()>,
    {
        self.contain(ctx, work, |ctx, e| {
            RecordFailure::new(ctx.entity_type(), remote_id.cloned(), raw.clone(), e)
        })
    }

    /// Runs `work` for one association item of the unit whose raw record is
    /// `raw`.
    ///
    /// A recorded failure names the `target_type` and `remote_id` of the
    /// item and the `association` it was reached through.
    ///
    /// # Errors
    ///
    /// Returns every error that is not record-fatal.
    pub fn handle_association<F>(
        &self,
        ctx: &mut RunContext,
        raw: &Record,
        association: &str,
        target_type: &str,
        remote_id: &RemoteId,
        work: F,
    ) -> SyncResult<bool>
    where
        F: FnOnce(&mut RunContext) -> SyncResult<()>,
    {
        self.contain(ctx, work, |_, e| {
            RecordFailure::new(target_type, Some(remote_id.clone()), raw.clone(), e)
                .with_association(association)
        })
    }

    fn contain<F, M>(&self, ctx: &mut RunContext, work: F, failure: M) -> SyncResult<bool>
    where
        F: FnOnce(&mut RunContext) -> SyncResult<()>,
        M: FnOnce(&RunContext, &SyncError) -> RecordFailure,
    {
        match work(ctx) {
            Ok(()) => Ok(true),
            Err(e) if e.is_record_fatal() => {
                let failure = failure(ctx, &e);
                self.logger.record_error(&failure);
                ctx.record_failure(failure);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
