//! Configuration for the sync worker.

/// Default limit on association nesting.
pub const DEFAULT_MAX_ASSOCIATION_DEPTH: usize = 16;

/// Engine-level knobs that apply to every entity type.
///
/// Per-type behavior lives in [`crate::MappingConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Maximum nesting of association runs below a root run.
    ///
    /// A root run is at depth 0, the runs it triggers for associations at
    /// depth 1, and so on. Exceeding the limit aborts the run.
    pub max_association_depth: usize,
    /// Reports hook short-circuits to the logger, not only to `tracing`.
    pub trace_skips: bool,
}

impl SyncConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_association_depth: DEFAULT_MAX_ASSOCIATION_DEPTH,
            trace_skips: false,
        }
    }

    /// Sets the maximum association depth.
    #[must_use]
    pub fn with_max_association_depth(mut self, depth: usize) -> Self {
        self.max_association_depth = depth;
        self
    }

    /// Enables or disables reporting of skipped records to the logger.
    #[must_use]
    pub fn with_trace_skips(mut self, enabled: bool) -> Self {
        self.trace_skips = enabled;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}
