//! The sync worker.
//!
//! A [`Worker`] drives sync runs. A run takes a batch of raw remote records
//! for one entity type (fetched through the configuration's `fetch` hook
//! when none is supplied) and, for each record in order:
//!
//! 1. builds a [`SyncUnit`] (identity, mapped attributes, linkage)
//! 2. runs `before_sync` and `before_record_sync`
//! 3. creates the local entity and links it, or updates the linked one
//! 4. synchronizes every association item through a nested run
//! 5. runs `after_sync`
//!
//! Each record is processed inside an [`ErrorHandler`], so record-fatal
//! errors only cost that record. Nested runs complete before the next
//! sibling record starts.
//!
//! # Example
//!
//! ```
//! use gatesync_codec::Record;
//! use gatesync_engine::{MappingConfig, Registry, Worker};
//! use gatesync_store::{LocalStore, MemoryLinkageStore, MemoryStore};
//!
//! let registry = Registry::new()
//!     .with(MappingConfig::builder("book").map("name", "title").build().unwrap())
//!     .unwrap();
//! let store = MemoryStore::new();
//! let linkage = MemoryLinkageStore::new();
//! let worker = Worker::new(&registry, &store, &linkage);
//!
//! let mut raw = Record::new();
//! raw.insert("id", 1);
//! raw.insert("name", "Dune");
//!
//! let report = worker.run("book", Some(vec![raw.clone()])).unwrap();
//! assert_eq!(report.created, 1);
//!
//! // The second run finds the linkage and updates instead
//! let report = worker.run("book", Some(vec![raw])).unwrap();
//! assert_eq!(report.updated, 1);
//! assert_eq!(store.count("book").unwrap(), 1);
//! ```

use crate::config::SyncConfig;
use crate::context::{RunContext, RunReport};
use crate::error::{SyncError, SyncResult};
use crate::handler::ErrorHandler;
use crate::logger::{SyncLogger, TracingLogger};
use crate::mapping::{MappingConfig, Registry};
use crate::resolver::IdentityResolver;
use crate::unit::SyncUnit;
use gatesync_codec::Record;
use gatesync_store::{LinkageStore, LocalStore, RemoteId, StoreError};
use parking_lot::RwLock;
use std::time::Instant;
use tracing::{debug, error};

static DEFAULT_LOGGER: TracingLogger = TracingLogger;

/// Cumulative statistics over the root runs of a worker.
#[derive(Debug, Clone, Default)]
pub struct WorkerStats {
    /// Root runs that completed.
    pub runs_completed: u64,
    /// Root runs aborted by a run-fatal error.
    pub runs_failed: u64,
    /// Entities created, nested runs included.
    pub records_created: u64,
    /// Entities updated, nested runs included.
    pub records_updated: u64,
    /// Record-fatal failures, nested runs included.
    pub records_failed: u64,
    /// Entities deleted as missing from the batch.
    pub entities_deleted: u64,
    /// When the last root run ended.
    pub last_run_time: Option<Instant>,
    /// Message of the last run-fatal error.
    pub last_error: Option<String>,
}

/// Drives sync runs against a local store and its linkage table.
pub struct Worker<'a> {
    registry: &'a Registry,
    store: &'a dyn LocalStore,
    linkage: &'a dyn LinkageStore,
    logger: &'a dyn SyncLogger,
    config: SyncConfig,
    stats: RwLock<WorkerStats>,
}

impl<'a> Worker<'a> {
    /// Creates a worker with the default configuration and a
    /// [`TracingLogger`].
    pub fn new(
        registry: &'a Registry,
        store: &'a dyn LocalStore,
        linkage: &'a dyn LinkageStore,
    ) -> Self {
        Self {
            registry,
            store,
            linkage,
            logger: &DEFAULT_LOGGER,
            config: SyncConfig::default(),
            stats: RwLock::new(WorkerStats::default()),
        }
    }

    /// Sets the logger.
    #[must_use]
    pub fn with_logger(mut self, logger: &'a dyn SyncLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Gets the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Gets the current stats.
    pub fn stats(&self) -> WorkerStats {
        self.stats.read().clone()
    }

    /// Runs a root sync of `entity_type`.
    ///
    /// With `data` absent or empty the batch comes from the configuration's
    /// `fetch` hook.
    ///
    /// # Errors
    ///
    /// Returns the first run-fatal error. Record-fatal errors are reported
    /// in the returned [`RunReport`] instead.
    pub fn run(&self, entity_type: &str, data: Option<Vec<Record>>) -> SyncResult<RunReport> {
        let result = self.run_nested(entity_type, data, None);

        let mut stats = self.stats.write();
        stats.last_run_time = Some(Instant::now());
        match &result {
            Ok(report) => {
                stats.runs_completed += 1;
                stats.records_created += report.total_created() as u64;
                stats.records_updated += report.total_updated() as u64;
                stats.records_failed += report.all_failures().len() as u64;
                stats.entities_deleted += report.deleted_count as u64;
                stats.last_error = None;
            }
            Err(e) => {
                stats.runs_failed += 1;
                stats.last_error = Some(e.to_string());
                error!(entity_type, error = %e, "sync run aborted");
            }
        }
        result
    }

    /// Runs a sync of `entity_type` on behalf of `parent`.
    ///
    /// Used for association runs; with `parent` absent this is a root run.
    /// Missing entities are only destroyed by root runs.
    ///
    /// # Errors
    ///
    /// See [`Worker::run`].
    pub fn run_nested(
        &self,
        entity_type: &str,
        data: Option<Vec<Record>>,
        parent: Option<&SyncUnit<'_>>,
    ) -> SyncResult<RunReport> {
        let config = self.registry.get(entity_type)?;

        let depth = parent.map_or(0, |p| p.depth() + 1);
        if depth > self.config.max_association_depth {
            return Err(SyncError::DepthExceeded {
                entity_type: entity_type.to_string(),
                depth,
                limit: self.config.max_association_depth,
            });
        }

        let mut ctx = RunContext::open(entity_type, parent, self.store.count(entity_type)?);
        let batch = match data {
            Some(records) if !records.is_empty() => records,
            _ => self.fetch(config)?,
        };
        self.logger
            .progress(entity_type, &format!("processing {} records", batch.len()));

        let handler = ErrorHandler::new(self.logger);
        let resolver = IdentityResolver::new(self.store, self.linkage);
        for raw in &batch {
            let remote_id = config.peek_identity(raw);
            if let Some(id) = &remote_id {
                ctx.mark_seen(id.clone());
            }
            handler.handle(&mut ctx, raw, remote_id.as_ref(), |ctx| {
                self.sync_record(config, &resolver, raw, parent, ctx)
            })?;
        }

        let deleted = if parent.is_none() && config.destroy_missing() {
            self.destroy_missing(config, &resolver, &ctx)?
        } else {
            0
        };
        let after = self.store.count(entity_type)?;

        let report = ctx.close(after, deleted);
        self.logger.summary(&report);
        Ok(report)
    }

    fn fetch(&self, config: &MappingConfig) -> SyncResult<Vec<Record>> {
        let fetch = config
            .fetch_hook()
            .ok_or_else(|| SyncError::missing_hook(config.entity_type(), "fetch"))?;
        fetch()
    }

    fn sync_record(
        &self,
        config: &MappingConfig,
        resolver: &IdentityResolver<'_>,
        raw: &Record,
        parent: Option<&SyncUnit<'_>>,
        ctx: &mut RunContext,
    ) -> SyncResult<()> {
        let mut unit = SyncUnit::build(config, self.registry, raw.clone(), parent, resolver)?;
        let hooks = config.hooks();

        if !hooks.run_before_sync(&unit) {
            ctx.record_skipped();
            self.trace_skip(&unit, "sync");
            return Ok(());
        }
        if !hooks.run_before_record_sync(&unit) {
            ctx.record_skipped();
            self.trace_skip(&unit, "record_sync");
            return Ok(());
        }

        self.write(resolver, &mut unit, ctx)?;
        hooks.run_after_record_sync(&unit);

        self.sync_associations(config, &unit, ctx)?;
        hooks.run_after_sync(&unit);
        Ok(())
    }

    /// Creates and links, or updates and refreshes, the unit's entity.
    fn write(
        &self,
        resolver: &IdentityResolver<'_>,
        unit: &mut SyncUnit<'_>,
        ctx: &mut RunContext,
    ) -> SyncResult<()> {
        match unit.local_id() {
            Some(local_id) => {
                self.store
                    .update(unit.entity_type(), local_id, unit.attributes())?;
                ctx.record_updated();
                debug!(
                    entity_type = unit.entity_type(),
                    remote_id = %unit.remote_id(),
                    local_id = %local_id,
                    "updated"
                );
                resolver.refresh(unit.entity_type(), local_id, unit.remote_id(), unit.attributes())
            }
            None => {
                let local_id = self.store.create(unit.entity_type(), unit.attributes())?;
                unit.mark_created(local_id);
                ctx.record_created();
                debug!(
                    entity_type = unit.entity_type(),
                    remote_id = %unit.remote_id(),
                    local_id = %local_id,
                    "created"
                );
                if let Err(e) =
                    resolver.link(unit.entity_type(), local_id, unit.remote_id(), unit.attributes())
                {
                    ctx.flag_inconsistent(local_id);
                    return Err(e);
                }
                Ok(())
            }
        }
    }

    fn sync_associations(
        &self,
        config: &MappingConfig,
        unit: &SyncUnit<'_>,
        ctx: &mut RunContext,
    ) -> SyncResult<()> {
        let hooks = config.hooks();
        let handler = ErrorHandler::new(self.logger);

        for refs in unit.associations() {
            let target = self.registry.get(&refs.target_type)?;
            for remote_id in &refs.remote_ids {
                if unit.is_on_path(&refs.target_type, remote_id) {
                    debug!(
                        entity_type = unit.entity_type(),
                        association = %refs.name,
                        remote_id = %remote_id,
                        "association already on the parent chain, skipping"
                    );
                    continue;
                }
                if !hooks.run_before_association_sync(unit, &refs.name, remote_id) {
                    self.trace_skip(unit, "association_sync");
                    continue;
                }

                let completed = handler.handle_association(
                    ctx,
                    unit.raw(),
                    &refs.name,
                    &refs.target_type,
                    remote_id,
                    |ctx| {
                        let record = self.find_remote(target, remote_id)?;
                        let child =
                            self.run_nested(&refs.target_type, Some(vec![record]), Some(unit))?;
                        ctx.attach(child);
                        Ok(())
                    },
                )?;
                if completed {
                    hooks.run_after_association_sync(unit, &refs.name, remote_id);
                }
            }
        }
        Ok(())
    }

    fn find_remote(&self, target: &MappingConfig, remote_id: &RemoteId) -> SyncResult<Record> {
        let find = target
            .find_by_id_hook()
            .ok_or_else(|| SyncError::missing_hook(target.entity_type(), "find_by_id"))?;

        match find(remote_id) {
            Ok(Some(record)) => Ok(record),
            Ok(None) => Err(SyncError::AssociationNotFound {
                entity_type: target.entity_type().to_string(),
                remote_id: remote_id.clone(),
            }),
            Err(e) => Err(SyncError::Lookup {
                entity_type: target.entity_type().to_string(),
                remote_id: remote_id.clone(),
                message: e.to_string(),
            }),
        }
    }

    /// Deletes linked entities whose identity was not in the batch.
    fn destroy_missing(
        &self,
        config: &MappingConfig,
        resolver: &IdentityResolver<'_>,
        ctx: &RunContext,
    ) -> SyncResult<usize> {
        let entity_type = config.entity_type();
        let mut deleted = 0;

        for row in resolver.linked(entity_type)? {
            if ctx.has_seen(&row.remote_id) {
                continue;
            }
            match self.store.delete(entity_type, row.local_id) {
                Ok(()) => deleted += 1,
                Err(StoreError::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }
            resolver.unlink(entity_type, row.local_id)?;
            debug!(
                entity_type,
                remote_id = %row.remote_id,
                local_id = %row.local_id,
                "destroyed entity missing from batch"
            );
        }
        Ok(deleted)
    }

    fn trace_skip(&self, unit: &SyncUnit<'_>, step: &str) {
        if self.config.trace_skips {
            self.logger.skipped(unit.entity_type(), unit.remote_id(), step);
        } else {
            debug!(
                entity_type = unit.entity_type(),
                remote_id = %unit.remote_id(),
                step,
                "skipped by hook"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::{LogEvent, RecordingLogger};
    use gatesync_codec::Value;
    use gatesync_store::{EntityId, MemoryLinkageStore, MemoryStore};
    use std::sync::Arc;

    fn record(json: serde_json::Value) -> Record {
        Record::from_json(json).unwrap()
    }

    fn book_registry() -> Registry {
        Registry::new()
            .with(MappingConfig::builder("book").map("name", "title").build().unwrap())
            .unwrap()
    }

    #[test]
    fn creates_then_updates() {
        let registry = book_registry();
        let store = MemoryStore::new();
        let linkage = MemoryLinkageStore::new();
        let worker = Worker::new(&registry, &store, &linkage).with_logger(&crate::logger::NoopLogger);

        let report = worker
            .run("book", Some(vec![record(serde_json::json!({"id": 1, "name": "Dune"}))]))
            .unwrap();
        assert_eq!((report.created, report.updated), (1, 0));
        assert_eq!((report.before_count, report.after_count), (0, 1));

        let report = worker
            .run(
                "book",
                Some(vec![record(serde_json::json!({"id": "1", "name": "Dune Messiah"}))]),
            )
            .unwrap();
        assert_eq!((report.created, report.updated), (0, 1));

        let (id, attrs) = store.all("book").pop().unwrap();
        assert_eq!(attrs.get("title"), Some(&Value::from("Dune Messiah")));
        let row = linkage.find_by_local("book", id).unwrap().unwrap();
        assert_eq!(row.snapshot.get("title"), Some(&Value::from("Dune Messiah")));

        let stats = worker.stats();
        assert_eq!(stats.runs_completed, 2);
        assert_eq!(stats.records_created, 1);
        assert_eq!(stats.records_updated, 1);
    }

    #[test]
    fn absent_data_uses_fetch_hook() {
        let registry = Registry::new()
            .with(
                MappingConfig::builder("book")
                    .fetch(|| Ok(vec![Record::from_json(serde_json::json!({"id": 5})).unwrap()]))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let store = MemoryStore::new();
        let linkage = MemoryLinkageStore::new();
        let worker = Worker::new(&registry, &store, &linkage);

        assert_eq!(worker.run("book", None).unwrap().created, 1);
        assert_eq!(worker.run("book", Some(Vec::new())).unwrap().updated, 1);
    }

    #[test]
    fn missing_fetch_hook_is_run_fatal() {
        let registry = book_registry();
        let store = MemoryStore::new();
        let linkage = MemoryLinkageStore::new();
        let worker = Worker::new(&registry, &store, &linkage);

        let err = worker.run("book", None).unwrap_err();
        assert!(matches!(err, SyncError::MissingHook { hook: "fetch", .. }));
        assert_eq!(worker.stats().runs_failed, 1);
        assert!(worker.stats().last_error.is_some());
    }

    #[test]
    fn unknown_entity_type_is_run_fatal() {
        let registry = book_registry();
        let store = MemoryStore::new();
        let linkage = MemoryLinkageStore::new();
        let worker = Worker::new(&registry, &store, &linkage);

        assert!(matches!(
            worker.run("ghost", Some(vec![Record::new()])),
            Err(SyncError::UnknownEntityType(_))
        ));
    }

    #[test]
    fn validation_failure_is_contained() {
        let registry = book_registry();
        let store = MemoryStore::new();
        store.require_fields("book", ["title"]);
        let linkage = MemoryLinkageStore::new();
        let logger = RecordingLogger::new();
        let worker = Worker::new(&registry, &store, &linkage).with_logger(&logger);

        let report = worker
            .run(
                "book",
                Some(vec![
                    record(serde_json::json!({"id": 1})),
                    record(serde_json::json!({"id": 2, "name": "Emma"})),
                ]),
            )
            .unwrap();

        assert_eq!(report.created, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].remote_id, Some(RemoteId::from(1)));
        assert_eq!(logger.failures().len(), 1);
        assert!(linkage.find("book", &RemoteId::from(1)).unwrap().is_none());
    }

    #[test]
    fn store_outage_is_run_fatal() {
        let registry = book_registry();
        let store = MemoryStore::new();
        let linkage = MemoryLinkageStore::new();
        let worker = Worker::new(&registry, &store, &linkage);
        store.set_unavailable(true);

        let err = worker
            .run("book", Some(vec![record(serde_json::json!({"id": 1}))]))
            .unwrap_err();
        assert!(matches!(err, SyncError::Store(StoreError::Unavailable(_))));
    }

    #[test]
    fn link_failure_flags_inconsistent_entity() {
        let registry = book_registry();
        let store = MemoryStore::new();
        let linkage = MemoryLinkageStore::new();
        linkage.set_fail_writes(true);
        let worker = Worker::new(&registry, &store, &linkage);

        let report = worker
            .run("book", Some(vec![record(serde_json::json!({"id": 1, "name": "Dune"}))]))
            .unwrap();

        assert_eq!(report.created, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.inconsistent.len(), 1);
        assert!(store.exists("book", report.inconsistent[0]).unwrap());
    }

    #[test]
    fn depth_limit_is_run_fatal() {
        let registry = Registry::new()
            .with(
                MappingConfig::builder("node")
                    .association("next", "node", ["next_id"])
                    .find_by_id(|id: &RemoteId| {
                        let n: i64 = id.as_str().parse().unwrap_or(0);
                        Ok(Some(
                            [("id", Value::from(n)), ("next_id", Value::from(n + 1))]
                                .into_iter()
                                .collect(),
                        ))
                    })
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let store = MemoryStore::new();
        let linkage = MemoryLinkageStore::new();
        let worker = Worker::new(&registry, &store, &linkage)
            .with_config(SyncConfig::new().with_max_association_depth(3));

        let err = worker
            .run("node", Some(vec![record(serde_json::json!({"id": 0, "next_id": 1}))]))
            .unwrap_err();
        assert!(matches!(err, SyncError::DepthExceeded { depth: 4, limit: 3, .. }));
    }

    #[test]
    fn skips_are_reported_when_traced() {
        let registry = Registry::new()
            .with(
                MappingConfig::builder("book")
                    .before_sync(|unit| unit.remote_id().as_str() != "2")
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let store = MemoryStore::new();
        let linkage = MemoryLinkageStore::new();
        let logger = RecordingLogger::new();
        let worker = Worker::new(&registry, &store, &linkage)
            .with_logger(&logger)
            .with_config(SyncConfig::new().with_trace_skips(true));

        let report = worker
            .run(
                "book",
                Some(vec![
                    record(serde_json::json!({"id": 1})),
                    record(serde_json::json!({"id": 2})),
                ]),
            )
            .unwrap();

        assert_eq!((report.created, report.skipped), (1, 1));
        assert!(logger.events().contains(&LogEvent::Skipped {
            entity_type: "book".into(),
            remote_id: RemoteId::from(2),
            step: "sync".into(),
        }));
    }

    /// Counts `tracing` events whose message is "skipped by hook".
    struct SkipCounter(Arc<std::sync::atomic::AtomicUsize>);

    struct MessageVisitor(String);

    impl tracing::field::Visit for MessageVisitor {
        fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
            if field.name() == "message" {
                self.0 = format!("{value:?}");
            }
        }
    }

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for SkipCounter {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            let mut visitor = MessageVisitor(String::new());
            event.record(&mut visitor);
            if visitor.0 == "skipped by hook" {
                self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn each_skip_is_traced_once() {
        use tracing_subscriber::layer::SubscriberExt;

        let registry = Registry::new()
            .with(
                MappingConfig::builder("book")
                    .before_sync(|_| false)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let store = MemoryStore::new();
        let linkage = MemoryLinkageStore::new();
        let batch = vec![record(serde_json::json!({"id": 1}))];

        for trace_skips in [false, true] {
            let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
            let subscriber =
                tracing_subscriber::registry().with(SkipCounter(Arc::clone(&count)));
            let worker = Worker::new(&registry, &store, &linkage)
                .with_config(SyncConfig::new().with_trace_skips(trace_skips));

            let report = tracing::subscriber::with_default(subscriber, || {
                worker.run("book", Some(batch.clone())).unwrap()
            });

            assert_eq!(report.skipped, 1);
            assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn hooks_see_the_created_entity() {
        let seen: Arc<parking_lot::Mutex<Vec<Option<EntityId>>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let registry = Registry::new()
            .with(
                MappingConfig::builder("book")
                    .after_record_sync(move |unit| sink.lock().push(unit.local_id()))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let store = MemoryStore::new();
        let linkage = MemoryLinkageStore::new();
        let worker = Worker::new(&registry, &store, &linkage);

        worker
            .run("book", Some(vec![record(serde_json::json!({"id": 1}))]))
            .unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].is_some());
    }
}
