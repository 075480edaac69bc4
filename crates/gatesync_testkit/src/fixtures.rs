//! Test fixtures and environment helpers.
//!
//! Provides a self-contained sync environment and a small library catalog
//! for engine tests.

use gatesync_codec::Record;
use gatesync_engine::{MappingConfig, MockGateway, RecordingLogger, Registry, Worker};
use gatesync_store::{FileLinkageStore, LinkageStore, MemoryLinkageStore, MemoryStore};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// File name of the linkage journal in file-based environments.
pub const LINKAGE_FILE: &str = "linkage.journal";

/// Everything a sync run needs, with automatic cleanup.
pub struct TestEnv {
    /// The local store.
    pub store: MemoryStore,
    /// The identity linkage store.
    pub linkage: Box<dyn LinkageStore>,
    /// The remote source.
    pub gateway: Arc<MockGateway>,
    /// Captures the worker's log events.
    pub logger: RecordingLogger,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestEnv {
    /// Creates an environment with an in-memory linkage store.
    pub fn memory() -> Self {
        Self {
            store: MemoryStore::new(),
            linkage: Box::new(MemoryLinkageStore::new()),
            gateway: Arc::new(MockGateway::new()),
            logger: RecordingLogger::new(),
            _temp_dir: None,
        }
    }

    /// Creates an environment with a file-backed linkage store.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let linkage = FileLinkageStore::open(&temp_dir.path().join(LINKAGE_FILE))
            .expect("Failed to open linkage journal");

        Self {
            store: MemoryStore::new(),
            linkage: Box::new(linkage),
            gateway: Arc::new(MockGateway::new()),
            logger: RecordingLogger::new(),
            _temp_dir: Some(temp_dir),
        }
    }

    /// Returns the journal path if file-based, None if in-memory.
    pub fn linkage_path(&self) -> Option<PathBuf> {
        self._temp_dir.as_ref().map(|d| d.path().join(LINKAGE_FILE))
    }

    /// Creates a worker over this environment, logging to [`TestEnv::logger`].
    pub fn worker<'a>(&'a self, registry: &'a Registry) -> Worker<'a> {
        Worker::new(registry, &self.store, self.linkage.as_ref()).with_logger(&self.logger)
    }
}

/// Builds a record from a JSON object.
///
/// # Panics
///
/// Panics if `json` is not an object.
pub fn record(json: serde_json::Value) -> Record {
    Record::from_json(json).expect("JSON value is not an object")
}

/// Builds a batch of records from JSON objects.
pub fn records<I>(items: I) -> Vec<Record>
where
    I: IntoIterator<Item = serde_json::Value>,
{
    items.into_iter().map(record).collect()
}

/// Builder for the library catalog configurations, pre-wired to an
/// environment's gateway.
///
/// - `author`: identity `id`
/// - `tag`: identity `slug`
/// - `book`: identity `id`, `name` renamed to `title`, associations
///   `author` (from `author_id`) and `tags` (from `tags`)
pub fn library_configs(env: &TestEnv) -> (MappingConfig, MappingConfig, MappingConfig) {
    env.gateway.set_identity_field("tag", "slug");

    let author = MappingConfig::builder("author")
        .gateway(env.gateway.clone())
        .build()
        .expect("author config");
    let tag = MappingConfig::builder("tag")
        .identity_field("slug")
        .gateway(env.gateway.clone())
        .build()
        .expect("tag config");
    let book = MappingConfig::builder("book")
        .map("name", "title")
        .association("author", "author", ["author_id"])
        .association("tags", "tag", ["tags"])
        .gateway(env.gateway.clone())
        .build()
        .expect("book config");
    (author, tag, book)
}

/// Registry of the library catalog.
pub fn library_registry(env: &TestEnv) -> Registry {
    let (author, tag, book) = library_configs(env);
    let registry = Registry::new()
        .with(author)
        .and_then(|r| r.with(tag))
        .and_then(|r| r.with(book))
        .expect("library registry");
    registry.validate().expect("library associations");
    registry
}

/// Seeds the gateway with two authors, two tags and two books.
pub fn seed_library(env: &TestEnv) {
    env.gateway.set_records(
        "author",
        records([
            serde_json::json!({"id": 10, "name": "Frank Herbert"}),
            serde_json::json!({"id": 11, "name": "Jane Austen"}),
        ]),
    );
    env.gateway.set_records(
        "tag",
        records([
            serde_json::json!({"slug": "scifi", "label": "Science Fiction"}),
            serde_json::json!({"slug": "classic", "label": "Classic"}),
        ]),
    );
    env.gateway.set_records(
        "book",
        records([
            serde_json::json!({"id": 1, "name": "Dune", "author_id": 10, "tags": ["scifi", "classic"]}),
            serde_json::json!({"id": 2, "name": "Emma", "author_id": 11, "tags": [{"slug": "classic"}]}),
        ]),
    );
}
