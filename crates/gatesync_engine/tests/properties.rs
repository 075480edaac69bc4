//! Property tests for sync runs over generated batches.

use gatesync_codec::Record;
use gatesync_engine::{MappingConfig, NoopLogger, Registry, Worker};
use gatesync_store::{LinkageStore, LocalStore, MemoryLinkageStore, MemoryStore, RemoteId};
use gatesync_testkit::prelude::*;
use proptest::prelude::*;
use std::collections::BTreeSet;

fn item_registry(destroy_missing: bool) -> Registry {
    Registry::new()
        .with(
            MappingConfig::builder("item")
                .destroy_missing(destroy_missing)
                .build()
                .unwrap(),
        )
        .unwrap()
}

fn identity(record: &Record) -> RemoteId {
    RemoteId::from_value(record.get("id").unwrap()).unwrap()
}

fn linked_identities(linkage: &dyn LinkageStore) -> BTreeSet<RemoteId> {
    linkage
        .list("item")
        .unwrap()
        .into_iter()
        .map(|row| row.remote_id)
        .collect()
}

// An empty batch falls back to the fetch hook, which these configs lack.
fn non_empty_batch() -> impl Strategy<Value = Vec<Record>> {
    batch_strategy("id", 12).prop_filter("empty batch", |batch| !batch.is_empty())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn second_run_updates_every_record(batch in non_empty_batch()) {
        let registry = item_registry(false);
        let store = MemoryStore::new();
        let linkage = MemoryLinkageStore::new();
        let worker = Worker::new(&registry, &store, &linkage).with_logger(&NoopLogger);

        let first = worker.run("item", Some(batch.clone())).unwrap();
        prop_assert_eq!((first.created, first.updated), (batch.len(), 0));

        let second = worker.run("item", Some(batch.clone())).unwrap();
        prop_assert_eq!((second.created, second.updated), (0, batch.len()));
        prop_assert!(!second.has_failures());

        prop_assert_eq!(store.count("item").unwrap(), batch.len());
        prop_assert_eq!(linkage.list("item").unwrap().len(), batch.len());
        let expected: BTreeSet<RemoteId> = batch.iter().map(identity).collect();
        prop_assert_eq!(linked_identities(&linkage), expected);
    }

    #[test]
    fn destroy_missing_deletes_exactly_the_complement(
        batch in non_empty_batch(),
        keep in prop::collection::vec(any::<bool>(), 12),
    ) {
        let registry = item_registry(true);
        let store = MemoryStore::new();
        let linkage = MemoryLinkageStore::new();
        let worker = Worker::new(&registry, &store, &linkage).with_logger(&NoopLogger);

        worker.run("item", Some(batch.clone())).unwrap();

        // The first record always stays so the second batch is never empty
        let subset: Vec<Record> = batch
            .iter()
            .enumerate()
            .filter(|(i, _)| *i == 0 || keep[*i])
            .map(|(_, record)| record.clone())
            .collect();
        let report = worker.run("item", Some(subset.clone())).unwrap();

        prop_assert_eq!(report.deleted_count, batch.len() - subset.len());
        prop_assert_eq!(report.updated, subset.len());
        prop_assert_eq!(report.before_count, batch.len());
        prop_assert_eq!(report.after_count, subset.len());

        let expected: BTreeSet<RemoteId> = subset.iter().map(identity).collect();
        prop_assert_eq!(linked_identities(&linkage), expected);
    }
}
