//! In-memory object store.
//!
//! The informer owns the only [`Store`] (the writer). Readers get a
//! [`StoreReader`], which can be cloned freely and shares the same entries.
//! Every entry is an `Arc<Database>`, so a read hands out a complete object
//! and never holds the lock while the caller looks at it.

use crate::error::{CacheError, CacheResult};
use dbwatch_api::{Database, ObjectKey};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

type Entries = Arc<RwLock<BTreeMap<ObjectKey, Arc<Database>>>>;

/// What a snapshot replacement changed.
#[derive(Debug, Default)]
pub struct Reconciled {
    /// Objects that were not in the store before.
    pub added: Vec<Arc<Database>>,
    /// Objects that replaced an existing entry, as `(old, new)`.
    pub updated: Vec<(Arc<Database>, Arc<Database>)>,
    /// Entries missing from the snapshot, now removed.
    pub removed: Vec<Arc<Database>>,
}

/// Writable store, owned by the informer.
#[derive(Debug, Default)]
pub struct Store {
    entries: Entries,
}

impl Store {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a read-only handle to the same entries.
    pub fn reader(&self) -> StoreReader {
        StoreReader {
            entries: Arc::clone(&self.entries),
        }
    }

    /// Inserts or overwrites an object. Returns the previous entry.
    pub fn upsert(&self, object: Database) -> Option<Arc<Database>> {
        let key = object.key();
        self.entries.write().insert(key, Arc::new(object))
    }

    /// Removes an entry. Returns it, or `None` if it was absent.
    pub fn delete(&self, key: &ObjectKey) -> Option<Arc<Database>> {
        self.entries.write().remove(key)
    }

    /// Replaces the whole contents with a list snapshot.
    ///
    /// Every snapshot item is upserted and every entry missing from the
    /// snapshot is removed, in one write section.
    pub fn replace(&self, objects: Vec<Database>) -> Reconciled {
        let mut reconciled = Reconciled::default();
        let mut entries = self.entries.write();

        let mut seen = BTreeSet::new();
        for object in objects {
            let key = object.key();
            let object = Arc::new(object);
            match entries.insert(key.clone(), Arc::clone(&object)) {
                Some(old) => reconciled.updated.push((old, object)),
                None => reconciled.added.push(object),
            }
            seen.insert(key);
        }

        let stale: Vec<ObjectKey> = entries
            .keys()
            .filter(|key| !seen.contains(*key))
            .cloned()
            .collect();
        for key in stale {
            if let Some(old) = entries.remove(&key) {
                reconciled.removed.push(old);
            }
        }

        reconciled
    }

    /// Looks up an entry.
    pub fn get(&self, key: &ObjectKey) -> CacheResult<Arc<Database>> {
        self.reader().get(key)
    }

    /// Returns a point-in-time copy of all entries.
    pub fn list(&self) -> Vec<Arc<Database>> {
        self.reader().list()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Read-only view of a [`Store`].
#[derive(Debug, Clone)]
pub struct StoreReader {
    entries: Entries,
}

impl StoreReader {
    /// Looks up an entry.
    pub fn get(&self, key: &ObjectKey) -> CacheResult<Arc<Database>> {
        self.entries
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| CacheError::NotFound(key.clone()))
    }

    /// Looks up a cluster-scoped entry by name.
    pub fn get_by_name(&self, name: &str) -> CacheResult<Arc<Database>> {
        self.get(&ObjectKey::cluster(name))
    }

    /// Returns true if the entry exists.
    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Returns a point-in-time copy of all entries, ordered by key.
    pub fn list(&self) -> Vec<Arc<Database>> {
        self.entries.read().values().cloned().collect()
    }

    /// Returns the keys of all entries, ordered.
    pub fn keys(&self) -> Vec<ObjectKey> {
        self.entries.read().keys().cloned().collect()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbwatch_api::DatabaseSpec;
    use proptest::prelude::*;

    fn db(name: &str, available: i64) -> Database {
        Database::new(
            name,
            DatabaseSpec {
                total: 100,
                available,
                ..Default::default()
            },
        )
    }

    #[test]
    fn upsert_get_delete() {
        let store = Store::new();
        assert!(store.upsert(db("mysql", 50)).is_none());

        let old = store.upsert(db("mysql", 40)).unwrap();
        assert_eq!(old.spec.available, 50);
        assert_eq!(store.get(&ObjectKey::cluster("mysql")).unwrap().spec.available, 40);

        let removed = store.delete(&ObjectKey::cluster("mysql")).unwrap();
        assert_eq!(removed.spec.available, 40);
        assert!(matches!(
            store.get(&ObjectKey::cluster("mysql")),
            Err(CacheError::NotFound(_))
        ));
    }

    #[test]
    fn delete_absent_is_noop() {
        let store = Store::new();
        store.upsert(db("a", 1));
        assert!(store.delete(&ObjectKey::cluster("missing")).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn upsert_is_idempotent() {
        let store = Store::new();
        store.upsert(db("a", 1));
        let once = store.list();
        store.upsert(db("a", 1));
        assert_eq!(store.list(), once);
    }

    #[test]
    fn replace_reconciles() {
        let store = Store::new();
        for name in ["a", "b", "c"] {
            store.upsert(db(name, 1));
        }

        let reconciled = store.replace(vec![db("a", 2), db("c", 1), db("d", 1)]);
        assert_eq!(reconciled.added.len(), 1);
        assert_eq!(reconciled.updated.len(), 2);
        assert_eq!(reconciled.removed.len(), 1);
        assert_eq!(reconciled.removed[0].name(), "b");

        let names: Vec<String> = store.reader().keys().into_iter().map(|k| k.name).collect();
        assert_eq!(names, vec!["a", "c", "d"]);
    }

    #[test]
    fn reader_sees_writes() {
        let store = Store::new();
        let reader = store.reader();
        assert!(reader.is_empty());

        store.upsert(db("mysql", 50));
        assert!(reader.contains(&ObjectKey::cluster("mysql")));
        assert_eq!(reader.get_by_name("mysql").unwrap().spec.available, 50);

        // A snapshot taken before a write keeps the old object.
        let before = reader.list();
        store.upsert(db("mysql", 40));
        assert_eq!(before[0].spec.available, 50);
        assert_eq!(reader.list()[0].spec.available, 40);
    }

    #[test]
    fn namespaces_are_distinct() {
        let store = Store::new();
        store.upsert(db("x", 1).in_namespace("a"));
        store.upsert(db("x", 2).in_namespace("b"));
        assert_eq!(store.len(), 2);
        assert_eq!(
            store.get(&ObjectKey::namespaced("b", "x")).unwrap().spec.available,
            2
        );
    }

    #[derive(Debug, Clone)]
    enum Op {
        Upsert(u8, i64),
        Delete(u8),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..8, 0i64..100).prop_map(|(n, a)| Op::Upsert(n, a)),
            (0u8..8).prop_map(Op::Delete),
        ]
    }

    proptest! {
        #[test]
        fn snapshot_defines_contents(
            ops in prop::collection::vec(op(), 0..40),
            snapshot in prop::collection::btree_set(0u8..8, 0..8),
        ) {
            let store = Store::new();
            for op in ops {
                match op {
                    Op::Upsert(n, a) => { store.upsert(db(&format!("db-{}", n), a)); }
                    Op::Delete(n) => { store.delete(&ObjectKey::cluster(format!("db-{}", n))); }
                }
            }

            store.replace(snapshot.iter().map(|n| db(&format!("db-{}", n), 7)).collect());

            let expected: Vec<ObjectKey> = snapshot
                .iter()
                .map(|n| ObjectKey::cluster(format!("db-{}", n)))
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            prop_assert_eq!(store.reader().keys(), expected);
            prop_assert!(store.list().iter().all(|d| d.spec.available == 7));
        }

        #[test]
        fn repeated_upsert_is_idempotent(n in 0u8..8, a in 0i64..100) {
            let once = Store::new();
            once.upsert(db(&format!("db-{}", n), a));

            let twice = Store::new();
            twice.upsert(db(&format!("db-{}", n), a));
            twice.upsert(db(&format!("db-{}", n), a));

            prop_assert_eq!(once.list(), twice.list());
        }
    }
}
