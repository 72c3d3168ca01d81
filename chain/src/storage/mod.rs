/// Storage layer
///
/// Byte-addressable key/value backends behind the `Store` trait. Two
/// implementations ship: an ordered in-memory map and RocksDB. The
/// `MemCachedStore` overlay layers block- and transaction-scoped write sets
/// on top of any backend and flushes them atomically.

use thiserror::Error;

mod memcached;
mod memory;
mod rocksdb_store;

pub use memcached::MemCachedStore;
pub use memory::MemoryStore;
pub use rocksdb_store::RocksDbStore;

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rocksdb::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid data: {0}")]
    InvalidData(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// A write batch: `None` values are deletions.
pub type Batch = Vec<(Vec<u8>, Option<Vec<u8>>)>;

/// Byte-addressable key/value store.
///
/// `seek` returns entries under `prefix` in ascending key order. `put_batch`
/// applies all operations atomically.
pub trait Store: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;
    fn delete(&self, key: &[u8]) -> Result<()>;
    fn seek(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;
    fn put_batch(&self, batch: Batch) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    // Backend-agnostic contract checks, run against both implementations.
    fn exercise_store(store: &dyn Store) {
        assert!(store.get(b"missing").unwrap().is_none());

        store.put(b"alpha:1", b"one").unwrap();
        store.put(b"alpha:2", b"two").unwrap();
        store.put(b"beta:1", b"three").unwrap();
        assert_eq!(store.get(b"alpha:1").unwrap().unwrap(), b"one");

        let entries = store.seek(b"alpha:").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, b"alpha:1");
        assert_eq!(entries[1].0, b"alpha:2");

        store.delete(b"alpha:1").unwrap();
        assert!(store.get(b"alpha:1").unwrap().is_none());
        assert_eq!(store.seek(b"alpha:").unwrap().len(), 1);

        store
            .put_batch(vec![
                (b"gamma:1".to_vec(), Some(b"four".to_vec())),
                (b"beta:1".to_vec(), None),
            ])
            .unwrap();
        assert_eq!(store.get(b"gamma:1").unwrap().unwrap(), b"four");
        assert!(store.get(b"beta:1").unwrap().is_none());
    }

    #[test]
    fn test_memory_store_contract() {
        let store = MemoryStore::new();
        exercise_store(&store);
    }

    #[test]
    fn test_rocksdb_store_contract() {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();
        exercise_store(&store);
    }

    #[test]
    fn test_memcached_store_contract() {
        let store = MemCachedStore::new(Arc::new(MemoryStore::new()));
        exercise_store(&store);
    }
}
