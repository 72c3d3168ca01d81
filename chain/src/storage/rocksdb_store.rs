use super::{Batch, Result, Store};
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;

/// Persistent store backed by RocksDB.
pub struct RocksDbStore {
    db: DB,
}

impl RocksDbStore {
    /// Open (or create) a database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        Ok(Self { db })
    }
}

impl Store for RocksDbStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key)?)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.db.put(key, value)?;
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.db.delete(key)?;
        Ok(())
    }

    fn seek(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut entries = Vec::new();
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix, Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key.to_vec(), value.to_vec()));
        }
        Ok(entries)
    }

    fn put_batch(&self, batch: Batch) -> Result<()> {
        let mut wb = WriteBatch::default();
        for (key, value) in batch {
            match value {
                Some(v) => wb.put(&key, &v),
                None => wb.delete(&key),
            }
        }
        self.db.write(wb)?;
        Ok(())
    }
}
