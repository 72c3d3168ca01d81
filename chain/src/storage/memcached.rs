use super::{Batch, Result, Store};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, RwLock};

/// Memory overlay on another store.
///
/// Reads fall through to the parent unless the overlay holds an entry;
/// `None` entries are deletion tombstones. `persist` flushes the overlay
/// into the parent as one atomic batch and empties it, so a block's (or a
/// transaction's) write set either lands whole or not at all. Overlays
/// implement `Store` themselves and therefore stack.
pub struct MemCachedStore {
    parent: Arc<dyn Store>,
    mem: RwLock<BTreeMap<Vec<u8>, Option<Vec<u8>>>>,
}

impl MemCachedStore {
    pub fn new(parent: Arc<dyn Store>) -> Self {
        Self {
            parent,
            mem: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of pending overlay entries.
    pub fn len(&self) -> usize {
        self.mem.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.mem.read().unwrap().is_empty()
    }

    /// Flush the overlay into the parent store atomically. Returns the
    /// number of entries written (puts and deletions both count).
    pub fn persist(&self) -> Result<usize> {
        let drained: Batch = {
            let mut mem = self.mem.write().unwrap();
            std::mem::take(&mut *mem).into_iter().collect()
        };
        let count = drained.len();
        self.parent.put_batch(drained)?;
        Ok(count)
    }

    /// Drop all pending overlay entries.
    pub fn discard(&self) {
        self.mem.write().unwrap().clear();
    }

    /// Snapshot of the pending write set, in key order.
    pub fn write_set(&self) -> Batch {
        self.mem
            .read()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl Store for MemCachedStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(entry) = self.mem.read().unwrap().get(key) {
            return Ok(entry.clone());
        }
        self.parent.get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.mem
            .write()
            .unwrap()
            .insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.mem.write().unwrap().insert(key.to_vec(), None);
        Ok(())
    }

    fn seek(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        // Merge parent entries with the overlay; overlay wins on conflict.
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.parent.seek(prefix)?.into_iter().collect();
        let mem = self.mem.read().unwrap();
        for (key, value) in mem
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
        {
            match value {
                Some(v) => {
                    merged.insert(key.clone(), v.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }

    fn put_batch(&self, batch: Batch) -> Result<()> {
        let mut mem = self.mem.write().unwrap();
        for (key, value) in batch {
            mem.insert(key, value);
        }
        Ok(())
    }
}
