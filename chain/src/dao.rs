// DAO
//
// Data access layer shared by the EVM state adapter and the native
// contracts. Storage items are raw byte slices keyed by (contract address,
// key); the DAO serializes that pair by concatenation on top of a memory
// overlay, so a whole block's writes commit to the backing store atomically
// or not at all.

use crate::storage::{Batch, MemCachedStore, Result, Store};
use alloy_primitives::Address;
use std::sync::Arc;

/// Layered data access object over a `Store`.
///
/// Each `Dao` owns one overlay. `layer` opens a child whose parent is this
/// DAO's overlay: the child's `persist` folds its writes into this layer,
/// `discard` drops them. Stacking layers is how transaction execution gets
/// snapshot/revert semantics.
#[derive(Clone)]
pub struct Dao {
    cache: Arc<MemCachedStore>,
}

impl Dao {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            cache: Arc::new(MemCachedStore::new(store)),
        }
    }

    /// Open a child DAO layered over this one.
    pub fn layer(&self) -> Dao {
        Dao::new(self.cache.clone() as Arc<dyn Store>)
    }

    fn item_key(contract: &Address, key: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Address::len_bytes() + key.len());
        buf.extend_from_slice(contract.as_slice());
        buf.extend_from_slice(key);
        buf
    }

    pub fn get_storage_item(&self, contract: &Address, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.cache.get(&Self::item_key(contract, key))
    }

    pub fn put_storage_item(&self, contract: &Address, key: &[u8], value: &[u8]) -> Result<()> {
        self.cache.put(&Self::item_key(contract, key), value)
    }

    pub fn delete_storage_item(&self, contract: &Address, key: &[u8]) -> Result<()> {
        self.cache.delete(&Self::item_key(contract, key))
    }

    /// All items of `contract` under `prefix`, keys relative to the
    /// contract, in ascending key order.
    pub fn seek(&self, contract: &Address, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let full_prefix = Self::item_key(contract, prefix);
        let entries = self.cache.seek(&full_prefix)?;
        Ok(entries
            .into_iter()
            .map(|(k, v)| (k[Address::len_bytes()..].to_vec(), v))
            .collect())
    }

    /// Flush this layer into its parent. Returns the entry count written.
    pub fn persist(&self) -> Result<usize> {
        self.cache.persist()
    }

    /// Drop this layer's pending writes.
    pub fn discard(&self) {
        self.cache.discard();
    }

    /// Pending write set of this layer, in key order.
    pub fn write_set(&self) -> Batch {
        self.cache.write_set()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use testutil::random_address;

    fn new_dao() -> Dao {
        Dao::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_storage_item_round_trip() {
        let dao = new_dao();
        let contract = random_address();
        dao.put_storage_item(&contract, b"key", b"value").unwrap();
        assert_eq!(
            dao.get_storage_item(&contract, b"key").unwrap().unwrap(),
            b"value"
        );
        dao.delete_storage_item(&contract, b"key").unwrap();
        assert!(dao.get_storage_item(&contract, b"key").unwrap().is_none());
    }

    #[test]
    fn test_contracts_are_isolated() {
        let dao = new_dao();
        let (a, b) = (random_address(), random_address());
        dao.put_storage_item(&a, b"key", b"of-a").unwrap();
        assert!(dao.get_storage_item(&b, b"key").unwrap().is_none());
    }

    #[test]
    fn test_seek_strips_contract_prefix() {
        let dao = new_dao();
        let contract = random_address();
        dao.put_storage_item(&contract, &[1, 0], b"a").unwrap();
        dao.put_storage_item(&contract, &[1, 1], b"b").unwrap();
        dao.put_storage_item(&contract, &[2, 0], b"c").unwrap();

        let entries = dao.seek(&contract, &[1]).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, vec![1, 0]);
        assert_eq!(entries[1].0, vec![1, 1]);
    }

    #[test]
    fn test_layer_commit() {
        let store = Arc::new(MemoryStore::new());
        let block = Dao::new(store.clone());
        let contract = random_address();

        let tx = block.layer();
        tx.put_storage_item(&contract, b"n", b"1").unwrap();
        assert!(block.get_storage_item(&contract, b"n").unwrap().is_none());

        let written = tx.persist().unwrap();
        assert_eq!(written, 1);
        assert_eq!(
            block.get_storage_item(&contract, b"n").unwrap().unwrap(),
            b"1"
        );
        // backing store still clean until the block layer persists
        assert!(store.seek(b"").unwrap().is_empty());

        block.persist().unwrap();
        assert_eq!(store.seek(b"").unwrap().len(), 1);
    }

    #[test]
    fn test_layer_discard() {
        let block = new_dao();
        let contract = random_address();
        let tx = block.layer();
        tx.put_storage_item(&contract, b"n", b"1").unwrap();
        tx.discard();
        assert!(block.get_storage_item(&contract, b"n").unwrap().is_none());
    }
}
