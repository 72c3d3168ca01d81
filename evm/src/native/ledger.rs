use crate::interop::InteropContext;
use crate::native::{ids, selector, unknown_selector, ContractMeta, NativeContract};
use alloy_primitives::{Address, Bytes, B256};
use alloy_sol_types::{sol, SolCall, SolValue};
use anyhow::{bail, Result};
use chain::dao::Dao;

sol! {
    /// Chain bookkeeping: account nonces and block hash index
    interface ILedger {
        function getNonce(address account) external view returns (uint64);
        function getBlockHash(uint32 index) external view returns (bytes32);
        function currentIndex() external view returns (uint32);
    }
}

const PREFIX_NONCE: u8 = 0x01;
const PREFIX_BLOCK_HASH: u8 = 0x02;
const CURRENT_INDEX_KEY: [u8; 1] = [0x03];
const PREFIX_STATE_ROOT: u8 = 0x04;

const READ_GAS: u64 = 400;

/// The Ledger native: per-account committed nonces, the block-hash index
/// and per-height state root records. Nonces live here, separate from any
/// EVM account object, so cross-chain accounting can diverge from EVM
/// nonce semantics without touching account state.
pub struct Ledger {
    meta: ContractMeta,
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            meta: ContractMeta::new("Ledger", ids::LEDGER),
        }
    }

    pub fn address() -> Address {
        super::native_address(ids::LEDGER)
    }

    fn nonce_key(account: &Address) -> Vec<u8> {
        let mut key = Vec::with_capacity(1 + Address::len_bytes());
        key.push(PREFIX_NONCE);
        key.extend_from_slice(account.as_slice());
        key
    }

    fn block_hash_key(index: u32) -> [u8; 5] {
        let mut key = [0u8; 5];
        key[0] = PREFIX_BLOCK_HASH;
        key[1..].copy_from_slice(&index.to_le_bytes());
        key
    }

    fn state_root_key(index: u32) -> [u8; 5] {
        let mut key = [0u8; 5];
        key[0] = PREFIX_STATE_ROOT;
        key[1..].copy_from_slice(&index.to_le_bytes());
        key
    }

    pub fn get_nonce(dao: &Dao, account: &Address) -> Result<u64> {
        match dao.get_storage_item(&Self::address(), &Self::nonce_key(account))? {
            Some(raw) => match <[u8; 8]>::try_from(raw.as_slice()) {
                Ok(bytes) => Ok(u64::from_le_bytes(bytes)),
                Err(_) => bail!("malformed nonce entry for {account}"),
            },
            None => Ok(0),
        }
    }

    pub fn set_nonce(dao: &Dao, account: &Address, nonce: u64) -> Result<()> {
        dao.put_storage_item(
            &Self::address(),
            &Self::nonce_key(account),
            &nonce.to_le_bytes(),
        )
    }

    pub fn get_block_hash(dao: &Dao, index: u32) -> Result<Option<B256>> {
        Ok(dao
            .get_storage_item(&Self::address(), &Self::block_hash_key(index))?
            .filter(|raw| raw.len() == 32)
            .map(|raw| B256::from_slice(&raw)))
    }

    pub fn put_block_hash(dao: &Dao, index: u32, hash: B256) -> Result<()> {
        dao.put_storage_item(
            &Self::address(),
            &Self::block_hash_key(index),
            hash.as_slice(),
        )
    }

    /// Height of the last persisted block, `None` before genesis.
    pub fn current_index(dao: &Dao) -> Result<Option<u32>> {
        match dao.get_storage_item(&Self::address(), &CURRENT_INDEX_KEY)? {
            Some(raw) => match <[u8; 4]>::try_from(raw.as_slice()) {
                Ok(bytes) => Ok(Some(u32::from_le_bytes(bytes))),
                Err(_) => bail!("malformed current index entry"),
            },
            None => Ok(None),
        }
    }

    pub fn set_current_index(dao: &Dao, index: u32) -> Result<()> {
        dao.put_storage_item(&Self::address(), &CURRENT_INDEX_KEY, &index.to_le_bytes())
    }

    pub fn get_state_root(dao: &Dao, index: u32) -> Result<Option<chain::state::StateRoot>> {
        match dao.get_storage_item(&Self::address(), &Self::state_root_key(index))? {
            Some(raw) => Ok(Some(bincode::deserialize(&raw).map_err(|e| {
                anyhow::anyhow!("corrupt state root at {index}: {e}")
            })?)),
            None => Ok(None),
        }
    }

    pub fn put_state_root(dao: &Dao, root: &chain::state::StateRoot) -> Result<()> {
        let raw = bincode::serialize(root)
            .map_err(|e| anyhow::anyhow!("serialize state root: {e}"))?;
        dao.put_storage_item(&Self::address(), &Self::state_root_key(root.index), &raw)
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeContract for Ledger {
    fn meta(&self) -> &ContractMeta {
        &self.meta
    }

    fn initialize(&self, _dao: &Dao) -> Result<()> {
        Ok(())
    }

    fn required_gas(&self, _input: &[u8]) -> u64 {
        READ_GAS
    }

    fn run(&self, ic: &mut InteropContext<'_>, input: &[u8]) -> Result<Bytes> {
        let sel = selector(input)?;
        match sel {
            s if s == ILedger::getNonceCall::SELECTOR => {
                let call = ILedger::getNonceCall::abi_decode(input, true)?;
                Ok(Bytes::from(
                    Self::get_nonce(ic.dao(), &call.account)?.abi_encode(),
                ))
            }
            s if s == ILedger::getBlockHashCall::SELECTOR => {
                let call = ILedger::getBlockHashCall::abi_decode(input, true)?;
                let hash = Self::get_block_hash(ic.dao(), call.index)?.unwrap_or_default();
                Ok(Bytes::from(hash.abi_encode()))
            }
            s if s == ILedger::currentIndexCall::SELECTOR => {
                let index = Self::current_index(ic.dao())?.unwrap_or_default();
                Ok(Bytes::from(index.abi_encode()))
            }
            other => Err(unknown_selector(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain::state::StateRoot;
    use chain::storage::MemoryStore;
    use std::sync::Arc;
    use testutil::{random_address, random_hash};

    fn new_dao() -> Dao {
        Dao::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_nonce_round_trip() {
        let dao = new_dao();
        let account = random_address();
        assert_eq!(Ledger::get_nonce(&dao, &account).unwrap(), 0);
        Ledger::set_nonce(&dao, &account, 42).unwrap();
        assert_eq!(Ledger::get_nonce(&dao, &account).unwrap(), 42);
    }

    #[test]
    fn test_block_hash_index() {
        let dao = new_dao();
        let hash = random_hash();
        assert!(Ledger::get_block_hash(&dao, 7).unwrap().is_none());
        Ledger::put_block_hash(&dao, 7, hash).unwrap();
        assert_eq!(Ledger::get_block_hash(&dao, 7).unwrap().unwrap(), hash);
    }

    #[test]
    fn test_current_index() {
        let dao = new_dao();
        assert!(Ledger::current_index(&dao).unwrap().is_none());
        Ledger::set_current_index(&dao, 12).unwrap();
        assert_eq!(Ledger::current_index(&dao).unwrap(), Some(12));
    }

    #[test]
    fn test_state_root_round_trip() {
        let dao = new_dao();
        let root = StateRoot {
            version: 0,
            index: 3,
            root: random_hash(),
            witness: Default::default(),
        };
        Ledger::put_state_root(&dao, &root).unwrap();
        let loaded = Ledger::get_state_root(&dao, 3).unwrap().unwrap();
        assert_eq!(loaded.root, root.root);
        assert!(Ledger::get_state_root(&dao, 4).unwrap().is_none());
    }
}
