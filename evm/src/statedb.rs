// StateDb
//
// EVM-facing adapter over the DAO. Balances resolve through the GAS
// native, nonces and the block-hash index through Ledger, code through
// Management, and contract storage slots live under the contract's own
// address. Snapshots are tokenized integers backed by DAO stacking:
// every snapshot opens a fresh overlay, reverting discards the layers
// above the token.

use crate::native::{Gas, Ledger, Management};
use crate::types::Log;
use alloy_primitives::{Address, Bytes, B256, U256};
use anyhow::{anyhow, Result};
use chain::crypto::keccak256;
use chain::dao::Dao;
use revm::primitives::{AccountInfo, Bytecode, KECCAK_EMPTY};
use revm::{Database, DatabaseRef};

pub struct StateDb {
    base: Dao,
    overlays: Vec<Dao>,
    logs: Vec<Log>,
    log_marks: Vec<usize>,
    refund: u64,
}

impl StateDb {
    /// Open a state view layered over `dao` (typically the block DAO).
    pub fn new(dao: &Dao) -> Self {
        Self {
            base: dao.layer(),
            overlays: Vec::new(),
            logs: Vec::new(),
            log_marks: Vec::new(),
            refund: 0,
        }
    }

    fn top(&self) -> &Dao {
        self.overlays.last().unwrap_or(&self.base)
    }

    // -- snapshots ---------------------------------------------------------

    /// Open a snapshot and return its token.
    pub fn snapshot(&mut self) -> usize {
        let token = self.overlays.len();
        self.overlays.push(self.top().layer());
        self.log_marks.push(self.logs.len());
        token
    }

    /// Discard every layer (and log) recorded after `token`.
    pub fn revert_to_snapshot(&mut self, token: usize) {
        while self.overlays.len() > token {
            if let Some(layer) = self.overlays.pop() {
                layer.discard();
            }
            if let Some(mark) = self.log_marks.pop() {
                self.logs.truncate(mark);
            }
        }
    }

    /// Fold every layer down into the DAO this view was opened over.
    /// Returns the number of entries written.
    pub fn commit(&mut self) -> Result<usize> {
        let mut written = 0;
        while let Some(layer) = self.overlays.pop() {
            written += layer.persist()?;
            self.log_marks.pop();
        }
        written += self.base.persist()?;
        Ok(written)
    }

    // -- accounts ----------------------------------------------------------

    pub fn balance(&self, account: &Address) -> Result<U256> {
        Ok(Gas::get_balance(self.top(), account)?)
    }

    pub fn set_balance(&self, account: &Address, balance: U256) -> Result<()> {
        Ok(Gas::set_balance(self.top(), account, balance)?)
    }

    pub fn nonce(&self, account: &Address) -> Result<u64> {
        Ledger::get_nonce(self.top(), account)
    }

    pub fn set_nonce(&self, account: &Address, nonce: u64) -> Result<()> {
        Ledger::set_nonce(self.top(), account, nonce)
    }

    pub fn code(&self, account: &Address) -> Result<Option<Bytes>> {
        Management::get_code(self.top(), account)
    }

    pub fn set_code(&self, account: &Address, code: Bytes) -> Result<()> {
        Management::deploy(self.top(), account, code)?;
        Ok(())
    }

    // -- storage slots -----------------------------------------------------

    pub fn storage(&self, contract: &Address, slot: U256) -> Result<U256> {
        let key = slot.to_be_bytes::<32>();
        match self.top().get_storage_item(contract, &key)? {
            Some(raw) => Ok(U256::from_be_slice(&raw)),
            None => Ok(U256::ZERO),
        }
    }

    pub fn set_storage(&self, contract: &Address, slot: U256, value: U256) -> Result<()> {
        let key = slot.to_be_bytes::<32>();
        if value.is_zero() {
            self.top().delete_storage_item(contract, &key)?;
        } else {
            self.top()
                .put_storage_item(contract, &key, &value.to_be_bytes::<32>())?;
        }
        Ok(())
    }

    // -- logs and refunds --------------------------------------------------

    pub fn add_log(&mut self, log: Log) {
        self.logs.push(log);
    }

    pub fn logs(&self) -> &[Log] {
        &self.logs
    }

    pub fn take_logs(&mut self) -> Vec<Log> {
        std::mem::take(&mut self.logs)
    }

    pub fn add_refund(&mut self, gas: u64) {
        self.refund += gas;
    }

    pub fn sub_refund(&mut self, gas: u64) {
        self.refund = self.refund.saturating_sub(gas);
    }

    pub fn refund(&self) -> u64 {
        self.refund
    }

    // -- EVM result application -------------------------------------------

    /// Write an execution's account diff back through the native state
    /// owners.
    pub fn apply(&mut self, state: revm::primitives::State) -> Result<()> {
        for (address, account) in state {
            if !account.is_touched() {
                continue;
            }
            if account.is_selfdestructed() {
                self.set_balance(&address, U256::ZERO)?;
                self.set_nonce(&address, 0)?;
                Management::destroy(self.top(), &address)?;
                continue;
            }
            self.set_balance(&address, account.info.balance)?;
            self.set_nonce(&address, account.info.nonce)?;
            if let Some(code) = account.info.code.as_ref() {
                if !code.is_empty() {
                    let stored = Management::get_code_hash(self.top(), &address)?;
                    if stored != Some(account.info.code_hash) {
                        self.set_code(&address, Bytes::from(code.bytes().to_vec()))?;
                    }
                }
            }
            for (slot, entry) in account.storage {
                self.set_storage(&address, slot, entry.present_value())?;
            }
        }
        Ok(())
    }

    fn account_info(&self, address: &Address) -> Result<Option<AccountInfo>> {
        let balance = self.balance(address)?;
        let nonce = self.nonce(address)?;
        let code = self.code(address)?;
        if balance.is_zero() && nonce == 0 && code.is_none() {
            return Ok(None);
        }
        let (code_hash, code) = match code {
            Some(bytes) => (keccak256(&bytes), Some(Bytecode::new_raw(bytes))),
            None => (KECCAK_EMPTY, None),
        };
        Ok(Some(AccountInfo {
            balance,
            nonce,
            code_hash,
            code,
        }))
    }
}

impl Database for StateDb {
    type Error = anyhow::Error;

    fn basic(&mut self, address: Address) -> Result<Option<AccountInfo>, Self::Error> {
        self.account_info(&address)
    }

    fn code_by_hash(&mut self, _code_hash: B256) -> Result<Bytecode, Self::Error> {
        // code is always resolved by address through Management
        Err(anyhow!("code_by_hash not supported"))
    }

    fn storage(&mut self, address: Address, index: U256) -> Result<U256, Self::Error> {
        StateDb::storage(self, &address, index)
    }

    fn block_hash(&mut self, number: u64) -> Result<B256, Self::Error> {
        if number > u64::from(u32::MAX) {
            return Ok(B256::ZERO);
        }
        Ok(Ledger::get_block_hash(self.top(), number as u32)?.unwrap_or_default())
    }
}

impl DatabaseRef for StateDb {
    type Error = anyhow::Error;

    fn basic_ref(&self, address: Address) -> Result<Option<AccountInfo>, Self::Error> {
        self.account_info(&address)
    }

    fn code_by_hash_ref(&self, _code_hash: B256) -> Result<Bytecode, Self::Error> {
        Err(anyhow!("code_by_hash not supported"))
    }

    fn storage_ref(&self, address: Address, index: U256) -> Result<U256, Self::Error> {
        StateDb::storage(self, &address, index)
    }

    fn block_hash_ref(&self, number: u64) -> Result<B256, Self::Error> {
        if number > u64::from(u32::MAX) {
            return Ok(B256::ZERO);
        }
        Ok(Ledger::get_block_hash(self.top(), number as u32)?.unwrap_or_default())
    }
}
