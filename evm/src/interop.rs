// Interop context
//
// The execution environment a native contract sees for one transaction:
// the DAO layer it may write, the caller, the attached value, the block
// being persisted and the log sink.

use crate::types::Log;
use alloy_primitives::{Address, U256};
use chain::block::Block;
use chain::dao::Dao;
use chain::transaction::Transaction;

pub struct InteropContext<'a> {
    dao: &'a Dao,
    sender: Address,
    value: U256,
    block: &'a Block,
    container: Option<&'a Transaction>,
    logs: Vec<Log>,
}

impl<'a> InteropContext<'a> {
    pub fn new(dao: &'a Dao, sender: Address, value: U256, block: &'a Block) -> Self {
        Self {
            dao,
            sender,
            value,
            block,
            container: None,
            logs: Vec::new(),
        }
    }

    /// Attach the transaction being executed.
    pub fn with_container(mut self, tx: &'a Transaction) -> Self {
        self.container = Some(tx);
        self
    }

    pub fn dao(&self) -> &Dao {
        self.dao
    }

    /// Caller of the native contract.
    pub fn sender(&self) -> Address {
        self.sender
    }

    pub fn value(&self) -> U256 {
        self.value
    }

    pub fn block(&self) -> &Block {
        self.block
    }

    pub fn container(&self) -> Option<&Transaction> {
        self.container
    }

    pub fn log(&mut self, log: Log) {
        self.logs.push(log);
    }

    pub fn logs(&self) -> &[Log] {
        &self.logs
    }

    pub fn take_logs(&mut self) -> Vec<Log> {
        std::mem::take(&mut self.logs)
    }
}
