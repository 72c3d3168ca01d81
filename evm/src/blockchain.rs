// Blockchain
//
// Ties the pieces together: genesis construction, block execution against
// a DAO overlay with per-transaction sub-layers, the state root chain,
// and the fee/balance surface the mempool polls. Consensus, networking
// and the RPC server sit on top of this type as collaborators.

use crate::interop::InteropContext;
use crate::native::policy::{DEFAULT_FEE_PER_BYTE, DEFAULT_GAS_PRICE};
use crate::native::{
    ids, native_address, ContractMeta, Contracts, Designate, Gas, Ledger, Policy,
};
use crate::statedb::StateDb;
use crate::types::{Log, Receipt};
use alloy_primitives::{Address, Bytes, B256, U256};
use anyhow::{anyhow, bail, Context as _, Result};
use chain::block::{Block, Header};
use chain::crypto::keys::consensus_address;
use chain::crypto::{keccak256, sha256};
use chain::dao::Dao;
use chain::mempool::{Feer, Pool};
use chain::state::StateRoot;
use chain::storage::Store;
use chain::transaction::{Transaction, LEGACY_BASE_LENGTH};
use chain::ProtocolConfiguration;
use revm::primitives::{Env, ExecutionResult, Output, ResultAndState, TxKind};
use revm::Evm;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// 2016-07-15T15:08:21Z, the network's fixed genesis timestamp.
pub const GENESIS_TIMESTAMP: u64 = 1_468_595_301;
const GENESIS_NONCE: u64 = 2_083_236_893;
const BLOCK_GAS_LIMIT: u64 = 30_000_000;

pub struct Blockchain {
    store: Arc<dyn Store>,
    config: ProtocolConfiguration,
    contracts: Contracts,
    mempool: Arc<Pool>,
    height: AtomicU32,
    /// Guards block application; execution is single-threaded per block.
    apply_lock: RwLock<()>,
}

impl Blockchain {
    pub fn new(store: Arc<dyn Store>, config: ProtocolConfiguration) -> Result<Self> {
        let contracts = Contracts::new(&config);
        let mempool = Arc::new(Pool::new(
            config.mem_pool_size,
            config.mem_pool_subscriptions,
        ));
        let chain = Self {
            store,
            config,
            contracts,
            mempool,
            height: AtomicU32::new(0),
            apply_lock: RwLock::new(()),
        };
        chain.ensure_genesis()?;
        let dao = chain.dao();
        if let Some(index) = Ledger::current_index(&dao)? {
            chain.height.store(index, Ordering::SeqCst);
        }
        Ok(chain)
    }

    /// Fresh read view over committed state.
    pub fn dao(&self) -> Dao {
        Dao::new(self.store.clone())
    }

    pub fn config(&self) -> &ProtocolConfiguration {
        &self.config
    }

    pub fn contracts(&self) -> &Contracts {
        &self.contracts
    }

    pub fn mempool(&self) -> Arc<Pool> {
        self.mempool.clone()
    }

    pub fn block_height(&self) -> u32 {
        self.height.load(Ordering::SeqCst)
    }

    pub fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    fn ensure_genesis(&self) -> Result<()> {
        if Ledger::current_index(&self.dao())?.is_some() {
            return Ok(());
        }
        let genesis = genesis_block(&self.config)?;
        info!(hash = %genesis.hash(), "persisting genesis block");
        self.apply_block(&genesis)?;
        Ok(())
    }

    /// Chain-level admission: chain binding, structural validity and the
    /// blocked-account policy, then the pool's own checks.
    pub fn verify_tx(&self, tx: &Transaction) -> Result<()> {
        tx.verify(self.config.chain_id)?;
        tx.is_valid()?;
        if Policy::is_blocked(&self.dao(), &tx.from())? {
            bail!("sender account is blocked");
        }
        Ok(())
    }

    /// Admit a transaction into the mempool.
    pub fn pool_tx(&self, tx: Arc<Transaction>) -> Result<()> {
        self.verify_tx(&tx)?;
        self.mempool.add(tx, self)?;
        Ok(())
    }

    /// Assemble the next block over the current tip from `transactions`.
    pub fn new_block(&self, transactions: Vec<Transaction>) -> Result<Block> {
        let dao = self.dao();
        let tip = self.block_height();
        let index = tip + 1;
        Ok(Block {
            header: Header {
                version: 0,
                prev_hash: Ledger::get_block_hash(&dao, tip)?.unwrap_or_default(),
                timestamp: GENESIS_TIMESTAMP + u64::from(index),
                nonce: 0,
                index,
                next_consensus: Designate::consensus_address(&dao, index)?,
                witness: Default::default(),
            },
            transactions,
        })
    }

    /// Execute `block` against an overlay of committed state, run every
    /// native's OnPersist, commit atomically, extend the state root chain
    /// and reconcile the mempool.
    pub fn apply_block(&self, block: &Block) -> Result<Vec<Receipt>> {
        let _guard = self.apply_lock.write().unwrap();
        let block_dao = self.dao();

        let mut receipts = Vec::with_capacity(block.transactions.len());
        for tx in &block.transactions {
            receipts.push(self.execute_transaction(&block_dao, block, tx)?);
        }

        for native in self.contracts.all() {
            native
                .on_persist(&block_dao, block)
                .with_context(|| format!("onPersist of {}", native.meta().name))?;
        }

        Ledger::put_block_hash(&block_dao, block.index(), block.hash())?;
        Ledger::set_current_index(&block_dao, block.index())?;

        let previous = match block.index().checked_sub(1) {
            Some(parent) => Ledger::get_state_root(&block_dao, parent)?
                .map(|record| record.root)
                .unwrap_or_default(),
            None => B256::ZERO,
        };
        let root = StateRoot {
            version: 0,
            index: block.index(),
            root: digest_write_set(previous, block.index(), &block_dao),
            witness: Default::default(),
        };
        Ledger::put_state_root(&block_dao, &root)?;

        if let Err(err) = block_dao.persist() {
            // the previous committed state is still intact; nothing to
            // recover from here
            panic!("fatal: persisting block {} failed: {err}", block.index());
        }
        self.height.store(block.index(), Ordering::SeqCst);
        info!(index = block.index(), txs = block.transactions.len(), "block persisted");

        self.reconcile_mempool(block);
        Ok(receipts)
    }

    fn execute_transaction(
        &self,
        block_dao: &Dao,
        block: &Block,
        tx: &Transaction,
    ) -> Result<Receipt> {
        match tx.to().filter(|to| self.contracts.is_native(to)) {
            Some(to) => self.execute_native(block_dao, block, tx, to),
            None => self.execute_evm(block_dao, block, tx),
        }
    }

    fn execute_native(
        &self,
        block_dao: &Dao,
        block: &Block,
        tx: &Transaction,
        to: Address,
    ) -> Result<Receipt> {
        let native = self
            .contracts
            .by_address(&to)
            .ok_or_else(|| anyhow!("no native at {to}"))?;
        let tx_dao = block_dao.layer();
        let mut ic =
            InteropContext::new(&tx_dao, tx.from(), tx.value(), block).with_container(tx);
        let required = native.required_gas(tx.data());

        let mut receipt = base_receipt(block, tx);
        let outcome = if required > tx.gas() {
            Err(anyhow!("out of gas: need {required}, limit {}", tx.gas()))
        } else {
            native.run(&mut ic, tx.data())
        };
        match outcome {
            Ok(output) => {
                tx_dao.persist()?;
                receipt.status = true;
                receipt.gas_used = required;
                receipt.output = output;
                receipt.logs = stamp_logs(ic.take_logs(), block, tx);
            }
            Err(err) => {
                tx_dao.discard();
                debug!(%err, hash = %tx.hash(), native = native.meta().name, "native call reverted");
                receipt.gas_used = tx.gas();
                receipt.output = Bytes::from(err.to_string().into_bytes());
            }
        }
        // The nonce advances and gas is charged whether or not the call
        // reverted; both land outside the discarded layer.
        Ledger::set_nonce(block_dao, &tx.from(), tx.nonce() + 1)?;
        if block.index() > 0 {
            self.settle_fees(block_dao, block, tx, receipt.gas_used);
        }
        Ok(receipt)
    }

    fn execute_evm(&self, block_dao: &Dao, block: &Block, tx: &Transaction) -> Result<Receipt> {
        let mut state = StateDb::new(block_dao);
        let env = self.build_env(block, tx);
        let outcome = {
            let mut evm = Evm::builder()
                .with_db(&mut state)
                .with_env(Box::new(env))
                .build();
            evm.transact()
        };

        let mut receipt = base_receipt(block, tx);
        match outcome {
            Ok(ResultAndState { result, state: diff }) => {
                state.apply(diff)?;
                match result {
                    ExecutionResult::Success {
                        output,
                        gas_used,
                        logs,
                        ..
                    } => {
                        receipt.status = true;
                        receipt.gas_used = gas_used;
                        match output {
                            Output::Create(bytes, address) => {
                                receipt.contract_address = address;
                                receipt.output = bytes;
                            }
                            Output::Call(bytes) => receipt.output = bytes,
                        }
                        receipt.logs = stamp_logs(
                            logs.into_iter()
                                .map(|log| Log {
                                    address: log.address,
                                    topics: log.data.topics().to_vec(),
                                    data: Bytes::from(log.data.data.to_vec()),
                                    ..Default::default()
                                })
                                .collect(),
                            block,
                            tx,
                        );
                    }
                    ExecutionResult::Revert { output, gas_used } => {
                        receipt.gas_used = gas_used;
                        receipt.output = output;
                    }
                    ExecutionResult::Halt { reason, gas_used } => {
                        receipt.gas_used = gas_used;
                        receipt.output = Bytes::from(format!("halt: {reason:?}").into_bytes());
                    }
                }
                state.commit()?;
            }
            Err(err) => {
                debug!(%err, hash = %tx.hash(), "transaction rejected by the EVM");
                // invalid at execution time: the block still charges the
                // declared gas and advances the nonce
                Ledger::set_nonce(block_dao, &tx.from(), tx.nonce() + 1)?;
                if block.index() > 0 {
                    self.settle_fees(block_dao, block, tx, tx.gas());
                }
                receipt.gas_used = tx.gas();
                receipt.output = Bytes::from(err.to_string().into_bytes());
            }
        }
        Ok(receipt)
    }

    /// Move gas x price from the sender to the block's validator.
    fn settle_fees(&self, dao: &Dao, block: &Block, tx: &Transaction, gas_used: u64) {
        let fee = tx.gas_price().saturating_mul(U256::from(gas_used));
        if fee.is_zero() {
            return;
        }
        if let Err(err) = Gas::transfer(dao, &tx.from(), &block.header.next_consensus, fee) {
            warn!(%err, hash = %tx.hash(), "fee settlement failed");
        }
    }

    fn build_env(&self, block: &Block, tx: &Transaction) -> Env {
        let mut env = Env::default();
        env.cfg.chain_id = self.config.chain_id;

        env.block.number = U256::from(block.index());
        env.block.timestamp = U256::from(block.header.timestamp);
        env.block.gas_limit = U256::from(BLOCK_GAS_LIMIT);
        env.block.coinbase = block.header.next_consensus;
        // no base-fee market: the flat policy gas price is charged
        env.block.basefee = U256::ZERO;

        env.tx.caller = tx.from();
        env.tx.transact_to = match tx.to() {
            Some(to) => TxKind::Call(to),
            None => TxKind::Create,
        };
        env.tx.value = tx.value();
        env.tx.data = tx.data().clone();
        env.tx.gas_limit = tx.gas();
        env.tx.gas_price = tx.gas_price();
        env.tx.nonce = Some(tx.nonce());
        env.tx.chain_id = Some(tx.chain_id());
        env
    }

    /// Drop included and no-longer-valid entries from the pool, then
    /// re-anchor the nonce tracking of every affected sender.
    fn reconcile_mempool(&self, block: &Block) {
        let included: HashSet<B256> = block.transactions.iter().map(|tx| tx.hash()).collect();
        let chain_id = self.config.chain_id;
        let mut senders = self
            .mempool
            .remove_stale(|tx| !included.contains(&tx.hash()) && tx.verify(chain_id).is_ok(), self);
        for tx in &block.transactions {
            senders.insert(tx.from());
        }
        let dao = self.dao();
        for sender in senders {
            let nonce = Ledger::get_nonce(&dao, &sender).unwrap_or_default();
            self.mempool.refresh_nonce(sender, nonce);
        }
    }

    // -- read surface for the RPC layer -----------------------------------

    pub fn get_consensus_address(&self) -> Result<Address> {
        Designate::consensus_address(&self.dao(), self.block_height())
    }

    pub fn get_state_root(&self, index: u32) -> Result<Option<StateRoot>> {
        Ledger::get_state_root(&self.dao(), index)
    }

    pub fn get_native_contracts(&self) -> Vec<ContractMeta> {
        self.contracts.metadata()
    }

    pub fn is_blocked(&self, account: &Address) -> Result<bool> {
        Ok(Policy::is_blocked(&self.dao(), account)?)
    }

    pub fn get_nonce(&self, account: &Address) -> u64 {
        Ledger::get_nonce(&self.dao(), account).unwrap_or_default()
    }

    pub fn balance_of(&self, account: &Address) -> U256 {
        Gas::get_balance(&self.dao(), account).unwrap_or_default()
    }
}

impl Feer for Blockchain {
    fn fee_per_byte(&self) -> u64 {
        Policy::get_fee_per_byte(&self.dao()).unwrap_or_else(|err| {
            warn!(%err, "fee per byte unavailable, using default");
            DEFAULT_FEE_PER_BYTE
        })
    }

    fn gas_price(&self) -> U256 {
        Policy::get_gas_price(&self.dao()).unwrap_or_else(|err| {
            warn!(%err, "gas price unavailable, using default");
            U256::from(DEFAULT_GAS_PRICE)
        })
    }

    fn utility_token_balance(&self, address: &Address) -> U256 {
        Gas::get_balance(&self.dao(), address).unwrap_or_default()
    }

    fn block_height(&self) -> u32 {
        self.block_height()
    }
}

fn base_receipt(block: &Block, tx: &Transaction) -> Receipt {
    Receipt {
        transaction_hash: tx.hash(),
        block_hash: block.hash(),
        block_number: block.index(),
        from: tx.from(),
        to: tx.to(),
        contract_address: None,
        gas_used: 0,
        status: false,
        output: Bytes::new(),
        logs: Vec::new(),
    }
}

fn stamp_logs(mut logs: Vec<Log>, block: &Block, tx: &Transaction) -> Vec<Log> {
    for log in &mut logs {
        log.block_number = block.index();
        log.block_hash = block.hash();
        log.transaction_hash = tx.hash();
    }
    logs
}

/// Commitment over a block's write set chained onto the previous root.
fn digest_write_set(previous: B256, index: u32, dao: &Dao) -> B256 {
    let mut buf = Vec::new();
    buf.push(0u8);
    buf.extend_from_slice(&index.to_le_bytes());
    buf.extend_from_slice(previous.as_slice());
    for (key, value) in dao.write_set() {
        buf.extend_from_slice(sha256(&key).as_slice());
        match value {
            Some(value) => buf.extend_from_slice(sha256(&value).as_slice()),
            None => buf.extend_from_slice(&[0u8; 32]),
        }
    }
    sha256(&buf)
}

/// The deterministic genesis block: four synthetic transactions calling
/// `initialize()` on Designate, Policy, GAS and Management, in that order.
pub fn genesis_block(config: &ProtocolConfiguration) -> Result<Block> {
    let next_consensus = consensus_address(&config.standby_validators)?;
    let data = Bytes::copy_from_slice(&keccak256(b"initialize()")[..4]);
    let gas = (LEGACY_BASE_LENGTH as u64 + 4) * DEFAULT_FEE_PER_BYTE;
    let gas_price = U256::from(DEFAULT_GAS_PRICE);
    let issuer = native_address(ids::MANAGEMENT);

    let transactions = [ids::DESIGNATE, ids::POLICY, ids::GAS, ids::MANAGEMENT]
        .into_iter()
        .map(|id| {
            Transaction::synthetic(
                config.chain_id,
                issuer,
                Some(native_address(id)),
                gas,
                gas_price,
                data.clone(),
            )
        })
        .collect();

    Ok(Block {
        header: Header {
            version: 0,
            prev_hash: B256::ZERO,
            timestamp: GENESIS_TIMESTAMP,
            nonce: GENESIS_NONCE,
            index: 0,
            next_consensus,
            witness: Default::default(),
        },
        transactions,
    })
}
