// Memory pool
//
// Priority-ordered, capacity-bounded pool of unconfirmed transactions.
// Entries keep per-sender nonce continuity, are admitted against the
// sender's on-chain balance and the aggregate cost of everything it already
// has pooled, and may replace a same-nonce predecessor only at a strictly
// higher gas price. One readers-writer lock guards every index; event
// sends happen under it on purpose so subscription back-pressure surfaces
// as pool contention.

pub mod event;

pub use event::{Event, EventType};

use crate::transaction::Transaction;
use alloy_primitives::{Address, Bytes, B256, U256};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PoolError {
    /// Sender cannot pay for the transaction by itself.
    #[error("insufficient funds")]
    InsufficientFunds,
    /// Sender cannot pay for this transaction on top of everything it
    /// already has in the pool.
    #[error("conflicts: insufficient funds for all pooled tx")]
    Conflict,
    #[error("already in the memory pool")]
    Duplicate,
    #[error("out of memory")]
    OutOfMemory,
    /// Same sender and nonce already pooled at an equal or higher gas price.
    #[error("conflicts with memory pool due to nonce")]
    ConflictsNonce,
}

/// Fee policy and balances at the current chain tip, supplied by the
/// blockchain.
pub trait Feer {
    fn fee_per_byte(&self) -> u64;
    fn gas_price(&self) -> U256;
    fn utility_token_balance(&self, address: &Address) -> U256;
    fn block_height(&self) -> u32;
}

type ResendFn = Arc<dyn Fn(Arc<Transaction>, Option<Bytes>) + Send + Sync>;

#[derive(Clone)]
struct PoolItem {
    tx: Arc<Transaction>,
    /// Chain height when the item was admitted, for resend scheduling.
    block_stamp: u32,
    data: Option<Bytes>,
    /// Effective gas price, possibly boosted to the predecessor nonce's
    /// priority so a sender's sequence never reorders against itself.
    priority: U256,
}

impl PoolItem {
    /// Total order over pool entries, ascending from least prioritized:
    /// priority first, then lower nonce ranks higher, hash as the final
    /// deterministic tie-break.
    fn cmp_order(&self, other: &PoolItem) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.tx.nonce().cmp(&self.tx.nonce()))
            .then_with(|| self.tx.hash().cmp(&other.tx.hash()))
    }
}

/// Sender's on-chain balance and the summed cost of its pooled entries.
#[derive(Clone, Default)]
struct SenderFee {
    balance: U256,
    fee_sum: U256,
}

fn check_balance(tx: &Transaction, fee: &SenderFee) -> Result<U256, PoolError> {
    let cost = tx.cost();
    if fee.balance < cost {
        return Err(PoolError::InsufficientFunds);
    }
    let total = cost.checked_add(fee.fee_sum).unwrap_or(U256::MAX);
    if fee.balance < total {
        return Err(PoolError::Conflict);
    }
    Ok(total)
}

struct PoolInner {
    verified_map: HashMap<B256, Arc<Transaction>>,
    /// Sorted ascending under `PoolItem::cmp_order`; index 0 is the first
    /// eviction candidate.
    verified_txes: Vec<PoolItem>,
    fees: HashMap<Address, SenderFee>,
    pending_nonces: HashMap<Address, u64>,
    db_nonces: HashMap<Address, u64>,
    sender_map: HashMap<Address, HashMap<u64, PoolItem>>,

    fee_per_byte: u64,
    gas_price: U256,

    resend_threshold: u32,
    resend_fn: Option<ResendFn>,

    subscribers: Vec<(u64, SyncSender<Event>)>,
    next_subscriber: u64,
}

impl PoolInner {
    fn emit(&mut self, event: Event, subs_on: bool) {
        if !subs_on {
            return;
        }
        // Dropped receivers unsubscribe implicitly; live ones block us
        // until they take the event.
        self.subscribers
            .retain(|(_, sender)| sender.send(event.clone()).is_ok());
    }

    fn sender_item(&self, sender: &Address, nonce: u64) -> Option<&PoolItem> {
        self.sender_map.get(sender).and_then(|m| m.get(&nonce))
    }

    fn try_add_senders_fee(&mut self, tx: &Transaction, feer: &dyn Feer, need_check: bool) -> bool {
        let payer = tx.from();
        let mut fee = match self.fees.get(&payer) {
            Some(fee) => fee.clone(),
            None => SenderFee {
                balance: feer.utility_token_balance(&payer),
                fee_sum: U256::ZERO,
            },
        };
        if need_check {
            match check_balance(tx, &fee) {
                Ok(new_sum) => fee.fee_sum = new_sum,
                Err(_) => return false,
            }
        } else {
            fee.fee_sum = fee.fee_sum.checked_add(tx.cost()).unwrap_or(U256::MAX);
        }
        self.fees.insert(payer, fee);
        true
    }

    /// Checks a would-be entry against the pool, returning the same-nonce
    /// transaction it replaces, if any. The balance check runs against the
    /// fee sum as it would look after that replacement.
    fn check_tx_conflicts(
        &self,
        tx: &Transaction,
        feer: &dyn Feer,
    ) -> Result<Option<Arc<Transaction>>, PoolError> {
        let payer = tx.from();
        let mut expected = match self.fees.get(&payer) {
            Some(fee) => fee.clone(),
            None => SenderFee {
                balance: feer.utility_token_balance(&payer),
                fee_sum: U256::ZERO,
            },
        };
        let mut conflict = None;
        if let Some(existing) = self.sender_item(&payer, tx.nonce()) {
            if existing.tx.gas_price() < tx.gas_price() {
                expected.fee_sum = expected.fee_sum.saturating_sub(existing.tx.cost());
                conflict = Some(existing.tx.clone());
            } else {
                return Err(PoolError::ConflictsNonce);
            }
        }
        check_balance(tx, &expected)?;
        Ok(conflict)
    }

    /// Remove by transaction identity without touching the nonce counters.
    /// Callers are expected to hand in pooled transactions; a miss is
    /// reported and ignored.
    fn remove_internal(&mut self, tx: &Transaction, subs_on: bool) -> bool {
        let item = match self.sender_item(&tx.from(), tx.nonce()) {
            Some(item) => item.clone(),
            None => {
                warn!(hash = %tx.hash(), "mempool: remove of transaction not in pool");
                return false;
            }
        };
        match self
            .verified_txes
            .binary_search_by(|probe| probe.cmp_order(&item))
        {
            Ok(index) => {
                self.remove_item_by_index(index, subs_on);
                true
            }
            Err(_) => {
                warn!(hash = %tx.hash(), "mempool: pooled transaction missing from sorted set");
                false
            }
        }
    }

    /// Remove the entry at `index`, releasing every index slot and the
    /// sender's fee share. Nonce counters are the caller's business.
    fn remove_item_by_index(&mut self, index: usize, subs_on: bool) {
        let item = self.verified_txes.remove(index);
        let payer = item.tx.from();
        self.verified_map.remove(&item.tx.hash());
        if let Some(map) = self.sender_map.get_mut(&payer) {
            map.remove(&item.tx.nonce());
        }
        if let Some(fee) = self.fees.get_mut(&payer) {
            fee.fee_sum = fee.fee_sum.saturating_sub(item.tx.cost());
        }
        self.emit(
            Event {
                kind: EventType::TransactionRemoved,
                tx: item.tx.clone(),
                data: item.data.clone(),
            },
            subs_on,
        );
    }

    /// Update cached policy from the feer; true when a floor went up.
    fn load_policy(&mut self, feer: &dyn Feer) -> bool {
        let mut changed = false;
        let fee_per_byte = feer.fee_per_byte();
        if fee_per_byte > self.fee_per_byte {
            self.fee_per_byte = fee_per_byte;
            changed = true;
        }
        let gas_price = feer.gas_price();
        if gas_price > self.gas_price {
            self.gas_price = gas_price;
            changed = true;
        }
        changed
    }

    fn check_policy(&self, tx: &Transaction, policy_changed: bool) -> bool {
        !policy_changed
            || (tx.fee_per_byte() >= self.fee_per_byte && tx.gas_price() >= self.gas_price)
    }

    fn nonce_continuous(&self, tx: &Transaction) -> bool {
        let db_nonce = self.db_nonces.get(&tx.from()).copied().unwrap_or(0);
        if tx.nonce() < db_nonce {
            return false;
        }
        (db_nonce..tx.nonce()).all(|nonce| self.sender_item(&tx.from(), nonce).is_some())
    }
}

/// The unconfirmed transaction pool.
pub struct Pool {
    inner: RwLock<PoolInner>,
    capacity: usize,
    subscriptions_enabled: bool,
    subscriptions_on: AtomicBool,
}

impl Pool {
    pub fn new(capacity: usize, enable_subscriptions: bool) -> Self {
        Self {
            inner: RwLock::new(PoolInner {
                verified_map: HashMap::with_capacity(capacity),
                verified_txes: Vec::with_capacity(capacity),
                fees: HashMap::new(),
                pending_nonces: HashMap::with_capacity(capacity / 4),
                db_nonces: HashMap::with_capacity(capacity / 4),
                sender_map: HashMap::with_capacity(capacity / 4),
                fee_per_byte: 0,
                gas_price: U256::ZERO,
                resend_threshold: 0,
                resend_fn: None,
                subscribers: Vec::new(),
                next_subscriber: 0,
            }),
            capacity,
            subscriptions_enabled: enable_subscriptions,
            subscriptions_on: AtomicBool::new(false),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn count(&self) -> usize {
        self.inner.read().unwrap().verified_txes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn contains_key(&self, hash: &B256) -> bool {
        self.inner.read().unwrap().verified_map.contains_key(hash)
    }

    pub fn contains_sender_nonce(&self, sender: &Address, nonce: u64) -> bool {
        self.inner.read().unwrap().sender_item(sender, nonce).is_some()
    }

    /// The pooled transaction with `hash`, if any.
    pub fn try_get_value(&self, hash: &B256) -> Option<Arc<Transaction>> {
        self.inner.read().unwrap().verified_map.get(hash).cloned()
    }

    /// Attachment data of the pooled transaction with `hash`; outer `None`
    /// means the transaction is not pooled.
    pub fn try_get_data(&self, hash: &B256) -> Option<Option<Bytes>> {
        let inner = self.inner.read().unwrap();
        let tx = inner.verified_map.get(hash)?;
        inner
            .sender_item(&tx.from(), tx.nonce())
            .map(|item| item.data.clone())
    }

    /// Pooled transactions, most prioritized first.
    pub fn get_verified_transactions(&self) -> Vec<Arc<Transaction>> {
        let inner = self.inner.read().unwrap();
        inner
            .verified_txes
            .iter()
            .rev()
            .map(|item| item.tx.clone())
            .collect()
    }

    /// Try to admit `tx`. See the module docs for the admission rules.
    pub fn add(&self, tx: Arc<Transaction>, feer: &dyn Feer) -> Result<(), PoolError> {
        self.add_with_data(tx, feer, None)
    }

    pub fn add_with_data(
        &self,
        tx: Arc<Transaction>,
        feer: &dyn Feer,
        data: Option<Bytes>,
    ) -> Result<(), PoolError> {
        let mut item = PoolItem {
            tx: tx.clone(),
            block_stamp: feer.block_height(),
            data,
            priority: tx.gas_price(),
        };
        let subs_on = self.subscriptions_on.load(AtomicOrdering::Acquire);
        let mut inner = self.inner.write().unwrap();

        if inner.verified_map.contains_key(&tx.hash()) {
            return Err(PoolError::Duplicate);
        }
        let conflict = inner.check_tx_conflicts(&tx, feer)?;
        if let Some(replaced) = &conflict {
            inner.remove_internal(replaced, subs_on);
        }

        // Inherit the predecessor nonce's priority when it is higher, so a
        // cheap successor cannot sink below its own prerequisites.
        if let Some(previous_nonce) = tx.nonce().checked_sub(1) {
            if let Some(pre) = inner.sender_item(&tx.from(), previous_nonce) {
                if pre.priority > item.priority {
                    item.priority = pre.priority;
                }
            }
        }

        let mut index = inner
            .verified_txes
            .partition_point(|entry| entry.cmp_order(&item) == Ordering::Less);

        if inner.verified_txes.len() == self.capacity {
            // Below the current minimum: nothing to evict for it.
            if index == 0 {
                return Err(PoolError::OutOfMemory);
            }
            let unlucky_sender = inner.verified_txes[0].tx.from();
            inner.remove_item_by_index(0, subs_on);
            if let Some(pending) = inner.pending_nonces.get_mut(&unlucky_sender) {
                *pending = pending.saturating_sub(1);
            }
            if inner
                .sender_map
                .get(&unlucky_sender)
                .map_or(true, |map| map.is_empty())
            {
                inner.pending_nonces.remove(&unlucky_sender);
            }
            index -= 1;
        }

        inner.verified_txes.insert(index, item.clone());
        inner.verified_map.insert(tx.hash(), tx.clone());
        inner
            .sender_map
            .entry(tx.from())
            .or_default()
            .insert(tx.nonce(), item.clone());
        // Only a genuinely new entry advances the expected nonce.
        if conflict.is_none() {
            inner.pending_nonces.insert(tx.from(), tx.nonce() + 1);
        }
        // Balance was already checked in check_tx_conflicts.
        inner.try_add_senders_fee(&tx, feer, false);
        inner.emit(
            Event {
                kind: EventType::TransactionAdded,
                tx,
                data: item.data,
            },
            subs_on,
        );
        Ok(())
    }

    /// Remove a pooled transaction by hash, leaving the nonce counters to a
    /// following `refresh_nonce`. Returns whether anything was removed.
    pub fn remove(&self, hash: &B256) -> bool {
        let subs_on = self.subscriptions_on.load(AtomicOrdering::Acquire);
        let mut inner = self.inner.write().unwrap();
        match inner.verified_map.get(hash).cloned() {
            Some(tx) => inner.remove_internal(&tx, subs_on),
            None => false,
        }
    }

    pub fn set_db_nonce(&self, sender: Address, db_nonce: u64) {
        self.inner.write().unwrap().db_nonces.insert(sender, db_nonce);
    }

    pub fn get_db_nonce(&self, sender: &Address) -> u64 {
        self.inner
            .read()
            .unwrap()
            .db_nonces
            .get(sender)
            .copied()
            .unwrap_or(0)
    }

    /// Next nonce the pool expects from `sender`.
    pub fn pending_nonce(&self, sender: &Address) -> u64 {
        self.inner
            .read()
            .unwrap()
            .pending_nonces
            .get(sender)
            .copied()
            .unwrap_or(0)
    }

    /// Whether every nonce from the sender's committed nonce up to `tx` is
    /// pooled, i.e. the transaction is currently executable.
    pub fn check_nonce_continue(&self, tx: &Transaction) -> bool {
        self.inner.read().unwrap().nonce_continuous(tx)
    }

    /// Re-anchor a sender's nonce tracking after a block commit: adopt the
    /// committed nonce, find the first gap, and drop entries outside
    /// [dbNonce, pendingNonce].
    pub fn refresh_nonce(&self, sender: Address, db_nonce: u64) {
        let subs_on = self.subscriptions_on.load(AtomicOrdering::Acquire);
        let mut inner = self.inner.write().unwrap();

        if inner.sender_map.get(&sender).map_or(true, |m| m.is_empty()) {
            inner.sender_map.remove(&sender);
            inner.db_nonces.remove(&sender);
            inner.pending_nonces.remove(&sender);
            return;
        }

        inner.db_nonces.insert(sender, db_nonce);

        let pending = inner.pending_nonces.get(&sender).copied().unwrap_or(0);
        let mut new_pending = pending;
        for nonce in db_nonce..pending {
            if inner.sender_item(&sender, nonce).is_none() {
                new_pending = nonce;
                break;
            }
        }
        inner.pending_nonces.insert(sender, new_pending);

        let discontinuous: Vec<Arc<Transaction>> = inner.sender_map[&sender]
            .iter()
            .filter(|(nonce, _)| **nonce < db_nonce || **nonce > new_pending)
            .map(|(_, item)| item.tx.clone())
            .collect();
        for tx in discontinuous {
            inner.remove_internal(&tx, subs_on);
        }

        if inner.sender_map.get(&sender).map_or(true, |m| m.is_empty()) {
            inner.sender_map.remove(&sender);
            inner.db_nonces.remove(&sender);
            inner.pending_nonces.remove(&sender);
        }
    }

    /// Re-validate the whole pool after a block: keep entries passing
    /// `is_ok`, the (possibly raised) fee policy and a fresh balance check,
    /// rebuild the fee map in the same pass, and schedule rebroadcast of
    /// entries whose age hits a power-of-two multiple of the resend
    /// threshold. Returns the senders that lost entries, for `refresh_nonce`.
    pub fn remove_stale(
        &self,
        is_ok: impl Fn(&Transaction) -> bool,
        feer: &dyn Feer,
    ) -> HashSet<Address> {
        let subs_on = self.subscriptions_on.load(AtomicOrdering::Acquire);
        let mut inner = self.inner.write().unwrap();
        let policy_changed = inner.load_policy(feer);
        let height = feer.block_height();

        let previous = std::mem::take(&mut inner.verified_txes);
        inner.fees = HashMap::new();
        let mut kept = Vec::with_capacity(previous.len());
        let mut stale_items = Vec::new();
        let mut senders_to_refresh = HashSet::new();

        for item in previous {
            let keep = is_ok(&item.tx)
                && inner.check_policy(&item.tx, policy_changed)
                && inner.try_add_senders_fee(&item.tx, feer, true);
            if keep {
                if inner.resend_threshold != 0 {
                    // Rebroadcast at threshold, 2x, 4x, ... after admission.
                    let age = height.saturating_sub(item.block_stamp);
                    if age % inner.resend_threshold == 0
                        && (age / inner.resend_threshold).count_ones() == 1
                    {
                        stale_items.push(item.clone());
                    }
                }
                kept.push(item);
            } else {
                inner.verified_map.remove(&item.tx.hash());
                if let Some(map) = inner.sender_map.get_mut(&item.tx.from()) {
                    map.remove(&item.tx.nonce());
                }
                senders_to_refresh.insert(item.tx.from());
                inner.emit(
                    Event {
                        kind: EventType::TransactionRemoved,
                        tx: item.tx.clone(),
                        data: item.data.clone(),
                    },
                    subs_on,
                );
            }
        }
        inner.verified_txes = kept;

        if !stale_items.is_empty() {
            if let Some(resend) = inner.resend_fn.clone() {
                // Fired off-lock; the callback owns its own pacing.
                std::thread::spawn(move || {
                    for item in stale_items {
                        resend(item.tx, item.data);
                    }
                });
            }
        }
        senders_to_refresh
    }

    /// Whether the sender could pay for `tx` on top of its pooled entries.
    pub fn verify(&self, tx: &Transaction, feer: &dyn Feer) -> bool {
        self.inner
            .read()
            .unwrap()
            .check_tx_conflicts(tx, feer)
            .is_ok()
    }

    /// Configure rebroadcast of long-pooled transactions.
    pub fn set_resend_threshold(
        &self,
        threshold: u32,
        resend: impl Fn(Arc<Transaction>, Option<Bytes>) + Send + Sync + 'static,
    ) {
        let mut inner = self.inner.write().unwrap();
        inner.resend_threshold = threshold;
        inner.resend_fn = Some(Arc::new(resend));
    }

    /// Register an event subscriber. Events flow only while subscriptions
    /// are running; the unbuffered channel makes a slow subscriber block
    /// pool mutation by design.
    pub fn subscribe(&self) -> (u64, Receiver<Event>) {
        let (sender, receiver) = sync_channel(0);
        let mut inner = self.inner.write().unwrap();
        let id = inner.next_subscriber;
        inner.next_subscriber += 1;
        inner.subscribers.push((id, sender));
        (id, receiver)
    }

    pub fn unsubscribe(&self, id: u64) {
        self.inner
            .write()
            .unwrap()
            .subscribers
            .retain(|(subscriber, _)| *subscriber != id);
    }

    pub fn run_subscriptions(&self) {
        if self.subscriptions_enabled {
            self.subscriptions_on.store(true, AtomicOrdering::Release);
        }
    }

    pub fn stop_subscriptions(&self) {
        self.subscriptions_on.store(false, AtomicOrdering::Release);
    }

    #[cfg(test)]
    fn priorities(&self) -> Vec<U256> {
        self.inner
            .read()
            .unwrap()
            .verified_txes
            .iter()
            .map(|item| item.priority)
            .collect()
    }

    #[cfg(test)]
    fn fee_sum_of(&self, sender: &Address) -> U256 {
        self.inner
            .read()
            .unwrap()
            .fees
            .get(sender)
            .map(|fee| fee.fee_sum)
            .unwrap_or(U256::ZERO)
    }

    #[cfg(test)]
    fn assert_sorted(&self) {
        let inner = self.inner.read().unwrap();
        for pair in inner.verified_txes.windows(2) {
            assert_ne!(
                pair[0].cmp_order(&pair[1]),
                Ordering::Greater,
                "pool order violated"
            );
        }
    }
}
