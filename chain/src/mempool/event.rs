//! Pool event notifications.

use crate::transaction::Transaction;
use alloy_primitives::Bytes;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    TransactionAdded,
    TransactionRemoved,
}

/// A transaction entering or leaving the pool, with its attachment data.
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventType,
    pub tx: Arc<Transaction>,
    pub data: Option<Bytes>,
}
