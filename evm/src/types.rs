// Execution types
//
// Logs and receipts produced by transaction execution

use alloy_primitives::{Address, Bytes, B256};
use alloy_sol_types::SolEvent;
use serde::{Deserialize, Serialize};

/// An event emitted during execution, by a deployed contract or a native.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: u32,
    pub block_hash: B256,
    pub transaction_hash: B256,
}

impl Log {
    /// Build a log from a `sol!` event; block and transaction fields are
    /// stamped when the receipt is assembled.
    pub fn from_event(address: Address, event: &impl SolEvent) -> Self {
        let data = event.encode_log_data();
        Self {
            address,
            topics: data.topics().to_vec(),
            data: data.data,
            ..Default::default()
        }
    }
}

/// Transaction execution receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub transaction_hash: B256,
    pub block_hash: B256,
    pub block_number: u32,
    pub from: Address,
    pub to: Option<Address>,
    pub contract_address: Option<Address>,
    pub gas_used: u64,
    /// false when execution reverted; the transaction is still included
    /// and charged.
    pub status: bool,
    pub output: Bytes,
    pub logs: Vec<Log>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_sol_types::sol;

    sol! {
        event Pinged(uint64 indexed value);
    }

    #[test]
    fn test_log_from_event_sets_topics() {
        let address = Address::repeat_byte(0x04);
        let log = Log::from_event(address, &Pinged { value: 9 });
        assert_eq!(log.address, address);
        assert_eq!(log.topics.len(), 2);
        assert_eq!(log.topics[0], Pinged::SIGNATURE_HASH);
        assert!(log.data.is_empty());
    }
}
