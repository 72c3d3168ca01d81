// Protocol Configuration
//
// Static parameters of a network deployment

use crate::crypto::keys::PublicKey;
use serde::Deserialize;

/// Default mempool capacity when the configuration does not set one.
pub const DEFAULT_MEMPOOL_CAPACITY: usize = 50_000;

/// Protocol-level configuration shared by every node of a network.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProtocolConfiguration {
    /// Chain id transactions must be bound to
    pub chain_id: u64,
    /// Validator set active before any designation takes effect
    pub standby_validators: Vec<PublicKey>,
    /// GAS granted to each standby validator at genesis, in whole tokens
    pub initial_gas_per_validator: u64,
    /// Mempool capacity in transactions
    pub mem_pool_size: usize,
    /// Blocks after which a pooled transaction is rebroadcast (0 disables)
    pub resend_threshold: u32,
    /// Whether mempool event subscriptions are wired up
    pub mem_pool_subscriptions: bool,
}

impl Default for ProtocolConfiguration {
    fn default() -> Self {
        Self {
            chain_id: 1,
            standby_validators: Vec::new(),
            initial_gas_per_validator: 0,
            mem_pool_size: DEFAULT_MEMPOOL_CAPACITY,
            resend_threshold: 0,
            mem_pool_subscriptions: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = ProtocolConfiguration::default();
        assert_eq!(cfg.chain_id, 1);
        assert_eq!(cfg.mem_pool_size, DEFAULT_MEMPOOL_CAPACITY);
        assert!(cfg.standby_validators.is_empty());
    }

    #[test]
    fn test_deserialize_partial() {
        let cfg: ProtocolConfiguration =
            serde_json::from_str(r#"{"chainId": 53, "memPoolSize": 16}"#).unwrap();
        assert_eq!(cfg.chain_id, 53);
        assert_eq!(cfg.mem_pool_size, 16);
        assert_eq!(cfg.resend_threshold, 0);
    }
}
