// Log filters
//
// Ethereum-style log matching: a filter topic list is positional, every
// position is an OR-set, and an empty position matches anything.

use crate::types::Log;
use alloy_primitives::{Address, B256, U64};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LogFilter {
    pub from_block: U64,
    pub to_block: U64,
    pub block_hash: B256,
    pub address: Vec<Address>,
    pub topics: Vec<Vec<B256>>,
}

impl LogFilter {
    pub fn matches(&self, log: &Log) -> bool {
        if self.block_hash != B256::ZERO && log.block_hash != self.block_hash {
            return false;
        }
        let (from, to) = (self.from_block.to::<u64>(), self.to_block.to::<u64>());
        if self.block_hash == B256::ZERO && from != 0 && to != 0 {
            let number = u64::from(log.block_number);
            if number < from || number > to {
                return false;
            }
        }
        if !self.address.is_empty() && !self.address.contains(&log.address) {
            return false;
        }
        if self.topics.len() > log.topics.len() {
            return false;
        }
        self.topics
            .iter()
            .zip(log.topics.iter())
            .all(|(wanted, topic)| wanted.is_empty() || wanted.contains(topic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testutil::{random_address, random_hash};

    fn log_with_topics(topics: Vec<B256>) -> Log {
        Log {
            address: random_address(),
            topics,
            block_number: 5,
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = LogFilter::default();
        assert!(filter.matches(&log_with_topics(vec![random_hash()])));
        assert!(filter.matches(&log_with_topics(Vec::new())));
    }

    #[test]
    fn test_block_range() {
        let filter = LogFilter {
            from_block: U64::from(4),
            to_block: U64::from(6),
            ..Default::default()
        };
        assert!(filter.matches(&log_with_topics(Vec::new())));

        let out_of_range = LogFilter {
            from_block: U64::from(6),
            to_block: U64::from(9),
            ..Default::default()
        };
        assert!(!out_of_range.matches(&log_with_topics(Vec::new())));
    }

    #[test]
    fn test_block_hash_pins_the_block() {
        let hash = random_hash();
        let filter = LogFilter {
            block_hash: hash,
            ..Default::default()
        };
        let mut log = log_with_topics(Vec::new());
        assert!(!filter.matches(&log));
        log.block_hash = hash;
        assert!(filter.matches(&log));
    }

    #[test]
    fn test_address_set() {
        let address = random_address();
        let filter = LogFilter {
            address: vec![address, random_address()],
            ..Default::default()
        };
        let mut log = log_with_topics(Vec::new());
        assert!(!filter.matches(&log));
        log.address = address;
        assert!(filter.matches(&log));
    }

    #[test]
    fn test_topics_are_positional() {
        let (a, b) = (random_hash(), random_hash());
        let filter = LogFilter {
            topics: vec![vec![a]],
            ..Default::default()
        };
        assert!(filter.matches(&log_with_topics(vec![a, b])));
        // first position must hold `a`; a match elsewhere does not count
        assert!(!filter.matches(&log_with_topics(vec![b, a])));
    }

    #[test]
    fn test_empty_position_is_wildcard() {
        let (a, b) = (random_hash(), random_hash());
        let filter = LogFilter {
            topics: vec![Vec::new(), vec![b]],
            ..Default::default()
        };
        assert!(filter.matches(&log_with_topics(vec![a, b])));
        assert!(!filter.matches(&log_with_topics(vec![a, a])));
    }

    #[test]
    fn test_filter_longer_than_log_topics_never_matches() {
        let filter = LogFilter {
            topics: vec![Vec::new(), Vec::new()],
            ..Default::default()
        };
        assert!(!filter.matches(&log_with_topics(vec![random_hash()])));
    }

    #[test]
    fn test_json_field_names() {
        let filter: LogFilter = serde_json::from_str(
            r#"{"fromBlock":"0x1","toBlock":"0xa","address":[],"topics":[]}"#,
        )
        .unwrap();
        assert_eq!(filter.from_block, U64::from(1));
        assert_eq!(filter.to_block, U64::from(10));
    }
}
