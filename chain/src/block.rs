// Block model
//
// Headers carry only what the mempool and the state layer consume: height,
// parent link, timestamp and the consensus address expected to sign the
// next block.

use crate::crypto::keccak256;
use crate::transaction::Transaction;
use alloy_primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};

/// Invocation/verification script pair attesting a signed artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Witness {
    pub invocation_script: Bytes,
    pub verification_script: Bytes,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    pub version: u8,
    pub prev_hash: B256,
    pub timestamp: u64,
    pub nonce: u64,
    pub index: u32,
    pub next_consensus: Address,
    pub witness: Witness,
}

impl Header {
    /// Hash over the unsigned header fields.
    pub fn hash(&self) -> B256 {
        let mut buf = Vec::with_capacity(81);
        buf.push(self.version);
        buf.extend_from_slice(self.prev_hash.as_slice());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf.extend_from_slice(&self.nonce.to_le_bytes());
        buf.extend_from_slice(&self.index.to_le_bytes());
        buf.extend_from_slice(self.next_consensus.as_slice());
        keccak256(&buf)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Block {
    pub header: Header,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn hash(&self) -> B256 {
        self.header.hash()
    }

    pub fn index(&self) -> u32 {
        self.header.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_hash_commits_to_fields() {
        let mut header = Header {
            index: 3,
            ..Default::default()
        };
        let h1 = header.hash();
        header.index = 4;
        assert_ne!(h1, header.hash());
    }

    #[test]
    fn test_witness_excluded_from_hash() {
        let mut header = Header::default();
        let h1 = header.hash();
        header.witness.invocation_script = Bytes::from(vec![1, 2, 3]);
        assert_eq!(h1, header.hash());
    }
}
