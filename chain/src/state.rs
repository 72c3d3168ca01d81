// State root records
//
// One record per block height, carrying the state root the network agrees
// on plus the committee witness over it. The hash covers only the unsigned
// part, so signing does not change identity.

use crate::block::Witness;
use crate::crypto::sha256;
use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateRoot {
    pub version: u8,
    pub index: u32,
    #[serde(rename = "roothash")]
    pub root: B256,
    pub witness: Witness,
}

impl StateRoot {
    /// Unsigned encoding: version, index (little-endian), root.
    pub fn encode_unsigned(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(37);
        buf.push(self.version);
        buf.extend_from_slice(&self.index.to_le_bytes());
        buf.extend_from_slice(self.root.as_slice());
        buf
    }

    pub fn hash(&self) -> B256 {
        sha256(self.encode_unsigned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Bytes;

    #[test]
    fn test_unsigned_layout() {
        let root = StateRoot {
            version: 1,
            index: 0x0102_0304,
            root: B256::repeat_byte(0xaa),
            witness: Witness::default(),
        };
        let encoded = root.encode_unsigned();
        assert_eq!(encoded.len(), 37);
        assert_eq!(encoded[0], 1);
        // index is little-endian
        assert_eq!(&encoded[1..5], &[0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_hash_ignores_witness() {
        let mut root = StateRoot::default();
        let h = root.hash();
        root.witness.verification_script = Bytes::from(vec![9]);
        assert_eq!(h, root.hash());
    }

    #[test]
    fn test_json_field_names() {
        let root = StateRoot::default();
        let value = serde_json::to_value(&root).unwrap();
        assert!(value.get("roothash").is_some());
    }
}
