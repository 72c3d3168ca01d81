/// Secp256k1 public keys and the committee verification script
///
/// Keys travel as 33-byte compressed points (hex in JSON). The committee's
/// m-of-n verification script is deterministic over the sorted key set; its
/// hash160 is the consensus address authorized to call committee-only native
/// methods.

use crate::crypto::hash::hash160;
use alloy_primitives::Address;
use k256::ecdsa::VerifyingKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Compressed secp256k1 point length.
pub const PUBLIC_KEY_LENGTH: usize = 33;

// Script opcodes, kept to the handful the verification script needs.
const OP_PUSHINT_BASE: u8 = 0x50; // OP_PUSHINT_BASE + n pushes small int n
const OP_PUSHBYTES33: u8 = 0x21;
const OP_CHECKMULTISIG: u8 = 0xae;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid public key encoding")]
    InvalidEncoding,
    #[error("invalid key count for multi-signature script: {0}")]
    InvalidKeyCount(usize),
}

/// A compressed secp256k1 public key.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublicKey([u8; PUBLIC_KEY_LENGTH]);

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != PUBLIC_KEY_LENGTH {
            return Err(KeyError::InvalidEncoding);
        }
        // Reject encodings that are not points on the curve.
        VerifyingKey::from_sec1_bytes(bytes).map_err(|_| KeyError::InvalidEncoding)?;
        let mut buf = [0u8; PUBLIC_KEY_LENGTH];
        buf.copy_from_slice(bytes);
        Ok(Self(buf))
    }

    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s).map_err(|_| KeyError::InvalidEncoding)?;
        Self::from_bytes(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.0
    }

    /// Address of the single-key verification script.
    pub fn address(&self) -> Address {
        let mut script = Vec::with_capacity(PUBLIC_KEY_LENGTH + 2);
        script.push(OP_PUSHBYTES33);
        script.extend_from_slice(&self.0);
        script.push(OP_CHECKMULTISIG);
        hash160(&script)
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.0))
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl From<&VerifyingKey> for PublicKey {
    fn from(key: &VerifyingKey) -> Self {
        let point = key.to_encoded_point(true);
        let mut buf = [0u8; PUBLIC_KEY_LENGTH];
        buf.copy_from_slice(point.as_bytes());
        Self(buf)
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// An ordered set of public keys.
pub type PublicKeys = Vec<PublicKey>;

/// Concatenate compressed encodings, the wire form for role designations.
pub fn encode_keys(keys: &[PublicKey]) -> Vec<u8> {
    let mut out = Vec::with_capacity(keys.len() * PUBLIC_KEY_LENGTH);
    for key in keys {
        out.extend_from_slice(key.as_bytes());
    }
    out
}

/// Parse a concatenation of compressed encodings.
pub fn decode_keys(data: &[u8]) -> Result<PublicKeys, KeyError> {
    if data.len() % PUBLIC_KEY_LENGTH != 0 {
        return Err(KeyError::InvalidEncoding);
    }
    data.chunks(PUBLIC_KEY_LENGTH)
        .map(PublicKey::from_bytes)
        .collect()
}

/// Build the m-of-n multi-signature verification script over `keys`.
///
/// Keys are sorted by compressed encoding so every node derives the same
/// script for the same set. m and n are encoded as small-int pushes, which
/// caps the committee at 16 signers.
pub fn create_multisig_script(m: usize, keys: &[PublicKey]) -> Result<Vec<u8>, KeyError> {
    let n = keys.len();
    if n == 0 || n > 16 || m == 0 || m > n {
        return Err(KeyError::InvalidKeyCount(n));
    }
    let mut sorted: Vec<&PublicKey> = keys.iter().collect();
    sorted.sort();
    let mut script = Vec::with_capacity(2 + n * (PUBLIC_KEY_LENGTH + 1) + 1);
    script.push(OP_PUSHINT_BASE + m as u8);
    for key in sorted {
        script.push(OP_PUSHBYTES33);
        script.extend_from_slice(key.as_bytes());
    }
    script.push(OP_PUSHINT_BASE + n as u8);
    script.push(OP_CHECKMULTISIG);
    Ok(script)
}

/// Signature threshold for an n-validator committee: BFT majority.
pub fn default_multisig_m(n: usize) -> usize {
    n - (n.saturating_sub(1)) / 3
}

/// Consensus address of a validator set: hash160 of its default
/// m-of-n verification script.
pub fn consensus_address(validators: &[PublicKey]) -> Result<Address, KeyError> {
    let script = create_multisig_script(default_multisig_m(validators.len()), validators)?;
    Ok(hash160(&script))
}

#[cfg(test)]
mod tests {
    use super::*;
    use testutil::random_keypair;

    fn some_key() -> PublicKey {
        PublicKey::from(&random_keypair().verifying_key().clone())
    }

    #[test]
    fn test_hex_round_trip() {
        let key = some_key();
        let restored = PublicKey::from_hex(&key.to_string()).unwrap();
        assert_eq!(key, restored);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(PublicKey::from_bytes(&[0u8; PUBLIC_KEY_LENGTH]).is_err());
        assert!(PublicKey::from_bytes(&[1u8; 12]).is_err());
    }

    #[test]
    fn test_encode_decode_keys() {
        let keys = vec![some_key(), some_key(), some_key()];
        let encoded = encode_keys(&keys);
        assert_eq!(encoded.len(), 3 * PUBLIC_KEY_LENGTH);
        assert_eq!(decode_keys(&encoded).unwrap(), keys);
    }

    #[test]
    fn test_multisig_script_is_order_independent() {
        let (a, b) = (some_key(), some_key());
        let s1 = create_multisig_script(2, &[a.clone(), b.clone()]).unwrap();
        let s2 = create_multisig_script(2, &[b, a]).unwrap();
        assert_eq!(s1, s2);
    }

    #[test]
    fn test_multisig_script_bounds() {
        assert!(create_multisig_script(1, &[]).is_err());
        let key = some_key();
        assert!(create_multisig_script(2, &[key]).is_err());
    }

    #[test]
    fn test_default_m() {
        assert_eq!(default_multisig_m(1), 1);
        assert_eq!(default_multisig_m(4), 3);
        assert_eq!(default_multisig_m(7), 5);
    }

    #[test]
    fn test_consensus_address_deterministic() {
        let keys = vec![some_key(), some_key()];
        assert_eq!(
            consensus_address(&keys).unwrap(),
            consensus_address(&keys).unwrap()
        );
    }
}
