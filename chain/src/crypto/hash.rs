/// Hash primitives used across the chain core
///
/// Keccak-256 for everything Ethereum-interop (transaction hashes, ABI
/// selectors, contract code hashes), SHA-256 for state root records, and
/// hash160 (RIPEMD-160 over SHA-256) for verification-script addresses.

use alloy_primitives::{Address, B256};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Keccak-256 digest.
pub fn keccak256(data: impl AsRef<[u8]>) -> B256 {
    alloy_primitives::keccak256(data)
}

/// SHA-256 digest.
pub fn sha256(data: impl AsRef<[u8]>) -> B256 {
    let mut hasher = Sha256::new();
    hasher.update(data.as_ref());
    B256::from_slice(&hasher.finalize())
}

/// RIPEMD-160 over SHA-256, producing a 20-byte script address.
pub fn hash160(data: impl AsRef<[u8]>) -> Address {
    let sha = sha256(data);
    let mut hasher = Ripemd160::new();
    hasher.update(sha.as_slice());
    Address::from_slice(&hasher.finalize())
}
