/// Test data generators

use alloy_primitives::{Address, B256};
use k256::ecdsa::SigningKey;
use rand::Rng;

/// Generate random bytes
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen()).collect()
}

/// Generate a random 20-byte address
pub fn random_address() -> Address {
    Address::from_slice(&random_bytes(20))
}

/// Generate a random 32-byte hash
pub fn random_hash() -> B256 {
    B256::from_slice(&random_bytes(32))
}

/// Generate a random secp256k1 signing key
pub fn random_keypair() -> SigningKey {
    SigningKey::random(&mut rand::thread_rng())
}
