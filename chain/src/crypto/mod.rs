pub mod hash;
pub mod keys;

pub use hash::{hash160, keccak256, sha256};
pub use keys::{PublicKey, PublicKeys};
