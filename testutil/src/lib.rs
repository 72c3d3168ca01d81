/// Shared test-data generators

pub mod generators;

pub use generators::{random_address, random_bytes, random_hash, random_keypair};
