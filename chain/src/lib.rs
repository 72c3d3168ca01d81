// OpenEVM Chain Core
//
// The state and transaction layer of the node:
// - Byte-addressable storage backends with an overlay cache for block execution
// - DAO: (contract, key) storage items over a layered store
// - EVM transaction wrapper with chain-id binding and sender recovery
// - Priority-ordered, capacity-bounded transaction mempool

pub mod block;
pub mod config;
pub mod crypto;
pub mod dao;
pub mod mempool;
pub mod state;
pub mod storage;
pub mod transaction;

// Re-exports for convenience
pub use config::ProtocolConfiguration;
pub use dao::Dao;
pub use mempool::{Feer, Pool};
pub use storage::{MemCachedStore, MemoryStore, RocksDbStore, Store};
pub use transaction::Transaction;
