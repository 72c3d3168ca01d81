// OpenEVM Execution Layer
//
// Native contract dispatch, the EVM-facing state adapter and block
// execution:
// - Native contracts at fixed addresses sharing state with the EVM via the DAO
// - StateDb: revm Database over stacked DAO layers with tokenized snapshots
// - Blockchain: genesis, block application, fee policy for the mempool

pub mod blockchain;
pub mod filters;
pub mod interop;
pub mod native;
pub mod statedb;
pub mod types;

// Re-exports for convenience
pub use blockchain::Blockchain;
pub use filters::LogFilter;
pub use interop::InteropContext;
pub use native::{Contracts, NativeContract};
pub use statedb::StateDb;
pub use types::{Log, Receipt};
