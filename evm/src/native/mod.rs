// Native contracts
//
// Precompiled contracts at fixed addresses, dispatched through the same
// ABI surface as user contracts. Each native declares its interface with
// a `sol!` block, routes on the four-byte selector and reads and writes
// chain state through the DAO handed in via the interop context.
// Administrative methods demand the committee's consensus address as
// caller.

use crate::interop::InteropContext;
use alloy_primitives::{Address, Bytes, B256};
use anyhow::{anyhow, bail, Result};
use chain::block::Block;
use chain::crypto::keccak256;
use chain::dao::Dao;
use chain::ProtocolConfiguration;

pub mod bridge;
pub mod designate;
pub mod gas;
pub mod ledger;
pub mod management;
pub mod policy;

pub use bridge::Bridge;
pub use designate::{Designate, Role};
pub use gas::Gas;
pub use ledger::Ledger;
pub use management::Management;
pub use policy::Policy;

/// Stable single-byte ids behind each native address.
pub mod ids {
    pub const MANAGEMENT: u8 = 0x01;
    pub const LEDGER: u8 = 0x02;
    pub const GAS: u8 = 0x03;
    pub const POLICY: u8 = 0x04;
    pub const DESIGNATE: u8 = 0x05;
    pub const BRIDGE: u8 = 0x06;
}

/// 20-byte address of a native: big-endian zero-padded single byte.
pub fn native_address(id: u8) -> Address {
    Address::with_last_byte(id)
}

/// Identity of a native contract as exposed to clients.
#[derive(Debug, Clone)]
pub struct ContractMeta {
    pub name: &'static str,
    pub address: Address,
    pub code_hash: B256,
    pub code: Bytes,
}

impl ContractMeta {
    fn new(name: &'static str, id: u8) -> Self {
        let address = native_address(id);
        Self {
            name,
            address,
            code_hash: keccak256(address.as_slice()),
            code: Bytes::copy_from_slice(address.as_slice()),
        }
    }
}

/// A precompiled contract wired into the execution layer.
pub trait NativeContract: Send + Sync {
    fn meta(&self) -> &ContractMeta;

    /// One-time state seeding, reachable through the `initialize()`
    /// selector exactly once.
    fn initialize(&self, dao: &Dao) -> Result<()>;

    /// Hook run for every native after a block's transactions.
    fn on_persist(&self, _dao: &Dao, _block: &Block) -> Result<()> {
        Ok(())
    }

    /// Gas demanded before dispatching `input`.
    fn required_gas(&self, input: &[u8]) -> u64;

    /// ABI-dispatch `input` and return the ABI-encoded result.
    fn run(&self, ic: &mut InteropContext<'_>, input: &[u8]) -> Result<Bytes>;
}

/// Pull the four-byte selector off calldata.
pub(crate) fn selector(input: &[u8]) -> Result<[u8; 4]> {
    if input.len() < 4 {
        bail!("input too short for method selector");
    }
    Ok([input[0], input[1], input[2], input[3]])
}

/// Fail unless the caller is the consensus address active at the
/// persisting block's height.
pub(crate) fn require_committee(ic: &InteropContext<'_>) -> Result<()> {
    let consensus = Designate::consensus_address(ic.dao(), ic.block().index())?;
    if ic.sender() != consensus {
        bail!("not authorized: caller is not the consensus address");
    }
    Ok(())
}

/// The process-local native contract set.
pub struct Contracts {
    pub management: Management,
    pub ledger: Ledger,
    pub gas: Gas,
    pub policy: Policy,
    pub designate: Designate,
    pub bridge: Bridge,
}

impl Contracts {
    pub fn new(config: &ProtocolConfiguration) -> Self {
        Self {
            management: Management::new(),
            ledger: Ledger::new(),
            gas: Gas::new(
                config.initial_gas_per_validator,
                config.standby_validators.clone(),
            ),
            policy: Policy::new(),
            designate: Designate::new(config.standby_validators.clone()),
            bridge: Bridge::new(),
        }
    }

    /// All natives in their genesis initialization order (then the two
    /// without genesis initializers).
    pub fn all(&self) -> [&dyn NativeContract; 6] {
        [
            &self.designate,
            &self.policy,
            &self.gas,
            &self.management,
            &self.ledger,
            &self.bridge,
        ]
    }

    pub fn by_address(&self, address: &Address) -> Option<&dyn NativeContract> {
        self.all()
            .into_iter()
            .find(|native| native.meta().address == *address)
    }

    pub fn by_name(&self, name: &str) -> Option<&dyn NativeContract> {
        self.all().into_iter().find(|native| native.meta().name == name)
    }

    pub fn is_native(&self, address: &Address) -> bool {
        self.by_address(address).is_some()
    }

    /// Contract identities for the `getnativecontracts` RPC.
    pub fn metadata(&self) -> Vec<ContractMeta> {
        self.all()
            .into_iter()
            .map(|native| native.meta().clone())
            .collect()
    }
}

/// Dispatch error for a selector no method table entry matches.
pub(crate) fn unknown_selector(selector: [u8; 4]) -> anyhow::Error {
    anyhow!("unknown method selector {:02x?}", selector)
}
