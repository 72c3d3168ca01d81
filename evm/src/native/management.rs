use crate::interop::InteropContext;
use crate::native::{ids, selector, unknown_selector, ContractMeta, NativeContract};
use alloy_primitives::{Address, Bytes, B256};
use alloy_sol_types::{sol, SolCall, SolValue};
use anyhow::{anyhow, Result};
use chain::crypto::keccak256;
use chain::dao::Dao;
use serde::{Deserialize, Serialize};

sol! {
    /// Deployed-contract registry
    interface IManagement {
        function initialize() external;
        function getCode(address account) external view returns (bytes);
    }
}

const PREFIX_CONTRACT: u8 = 0x08;

const READ_GAS: u64 = 700;

/// Stored metadata of a deployed contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractState {
    pub address: Address,
    pub code_hash: B256,
    pub code: Bytes,
}

/// The Management native: deployed contract state, written by the EVM's
/// create paths and read back for code resolution.
pub struct Management {
    meta: ContractMeta,
}

impl Management {
    pub fn new() -> Self {
        Self {
            meta: ContractMeta::new("Management", ids::MANAGEMENT),
        }
    }

    pub fn address() -> Address {
        super::native_address(ids::MANAGEMENT)
    }

    fn contract_key(account: &Address) -> Vec<u8> {
        let mut key = Vec::with_capacity(1 + Address::len_bytes());
        key.push(PREFIX_CONTRACT);
        key.extend_from_slice(account.as_slice());
        key
    }

    /// Persist `code` as the contract at `account`.
    pub fn deploy(dao: &Dao, account: &Address, code: Bytes) -> Result<ContractState> {
        let state = ContractState {
            address: *account,
            code_hash: keccak256(&code),
            code,
        };
        let raw = bincode::serialize(&state)
            .map_err(|e| anyhow!("serialize contract state: {e}"))?;
        dao.put_storage_item(&Self::address(), &Self::contract_key(account), &raw)?;
        Ok(state)
    }

    pub fn get_contract(dao: &Dao, account: &Address) -> Result<Option<ContractState>> {
        match dao.get_storage_item(&Self::address(), &Self::contract_key(account))? {
            Some(raw) => Ok(Some(
                bincode::deserialize(&raw)
                    .map_err(|e| anyhow!("corrupt contract state for {account}: {e}"))?,
            )),
            None => Ok(None),
        }
    }

    pub fn get_code(dao: &Dao, account: &Address) -> Result<Option<Bytes>> {
        Ok(Self::get_contract(dao, account)?.map(|state| state.code))
    }

    pub fn get_code_hash(dao: &Dao, account: &Address) -> Result<Option<B256>> {
        Ok(Self::get_contract(dao, account)?.map(|state| state.code_hash))
    }

    /// Remove a contract, the selfdestruct path.
    pub fn destroy(dao: &Dao, account: &Address) -> Result<()> {
        dao.delete_storage_item(&Self::address(), &Self::contract_key(account))?;
        Ok(())
    }
}

impl Default for Management {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeContract for Management {
    fn meta(&self) -> &ContractMeta {
        &self.meta
    }

    fn initialize(&self, _dao: &Dao) -> Result<()> {
        // nothing to seed; deployments create all state
        Ok(())
    }

    fn required_gas(&self, _input: &[u8]) -> u64 {
        READ_GAS
    }

    fn run(&self, ic: &mut InteropContext<'_>, input: &[u8]) -> Result<Bytes> {
        let sel = selector(input)?;
        match sel {
            s if s == IManagement::initializeCall::SELECTOR => {
                self.initialize(ic.dao())?;
                Ok(Bytes::new())
            }
            s if s == IManagement::getCodeCall::SELECTOR => {
                let call = IManagement::getCodeCall::abi_decode(input, true)?;
                let code = Self::get_code(ic.dao(), &call.account)?.unwrap_or_default();
                Ok(Bytes::from(code.abi_encode()))
            }
            other => Err(unknown_selector(other)),
        }
    }
}
