use crate::interop::InteropContext;
use crate::native::{ids, selector, unknown_selector, ContractMeta, NativeContract};
use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{sol, SolCall, SolValue};
use anyhow::{bail, Result};
use chain::crypto::keys::PublicKeys;
use chain::dao::Dao;
use tracing::info;

sol! {
    /// The native utility token paying for execution
    interface IGasToken {
        function initialize() external;
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
        function totalSupply() external view returns (uint256);
        function balanceOf(address account) external view returns (uint256);
    }
}

pub const GAS_SYMBOL: &str = "GAS";
pub const GAS_DECIMALS: u8 = 18;

const PREFIX_ACCOUNT: u8 = 0x14;
const TOTAL_SUPPLY_KEY: [u8; 1] = [0x0b];

const READ_GAS: u64 = 400;

/// The GAS native token.
pub struct Gas {
    meta: ContractMeta,
    initial_per_validator: u64,
    standby_validators: PublicKeys,
}

impl Gas {
    pub fn new(initial_per_validator: u64, standby_validators: PublicKeys) -> Self {
        Self {
            meta: ContractMeta::new("Gas", ids::GAS),
            initial_per_validator,
            standby_validators,
        }
    }

    pub fn address() -> Address {
        super::native_address(ids::GAS)
    }

    fn account_key(owner: &Address) -> Vec<u8> {
        let mut key = Vec::with_capacity(1 + Address::len_bytes());
        key.push(PREFIX_ACCOUNT);
        key.extend_from_slice(owner.as_slice());
        key
    }

    /// One whole token in wei.
    fn unit() -> U256 {
        U256::from(10).pow(U256::from(GAS_DECIMALS))
    }

    pub fn get_balance(dao: &Dao, owner: &Address) -> Result<U256> {
        match dao.get_storage_item(&Self::address(), &Self::account_key(owner))? {
            Some(raw) => Ok(U256::from_be_slice(&raw)),
            None => Ok(U256::ZERO),
        }
    }

    fn put_balance(dao: &Dao, owner: &Address, balance: U256) -> Result<()> {
        let key = Self::account_key(owner);
        if balance.is_zero() {
            // empty accounts are not kept around
            dao.delete_storage_item(&Self::address(), &key)
        } else {
            dao.put_storage_item(
                &Self::address(),
                &key,
                &balance.to_be_bytes_trimmed_vec(),
            )
        }
    }

    pub fn total_supply(dao: &Dao) -> Result<U256> {
        match dao.get_storage_item(&Self::address(), &TOTAL_SUPPLY_KEY)? {
            Some(raw) => Ok(U256::from_be_slice(&raw)),
            None => Ok(U256::ZERO),
        }
    }

    fn put_total_supply(dao: &Dao, supply: U256) -> Result<()> {
        dao.put_storage_item(
            &Self::address(),
            &TOTAL_SUPPLY_KEY,
            &supply.to_be_bytes_trimmed_vec(),
        )
    }

    /// Create `amount` wei on `owner`, growing total supply.
    pub fn mint(dao: &Dao, owner: &Address, amount: U256) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        let balance = Self::get_balance(dao, owner)?;
        Self::put_balance(
            dao,
            owner,
            balance.checked_add(amount).ok_or_else(|| {
                anyhow::anyhow!("balance overflow for {owner}")
            })?,
        )?;
        Self::put_total_supply(dao, Self::total_supply(dao)?.saturating_add(amount))
    }

    /// Destroy `amount` wei held by `owner`, shrinking total supply.
    pub fn burn(dao: &Dao, owner: &Address, amount: U256) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        let balance = Self::get_balance(dao, owner)?;
        if balance < amount {
            bail!("insufficient funds");
        }
        Self::put_balance(dao, owner, balance - amount)?;
        Self::put_total_supply(dao, Self::total_supply(dao)?.saturating_sub(amount))
    }

    /// Set an account's balance outright, as EVM state application does.
    /// Supply is untouched: EVM-level movements always net to zero.
    pub fn set_balance(dao: &Dao, owner: &Address, balance: U256) -> Result<()> {
        Self::put_balance(dao, owner, balance)
    }

    /// Move `amount` wei between accounts.
    pub fn transfer(dao: &Dao, from: &Address, to: &Address, amount: U256) -> Result<()> {
        if amount.is_zero() || from == to {
            return Ok(());
        }
        let from_balance = Self::get_balance(dao, from)?;
        if from_balance < amount {
            bail!("insufficient funds");
        }
        Self::put_balance(dao, from, from_balance - amount)?;
        let to_balance = Self::get_balance(dao, to)?;
        Self::put_balance(dao, to, to_balance.saturating_add(amount))
    }
}

impl NativeContract for Gas {
    fn meta(&self) -> &ContractMeta {
        &self.meta
    }

    /// Grant every standby validator its initial allocation.
    fn initialize(&self, dao: &Dao) -> Result<()> {
        if dao
            .get_storage_item(&Self::address(), &TOTAL_SUPPLY_KEY)?
            .is_some()
        {
            bail!("already initialized");
        }
        let grant = U256::from(self.initial_per_validator) * Self::unit();
        for validator in &self.standby_validators {
            Gas::mint(dao, &validator.address(), grant)?;
        }
        info!(
            validators = self.standby_validators.len(),
            per_validator = self.initial_per_validator,
            "gas genesis allocation"
        );
        Ok(())
    }

    fn required_gas(&self, input: &[u8]) -> u64 {
        match selector(input) {
            Ok(sel) if sel == IGasToken::initializeCall::SELECTOR => 0,
            Ok(_) => READ_GAS,
            Err(_) => 0,
        }
    }

    fn run(&self, ic: &mut InteropContext<'_>, input: &[u8]) -> Result<Bytes> {
        let sel = selector(input)?;
        match sel {
            s if s == IGasToken::initializeCall::SELECTOR => {
                self.initialize(ic.dao())?;
                Ok(Bytes::new())
            }
            s if s == IGasToken::symbolCall::SELECTOR => {
                Ok(Bytes::from(GAS_SYMBOL.to_string().abi_encode()))
            }
            s if s == IGasToken::decimalsCall::SELECTOR => {
                Ok(Bytes::from(GAS_DECIMALS.abi_encode()))
            }
            s if s == IGasToken::totalSupplyCall::SELECTOR => {
                Ok(Bytes::from(Gas::total_supply(ic.dao())?.abi_encode()))
            }
            s if s == IGasToken::balanceOfCall::SELECTOR => {
                let call = IGasToken::balanceOfCall::abi_decode(input, true)?;
                Ok(Bytes::from(
                    Gas::get_balance(ic.dao(), &call.account)?.abi_encode(),
                ))
            }
            other => Err(unknown_selector(other)),
        }
    }
}
