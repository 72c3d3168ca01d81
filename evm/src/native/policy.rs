use crate::interop::InteropContext;
use crate::native::{
    ids, require_committee, selector, unknown_selector, ContractMeta, NativeContract,
};
use crate::types::Log;
use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{sol, SolCall, SolValue};
use anyhow::{bail, Result};
use chain::dao::Dao;

sol! {
    /// Fee policy and account blocking
    interface IPolicy {
        function initialize() external;
        function setGasPrice(uint64 price) external;
        function setFeePerByte(uint64 fee) external;
        function blockAccount(address account) external;
        function unblockAccount(address account) external;
        function getGasPrice() external view returns (uint64);
        function getFeePerByte() external view returns (uint64);
        function isBlocked(address account) external view returns (bool);

        event setGasPrice(uint64 price);
        event setFeePerByte(uint64 fee);
        event blockAccount(address account);
        event unblockAccount(address account);
    }
}

/// Floors in force until the committee changes them.
pub const DEFAULT_GAS_PRICE: u64 = 10_000_000_000;
pub const DEFAULT_FEE_PER_BYTE: u64 = 1_000;

const GAS_PRICE_KEY: [u8; 1] = [0x01];
const FEE_PER_BYTE_KEY: [u8; 1] = [0x02];
const PREFIX_BLOCKED: u8 = 0x03;

const WRITE_GAS: u64 = 20_000;
const READ_GAS: u64 = 400;

/// The Policy native: fee floors and the blocked-account set.
pub struct Policy {
    meta: ContractMeta,
}

impl Policy {
    pub fn new() -> Self {
        Self {
            meta: ContractMeta::new("Policy", ids::POLICY),
        }
    }

    pub fn address() -> Address {
        super::native_address(ids::POLICY)
    }

    fn blocked_key(account: &Address) -> Vec<u8> {
        let mut key = Vec::with_capacity(1 + Address::len_bytes());
        key.push(PREFIX_BLOCKED);
        key.extend_from_slice(account.as_slice());
        key
    }

    fn get_u64(dao: &Dao, key: &[u8], fallback: u64) -> Result<u64> {
        match dao.get_storage_item(&Self::address(), key)? {
            Some(raw) => match <[u8; 8]>::try_from(raw.as_slice()) {
                Ok(bytes) => Ok(u64::from_le_bytes(bytes)),
                Err(_) => bail!("malformed policy value under {key:02x?}"),
            },
            None => Ok(fallback),
        }
    }

    pub fn get_gas_price(dao: &Dao) -> Result<U256> {
        Ok(U256::from(Self::get_u64(
            dao,
            &GAS_PRICE_KEY,
            DEFAULT_GAS_PRICE,
        )?))
    }

    pub fn get_fee_per_byte(dao: &Dao) -> Result<u64> {
        Self::get_u64(dao, &FEE_PER_BYTE_KEY, DEFAULT_FEE_PER_BYTE)
    }

    pub fn is_blocked(dao: &Dao, account: &Address) -> Result<bool> {
        Ok(dao
            .get_storage_item(&Self::address(), &Self::blocked_key(account))?
            .is_some())
    }

    fn set_gas_price(&self, ic: &mut InteropContext<'_>, price: u64) -> Result<()> {
        require_committee(ic)?;
        ic.dao()
            .put_storage_item(&Self::address(), &GAS_PRICE_KEY, &price.to_le_bytes())?;
        ic.log(Log::from_event(
            Self::address(),
            &IPolicy::setGasPrice { price },
        ));
        Ok(())
    }

    fn set_fee_per_byte(&self, ic: &mut InteropContext<'_>, fee: u64) -> Result<()> {
        require_committee(ic)?;
        ic.dao()
            .put_storage_item(&Self::address(), &FEE_PER_BYTE_KEY, &fee.to_le_bytes())?;
        ic.log(Log::from_event(
            Self::address(),
            &IPolicy::setFeePerByte { fee },
        ));
        Ok(())
    }

    fn block_account(&self, ic: &mut InteropContext<'_>, account: Address) -> Result<()> {
        require_committee(ic)?;
        ic.dao()
            .put_storage_item(&Self::address(), &Self::blocked_key(&account), &[1])?;
        ic.log(Log::from_event(
            Self::address(),
            &IPolicy::blockAccount { account },
        ));
        Ok(())
    }

    fn unblock_account(&self, ic: &mut InteropContext<'_>, account: Address) -> Result<()> {
        require_committee(ic)?;
        ic.dao()
            .delete_storage_item(&Self::address(), &Self::blocked_key(&account))?;
        ic.log(Log::from_event(
            Self::address(),
            &IPolicy::unblockAccount { account },
        ));
        Ok(())
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeContract for Policy {
    fn meta(&self) -> &ContractMeta {
        &self.meta
    }

    fn initialize(&self, dao: &Dao) -> Result<()> {
        if dao
            .get_storage_item(&Self::address(), &GAS_PRICE_KEY)?
            .is_some()
        {
            bail!("already initialized");
        }
        dao.put_storage_item(
            &Self::address(),
            &GAS_PRICE_KEY,
            &DEFAULT_GAS_PRICE.to_le_bytes(),
        )?;
        dao.put_storage_item(
            &Self::address(),
            &FEE_PER_BYTE_KEY,
            &DEFAULT_FEE_PER_BYTE.to_le_bytes(),
        )?;
        Ok(())
    }

    fn required_gas(&self, input: &[u8]) -> u64 {
        match selector(input) {
            Ok(sel) if sel == IPolicy::initializeCall::SELECTOR => 0,
            Ok(sel)
                if sel == IPolicy::setGasPriceCall::SELECTOR
                    || sel == IPolicy::setFeePerByteCall::SELECTOR
                    || sel == IPolicy::blockAccountCall::SELECTOR
                    || sel == IPolicy::unblockAccountCall::SELECTOR =>
            {
                WRITE_GAS
            }
            _ => READ_GAS,
        }
    }

    fn run(&self, ic: &mut InteropContext<'_>, input: &[u8]) -> Result<Bytes> {
        let sel = selector(input)?;
        match sel {
            s if s == IPolicy::initializeCall::SELECTOR => {
                self.initialize(ic.dao())?;
                Ok(Bytes::new())
            }
            s if s == IPolicy::setGasPriceCall::SELECTOR => {
                let call = IPolicy::setGasPriceCall::abi_decode(input, true)?;
                self.set_gas_price(ic, call.price)?;
                Ok(Bytes::new())
            }
            s if s == IPolicy::setFeePerByteCall::SELECTOR => {
                let call = IPolicy::setFeePerByteCall::abi_decode(input, true)?;
                self.set_fee_per_byte(ic, call.fee)?;
                Ok(Bytes::new())
            }
            s if s == IPolicy::blockAccountCall::SELECTOR => {
                let call = IPolicy::blockAccountCall::abi_decode(input, true)?;
                self.block_account(ic, call.account)?;
                Ok(Bytes::new())
            }
            s if s == IPolicy::unblockAccountCall::SELECTOR => {
                let call = IPolicy::unblockAccountCall::abi_decode(input, true)?;
                self.unblock_account(ic, call.account)?;
                Ok(Bytes::new())
            }
            s if s == IPolicy::getGasPriceCall::SELECTOR => {
                let price = Self::get_gas_price(ic.dao())?.to::<u64>();
                Ok(Bytes::from(price.abi_encode()))
            }
            s if s == IPolicy::getFeePerByteCall::SELECTOR => {
                Ok(Bytes::from(Self::get_fee_per_byte(ic.dao())?.abi_encode()))
            }
            s if s == IPolicy::isBlockedCall::SELECTOR => {
                let call = IPolicy::isBlockedCall::abi_decode(input, true)?;
                Ok(Bytes::from(
                    Self::is_blocked(ic.dao(), &call.account)?.abi_encode(),
                ))
            }
            other => Err(unknown_selector(other)),
        }
    }
}
