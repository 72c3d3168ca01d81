use crate::interop::InteropContext;
use crate::native::{
    ids, require_committee, selector, unknown_selector, ContractMeta, Gas, NativeContract,
};
use crate::types::Log;
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{sol, SolCall, SolValue};
use anyhow::{bail, Result};
use chain::dao::Dao;

sol! {
    /// Cross-chain deposits minted onto this chain
    interface IBridge {
        /// Mint `amount` GAS to `to` for origin-chain deposit `depositId`
        function mint(address to, uint256 amount, uint64 depositId) external;

        /// Transaction that minted `depositId`, zero if not minted
        function getMinted(uint64 depositId) external view returns (bytes32);

        event Minted(uint64 indexed depositId, address indexed to, uint256 amount);
    }
}

const PREFIX_MINTED: u8 = 0x01;

const MINT_GAS: u64 = 30_000;
const READ_GAS: u64 = 400;

/// The Bridge native: records which origin-chain deposit each mint
/// answers, so a deposit can only ever be minted once.
pub struct Bridge {
    meta: ContractMeta,
}

impl Bridge {
    pub fn new() -> Self {
        Self {
            meta: ContractMeta::new("Bridge", ids::BRIDGE),
        }
    }

    pub fn address() -> Address {
        super::native_address(ids::BRIDGE)
    }

    fn minted_key(deposit_id: u64) -> [u8; 9] {
        let mut key = [0u8; 9];
        key[0] = PREFIX_MINTED;
        key[1..].copy_from_slice(&deposit_id.to_le_bytes());
        key
    }

    /// Hash of the transaction that minted `deposit_id`, if any.
    pub fn get_minted(dao: &Dao, deposit_id: u64) -> Result<Option<B256>> {
        Ok(dao
            .get_storage_item(&Self::address(), &Self::minted_key(deposit_id))?
            .filter(|raw| raw.len() == 32)
            .map(|raw| B256::from_slice(&raw)))
    }

    fn mint(
        &self,
        ic: &mut InteropContext<'_>,
        to: Address,
        amount: U256,
        deposit_id: u64,
    ) -> Result<()> {
        require_committee(ic)?;
        if Self::get_minted(ic.dao(), deposit_id)?.is_some() {
            bail!("deposit {deposit_id} already minted");
        }
        Gas::mint(ic.dao(), &to, amount)?;
        let minted_in = ic.container().map(|tx| tx.hash()).unwrap_or_default();
        ic.dao().put_storage_item(
            &Self::address(),
            &Self::minted_key(deposit_id),
            minted_in.as_slice(),
        )?;
        ic.log(Log::from_event(
            Self::address(),
            &IBridge::Minted {
                depositId: deposit_id,
                to,
                amount,
            },
        ));
        Ok(())
    }
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeContract for Bridge {
    fn meta(&self) -> &ContractMeta {
        &self.meta
    }

    fn initialize(&self, _dao: &Dao) -> Result<()> {
        Ok(())
    }

    fn required_gas(&self, input: &[u8]) -> u64 {
        match selector(input) {
            Ok(sel) if sel == IBridge::mintCall::SELECTOR => MINT_GAS,
            _ => READ_GAS,
        }
    }

    fn run(&self, ic: &mut InteropContext<'_>, input: &[u8]) -> Result<Bytes> {
        let sel = selector(input)?;
        match sel {
            s if s == IBridge::mintCall::SELECTOR => {
                let call = IBridge::mintCall::abi_decode(input, true)?;
                self.mint(ic, call.to, call.amount, call.depositId)?;
                Ok(Bytes::new())
            }
            s if s == IBridge::getMintedCall::SELECTOR => {
                let call = IBridge::getMintedCall::abi_decode(input, true)?;
                let hash = Self::get_minted(ic.dao(), call.depositId)?.unwrap_or_default();
                Ok(Bytes::from(hash.abi_encode()))
            }
            other => Err(unknown_selector(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::Designate;
    use chain::block::{Block, Header};
    use chain::crypto::keys::PublicKey;
    use chain::storage::MemoryStore;
    use chain::transaction::Transaction;
    use std::sync::Arc;
    use testutil::{random_address, random_keypair};

    fn setup() -> (Dao, Bridge, Address) {
        let dao = Dao::new(Arc::new(MemoryStore::new()));
        let standby = vec![PublicKey::from(&random_keypair().verifying_key().clone())];
        Designate::new(standby).initialize(&dao).unwrap();
        let consensus = Designate::consensus_address(&dao, 0).unwrap();
        (dao, Bridge::new(), consensus)
    }

    fn block_at(index: u32) -> Block {
        Block {
            header: Header {
                index,
                ..Default::default()
            },
            transactions: Vec::new(),
        }
    }

    #[test]
    fn test_mint_records_container_tx() {
        let (dao, bridge, consensus) = setup();
        let block = block_at(1);
        let beneficiary = random_address();
        let container = Transaction::synthetic(
            1,
            consensus,
            Some(Bridge::address()),
            100_000,
            U256::from(1),
            Bytes::new(),
        );

        let mut ic =
            InteropContext::new(&dao, consensus, U256::ZERO, &block).with_container(&container);
        bridge
            .mint(&mut ic, beneficiary, U256::from(1_000), 9)
            .unwrap();

        assert_eq!(
            Gas::get_balance(&dao, &beneficiary).unwrap(),
            U256::from(1_000)
        );
        assert_eq!(
            Bridge::get_minted(&dao, 9).unwrap().unwrap(),
            container.hash()
        );
        assert_eq!(ic.logs().len(), 1);
    }

    #[test]
    fn test_double_mint_rejected() {
        let (dao, bridge, consensus) = setup();
        let block = block_at(1);
        let beneficiary = random_address();
        let mut ic = InteropContext::new(&dao, consensus, U256::ZERO, &block);

        bridge.mint(&mut ic, beneficiary, U256::from(5), 1).unwrap();
        let err = bridge
            .mint(&mut ic, beneficiary, U256::from(5), 1)
            .unwrap_err();
        assert!(err.to_string().contains("already minted"));
    }

    #[test]
    fn test_mint_requires_committee() {
        let (dao, bridge, _) = setup();
        let block = block_at(1);
        let mut ic = InteropContext::new(&dao, random_address(), U256::ZERO, &block);
        assert!(bridge
            .mint(&mut ic, random_address(), U256::from(5), 1)
            .is_err());
    }

    #[test]
    fn test_unminted_deposit_reads_zero() {
        let (dao, bridge, _) = setup();
        let block = block_at(0);
        let mut ic = InteropContext::new(&dao, random_address(), U256::ZERO, &block);
        let out = bridge
            .run(&mut ic, &IBridge::getMintedCall { depositId: 4 }.abi_encode())
            .unwrap();
        assert_eq!(B256::abi_decode(&out, true).unwrap(), B256::ZERO);
    }
}
