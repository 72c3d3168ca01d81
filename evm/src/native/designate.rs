use crate::interop::InteropContext;
use crate::native::{
    ids, require_committee, selector, unknown_selector, ContractMeta, NativeContract,
};
use crate::types::Log;
use alloy_primitives::{Address, Bytes};
use alloy_sol_types::{sol, SolCall, SolValue};
use anyhow::{anyhow, bail, Result};
use chain::crypto::keys::{decode_keys, encode_keys, PublicKeys};
use chain::dao::Dao;

sol! {
    /// Role-keyed committee lists
    interface IDesignate {
        /// Seed the validator list from configuration
        function initialize() external;

        /// Assign `pubs` (concatenated compressed keys) to `role`,
        /// effective two blocks after the persisting block
        function designateAsRole(uint8 role, bytes pubs) external;

        /// Keys active for `role` at height `index`
        function getDesignatedByRole(uint8 role, uint32 index) external view returns (bytes pubs);

        event designateAsRole(uint8 indexed role, bytes pubs);
    }
}

const DESIGNATE_GAS: u64 = 30_000;
const GET_DESIGNATED_GAS: u64 = 5_000;

/// Designations activate this many blocks after the one that carries them,
/// giving the network time to converge before the list switches.
pub const DESIGNATION_DELAY: u32 = 2;

/// Node roles a key list can be designated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Role {
    Validator = 0,
    StateValidator = 1,
    Oracle = 2,
}

impl Role {
    pub fn from_u8(value: u8) -> Option<Role> {
        match value {
            0 => Some(Role::Validator),
            1 => Some(Role::StateValidator),
            2 => Some(Role::Oracle),
            _ => None,
        }
    }
}

/// The Designate native: role-to-key-list governance.
pub struct Designate {
    meta: ContractMeta,
    standby_validators: PublicKeys,
}

impl Designate {
    pub fn new(standby_validators: PublicKeys) -> Self {
        Self {
            meta: ContractMeta::new("Designate", ids::DESIGNATE),
            standby_validators,
        }
    }

    pub fn address() -> Address {
        super::native_address(ids::DESIGNATE)
    }

    fn role_key(role: Role, activation: u32) -> [u8; 5] {
        let mut key = [0u8; 5];
        key[0] = role as u8;
        key[1..5].copy_from_slice(&activation.to_le_bytes());
        key
    }

    /// The key list active for `role` at height `index`: the stored
    /// version with the greatest activation height not above `index`.
    pub fn designated_by_role(dao: &Dao, role: Role, index: u32) -> Result<(PublicKeys, u32)> {
        let rows = dao.seek(&Self::address(), &[role as u8])?;
        let mut best: Option<(u32, Vec<u8>)> = None;
        for (key, value) in rows {
            let activation = match <[u8; 4]>::try_from(&key[1..]) {
                Ok(raw) => u32::from_le_bytes(raw),
                Err(_) => continue,
            };
            if activation <= index && best.as_ref().map_or(true, |(a, _)| activation >= *a) {
                best = Some((activation, value));
            }
        }
        let (activation, raw) =
            best.ok_or_else(|| anyhow!("no designation for role {role:?} at height {index}"))?;
        Ok((decode_keys(&raw)?, activation))
    }

    /// Consensus address active at height `index`: hash160 of the
    /// validator set's m-of-n verification script.
    pub fn consensus_address(dao: &Dao, index: u32) -> Result<Address> {
        let (validators, _) = Self::designated_by_role(dao, Role::Validator, index)?;
        Ok(chain::crypto::keys::consensus_address(&validators)?)
    }

    fn designate_as_role(
        &self,
        ic: &mut InteropContext<'_>,
        role: Role,
        keys: PublicKeys,
    ) -> Result<()> {
        require_committee(ic)?;
        if keys.is_empty() {
            bail!("empty key list for role {role:?}");
        }
        if keys.len() > 16 {
            bail!("too many keys for role {role:?}: {}", keys.len());
        }
        let activation = ic.block().index() + DESIGNATION_DELAY;
        let encoded = encode_keys(&keys);
        ic.dao()
            .put_storage_item(&Self::address(), &Self::role_key(role, activation), &encoded)?;
        ic.log(Log::from_event(
            Self::address(),
            &IDesignate::designateAsRole {
                role: role as u8,
                pubs: encoded.into(),
            },
        ));
        Ok(())
    }
}

impl NativeContract for Designate {
    fn meta(&self) -> &ContractMeta {
        &self.meta
    }

    fn initialize(&self, dao: &Dao) -> Result<()> {
        if !dao.seek(&Self::address(), &[Role::Validator as u8])?.is_empty() {
            bail!("already initialized");
        }
        if self.standby_validators.is_empty() {
            bail!("no standby validators configured");
        }
        dao.put_storage_item(
            &Self::address(),
            &Self::role_key(Role::Validator, 0),
            &encode_keys(&self.standby_validators),
        )?;
        Ok(())
    }

    fn required_gas(&self, input: &[u8]) -> u64 {
        match selector(input) {
            Ok(sel) if sel == IDesignate::designateAsRoleCall::SELECTOR => DESIGNATE_GAS,
            Ok(sel) if sel == IDesignate::getDesignatedByRoleCall::SELECTOR => GET_DESIGNATED_GAS,
            _ => 0,
        }
    }

    fn run(&self, ic: &mut InteropContext<'_>, input: &[u8]) -> Result<Bytes> {
        let sel = selector(input)?;
        match sel {
            s if s == IDesignate::initializeCall::SELECTOR => {
                self.initialize(ic.dao())?;
                Ok(Bytes::new())
            }
            s if s == IDesignate::designateAsRoleCall::SELECTOR => {
                let call = IDesignate::designateAsRoleCall::abi_decode(input, true)?;
                let role =
                    Role::from_u8(call.role).ok_or_else(|| anyhow!("invalid role {}", call.role))?;
                let keys = decode_keys(&call.pubs)?;
                self.designate_as_role(ic, role, keys)?;
                Ok(Bytes::new())
            }
            s if s == IDesignate::getDesignatedByRoleCall::SELECTOR => {
                let call = IDesignate::getDesignatedByRoleCall::abi_decode(input, true)?;
                let role =
                    Role::from_u8(call.role).ok_or_else(|| anyhow!("invalid role {}", call.role))?;
                let (keys, _) = Self::designated_by_role(ic.dao(), role, call.index)?;
                Ok(Bytes::from(Bytes::from(encode_keys(&keys)).abi_encode()))
            }
            other => Err(unknown_selector(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_sol_types::SolEvent;
    use chain::block::{Block, Header};
    use chain::crypto::keys::PublicKey;
    use chain::storage::MemoryStore;
    use chain::ProtocolConfiguration;
    use std::sync::Arc;
    use testutil::random_keypair;

    fn key() -> PublicKey {
        PublicKey::from(&random_keypair().verifying_key().clone())
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

    fn setup(standby: PublicKeys) -> (Dao, Designate) {
        let dao = Dao::new(Arc::new(MemoryStore::new()));
        let designate = Designate::new(standby);
        designate.initialize(&dao).unwrap();
        (dao, designate)
    }

    #[test]
    fn test_initialize_seeds_validators() {
        let standby = vec![key()];
        let (dao, designate) = setup(standby.clone());
        let (keys, activation) =
            Designate::designated_by_role(&dao, Role::Validator, 0).unwrap();
        assert_eq!(keys, standby);
        assert_eq!(activation, 0);
        assert!(designate.initialize(&dao).is_err(), "second initialize");
    }

    #[test]
    fn test_designation_activates_after_delay() {
        let old = vec![key()];
        let (dao, designate) = setup(old.clone());
        let new = vec![key()];

        let block = block_at(1);
        let consensus = Designate::consensus_address(&dao, 1).unwrap();
        let mut ic = InteropContext::new(&dao, consensus, Default::default(), &block);
        designate
            .designate_as_role(&mut ic, Role::Validator, new.clone())
            .unwrap();

        let (at_two, _) = Designate::designated_by_role(&dao, Role::Validator, 2).unwrap();
        assert_eq!(at_two, old);
        let (at_three, _) = Designate::designated_by_role(&dao, Role::Validator, 3).unwrap();
        assert_eq!(at_three, new);
    }

    #[test]
    fn test_non_committee_caller_rejected() {
        let (dao, designate) = setup(vec![key()]);
        let block = block_at(1);
        let mut ic = InteropContext::new(
            &dao,
            Address::repeat_byte(0x99),
            Default::default(),
            &block,
        );
        let err = designate
            .designate_as_role(&mut ic, Role::Validator, vec![key()])
            .unwrap_err();
        assert!(err.to_string().contains("not authorized"));
    }

    #[test]
    fn test_empty_key_list_rejected() {
        let (dao, designate) = setup(vec![key()]);
        let block = block_at(1);
        let consensus = Designate::consensus_address(&dao, 1).unwrap();
        let mut ic = InteropContext::new(&dao, consensus, Default::default(), &block);
        assert!(designate
            .designate_as_role(&mut ic, Role::Validator, Vec::new())
            .is_err());
    }

    #[test]
    fn test_run_dispatch_and_event() {
        let (dao, designate) = setup(vec![key()]);
        let new = vec![key()];
        let block = block_at(0);
        let consensus = Designate::consensus_address(&dao, 0).unwrap();
        let mut ic = InteropContext::new(&dao, consensus, Default::default(), &block);

        let input = IDesignate::designateAsRoleCall {
            role: Role::Validator as u8,
            pubs: encode_keys(&new).into(),
        }
        .abi_encode();
        designate.run(&mut ic, &input).unwrap();

        let log = &ic.logs()[0];
        assert_eq!(log.address, Designate::address());
        assert_eq!(log.topics[0], IDesignate::designateAsRole::SIGNATURE_HASH);
        assert_eq!(log.topics[1].as_slice()[31], Role::Validator as u8);

        let (active, _) = Designate::designated_by_role(&dao, Role::Validator, 2).unwrap();
        assert_eq!(active, new);
    }

    #[test]
    fn test_run_rejects_short_and_unknown_input() {
        let contracts = crate::native::Contracts::new(&ProtocolConfiguration::default());
        let dao = Dao::new(Arc::new(MemoryStore::new()));
        let block = block_at(0);
        let mut ic = InteropContext::new(&dao, Address::ZERO, Default::default(), &block);
        assert!(contracts.designate.run(&mut ic, &[0x01]).is_err());
        assert!(contracts.designate.run(&mut ic, &[9, 9, 9, 9]).is_err());
    }
}
