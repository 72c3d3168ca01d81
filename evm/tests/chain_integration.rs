// End-to-end flows across genesis, native dispatch, EVM execution and
// mempool reconciliation.

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{SolCall, SolEvent, SolValue};
use chain::crypto::keys::PublicKey;
use chain::storage::MemoryStore;
use chain::transaction::{sign, LegacyTx, Transaction, TypedTransaction};
use chain::ProtocolConfiguration;
use evm::blockchain::Blockchain;
use evm::native::bridge::IBridge;
use evm::native::designate::IDesignate;
use evm::native::policy::IPolicy;
use evm::native::{Bridge, Designate, Gas, Role};
use k256::ecdsa::SigningKey;
use std::sync::Arc;
use testutil::random_keypair;

const CHAIN_ID: u64 = 53;
const COMMITTEE_GAS: u64 = 1_000_000;

fn eoa(key: &SigningKey) -> Address {
    let point = key.verifying_key().to_encoded_point(false);
    Address::from_slice(&chain::crypto::keccak256(&point.as_bytes()[1..])[12..])
}

fn new_chain(validators: usize) -> (Blockchain, Vec<PublicKey>) {
    let standby: Vec<PublicKey> = (0..validators)
        .map(|_| PublicKey::from(&random_keypair().verifying_key().clone()))
        .collect();
    let config = ProtocolConfiguration {
        chain_id: CHAIN_ID,
        standby_validators: standby.clone(),
        initial_gas_per_validator: 100,
        mem_pool_size: 64,
        ..Default::default()
    };
    let chain = Blockchain::new(Arc::new(MemoryStore::new()), config).unwrap();
    (chain, standby)
}

/// A committee-signed administrative call: sender is the consensus
/// address, witnessed by the validator multi-signature (whose check is
/// the consensus layer's business).
fn committee_tx(chain: &Blockchain, to: Address, data: Vec<u8>) -> Transaction {
    let consensus = chain.get_consensus_address().unwrap();
    Transaction::synthetic(
        CHAIN_ID,
        consensus,
        Some(to),
        COMMITTEE_GAS,
        U256::from(1),
        Bytes::from(data),
    )
}

fn mint_to(chain: &Blockchain, to: Address, amount: U256, deposit_id: u64) {
    let tx = committee_tx(
        chain,
        Bridge::address(),
        IBridge::mintCall {
            to,
            amount,
            depositId: deposit_id,
        }
        .abi_encode(),
    );
    let block = chain.new_block(vec![tx]).unwrap();
    let receipts = chain.apply_block(&block).unwrap();
    assert!(receipts[0].status, "mint failed: {:?}", receipts[0].output);
}

#[test]
fn test_bridge_mint_block() {
    let (chain, _) = new_chain(1);
    let user = eoa(&random_keypair());

    let tx = committee_tx(
        &chain,
        Bridge::address(),
        IBridge::mintCall {
            to: user,
            amount: U256::from(1_000u64),
            depositId: 7,
        }
        .abi_encode(),
    );
    let tx_hash = tx.hash();
    let block = chain.new_block(vec![tx]).unwrap();
    let receipts = chain.apply_block(&block).unwrap();

    assert_eq!(chain.block_height(), 1);
    let receipt = &receipts[0];
    assert!(receipt.status);
    assert_eq!(receipt.block_number, 1);
    assert_eq!(receipt.logs.len(), 1);
    assert_eq!(receipt.logs[0].topics[0], IBridge::Minted::SIGNATURE_HASH);
    assert_eq!(receipt.logs[0].block_number, 1);

    assert_eq!(chain.balance_of(&user), U256::from(1_000u64));
    assert_eq!(
        Bridge::get_minted(&chain.dao(), 7).unwrap().unwrap(),
        tx_hash
    );
}

#[test]
fn test_non_committee_mint_reverts() {
    let (chain, _) = new_chain(1);
    let outsider = random_keypair();
    let user = eoa(&outsider);

    // funded outsider tries to call the committee-only method directly
    mint_to(&chain, user, U256::from(10).pow(U256::from(20)), 1);
    let tx = sign(
        TypedTransaction::Legacy(LegacyTx {
            nonce: 0,
            gas_price: U256::from(1),
            gas: 100_000,
            to: Some(Bridge::address()),
            value: U256::ZERO,
            data: IBridge::mintCall {
                to: user,
                amount: U256::from(5),
                depositId: 2,
            }
            .abi_encode()
            .into(),
            ..Default::default()
        }),
        CHAIN_ID,
        &outsider,
    )
    .unwrap();

    let block = chain.new_block(vec![tx]).unwrap();
    let receipts = chain.apply_block(&block).unwrap();
    assert!(!receipts[0].status);
    assert!(Bridge::get_minted(&chain.dao(), 2).unwrap().is_none());
    // reverted calls still consume gas and advance the nonce
    assert_eq!(receipts[0].gas_used, 100_000);
    assert_eq!(chain.get_nonce(&user), 1);
}

#[test]
fn test_evm_transfer_through_mempool() {
    let (chain, _) = new_chain(1);
    let alice_key = random_keypair();
    let (alice, bob) = (eoa(&alice_key), eoa(&random_keypair()));
    mint_to(&chain, alice, U256::from(10).pow(U256::from(20)), 1);

    let transfer = Arc::new(
        sign(
            TypedTransaction::Legacy(LegacyTx {
                nonce: 0,
                gas_price: U256::from(5),
                gas: 21_000,
                to: Some(bob),
                value: U256::from(12_345u64),
                data: Bytes::new(),
                ..Default::default()
            }),
            CHAIN_ID,
            &alice_key,
        )
        .unwrap(),
    );

    chain.pool_tx(transfer.clone()).unwrap();
    let pool = chain.mempool();
    assert_eq!(pool.count(), 1);
    assert_eq!(pool.pending_nonce(&alice), 1);

    let verified: Vec<Transaction> = pool
        .get_verified_transactions()
        .iter()
        .map(|tx| (**tx).clone())
        .collect();
    let block = chain.new_block(verified).unwrap();
    let receipts = chain.apply_block(&block).unwrap();

    assert!(receipts[0].status);
    assert_eq!(receipts[0].gas_used, 21_000);
    assert_eq!(chain.balance_of(&bob), U256::from(12_345u64));
    assert_eq!(chain.get_nonce(&alice), 1);

    // the pool reconciled: included tx gone, nonce tracking reset
    assert_eq!(pool.count(), 0);
    assert!(!pool.contains_key(&transfer.hash()));
}

#[test]
fn test_duplicate_pool_submission_rejected() {
    let (chain, _) = new_chain(1);
    let key = random_keypair();
    mint_to(&chain, eoa(&key), U256::from(10).pow(U256::from(20)), 1);

    let tx = Arc::new(
        sign(
            TypedTransaction::Legacy(LegacyTx {
                nonce: 0,
                gas_price: U256::from(3),
                gas: 21_000,
                to: Some(eoa(&random_keypair())),
                ..Default::default()
            }),
            CHAIN_ID,
            &key,
        )
        .unwrap(),
    );
    chain.pool_tx(tx.clone()).unwrap();
    assert!(chain.pool_tx(tx).is_err());
}

#[test]
fn test_wrong_chain_rejected_at_admission() {
    let (chain, _) = new_chain(1);
    let key = random_keypair();
    let tx = Arc::new(
        sign(
            TypedTransaction::Legacy(LegacyTx {
                gas: 21_000,
                gas_price: U256::from(1),
                to: Some(eoa(&random_keypair())),
                ..Default::default()
            }),
            CHAIN_ID + 1,
            &key,
        )
        .unwrap(),
    );
    assert!(chain.pool_tx(tx).is_err());
}

#[test]
fn test_validator_rotation_with_delay() {
    let (chain, _) = new_chain(1);
    let replacement = vec![PublicKey::from(&random_keypair().verifying_key().clone())];

    let tx = committee_tx(
        &chain,
        Designate::address(),
        IDesignate::designateAsRoleCall {
            role: Role::Validator as u8,
            pubs: chain::crypto::keys::encode_keys(&replacement).into(),
        }
        .abi_encode(),
    );
    let block = chain.new_block(vec![tx]).unwrap();
    let receipts = chain.apply_block(&block).unwrap();
    assert!(receipts[0].status, "designation failed: {:?}", receipts[0].output);

    let dao = chain.dao();
    // active set is unchanged up to the activation height
    let (at_two, _) = Designate::designated_by_role(&dao, Role::Validator, 2).unwrap();
    assert_ne!(at_two, replacement);
    let (at_three, _) = Designate::designated_by_role(&dao, Role::Validator, 3).unwrap();
    assert_eq!(at_three, replacement);
    assert_eq!(
        Designate::consensus_address(&dao, 3).unwrap(),
        chain::crypto::keys::consensus_address(&replacement).unwrap()
    );
}

#[test]
fn test_blocked_account_cannot_pool() {
    let (chain, _) = new_chain(1);
    let key = random_keypair();
    let user = eoa(&key);
    mint_to(&chain, user, U256::from(10).pow(U256::from(20)), 1);

    let tx = committee_tx(
        &chain,
        evm::native::Policy::address(),
        IPolicy::blockAccountCall { account: user }.abi_encode(),
    );
    let block = chain.new_block(vec![tx]).unwrap();
    let receipts = chain.apply_block(&block).unwrap();
    assert!(receipts[0].status);
    assert!(chain.is_blocked(&user).unwrap());

    let transfer = Arc::new(
        sign(
            TypedTransaction::Legacy(LegacyTx {
                gas: 21_000,
                gas_price: U256::from(1),
                to: Some(eoa(&random_keypair())),
                ..Default::default()
            }),
            CHAIN_ID,
            &key,
        )
        .unwrap(),
    );
    let err = chain.pool_tx(transfer).unwrap_err();
    assert!(err.to_string().contains("blocked"));
}

#[test]
fn test_state_roots_chain_across_blocks() {
    let (chain, _) = new_chain(1);
    let mut roots = vec![chain.get_state_root(0).unwrap().unwrap().root];

    for _ in 0..3 {
        let block = chain.new_block(Vec::new()).unwrap();
        chain.apply_block(&block).unwrap();
        roots.push(
            chain
                .get_state_root(chain.block_height())
                .unwrap()
                .unwrap()
                .root,
        );
    }

    assert_eq!(chain.block_height(), 3);
    for pair in roots.windows(2) {
        assert_ne!(pair[0], pair[1]);
    }
    // root record hash covers version, index and root
    let record = chain.get_state_root(2).unwrap().unwrap();
    assert_ne!(record.hash(), B256::ZERO);
}

#[test]
fn test_chain_reopens_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let standby = vec![PublicKey::from(&random_keypair().verifying_key().clone())];
    let config = ProtocolConfiguration {
        chain_id: CHAIN_ID,
        standby_validators: standby,
        initial_gas_per_validator: 100,
        ..Default::default()
    };
    let user = eoa(&random_keypair());

    {
        let store = Arc::new(chain::storage::RocksDbStore::open(dir.path()).unwrap());
        let chain = Blockchain::new(store, config.clone()).unwrap();
        mint_to(&chain, user, U256::from(4_242u64), 1);
        assert_eq!(chain.block_height(), 1);
    }

    // a fresh process over the same database resumes at the tip
    let store = Arc::new(chain::storage::RocksDbStore::open(dir.path()).unwrap());
    let chain = Blockchain::new(store, config).unwrap();
    assert_eq!(chain.block_height(), 1);
    assert_eq!(chain.balance_of(&user), U256::from(4_242u64));
    assert!(chain.get_state_root(1).unwrap().is_some());
}

#[test]
fn test_native_view_call_encoding() {
    let (chain, standby) = new_chain(2);
    let dao = chain.dao();
    let balance = Gas::get_balance(&dao, &standby[0].address()).unwrap();
    assert_eq!(balance, U256::from(100) * U256::from(10).pow(U256::from(18)));

    // the same read through ABI dispatch returns the identical value
    let contracts = chain.contracts();
    let native = contracts.by_address(&Gas::address()).unwrap();
    let block = chain.new_block(Vec::new()).unwrap();
    let mut ic = evm::InteropContext::new(&dao, Address::ZERO, U256::ZERO, &block);
    let out = native
        .run(
            &mut ic,
            &evm::native::gas::IGasToken::balanceOfCall {
                account: standby[0].address(),
            }
            .abi_encode(),
        )
        .unwrap();
    assert_eq!(U256::abi_decode(&out, true).unwrap(), balance);
}
