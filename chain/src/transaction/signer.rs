//! Sender recovery and signing.
//!
//! The recovery rules follow the London signer lineage: typed payloads sign
//! with a 0/1 parity, protected legacy payloads fold the chain id into v
//! (EIP-155), unprotected legacy payloads use 27/28.

use super::{rlp, TxError, TypedTransaction};
use crate::crypto::keccak256;
use alloy_primitives::{Address, B256, U256};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use std::sync::OnceLock;

fn secp256k1_n() -> &'static U256 {
    static N: OnceLock<U256> = OnceLock::new();
    N.get_or_init(|| {
        U256::from_str_radix(
            "fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141",
            16,
        )
        .unwrap()
    })
}

fn secp256k1_half_n() -> &'static U256 {
    static HALF: OnceLock<U256> = OnceLock::new();
    HALF.get_or_init(|| *secp256k1_n() >> 1)
}

/// Hash the signature of `tx` commits to under `chain_id`.
pub(super) fn sig_hash(tx: &TypedTransaction, chain_id: u64) -> B256 {
    keccak256(rlp::encode_sig_payload(tx, chain_id))
}

/// Derive (chain id, sender) from a signed payload.
pub(super) fn derive_signed(tx: &TypedTransaction) -> Result<(u64, Address), TxError> {
    let chain_id = derive_chain_id(tx)?;
    let sender = recover_sender(tx, chain_id)?;
    Ok((chain_id, sender))
}

fn derive_chain_id(tx: &TypedTransaction) -> Result<u64, TxError> {
    let big = match tx {
        TypedTransaction::Legacy(t) => {
            // EIP-155 folds the chain id into v; 27/28 means unprotected.
            if t.v == U256::from(27) || t.v == U256::from(28) {
                return Ok(0);
            }
            if t.v < U256::from(35) {
                return Err(TxError::InvalidSignature);
            }
            (t.v - U256::from(35)) >> 1
        }
        TypedTransaction::AccessList(t) => t.chain_id,
        TypedTransaction::DynamicFee(t) => t.chain_id,
    };
    if big > U256::from(u64::MAX) {
        return Err(TxError::InvalidChainId);
    }
    Ok(big.to::<u64>())
}

fn recover_sender(tx: &TypedTransaction, chain_id: u64) -> Result<Address, TxError> {
    let (v, r, s) = tx.signature_values();
    let parity = match tx {
        TypedTransaction::Legacy(_) => {
            if chain_id == 0 {
                // unprotected: v is 27/28
                v.checked_sub(U256::from(27))
                    .ok_or(TxError::InvalidSignature)?
            } else {
                v.checked_sub(U256::from(2 * u128::from(chain_id) + 35))
                    .ok_or(TxError::InvalidSignature)?
            }
        }
        _ => v,
    };
    recover_plain(&sig_hash(tx, chain_id), r, s, parity)
}

/// Recover the signing address from a prehash, enforcing the canonical
/// (low-s, homestead) signature range.
fn recover_plain(hash: &B256, r: U256, s: U256, parity: U256) -> Result<Address, TxError> {
    if r.is_zero() || s.is_zero() || r >= *secp256k1_n() || s > *secp256k1_half_n() {
        return Err(TxError::InvalidSignature);
    }
    if parity > U256::from(1) {
        return Err(TxError::InvalidSignature);
    }
    let signature = Signature::from_scalars(
        r.to_be_bytes::<32>().into(),
        s.to_be_bytes::<32>().into(),
    )
    .map_err(|_| TxError::InvalidSignature)?;
    let recovery_id =
        RecoveryId::from_byte(parity.to::<u8>()).ok_or(TxError::InvalidSignature)?;
    let key = VerifyingKey::recover_from_prehash(hash.as_slice(), &signature, recovery_id)
        .map_err(|_| TxError::InvalidSignature)?;
    Ok(address_of(&key))
}

fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    Address::from_slice(&keccak256(&point.as_bytes()[1..])[12..])
}

/// Sign `payload` with `key` for `chain_id`, returning the wrapped
/// transaction. Typed payloads must already carry the matching chain id.
pub fn sign(
    mut payload: TypedTransaction,
    chain_id: u64,
    key: &SigningKey,
) -> Result<super::Transaction, TxError> {
    match &payload {
        TypedTransaction::AccessList(t) if t.chain_id != U256::from(chain_id) => {
            return Err(TxError::InvalidChainId)
        }
        TypedTransaction::DynamicFee(t) if t.chain_id != U256::from(chain_id) => {
            return Err(TxError::InvalidChainId)
        }
        _ => {}
    }
    let hash = sig_hash(&payload, chain_id);
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(hash.as_slice())
        .map_err(|_| TxError::InvalidSignature)?;
    let r = U256::from_be_slice(&signature.r().to_bytes());
    let s = U256::from_be_slice(&signature.s().to_bytes());
    let parity = u64::from(recovery_id.to_byte());
    let v = match payload {
        TypedTransaction::Legacy(_) => {
            if chain_id == 0 {
                U256::from(parity + 27)
            } else {
                U256::from(u128::from(parity) + 35 + 2 * u128::from(chain_id))
            }
        }
        _ => U256::from(parity),
    };
    payload.set_signature(v, r, s);
    super::Transaction::from_typed(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::LegacyTx;
    use testutil::random_keypair;

    fn payload() -> TypedTransaction {
        TypedTransaction::Legacy(LegacyTx {
            nonce: 1,
            gas_price: U256::from(10),
            gas: 21_000,
            to: Some(Address::repeat_byte(0x11)),
            value: U256::from(5),
            ..Default::default()
        })
    }

    #[test]
    fn test_recover_round_trip() {
        let key = random_keypair();
        let tx = sign(payload(), 7, &key).unwrap();
        assert_eq!(tx.chain_id(), 7);
        assert_eq!(tx.from(), address_of(key.verifying_key()));
    }

    #[test]
    fn test_high_s_rejected() {
        let key = random_keypair();
        let tx = sign(payload(), 7, &key).unwrap();
        let (v, r, _) = tx.signature_values();
        let mut inner = tx.inner().clone();
        // replace s with n - s: same curve equation, non-canonical form
        let bad_s = *secp256k1_n() - tx.signature_values().2;
        match &mut inner {
            TypedTransaction::Legacy(t) => {
                t.v = v;
                t.r = r;
                t.s = bad_s;
            }
            _ => unreachable!(),
        }
        assert_eq!(
            super::super::Transaction::from_typed(inner).unwrap_err(),
            TxError::InvalidSignature
        );
    }

    #[test]
    fn test_zero_r_rejected() {
        assert_eq!(
            recover_plain(&B256::ZERO, U256::ZERO, U256::from(1), U256::ZERO).unwrap_err(),
            TxError::InvalidSignature
        );
    }

    #[test]
    fn test_legacy_v_encodes_chain() {
        let key = random_keypair();
        let tx = sign(payload(), 5, &key).unwrap();
        let (v, _, _) = tx.signature_values();
        assert!(v == U256::from(45) || v == U256::from(46));
    }
}
