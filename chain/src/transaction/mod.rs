// Transaction model
//
// EVM transaction wrapper: legacy, access-list (type 0x01) and dynamic-fee
// (type 0x02) payloads in standard RLP, augmented with the derived chain id
// and the sender recovered from the signature. Hash and size are derived
// from the canonical encoding and cached.

mod json;
mod rlp;
mod signer;

use crate::crypto::keccak256;
use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;

pub use signer::sign;

/// Hard cap on an encoded transaction.
pub const MAX_TRANSACTION_SIZE: usize = 102_400;

/// Encoded length of a minimal signed legacy transfer, used for fee floors.
pub const LEGACY_BASE_LENGTH: usize = 100;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TxError {
    #[error("invalid chainId")]
    InvalidChainId,
    #[error("max priority fee per gas higher than max fee per gas")]
    TipAboveFeeCap,
    #[error("unsupported tx type {0:#x}")]
    UnsupportedType(u8),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("transaction exceeds {MAX_TRANSACTION_SIZE} bytes")]
    TooLarge,
    #[error("rlp: {0}")]
    Rlp(#[from] alloy_rlp::Error),
    #[error("invalid json transaction: {0}")]
    Json(String),
}

/// Wire discriminants of the supported payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TxType {
    Legacy = 0x00,
    AccessList = 0x01,
    DynamicFee = 0x02,
}

/// One storage-access declaration of an access list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessListItem {
    pub address: Address,
    pub storage_keys: Vec<B256>,
}

pub type AccessList = Vec<AccessListItem>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyTx {
    pub nonce: u64,
    pub gas_price: U256,
    pub gas: u64,
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
    pub v: U256,
    pub r: U256,
    pub s: U256,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessListTx {
    pub chain_id: U256,
    pub nonce: u64,
    pub gas_price: U256,
    pub gas: u64,
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
    pub access_list: AccessList,
    pub v: U256,
    pub r: U256,
    pub s: U256,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DynamicFeeTx {
    pub chain_id: U256,
    pub nonce: u64,
    pub gas_tip_cap: U256,
    pub gas_fee_cap: U256,
    pub gas: u64,
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
    pub access_list: AccessList,
    pub v: U256,
    pub r: U256,
    pub s: U256,
}

/// A typed transaction payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypedTransaction {
    Legacy(LegacyTx),
    AccessList(AccessListTx),
    DynamicFee(DynamicFeeTx),
}

impl TypedTransaction {
    pub fn tx_type(&self) -> TxType {
        match self {
            TypedTransaction::Legacy(_) => TxType::Legacy,
            TypedTransaction::AccessList(_) => TxType::AccessList,
            TypedTransaction::DynamicFee(_) => TxType::DynamicFee,
        }
    }

    pub fn nonce(&self) -> u64 {
        match self {
            TypedTransaction::Legacy(t) => t.nonce,
            TypedTransaction::AccessList(t) => t.nonce,
            TypedTransaction::DynamicFee(t) => t.nonce,
        }
    }

    pub fn gas(&self) -> u64 {
        match self {
            TypedTransaction::Legacy(t) => t.gas,
            TypedTransaction::AccessList(t) => t.gas,
            TypedTransaction::DynamicFee(t) => t.gas,
        }
    }

    /// Effective gas price: the fee cap for dynamic-fee payloads.
    pub fn gas_price(&self) -> U256 {
        match self {
            TypedTransaction::Legacy(t) => t.gas_price,
            TypedTransaction::AccessList(t) => t.gas_price,
            TypedTransaction::DynamicFee(t) => t.gas_fee_cap,
        }
    }

    pub fn gas_fee_cap(&self) -> U256 {
        match self {
            TypedTransaction::DynamicFee(t) => t.gas_fee_cap,
            other => other.gas_price(),
        }
    }

    pub fn gas_tip_cap(&self) -> U256 {
        match self {
            TypedTransaction::DynamicFee(t) => t.gas_tip_cap,
            other => other.gas_price(),
        }
    }

    pub fn to(&self) -> Option<Address> {
        match self {
            TypedTransaction::Legacy(t) => t.to,
            TypedTransaction::AccessList(t) => t.to,
            TypedTransaction::DynamicFee(t) => t.to,
        }
    }

    pub fn value(&self) -> U256 {
        match self {
            TypedTransaction::Legacy(t) => t.value,
            TypedTransaction::AccessList(t) => t.value,
            TypedTransaction::DynamicFee(t) => t.value,
        }
    }

    pub fn data(&self) -> &Bytes {
        match self {
            TypedTransaction::Legacy(t) => &t.data,
            TypedTransaction::AccessList(t) => &t.data,
            TypedTransaction::DynamicFee(t) => &t.data,
        }
    }

    pub fn access_list(&self) -> Option<&AccessList> {
        match self {
            TypedTransaction::Legacy(_) => None,
            TypedTransaction::AccessList(t) => Some(&t.access_list),
            TypedTransaction::DynamicFee(t) => Some(&t.access_list),
        }
    }

    pub fn signature_values(&self) -> (U256, U256, U256) {
        match self {
            TypedTransaction::Legacy(t) => (t.v, t.r, t.s),
            TypedTransaction::AccessList(t) => (t.v, t.r, t.s),
            TypedTransaction::DynamicFee(t) => (t.v, t.r, t.s),
        }
    }

    fn set_signature(&mut self, v: U256, r: U256, s: U256) {
        match self {
            TypedTransaction::Legacy(t) => (t.v, t.r, t.s) = (v, r, s),
            TypedTransaction::AccessList(t) => (t.v, t.r, t.s) = (v, r, s),
            TypedTransaction::DynamicFee(t) => (t.v, t.r, t.s) = (v, r, s),
        }
    }
}

/// An EVM transaction with its derived chain id and recovered sender.
#[derive(Debug, Clone)]
pub struct Transaction {
    inner: TypedTransaction,
    chain_id: u64,
    sender: Address,
    trimmed: bool,
    hash: OnceLock<B256>,
    size: OnceLock<usize>,
}

impl Transaction {
    /// Wrap a signed payload, deriving chain id and sender from the
    /// signature. Fails if the signature does not recover or the chain id
    /// does not fit in 64 bits.
    pub fn from_typed(inner: TypedTransaction) -> Result<Self, TxError> {
        let (chain_id, sender) = signer::derive_signed(&inner)?;
        Ok(Self {
            inner,
            chain_id,
            sender,
            trimmed: false,
            hash: OnceLock::new(),
            size: OnceLock::new(),
        })
    }

    /// Decode a transaction from its canonical wire encoding.
    pub fn decode(bytes: &[u8]) -> Result<Self, TxError> {
        if bytes.len() > MAX_TRANSACTION_SIZE {
            return Err(TxError::TooLarge);
        }
        let inner = rlp::decode_typed(bytes)?;
        let tx = Self::from_typed(inner)?;
        let _ = tx.hash.set(keccak256(bytes));
        let _ = tx.size.set(bytes.len());
        Ok(tx)
    }

    /// Hash-only reference to a transaction stored elsewhere.
    pub fn new_trimmed(hash: B256) -> Self {
        let tx = Self {
            inner: TypedTransaction::Legacy(LegacyTx::default()),
            chain_id: 0,
            sender: Address::ZERO,
            trimmed: true,
            hash: OnceLock::new(),
            size: OnceLock::new(),
        };
        let _ = tx.hash.set(hash);
        tx
    }

    /// A node-issued transaction with a preset sender and no signature,
    /// used for the genesis `initialize()` calls. Never decoded from the
    /// wire, so sender recovery does not apply.
    pub fn synthetic(
        chain_id: u64,
        sender: Address,
        to: Option<Address>,
        gas: u64,
        gas_price: U256,
        data: Bytes,
    ) -> Self {
        Self {
            inner: TypedTransaction::Legacy(LegacyTx {
                nonce: 0,
                gas_price,
                gas,
                to,
                value: U256::ZERO,
                data,
                ..Default::default()
            }),
            chain_id,
            sender,
            trimmed: false,
            hash: OnceLock::new(),
            size: OnceLock::new(),
        }
    }

    pub fn is_trimmed(&self) -> bool {
        self.trimmed
    }

    /// Content-addressed hash over the canonical encoding.
    pub fn hash(&self) -> B256 {
        *self.hash.get_or_init(|| keccak256(self.encode()))
    }

    pub fn from(&self) -> Address {
        self.sender
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn tx_type(&self) -> TxType {
        self.inner.tx_type()
    }

    pub fn nonce(&self) -> u64 {
        self.inner.nonce()
    }

    pub fn gas(&self) -> u64 {
        self.inner.gas()
    }

    pub fn gas_price(&self) -> U256 {
        self.inner.gas_price()
    }

    pub fn gas_fee_cap(&self) -> U256 {
        self.inner.gas_fee_cap()
    }

    pub fn gas_tip_cap(&self) -> U256 {
        self.inner.gas_tip_cap()
    }

    pub fn to(&self) -> Option<Address> {
        self.inner.to()
    }

    pub fn value(&self) -> U256 {
        self.inner.value()
    }

    pub fn data(&self) -> &Bytes {
        self.inner.data()
    }

    pub fn access_list(&self) -> Option<&AccessList> {
        self.inner.access_list()
    }

    pub fn signature_values(&self) -> (U256, U256, U256) {
        self.inner.signature_values()
    }

    pub fn inner(&self) -> &TypedTransaction {
        &self.inner
    }

    /// Canonical wire encoding: RLP list for legacy, type byte plus RLP
    /// list for typed payloads.
    pub fn encode(&self) -> Vec<u8> {
        rlp::encode_typed(&self.inner)
    }

    /// Encoded size in bytes.
    pub fn size(&self) -> usize {
        *self.size.get_or_init(|| self.encode().len())
    }

    /// Gas per encoded byte, the quantity fee-floor policy is applied to.
    pub fn fee_per_byte(&self) -> u64 {
        self.gas() / self.size() as u64
    }

    /// Maximum debit this transaction can cause: gasPrice * gas + value.
    pub fn cost(&self) -> U256 {
        self.gas_price()
            .checked_mul(U256::from(self.gas()))
            .and_then(|fee| fee.checked_add(self.value()))
            .unwrap_or(U256::MAX)
    }

    /// Structural validity independent of chain binding.
    pub fn is_valid(&self) -> Result<(), TxError> {
        if self.gas_tip_cap() > self.gas_fee_cap() {
            return Err(TxError::TipAboveFeeCap);
        }
        if self.size() > MAX_TRANSACTION_SIZE {
            return Err(TxError::TooLarge);
        }
        Ok(())
    }

    /// Check the transaction is bound to `chain_id`.
    pub fn verify(&self, chain_id: u64) -> Result<(), TxError> {
        if self.chain_id != chain_id {
            return Err(TxError::InvalidChainId);
        }
        Ok(())
    }

    /// Hash the signature commits to.
    pub fn sig_hash(&self) -> B256 {
        signer::sig_hash(&self.inner, self.chain_id)
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash()
    }
}

impl Eq for Transaction {}
