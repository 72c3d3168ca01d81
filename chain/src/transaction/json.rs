//! JSON wire form of a transaction.
//!
//! All byte and integer fields are hex-prefixed quantities, matching the
//! node's RPC encoding. Deserialization rebuilds the payload and re-derives
//! sender and chain id from the signature rather than trusting the fields.

use super::{
    AccessList, AccessListTx, DynamicFeeTx, LegacyTx, Transaction, TxType, TypedTransaction,
};
use alloy_primitives::{Address, Bytes, B256, U256, U64};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionJson {
    #[serde(rename = "type")]
    tx_type: U64,
    hash: B256,
    nonce: U64,
    #[serde(skip_serializing_if = "Option::is_none")]
    gas_price: Option<U256>,
    #[serde(
        rename = "maxPriorityFeePerGas",
        skip_serializing_if = "Option::is_none"
    )]
    gas_tip_cap: Option<U256>,
    #[serde(rename = "maxFeePerGas", skip_serializing_if = "Option::is_none")]
    gas_fee_cap: Option<U256>,
    gas: U64,
    to: Option<Address>,
    value: U256,
    #[serde(rename = "input")]
    data: Bytes,
    #[serde(skip_serializing_if = "Option::is_none")]
    access_list: Option<AccessList>,
    v: U256,
    r: U256,
    s: U256,
    chain_id: U64,
    #[serde(rename = "from")]
    sender: Address,
}

impl From<&Transaction> for TransactionJson {
    fn from(tx: &Transaction) -> Self {
        let (v, r, s) = tx.signature_values();
        Self {
            tx_type: U64::from(tx.tx_type() as u8),
            hash: tx.hash(),
            nonce: U64::from(tx.nonce()),
            gas_price: match tx.tx_type() {
                TxType::DynamicFee => None,
                _ => Some(tx.gas_price()),
            },
            gas_tip_cap: match tx.tx_type() {
                TxType::DynamicFee => Some(tx.gas_tip_cap()),
                _ => None,
            },
            gas_fee_cap: match tx.tx_type() {
                TxType::DynamicFee => Some(tx.gas_fee_cap()),
                _ => None,
            },
            gas: U64::from(tx.gas()),
            to: tx.to(),
            value: tx.value(),
            data: tx.data().clone(),
            access_list: tx.access_list().cloned(),
            v,
            r,
            s,
            chain_id: U64::from(tx.chain_id()),
            sender: tx.from(),
        }
    }
}

impl Serialize for Transaction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        TransactionJson::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Transaction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = TransactionJson::deserialize(deserializer)?;
        let chain_id = U256::from(json.chain_id.to::<u64>());
        let inner = match json.tx_type.to::<u8>() {
            0x00 => TypedTransaction::Legacy(LegacyTx {
                nonce: json.nonce.to(),
                gas_price: json.gas_price.unwrap_or_default(),
                gas: json.gas.to(),
                to: json.to,
                value: json.value,
                data: json.data,
                v: json.v,
                r: json.r,
                s: json.s,
            }),
            0x01 => TypedTransaction::AccessList(AccessListTx {
                chain_id,
                nonce: json.nonce.to(),
                gas_price: json.gas_price.unwrap_or_default(),
                gas: json.gas.to(),
                to: json.to,
                value: json.value,
                data: json.data,
                access_list: json.access_list.unwrap_or_default(),
                v: json.v,
                r: json.r,
                s: json.s,
            }),
            0x02 => TypedTransaction::DynamicFee(DynamicFeeTx {
                chain_id,
                nonce: json.nonce.to(),
                gas_tip_cap: json.gas_tip_cap.unwrap_or_default(),
                gas_fee_cap: json.gas_fee_cap.unwrap_or_default(),
                gas: json.gas.to(),
                to: json.to,
                value: json.value,
                data: json.data,
                access_list: json.access_list.unwrap_or_default(),
                v: json.v,
                r: json.r,
                s: json.s,
            }),
            other => {
                return Err(serde::de::Error::custom(super::TxError::UnsupportedType(
                    other,
                )))
            }
        };
        Transaction::from_typed(inner).map_err(serde::de::Error::custom)
    }
}
