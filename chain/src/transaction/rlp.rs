//! Canonical RLP wire encoding of the three payload types.
//!
//! Legacy transactions are a bare RLP list; typed transactions are the type
//! byte followed by an RLP list of their fields.

use super::{AccessList, AccessListItem, DynamicFeeTx, LegacyTx, TxError, TypedTransaction};
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_rlp::{Decodable, Encodable, Header, EMPTY_STRING_CODE};

use super::AccessListTx;

/// Encode `fields` as one RLP list.
fn encode_list(fields: impl FnOnce(&mut Vec<u8>)) -> Vec<u8> {
    let mut payload = Vec::new();
    fields(&mut payload);
    let mut out = Vec::with_capacity(payload.len() + 9);
    Header {
        list: true,
        payload_length: payload.len(),
    }
    .encode(&mut out);
    out.extend_from_slice(&payload);
    out
}

fn encode_opt_addr(to: &Option<Address>, out: &mut Vec<u8>) {
    match to {
        Some(addr) => addr.encode(out),
        None => out.push(EMPTY_STRING_CODE),
    }
}

fn decode_opt_addr(buf: &mut &[u8]) -> alloy_rlp::Result<Option<Address>> {
    if buf.first() == Some(&EMPTY_STRING_CODE) {
        *buf = &buf[1..];
        Ok(None)
    } else {
        Ok(Some(Address::decode(buf)?))
    }
}

impl Encodable for AccessListItem {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        let payload_length = self.address.length() + {
            let keys_len: usize = self.storage_keys.iter().map(Encodable::length).sum();
            Header {
                list: true,
                payload_length: keys_len,
            }
            .length()
                + keys_len
        };
        Header {
            list: true,
            payload_length,
        }
        .encode(out);
        self.address.encode(out);
        self.storage_keys.encode(out);
    }

    fn length(&self) -> usize {
        let keys_len: usize = self.storage_keys.iter().map(Encodable::length).sum();
        let payload_length = self.address.length()
            + Header {
                list: true,
                payload_length: keys_len,
            }
            .length()
            + keys_len;
        Header {
            list: true,
            payload_length,
        }
        .length()
            + payload_length
    }
}

impl Decodable for AccessListItem {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let header = Header::decode(buf)?;
        if !header.list {
            return Err(alloy_rlp::Error::UnexpectedString);
        }
        let mut body = &buf[..header.payload_length];
        *buf = &buf[header.payload_length..];
        let address = Address::decode(&mut body)?;
        let storage_keys = Vec::<B256>::decode(&mut body)?;
        Ok(Self {
            address,
            storage_keys,
        })
    }
}

fn encode_access_list(list: &AccessList, out: &mut Vec<u8>) {
    let payload_length: usize = list.iter().map(Encodable::length).sum();
    Header {
        list: true,
        payload_length,
    }
    .encode(out);
    for item in list {
        item.encode(out);
    }
}

fn decode_access_list(buf: &mut &[u8]) -> alloy_rlp::Result<AccessList> {
    let header = Header::decode(buf)?;
    if !header.list {
        return Err(alloy_rlp::Error::UnexpectedString);
    }
    let mut body = &buf[..header.payload_length];
    *buf = &buf[header.payload_length..];
    let mut list = AccessList::new();
    while !body.is_empty() {
        list.push(AccessListItem::decode(&mut body)?);
    }
    Ok(list)
}

fn encode_legacy(tx: &LegacyTx) -> Vec<u8> {
    encode_list(|out| {
        tx.nonce.encode(out);
        tx.gas_price.encode(out);
        tx.gas.encode(out);
        encode_opt_addr(&tx.to, out);
        tx.value.encode(out);
        tx.data.encode(out);
        tx.v.encode(out);
        tx.r.encode(out);
        tx.s.encode(out);
    })
}

fn encode_access_list_tx(tx: &AccessListTx) -> Vec<u8> {
    encode_list(|out| {
        tx.chain_id.encode(out);
        tx.nonce.encode(out);
        tx.gas_price.encode(out);
        tx.gas.encode(out);
        encode_opt_addr(&tx.to, out);
        tx.value.encode(out);
        tx.data.encode(out);
        encode_access_list(&tx.access_list, out);
        tx.v.encode(out);
        tx.r.encode(out);
        tx.s.encode(out);
    })
}

fn encode_dynamic_fee_tx(tx: &DynamicFeeTx) -> Vec<u8> {
    encode_list(|out| {
        tx.chain_id.encode(out);
        tx.nonce.encode(out);
        tx.gas_tip_cap.encode(out);
        tx.gas_fee_cap.encode(out);
        tx.gas.encode(out);
        encode_opt_addr(&tx.to, out);
        tx.value.encode(out);
        tx.data.encode(out);
        encode_access_list(&tx.access_list, out);
        tx.v.encode(out);
        tx.r.encode(out);
        tx.s.encode(out);
    })
}

/// Canonical encoding of a payload.
pub(super) fn encode_typed(tx: &TypedTransaction) -> Vec<u8> {
    match tx {
        TypedTransaction::Legacy(t) => encode_legacy(t),
        TypedTransaction::AccessList(t) => {
            let mut out = vec![super::TxType::AccessList as u8];
            out.extend_from_slice(&encode_access_list_tx(t));
            out
        }
        TypedTransaction::DynamicFee(t) => {
            let mut out = vec![super::TxType::DynamicFee as u8];
            out.extend_from_slice(&encode_dynamic_fee_tx(t));
            out
        }
    }
}

fn open_list(buf: &mut &[u8]) -> Result<(), TxError> {
    let header = Header::decode(buf)?;
    if !header.list {
        return Err(TxError::Rlp(alloy_rlp::Error::UnexpectedString));
    }
    if header.payload_length != buf.len() {
        return Err(TxError::Rlp(alloy_rlp::Error::UnexpectedLength));
    }
    Ok(())
}

fn decode_legacy(mut buf: &[u8]) -> Result<LegacyTx, TxError> {
    let buf = &mut buf;
    open_list(buf)?;
    Ok(LegacyTx {
        nonce: u64::decode(buf)?,
        gas_price: U256::decode(buf)?,
        gas: u64::decode(buf)?,
        to: decode_opt_addr(buf)?,
        value: U256::decode(buf)?,
        data: Bytes::decode(buf)?,
        v: U256::decode(buf)?,
        r: U256::decode(buf)?,
        s: U256::decode(buf)?,
    })
}

fn decode_access_list_tx(mut buf: &[u8]) -> Result<AccessListTx, TxError> {
    let buf = &mut buf;
    open_list(buf)?;
    Ok(AccessListTx {
        chain_id: U256::decode(buf)?,
        nonce: u64::decode(buf)?,
        gas_price: U256::decode(buf)?,
        gas: u64::decode(buf)?,
        to: decode_opt_addr(buf)?,
        value: U256::decode(buf)?,
        data: Bytes::decode(buf)?,
        access_list: decode_access_list(buf)?,
        v: U256::decode(buf)?,
        r: U256::decode(buf)?,
        s: U256::decode(buf)?,
    })
}

fn decode_dynamic_fee_tx(mut buf: &[u8]) -> Result<DynamicFeeTx, TxError> {
    let buf = &mut buf;
    open_list(buf)?;
    Ok(DynamicFeeTx {
        chain_id: U256::decode(buf)?,
        nonce: u64::decode(buf)?,
        gas_tip_cap: U256::decode(buf)?,
        gas_fee_cap: U256::decode(buf)?,
        gas: u64::decode(buf)?,
        to: decode_opt_addr(buf)?,
        value: U256::decode(buf)?,
        data: Bytes::decode(buf)?,
        access_list: decode_access_list(buf)?,
        v: U256::decode(buf)?,
        r: U256::decode(buf)?,
        s: U256::decode(buf)?,
    })
}

/// Decode a payload from its canonical encoding.
pub(super) fn decode_typed(bytes: &[u8]) -> Result<TypedTransaction, TxError> {
    match bytes.first() {
        None => Err(TxError::Rlp(alloy_rlp::Error::InputTooShort)),
        // a leading byte >= 0xc0 is an RLP list: legacy transaction
        Some(&first) if first >= 0xc0 => Ok(TypedTransaction::Legacy(decode_legacy(bytes)?)),
        Some(&t) if t == super::TxType::AccessList as u8 => Ok(TypedTransaction::AccessList(
            decode_access_list_tx(&bytes[1..])?,
        )),
        Some(&t) if t == super::TxType::DynamicFee as u8 => Ok(TypedTransaction::DynamicFee(
            decode_dynamic_fee_tx(&bytes[1..])?,
        )),
        Some(&t) => Err(TxError::UnsupportedType(t)),
    }
}

/// RLP list over the fields the signature commits to.
pub(super) fn encode_sig_payload(tx: &TypedTransaction, chain_id: u64) -> Vec<u8> {
    match tx {
        TypedTransaction::Legacy(t) => {
            if chain_id == 0 {
                // pre-EIP-155
                encode_list(|out| {
                    t.nonce.encode(out);
                    t.gas_price.encode(out);
                    t.gas.encode(out);
                    encode_opt_addr(&t.to, out);
                    t.value.encode(out);
                    t.data.encode(out);
                })
            } else {
                encode_list(|out| {
                    t.nonce.encode(out);
                    t.gas_price.encode(out);
                    t.gas.encode(out);
                    encode_opt_addr(&t.to, out);
                    t.value.encode(out);
                    t.data.encode(out);
                    chain_id.encode(out);
                    0u8.encode(out);
                    0u8.encode(out);
                })
            }
        }
        TypedTransaction::AccessList(t) => {
            let mut out = vec![super::TxType::AccessList as u8];
            out.extend_from_slice(&encode_list(|out| {
                t.chain_id.encode(out);
                t.nonce.encode(out);
                t.gas_price.encode(out);
                t.gas.encode(out);
                encode_opt_addr(&t.to, out);
                t.value.encode(out);
                t.data.encode(out);
                encode_access_list(&t.access_list, out);
            }));
            out
        }
        TypedTransaction::DynamicFee(t) => {
            let mut out = vec![super::TxType::DynamicFee as u8];
            out.extend_from_slice(&encode_list(|out| {
                t.chain_id.encode(out);
                t.nonce.encode(out);
                t.gas_tip_cap.encode(out);
                t.gas_fee_cap.encode(out);
                t.gas.encode(out);
                encode_opt_addr(&t.to, out);
                t.value.encode(out);
                t.data.encode(out);
                encode_access_list(&t.access_list, out);
            }));
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_payload_round_trip() {
        let tx = LegacyTx {
            nonce: 9,
            gas_price: U256::from(20_000_000_000u64),
            gas: 21_000,
            to: Some(Address::repeat_byte(0x35)),
            value: U256::from(10u64.pow(18)),
            data: Bytes::new(),
            v: U256::from(37),
            r: U256::from(1u8),
            s: U256::from(2u8),
        };
        let encoded = encode_typed(&TypedTransaction::Legacy(tx.clone()));
        match decode_typed(&encoded).unwrap() {
            TypedTransaction::Legacy(decoded) => assert_eq!(decoded, tx),
            other => panic!("wrong payload type: {other:?}"),
        }
    }

    #[test]
    fn test_contract_creation_to_is_empty_string() {
        let tx = LegacyTx {
            gas: 53_000,
            to: None,
            data: Bytes::from(vec![0x60, 0x80]),
            ..Default::default()
        };
        let encoded = encode_typed(&TypedTransaction::Legacy(tx));
        match decode_typed(&encoded).unwrap() {
            TypedTransaction::Legacy(decoded) => assert_eq!(decoded.to, None),
            other => panic!("wrong payload type: {other:?}"),
        }
    }

    #[test]
    fn test_access_list_round_trip() {
        let list = vec![
            AccessListItem {
                address: Address::repeat_byte(0x01),
                storage_keys: vec![B256::repeat_byte(0x02), B256::repeat_byte(0x03)],
            },
            AccessListItem {
                address: Address::repeat_byte(0x04),
                storage_keys: Vec::new(),
            },
        ];
        let mut out = Vec::new();
        encode_access_list(&list, &mut out);
        let decoded = decode_access_list(&mut out.as_slice()).unwrap();
        assert_eq!(decoded, list);
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let tx = LegacyTx {
            gas: 21_000,
            ..Default::default()
        };
        let mut encoded = encode_typed(&TypedTransaction::Legacy(tx));
        encoded.push(0x00);
        assert!(decode_typed(&encoded).is_err());
    }

    #[test]
    fn test_eip155_sig_payload_differs_per_chain() {
        let tx = TypedTransaction::Legacy(LegacyTx {
            gas: 21_000,
            ..Default::default()
        });
        assert_ne!(encode_sig_payload(&tx, 1), encode_sig_payload(&tx, 2));
    }
}
