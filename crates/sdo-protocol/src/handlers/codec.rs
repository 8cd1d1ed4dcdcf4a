// Path: crates/sdo-protocol/src/handlers/codec.rs
//! Field tags shared by the message handlers, and the flattening of
//! [`OwnerBlock`] into the byte form persisted in the NORMAL credential
//! blob. The serializer interface (§4.3) is tag-based and opaque to wire
//! format; these names are this implementation's own vocabulary, not a
//! wire-format guarantee.

use sdo_types::credentials::{OwnerBlock, RendezvousInfo, RsaPublicKeyWire};
use sdo_types::limits::GUID_SIZE;
use sdo_types::ProtocolError;

pub mod tags {
    pub const PROTOCOL_VERSION: &str = "pv";
    pub const GUID: &str = "g2";
    pub const RENDEZVOUS_INFO: &str = "ro";
    pub const PUBLIC_KEY_HASH_CHAIN: &str = "pkh";
    pub const NONCE_N5: &str = "n5";
    pub const NONCE_N5R: &str = "n5r";
    pub const NONCE_N6: &str = "n6";
    pub const NONCE_N7R: &str = "n7r";
    pub const OWNER_KEY_ENCODING: &str = "pe";
    pub const SIGNATURE: &str = "sg";
    pub const REDIRECT_PLAIN_TEXT: &str = "pt";
    pub const REDIRECT_SIGNATURE: &str = "obsig";
    pub const HMAC_KEY: &str = "hmac";
    pub const MESSAGE_TYPE: &str = "mt";
    pub const CURSOR: &str = "cur";
    pub const PAYLOAD: &str = "body";
    pub const DONE: &str = "done";
}

/// The blob name the NORMAL-sealed owner block is persisted under.
pub const NORMAL_CREDENTIALS_BLOB: &str = "normal";
/// The blob name the SECURE-sealed ownership-voucher-header HMAC key is
/// persisted under.
pub const SECURE_CREDENTIALS_BLOB: &str = "secure";
/// The blob name the raw manufacturer-issued device attestation key is
/// read from (SPEC_FULL §0.1, the EPID passthrough read).
pub const EPID_KEY_BLOB: &str = "epid";

/// Flattens an owner block into the bytes persisted as the NORMAL blob's
/// plaintext.
pub fn encode_owner_block(block: &OwnerBlock) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&block.protocol_version.to_be_bytes());
    out.extend_from_slice(&block.device_guid);
    write_length_prefixed_list(&mut out, &block.rendezvous_info.entries);
    write_length_prefixed_list(&mut out, &block.owner_public_key_hash_chain);
    out
}

/// Reconstructs an owner block from NORMAL blob plaintext.
pub fn decode_owner_block(bytes: &[u8]) -> Result<OwnerBlock, ProtocolError> {
    let mut cursor = 0usize;
    let protocol_version = read_u16(bytes, &mut cursor)?;
    let device_guid = read_guid(bytes, &mut cursor)?;
    let entries = read_length_prefixed_list(bytes, &mut cursor)?;
    let owner_public_key_hash_chain = read_length_prefixed_list(bytes, &mut cursor)?;
    Ok(OwnerBlock {
        protocol_version,
        device_guid,
        rendezvous_info: RendezvousInfo { entries },
        owner_public_key_hash_chain,
    })
}

fn write_length_prefixed_list(out: &mut Vec<u8>, entries: &[Vec<u8>]) {
    out.extend_from_slice(&(entries.len() as u32).to_be_bytes());
    for entry in entries {
        out.extend_from_slice(&(entry.len() as u32).to_be_bytes());
        out.extend_from_slice(entry);
    }
}

fn read_u16(bytes: &[u8], cursor: &mut usize) -> Result<u16, ProtocolError> {
    let slice = bytes
        .get(*cursor..*cursor + 2)
        .ok_or_else(|| ProtocolError::Violation("truncated owner block".to_string()))?;
    *cursor += 2;
    let array: [u8; 2] = slice
        .try_into()
        .map_err(|_| ProtocolError::Violation("malformed owner block".to_string()))?;
    Ok(u16::from_be_bytes(array))
}

fn read_u32(bytes: &[u8], cursor: &mut usize) -> Result<u32, ProtocolError> {
    let slice = bytes
        .get(*cursor..*cursor + 4)
        .ok_or_else(|| ProtocolError::Violation("truncated owner block".to_string()))?;
    *cursor += 4;
    let array: [u8; 4] = slice
        .try_into()
        .map_err(|_| ProtocolError::Violation("malformed owner block".to_string()))?;
    Ok(u32::from_be_bytes(array))
}

fn read_guid(bytes: &[u8], cursor: &mut usize) -> Result<[u8; GUID_SIZE], ProtocolError> {
    let slice = bytes
        .get(*cursor..*cursor + GUID_SIZE)
        .ok_or_else(|| ProtocolError::Violation("truncated owner block".to_string()))?;
    *cursor += GUID_SIZE;
    let mut guid = [0u8; GUID_SIZE];
    guid.copy_from_slice(slice);
    Ok(guid)
}

fn read_length_prefixed_list(bytes: &[u8], cursor: &mut usize) -> Result<Vec<Vec<u8>>, ProtocolError> {
    let count = read_u32(bytes, cursor)?;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let len = read_u32(bytes, cursor)? as usize;
        let slice = bytes
            .get(*cursor..*cursor + len)
            .ok_or_else(|| ProtocolError::Violation("truncated owner block entry".to_string()))?;
        *cursor += len;
        entries.push(slice.to_vec());
    }
    Ok(entries)
}

/// Encodes an RSA public key in the wire form consumed by the key
/// verifier (§6): `(modulus_len:u16, modulus, exponent_len:u16,
/// exponent)`, big-endian lengths.
pub fn encode_rsa_public_key_wire(key: &RsaPublicKeyWire) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + key.modulus.len() + key.exponent.len());
    out.extend_from_slice(&(key.modulus.len() as u16).to_be_bytes());
    out.extend_from_slice(&key.modulus);
    out.extend_from_slice(&(key.exponent.len() as u16).to_be_bytes());
    out.extend_from_slice(&key.exponent);
    out
}

/// Decodes an RSA public key from its wire form (§6).
pub fn decode_rsa_public_key_wire(bytes: &[u8]) -> Result<RsaPublicKeyWire, ProtocolError> {
    let mut cursor = 0usize;
    let modulus_len = read_u16(bytes, &mut cursor)? as usize;
    let modulus = bytes
        .get(cursor..cursor + modulus_len)
        .ok_or_else(|| ProtocolError::Violation("truncated RSA key modulus".to_string()))?
        .to_vec();
    cursor += modulus_len;
    let exponent_len = read_u16(bytes, &mut cursor)? as usize;
    let exponent = bytes
        .get(cursor..cursor + exponent_len)
        .ok_or_else(|| ProtocolError::Violation("truncated RSA key exponent".to_string()))?
        .to_vec();
    Ok(RsaPublicKeyWire::new(modulus, exponent))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_block_round_trips_through_encode_decode() {
        let block = OwnerBlock {
            protocol_version: 101,
            device_guid: [9u8; GUID_SIZE],
            rendezvous_info: RendezvousInfo {
                entries: vec![vec![1, 2, 3], vec![4, 5]],
            },
            owner_public_key_hash_chain: vec![vec![0xAA; 32]],
        };
        let encoded = encode_owner_block(&block);
        let decoded = decode_owner_block(&encoded).expect("decode");
        assert_eq!(decoded.protocol_version, block.protocol_version);
        assert_eq!(decoded.device_guid, block.device_guid);
        assert_eq!(decoded.rendezvous_info.entries, block.rendezvous_info.entries);
        assert_eq!(
            decoded.owner_public_key_hash_chain,
            block.owner_public_key_hash_chain
        );
    }

    #[test]
    fn rsa_public_key_wire_round_trips() {
        let key = RsaPublicKeyWire::new(vec![0xAB; 256], vec![1, 0, 1]);
        let encoded = encode_rsa_public_key_wire(&key);
        let decoded = decode_rsa_public_key_wire(&encoded).expect("decode");
        assert_eq!(decoded, key);
    }
}
