// Path: crates/sdo-protocol/src/handlers/to1.rs
//! Transfer Ownership 1 handlers (msg30-msg33): locate the current owner
//! via the rendezvous service.

use rand::RngCore;
use sdo_api::{DeviceSigner, MessageReader, MessageWriter};
use sdo_crypto::{verify_signature, KeyAlgorithm, KeyEncoding};
use sdo_types::limits::GUID_SIZE;
use sdo_types::{ProtocolContext, ProtocolError, ProtocolState, RedirectRecord};

use super::codec::{decode_rsa_public_key_wire, tags};
use super::{awaiting_input, HandlerResult};

const NONCE_LEN: usize = 16;

/// `TO1.HelloSDO` (msg30): send the device GUID and a fresh nonce `n5`.
pub fn hello_sdo(ctx: &mut ProtocolContext, writer: &mut dyn MessageWriter) -> HandlerResult {
    let g2 = ctx.g2.ok_or_else(|| {
        ProtocolError::Internal("TO1 started without a device GUID".to_string())
    })?;
    let mut n5 = vec![0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut n5);

    writer.begin_block(ProtocolState::To1SndHello.msg_number())?;
    writer.begin_object()?;
    writer.write_tag(tags::GUID)?;
    writer.write_bytes(&g2)?;
    writer.write_tag(tags::NONCE_N5)?;
    writer.write_bytes(&n5)?;
    writer.end_object()?;

    ctx.n5 = Some(n5);
    Ok(ProtocolState::To1RcvHelloAck)
}

/// `TO1.HelloSDOAck` (msg31): receive the owner's echoed nonce `n5r` and
/// its public-key encoding.
pub fn hello_sdo_ack(ctx: &mut ProtocolContext, reader: &mut dyn MessageReader) -> HandlerResult {
    if awaiting_input(reader) {
        return Ok(ProtocolState::To1RcvHelloAck);
    }
    reader.next_block()?;
    reader.begin_object()?;
    reader.read_tag()?;
    let n5r = reader.read_bytes()?;
    reader.read_tag()?;
    let owner_key_encoding = reader.read_bytes()?;
    reader.end_object()?;

    if n5r.is_empty() || owner_key_encoding.is_empty() {
        return Err(ProtocolError::Violation(
            "TO1.HelloSDOAck missing n5r or owner key encoding".to_string(),
        ));
    }
    ctx.n5r = Some(n5r);
    ctx.key_exchange.owner_random = owner_key_encoding;
    Ok(ProtocolState::To1SndProve)
}

/// `TO1.ProveToSDO` (msg32): sign `{g2, n5r}` with the device key.
pub fn prove_to_sdo(
    ctx: &mut ProtocolContext,
    writer: &mut dyn MessageWriter,
    signer: &dyn DeviceSigner,
) -> HandlerResult {
    let g2 = ctx.g2.ok_or_else(|| {
        ProtocolError::Internal("TO1.ProveToSDO without a device GUID".to_string())
    })?;
    let n5r = ctx
        .n5r
        .clone()
        .ok_or_else(|| ProtocolError::Internal("TO1.ProveToSDO without n5r".to_string()))?;

    let mut message = Vec::with_capacity(GUID_SIZE + n5r.len());
    message.extend_from_slice(&g2);
    message.extend_from_slice(&n5r);
    let signature = signer.sign(&message)?;

    writer.begin_block(ProtocolState::To1SndProve.msg_number())?;
    writer.begin_object()?;
    writer.write_tag(tags::SIGNATURE)?;
    writer.write_bytes(&signature)?;
    writer.end_object()?;

    Ok(ProtocolState::To1RcvRedirect)
}

/// `TO1.SDORedirect` (msg33): receive and verify the owner's redirect
/// record, caching the target for TO2.
pub fn sdo_redirect(ctx: &mut ProtocolContext, reader: &mut dyn MessageReader) -> HandlerResult {
    if awaiting_input(reader) {
        return Ok(ProtocolState::To1RcvRedirect);
    }
    reader.next_block()?;
    reader.begin_object()?;
    reader.read_tag()?;
    let plain_text = reader.read_bytes()?;
    reader.read_tag()?;
    let ob_sig = reader.read_bytes()?;
    reader.end_object()?;

    let owner_key = decode_rsa_public_key_wire(&ctx.key_exchange.owner_random)?;
    verify_signature(
        KeyEncoding::RsaModExp,
        KeyAlgorithm::Rsa,
        &owner_key.modulus,
        &owner_key.exponent,
        &plain_text,
        &ob_sig,
    )?;

    ctx.redirect = Some(RedirectRecord { plain_text, ob_sig });
    ctx.success = true;
    Ok(ProtocolState::Done)
}
