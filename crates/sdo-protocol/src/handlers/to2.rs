// Path: crates/sdo-protocol/src/handlers/to2.rs
//! Transfer Ownership 2 handlers (msg40-msg51): mutual proof with the
//! current owner, the ownership-voucher entry chain, the service-info
//! exchange, and the handover to a new owner credential.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroize;

use sdo_api::{DeviceSigner, MessageReader, MessageWriter, PlatformCrypto, ServiceInfoModule, ServiceInfoOutcome};
use sdo_crypto::{verify_signature, KeyAlgorithm, KeyEncoding};
use sdo_storage::{SealedBlobStore, StorageFlag};
use sdo_types::limits::{GUID_SIZE, HMAC_SIZE};
use sdo_types::{ProtocolContext, ProtocolError, ProtocolState};

use super::codec::{
    decode_owner_block, decode_rsa_public_key_wire, encode_owner_block, encode_rsa_public_key_wire,
    tags, NORMAL_CREDENTIALS_BLOB, SECURE_CREDENTIALS_BLOB,
};
use super::{awaiting_input, HandlerResult};

const NONCE_LEN: usize = 16;

/// `TO2.HelloDevice` (msg40): open the session and send a fresh nonce `n6`.
pub fn hello_device(ctx: &mut ProtocolContext, writer: &mut dyn MessageWriter) -> HandlerResult {
    let g2 = ctx
        .g2
        .ok_or_else(|| ProtocolError::Internal("TO2 started without a device GUID".to_string()))?;
    let mut n6 = vec![0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut n6);

    writer.begin_block(ProtocolState::To2SndHelloDevice.msg_number())?;
    writer.begin_object()?;
    writer.write_tag(tags::GUID)?;
    writer.write_bytes(&g2)?;
    writer.write_tag(tags::NONCE_N6)?;
    writer.write_bytes(&n6)?;
    writer.end_object()?;

    ctx.n6 = Some(n6);
    Ok(ProtocolState::To2RcvProveOvHdr)
}

/// `TO2.ProveOVHdr` (msg41): receive the ownership-voucher header and the
/// owner's proof over it, verify the signature, compute the new
/// ownership-voucher-header HMAC, and extract the session key-exchange
/// parameters -- which on this wire carries `n7r`, the nonce `ProveDevice`
/// signs alongside `g2`.
pub fn prove_ov_hdr(ctx: &mut ProtocolContext, reader: &mut dyn MessageReader) -> HandlerResult {
    if awaiting_input(reader) {
        return Ok(ProtocolState::To2RcvProveOvHdr);
    }
    reader.next_block()?;
    reader.begin_object()?;
    reader.read_tag()?;
    let ov_header = reader.read_bytes()?;
    reader.read_tag()?;
    let owner_key_wire = reader.read_bytes()?;
    reader.read_tag()?;
    let signature = reader.read_bytes()?;
    reader.read_tag()?;
    let n7r = reader.read_bytes()?;
    reader.read_tag()?;
    let key_exchange_params = reader.read_bytes()?;
    reader.end_object()?;

    if n7r.is_empty() {
        return Err(ProtocolError::Violation(
            "TO2.ProveOVHdr missing n7r".to_string(),
        ));
    }

    let owner_key = decode_rsa_public_key_wire(&owner_key_wire)?;
    verify_signature(
        KeyEncoding::RsaModExp,
        KeyAlgorithm::Rsa,
        &owner_key.modulus,
        &owner_key.exponent,
        &ov_header,
        &signature,
    )?;

    let hmac_key = ctx
        .credentials
        .hmac_key
        .as_ref()
        .ok_or_else(|| ProtocolError::Internal("TO2.ProveOVHdr without an HMAC key".to_string()))?;
    let mut mac = Hmac::<Sha256>::new_from_slice(hmac_key)
        .map_err(|err| ProtocolError::Internal(err.to_string()))?;
    mac.update(&ov_header);
    let mut new_ov_hdr_hmac = mac.finalize().into_bytes().to_vec();
    if new_ov_hdr_hmac.len() != HMAC_SIZE {
        new_ov_hdr_hmac.zeroize();
        return Err(ProtocolError::Internal(
            "unexpected ownership-voucher-header HMAC length".to_string(),
        ));
    }

    ctx.new_ov_hdr_hmac = Some(new_ov_hdr_hmac);
    ctx.n7r = Some(n7r);
    ctx.key_exchange.owner_random = key_exchange_params;
    // The chain-of-custody walk in GetOPNextEntry/OPNextEntry starts from
    // the manufacturer's key and verifies forward to the key that just
    // signed this header.
    ctx.key_exchange.device_random =
        encode_rsa_public_key_wire(&ctx.credentials.manufacturer.public_key);
    Ok(ProtocolState::To2SndGetOpNextEntry)
}

/// `TO2.GetOPNextEntry` (msg42): request the next ownership-voucher entry.
pub fn get_op_next_entry(writer: &mut dyn MessageWriter) -> HandlerResult {
    writer.begin_block(ProtocolState::To2SndGetOpNextEntry.msg_number())?;
    writer.begin_object()?;
    writer.end_object()?;
    Ok(ProtocolState::To2RcvOpNextEntry)
}

/// `TO2.OPNextEntry` (msg43): verify that this entry's signature chains
/// from the previously verified key to this entry's key, then either loop
/// back for the next entry or, once the owner marks this the last entry,
/// move on to `ProveDevice`.
pub fn op_next_entry(ctx: &mut ProtocolContext, reader: &mut dyn MessageReader) -> HandlerResult {
    if awaiting_input(reader) {
        return Ok(ProtocolState::To2RcvOpNextEntry);
    }
    reader.next_block()?;
    reader.begin_object()?;
    reader.read_tag()?;
    let entry_key_wire = reader.read_bytes()?;
    reader.read_tag()?;
    let entry_sig = reader.read_bytes()?;
    reader.read_tag()?;
    let is_last = reader.read_uint()?;
    reader.end_object()?;

    let previous_key = decode_rsa_public_key_wire(&ctx.key_exchange.device_random)?;
    verify_signature(
        KeyEncoding::RsaModExp,
        KeyAlgorithm::Rsa,
        &previous_key.modulus,
        &previous_key.exponent,
        &entry_key_wire,
        &entry_sig,
    )?;

    if is_last != 0 {
        let current_owner = decode_rsa_public_key_wire(&ctx.key_exchange.owner_random)?;
        if entry_key_wire != encode_rsa_public_key_wire(&current_owner) {
            return Err(ProtocolError::Violation(
                "ownership-voucher entry chain does not terminate at the proving owner"
                    .to_string(),
            ));
        }
        return Ok(ProtocolState::To2SndProveDevice);
    }

    ctx.key_exchange.device_random = entry_key_wire;
    Ok(ProtocolState::To2SndGetOpNextEntry)
}

/// `TO2.ProveDevice` (msg44): sign `{g2, n7r}` with the device's own key.
pub fn prove_device(
    ctx: &mut ProtocolContext,
    writer: &mut dyn MessageWriter,
    signer: &dyn DeviceSigner,
) -> HandlerResult {
    let g2 = ctx
        .g2
        .ok_or_else(|| ProtocolError::Internal("TO2.ProveDevice without a device GUID".to_string()))?;
    let n7r = ctx
        .n7r
        .clone()
        .ok_or_else(|| ProtocolError::Internal("TO2.ProveDevice without n7r".to_string()))?;

    let mut message = Vec::with_capacity(GUID_SIZE + n7r.len());
    message.extend_from_slice(&g2);
    message.extend_from_slice(&n7r);
    let signature = signer.sign(&message)?;

    writer.begin_block(ProtocolState::To2SndProveDevice.msg_number())?;
    writer.begin_object()?;
    writer.write_tag(tags::SIGNATURE)?;
    writer.write_bytes(&signature)?;
    writer.end_object()?;

    Ok(ProtocolState::To2RcvGetNextDsi)
}

/// `TO2.GetNextDeviceServiceInfo` (msg45): the owner's trigger to begin
/// emitting DSI payloads. Calls `on_start` on the module about to produce
/// its first payload; a module's cursor is `0` exactly when it has not
/// yet started, so this is only ever re-triggered once per module.
pub fn get_next_dsi(
    ctx: &mut ProtocolContext,
    reader: &mut dyn MessageReader,
    modules: &mut [Box<dyn ServiceInfoModule>],
) -> HandlerResult {
    if awaiting_input(reader) {
        return Ok(ProtocolState::To2RcvGetNextDsi);
    }
    reader.next_block()?;

    if modules.is_empty() {
        ctx.service_info.device_side_done = true;
    } else if ctx.service_info.device_module_cursor == 0 {
        let idx = ctx.service_info.device_module_index;
        if let Some(module) = modules.get_mut(idx) {
            module.on_start()?;
        }
    }
    Ok(ProtocolState::To2SndNextDsi)
}

/// `TO2.NextDeviceServiceInfo` (msg46): emit one DSI payload, skipping
/// forward through modules that signal `Done` without a transport round
/// trip, and announcing completion once every module has finished.
pub fn next_dsi(
    ctx: &mut ProtocolContext,
    writer: &mut dyn MessageWriter,
    modules: &mut [Box<dyn ServiceInfoModule>],
) -> HandlerResult {
    loop {
        if ctx.service_info.device_module_index >= modules.len() {
            ctx.service_info.device_side_done = true;
        }
        if ctx.service_info.device_side_done {
            writer.begin_block(ProtocolState::To2SndNextDsi.msg_number())?;
            writer.begin_object()?;
            writer.write_tag(tags::DONE)?;
            writer.write_uint(1)?;
            writer.end_object()?;
            return Ok(ProtocolState::To2RcvSetupDevice);
        }

        let idx = ctx.service_info.device_module_index;
        let module = modules
            .get_mut(idx)
            .ok_or_else(|| ProtocolError::Internal("device-info module index out of range".to_string()))?;
        let outcome = module.exec("dsi", ctx.service_info.device_module_cursor, None)?;
        match outcome {
            ServiceInfoOutcome::Payload { bytes, next_cursor } => {
                writer.begin_block(ProtocolState::To2SndNextDsi.msg_number())?;
                writer.begin_object()?;
                writer.write_tag(tags::MESSAGE_TYPE)?;
                writer.write_string(module.name())?;
                writer.write_tag(tags::PAYLOAD)?;
                writer.write_bytes(&bytes)?;
                writer.write_tag(tags::DONE)?;
                writer.write_uint(0)?;
                writer.end_object()?;
                ctx.service_info.device_module_cursor = next_cursor;
                return Ok(ProtocolState::To2RcvGetNextDsi);
            }
            ServiceInfoOutcome::Done => {
                module.on_end()?;
                ctx.service_info.device_module_index += 1;
                ctx.service_info.device_module_cursor = 0;
            }
        }
    }
}

/// `TO2.SetupDevice` (msg47): receive the new owner's credential block and
/// ownership-voucher-header HMAC key, and hold them pending `Done2`.
pub fn setup_device(ctx: &mut ProtocolContext, reader: &mut dyn MessageReader) -> HandlerResult {
    if awaiting_input(reader) {
        return Ok(ProtocolState::To2RcvSetupDevice);
    }
    reader.next_block()?;
    reader.begin_object()?;
    reader.read_tag()?;
    let owner_block_bytes = reader.read_bytes()?;
    reader.read_tag()?;
    let new_hmac_key = reader.read_bytes()?;
    reader.end_object()?;

    let owner_block = decode_owner_block(&owner_block_bytes)?;
    ctx.pending_owner = Some(owner_block);
    ctx.pending_hmac_key = Some(new_hmac_key.into());
    Ok(ProtocolState::To2SndGetNextOsi)
}

/// `TO2.GetNextOwnerServiceInfo` (msg48): request the next owner
/// service-info payload.
pub fn get_next_osi(writer: &mut dyn MessageWriter) -> HandlerResult {
    writer.begin_block(ProtocolState::To2SndGetNextOsi.msg_number())?;
    writer.begin_object()?;
    writer.end_object()?;
    Ok(ProtocolState::To2RcvNextOsi)
}

/// `TO2.OwnerServiceInfo` (msg49): dispatch one inbound owner service-info
/// payload to the module it names, or, once the owner signals completion,
/// move on to `Done`.
pub fn next_osi(
    ctx: &mut ProtocolContext,
    reader: &mut dyn MessageReader,
    modules: &mut [Box<dyn ServiceInfoModule>],
) -> HandlerResult {
    if awaiting_input(reader) {
        return Ok(ProtocolState::To2RcvNextOsi);
    }
    reader.next_block()?;
    reader.begin_object()?;
    reader.read_tag()?;
    let done = reader.read_uint()?;
    if done != 0 {
        reader.end_object()?;
        ctx.service_info.owner_side_done = true;
        return Ok(ProtocolState::To2SndDone);
    }
    reader.read_tag()?;
    let module_name = reader.read_string()?;
    reader.read_tag()?;
    let payload = reader.read_bytes()?;
    reader.end_object()?;

    let module = modules
        .iter_mut()
        .find(|module| module.name() == module_name)
        .ok_or_else(|| {
            ProtocolError::Violation(format!("owner service-info names unknown module {module_name}"))
        })?;
    module.exec("osi", 0, Some(&payload))?;
    Ok(ProtocolState::To2SndGetNextOsi)
}

/// `TO2.Done` (msg50): echo `n6` and signal completion.
pub fn done(ctx: &mut ProtocolContext, writer: &mut dyn MessageWriter) -> HandlerResult {
    let n6 = ctx
        .n6
        .clone()
        .ok_or_else(|| ProtocolError::Internal("TO2.Done without n6".to_string()))?;

    writer.begin_block(ProtocolState::To2SndDone.msg_number())?;
    writer.begin_object()?;
    writer.write_tag(tags::NONCE_N6)?;
    writer.write_bytes(&n6)?;
    writer.end_object()?;

    Ok(ProtocolState::To2RcvDone2)
}

/// `TO2.Done2` (msg51): validate the owner's final acknowledgment and
/// commit the new owner credential and HMAC key, sealing both into the
/// blob store before the run succeeds.
pub fn done2<P: PlatformCrypto>(
    ctx: &mut ProtocolContext,
    reader: &mut dyn MessageReader,
    store: &SealedBlobStore<P>,
) -> HandlerResult {
    if awaiting_input(reader) {
        return Ok(ProtocolState::To2RcvDone2);
    }
    reader.next_block()?;
    reader.begin_object()?;
    reader.read_tag()?;
    let accepted = reader.read_uint()?;
    reader.end_object()?;

    if accepted == 0 {
        return Err(ProtocolError::Violation(
            "TO2.Done2 owner did not acknowledge completion".to_string(),
        ));
    }

    let owner_block = ctx
        .pending_owner
        .take()
        .ok_or_else(|| ProtocolError::Internal("TO2.Done2 without a pending owner block".to_string()))?;
    let hmac_key = ctx
        .pending_hmac_key
        .take()
        .ok_or_else(|| ProtocolError::Internal("TO2.Done2 without a pending HMAC key".to_string()))?;

    let encoded_owner = encode_owner_block(&owner_block);
    store
        .write(NORMAL_CREDENTIALS_BLOB, StorageFlag::Normal, &encoded_owner)
        .map_err(ProtocolError::from)?;
    store
        .write(SECURE_CREDENTIALS_BLOB, StorageFlag::Secure, &hmac_key)
        .map_err(ProtocolError::from)?;

    ctx.credentials.owner = Some(owner_block);
    ctx.credentials.hmac_key = Some(hmac_key);
    ctx.success = true;
    Ok(ProtocolState::Done)
}
