// Path: crates/sdo-protocol/src/handlers/di.rs
//! Device Initialization handlers (msg10-msg13).

use sdo_api::{MessageReader, MessageWriter, PlatformCrypto};
use sdo_storage::{SealedBlobStore, StorageFlag};
use sdo_types::{DeviceCredentials, ProtocolContext, ProtocolState};

use super::codec::{decode_owner_block, tags, NORMAL_CREDENTIALS_BLOB, SECURE_CREDENTIALS_BLOB};
use super::{awaiting_input, HandlerResult};

/// `DI.AppStart` (msg10): emit device attestation public data to the
/// manufacturer. The attestation key store itself (TPM, EPID) is an
/// out-of-scope collaborator (§1 Non-goals); the driver only carries
/// whatever bytes it was handed at construction.
pub fn app_start(writer: &mut dyn MessageWriter, attestation_data: &[u8]) -> HandlerResult {
    writer.begin_block(ProtocolState::DiAppStart.msg_number())?;
    writer.begin_object()?;
    writer.write_tag(tags::PAYLOAD)?;
    writer.write_bytes(attestation_data)?;
    writer.end_object()?;
    Ok(ProtocolState::DiSetCredentials)
}

/// `DI.SetCredentials` (msg11): receive the owner block and persist it
/// to the NORMAL blob.
pub fn set_credentials<P: PlatformCrypto>(
    ctx: &mut ProtocolContext,
    reader: &mut dyn MessageReader,
    store: &SealedBlobStore<P>,
) -> HandlerResult {
    if awaiting_input(reader) {
        return Ok(ProtocolState::DiSetCredentials);
    }
    reader.next_block()?;
    reader.begin_object()?;
    reader.read_tag()?;
    let owner_block_bytes = reader.read_bytes()?;
    reader.end_object()?;

    let owner_block = decode_owner_block(&owner_block_bytes)?;
    let encoded = super::codec::encode_owner_block(&owner_block);
    store
        .write(NORMAL_CREDENTIALS_BLOB, StorageFlag::Normal, &encoded)
        .map_err(sdo_types::ProtocolError::from)?;
    ctx.g2 = Some(owner_block.device_guid);
    ctx.credentials.owner = Some(owner_block);
    Ok(ProtocolState::DiSetHmac)
}

/// `DI.SetHMAC` (msg12): receive the ownership-voucher-header HMAC key
/// and seal it into the SECURE blob.
pub fn set_hmac<P: PlatformCrypto>(
    ctx: &mut ProtocolContext,
    reader: &mut dyn MessageReader,
    store: &SealedBlobStore<P>,
) -> HandlerResult {
    if awaiting_input(reader) {
        return Ok(ProtocolState::DiSetHmac);
    }
    reader.next_block()?;
    reader.begin_object()?;
    reader.read_tag()?;
    let hmac_key = reader.read_bytes()?;
    reader.end_object()?;

    store
        .write(SECURE_CREDENTIALS_BLOB, StorageFlag::Secure, &hmac_key)
        .map_err(sdo_types::ProtocolError::from)?;
    ctx.credentials.hmac_key = Some(hmac_key.into());
    Ok(ProtocolState::DiDone)
}

/// `DI.Done` (msg13): acknowledge completion.
pub fn done(ctx: &mut ProtocolContext, reader: &mut dyn MessageReader) -> HandlerResult {
    if awaiting_input(reader) {
        return Ok(ProtocolState::DiDone);
    }
    reader.next_block()?;
    ctx.success = true;
    Ok(ProtocolState::Done)
}

/// Whether `credentials` already carries everything a DI run would have
/// produced -- used by a caller deciding whether to start at DI or TO1.
pub fn is_claimed(credentials: &DeviceCredentials) -> bool {
    credentials.is_claimed()
}
