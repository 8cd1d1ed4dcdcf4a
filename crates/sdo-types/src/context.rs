// Path: crates/sdo-types/src/context.rs
//! The protocol context (§3): a single-owner mutable record threaded
//! through one run of DI, TO1, or TO2.
//!
//! Every buffer here is owned, not borrowed from the transport, because a
//! run may suspend between messages (§5) and resume arbitrarily later.
//! `reset()` and `Drop` share one code path (`clear_secrets`) so that the
//! invariant from §8 -- no live owned buffers at a terminal state -- holds
//! on every exit, not just the happy one.

use crate::credentials::{DeviceCredentials, OwnerBlock};
use crate::limits::GUID_SIZE;
use crate::state::ProtocolState;
use zeroize::{Zeroize, Zeroizing};

/// The TO1 redirect record: the owner's `{plainText, Obsig}` pair, carried
/// from `To1RcvRedirect` into the start of a TO2 run.
#[derive(Debug, Clone, Default)]
pub struct RedirectRecord {
    /// The signed plaintext (owner address/port list) from `TO1.SDORedirect`.
    pub plain_text: Vec<u8>,
    /// The owner's signature over `plain_text`.
    pub ob_sig: Vec<u8>,
}

/// Diffie-Hellman or equivalent key-exchange material accumulated across
/// `To2SndHelloDevice` through `To2RcvProveOvHdr`. Held as opaque bytes;
/// the core does not interpret the exchange, only carries it between the
/// handlers that produce and consume it.
#[derive(Debug, Clone, Default)]
pub struct KeyExchangeState {
    /// This device's contribution to the exchange, once generated.
    pub device_random: Vec<u8>,
    /// The owner's contribution, once received.
    pub owner_random: Vec<u8>,
    /// The derived session key material, once both sides are known.
    pub shared_secret: Option<Vec<u8>>,
}

impl KeyExchangeState {
    fn clear(&mut self) {
        self.device_random.zeroize();
        self.owner_random.zeroize();
        if let Some(secret) = self.shared_secret.as_mut() {
            secret.zeroize();
        }
        self.shared_secret = None;
        self.device_random.clear();
        self.owner_random.clear();
    }
}

/// Where `To2SndNextDsi`/`To2RcvNextOsi` are in their respective iterations
/// over device and owner service-info modules (§9).
#[derive(Debug, Clone, Default)]
pub struct ServiceInfoCursor {
    /// Index of the device-side module currently emitting DSI payloads.
    pub device_module_index: usize,
    /// Opaque per-module cursor, reset to zero when `device_module_index`
    /// advances.
    pub device_module_cursor: u64,
    /// True once every device module has signaled completion.
    pub device_side_done: bool,
    /// True once every owner-supplied OSI payload has been dispatched.
    pub owner_side_done: bool,
}

/// A single-owner mutable record threaded through one run of DI, TO1, or
/// TO2 (§3).
#[derive(Debug)]
pub struct ProtocolContext<'a> {
    /// The state the next call to the driver will execute.
    pub state: ProtocolState,
    /// The persistent credential record this run reads from and, for DI,
    /// writes into.
    pub credentials: &'a mut DeviceCredentials,
    /// The device GUID (`g2`), set at DI and carried into every later run.
    pub g2: Option<[u8; GUID_SIZE]>,
    /// Key-exchange state for the current TO2 run.
    pub key_exchange: KeyExchangeState,
    /// Nonce generated locally at TO1 (`n5`, `To1SndHello`).
    pub n5: Option<Vec<u8>>,
    /// Nonce echoed back by the owner in `TO1.HelloSDOAck`.
    pub n5r: Option<Vec<u8>>,
    /// Nonce generated locally at TO2 (`n6`, `To2SndHelloDevice`).
    pub n6: Option<Vec<u8>>,
    /// Nonce extracted alongside the session key-exchange parameters in
    /// `TO2.ProveOVHdr`, consumed by `TO2.ProveDevice`.
    pub n7r: Option<Vec<u8>>,
    /// The new ownership-voucher-header MAC computed in `To2RcvProveOvHdr`,
    /// to be sealed as the device's credential once TO2 completes.
    pub new_ov_hdr_hmac: Option<Vec<u8>>,
    /// The redirect record produced by TO1, consumed at the start of TO2.
    pub redirect: Option<RedirectRecord>,
    /// Number of request/response round trips completed in the current
    /// TO2 run; checked against `MAX_TO2_ROUND_TRIPS` on every advance.
    pub round_trips: u32,
    /// Service-info iteration state for the current TO2 run.
    pub service_info: ServiceInfoCursor,
    /// The new owner block received in `TO2.SetupDevice`, held here until
    /// `TO2.Done2` commits it to the credential record and the sealed
    /// blob store together.
    pub pending_owner: Option<OwnerBlock>,
    /// The new ownership-voucher-header HMAC key received alongside
    /// `pending_owner`, committed at the same point.
    pub pending_hmac_key: Option<Zeroizing<Vec<u8>>>,
    /// Set once the run has reached `Done` with every invariant satisfied.
    pub success: bool,
}

impl<'a> ProtocolContext<'a> {
    /// Builds a fresh context for a run starting at `initial_state`,
    /// borrowing the credential record it will read or update.
    pub fn new(initial_state: ProtocolState, credentials: &'a mut DeviceCredentials) -> Self {
        let g2 = credentials.guid();
        Self {
            state: initial_state,
            credentials,
            g2,
            key_exchange: KeyExchangeState::default(),
            n5: None,
            n5r: None,
            n6: None,
            n7r: None,
            new_ov_hdr_hmac: None,
            redirect: None,
            round_trips: 0,
            service_info: ServiceInfoCursor::default(),
            pending_owner: None,
            pending_hmac_key: None,
            success: false,
        }
    }

    /// Zeroizes and drops every owned secret buffer and resets the
    /// round-trip counter, without touching `state` or `credentials`.
    /// Called from `Drop` and from the driver on a failed run so a reused
    /// context never leaks material from an aborted attempt.
    pub fn clear_secrets(&mut self) {
        self.key_exchange.clear();
        for nonce in [&mut self.n5, &mut self.n5r, &mut self.n6, &mut self.n7r] {
            if let Some(buf) = nonce.as_mut() {
                buf.zeroize();
            }
            *nonce = None;
        }
        if let Some(hmac) = self.new_ov_hdr_hmac.as_mut() {
            hmac.zeroize();
        }
        self.new_ov_hdr_hmac = None;
        if let Some(redirect) = self.redirect.as_mut() {
            redirect.plain_text.zeroize();
            redirect.ob_sig.zeroize();
        }
        self.redirect = None;
        self.round_trips = 0;
        self.service_info = ServiceInfoCursor::default();
        self.pending_owner = None;
        if let Some(key) = self.pending_hmac_key.as_mut() {
            key.zeroize();
        }
        self.pending_hmac_key = None;
    }

    /// Returns the context to its pre-run state, ready to begin a new
    /// protocol phase from `next_state`. Distinct from `Drop` only in that
    /// the caller keeps using the context afterward.
    pub fn reset(&mut self, next_state: ProtocolState) {
        self.clear_secrets();
        self.state = next_state;
        self.success = false;
    }
}

impl Drop for ProtocolContext<'_> {
    fn drop(&mut self) {
        self.clear_secrets();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{ManufacturerBlock, RsaPublicKeyWire};

    fn manufacturer() -> ManufacturerBlock {
        ManufacturerBlock {
            public_key: RsaPublicKeyWire::new(vec![1, 2, 3], vec![1, 0, 1]),
        }
    }

    #[test]
    fn reset_clears_nonces_and_round_trips() {
        let mut creds = DeviceCredentials::unclaimed(manufacturer());
        let mut ctx = ProtocolContext::new(ProtocolState::To2Init, &mut creds);
        ctx.n6 = Some(vec![9; 16]);
        ctx.round_trips = 4;
        ctx.reset(ProtocolState::To1Init);
        assert!(ctx.n6.is_none());
        assert_eq!(ctx.round_trips, 0);
        assert_eq!(ctx.state, ProtocolState::To1Init);
        assert!(!ctx.success);
    }

    #[test]
    fn drop_does_not_panic_with_live_secrets() {
        let mut creds = DeviceCredentials::unclaimed(manufacturer());
        let mut ctx = ProtocolContext::new(ProtocolState::To2Init, &mut creds);
        ctx.n5 = Some(vec![1; 16]);
        ctx.key_exchange.shared_secret = Some(vec![2; 32]);
        drop(ctx);
    }
}
