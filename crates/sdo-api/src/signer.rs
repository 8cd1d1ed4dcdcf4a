// Path: crates/sdo-api/src/signer.rs
//! The device signing key contract.
//!
//! `ProveToSDO` (TO1) and `ProveDevice` (TO2) each sign a short message
//! with the device's own private key. That key lives in a device-specific
//! store (TPM, EPID) explicitly out of scope for this core (§1); this
//! trait is the seam the core calls through instead of knowing anything
//! about the key's storage or algorithm.

use sdo_types::ProtocolError;

/// Produces a signature over a message using the device's own private
/// key.
pub trait DeviceSigner {
    /// Signs `message`, returning the signature bytes in whatever form
    /// the paired owner-side verifier expects.
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, ProtocolError>;
}
