// Path: crates/sdo-api/src/platform.rs
//! The platform service contract (§6): the primitives a host must supply
//! so the sealed blob store can seal and unseal `NORMAL` and `SECURE`
//! blobs. The IV counter discipline itself (§4.2) is owned by
//! `sdo-storage`, not the platform; see DESIGN.md for why the wire
//! contract's `get_platform_iv` is not reproduced here.

use sdo_types::StorageError;

/// Host-supplied key material and AEAD primitives for the sealed blob
/// store.
///
/// Implementations are expected to keep the platform AES key outside
/// process memory wherever the host platform allows (a hardware keystore,
/// a sealed enclave, or at minimum a zeroized heap buffer); this crate
/// only defines the shape of the call.
pub trait PlatformCrypto {
    /// Writes the platform AES-128 key into `out` (exactly
    /// [`sdo_types::limits::AES_KEY_SIZE`] bytes).
    fn get_platform_aes_key(&self, out: &mut [u8]) -> Result<(), StorageError>;

    /// Computes the keyed MAC used to seal a `NORMAL` blob over `data`,
    /// writing exactly [`sdo_types::limits::HMAC_SIZE`] bytes into `out`.
    fn compute_storage_mac(&self, data: &[u8], out: &mut [u8]) -> Result<(), StorageError>;

    /// Encrypts `plaintext` under `key` and `iv`, returning the ciphertext
    /// and the AEAD authentication tag.
    fn aes_gcm_encrypt(
        &self,
        plaintext: &[u8],
        iv: &[u8],
        key: &[u8],
    ) -> Result<(Vec<u8>, Vec<u8>), StorageError>;

    /// Decrypts `ciphertext` under `key` and `iv`, verifying it against
    /// `tag`. Returns [`StorageError::IntegrityFailure`] on a tag mismatch.
    fn aes_gcm_decrypt(
        &self,
        ciphertext: &[u8],
        iv: &[u8],
        tag: &[u8],
        key: &[u8],
    ) -> Result<Vec<u8>, StorageError>;
}
