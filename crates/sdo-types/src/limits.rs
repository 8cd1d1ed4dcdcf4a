// Path: crates/sdo-types/src/limits.rs
//! Platform-wide size and protocol constants.
//!
//! These are centralized here, rather than scattered across the storage and
//! protocol crates, so that every crate agrees on a single source of truth.

/// Upper bound on the size of any plaintext a sealed blob may carry, and on
/// any single read/write buffer the core will accept. Exceeding this is
/// always a caller error, never a transient condition.
pub const R_MAX_SIZE: usize = 8192;

/// Maximum number of TO2 request/response round trips before the driver
/// gives up and emits `InternalServerError`.
pub const MAX_TO2_ROUND_TRIPS: u32 = 10;

/// Length in bytes of the keyed-MAC used to seal `NORMAL` blobs.
pub const HMAC_SIZE: usize = 32;

/// Length in bytes of the AES-GCM authentication tag used to seal `SECURE`
/// blobs.
pub const GCM_TAG_SIZE: usize = 16;

/// Length in bytes of the AES-GCM nonce (IV) used to seal `SECURE` blobs.
pub const GCM_IV_SIZE: usize = 12;

/// Length in bytes of the platform AES-128 key.
pub const AES_KEY_SIZE: usize = 16;

/// Width in bytes of the big-endian plaintext-length field framed into
/// `NORMAL` and `SECURE` blobs.
pub const LEN_FIELD_SIZE: usize = 4;

/// Length in bytes of a device GUID (`g2`).
pub const GUID_SIZE: usize = 16;

/// Maximum length in bytes of the UTF-8 `em` string in an emitted protocol
/// error block.
pub const MAX_ERROR_MESSAGE_LEN: usize = 63;
