// Path: crates/sdo-types/src/error.rs
//! Error taxonomy shared by every `sdo-*` crate.
//!
//! Every leaf error enum also implements [`ErrorCode`], giving it a stable,
//! machine-readable string identifier independent of its `Display` text.
//! The wire-level error block emitted by the protocol driver (`ec`/`emsg`/
//! `em`, see the protocol crate) is built from these codes, not from
//! `to_string()`, so that renaming a human-readable message never changes
//! the code a remote peer or test suite matches against.

use thiserror::Error;

/// Assigns a stable, machine-readable string code to an error variant.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// Errors from the RSA key verifier (`sdo-crypto`).
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The key encoding or algorithm tag was not `RSA_MOD_EXP`/`RSA`, or one
    /// of the supplied buffers was empty.
    #[error("unsupported or malformed key type")]
    InvalidKeyType,
    /// The signature length did not equal the RSA modulus size in bytes.
    #[error("signature length {got} does not match RSA modulus size {expected}")]
    WrongSignatureLength {
        /// Expected length, in bytes (the RSA modulus size).
        expected: usize,
        /// Actual length of the supplied signature, in bytes.
        got: usize,
    },
    /// PKCS#1 v1.5 verification over SHA-256 failed.
    #[error("signature failed verification")]
    SignatureInvalid,
    /// The modulus/exponent pair could not be assembled into an RSA public
    /// key.
    #[error("malformed key material: {0}")]
    InvalidKey(String),
}

impl ErrorCode for CryptoError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidKeyType => "CRYPTO_INVALID_KEY_TYPE",
            Self::WrongSignatureLength { .. } => "CRYPTO_WRONG_SIGNATURE_LENGTH",
            Self::SignatureInvalid => "CRYPTO_SIGNATURE_INVALID",
            Self::InvalidKey(_) => "CRYPTO_INVALID_KEY",
        }
    }
}

/// Errors from the sealed blob store (`sdo-storage`).
#[derive(Debug, Error)]
pub enum StorageError {
    /// A `NORMAL` blob's MAC did not match, or a `SECURE` blob's AEAD tag
    /// failed to authenticate.
    #[error("sealed blob failed integrity verification")]
    IntegrityFailure,
    /// The caller-supplied buffer was smaller than the stored plaintext.
    #[error("buffer of {available} bytes is smaller than the stored {needed} bytes")]
    BufferTooSmall {
        /// Number of bytes the stored plaintext actually occupies.
        needed: usize,
        /// Number of bytes the caller's buffer can hold.
        available: usize,
    },
    /// `nbytes` (on read or write) exceeded `R_MAX_SIZE`.
    #[error("size {0} exceeds the platform size limit")]
    SizeLimitExceeded(usize),
    /// The SECURE store's IV counter has wrapped back to its original seed;
    /// no further encryption is permitted under this key.
    #[error("IV counter exhausted; SECURE encryption refused")]
    IvExhausted,
    /// A named blob does not exist on disk.
    #[error("blob not found")]
    NotFound,
    /// An unexpected storage flag, or a flag mismatch between write and
    /// read, was used.
    #[error("invalid storage flag")]
    InvalidFlag,
    /// The platform key/IV service, or the filesystem, refused the
    /// operation.
    #[error("platform or filesystem resource failure: {0}")]
    ResourceFailure(String),
}

impl ErrorCode for StorageError {
    fn code(&self) -> &'static str {
        match self {
            Self::IntegrityFailure => "STORAGE_INTEGRITY_FAILURE",
            Self::BufferTooSmall { .. } => "STORAGE_BUFFER_TOO_SMALL",
            Self::SizeLimitExceeded(_) => "STORAGE_SIZE_LIMIT_EXCEEDED",
            Self::IvExhausted => "STORAGE_IV_EXHAUSTED",
            Self::NotFound => "STORAGE_NOT_FOUND",
            Self::InvalidFlag => "STORAGE_INVALID_FLAG",
            Self::ResourceFailure(_) => "STORAGE_RESOURCE_FAILURE",
        }
    }
}

/// Errors from the protocol state machine driver and its message handlers
/// (`sdo-protocol`).
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// An inbound message was structurally unexpected: a bad field, a
    /// length mismatch, or a message that arrived out of order.
    #[error("protocol violation: {0}")]
    Violation(String),
    /// A cryptographic verification failed.
    #[error("cryptographic failure: {0}")]
    Crypto(#[from] CryptoError),
    /// A sealed blob operation failed.
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
    /// TO2's round-trip counter exceeded `MAX_TO2_ROUND_TRIPS`.
    #[error("exceeded maximum number of TO2 rounds")]
    RoundTripExceeded,
    /// An internal invariant was violated (missing handler, unreachable
    /// state, allocation failure).
    #[error("internal error: {0}")]
    Internal(String),
    /// The remote peer sent a protocol-error block instead of the expected
    /// message. The core does not parse its contents (see DESIGN.md Open
    /// Questions); this variant only signals that the run must abort.
    #[error("remote peer aborted the exchange")]
    RemoteAborted,
}

impl ErrorCode for ProtocolError {
    fn code(&self) -> &'static str {
        match self {
            Self::Violation(_) => "PROTOCOL_VIOLATION",
            Self::Crypto(_) => "PROTOCOL_CRYPTO_FAILURE",
            Self::Storage(_) => "PROTOCOL_STORAGE_FAILURE",
            Self::RoundTripExceeded => "PROTOCOL_ROUND_TRIP_EXCEEDED",
            Self::Internal(_) => "PROTOCOL_INTERNAL_ERROR",
            Self::RemoteAborted => "PROTOCOL_REMOTE_ABORTED",
        }
    }
}

/// The `ec` field of the wire-level error block defined in §6 of the
/// specification. Only the two codes the driver itself ever emits are
/// modeled; a transport/serializer layer consuming this core may define
/// more of the full SDO error-code space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireErrorCode {
    /// A message from the peer failed to parse or validate.
    MessageBodyError,
    /// An internal limit (e.g. the TO2 round-trip cap) was hit.
    InternalServerError,
}

impl WireErrorCode {
    /// Returns the numeric code used on the wire.
    pub fn as_u32(self) -> u32 {
        match self {
            Self::MessageBodyError => 1,
            Self::InternalServerError => 100,
        }
    }
}
