// Path: crates/sdo-storage/src/flags.rs
//! The three blob sealing disciplines (§4.2).

/// Which sealing discipline a blob is stored under. A read must use the
/// same flag the blob was written with; a mismatch surfaces as
/// [`sdo_types::StorageError::IntegrityFailure`] (`NORMAL`/`SECURE`) or
/// garbage bytes (`RAW`, which carries no self-describing framing at
/// all).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageFlag {
    /// No framing, no integrity or confidentiality. Used only for the
    /// EPID key passthrough read (SPEC_FULL §0.1).
    Raw,
    /// `MAC(32)||len(4 BE)||plaintext`, keyed with the platform's storage
    /// MAC key. Integrity and authenticity, no confidentiality.
    Normal,
    /// `IV(12)||tag(16)||len(4 BE)||ciphertext`, AES-GCM-128 under the
    /// platform AES key. Confidentiality, integrity, and authenticity.
    Secure,
}
