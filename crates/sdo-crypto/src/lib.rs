// Path: crates/sdo-crypto/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]
//! # sdo-crypto
//!
//! The key verifier (§4.1): reconstructs an RSA public key from its wire
//! form and checks a PKCS#1 v1.5 signature over SHA-256. Every function
//! here is a pure check over public key material; it holds no long-lived
//! state between calls.

pub mod verify;

pub use verify::{verify_signature, KeyAlgorithm, KeyEncoding};

#[cfg(test)]
mod tests {
    #[test]
    fn test_crypto_canary() {}
}
