//! # sdo-types Crate Lints
//!
//! This crate enforces a strict set of lints to ensure high-quality,
//! panic-free, and well-documented code. Panics are disallowed in non-test
//! code to promote robust error handling.
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]
//! # sdo-types
//!
//! Core data structures, protocol state identifiers, and error types shared
//! by every other `sdo-*` crate. This crate defines the stable contract
//! between the protocol driver, the crypto verifier, and the sealed blob
//! store; it has no knowledge of transports, serializers, or plugins.

pub mod context;
pub mod credentials;
pub mod error;
pub mod limits;
pub mod state;

pub use context::{KeyExchangeState, ProtocolContext, RedirectRecord, ServiceInfoCursor};
pub use credentials::{
    DeviceCredentials, ManufacturerBlock, OwnerBlock, RendezvousInfo, RsaPublicKeyWire,
};
pub use error::{CryptoError, ErrorCode, ProtocolError, StorageError, WireErrorCode};
pub use state::ProtocolState;

#[cfg(test)]
mod tests {
    #[test]
    fn test_types_canary() {}
}
