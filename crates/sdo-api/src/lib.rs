// Path: crates/sdo-api/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]
//! # sdo-api
//!
//! Trait contracts the protocol core consumes from its collaborators: the
//! wire serializer (§4.3), the host platform's key and AEAD services (§6),
//! and device service-info modules (§9). None of these traits are
//! implemented here; `sdo-protocol` is generic over them, and a host binary
//! supplies concrete implementations.

pub mod platform;
pub mod service_info;
pub mod serializer;
pub mod signer;

#[cfg(feature = "tracing-init")]
pub mod logging;

pub use platform::PlatformCrypto;
pub use serializer::{MessageReader, MessageWriter};
pub use service_info::{ServiceInfoModule, ServiceInfoOutcome};
pub use signer::DeviceSigner;

#[cfg(test)]
mod tests {
    #[test]
    fn test_api_canary() {}
}
