// Path: crates/sdo-types/src/credentials.rs
//! The persistent device credentials record (§3 Data Model).

use crate::limits::GUID_SIZE;
use zeroize::Zeroizing;

/// The wire form of an RSA public key consumed by the key verifier: two
/// independent-length big-endian byte strings, modulus then exponent
/// (§3, §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaPublicKeyWire {
    /// Big-endian modulus bytes.
    pub modulus: Vec<u8>,
    /// Big-endian public exponent bytes.
    pub exponent: Vec<u8>,
}

impl RsaPublicKeyWire {
    /// Builds a wire key, borrowing neither input.
    pub fn new(modulus: Vec<u8>, exponent: Vec<u8>) -> Self {
        Self { modulus, exponent }
    }
}

/// Opaque rendezvous directions for locating the current owner in TO1. The
/// core treats this as a bag of bytes the transport layer interprets; it is
/// round-tripped through DI and read back out in TO1 unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RendezvousInfo {
    /// Opaque rendezvous directive entries, as received from the owner
    /// block during DI.
    pub entries: Vec<Vec<u8>>,
}

/// The owner block of a device credential: everything the owner side of
/// the protocol contributed, most recently at DI or the last successful
/// TO2.
#[derive(Debug, Clone)]
pub struct OwnerBlock {
    /// The SDO protocol version this credential was created under.
    pub protocol_version: u16,
    /// The device GUID (`g2`) assigned at DI.
    pub device_guid: [u8; GUID_SIZE],
    /// Rendezvous directions for locating the current owner.
    pub rendezvous_info: RendezvousInfo,
    /// The hash chain of owner public keys, oldest first, establishing
    /// provenance from the manufacturer to the current owner.
    pub owner_public_key_hash_chain: Vec<Vec<u8>>,
}

/// The manufacturer block of a device credential: fixed for the life of
/// the device, written once at DI.
#[derive(Debug, Clone)]
pub struct ManufacturerBlock {
    /// The manufacturer's RSA public key, used to validate the DI-issued
    /// credential chain.
    pub public_key: RsaPublicKeyWire,
}

/// The full persistent device credential record (§3).
///
/// `hmac_key` is the key used to seal the ownership-voucher-header MAC; it
/// is zeroized on drop because it is the one piece of long-lived secret
/// material this crate's data model carries directly (the platform AES key
/// used by the sealed blob store never passes through this struct).
#[derive(Debug, Clone)]
pub struct DeviceCredentials {
    /// Present once DI has completed; `None` for a freshly manufactured,
    /// unclaimed device.
    pub owner: Option<OwnerBlock>,
    /// Present from DI onward.
    pub manufacturer: ManufacturerBlock,
    /// The ownership-voucher-header HMAC key, present once DI's
    /// `SetHMAC` handler has run.
    pub hmac_key: Option<Zeroizing<Vec<u8>>>,
}

impl DeviceCredentials {
    /// Constructs a fresh, unclaimed credential record holding only the
    /// manufacturer block (the state immediately before DI runs).
    pub fn unclaimed(manufacturer: ManufacturerBlock) -> Self {
        Self {
            owner: None,
            manufacturer,
            hmac_key: None,
        }
    }

    /// True once an owner block has been established (DI has completed at
    /// least once). Used by a caller deciding whether to begin a run at DI
    /// or at TO1.
    pub fn is_claimed(&self) -> bool {
        self.owner.is_some()
    }

    /// Returns the device GUID (`g2`) from the owner block, if claimed.
    pub fn guid(&self) -> Option<[u8; GUID_SIZE]> {
        self.owner.as_ref().map(|o| o.device_guid)
    }
}
