// Path: crates/sdo-storage/src/iv.rs
//! The SECURE-blob IV counter discipline (§4.2).
//!
//! Two 12-byte values are persisted alongside each SECURE blob: the
//! original seed the counter started from, and its current value. Every
//! encryption advances the counter by one AES block's worth of headroom,
//! or by two once a single write would cross 2^32 blocks, and refuses to
//! encrypt at all once the counter would wrap back to the seed -- at that
//! point the same nonce could be reused under the same key, which breaks
//! GCM's authentication guarantee entirely.

use sdo_types::limits::GCM_IV_SIZE;
use sdo_types::StorageError;

const AES_BLOCK_SIZE: usize = 16;
const BLOCK_COUNT_INCREMENT_THRESHOLD: u128 = 1u128 << 32;

/// The persisted `{seed, counter}` pair for one SECURE blob's IV.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IvCounterState {
    seed: [u8; GCM_IV_SIZE],
    counter: [u8; GCM_IV_SIZE],
}

impl IvCounterState {
    /// Starts a fresh counter at `seed`, as happens the first time a
    /// SECURE blob is written under a given name.
    pub fn fresh(seed: [u8; GCM_IV_SIZE]) -> Self {
        Self { seed, counter: seed }
    }

    /// Reconstructs a counter from its persisted `seed || counter` form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        if bytes.len() != 2 * GCM_IV_SIZE {
            return Err(StorageError::ResourceFailure(
                "malformed IV counter state".to_string(),
            ));
        }
        let mut seed = [0u8; GCM_IV_SIZE];
        let mut counter = [0u8; GCM_IV_SIZE];
        seed.copy_from_slice(&bytes[..GCM_IV_SIZE]);
        counter.copy_from_slice(&bytes[GCM_IV_SIZE..]);
        Ok(Self { seed, counter })
    }

    /// Serializes as `seed(12) || counter(12)` for persistence.
    pub fn to_bytes(&self) -> [u8; 2 * GCM_IV_SIZE] {
        let mut out = [0u8; 2 * GCM_IV_SIZE];
        out[..GCM_IV_SIZE].copy_from_slice(&self.seed);
        out[GCM_IV_SIZE..].copy_from_slice(&self.counter);
        out
    }

    /// The counter value currently in effect (the IV used by the most
    /// recent successful encryption, or the seed if none has run yet).
    pub fn current(&self) -> [u8; GCM_IV_SIZE] {
        self.counter
    }

    /// Advances the counter for an upcoming encryption of
    /// `upcoming_plaintext_bytes`, returning the IV to use, or
    /// [`StorageError::IvExhausted`] if doing so would wrap the counter
    /// back to its original seed.
    pub fn advance(&mut self, upcoming_plaintext_bytes: usize) -> Result<[u8; GCM_IV_SIZE], StorageError> {
        let block_count = upcoming_plaintext_bytes.div_ceil(AES_BLOCK_SIZE) as u128;
        let increment: u128 = if block_count >= BLOCK_COUNT_INCREMENT_THRESHOLD {
            2
        } else {
            1
        };

        let modulus = 1u128 << (GCM_IV_SIZE * 8);
        let current = be_bytes_to_u128(&self.counter);
        let next = (current + increment) % modulus;
        let next_bytes = u128_to_be_bytes(next);

        if next_bytes == self.seed {
            return Err(StorageError::IvExhausted);
        }
        self.counter = next_bytes;
        Ok(self.counter)
    }
}

fn be_bytes_to_u128(bytes: &[u8; GCM_IV_SIZE]) -> u128 {
    let mut wide = [0u8; 16];
    wide[4..].copy_from_slice(bytes);
    u128::from_be_bytes(wide)
}

fn u128_to_be_bytes(value: u128) -> [u8; GCM_IV_SIZE] {
    let wide = value.to_be_bytes();
    let mut out = [0u8; GCM_IV_SIZE];
    out.copy_from_slice(&wide[4..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_by_one_for_small_writes() {
        let seed = [0u8; GCM_IV_SIZE];
        let mut counter = IvCounterState::fresh(seed);
        let iv = counter.advance(64).expect("advance");
        assert_eq!(be_bytes_to_u128(&iv), 1);
    }

    #[test]
    fn refuses_when_counter_would_wrap_to_seed() {
        let seed = [0u8; GCM_IV_SIZE];
        let mut counter = IvCounterState {
            seed,
            counter: u128_to_be_bytes((1u128 << (GCM_IV_SIZE * 8)) - 1),
        };
        let result = counter.advance(16);
        assert!(matches!(result, Err(StorageError::IvExhausted)));
    }

    #[test]
    fn round_trips_through_bytes() {
        let seed = [7u8; GCM_IV_SIZE];
        let mut counter = IvCounterState::fresh(seed);
        counter.advance(16).expect("advance");
        let encoded = counter.to_bytes();
        let decoded = IvCounterState::from_bytes(&encoded).expect("decode");
        assert_eq!(decoded, counter);
    }
}
