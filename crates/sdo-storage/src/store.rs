// Path: crates/sdo-storage/src/store.rs
//! The sealed blob store's read/write/size operations (§4.2).

use std::fs;
use std::path::{Path, PathBuf};

use rand::RngCore;
use sdo_api::PlatformCrypto;
use sdo_types::limits::{GCM_IV_SIZE, GCM_TAG_SIZE, HMAC_SIZE, LEN_FIELD_SIZE, R_MAX_SIZE};
use sdo_types::StorageError;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::flags::StorageFlag;
use crate::iv::IvCounterState;

/// File-backed store for RAW, NORMAL, and SECURE blobs, parameterized
/// over the host's [`PlatformCrypto`] implementation.
pub struct SealedBlobStore<P> {
    base_dir: PathBuf,
    platform: P,
}

impl<P: PlatformCrypto> SealedBlobStore<P> {
    /// Opens a store rooted at `base_dir`. The directory is not created;
    /// a host is expected to provision it ahead of time.
    pub fn new(base_dir: impl Into<PathBuf>, platform: P) -> Self {
        Self {
            base_dir: base_dir.into(),
            platform,
        }
    }

    fn blob_path(&self, name: &str) -> PathBuf {
        self.base_dir.join(name)
    }

    fn iv_state_path(&self, name: &str) -> PathBuf {
        self.base_dir.join(format!("{name}.iv"))
    }

    /// Returns the plaintext size of the named blob under `flag`, `0` if
    /// it is absent, or an error if it is corrupt or oversized.
    pub fn size(&self, name: &str, flag: StorageFlag) -> Result<usize, StorageError> {
        let path = self.blob_path(name);
        let on_disk = match fs::metadata(&path) {
            Ok(metadata) => metadata.len() as usize,
            Err(err) => {
                tracing::debug!(blob = name, error = %err, "sealed blob absent for size()");
                return Ok(0);
            }
        };

        let framing = match flag {
            StorageFlag::Raw => 0,
            StorageFlag::Normal => HMAC_SIZE + LEN_FIELD_SIZE,
            StorageFlag::Secure => GCM_IV_SIZE + GCM_TAG_SIZE + LEN_FIELD_SIZE,
        };

        let plaintext_len = on_disk
            .checked_sub(framing)
            .ok_or(StorageError::IntegrityFailure)?;
        if plaintext_len > R_MAX_SIZE {
            return Err(StorageError::SizeLimitExceeded(plaintext_len));
        }
        Ok(plaintext_len)
    }

    /// Reads the named blob into `buf`, verifying and, for `SECURE`,
    /// decrypting it under `flag`. Returns the number of plaintext bytes
    /// written into `buf`.
    pub fn read(&self, name: &str, flag: StorageFlag, buf: &mut [u8]) -> Result<usize, StorageError> {
        if buf.len() > R_MAX_SIZE {
            return Err(StorageError::SizeLimitExceeded(buf.len()));
        }
        let on_disk = fs::read(self.blob_path(name)).map_err(|err| {
            tracing::debug!(blob = name, error = %err, "sealed blob read failed");
            StorageError::NotFound
        })?;

        match flag {
            StorageFlag::Raw => self.read_raw(&on_disk, buf),
            StorageFlag::Normal => self.read_normal(&on_disk, buf),
            StorageFlag::Secure => self.read_secure(&on_disk, buf),
        }
    }

    fn read_raw(&self, on_disk: &[u8], buf: &mut [u8]) -> Result<usize, StorageError> {
        if on_disk.len() > buf.len() {
            return Err(StorageError::BufferTooSmall {
                needed: on_disk.len(),
                available: buf.len(),
            });
        }
        let dest = buf
            .get_mut(..on_disk.len())
            .ok_or(StorageError::BufferTooSmall {
                needed: on_disk.len(),
                available: buf.len(),
            })?;
        dest.copy_from_slice(on_disk);
        Ok(on_disk.len())
    }

    fn read_normal(&self, on_disk: &[u8], buf: &mut [u8]) -> Result<usize, StorageError> {
        if on_disk.len() < HMAC_SIZE + LEN_FIELD_SIZE {
            return Err(StorageError::IntegrityFailure);
        }
        let stored_mac = on_disk
            .get(..HMAC_SIZE)
            .ok_or(StorageError::IntegrityFailure)?;
        let len_field = on_disk
            .get(HMAC_SIZE..HMAC_SIZE + LEN_FIELD_SIZE)
            .ok_or(StorageError::IntegrityFailure)?;
        let data_len = read_be_u32(len_field)? as usize;
        let data = on_disk
            .get(HMAC_SIZE + LEN_FIELD_SIZE..)
            .ok_or(StorageError::IntegrityFailure)?;
        if data.len() != data_len {
            return Err(StorageError::IntegrityFailure);
        }
        if data_len > buf.len() {
            return Err(StorageError::BufferTooSmall {
                needed: data_len,
                available: buf.len(),
            });
        }

        let mut computed_mac = [0u8; HMAC_SIZE];
        self.platform.compute_storage_mac(data, &mut computed_mac)?;
        let matches: bool = stored_mac.ct_eq(&computed_mac).into();
        computed_mac.zeroize();
        if !matches {
            tracing::warn!("NORMAL blob failed MAC verification");
            return Err(StorageError::IntegrityFailure);
        }

        let dest = buf
            .get_mut(..data_len)
            .ok_or(StorageError::BufferTooSmall {
                needed: data_len,
                available: buf.len(),
            })?;
        dest.copy_from_slice(data);
        Ok(data_len)
    }

    fn read_secure(&self, on_disk: &[u8], buf: &mut [u8]) -> Result<usize, StorageError> {
        let header_len = GCM_IV_SIZE + GCM_TAG_SIZE + LEN_FIELD_SIZE;
        if on_disk.len() < header_len {
            return Err(StorageError::IntegrityFailure);
        }
        let iv = on_disk
            .get(..GCM_IV_SIZE)
            .ok_or(StorageError::IntegrityFailure)?;
        let tag = on_disk
            .get(GCM_IV_SIZE..GCM_IV_SIZE + GCM_TAG_SIZE)
            .ok_or(StorageError::IntegrityFailure)?;
        let len_field = on_disk
            .get(GCM_IV_SIZE + GCM_TAG_SIZE..header_len)
            .ok_or(StorageError::IntegrityFailure)?;
        let data_len = read_be_u32(len_field)? as usize;
        let ciphertext = on_disk.get(header_len..).ok_or(StorageError::IntegrityFailure)?;
        if ciphertext.len() != data_len {
            return Err(StorageError::IntegrityFailure);
        }
        if data_len > buf.len() {
            return Err(StorageError::BufferTooSmall {
                needed: data_len,
                available: buf.len(),
            });
        }

        let mut aes_key = [0u8; sdo_types::limits::AES_KEY_SIZE];
        self.platform.get_platform_aes_key(&mut aes_key)?;
        let plaintext = self
            .platform
            .aes_gcm_decrypt(ciphertext, iv, tag, &aes_key);
        aes_key.zeroize();
        let plaintext = plaintext.map_err(|err| {
            tracing::warn!(error = %err, "SECURE blob failed AEAD decryption");
            err
        })?;
        if plaintext.len() != data_len {
            return Err(StorageError::IntegrityFailure);
        }

        let dest = buf
            .get_mut(..data_len)
            .ok_or(StorageError::BufferTooSmall {
                needed: data_len,
                available: buf.len(),
            })?;
        dest.copy_from_slice(&plaintext);
        Ok(data_len)
    }

    /// Seals `data` under `flag` and atomically replaces the named blob.
    /// Returns the number of plaintext bytes written.
    pub fn write(&self, name: &str, flag: StorageFlag, data: &[u8]) -> Result<usize, StorageError> {
        if data.len() > R_MAX_SIZE {
            return Err(StorageError::SizeLimitExceeded(data.len()));
        }

        let sealed = match flag {
            StorageFlag::Raw => data.to_vec(),
            StorageFlag::Normal => self.seal_normal(data)?,
            StorageFlag::Secure => self.seal_secure(name, data)?,
        };

        write_atomically(&self.blob_path(name), &sealed).map_err(|err| {
            tracing::warn!(blob = name, error = %err, "atomic blob write failed");
            StorageError::ResourceFailure(err.to_string())
        })?;
        Ok(data.len())
    }

    fn seal_normal(&self, data: &[u8]) -> Result<Vec<u8>, StorageError> {
        let mut mac = [0u8; HMAC_SIZE];
        self.platform.compute_storage_mac(data, &mut mac).map_err(|err| {
            tracing::warn!(error = %err, "platform MAC computation failed while sealing NORMAL blob");
            err
        })?;
        let mut out = Vec::with_capacity(HMAC_SIZE + LEN_FIELD_SIZE + data.len());
        out.extend_from_slice(&mac);
        mac.zeroize();
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend_from_slice(data);
        Ok(out)
    }

    fn seal_secure(&self, name: &str, data: &[u8]) -> Result<Vec<u8>, StorageError> {
        let mut counter = self.load_or_init_iv_state(name)?;
        let iv = counter.advance(data.len()).map_err(|err| {
            tracing::warn!(blob = name, error = %err, "IV counter exhausted while sealing SECURE blob");
            err
        })?;

        let mut aes_key = [0u8; sdo_types::limits::AES_KEY_SIZE];
        self.platform.get_platform_aes_key(&mut aes_key)?;
        let encrypted = self.platform.aes_gcm_encrypt(data, &iv, &aes_key);
        aes_key.zeroize();
        let (ciphertext, tag) = encrypted.map_err(|err| {
            tracing::warn!(blob = name, error = %err, "platform AEAD encryption failed");
            err
        })?;
        if tag.len() != GCM_TAG_SIZE {
            tracing::warn!(blob = name, "platform returned wrong AEAD tag length");
            return Err(StorageError::ResourceFailure(
                "platform returned wrong AEAD tag length".to_string(),
            ));
        }

        write_atomically(&self.iv_state_path(name), &counter.to_bytes()).map_err(|err| {
            tracing::warn!(blob = name, error = %err, "IV state persist failed");
            StorageError::ResourceFailure(err.to_string())
        })?;

        let mut out = Vec::with_capacity(GCM_IV_SIZE + GCM_TAG_SIZE + LEN_FIELD_SIZE + ciphertext.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&tag);
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn load_or_init_iv_state(&self, name: &str) -> Result<IvCounterState, StorageError> {
        let path = self.iv_state_path(name);
        match fs::read(&path) {
            Ok(bytes) => IvCounterState::from_bytes(&bytes),
            Err(_) => {
                let mut seed = [0u8; GCM_IV_SIZE];
                rand::thread_rng().fill_bytes(&mut seed);
                Ok(IvCounterState::fresh(seed))
            }
        }
    }

    /// Reads a blob with no framing at all (the EPID key passthrough
    /// read, SPEC_FULL §0.1). Distinct from `read(.., StorageFlag::Raw,
    /// ..)` only in name; both paths use the same unframed copy.
    pub fn read_raw_key(&self, name: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        self.read(name, StorageFlag::Raw, buf)
    }
}

fn read_be_u32(bytes: &[u8]) -> Result<u32, StorageError> {
    let array: [u8; 4] = bytes
        .try_into()
        .map_err(|_| StorageError::IntegrityFailure)?;
    Ok(u32::from_be_bytes(array))
}

fn write_atomically(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, contents)?;
    fs::rename(&tmp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes_gcm::aead::{Aead, KeyInit, Payload};
    use aes_gcm::{Aes128Gcm, Nonce};
    use hmac::{Hmac, Mac};
    use sha2::Sha256;
    use tempfile::tempdir;

    struct FixedKeyPlatform {
        aes_key: [u8; 16],
        mac_key: [u8; 32],
    }

    impl PlatformCrypto for FixedKeyPlatform {
        fn get_platform_aes_key(&self, out: &mut [u8]) -> Result<(), StorageError> {
            out.copy_from_slice(&self.aes_key);
            Ok(())
        }

        fn compute_storage_mac(&self, data: &[u8], out: &mut [u8]) -> Result<(), StorageError> {
            let mut mac = Hmac::<Sha256>::new_from_slice(&self.mac_key)
                .map_err(|err| StorageError::ResourceFailure(err.to_string()))?;
            mac.update(data);
            let result = mac.finalize().into_bytes();
            out.copy_from_slice(&result);
            Ok(())
        }

        fn aes_gcm_encrypt(
            &self,
            plaintext: &[u8],
            iv: &[u8],
            key: &[u8],
        ) -> Result<(Vec<u8>, Vec<u8>), StorageError> {
            let cipher = Aes128Gcm::new_from_slice(key)
                .map_err(|err| StorageError::ResourceFailure(err.to_string()))?;
            let nonce = Nonce::from_slice(iv);
            let mut out = cipher
                .encrypt(nonce, Payload { msg: plaintext, aad: &[] })
                .map_err(|err| StorageError::ResourceFailure(err.to_string()))?;
            let tag = out.split_off(out.len() - GCM_TAG_SIZE);
            Ok((out, tag))
        }

        fn aes_gcm_decrypt(
            &self,
            ciphertext: &[u8],
            iv: &[u8],
            tag: &[u8],
            key: &[u8],
        ) -> Result<Vec<u8>, StorageError> {
            let cipher = Aes128Gcm::new_from_slice(key)
                .map_err(|err| StorageError::ResourceFailure(err.to_string()))?;
            let nonce = Nonce::from_slice(iv);
            let mut combined = ciphertext.to_vec();
            combined.extend_from_slice(tag);
            cipher
                .decrypt(nonce, Payload { msg: &combined, aad: &[] })
                .map_err(|_| StorageError::IntegrityFailure)
        }
    }

    fn platform() -> FixedKeyPlatform {
        FixedKeyPlatform {
            aes_key: [0x11; 16],
            mac_key: [0x22; 32],
        }
    }

    #[test]
    fn raw_round_trip() {
        let dir = tempdir().expect("tempdir");
        let store = SealedBlobStore::new(dir.path(), platform());
        store.write("epid.bin", StorageFlag::Raw, b"device-key-bytes").expect("write");
        let mut buf = [0u8; 64];
        let n = store.read("epid.bin", StorageFlag::Raw, &mut buf).expect("read");
        assert_eq!(&buf[..n], b"device-key-bytes");
    }

    #[test]
    fn normal_round_trip_and_tamper_detection() {
        let dir = tempdir().expect("tempdir");
        let store = SealedBlobStore::new(dir.path(), platform());
        store.write("creds", StorageFlag::Normal, b"owner block bytes").expect("write");
        let mut buf = [0u8; 64];
        let n = store.read("creds", StorageFlag::Normal, &mut buf).expect("read");
        assert_eq!(&buf[..n], b"owner block bytes");

        let path = dir.path().join("creds");
        let mut on_disk = fs::read(&path).expect("read file");
        let last = on_disk.len() - 1;
        on_disk[last] ^= 0xFF;
        fs::write(&path, &on_disk).expect("corrupt file");
        let result = store.read("creds", StorageFlag::Normal, &mut buf);
        assert!(matches!(result, Err(StorageError::IntegrityFailure)));
    }

    #[test]
    fn secure_round_trip_and_iv_advances() {
        let dir = tempdir().expect("tempdir");
        let store = SealedBlobStore::new(dir.path(), platform());
        store.write("session", StorageFlag::Secure, b"hmac key material").expect("write");
        let mut buf = [0u8; 64];
        let n = store.read("session", StorageFlag::Secure, &mut buf).expect("read");
        assert_eq!(&buf[..n], b"hmac key material");

        let iv_path = dir.path().join("session.iv");
        let first_state = IvCounterState::from_bytes(&fs::read(&iv_path).expect("iv")).expect("decode");

        store.write("session", StorageFlag::Secure, b"hmac key material v2").expect("write");
        let second_state = IvCounterState::from_bytes(&fs::read(&iv_path).expect("iv")).expect("decode");
        assert_ne!(first_state.current(), second_state.current());
    }

    #[test]
    fn secure_write_refuses_when_iv_counter_is_exhausted() {
        let dir = tempdir().expect("tempdir");
        let store = SealedBlobStore::new(dir.path(), platform());
        let seed = [3u8; GCM_IV_SIZE];
        // Force the counter two single-block writes short of wrapping back
        // to the seed: the first write advances it to `seed - 1`
        // (headroom intact), and the second to `seed` (exhausted).
        let modulus_minus_two = {
            let mut wide = [0u8; 16];
            wide[4..].copy_from_slice(&seed);
            let as_u128 = u128::from_be_bytes(wide).wrapping_sub(2);
            let bytes = as_u128.to_be_bytes();
            let mut narrow = [0u8; GCM_IV_SIZE];
            narrow.copy_from_slice(&bytes[4..]);
            narrow
        };
        let two_steps_from_seed = IvCounterState::from_bytes(
            &[&seed[..], &modulus_minus_two[..]].concat(),
        )
        .expect("decode");
        fs::write(
            dir.path().join("exhausted.iv"),
            two_steps_from_seed.to_bytes(),
        )
        .expect("seed iv file");

        store
            .write("exhausted", StorageFlag::Secure, b"payload")
            .expect("first write still has headroom");
        let result = store.write("exhausted", StorageFlag::Secure, b"payload");
        assert!(matches!(result, Err(StorageError::IvExhausted)));
    }

    #[test]
    fn size_rejects_buffers_larger_than_platform_limit() {
        let dir = tempdir().expect("tempdir");
        let store = SealedBlobStore::new(dir.path(), platform());
        let oversized = vec![0u8; R_MAX_SIZE + 1];
        let result = store.write("too-big", StorageFlag::Raw, &oversized);
        assert!(matches!(result, Err(StorageError::SizeLimitExceeded(_))));
    }

    #[test]
    fn read_reports_not_found_for_missing_blob() {
        let dir = tempdir().expect("tempdir");
        let store = SealedBlobStore::new(dir.path(), platform());
        let mut buf = [0u8; 16];
        let result = store.read("missing", StorageFlag::Normal, &mut buf);
        assert!(matches!(result, Err(StorageError::NotFound)));
    }

    #[test]
    fn size_is_zero_for_missing_blob() {
        let dir = tempdir().expect("tempdir");
        let store = SealedBlobStore::new(dir.path(), platform());
        let result = store.size("missing", StorageFlag::Normal);
        assert_eq!(result.expect("size of missing blob"), 0);
    }
}
