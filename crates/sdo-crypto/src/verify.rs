// Path: crates/sdo-crypto/src/verify.rs
//! RSA PKCS#1 v1.5 signature verification (§4.1).

use rsa::pkcs1v15::Pkcs1v15Sign;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPublicKey};
use sdo_types::CryptoError;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

/// The wire key-encoding tag. `RSA_MOD_EXP` is the only value the verifier
/// accepts; anything else is a malformed or unsupported key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEncoding {
    /// Modulus and exponent as independent big-endian byte strings.
    RsaModExp,
}

/// The wire key-algorithm tag, carried alongside [`KeyEncoding`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    /// RSA.
    Rsa,
}

/// Verifies `signature` over `message` under the public key formed from
/// `modulus`/`exponent`, per §4.1.
///
/// Checks run in this order: key-type preconditions, then signature
/// length against the modulus size, then the PKCS#1 v1.5/SHA-256
/// verification itself. The length check runs before SHA-256 is computed
/// at all, so a wrong-length signature never reaches the hash primitive.
pub fn verify_signature(
    encoding: KeyEncoding,
    algorithm: KeyAlgorithm,
    modulus: &[u8],
    exponent: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<(), CryptoError> {
    if encoding != KeyEncoding::RsaModExp || algorithm != KeyAlgorithm::Rsa {
        tracing::warn!("key verification rejected: unsupported key encoding or algorithm");
        return Err(CryptoError::InvalidKeyType);
    }
    if modulus.is_empty() || exponent.is_empty() || signature.is_empty() || message.is_empty() {
        tracing::warn!("key verification rejected: empty key, signature, or message buffer");
        return Err(CryptoError::InvalidKeyType);
    }

    let mut n = BigUint::from_bytes_be(modulus);
    let mut e = BigUint::from_bytes_be(exponent);
    let key_result = RsaPublicKey::new(n.clone(), e.clone());
    n.zeroize();
    e.zeroize();
    let public_key = key_result.map_err(|err| {
        tracing::warn!(error = %err, "RSA public key construction failed");
        CryptoError::InvalidKey(err.to_string())
    })?;

    let modulus_size = public_key.size();
    if signature.len() != modulus_size {
        tracing::warn!(expected = modulus_size, got = signature.len(), "signature length mismatch");
        return Err(CryptoError::WrongSignatureLength {
            expected: modulus_size,
            got: signature.len(),
        });
    }

    let digest = Sha256::digest(message);
    let verify_result = public_key
        .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, signature)
        .map_err(|_| {
            tracing::warn!("PKCS#1 v1.5 signature verification failed");
            CryptoError::SignatureInvalid
        });
    drop(public_key);
    verify_result
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs1v15::SigningKey;
    use rsa::signature::{RandomizedSigner, SignatureEncoding};
    use rsa::RsaPrivateKey;

    fn keypair() -> (RsaPrivateKey, RsaPublicKey) {
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, 2048).expect("generate test RSA key");
        let public = RsaPublicKey::from(&private);
        (private, public)
    }

    fn sign(private: &RsaPrivateKey, message: &[u8]) -> Vec<u8> {
        let mut rng = rand::thread_rng();
        let signing_key = SigningKey::<Sha256>::new(private.clone());
        signing_key.sign_with_rng(&mut rng, message).to_vec()
    }

    #[test]
    fn verifies_a_genuine_signature() {
        let (private, public) = keypair();
        let message = b"TO1.ProveToSDO payload";
        let signature = sign(&private, message);
        let result = verify_signature(
            KeyEncoding::RsaModExp,
            KeyAlgorithm::Rsa,
            &public.n().to_bytes_be(),
            &public.e().to_bytes_be(),
            message,
            &signature,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn rejects_wrong_signature_length_without_hashing() {
        let (_, public) = keypair();
        let modulus = public.n().to_bytes_be();
        let short_signature = vec![0u8; modulus.len() - 1];
        let result = verify_signature(
            KeyEncoding::RsaModExp,
            KeyAlgorithm::Rsa,
            &modulus,
            &public.e().to_bytes_be(),
            b"message",
            &short_signature,
        );
        match result {
            Err(CryptoError::WrongSignatureLength { expected, got }) => {
                assert_eq!(expected, modulus.len());
                assert_eq!(got, short_signature.len());
            }
            other => panic!("expected WrongSignatureLength, got {other:?}"),
        }
    }

    #[test]
    fn rejects_tampered_message() {
        let (private, public) = keypair();
        let signature = sign(&private, b"original message");
        let result = verify_signature(
            KeyEncoding::RsaModExp,
            KeyAlgorithm::Rsa,
            &public.n().to_bytes_be(),
            &public.e().to_bytes_be(),
            b"tampered message",
            &signature,
        );
        assert!(matches!(result, Err(CryptoError::SignatureInvalid)));
    }

    #[test]
    fn rejects_wrong_key_encoding() {
        let (_, public) = keypair();
        let result = verify_signature(
            KeyEncoding::RsaModExp,
            KeyAlgorithm::Rsa,
            &[],
            &public.e().to_bytes_be(),
            b"message",
            &[1, 2, 3],
        );
        assert!(matches!(result, Err(CryptoError::InvalidKeyType)));
    }
}
