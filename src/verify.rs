//! Signature verification for downloaded images.
//!
//! The default scheme is Ed25519 over the full new-image bytes; this is what
//! the [`Updater`](crate::Updater) façade uses. The legacy schemes
//! (RSA-PKCS1v15, ECDSA P-256, DSA) exist for callers migrating from older
//! signing pipelines: those verify a signature over `hash(message)`, with
//! the digest computed here so a mismatched digest cannot be injected from
//! outside.
//!
//! [`Verifier`] is a one-method capability so applications with bespoke
//! signing infrastructure can plug their own scheme into
//! [`ApplyOptions`](crate::ApplyOptions).

use der::Decode as _;
use ed25519_dalek::Verifier as _;
use sha2::{Digest, Sha256, Sha384, Sha512};
use signature::hazmat::PrehashVerifier as _;

use crate::error::UpdateError;

/// Digest algorithm used for checksums and for the legacy signature schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashKind {
    /// SHA-256, the default everywhere in this crate.
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl HashKind {
    /// Digest `data` with this algorithm.
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            HashKind::Sha256 => Sha256::digest(data).to_vec(),
            HashKind::Sha384 => Sha384::digest(data).to_vec(),
            HashKind::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

/// A public key for one of the supported signature schemes.
///
/// The variant decides which [`Verifier`] is used when
/// [`ApplyOptions`](crate::ApplyOptions) does not name one explicitly, and
/// every verifier hard-fails when handed a key of the wrong algorithm.
#[derive(Debug, Clone)]
pub enum PublicKey {
    /// 32-byte Ed25519 key; signatures are raw 64-byte values over the full
    /// message.
    Ed25519(ed25519_dalek::VerifyingKey),
    /// RSA key; signatures are PKCS#1 v1.5 over the message digest.
    Rsa(rsa::RsaPublicKey),
    /// NIST P-256 key; signatures are ASN.1 DER `SEQUENCE { r, s }` over the
    /// message digest.
    Ecdsa(p256::ecdsa::VerifyingKey),
    /// DSA key; same DER signature shape as ECDSA.
    Dsa(dsa::VerifyingKey),
}

impl PublicKey {
    /// The verifier matching this key's algorithm.
    pub(crate) fn default_verifier(&self) -> Box<dyn Verifier> {
        match self {
            PublicKey::Ed25519(_) => Box::new(Ed25519Verifier),
            PublicKey::Rsa(_) => Box::new(RsaVerifier),
            PublicKey::Ecdsa(_) => Box::new(EcdsaVerifier),
            PublicKey::Dsa(_) => Box::new(DsaVerifier),
        }
    }
}

/// Capability for verifying an update's signature with a public key.
///
/// `message` is always the complete new-image bytes. Implementations that
/// sign a digest rather than the message itself compute `hash(message)`
/// internally.
pub trait Verifier: Send + Sync {
    fn verify(
        &self,
        message: &[u8],
        signature: &[u8],
        hash: HashKind,
        public_key: &PublicKey,
    ) -> Result<(), UpdateError>;
}

/// Ed25519 over the full message; the crate-wide default.
pub struct Ed25519Verifier;

impl Verifier for Ed25519Verifier {
    fn verify(
        &self,
        message: &[u8],
        signature: &[u8],
        _hash: HashKind,
        public_key: &PublicKey,
    ) -> Result<(), UpdateError> {
        let PublicKey::Ed25519(key) = public_key else {
            return Err(UpdateError::Verification("not a valid Ed25519 public key".into()));
        };
        let raw: &[u8; 64] = signature
            .try_into()
            .map_err(|_| UpdateError::SignatureShape { length: signature.len() as u64 })?;
        key.verify(message, &ed25519_dalek::Signature::from_bytes(raw))
            .map_err(|_| UpdateError::Verification("Ed25519 signature does not match".into()))
    }
}

/// RSA-PKCS1v15 over `hash(message)`.
pub struct RsaVerifier;

impl Verifier for RsaVerifier {
    fn verify(
        &self,
        message: &[u8],
        signature: &[u8],
        hash: HashKind,
        public_key: &PublicKey,
    ) -> Result<(), UpdateError> {
        let PublicKey::Rsa(key) = public_key else {
            return Err(UpdateError::Verification("not a valid RSA public key".into()));
        };
        let checksum = hash.digest(message);
        let scheme = match hash {
            HashKind::Sha256 => rsa::Pkcs1v15Sign::new::<Sha256>(),
            HashKind::Sha384 => rsa::Pkcs1v15Sign::new::<Sha384>(),
            HashKind::Sha512 => rsa::Pkcs1v15Sign::new::<Sha512>(),
        };
        key.verify(scheme, &checksum, signature)
            .map_err(|err| UpdateError::Verification(format!("RSA signature rejected: {err}")))
    }
}

/// ECDSA P-256 with a DER-encoded signature over `hash(message)`.
pub struct EcdsaVerifier;

impl Verifier for EcdsaVerifier {
    fn verify(
        &self,
        message: &[u8],
        signature: &[u8],
        hash: HashKind,
        public_key: &PublicKey,
    ) -> Result<(), UpdateError> {
        let PublicKey::Ecdsa(key) = public_key else {
            return Err(UpdateError::Verification("not a valid ECDSA public key".into()));
        };
        let sig = p256::ecdsa::Signature::from_der(signature).map_err(|err| {
            UpdateError::Verification(format!("malformed ECDSA signature: {err}"))
        })?;
        let checksum = hash.digest(message);
        key.verify_prehash(&checksum, &sig)
            .map_err(|_| UpdateError::Verification("ECDSA signature does not match".into()))
    }
}

/// DSA with a DER-encoded signature over `hash(message)`.
pub struct DsaVerifier;

impl Verifier for DsaVerifier {
    fn verify(
        &self,
        message: &[u8],
        signature: &[u8],
        hash: HashKind,
        public_key: &PublicKey,
    ) -> Result<(), UpdateError> {
        let PublicKey::Dsa(key) = public_key else {
            return Err(UpdateError::Verification("not a valid DSA public key".into()));
        };
        let sig = dsa::Signature::from_der(signature)
            .map_err(|err| UpdateError::Verification(format!("malformed DSA signature: {err}")))?;
        let checksum = hash.digest(message);
        key.verify_prehash(&checksum, &sig)
            .map_err(|_| UpdateError::Verification("DSA signature does not match".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use signature::hazmat::PrehashSigner;

    fn ed25519_pair() -> (SigningKey, PublicKey) {
        let signing = SigningKey::from_bytes(&[7u8; 32]);
        let public = PublicKey::Ed25519(signing.verifying_key());
        (signing, public)
    }

    #[test]
    fn ed25519_accepts_matching_signature() {
        let (signing, public) = ed25519_pair();
        let message = b"the next build of the application";
        let signature = signing.sign(message).to_bytes();

        Ed25519Verifier.verify(message, &signature, HashKind::default(), &public).unwrap();
    }

    #[test]
    fn ed25519_rejects_wrong_key() {
        let (signing, _) = ed25519_pair();
        let other = SigningKey::from_bytes(&[8u8; 32]);
        let message = b"the next build of the application";
        let signature = signing.sign(message).to_bytes();

        let result = Ed25519Verifier.verify(
            message,
            &signature,
            HashKind::default(),
            &PublicKey::Ed25519(other.verifying_key()),
        );
        assert!(matches!(result, Err(UpdateError::Verification(_))));
    }

    #[test]
    fn ed25519_rejects_truncated_signature() {
        let (signing, public) = ed25519_pair();
        let message = b"payload";
        let signature = signing.sign(message).to_bytes();

        let result =
            Ed25519Verifier.verify(message, &signature[..63], HashKind::default(), &public);
        assert!(matches!(result, Err(UpdateError::SignatureShape { length: 63 })));
    }

    #[test]
    fn ed25519_rejects_mismatched_key_type() {
        let signing = p256::ecdsa::SigningKey::from_slice(&[3u8; 32]).unwrap();
        let public = PublicKey::Ecdsa(signing.verifying_key().clone());

        let result = Ed25519Verifier.verify(b"payload", &[0u8; 64], HashKind::default(), &public);
        assert!(matches!(result, Err(UpdateError::Verification(_))));
    }

    #[test]
    fn ecdsa_roundtrip_over_digest() {
        let signing = p256::ecdsa::SigningKey::from_slice(&[3u8; 32]).unwrap();
        let public = PublicKey::Ecdsa(signing.verifying_key().clone());
        let message = b"the next build of the application";
        let checksum = HashKind::Sha256.digest(message);

        let signature: p256::ecdsa::Signature = signing.sign_prehash(&checksum).unwrap();
        let der = signature.to_der();

        EcdsaVerifier.verify(message, der.as_bytes(), HashKind::Sha256, &public).unwrap();
    }

    #[test]
    fn ecdsa_rejects_garbage_der() {
        let signing = p256::ecdsa::SigningKey::from_slice(&[3u8; 32]).unwrap();
        let public = PublicKey::Ecdsa(signing.verifying_key().clone());

        let result = EcdsaVerifier.verify(b"payload", &[1, 2, 3], HashKind::Sha256, &public);
        assert!(matches!(result, Err(UpdateError::Verification(_))));
    }

    #[test]
    fn ecdsa_rejects_tampered_message() {
        let signing = p256::ecdsa::SigningKey::from_slice(&[3u8; 32]).unwrap();
        let public = PublicKey::Ecdsa(signing.verifying_key().clone());
        let checksum = HashKind::Sha256.digest(b"original");
        let signature: p256::ecdsa::Signature = signing.sign_prehash(&checksum).unwrap();
        let der = signature.to_der();

        let result = EcdsaVerifier.verify(b"tampered", der.as_bytes(), HashKind::Sha256, &public);
        assert!(matches!(result, Err(UpdateError::Verification(_))));
    }

    #[test]
    fn rsa_rejects_mismatched_key_type() {
        let (_, public) = ed25519_pair();
        let result = RsaVerifier.verify(b"payload", &[0u8; 64], HashKind::Sha256, &public);
        assert!(matches!(result, Err(UpdateError::Verification(_))));
    }

    #[test]
    fn dsa_rejects_mismatched_key_type() {
        let (_, public) = ed25519_pair();
        let result = DsaVerifier.verify(b"payload", &[0u8; 64], HashKind::Sha256, &public);
        assert!(matches!(result, Err(UpdateError::Verification(_))));
    }
}
