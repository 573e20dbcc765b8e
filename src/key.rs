//! Key loading and the signing/verifying capabilities used by the JWS layer.

use pkcs8::der::pem::decode_label;
use pkcs8::DecodePrivateKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use std::path::Path;

use crate::cert::Certificate;
use crate::error::{Error, Result};
use crate::jws::Algorithm;

/// Something that can produce a JWS signature over a signing input.
pub trait SigningKey {
    fn algorithm(&self) -> Algorithm;

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>>;
}

/// Something that can check a JWS signature over a signing input.
pub trait VerifyingKey {
    fn algorithm(&self) -> Algorithm;

    fn verify(&self, message: &[u8], signature: &[u8]) -> bool;
}

/// RFC 7518 §3.5: PS256 keys must be at least 2048 bits.
const MIN_MODULUS_BYTES: usize = 256;

/// RSASSA-PSS with SHA-256 and a 32 byte salt.
#[derive(Clone)]
pub struct Ps256SigningKey {
    inner: rsa::pss::SigningKey<Sha256>,
    public: RsaPublicKey,
}

impl Ps256SigningKey {
    pub fn new(key: RsaPrivateKey) -> Result<Self> {
        check_modulus(key.size())?;
        let public = key.to_public_key();
        Ok(Self {
            inner: rsa::pss::SigningKey::new(key),
            public,
        })
    }

    /// Load from PEM, see [`load_private_key_pem`].
    pub fn from_pem(pem: &[u8], password: Option<&[u8]>) -> Result<Self> {
        Self::new(load_private_key_pem(pem, password)?)
    }

    pub fn from_file(path: &Path, password: Option<&[u8]>) -> Result<Self> {
        let pem = std::fs::read(path)?;
        Self::from_pem(&pem, password)
    }

    pub fn verifying_key(&self) -> Ps256VerifyingKey {
        Ps256VerifyingKey::new(self.public.clone())
    }
}

impl std::fmt::Debug for Ps256SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ps256SigningKey")
            .field("modulus_bits", &(self.public.size() * 8))
            .finish_non_exhaustive()
    }
}

impl SigningKey for Ps256SigningKey {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Ps256
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let signature = self
            .inner
            .try_sign_with_rng(&mut rand::thread_rng(), message)
            .map_err(|e| Error::Signing(format!("RSA-PSS signing failed: {}", e)))?;
        Ok(signature.to_vec())
    }
}

#[derive(Debug, Clone)]
pub struct Ps256VerifyingKey {
    inner: rsa::pss::VerifyingKey<Sha256>,
}

impl Ps256VerifyingKey {
    pub fn new(key: RsaPublicKey) -> Self {
        Self {
            inner: rsa::pss::VerifyingKey::new(key),
        }
    }

    /// Use the RSA public key embedded in `cert`.
    pub fn from_certificate(cert: &Certificate) -> Result<Self> {
        let key = cert.public_key()?;
        check_modulus(key.size())?;
        Ok(Self::new(key))
    }
}

impl VerifyingKey for Ps256VerifyingKey {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Ps256
    }

    fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let Ok(signature) = rsa::pss::Signature::try_from(signature) else {
            return false;
        };
        self.inner.verify(message, &signature).is_ok()
    }
}

fn check_modulus(size: usize) -> Result<()> {
    if size < MIN_MODULUS_BYTES {
        return Err(Error::UnsupportedKey(format!(
            "PS256 requires an RSA modulus of at least {} bits, got {} bits",
            MIN_MODULUS_BYTES * 8,
            size * 8
        )));
    }
    Ok(())
}

/// Load an RSA private key from PEM.
///
/// Accepts PKCS#8 (`PRIVATE KEY`), password protected PKCS#8
/// (`ENCRYPTED PRIVATE KEY`) and PKCS#1 (`RSA PRIVATE KEY`) documents.
/// Supplying a password for an unencrypted key is an error.
pub fn load_private_key_pem(pem: &[u8], password: Option<&[u8]>) -> Result<RsaPrivateKey> {
    let label = decode_label(pem)
        .map_err(|e| Error::InvalidKey(format!("Failed to read PEM: {}", e)))?;
    let pem = std::str::from_utf8(pem)
        .map_err(|e| Error::InvalidKey(format!("PEM is not valid UTF-8: {}", e)))?;

    let key = match (label, password) {
        ("ENCRYPTED PRIVATE KEY", Some(password)) => {
            RsaPrivateKey::from_pkcs8_encrypted_pem(pem, password)
                .map_err(|e| Error::InvalidKey(format!("Failed to decrypt PKCS#8 key: {}", e)))?
        }
        ("ENCRYPTED PRIVATE KEY", None) => {
            return Err(Error::InvalidKey(
                "private key is encrypted but no password was given".to_string(),
            ));
        }
        (_, Some(_)) => {
            return Err(Error::InvalidKey(
                "password was given but private key is not encrypted".to_string(),
            ));
        }
        ("PRIVATE KEY", None) => RsaPrivateKey::from_pkcs8_pem(pem)
            .map_err(|e| Error::InvalidKey(format!("Failed to decode PKCS#8 key: {}", e)))?,
        ("RSA PRIVATE KEY", None) => RsaPrivateKey::from_pkcs1_pem(pem)
            .map_err(|e| Error::InvalidKey(format!("Failed to decode PKCS#1 key: {}", e)))?,
        (other, None) => {
            return Err(Error::UnsupportedKey(format!(
                "unsupported PEM label '{}'",
                other
            )));
        }
    };

    Ok(key)
}
