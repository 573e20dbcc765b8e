//! X.509 certificate loading for the `x5c` header.

use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine,
};
use pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use x509_parser::pem::parse_x509_pem;
use x509_parser::parse_x509_certificate;

use crate::error::{Error, Result};

/// A parsed X.509 certificate that owns its DER encoding.
#[derive(Clone, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
    spki: Vec<u8>,
    subject: String,
    issuer: String,
    serial: String,
}

impl Certificate {
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (rest, cert) = parse_x509_certificate(der).map_err(|e| {
            Error::InvalidCertificate(format!("Failed to parse DER certificate: {}", e))
        })?;
        if !rest.is_empty() {
            return Err(Error::InvalidCertificate(format!(
                "{} trailing bytes after DER certificate",
                rest.len()
            )));
        }

        Ok(Self {
            der: der.to_vec(),
            spki: cert.public_key().raw.to_vec(),
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            serial: cert.raw_serial_as_string(),
        })
    }

    /// Parse the first `CERTIFICATE` block of a PEM document.
    pub fn from_pem(pem: &[u8]) -> Result<Self> {
        let (_, pem) = parse_x509_pem(pem)
            .map_err(|e| Error::InvalidCertificate(format!("Failed to read PEM: {}", e)))?;
        if pem.label != "CERTIFICATE" {
            return Err(Error::InvalidCertificate(format!(
                "Expected a CERTIFICATE PEM block, got '{}'",
                pem.label
            )));
        }
        Self::from_der(&pem.contents)
    }

    /// Parse PEM or DER, whichever `data` looks like.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let start = data
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(data.len());
        if data[start..].starts_with(b"-----BEGIN") {
            Self::from_pem(data)
        } else {
            Self::from_der(data)
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_bytes(&data)
    }

    /// Decode an `x5c` entry (standard base64 DER, RFC 7515 §4.1.6).
    pub fn from_x5c(entry: &str) -> Result<Self> {
        let der = STANDARD.decode(entry).map_err(|e| {
            Error::InvalidCertificate(format!("x5c entry is not valid base64: {}", e))
        })?;
        Self::from_der(&der)
    }

    pub fn to_x5c(&self) -> String {
        STANDARD.encode(&self.der)
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Serial number as colon separated hex.
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Lowercase hex SHA-256 of the DER encoding.
    pub fn sha256_thumbprint(&self) -> String {
        hex::encode(Sha256::digest(&self.der))
    }

    /// `x5t#S256` value for this certificate (RFC 7515 §4.1.8).
    pub fn x5t_s256(&self) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(&self.der))
    }

    /// The RSA public key from the subject public key info.
    pub fn public_key(&self) -> Result<RsaPublicKey> {
        RsaPublicKey::from_public_key_der(&self.spki).map_err(|e| {
            Error::UnsupportedKey(format!("certificate does not carry an RSA key: {}", e))
        })
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject)
            .field("issuer", &self.issuer)
            .field("serial", &self.serial)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CERT_PEM: &[u8] = include_bytes!("../testdata/example-cert.pem");
    const CERT_DER: &[u8] = include_bytes!("../testdata/example-cert.der");
    const KEY_PEM: &[u8] = include_bytes!("../testdata/example-priv_sk.pem");

    #[test]
    fn pem_and_der_agree() {
        let from_pem = Certificate::from_pem(CERT_PEM).unwrap();
        let from_der = Certificate::from_der(CERT_DER).unwrap();

        assert_eq!(from_pem, from_der);
        assert_eq!(from_pem.der(), CERT_DER);
    }

    #[test]
    fn from_bytes_detects_encoding() {
        assert_eq!(
            Certificate::from_bytes(CERT_PEM).unwrap(),
            Certificate::from_bytes(CERT_DER).unwrap()
        );
    }

    #[test]
    fn subject_and_issuer() {
        let cert = Certificate::from_pem(CERT_PEM).unwrap();
        assert!(cert.subject().contains("CN=signer.example.com"));
        assert!(cert.subject().contains("O=Example Signer"));
        // self-signed
        assert_eq!(cert.subject(), cert.issuer());
        assert!(!cert.serial().is_empty());
    }

    #[test]
    fn x5c_round_trip() {
        let cert = Certificate::from_der(CERT_DER).unwrap();
        let entry = cert.to_x5c();

        assert_eq!(entry, STANDARD.encode(CERT_DER));
        assert_eq!(Certificate::from_x5c(&entry).unwrap(), cert);
    }

    #[test]
    fn thumbprints() {
        let cert = Certificate::from_der(CERT_DER).unwrap();
        let digest = Sha256::digest(CERT_DER);

        assert_eq!(cert.sha256_thumbprint(), hex::encode(digest));
        assert_eq!(cert.sha256_thumbprint().len(), 64);
        assert_eq!(cert.x5t_s256(), URL_SAFE_NO_PAD.encode(digest));
    }

    #[test]
    fn public_key_matches_private_key() {
        let cert = Certificate::from_pem(CERT_PEM).unwrap();
        let private_key = crate::key::load_private_key_pem(KEY_PEM, None).unwrap();
        assert_eq!(cert.public_key().unwrap(), private_key.to_public_key());
    }

    #[test]
    fn reject_key_pem() {
        let result = Certificate::from_pem(KEY_PEM);
        assert!(matches!(result, Err(Error::InvalidCertificate(_))));
    }

    #[test]
    fn reject_invalid_der() {
        let result = Certificate::from_der(b"\x30\x03\x02\x01");
        assert!(matches!(result, Err(Error::InvalidCertificate(_))));
    }

    #[test]
    fn reject_trailing_bytes() {
        let mut der = CERT_DER.to_vec();
        der.push(0);
        let result = Certificate::from_der(&der);
        assert!(matches!(result, Err(Error::InvalidCertificate(_))));
    }

    #[test]
    fn reject_invalid_x5c() {
        let result = Certificate::from_x5c("!!!not-base64!!!");
        assert!(matches!(result, Err(Error::InvalidCertificate(_))));
    }

    #[test]
    fn from_file_nonexistent() {
        let result = Certificate::from_file(Path::new("/nonexistent/cert.pem"));
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
