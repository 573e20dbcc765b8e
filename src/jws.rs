//! Compact JWS serialization with a detached, unencoded payload (RFC 7797).

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::header::ProtectedHeader;
use crate::key::{SigningKey, VerifyingKey};

/// Signature algorithms this crate can produce and accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// RSASSA-PSS using SHA-256 and MGF1 with SHA-256.
    Ps256,
}

impl Algorithm {
    pub const fn as_str(self) -> &'static str {
        match self {
            Algorithm::Ps256 => "PS256",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PS256" => Ok(Algorithm::Ps256),
            other => Err(Error::AlgorithmNotAllowed(other.to_string())),
        }
    }
}

/// Header parameters listed in `crit` that this implementation understands.
const UNDERSTOOD_CRITICAL: &[&str] = &["b64"];

/// A compact JWS of the form `header..signature`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompactToken(String);

impl CompactToken {
    /// Split and sanity check a compact token. The payload segment must be
    /// empty.
    pub fn parse(token: &str) -> Result<Self> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(Error::InvalidToken(
                "JWS must have 3 parts separated by dots".to_string(),
            ));
        }
        if parts[0].is_empty() {
            return Err(Error::InvalidToken("protected header is empty".to_string()));
        }
        if !parts[1].is_empty() {
            return Err(Error::InvalidToken(
                "payload segment must be empty for a detached JWS".to_string(),
            ));
        }
        Ok(Self(token.to_string()))
    }

    /// Sign `payload` under `header` and return the token with the payload
    /// segment left empty.
    pub fn encode_detached<K>(header: &ProtectedHeader, payload: &[u8], key: &K) -> Result<Self>
    where
        K: SigningKey + ?Sized,
    {
        let protected = header.encode()?;
        let signature = key.sign(&signing_input(&protected, payload))?;
        Ok(Self(format!(
            "{}..{}",
            protected,
            URL_SAFE_NO_PAD.encode(signature)
        )))
    }

    /// Verify the token against the detached `payload` bytes.
    ///
    /// The header `alg` must be one of `algorithms` and match the key, every
    /// `crit` entry must be understood and `b64` must be `false`.
    pub fn decode_detached<K>(
        &self,
        key: &K,
        algorithms: &[Algorithm],
        payload: &[u8],
    ) -> Result<ProtectedHeader>
    where
        K: VerifyingKey + ?Sized,
    {
        let header = self.header()?;

        let alg = header
            .alg()
            .ok_or_else(|| Error::InvalidToken("alg header parameter required".to_string()))?;
        if !algorithms.iter().any(|allowed| allowed.as_str() == alg) {
            return Err(Error::AlgorithmNotAllowed(alg.to_string()));
        }
        if key.algorithm().as_str() != alg {
            return Err(Error::AlgorithmNotAllowed(format!(
                "{} does not match key algorithm {}",
                alg,
                key.algorithm()
            )));
        }

        check_critical(&header)?;

        if header.b64() != Some(false) {
            return Err(Error::InvalidToken(
                "detached unencoded payload requires b64 to be false".to_string(),
            ));
        }

        let signature = URL_SAFE_NO_PAD.decode(self.signature()).map_err(|e| {
            Error::DecodeError(format!("Failed to decode signature: {}", e))
        })?;

        if !key.verify(&signing_input(self.protected(), payload), &signature) {
            return Err(Error::SignatureMismatch);
        }

        Ok(header)
    }

    /// The protected header, without any signature check.
    pub fn header(&self) -> Result<ProtectedHeader> {
        ProtectedHeader::decode(self.protected())
    }

    /// Base64url protected header segment.
    pub fn protected(&self) -> &str {
        self.0.split('.').next().unwrap_or_default()
    }

    /// Base64url signature segment.
    pub fn signature(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CompactToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CompactToken {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl AsRef<str> for CompactToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Read the protected header of `token` without verifying anything.
pub fn unverified_header(token: &str) -> Result<ProtectedHeader> {
    CompactToken::parse(token)?.header()
}

/// RFC 7797 §3: `ASCII(BASE64URL(header)) || '.' || payload`.
fn signing_input(protected: &str, payload: &[u8]) -> Vec<u8> {
    let mut input = Vec::with_capacity(protected.len() + 1 + payload.len());
    input.extend_from_slice(protected.as_bytes());
    input.push(b'.');
    input.extend_from_slice(payload);
    input
}

fn check_critical(header: &ProtectedHeader) -> Result<()> {
    let Some(crit) = header.crit() else {
        return Ok(());
    };

    let names = match crit {
        Value::Array(names) if !names.is_empty() => names,
        _ => {
            return Err(Error::InvalidToken(
                "crit header parameter must be a non-empty list".to_string(),
            ))
        }
    };

    for name in names {
        let name = name.as_str().ok_or_else(|| {
            Error::InvalidToken("crit header parameter must list strings".to_string())
        })?;
        if !UNDERSTOOD_CRITICAL.contains(&name) {
            return Err(Error::UnsupportedCritical(name.to_string()));
        }
        if header.get(name).is_none() {
            return Err(Error::InvalidToken(format!(
                "critical header parameter {} is missing",
                name
            )));
        }
    }

    Ok(())
}
