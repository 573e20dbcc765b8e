//! Signed envelope files and signature attachments.
//!
//! An envelope keeps a payload next to its detached token so both can be
//! stored or sent as one JSON document.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

use crate::cert::Certificate;
use crate::detached;
use crate::error::{Error, Result};
use crate::jws::CompactToken;
use crate::key::{Ps256VerifyingKey, SigningKey, VerifyingKey};

pub const ENVELOPE_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedEnvelope {
    pub version: String,
    pub payload: Value,
    pub signature: String,
}

impl SignedEnvelope {
    pub fn new(payload: Value, token: &CompactToken) -> Self {
        Self {
            version: ENVELOPE_VERSION.to_string(),
            payload,
            signature: token.to_string(),
        }
    }

    /// Sign `payload` and wrap it together with the token.
    pub fn seal<K>(key: &K, certificate_der: &[u8], payload: Value) -> Result<Self>
    where
        K: SigningKey + ?Sized,
    {
        let token = detached::sign(key, certificate_der, &payload)?;
        Ok(Self::new(payload, &token))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let envelope: SignedEnvelope = serde_json::from_str(json)?;
        envelope.validate()?;
        Ok(envelope)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(Error::Serialization)
    }

    fn validate(&self) -> Result<()> {
        if self.version != ENVELOPE_VERSION {
            return Err(Error::InvalidEnvelope(format!(
                "unsupported envelope version: {}",
                self.version
            )));
        }

        if self.signature.is_empty() {
            return Err(Error::InvalidEnvelope("signature is empty".to_string()));
        }

        CompactToken::parse(&self.signature).map_err(|e| {
            Error::InvalidEnvelope(format!("signature is not a detached JWS: {}", e))
        })?;

        Ok(())
    }

    pub fn token(&self) -> Result<CompactToken> {
        CompactToken::parse(&self.signature)
    }

    /// See [`detached::verify`].
    pub fn verify(&self, public_key: Option<&dyn VerifyingKey>) -> bool {
        detached::verify(&self.signature, &self.payload, public_key)
    }

    /// Verify and describe the outcome. With `certificate` set, its key is
    /// used instead of the embedded `x5c` certificate.
    pub fn verify_report(&self, certificate: Option<&Certificate>) -> VerificationReport {
        let (key_source, cert) = match certificate {
            Some(cert) => (KeySource::Certificate, Some(cert.clone())),
            None => (
                KeySource::Embedded,
                self.token()
                    .and_then(|token| token.header())
                    .and_then(|header| header.x5c_certificate())
                    .ok(),
            ),
        };

        let result = match (key_source, &cert) {
            (KeySource::Certificate, Some(cert)) => Ps256VerifyingKey::from_certificate(cert)
                .and_then(|key| {
                    detached::verify_detailed(&self.signature, &self.payload, Some(&key))
                }),
            _ => detached::verify_detailed(&self.signature, &self.payload, None),
        };

        VerificationReport {
            valid: result.is_ok(),
            version: self.version.clone(),
            key_source,
            subject: cert.as_ref().map(|c| c.subject().to_string()),
            sha256_thumbprint: cert.as_ref().map(Certificate::sha256_thumbprint),
            error: result.err().map(|e| e.to_string()),
        }
    }
}

/// Where the verification key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySource {
    /// The first `x5c` certificate of the token.
    Embedded,
    /// A certificate supplied by the caller.
    Certificate,
}

/// Outcome of verifying an envelope, for local tooling output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub valid: bool,
    pub version: String,
    pub key_source: KeySource,
    pub subject: Option<String>,
    pub sha256_thumbprint: Option<String>,
    pub error: Option<String>,
}

/// Header and signature segments of a detached token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginalMessage {
    pub protected: String,
    pub signature: String,
}

impl OriginalMessage {
    pub fn from_token(token: &CompactToken) -> Self {
        Self {
            protected: token.protected().to_string(),
            signature: token.signature().to_string(),
        }
    }

    /// Reassemble `protected..signature`.
    pub fn to_compact(&self) -> Result<CompactToken> {
        CompactToken::parse(&format!("{}..{}", self.protected, self.signature))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachments {
    pub original_message: OriginalMessage,
}

/// Copy of `payload` with `attachments.original_message` set to the segments
/// of `token`. Lets a relaying party forward the original signature inside a
/// payload it signs itself.
pub fn attach_signature(payload: &Value, token: &CompactToken) -> Result<Value> {
    let Value::Object(members) = payload else {
        return Err(Error::InvalidEnvelope(
            "signatures can only be attached to JSON objects".to_string(),
        ));
    };

    let attachments = Attachments {
        original_message: OriginalMessage::from_token(token),
    };
    let mut members: Map<String, Value> = members.clone();
    members.insert(
        "attachments".to_string(),
        serde_json::to_value(attachments).map_err(Error::Serialization)?,
    );
    Ok(Value::Object(members))
}

/// Read back what [`attach_signature`] added, if anything.
pub fn attachments(payload: &Value) -> Result<Option<Attachments>> {
    match payload.get("attachments") {
        None => Ok(None),
        Some(value) => Ok(Some(Attachments::deserialize(value)?)),
    }
}

/// The contents of a file holding either an envelope or a bare token.
#[derive(Debug, Clone)]
pub enum SignedDocument {
    Envelope(SignedEnvelope),
    Token(CompactToken),
}

impl SignedDocument {
    /// JSON objects are read as envelopes and their errors reported as such.
    /// Anything else must be a compact token.
    pub fn parse(contents: &str) -> Result<Self> {
        let contents = contents.trim();
        if contents.starts_with('{') {
            SignedEnvelope::from_json(contents).map(Self::Envelope)
        } else {
            CompactToken::parse(contents).map(Self::Token)
        }
    }

    pub fn token(&self) -> Result<CompactToken> {
        match self {
            Self::Envelope(envelope) => envelope.token(),
            Self::Token(token) => Ok(token.clone()),
        }
    }
}
