//! Error types for detached JWS signing and verification.

use thiserror::Error;

/// Reasons a protected header fails the detached-payload checks.
///
/// Variants are listed in the order the checks run; the first failing rule
/// is reported.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderError {
    #[error("protected header is empty")]
    Empty,

    #[error("b64 header parameter required")]
    MissingB64,

    #[error("b64 header parameter must be the boolean false")]
    B64NotFalse,

    #[error("crit header parameter required")]
    MissingCrit,

    #[error("crit header parameter must list b64")]
    B64NotCritical,

    #[error("x5c header parameter required")]
    MissingX5c,

    #[error("x5c header parameter must be a non-empty list starting with a certificate string")]
    X5cInvalid,
}

impl HeaderError {
    /// Stable machine-readable code for this failure.
    pub fn code(&self) -> &'static str {
        match self {
            HeaderError::Empty => "empty_header",
            HeaderError::MissingB64 => "missing_b64",
            HeaderError::B64NotFalse => "b64_not_false",
            HeaderError::MissingCrit => "missing_crit",
            HeaderError::B64NotCritical => "b64_not_critical",
            HeaderError::MissingX5c => "missing_x5c",
            HeaderError::X5cInvalid => "x5c_invalid",
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid certificate: {0}")]
    InvalidCertificate(String),

    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    #[error("Unsupported key: {0}")]
    UnsupportedKey(String),

    #[error("Failed to serialize payload: {0}")]
    Serialization(serde_json::Error),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Invalid JWS: {0}")]
    InvalidToken(String),

    #[error("Failed to decode JWS: {0}")]
    DecodeError(String),

    #[error("Invalid protected header: {0}")]
    Header(#[from] HeaderError),

    #[error("Algorithm not allowed: {0}")]
    AlgorithmNotAllowed(String),

    #[error("Unsupported critical header parameter: {0}")]
    UnsupportedCritical(String),

    #[error("Signature verification failed")]
    SignatureMismatch,

    #[error("Failed to parse envelope JSON: {0}")]
    EnvelopeParseError(#[from] serde_json::Error),

    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),
}

pub type Result<T> = std::result::Result<T, Error>;
