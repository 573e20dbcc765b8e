//! Detached JWS (RFC 7797) signing and verification.
//!
//! Signs JSON payloads with PS256, leaves the payload out of the token and
//! embeds the signer's certificate in the `x5c` header.

pub mod cert;
pub mod detached;
pub mod envelope;
pub mod error;
pub mod header;
pub mod jws;
pub mod key;
pub mod payload;

pub use cert::Certificate;
pub use detached::{sign, verify, verify_detailed, ALLOWED_ALGORITHMS};
pub use envelope::{
    attach_signature, Attachments, SignedDocument, SignedEnvelope, VerificationReport,
};
pub use error::{Error, HeaderError, Result};
pub use header::{validate_header, ProtectedHeader};
pub use jws::{unverified_header, Algorithm, CompactToken};
pub use key::{load_private_key_pem, Ps256SigningKey, Ps256VerifyingKey, SigningKey, VerifyingKey};
pub use payload::to_canonical_json;
