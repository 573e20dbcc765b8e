//! Sign and verify JSON payloads as detached PS256 JWS tokens.
//!
//! The token carries the signer's certificate in `x5c`, so a verifier without
//! prior key material can check it. The payload itself never travels in the
//! token; both sides derive the signed bytes from the payload value with
//! [`to_canonical_json`].

use serde::Serialize;

use crate::error::Result;
use crate::header::{validate_header, ProtectedHeader};
use crate::jws::{Algorithm, CompactToken};
use crate::key::{Ps256VerifyingKey, SigningKey, VerifyingKey};
use crate::payload::to_canonical_json;

/// The only algorithms accepted when verifying.
pub const ALLOWED_ALGORITHMS: &[Algorithm] = &[Algorithm::Ps256];

/// Sign `payload` and embed `certificate_der` as the single `x5c` entry.
///
/// The returned token has an empty payload segment; the payload has to be
/// delivered to the verifier separately.
pub fn sign<K, P>(key: &K, certificate_der: &[u8], payload: &P) -> Result<CompactToken>
where
    K: SigningKey + ?Sized,
    P: Serialize + ?Sized,
{
    let payload = to_canonical_json(payload)?;
    let header = ProtectedHeader::detached(key.algorithm(), certificate_der);
    let token = CompactToken::encode_detached(&header, &payload, key)?;

    tracing::debug!(
        alg = %key.algorithm(),
        payload_len = payload.len(),
        "signed detached payload"
    );
    Ok(token)
}

/// Verify `token` against `payload`.
///
/// With `public_key` set the header certificate is ignored and only the given
/// key is trusted. Without it the key comes from the first `x5c` certificate
/// after the header passes [`validate_header`].
///
/// Returns `false` for every kind of failure; the cause is only logged.
pub fn verify<P>(token: &str, payload: &P, public_key: Option<&dyn VerifyingKey>) -> bool
where
    P: Serialize + ?Sized,
{
    match verify_detailed(token, payload, public_key) {
        Ok(_) => true,
        Err(e) => {
            tracing::debug!(error = %e, "detached JWS rejected");
            false
        }
    }
}

/// Like [`verify`] but reports why verification failed.
///
/// Meant for tests and tooling. Do not forward the error to the party that
/// supplied the token.
pub fn verify_detailed<P>(
    token: &str,
    payload: &P,
    public_key: Option<&dyn VerifyingKey>,
) -> Result<ProtectedHeader>
where
    P: Serialize + ?Sized,
{
    let token = CompactToken::parse(token)?;

    let embedded;
    let key: &dyn VerifyingKey = match public_key {
        Some(key) => key,
        None => {
            embedded = embedded_key(&token)?;
            &embedded
        }
    };

    let payload = to_canonical_json(payload)?;
    token.decode_detached(key, ALLOWED_ALGORITHMS, &payload)
}

/// Resolve the verifying key from the token's `x5c` certificate.
fn embedded_key(token: &CompactToken) -> Result<Ps256VerifyingKey> {
    let header = token.header()?;
    validate_header(&header)?;

    let cert = header.x5c_certificate()?;
    tracing::debug!(subject = cert.subject(), "using x5c certificate");
    Ps256VerifyingKey::from_certificate(&cert)
}
