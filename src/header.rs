//! Protected header construction and detached-payload header validation.

use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::cert::Certificate;
use crate::error::{Error, HeaderError, Result};
use crate::jws::Algorithm;

/// A JWS protected header.
///
/// Kept as a JSON object rather than a fixed struct so that members are
/// checked with their exact JSON types (`"b64": "false"` is not `false`)
/// and unknown members survive decoding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtectedHeader(Map<String, Value>);

impl ProtectedHeader {
    /// Header for a detached, unencoded payload signed with `algorithm`:
    /// `{"alg":..,"b64":false,"crit":["b64"],"x5c":[cert]}`.
    pub fn detached(algorithm: Algorithm, certificate_der: &[u8]) -> Self {
        let mut members = Map::new();
        members.insert("alg".to_string(), Value::from(algorithm.as_str()));
        members.insert("b64".to_string(), Value::Bool(false));
        members.insert("crit".to_string(), Value::from(vec!["b64"]));
        members.insert(
            "x5c".to_string(),
            Value::from(vec![STANDARD.encode(certificate_der)]),
        );
        Self(members)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn members(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn alg(&self) -> Option<&str> {
        self.0.get("alg").and_then(Value::as_str)
    }

    /// `Some(false)` only for the JSON boolean `false`.
    pub fn b64(&self) -> Option<bool> {
        self.0.get("b64").and_then(Value::as_bool)
    }

    pub fn crit(&self) -> Option<&Value> {
        self.0.get("crit")
    }

    /// Certificate from the first `x5c` entry.
    pub fn x5c_certificate(&self) -> Result<Certificate> {
        let entry = self
            .0
            .get("x5c")
            .and_then(Value::as_array)
            .and_then(|certs| certs.first())
            .and_then(Value::as_str)
            .ok_or(HeaderError::X5cInvalid)?;
        Certificate::from_x5c(entry)
    }

    /// Base64url of the compact JSON serialization.
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(&self.0).map_err(Error::Serialization)?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    pub fn decode(segment: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|e| {
            Error::DecodeError(format!("Failed to decode header: {}", e))
        })?;

        serde_json::from_slice(&bytes)
            .map_err(|e| Error::DecodeError(format!("Failed to parse header: {}", e)))
    }
}

impl From<Map<String, Value>> for ProtectedHeader {
    fn from(members: Map<String, Value>) -> Self {
        Self(members)
    }
}

/// Check that `header` describes a detached `b64:false` payload and carries
/// a certificate to verify it with.
///
/// Rules run in a fixed order and the first failure is returned.
pub fn validate_header(header: &ProtectedHeader) -> std::result::Result<(), HeaderError> {
    if header.is_empty() {
        return Err(HeaderError::Empty);
    }

    match header.get("b64") {
        None => return Err(HeaderError::MissingB64),
        Some(Value::Bool(false)) => {}
        Some(_) => return Err(HeaderError::B64NotFalse),
    }

    match header.crit() {
        None => return Err(HeaderError::MissingCrit),
        Some(Value::Array(names)) if names.iter().any(|name| name == "b64") => {}
        Some(_) => return Err(HeaderError::B64NotCritical),
    }

    match header.get("x5c") {
        None => Err(HeaderError::MissingX5c),
        Some(Value::Array(certs)) => match certs.first() {
            Some(Value::String(cert)) if !cert.is_empty() => Ok(()),
            _ => Err(HeaderError::X5cInvalid),
        },
        Some(_) => Err(HeaderError::X5cInvalid),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CERT_DER: &[u8] = include_bytes!("../testdata/example-cert.der");

    fn header(value: Value) -> ProtectedHeader {
        match value {
            Value::Object(members) => ProtectedHeader::from(members),
            _ => panic!("header must be an object"),
        }
    }

    #[test]
    fn detached_header_members() {
        let header = ProtectedHeader::detached(Algorithm::Ps256, CERT_DER);
        let expected_x5c = STANDARD.encode(CERT_DER);

        assert_eq!(header.alg(), Some("PS256"));
        assert_eq!(header.b64(), Some(false));
        assert_eq!(header.crit(), Some(&json!(["b64"])));
        assert_eq!(header.get("x5c"), Some(&json!([expected_x5c])));
        assert_eq!(validate_header(&header), Ok(()));
    }

    #[test]
    fn encode_decode_keeps_members_in_order() {
        let header = ProtectedHeader::detached(Algorithm::Ps256, CERT_DER);
        let encoded = header.encode().unwrap();
        let json = URL_SAFE_NO_PAD.decode(&encoded).unwrap();

        assert!(json.starts_with(br#"{"alg":"PS256","b64":false,"crit":["b64"],"x5c":[""#));
        assert_eq!(ProtectedHeader::decode(&encoded).unwrap(), header);
    }

    #[test]
    fn x5c_certificate_is_embedded_certificate() {
        let header = ProtectedHeader::detached(Algorithm::Ps256, CERT_DER);
        assert_eq!(header.x5c_certificate().unwrap().der(), CERT_DER);
    }

    #[test]
    fn decode_keeps_unknown_members() {
        let encoded = URL_SAFE_NO_PAD.encode(r#"{"typ":"JWT","alg":"PS256","kid":"k1"}"#);
        let header = ProtectedHeader::decode(&encoded).unwrap();
        assert_eq!(header.get("typ"), Some(&json!("JWT")));
        assert_eq!(header.get("kid"), Some(&json!("k1")));
    }

    #[test]
    fn reject_non_object_header() {
        let encoded = URL_SAFE_NO_PAD.encode("[1,2,3]");
        let result = ProtectedHeader::decode(&encoded);
        assert!(matches!(result, Err(Error::DecodeError(_))));
    }

    #[test]
    fn reject_invalid_base64() {
        let result = ProtectedHeader::decode("!!!");
        assert!(matches!(result, Err(Error::DecodeError(_))));
    }

    #[test]
    fn reject_empty_header() {
        assert_eq!(
            validate_header(&ProtectedHeader::default()),
            Err(HeaderError::Empty)
        );
    }

    #[test]
    fn reject_missing_b64() {
        let h = header(json!({"alg": "PS256", "crit": ["b64"], "x5c": ["MII"]}));
        assert_eq!(validate_header(&h), Err(HeaderError::MissingB64));
    }

    #[test]
    fn reject_b64_not_strictly_false() {
        for b64 in [json!(true), json!("false"), json!(0), json!(null)] {
            let h = header(json!({"b64": b64, "crit": ["b64"], "x5c": ["MII"]}));
            assert_eq!(validate_header(&h), Err(HeaderError::B64NotFalse));
        }
    }

    #[test]
    fn reject_missing_crit() {
        let h = header(json!({"b64": false, "x5c": ["MII"]}));
        assert_eq!(validate_header(&h), Err(HeaderError::MissingCrit));
    }

    #[test]
    fn reject_crit_without_b64() {
        for crit in [json!([]), json!(["exp"]), json!("b64")] {
            let h = header(json!({"b64": false, "crit": crit, "x5c": ["MII"]}));
            assert_eq!(validate_header(&h), Err(HeaderError::B64NotCritical));
        }
    }

    #[test]
    fn reject_missing_x5c() {
        let h = header(json!({"b64": false, "crit": ["b64"]}));
        assert_eq!(validate_header(&h), Err(HeaderError::MissingX5c));
    }

    #[test]
    fn reject_invalid_x5c() {
        for x5c in [json!([]), json!([""]), json!([42]), json!("MII")] {
            let h = header(json!({"b64": false, "crit": ["b64"], "x5c": x5c}));
            assert_eq!(validate_header(&h), Err(HeaderError::X5cInvalid));
        }
    }

    #[test]
    fn first_failing_rule_wins() {
        // b64 and x5c are both wrong; b64 is checked first
        let h = header(json!({"b64": true, "crit": ["b64"]}));
        assert_eq!(validate_header(&h), Err(HeaderError::B64NotFalse));

        let h = header(json!({"alg": "PS256"}));
        assert_eq!(validate_header(&h), Err(HeaderError::MissingB64));
    }
}
