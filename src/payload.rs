//! Canonical JSON encoding of detached payloads.
//!
//! Signer and verifier must produce byte-identical payloads. The encoding is
//! compact (`,` and `:` without spaces), keeps object members in the order of
//! the in-memory value and escapes everything outside printable ASCII as
//! `\uXXXX`, the same bytes `ensure_ascii` JSON encoders produce. Floats are
//! written like Python's `float.__repr__`, and NaN or infinite floats are
//! rejected since JSON has no representation for them.

use serde::ser::{self, Serialize};
use serde_json::ser::Formatter;
use std::io;

use crate::error::{Error, Result};

/// Serialize `value` into the canonical detached-payload bytes.
pub fn to_canonical_json<T>(value: &T) -> Result<Vec<u8>>
where
    T: Serialize + ?Sized,
{
    value
        .serialize(FiniteFloats)
        .map_err(Error::Serialization)?;

    let mut out = Vec::with_capacity(128);
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, AsciiFormatter);
    value
        .serialize(&mut serializer)
        .map_err(Error::Serialization)?;

    tracing::trace!(len = out.len(), "canonical payload encoded");
    Ok(out)
}

/// Compact formatter that escapes non-printable-ASCII characters.
struct AsciiFormatter;

impl Formatter for AsciiFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut start = 0;
        for (idx, ch) in fragment.char_indices() {
            if (' '..='~').contains(&ch) {
                continue;
            }
            if start < idx {
                writer.write_all(fragment[start..idx].as_bytes())?;
            }
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{:04x}", unit)?;
            }
            start = idx + ch.len_utf8();
        }
        if start < fragment.len() {
            writer.write_all(fragment[start..].as_bytes())?;
        }
        Ok(())
    }

    fn write_f32<W>(&mut self, writer: &mut W, value: f32) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(float_repr(&format!("{:e}", value)).as_bytes())
    }

    fn write_f64<W>(&mut self, writer: &mut W, value: f64) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(float_repr(&format!("{:e}", value)).as_bytes())
    }
}

/// Lay out the shortest round-trip digits of a finite float like Python's
/// `repr`: positional for decimal exponents from -4 to 15, otherwise
/// scientific with a signed exponent of at least two digits.
///
/// `scientific` is the `{:e}` rendering, e.g. `-1.5e-7`.
fn float_repr(scientific: &str) -> String {
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((scientific, "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let (sign, mantissa) = match mantissa.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", mantissa),
    };
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();

    let mut out = String::from(sign);
    let point = exponent + 1;
    if point > -4 && point <= 16 {
        if point <= 0 {
            out.push_str("0.");
            out.extend(std::iter::repeat('0').take(point.unsigned_abs() as usize));
            out.push_str(&digits);
        } else if point as usize >= digits.len() {
            out.push_str(&digits);
            out.extend(std::iter::repeat('0').take(point as usize - digits.len()));
            out.push_str(".0");
        } else {
            let (whole, fraction) = digits.split_at(point as usize);
            out.push_str(whole);
            out.push('.');
            out.push_str(fraction);
        }
    } else {
        let (first, rest) = digits.split_at(1);
        out.push_str(first);
        if !rest.is_empty() {
            out.push('.');
            out.push_str(rest);
        }
        let exponent_sign = if exponent < 0 { '-' } else { '+' };
        out.push_str(&format!("e{}{:02}", exponent_sign, exponent.unsigned_abs()));
    }
    out
}

/// Walks a value and fails on NaN or infinite floats.
///
/// `serde_json` writes those as `null`, which would make them sign the same
/// bytes as a real `null`.
struct FiniteFloats;

type Checked = std::result::Result<(), serde_json::Error>;

fn check_finite(finite: bool) -> Checked {
    if finite {
        Ok(())
    } else {
        Err(ser::Error::custom(
            "NaN and infinite floats cannot be encoded as JSON",
        ))
    }
}

impl ser::Serializer for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    fn serialize_f32(self, v: f32) -> Checked {
        check_finite(v.is_finite())
    }

    fn serialize_f64(self, v: f64) -> Checked {
        check_finite(v.is_finite())
    }

    fn serialize_bool(self, _: bool) -> Checked {
        Ok(())
    }

    fn serialize_i8(self, _: i8) -> Checked {
        Ok(())
    }

    fn serialize_i16(self, _: i16) -> Checked {
        Ok(())
    }

    fn serialize_i32(self, _: i32) -> Checked {
        Ok(())
    }

    fn serialize_i64(self, _: i64) -> Checked {
        Ok(())
    }

    fn serialize_i128(self, _: i128) -> Checked {
        Ok(())
    }

    fn serialize_u8(self, _: u8) -> Checked {
        Ok(())
    }

    fn serialize_u16(self, _: u16) -> Checked {
        Ok(())
    }

    fn serialize_u32(self, _: u32) -> Checked {
        Ok(())
    }

    fn serialize_u64(self, _: u64) -> Checked {
        Ok(())
    }

    fn serialize_u128(self, _: u128) -> Checked {
        Ok(())
    }

    fn serialize_char(self, _: char) -> Checked {
        Ok(())
    }

    fn serialize_str(self, _: &str) -> Checked {
        Ok(())
    }

    fn serialize_bytes(self, _: &[u8]) -> Checked {
        Ok(())
    }

    fn serialize_none(self) -> Checked {
        Ok(())
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Checked {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Checked {
        Ok(())
    }

    fn serialize_unit_struct(self, _: &'static str) -> Checked {
        Ok(())
    }

    fn serialize_unit_variant(self, _: &'static str, _: u32, _: &'static str) -> Checked {
        Ok(())
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        value: &T,
    ) -> Checked {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        value: &T,
    ) -> Checked {
        value.serialize(self)
    }

    fn serialize_seq(self, _: Option<usize>) -> std::result::Result<Self, serde_json::Error> {
        Ok(self)
    }

    fn serialize_tuple(self, _: usize) -> std::result::Result<Self, serde_json::Error> {
        Ok(self)
    }

    fn serialize_tuple_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> std::result::Result<Self, serde_json::Error> {
        Ok(self)
    }

    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> std::result::Result<Self, serde_json::Error> {
        Ok(self)
    }

    fn serialize_map(self, _: Option<usize>) -> std::result::Result<Self, serde_json::Error> {
        Ok(self)
    }

    fn serialize_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> std::result::Result<Self, serde_json::Error> {
        Ok(self)
    }

    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> std::result::Result<Self, serde_json::Error> {
        Ok(self)
    }
}

impl ser::SerializeSeq for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Checked {
        value.serialize(FiniteFloats)
    }

    fn end(self) -> Checked {
        Ok(())
    }
}

impl ser::SerializeTuple for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Checked {
        value.serialize(FiniteFloats)
    }

    fn end(self) -> Checked {
        Ok(())
    }
}

impl ser::SerializeTupleStruct for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Checked {
        value.serialize(FiniteFloats)
    }

    fn end(self) -> Checked {
        Ok(())
    }
}

impl ser::SerializeTupleVariant for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Checked {
        value.serialize(FiniteFloats)
    }

    fn end(self) -> Checked {
        Ok(())
    }
}

impl ser::SerializeMap for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Checked {
        key.serialize(FiniteFloats)
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Checked {
        value.serialize(FiniteFloats)
    }

    fn end(self) -> Checked {
        Ok(())
    }
}

impl ser::SerializeStruct for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, _: &'static str, value: &T) -> Checked {
        value.serialize(FiniteFloats)
    }

    fn end(self) -> Checked {
        Ok(())
    }
}

impl ser::SerializeStructVariant for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, _: &'static str, value: &T) -> Checked {
        value.serialize(FiniteFloats)
    }

    fn end(self) -> Checked {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use serde::Serialize;
    use std::collections::BTreeMap;

    fn canonical(value: &serde_json::Value) -> String {
        String::from_utf8(to_canonical_json(value).unwrap()).unwrap()
    }

    #[test]
    fn compact_separators() {
        let payload = json!({"data": {"request": {"info_ex1": "value 1", "info_ex2": "value 1"}}});
        assert_eq!(
            canonical(&payload),
            r#"{"data":{"request":{"info_ex1":"value 1","info_ex2":"value 1"}}}"#
        );
    }

    #[test]
    fn keeps_insertion_order() {
        let payload: serde_json::Value =
            serde_json::from_str(r#"{"z": 1, "a": [true, null, 2.5]}"#).unwrap();
        assert_eq!(canonical(&payload), r#"{"z":1,"a":[true,null,2.5]}"#);
    }

    #[test]
    fn escapes_non_ascii() {
        let payload = json!({"name": "Peña", "emoji": "😀", "del": "\u{7f}"});
        assert_eq!(
            canonical(&payload),
            r#"{"name":"Pe\u00f1a","emoji":"\ud83d\ude00","del":"\u007f"}"#
        );
    }

    #[test]
    fn floats_match_python_repr() {
        let payload = json!({
            "a": 1e16,
            "b": 1e-7,
            "c": 0.0001,
            "d": 1e-5,
            "e": 1e15,
            "f": -0.0,
            "g": 1.5,
            "h": 123456789012345680.0,
            "i": 1e100,
            "j": 2.5e-300,
            "k": 100.0
        });
        assert_eq!(
            canonical(&payload),
            concat!(
                r#"{"a":1e+16,"b":1e-07,"c":0.0001,"d":1e-05,"e":1000000000000000.0,"#,
                r#""f":-0.0,"g":1.5,"h":1.2345678901234568e+17,"i":1e+100,"#,
                r#""j":2.5e-300,"k":100.0}"#
            )
        );
    }

    #[test]
    fn f32_fields_use_shortest_digits() {
        #[derive(Serialize)]
        struct Reading {
            celsius: f32,
        }

        let bytes = to_canonical_json(&Reading { celsius: 0.1 }).unwrap();
        assert_eq!(bytes, br#"{"celsius":0.1}"#);
    }

    #[test]
    fn reject_non_finite_floats() {
        #[derive(Serialize)]
        struct Reading {
            v: Vec<Option<f64>>,
        }

        for v in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            let result = to_canonical_json(&Reading {
                v: vec![Some(1.0), Some(v)],
            });
            assert!(matches!(result, Err(Error::Serialization(_))));
        }

        let mut map = BTreeMap::new();
        map.insert("nested", (1u8, f32::NAN));
        assert!(matches!(
            to_canonical_json(&map),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn keeps_standard_escapes() {
        let payload = json!({"quote": "a\"b", "newline": "x\ny"});
        assert_eq!(canonical(&payload), r#"{"quote":"a\"b","newline":"x\ny"}"#);
    }

    #[test]
    fn structs_serialize_in_field_order() {
        #[derive(Serialize)]
        struct Request<'a> {
            info_ex2: &'a str,
            info_ex1: &'a str,
        }

        let bytes = to_canonical_json(&Request {
            info_ex2: "b",
            info_ex1: "a",
        })
        .unwrap();
        assert_eq!(bytes, br#"{"info_ex2":"b","info_ex1":"a"}"#);
    }

    #[test]
    fn reject_non_string_keys() {
        let mut map = BTreeMap::new();
        map.insert((1u8, 2u8), "value");

        let result = to_canonical_json(&map);
        assert!(matches!(result, Err(Error::Serialization(_))));
    }
}
