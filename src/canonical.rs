//! Byte deriver: the canonical byte representation of a configuration value.
//!
//! A value is first lowered to a [`serde_json::Value`] and then written out as
//! canonical JSON: object keys sorted, no insignificant whitespace. The output
//! depends only on the value's logical content, never on allocation history or
//! map insertion order, so it is stable across processes and runs.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::ser::{self, Serialize};
use serde_json::Value;

use crate::error::FilterError;

/// Derive the canonical bytes of `value`.
///
/// # Errors
///
/// [`FilterError::Serialization`] when serde refuses the value (a map with
/// non-string keys, a `Serialize` impl that reports an error, and so on), or
/// when the value holds a NaN or infinite float.
pub fn derive_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, FilterError> {
    let type_name = std::any::type_name::<T>();
    let tree = to_canonical_value(value)?;

    let mut out = Vec::new();
    write_canonical(&mut out, &tree)
        .map_err(|source| FilterError::Serialization { type_name, source })?;
    Ok(out)
}

/// Lower `value` to a JSON tree, refusing anything JSON would misrepresent.
///
/// `serde_json` writes NaN and the infinities as `null`, which would make
/// them equal to each other and to `()`. They are rejected instead.
pub(crate) fn to_canonical_value<T: Serialize + ?Sized>(value: &T) -> Result<Value, FilterError> {
    let type_name = std::any::type_name::<T>();
    value
        .serialize(&mut FiniteFloats)
        .and_then(|()| serde_json::to_value(value))
        .map_err(|source| FilterError::Serialization { type_name, source })
}

/// Reconstruct a value from bytes produced by [`derive_bytes`].
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, FilterError> {
    serde_json::from_slice(bytes).map_err(|source| FilterError::Decode {
        type_name: std::any::type_name::<T>(),
        source,
    })
}

fn write_canonical(out: &mut Vec<u8>, value: &Value) -> Result<(), serde_json::Error> {
    match value {
        Value::Object(map) => {
            // Sort explicitly: `serde_json::Map` keeps insertion order when
            // any crate in the graph turns on `preserve_order`.
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            out.push(b'{');
            for (i, (k, v)) in sorted.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                serde_json::to_writer(&mut *out, k)?;
                out.push(b':');
                write_canonical(out, v)?;
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, v) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(out, v)?;
            }
            out.push(b']');
        }
        scalar => serde_json::to_writer(&mut *out, scalar)?,
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// FiniteFloats
// ---------------------------------------------------------------------------

/// A serializer that produces nothing and fails on the first non-finite float.
struct FiniteFloats;

fn check_float(v: f64) -> Result<(), serde_json::Error> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(ser::Error::custom(format_args!("float {v} has no canonical form")))
    }
}

impl<'a> ser::Serializer for &'a mut FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;

    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    fn serialize_f32(self, v: f32) -> Result<(), Self::Error> {
        check_float(f64::from(v))
    }
    fn serialize_f64(self, v: f64) -> Result<(), Self::Error> {
        check_float(v)
    }

    fn serialize_bool(self, _: bool) -> Result<(), Self::Error> { Ok(()) }
    fn serialize_i8(self, _: i8) -> Result<(), Self::Error> { Ok(()) }
    fn serialize_i16(self, _: i16) -> Result<(), Self::Error> { Ok(()) }
    fn serialize_i32(self, _: i32) -> Result<(), Self::Error> { Ok(()) }
    fn serialize_i64(self, _: i64) -> Result<(), Self::Error> { Ok(()) }
    fn serialize_i128(self, _: i128) -> Result<(), Self::Error> { Ok(()) }
    fn serialize_u8(self, _: u8) -> Result<(), Self::Error> { Ok(()) }
    fn serialize_u16(self, _: u16) -> Result<(), Self::Error> { Ok(()) }
    fn serialize_u32(self, _: u32) -> Result<(), Self::Error> { Ok(()) }
    fn serialize_u64(self, _: u64) -> Result<(), Self::Error> { Ok(()) }
    fn serialize_u128(self, _: u128) -> Result<(), Self::Error> { Ok(()) }
    fn serialize_char(self, _: char) -> Result<(), Self::Error> { Ok(()) }
    fn serialize_str(self, _: &str) -> Result<(), Self::Error> { Ok(()) }
    fn serialize_bytes(self, _: &[u8]) -> Result<(), Self::Error> { Ok(()) }
    fn serialize_none(self) -> Result<(), Self::Error> { Ok(()) }
    fn serialize_unit(self) -> Result<(), Self::Error> { Ok(()) }
    fn serialize_unit_struct(self, _: &'static str) -> Result<(), Self::Error> { Ok(()) }

    fn serialize_unit_variant(self, _: &'static str, _: u32, _: &'static str) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<(), Self::Error> {
        value.serialize(self)
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(self, _: &'static str, value: &T) -> Result<(), Self::Error> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        value.serialize(self)
    }

    fn serialize_seq(self, _: Option<usize>) -> Result<Self, Self::Error> { Ok(self) }
    fn serialize_tuple(self, _: usize) -> Result<Self, Self::Error> { Ok(self) }
    fn serialize_tuple_struct(self, _: &'static str, _: usize) -> Result<Self, Self::Error> { Ok(self) }
    fn serialize_map(self, _: Option<usize>) -> Result<Self, Self::Error> { Ok(self) }
    fn serialize_struct(self, _: &'static str, _: usize) -> Result<Self, Self::Error> { Ok(self) }

    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self, Self::Error> {
        Ok(self)
    }

    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self, Self::Error> {
        Ok(self)
    }
}

macro_rules! check_elements {
    ($($trait:ident :: $method:ident),* $(,)?) => {$(
        impl<'a> ser::$trait for &'a mut FiniteFloats {
            type Ok = ();
            type Error = serde_json::Error;

            fn $method<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Self::Error> {
                value.serialize(&mut **self)
            }

            fn end(self) -> Result<(), Self::Error> {
                Ok(())
            }
        }
    )*};
}

check_elements!(
    SerializeSeq::serialize_element,
    SerializeTuple::serialize_element,
    SerializeTupleStruct::serialize_field,
    SerializeTupleVariant::serialize_field,
);

impl<'a> ser::SerializeMap for &'a mut FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), Self::Error> {
        key.serialize(&mut **self)
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Self::Error> {
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl<'a> ser::SerializeStruct for &'a mut FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, _: &'static str, value: &T) -> Result<(), Self::Error> {
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl<'a> ser::SerializeStructVariant for &'a mut FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, _: &'static str, value: &T) -> Result<(), Self::Error> {
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fingerprint
// ---------------------------------------------------------------------------

/// A 256-bit blake3 digest of canonical bytes.
///
/// Byte equality is what decides equality; the fingerprint is a compact,
/// collision-resistant key for caches that live outside the process.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex, 64 characters.
    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({}…)", &self.to_hex()[..8])
    }
}

/// Digest canonical bytes with domain separation and a length prefix.
pub fn fingerprint(bytes: &[u8]) -> Fingerprint {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"canonfilter:v1:");
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
    Fingerprint(*hasher.finalize().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap};

    #[test]
    fn object_keys_are_sorted() {
        let bytes = derive_bytes(&serde_json::json!({"b": 1, "a": [true, null], "c": "x"})).unwrap();
        assert_eq!(bytes, br#"{"a":[true,null],"b":1,"c":"x"}"#);
    }

    #[test]
    fn hash_map_order_does_not_leak_into_bytes() {
        let mut forward = HashMap::new();
        let mut backward = HashMap::new();
        for i in 0..32 {
            forward.insert(format!("k{i}"), i);
        }
        for i in (0..32).rev() {
            backward.insert(format!("k{i}"), i);
        }
        assert_eq!(derive_bytes(&forward).unwrap(), derive_bytes(&backward).unwrap());
    }

    #[test]
    fn non_string_map_keys_fail_with_serialization_error() {
        let mut map = BTreeMap::new();
        map.insert(vec![1u8], "v");
        let err = derive_bytes(&map).unwrap_err();
        assert!(matches!(err, FilterError::Serialization { .. }));
        assert!(err.is_serialization());
    }

    #[test]
    fn non_finite_floats_fail_instead_of_becoming_null() {
        for v in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = derive_bytes(&v).unwrap_err();
            assert!(matches!(err, FilterError::Serialization { .. }), "{v}");
        }
        assert!(derive_bytes(&f32::NAN).is_err());

        #[derive(serde::Serialize)]
        struct Nested {
            scale: Vec<Option<f64>>,
        }
        let nested = Nested { scale: vec![Some(1.0), Some(f64::INFINITY)] };
        assert!(derive_bytes(&nested).is_err());

        let mut keyed = BTreeMap::new();
        keyed.insert("ratio", (0.5, f64::NAN));
        assert!(derive_bytes(&keyed).is_err());
    }

    #[test]
    fn finite_floats_and_unit_keep_distinct_bytes() {
        assert_eq!(derive_bytes(&()).unwrap(), b"null");
        assert_eq!(derive_bytes(&1.5f64).unwrap(), b"1.5");
        assert_ne!(derive_bytes(&0.0f64).unwrap(), derive_bytes(&()).unwrap());
    }

    #[test]
    fn decode_reports_target_type() {
        let err = decode::<Vec<String>>(b"{not json").unwrap_err();
        assert!(matches!(err, FilterError::Decode { .. }));
        assert!(err.type_name().unwrap().contains("Vec"));
    }

    #[test]
    fn fingerprint_is_deterministic_and_sensitive() {
        let a = fingerprint(b"abc");
        assert_eq!(a, fingerprint(b"abc"));
        assert_ne!(a, fingerprint(b"abd"));
        assert_eq!(a.to_hex().len(), 64);
        assert_eq!(a.to_string(), a.to_hex());
    }
}
