//! A generic tuple value used by the local write buffers and the operator
//! runtime's intermediate (post-scan) representation. Raw columnar storage
//! (§4.D/E) and execution-time vectors (§4.G) stay strictly typed; this
//! enum only appears once data has left a single-typed column/vector and is
//! flowing row-wise through joins, aggregates, and sorts.

use std::io::Read;

use crate::io::{Decodeable, Encodeable};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int64(i64),
    Double(f64),
    Bool(bool),
    String(String),
}

impl Value {
    pub fn as_int64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
        }
    }
}

pub type Tuple = Vec<Value>;

/// Tag-byte wire format, delegating each variant's payload to the scalar
/// codec it already has in `io.rs` (spec §4.I "row persistence"), the same
/// wrap-a-primitive approach `ShadowPageRecord` uses for `DbFileKind`.
impl Encodeable for Value {
    fn encode(&self) -> Vec<u8> {
        match self {
            Value::Null => vec![0u8],
            Value::Int64(v) => {
                let mut out = vec![1u8];
                out.extend(v.encode());
                out
            }
            Value::Double(v) => {
                let mut out = vec![2u8];
                out.extend(v.encode());
                out
            }
            Value::Bool(v) => {
                let mut out = vec![3u8];
                out.extend(v.encode());
                out
            }
            Value::String(v) => {
                let mut out = vec![4u8];
                out.extend(v.encode());
                out
            }
        }
    }
}

impl Decodeable for Value {
    fn decode_from<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let tag = u8::decode_from(reader)?;
        Ok(match tag {
            0 => Value::Null,
            1 => Value::Int64(i64::decode_from(reader)?),
            2 => Value::Double(f64::decode_from(reader)?),
            3 => Value::Bool(bool::decode_from(reader)?),
            4 => Value::String(String::decode_from(reader)?),
            other => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("unknown Value tag {}", other),
                ))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_roundtrips_through_encode_decode() {
        let values = vec![
            Value::Null,
            Value::Int64(-7),
            Value::Double(2.5),
            Value::Bool(true),
            Value::String("hi".into()),
        ];
        for v in values {
            let bytes = v.encode();
            let decoded = Value::decode_from(&mut bytes.as_slice()).unwrap();
            assert_eq!(decoded, v);
        }
    }
}
