//! Little-endian encode/decode traits for persisted structures.
//!
//! Hand-rolled `Encodeable`/`Decodeable` over a `Read`/`Write` pair rather
//! than reaching for `serde`. Shadow records, column-chunk metadata and the
//! statistics catalog all use this same pair so they share one wire format.

use std::io::{Read, Write};

pub trait Encodeable {
    fn encode(&self) -> Vec<u8>;
}

pub trait Decodeable: Sized {
    fn decode_from<R: Read>(reader: &mut R) -> std::io::Result<Self>;
}

pub fn read_exact_vec<R: Read>(reader: &mut R, len: usize) -> std::io::Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

macro_rules! impl_int_codec {
    ($ty:ty) => {
        impl Encodeable for $ty {
            fn encode(&self) -> Vec<u8> {
                self.to_le_bytes().to_vec()
            }
        }

        impl Decodeable for $ty {
            fn decode_from<R: Read>(reader: &mut R) -> std::io::Result<Self> {
                let mut buf = [0u8; std::mem::size_of::<$ty>()];
                reader.read_exact(&mut buf)?;
                Ok(<$ty>::from_le_bytes(buf))
            }
        }
    };
}

impl_int_codec!(u8);
impl_int_codec!(u16);
impl_int_codec!(u32);
impl_int_codec!(u64);
impl_int_codec!(i8);
impl_int_codec!(i16);
impl_int_codec!(i32);
impl_int_codec!(i64);
impl_int_codec!(f64);

impl Encodeable for bool {
    fn encode(&self) -> Vec<u8> {
        vec![*self as u8]
    }
}

impl Decodeable for bool {
    fn decode_from<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        Ok(u8::decode_from(reader)? != 0)
    }
}

impl Encodeable for String {
    fn encode(&self) -> Vec<u8> {
        let bytes = self.as_bytes();
        let mut out = (bytes.len() as u32).encode();
        out.extend_from_slice(bytes);
        out
    }
}

impl Decodeable for String {
    fn decode_from<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let len = u32::decode_from(reader)? as usize;
        let bytes = read_exact_vec(reader, len)?;
        String::from_utf8(bytes).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

impl<T: Encodeable> Encodeable for Vec<T> {
    fn encode(&self) -> Vec<u8> {
        let mut out = (self.len() as u32).encode();
        for item in self {
            out.extend(item.encode());
        }
        out
    }
}

impl<T: Decodeable> Decodeable for Vec<T> {
    fn decode_from<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let len = u32::decode_from(reader)? as usize;
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            out.push(T::decode_from(reader)?);
        }
        Ok(out)
    }
}

/// Write an encodable value followed by a flush; used for the small
/// catalog/statistics files that are rewritten wholesale rather than
/// incrementally.
pub fn write_whole<W: Write, T: Encodeable>(writer: &mut W, value: &T) -> std::io::Result<()> {
    writer.write_all(&value.encode())?;
    writer.flush()
}
