//! Tagged-value wire codec used for RPC arguments, return values and the
//! self-describing schema.
//!
//! The wire format is the RFC 8949 CBOR data model restricted to the shapes
//! this project needs. Rather than re-implement major/minor packing from
//! scratch, this module is a thin, typed layer over `minicbor`'s low-level
//! `Encoder`/`Decoder`, which already produces exactly this wire shape
//! (canonical minimum-width integers, big-endian multi-byte fields).

use minicbor::decode::Decoder;
use minicbor::encode::{Encoder, Write};

/// Writes into a fixed byte slice, failing once it's full.
///
/// Ported from the donor crate's `packet::SliceWriter`, generalised to be
/// reusable by both RPC argument/return encoding and schema emission.
pub struct SliceWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> SliceWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        SliceWriter { buf, pos: 0 }
    }

    pub fn len(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos == 0
    }
}

impl<'a> Write for SliceWriter<'a> {
    type Error = EncodeError;

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        let end = self.pos.checked_add(bytes.len()).ok_or(EncodeError::BufferFull)?;
        if end > self.buf.len() {
            return Err(EncodeError::BufferFull);
        }
        self.buf[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }
}

/// Errors produced while encoding a tagged value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    BufferFull,
}

impl core::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("tagged-value buffer exhausted")
    }
}

impl From<minicbor::encode::Error<EncodeError>> for EncodeError {
    fn from(e: minicbor::encode::Error<EncodeError>) -> Self {
        match e {
            minicbor::encode::Error::Write(inner) => inner,
            _ => EncodeError::BufferFull,
        }
    }
}

/// Errors produced while decoding a tagged value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Ran out of input before the value was fully decoded.
    Eof,
    /// The initial byte's major/minor did not match the expected type.
    TypeMismatch,
    /// An unsigned value didn't fit in the requested integer width, or a
    /// similar width/shape mismatch.
    Malformed,
}

impl core::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            DecodeError::Eof => "unexpected end of tagged-value input",
            DecodeError::TypeMismatch => "tagged-value type mismatch",
            DecodeError::Malformed => "malformed tagged value",
        };
        f.write_str(msg)
    }
}

impl From<minicbor::decode::Error> for DecodeError {
    fn from(_e: minicbor::decode::Error) -> Self {
        // minicbor's own `Error` doesn't expose a stable discriminant we
        // can match on; every low-level decode failure (truncated input,
        // wrong major type, bad width) is surfaced uniformly here.
        DecodeError::Malformed
    }
}

/// A value that can appear on the tagged-value wire: RPC arguments, return
/// values, and schema strings all implement this.
pub trait Value<'b>: Sized {
    fn encode<W: Write<Error = EncodeError>>(&self, e: &mut Encoder<W>) -> Result<(), EncodeError>;
    fn decode(d: &mut Decoder<'b>) -> Result<Self, DecodeError>;
    /// Worst-case encoded size in bytes, used to size scratch buffers.
    const MAX_SIZE: usize;
}

macro_rules! impl_value_uint {
    ($($t:ty => $max:expr),+ $(,)?) => {$(
        impl<'b> Value<'b> for $t {
            fn encode<W: Write<Error = EncodeError>>(&self, e: &mut Encoder<W>) -> Result<(), EncodeError> {
                e.u64(*self as u64).map(|_| ()).map_err(EncodeError::from)
            }
            fn decode(d: &mut Decoder<'b>) -> Result<Self, DecodeError> {
                let v = d.u64()?;
                <$t>::try_from(v).map_err(|_| DecodeError::Malformed)
            }
            const MAX_SIZE: usize = $max;
        }
    )+};
}

macro_rules! impl_value_int {
    ($($t:ty => $max:expr),+ $(,)?) => {$(
        impl<'b> Value<'b> for $t {
            fn encode<W: Write<Error = EncodeError>>(&self, e: &mut Encoder<W>) -> Result<(), EncodeError> {
                e.i64(*self as i64).map(|_| ()).map_err(EncodeError::from)
            }
            fn decode(d: &mut Decoder<'b>) -> Result<Self, DecodeError> {
                let v = d.i64()?;
                <$t>::try_from(v).map_err(|_| DecodeError::Malformed)
            }
            const MAX_SIZE: usize = $max;
        }
    )+};
}

impl_value_uint!(u8 => 2, u16 => 3, u32 => 5, u64 => 9);
impl_value_int!(i8 => 2, i16 => 3, i32 => 5, i64 => 9);

impl<'b> Value<'b> for bool {
    fn encode<W: Write<Error = EncodeError>>(&self, e: &mut Encoder<W>) -> Result<(), EncodeError> {
        e.bool(*self).map(|_| ()).map_err(EncodeError::from)
    }
    fn decode(d: &mut Decoder<'b>) -> Result<Self, DecodeError> {
        Ok(d.bool()?)
    }
    const MAX_SIZE: usize = 1;
}

/// The unit type is encoded as `undefined`, giving handlers with no
/// meaningful return value an explicit one-value response slot without
/// special-casing dispatch.
impl<'b> Value<'b> for () {
    fn encode<W: Write<Error = EncodeError>>(&self, e: &mut Encoder<W>) -> Result<(), EncodeError> {
        e.undefined().map(|_| ()).map_err(EncodeError::from)
    }
    fn decode(d: &mut Decoder<'b>) -> Result<Self, DecodeError> {
        d.undefined()?;
        Ok(())
    }
    const MAX_SIZE: usize = 1;
}

/// Distinct from `()`/`undefined`: the simple value `null` (major 7, minor
/// 22), the explicit "absent value" member of the tagged-value set. `Null`
/// is a unit struct rather than reusing `Option<T>`'s `None` arm, since
/// `null` is representable standalone, with no `T` in scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Null;

impl<'b> Value<'b> for Null {
    fn encode<W: Write<Error = EncodeError>>(&self, e: &mut Encoder<W>) -> Result<(), EncodeError> {
        e.null().map(|_| ()).map_err(EncodeError::from)
    }
    fn decode(d: &mut Decoder<'b>) -> Result<Self, DecodeError> {
        d.null()?;
        Ok(Null)
    }
    const MAX_SIZE: usize = 1;
}

impl<'b> Value<'b> for f32 {
    fn encode<W: Write<Error = EncodeError>>(&self, e: &mut Encoder<W>) -> Result<(), EncodeError> {
        e.f32(*self).map(|_| ()).map_err(EncodeError::from)
    }
    fn decode(d: &mut Decoder<'b>) -> Result<Self, DecodeError> {
        match d.datatype()? {
            minicbor::data::Type::F16 => Ok(d.f16()?),
            _ => Ok(d.f32()?),
        }
    }
    const MAX_SIZE: usize = 5;
}

impl<'b> Value<'b> for f64 {
    fn encode<W: Write<Error = EncodeError>>(&self, e: &mut Encoder<W>) -> Result<(), EncodeError> {
        e.f64(*self).map(|_| ()).map_err(EncodeError::from)
    }
    fn decode(d: &mut Decoder<'b>) -> Result<Self, DecodeError> {
        match d.datatype()? {
            minicbor::data::Type::F16 => Ok(d.f16()? as f64),
            minicbor::data::Type::F32 => Ok(d.f32()? as f64),
            _ => Ok(d.f64()?),
        }
    }
    const MAX_SIZE: usize = 9;
}

impl<'b> Value<'b> for &'b str {
    fn encode<W: Write<Error = EncodeError>>(&self, e: &mut Encoder<W>) -> Result<(), EncodeError> {
        e.str(self).map(|_| ()).map_err(EncodeError::from)
    }
    fn decode(d: &mut Decoder<'b>) -> Result<Self, DecodeError> {
        Ok(d.str()?)
    }
    const MAX_SIZE: usize = usize::MAX;
}

/// A borrowed byte string (CBOR major 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bytes<'b>(pub &'b [u8]);

impl<'b> Value<'b> for Bytes<'b> {
    fn encode<W: Write<Error = EncodeError>>(&self, e: &mut Encoder<W>) -> Result<(), EncodeError> {
        e.bytes(self.0).map(|_| ()).map_err(EncodeError::from)
    }
    fn decode(d: &mut Decoder<'b>) -> Result<Self, DecodeError> {
        Ok(Bytes(d.bytes()?))
    }
    const MAX_SIZE: usize = usize::MAX;
}

impl<'b, T: Value<'b>, const N: usize> Value<'b> for [T; N] {
    fn encode<W: Write<Error = EncodeError>>(&self, e: &mut Encoder<W>) -> Result<(), EncodeError> {
        e.array(N as u64).map_err(EncodeError::from)?;
        for item in self {
            item.encode(e)?;
        }
        Ok(())
    }
    fn decode(d: &mut Decoder<'b>) -> Result<Self, DecodeError> {
        let len = read_array_len(d, N)?;
        let mut out: [Option<T>; N] = core::array::from_fn(|_| None);
        for slot in out.iter_mut() {
            *slot = Some(T::decode(d)?);
        }
        if len.is_none() {
            expect_sequence_end(d)?;
        }
        Ok(out.map(|v| v.expect("all slots filled above")))
    }
    const MAX_SIZE: usize = 1 + N * T::MAX_SIZE;
}

/// Reads an array header, checking a fixed arity against it; returns
/// `Some(len)` for definite-length arrays, `None` for indefinite ones
/// (caller must then consume the trailing break marker).
pub(crate) fn read_array_len(d: &mut Decoder<'_>, arity: usize) -> Result<Option<u64>, DecodeError> {
    match d.array()? {
        Some(len) => {
            if len as usize != arity {
                return Err(DecodeError::Malformed);
            }
            Ok(Some(len))
        }
        None => Ok(None),
    }
}

pub(crate) fn expect_sequence_end(d: &mut Decoder<'_>) -> Result<(), DecodeError> {
    if !matches!(d.datatype()?, minicbor::data::Type::Break) {
        return Err(DecodeError::Malformed);
    }
    d.skip()?;
    Ok(())
}

macro_rules! impl_value_tuple {
    ($arity:expr; $($idx:tt : $name:ident),+) => {
        impl<'b, $($name: Value<'b>),+> Value<'b> for ($($name,)+) {
            fn encode<W: Write<Error = EncodeError>>(&self, e: &mut Encoder<W>) -> Result<(), EncodeError> {
                e.array($arity).map_err(EncodeError::from)?;
                $(self.$idx.encode(e)?;)+
                Ok(())
            }
            fn decode(d: &mut Decoder<'b>) -> Result<Self, DecodeError> {
                let len = read_array_len(d, $arity as usize)?;
                let value = ($($name::decode(d)?,)+);
                if len.is_none() {
                    expect_sequence_end(d)?;
                }
                Ok(value)
            }
            const MAX_SIZE: usize = 1 $(+ $name::MAX_SIZE)+;
        }
    };
}

impl_value_tuple!(1; 0: A);
impl_value_tuple!(2; 0: A, 1: B);
impl_value_tuple!(3; 0: A, 1: B, 2: C);
impl_value_tuple!(4; 0: A, 1: B, 2: C, 3: D);
impl_value_tuple!(5; 0: A, 1: B, 2: C, 3: D, 4: E);
impl_value_tuple!(6; 0: A, 1: B, 2: C, 3: D, 4: E, 5: F);
impl_value_tuple!(7; 0: A, 1: B, 2: C, 3: D, 4: E, 5: F, 6: G);
impl_value_tuple!(8; 0: A, 1: B, 2: C, 3: D, 4: E, 5: F, 6: G, 7: H);

/// Encodes an already-header-length-known sequence of heterogeneous items
/// into a definite-length array, mirroring the donor reference's
/// `Cbor::Sequence<Major::Array>` builder (used to build RPC schema
/// records, which mix strings and nested arrays).
pub struct ArrayWriter<'e, 'a, W: Write<Error = EncodeError>> {
    e: &'e mut Encoder<W>,
    _marker: core::marker::PhantomData<&'a ()>,
}

impl<'e, 'a, W: Write<Error = EncodeError>> ArrayWriter<'e, 'a, W> {
    pub fn new(e: &'e mut Encoder<W>, len: u64) -> Result<Self, EncodeError> {
        e.array(len).map_err(EncodeError::from)?;
        Ok(ArrayWriter { e, _marker: core::marker::PhantomData })
    }

    pub fn item<V: Value<'a>>(&mut self, v: &V) -> Result<(), EncodeError> {
        v.encode(self.e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_value<'b, V: Value<'b>>(v: &V, buf: &mut [u8]) -> usize {
        let mut enc = Encoder::new(SliceWriter::new(buf));
        v.encode(&mut enc).unwrap();
        enc.into_writer().len()
    }

    #[test]
    fn tagged_value_vectors() {
        let mut buf = [0u8; 16];
        assert_eq!(&buf[..encode_value(&0u32, &mut buf)], &[0x00]);
        assert_eq!(&buf[..encode_value(&23u32, &mut buf)], &[0x17]);
        assert_eq!(&buf[..encode_value(&24u32, &mut buf)], &[0x18, 0x18]);
        assert_eq!(&buf[..encode_value(&1000u32, &mut buf)], &[0x19, 0x03, 0xE8]);
        assert_eq!(&buf[..encode_value(&(-1i32), &mut buf)], &[0x20]);
        assert_eq!(&buf[..encode_value(&(-100i32), &mut buf)], &[0x38, 0x63]);
        assert_eq!(&buf[..encode_value(&false, &mut buf)], &[0xF4]);
        assert_eq!(&buf[..encode_value(&true, &mut buf)], &[0xF5]);
        assert_eq!(&buf[..encode_value(&Null, &mut buf)], &[0xF6]);
        assert_eq!(
            &buf[..encode_value(&"IETF", &mut buf)],
            &[0x64, 0x49, 0x45, 0x54, 0x46]
        );
        assert_eq!(
            &buf[..encode_value(&Bytes(&[1, 2, 3, 4]), &mut buf)],
            &[0x44, 1, 2, 3, 4]
        );
    }

    #[test]
    fn nested_array_vector() {
        let mut buf = [0u8; 16];
        let value = (1u32, (2u32, 3u32), (4u32, 5u32));
        let n = encode_value(&value, &mut buf);
        assert_eq!(&buf[..n], &[0x83, 0x01, 0x82, 0x02, 0x03, 0x82, 0x04, 0x05]);
    }

    #[test]
    fn round_trips_integers_and_strings() {
        let mut buf = [0u8; 32];
        let n = encode_value(&(42u32, "hi", true), &mut buf);
        let mut dec = Decoder::new(&buf[..n]);
        let (a, b, c): (u32, &str, bool) = Value::decode(&mut dec).unwrap();
        assert_eq!((a, b, c), (42, "hi", true));
    }

    #[test]
    fn float_decode_upcasts_narrower_widths() {
        let mut buf = [0u8; 16];
        let n = encode_value(&1.5f32, &mut buf);
        let mut dec = Decoder::new(&buf[..n]);
        let v: f64 = Value::decode(&mut dec).unwrap();
        assert_eq!(v, 1.5f64);
    }

    #[test]
    fn null_round_trips_distinct_from_undefined() {
        let mut buf = [0u8; 4];
        let n = encode_value(&Null, &mut buf);
        assert_eq!(&buf[..n], &[0xF6]);
        let mut dec = Decoder::new(&buf[..n]);
        assert_eq!(Null::decode(&mut dec).unwrap(), Null);
    }

    #[test]
    fn rejects_narrower_unsigned_overflow() {
        let mut buf = [0u8; 16];
        let n = encode_value(&1000u32, &mut buf);
        let mut dec = Decoder::new(&buf[..n]);
        let err = u8::decode(&mut dec).unwrap_err();
        assert_eq!(err, DecodeError::Malformed);
    }
}
