use std::fmt::Debug;

use ragged_buffer::{Buffer, BufferMut};
use ragged_dtype::{NativePType, PType, match_each_native_ptype};
use ragged_error::{RaggedResult, ragged_bail, ragged_err};
use serde_json::Value;

use crate::Length;

/// The concrete contents of a buffer: one variant per primitive type.
#[derive(Clone, Debug, PartialEq)]
pub enum Values {
    Bool(Buffer<bool>),
    I8(Buffer<i8>),
    U8(Buffer<u8>),
    I16(Buffer<i16>),
    U16(Buffer<u16>),
    I32(Buffer<i32>),
    U32(Buffer<u32>),
    I64(Buffer<i64>),
    U64(Buffer<u64>),
    F32(Buffer<f32>),
    F64(Buffer<f64>),
}

/// The writable counterpart of [`Values`], filled in by kernels.
#[derive(Clone, Debug, PartialEq)]
pub enum ValuesMut {
    Bool(BufferMut<bool>),
    I8(BufferMut<i8>),
    U8(BufferMut<u8>),
    I16(BufferMut<i16>),
    U16(BufferMut<u16>),
    I32(BufferMut<i32>),
    U32(BufferMut<u32>),
    I64(BufferMut<i64>),
    U64(BufferMut<u64>),
    F32(BufferMut<f32>),
    F64(BufferMut<f64>),
}

/// Maps a native type onto its [`Values`] variant.
pub trait Primitive: NativePType {
    fn values(values: &Values) -> Option<&Buffer<Self>>;

    fn values_mut(values: &mut ValuesMut) -> Option<&mut BufferMut<Self>>;

    fn wrap(buffer: Buffer<Self>) -> Values;

    fn wrap_mut(buffer: BufferMut<Self>) -> ValuesMut;
}

macro_rules! primitive {
    ($T:ty, $V:ident) => {
        impl Primitive for $T {
            #[inline]
            fn values(values: &Values) -> Option<&Buffer<Self>> {
                match values {
                    Values::$V(b) => Some(b),
                    _ => None,
                }
            }

            #[inline]
            fn values_mut(values: &mut ValuesMut) -> Option<&mut BufferMut<Self>> {
                match values {
                    ValuesMut::$V(b) => Some(b),
                    _ => None,
                }
            }

            fn wrap(buffer: Buffer<Self>) -> Values {
                Values::$V(buffer)
            }

            fn wrap_mut(buffer: BufferMut<Self>) -> ValuesMut {
                ValuesMut::$V(buffer)
            }
        }
    };
}

primitive!(bool, Bool);
primitive!(i8, I8);
primitive!(u8, U8);
primitive!(i16, I16);
primitive!(u16, U16);
primitive!(i32, I32);
primitive!(u32, U32);
primitive!(i64, I64);
primitive!(u64, U64);
primitive!(f32, F32);
primitive!(f64, F64);

macro_rules! each_values {
    ($values:expr, $Kind:ident, |$b:ident| $body:expr) => {
        match $values {
            $Kind::Bool($b) => $body,
            $Kind::I8($b) => $body,
            $Kind::U8($b) => $body,
            $Kind::I16($b) => $body,
            $Kind::U16($b) => $body,
            $Kind::I32($b) => $body,
            $Kind::U32($b) => $body,
            $Kind::I64($b) => $body,
            $Kind::U64($b) => $body,
            $Kind::F32($b) => $body,
            $Kind::F64($b) => $body,
        }
    };
}

impl Values {
    pub fn ptype(&self) -> PType {
        match self {
            Values::Bool(_) => PType::Bool,
            Values::I8(_) => PType::I8,
            Values::U8(_) => PType::U8,
            Values::I16(_) => PType::I16,
            Values::U16(_) => PType::U16,
            Values::I32(_) => PType::I32,
            Values::U32(_) => PType::U32,
            Values::I64(_) => PType::I64,
            Values::U64(_) => PType::U64,
            Values::F32(_) => PType::F32,
            Values::F64(_) => PType::F64,
        }
    }

    pub fn len(&self) -> usize {
        each_values!(self, Values, |b| b.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Zero-copy window `[start, stop)`. The caller checks bounds.
    pub fn slice(&self, start: usize, stop: usize) -> Values {
        each_values!(self, Values, |b| Primitive::wrap(b.slice(start..stop)))
    }

    /// Element `i` widened to `i64`.
    pub fn get_i64(&self, i: usize) -> i64 {
        each_values!(self, Values, |b| b[i].to_i64())
    }

    /// Element `i` widened to `f64`.
    pub fn get_f64(&self, i: usize) -> f64 {
        each_values!(self, Values, |b| b[i].to_f64())
    }

    /// Element `i` as JSON.
    pub fn json_at(&self, i: usize) -> Value {
        each_values!(self, Values, |b| b[i].to_json())
    }

    /// Every element, widened to `i64`.
    pub fn to_i64_vec(&self) -> Vec<i64> {
        each_values!(self, Values, |b| b.iter().map(|v| v.to_i64()).collect())
    }

    /// Little-endian bytes of the visible window.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        each_values!(self, Values, |b| {
            let mut out = Vec::with_capacity(b.len() * self.ptype().byte_width());
            b.iter().for_each(|v| v.write_le(&mut out));
            out
        })
    }

    /// Read `bytes` as little-endian values of `ptype`.
    pub fn from_le_bytes(ptype: PType, bytes: &[u8]) -> RaggedResult<Values> {
        let width = ptype.byte_width();
        if bytes.len() % width != 0 {
            ragged_bail!(
                Serde: "{} bytes do not hold a whole number of {ptype} values",
                bytes.len()
            );
        }
        Ok(match_each_native_ptype!(ptype, |$T| {
            Primitive::wrap(
                bytes
                    .chunks_exact(width)
                    .map(<$T as NativePType>::read_le)
                    .collect::<Buffer<$T>>(),
            )
        }))
    }

    /// Number of bytes held by the visible window.
    pub fn nbytes(&self) -> usize {
        self.len() * self.ptype().byte_width()
    }
}

impl ValuesMut {
    /// A buffer of `len` zeros (or `false`).
    pub fn zeroed(ptype: PType, len: usize) -> ValuesMut {
        match_each_native_ptype!(ptype, |$T| {
            Primitive::wrap_mut(BufferMut::<$T>::zeroed(len))
        })
    }

    pub fn ptype(&self) -> PType {
        self.clone().freeze().ptype()
    }

    pub fn len(&self) -> usize {
        each_values!(self, ValuesMut, |b| b.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn freeze(self) -> Values {
        each_values!(self, ValuesMut, |b| Primitive::wrap(b.freeze()))
    }
}

/// A buffer as seen by a layout node: real values, or a dtype and length with no data
/// behind them.
#[derive(Clone, Debug)]
pub enum Data {
    /// Values held in memory.
    Known(Values),
    /// Shape-only placeholder produced by the typetracer backend.
    Abstract { ptype: PType, length: Length },
}

impl Data {
    pub fn ptype(&self) -> PType {
        match self {
            Data::Known(values) => values.ptype(),
            Data::Abstract { ptype, .. } => *ptype,
        }
    }

    pub fn length(&self) -> Length {
        match self {
            Data::Known(values) => Length::Known(values.len()),
            Data::Abstract { length, .. } => *length,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Data::Known(_))
    }

    pub fn values(&self) -> Option<&Values> {
        match self {
            Data::Known(values) => Some(values),
            Data::Abstract { .. } => None,
        }
    }

    /// The values, or an error naming the operation that needed them.
    pub fn require_values(&self, what: &str) -> RaggedResult<&Values> {
        self.values().ok_or_else(
            || ragged_err!(NotImplemented: "{what} requires concrete data, not a typetracer buffer"),
        )
    }

    /// The values as a typed slice, if they are known and of type `T`.
    pub fn as_slice<T: Primitive>(&self) -> Option<&[T]> {
        self.values()
            .and_then(T::values)
            .map(|buffer| buffer.as_slice())
    }

    /// The same dtype with no data and an unknown length.
    pub fn to_abstract(&self) -> Data {
        Data::Abstract {
            ptype: self.ptype(),
            length: Length::Unknown,
        }
    }

    /// Window `[start, stop)`.
    pub fn slice(&self, start: Length, stop: Length) -> RaggedResult<Data> {
        match self {
            Data::Known(values) => {
                let (Length::Known(start), Length::Known(stop)) = (start, stop) else {
                    ragged_bail!(AssertionFailed: "cannot window known data with unknown bounds");
                };
                if start > stop || stop > values.len() {
                    ragged_bail!(
                        AssertionFailed: "window [{start}, {stop}) out of bounds for a buffer of length {}",
                        values.len()
                    );
                }
                Ok(Data::Known(values.slice(start, stop)))
            }
            Data::Abstract { ptype, .. } => Ok(Data::Abstract {
                ptype: *ptype,
                length: stop - start,
            }),
        }
    }
}

impl<T: Primitive> From<Buffer<T>> for Data {
    fn from(buffer: Buffer<T>) -> Self {
        Data::Known(T::wrap(buffer))
    }
}

impl From<Values> for Data {
    fn from(values: Values) -> Self {
        Data::Known(values)
    }
}

/// A kernel output buffer. On the typetracer backend this is only a dtype and a length.
#[derive(Clone, Debug)]
pub enum DataMut {
    /// Writable values held in memory.
    Known(ValuesMut),
    /// Shape-only placeholder.
    Abstract { ptype: PType, length: Length },
}

impl DataMut {
    pub fn ptype(&self) -> PType {
        match self {
            DataMut::Known(values) => values.ptype(),
            DataMut::Abstract { ptype, .. } => *ptype,
        }
    }

    pub fn length(&self) -> Length {
        match self {
            DataMut::Known(values) => Length::Known(values.len()),
            DataMut::Abstract { length, .. } => *length,
        }
    }

    /// The values as a typed mutable slice, if they are known and of type `T`.
    pub fn as_mut_slice<T: Primitive>(&mut self) -> Option<&mut [T]> {
        match self {
            DataMut::Known(values) => T::values_mut(values).map(|b| b.as_mut_slice()),
            DataMut::Abstract { .. } => None,
        }
    }

    pub fn freeze(self) -> Data {
        match self {
            DataMut::Known(values) => Data::Known(values.freeze()),
            DataMut::Abstract { ptype, length } => Data::Abstract { ptype, length },
        }
    }
}

#[cfg(test)]
mod test {
    use ragged_buffer::buffer;

    use super::*;

    #[test]
    fn abstract_slices_track_lengths() {
        let data = Data::Abstract {
            ptype: PType::I64,
            length: Length::Unknown,
        };
        let sliced = data.slice(Length::Known(1), Length::Unknown).unwrap();
        assert_eq!(sliced.length(), Length::Unknown);
        assert_eq!(sliced.ptype(), PType::I64);
    }

    #[test]
    fn known_slices_are_views() {
        let data = Data::from(buffer![1.5f64, 2.5, 3.5]);
        let sliced = data.slice(Length::Known(1), Length::Known(3)).unwrap();
        assert_eq!(sliced.as_slice::<f64>(), Some([2.5, 3.5].as_slice()));
        assert!(sliced.as_slice::<i64>().is_none());
        assert!(data.slice(Length::Known(2), Length::Known(4)).is_err());
    }

    #[test]
    fn little_endian_round_trip() {
        let values = Values::I32(buffer![1i32, -2, 300]);
        let bytes = values.to_le_bytes();
        assert_eq!(bytes.len(), 12);
        assert_eq!(Values::from_le_bytes(PType::I32, &bytes).unwrap(), values);
        assert!(Values::from_le_bytes(PType::I32, &bytes[..5]).is_err());
    }
}
