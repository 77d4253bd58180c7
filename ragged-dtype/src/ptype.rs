use std::cmp::Ordering;
use std::fmt::{Debug, Display, Formatter};
use std::hash::Hash;

use num_traits::AsPrimitive;
use ragged_error::{RaggedError, RaggedResult, ragged_bail, ragged_err};
use serde_json::Value;

/// Physical type of the elements of a leaf buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PType {
    /// A boolean stored one per byte
    Bool,
    /// An 8-bit signed integer
    I8,
    /// An 8-bit unsigned integer
    U8,
    /// A 16-bit signed integer
    I16,
    /// A 16-bit unsigned integer
    U16,
    /// A 32-bit signed integer
    I32,
    /// A 32-bit unsigned integer
    U32,
    /// A 64-bit signed integer
    I64,
    /// A 64-bit unsigned integer
    U64,
    /// A 32-bit float
    F32,
    /// A 64-bit float
    F64,
}

impl PType {
    /// Every primitive type, in promotion order.
    pub const ALL: [PType; 11] = [
        PType::Bool,
        PType::I8,
        PType::U8,
        PType::I16,
        PType::U16,
        PType::I32,
        PType::U32,
        PType::I64,
        PType::U64,
        PType::F32,
        PType::F64,
    ];

    /// Returns `true` for boolean.
    pub const fn is_bool(self) -> bool {
        matches!(self, PType::Bool)
    }

    /// Returns `true` for any integer type.
    pub const fn is_int(self) -> bool {
        self.is_signed_int() || self.is_unsigned_int()
    }

    /// Returns `true` for signed integers.
    pub const fn is_signed_int(self) -> bool {
        matches!(self, PType::I8 | PType::I16 | PType::I32 | PType::I64)
    }

    /// Returns `true` for unsigned integers.
    pub const fn is_unsigned_int(self) -> bool {
        matches!(self, PType::U8 | PType::U16 | PType::U32 | PType::U64)
    }

    /// Returns `true` for floats.
    pub const fn is_float(self) -> bool {
        matches!(self, PType::F32 | PType::F64)
    }

    /// Width of one element in bytes.
    pub const fn byte_width(self) -> usize {
        match self {
            PType::Bool | PType::I8 | PType::U8 => 1,
            PType::I16 | PType::U16 => 2,
            PType::I32 | PType::U32 | PType::F32 => 4,
            PType::I64 | PType::U64 | PType::F64 => 8,
        }
    }

    /// The name used in textual forms, following numpy's dtype names.
    pub const fn name(self) -> &'static str {
        match self {
            PType::Bool => "bool",
            PType::I8 => "int8",
            PType::U8 => "uint8",
            PType::I16 => "int16",
            PType::U16 => "uint16",
            PType::I32 => "int32",
            PType::U32 => "uint32",
            PType::I64 => "int64",
            PType::U64 => "uint64",
            PType::F32 => "float32",
            PType::F64 => "float64",
        }
    }

    /// Parse a name produced by [`PType::name`].
    pub fn from_name(name: &str) -> RaggedResult<Self> {
        PType::ALL
            .into_iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| ragged_err!(Serde: "unknown primitive type {}", name))
    }

    /// The type two leaves of these types concatenate to.
    ///
    /// Booleans promote like `uint8`. Whether booleans may merge with numbers at all is decided
    /// by the caller.
    pub fn promote(self, other: PType) -> PType {
        use PType::*;
        if self == other {
            return self;
        }
        if self.is_float() || other.is_float() {
            return if self == F32 && (other == F32 || other.byte_width() <= 2) {
                F32
            } else if other == F32 && self.byte_width() <= 2 {
                F32
            } else {
                F64
            };
        }
        let (a, b) = (self.as_integer(), other.as_integer());
        match (a.is_signed_int(), b.is_signed_int()) {
            (true, true) | (false, false) => {
                if a.byte_width() >= b.byte_width() {
                    a
                } else {
                    b
                }
            }
            (signed, _) => {
                let (s, u) = if signed { (a, b) } else { (b, a) };
                if s.byte_width() > u.byte_width() {
                    s
                } else {
                    match u.byte_width() {
                        1 => I16,
                        2 => I32,
                        4 => I64,
                        _ => F64,
                    }
                }
            }
        }
    }

    fn as_integer(self) -> PType {
        if self.is_bool() { PType::U8 } else { self }
    }
}

impl Display for PType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The integer types allowed in index buffers: offsets, starts, stops, carries, tags and masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndexType {
    /// Signed 8-bit, used for tags and byte masks
    I8,
    /// Unsigned 8-bit, used for bit masks
    U8,
    /// Signed 32-bit
    I32,
    /// Unsigned 32-bit
    U32,
    /// Signed 64-bit
    I64,
}

impl IndexType {
    /// The primitive type holding this index type.
    pub const fn ptype(self) -> PType {
        match self {
            IndexType::I8 => PType::I8,
            IndexType::U8 => PType::U8,
            IndexType::I32 => PType::I32,
            IndexType::U32 => PType::U32,
            IndexType::I64 => PType::I64,
        }
    }

    /// Short name used in textual forms.
    pub const fn name(self) -> &'static str {
        match self {
            IndexType::I8 => "i8",
            IndexType::U8 => "u8",
            IndexType::I32 => "i32",
            IndexType::U32 => "u32",
            IndexType::I64 => "i64",
        }
    }

    /// Parse a name produced by [`IndexType::name`].
    pub fn from_name(name: &str) -> RaggedResult<Self> {
        Ok(match name {
            "i8" => IndexType::I8,
            "u8" => IndexType::U8,
            "i32" => IndexType::I32,
            "u32" => IndexType::U32,
            "i64" => IndexType::I64,
            _ => ragged_bail!(Serde: "unknown index type {}", name),
        })
    }
}

impl TryFrom<PType> for IndexType {
    type Error = RaggedError;

    fn try_from(value: PType) -> RaggedResult<Self> {
        Ok(match value {
            PType::I8 => IndexType::I8,
            PType::U8 => IndexType::U8,
            PType::I32 => IndexType::I32,
            PType::U32 => IndexType::U32,
            PType::I64 => IndexType::I64,
            _ => ragged_bail!(TypeError: "{} is not an index type", value),
        })
    }
}

impl Display for IndexType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A primitive type that can be stored in a leaf buffer.
pub trait NativePType:
    Send + Sync + Clone + Copy + Debug + Default + PartialEq + PartialOrd + 'static
{
    /// The PType that corresponds to this native type
    const PTYPE: PType;
    /// Identity of `max`: the smallest representable value.
    const LOWEST: Self;
    /// Identity of `min`: the largest representable value.
    const HIGHEST: Self;
    /// Identity of `sum`.
    const ZERO: Self;
    /// Identity of `prod`.
    const ONE: Self;

    /// A total order, with NaNs after every other value.
    fn total_compare(self, other: Self) -> Ordering;

    /// Whether the value is a float NaN.
    fn is_nan(self) -> bool;

    /// Whether the value counts as "true" in `count_nonzero`/`any`/`all`.
    fn is_nonzero(self) -> bool;

    /// Addition that wraps on integer overflow (logical or for booleans).
    fn add_wrapping(self, other: Self) -> Self;

    /// Multiplication that wraps on integer overflow (logical and for booleans).
    fn mul_wrapping(self, other: Self) -> Self;

    /// Lossy conversion to `i64`.
    fn to_i64(self) -> i64;

    /// Lossy conversion to `f64`.
    fn to_f64(self) -> f64;

    /// Lossy conversion from `i64`.
    fn from_i64(value: i64) -> Self;

    /// Lossy conversion from `f64`.
    fn from_f64(value: f64) -> Self;

    /// Render the value as JSON. NaN and infinities become `null`.
    fn to_json(self) -> Value;

    /// Append the little-endian bytes of the value.
    fn write_le(self, out: &mut Vec<u8>);

    /// Read a value from exactly `Self::PTYPE.byte_width()` little-endian bytes.
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! native_ptype {
    ($T:ty, $ptype:tt, $lowest:expr, $highest:expr) => {
        impl NativePType for $T {
            const PTYPE: PType = PType::$ptype;
            const LOWEST: Self = $lowest;
            const HIGHEST: Self = $highest;
            const ZERO: Self = 0 as $T;
            const ONE: Self = 1 as $T;

            fn total_compare(self, other: Self) -> Ordering {
                self.cmp(&other)
            }

            fn is_nan(self) -> bool {
                false
            }

            fn is_nonzero(self) -> bool {
                self != 0
            }

            fn add_wrapping(self, other: Self) -> Self {
                self.wrapping_add(other)
            }

            fn mul_wrapping(self, other: Self) -> Self {
                self.wrapping_mul(other)
            }

            fn to_i64(self) -> i64 {
                AsPrimitive::<i64>::as_(self)
            }

            fn to_f64(self) -> f64 {
                AsPrimitive::<f64>::as_(self)
            }

            fn from_i64(value: i64) -> Self {
                AsPrimitive::<$T>::as_(value)
            }

            fn from_f64(value: f64) -> Self {
                AsPrimitive::<$T>::as_(value)
            }

            fn to_json(self) -> Value {
                Value::from(self)
            }

            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn read_le(bytes: &[u8]) -> Self {
                let mut raw = [0u8; size_of::<$T>()];
                raw.copy_from_slice(&bytes[..size_of::<$T>()]);
                <$T>::from_le_bytes(raw)
            }
        }
    };
}

macro_rules! native_float_ptype {
    ($T:ty, $ptype:tt) => {
        impl NativePType for $T {
            const PTYPE: PType = PType::$ptype;
            const LOWEST: Self = <$T>::NEG_INFINITY;
            const HIGHEST: Self = <$T>::INFINITY;
            const ZERO: Self = 0.0;
            const ONE: Self = 1.0;

            fn total_compare(self, other: Self) -> Ordering {
                match (self.is_nan(), other.is_nan()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    (false, false) => self.partial_cmp(&other).unwrap_or(Ordering::Equal),
                }
            }

            fn is_nan(self) -> bool {
                <$T>::is_nan(self)
            }

            fn is_nonzero(self) -> bool {
                self != 0.0
            }

            fn add_wrapping(self, other: Self) -> Self {
                self + other
            }

            fn mul_wrapping(self, other: Self) -> Self {
                self * other
            }

            fn to_i64(self) -> i64 {
                AsPrimitive::<i64>::as_(self)
            }

            fn to_f64(self) -> f64 {
                AsPrimitive::<f64>::as_(self)
            }

            fn from_i64(value: i64) -> Self {
                AsPrimitive::<$T>::as_(value)
            }

            fn from_f64(value: f64) -> Self {
                AsPrimitive::<$T>::as_(value)
            }

            fn to_json(self) -> Value {
                serde_json::Number::from_f64(AsPrimitive::<f64>::as_(self))
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }

            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn read_le(bytes: &[u8]) -> Self {
                let mut raw = [0u8; size_of::<$T>()];
                raw.copy_from_slice(&bytes[..size_of::<$T>()]);
                <$T>::from_le_bytes(raw)
            }
        }
    };
}

native_ptype!(i8, I8, i8::MIN, i8::MAX);
native_ptype!(u8, U8, u8::MIN, u8::MAX);
native_ptype!(i16, I16, i16::MIN, i16::MAX);
native_ptype!(u16, U16, u16::MIN, u16::MAX);
native_ptype!(i32, I32, i32::MIN, i32::MAX);
native_ptype!(u32, U32, u32::MIN, u32::MAX);
native_ptype!(i64, I64, i64::MIN, i64::MAX);
native_ptype!(u64, U64, u64::MIN, u64::MAX);
native_float_ptype!(f32, F32);
native_float_ptype!(f64, F64);

impl NativePType for bool {
    const PTYPE: PType = PType::Bool;
    const LOWEST: Self = false;
    const HIGHEST: Self = true;
    const ZERO: Self = false;
    const ONE: Self = true;

    fn total_compare(self, other: Self) -> Ordering {
        self.cmp(&other)
    }

    fn is_nan(self) -> bool {
        false
    }

    fn is_nonzero(self) -> bool {
        self
    }

    fn add_wrapping(self, other: Self) -> Self {
        self | other
    }

    fn mul_wrapping(self, other: Self) -> Self {
        self & other
    }

    fn to_i64(self) -> i64 {
        i64::from(self)
    }

    fn to_f64(self) -> f64 {
        if self { 1.0 } else { 0.0 }
    }

    fn from_i64(value: i64) -> Self {
        value != 0
    }

    fn from_f64(value: f64) -> Self {
        value != 0.0
    }

    fn to_json(self) -> Value {
        Value::Bool(self)
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.push(u8::from(self));
    }

    fn read_le(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

/// Integer native types that may back an index buffer.
pub trait IndexNative: NativePType + Eq + Ord + Hash {
    /// The index type that corresponds to this native type
    const INDEX_TYPE: IndexType;
}

impl IndexNative for i8 {
    const INDEX_TYPE: IndexType = IndexType::I8;
}
impl IndexNative for u8 {
    const INDEX_TYPE: IndexType = IndexType::U8;
}
impl IndexNative for i32 {
    const INDEX_TYPE: IndexType = IndexType::I32;
}
impl IndexNative for u32 {
    const INDEX_TYPE: IndexType = IndexType::U32;
}
impl IndexNative for i64 {
    const INDEX_TYPE: IndexType = IndexType::I64;
}

/// Expand the body once per primitive type, binding the native type to the given name.
#[macro_export]
macro_rules! match_each_native_ptype {
    ($self:expr, | $_:tt $enc:ident | $($body:tt)*) => ({
        macro_rules! __with__ {( $_ $enc:ident ) => ( $($body)* )}
        use $crate::PType;
        match $self {
            PType::Bool => __with__! { bool },
            PType::I8 => __with__! { i8 },
            PType::U8 => __with__! { u8 },
            PType::I16 => __with__! { i16 },
            PType::U16 => __with__! { u16 },
            PType::I32 => __with__! { i32 },
            PType::U32 => __with__! { u32 },
            PType::I64 => __with__! { i64 },
            PType::U64 => __with__! { u64 },
            PType::F32 => __with__! { f32 },
            PType::F64 => __with__! { f64 },
        }
    })
}

/// Expand the body once per index type, binding the native type to the given name.
#[macro_export]
macro_rules! match_each_index_type {
    ($self:expr, | $_:tt $enc:ident | $($body:tt)*) => ({
        macro_rules! __with__ {( $_ $enc:ident ) => ( $($body)* )}
        use $crate::IndexType;
        match $self {
            IndexType::I8 => __with__! { i8 },
            IndexType::U8 => __with__! { u8 },
            IndexType::I32 => __with__! { i32 },
            IndexType::U32 => __with__! { u32 },
            IndexType::I64 => __with__! { i64 },
        }
    })
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(PType::I8, PType::I64, PType::I64)]
    #[case(PType::U8, PType::I8, PType::I16)]
    #[case(PType::U32, PType::I32, PType::I64)]
    #[case(PType::U64, PType::I64, PType::F64)]
    #[case(PType::I64, PType::F32, PType::F64)]
    #[case(PType::I16, PType::F32, PType::F32)]
    #[case(PType::Bool, PType::I32, PType::I32)]
    #[case(PType::F32, PType::F64, PType::F64)]
    fn promotion(#[case] a: PType, #[case] b: PType, #[case] expected: PType) {
        assert_eq!(a.promote(b), expected);
        assert_eq!(b.promote(a), expected);
    }

    #[test]
    fn names_round_trip() {
        for ptype in PType::ALL {
            assert_eq!(PType::from_name(ptype.name()).unwrap(), ptype);
        }
        assert!(PType::from_name("complex128").is_err());
    }

    #[test]
    fn nan_sorts_last() {
        assert_eq!(f64::NAN.total_compare(f64::INFINITY), Ordering::Greater);
        assert_eq!(1.0f32.total_compare(f32::NAN), Ordering::Less);
    }

    #[test]
    fn little_endian_bytes() {
        let mut out = Vec::new();
        (-2i32).write_le(&mut out);
        1.5f64.write_le(&mut out);
        true.write_le(&mut out);
        assert_eq!(i32::read_le(&out[0..4]), -2);
        assert_eq!(f64::read_le(&out[4..12]), 1.5);
        assert!(bool::read_le(&out[12..]));
    }

    #[test]
    fn index_types() {
        assert_eq!(IndexType::try_from(PType::I32).unwrap(), IndexType::I32);
        assert!(IndexType::try_from(PType::F32).is_err());
        let width = match_each_index_type!(IndexType::U32, |$I| { size_of::<$I>() });
        assert_eq!(width, 4);
    }
}
