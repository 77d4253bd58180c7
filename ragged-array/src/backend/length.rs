use std::fmt::{Display, Formatter};
use std::ops::{Add, Mul, Sub};

use ragged_error::{RaggedResult, ragged_err};

/// The length of a buffer or of a layout node.
///
/// The typetracer backend does not track data, so most lengths it produces are
/// [`Length::Unknown`]. An unknown length absorbs every arithmetic operation, equals itself
/// and differs from every known length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Length {
    /// A concrete number of elements.
    Known(usize),
    /// A placeholder produced by shape-only execution.
    Unknown,
}

impl Length {
    /// Zero elements.
    pub const ZERO: Length = Length::Known(0);

    /// The concrete length, if there is one.
    #[inline]
    pub fn known(self) -> Option<usize> {
        match self {
            Length::Known(n) => Some(n),
            Length::Unknown => None,
        }
    }

    /// Whether the length is concrete.
    #[inline]
    pub fn is_known(self) -> bool {
        matches!(self, Length::Known(_))
    }

    /// Whether the length is known to be zero.
    #[inline]
    pub fn is_zero(self) -> bool {
        self == Length::ZERO
    }

    /// The concrete length, or an assertion error naming `what`.
    pub fn require(self, what: &str) -> RaggedResult<usize> {
        self.known()
            .ok_or_else(|| ragged_err!(AssertionFailed: "{what} has an unknown length"))
    }

    /// The larger of two lengths.
    pub fn max(self, other: Length) -> Length {
        match (self, other) {
            (Length::Known(a), Length::Known(b)) => Length::Known(a.max(b)),
            _ => Length::Unknown,
        }
    }

    /// The smaller of two lengths.
    pub fn min(self, other: Length) -> Length {
        match (self, other) {
            (Length::Known(a), Length::Known(b)) => Length::Known(a.min(b)),
            _ => Length::Unknown,
        }
    }

    /// The length as a kernel scalar. Shape-only kernels never read it, so an unknown
    /// length passes as zero.
    #[inline]
    pub fn as_scalar(self) -> i64 {
        self.known().map_or(0, |n| n as i64)
    }

    /// Sum of many lengths.
    pub fn sum(lengths: impl IntoIterator<Item = Length>) -> Length {
        lengths.into_iter().fold(Length::ZERO, |acc, l| acc + l)
    }
}

impl From<usize> for Length {
    fn from(value: usize) -> Self {
        Length::Known(value)
    }
}

impl PartialEq<usize> for Length {
    fn eq(&self, other: &usize) -> bool {
        *self == Length::Known(*other)
    }
}

impl Add for Length {
    type Output = Length;

    fn add(self, rhs: Length) -> Length {
        match (self, rhs) {
            (Length::Known(a), Length::Known(b)) => Length::Known(a + b),
            _ => Length::Unknown,
        }
    }
}

impl Add<usize> for Length {
    type Output = Length;

    fn add(self, rhs: usize) -> Length {
        self + Length::Known(rhs)
    }
}

/// Saturates at zero.
impl Sub for Length {
    type Output = Length;

    fn sub(self, rhs: Length) -> Length {
        match (self, rhs) {
            (Length::Known(a), Length::Known(b)) => Length::Known(a.saturating_sub(b)),
            _ => Length::Unknown,
        }
    }
}

impl Sub<usize> for Length {
    type Output = Length;

    fn sub(self, rhs: usize) -> Length {
        self - Length::Known(rhs)
    }
}

impl Mul for Length {
    type Output = Length;

    fn mul(self, rhs: Length) -> Length {
        match (self, rhs) {
            (Length::Known(a), Length::Known(b)) => Length::Known(a * b),
            _ => Length::Unknown,
        }
    }
}

impl Mul<usize> for Length {
    type Output = Length;

    fn mul(self, rhs: usize) -> Length {
        self * Length::Known(rhs)
    }
}

impl Display for Length {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Length::Known(n) => write!(f, "{n}"),
            Length::Unknown => write!(f, "??"),
        }
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Length::Known(3) + 4, Length::Known(7))]
    #[case(Length::Unknown + 4, Length::Unknown)]
    #[case(Length::Known(3) - 4, Length::ZERO)]
    #[case(Length::Known(3) * Length::Unknown, Length::Unknown)]
    #[case(Length::Known(3).max(Length::Known(9)), Length::Known(9))]
    fn arithmetic(#[case] actual: Length, #[case] expected: Length) {
        assert_eq!(actual, expected);
    }

    #[test]
    fn unknown_equals_only_itself() {
        assert_eq!(Length::Unknown, Length::Unknown);
        assert_ne!(Length::Unknown, Length::Known(0));
        assert_ne!(Length::Unknown, 0);
        assert!(Length::Unknown.require("offsets").is_err());
    }
}
