#![deny(missing_docs)]

//! Error handling for ragged array layouts.
//!
//! Every fallible operation in the workspace returns a [`RaggedResult`]. Errors are grouped into
//! structural/index errors, merge incompatibilities, kernel-reported failures and internal
//! assertion failures, plus the usual argument and type errors raised at the API boundary.

mod ext;

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::fmt::{Debug, Display, Formatter};
use std::ops::Deref;
use std::{env, fmt};

pub use ext::*;

/// Alias so `thiserror` does not treat the field as a provided backtrace (nightly-only API).
type CapturedBacktrace = Backtrace;

/// A string that can be used as an error message.
#[derive(Debug)]
pub struct ErrString(Cow<'static, str>);

#[allow(clippy::fallible_impl_from)]
impl<T> From<T> for ErrString
where
    T: Into<Cow<'static, str>>,
{
    #[allow(clippy::panic)]
    fn from(msg: T) -> Self {
        if env::var("RAGGED_PANIC_ON_ERR").as_deref().unwrap_or("") == "1" {
            panic!("{}\nBacktrace:\n{}", msg.into(), Backtrace::capture());
        } else {
            Self(msg.into())
        }
    }
}

impl AsRef<str> for ErrString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for ErrString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for ErrString {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// The error type of every ragged operation.
#[derive(thiserror::Error)]
#[non_exhaustive]
pub enum RaggedError {
    /// An out-of-range position, a length mismatch or a malformed index, raised by the node
    /// named in `node`.
    #[error("in {node}: {msg}{}\nBacktrace:\n{backtrace}", fmt_position(*.position))]
    Index {
        /// The layout node that detected the problem.
        node: &'static str,
        /// The offending position, when there is one.
        position: Option<i64>,
        /// Human readable description.
        msg: ErrString,
        /// Where the error was raised.
        backtrace: CapturedBacktrace,
    },
    /// Two layouts cannot be concatenated into one.
    #[error("cannot merge {0}\nBacktrace:\n{1}")]
    MergeIncompatible(ErrString, CapturedBacktrace),
    /// A kernel reported a failure through its error struct.
    #[error(
        "kernel {kernel} failed: {message}{}{} (in {})\nBacktrace:\n{backtrace}",
        fmt_id(*.id),
        fmt_filename(.filename.as_deref()),
        .path.join(" <- ")
    )]
    Kernel {
        /// Name of the kernel that was invoked.
        kernel: &'static str,
        /// The kernel's own message.
        message: ErrString,
        /// Position the kernel was processing, if it reported one.
        id: Option<i64>,
        /// Source location reported by the kernel.
        filename: Option<&'static str>,
        /// Layout nodes the error travelled through, innermost first.
        path: Vec<&'static str>,
        /// Where the error was raised.
        backtrace: CapturedBacktrace,
    },
    /// An internal consistency check failed. These indicate defects, not bad input.
    #[error("assertion failed: {0}\nBacktrace:\n{1}")]
    AssertionFailed(ErrString, CapturedBacktrace),
    /// An argument was invalid.
    #[error("{0}\nBacktrace:\n{1}")]
    InvalidArgument(ErrString, CapturedBacktrace),
    /// The operation is not defined for the types involved.
    #[error("type error: {0}\nBacktrace:\n{1}")]
    TypeError(ErrString, CapturedBacktrace),
    /// An axis did not fit the depth of the layout.
    #[error("axis error: {0}\nBacktrace:\n{1}")]
    AxisError(ErrString, CapturedBacktrace),
    /// The requested combination has no implementation.
    #[error("not implemented: {0}\nBacktrace:\n{1}")]
    NotImplemented(ErrString, CapturedBacktrace),
    /// A Form or buffer set could not be (de)serialized.
    #[error("serde error: {0}\nBacktrace:\n{1}")]
    Serde(ErrString, CapturedBacktrace),
    /// A wrapper adding context to another error.
    #[error("{0}: {1}")]
    Context(ErrString, Box<RaggedError>),
}

fn fmt_position(position: Option<i64>) -> String {
    position.map(|p| format!(" (at position {p})")).unwrap_or_default()
}

fn fmt_id(id: Option<i64>) -> String {
    id.map(|i| format!(" at item {i}")).unwrap_or_default()
}

fn fmt_filename(filename: Option<&str>) -> String {
    filename.map(|f| format!(" [{f}]")).unwrap_or_default()
}

impl RaggedError {
    /// Adds additional context to an error.
    pub fn with_context<T: Into<ErrString>>(self, msg: T) -> Self {
        RaggedError::Context(msg.into(), Box::new(self))
    }

    /// Records that a kernel error passed through the layout node `node`.
    pub fn with_node(self, node: &'static str) -> Self {
        match self {
            RaggedError::Kernel {
                kernel,
                message,
                id,
                filename,
                mut path,
                backtrace,
            } => {
                path.push(node);
                RaggedError::Kernel {
                    kernel,
                    message,
                    id,
                    filename,
                    path,
                    backtrace,
                }
            }
            RaggedError::Context(msg, inner) => {
                RaggedError::Context(msg, Box::new(inner.with_node(node)))
            }
            other => other,
        }
    }

    /// The innermost error, looking through any [`RaggedError::Context`] layers.
    pub fn root(&self) -> &RaggedError {
        match self {
            RaggedError::Context(_, inner) => inner.root(),
            other => other,
        }
    }

    /// The message of the root cause, without kind prefix or backtrace.
    pub fn message(&self) -> String {
        match self.root() {
            RaggedError::Index { msg, position, .. } => format!("{msg}{}", fmt_position(*position)),
            RaggedError::Kernel {
                kernel,
                message,
                id,
                ..
            } => format!("{kernel}: {message}{}", fmt_id(*id)),
            RaggedError::MergeIncompatible(msg, _)
            | RaggedError::AssertionFailed(msg, _)
            | RaggedError::InvalidArgument(msg, _)
            | RaggedError::TypeError(msg, _)
            | RaggedError::AxisError(msg, _)
            | RaggedError::NotImplemented(msg, _)
            | RaggedError::Serde(msg, _) => msg.to_string(),
            RaggedError::Context(msg, _) => msg.to_string(),
        }
    }

    /// Whether the root cause is an index or structural error.
    pub fn is_index_error(&self) -> bool {
        matches!(self.root(), RaggedError::Index { .. })
    }

    /// Whether the root cause is a type error.
    pub fn is_type_error(&self) -> bool {
        matches!(self.root(), RaggedError::TypeError(..))
    }

    /// Whether the root cause is an axis error.
    pub fn is_axis_error(&self) -> bool {
        matches!(self.root(), RaggedError::AxisError(..))
    }

    /// Whether the root cause is an operation that has no implementation for its input.
    pub fn is_not_implemented(&self) -> bool {
        matches!(self.root(), RaggedError::NotImplemented(..))
    }

    /// Whether the root cause was reported by a kernel.
    pub fn is_kernel_error(&self) -> bool {
        matches!(self.root(), RaggedError::Kernel { .. })
    }
}

impl Debug for RaggedError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

/// A type alias for Results that return RaggedErrors as their error type.
pub type RaggedResult<T> = Result<T, RaggedError>;

/// A trait for unwrapping a RaggedResult.
pub trait RaggedUnwrap {
    /// The type of the value being unwrapped.
    type Output;

    /// Returns the value of the result if it is Ok, otherwise panics with the error.
    /// Should be called only in contexts where the error condition represents a bug (programmer error).
    fn ragged_unwrap(self) -> Self::Output;
}

impl<T, E> RaggedUnwrap for Result<T, E>
where
    E: Into<RaggedError>,
{
    type Output = T;

    #[inline(always)]
    fn ragged_unwrap(self) -> Self::Output {
        self.map_err(|err| err.into())
            .unwrap_or_else(|err| ragged_panic!(err))
    }
}

/// A trait for expect-ing a RaggedResult or an Option.
pub trait RaggedExpect {
    /// The type of the value being expected.
    type Output;

    /// Returns the value of the result if it is Ok, otherwise panics with the error.
    /// Should be called only in contexts where the error condition represents a bug (programmer error).
    fn ragged_expect(self, msg: &str) -> Self::Output;
}

impl<T, E> RaggedExpect for Result<T, E>
where
    E: Into<RaggedError>,
{
    type Output = T;

    #[inline(always)]
    fn ragged_expect(self, msg: &str) -> Self::Output {
        self.map_err(|err| err.into())
            .unwrap_or_else(|e| ragged_panic!(e.with_context(msg.to_string())))
    }
}

impl<T> RaggedExpect for Option<T> {
    type Output = T;

    #[inline(always)]
    fn ragged_expect(self, msg: &str) -> Self::Output {
        self.unwrap_or_else(|| {
            let err = RaggedError::AssertionFailed(msg.to_string().into(), Backtrace::capture());
            ragged_panic!(err)
        })
    }
}

/// A convenient macro for creating a RaggedError.
#[macro_export]
macro_rules! ragged_err {
    (Index: $node:expr, $pos:expr, $fmt:literal $(, $arg:expr)* $(,)?) => {{
        use std::backtrace::Backtrace;
        $crate::__private::must_use(
            $crate::RaggedError::Index {
                node: $node,
                position: $pos,
                msg: format!($fmt, $($arg),*).into(),
                backtrace: Backtrace::capture(),
            }
        )
    }};
    (Context: $msg:literal, $err:expr) => {{
        $crate::__private::must_use(
            $crate::RaggedError::Context($msg.into(), Box::new($err))
        )
    }};
    ($variant:ident: $fmt:literal $(, $arg:expr)* $(,)?) => {{
        use std::backtrace::Backtrace;
        $crate::__private::must_use(
            $crate::RaggedError::$variant(format!($fmt, $($arg),*).into(), Backtrace::capture())
        )
    }};
    ($variant:ident: $err:expr $(,)?) => {
        $crate::__private::must_use(
            $crate::RaggedError::$variant($err)
        )
    };
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::ragged_err!(InvalidArgument: $fmt, $($arg),*)
    };
}

/// A convenient macro for returning a RaggedError.
#[macro_export]
macro_rules! ragged_bail {
    ($($tt:tt)+) => {
        return Err($crate::ragged_err!($($tt)+))
    };
}

/// A convenient macro for panicking with a RaggedError in the presence of a programmer error
/// (e.g., an invariant has been violated).
#[macro_export]
macro_rules! ragged_panic {
    (Context: $msg:literal, $err:expr) => {{
        $crate::ragged_panic!($crate::ragged_err!(Context: $msg, $err))
    }};
    ($variant:ident: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::ragged_panic!($crate::ragged_err!($variant: $fmt, $($arg),*))
    };
    ($err:expr, $fmt:literal $(, $arg:expr)* $(,)?) => {{
        let err: $crate::RaggedError = $err;
        panic!("{}", err.with_context(format!($fmt, $($arg),*)))
    }};
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::ragged_panic!($crate::ragged_err!($fmt, $($arg),*))
    };
    ($err:expr) => {{
        let err: $crate::RaggedError = $err;
        panic!("{}", err)
    }};
}

#[cfg(feature = "serde")]
impl From<serde_json::Error> for RaggedError {
    fn from(value: serde_json::Error) -> Self {
        RaggedError::Serde(value.to_string().into(), Backtrace::capture())
    }
}

// Not public, referenced by macros only.
#[doc(hidden)]
pub mod __private {
    #[doc(hidden)]
    #[inline]
    #[cold]
    #[must_use]
    pub const fn must_use(error: crate::RaggedError) -> crate::RaggedError {
        error
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn kernel_error() -> RaggedError {
        RaggedError::Kernel {
            kernel: "IndexedArray_getitem_nextcarry",
            message: "index out of range".into(),
            id: Some(3),
            filename: None,
            path: vec![],
            backtrace: Backtrace::capture(),
        }
    }

    #[test]
    fn kernel_errors_collect_node_path() {
        let err: RaggedResult<()> = Err(kernel_error());
        let err = err
            .in_node("IndexedArray")
            .in_node("ListOffsetArray")
            .unwrap_err();
        match err {
            RaggedError::Kernel { path, id, .. } => {
                assert_eq!(path, vec!["IndexedArray", "ListOffsetArray"]);
                assert_eq!(id, Some(3));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn root_sees_through_context() {
        let err = ragged_err!(Index: "NumpyArray", Some(7), "index out of range")
            .with_context("while slicing");
        assert!(err.is_index_error());
        assert!(!err.is_type_error());
        assert!(err.to_string().contains("at position 7"));
    }

    #[test]
    fn not_implemented_is_its_own_kind() {
        let err = ragged_err!(NotImplemented: "unique along axis=0").with_context("while deduplicating");
        assert!(err.is_not_implemented());
        assert!(!err.is_axis_error());
    }

    #[test]
    fn non_kernel_errors_ignore_nodes() {
        let err = ragged_err!(TypeError: "cannot sort {}", "unions").with_node("UnionArray");
        assert!(err.is_type_error());
        assert!(err.to_string().starts_with("type error: cannot sort unions"));
    }

    #[test]
    fn flatten_nested() {
        let nested: RaggedResult<RaggedResult<i32>> = Ok(Err(ragged_err!("inner")));
        assert!(nested.flatten().is_err());
        let nested: RaggedResult<RaggedResult<i32>> = Ok(Ok(5));
        assert_eq!(nested.flatten().unwrap(), 5);
    }
}
