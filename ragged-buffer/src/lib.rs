#![deny(missing_docs)]

//! Typed buffers for ragged array layouts.
//!
//! Layout nodes never mutate the buffers they hold. A [`Buffer`] is an immutable, cheaply
//! cloneable window over shared storage; slicing it is zero-copy. Kernels write their outputs
//! into a [`BufferMut`] which is frozen once the kernel returns.

pub use buffer::*;
pub use buffer_mut::*;
pub use bytes_buffer::*;

mod buffer;
mod buffer_mut;
mod bytes_buffer;
mod macros;
