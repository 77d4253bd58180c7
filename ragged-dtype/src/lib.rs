#![cfg(target_endian = "little")]
#![deny(missing_docs)]

//! The type system of ragged array layouts.
//!
//! This crate holds the primitive element types stored in leaf buffers, the integer types
//! allowed in index buffers, the free-form parameters attached to every layout node, and
//! [`Form`], the data-free schema of a layout tree.

pub use form::*;
pub use parameters::*;
pub use ptype::*;

mod form;
mod parameters;
mod ptype;
#[cfg(feature = "serde")]
mod serde;
