//! Ragged array layouts.
//!
//! A ragged array is a tree of [`Content`] nodes over flat buffers: leaves of primitive
//! values, with list, option, indexed, record and union layers above them. This crate holds
//! the layout tree and the algorithms over it:
//!
//! * [`slicing`]: integer, range, field, array, jagged and missing-value selection,
//! * [`merge`]: concatenating layouts of compatible or incompatible types,
//! * [`sorting`]: sort, argsort and unique along any axis,
//! * [`reducers`]: sums, products, extrema and counts along any axis,
//! * [`structure`]: counting, flattening, padding and filling missing values,
//! * [`apply`]: generic tree rewriting,
//! * [`buffers`]: decomposing a layout into a form and named buffers, and back,
//! * [`tree`]: a human-readable rendering of a layout.
//!
//! All of these run on the [`Cpu`] backend over real buffers, or on the [`TypeTracer`]
//! backend over shape-only placeholders to predict the form of a result.

pub use backend::*;
pub use content::*;
pub use element::*;
pub use index::*;

pub mod aliases;
pub mod apply;
mod backend;
pub mod buffers;
mod content;
mod data;
mod element;
mod index;
pub mod kernels;
pub mod merge;
pub mod reducers;
pub mod slicing;
pub mod sorting;
pub mod structure;
pub mod tree;

pub use data::{Data, DataMut, Primitive, Values};
