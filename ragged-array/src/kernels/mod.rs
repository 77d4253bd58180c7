//! The kernel registry.
//!
//! A kernel is a plain function over pre-allocated output buffers, input buffers and integer
//! scalars. Kernels are registered with [`inventory`] under a name and the dtypes of their
//! outputs then inputs; the backends look them up by that key. Layout code never calls a
//! kernel function directly, only through [`BackendRef::call`](crate::BackendRef::call).

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::sync::LazyLock;

use ragged_dtype::{IndexNative, PType};
use ragged_error::RaggedError;

use crate::aliases::HashMap;
use crate::data::{Data, DataMut, Primitive};

/// Register a kernel under a name and the dtypes of its outputs then inputs.
macro_rules! register_kernel {
    ($name:literal, $func:expr, [$($P:ty),* $(,)?]) => {
        const _: () = {
            const PTYPES: &[::ragged_dtype::PType] =
                &[$(<$P as ::ragged_dtype::NativePType>::PTYPE),*];
            $crate::aliases::inventory::submit! {
                $crate::kernels::KernelRegistration::new($name, PTYPES, $func)
            }
        };
    };
}

/// Register one instantiation of a generic kernel per listed type. Inside the function and
/// dtype list, `T` names the type being instantiated.
macro_rules! register_kernel_each {
    (@one $name:literal, $func:expr, $T:ty, [$($P:ty),* $(,)?]) => {
        const _: () = {
            #[allow(dead_code)]
            type T = $T;
            const PTYPES: &[::ragged_dtype::PType] =
                &[$(<$P as ::ragged_dtype::NativePType>::PTYPE),*];
            $crate::aliases::inventory::submit! {
                $crate::kernels::KernelRegistration::new($name, PTYPES, $func)
            }
        };
    };
    ($name:literal, $func:expr, [$($T:ty),+ $(,)?], $ptypes:tt) => {
        $(register_kernel_each!(@one $name, $func, $T, $ptypes);)+
    };
}

macro_rules! kernel_err {
    (@ $id:expr, $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::kernels::KernelError::new(
            format!($fmt $(, $arg)*),
            Some(i64::try_from($id).unwrap_or(i64::MAX)),
            Some(file!()),
        )
    };
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::kernels::KernelError::new(format!($fmt $(, $arg)*), None, Some(file!()))
    };
}

/// A position that falls outside the buffer it addresses. These surface as index errors
/// naming the node that owns the kernel.
macro_rules! out_of_range {
    ($id:expr) => {
        out_of_range!($id, "index out of range")
    };
    ($id:expr, $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::kernels::KernelError {
            out_of_range: true,
            ..kernel_err!(@ $id, $fmt $(, $arg)*)
        }
    };
}

mod index;
mod indexed;
mod list;
mod masked;
mod merge;
mod missing;
mod reducers;
mod regular;
mod sorting;
mod union;

/// Signature shared by every kernel.
pub type KernelFn = fn(&mut [DataMut], &[&Data], &[i64]) -> KernelResult;

pub type KernelResult = Result<(), KernelError>;

/// The error struct a kernel fills in: a message, optionally the item being processed and
/// the source file that raised it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelError {
    pub str: Cow<'static, str>,
    pub id: Option<i64>,
    pub filename: Option<&'static str>,
    /// Set when item `id` addressed a position outside its buffer.
    pub out_of_range: bool,
}

impl KernelError {
    pub fn new(
        str: impl Into<Cow<'static, str>>,
        id: Option<i64>,
        filename: Option<&'static str>,
    ) -> Self {
        Self {
            str: str.into(),
            id,
            filename,
            out_of_range: false,
        }
    }

    /// Attach the kernel name and turn into a workspace error. Out-of-range positions become
    /// index errors of the node the kernel is named after.
    pub fn into_ragged(self, kernel: &'static str) -> RaggedError {
        if self.out_of_range {
            return RaggedError::Index {
                node: kernel_node(kernel),
                position: self.id,
                msg: format!("{} ({kernel})", self.str).into(),
                backtrace: Backtrace::capture(),
            };
        }
        RaggedError::Kernel {
            kernel,
            message: self.str.into(),
            id: self.id,
            filename: self.filename,
            path: Vec::new(),
            backtrace: Backtrace::capture(),
        }
    }
}

/// Kernels are named `{Node}_{operation}`.
fn kernel_node(kernel: &'static str) -> &'static str {
    kernel.split_once('_').map_or(kernel, |(node, _)| node)
}

/// One registered kernel instantiation.
#[derive(Debug)]
pub struct KernelRegistration {
    pub name: &'static str,
    pub ptypes: &'static [PType],
    pub func: KernelFn,
}

impl KernelRegistration {
    pub const fn new(name: &'static str, ptypes: &'static [PType], func: KernelFn) -> Self {
        Self {
            name,
            ptypes,
            func,
        }
    }
}

inventory::collect!(KernelRegistration);

static KERNELS: LazyLock<HashMap<&'static str, Vec<&'static KernelRegistration>>> =
    LazyLock::new(|| {
        let mut registry: HashMap<&'static str, Vec<&'static KernelRegistration>> =
            HashMap::default();
        for kernel in inventory::iter::<KernelRegistration> {
            registry.entry(kernel.name).or_default().push(kernel);
        }
        registry
    });

/// Find the instantiation of `name` for exactly these dtypes.
pub fn lookup_kernel(name: &str, ptypes: &[PType]) -> Option<KernelFn> {
    KERNELS
        .get(name)?
        .iter()
        .find(|k| k.ptypes == ptypes)
        .map(|k| k.func)
}

/// Every registered instantiation of `name`.
pub fn kernel_signatures(name: &str) -> Vec<&'static [PType]> {
    KERNELS
        .get(name)
        .map(|ks| ks.iter().map(|k| k.ptypes).collect())
        .unwrap_or_default()
}

/// An integer type that may back an index buffer and be read by kernels.
pub(crate) trait IndexPrimitive: IndexNative + Primitive {}

impl<T: IndexNative + Primitive> IndexPrimitive for T {}

pub(crate) fn outputs<const N: usize>(
    outputs: &mut [DataMut],
) -> Result<&mut [DataMut; N], KernelError> {
    let len = outputs.len();
    <&mut [DataMut; N]>::try_from(outputs)
        .map_err(|_| kernel_err!("expected {} output buffers, got {}", N, len))
}

pub(crate) fn output<T: Primitive>(out: &mut DataMut) -> Result<&mut [T], KernelError> {
    out.as_mut_slice::<T>()
        .ok_or_else(|| kernel_err!("output buffer is not a concrete {} buffer", T::PTYPE))
}

pub(crate) fn input<'a, T: Primitive>(
    inputs: &[&'a Data],
    i: usize,
) -> Result<&'a [T], KernelError> {
    inputs
        .get(i)
        .and_then(|data| data.as_slice::<T>())
        .ok_or_else(|| kernel_err!("input {} is not a concrete {} buffer", i, T::PTYPE))
}

pub(crate) fn scalar(scalars: &[i64], i: usize) -> Result<i64, KernelError> {
    scalars
        .get(i)
        .copied()
        .ok_or_else(|| kernel_err!("missing scalar argument {}", i))
}

/// A scalar argument that must be a non-negative count or position.
pub(crate) fn scalar_usize(scalars: &[i64], i: usize) -> Result<usize, KernelError> {
    let value = scalar(scalars, i)?;
    usize::try_from(value).map_err(|_| kernel_err!("scalar argument {} is negative", i))
}

/// Convert a stored index value into a position, rejecting negatives.
#[inline]
pub(crate) fn position(value: i64, id: usize) -> Result<usize, KernelError> {
    usize::try_from(value).map_err(|_| out_of_range!(id, "negative index {}", value))
}

/// Python's `slice.indices(length)`: the regularized start and stop of a slice with a
/// nonzero `step` over `length` items, plus the number of items it selects.
pub fn slice_indices(
    start: Option<i64>,
    stop: Option<i64>,
    step: i64,
    length: i64,
) -> (i64, i64, usize) {
    let (lower, upper) = if step > 0 {
        (0, length)
    } else {
        (-1, length - 1)
    };
    let clamp = |value: Option<i64>, default: i64| match value {
        None => default,
        Some(v) => {
            let v = if v < 0 { v + length } else { v };
            v.clamp(lower, upper)
        }
    };
    let (start, stop) = if step > 0 {
        (clamp(start, lower), clamp(stop, upper))
    } else {
        (clamp(start, upper), clamp(stop, lower))
    };
    let count = if step > 0 && stop > start {
        (stop - start + step - 1) / step
    } else if step < 0 && start > stop {
        (start - stop - step - 1) / (-step)
    } else {
        0
    };
    (start, stop, count as usize)
}

/// Decode a slice passed to a kernel as `[start, stop, step, has_start, has_stop]`.
pub(crate) fn slice_scalars(
    scalars: &[i64],
) -> Result<(Option<i64>, Option<i64>, i64), KernelError> {
    let start = scalar(scalars, 0)?;
    let stop = scalar(scalars, 1)?;
    let step = scalar(scalars, 2)?;
    if step == 0 {
        return Err(kernel_err!("slice step must not be zero"));
    }
    let has_start = scalar(scalars, 3)? != 0;
    let has_stop = scalar(scalars, 4)? != 0;
    Ok((has_start.then_some(start), has_stop.then_some(stop), step))
}

/// Bounds-checked read of `values[i]` on behalf of item `id`.
#[inline]
pub(crate) fn at<T: Copy>(values: &[T], i: usize, id: usize) -> Result<T, KernelError> {
    values
        .get(i)
        .copied()
        .ok_or_else(|| kernel_err!(@ id, "position {} out of range", i))
}

/// Positions are stored as `i64` throughout.
#[inline]
pub(crate) fn as_i64(value: usize) -> i64 {
    value as i64
}
