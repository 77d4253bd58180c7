//! Execution backends.
//!
//! Every layout algorithm is written against [`BackendRef`]. The [`Cpu`] backend allocates
//! real buffers and runs the registered kernels; the [`TypeTracer`] backend allocates
//! shape-only placeholders and only checks that a kernel exists for the requested dtypes.

use std::fmt::{Debug, Formatter};
use std::sync::LazyLock;

use itertools::Itertools;
use ragged_dtype::PType;
use ragged_error::{RaggedResult, ragged_err};

pub use cpu::*;
pub use length::*;
pub use typetracer::*;

use crate::data::{Data, DataMut};

mod cpu;
mod length;
mod typetracer;

/// Allocation and kernel dispatch.
pub trait Backend: Debug + Send + Sync {
    /// A short name used in error messages and tree displays.
    fn name(&self) -> &'static str;

    /// Whether buffers allocated by this backend hold values.
    fn known_data(&self) -> bool;

    /// Whether lengths produced by this backend are concrete.
    fn known_shape(&self) -> bool;

    /// Allocate an output buffer of `length` elements of `ptype`.
    fn allocate(&self, ptype: PType, length: Length) -> RaggedResult<DataMut>;

    /// Run the kernel `kernel`, selected by the dtypes of its outputs then inputs.
    fn invoke(
        &self,
        kernel: &'static str,
        outputs: &mut [DataMut],
        inputs: &[&Data],
        scalars: &[i64],
    ) -> RaggedResult<()>;
}

static CPU: LazyLock<Cpu> = LazyLock::new(Cpu::default);
static TYPETRACER: LazyLock<TypeTracer> = LazyLock::new(TypeTracer::default);

/// A cheap, copyable handle on one of the process-wide backends.
#[derive(Clone, Copy)]
pub struct BackendRef(&'static dyn Backend);

impl BackendRef {
    /// The concrete backend.
    pub fn cpu() -> Self {
        BackendRef(&*CPU)
    }

    /// The shape-only backend.
    pub fn typetracer() -> Self {
        BackendRef(&*TYPETRACER)
    }

    pub fn name(self) -> &'static str {
        self.0.name()
    }

    pub fn known_data(self) -> bool {
        self.0.known_data()
    }

    pub fn known_shape(self) -> bool {
        self.0.known_shape()
    }

    pub fn is_typetracer(self) -> bool {
        !self.0.known_data()
    }

    pub fn allocate(self, ptype: PType, length: Length) -> RaggedResult<DataMut> {
        self.0.allocate(ptype, length)
    }

    /// Run a kernel over freshly allocated or threaded-through outputs, handing them back
    /// once the kernel returns.
    pub fn call<const N: usize>(
        self,
        kernel: &'static str,
        mut outputs: [DataMut; N],
        inputs: &[&Data],
        scalars: &[i64],
    ) -> RaggedResult<[DataMut; N]> {
        self.0.invoke(kernel, &mut outputs, inputs, scalars)?;
        Ok(outputs)
    }

    /// Allocate the outputs, run the kernel and freeze the results.
    pub fn run<const N: usize>(
        self,
        kernel: &'static str,
        outputs: [(PType, Length); N],
        inputs: &[&Data],
        scalars: &[i64],
    ) -> RaggedResult<[Data; N]> {
        let allocated: Vec<DataMut> = outputs
            .iter()
            .map(|&(ptype, length)| self.allocate(ptype, length))
            .try_collect()?;
        let allocated: [DataMut; N] = allocated
            .try_into()
            .map_err(|_| ragged_err!(AssertionFailed: "allocated the wrong number of outputs"))?;
        Ok(self.call(kernel, allocated, inputs, scalars)?.map(DataMut::freeze))
    }

    /// Run a kernel that only checks its inputs.
    pub fn check(self, kernel: &'static str, inputs: &[&Data], scalars: &[i64]) -> RaggedResult<()> {
        self.call::<0>(kernel, [], inputs, scalars).map(|_| ())
    }

    /// Run a kernel whose single output is a count. Shape-only execution cannot know it.
    pub fn run_count(
        self,
        kernel: &'static str,
        inputs: &[&Data],
        scalars: &[i64],
    ) -> RaggedResult<Length> {
        let [out] = self.run(kernel, [(PType::I64, Length::Known(1))], inputs, scalars)?;
        match out.as_slice::<i64>() {
            Some(&[count]) => usize::try_from(count).map(Length::Known).map_err(|_| {
                ragged_err!(AssertionFailed: "kernel {kernel} returned a negative count {count}")
            }),
            _ => Ok(Length::Unknown),
        }
    }

    /// The backend that two operands should be combined on. Shape-only execution is
    /// contagious.
    pub fn combine(self, other: BackendRef) -> BackendRef {
        if self.is_typetracer() { self } else { other }
    }

    /// Combine the backends of many operands.
    pub fn common(backends: impl IntoIterator<Item = BackendRef>) -> BackendRef {
        backends
            .into_iter()
            .fold(BackendRef::cpu(), |acc, b| b.combine(acc))
    }

    /// Fail unless the shape of buffers is known.
    pub fn require_known_shape(self, what: &str) -> RaggedResult<()> {
        if self.known_shape() {
            Ok(())
        } else {
            Err(ragged_err!(
                NotImplemented: "{what} requires concrete data, not the {} backend",
                self.name()
            ))
        }
    }
}

impl Default for BackendRef {
    fn default() -> Self {
        BackendRef::cpu()
    }
}

impl PartialEq for BackendRef {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Eq for BackendRef {}

impl Debug for BackendRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn typetracer_is_contagious() {
        let cpu = BackendRef::cpu();
        let tt = BackendRef::typetracer();
        assert_eq!(cpu.combine(tt), tt);
        assert_eq!(tt.combine(cpu), tt);
        assert_eq!(cpu.combine(cpu), cpu);
        assert_eq!(BackendRef::common([cpu, tt, cpu]), tt);
        assert_eq!(BackendRef::common([]), cpu);
    }

    #[test]
    fn allocation() {
        let out = BackendRef::cpu()
            .allocate(PType::I32, Length::Known(3))
            .unwrap();
        assert_eq!(out.length(), Length::Known(3));
        assert!(
            BackendRef::cpu()
                .allocate(PType::I32, Length::Unknown)
                .is_err()
        );
        let out = BackendRef::typetracer()
            .allocate(PType::F64, Length::Unknown)
            .unwrap();
        assert_eq!(out.ptype(), PType::F64);
        assert_eq!(out.length(), Length::Unknown);
    }
}
