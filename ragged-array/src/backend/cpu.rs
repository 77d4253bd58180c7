use dashmap::DashMap;
use itertools::Itertools;
use ragged_dtype::PType;
use ragged_error::{RaggedResult, ragged_bail, ragged_err};

use crate::backend::{Backend, Length};
use crate::data::{Data, DataMut, ValuesMut};
use crate::kernels::{KernelFn, lookup_kernel};

/// A kernel selected by name and by the dtypes of its outputs then inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KernelKey {
    pub name: &'static str,
    pub ptypes: Vec<PType>,
}

impl KernelKey {
    pub fn new(name: &'static str, outputs: &[DataMut], inputs: &[&Data]) -> Self {
        Self {
            name,
            ptypes: outputs
                .iter()
                .map(DataMut::ptype)
                .chain(inputs.iter().map(|i| i.ptype()))
                .collect(),
        }
    }

    /// Resolve against the static registry.
    pub fn resolve(&self) -> RaggedResult<KernelFn> {
        lookup_kernel(self.name, &self.ptypes).ok_or_else(|| {
            ragged_err!(
                NotImplemented: "no kernel {} for dtypes ({})",
                self.name,
                self.ptypes.iter().join(", ")
            )
        })
    }
}

/// Memoized kernel resolution.
///
/// Two callers racing on the same key resolve to the same function, so the cache may be
/// populated redundantly without locking.
#[derive(Debug, Default)]
pub struct KernelCache(DashMap<KernelKey, KernelFn>);

impl KernelCache {
    pub fn get(&self, key: &KernelKey) -> RaggedResult<KernelFn> {
        if let Some(func) = self.0.get(key) {
            return Ok(*func);
        }
        let func = key.resolve()?;
        self.0.insert(key.clone(), func);
        Ok(func)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The concrete backend: buffers live in memory and kernels run on the calling thread.
#[derive(Debug, Default)]
pub struct Cpu {
    cache: KernelCache,
}

impl Backend for Cpu {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn known_data(&self) -> bool {
        true
    }

    fn known_shape(&self) -> bool {
        true
    }

    fn allocate(&self, ptype: PType, length: Length) -> RaggedResult<DataMut> {
        let Length::Known(len) = length else {
            ragged_bail!(AssertionFailed: "cannot allocate a {ptype} buffer of unknown length");
        };
        Ok(DataMut::Known(ValuesMut::zeroed(ptype, len)))
    }

    fn invoke(
        &self,
        kernel: &'static str,
        outputs: &mut [DataMut],
        inputs: &[&Data],
        scalars: &[i64],
    ) -> RaggedResult<()> {
        let key = KernelKey::new(kernel, outputs, inputs);
        let func = self.cache.get(&key)?;
        log::trace!("cpu kernel {}({})", kernel, key.ptypes.iter().join(", "));
        func(outputs, inputs, scalars).map_err(|err| err.into_ragged(kernel))
    }
}

#[cfg(test)]
mod test {
    use ragged_buffer::buffer;

    use super::*;

    #[test]
    fn resolves_and_caches() {
        let cpu = Cpu::default();
        let input = Data::from(buffer![2i64, 4, 7]);
        let mut outputs = [cpu.allocate(PType::I64, Length::Known(3)).unwrap()];
        cpu.invoke("ListOffsetArray_compact_offsets", &mut outputs, &[&input], &[])
            .unwrap();
        assert_eq!(cpu.cache.len(), 1);
        cpu.invoke("ListOffsetArray_compact_offsets", &mut outputs, &[&input], &[])
            .unwrap();
        assert_eq!(cpu.cache.len(), 1);
        assert_eq!(outputs[0].as_mut_slice::<i64>().unwrap(), &[0, 2, 5]);
    }

    #[test]
    fn unknown_kernels_are_rejected() {
        let cpu = Cpu::default();
        let input = Data::from(buffer![1.5f64]);
        let mut outputs = [cpu.allocate(PType::I64, Length::Known(1)).unwrap()];
        let err = cpu
            .invoke("ListOffsetArray_compact_offsets", &mut outputs, &[&input], &[])
            .unwrap_err();
        assert!(err.to_string().contains("float64"));
    }
}
