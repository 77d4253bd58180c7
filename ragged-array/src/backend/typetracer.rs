use itertools::Itertools;
use ragged_dtype::PType;
use ragged_error::RaggedResult;

use crate::backend::{Backend, KernelCache, KernelKey, Length};
use crate::data::{Data, DataMut};

/// The shape-only backend.
///
/// Buffers carry a dtype and a length, never values. Kernel calls check that the kernel
/// exists for the given dtypes and return without touching their outputs.
#[derive(Debug, Default)]
pub struct TypeTracer {
    cache: KernelCache,
}

impl Backend for TypeTracer {
    fn name(&self) -> &'static str {
        "typetracer"
    }

    fn known_data(&self) -> bool {
        false
    }

    fn known_shape(&self) -> bool {
        false
    }

    fn allocate(&self, ptype: PType, length: Length) -> RaggedResult<DataMut> {
        Ok(DataMut::Abstract { ptype, length })
    }

    fn invoke(
        &self,
        kernel: &'static str,
        outputs: &mut [DataMut],
        inputs: &[&Data],
        _scalars: &[i64],
    ) -> RaggedResult<()> {
        let key = KernelKey::new(kernel, outputs, inputs);
        self.cache.get(&key)?;
        log::trace!(
            "typetracer kernel {}({})",
            kernel,
            key.ptypes.iter().join(", ")
        );
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn validates_without_running() {
        let tt = TypeTracer::default();
        let input = Data::Abstract {
            ptype: PType::I64,
            length: Length::Unknown,
        };
        let mut outputs = [tt.allocate(PType::I64, Length::Unknown).unwrap()];
        tt.invoke("ListOffsetArray_compact_offsets", &mut outputs, &[&input], &[])
            .unwrap();
        assert_eq!(outputs[0].length(), Length::Unknown);

        let input = Data::Abstract {
            ptype: PType::F32,
            length: Length::Unknown,
        };
        assert!(
            tt.invoke("ListOffsetArray_compact_offsets", &mut outputs, &[&input], &[])
                .is_err()
        );
    }
}
