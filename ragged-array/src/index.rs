use std::fmt::{Debug, Display, Formatter};

use itertools::Itertools;
use ragged_buffer::Buffer;
use ragged_dtype::{IndexNative, IndexType, PType};
use ragged_error::{RaggedResult, ragged_bail, ragged_err};

use crate::backend::{BackendRef, Length};
use crate::data::{Data, Primitive};

/// A typed integer buffer used for offsets, starts, stops, carries, tags and masks.
///
/// An index never changes once built; every operation returns a new one. On the typetracer
/// backend it carries only its type and (usually unknown) length.
#[derive(Clone)]
pub struct Index {
    data: Data,
    index_type: IndexType,
    backend: BackendRef,
}

impl Index {
    /// Wrap concrete values.
    pub fn new<T: IndexNative + Primitive>(buffer: Buffer<T>) -> Self {
        Self {
            data: Data::from(buffer),
            index_type: T::INDEX_TYPE,
            backend: BackendRef::cpu(),
        }
    }

    /// Wrap a buffer produced by a backend, checking that its type may back an index.
    pub fn try_from_data(data: Data, backend: BackendRef) -> RaggedResult<Self> {
        let index_type = IndexType::try_from(data.ptype())?;
        Ok(Self {
            data,
            index_type,
            backend,
        })
    }

    /// A 64-bit index on the concrete backend.
    pub fn from_i64s(values: impl IntoIterator<Item = i64>) -> Self {
        Self::new(values.into_iter().collect::<Buffer<i64>>())
    }

    /// `length` zeros.
    pub fn zeros(index_type: IndexType, length: Length, backend: BackendRef) -> RaggedResult<Self> {
        Self::try_from_data(
            backend.allocate(index_type.ptype(), length)?.freeze(),
            backend,
        )
    }

    /// `0, 1, ..., length - 1` as a 64-bit index.
    pub fn arange(length: Length, backend: BackendRef) -> RaggedResult<Self> {
        let [data] = backend.run("Index_iota", [(PType::I64, length)], &[], &[])?;
        Self::try_from_data(data, backend)
    }

    /// An empty index of the given type.
    pub fn empty(index_type: IndexType, backend: BackendRef) -> RaggedResult<Self> {
        Self::zeros(index_type, Length::ZERO, backend)
    }

    pub fn length(&self) -> Length {
        self.data.length()
    }

    pub fn index_type(&self) -> IndexType {
        self.index_type
    }

    pub fn ptype(&self) -> PType {
        self.index_type.ptype()
    }

    pub fn data(&self) -> &Data {
        &self.data
    }

    pub fn backend(&self) -> BackendRef {
        self.backend
    }

    pub fn is_known(&self) -> bool {
        self.data.is_known()
    }

    /// The value at `i`, or `None` when the index holds no data.
    pub fn get(&self, i: usize) -> RaggedResult<Option<i64>> {
        let Some(values) = self.data.values() else {
            return Ok(None);
        };
        if i >= values.len() {
            ragged_bail!(
                AssertionFailed: "position {i} out of bounds for an index of length {}",
                values.len()
            );
        }
        Ok(Some(values.get_i64(i)))
    }

    /// The value at `i` read as a length or position: unknown when the index holds no data.
    pub fn get_length(&self, i: usize) -> RaggedResult<Length> {
        match self.get(i)? {
            None => Ok(Length::Unknown),
            Some(value) => usize::try_from(value).map(Length::Known).map_err(|_| {
                ragged_err!(Index: "Index", Some(value), "expected a non-negative value at {i}")
            }),
        }
    }

    /// The value at `i`, which must be concrete.
    pub fn require(&self, i: usize, what: &str) -> RaggedResult<i64> {
        self.get(i)?.ok_or_else(
            || ragged_err!(NotImplemented: "{what} requires concrete data, not a typetracer index"),
        )
    }

    /// Every value, widened to `i64`.
    pub fn to_vec(&self) -> RaggedResult<Vec<i64>> {
        self.data
            .values()
            .map(|values| values.to_i64_vec())
            .ok_or_else(|| ragged_err!(NotImplemented: "cannot read the values of a typetracer index"))
    }

    /// Zero-copy window `[start, stop)`.
    pub fn slice(&self, start: Length, stop: Length) -> RaggedResult<Self> {
        Ok(Self {
            data: self.data.slice(start, stop)?,
            index_type: self.index_type,
            backend: self.backend,
        })
    }

    /// The same type on the typetracer backend, optionally forgetting the length.
    pub fn to_typetracer(&self, forget_length: bool) -> Self {
        Self {
            data: Data::Abstract {
                ptype: self.ptype(),
                length: if forget_length {
                    Length::Unknown
                } else {
                    self.length()
                },
            },
            index_type: self.index_type,
            backend: BackendRef::typetracer(),
        }
    }

    /// Widen to a 64-bit index.
    pub fn to64(&self) -> RaggedResult<Self> {
        if self.index_type == IndexType::I64 {
            return Ok(self.clone());
        }
        let [data] = self.backend.run(
            "Index_to_Index64",
            [(PType::I64, self.length())],
            &[&self.data],
            &[],
        )?;
        Self::try_from_data(data, self.backend)
    }

    /// `self[carry]`, keeping the index type.
    pub fn carry(&self, carry: &Index) -> RaggedResult<Self> {
        let backend = self.backend.combine(carry.backend);
        let [data] = backend.run(
            "Index_carry",
            [(self.ptype(), carry.length())],
            &[&self.data, carry.data()],
            &[],
        )?;
        Self::try_from_data(data, backend)
    }

    /// Bytes held by the visible window.
    pub fn nbytes(&self) -> usize {
        self.data.values().map_or(0, |values| values.nbytes())
    }
}

impl Debug for Index {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Index<{}>({})", self.index_type, self)
    }
}

impl Display for Index {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.data.values() {
            Some(values) if values.len() <= 10 => {
                write!(f, "[{}]", values.to_i64_vec().iter().join(", "))
            }
            Some(values) => {
                let all = values.to_i64_vec();
                write!(
                    f,
                    "[{} ... {}]",
                    all[..5].iter().join(", "),
                    all[all.len() - 5..].iter().join(", ")
                )
            }
            None => write!(f, "[## ... ##] (length {})", self.length()),
        }
    }
}

#[cfg(test)]
mod test {
    use ragged_buffer::buffer;

    use super::*;

    #[test]
    fn carry_keeps_the_index_type() {
        let index = Index::new(buffer![5i32, 6, 7, 8]);
        let carried = index.carry(&Index::from_i64s([3, 0, 0])).unwrap();
        assert_eq!(carried.index_type(), IndexType::I32);
        assert_eq!(carried.to_vec().unwrap(), vec![8, 5, 5]);
        assert!(index.carry(&Index::from_i64s([4])).is_err());
    }

    #[test]
    fn typetracer_indexes_have_no_values() {
        let index = Index::arange(Length::Known(4), BackendRef::cpu()).unwrap();
        assert_eq!(index.to_vec().unwrap(), vec![0, 1, 2, 3]);
        let tt = index.to_typetracer(true);
        assert_eq!(tt.length(), Length::Unknown);
        assert_eq!(tt.get(0).unwrap(), None);
        assert!(tt.to_vec().is_err());
        assert_eq!(tt.to64().unwrap().index_type(), IndexType::I64);
    }

    #[test]
    fn only_integer_types_back_an_index() {
        let floats = Data::from(buffer![1.0f64]);
        assert!(Index::try_from_data(floats, BackendRef::cpu()).is_err());
    }
}
