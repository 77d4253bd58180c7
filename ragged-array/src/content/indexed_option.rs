use std::sync::Arc;

use ragged_dtype::{Form, FormKind, IndexType, PType, Parameters};
use ragged_error::{NodeContext, RaggedResult, ragged_bail, ragged_err};
use serde_json::Value;

use crate::backend::{BackendRef, Length};
use crate::content::indexed::list_items;
use crate::content::{ByteMaskedArray, Content};
use crate::element::Element;
use crate::index::Index;

/// Nullable indirection: element `i` is `content[index[i]]`, or missing when `index[i] < 0`.
#[derive(Clone, Debug)]
pub struct IndexedOptionArray {
    index: Index,
    content: Arc<Content>,
    backend: BackendRef,
    parameters: Parameters,
}

impl IndexedOptionArray {
    pub fn try_new(index: Index, content: impl Into<Content>) -> RaggedResult<Self> {
        if !matches!(index.index_type(), IndexType::I32 | IndexType::I64) {
            ragged_bail!(
                "IndexedOptionArray index must be int32 or int64, not {}",
                index.index_type()
            );
        }
        let content = content.into();
        let backend = index.backend().combine(content.backend());
        Ok(Self {
            index,
            content: Arc::new(content),
            backend,
            parameters: Parameters::empty(),
        })
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn length(&self) -> Length {
        self.index.length()
    }

    pub fn backend(&self) -> BackendRef {
        self.backend
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn form(&self) -> Form {
        Form::new(FormKind::IndexedOption {
            index: self.index.index_type(),
            content: Box::new(self.content.form()),
        })
        .with_parameters(self.parameters.clone())
    }

    pub(crate) fn element_at(&self, at: usize) -> RaggedResult<Element> {
        match self.index.get(at)? {
            None => self.content.unknown_element(),
            Some(j) if j < 0 => Ok(Element::Missing),
            Some(j) => self.content.getitem_at(j),
        }
    }

    pub(crate) fn slice(&self, start: Length, stop: Length) -> RaggedResult<Self> {
        Ok(Self {
            index: self.index.slice(start, stop)?,
            ..self.clone()
        })
    }

    pub(crate) fn carry(&self, carry: &Index) -> RaggedResult<Self> {
        let index = self.index.carry(carry).in_node("IndexedOptionArray")?;
        Ok(Self {
            backend: index.backend().combine(self.backend),
            index,
            ..self.clone()
        })
    }

    /// Number of missing elements.
    pub fn numnull(&self) -> RaggedResult<Length> {
        self.backend
            .run_count("IndexedArray_numnull", &[self.index.data()], &[])
            .in_node("IndexedOptionArray")
    }

    /// One byte per element, `1` where the element is missing.
    pub fn bytemask(&self) -> RaggedResult<Index> {
        let [mask] = self.backend.run(
            "IndexedArray_mask",
            [(PType::I8, self.length())],
            &[self.index.data()],
            &[],
        )?;
        Index::try_from_data(mask, self.backend)
    }

    /// The positions of the present elements in the content, and for every element its
    /// position among the present ones or `-1`.
    pub(crate) fn nextcarry_outindex(&self) -> RaggedResult<(Index, Index)> {
        let numnull = self.numnull()?;
        let [nextcarry, outindex] = self
            .backend
            .run(
                "IndexedArray_getitem_nextcarry_outindex",
                [
                    (PType::I64, self.length() - numnull),
                    (PType::I64, self.length()),
                ],
                &[self.index.data()],
                &[self.content.length().as_scalar()],
            )
            .in_node("IndexedOptionArray")?;
        Ok((
            Index::try_from_data(nextcarry, self.backend)?,
            Index::try_from_data(outindex, self.backend)?,
        ))
    }

    /// The present elements, gathered. With `mask` (`1` for missing), masked elements are
    /// dropped as well.
    pub fn project(&self, mask: Option<&Index>) -> RaggedResult<Content> {
        if let Some(mask) = mask {
            if let (Length::Known(m), Length::Known(n)) = (mask.length(), self.length())
                && m != n
            {
                ragged_bail!(
                    Index: "IndexedOptionArray",
                    None,
                    "mask length ({m}) is not equal to IndexedOptionArray length ({n})"
                );
            }
            let [nextindex] = self
                .backend
                .run(
                    "IndexedArray_overlay_mask",
                    [(PType::I64, self.length())],
                    &[mask.data(), self.index.data()],
                    &[],
                )
                .in_node("IndexedOptionArray")?;
            let nextindex = Index::try_from_data(nextindex, self.backend)?;
            return Self {
                index: nextindex,
                ..self.clone()
            }
            .project(None);
        }
        let numnull = self.numnull()?;
        let [nextcarry] = self
            .backend
            .run(
                "IndexedArray_flatten_nextcarry",
                [(PType::I64, self.length() - numnull)],
                &[self.index.data()],
                &[self.content.length().as_scalar()],
            )
            .in_node("IndexedOptionArray")?;
        self.content
            .carry(&Index::try_from_data(nextcarry, self.backend)?, false)
    }

    pub fn to_indexed_option_array64(&self) -> RaggedResult<IndexedOptionArray> {
        Ok(Self {
            index: self.index.to64()?,
            ..self.clone()
        })
    }

    pub fn to_byte_masked_array(&self) -> RaggedResult<ByteMaskedArray> {
        let [mask, carry] = self
            .backend
            .run(
                "IndexedOptionArray_to_ByteMaskedArray",
                [(PType::I8, self.length()), (PType::I64, self.length())],
                &[self.index.data()],
                &[],
            )
            .in_node("IndexedOptionArray")?;
        let content = self
            .content
            .carry(&Index::try_from_data(carry, self.backend)?, false)?;
        Ok(
            ByteMaskedArray::try_new(Index::try_from_data(mask, self.backend)?, content, false)?
                .with_parameters(self.parameters.clone()),
        )
    }

    /// Fold a directly nested indexed or option layer into this one.
    pub fn simplify_optiontype(&self) -> RaggedResult<Content> {
        let (inner_index, inner_content) = match self.content.as_ref() {
            Content::Indexed(inner) => (inner.index().to64()?, inner.content().clone()),
            c @ (Content::IndexedOption(_)
            | Content::ByteMasked(_)
            | Content::BitMasked(_)
            | Content::Unmasked(_)) => {
                let inner = c.to_indexed_option_array64()?;
                (inner.index, inner.content.as_ref().clone())
            }
            _ => return Ok(self.clone().into()),
        };
        let [result] = self
            .backend
            .run(
                "IndexedArray_simplify",
                [(PType::I64, self.length())],
                &[self.index.data(), inner_index.data()],
                &[inner_index.length().as_scalar()],
            )
            .in_node("IndexedOptionArray")?;
        let parameters = self.parameters.union(self.content.parameters());
        Ok(
            IndexedOptionArray::try_new(Index::try_from_data(result, self.backend)?, inner_content)?
                .with_parameters(parameters)
                .into(),
        )
    }

    pub fn to_typetracer(&self, forget_length: bool) -> Self {
        Self {
            index: self.index.to_typetracer(forget_length),
            content: Arc::new(self.content.to_typetracer(forget_length)),
            backend: BackendRef::typetracer(),
            parameters: self.parameters.clone(),
        }
    }

    pub(crate) fn validity_error(&self, path: &str) -> Option<String> {
        if let Err(err) = self.backend.check(
            "IndexedArray_validity",
            &[self.index.data()],
            &[self.content.length().as_scalar(), 1],
        ) {
            return Some(format!("at {path} (IndexedOptionArray): {}", err.message()));
        }
        if self.content.is_option() || self.content.is_indexed() {
            return Some(format!(
                "at {path} (IndexedOptionArray): IndexedOptionArray contains {}, the operation that made it might have forgotten to call 'simplify_optiontype()'",
                self.content.class_name()
            ));
        }
        self.content.validity_error(&format!("{path}.content"))
    }

    pub(crate) fn to_list(&self) -> RaggedResult<Value> {
        let items = list_items(self.content.to_list()?)?;
        self.index
            .to_vec()?
            .into_iter()
            .enumerate()
            .map(|(i, j)| match usize::try_from(j) {
                Err(_) => Ok(Value::Null),
                Ok(j) => items.get(j).cloned().ok_or_else(|| {
                    ragged_err!(
                        Index: "IndexedOptionArray",
                        Some(i as i64),
                        "index[{i}] = {j} is out of range"
                    )
                }),
            })
            .collect::<RaggedResult<Vec<_>>>()
            .map(Value::Array)
    }

    pub fn nbytes(&self) -> usize {
        self.index.nbytes() + self.content.nbytes()
    }
}

#[cfg(test)]
mod test {
    use ragged_buffer::buffer;
    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::content::NumpyArray;

    fn option(index: Index) -> IndexedOptionArray {
        IndexedOptionArray::try_new(index, NumpyArray::new(buffer![0i64, 10, 20, 30])).unwrap()
    }

    #[rstest]
    #[case(Index::new(buffer![2i32, -1, 0, -1]))]
    #[case(Index::from_i64s([2, -1, 0, -1]))]
    fn renders_missing_as_null(#[case] index: Index) {
        let array = option(index);
        assert_eq!(array.to_list().unwrap(), json!([20, null, 0, null]));
        assert_eq!(array.numnull().unwrap(), Length::Known(2));
        assert_eq!(array.project(None).unwrap().to_list().unwrap(), json!([20, 0]));
    }

    #[test]
    fn converts_to_byte_mask() {
        let masked = option(Index::from_i64s([-1, 3, 1])).to_byte_masked_array().unwrap();
        assert_eq!(masked.mask().to_vec().unwrap(), vec![1, 0, 0]);
        assert_eq!(
            Content::from(masked).to_list().unwrap(),
            json!([null, 30, 10])
        );
    }

    #[test]
    fn outindex_numbers_present_elements() {
        let (nextcarry, outindex) = option(Index::from_i64s([3, -1, 1, -1, 0]))
            .nextcarry_outindex()
            .unwrap();
        assert_eq!(nextcarry.to_vec().unwrap(), vec![3, 1, 0]);
        assert_eq!(outindex.to_vec().unwrap(), vec![0, -1, 1, -1, 2]);
    }

    #[test]
    fn unsigned_indexes_are_rejected() {
        let content = NumpyArray::new(buffer![1u8]);
        assert!(IndexedOptionArray::try_new(Index::new(buffer![0u32]), content).is_err());
    }
}
