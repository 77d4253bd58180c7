use std::sync::Arc;

use ragged_dtype::{Form, FormKind, IndexType, PType, Parameters};
use ragged_error::{NodeContext, RaggedResult, ragged_bail, ragged_err};
use serde_json::Value;

use crate::backend::{BackendRef, Length};
use crate::content::{Content, IndexedOptionArray};
use crate::element::Element;
use crate::index::Index;

/// Pure indirection: element `i` is `content[index[i]]`.
#[derive(Clone, Debug)]
pub struct IndexedArray {
    index: Index,
    content: Arc<Content>,
    backend: BackendRef,
    parameters: Parameters,
}

impl IndexedArray {
    pub fn try_new(index: Index, content: impl Into<Content>) -> RaggedResult<Self> {
        if !matches!(
            index.index_type(),
            IndexType::I32 | IndexType::U32 | IndexType::I64
        ) {
            ragged_bail!(
                "IndexedArray index must be int32, uint32 or int64, not {}",
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
        Form::new(FormKind::Indexed {
            index: self.index.index_type(),
            content: Box::new(self.content.form()),
        })
        .with_parameters(self.parameters.clone())
    }

    pub(crate) fn element_at(&self, at: usize) -> RaggedResult<Element> {
        let Some(j) = self.index.get(at)? else {
            return self.content.unknown_element();
        };
        if j < 0 {
            ragged_bail!(Index: "IndexedArray", Some(at as i64), "index[{at}] is {j}, which is negative");
        }
        self.content.getitem_at(j)
    }

    pub(crate) fn slice(&self, start: Length, stop: Length) -> RaggedResult<Self> {
        Ok(Self {
            index: self.index.slice(start, stop)?,
            ..self.clone()
        })
    }

    /// Compose the carry with the index; the content is never touched.
    pub(crate) fn carry(&self, carry: &Index) -> RaggedResult<Self> {
        let index = self.index.carry(carry).in_node("IndexedArray")?;
        Ok(Self {
            backend: index.backend().combine(self.backend),
            index,
            ..self.clone()
        })
    }

    /// Positions of the content this array reads, in order.
    pub(crate) fn nextcarry(&self) -> RaggedResult<Index> {
        let [nextcarry] = self
            .backend
            .run(
                "IndexedArray_getitem_nextcarry",
                [(PType::I64, self.length())],
                &[self.index.data()],
                &[self.content.length().as_scalar()],
            )
            .in_node("IndexedArray")?;
        Index::try_from_data(nextcarry, self.backend)
    }

    /// The content gathered through the index. With `mask` (`1` for missing), the masked
    /// elements are dropped first.
    pub fn project(&self, mask: Option<&Index>) -> RaggedResult<Content> {
        match mask {
            Some(mask) => {
                if let (Length::Known(m), Length::Known(n)) = (mask.length(), self.length())
                    && m != n
                {
                    ragged_bail!(
                        Index: "IndexedArray",
                        None,
                        "mask length ({m}) is not equal to IndexedArray length ({n})"
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
                    .in_node("IndexedArray")?;
                let nextindex = Index::try_from_data(nextindex, self.backend)?;
                IndexedOptionArray::try_new(nextindex, self.content.as_ref().clone())?
                    .with_parameters(self.parameters.clone())
                    .project(None)
            }
            None => self.content.carry(&self.nextcarry()?, false),
        }
    }

    /// Fold a directly nested indexed or option layer into this one.
    pub fn simplify_optiontype(&self) -> RaggedResult<Content> {
        let (inner_index, inner_content, option) = match self.content.as_ref() {
            Content::Indexed(inner) => (inner.index.to64()?, inner.content.clone(), false),
            c @ (Content::IndexedOption(_)
            | Content::ByteMasked(_)
            | Content::BitMasked(_)
            | Content::Unmasked(_)) => {
                let inner = c.to_indexed_option_array64()?;
                (inner.index().clone(), Arc::new(inner.content().clone()), true)
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
            .in_node("IndexedArray")?;
        let result = Index::try_from_data(result, self.backend)?;
        let parameters = self.parameters.union(self.content.parameters());
        let inner_content = inner_content.as_ref().clone();
        Ok(if option {
            IndexedOptionArray::try_new(result, inner_content)?
                .with_parameters(parameters)
                .into()
        } else {
            IndexedArray::try_new(result, inner_content)?
                .with_parameters(parameters)
                .into()
        })
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
            &[self.content.length().as_scalar(), 0],
        ) {
            return Some(format!("at {path} (IndexedArray): {}", err.message()));
        }
        if self.content.is_option() || self.content.is_indexed() {
            return Some(format!(
                "at {path} (IndexedArray): {} contains {}, the operation that made it might have forgotten to call 'simplify_optiontype()'",
                "IndexedArray",
                self.content.class_name()
            ));
        }
        self.content.validity_error(&format!("{path}.content"))
    }

    pub(crate) fn to_list(&self) -> RaggedResult<Value> {
        let items = list_items(self.content.to_list()?)?;
        let index = self.index.to_vec()?;
        index
            .into_iter()
            .enumerate()
            .map(|(i, j)| {
                usize::try_from(j)
                    .ok()
                    .and_then(|j| items.get(j).cloned())
                    .ok_or_else(|| {
                        ragged_err!(Index: "IndexedArray", Some(i as i64), "index[{i}] = {j} is out of range")
                    })
            })
            .collect::<RaggedResult<Vec<_>>>()
            .map(Value::Array)
    }

    pub fn nbytes(&self) -> usize {
        self.index.nbytes() + self.content.nbytes()
    }
}

/// The items of a rendered array.
pub(crate) fn list_items(value: Value) -> RaggedResult<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(ragged_err!(AssertionFailed: "expected a rendered array, got {other}")),
    }
}

#[cfg(test)]
mod test {
    use ragged_buffer::buffer;
    use serde_json::json;

    use super::*;
    use crate::content::NumpyArray;

    fn indexed(index: Index) -> IndexedArray {
        IndexedArray::try_new(
            index,
            NumpyArray::new(buffer![0.0f64, 1.1, 2.2, 3.3, 4.4, 5.5]),
        )
        .unwrap()
    }

    #[test]
    fn project_gathers() {
        let array = indexed(Index::new(buffer![5i32, 0, 0, 2]));
        assert_eq!(
            array.project(None).unwrap().to_list().unwrap(),
            json!([5.5, 0.0, 0.0, 2.2])
        );
        let mask = Index::new(buffer![0i8, 1, 0, 1]);
        assert_eq!(
            array.project(Some(&mask)).unwrap().to_list().unwrap(),
            json!([5.5, 0.0])
        );
    }

    #[test]
    fn nested_indexes_compose() {
        let inner = indexed(Index::from_i64s([3, 2, 1, 0]));
        let outer = IndexedArray::try_new(Index::new(buffer![0u32, 0, 3]), inner).unwrap();
        let simplified = outer.simplify_optiontype().unwrap();
        let Content::Indexed(simplified) = &simplified else {
            panic!("expected an IndexedArray, got {}", simplified.class_name());
        };
        assert_eq!(simplified.index().to_vec().unwrap(), vec![3, 3, 0]);
        assert!(matches!(simplified.content(), Content::Numpy(_)));
        assert_eq!(
            Content::from(simplified.clone()).to_list().unwrap(),
            json!([3.3, 3.3, 0.0])
        );
    }

    #[test]
    fn out_of_range_index_is_reported() {
        let array = indexed(Index::from_i64s([1, 9]));
        assert!(array.project(None).unwrap_err().is_index_error());
        assert!(
            Content::from(array)
                .validity_error("layout")
                .unwrap()
                .starts_with("at layout (IndexedArray)")
        );
    }

    #[test]
    fn stacked_layers_are_invalid() {
        let inner = indexed(Index::from_i64s([0, 1]));
        let outer = IndexedArray::try_new(Index::from_i64s([1, 0]), inner).unwrap();
        let message = Content::from(outer).validity_error("layout").unwrap();
        assert!(message.contains("simplify_optiontype"));
    }
}
