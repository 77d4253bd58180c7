use std::sync::Arc;

use ragged_dtype::{Form, FormKind, IndexType, PType, Parameters};
use ragged_error::{NodeContext, RaggedResult, ragged_bail};
use serde_json::Value;

use crate::backend::{BackendRef, Length};
use crate::content::indexed::list_items;
use crate::content::{Content, IndexedOptionArray};
use crate::element::Element;
use crate::index::Index;

/// An option layer with one mask byte per element. Element `i` is present when
/// `(mask[i] != 0) == valid_when`.
#[derive(Clone, Debug)]
pub struct ByteMaskedArray {
    mask: Index,
    content: Arc<Content>,
    valid_when: bool,
    backend: BackendRef,
    parameters: Parameters,
}

impl ByteMaskedArray {
    pub fn try_new(mask: Index, content: impl Into<Content>, valid_when: bool) -> RaggedResult<Self> {
        if mask.index_type() != IndexType::I8 {
            ragged_bail!("ByteMaskedArray mask must be int8, not {}", mask.index_type());
        }
        let content = content.into();
        if let (Length::Known(m), Length::Known(c)) = (mask.length(), content.length())
            && c < m
        {
            ragged_bail!("ByteMaskedArray content ({c}) is shorter than its mask ({m})");
        }
        let backend = mask.backend().combine(content.backend());
        Ok(Self {
            mask,
            content: Arc::new(content),
            valid_when,
            backend,
            parameters: Parameters::empty(),
        })
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn mask(&self) -> &Index {
        &self.mask
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn valid_when(&self) -> bool {
        self.valid_when
    }

    pub fn length(&self) -> Length {
        self.mask.length()
    }

    pub fn backend(&self) -> BackendRef {
        self.backend
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn form(&self) -> Form {
        Form::new(FormKind::ByteMasked {
            mask: IndexType::I8,
            valid_when: self.valid_when,
            content: Box::new(self.content.form()),
        })
        .with_parameters(self.parameters.clone())
    }

    fn valid_scalar(&self) -> i64 {
        i64::from(self.valid_when)
    }

    pub(crate) fn element_at(&self, at: usize) -> RaggedResult<Element> {
        match self.mask.get(at)? {
            None => self.content.unknown_element(),
            Some(m) if (m != 0) == self.valid_when => self.content.getitem_at(at as i64),
            Some(_) => Ok(Element::Missing),
        }
    }

    pub(crate) fn slice(&self, start: Length, stop: Length) -> RaggedResult<Self> {
        Ok(Self {
            mask: self.mask.slice(start, stop)?,
            content: Arc::new(self.content.slice(start, stop)?),
            ..self.clone()
        })
    }

    pub(crate) fn carry(&self, carry: &Index, allow_lazy: bool) -> RaggedResult<Self> {
        let mask = self.mask.carry(carry).in_node("ByteMaskedArray")?;
        let content = self.content.carry(carry, allow_lazy)?;
        Ok(Self {
            backend: mask.backend().combine(content.backend()),
            mask,
            content: Arc::new(content),
            ..self.clone()
        })
    }

    pub fn numnull(&self) -> RaggedResult<Length> {
        self.backend
            .run_count(
                "ByteMaskedArray_numnull",
                &[self.mask.data()],
                &[self.valid_scalar()],
            )
            .in_node("ByteMaskedArray")
    }

    /// Positions of the present elements.
    pub(crate) fn nextcarry(&self) -> RaggedResult<Index> {
        let numnull = self.numnull()?;
        let [nextcarry] = self
            .backend
            .run(
                "ByteMaskedArray_getitem_nextcarry",
                [(PType::I64, self.length() - numnull)],
                &[self.mask.data()],
                &[self.valid_scalar()],
            )
            .in_node("ByteMaskedArray")?;
        Index::try_from_data(nextcarry, self.backend)
    }

    /// One byte per element, `1` where the element is missing, optionally also where `theirs`
    /// is nonzero.
    pub fn bytemask(&self, theirs: Option<&Index>) -> RaggedResult<Index> {
        let zeros;
        let theirs = match theirs {
            Some(theirs) => theirs,
            None => {
                zeros = Index::zeros(IndexType::I8, self.length(), self.backend)?;
                &zeros
            }
        };
        let [mask] = self
            .backend
            .run(
                "ByteMaskedArray_overlay_mask",
                [(PType::I8, self.length())],
                &[theirs.data(), self.mask.data()],
                &[self.valid_scalar()],
            )
            .in_node("ByteMaskedArray")?;
        Index::try_from_data(mask, self.backend)
    }

    pub fn project(&self, mask: Option<&Index>) -> RaggedResult<Content> {
        if let Some(mask) = mask {
            if let (Length::Known(m), Length::Known(n)) = (mask.length(), self.length())
                && m != n
            {
                ragged_bail!(
                    Index: "ByteMaskedArray",
                    None,
                    "mask length ({m}) is not equal to ByteMaskedArray length ({n})"
                );
            }
            let nextmask = self.bytemask(Some(mask))?;
            return Self {
                mask: nextmask,
                valid_when: false,
                ..self.clone()
            }
            .project(None);
        }
        self.content.carry(&self.nextcarry()?, false)
    }

    pub fn to_indexed_option_array64(&self) -> RaggedResult<IndexedOptionArray> {
        let [index] = self
            .backend
            .run(
                "ByteMaskedArray_toIndexedOptionArray",
                [(PType::I64, self.length())],
                &[self.mask.data()],
                &[self.valid_scalar()],
            )
            .in_node("ByteMaskedArray")?;
        Ok(IndexedOptionArray::try_new(
            Index::try_from_data(index, self.backend)?,
            self.content.as_ref().clone(),
        )?
        .with_parameters(self.parameters.clone()))
    }

    pub fn simplify_optiontype(&self) -> RaggedResult<Content> {
        if self.content.is_option() || self.content.is_indexed() {
            self.to_indexed_option_array64()?.simplify_optiontype()
        } else {
            Ok(self.clone().into())
        }
    }

    pub fn to_typetracer(&self, forget_length: bool) -> Self {
        Self {
            mask: self.mask.to_typetracer(forget_length),
            content: Arc::new(self.content.to_typetracer(forget_length)),
            backend: BackendRef::typetracer(),
            ..self.clone()
        }
    }

    pub(crate) fn validity_error(&self, path: &str) -> Option<String> {
        if let (Length::Known(c), Length::Known(m)) = (self.content.length(), self.length())
            && c < m
        {
            return Some(format!(
                "at {path} (ByteMaskedArray): len(content) < len(mask)"
            ));
        }
        if self.content.is_option() || self.content.is_indexed() {
            return Some(format!(
                "at {path} (ByteMaskedArray): ByteMaskedArray contains {}, the operation that made it might have forgotten to call 'simplify_optiontype()'",
                self.content.class_name()
            ));
        }
        self.content.validity_error(&format!("{path}.content"))
    }

    pub(crate) fn to_list(&self) -> RaggedResult<Value> {
        let items = list_items(self.content.to_list()?)?;
        let mask = self.mask.to_vec()?;
        Ok(Value::Array(
            mask.into_iter()
                .zip(items)
                .map(|(m, item)| {
                    if (m != 0) == self.valid_when {
                        item
                    } else {
                        Value::Null
                    }
                })
                .collect(),
        ))
    }

    pub fn nbytes(&self) -> usize {
        self.mask.nbytes() + self.content.nbytes()
    }
}

#[cfg(test)]
mod test {
    use ragged_buffer::buffer;
    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::content::NumpyArray;

    fn masked(valid_when: bool) -> ByteMaskedArray {
        ByteMaskedArray::try_new(
            Index::new(buffer![1i8, 0, 1, 0]),
            NumpyArray::new(buffer![1.5f64, 2.5, 3.5, 4.5, 5.5]),
            valid_when,
        )
        .unwrap()
    }

    #[rstest]
    #[case(true, json!([1.5, null, 3.5, null]), json!([1.5, 3.5]))]
    #[case(false, json!([null, 2.5, null, 4.5]), json!([2.5, 4.5]))]
    fn polarity(#[case] valid_when: bool, #[case] list: Value, #[case] projected: Value) {
        let array = masked(valid_when);
        assert_eq!(array.to_list().unwrap(), list);
        assert_eq!(array.project(None).unwrap().to_list().unwrap(), projected);
    }

    #[test]
    fn overlays_a_caller_mask() {
        let theirs = Index::new(buffer![0i8, 0, 1, 0]);
        let projected = masked(true).project(Some(&theirs)).unwrap();
        assert_eq!(projected.to_list().unwrap(), json!([1.5]));
    }

    #[test]
    fn converts_to_indexed_option() {
        let option = masked(false).to_indexed_option_array64().unwrap();
        assert_eq!(option.index().to_vec().unwrap(), vec![-1, 1, -1, 3]);
    }

    #[test]
    fn short_content_is_rejected() {
        let content = NumpyArray::new(buffer![1i32]);
        assert!(ByteMaskedArray::try_new(Index::new(buffer![0i8, 0]), content, true).is_err());
    }
}
