use std::sync::Arc;

use ragged_dtype::{Form, FormKind, IndexType, Parameters};
use ragged_error::RaggedResult;
use serde_json::Value;

use crate::backend::{BackendRef, Length};
use crate::content::{ByteMaskedArray, Content, IndexedOptionArray};
use crate::element::Element;
use crate::index::Index;

/// An option type whose elements are all present.
#[derive(Clone, Debug)]
pub struct UnmaskedArray {
    content: Arc<Content>,
    parameters: Parameters,
}

impl UnmaskedArray {
    pub fn new(content: impl Into<Content>) -> Self {
        Self {
            content: Arc::new(content.into()),
            parameters: Parameters::empty(),
        }
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn length(&self) -> Length {
        self.content.length()
    }

    pub fn backend(&self) -> BackendRef {
        self.content.backend()
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn form(&self) -> Form {
        Form::new(FormKind::Unmasked {
            content: Box::new(self.content.form()),
        })
        .with_parameters(self.parameters.clone())
    }

    pub(crate) fn element_at(&self, at: usize) -> RaggedResult<Element> {
        self.content.getitem_at(at as i64)
    }

    pub(crate) fn slice(&self, start: Length, stop: Length) -> RaggedResult<Self> {
        Ok(Self {
            content: Arc::new(self.content.slice(start, stop)?),
            parameters: self.parameters.clone(),
        })
    }

    pub(crate) fn carry(&self, carry: &Index, allow_lazy: bool) -> RaggedResult<Self> {
        Ok(Self {
            content: Arc::new(self.content.carry(carry, allow_lazy)?),
            parameters: self.parameters.clone(),
        })
    }

    pub fn project(&self, mask: Option<&Index>) -> RaggedResult<Content> {
        match mask {
            Some(mask) => ByteMaskedArray::try_new(mask.clone(), self.content.as_ref().clone(), false)?
                .project(None),
            None => Ok(self.content.as_ref().clone()),
        }
    }

    pub fn to_indexed_option_array64(&self) -> RaggedResult<IndexedOptionArray> {
        let index = Index::arange(self.length(), self.backend())?;
        Ok(
            IndexedOptionArray::try_new(index, self.content.as_ref().clone())?
                .with_parameters(self.parameters.clone()),
        )
    }

    pub fn to_byte_masked_array(&self) -> RaggedResult<ByteMaskedArray> {
        let mask = Index::zeros(IndexType::I8, self.length(), self.backend())?;
        Ok(
            ByteMaskedArray::try_new(mask, self.content.as_ref().clone(), false)?
                .with_parameters(self.parameters.clone()),
        )
    }

    /// An unmasked layer over another option or indexed layer adds nothing.
    pub fn simplify_optiontype(&self) -> RaggedResult<Content> {
        if self.content.is_option() || self.content.is_indexed() {
            Ok(self.content.as_ref().clone())
        } else {
            Ok(self.clone().into())
        }
    }

    pub fn to_typetracer(&self, forget_length: bool) -> Self {
        Self {
            content: Arc::new(self.content.to_typetracer(forget_length)),
            parameters: self.parameters.clone(),
        }
    }

    pub(crate) fn validity_error(&self, path: &str) -> Option<String> {
        if self.content.is_option() || self.content.is_indexed() {
            return Some(format!(
                "at {path} (UnmaskedArray): UnmaskedArray contains {}, the operation that made it might have forgotten to call 'simplify_optiontype()'",
                self.content.class_name()
            ));
        }
        self.content.validity_error(&format!("{path}.content"))
    }

    pub(crate) fn to_list(&self) -> RaggedResult<Value> {
        self.content.to_list()
    }

    pub fn nbytes(&self) -> usize {
        self.content.nbytes()
    }
}

#[cfg(test)]
mod test {
    use ragged_buffer::buffer;
    use serde_json::json;

    use super::*;
    use crate::content::NumpyArray;

    #[test]
    fn every_element_is_present() {
        let array = UnmaskedArray::new(NumpyArray::new(buffer![3u16, 4, 5]));
        assert_eq!(array.to_list().unwrap(), json!([3, 4, 5]));
        let option = array.to_indexed_option_array64().unwrap();
        assert_eq!(option.index().to_vec().unwrap(), vec![0, 1, 2]);
        let mask = Index::new(buffer![0i8, 1, 0]);
        assert_eq!(array.project(Some(&mask)).unwrap().to_list().unwrap(), json!([3, 5]));
    }
}
