use ragged_dtype::{Form, FormKind, PType, Parameters};
use ragged_error::{RaggedResult, ragged_bail};
use serde_json::Value;

use crate::backend::{BackendRef, Length};
use crate::content::NumpyArray;
use crate::element::Element;
use crate::index::Index;

/// An array with no elements and no type. It merges with anything.
#[derive(Clone, Debug, Default)]
pub struct EmptyArray {
    backend: BackendRef,
    parameters: Parameters,
}

impl EmptyArray {
    pub fn new(backend: BackendRef) -> Self {
        Self {
            backend,
            parameters: Parameters::empty(),
        }
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn length(&self) -> Length {
        Length::ZERO
    }

    pub fn backend(&self) -> BackendRef {
        self.backend
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn form(&self) -> Form {
        Form::new(FormKind::Empty).with_parameters(self.parameters.clone())
    }

    /// An empty leaf of the given type, for operations that need a concrete dtype.
    pub fn to_numpy(&self, ptype: PType) -> RaggedResult<NumpyArray> {
        let data = self.backend.allocate(ptype, Length::ZERO)?.freeze();
        Ok(NumpyArray::from_data(data, self.backend).with_parameters(self.parameters.clone()))
    }

    pub(crate) fn element_at(&self, at: usize) -> RaggedResult<Element> {
        ragged_bail!(Index: "EmptyArray", Some(at as i64), "an empty array has no element {at}")
    }

    pub(crate) fn carry(&self, carry: &Index) -> RaggedResult<Self> {
        if let Length::Known(n) = carry.length()
            && n > 0
        {
            ragged_bail!(Index: "EmptyArray", Some(0), "cannot carry {n} positions into an empty array");
        }
        Ok(self.clone())
    }

    pub(crate) fn slice(&self, start: Length, stop: Length) -> RaggedResult<Self> {
        if let (Length::Known(start), Length::Known(stop)) = (start, stop)
            && stop > start
        {
            ragged_bail!(Index: "EmptyArray", Some(start as i64), "cannot window [{start}, {stop}) of an empty array");
        }
        Ok(self.clone())
    }

    /// The length of an empty array is always known.
    pub fn to_typetracer(&self, _forget_length: bool) -> Self {
        Self {
            backend: BackendRef::typetracer(),
            parameters: self.parameters.clone(),
        }
    }

    pub(crate) fn to_list(&self) -> RaggedResult<Value> {
        Ok(Value::Array(vec![]))
    }

    pub fn nbytes(&self) -> usize {
        0
    }
}
