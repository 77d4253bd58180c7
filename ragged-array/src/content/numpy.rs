use ragged_buffer::Buffer;
use ragged_dtype::{Form, FormKind, PType, Parameters};
use ragged_error::{NodeContext, RaggedResult};
use serde_json::Value;

use crate::backend::{BackendRef, Length};
use crate::data::{Data, Primitive};
use crate::element::{Element, Scalar};
use crate::index::Index;

/// A leaf: one flat buffer of primitive values.
#[derive(Clone, Debug)]
pub struct NumpyArray {
    data: Data,
    backend: BackendRef,
    parameters: Parameters,
}

impl NumpyArray {
    pub fn new<T: Primitive>(buffer: Buffer<T>) -> Self {
        Self::from_data(Data::from(buffer), BackendRef::cpu())
    }

    pub fn from_data(data: Data, backend: BackendRef) -> Self {
        Self {
            data,
            backend,
            parameters: Parameters::empty(),
        }
    }

    /// UTF-8 characters, the leaf of a string list.
    pub fn chars(text: &str) -> Self {
        Self::new(Buffer::copy_from(text.as_bytes()))
            .with_parameters(Parameters::empty().with("__array__", "char"))
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn data(&self) -> &Data {
        &self.data
    }

    pub fn ptype(&self) -> PType {
        self.data.ptype()
    }

    pub fn length(&self) -> Length {
        self.data.length()
    }

    pub fn backend(&self) -> BackendRef {
        self.backend
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn form(&self) -> Form {
        Form::new(FormKind::Numpy {
            primitive: self.ptype(),
        })
        .with_parameters(self.parameters.clone())
    }

    pub(crate) fn element_at(&self, at: usize) -> RaggedResult<Element> {
        Ok(match self.data.values() {
            Some(values) => Element::Scalar(Scalar::from_values(values, at)),
            None => Element::Unknown(self.ptype()),
        })
    }

    pub(crate) fn slice(&self, start: Length, stop: Length) -> RaggedResult<Self> {
        Ok(Self {
            data: self.data.slice(start, stop)?,
            backend: self.backend,
            parameters: self.parameters.clone(),
        })
    }

    pub(crate) fn carry(&self, carry: &Index) -> RaggedResult<Self> {
        let backend = self.backend.combine(carry.backend());
        let [data] = backend
            .run(
                "NumpyArray_carry",
                [(self.ptype(), carry.length())],
                &[&self.data, carry.data()],
                &[],
            )
            .in_node("NumpyArray")?;
        Ok(Self {
            data,
            backend,
            parameters: self.parameters.clone(),
        })
    }

    /// Positions of the nonzero elements of a boolean leaf.
    pub(crate) fn nonzero(&self) -> RaggedResult<Index> {
        let count = self
            .backend
            .run_count("NumpyArray_nonzero_length", &[&self.data], &[])?;
        let [positions] = self.backend.run(
            "NumpyArray_nonzero",
            [(PType::I64, count)],
            &[&self.data],
            &[],
        )?;
        Index::try_from_data(positions, self.backend)
    }

    pub fn to_typetracer(&self, forget_length: bool) -> Self {
        let length = if forget_length {
            Length::Unknown
        } else {
            self.length()
        };
        Self {
            data: Data::Abstract {
                ptype: self.ptype(),
                length,
            },
            backend: BackendRef::typetracer(),
            parameters: self.parameters.clone(),
        }
    }

    pub(crate) fn to_list(&self) -> RaggedResult<Value> {
        let values = self.data.require_values("to_list")?;
        if self.parameters.is_char_like() {
            let bytes = values.to_le_bytes();
            return Ok(Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        }
        Ok(Value::Array(
            (0..values.len())
                .map(|i| Scalar::from_values(values, i).to_json())
                .collect(),
        ))
    }

    pub fn nbytes(&self) -> usize {
        self.data.values().map_or(0, |values| values.nbytes())
    }
}

#[cfg(test)]
mod test {
    use ragged_buffer::buffer;
    use serde_json::json;

    use super::*;

    #[test]
    fn carry_gathers_values() {
        let array = NumpyArray::new(buffer![1.1f64, 2.2, 3.3]);
        let carried = array.carry(&Index::from_i64s([2, 2, 0])).unwrap();
        assert_eq!(carried.to_list().unwrap(), json!([3.3, 3.3, 1.1]));
        assert!(array.carry(&Index::from_i64s([3])).unwrap_err().is_index_error());
    }

    #[test]
    fn chars_render_as_text() {
        assert_eq!(NumpyArray::chars("hey").to_list().unwrap(), json!("hey"));
    }
}
