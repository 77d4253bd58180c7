use std::sync::Arc;

use ragged_dtype::{Form, FormKind, PType, Parameters};
use ragged_error::{NodeContext, RaggedResult};
use serde_json::Value;

use crate::backend::{BackendRef, Length};
use crate::content::list_offset::render_lists;
use crate::content::{Content, ListOffsetArray};
use crate::element::Element;
use crate::index::Index;

/// Fixed-size lists: list `i` is `content[i * size..(i + 1) * size]`.
///
/// With `size == 0` the content says nothing about the number of lists, so the length is
/// carried explicitly.
#[derive(Clone, Debug)]
pub struct RegularArray {
    content: Arc<Content>,
    size: usize,
    length: Length,
    parameters: Parameters,
}

impl RegularArray {
    /// `zeros_length` is the number of lists when `size` is zero and ignored otherwise.
    pub fn try_new(content: impl Into<Content>, size: usize, zeros_length: usize) -> RaggedResult<Self> {
        let content = content.into();
        let length = match (size, content.length()) {
            (0, _) => Length::Known(zeros_length),
            (_, Length::Known(n)) => Length::Known(n / size),
            (_, Length::Unknown) => Length::Unknown,
        };
        Ok(Self::with_length(content, size, length))
    }

    pub(crate) fn with_length(content: impl Into<Content>, size: usize, length: Length) -> Self {
        Self {
            content: Arc::new(content.into()),
            size,
            length,
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

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn length(&self) -> Length {
        self.length
    }

    pub fn backend(&self) -> BackendRef {
        self.content.backend()
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn form(&self) -> Form {
        Form::new(FormKind::Regular {
            size: self.size,
            content: Box::new(self.content.form()),
        })
        .with_parameters(self.parameters.clone())
    }

    pub(crate) fn element_at(&self, at: usize) -> RaggedResult<Element> {
        let start = Length::Known(at * self.size);
        Ok(Element::Array(
            self.content.slice(start, start + self.size)?,
        ))
    }

    pub(crate) fn slice(&self, start: Length, stop: Length) -> RaggedResult<Self> {
        Ok(Self {
            content: Arc::new(self.content.slice(start * self.size, stop * self.size)?),
            length: stop - start,
            ..self.clone()
        })
    }

    pub(crate) fn carry(&self, carry: &Index, allow_lazy: bool) -> RaggedResult<Self> {
        let backend = self.backend().combine(carry.backend());
        let [nextcarry] = backend
            .run(
                "RegularArray_getitem_carry",
                [(PType::I64, carry.length() * self.size)],
                &[carry.data()],
                &[self.size as i64, self.length.as_scalar()],
            )
            .in_node("RegularArray")?;
        let content = self
            .content
            .carry(&Index::try_from_data(nextcarry, backend)?, allow_lazy)?;
        Ok(Self {
            content: Arc::new(content),
            length: carry.length(),
            ..self.clone()
        })
    }

    pub fn to_list_offset_array64(&self, _start_at_zero: bool) -> RaggedResult<ListOffsetArray> {
        let [offsets] = self
            .backend()
            .run(
                "RegularArray_compact_offsets",
                [(PType::I64, self.length + 1)],
                &[],
                &[self.size as i64],
            )
            .in_node("RegularArray")?;
        let content = self.content.slice(Length::ZERO, self.length * self.size)?;
        Ok(
            ListOffsetArray::try_new(Index::try_from_data(offsets, self.backend())?, content)?
                .with_parameters(self.parameters.clone()),
        )
    }

    pub fn to_typetracer(&self, forget_length: bool) -> Self {
        Self {
            content: Arc::new(self.content.to_typetracer(forget_length)),
            length: if forget_length {
                Length::Unknown
            } else {
                self.length
            },
            ..self.clone()
        }
    }

    pub(crate) fn validity_error(&self, path: &str) -> Option<String> {
        if let (Length::Known(c), Length::Known(n)) = (self.content.length(), self.length)
            && c < n * self.size
        {
            return Some(format!(
                "at {path} (RegularArray): len(content) < length * size"
            ));
        }
        self.content.validity_error(&format!("{path}.content"))
    }

    pub(crate) fn to_list(&self) -> RaggedResult<Value> {
        let length = self.length.require("RegularArray")? as i64;
        let size = self.size as i64;
        let starts: Vec<i64> = (0..length).map(|i| i * size).collect();
        let stops: Vec<i64> = starts.iter().map(|s| s + size).collect();
        render_lists(&starts, &stops, &self.content, &self.parameters)
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
    fn trailing_content_is_ignored() {
        let array = RegularArray::try_new(NumpyArray::new(buffer![1i32, 2, 3, 4, 5, 6, 7]), 3, 0).unwrap();
        assert_eq!(array.length(), Length::Known(2));
        assert_eq!(array.to_list().unwrap(), json!([[1, 2, 3], [4, 5, 6]]));
    }

    #[test]
    fn zero_size_keeps_its_length() {
        let array = RegularArray::try_new(NumpyArray::new(buffer![1i32, 2]), 0, 3).unwrap();
        assert_eq!(array.length(), Length::Known(3));
        assert_eq!(array.to_list().unwrap(), json!([[], [], []]));
        let offsets = array.to_list_offset_array64(true).unwrap();
        assert_eq!(offsets.offsets().to_vec().unwrap(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn carry_repeats_rows() {
        let array = RegularArray::try_new(NumpyArray::new(buffer![1i32, 2, 3, 4]), 2, 0).unwrap();
        let carried = array.carry(&Index::from_i64s([1, 1, 0]), false).unwrap();
        assert_eq!(carried.to_list().unwrap(), json!([[3, 4], [3, 4], [1, 2]]));
        assert!(array.carry(&Index::from_i64s([2]), false).is_err());
    }
}
