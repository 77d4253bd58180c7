use std::sync::Arc;

use ragged_dtype::{Form, FormKind, IndexType, PType, Parameters};
use ragged_error::{NodeContext, RaggedResult, ragged_bail};
use serde_json::Value;

use crate::backend::{BackendRef, Length};
use crate::content::{ByteMaskedArray, Content, IndexedOptionArray};
use crate::element::Element;
use crate::index::Index;

/// An option layer with one mask bit per element, packed in `lsb_order` or msb order.
///
/// Most operations unpack the bits into a [`ByteMaskedArray`] first.
#[derive(Clone, Debug)]
pub struct BitMaskedArray {
    mask: Index,
    content: Arc<Content>,
    valid_when: bool,
    length: Length,
    lsb_order: bool,
    backend: BackendRef,
    parameters: Parameters,
}

impl BitMaskedArray {
    pub fn try_new(
        mask: Index,
        content: impl Into<Content>,
        valid_when: bool,
        length: usize,
        lsb_order: bool,
    ) -> RaggedResult<Self> {
        if mask.index_type() != IndexType::U8 {
            ragged_bail!("BitMaskedArray mask must be uint8, not {}", mask.index_type());
        }
        let content = content.into();
        if let Length::Known(bytes) = mask.length()
            && bytes * 8 < length
        {
            ragged_bail!("BitMaskedArray mask ({bytes} bytes) is too short for length {length}");
        }
        if let Length::Known(c) = content.length()
            && c < length
        {
            ragged_bail!("BitMaskedArray content ({c}) is shorter than its length ({length})");
        }
        let backend = mask.backend().combine(content.backend());
        Ok(Self {
            mask,
            content: Arc::new(content),
            valid_when,
            length: Length::Known(length),
            lsb_order,
            backend,
            parameters: Parameters::empty(),
        })
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// The same mask over another content of at least the same length.
    pub(crate) fn with_content(&self, content: Content) -> Self {
        Self {
            backend: self.backend.combine(content.backend()),
            content: Arc::new(content),
            ..self.clone()
        }
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

    pub fn lsb_order(&self) -> bool {
        self.lsb_order
    }

    pub fn length(&self) -> Length {
        self.length
    }

    pub fn backend(&self) -> BackendRef {
        self.backend
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn form(&self) -> Form {
        Form::new(FormKind::BitMasked {
            mask: IndexType::U8,
            valid_when: self.valid_when,
            lsb_order: self.lsb_order,
            content: Box::new(self.content.form()),
        })
        .with_parameters(self.parameters.clone())
    }

    pub(crate) fn element_at(&self, at: usize) -> RaggedResult<Element> {
        let Some(byte) = self.mask.get(at / 8)? else {
            return self.content.unknown_element();
        };
        let shift = if self.lsb_order { at % 8 } else { 7 - at % 8 };
        if ((byte >> shift) & 1 != 0) == self.valid_when {
            self.content.getitem_at(at as i64)
        } else {
            Ok(Element::Missing)
        }
    }

    /// Unpack the bits, keeping their polarity.
    pub fn to_byte_masked_array(&self) -> RaggedResult<ByteMaskedArray> {
        let [bytemask] = self
            .backend
            .run(
                "BitMaskedArray_to_ByteMaskedArray",
                [(PType::I8, self.length)],
                &[self.mask.data()],
                &[i64::from(self.lsb_order), self.length.as_scalar()],
            )
            .in_node("BitMaskedArray")?;
        let content = self.content.slice(Length::ZERO, self.length)?;
        Ok(ByteMaskedArray::try_new(
            Index::try_from_data(bytemask, self.backend)?,
            content,
            self.valid_when,
        )?
        .with_parameters(self.parameters.clone()))
    }

    pub fn to_indexed_option_array64(&self) -> RaggedResult<IndexedOptionArray> {
        self.to_byte_masked_array()?.to_indexed_option_array64()
    }

    pub(crate) fn slice(&self, start: Length, stop: Length) -> RaggedResult<ByteMaskedArray> {
        self.to_byte_masked_array()?.slice(start, stop)
    }

    pub(crate) fn carry(&self, carry: &Index, allow_lazy: bool) -> RaggedResult<ByteMaskedArray> {
        self.to_byte_masked_array()?.carry(carry, allow_lazy)
    }

    pub fn project(&self, mask: Option<&Index>) -> RaggedResult<Content> {
        self.to_byte_masked_array()?.project(mask)
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
            length: if forget_length {
                Length::Unknown
            } else {
                self.length
            },
            backend: BackendRef::typetracer(),
            ..self.clone()
        }
    }

    pub(crate) fn validity_error(&self, path: &str) -> Option<String> {
        if let (Length::Known(bytes), Length::Known(length)) = (self.mask.length(), self.length)
            && bytes * 8 < length
        {
            return Some(format!(
                "at {path} (BitMaskedArray): len(mask) * 8 < length"
            ));
        }
        if let (Length::Known(c), Length::Known(length)) = (self.content.length(), self.length)
            && c < length
        {
            return Some(format!(
                "at {path} (BitMaskedArray): len(content) < length"
            ));
        }
        if self.content.is_option() || self.content.is_indexed() {
            return Some(format!(
                "at {path} (BitMaskedArray): BitMaskedArray contains {}, the operation that made it might have forgotten to call 'simplify_optiontype()'",
                self.content.class_name()
            ));
        }
        self.content.validity_error(&format!("{path}.content"))
    }

    pub(crate) fn to_list(&self) -> RaggedResult<Value> {
        self.to_byte_masked_array()?.to_list()
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

    #[rstest]
    #[case(true, json!([0, null, 2, null, null, 5, null, 7, 8]))]
    #[case(false, json!([0, null, 2, null, null, 5, null, 7, null]))]
    fn bit_order(#[case] lsb_order: bool, #[case] expected: Value) {
        // lsb: bits 0, 2, 5, 7 and 8 set; msb: the same positions counted from the top bit
        let mask = if lsb_order {
            Index::new(buffer![0b1010_0101u8, 0b0000_0001])
        } else {
            Index::new(buffer![0b1010_0101u8, 0b0000_0000])
        };
        let array = BitMaskedArray::try_new(
            mask,
            NumpyArray::new((0i64..9).collect::<ragged_buffer::Buffer<i64>>()),
            true,
            9,
            lsb_order,
        )
        .unwrap();
        assert_eq!(array.to_list().unwrap(), expected);
        let content = Content::from(array);
        for (i, value) in expected.as_array().unwrap().iter().enumerate() {
            assert_eq!(&content.getitem_at(i as i64).unwrap().to_json().unwrap(), value);
        }
    }

    #[test]
    fn unpacking_keeps_polarity() {
        let array = BitMaskedArray::try_new(
            Index::new(buffer![0b0000_0010u8]),
            NumpyArray::new(buffer![1i32, 2, 3]),
            false,
            3,
            true,
        )
        .unwrap();
        let bytes = array.to_byte_masked_array().unwrap();
        assert!(!bytes.valid_when());
        assert_eq!(bytes.mask().to_vec().unwrap(), vec![0, 1, 0]);
        assert_eq!(Content::from(bytes).to_list().unwrap(), json!([1, null, 3]));
    }
}
