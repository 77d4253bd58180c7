use std::sync::Arc;

use ragged_dtype::{Form, FormKind, IndexType, PType, Parameters};
use ragged_error::{NodeContext, RaggedResult, ragged_bail};
use serde_json::Value;

use crate::backend::{BackendRef, Length};
use crate::content::list_offset::{last_offset, render_lists};
use crate::content::{Content, ListOffsetArray};
use crate::element::Element;
use crate::index::Index;

/// Variable-length lists with independent bounds: list `i` is
/// `content[starts[i]..stops[i]]`. Lists may overlap, repeat or leave gaps.
#[derive(Clone, Debug)]
pub struct ListArray {
    starts: Index,
    stops: Index,
    content: Arc<Content>,
    backend: BackendRef,
    parameters: Parameters,
}

impl ListArray {
    pub fn try_new(starts: Index, stops: Index, content: impl Into<Content>) -> RaggedResult<Self> {
        if starts.index_type() != stops.index_type() {
            ragged_bail!(
                "ListArray starts ({}) and stops ({}) must have the same type",
                starts.index_type(),
                stops.index_type()
            );
        }
        if !matches!(
            starts.index_type(),
            IndexType::I32 | IndexType::U32 | IndexType::I64
        ) {
            ragged_bail!(
                "ListArray starts must be int32, uint32 or int64, not {}",
                starts.index_type()
            );
        }
        if let (Length::Known(n), Length::Known(m)) = (starts.length(), stops.length())
            && m < n
        {
            ragged_bail!("ListArray stops ({m}) is shorter than starts ({n})");
        }
        let content = content.into();
        let backend = starts
            .backend()
            .combine(stops.backend())
            .combine(content.backend());
        Ok(Self {
            starts,
            stops,
            content: Arc::new(content),
            backend,
            parameters: Parameters::empty(),
        })
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn starts(&self) -> &Index {
        &self.starts
    }

    pub fn stops(&self) -> &Index {
        &self.stops
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn length(&self) -> Length {
        self.starts.length()
    }

    pub fn backend(&self) -> BackendRef {
        self.backend
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn form(&self) -> Form {
        Form::new(FormKind::List {
            starts: self.starts.index_type(),
            stops: self.stops.index_type(),
            content: Box::new(self.content.form()),
        })
        .with_parameters(self.parameters.clone())
    }

    pub(crate) fn element_at(&self, at: usize) -> RaggedResult<Element> {
        let start = self.starts.get_length(at)?;
        let stop = self.stops.get_length(at)?;
        Ok(Element::Array(self.content.slice(start, stop)?))
    }

    pub(crate) fn slice(&self, start: Length, stop: Length) -> RaggedResult<Self> {
        Ok(Self {
            starts: self.starts.slice(start, stop)?,
            stops: self.stops.slice(start, stop)?,
            ..self.clone()
        })
    }

    pub(crate) fn carry(&self, carry: &Index) -> RaggedResult<Self> {
        let backend = self.backend.combine(carry.backend());
        let stops = self.stops.slice(Length::ZERO, self.length())?;
        let [nextstarts, nextstops] = backend
            .run(
                "ListArray_getitem_carry",
                [
                    (self.starts.ptype(), carry.length()),
                    (self.starts.ptype(), carry.length()),
                ],
                &[self.starts.data(), stops.data(), carry.data()],
                &[],
            )
            .in_node("ListArray")?;
        Ok(Self {
            starts: Index::try_from_data(nextstarts, backend)?,
            stops: Index::try_from_data(nextstops, backend)?,
            backend,
            ..self.clone()
        })
    }

    /// Zero-based 64-bit offsets with the content gathered into list order.
    pub fn to_list_offset_array64(&self, _start_at_zero: bool) -> RaggedResult<ListOffsetArray> {
        let stops = self.stops.slice(Length::ZERO, self.length())?;
        let [offsets] = self
            .backend
            .run(
                "ListArray_compact_offsets",
                [(PType::I64, self.length() + 1)],
                &[self.starts.data(), stops.data()],
                &[],
            )
            .in_node("ListArray")?;
        let offsets = Index::try_from_data(offsets, self.backend)?;
        let [nextcarry] = self
            .backend
            .run(
                "ListArray_compact_carry",
                [(PType::I64, last_offset(&offsets)?)],
                &[self.starts.data(), stops.data()],
                &[],
            )
            .in_node("ListArray")?;
        let content = self
            .content
            .carry(&Index::try_from_data(nextcarry, self.backend)?, true)?;
        Ok(ListOffsetArray::try_new(offsets, content)?.with_parameters(self.parameters.clone()))
    }

    pub fn to_typetracer(&self, forget_length: bool) -> Self {
        Self {
            starts: self.starts.to_typetracer(forget_length),
            stops: self.stops.to_typetracer(forget_length),
            content: Arc::new(self.content.to_typetracer(forget_length)),
            backend: BackendRef::typetracer(),
            parameters: self.parameters.clone(),
        }
    }

    pub(crate) fn validity_error(&self, path: &str) -> Option<String> {
        if let Err(err) = self.backend.check(
            "ListArray_validity",
            &[self.starts.data(), self.stops.data()],
            &[self.content.length().as_scalar()],
        ) {
            return Some(format!("at {path} (ListArray): {}", err.message()));
        }
        self.content.validity_error(&format!("{path}.content"))
    }

    pub(crate) fn to_list(&self) -> RaggedResult<Value> {
        let starts = self.starts.to_vec()?;
        let stops = self.stops.to_vec()?;
        render_lists(&starts, &stops[..starts.len()], &self.content, &self.parameters)
    }

    pub fn nbytes(&self) -> usize {
        self.starts.nbytes() + self.stops.nbytes() + self.content.nbytes()
    }
}

#[cfg(test)]
mod test {
    use ragged_buffer::buffer;
    use serde_json::json;

    use super::*;
    use crate::content::NumpyArray;

    fn lists() -> ListArray {
        ListArray::try_new(
            Index::new(buffer![4i64, 100, 1]),
            Index::new(buffer![7i64, 100, 3, 200]),
            NumpyArray::new(buffer![6.6f64, 4.4, 5.5, 7.7, 1.1, 2.2, 3.3, 8.8]),
        )
        .unwrap()
    }

    #[test]
    fn lists_may_overlap_and_leave_gaps() {
        assert_eq!(
            lists().to_list().unwrap(),
            json!([[1.1, 2.2, 3.3], [], [4.4, 5.5]])
        );
    }

    #[test]
    fn compacting_gathers_in_list_order() {
        let compact = lists().to_list_offset_array64(true).unwrap();
        assert_eq!(compact.offsets().to_vec().unwrap(), vec![0, 3, 3, 5]);
        assert_eq!(
            compact.content().to_list().unwrap(),
            json!([1.1, 2.2, 3.3, 4.4, 5.5])
        );
    }

    #[test]
    fn mismatched_types_are_rejected() {
        let content = NumpyArray::new(buffer![1i64]);
        assert!(
            ListArray::try_new(Index::new(buffer![0i32]), Index::new(buffer![1i64]), content).is_err()
        );
    }
}
