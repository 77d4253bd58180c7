use std::sync::Arc;

use ragged_dtype::{Form, FormKind, IndexType, PType, Parameters};
use ragged_error::{NodeContext, RaggedResult, ragged_bail};
use serde_json::Value;

use crate::backend::{BackendRef, Length};
use crate::content::indexed::list_items;
use crate::content::{Content, ListArray};
use crate::element::Element;
use crate::index::Index;

/// Variable-length lists: list `i` is `content[offsets[i]..offsets[i + 1]]`.
#[derive(Clone, Debug)]
pub struct ListOffsetArray {
    offsets: Index,
    content: Arc<Content>,
    backend: BackendRef,
    parameters: Parameters,
}

impl ListOffsetArray {
    pub fn try_new(offsets: Index, content: impl Into<Content>) -> RaggedResult<Self> {
        if !matches!(
            offsets.index_type(),
            IndexType::I32 | IndexType::U32 | IndexType::I64
        ) {
            ragged_bail!(
                "ListOffsetArray offsets must be int32, uint32 or int64, not {}",
                offsets.index_type()
            );
        }
        if offsets.length() == Length::ZERO {
            ragged_bail!("ListOffsetArray offsets must have at least one entry");
        }
        let content = content.into();
        let backend = offsets.backend().combine(content.backend());
        Ok(Self {
            offsets,
            content: Arc::new(content),
            backend,
            parameters: Parameters::empty(),
        })
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn offsets(&self) -> &Index {
        &self.offsets
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn length(&self) -> Length {
        self.offsets.length() - 1
    }

    pub fn backend(&self) -> BackendRef {
        self.backend
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn starts(&self) -> RaggedResult<Index> {
        self.offsets.slice(Length::ZERO, self.length())
    }

    pub fn stops(&self) -> RaggedResult<Index> {
        self.offsets.slice(Length::Known(1), self.offsets.length())
    }

    pub fn form(&self) -> Form {
        Form::new(FormKind::ListOffset {
            offsets: self.offsets.index_type(),
            content: Box::new(self.content.form()),
        })
        .with_parameters(self.parameters.clone())
    }

    pub(crate) fn element_at(&self, at: usize) -> RaggedResult<Element> {
        let start = self.offsets.get_length(at)?;
        let stop = self.offsets.get_length(at + 1)?;
        Ok(Element::Array(self.content.slice(start, stop)?))
    }

    pub(crate) fn slice(&self, start: Length, stop: Length) -> RaggedResult<Self> {
        Ok(Self {
            offsets: self.offsets.slice(start, stop + 1)?,
            ..self.clone()
        })
    }

    /// Gathering lists breaks contiguity, so the result is a [`ListArray`] over the same
    /// content.
    pub(crate) fn carry(&self, carry: &Index) -> RaggedResult<ListArray> {
        let starts = self.starts()?;
        let stops = self.stops()?;
        let backend = self.backend.combine(carry.backend());
        let [nextstarts, nextstops] = backend
            .run(
                "ListArray_getitem_carry",
                [
                    (self.offsets.ptype(), carry.length()),
                    (self.offsets.ptype(), carry.length()),
                ],
                &[starts.data(), stops.data(), carry.data()],
                &[],
            )
            .in_node("ListOffsetArray")?;
        Ok(ListArray::try_new(
            Index::try_from_data(nextstarts, backend)?,
            Index::try_from_data(nextstops, backend)?,
            self.content.as_ref().clone(),
        )?
        .with_parameters(self.parameters.clone()))
    }

    /// The same lists with 64-bit offsets. With `start_at_zero`, the offsets are rebased
    /// and the content trimmed so that the first list starts at position zero.
    pub fn to_list_offset_array64(&self, start_at_zero: bool) -> RaggedResult<ListOffsetArray> {
        let first = self.offsets.get(0)?;
        if !start_at_zero || first == Some(0) {
            return Ok(Self {
                offsets: self.offsets.to64()?,
                ..self.clone()
            });
        }
        let [offsets] = self
            .backend
            .run(
                "ListOffsetArray_compact_offsets",
                [(PType::I64, self.offsets.length())],
                &[self.offsets.data()],
                &[],
            )
            .in_node("ListOffsetArray")?;
        let start = self.offsets.get_length(0)?;
        let stop = last_offset(&self.offsets)?;
        Ok(Self {
            offsets: Index::try_from_data(offsets, self.backend)?,
            content: Arc::new(self.content.slice(start, stop)?),
            ..self.clone()
        })
    }

    pub fn to_typetracer(&self, forget_length: bool) -> Self {
        Self {
            offsets: self.offsets.to_typetracer(forget_length),
            content: Arc::new(self.content.to_typetracer(forget_length)),
            backend: BackendRef::typetracer(),
            parameters: self.parameters.clone(),
        }
    }

    pub(crate) fn validity_error(&self, path: &str) -> Option<String> {
        let checked = self.starts().and_then(|starts| {
            self.backend.check(
                "ListArray_validity",
                &[starts.data(), self.stops()?.data()],
                &[self.content.length().as_scalar()],
            )
        });
        if let Err(err) = checked {
            return Some(format!("at {path} (ListOffsetArray): {}", err.message()));
        }
        self.content.validity_error(&format!("{path}.content"))
    }

    pub(crate) fn to_list(&self) -> RaggedResult<Value> {
        let offsets = self.offsets.to_vec()?;
        let (starts, stops) = match offsets.split_first() {
            Some((_, stops)) => (&offsets[..stops.len()], stops),
            None => (&offsets[..0], &offsets[..0]),
        };
        render_lists(starts, stops, &self.content, &self.parameters)
    }

    pub fn nbytes(&self) -> usize {
        self.offsets.nbytes() + self.content.nbytes()
    }
}

/// The last entry of an offsets index, as a length.
pub(crate) fn last_offset(offsets: &Index) -> RaggedResult<Length> {
    match offsets.length() {
        Length::Known(0) => ragged_bail!(AssertionFailed: "offsets must have at least one entry"),
        Length::Known(n) => offsets.get_length(n - 1),
        Length::Unknown => Ok(Length::Unknown),
    }
}

/// Render lists `content[starts[i]..stops[i]]`, as text when `parameters` mark them as
/// strings.
pub(crate) fn render_lists(
    starts: &[i64],
    stops: &[i64],
    content: &Content,
    parameters: &Parameters,
) -> RaggedResult<Value> {
    let bound = |value: i64| Length::Known(usize::try_from(value).unwrap_or(0));
    if parameters.is_string_like() {
        return starts
            .iter()
            .zip(stops)
            .map(|(&start, &stop)| content.slice(bound(start), bound(stop))?.to_list())
            .collect::<RaggedResult<Vec<_>>>()
            .map(Value::Array);
    }
    let items = list_items(content.to_list()?)?;
    starts
        .iter()
        .zip(stops)
        .map(|(&start, &stop)| {
            let (start, stop) = (start as usize, stop as usize);
            match items.get(start..stop) {
                Some(window) => Ok(Value::Array(window.to_vec())),
                None if start == stop => Ok(Value::Array(vec![])),
                None => ragged_bail!(
                    Index: "ListArray",
                    Some(start as i64),
                    "list [{start}, {stop}) exceeds content of length {}",
                    items.len()
                ),
            }
        })
        .collect::<RaggedResult<Vec<_>>>()
        .map(Value::Array)
}

#[cfg(test)]
mod test {
    use ragged_buffer::buffer;
    use serde_json::json;

    use super::*;
    use crate::content::NumpyArray;

    fn lists() -> ListOffsetArray {
        ListOffsetArray::try_new(
            Index::new(buffer![0i32, 3, 3, 5]),
            NumpyArray::new(buffer![1.1f64, 2.2, 3.3, 4.4, 5.5, 6.6]),
        )
        .unwrap()
    }

    #[test]
    fn renders_nested_lists() {
        assert_eq!(
            lists().to_list().unwrap(),
            json!([[1.1, 2.2, 3.3], [], [4.4, 5.5]])
        );
        let element = Content::from(lists()).getitem_at(-1).unwrap();
        assert_eq!(element.to_json().unwrap(), json!([4.4, 5.5]));
    }

    #[test]
    fn carry_produces_list_array() {
        let carried = lists().carry(&Index::from_i64s([2, 0])).unwrap();
        assert_eq!(carried.starts().to_vec().unwrap(), vec![3, 0]);
        assert_eq!(
            Content::from(carried).to_list().unwrap(),
            json!([[4.4, 5.5], [1.1, 2.2, 3.3]])
        );
    }

    #[test]
    fn compacting_rebases_offsets() {
        let window = lists().slice(Length::Known(2), Length::Known(3)).unwrap();
        let compact = window.to_list_offset_array64(true).unwrap();
        assert_eq!(compact.offsets().to_vec().unwrap(), vec![0, 2]);
        assert_eq!(compact.content().length(), Length::Known(2));
        assert_eq!(compact.to_list().unwrap(), json!([[4.4, 5.5]]));
    }

    #[test]
    fn strings_render_as_text() {
        let strings = ListOffsetArray::try_new(Index::from_i64s([0, 3, 3, 8]), NumpyArray::chars("onethree"))
            .unwrap()
            .with_parameters(Parameters::empty().with("__array__", "string"));
        assert_eq!(strings.to_list().unwrap(), json!(["one", "", "three"]));
    }

    #[test]
    fn decreasing_offsets_are_invalid() {
        let bad = ListOffsetArray::try_new(
            Index::from_i64s([0, 4, 2]),
            NumpyArray::new(buffer![1u8, 2, 3, 4]),
        )
        .unwrap();
        let message = Content::from(bad).validity_error("layout").unwrap();
        assert!(message.starts_with("at layout (ListOffsetArray)"));
    }
}
