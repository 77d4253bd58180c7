use std::sync::Arc;

use itertools::Itertools;
use ragged_dtype::{Form, FormKind, Parameters};
use ragged_error::{NodeContext, RaggedResult, ragged_bail, ragged_err};
use serde_json::{Map, Value};

use crate::backend::{BackendRef, Length};
use crate::content::indexed::list_items;
use crate::content::{Content, IndexedArray};
use crate::element::Element;
use crate::index::Index;

/// Records with named fields, or tuples with positional fields.
///
/// Every field holds at least `length` elements; only the first `length` are visible.
#[derive(Clone, Debug)]
pub struct RecordArray {
    contents: Vec<Arc<Content>>,
    fields: Option<Vec<String>>,
    length: Length,
    backend: BackendRef,
    parameters: Parameters,
}

impl RecordArray {
    /// Without an explicit `length`, the record is as long as its shortest field. A record
    /// with no fields needs an explicit length.
    pub fn try_new(
        contents: Vec<Content>,
        fields: Option<Vec<String>>,
        length: Option<usize>,
    ) -> RaggedResult<Self> {
        if let Some(fields) = &fields
            && fields.len() != contents.len()
        {
            ragged_bail!(
                "RecordArray has {} field names for {} contents",
                fields.len(),
                contents.len()
            );
        }
        let length = match length {
            Some(length) => Length::Known(length),
            None if contents.is_empty() => {
                ragged_bail!("a RecordArray with no contents needs an explicit length")
            }
            None => contents
                .iter()
                .map(Content::length)
                .reduce(Length::min)
                .unwrap_or(Length::ZERO),
        };
        for (i, content) in contents.iter().enumerate() {
            if let (Length::Known(c), Length::Known(n)) = (content.length(), length)
                && c < n
            {
                ragged_bail!("RecordArray content {i} has length {c}, shorter than {n}");
            }
        }
        let backend = BackendRef::common(contents.iter().map(Content::backend));
        Ok(Self {
            contents: contents.into_iter().map(Arc::new).collect(),
            fields,
            length,
            backend,
            parameters: Parameters::empty(),
        })
    }

    pub(crate) fn with_length(contents: Vec<Content>, fields: Option<Vec<String>>, length: Length) -> Self {
        Self {
            backend: BackendRef::common(contents.iter().map(Content::backend)),
            contents: contents.into_iter().map(Arc::new).collect(),
            fields,
            length,
            parameters: Parameters::empty(),
        }
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
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

    pub fn is_tuple(&self) -> bool {
        self.fields.is_none()
    }

    pub fn num_fields(&self) -> usize {
        self.contents.len()
    }

    /// Field names; a tuple's fields are named by position.
    pub fn fields(&self) -> Vec<String> {
        match &self.fields {
            Some(fields) => fields.clone(),
            None => (0..self.contents.len()).map(|i| i.to_string()).collect(),
        }
    }

    pub(crate) fn raw_fields(&self) -> Option<&[String]> {
        self.fields.as_deref()
    }

    /// Position of the field called `name`.
    pub fn field_index(&self, name: &str) -> RaggedResult<usize> {
        let found = match &self.fields {
            Some(fields) => fields.iter().position(|f| f == name),
            None => name.parse::<usize>().ok().filter(|&i| i < self.contents.len()),
        };
        found.ok_or_else(|| {
            ragged_err!(
                Index: "RecordArray",
                None,
                "no field {name:?} in record with fields [{}]",
                self.fields().join(", ")
            )
        })
    }

    /// The fields as stored, possibly longer than the record.
    pub fn contents(&self) -> impl Iterator<Item = &Content> {
        self.contents.iter().map(Arc::as_ref)
    }

    /// Field `i`, trimmed to the record's length.
    pub fn content(&self, i: usize) -> RaggedResult<Content> {
        let content = self.contents.get(i).ok_or_else(|| {
            ragged_err!(Index: "RecordArray", Some(i as i64), "no field at position {i}")
        })?;
        if content.length() == self.length {
            Ok(content.as_ref().clone())
        } else {
            content.slice(Length::ZERO, self.length)
        }
    }

    pub fn form(&self) -> Form {
        Form::new(FormKind::Record {
            contents: self.contents.iter().map(|c| c.form()).collect(),
            fields: self.fields.clone(),
        })
        .with_parameters(self.parameters.clone())
    }

    pub(crate) fn element_at(&self, at: usize) -> RaggedResult<Element> {
        Ok(Element::Record(self.clone(), at))
    }

    /// Row `at` as a JSON object, or an array for tuples.
    pub fn row_to_json(&self, at: usize) -> RaggedResult<Value> {
        let values: Vec<Value> = self
            .contents
            .iter()
            .map(|c| c.getitem_at(at as i64)?.to_json())
            .try_collect()?;
        Ok(self.assemble(values))
    }

    fn assemble(&self, values: Vec<Value>) -> Value {
        match &self.fields {
            Some(fields) => Value::Object(fields.iter().cloned().zip(values).collect::<Map<_, _>>()),
            None => Value::Array(values),
        }
    }

    pub(crate) fn slice(&self, start: Length, stop: Length) -> RaggedResult<Self> {
        Ok(Self {
            contents: self
                .contents
                .iter()
                .map(|c| c.slice(start, stop).map(Arc::new))
                .try_collect()?,
            length: stop - start,
            ..self.clone()
        })
    }

    /// Lazily, the carry is only checked and kept in an [`IndexedArray`] over the record.
    pub(crate) fn carry(&self, carry: &Index, allow_lazy: bool) -> RaggedResult<Content> {
        if allow_lazy {
            self.backend
                .check(
                    "Index_validate_carry",
                    &[carry.data()],
                    &[self.length.as_scalar()],
                )
                .in_node("RecordArray")?;
            log::debug!("deferring a carry of {} rows into a RecordArray", carry.length());
            return Ok(IndexedArray::try_new(carry.clone(), self.clone())?.into());
        }
        let contents: Vec<Arc<Content>> = self
            .contents
            .iter()
            .map(|c| c.carry(carry, false).map(Arc::new))
            .try_collect()?;
        Ok(Self {
            contents,
            length: carry.length(),
            backend: self.backend.combine(carry.backend()),
            ..self.clone()
        }
        .into())
    }

    pub fn to_typetracer(&self, forget_length: bool) -> Self {
        Self {
            contents: self
                .contents
                .iter()
                .map(|c| Arc::new(c.to_typetracer(forget_length)))
                .collect(),
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
        for (i, content) in self.contents.iter().enumerate() {
            if let (Length::Known(c), Length::Known(n)) = (content.length(), self.length)
                && c < n
            {
                return Some(format!(
                    "at {path} (RecordArray): len(field({i})) < len(recordarray)"
                ));
            }
        }
        self.contents
            .iter()
            .enumerate()
            .find_map(|(i, c)| c.validity_error(&format!("{path}.content({i})")))
    }

    pub(crate) fn to_list(&self) -> RaggedResult<Value> {
        let length = self.length.require("RecordArray")?;
        let columns: Vec<Vec<Value>> = (0..self.contents.len())
            .map(|i| list_items(self.content(i)?.to_list()?))
            .try_collect()?;
        let mut columns: Vec<_> = columns.into_iter().map(Vec::into_iter).collect();
        Ok(Value::Array(
            (0..length)
                .map(|_| {
                    self.assemble(
                        columns
                            .iter_mut()
                            .map(|c| c.next().unwrap_or(Value::Null))
                            .collect(),
                    )
                })
                .collect(),
        ))
    }

    pub fn nbytes(&self) -> usize {
        self.contents.iter().map(|c| c.nbytes()).sum()
    }
}

#[cfg(test)]
mod test {
    use ragged_buffer::buffer;
    use serde_json::json;

    use super::*;
    use crate::content::NumpyArray;

    fn points() -> RecordArray {
        RecordArray::try_new(
            vec![
                NumpyArray::new(buffer![1i64, 2, 3, 4]).into(),
                NumpyArray::new(buffer![1.5f64, 2.5, 3.5]).into(),
            ],
            Some(vec!["x".into(), "y".into()]),
            None,
        )
        .unwrap()
    }

    #[test]
    fn length_is_the_shortest_field() {
        let record = points();
        assert_eq!(record.length(), Length::Known(3));
        assert_eq!(
            record.to_list().unwrap(),
            json!([{"x": 1, "y": 1.5}, {"x": 2, "y": 2.5}, {"x": 3, "y": 3.5}])
        );
        assert_eq!(record.content(0).unwrap().length(), Length::Known(3));
    }

    #[test]
    fn lazy_carry_defers_to_an_indexed_array() {
        let carried = points().carry(&Index::from_i64s([2, 0]), true).unwrap();
        assert!(matches!(carried, Content::Indexed(_)));
        assert_eq!(
            carried.to_list().unwrap(),
            json!([{"x": 3, "y": 3.5}, {"x": 1, "y": 1.5}])
        );
        assert!(points().carry(&Index::from_i64s([3]), true).is_err());
    }

    #[test]
    fn tuples_render_as_arrays() {
        let tuple = RecordArray::try_new(
            vec![NumpyArray::new(buffer![true, false]).into()],
            None,
            None,
        )
        .unwrap();
        assert_eq!(tuple.to_list().unwrap(), json!([[true], [false]]));
        assert_eq!(tuple.field_index("0").unwrap(), 0);
        assert!(tuple.field_index("1").is_err());
    }
}
