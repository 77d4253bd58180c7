use std::sync::Arc;

use itertools::Itertools;
use ragged_buffer::Buffer;
use ragged_dtype::{Form, FormKind, IndexType, PType, Parameters};
use ragged_error::{NodeContext, RaggedResult, ragged_bail, ragged_err};
use serde_json::Value;

use crate::backend::{BackendRef, Length};
use crate::content::Content;
use crate::content::indexed::list_items;
use crate::data::Data;
use crate::element::Element;
use crate::index::Index;

/// A tagged union: element `i` is `contents[tags[i]][index[i]]`.
#[derive(Clone, Debug)]
pub struct UnionArray {
    tags: Index,
    index: Index,
    contents: Vec<Arc<Content>>,
    backend: BackendRef,
    parameters: Parameters,
}

impl UnionArray {
    pub fn try_new(tags: Index, index: Index, contents: Vec<Content>) -> RaggedResult<Self> {
        if tags.index_type() != IndexType::I8 {
            ragged_bail!("UnionArray tags must be int8, not {}", tags.index_type());
        }
        if !matches!(
            index.index_type(),
            IndexType::I32 | IndexType::U32 | IndexType::I64
        ) {
            ragged_bail!(
                "UnionArray index must be int32, uint32 or int64, not {}",
                index.index_type()
            );
        }
        if contents.is_empty() {
            ragged_bail!("a UnionArray needs at least one content");
        }
        if contents.len() > i8::MAX as usize {
            ragged_bail!("a UnionArray holds at most {} contents", i8::MAX);
        }
        if let (Length::Known(t), Length::Known(i)) = (tags.length(), index.length())
            && i < t
        {
            ragged_bail!("UnionArray index ({i}) is shorter than its tags ({t})");
        }
        let backend = tags
            .backend()
            .combine(index.backend())
            .combine(BackendRef::common(contents.iter().map(Content::backend)));
        Ok(Self {
            tags,
            index,
            contents: contents.into_iter().map(Arc::new).collect(),
            backend,
            parameters: Parameters::empty(),
        })
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn tags(&self) -> &Index {
        &self.tags
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn contents(&self) -> impl Iterator<Item = &Content> {
        self.contents.iter().map(Arc::as_ref)
    }

    pub fn content(&self, i: usize) -> RaggedResult<&Content> {
        self.contents
            .get(i)
            .map(Arc::as_ref)
            .ok_or_else(|| ragged_err!(Index: "UnionArray", Some(i as i64), "no content {i}"))
    }

    pub fn num_contents(&self) -> usize {
        self.contents.len()
    }

    pub fn length(&self) -> Length {
        self.tags.length()
    }

    pub fn backend(&self) -> BackendRef {
        self.backend
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn form(&self) -> Form {
        Form::new(FormKind::Union {
            tags: IndexType::I8,
            index: self.index.index_type(),
            contents: self.contents.iter().map(|c| c.form()).collect(),
        })
        .with_parameters(self.parameters.clone())
    }

    pub(crate) fn element_at(&self, at: usize) -> RaggedResult<Element> {
        let (Some(tag), Some(index)) = (self.tags.get(at)?, self.index.get(at)?) else {
            return self.contents[0].unknown_element();
        };
        self.content(tag as usize)?.getitem_at(index)
    }

    pub(crate) fn slice(&self, start: Length, stop: Length) -> RaggedResult<Self> {
        Ok(Self {
            tags: self.tags.slice(start, stop)?,
            index: self.index.slice(start, stop)?,
            ..self.clone()
        })
    }

    pub(crate) fn carry(&self, carry: &Index) -> RaggedResult<Self> {
        let tags = self.tags.carry(carry).in_node("UnionArray")?;
        let index = self
            .index
            .slice(Length::ZERO, self.length())?
            .carry(carry)
            .in_node("UnionArray")?;
        Ok(Self {
            backend: tags.backend().combine(self.backend),
            tags,
            index,
            ..self.clone()
        })
    }

    /// Positions in content `which` of the elements tagged `which`, in order.
    pub(crate) fn project_carry(&self, which: usize) -> RaggedResult<Index> {
        let which = which as i64;
        let count = self
            .backend
            .run_count("UnionArray_project_length", &[self.tags.data()], &[which])
            .in_node("UnionArray")?;
        let [nextcarry] = self
            .backend
            .run(
                "UnionArray_project",
                [(PType::I64, count)],
                &[self.tags.data(), self.index.data()],
                &[which],
            )
            .in_node("UnionArray")?;
        Index::try_from_data(nextcarry, self.backend)
    }

    /// The elements tagged `which`, gathered out of their content.
    pub fn project(&self, which: usize) -> RaggedResult<Content> {
        self.content(which)?
            .carry(&self.project_carry(which)?, false)
    }

    /// An index numbering the elements of each content in order of appearance.
    pub fn regular_index(tags: &Index, num_contents: usize) -> RaggedResult<Index> {
        let [index] = tags
            .backend()
            .run(
                "UnionArray_regular_index",
                [(PType::I64, tags.length())],
                &[tags.data()],
                &[num_contents as i64],
            )
            .in_node("UnionArray")?;
        Index::try_from_data(index, tags.backend())
    }

    pub fn to_typetracer(&self, forget_length: bool) -> Self {
        Self {
            tags: self.tags.to_typetracer(forget_length),
            index: self.index.to_typetracer(forget_length),
            contents: self
                .contents
                .iter()
                .map(|c| Arc::new(c.to_typetracer(forget_length)))
                .collect(),
            backend: BackendRef::typetracer(),
            parameters: self.parameters.clone(),
        }
    }

    pub(crate) fn validity_error(&self, path: &str) -> Option<String> {
        if self.backend.known_data() {
            let lengths: Buffer<i64> = self
                .contents
                .iter()
                .map(|c| c.length().as_scalar())
                .collect();
            if let Err(err) = self.backend.check(
                "UnionArray_validity",
                &[self.tags.data(), self.index.data(), &Data::from(lengths)],
                &[],
            ) {
                return Some(format!("at {path} (UnionArray): {}", err.message()));
            }
        }
        self.contents
            .iter()
            .enumerate()
            .find_map(|(i, c)| c.validity_error(&format!("{path}.content({i})")))
    }

    pub(crate) fn to_list(&self) -> RaggedResult<Value> {
        let rendered: Vec<Vec<Value>> = self
            .contents
            .iter()
            .map(|c| list_items(c.to_list()?))
            .try_collect()?;
        let tags = self.tags.to_vec()?;
        let index = self.index.to_vec()?;
        tags.iter()
            .zip(index)
            .enumerate()
            .map(|(i, (&tag, j))| {
                rendered
                    .get(tag as usize)
                    .and_then(|items| items.get(j as usize))
                    .cloned()
                    .ok_or_else(|| {
                        ragged_err!(
                            Index: "UnionArray",
                            Some(i as i64),
                            "(tags[{i}], index[{i}]) = ({tag}, {j}) does not resolve"
                        )
                    })
            })
            .collect::<RaggedResult<Vec<_>>>()
            .map(Value::Array)
    }

    pub fn nbytes(&self) -> usize {
        self.tags.nbytes() + self.index.nbytes() + self.contents.iter().map(|c| c.nbytes()).sum::<usize>()
    }
}

#[cfg(test)]
mod test {
    use ragged_buffer::buffer;
    use serde_json::json;

    use super::*;
    use crate::content::NumpyArray;

    fn mixed() -> UnionArray {
        UnionArray::try_new(
            Index::new(buffer![1i8, 0, 1, 0]),
            Index::new(buffer![0i32, 2, 1, 0]),
            vec![
                NumpyArray::new(buffer![10i64, 20, 30]).into(),
                NumpyArray::new(buffer![true, false]).into(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn elements_follow_their_tags() {
        assert_eq!(mixed().to_list().unwrap(), json!([true, 30, false, 10]));
        assert_eq!(mixed().project(0).unwrap().to_list().unwrap(), json!([30, 10]));
        assert_eq!(mixed().project(1).unwrap().to_list().unwrap(), json!([true, false]));
    }

    #[test]
    fn regular_index_counts_per_content() {
        let index = UnionArray::regular_index(mixed().tags(), 2).unwrap();
        assert_eq!(index.to_vec().unwrap(), vec![0, 0, 1, 1]);
    }

    #[test]
    fn dangling_index_is_invalid() {
        let union = UnionArray::try_new(
            Index::new(buffer![0i8, 0]),
            Index::new(buffer![0i64, 3]),
            vec![NumpyArray::new(buffer![1u8]).into()],
        )
        .unwrap();
        let message = Content::from(union).validity_error("layout").unwrap();
        assert!(message.contains("index[i] >= len(content[tags[i]])"));
    }
}
