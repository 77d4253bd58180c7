//! Decomposing a layout into a [`Form`] and named little-endian buffers, and back.
//!
//! Nodes are numbered depth-first from the root, and node `N` gets the form key `node{N}`.
//! Each index or data buffer is stored under a key built from [`BufferOptions::key_format`]
//! with the node's form key and the buffer's role:
//!
//! | node                                   | roles               |
//! |----------------------------------------|---------------------|
//! | `NumpyArray`                           | `data`              |
//! | `IndexedArray`, `IndexedOptionArray`   | `index`             |
//! | `ByteMaskedArray`, `BitMaskedArray`    | `mask`              |
//! | `ListOffsetArray`                      | `offsets`           |
//! | `ListArray`                            | `starts`, `stops`   |
//! | `UnionArray`                           | `tags`, `index`     |
//!
//! The other nodes own no buffers but still take a number.

use std::collections::BTreeMap;

use itertools::Itertools;
use ragged_buffer::ByteBuffer;
use ragged_dtype::{Form, FormKind, IndexType, PType};
use ragged_error::{RaggedResult, ragged_bail, ragged_err};

use crate::backend::BackendRef;
use crate::content::{
    BitMaskedArray, ByteMaskedArray, Content, EmptyArray, IndexedArray, IndexedOptionArray,
    ListArray, ListOffsetArray, NumpyArray, RecordArray, RegularArray, UnionArray, UnmaskedArray,
};
use crate::data::{Data, Values};
use crate::index::Index;

/// How buffers are named.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferOptions {
    /// Template for buffer keys, with `{form_key}` and `{role}` placeholders.
    pub key_format: String,
}

impl Default for BufferOptions {
    fn default() -> Self {
        Self {
            key_format: "{form_key}-{role}".to_string(),
        }
    }
}

impl BufferOptions {
    fn key(&self, form_key: &str, role: &str) -> String {
        self.key_format
            .replace("{form_key}", form_key)
            .replace("{role}", role)
    }
}

/// Buffers by key, in key order.
pub type Container = BTreeMap<String, ByteBuffer>;

impl Content {
    /// The buffers this node owns, by role. Children's buffers are not included.
    pub(crate) fn buffers(&self) -> Vec<(&'static str, &Data)> {
        match self {
            Content::Empty(_)
            | Content::Unmasked(_)
            | Content::Regular(_)
            | Content::Record(_) => vec![],
            Content::Numpy(a) => vec![("data", a.data())],
            Content::Indexed(a) => vec![("index", a.index().data())],
            Content::IndexedOption(a) => vec![("index", a.index().data())],
            Content::ByteMasked(a) => vec![("mask", a.mask().data())],
            Content::BitMasked(a) => vec![("mask", a.mask().data())],
            Content::ListOffset(a) => vec![("offsets", a.offsets().data())],
            Content::List(a) => vec![("starts", a.starts().data()), ("stops", a.stops().data())],
            Content::Union(a) => vec![("tags", a.tags().data()), ("index", a.index().data())],
        }
    }

    /// The form of this array with a key on every node, its length, and the bytes of every
    /// buffer. Needs concrete data.
    pub fn to_buffers(&self, options: &BufferOptions) -> RaggedResult<(Form, usize, Container)> {
        let length = self.length().require("to_buffers")?;
        let mut container = Container::new();
        let mut next_id = 0;
        let form = self.decompose(&mut next_id, options, &mut container)?;
        log::debug!(
            "decomposed {} into {} nodes and {} buffers",
            self.class_name(),
            next_id,
            container.len()
        );
        Ok((form, length, container))
    }

    fn decompose(
        &self,
        next_id: &mut usize,
        options: &BufferOptions,
        container: &mut Container,
    ) -> RaggedResult<Form> {
        let form_key = format!("node{next_id}");
        *next_id += 1;
        for (role, data) in self.buffers() {
            let bytes = data.require_values("to_buffers")?.to_le_bytes();
            container.insert(options.key(&form_key, role), ByteBuffer::from(bytes));
        }

        let kind = match self {
            Content::Empty(_) => FormKind::Empty,
            Content::Numpy(a) => FormKind::Numpy {
                primitive: a.ptype(),
            },
            Content::Indexed(a) => FormKind::Indexed {
                index: a.index().index_type(),
                content: Box::new(a.content().decompose(next_id, options, container)?),
            },
            Content::IndexedOption(a) => FormKind::IndexedOption {
                index: a.index().index_type(),
                content: Box::new(a.content().decompose(next_id, options, container)?),
            },
            Content::ByteMasked(a) => FormKind::ByteMasked {
                mask: a.mask().index_type(),
                valid_when: a.valid_when(),
                content: Box::new(a.content().decompose(next_id, options, container)?),
            },
            Content::BitMasked(a) => FormKind::BitMasked {
                mask: a.mask().index_type(),
                valid_when: a.valid_when(),
                lsb_order: a.lsb_order(),
                content: Box::new(a.content().decompose(next_id, options, container)?),
            },
            Content::Unmasked(a) => FormKind::Unmasked {
                content: Box::new(a.content().decompose(next_id, options, container)?),
            },
            Content::ListOffset(a) => FormKind::ListOffset {
                offsets: a.offsets().index_type(),
                content: Box::new(a.content().decompose(next_id, options, container)?),
            },
            Content::List(a) => FormKind::List {
                starts: a.starts().index_type(),
                stops: a.stops().index_type(),
                content: Box::new(a.content().decompose(next_id, options, container)?),
            },
            Content::Regular(a) => FormKind::Regular {
                size: a.size(),
                content: Box::new(a.content().decompose(next_id, options, container)?),
            },
            Content::Record(a) => {
                let mut contents = Vec::with_capacity(a.num_fields());
                for i in 0..a.num_fields() {
                    contents.push(a.content(i)?.decompose(next_id, options, container)?);
                }
                FormKind::Record {
                    contents,
                    fields: a.raw_fields().map(<[String]>::to_vec),
                }
            }
            Content::Union(a) => {
                let contents: Vec<Form> = a
                    .contents()
                    .map(|c| c.decompose(next_id, options, container))
                    .try_collect()?;
                FormKind::Union {
                    tags: a.tags().index_type(),
                    index: a.index().index_type(),
                    contents,
                }
            }
        };
        Ok(Form::new(kind)
            .with_parameters(self.parameters().clone())
            .with_form_key(Some(form_key)))
    }

    /// Rebuild an array of `length` elements from a keyed form and the buffers
    /// [`Content::to_buffers`] produced for it. Buffers may be longer than needed.
    pub fn from_buffers(
        form: &Form,
        length: usize,
        container: &Container,
        options: &BufferOptions,
    ) -> RaggedResult<Content> {
        let reader = Reader { container, options };
        reader.content(form, length)
    }
}

struct Reader<'a> {
    container: &'a Container,
    options: &'a BufferOptions,
}

impl Reader<'_> {
    fn data(&self, form: &Form, role: &str, ptype: PType, length: usize) -> RaggedResult<Data> {
        let Some(form_key) = form.form_key() else {
            ragged_bail!(Serde: "{} form has no form_key to find its {role} buffer", form.class_name());
        };
        let key = self.options.key(form_key, role);
        let bytes = self
            .container
            .get(&key)
            .ok_or_else(|| ragged_err!(Serde: "no buffer named {key:?}"))?;
        let needed = length * ptype.byte_width();
        if bytes.len() < needed {
            ragged_bail!(
                Serde: "buffer {key:?} holds {} bytes but {length} {ptype} values need {needed}",
                bytes.len()
            );
        }
        Ok(Values::from_le_bytes(ptype, &bytes.as_slice()[..needed])?.into())
    }

    fn index(&self, form: &Form, role: &str, index_type: IndexType, length: usize) -> RaggedResult<Index> {
        Index::try_from_data(
            self.data(form, role, index_type.ptype(), length)?,
            BackendRef::cpu(),
        )
    }

    fn content(&self, form: &Form, length: usize) -> RaggedResult<Content> {
        let backend = BackendRef::cpu();
        let content: Content = match form.kind() {
            FormKind::Empty => {
                if length != 0 {
                    ragged_bail!(Serde: "an EmptyArray cannot have length {length}");
                }
                EmptyArray::new(backend).into()
            }
            FormKind::Numpy { primitive } => {
                NumpyArray::from_data(self.data(form, "data", *primitive, length)?, backend).into()
            }
            FormKind::Indexed { index, content } => {
                let index = self.index(form, "index", *index, length)?;
                let next = self.content(content, extent(index.to_vec()?))?;
                IndexedArray::try_new(index, next)?.into()
            }
            FormKind::IndexedOption { index, content } => {
                let index = self.index(form, "index", *index, length)?;
                let next = self.content(content, extent(index.to_vec()?))?;
                IndexedOptionArray::try_new(index, next)?.into()
            }
            FormKind::ByteMasked {
                mask,
                valid_when,
                content,
            } => {
                let mask = self.index(form, "mask", *mask, length)?;
                ByteMaskedArray::try_new(mask, self.content(content, length)?, *valid_when)?.into()
            }
            FormKind::BitMasked {
                mask,
                valid_when,
                lsb_order,
                content,
            } => {
                let mask = self.index(form, "mask", *mask, length.div_ceil(8))?;
                BitMaskedArray::try_new(
                    mask,
                    self.content(content, length)?,
                    *valid_when,
                    length,
                    *lsb_order,
                )?
                .into()
            }
            FormKind::Unmasked { content } => UnmaskedArray::new(self.content(content, length)?).into(),
            FormKind::ListOffset { offsets, content } => {
                let offsets = self.index(form, "offsets", *offsets, length + 1)?;
                let stop = offsets.to_vec()?.last().copied().unwrap_or(0);
                let next = self.content(content, usize::try_from(stop).unwrap_or(0))?;
                ListOffsetArray::try_new(offsets, next)?.into()
            }
            FormKind::List {
                starts,
                stops,
                content,
            } => {
                let starts = self.index(form, "starts", *starts, length)?;
                let stops = self.index(form, "stops", *stops, length)?;
                let stop = stops.to_vec()?.into_iter().max().unwrap_or(0);
                let next = self.content(content, usize::try_from(stop).unwrap_or(0))?;
                ListArray::try_new(starts, stops, next)?.into()
            }
            FormKind::Regular { size, content } => {
                RegularArray::try_new(self.content(content, length * size)?, *size, length)?.into()
            }
            FormKind::Record { contents, fields } => {
                let contents: Vec<Content> = contents
                    .iter()
                    .map(|field| self.content(field, length))
                    .try_collect()?;
                RecordArray::try_new(contents, fields.clone(), Some(length))?.into()
            }
            FormKind::Union {
                tags,
                index,
                contents,
            } => {
                let tags = self.index(form, "tags", *tags, length)?;
                let index = self.index(form, "index", *index, length)?;
                let (tag_values, index_values) = (tags.to_vec()?, index.to_vec()?);
                let contents: Vec<Content> = contents
                    .iter()
                    .enumerate()
                    .map(|(which, content)| {
                        let used = tag_values
                            .iter()
                            .zip(&index_values)
                            .filter(|&(&t, _)| t == which as i64)
                            .map(|(_, &i)| i);
                        self.content(content, extent(used))
                    })
                    .try_collect()?;
                UnionArray::try_new(tags, index, contents)?.into()
            }
        };
        Ok(content.with_parameters(form.parameters().clone()))
    }
}

/// The number of elements that positions `index` need, ignoring negative ones.
fn extent(index: impl IntoIterator<Item = i64>) -> usize {
    index
        .into_iter()
        .filter_map(|i| usize::try_from(i).ok())
        .map(|i| i + 1)
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod test {
    use ragged_buffer::buffer;
    use ragged_dtype::Parameters;
    use serde_json::json;

    use super::*;
    use crate::backend::Length;

    /// `[[1, None, 3], [], [4]]`
    fn lists_with_missing() -> Content {
        let option = IndexedOptionArray::try_new(
            Index::from_i64s([0, -1, 1, 2]),
            NumpyArray::new(buffer![1i64, 3, 4]),
        )
        .unwrap();
        ListOffsetArray::try_new(Index::from_i64s([0, 3, 3, 4]), option)
            .unwrap()
            .into()
    }

    #[test]
    fn keys_follow_depth_first_numbering() {
        let (form, length, container) = lists_with_missing()
            .to_buffers(&BufferOptions::default())
            .unwrap();
        assert_eq!(length, 3);
        assert_eq!(
            container.keys().collect::<Vec<_>>(),
            vec!["node0-offsets", "node1-index", "node2-data"]
        );
        assert_eq!(form.form_key(), Some("node0"));
        assert_eq!(form.children()[0].children()[0].form_key(), Some("node2"));
        assert_eq!(&container["node2-data"][..8], &[1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(
            &container["node1-index"][8..16],
            &[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]
        );
    }

    #[test]
    fn buffers_rebuild_the_array() {
        let record: Content = RecordArray::try_new(
            vec![
                lists_with_missing(),
                ByteMaskedArray::try_new(
                    Index::new(buffer![1i8, 0, 1]),
                    NumpyArray::new(buffer![1.5f64, 2.5, 3.5]),
                    true,
                )
                .unwrap()
                .into(),
            ],
            Some(vec!["x".to_string(), "y".to_string()]),
            None,
        )
        .unwrap()
        .with_parameters(Parameters::empty().with("__record__", "Point"))
        .into();
        let options = BufferOptions::default();
        let (form, length, container) = record.to_buffers(&options).unwrap();
        let restored = Content::from_buffers(&form, length, &container, &options).unwrap();
        assert_eq!(restored.form(), record.form());
        assert_eq!(
            restored.to_list().unwrap(),
            json!([
                {"x": [1, null, 3], "y": 1.5},
                {"x": [], "y": null},
                {"x": [4], "y": 3.5}
            ])
        );
    }

    #[test]
    fn unions_and_windows_survive() {
        let union: Content = UnionArray::try_new(
            Index::new(buffer![1i8, 0, 1]),
            Index::from_i64s([1, 0, 0]),
            vec![
                NumpyArray::new(buffer![7i64]).into(),
                NumpyArray::new(buffer![true, false]).into(),
            ],
        )
        .unwrap()
        .into();
        let window = lists_with_missing()
            .slice(Length::Known(1), Length::Known(3))
            .unwrap();
        for array in [union, window] {
            let options = BufferOptions::default();
            let (form, length, container) = array.to_buffers(&options).unwrap();
            let restored = Content::from_buffers(&form, length, &container, &options).unwrap();
            assert_eq!(restored.to_list().unwrap(), array.to_list().unwrap());
        }
    }

    #[test]
    fn key_format_is_configurable() {
        let options = BufferOptions {
            key_format: "part-{form_key}/{role}".to_string(),
        };
        let (form, length, container) = lists_with_missing().to_buffers(&options).unwrap();
        assert!(container.contains_key("part-node0/offsets"));
        let err = Content::from_buffers(&form, length, &container, &BufferOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("node0-offsets"));
    }

    #[test]
    fn typetracer_arrays_have_no_bytes() {
        assert!(
            lists_with_missing()
                .to_typetracer(false)
                .to_buffers(&BufferOptions::default())
                .is_err()
        );
    }
}
