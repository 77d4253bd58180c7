//! Operations on the shape of a layout: counting, flattening, padding, local positions,
//! filling missing values and picking record fields.
//!
//! Axes count list dimensions from the root. Each operation walks down to the list layer at
//! the requested axis, carrying option layers along so that missing lists stay missing,
//! and rebuilds the layers above around the result.

use itertools::Itertools;
use ragged_buffer::buffer;
use ragged_dtype::PType;
use ragged_error::{NodeContext, RaggedResult, ragged_bail, ragged_err};

use crate::apply::ApplyOptions;
use crate::backend::{BackendRef, Length};
use crate::content::list_offset::last_offset;
use crate::content::{
    ByteMaskedArray, Content, IndexedArray, IndexedOptionArray, ListArray, ListOffsetArray,
    NumpyArray, RecordArray, RegularArray, UnionArray, UnmaskedArray,
};
use crate::element::{Element, Scalar};
use crate::index::Index;
use crate::kernels::as_i64;
use crate::sorting::compact_list;

/// Resolve `axis` against the depth of `content`. Negative axes count from the innermost
/// dimension and need every leaf at the same depth.
pub(crate) fn regular_axis(content: &Content, axis: i64) -> RaggedResult<usize> {
    if let Ok(axis) = usize::try_from(axis) {
        return Ok(axis);
    }
    let (mindepth, maxdepth) = content.minmax_depth();
    if mindepth != maxdepth {
        ragged_bail!(
            AxisError: "axis={axis} is ambiguous for an array with leaves at depths {mindepth} to {maxdepth}"
        );
    }
    usize::try_from(maxdepth as i64 + axis)
        .map_err(|_| ragged_err!(AxisError: "axis={axis} exceeds the depth of this array ({maxdepth})"))
}

fn deeper_than_leaves<T>(content: &Content, posaxis: usize) -> RaggedResult<T> {
    ragged_bail!(
        AxisError: "axis={posaxis} exceeds the depth of this array ({} at the bottom)",
        content.class_name()
    )
}

impl Content {
    /// The number of elements at `axis`: the length for axis `0`, otherwise the length of
    /// every list one level above `axis`, nested like the lists around them.
    pub fn num(&self, axis: i64) -> RaggedResult<Element> {
        let posaxis = regular_axis(self, axis)?;
        if posaxis == 0 {
            return Ok(match self.length() {
                Length::Known(n) => Element::Scalar(Scalar::Int(as_i64(n))),
                Length::Unknown => Element::Unknown(PType::I64),
            });
        }
        Ok(Element::Array(self.num_at(posaxis, 0)?))
    }

    fn num_at(&self, posaxis: usize, depth: usize) -> RaggedResult<Content> {
        match self {
            Content::Empty(_) | Content::Numpy(_) => deeper_than_leaves(self, posaxis),
            c if c.is_string_like() => deeper_than_leaves(self, posaxis),
            Content::Indexed(a) => a.project(None)?.num_at(posaxis, depth),
            c if c.is_option() => {
                let option = c.to_indexed_option_array64()?;
                let (nextcarry, outindex) = option.nextcarry_outindex()?;
                let next = option.content().carry(&nextcarry, false)?;
                IndexedOptionArray::try_new(outindex, next.num_at(posaxis, depth)?)?
                    .simplify_optiontype()
            }
            Content::Regular(a) => {
                if posaxis == depth + 1 {
                    let backend = a.backend();
                    let [counts] = backend
                        .run(
                            "RegularArray_num",
                            [(PType::I64, a.length())],
                            &[],
                            &[as_i64(a.size())],
                        )
                        .in_node("RegularArray")?;
                    Ok(NumpyArray::from_data(counts, backend).into())
                } else {
                    let next = a.content().num_at(posaxis, depth + 1)?;
                    Ok(RegularArray::with_length(next, a.size(), a.length()).into())
                }
            }
            c if c.is_list() => {
                let (list, content) = compact_list(c)?;
                if posaxis == depth + 1 {
                    let backend = list.backend();
                    let [counts] = backend
                        .run(
                            "ListArray_num",
                            [(PType::I64, list.length())],
                            &[list.starts()?.data(), list.stops()?.data()],
                            &[],
                        )
                        .in_node("ListOffsetArray")?;
                    Ok(NumpyArray::from_data(counts, backend).into())
                } else {
                    let next = content.num_at(posaxis, depth + 1)?;
                    Ok(ListOffsetArray::try_new(list.offsets().clone(), next)?.into())
                }
            }
            Content::Record(a) => {
                let contents: Vec<Content> = (0..a.num_fields())
                    .map(|i| a.content(i)?.num_at(posaxis, depth))
                    .try_collect()?;
                Ok(RecordArray::with_length(
                    contents,
                    a.raw_fields().map(<[String]>::to_vec),
                    a.length(),
                )
                .into())
            }
            Content::Union(a) => {
                let contents: Vec<Content> = a
                    .contents()
                    .map(|c| c.num_at(posaxis, depth))
                    .try_collect()?;
                UnionArray::try_new(a.tags().clone(), a.index().clone(), contents)?
                    .simplify_uniontype(true, false)
            }
            c => ragged_bail!(AssertionFailed: "{} has no elements to count", c.class_name()),
        }
    }

    /// Concatenate the lists at `axis` with those next to them. Axis `0` has no lists to
    /// concatenate and instead drops the missing elements of the outermost dimension.
    pub fn flatten(&self, axis: i64) -> RaggedResult<Content> {
        let posaxis = regular_axis(self, axis)?;
        if posaxis == 0 {
            return if self.is_option() || self.is_indexed() {
                self.project(None)
            } else {
                Ok(self.clone())
            };
        }
        Ok(self.offsets_and_flattened_at(posaxis, 0)?.1)
    }

    /// The flattened array along with, when `axis` is `1`, the offsets that would restore
    /// the removed dimension. Flattening deeper leaves the outer dimension in place and
    /// returns no offsets.
    pub fn offsets_and_flattened(&self, axis: i64) -> RaggedResult<(Option<Index>, Content)> {
        let posaxis = regular_axis(self, axis)?;
        self.offsets_and_flattened_at(posaxis, 0)
    }

    fn offsets_and_flattened_at(
        &self,
        posaxis: usize,
        depth: usize,
    ) -> RaggedResult<(Option<Index>, Content)> {
        if posaxis == depth {
            ragged_bail!(AxisError: "axis={posaxis} has no lists to flatten");
        }
        match self {
            Content::Empty(_) | Content::Numpy(_) => deeper_than_leaves(self, posaxis),
            c if c.is_string_like() => deeper_than_leaves(self, posaxis),
            Content::Indexed(a) => a.project(None)?.offsets_and_flattened_at(posaxis, depth),
            c if c.is_option() => {
                let option = c.to_indexed_option_array64()?;
                let (nextcarry, outindex) = option.nextcarry_outindex()?;
                let next = option.content().carry(&nextcarry, false)?;
                match next.offsets_and_flattened_at(posaxis, depth)? {
                    (None, flattened) => Ok((
                        None,
                        IndexedOptionArray::try_new(outindex, flattened)?
                            .with_parameters(c.parameters().clone())
                            .simplify_optiontype()?,
                    )),
                    (Some(offsets), flattened) => {
                        let backend = option.backend();
                        let [outoffsets] = backend
                            .run(
                                "IndexedArray_flatten_none2empty",
                                [(PType::I64, outindex.length() + 1)],
                                &[outindex.data(), offsets.data()],
                                &[],
                            )
                            .in_node("IndexedOptionArray")?;
                        Ok((Some(Index::try_from_data(outoffsets, backend)?), flattened))
                    }
                }
            }
            c if c.is_list() => {
                let (list, content) = compact_list(c)?;
                if posaxis == depth + 1 {
                    return Ok((Some(list.offsets().clone()), content));
                }
                let (inner, flattened) = match content.offsets_and_flattened_at(posaxis, depth + 1)? {
                    (Some(inner), flattened) => (inner, flattened),
                    (None, flattened) => {
                        return Ok((
                            None,
                            ListOffsetArray::try_new(list.offsets().clone(), flattened)?.into(),
                        ));
                    }
                };
                let backend = list.backend().combine(inner.backend());
                let [tooffsets] = backend
                    .run(
                        "ListOffsetArray_flatten_offsets",
                        [(PType::I64, list.offsets().length())],
                        &[list.offsets().data(), inner.data()],
                        &[],
                    )
                    .in_node("ListOffsetArray")?;
                Ok((
                    None,
                    ListOffsetArray::try_new(Index::try_from_data(tooffsets, backend)?, flattened)?
                        .into(),
                ))
            }
            Content::Record(a) => {
                let mut contents = Vec::with_capacity(a.num_fields());
                for i in 0..a.num_fields() {
                    match a.content(i)?.offsets_and_flattened_at(posaxis, depth)? {
                        (None, flattened) => contents.push(flattened),
                        (Some(_), _) => ragged_bail!(
                            AxisError: "records cannot be flattened at axis={posaxis}, but their fields can at a deeper axis"
                        ),
                    }
                }
                Ok((
                    None,
                    RecordArray::with_length(
                        contents,
                        a.raw_fields().map(<[String]>::to_vec),
                        a.length(),
                    )
                    .into(),
                ))
            }
            Content::Union(a) => flatten_union(a, posaxis, depth),
            c => ragged_bail!(AssertionFailed: "{} cannot be flattened", c.class_name()),
        }
    }

    /// Pad the lists at `axis` with missing values to at least `target` elements, or to
    /// exactly `target` with `clip`, which also cuts longer lists.
    pub fn pad_none(&self, target: usize, axis: i64, clip: bool) -> RaggedResult<Content> {
        let posaxis = regular_axis(self, axis)?;
        self.pad_none_at(target, posaxis, 0, clip)
    }

    /// Another name for [`Content::pad_none`].
    pub fn rpad(&self, target: usize, axis: i64, clip: bool) -> RaggedResult<Content> {
        self.pad_none(target, axis, clip)
    }

    fn pad_none_at(&self, target: usize, posaxis: usize, depth: usize, clip: bool) -> RaggedResult<Content> {
        if posaxis == depth {
            return self.pad_none_axis0(target, clip);
        }
        let backend = self.backend();
        match self {
            Content::Empty(_) | Content::Numpy(_) => deeper_than_leaves(self, posaxis),
            c if c.is_string_like() => deeper_than_leaves(self, posaxis),
            Content::Indexed(a) => a.project(None)?.pad_none_at(target, posaxis, depth, clip),
            c if c.is_option() => {
                let option = c.to_indexed_option_array64()?;
                let (nextcarry, outindex) = option.nextcarry_outindex()?;
                let next = option
                    .content()
                    .carry(&nextcarry, false)?
                    .pad_none_at(target, posaxis, depth, clip)?;
                IndexedOptionArray::try_new(outindex, next)?
                    .with_parameters(c.parameters().clone())
                    .simplify_optiontype()
            }
            Content::Regular(a) if posaxis == depth + 1 => {
                if !clip && target < a.size() {
                    return Ok(self.clone());
                }
                let [index] = backend
                    .run(
                        "RegularArray_rpad_and_clip_axis1",
                        [(PType::I64, a.length() * target)],
                        &[],
                        &[as_i64(target), a.length().as_scalar(), as_i64(a.size())],
                    )
                    .in_node("RegularArray")?;
                let next = IndexedOptionArray::try_new(
                    Index::try_from_data(index, backend)?,
                    a.content().clone(),
                )?
                .simplify_optiontype()?;
                Ok(RegularArray::with_length(next, target, a.length())
                    .with_parameters(a.parameters().clone())
                    .into())
            }
            Content::Regular(a) => Ok(RegularArray::with_length(
                a.content().pad_none_at(target, posaxis, depth + 1, clip)?,
                a.size(),
                a.length(),
            )
            .with_parameters(a.parameters().clone())
            .into()),
            c if c.is_list() => {
                let (list, content) = compact_list(c)?;
                if posaxis != depth + 1 {
                    let next = content.pad_none_at(target, posaxis, depth + 1, clip)?;
                    return Ok(ListOffsetArray::try_new(list.offsets().clone(), next)?
                        .with_parameters(c.parameters().clone())
                        .into());
                }
                let offsets = list.offsets();
                if clip {
                    let [index] = backend
                        .run(
                            "ListOffsetArray_rpad_and_clip_axis1",
                            [(PType::I64, list.length() * target)],
                            &[offsets.data()],
                            &[as_i64(target)],
                        )
                        .in_node("ListOffsetArray")?;
                    let next =
                        IndexedOptionArray::try_new(Index::try_from_data(index, backend)?, content)?
                            .simplify_optiontype()?;
                    Ok(RegularArray::with_length(next, target, list.length())
                        .with_parameters(c.parameters().clone())
                        .into())
                } else {
                    let [tooffsets, _] = backend
                        .run(
                            "ListOffsetArray_rpad_length_axis1",
                            [(PType::I64, offsets.length()), (PType::I64, Length::Known(1))],
                            &[offsets.data()],
                            &[as_i64(target)],
                        )
                        .in_node("ListOffsetArray")?;
                    let tooffsets = Index::try_from_data(tooffsets, backend)?;
                    let tolength = last_offset(&tooffsets)?;
                    let [index] = backend
                        .run(
                            "ListOffsetArray_rpad_axis1",
                            [(PType::I64, tolength)],
                            &[offsets.data()],
                            &[as_i64(target)],
                        )
                        .in_node("ListOffsetArray")?;
                    let next =
                        IndexedOptionArray::try_new(Index::try_from_data(index, backend)?, content)?
                            .simplify_optiontype()?;
                    Ok(ListOffsetArray::try_new(tooffsets, next)?
                        .with_parameters(c.parameters().clone())
                        .into())
                }
            }
            Content::Record(a) => {
                let contents: Vec<Content> = (0..a.num_fields())
                    .map(|i| a.content(i)?.pad_none_at(target, posaxis, depth, clip))
                    .try_collect()?;
                Ok(RecordArray::with_length(
                    contents,
                    a.raw_fields().map(<[String]>::to_vec),
                    a.length(),
                )
                .with_parameters(a.parameters().clone())
                .into())
            }
            Content::Union(a) => {
                let contents: Vec<Content> = a
                    .contents()
                    .map(|c| c.pad_none_at(target, posaxis, depth, clip))
                    .try_collect()?;
                UnionArray::try_new(a.tags().clone(), a.index().clone(), contents)?
                    .simplify_uniontype(true, false)
            }
            c => ragged_bail!(AssertionFailed: "{} cannot be padded", c.class_name()),
        }
    }

    /// This array with missing values appended up to `target`, or cut to `target` with
    /// `clip`.
    fn pad_none_axis0(&self, target: usize, clip: bool) -> RaggedResult<Content> {
        let backend = self.backend();
        let length = if clip {
            Length::Known(target)
        } else {
            self.length().max(Length::Known(target))
        };
        let [index] = backend
            .run(
                "Index_rpad_and_clip_axis0",
                [(PType::I64, length)],
                &[],
                &[self.length().as_scalar()],
            )
            .in_node(self.class_name())?;
        IndexedOptionArray::try_new(Index::try_from_data(index, backend)?, self.clone())?
            .simplify_optiontype()
    }

    /// The position of every element within its list at `axis`.
    pub fn local_index(&self, axis: i64) -> RaggedResult<Content> {
        let posaxis = regular_axis(self, axis)?;
        self.local_index_at(posaxis, 0)
    }

    fn local_index_at(&self, posaxis: usize, depth: usize) -> RaggedResult<Content> {
        let backend = self.backend();
        if posaxis == depth {
            let positions = Index::arange(self.length(), backend)?;
            return Ok(NumpyArray::from_data(positions.data().clone(), backend).into());
        }
        match self {
            Content::Empty(_) | Content::Numpy(_) => deeper_than_leaves(self, posaxis),
            c if c.is_string_like() => deeper_than_leaves(self, posaxis),
            Content::Indexed(a) => a.project(None)?.local_index_at(posaxis, depth),
            c if c.is_option() => {
                let option = c.to_indexed_option_array64()?;
                let (nextcarry, outindex) = option.nextcarry_outindex()?;
                let next = option
                    .content()
                    .carry(&nextcarry, false)?
                    .local_index_at(posaxis, depth)?;
                IndexedOptionArray::try_new(outindex, next)?.simplify_optiontype()
            }
            Content::Regular(a) => {
                let next = if posaxis == depth + 1 {
                    let [positions] = backend
                        .run(
                            "RegularArray_localindex",
                            [(PType::I64, a.length() * a.size())],
                            &[],
                            &[a.length().as_scalar(), as_i64(a.size())],
                        )
                        .in_node("RegularArray")?;
                    NumpyArray::from_data(positions, backend).into()
                } else {
                    a.content().local_index_at(posaxis, depth + 1)?
                };
                Ok(RegularArray::with_length(next, a.size(), a.length()).into())
            }
            c if c.is_list() => {
                let (list, content) = compact_list(c)?;
                let next = if posaxis == depth + 1 {
                    let [positions] = backend
                        .run(
                            "ListArray_localindex",
                            [(PType::I64, content.length())],
                            &[list.offsets().data()],
                            &[],
                        )
                        .in_node("ListOffsetArray")?;
                    NumpyArray::from_data(positions, backend).into()
                } else {
                    content.local_index_at(posaxis, depth + 1)?
                };
                Ok(ListOffsetArray::try_new(list.offsets().clone(), next)?.into())
            }
            Content::Record(a) => {
                let contents: Vec<Content> = (0..a.num_fields())
                    .map(|i| a.content(i)?.local_index_at(posaxis, depth))
                    .try_collect()?;
                Ok(RecordArray::with_length(
                    contents,
                    a.raw_fields().map(<[String]>::to_vec),
                    a.length(),
                )
                .into())
            }
            Content::Union(a) => {
                let contents: Vec<Content> = a
                    .contents()
                    .map(|c| c.local_index_at(posaxis, depth))
                    .try_collect()?;
                UnionArray::try_new(a.tags().clone(), a.index().clone(), contents)?
                    .simplify_uniontype(true, false)
            }
            c => ragged_bail!(AssertionFailed: "{} has no positions", c.class_name()),
        }
    }

    /// Replace missing values at every level with `value`. Where the value's type cannot
    /// merge with the present values, the result is a union of both.
    pub fn fill_none(&self, value: impl Into<Scalar>) -> RaggedResult<Content> {
        let value = value.into();
        self.recursively_apply(
            &mut |node: &Content, _| {
                if !node.is_option() {
                    return Ok(None);
                }
                let option = node.to_indexed_option_array64()?;
                let content = option.content().fill_none(value)?;
                fill_option(&option, content, value).map(Some)
            },
            &ApplyOptions::default(),
        )
    }

    /// The field `name` of the records below every list, option and union layer.
    pub fn getitem_field(&self, name: &str) -> RaggedResult<Content> {
        self.through_records(&|record| record.content(record.field_index(name)?))
    }

    /// A record of only the fields `names`, in that order, below every list, option and
    /// union layer.
    pub fn getitem_fields(&self, names: &[String]) -> RaggedResult<Content> {
        self.through_records(&|record| {
            let contents: Vec<Content> = names
                .iter()
                .map(|name| record.content(record.field_index(name)?))
                .try_collect()?;
            let fields = (!record.is_tuple()).then(|| names.to_vec());
            Ok(RecordArray::with_length(contents, fields, record.length()).into())
        })
    }

    /// Rebuild every layer above the records around what `pick` makes of them. Parameters
    /// belong to the records and are not kept.
    fn through_records(&self, pick: &dyn Fn(&RecordArray) -> RaggedResult<Content>) -> RaggedResult<Content> {
        match self {
            Content::Empty(_) | Content::Numpy(_) => ragged_bail!(
                Index: self.class_name(),
                None,
                "fields can only be selected from records"
            ),
            Content::Record(a) => pick(a),
            Content::Indexed(a) => {
                Ok(IndexedArray::try_new(a.index().clone(), a.content().through_records(pick)?)?.into())
            }
            Content::IndexedOption(a) => Ok(IndexedOptionArray::try_new(
                a.index().clone(),
                a.content().through_records(pick)?,
            )?
            .into()),
            Content::ByteMasked(a) => Ok(ByteMaskedArray::try_new(
                a.mask().clone(),
                a.content().through_records(pick)?,
                a.valid_when(),
            )?
            .into()),
            Content::BitMasked(a) => Ok(a.with_content(a.content().through_records(pick)?).into()),
            Content::Unmasked(a) => Ok(UnmaskedArray::new(a.content().through_records(pick)?).into()),
            Content::ListOffset(a) => {
                Ok(ListOffsetArray::try_new(a.offsets().clone(), a.content().through_records(pick)?)?.into())
            }
            Content::List(a) => Ok(ListArray::try_new(
                a.starts().clone(),
                a.stops().clone(),
                a.content().through_records(pick)?,
            )?
            .into()),
            Content::Regular(a) => Ok(RegularArray::with_length(
                a.content().through_records(pick)?,
                a.size(),
                a.length(),
            )
            .into()),
            Content::Union(a) => {
                let contents: Vec<Content> = a
                    .contents()
                    .map(|c| c.through_records(pick))
                    .try_collect()?;
                UnionArray::try_new(a.tags().clone(), a.index().clone(), contents)?
                    .simplify_uniontype(true, false)
            }
        }
    }
}

/// One value, as a leaf on `backend`.
fn scalar_leaf(value: Scalar, backend: BackendRef) -> Content {
    let leaf = match value {
        Scalar::Bool(b) => NumpyArray::new(buffer![b]),
        Scalar::Int(i) => NumpyArray::new(buffer![i]),
        Scalar::UInt(u) => NumpyArray::new(buffer![u]),
        Scalar::Float(f) => NumpyArray::new(buffer![f]),
    };
    if backend.is_typetracer() {
        leaf.to_typetracer(false).into()
    } else {
        leaf.into()
    }
}

/// The present values of `option`, already filled below, with the missing ones pointing at
/// a single copy of `value`.
fn fill_option(option: &IndexedOptionArray, content: Content, value: Scalar) -> RaggedResult<Content> {
    let backend = option.backend();
    let tags = option.bytemask()?;
    let [index] = backend
        .run(
            "IndexedArray_fill_none_index",
            [(PType::I64, option.length())],
            &[option.index().data()],
            &[0],
        )
        .in_node("IndexedOptionArray")?;
    UnionArray::try_new(
        tags,
        Index::try_from_data(index, backend)?,
        vec![content, scalar_leaf(value, backend)],
    )?
    .simplify_uniontype(true, true)
}

/// Flatten every content of a union and interleave the results in the union's order.
fn flatten_union(
    union: &UnionArray,
    posaxis: usize,
    depth: usize,
) -> RaggedResult<(Option<Index>, Content)> {
    let flattened: Vec<(Option<Index>, Content)> = union
        .contents()
        .map(|c| c.offsets_and_flattened_at(posaxis, depth))
        .try_collect()?;
    let (offsets, contents): (Vec<Option<Index>>, Vec<Content>) = flattened.into_iter().unzip();
    if offsets.iter().all(Option::is_none) {
        let out = UnionArray::try_new(union.tags().clone(), union.index().clone(), contents)?;
        return Ok((None, out.into()));
    }
    let Some(offsets): Option<Vec<Index>> = offsets.into_iter().collect() else {
        ragged_bail!(AxisError: "cannot flatten a union whose contents have different depths at axis={posaxis}");
    };

    let backend = BackendRef::common(
        offsets
            .iter()
            .map(Index::backend)
            .chain([union.backend()]),
    );
    let mut alloffsets = backend.allocate(PType::I64, Length::sum(offsets.iter().map(Index::length)))?;
    let mut bases = Vec::with_capacity(offsets.len());
    let mut base = Length::ZERO;
    for o in &offsets {
        [alloffsets] = backend
            .call("NumpyArray_fill", [alloffsets], &[o.data()], &[base.as_scalar()])
            .in_node("UnionArray")?;
        bases.push(base.as_scalar());
        base = base + o.length();
    }
    let alloffsets = alloffsets.freeze();
    let bases = Index::from_i64s(bases);
    let index = union.index().to64()?;
    let inputs = [union.tags().data(), index.data(), &alloffsets, bases.data()];

    let total = backend
        .run_count("UnionArray_flatten_length", &inputs, &[])
        .in_node("UnionArray")?;
    let [totags, toindex, tooffsets] = backend
        .run(
            "UnionArray_flatten_combine",
            [
                (PType::I8, total),
                (PType::I64, total),
                (PType::I64, union.length() + 1),
            ],
            &inputs,
            &[],
        )
        .in_node("UnionArray")?;
    let out = UnionArray::try_new(
        Index::try_from_data(totags, backend)?,
        Index::try_from_data(toindex, backend)?,
        contents,
    )?
    .simplify_uniontype(true, false)?;
    Ok((Some(Index::try_from_data(tooffsets, backend)?), out))
}

#[cfg(test)]
mod test {
    use ragged_dtype::Parameters;
    use rstest::rstest;
    use serde_json::{Value, json};

    use super::*;

    /// `[[1, 2, 3], [], [4, 5]]`
    fn lists() -> Content {
        ListOffsetArray::try_new(
            Index::from_i64s([0, 3, 3, 5]),
            NumpyArray::new(buffer![1i64, 2, 3, 4, 5]),
        )
        .unwrap()
        .into()
    }

    /// `[[[1, 2], [3]], [], [[4], [5, 6, 7]]]`
    fn nested() -> Content {
        let inner = ListOffsetArray::try_new(
            Index::from_i64s([0, 2, 3, 4, 7]),
            NumpyArray::new(buffer![1i64, 2, 3, 4, 5, 6, 7]),
        )
        .unwrap();
        ListOffsetArray::try_new(Index::from_i64s([0, 2, 2, 4]), inner)
            .unwrap()
            .into()
    }

    /// `[[1, 2, 3], None, [4, 5]]`
    fn lists_with_missing() -> Content {
        IndexedOptionArray::try_new(Index::from_i64s([0, -1, 2]), lists())
            .unwrap()
            .into()
    }

    /// `[[1, 2, 3], [4, 5, 6]]`
    fn regular() -> Content {
        RegularArray::try_new(NumpyArray::new(buffer![1i64, 2, 3, 4, 5, 6]), 3, 0)
            .unwrap()
            .into()
    }

    /// `[[{x: 1, y: 1.1}, {x: 2, y: 2.2}], [], [{x: 3, y: 3.3}]]`
    fn lists_of_records() -> Content {
        let record = RecordArray::try_new(
            vec![
                NumpyArray::new(buffer![1i64, 2, 3]).into(),
                NumpyArray::new(buffer![1.1f64, 2.2, 3.3]).into(),
            ],
            Some(vec!["x".to_string(), "y".to_string()]),
            None,
        )
        .unwrap();
        ListOffsetArray::try_new(Index::from_i64s([0, 2, 2, 3]), record)
            .unwrap()
            .into()
    }

    fn strings(words: &[&str]) -> Content {
        let mut offsets = vec![0i64];
        let mut text = String::new();
        for word in words {
            text.push_str(word);
            offsets.push(text.len() as i64);
        }
        ListOffsetArray::try_new(Index::from_i64s(offsets), NumpyArray::chars(&text))
            .unwrap()
            .with_parameters(Parameters::empty().with("__array__", "string"))
            .into()
    }

    fn json(content: RaggedResult<Content>) -> Value {
        content.unwrap().to_list().unwrap()
    }

    #[rstest]
    #[case(lists(), 1, json!([3, 0, 2]))]
    #[case(lists(), -1, json!([3, 0, 2]))]
    #[case(nested(), 1, json!([2, 0, 2]))]
    #[case(nested(), 2, json!([[2, 1], [], [1, 3]]))]
    #[case(lists_with_missing(), 1, json!([3, null, 2]))]
    #[case(regular(), 1, json!([3, 3]))]
    #[case(lists_of_records(), 1, json!([2, 0, 1]))]
    fn num_counts_lists(#[case] array: Content, #[case] axis: i64, #[case] expected: Value) {
        assert_eq!(array.num(axis).unwrap().to_json().unwrap(), expected);
    }

    #[test]
    fn num_at_axis_zero_is_the_length() {
        assert_eq!(nested().num(0).unwrap().as_scalar(), Some(Scalar::Int(3)));
        assert!(lists().num(2).unwrap_err().is_axis_error());
    }

    #[rstest]
    #[case(lists(), 1, json!([1, 2, 3, 4, 5]))]
    #[case(nested(), 1, json!([[1, 2], [3], [4], [5, 6, 7]]))]
    #[case(nested(), 2, json!([[1, 2, 3], [], [4, 5, 6, 7]]))]
    #[case(lists_with_missing(), 1, json!([1, 2, 3, 4, 5]))]
    #[case(lists_with_missing(), 0, json!([[1, 2, 3], [4, 5]]))]
    #[case(regular(), -1, json!([1, 2, 3, 4, 5, 6]))]
    #[case(lists_of_records(), 1, json!([{"x": 1, "y": 1.1}, {"x": 2, "y": 2.2}, {"x": 3, "y": 3.3}]))]
    fn flatten_concatenates_lists(#[case] array: Content, #[case] axis: i64, #[case] expected: Value) {
        assert_eq!(json(array.flatten(axis)), expected);
    }

    #[test]
    fn missing_lists_flatten_to_empty_ranges() {
        let (offsets, flattened) = lists_with_missing().offsets_and_flattened(1).unwrap();
        assert_eq!(offsets.unwrap().to_vec().unwrap(), vec![0, 3, 3, 5]);
        assert_eq!(flattened.to_list().unwrap(), json!([1, 2, 3, 4, 5]));
        let (offsets, _) = nested().offsets_and_flattened(2).unwrap();
        assert!(offsets.is_none());
    }

    #[test]
    fn records_of_lists_flatten_field_by_field() {
        let record: Content = RecordArray::try_new(vec![nested(), lists()], None, None)
            .unwrap()
            .into();
        assert!(record.flatten(1).unwrap_err().is_axis_error());
        // the second field has no third dimension
        assert!(record.flatten(2).unwrap_err().is_axis_error());
    }

    #[test]
    fn unions_flatten_in_order() {
        let floats = ListOffsetArray::try_new(
            Index::from_i64s([0, 2, 3]),
            NumpyArray::new(buffer![1.1f64, 2.2, 3.3]),
        )
        .unwrap();
        let words = ListOffsetArray::try_new(Index::from_i64s([0, 2]), strings(&["a", "b"])).unwrap();
        let union: Content = UnionArray::try_new(
            Index::new(buffer![0i8, 1, 0]),
            Index::from_i64s([0, 0, 1]),
            vec![floats.into(), words.into()],
        )
        .unwrap()
        .into();
        let (offsets, flattened) = union.offsets_and_flattened(1).unwrap();
        assert_eq!(offsets.unwrap().to_vec().unwrap(), vec![0, 2, 4, 5]);
        assert_eq!(flattened.to_list().unwrap(), json!([1.1, 2.2, "a", "b", 3.3]));
    }

    #[rstest]
    #[case(lists(), 2, 1, false, json!([[1, 2, 3], [null, null], [4, 5]]))]
    #[case(lists(), 2, 1, true, json!([[1, 2], [null, null], [4, 5]]))]
    #[case(lists(), 5, 0, false, json!([[1, 2, 3], [], [4, 5], null, null]))]
    #[case(lists(), 2, 0, false, json!([[1, 2, 3], [], [4, 5]]))]
    #[case(lists(), 2, 0, true, json!([[1, 2, 3], []]))]
    #[case(regular(), 4, 1, false, json!([[1, 2, 3, null], [4, 5, 6, null]]))]
    #[case(regular(), 2, 1, false, json!([[1, 2, 3], [4, 5, 6]]))]
    #[case(regular(), 2, 1, true, json!([[1, 2], [4, 5]]))]
    #[case(nested(), 2, 2, false, json!([[[1, 2], [3, null]], [], [[4, null], [5, 6, 7]]]))]
    #[case(lists_with_missing(), 3, 1, false, json!([[1, 2, 3], null, [4, 5, null]]))]
    fn pad_none_fills_with_missing(
        #[case] array: Content,
        #[case] target: usize,
        #[case] axis: i64,
        #[case] clip: bool,
        #[case] expected: Value,
    ) {
        assert_eq!(json(array.pad_none(target, axis, clip)), expected);
    }

    #[test]
    fn clipped_lists_become_regular() {
        let padded = lists().rpad(2, 1, true).unwrap();
        assert!(matches!(padded, Content::Regular(ref r) if r.size() == 2));
    }

    #[rstest]
    #[case(lists(), 0, json!([0, 1, 2]))]
    #[case(lists(), 1, json!([[0, 1, 2], [], [0, 1]]))]
    #[case(nested(), -1, json!([[[0, 1], [0]], [], [[0], [0, 1, 2]]]))]
    #[case(nested(), 1, json!([[0, 1], [], [0, 1]]))]
    #[case(regular(), 1, json!([[0, 1, 2], [0, 1, 2]]))]
    #[case(lists_with_missing(), 1, json!([[0, 1, 2], null, [0, 1]]))]
    fn local_index_numbers_elements(#[case] array: Content, #[case] axis: i64, #[case] expected: Value) {
        assert_eq!(json(array.local_index(axis)), expected);
    }

    #[test]
    fn fill_none_replaces_missing_values() {
        let floats: Content = IndexedOptionArray::try_new(
            Index::from_i64s([0, -1, 1]),
            NumpyArray::new(buffer![1.5f64, 2.5]),
        )
        .unwrap()
        .into();
        assert_eq!(json(floats.fill_none(0.0)), json!([1.5, 0.0, 2.5]));

        let ints: Content = ByteMaskedArray::try_new(
            Index::new(buffer![1i8, 0, 1]),
            NumpyArray::new(buffer![1i64, 2, 3]),
            true,
        )
        .unwrap()
        .into();
        assert_eq!(json(ints.fill_none(-1i64)), json!([1, -1, 3]));
    }

    #[test]
    fn fill_none_reaches_inner_options() {
        let inner = IndexedOptionArray::try_new(
            Index::from_i64s([0, -1, 1]),
            NumpyArray::new(buffer![1i64, 2]),
        )
        .unwrap();
        let outer: Content = ListOffsetArray::try_new(Index::from_i64s([0, 2, 3]), inner)
            .unwrap()
            .into();
        assert_eq!(json(outer.fill_none(0i64)), json!([[1, 0], [2]]));
    }

    #[test]
    fn fill_none_of_lists_makes_a_union() {
        let filled = lists_with_missing().fill_none(0i64).unwrap();
        assert!(filled.is_union());
        assert_eq!(filled.to_list().unwrap(), json!([[1, 2, 3], 0, [4, 5]]));
    }

    #[test]
    fn fields_are_picked_through_lists() {
        assert_eq!(json(lists_of_records().getitem_field("x")), json!([[1, 2], [], [3]]));
        assert_eq!(
            json(lists_of_records().getitem_fields(&["y".to_string()])),
            json!([[{"y": 1.1}, {"y": 2.2}], [], [{"y": 3.3}]])
        );
        assert!(lists_of_records().getitem_field("z").unwrap_err().is_index_error());
        assert!(lists().getitem_field("x").unwrap_err().is_index_error());
    }

    #[test]
    fn fields_are_picked_through_options() {
        let record = RecordArray::try_new(
            vec![NumpyArray::new(buffer![1i64, 2]).into()],
            Some(vec!["x".to_string()]),
            None,
        )
        .unwrap();
        let option: Content = IndexedOptionArray::try_new(Index::from_i64s([0, -1, 1]), record)
            .unwrap()
            .into();
        assert_eq!(json(option.getitem_field("x")), json!([1, null, 2]));
    }

    #[rstest]
    #[case::num(|c: &Content| match c.num(1)? { Element::Array(a) => Ok(a), _ => unreachable!() })]
    #[case::flatten(|c: &Content| c.flatten(1))]
    #[case::pad(|c: &Content| c.pad_none(4, 1, false))]
    #[case::clip(|c: &Content| c.pad_none(2, 1, true))]
    #[case::local_index(|c: &Content| c.local_index(1))]
    fn typetracer_predicts_the_form(#[case] op: fn(&Content) -> RaggedResult<Content>) {
        for array in [lists(), lists_with_missing(), regular()] {
            let concrete = op(&array).unwrap();
            let traced = op(&array.to_typetracer(false)).unwrap();
            assert_eq!(traced.form(), concrete.form());
        }
    }
}
