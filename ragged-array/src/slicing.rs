//! Resolving slice expressions against a layout.
//!
//! A slice is a sequence of items. Each item that selects along a dimension consumes one
//! level of list nesting; field names, new axes and ellipses reshape without consuming one.
//! [`Content::getitem`] wraps the array in a single list so that the first item is resolved
//! like any other, then walks the items down the tree with `getitem_next`, threading the
//! NumPy-style advanced index through the recursion.

use itertools::Itertools;
use ragged_dtype::{IndexType, PType};
use ragged_error::{NodeContext, RaggedResult, ragged_bail, ragged_err};

use crate::backend::Length;
use crate::content::list_offset::last_offset;
use crate::content::{
    Content, IndexedOptionArray, ListArray, ListOffsetArray, NumpyArray, RecordArray,
    RegularArray, UnionArray, UnmaskedArray,
};
use crate::element::Element;
use crate::index::Index;
use crate::kernels::slice_indices;

/// One item of a slice expression.
#[derive(Clone, Debug)]
pub enum SliceItem {
    /// One element, counting from the end when negative.
    Int(i64),
    /// A Python-style range.
    Range(SliceRange),
    /// A record field.
    Field(String),
    /// Several record fields, kept as a record.
    Fields(Vec<String>),
    /// Insert a dimension of length one.
    NewAxis,
    /// As many full ranges as needed to reach the remaining items.
    Ellipsis,
    /// An advanced integer index.
    Array(Index),
    /// An array used as an index: integers, booleans, jagged lists of either, or any of
    /// these with missing values.
    Jagged(Content),
}

impl From<i64> for SliceItem {
    fn from(value: i64) -> Self {
        SliceItem::Int(value)
    }
}

impl From<&str> for SliceItem {
    fn from(value: &str) -> Self {
        SliceItem::Field(value.to_string())
    }
}

impl From<SliceRange> for SliceItem {
    fn from(value: SliceRange) -> Self {
        SliceItem::Range(value)
    }
}

impl From<Index> for SliceItem {
    fn from(value: Index) -> Self {
        SliceItem::Array(value)
    }
}

impl From<Content> for SliceItem {
    fn from(value: Content) -> Self {
        SliceItem::Jagged(value)
    }
}

/// `start:stop:step`, each part optional.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SliceRange {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub step: Option<i64>,
}

impl SliceRange {
    pub fn new(start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> Self {
        Self { start, stop, step }
    }

    /// `:`
    pub fn full() -> Self {
        Self::default()
    }

    fn step_or_one(&self) -> RaggedResult<i64> {
        match self.step {
            None => Ok(1),
            Some(0) => ragged_bail!("slice step cannot be zero"),
            Some(step) => Ok(step),
        }
    }

    /// The range as kernel scalars: `[start, stop, step, has_start, has_stop]`.
    fn scalars(&self) -> RaggedResult<[i64; 5]> {
        Ok([
            self.start.unwrap_or(0),
            self.stop.unwrap_or(0),
            self.step_or_one()?,
            i64::from(self.start.is_some()),
            i64::from(self.stop.is_some()),
        ])
    }
}

/// A slice item after normalization: advanced indexes are 64-bit, jagged indexes are
/// 64-bit offsets over 64-bit positions and option indexes are 64-bit option indexes.
#[derive(Clone, Debug)]
pub(crate) enum Head {
    Int(i64),
    Range(SliceRange),
    Field(String),
    Fields(Vec<String>),
    NewAxis,
    Ellipsis,
    Array(Index),
    Jagged(ListOffsetArray),
    Missing(IndexedOptionArray),
}

impl Head {
    fn consumes_dimension(&self) -> bool {
        matches!(
            self,
            Head::Int(_) | Head::Range(_) | Head::Array(_) | Head::Jagged(_) | Head::Missing(_)
        )
    }
}

fn head_tail(items: &[Head]) -> (Option<&Head>, &[Head]) {
    match items.split_first() {
        Some((head, tail)) => (Some(head), tail),
        None => (None, &[]),
    }
}

/// The advanced index to pass on: an empty one counts as none.
fn nonempty(advanced: Option<&Index>) -> Option<&Index> {
    advanced.filter(|a| !a.length().is_zero())
}

impl Content {
    /// Resolve a slice expression. An empty expression returns the array itself.
    pub fn getitem(&self, items: &[SliceItem]) -> RaggedResult<Element> {
        if items.is_empty() {
            return Ok(Element::Array(self.clone()));
        }
        let heads = normalize(items)?;
        let (head, tail) = head_tail(&heads);
        let out = self.single_list()?.getitem_next(head, tail, None)?;
        first_element(out)
    }

    /// This array as the only list of a length-one list array.
    fn single_list(&self) -> RaggedResult<Content> {
        let backend = self.backend();
        let offsets = match self.length() {
            Length::Known(n) if backend.known_data() => Index::from_i64s([0, n as i64]),
            _ => Index::zeros(IndexType::I64, Length::Known(2), backend)?,
        };
        Ok(ListOffsetArray::try_new(offsets, self.clone())?.into())
    }

    pub(crate) fn getitem_next(
        &self,
        head: Option<&Head>,
        tail: &[Head],
        advanced: Option<&Index>,
    ) -> RaggedResult<Content> {
        let Some(head) = head else {
            return Ok(self.clone());
        };
        match head {
            Head::NewAxis => {
                let (nexthead, nexttail) = head_tail(tail);
                Ok(RegularArray::try_new(self.getitem_next(nexthead, nexttail, advanced)?, 1, 0)?.into())
            }
            Head::Ellipsis => self.getitem_next_ellipsis(tail, advanced),
            Head::Field(name) => {
                let (nexthead, nexttail) = head_tail(tail);
                self.getitem_field(name)?
                    .getitem_next(nexthead, nexttail, advanced)
            }
            Head::Fields(names) => {
                let (nexthead, nexttail) = head_tail(tail);
                self.getitem_fields(names)?
                    .getitem_next(nexthead, nexttail, advanced)
            }
            Head::Missing(missing) => self.getitem_next_missing(missing, tail, advanced),
            _ => match self {
                Content::Empty(_) | Content::Numpy(_) => ragged_bail!(
                    Index: self.class_name(),
                    None,
                    "too many indices for array"
                ),
                Content::Indexed(a) => a
                    .content()
                    .carry(&a.nextcarry()?, false)?
                    .getitem_next(Some(head), tail, advanced),
                Content::IndexedOption(a) => a.getitem_next(head, tail, advanced),
                Content::ByteMasked(a) => a
                    .to_indexed_option_array64()?
                    .getitem_next(head, tail, advanced),
                Content::BitMasked(a) => a
                    .to_indexed_option_array64()?
                    .getitem_next(head, tail, advanced),
                Content::Unmasked(a) => Ok(UnmaskedArray::new(
                    a.content().getitem_next(Some(head), tail, advanced)?,
                )
                .with_parameters(a.parameters().clone())
                .into()),
                Content::ListOffset(a) => as_list_array(a)?.getitem_next(head, tail, advanced),
                Content::List(a) => a.getitem_next(head, tail, advanced),
                Content::Regular(a) => a.getitem_next(head, tail, advanced),
                Content::Record(a) => a.getitem_next(head, tail, advanced),
                Content::Union(a) => a.getitem_next(head, tail, advanced),
            },
        }
    }

    fn getitem_next_ellipsis(&self, tail: &[Head], advanced: Option<&Index>) -> RaggedResult<Content> {
        let (mindepth, maxdepth) = self.minmax_depth();
        let dimlength = tail.iter().filter(|h| h.consumes_dimension()).count();
        if tail.is_empty() || (mindepth - 1 == dimlength && maxdepth - 1 == dimlength) {
            let (nexthead, nexttail) = head_tail(tail);
            self.getitem_next(nexthead, nexttail, advanced)
        } else if mindepth - 1 == dimlength || maxdepth - 1 == dimlength {
            ragged_bail!(
                Index: self.class_name(),
                None,
                "an ellipsis (...) can't be used on data with different numbers of dimensions"
            )
        } else {
            let nexttail: Vec<Head> = std::iter::once(Head::Ellipsis)
                .chain(tail.iter().cloned())
                .collect();
            self.getitem_next(Some(&Head::Range(SliceRange::full())), &nexttail, advanced)
        }
    }

    fn getitem_next_missing(
        &self,
        head: &IndexedOptionArray,
        tail: &[Head],
        advanced: Option<&Index>,
    ) -> RaggedResult<Content> {
        if advanced.is_some() {
            ragged_bail!("cannot mix missing values in slice with NumPy-style advanced indexing");
        }
        let positions = match head.content() {
            Content::ListOffset(_) => return self.getitem_next_missing_jagged(head, tail),
            Content::Numpy(numpy) => positions(numpy)?,
            other => ragged_bail!(
                AssertionFailed: "a missing-value slice holds {}, not positions",
                other.class_name()
            ),
        };
        match self.getitem_next(Some(&Head::Array(positions)), tail, None)? {
            Content::Regular(raw) => regular_missing(head, &raw),
            Content::Record(record) => {
                let contents: Vec<Content> = (0..record.num_fields())
                    .map(|i| match record.content(i)? {
                        Content::Regular(raw) => regular_missing(head, &raw),
                        other => Err(ragged_err!(
                            NotImplemented: "a slice with missing values is not supported below a {}",
                            other.class_name()
                        )),
                    })
                    .try_collect()?;
                Ok(RecordArray::try_new(contents, record.raw_fields().map(<[String]>::to_vec), None)?
                    .with_parameters(record.parameters().clone())
                    .into())
            }
            other => ragged_bail!(
                NotImplemented: "a slice with missing values is not supported below a {}",
                other.class_name()
            ),
        }
    }

    /// An option-of-jagged slice: each row is sliced by its jagged row, or becomes missing.
    fn getitem_next_missing_jagged(
        &self,
        head: &IndexedOptionArray,
        tail: &[Head],
    ) -> RaggedResult<Content> {
        if let Length::Known(n) = self.length()
            && n != 1
        {
            ragged_bail!(
                NotImplemented: "a jagged slice with missing rows is only supported as the first slice item"
            );
        }
        let Element::Array(content) = self.getitem_at(0)? else {
            ragged_bail!(AssertionFailed: "a list element is not an array");
        };
        let index = head.index();
        let n = index.length();
        if let (Length::Known(c), Length::Known(m)) = (content.length(), n)
            && c < m
        {
            ragged_bail!(
                Index: content.class_name(),
                None,
                "cannot fit a jagged slice with missing rows of length {m} into an array of length {c}"
            );
        }
        // Present rows consume the jagged rows in order, so those must be compact.
        let rows = head.project(None)?.to_list_offset_array64(true)?;
        let backend = content.backend().combine(index.backend());
        let [mask, starts, stops] = backend
            .run(
                "Content_getitem_next_missing_jagged_getmaskstartstop",
                [(PType::I64, n), (PType::I64, n), (PType::I64, n)],
                &[index.data(), rows.offsets().data()],
                &[],
            )
            .in_node(self.class_name())?;
        let sliced = content.getitem_next_jagged(
            &Index::try_from_data(starts, backend)?,
            &Index::try_from_data(stops, backend)?,
            rows.content(),
            tail,
        )?;
        let out = IndexedOptionArray::try_new(Index::try_from_data(mask, backend)?, sliced)?
            .simplify_optiontype()?;
        Ok(RegularArray::try_new(out, n.require("a jagged slice with missing rows")?, 1)?.into())
    }

    /// Slice each element `i` by the jagged slice row `slicestarts[i]..slicestops[i]` of
    /// `slicecontent`.
    pub(crate) fn getitem_next_jagged(
        &self,
        slicestarts: &Index,
        slicestops: &Index,
        slicecontent: &Content,
        tail: &[Head],
    ) -> RaggedResult<Content> {
        if let (Length::Known(s), Length::Known(n)) = (slicestarts.length(), self.length())
            && s != n
        {
            ragged_bail!(
                Index: self.class_name(),
                None,
                "cannot fit jagged slice with length {s} into {} of size {n}",
                self.class_name()
            );
        }
        match self {
            Content::Empty(_) if slicestarts.length().is_zero() => Ok(self.clone()),
            Content::Empty(_) | Content::Numpy(_) => ragged_bail!(
                Index: self.class_name(),
                None,
                "too many jagged slice dimensions for array"
            ),
            Content::Indexed(a) => a
                .content()
                .carry(&a.nextcarry()?, false)?
                .getitem_next_jagged(slicestarts, slicestops, slicecontent, tail),
            Content::IndexedOption(a) => {
                a.getitem_next_jagged(slicestarts, slicestops, slicecontent, tail)
            }
            Content::ByteMasked(a) => a
                .to_indexed_option_array64()?
                .getitem_next_jagged(slicestarts, slicestops, slicecontent, tail),
            Content::BitMasked(a) => a
                .to_indexed_option_array64()?
                .getitem_next_jagged(slicestarts, slicestops, slicecontent, tail),
            Content::Unmasked(a) => Ok(UnmaskedArray::new(a.content().getitem_next_jagged(
                slicestarts,
                slicestops,
                slicecontent,
                tail,
            )?)
            .with_parameters(a.parameters().clone())
            .into()),
            Content::ListOffset(a) => {
                as_list_array(a)?.getitem_next_jagged(slicestarts, slicestops, slicecontent, tail)
            }
            Content::List(a) => a.getitem_next_jagged(slicestarts, slicestops, slicecontent, tail),
            Content::Regular(a) => as_list_array(&a.to_list_offset_array64(true)?)?
                .getitem_next_jagged(slicestarts, slicestops, slicecontent, tail),
            Content::Record(a) => {
                let contents: Vec<Content> = (0..a.num_fields())
                    .map(|i| {
                        a.content(i)?
                            .getitem_next_jagged(slicestarts, slicestops, slicecontent, tail)
                    })
                    .try_collect()?;
                Ok(RecordArray::with_length(
                    contents,
                    a.raw_fields().map(<[String]>::to_vec),
                    slicestarts.length(),
                )
                .with_parameters(a.parameters().clone())
                .into())
            }
            Content::Union(_) => ragged_bail!(
                NotImplemented: "cannot apply jagged slices to irreducible union arrays"
            ),
        }
    }
}

/// The list view of offsets: `starts = offsets[..n]`, `stops = offsets[1..]`.
fn as_list_array(array: &ListOffsetArray) -> RaggedResult<ListArray> {
    Ok(
        ListArray::try_new(array.starts()?, array.stops()?, array.content().clone())?
            .with_parameters(array.parameters().clone()),
    )
}

/// Element 0 of the single-list result. Shape-only results skip the bounds check and keep
/// the sliced content's form.
fn first_element(out: Content) -> RaggedResult<Element> {
    if out.backend().is_typetracer()
        && let Some(content) = out.list_content()
    {
        return Ok(Element::Array(content.clone()));
    }
    out.getitem_at(0)
}

/// Integer positions stored in a leaf, as a 64-bit index.
fn positions(numpy: &NumpyArray) -> RaggedResult<Index> {
    if !numpy.ptype().is_int() {
        ragged_bail!(
            TypeError: "only integers can be used as positions in a slice, not {}",
            numpy.ptype()
        );
    }
    let backend = numpy.backend();
    let [out] = backend
        .run(
            "NumpyArray_fill",
            [(PType::I64, numpy.length())],
            &[numpy.data()],
            &[0],
        )
        .in_node("NumpyArray")?;
    Index::try_from_data(out, backend)
}

fn positions_leaf(numpy: &NumpyArray) -> RaggedResult<Content> {
    let index = positions(numpy)?;
    Ok(NumpyArray::from_data(index.data().clone(), index.backend()).into())
}

fn normalize(items: &[SliceItem]) -> RaggedResult<Vec<Head>> {
    let mut heads: Vec<Head> = items.iter().map(normalize_item).try_collect()?;
    broadcast_advanced(&mut heads)?;
    Ok(heads)
}

fn normalize_item(item: &SliceItem) -> RaggedResult<Head> {
    Ok(match item {
        SliceItem::Int(at) => Head::Int(*at),
        SliceItem::Range(range) => {
            range.step_or_one()?;
            Head::Range(*range)
        }
        SliceItem::Field(name) => Head::Field(name.clone()),
        SliceItem::Fields(names) => Head::Fields(names.clone()),
        SliceItem::NewAxis => Head::NewAxis,
        SliceItem::Ellipsis => Head::Ellipsis,
        SliceItem::Array(index) => Head::Array(index.to64()?),
        SliceItem::Jagged(content) => normalize_content(content)?,
    })
}

/// Integer leaves are positions, boolean leaves are masks, lists are jagged slices and
/// option types are slices with missing values.
fn normalize_content(content: &Content) -> RaggedResult<Head> {
    Ok(match content {
        Content::Numpy(numpy) if numpy.ptype().is_bool() => Head::Array(numpy.nonzero()?),
        Content::Numpy(numpy) => Head::Array(positions(numpy)?),
        Content::Empty(empty) => Head::Array(Index::empty(IndexType::I64, empty.backend())?),
        c if c.is_list() => Head::Jagged(jagged_slice(c)?),
        c if c.is_option() || c.is_indexed() => {
            let option = c.to_indexed_option_array64()?;
            let inner = match option.content() {
                Content::Numpy(numpy) if numpy.ptype().is_int() => positions_leaf(numpy)?,
                Content::Empty(empty) => {
                    positions_leaf(&empty.to_numpy(PType::I64)?)?
                }
                c if c.is_list() => jagged_slice(c)?.into(),
                other => ragged_bail!(
                    TypeError: "a slice with missing values must hold integers or jagged lists, not {}",
                    other.class_name()
                ),
            };
            Head::Missing(IndexedOptionArray::try_new(option.index().clone(), inner)?)
        }
        other => ragged_bail!(
            TypeError: "only integers, ranges, fields, new axes, ellipses and integer or boolean arrays are valid slice items, not {}",
            other.class_name()
        ),
    })
}

/// A list slice as 64-bit offsets over 64-bit positions. Boolean rows become the positions
/// of their true values within the row.
fn jagged_slice(list: &Content) -> RaggedResult<ListOffsetArray> {
    let list = list.to_list_offset_array64(true)?;
    let content: Content = match list.content() {
        Content::Numpy(numpy) if numpy.ptype().is_bool() => {
            return local_true_positions(&list, numpy);
        }
        Content::Numpy(numpy) => positions_leaf(numpy)?,
        Content::Empty(empty) => positions_leaf(&empty.to_numpy(PType::I64)?)?,
        c if c.is_list() => jagged_slice(c)?.into(),
        c if c.is_option() || c.is_indexed() => ragged_bail!(
            NotImplemented: "jagged slices with missing values inside their lists are not supported"
        ),
        other => ragged_bail!(
            TypeError: "a jagged slice must hold integers or booleans, not {}",
            other.class_name()
        ),
    };
    ListOffsetArray::try_new(list.offsets().clone(), content)
}

fn local_true_positions(list: &ListOffsetArray, mask: &NumpyArray) -> RaggedResult<ListOffsetArray> {
    let backend = list.backend().combine(mask.backend());
    let inputs = [list.offsets().data(), mask.data()];
    let count = backend
        .run_count("ListArray_getitem_jagged_numtrue", &inputs, &[])
        .in_node("ListOffsetArray")?;
    let [offsets, local] = backend
        .run(
            "ListArray_getitem_jagged_localtrue",
            [(PType::I64, list.offsets().length()), (PType::I64, count)],
            &inputs,
            &[],
        )
        .in_node("ListOffsetArray")?;
    ListOffsetArray::try_new(
        Index::try_from_data(offsets, backend)?,
        NumpyArray::from_data(local, backend),
    )
}

/// Advanced indexes broadcast against each other; jagged slices do not mix with them.
fn broadcast_advanced(heads: &mut [Head]) -> RaggedResult<()> {
    let lengths: Vec<Length> = heads
        .iter()
        .filter_map(|h| match h {
            Head::Array(index) => Some(index.length()),
            _ => None,
        })
        .collect();
    if lengths.is_empty() {
        return Ok(());
    }
    if heads
        .iter()
        .any(|h| matches!(h, Head::Jagged(_) | Head::Missing(_)))
    {
        ragged_bail!("cannot mix jagged slice with NumPy-style advanced indexing");
    }
    let target = lengths
        .iter()
        .filter_map(|l| l.known())
        .max()
        .unwrap_or(0);
    for head in heads.iter_mut() {
        let Head::Array(index) = head else {
            continue;
        };
        match index.length() {
            Length::Known(n) if n == target => {}
            Length::Known(1) => {
                let zeros = Index::zeros(IndexType::I64, Length::Known(target), index.backend())?;
                *index = index.carry(&zeros)?;
            }
            Length::Known(n) => ragged_bail!(
                Index: "slice",
                None,
                "cannot broadcast advanced indexes of lengths {n} and {target}"
            ),
            Length::Unknown => {}
        }
    }
    Ok(())
}

/// Repeat the option index of a missing-value slice over the rows of the regular result.
fn regular_missing(head: &IndexedOptionArray, raw: &RegularArray) -> RaggedResult<Content> {
    let length = match raw.length() {
        Length::Known(0) => Length::Known(1),
        length => length,
    };
    let index = head.index();
    let width = index.length().require("a slice with missing values")?;
    let backend = raw.backend().combine(index.backend());
    let [outindex] = backend
        .run(
            "Content_getitem_next_missing_repeat",
            [(PType::I64, length * width)],
            &[index.data()],
            &[length.as_scalar(), raw.size() as i64],
        )
        .in_node("RegularArray")?;
    let out = IndexedOptionArray::try_new(
        Index::try_from_data(outindex, backend)?,
        raw.content().clone(),
    )?
    .simplify_optiontype()?;
    Ok(RegularArray::try_new(out, width, 1)?.into())
}

impl IndexedOptionArray {
    fn getitem_next(&self, head: &Head, tail: &[Head], advanced: Option<&Index>) -> RaggedResult<Content> {
        let (nextcarry, outindex) = self.nextcarry_outindex()?;
        let out = self
            .content()
            .carry(&nextcarry, true)?
            .getitem_next(Some(head), tail, advanced)?;
        IndexedOptionArray::try_new(outindex, out)?
            .with_parameters(self.parameters().clone())
            .simplify_optiontype()
    }

    fn getitem_next_jagged(
        &self,
        slicestarts: &Index,
        slicestops: &Index,
        slicecontent: &Content,
        tail: &[Head],
    ) -> RaggedResult<Content> {
        let (nextcarry, outindex) = self.nextcarry_outindex()?;
        let backend = self.backend().combine(slicestarts.backend());
        let [starts, stops] = backend
            .run(
                "MaskedArray_getitem_next_jagged_project",
                [
                    (PType::I64, nextcarry.length()),
                    (PType::I64, nextcarry.length()),
                ],
                &[outindex.data(), slicestarts.data(), slicestops.data()],
                &[],
            )
            .in_node("IndexedOptionArray")?;
        let out = self.content().carry(&nextcarry, true)?.getitem_next_jagged(
            &Index::try_from_data(starts, backend)?,
            &Index::try_from_data(stops, backend)?,
            slicecontent,
            tail,
        )?;
        IndexedOptionArray::try_new(outindex, out)?
            .with_parameters(self.parameters().clone())
            .simplify_optiontype()
    }
}

impl ListArray {
    fn getitem_next(&self, head: &Head, tail: &[Head], advanced: Option<&Index>) -> RaggedResult<Content> {
        let (nexthead, nexttail) = head_tail(tail);
        let lenstarts = self.length();
        let starts = self.starts();
        let stops = self.stops().slice(Length::ZERO, lenstarts)?;
        let lencontent = self.content().length().as_scalar();
        let backend = self.backend();
        match head {
            Head::Int(at) => {
                let [nextcarry] = backend
                    .run(
                        "ListArray_getitem_next_at",
                        [(PType::I64, lenstarts)],
                        &[starts.data(), stops.data()],
                        &[*at],
                    )
                    .in_node("ListArray")?;
                self.content()
                    .carry(&Index::try_from_data(nextcarry, backend)?, true)?
                    .getitem_next(nexthead, nexttail, advanced)
            }
            Head::Range(range) => {
                let scalars = range.scalars()?;
                let carrylength = backend
                    .run_count(
                        "ListArray_getitem_next_range_carrylength",
                        &[starts.data(), stops.data()],
                        &scalars,
                    )
                    .in_node("ListArray")?;
                let [nextoffsets, nextcarry] = backend
                    .run(
                        "ListArray_getitem_next_range",
                        [(PType::I64, lenstarts + 1), (PType::I64, carrylength)],
                        &[starts.data(), stops.data()],
                        &scalars,
                    )
                    .in_node("ListArray")?;
                let nextcontent = self
                    .content()
                    .carry(&Index::try_from_data(nextcarry, backend)?, true)?;
                let out = match nonempty(advanced) {
                    None => nextcontent.getitem_next(nexthead, nexttail, advanced)?,
                    Some(advanced) => {
                        let [nextadvanced] = backend
                            .run(
                                "ListArray_getitem_next_range_spreadadvanced",
                                [(PType::I64, carrylength)],
                                &[advanced.data(), &nextoffsets],
                                &[],
                            )
                            .in_node("ListArray")?;
                        nextcontent.getitem_next(
                            nexthead,
                            nexttail,
                            Some(&Index::try_from_data(nextadvanced, backend)?),
                        )?
                    }
                };
                Ok(ListOffsetArray::try_new(Index::try_from_data(nextoffsets, backend)?, out)?.into())
            }
            Head::Array(flathead) => {
                let backend = backend.combine(flathead.backend());
                match nonempty(advanced) {
                    None => {
                        let width = flathead.length();
                        let [nextcarry, nextadvanced] = backend
                            .run(
                                "ListArray_getitem_next_array",
                                [
                                    (PType::I64, lenstarts * width),
                                    (PType::I64, lenstarts * width),
                                ],
                                &[starts.data(), stops.data(), flathead.data()],
                                &[lencontent],
                            )
                            .in_node("ListArray")?;
                        let out = self
                            .content()
                            .carry(&Index::try_from_data(nextcarry, backend)?, true)?
                            .getitem_next(
                                nexthead,
                                nexttail,
                                Some(&Index::try_from_data(nextadvanced, backend)?),
                            )?;
                        Ok(RegularArray::with_length(out, width.require("an advanced index")?, lenstarts).into())
                    }
                    Some(advanced) => {
                        let [nextcarry, nextadvanced] = backend
                            .run(
                                "ListArray_getitem_next_array_advanced",
                                [(PType::I64, lenstarts), (PType::I64, lenstarts)],
                                &[starts.data(), stops.data(), flathead.data(), advanced.data()],
                                &[lencontent],
                            )
                            .in_node("ListArray")?;
                        self.content()
                            .carry(&Index::try_from_data(nextcarry, backend)?, true)?
                            .getitem_next(
                                nexthead,
                                nexttail,
                                Some(&Index::try_from_data(nextadvanced, backend)?),
                            )
                    }
                }
            }
            Head::Jagged(jagged) => {
                if advanced.is_some() {
                    ragged_bail!("cannot mix jagged slice with NumPy-style advanced indexing");
                }
                let jaggedsize = jagged.length();
                let total = lenstarts * jaggedsize;
                let backend = backend.combine(jagged.backend());
                let [multistarts, multistops, nextcarry] = backend
                    .run(
                        "ListArray_getitem_jagged_expand",
                        [(PType::I64, total), (PType::I64, total), (PType::I64, total)],
                        &[jagged.offsets().data(), starts.data(), stops.data()],
                        &[jaggedsize.as_scalar()],
                    )
                    .in_node("ListArray")?;
                let down = self
                    .content()
                    .carry(&Index::try_from_data(nextcarry, backend)?, true)?
                    .getitem_next_jagged(
                        &Index::try_from_data(multistarts, backend)?,
                        &Index::try_from_data(multistops, backend)?,
                        jagged.content(),
                        tail,
                    )?;
                Ok(RegularArray::with_length(down, jaggedsize.require("a jagged slice")?, lenstarts).into())
            }
            other => ragged_bail!(AssertionFailed: "{other:?} should have been resolved above ListArray"),
        }
    }

    fn getitem_next_jagged(
        &self,
        slicestarts: &Index,
        slicestops: &Index,
        slicecontent: &Content,
        tail: &[Head],
    ) -> RaggedResult<Content> {
        let backend = self.backend().combine(slicestarts.backend());
        let starts = self.starts();
        let stops = self.stops().slice(Length::ZERO, self.length())?;
        match slicecontent {
            Content::Numpy(numpy) => {
                let sliceindex = positions(numpy)?;
                let carrylen = backend
                    .run_count(
                        "ListArray_getitem_jagged_carrylen",
                        &[slicestarts.data(), slicestops.data()],
                        &[],
                    )
                    .in_node("ListArray")?;
                let [outoffsets, nextcarry] = backend
                    .run(
                        "ListArray_getitem_jagged_apply",
                        [(PType::I64, slicestarts.length() + 1), (PType::I64, carrylen)],
                        &[
                            slicestarts.data(),
                            slicestops.data(),
                            sliceindex.data(),
                            starts.data(),
                            stops.data(),
                        ],
                        &[self.content().length().as_scalar()],
                    )
                    .in_node("ListArray")?;
                let (nexthead, nexttail) = head_tail(tail);
                let out = self
                    .content()
                    .carry(&Index::try_from_data(nextcarry, backend)?, true)?
                    .getitem_next(nexthead, nexttail, None)?;
                Ok(ListOffsetArray::try_new(Index::try_from_data(outoffsets, backend)?, out)?.into())
            }
            Content::ListOffset(inner) => {
                let [outoffsets] = backend
                    .run(
                        "ListArray_getitem_jagged_descend",
                        [(PType::I64, slicestarts.length() + 1)],
                        &[slicestarts.data(), slicestops.data(), starts.data(), stops.data()],
                        &[],
                    )
                    .in_node("ListArray")?;
                let outoffsets = Index::try_from_data(outoffsets, backend)?;
                let total = last_offset(&outoffsets)?;
                let [nextcarry] = backend
                    .run(
                        "ListArray_compact_carry",
                        [(PType::I64, total)],
                        &[starts.data(), stops.data()],
                        &[],
                    )
                    .in_node("ListArray")?;
                let [slicerows] = backend
                    .run(
                        "ListArray_compact_carry",
                        [(PType::I64, total)],
                        &[slicestarts.data(), slicestops.data()],
                        &[],
                    )
                    .in_node("ListArray")?;
                let slicerows = Index::try_from_data(slicerows, backend)?;
                let down = self
                    .content()
                    .carry(&Index::try_from_data(nextcarry, backend)?, true)?
                    .getitem_next_jagged(
                        &inner.starts()?.carry(&slicerows)?,
                        &inner.stops()?.carry(&slicerows)?,
                        inner.content(),
                        tail,
                    )?;
                Ok(ListOffsetArray::try_new(outoffsets, down)?.into())
            }
            other => ragged_bail!(
                AssertionFailed: "a jagged slice holds {}, not positions or lists",
                other.class_name()
            ),
        }
    }
}

impl RegularArray {
    fn getitem_next(&self, head: &Head, tail: &[Head], advanced: Option<&Index>) -> RaggedResult<Content> {
        let (nexthead, nexttail) = head_tail(tail);
        let len = self.length();
        let size = self.size() as i64;
        let backend = self.backend();
        match head {
            Head::Int(at) => {
                let [nextcarry] = backend
                    .run(
                        "RegularArray_getitem_next_at",
                        [(PType::I64, len)],
                        &[],
                        &[*at, len.as_scalar(), size],
                    )
                    .in_node("RegularArray")?;
                self.content()
                    .carry(&Index::try_from_data(nextcarry, backend)?, true)?
                    .getitem_next(nexthead, nexttail, advanced)
            }
            Head::Range(range) => {
                let (_, _, nextsize) =
                    slice_indices(range.start, range.stop, range.step_or_one()?, size);
                let scalars = range.scalars()?;
                let [nextcarry] = backend
                    .run(
                        "RegularArray_getitem_next_range",
                        [(PType::I64, len * nextsize)],
                        &[],
                        &[
                            scalars[0],
                            scalars[1],
                            scalars[2],
                            scalars[3],
                            scalars[4],
                            len.as_scalar(),
                            size,
                        ],
                    )
                    .in_node("RegularArray")?;
                let nextcontent = self
                    .content()
                    .carry(&Index::try_from_data(nextcarry, backend)?, true)?;
                let out = match nonempty(advanced) {
                    None => nextcontent.getitem_next(nexthead, nexttail, advanced)?,
                    Some(advanced) => {
                        let [nextadvanced] = backend
                            .run(
                                "RegularArray_getitem_next_range_spreadadvanced",
                                [(PType::I64, len * nextsize)],
                                &[advanced.data()],
                                &[nextsize as i64],
                            )
                            .in_node("RegularArray")?;
                        nextcontent.getitem_next(
                            nexthead,
                            nexttail,
                            Some(&Index::try_from_data(nextadvanced, backend)?),
                        )?
                    }
                };
                Ok(RegularArray::with_length(out, nextsize, len).into())
            }
            Head::Array(flathead) => {
                let backend = backend.combine(flathead.backend());
                let width = flathead.length();
                let [regular] = backend
                    .run(
                        "RegularArray_getitem_next_array_regularize",
                        [(PType::I64, width)],
                        &[flathead.data()],
                        &[size],
                    )
                    .in_node("RegularArray")?;
                match nonempty(advanced) {
                    None => {
                        let [nextcarry, nextadvanced] = backend
                            .run(
                                "RegularArray_getitem_next_array",
                                [(PType::I64, len * width), (PType::I64, len * width)],
                                &[&regular],
                                &[len.as_scalar(), size],
                            )
                            .in_node("RegularArray")?;
                        let out = self
                            .content()
                            .carry(&Index::try_from_data(nextcarry, backend)?, true)?
                            .getitem_next(
                                nexthead,
                                nexttail,
                                Some(&Index::try_from_data(nextadvanced, backend)?),
                            )?;
                        Ok(RegularArray::with_length(out, width.require("an advanced index")?, len).into())
                    }
                    Some(advanced) => {
                        let [nextcarry, nextadvanced] = backend
                            .run(
                                "RegularArray_getitem_next_array_advanced",
                                [(PType::I64, len), (PType::I64, len)],
                                &[advanced.data(), &regular],
                                &[len.as_scalar(), size],
                            )
                            .in_node("RegularArray")?;
                        self.content()
                            .carry(&Index::try_from_data(nextcarry, backend)?, true)?
                            .getitem_next(
                                nexthead,
                                nexttail,
                                Some(&Index::try_from_data(nextadvanced, backend)?),
                            )
                    }
                }
            }
            Head::Jagged(jagged) => {
                if advanced.is_some() {
                    ragged_bail!("cannot mix jagged slice with NumPy-style advanced indexing");
                }
                if let Length::Known(n) = jagged.length()
                    && n as i64 != size
                {
                    ragged_bail!(
                        Index: "RegularArray",
                        None,
                        "cannot fit jagged slice with length {n} into RegularArray of size {size}"
                    );
                }
                let backend = backend.combine(jagged.backend());
                let [multistarts, multistops] = backend
                    .run(
                        "RegularArray_getitem_jagged_expand",
                        [(PType::I64, len * self.size()), (PType::I64, len * self.size())],
                        &[jagged.offsets().data()],
                        &[len.as_scalar()],
                    )
                    .in_node("RegularArray")?;
                let down = self
                    .content()
                    .slice(Length::ZERO, len * self.size())?
                    .getitem_next_jagged(
                        &Index::try_from_data(multistarts, backend)?,
                        &Index::try_from_data(multistops, backend)?,
                        jagged.content(),
                        tail,
                    )?;
                Ok(RegularArray::with_length(down, self.size(), len).into())
            }
            other => ragged_bail!(AssertionFailed: "{other:?} should have been resolved above RegularArray"),
        }
    }
}

impl RecordArray {
    fn getitem_next(&self, head: &Head, tail: &[Head], advanced: Option<&Index>) -> RaggedResult<Content> {
        if self.num_fields() == 0 {
            ragged_bail!(NotImplemented: "cannot slice through a record with no fields");
        }
        let (nexthead, nexttail) = head_tail(tail);
        let contents: Vec<Content> = (0..self.num_fields())
            .map(|i| self.content(i)?.getitem_next(Some(head), &[], advanced))
            .try_collect()?;
        let next = RecordArray::try_new(contents, self.raw_fields().map(<[String]>::to_vec), None)?
            .with_parameters(self.parameters().clone());
        Content::from(next).getitem_next(nexthead, nexttail, advanced)
    }
}

impl UnionArray {
    fn getitem_next(&self, head: &Head, tail: &[Head], advanced: Option<&Index>) -> RaggedResult<Content> {
        if nonempty(advanced).is_some() {
            ragged_bail!(
                NotImplemented: "cannot mix NumPy-style advanced indexing with a union of types"
            );
        }
        let outcontents: Vec<Content> = (0..self.num_contents())
            .map(|i| self.project(i)?.getitem_next(Some(head), tail, advanced))
            .try_collect()?;
        let outindex = UnionArray::regular_index(self.tags(), self.num_contents())?;
        UnionArray::try_new(self.tags().clone(), outindex, outcontents)?
            .with_parameters(self.parameters().clone())
            .simplify_uniontype(true, false)
    }
}

#[cfg(test)]
mod test {
    use ragged_buffer::buffer;
    use ragged_dtype::Parameters;
    use rstest::rstest;
    use serde_json::{Value, json};

    use super::*;
    use crate::content::IndexedArray;

    fn jagged() -> Content {
        ListOffsetArray::try_new(
            Index::from_i64s([0, 3, 3, 5]),
            NumpyArray::new(buffer![1.1f64, 2.2, 3.3, 4.4, 5.5]),
        )
        .unwrap()
        .into()
    }

    fn grid() -> Content {
        RegularArray::try_new(NumpyArray::new(buffer![0i64, 1, 2, 3, 4, 5]), 3, 0)
            .unwrap()
            .into()
    }

    fn rendered(array: &Content, items: &[SliceItem]) -> Value {
        array.getitem(items).unwrap().to_json().unwrap()
    }

    #[test]
    fn no_items_is_identity() {
        assert_eq!(rendered(&jagged(), &[]), jagged().to_list().unwrap());
    }

    #[rstest]
    #[case(SliceRange::new(None, None, Some(-1)), json!([[4.4, 5.5], [], [1.1, 2.2, 3.3]]))]
    #[case(SliceRange::new(Some(1), None, None), json!([[], [4.4, 5.5]]))]
    #[case(SliceRange::new(None, None, Some(2)), json!([[1.1, 2.2, 3.3], [4.4, 5.5]]))]
    fn ranges_select_lists(#[case] range: SliceRange, #[case] expected: Value) {
        assert_eq!(rendered(&jagged(), &[range.into()]), expected);
    }

    #[test]
    fn integers_select_inside_lists() {
        assert_eq!(rendered(&jagged(), &[SliceItem::Int(1)]), json!([]));
        let full: Content = ListOffsetArray::try_new(
            Index::from_i64s([0, 3, 4, 6]),
            NumpyArray::new(buffer![1i64, 2, 3, 4, 5, 6]),
        )
        .unwrap()
        .into();
        assert_eq!(
            rendered(&full, &[SliceRange::full().into(), SliceItem::Int(-1)]),
            json!([3, 4, 6])
        );
    }

    #[test]
    fn empty_lists_have_no_last_item() {
        let err = jagged()
            .getitem(&[SliceRange::full().into(), SliceItem::Int(-1)])
            .unwrap_err();
        assert!(err.is_index_error());
    }

    #[test]
    fn reversed_inner_ranges() {
        assert_eq!(
            rendered(
                &jagged(),
                &[SliceRange::full().into(), SliceRange::new(None, None, Some(-1)).into()]
            ),
            json!([[3.3, 2.2, 1.1], [], [5.5, 4.4]])
        );
    }

    #[test]
    fn advanced_indexes_pair_up() {
        let items = [
            Index::from_i64s([1, 0]).into(),
            Index::from_i64s([2, 0]).into(),
        ];
        assert_eq!(rendered(&grid(), &items), json!([5, 0]));
    }

    #[test]
    fn advanced_indexes_broadcast_length_one() {
        let items = [Index::from_i64s([1]).into(), Index::from_i64s([2, 0]).into()];
        assert_eq!(rendered(&grid(), &items), json!([5, 3]));
    }

    #[test]
    fn boolean_masks_select_positions() {
        let mask: Content = NumpyArray::new(buffer![true, false, true]).into();
        assert_eq!(rendered(&jagged(), &[mask.into()]), json!([[1.1, 2.2, 3.3], [4.4, 5.5]]));
    }

    #[test]
    fn jagged_slices_pick_within_each_list() {
        let slice: Content = ListOffsetArray::try_new(
            Index::from_i64s([0, 2, 2, 3]),
            NumpyArray::new(buffer![2i64, 0, -1]),
        )
        .unwrap()
        .into();
        assert_eq!(rendered(&jagged(), &[slice.into()]), json!([[3.3, 1.1], [], [5.5]]));
    }

    #[test]
    fn jagged_slice_must_match_length() {
        let slice: Content =
            ListOffsetArray::try_new(Index::from_i64s([0, 1]), NumpyArray::new(buffer![0i64]))
                .unwrap()
                .into();
        assert!(jagged().getitem(&[slice.into()]).is_err());
    }

    #[test]
    fn boolean_jagged_slices_keep_true_items() {
        let slice: Content = ListOffsetArray::try_new(
            Index::from_i64s([0, 3, 3, 5]),
            NumpyArray::new(buffer![false, true, true, true, false]),
        )
        .unwrap()
        .into();
        assert_eq!(rendered(&jagged(), &[slice.into()]), json!([[2.2, 3.3], [], [4.4]]));
    }

    #[test]
    fn missing_positions_become_missing_elements() {
        let array: Content = NumpyArray::new(buffer![10i64, 20, 30]).into();
        let slice: Content = IndexedOptionArray::try_new(
            Index::from_i64s([0, -1, 1]),
            NumpyArray::new(buffer![2i64, 0]),
        )
        .unwrap()
        .into();
        assert_eq!(rendered(&array, &[slice.into()]), json!([30, null, 10]));
    }

    #[test]
    fn missing_jagged_rows_become_missing_lists() {
        let rows = ListOffsetArray::try_new(
            Index::from_i64s([0, 1, 2]),
            NumpyArray::new(buffer![0i64, 1]),
        )
        .unwrap();
        let slice: Content = IndexedOptionArray::try_new(Index::from_i64s([0, -1, 1]), rows)
            .unwrap()
            .into();
        assert_eq!(rendered(&jagged(), &[slice.into()]), json!([[1.1], null, [5.5]]));
    }

    #[test]
    fn missing_jagged_rows_skip_unused_slice_rows() {
        let rows = ListOffsetArray::try_new(
            Index::from_i64s([0, 1, 2, 3]),
            NumpyArray::new(buffer![0i64, 7, 1]),
        )
        .unwrap();
        let slice: Content = IndexedOptionArray::try_new(Index::from_i64s([0, -1, 2]), rows)
            .unwrap()
            .into();
        assert_eq!(rendered(&jagged(), &[slice.into()]), json!([[1.1], null, [5.5]]));
    }

    #[test]
    fn missing_jagged_rows_over_missing_lists() {
        let lists = ListOffsetArray::try_new(
            Index::from_i64s([0, 3, 3, 5]),
            NumpyArray::new(buffer![3i64, 2, 1, 4, 5]),
        )
        .unwrap();
        let array: Content = IndexedOptionArray::try_new(Index::from_i64s([0, 1, -1, 2]), lists)
            .unwrap()
            .into();
        let rows = ListOffsetArray::try_new(
            Index::from_i64s([0, 3, 3, 5]),
            NumpyArray::new(buffer![2i64, 1, 0, 0, 1]),
        )
        .unwrap();
        let slice: Content = IndexedOptionArray::try_new(Index::from_i64s([0, 1, -1, 2]), rows)
            .unwrap()
            .into();
        assert_eq!(
            rendered(&array, &[slice.into()]),
            json!([[1, 2, 3], [], null, [4, 5]])
        );
    }

    #[test]
    fn new_axis_and_ellipsis() {
        let flat: Content = NumpyArray::new(buffer![1i64, 2]).into();
        assert_eq!(rendered(&flat, &[SliceItem::NewAxis]), json!([[1, 2]]));
        assert_eq!(rendered(&grid(), &[SliceItem::Ellipsis, SliceItem::Int(1)]), json!([1, 4]));
    }

    #[test]
    fn indexed_layers_are_looked_through() {
        let indexed: Content = IndexedArray::try_new(Index::from_i64s([2, 0]), jagged())
            .unwrap()
            .into();
        assert_eq!(
            rendered(&indexed, &[SliceRange::full().into(), SliceItem::Int(0)]),
            json!([4.4, 1.1])
        );
    }

    #[test]
    fn option_layers_keep_missing_rows() {
        let option: Content = IndexedOptionArray::try_new(Index::from_i64s([2, -1, 0]), jagged())
            .unwrap()
            .into();
        assert_eq!(
            rendered(&option, &[SliceRange::full().into(), SliceItem::Int(0)]),
            json!([4.4, null, 1.1])
        );
    }

    #[test]
    fn fields_select_columns() {
        let record: Content = RecordArray::try_new(
            vec![jagged(), NumpyArray::new(buffer![1i64, 2, 3]).into()],
            Some(vec!["x".into(), "y".into()]),
            None,
        )
        .unwrap()
        .with_parameters(Parameters::empty())
        .into();
        assert_eq!(rendered(&record, &["y".into()]), json!([1, 2, 3]));
        assert_eq!(
            rendered(&record, &[SliceRange::new(Some(2), None, None).into(), "x".into()]),
            json!([[4.4, 5.5]])
        );
    }

    #[test]
    fn typetracer_predicts_the_form() {
        let items = [SliceRange::full().into(), SliceRange::new(Some(1), None, None).into()];
        let concrete = jagged().getitem(&items).unwrap();
        let traced = jagged().to_typetracer(true).getitem(&items).unwrap();
        assert_eq!(
            concrete.as_array().unwrap().form(),
            traced.as_array().unwrap().form()
        );
        assert_eq!(traced.as_array().unwrap().length(), Length::Unknown);
    }

    #[test]
    fn zero_step_is_rejected() {
        assert!(
            jagged()
                .getitem(&[SliceRange::new(None, None, Some(0)).into()])
                .is_err()
        );
    }
}
