//! Sorting along an axis.
//!
//! An axis is turned into a depth counted from the leaves, so that `1` is the innermost
//! dimension. Each node then either sorts the groups handed down to it or regroups its
//! children and hands the sort one level down:
//!
//! * a list above the sorted dimension makes each of its lists a group;
//! * a list at the sorted dimension regroups the `j`-th element of every list of a group, so
//!   that sorting happens across lists;
//! * option and indexed layers remove their indirection; missing values move to the end of
//!   their group when they sit at the sorted dimension and stay in place otherwise.
//!
//! Positions produced by `argsort` are local to their group, recovered from global
//! positions through the group starts and the accumulated shifts.

use itertools::Itertools;
use ragged_dtype::{IndexType, PType, Parameters};
use ragged_error::{NodeContext, RaggedResult, ragged_bail};

use crate::backend::{BackendRef, Length};
use crate::content::list_offset::last_offset;
use crate::content::{
    Content, IndexedOptionArray, ListOffsetArray, NumpyArray, RecordArray, RegularArray,
};
use crate::data::Data;
use crate::index::Index;

/// How to sort.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SortOptions {
    /// The dimension to sort along. Negative values count from the innermost dimension.
    pub axis: i64,
    pub ascending: bool,
    /// Equal values keep their order.
    pub stable: bool,
}

impl Default for SortOptions {
    fn default() -> Self {
        Self {
            axis: -1,
            ascending: true,
            stable: true,
        }
    }
}

impl SortOptions {
    fn flags(&self) -> [i64; 2] {
        [i64::from(self.ascending), i64::from(self.stable)]
    }
}

/// The depth counted from the leaves, `1` being the innermost dimension, that `axis`
/// selects in `content`.
pub(crate) fn depth_from_leaves(content: &Content, axis: i64) -> RaggedResult<usize> {
    let (branch, depth) = content.branch_depth();
    if axis >= 0 {
        if branch {
            ragged_bail!(
                AxisError: "cannot use non-negative axis={axis} on a nested list structure of variable depth"
            );
        }
        let axis = axis as usize;
        if axis >= depth {
            ragged_bail!(
                AxisError: "axis={axis} exceeds the depth of the nested list structure (which is {depth})"
            );
        }
        Ok(depth - axis)
    } else {
        let negaxis = axis.unsigned_abs() as usize;
        if negaxis > depth {
            ragged_bail!(
                AxisError: "axis={axis} exceeds the depth of the nested list structure (which is {depth})"
            );
        }
        Ok(negaxis)
    }
}

/// Where every element of a node sits among the groups of the level above.
#[derive(Clone, Debug)]
pub(crate) struct Groups {
    /// First position of every group.
    pub starts: Index,
    /// Added to a position within a group to recover the position in the group's original
    /// order, once missing elements have been dropped or lists regrouped.
    pub shifts: Option<Index>,
    /// The group of every element, non-decreasing.
    pub parents: Index,
    /// Number of groups.
    pub outlength: Length,
}

impl Groups {
    /// Every element of an array of `length` in a single group.
    pub fn whole(length: Length, backend: BackendRef) -> RaggedResult<Self> {
        Ok(Self {
            starts: Index::zeros(IndexType::I64, Length::Known(1), backend)?,
            shifts: None,
            parents: Index::zeros(IndexType::I64, length, backend)?,
            outlength: Length::Known(1),
        })
    }

    /// The shifts, or an empty index that kernels read as all zeros.
    pub fn shifts_or_empty(&self, backend: BackendRef) -> RaggedResult<Index> {
        match &self.shifts {
            Some(shifts) => Ok(shifts.clone()),
            None => Index::empty(IndexType::I64, backend),
        }
    }
}

/// Offsets of the runs of equal parents.
pub(crate) fn parent_ranges(parents: &Index, backend: BackendRef) -> RaggedResult<Index> {
    let nranges = backend.run_count("sorting_ranges_length", &[parents.data()], &[])?;
    let [offsets] = backend.run(
        "sorting_ranges",
        [(PType::I64, nranges)],
        &[parents.data()],
        &[],
    )?;
    Index::try_from_data(offsets, backend)
}

/// A list node with 64-bit offsets starting at zero, and its content trimmed to them.
pub(crate) fn compact_list(list: &Content) -> RaggedResult<(ListOffsetArray, Content)> {
    let list = list.to_list_offset_array64(true)?;
    let content = list
        .content()
        .slice(Length::ZERO, last_offset(list.offsets())?)?;
    Ok((list, content))
}

/// The list each element of a compacted list's content belongs to.
pub(crate) fn local_parents(list: &ListOffsetArray, content: &Content) -> RaggedResult<Index> {
    let backend = list.backend();
    let [parents] = backend
        .run(
            "ListOffsetArray_reduce_local_nextparents",
            [(PType::I64, content.length())],
            &[list.offsets().data()],
            &[],
        )
        .in_node("ListOffsetArray")?;
    Index::try_from_data(parents, backend)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Rearrange {
    Sort,
    Argsort,
}

impl Rearrange {
    /// Positions carry none of the parameters of the values they point at.
    fn parameters(self, parameters: &Parameters) -> Parameters {
        match self {
            Rearrange::Sort => parameters.clone(),
            Rearrange::Argsort => Parameters::empty(),
        }
    }
}

impl Content {
    /// The values sorted along `options.axis`, keeping the shape. Missing values go to the
    /// end of their list in either direction.
    pub fn sort(&self, options: &SortOptions) -> RaggedResult<Content> {
        let negaxis = depth_from_leaves(self, options.axis)?;
        let groups = Groups::whole(self.length(), self.backend())?;
        self.rearrange_next(Rearrange::Sort, negaxis, &groups, options)
    }

    /// The positions that sort along `options.axis`, local to each list.
    pub fn argsort(&self, options: &SortOptions) -> RaggedResult<Content> {
        let negaxis = depth_from_leaves(self, options.axis)?;
        let groups = Groups::whole(self.length(), self.backend())?;
        self.rearrange_next(Rearrange::Argsort, negaxis, &groups, options)
    }

    fn rearrange_next(
        &self,
        how: Rearrange,
        negaxis: usize,
        groups: &Groups,
        options: &SortOptions,
    ) -> RaggedResult<Content> {
        match self {
            Content::Empty(a) => match how {
                Rearrange::Sort => Ok(a.clone().into()),
                Rearrange::Argsort => Ok(a.to_numpy(PType::I64)?.into()),
            },
            Content::Numpy(a) => rearrange_leaf(a, how, negaxis, groups, options),
            Content::Indexed(a) => a
                .project(None)?
                .rearrange_next(how, negaxis, groups, options),
            c if c.is_option() => rearrange_option(c, how, negaxis, groups, options),
            c if c.is_string_like() => rearrange_strings(c, how, negaxis, groups, options),
            c if c.is_list() => rearrange_list(c, how, negaxis, groups, options),
            Content::Record(a) => {
                let contents: Vec<Content> = (0..a.num_fields())
                    .map(|i| a.content(i)?.rearrange_next(how, negaxis, groups, options))
                    .try_collect()?;
                Ok(RecordArray::with_length(
                    contents,
                    a.raw_fields().map(<[String]>::to_vec),
                    a.length(),
                )
                .with_parameters(how.parameters(a.parameters()))
                .into())
            }
            Content::Union(a) => match a.simplify_uniontype(true, true)? {
                Content::Union(u) => ragged_bail!(
                    TypeError: "cannot sort a union of {} incompatible types: {}",
                    u.num_contents(),
                    u.contents().map(Content::class_name).join(", ")
                ),
                simplified => simplified.rearrange_next(how, negaxis, groups, options),
            },
            c => ragged_bail!(AssertionFailed: "{} cannot be sorted", c.class_name()),
        }
    }
}

fn rearrange_leaf(
    leaf: &NumpyArray,
    how: Rearrange,
    negaxis: usize,
    groups: &Groups,
    options: &SortOptions,
) -> RaggedResult<Content> {
    if negaxis != 1 {
        ragged_bail!(AxisError: "cannot sort a flat array at depth {negaxis}");
    }
    let backend = leaf.backend().combine(groups.parents.backend());
    let offsets = parent_ranges(&groups.parents, backend)?;
    match how {
        Rearrange::Sort => {
            let [sorted] = backend
                .run(
                    "NumpyArray_sort",
                    [(leaf.ptype(), leaf.length())],
                    &[leaf.data(), offsets.data()],
                    &options.flags(),
                )
                .in_node("NumpyArray")?;
            Ok(NumpyArray::from_data(sorted, backend)
                .with_parameters(leaf.parameters().clone())
                .into())
        }
        Rearrange::Argsort => {
            let [positions] = backend
                .run(
                    "NumpyArray_argsort",
                    [(PType::I64, leaf.length())],
                    &[leaf.data(), offsets.data()],
                    &options.flags(),
                )
                .in_node("NumpyArray")?;
            local_positions(&positions, groups, backend)
        }
    }
}

/// Global sorted positions made local to their group.
fn local_positions(positions: &Data, groups: &Groups, backend: BackendRef) -> RaggedResult<Content> {
    let shifts = groups.shifts_or_empty(backend)?;
    let [local] = backend
        .run(
            "NumpyArray_argsort_adjust_starts_shifts",
            [(PType::I64, positions.length())],
            &[
                positions,
                groups.parents.data(),
                groups.starts.data(),
                shifts.data(),
            ],
            &[],
        )
        .in_node("NumpyArray")?;
    Ok(NumpyArray::from_data(local, backend).into())
}

/// Strings sort as units, bytewise.
fn rearrange_strings(
    strings: &Content,
    how: Rearrange,
    negaxis: usize,
    groups: &Groups,
    options: &SortOptions,
) -> RaggedResult<Content> {
    if negaxis != 1 {
        ragged_bail!(AxisError: "cannot sort inside strings at depth {negaxis}");
    }
    let backend = strings.backend().combine(groups.parents.backend());
    let order = string_order(strings, groups, options, backend)?;
    match how {
        Rearrange::Sort => strings.carry(&Index::try_from_data(order, backend)?, false),
        Rearrange::Argsort => local_positions(&order, groups, backend),
    }
}

/// Global positions that sort the strings of every group.
fn string_order(
    strings: &Content,
    groups: &Groups,
    options: &SortOptions,
    backend: BackendRef,
) -> RaggedResult<Data> {
    let (list, chars) = compact_list(strings)?;
    let chars = string_chars(&chars)?;
    let [order] = backend
        .run(
            "ListOffsetArray_argsort_strings",
            [(PType::I64, list.length())],
            &[groups.parents.data(), list.offsets().data(), chars.data()],
            &options.flags(),
        )
        .in_node("ListOffsetArray")?;
    Ok(order)
}

pub(crate) fn string_chars(chars: &Content) -> RaggedResult<&NumpyArray> {
    match chars {
        Content::Numpy(n) if n.ptype() == PType::U8 => Ok(n),
        other => ragged_bail!(
            TypeError: "strings must be lists of uint8 characters, not {}",
            other.class_name()
        ),
    }
}

fn rearrange_list(
    list: &Content,
    how: Rearrange,
    negaxis: usize,
    groups: &Groups,
    options: &SortOptions,
) -> RaggedResult<Content> {
    let (branch, depth) = list.branch_depth();
    let (compact, content) = compact_list(list)?;
    let backend = list.backend().combine(groups.parents.backend());

    let out = if !branch && negaxis == depth {
        let offsets = compact.offsets();
        let maxcount = backend
            .run_count(
                "ListOffsetArray_reduce_nonlocal_maxcount",
                &[offsets.data()],
                &[],
            )
            .in_node("ListOffsetArray")?;
        let shifts = groups.shifts_or_empty(backend)?;
        let nextlength = content.length();
        let [nextcarry, nextparents, nextshifts] = backend
            .run(
                "ListOffsetArray_reduce_nonlocal_preparenext",
                [
                    (PType::I64, nextlength),
                    (PType::I64, nextlength),
                    (PType::I64, nextlength),
                ],
                &[
                    offsets.data(),
                    groups.parents.data(),
                    groups.starts.data(),
                    shifts.data(),
                ],
                &[maxcount.as_scalar()],
            )
            .in_node("ListOffsetArray")?;
        let nextoutlength = groups.outlength * maxcount;
        let [nextstarts] = backend
            .run(
                "ListOffsetArray_reduce_nonlocal_nextstarts",
                [(PType::I64, nextoutlength)],
                &[&nextparents],
                &[],
            )
            .in_node("ListOffsetArray")?;
        let nextcarry = Index::try_from_data(nextcarry, backend)?;
        let next = Groups {
            starts: Index::try_from_data(nextstarts, backend)?,
            shifts: Some(Index::try_from_data(nextshifts, backend)?),
            parents: Index::try_from_data(nextparents, backend)?,
            outlength: nextoutlength,
        };
        let regrouped = content
            .carry(&nextcarry, false)?
            .rearrange_next(how, negaxis - 1, &next, options)?;
        let [outcarry] = backend
            .run(
                "ListOffsetArray_local_preparenext",
                [(PType::I64, nextlength)],
                &[nextcarry.data()],
                &[],
            )
            .in_node("ListOffsetArray")?;
        regrouped.carry(&Index::try_from_data(outcarry, backend)?, false)?
    } else {
        let next = Groups {
            starts: compact.starts()?,
            shifts: None,
            parents: local_parents(&compact, &content)?,
            outlength: compact.length(),
        };
        content.rearrange_next(how, negaxis, &next, options)?
    };

    let parameters = how.parameters(list.parameters());
    Ok(match list {
        Content::Regular(r) => RegularArray::with_length(out, r.size(), r.length())
            .with_parameters(parameters)
            .into(),
        _ => ListOffsetArray::try_new(compact.offsets().clone(), out)?
            .with_parameters(parameters)
            .into(),
    })
}

fn rearrange_option(
    option: &Content,
    how: Rearrange,
    negaxis: usize,
    groups: &Groups,
    options: &SortOptions,
) -> RaggedResult<Content> {
    let (branch, depth) = option.branch_depth();
    let at_axis = !branch && negaxis == depth;
    let indexed = option.to_indexed_option_array64()?;
    let index = indexed.index();
    let backend = option.backend().combine(groups.parents.backend());
    let present = indexed.length() - indexed.numnull()?;

    let [nextcarry, nextparents, outindex] = backend
        .run(
            "IndexedArray_reduce_next",
            [
                (PType::I64, present),
                (PType::I64, present),
                (PType::I64, indexed.length()),
            ],
            &[index.data(), groups.parents.data()],
            &[],
        )
        .in_node("IndexedOptionArray")?;
    let nextshifts = if at_axis {
        let shifts = groups.shifts_or_empty(backend)?;
        let [nextshifts] = backend
            .run(
                "IndexedArray_reduce_next_nonlocal_nextshifts",
                [(PType::I64, present)],
                &[index.data(), shifts.data()],
                &[],
            )
            .in_node("IndexedOptionArray")?;
        Some(Index::try_from_data(nextshifts, backend)?)
    } else {
        None
    };
    let next = Groups {
        starts: groups.starts.clone(),
        shifts: nextshifts,
        parents: Index::try_from_data(nextparents, backend)?,
        outlength: groups.outlength,
    };
    let out = indexed
        .content()
        .carry(&Index::try_from_data(nextcarry, backend)?, false)?
        .rearrange_next(how, negaxis, &next, options)?;
    let parameters = how.parameters(option.parameters());

    if !at_axis {
        return IndexedOptionArray::try_new(Index::try_from_data(outindex, backend)?, out)?
            .with_parameters(parameters)
            .simplify_optiontype();
    }
    match (how, &out) {
        (Rearrange::Argsort, Content::Numpy(positions)) => {
            let shifts = groups.shifts_or_empty(backend)?;
            let [merged] = backend
                .run(
                    "IndexedArray_argsort_nones_to_end",
                    [(PType::I64, indexed.length())],
                    &[
                        positions.data(),
                        index.data(),
                        groups.parents.data(),
                        groups.starts.data(),
                        shifts.data(),
                    ],
                    &[],
                )
                .in_node("IndexedOptionArray")?;
            Ok(NumpyArray::from_data(merged, backend).into())
        }
        _ => {
            let [nextoutindex] = backend
                .run(
                    "IndexedArray_local_preparenext",
                    [(PType::I64, indexed.length())],
                    &[groups.parents.data(), next.parents.data()],
                    &[],
                )
                .in_node("IndexedOptionArray")?;
            IndexedOptionArray::try_new(Index::try_from_data(nextoutindex, backend)?, out)?
                .with_parameters(parameters)
                .simplify_optiontype()
        }
    }
}

impl Content {
    /// The distinct values in ascending order. With no axis, over every value of the array;
    /// with the innermost axis, within each innermost list. Missing values are skipped.
    pub fn unique(&self, axis: Option<i64>) -> RaggedResult<Content> {
        let Some(axis) = axis else {
            let parents = Index::zeros(IndexType::I64, self.length(), self.backend())?;
            let unique = self.unique_groups(&parents, Length::Known(1))?;
            return Ok(unique.content().clone());
        };
        let negaxis = depth_from_leaves(self, axis)?;
        let (_, depth) = self.branch_depth();
        match (negaxis, depth) {
            (_, 1) => self.unique(None),
            (1, _) => self.unique_innermost(),
            _ => ragged_bail!(
                NotImplemented: "unique along axis={axis} of an array of depth {depth}; only the innermost axis or all values"
            ),
        }
    }

    /// The distinct values of every group of `parents`, as `outlength` lists.
    fn unique_groups(&self, parents: &Index, outlength: Length) -> RaggedResult<ListOffsetArray> {
        let backend = self.backend().combine(parents.backend());
        match self {
            Content::Empty(_) => ListOffsetArray::try_new(
                Index::zeros(IndexType::I64, outlength + 1, backend)?,
                self.clone(),
            ),
            Content::Numpy(leaf) => {
                let offsets = parent_ranges(parents, backend)?;
                let [sorted] = backend
                    .run(
                        "NumpyArray_sort",
                        [(leaf.ptype(), leaf.length())],
                        &[leaf.data(), offsets.data()],
                        &[1, 0],
                    )
                    .in_node("NumpyArray")?;
                let [values, outoffsets] = backend
                    .run(
                        "NumpyArray_unique_grouped",
                        [(leaf.ptype(), leaf.length()), (PType::I64, outlength + 1)],
                        &[&sorted, parents.data()],
                        &[],
                    )
                    .in_node("NumpyArray")?;
                let outoffsets = Index::try_from_data(outoffsets, backend)?;
                let values = NumpyArray::from_data(values, backend)
                    .with_parameters(leaf.parameters().clone())
                    .slice(Length::ZERO, last_offset(&outoffsets)?)?;
                ListOffsetArray::try_new(outoffsets, values)
            }
            c if c.is_string_like() => {
                let groups = Groups {
                    starts: Index::empty(IndexType::I64, backend)?,
                    shifts: None,
                    parents: parents.clone(),
                    outlength,
                };
                let options = SortOptions::default();
                let order = string_order(c, &groups, &options, backend)?;
                let sorted = c.carry(&Index::try_from_data(order, backend)?, false)?;
                let (sorted, chars) = compact_list(&sorted)?;
                let chars = string_chars(&chars)?;
                let [keep, outoffsets] = backend
                    .run(
                        "ListOffsetArray_unique_strings",
                        [(PType::I64, sorted.length()), (PType::I64, outlength + 1)],
                        &[parents.data(), sorted.offsets().data(), chars.data()],
                        &[],
                    )
                    .in_node("ListOffsetArray")?;
                let outoffsets = Index::try_from_data(outoffsets, backend)?;
                let keep = Index::try_from_data(keep, backend)?
                    .slice(Length::ZERO, last_offset(&outoffsets)?)?;
                ListOffsetArray::try_new(outoffsets, Content::from(sorted).carry(&keep, false)?)
            }
            c if c.is_option() || c.is_indexed() => {
                let indexed = c.to_indexed_option_array64()?;
                let present = indexed.length() - indexed.numnull()?;
                let [nextcarry, nextparents, _] = backend
                    .run(
                        "IndexedArray_reduce_next",
                        [
                            (PType::I64, present),
                            (PType::I64, present),
                            (PType::I64, indexed.length()),
                        ],
                        &[indexed.index().data(), parents.data()],
                        &[],
                    )
                    .in_node("IndexedOptionArray")?;
                indexed
                    .content()
                    .carry(&Index::try_from_data(nextcarry, backend)?, false)?
                    .unique_groups(&Index::try_from_data(nextparents, backend)?, outlength)
            }
            c if c.is_list() => {
                let (list, content) = compact_list(c)?;
                let nextparents = parents.carry(&local_parents(&list, &content)?)?;
                content.unique_groups(&nextparents, outlength)
            }
            Content::Union(u) => match u.simplify_uniontype(true, true)? {
                Content::Union(_) => {
                    ragged_bail!(TypeError: "cannot compute unique values of a union")
                }
                simplified => simplified.unique_groups(parents, outlength),
            },
            c => ragged_bail!(
                TypeError: "cannot compute unique values of a {}",
                c.class_name()
            ),
        }
    }

    /// Unique values within every innermost list, keeping the outer structure.
    fn unique_innermost(&self) -> RaggedResult<Content> {
        match self {
            Content::Indexed(a) => a.project(None)?.unique_innermost(),
            c if c.is_option() => {
                let indexed = c.to_indexed_option_array64()?;
                let (nextcarry, outindex) = indexed.nextcarry_outindex()?;
                let out = indexed.content().carry(&nextcarry, false)?.unique_innermost()?;
                IndexedOptionArray::try_new(outindex, out)?
                    .with_parameters(c.parameters().clone())
                    .simplify_optiontype()
            }
            c if c.is_list() && !c.is_string_like() => {
                let (list, content) = compact_list(c)?;
                if content.branch_depth().1 == 1 {
                    let parents = local_parents(&list, &content)?;
                    return Ok(content
                        .unique_groups(&parents, list.length())?
                        .with_parameters(c.parameters().clone())
                        .into());
                }
                let out = content.unique_innermost()?;
                Ok(match c {
                    Content::Regular(r) => RegularArray::with_length(out, r.size(), r.length())
                        .with_parameters(c.parameters().clone())
                        .into(),
                    _ => ListOffsetArray::try_new(list.offsets().clone(), out)?
                        .with_parameters(c.parameters().clone())
                        .into(),
                })
            }
            Content::Union(u) => match u.simplify_uniontype(true, true)? {
                Content::Union(_) => {
                    ragged_bail!(TypeError: "cannot compute unique values of a union")
                }
                simplified => simplified.unique_innermost(),
            },
            c => ragged_bail!(
                TypeError: "cannot compute unique values within a {}",
                c.class_name()
            ),
        }
    }
}
