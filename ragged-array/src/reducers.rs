//! Reductions along an axis.
//!
//! Every reducer is a segmented reduction: it reads a flat leaf plus the group of every
//! element and writes one value per group. [`Content::reduce`] does the bookkeeping around
//! it. Lists above the reduced dimension keep their shape, a list at the reduced dimension
//! collapses by combining the `j`-th elements of its lists, and option layers drop missing
//! values before reducing.

use itertools::Itertools;
use ragged_dtype::PType;
use ragged_error::{NodeContext, RaggedResult, ragged_bail};

use crate::backend::{BackendRef, Length};
use crate::content::{
    ByteMaskedArray, Content, IndexedOptionArray, ListArray, ListOffsetArray, NumpyArray,
    RecordArray, RegularArray,
};
use crate::element::Element;
use crate::index::Index;
use crate::sorting::{Groups, compact_list, depth_from_leaves, local_parents};

/// A segmented reduction over a flat leaf.
pub trait Reducer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the results are positions in the leaf, which the caller makes local to each
    /// group.
    fn needs_position(&self) -> bool {
        false
    }

    /// Whether empty groups become missing values when the caller leaves `mask` unset.
    /// Positions have no meaningful identity, so the arg-reducers mask.
    fn masks_identity(&self) -> bool {
        self.needs_position()
    }

    /// The type of the result for a leaf of `ptype`.
    fn return_ptype(&self, ptype: PType) -> PType;

    /// One value per group of `parents`, `outlength` in all. Empty groups get the identity.
    fn apply(&self, leaf: &NumpyArray, parents: &Index, outlength: Length) -> RaggedResult<NumpyArray>;
}

/// Run the kernel `name` over `leaf` grouped by `parents`.
fn reduce_with(
    reducer: &dyn Reducer,
    kernel: &'static str,
    leaf: &NumpyArray,
    parents: &Index,
    outlength: Length,
) -> RaggedResult<NumpyArray> {
    let backend = leaf.backend().combine(parents.backend());
    let [out] = backend
        .run(
            kernel,
            [(reducer.return_ptype(leaf.ptype()), outlength)],
            &[leaf.data(), parents.data()],
            &[],
        )
        .in_node("NumpyArray")?;
    Ok(NumpyArray::from_data(out, backend))
}

/// Sums and products widen integers to 64 bits, keeping signedness.
fn widened(ptype: PType) -> PType {
    if ptype.is_unsigned_int() {
        PType::U64
    } else if ptype.is_float() {
        ptype
    } else {
        PType::I64
    }
}

/// Number of elements.
#[derive(Debug, Clone, Copy, Default)]
pub struct Count;

impl Reducer for Count {
    fn name(&self) -> &'static str {
        "count"
    }

    fn return_ptype(&self, _: PType) -> PType {
        PType::I64
    }

    fn apply(&self, leaf: &NumpyArray, parents: &Index, outlength: Length) -> RaggedResult<NumpyArray> {
        let backend = leaf.backend().combine(parents.backend());
        let [out] = backend
            .run("reduce_count", [(PType::I64, outlength)], &[parents.data()], &[])
            .in_node("NumpyArray")?;
        Ok(NumpyArray::from_data(out, backend))
    }
}

/// Number of elements that are not zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct CountNonzero;

impl Reducer for CountNonzero {
    fn name(&self) -> &'static str {
        "count_nonzero"
    }

    fn return_ptype(&self, _: PType) -> PType {
        PType::I64
    }

    fn apply(&self, leaf: &NumpyArray, parents: &Index, outlength: Length) -> RaggedResult<NumpyArray> {
        reduce_with(self, "reduce_countnonzero", leaf, parents, outlength)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Sum;

impl Reducer for Sum {
    fn name(&self) -> &'static str {
        "sum"
    }

    fn return_ptype(&self, ptype: PType) -> PType {
        widened(ptype)
    }

    fn apply(&self, leaf: &NumpyArray, parents: &Index, outlength: Length) -> RaggedResult<NumpyArray> {
        reduce_with(self, "reduce_sum", leaf, parents, outlength)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Prod;

impl Reducer for Prod {
    fn name(&self) -> &'static str {
        "prod"
    }

    fn return_ptype(&self, ptype: PType) -> PType {
        widened(ptype)
    }

    fn apply(&self, leaf: &NumpyArray, parents: &Index, outlength: Length) -> RaggedResult<NumpyArray> {
        reduce_with(self, "reduce_prod", leaf, parents, outlength)
    }
}

/// Whether some element is not zero. Empty groups are false.
#[derive(Debug, Clone, Copy, Default)]
pub struct Any;

impl Reducer for Any {
    fn name(&self) -> &'static str {
        "any"
    }

    fn return_ptype(&self, _: PType) -> PType {
        PType::Bool
    }

    fn apply(&self, leaf: &NumpyArray, parents: &Index, outlength: Length) -> RaggedResult<NumpyArray> {
        reduce_with(self, "reduce_sum_bool", leaf, parents, outlength)
    }
}

/// Whether every element is not zero. Empty groups are true.
#[derive(Debug, Clone, Copy, Default)]
pub struct All;

impl Reducer for All {
    fn name(&self) -> &'static str {
        "all"
    }

    fn return_ptype(&self, _: PType) -> PType {
        PType::Bool
    }

    fn apply(&self, leaf: &NumpyArray, parents: &Index, outlength: Length) -> RaggedResult<NumpyArray> {
        reduce_with(self, "reduce_prod_bool", leaf, parents, outlength)
    }
}

/// The smallest element. Empty groups get the largest value of the type.
#[derive(Debug, Clone, Copy, Default)]
pub struct Min;

impl Reducer for Min {
    fn name(&self) -> &'static str {
        "min"
    }

    fn return_ptype(&self, ptype: PType) -> PType {
        ptype
    }

    fn apply(&self, leaf: &NumpyArray, parents: &Index, outlength: Length) -> RaggedResult<NumpyArray> {
        reduce_with(self, "reduce_min", leaf, parents, outlength)
    }
}

/// The largest element. Empty groups get the smallest value of the type.
#[derive(Debug, Clone, Copy, Default)]
pub struct Max;

impl Reducer for Max {
    fn name(&self) -> &'static str {
        "max"
    }

    fn return_ptype(&self, ptype: PType) -> PType {
        ptype
    }

    fn apply(&self, leaf: &NumpyArray, parents: &Index, outlength: Length) -> RaggedResult<NumpyArray> {
        reduce_with(self, "reduce_max", leaf, parents, outlength)
    }
}

/// Position of the first smallest element. Empty groups are missing, or `-1` when unmasked.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArgMin;

impl Reducer for ArgMin {
    fn name(&self) -> &'static str {
        "argmin"
    }

    fn needs_position(&self) -> bool {
        true
    }

    fn return_ptype(&self, _: PType) -> PType {
        PType::I64
    }

    fn apply(&self, leaf: &NumpyArray, parents: &Index, outlength: Length) -> RaggedResult<NumpyArray> {
        reduce_with(self, "reduce_argmin", leaf, parents, outlength)
    }
}

/// Position of the first largest element. Empty groups are missing, or `-1` when unmasked.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArgMax;

impl Reducer for ArgMax {
    fn name(&self) -> &'static str {
        "argmax"
    }

    fn needs_position(&self) -> bool {
        true
    }

    fn return_ptype(&self, _: PType) -> PType {
        PType::I64
    }

    fn apply(&self, leaf: &NumpyArray, parents: &Index, outlength: Length) -> RaggedResult<NumpyArray> {
        reduce_with(self, "reduce_argmax", leaf, parents, outlength)
    }
}

/// How to reduce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReduceOptions {
    /// The dimension to reduce. Negative values count from the innermost dimension.
    pub axis: i64,
    /// Empty groups become missing values instead of the reducer's identity. Unset, the
    /// reducer decides.
    pub mask: Option<bool>,
    /// Keep the reduced dimension as lists of length one.
    pub keepdims: bool,
}

impl Default for ReduceOptions {
    fn default() -> Self {
        Self {
            axis: -1,
            mask: None,
            keepdims: false,
        }
    }
}

impl Content {
    /// Reduce along `options.axis`. Reducing a flat array yields a scalar; otherwise the
    /// result is an array with one dimension fewer, or the same number with `keepdims`.
    pub fn reduce(&self, reducer: &dyn Reducer, options: &ReduceOptions) -> RaggedResult<Element> {
        let negaxis = depth_from_leaves(self, options.axis)?;
        log::debug!(
            "{} over {} at depth {negaxis} from the leaves",
            reducer.name(),
            self.class_name()
        );
        let groups = Groups::whole(self.length(), self.backend())?;
        self.reduce_next(reducer, negaxis, &groups, options)?
            .getitem_at(0)
    }

    fn reduce_next(
        &self,
        reducer: &dyn Reducer,
        negaxis: usize,
        groups: &Groups,
        options: &ReduceOptions,
    ) -> RaggedResult<Content> {
        match self {
            Content::Empty(a) => reduce_leaf(&a.to_numpy(PType::F64)?, reducer, negaxis, groups, options),
            Content::Numpy(a) => reduce_leaf(a, reducer, negaxis, groups, options),
            Content::Indexed(a) => a
                .project(None)?
                .reduce_next(reducer, negaxis, groups, options),
            c if c.is_option() => reduce_option(c, reducer, negaxis, groups, options),
            c if c.is_string_like() => ragged_bail!(
                TypeError: "cannot {} strings; they are not numbers",
                reducer.name()
            ),
            c if c.is_list() => reduce_list(c, reducer, negaxis, groups, options),
            Content::Record(a) => {
                let contents: Vec<Content> = (0..a.num_fields())
                    .map(|i| a.content(i)?.reduce_next(reducer, negaxis, groups, options))
                    .try_collect()?;
                Ok(RecordArray::with_length(
                    contents,
                    a.raw_fields().map(<[String]>::to_vec),
                    groups.outlength,
                )
                .with_parameters(a.parameters().clone())
                .into())
            }
            Content::Union(a) => match a.simplify_uniontype(true, true)? {
                Content::Union(u) => ragged_bail!(
                    TypeError: "cannot {} a union of {} incompatible types",
                    reducer.name(),
                    u.num_contents()
                ),
                simplified => simplified.reduce_next(reducer, negaxis, groups, options),
            },
            c => ragged_bail!(AssertionFailed: "{} cannot be reduced", c.class_name()),
        }
    }
}

fn reduce_leaf(
    leaf: &NumpyArray,
    reducer: &dyn Reducer,
    negaxis: usize,
    groups: &Groups,
    options: &ReduceOptions,
) -> RaggedResult<Content> {
    if negaxis != 1 {
        ragged_bail!(AxisError: "cannot {} a flat array at depth {negaxis}", reducer.name());
    }
    let backend = leaf.backend().combine(groups.parents.backend());
    let reduced = reducer.apply(leaf, &groups.parents, groups.outlength)?;
    let mut out: Content = if reducer.needs_position() {
        let shifts = groups.shifts_or_empty(backend)?;
        let [local] = backend
            .run(
                "NumpyArray_reduce_adjust_starts_shifts",
                [(PType::I64, reduced.length())],
                &[reduced.data(), groups.starts.data(), shifts.data()],
                &[],
            )
            .in_node("NumpyArray")?;
        NumpyArray::from_data(local, backend).into()
    } else {
        reduced.into()
    };

    if options.mask.unwrap_or_else(|| reducer.masks_identity()) {
        let [mask] = backend
            .run(
                "reduce_mask",
                [(PType::I8, groups.outlength)],
                &[groups.parents.data()],
                &[],
            )
            .in_node("NumpyArray")?;
        out = ByteMaskedArray::try_new(Index::try_from_data(mask, backend)?, out, false)?.into();
    }
    if options.keepdims {
        out = RegularArray::with_length(out, 1, groups.outlength).into();
    }
    Ok(out)
}

fn reduce_list(
    list: &Content,
    reducer: &dyn Reducer,
    negaxis: usize,
    groups: &Groups,
    options: &ReduceOptions,
) -> RaggedResult<Content> {
    let (branch, depth) = list.branch_depth();
    if !matches!(list, Content::ListOffset(_)) {
        log::debug!("compacting {} to 64-bit offsets before {}", list.class_name(), reducer.name());
    }
    let (compact, content) = compact_list(list)?;
    let offsets = compact.offsets();
    let backend = list.backend().combine(groups.parents.backend());

    if !branch && negaxis == depth {
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
        let next = Groups {
            starts: Index::try_from_data(nextstarts, backend)?,
            shifts: if reducer.needs_position() {
                Some(Index::try_from_data(nextshifts, backend)?)
            } else {
                None
            },
            parents: Index::try_from_data(nextparents, backend)?,
            outlength: nextoutlength,
        };
        let inner = ReduceOptions {
            keepdims: false,
            ..*options
        };
        let outcontent = content
            .carry(&Index::try_from_data(nextcarry, backend)?, false)?
            .reduce_next(reducer, negaxis - 1, &next, &inner)?;

        let [outstarts, outstops] = backend
            .run(
                "ListOffsetArray_reduce_nonlocal_outstartsstops",
                [(PType::I64, groups.outlength), (PType::I64, groups.outlength)],
                &[offsets.data(), groups.parents.data()],
                &[maxcount.as_scalar()],
            )
            .in_node("ListOffsetArray")?;
        let out = ListArray::try_new(
            Index::try_from_data(outstarts, backend)?,
            Index::try_from_data(outstops, backend)?,
            outcontent,
        )?;
        Ok(if options.keepdims {
            RegularArray::with_length(out, 1, groups.outlength).into()
        } else {
            out.into()
        })
    } else {
        let next = Groups {
            starts: compact.starts()?,
            shifts: None,
            parents: local_parents(&compact, &content)?,
            outlength: compact.length(),
        };
        let outcontent = content.reduce_next(reducer, negaxis, &next, options)?;
        let outoffsets = group_offsets(groups, backend)?;
        Ok(ListOffsetArray::try_new(outoffsets, outcontent)?.into())
    }
}

/// Offsets of the groups, counting every element of the node.
fn group_offsets(groups: &Groups, backend: BackendRef) -> RaggedResult<Index> {
    let [outoffsets] = backend
        .run(
            "ListOffsetArray_reduce_local_outoffsets",
            [(PType::I64, groups.outlength + 1)],
            &[groups.parents.data()],
            &[],
        )
        .in_node("ListOffsetArray")?;
    Index::try_from_data(outoffsets, backend)
}

fn reduce_option(
    option: &Content,
    reducer: &dyn Reducer,
    negaxis: usize,
    groups: &Groups,
    options: &ReduceOptions,
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
    let nextshifts = if at_axis && reducer.needs_position() {
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
        .reduce_next(reducer, negaxis, &next, options)?;
    if at_axis {
        return Ok(out);
    }

    // The reduction kept this node's dimension: put the missing values back between the
    // reduced present ones.
    let out = match out {
        Content::Regular(r) => r.to_list_offset_array64(true)?,
        Content::ListOffset(l) => l,
        other => ragged_bail!(
            AssertionFailed: "reducing below an option layer should give lists, not {}",
            other.class_name()
        ),
    };
    let inner = IndexedOptionArray::try_new(Index::try_from_data(outindex, backend)?, out.content().clone())?
        .with_parameters(option.parameters().clone())
        .simplify_optiontype()?;
    Ok(ListOffsetArray::try_new(group_offsets(groups, backend)?, inner)?
        .with_parameters(out.parameters().clone())
        .into())
}

#[cfg(test)]
mod test {
    use ragged_buffer::buffer;
    use rstest::rstest;
    use serde_json::{Value, json};

    use ragged_dtype::Parameters;

    use super::*;

    fn reduce(array: &Content, reducer: &dyn Reducer, axis: i64) -> Value {
        array
            .reduce(
                reducer,
                &ReduceOptions {
                    axis,
                    ..Default::default()
                },
            )
            .unwrap()
            .to_json()
            .unwrap()
    }

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
            NumpyArray::new(buffer![1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]),
        )
        .unwrap();
        ListOffsetArray::try_new(Index::from_i64s([0, 2, 2, 4]), inner)
            .unwrap()
            .into()
    }

    #[rstest]
    #[case(&Sum, json!(15))]
    #[case(&Prod, json!(120))]
    #[case(&Count, json!(5))]
    #[case(&Min, json!(1))]
    #[case(&Max, json!(5))]
    #[case(&ArgMin, json!(0))]
    #[case(&ArgMax, json!(4))]
    fn flat_arrays_reduce_to_scalars(#[case] reducer: &dyn Reducer, #[case] expected: Value) {
        let flat = Content::from(NumpyArray::new(buffer![1i64, 2, 3, 4, 5]));
        assert_eq!(reduce(&flat, reducer, 0), expected);
    }

    #[rstest]
    #[case(&Sum, json!([6, 0, 9]))]
    #[case(&Prod, json!([6, 1, 20]))]
    #[case(&Count, json!([3, 0, 2]))]
    #[case(&ArgMax, json!([2, null, 1]))]
    #[case(&Any, json!([true, false, true]))]
    #[case(&All, json!([true, true, true]))]
    fn innermost_lists_reduce_in_place(#[case] reducer: &dyn Reducer, #[case] expected: Value) {
        assert_eq!(reduce(&lists(), reducer, -1), expected);
    }

    #[rstest]
    #[case(&Sum, json!([5, 7, 3]))]
    #[case(&Count, json!([2, 2, 1]))]
    #[case(&ArgMax, json!([2, 2, 0]))]
    fn outer_axis_combines_columns(#[case] reducer: &dyn Reducer, #[case] expected: Value) {
        assert_eq!(reduce(&lists(), reducer, 0), expected);
    }

    #[rstest]
    #[case(-1, json!([[3.0, 3.0], [], [4.0, 18.0]]))]
    #[case(1, json!([[4.0, 2.0], [], [9.0, 6.0, 7.0]]))]
    #[case(0, json!([[5.0, 2.0], [8.0, 6.0, 7.0]]))]
    fn nested_lists(#[case] axis: i64, #[case] expected: Value) {
        assert_eq!(reduce(&nested(), &Sum, axis), expected);
    }

    #[test]
    fn argmin_across_lists_names_the_list() {
        let array = Content::from(
            ListOffsetArray::try_new(
                Index::from_i64s([0, 3, 3, 5]),
                NumpyArray::new(buffer![1i64, 2, 3, 0, 5]),
            )
            .unwrap(),
        );
        assert_eq!(reduce(&array, &ArgMin, 0), json!([2, 0, 0]));
    }

    #[test]
    fn missing_values_are_skipped() {
        let array = Content::from(
            ListOffsetArray::try_new(
                Index::from_i64s([0, 3, 3, 5]),
                IndexedOptionArray::try_new(
                    Index::from_i64s([-1, 0, 1, 2, -1]),
                    NumpyArray::new(buffer![5.0f64, 1.0, 3.0]),
                )
                .unwrap(),
            )
            .unwrap(),
        );
        assert_eq!(reduce(&array, &Sum, -1), json!([6.0, 0.0, 3.0]));
        assert_eq!(reduce(&array, &ArgMin, -1), json!([2, null, 0]));
        assert_eq!(reduce(&array, &Count, -1), json!([2, 0, 1]));
    }

    #[test]
    fn missing_lists_stay_missing() {
        let array = Content::from(
            IndexedOptionArray::try_new(Index::from_i64s([0, -1, 2]), lists()).unwrap(),
        );
        assert_eq!(reduce(&array, &Sum, -1), json!([6, null, 9]));
    }

    #[test]
    fn mask_turns_empty_groups_into_missing_values() {
        let options = ReduceOptions {
            axis: -1,
            mask: Some(true),
            keepdims: false,
        };
        let out = lists().reduce(&Max, &options).unwrap();
        assert_eq!(out.to_json().unwrap(), json!([3, null, 5]));
        let Element::Array(Content::ByteMasked(masked)) = out else {
            panic!("expected a byte-masked result");
        };
        assert!(!masked.valid_when());
    }

    #[rstest]
    #[case(&ArgMin, None, json!([0, null, 0]))]
    #[case(&ArgMax, None, json!([2, null, 1]))]
    #[case(&ArgMax, Some(false), json!([2, -1, 1]))]
    #[case(&Sum, None, json!([6, 0, 9]))]
    #[case(&Sum, Some(true), json!([6, null, 9]))]
    fn arg_reducers_mask_empty_lists_by_default(
        #[case] reducer: &dyn Reducer,
        #[case] mask: Option<bool>,
        #[case] expected: Value,
    ) {
        let options = ReduceOptions {
            axis: -1,
            mask,
            keepdims: false,
        };
        let out = lists().reduce(reducer, &options).unwrap();
        assert_eq!(out.to_json().unwrap(), expected);
    }

    #[rstest]
    #[case(-1, json!([[6], [0], [9]]))]
    #[case(0, json!([[5, 7, 3]]))]
    fn keepdims_keeps_a_length_one_dimension(#[case] axis: i64, #[case] expected: Value) {
        let options = ReduceOptions {
            axis,
            mask: Some(false),
            keepdims: true,
        };
        assert_eq!(
            lists().reduce(&Sum, &options).unwrap().to_json().unwrap(),
            expected
        );
    }

    #[test]
    fn records_reduce_each_field() {
        let record = RecordArray::try_new(
            vec![
                NumpyArray::new(buffer![1i64, 2, 3]).into(),
                NumpyArray::new(buffer![0.5f64, 1.5, 2.0]).into(),
            ],
            Some(vec!["x".into(), "y".into()]),
            None,
        )
        .unwrap();
        let array = Content::from(
            ListOffsetArray::try_new(Index::from_i64s([0, 2, 3]), record).unwrap(),
        );
        assert_eq!(
            reduce(&array, &Sum, -1),
            json!([{"x": 3, "y": 2.0}, {"x": 3, "y": 2.0}])
        );
    }

    #[test]
    fn sums_widen_to_64_bits() {
        assert_eq!(Sum.return_ptype(PType::U8), PType::U64);
        assert_eq!(Sum.return_ptype(PType::Bool), PType::I64);
        assert_eq!(Prod.return_ptype(PType::F32), PType::F32);
        assert_eq!(Min.return_ptype(PType::I16), PType::I16);
    }

    #[test]
    fn strings_do_not_reduce() {
        let words = Content::from(
            ListOffsetArray::try_new(Index::from_i64s([0, 1, 3]), NumpyArray::chars("abc"))
                .unwrap()
                .with_parameters(Parameters::empty().with("__array__", "string")),
        );
        let err = words.reduce(&Sum, &ReduceOptions::default()).unwrap_err();
        assert!(err.is_type_error());
    }

    #[rstest]
    #[case(-1)]
    #[case(0)]
    fn typetracer_predicts_the_form(#[case] axis: i64) {
        let options = ReduceOptions {
            axis,
            mask: Some(true),
            keepdims: false,
        };
        let array = nested();
        let concrete = array.reduce(&Sum, &options).unwrap();
        let traced = array.to_typetracer(true).reduce(&Sum, &options).unwrap();
        assert_eq!(
            traced.as_array().unwrap().form(),
            concrete.as_array().unwrap().form()
        );
    }

    #[test]
    fn empty_arrays_reduce_to_identities() {
        let empty = Content::from(crate::content::EmptyArray::new(BackendRef::cpu()));
        assert_eq!(reduce(&empty, &Sum, 0), json!(0.0));
        assert_eq!(reduce(&empty, &Count, 0), json!(0));
    }
}
