//! Concatenating layouts.
//!
//! [`Content::mergemany`] concatenates layouts of compatible type into one layout of that
//! type. Indexed and option layers are merged by composing their indices over the merged
//! contents rather than by gathering, and unions absorb whatever follows them as new or
//! merged branches. [`concatenate`] additionally accepts incompatible types, which it places
//! side by side in a union.

use itertools::Itertools;
use log::debug;
use ragged_dtype::{PType, Parameters};
use ragged_error::{NodeContext, RaggedResult, ragged_bail, ragged_err};

use crate::backend::{BackendRef, Length};
use crate::content::{
    Content, IndexedArray, IndexedOptionArray, ListArray, NumpyArray, RecordArray, RegularArray,
    UnionArray,
};
use crate::index::Index;

/// Whether two leaves of these types concatenate into one leaf.
fn leaf_mergeable(a: PType, b: PType, mergebool: bool) -> bool {
    a == b || mergebool || a.is_bool() == b.is_bool()
}

impl Content {
    /// Whether `self` and `other` concatenate into one layout without a union.
    ///
    /// Empty arrays and unions merge with anything. Otherwise differing `__array__` or
    /// `__record__` parameters never merge. Booleans merge with numbers only with `mergebool`.
    pub fn mergeable(&self, other: &Content, mergebool: bool) -> bool {
        if matches!(self, Content::Empty(_) | Content::Union(_))
            || matches!(other, Content::Empty(_) | Content::Union(_))
        {
            return true;
        }
        if !self.parameters().type_parameters_equal(other.parameters()) {
            return false;
        }
        if let Some(content) = self.option_content() {
            return content.mergeable(other.option_content().unwrap_or(other), mergebool);
        }
        if let Some(content) = other.option_content() {
            return self.mergeable(content, mergebool);
        }
        match (self, other) {
            (Content::Numpy(a), Content::Numpy(b)) => leaf_mergeable(a.ptype(), b.ptype(), mergebool),
            (Content::Record(a), Content::Record(b)) => records_mergeable(a, b, mergebool),
            (a, b) => match (a.list_content(), b.list_content()) {
                (Some(a), Some(b)) => a.mergeable(b, mergebool),
                _ => false,
            },
        }
    }

    /// This node with the parameters it keeps when merged with a node carrying `parameters`.
    pub fn merge_parameters(&self, parameters: &Parameters) -> Content {
        self.with_parameters(self.parameters().merge(parameters))
    }

    /// Flatten nested unions and, with `merge`, fold mergeable branches of a union. Every
    /// other layout is already simple.
    pub fn simplify_uniontype(&self, merge: bool, mergebool: bool) -> RaggedResult<Content> {
        match self {
            Content::Union(a) => a.simplify_uniontype(merge, mergebool),
            other => Ok(other.clone()),
        }
    }

    /// `self` followed by `other`.
    pub fn merge(&self, other: &Content) -> RaggedResult<Content> {
        self.mergemany(std::slice::from_ref(other))
    }

    /// `self` followed by every array of `others`, as one layout.
    pub fn mergemany(&self, others: &[Content]) -> RaggedResult<Content> {
        if others.is_empty() {
            return Ok(self.clone());
        }
        let mut arrays: Vec<Content> = std::iter::once(self)
            .chain(others)
            .filter(|a| !matches!(a, Content::Empty(_)))
            .cloned()
            .collect();
        if arrays.is_empty() {
            return Ok(self.clone());
        }
        if arrays.iter().any(|a| a.backend().is_typetracer()) {
            arrays = arrays.iter().map(|a| a.to_typetracer(false)).collect();
        }
        merge_arrays(&arrays)
    }
}

fn records_mergeable(a: &RecordArray, b: &RecordArray, mergebool: bool) -> bool {
    if a.is_tuple() != b.is_tuple() || a.num_fields() != b.num_fields() {
        return false;
    }
    if a.is_tuple() {
        return a
            .contents()
            .zip(b.contents())
            .all(|(x, y)| x.mergeable(y, mergebool));
    }
    a.fields().iter().zip(a.contents()).all(|(name, x)| {
        b.field_index(name)
            .ok()
            .and_then(|j| b.contents().nth(j))
            .is_some_and(|y| x.mergeable(y, mergebool))
    })
}

/// Merge non-empty arrays that share a backend. The first array picks the strategy: a union
/// takes everything, an indexed or option layer takes everything up to the first union and
/// anything else takes the run of arrays of its own kind.
fn merge_arrays(arrays: &[Content]) -> RaggedResult<Content> {
    let Some((first, rest)) = arrays.split_first() else {
        ragged_bail!(AssertionFailed: "nothing to merge");
    };
    if rest.is_empty() {
        return Ok(first.clone());
    }
    if first.is_union() {
        return merge_unions(arrays);
    }
    let indexed = first.is_indexed() || first.is_option();
    let split = rest
        .iter()
        .position(|a| a.is_union() || (!indexed && (a.is_indexed() || a.is_option())))
        .map_or(arrays.len(), |p| p + 1);
    let (head, tail) = arrays.split_at(split);
    let merged = if indexed {
        merge_indexed(head)?
    } else {
        merge_same_kind(head)?
    };
    let Some(next) = tail.first() else {
        return Ok(merged);
    };
    let (merged, unions) = if next.is_union() {
        (merged, tail)
    } else {
        let upto = tail.iter().position(Content::is_union).unwrap_or(tail.len());
        let (options, unions) = tail.split_at(upto);
        let arrays = std::iter::once(merged)
            .chain(options.iter().cloned())
            .collect_vec();
        (merge_indexed(&arrays)?, unions)
    };
    if unions.is_empty() {
        return Ok(merged);
    }
    debug!(
        "reverse-merging {} into the union after it and {} more arrays",
        merged.class_name(),
        unions.len() - 1
    );
    let arrays = std::iter::once(merged)
        .chain(unions.iter().cloned())
        .collect_vec();
    merge_unions(&arrays)
}

fn total_length(arrays: &[Content]) -> Length {
    Length::sum(arrays.iter().map(Content::length))
}

fn merged_parameters(arrays: &[Content]) -> Parameters {
    arrays
        .iter()
        .skip(1)
        .fold(arrays[0].parameters().clone(), |acc, a| acc.merge(a.parameters()))
}

/// Compose the indices of indexed and option layers over their merged contents. Arrays
/// without an index contribute an identity range.
fn merge_indexed(arrays: &[Content]) -> RaggedResult<Content> {
    let backend = BackendRef::common(arrays.iter().map(Content::backend));
    let total = total_length(arrays);
    let parameters = merged_parameters(arrays);
    let is_option = arrays.iter().any(Content::is_option);

    let mut nextindex = backend.allocate(PType::I64, total)?;
    let mut contents = Vec::with_capacity(arrays.len());
    let mut length_so_far = Length::ZERO;
    let mut contentlength_so_far = Length::ZERO;
    for array in arrays {
        let (index, content) = match array {
            Content::Indexed(a) => (Some(a.index().clone()), a.content().clone()),
            Content::IndexedOption(a) => (Some(a.index().clone()), a.content().clone()),
            c if c.is_option() => {
                let a = c.to_indexed_option_array64()?;
                (Some(a.index().clone()), a.content().clone())
            }
            c => (None, c.clone()),
        };
        let [out] = match &index {
            Some(index) => backend.call(
                "IndexedArray_fill",
                [nextindex],
                &[index.data()],
                &[length_so_far.as_scalar(), contentlength_so_far.as_scalar()],
            ),
            None => backend.call(
                "IndexedArray_fill_count",
                [nextindex],
                &[],
                &[
                    length_so_far.as_scalar(),
                    array.length().as_scalar(),
                    contentlength_so_far.as_scalar(),
                ],
            ),
        }
        .in_node("IndexedArray")?;
        nextindex = out;
        length_so_far = length_so_far + array.length();
        contentlength_so_far = contentlength_so_far + content.length();
        contents.push(content);
    }

    let nextcontent = merge_contents(&contents)?;
    let nextindex = Index::try_from_data(nextindex.freeze(), backend)?;
    if is_option {
        IndexedOptionArray::try_new(nextindex, nextcontent)?
            .with_parameters(parameters)
            .simplify_optiontype()
    } else {
        IndexedArray::try_new(nextindex, nextcontent)?
            .with_parameters(parameters)
            .simplify_optiontype()
    }
}

/// Merge the children collected from several parents.
fn merge_contents(contents: &[Content]) -> RaggedResult<Content> {
    match contents.split_first() {
        Some((first, rest)) => first.mergemany(rest),
        None => ragged_bail!(AssertionFailed: "no contents to merge"),
    }
}

/// Merge arrays of one kind: leaves, lists or records.
fn merge_same_kind(arrays: &[Content]) -> RaggedResult<Content> {
    let first = &arrays[0];
    if let Some(bad) = arrays.iter().find(|a| !first.mergeable(a, true)) {
        ragged_bail!(
            MergeIncompatible: "{} with {}",
            first.class_name(),
            bad.class_name()
        );
    }
    match first {
        Content::Numpy(_) => merge_leaves(arrays),
        Content::Record(_) => merge_records(arrays),
        c if c.is_list() => merge_lists(arrays),
        c => ragged_bail!(
            AssertionFailed: "{} should have been merged as an indexed or union layout",
            c.class_name()
        ),
    }
}

fn merge_leaves(arrays: &[Content]) -> RaggedResult<Content> {
    let leaves: Vec<&NumpyArray> = arrays
        .iter()
        .map(|a| match a {
            Content::Numpy(n) => Ok(n),
            other => Err(ragged_err!(MergeIncompatible: "NumpyArray with {}", other.class_name())),
        })
        .try_collect()?;
    let ptype = leaves
        .iter()
        .skip(1)
        .fold(leaves[0].ptype(), |acc, l| acc.promote(l.ptype()));
    let backend = BackendRef::common(leaves.iter().map(|l| l.backend()));
    let mut out = backend.allocate(ptype, total_length(arrays))?;
    let mut offset = Length::ZERO;
    for leaf in &leaves {
        [out] = backend
            .call("NumpyArray_fill", [out], &[leaf.data()], &[offset.as_scalar()])
            .in_node("NumpyArray")?;
        offset = offset + leaf.length();
    }
    Ok(NumpyArray::from_data(out.freeze(), backend)
        .with_parameters(merged_parameters(arrays))
        .into())
}

fn merge_lists(arrays: &[Content]) -> RaggedResult<Content> {
    let parameters = merged_parameters(arrays);
    let backend = BackendRef::common(arrays.iter().map(Content::backend));
    let total = total_length(arrays);

    if let Content::Regular(first) = &arrays[0]
        && arrays
            .iter()
            .all(|a| matches!(a, Content::Regular(r) if r.size() == first.size()))
    {
        let contents: Vec<Content> = arrays
            .iter()
            .map(|a| match a {
                Content::Regular(r) => r.content().slice(Length::ZERO, r.length() * r.size()),
                other => other.slice(Length::ZERO, Length::ZERO),
            })
            .try_collect()?;
        return Ok(
            RegularArray::with_length(merge_contents(&contents)?, first.size(), total)
                .with_parameters(parameters)
                .into(),
        );
    }

    let mut starts = backend.allocate(PType::I64, total)?;
    let mut stops = backend.allocate(PType::I64, total)?;
    let mut contents = Vec::with_capacity(arrays.len());
    let mut length_so_far = Length::ZERO;
    let mut contentlength_so_far = Length::ZERO;
    for array in arrays {
        let list = match array {
            Content::List(a) => a.clone(),
            Content::ListOffset(a) => ListArray::try_new(a.starts()?, a.stops()?, a.content().clone())?,
            c => {
                let a = c.to_list_offset_array64(true)?;
                ListArray::try_new(a.starts()?, a.stops()?, a.content().clone())?
            }
        };
        let list_stops = list.stops().slice(Length::ZERO, list.length())?;
        [starts, stops] = backend
            .call(
                "ListArray_fill",
                [starts, stops],
                &[list.starts().data(), list_stops.data()],
                &[length_so_far.as_scalar(), contentlength_so_far.as_scalar()],
            )
            .in_node("ListArray")?;
        length_so_far = length_so_far + list.length();
        contentlength_so_far = contentlength_so_far + list.content().length();
        contents.push(list.content().clone());
    }
    Ok(ListArray::try_new(
        Index::try_from_data(starts.freeze(), backend)?,
        Index::try_from_data(stops.freeze(), backend)?,
        merge_contents(&contents)?,
    )?
    .with_parameters(parameters)
    .into())
}

fn merge_records(arrays: &[Content]) -> RaggedResult<Content> {
    let records: Vec<&RecordArray> = arrays
        .iter()
        .map(|a| match a {
            Content::Record(r) => Ok(r),
            other => Err(ragged_err!(MergeIncompatible: "RecordArray with {}", other.class_name())),
        })
        .try_collect()?;
    let first = records[0];
    let fields = first.raw_fields().map(<[String]>::to_vec);
    let contents: Vec<Content> = (0..first.num_fields())
        .map(|i| {
            let column: Vec<Content> = records
                .iter()
                .map(|r| match &fields {
                    Some(names) => r.content(r.field_index(&names[i])?),
                    None => r.content(i),
                })
                .try_collect()?;
            merge_contents(&column)
        })
        .try_collect()?;
    Ok(
        RecordArray::with_length(contents, fields, total_length(arrays))
            .with_parameters(merged_parameters(arrays))
            .into(),
    )
}

/// Lay the arrays side by side as union branches, then fold mergeable branches together.
fn merge_unions(arrays: &[Content]) -> RaggedResult<Content> {
    let backend = BackendRef::common(arrays.iter().map(Content::backend));
    let total = total_length(arrays);
    let parameters = merged_parameters(arrays);

    let mut tags = backend.allocate(PType::I8, total)?;
    let mut index = backend.allocate(PType::I64, total)?;
    let mut contents: Vec<Content> = Vec::new();
    let mut length_so_far = Length::ZERO;
    for array in arrays {
        let outoffset = length_so_far.as_scalar();
        match array {
            Content::Union(u) => {
                let u_index = u.index().slice(Length::ZERO, u.length())?;
                [tags] = backend
                    .call(
                        "UnionArray_filltags",
                        [tags],
                        &[u.tags().data()],
                        &[outoffset, contents.len() as i64],
                    )
                    .in_node("UnionArray")?;
                [index] = backend
                    .call("UnionArray_fillindex", [index], &[u_index.data()], &[outoffset])
                    .in_node("UnionArray")?;
                contents.extend(u.contents().cloned());
            }
            other => {
                let length = other.length().as_scalar();
                [tags] = backend
                    .call(
                        "UnionArray_filltags_const",
                        [tags],
                        &[],
                        &[outoffset, length, contents.len() as i64],
                    )
                    .in_node("UnionArray")?;
                [index] = backend
                    .call("UnionArray_fillindex_count", [index], &[], &[outoffset, length])
                    .in_node("UnionArray")?;
                contents.push(other.clone());
            }
        }
        length_so_far = length_so_far + array.length();
    }
    UnionArray::try_new(
        Index::try_from_data(tags.freeze(), backend)?,
        Index::try_from_data(index.freeze(), backend)?,
        contents,
    )?
    .with_parameters(parameters)
    .simplify_uniontype(true, false)
}

impl UnionArray {
    /// Lift the branches of nested unions into this one and, with `merge`, fold mergeable
    /// branches together. A union left with a single branch becomes that branch.
    pub fn simplify_uniontype(&self, merge: bool, mergebool: bool) -> RaggedResult<Content> {
        let backend = self.backend();
        let length = self.length();
        let outerindex = self.index().slice(Length::ZERO, length)?;
        let mut totags = backend.allocate(PType::I8, length)?;
        let mut toindex = backend.allocate(PType::I64, length)?;
        let mut contents: Vec<Content> = Vec::new();

        for (outerwhich, outer) in self.contents().enumerate() {
            let branches: Vec<(Option<(i64, Index, Index)>, Content)> = match outer {
                Content::Union(inner) => {
                    let innerindex = inner.index().to64()?;
                    inner
                        .contents()
                        .enumerate()
                        .map(|(j, c)| {
                            (
                                Some((j as i64, inner.tags().clone(), innerindex.clone())),
                                c.clone(),
                            )
                        })
                        .collect()
                }
                other => vec![(None, other.clone())],
            };
            for (inner, branch) in branches {
                let target = merge
                    .then(|| contents.iter().position(|c| c.mergeable(&branch, mergebool)))
                    .flatten();
                let (towhich, tooffset) = match target {
                    Some(k) => {
                        let tooffset = contents[k].length();
                        contents[k] = contents[k].merge(&branch)?;
                        (k, tooffset)
                    }
                    None => {
                        contents.push(branch);
                        (contents.len() - 1, Length::ZERO)
                    }
                };
                [totags, toindex] = match inner {
                    Some((innerwhich, innertags, innerindex)) => backend.call(
                        "UnionArray_simplify",
                        [totags, toindex],
                        &[
                            self.tags().data(),
                            outerindex.data(),
                            innertags.data(),
                            innerindex.data(),
                        ],
                        &[
                            outerwhich as i64,
                            innerwhich,
                            towhich as i64,
                            tooffset.as_scalar(),
                        ],
                    ),
                    None => backend.call(
                        "UnionArray_simplify_one",
                        [totags, toindex],
                        &[self.tags().data(), outerindex.data()],
                        &[outerwhich as i64, towhich as i64, tooffset.as_scalar()],
                    ),
                }
                .in_node("UnionArray")?;
            }
        }

        let totags = Index::try_from_data(totags.freeze(), backend)?;
        let toindex = Index::try_from_data(toindex.freeze(), backend)?;
        if contents.len() == 1 {
            let only = contents.remove(0).carry(&toindex, true)?;
            return only
                .with_parameters(self.parameters().union(only.parameters()))
                .simplify_optiontype();
        }
        Ok(UnionArray::try_new(totags, toindex, contents)?
            .with_parameters(self.parameters().clone())
            .into())
    }
}

/// Concatenate arrays of any types. Arrays that do not merge become branches of a union.
pub fn concatenate(arrays: &[Content], mergebool: bool) -> RaggedResult<Content> {
    let Some((first, rest)) = arrays.split_first() else {
        ragged_bail!("need at least one array to concatenate");
    };
    let all_mergeable = arrays
        .iter()
        .tuple_windows()
        .all(|(a, b)| a.mergeable(b, mergebool));
    if all_mergeable {
        return first.mergemany(rest);
    }
    debug!("concatenating {} arrays of incompatible types as a union", arrays.len());
    let backend = BackendRef::common(arrays.iter().map(Content::backend));
    let arrays: Vec<Content> = if backend.is_typetracer() {
        arrays.iter().map(|a| a.to_typetracer(false)).collect()
    } else {
        arrays.to_vec()
    };
    let total = total_length(&arrays);
    let mut tags = backend.allocate(PType::I8, total)?;
    let mut index = backend.allocate(PType::I64, total)?;
    let mut offset = Length::ZERO;
    for (tag, array) in arrays.iter().enumerate() {
        let length = array.length().as_scalar();
        [tags] = backend
            .call(
                "UnionArray_filltags_const",
                [tags],
                &[],
                &[offset.as_scalar(), length, tag as i64],
            )
            .in_node("UnionArray")?;
        [index] = backend
            .call(
                "UnionArray_fillindex_count",
                [index],
                &[],
                &[offset.as_scalar(), length],
            )
            .in_node("UnionArray")?;
        offset = offset + array.length();
    }
    UnionArray::try_new(
        Index::try_from_data(tags.freeze(), backend)?,
        Index::try_from_data(index.freeze(), backend)?,
        arrays,
    )?
    .simplify_uniontype(true, mergebool)
}

#[cfg(test)]
mod test {
    use ragged_buffer::buffer;
    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::content::{ByteMaskedArray, EmptyArray, ListOffsetArray, UnionArray};

    fn floats() -> Content {
        NumpyArray::new(buffer![1.5f64, 2.5]).into()
    }

    fn ints() -> Content {
        NumpyArray::new(buffer![1i64, 2, 3]).into()
    }

    fn lists() -> Content {
        ListOffsetArray::try_new(Index::from_i64s([0, 2, 2, 3]), ints())
            .unwrap()
            .into()
    }

    fn strings() -> Content {
        ListOffsetArray::try_new(Index::from_i64s([0, 3]), NumpyArray::chars("one"))
            .unwrap()
            .with_parameters(Parameters::empty().with("__array__", "string"))
            .into()
    }

    #[rstest]
    #[case(ints(), floats(), true)]
    #[case(ints(), lists(), false)]
    #[case(lists(), lists(), true)]
    #[case(lists(), strings(), false)]
    #[case(ints(), EmptyArray::new(BackendRef::cpu()).into(), true)]
    fn mergeability(#[case] a: Content, #[case] b: Content, #[case] expected: bool) {
        assert_eq!(a.mergeable(&b, false), expected);
        assert_eq!(b.mergeable(&a, false), expected);
    }

    #[test]
    fn booleans_need_mergebool() {
        let bools: Content = NumpyArray::new(buffer![true]).into();
        assert!(!bools.mergeable(&ints(), false));
        assert!(bools.mergeable(&ints(), true));
    }

    #[test]
    fn leaves_promote() {
        let merged = ints().merge(&floats()).unwrap();
        assert_eq!(merged.to_list().unwrap(), json!([1.0, 2.0, 3.0, 1.5, 2.5]));
        assert_eq!(merged.form(), floats().form());
    }

    #[test]
    fn identical_parameters_survive_merging() {
        let documented =
            ints().with_parameters(Parameters::empty().with("__doc__", "This is a zoink."));
        let merged = documented.merge(&documented).unwrap();
        assert!(matches!(merged, Content::Numpy(_)));
        assert_eq!(merged.parameter("__doc__"), Some(&json!("This is a zoink.")));
        assert_eq!(ints().merge(&documented).unwrap().parameter("__doc__"), None);
    }

    #[test]
    fn empty_arrays_are_the_identity() {
        let empty: Content = EmptyArray::new(BackendRef::cpu()).into();
        assert_eq!(
            lists().mergemany(&[empty.clone()]).unwrap().to_list().unwrap(),
            lists().to_list().unwrap()
        );
        assert_eq!(
            empty.mergemany(&[lists()]).unwrap().to_list().unwrap(),
            lists().to_list().unwrap()
        );
    }

    #[test]
    fn lists_concatenate() {
        let merged = lists().mergemany(&[lists(), strings()]);
        assert!(merged.is_err());
        let merged = lists().merge(&lists()).unwrap();
        assert_eq!(
            merged.to_list().unwrap(),
            json!([[1, 2], [], [3], [1, 2], [], [3]])
        );
    }

    #[test]
    fn indices_are_composed() {
        let option: Content = IndexedOptionArray::try_new(Index::from_i64s([2, -1]), ints())
            .unwrap()
            .into();
        let merged = ints().merge(&option).unwrap();
        let Content::IndexedOption(merged) = merged else {
            panic!("expected an option layout");
        };
        assert_eq!(merged.index().to_vec().unwrap(), vec![0, 1, 2, 5, -1]);
        assert_eq!(
            Content::from(merged).to_list().unwrap(),
            json!([1, 2, 3, 3, null])
        );
    }

    #[test]
    fn masks_merge_through_their_index() {
        let masked: Content = ByteMaskedArray::try_new(Index::new(buffer![1i8, 0]), floats(), true)
            .unwrap()
            .into();
        let merged = masked.merge(&ints()).unwrap();
        assert_eq!(merged.to_list().unwrap(), json!([1.5, null, 1.0, 2.0, 3.0]));
    }

    #[test]
    fn incompatible_types_become_a_union() {
        let merged = concatenate(&[ints(), lists(), floats()], false).unwrap();
        let Content::Union(union) = &merged else {
            panic!("expected a union");
        };
        assert_eq!(union.num_contents(), 2);
        assert_eq!(
            merged.to_list().unwrap(),
            json!([1.0, 2.0, 3.0, [1, 2], [], [3], 1.5, 2.5])
        );
    }

    #[test]
    fn unions_absorb_what_follows() {
        let union = concatenate(&[ints(), lists()], false).unwrap();
        let merged = union.merge(&floats()).unwrap();
        assert_eq!(
            merged.to_list().unwrap(),
            json!([1.0, 2.0, 3.0, [1, 2], [], [3], 1.5, 2.5])
        );
        assert!(union.mergeable(&strings(), false));
    }

    #[test]
    fn records_merge_by_field_name() {
        let a: Content = RecordArray::try_new(
            vec![ints(), NumpyArray::new(buffer![1.5f64, 2.5, 1.5]).into()],
            Some(vec!["x".into(), "y".into()]),
            None,
        )
        .unwrap()
        .into();
        let b: Content = RecordArray::try_new(
            vec![NumpyArray::new(buffer![0.5f64]).into(), NumpyArray::new(buffer![9i64]).into()],
            Some(vec!["y".into(), "x".into()]),
            None,
        )
        .unwrap()
        .into();
        let merged = a.merge(&b).unwrap();
        assert_eq!(
            merged.to_list().unwrap(),
            json!([
                {"x": 1, "y": 1.5},
                {"x": 2, "y": 2.5},
                {"x": 3, "y": 1.5},
                {"x": 9, "y": 0.5}
            ])
        );
    }

    #[test]
    fn simplifying_a_layout_only_touches_unions() {
        assert_eq!(
            lists().simplify_uniontype(true, false).unwrap().form(),
            lists().form()
        );
        let union: Content = UnionArray::try_new(
            Index::new(buffer![0i8, 1, 0]),
            Index::from_i64s([0, 0, 1]),
            vec![ints(), floats()],
        )
        .unwrap()
        .into();
        let simplified = union.simplify_uniontype(true, false).unwrap();
        assert_eq!(simplified.class_name(), "NumpyArray");
        assert_eq!(simplified.to_list().unwrap(), json!([1.0, 1.5, 2.0]));
        let kept = union.simplify_uniontype(false, false).unwrap();
        assert_eq!(kept.class_name(), "UnionArray");
    }

    #[test]
    fn typetracer_merges_to_the_same_form() {
        let concrete = lists().merge(&lists()).unwrap();
        let traced = lists().to_typetracer(true).merge(&lists()).unwrap();
        assert_eq!(concrete.form(), traced.form());
        assert_eq!(traced.length(), Length::Unknown);
    }
}
