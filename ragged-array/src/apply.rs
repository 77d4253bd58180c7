//! Rewriting a layout node by node.
//!
//! [`Content::recursively_apply`] walks the tree from the root and offers every node to an
//! action. The action either replaces the node, in which case its children are not visited,
//! or declines, and the node is rebuilt around its rewritten children.

use itertools::Itertools;
use ragged_dtype::Parameters;
use ragged_error::{RaggedResult, ragged_bail};

use crate::content::{
    ByteMaskedArray, Content, IndexedArray, IndexedOptionArray, ListArray, ListOffsetArray,
    RecordArray, RegularArray, UnionArray, UnmaskedArray,
};

/// How [`Content::recursively_apply`] rebuilds the nodes the action declines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Rebuilt nodes keep their parameters. Otherwise they are dropped.
    pub keep_parameters: bool,
    /// Walk through records. Otherwise meeting one is a type error.
    pub allow_records: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            keep_parameters: true,
            allow_records: true,
        }
    }
}

impl Content {
    /// Offer every node to `action` along with its list depth, `1` at the root. Nodes the
    /// action returns `None` for are rebuilt from their transformed children.
    pub fn recursively_apply<F>(&self, action: &mut F, options: &ApplyOptions) -> RaggedResult<Content>
    where
        F: FnMut(&Content, usize) -> RaggedResult<Option<Content>>,
    {
        self.apply_at(action, 1, options)
    }

    fn apply_at<F>(&self, action: &mut F, depth: usize, options: &ApplyOptions) -> RaggedResult<Content>
    where
        F: FnMut(&Content, usize) -> RaggedResult<Option<Content>>,
    {
        if let Some(replacement) = action(self, depth)? {
            return Ok(replacement);
        }
        let rebuilt: Content = match self {
            Content::Empty(a) => a.clone().into(),
            Content::Numpy(a) => a.clone().into(),
            Content::Indexed(a) => IndexedArray::try_new(
                a.index().clone(),
                a.content().apply_at(action, depth, options)?,
            )?
            .into(),
            Content::IndexedOption(a) => IndexedOptionArray::try_new(
                a.index().clone(),
                a.content().apply_at(action, depth, options)?,
            )?
            .into(),
            Content::ByteMasked(a) => ByteMaskedArray::try_new(
                a.mask().clone(),
                a.content().apply_at(action, depth, options)?,
                a.valid_when(),
            )?
            .into(),
            Content::BitMasked(a) => a
                .with_content(a.content().apply_at(action, depth, options)?)
                .into(),
            Content::Unmasked(a) => {
                UnmaskedArray::new(a.content().apply_at(action, depth, options)?).into()
            }
            Content::ListOffset(a) => ListOffsetArray::try_new(
                a.offsets().clone(),
                a.content().apply_at(action, depth + 1, options)?,
            )?
            .into(),
            Content::List(a) => ListArray::try_new(
                a.starts().clone(),
                a.stops().clone(),
                a.content().apply_at(action, depth + 1, options)?,
            )?
            .into(),
            Content::Regular(a) => RegularArray::with_length(
                a.content().apply_at(action, depth + 1, options)?,
                a.size(),
                a.length(),
            )
            .into(),
            Content::Record(a) => {
                if !options.allow_records {
                    ragged_bail!(
                        TypeError: "records are not allowed here, found one with fields [{}]",
                        a.fields().join(", ")
                    );
                }
                let contents: Vec<Content> = a
                    .contents()
                    .map(|c| c.apply_at(action, depth, options))
                    .try_collect()?;
                RecordArray::with_length(
                    contents,
                    a.raw_fields().map(<[String]>::to_vec),
                    a.length(),
                )
                .into()
            }
            Content::Union(a) => {
                let contents: Vec<Content> = a
                    .contents()
                    .map(|c| c.apply_at(action, depth, options))
                    .try_collect()?;
                UnionArray::try_new(a.tags().clone(), a.index().clone(), contents)?.into()
            }
        };
        Ok(rebuilt.with_parameters(if options.keep_parameters {
            self.parameters().clone()
        } else {
            Parameters::empty()
        }))
    }
}

#[cfg(test)]
mod test {
    use ragged_buffer::buffer;
    use serde_json::json;

    use super::*;
    use crate::content::NumpyArray;
    use crate::index::Index;

    /// `[[1, None, 3], [], [4]]`, documented.
    fn lists_with_missing() -> Content {
        let option = IndexedOptionArray::try_new(
            Index::from_i64s([0, -1, 1, 2]),
            NumpyArray::new(buffer![1i64, 3, 4]),
        )
        .unwrap();
        ListOffsetArray::try_new(Index::from_i64s([0, 3, 3, 4]), option)
            .unwrap()
            .with_parameters(Parameters::empty().with("__doc__", "numbers"))
            .into()
    }

    #[test]
    fn declined_nodes_are_rebuilt_around_new_leaves() {
        let out = lists_with_missing()
            .recursively_apply(
                &mut |node: &Content, _| match node {
                    Content::Numpy(_) => Ok(Some(NumpyArray::new(buffer![10i64, 30, 40]).into())),
                    _ => Ok(None),
                },
                &ApplyOptions::default(),
            )
            .unwrap();
        assert_eq!(out.to_list().unwrap(), json!([[10, null, 30], [], [40]]));
        assert_eq!(out.parameter("__doc__"), Some(&json!("numbers")));
    }

    #[test]
    fn every_node_is_offered_with_its_depth() {
        let mut seen = Vec::new();
        lists_with_missing()
            .recursively_apply(
                &mut |node: &Content, depth| {
                    seen.push((node.class_name(), depth));
                    Ok(None)
                },
                &ApplyOptions::default(),
            )
            .unwrap();
        assert_eq!(
            seen,
            vec![
                ("ListOffsetArray", 1),
                ("IndexedOptionArray", 2),
                ("NumpyArray", 2)
            ]
        );
    }

    #[test]
    fn replacement_stops_the_descent() {
        let mut visits = 0;
        let out = lists_with_missing()
            .recursively_apply(
                &mut |_: &Content, _| {
                    visits += 1;
                    Ok(Some(NumpyArray::new(buffer![7i64]).into()))
                },
                &ApplyOptions::default(),
            )
            .unwrap();
        assert_eq!(visits, 1);
        assert_eq!(out.to_list().unwrap(), json!([7]));
    }

    #[test]
    fn parameters_can_be_dropped() {
        let out = lists_with_missing()
            .recursively_apply(
                &mut |_: &Content, _| Ok(None),
                &ApplyOptions {
                    keep_parameters: false,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(out.parameter("__doc__"), None);
        assert_eq!(out.to_list().unwrap(), json!([[1, null, 3], [], [4]]));
    }

    #[test]
    fn records_can_be_refused() {
        let record: Content = RecordArray::try_new(
            vec![NumpyArray::new(buffer![1i64, 2]).into()],
            Some(vec!["x".to_string()]),
            None,
        )
        .unwrap()
        .into();
        let err = record
            .recursively_apply(
                &mut |_: &Content, _| Ok(None),
                &ApplyOptions {
                    allow_records: false,
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(err.is_type_error());
    }
}
