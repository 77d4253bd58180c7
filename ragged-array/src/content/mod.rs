//! The layout tree.
//!
//! A [`Content`] is one node of a ragged array: a leaf of primitive values, or a list,
//! option, indexed, record or union layer over child contents. Every node is immutable and
//! every operation builds new nodes; children are shared behind [`Arc`](std::sync::Arc)s.
//!
//! The per-variant structs in this module hold the node-local operations. The tree-wide
//! algorithms (slicing, merging, sorting, reductions, structure operations) are written as
//! `impl Content` blocks with one exhaustive `match` per operation, in their own modules.

use ragged_dtype::{Form, Parameters};
use ragged_error::{RaggedResult, ragged_bail};
use serde_json::Value;

pub use bit_masked::*;
pub use byte_masked::*;
pub use empty::*;
pub use indexed::IndexedArray;
pub use indexed_option::*;
pub use list::*;
pub use list_offset::*;
pub use numpy::*;
pub use record::*;
pub use regular::*;
pub use union::*;
pub use unmasked::*;

use crate::backend::{BackendRef, Length};
use crate::element::Element;
use crate::index::Index;
use crate::kernels::slice_indices;
use crate::slicing::SliceRange;

mod bit_masked;
mod byte_masked;
mod empty;
pub(crate) mod indexed;
mod indexed_option;
mod list;
pub(crate) mod list_offset;
mod numpy;
mod record;
mod regular;
mod union;
mod unmasked;

/// One node of the layout tree.
#[derive(Clone, Debug)]
pub enum Content {
    Empty(EmptyArray),
    Numpy(NumpyArray),
    Indexed(IndexedArray),
    IndexedOption(IndexedOptionArray),
    ByteMasked(ByteMaskedArray),
    BitMasked(BitMaskedArray),
    Unmasked(UnmaskedArray),
    ListOffset(ListOffsetArray),
    List(ListArray),
    Regular(RegularArray),
    Record(RecordArray),
    Union(UnionArray),
}

/// Expand `$body` once per variant, binding the variant's struct to `$a`.
macro_rules! match_each_content {
    ($self:expr, |$a:ident| $body:expr) => {
        match $self {
            Content::Empty($a) => $body,
            Content::Numpy($a) => $body,
            Content::Indexed($a) => $body,
            Content::IndexedOption($a) => $body,
            Content::ByteMasked($a) => $body,
            Content::BitMasked($a) => $body,
            Content::Unmasked($a) => $body,
            Content::ListOffset($a) => $body,
            Content::List($a) => $body,
            Content::Regular($a) => $body,
            Content::Record($a) => $body,
            Content::Union($a) => $body,
        }
    };
}

pub(crate) use match_each_content;

macro_rules! content_from {
    ($($V:ident($T:ty)),+ $(,)?) => {
        $(
            impl From<$T> for Content {
                fn from(value: $T) -> Self {
                    Content::$V(value)
                }
            }
        )+
    };
}

content_from!(
    Empty(EmptyArray),
    Numpy(NumpyArray),
    Indexed(IndexedArray),
    IndexedOption(IndexedOptionArray),
    ByteMasked(ByteMaskedArray),
    BitMasked(BitMaskedArray),
    Unmasked(UnmaskedArray),
    ListOffset(ListOffsetArray),
    List(ListArray),
    Regular(RegularArray),
    Record(RecordArray),
    Union(UnionArray),
);

impl Content {
    pub fn length(&self) -> Length {
        match_each_content!(self, |a| a.length())
    }

    pub fn backend(&self) -> BackendRef {
        match_each_content!(self, |a| a.backend())
    }

    pub fn parameters(&self) -> &Parameters {
        match_each_content!(self, |a| a.parameters())
    }

    pub fn parameter(&self, key: &str) -> Option<&Value> {
        self.parameters().get(key)
    }

    /// The same node with its parameters replaced.
    pub fn with_parameters(&self, parameters: Parameters) -> Content {
        match_each_content!(self, |a| a.clone().with_parameters(parameters).into())
    }

    pub fn form(&self) -> Form {
        match_each_content!(self, |a| a.form())
    }

    pub fn class_name(&self) -> &'static str {
        match self {
            Content::Empty(_) => "EmptyArray",
            Content::Numpy(_) => "NumpyArray",
            Content::Indexed(_) => "IndexedArray",
            Content::IndexedOption(_) => "IndexedOptionArray",
            Content::ByteMasked(_) => "ByteMaskedArray",
            Content::BitMasked(_) => "BitMaskedArray",
            Content::Unmasked(_) => "UnmaskedArray",
            Content::ListOffset(_) => "ListOffsetArray",
            Content::List(_) => "ListArray",
            Content::Regular(_) => "RegularArray",
            Content::Record(_) => "RecordArray",
            Content::Union(_) => "UnionArray",
        }
    }

    pub fn nbytes(&self) -> usize {
        match_each_content!(self, |a| a.nbytes())
    }

    /// Children in order. Record fields are returned as stored, untrimmed.
    pub fn children(&self) -> Vec<&Content> {
        match self {
            Content::Empty(_) | Content::Numpy(_) => vec![],
            Content::Indexed(a) => vec![a.content()],
            Content::IndexedOption(a) => vec![a.content()],
            Content::ByteMasked(a) => vec![a.content()],
            Content::BitMasked(a) => vec![a.content()],
            Content::Unmasked(a) => vec![a.content()],
            Content::ListOffset(a) => vec![a.content()],
            Content::List(a) => vec![a.content()],
            Content::Regular(a) => vec![a.content()],
            Content::Record(a) => a.contents().collect(),
            Content::Union(a) => a.contents().collect(),
        }
    }

    pub fn is_option(&self) -> bool {
        matches!(
            self,
            Content::IndexedOption(_)
                | Content::ByteMasked(_)
                | Content::BitMasked(_)
                | Content::Unmasked(_)
        )
    }

    pub fn is_indexed(&self) -> bool {
        matches!(self, Content::Indexed(_) | Content::IndexedOption(_))
    }

    pub fn is_list(&self) -> bool {
        matches!(
            self,
            Content::ListOffset(_) | Content::List(_) | Content::Regular(_)
        )
    }

    pub fn is_record(&self) -> bool {
        matches!(self, Content::Record(_))
    }

    pub fn is_union(&self) -> bool {
        matches!(self, Content::Union(_))
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Content::Numpy(_) | Content::Empty(_))
    }

    /// A list of characters or bytes, rendered as text.
    pub fn is_string_like(&self) -> bool {
        self.is_list() && self.parameters().is_string_like()
    }

    /// The only child of an option or indexed node.
    pub(crate) fn option_content(&self) -> Option<&Content> {
        match self {
            Content::Indexed(a) => Some(a.content()),
            Content::IndexedOption(a) => Some(a.content()),
            Content::ByteMasked(a) => Some(a.content()),
            Content::BitMasked(a) => Some(a.content()),
            Content::Unmasked(a) => Some(a.content()),
            _ => None,
        }
    }

    /// The only child of a list node.
    pub(crate) fn list_content(&self) -> Option<&Content> {
        match self {
            Content::ListOffset(a) => Some(a.content()),
            Content::List(a) => Some(a.content()),
            Content::Regular(a) => Some(a.content()),
            _ => None,
        }
    }

    /// Number of list levels above the leaves, looking through option, indexed and union
    /// layers. Strings count as leaves; a record is a leaf.
    pub fn purelist_depth(&self) -> usize {
        match self {
            Content::Empty(_) | Content::Numpy(_) | Content::Record(_) => 1,
            Content::Union(a) => a.contents().map(Content::purelist_depth).min().unwrap_or(1),
            c if c.is_string_like() => 1,
            c => match (c.option_content(), c.list_content()) {
                (Some(content), _) => content.purelist_depth(),
                (_, Some(content)) => content.purelist_depth() + 1,
                _ => 1,
            },
        }
    }

    /// The shallowest and deepest leaf, counting record fields.
    pub fn minmax_depth(&self) -> (usize, usize) {
        match self {
            Content::Empty(_) | Content::Numpy(_) => (1, 1),
            Content::Record(a) if a.num_fields() == 0 => (1, 1),
            Content::Record(a) => fold_minmax(a.contents().map(Content::minmax_depth)),
            Content::Union(a) => fold_minmax(a.contents().map(Content::minmax_depth)),
            c if c.is_string_like() => (1, 1),
            c => match (c.option_content(), c.list_content()) {
                (Some(content), _) => content.minmax_depth(),
                (_, Some(content)) => {
                    let (min, max) = content.minmax_depth();
                    (min + 1, max + 1)
                }
                _ => (1, 1),
            },
        }
    }

    /// Whether the tree has leaves at different depths, and the shallowest depth.
    pub fn branch_depth(&self) -> (bool, usize) {
        match self {
            Content::Empty(_) | Content::Numpy(_) => (false, 1),
            Content::Record(a) if a.num_fields() == 0 => (false, 1),
            Content::Record(a) => fold_branch(a.contents().map(Content::branch_depth)),
            Content::Union(a) => fold_branch(a.contents().map(Content::branch_depth)),
            c if c.is_string_like() => (false, 1),
            c => match (c.option_content(), c.list_content()) {
                (Some(content), _) => content.branch_depth(),
                (_, Some(content)) => {
                    let (branch, depth) = content.branch_depth();
                    (branch, depth + 1)
                }
                _ => (false, 1),
            },
        }
    }

    /// Element `at`, counting from the end when negative.
    ///
    /// Shape-only arrays never check bounds; they answer with a placeholder of the right type.
    pub fn getitem_at(&self, at: i64) -> RaggedResult<Element> {
        if self.backend().is_typetracer() {
            return self.unknown_element();
        }
        let length = self.length().require(self.class_name())? as i64;
        let regular = if at < 0 { at + length } else { at };
        if regular < 0 || regular >= length {
            ragged_bail!(
                Index: self.class_name(),
                Some(at),
                "index {at} is out of bounds for length {length}"
            );
        }
        match_each_content!(self, |a| a.element_at(regular as usize))
    }

    /// The placeholder element of a shape-only array.
    pub fn unknown_element(&self) -> RaggedResult<Element> {
        Ok(match self {
            Content::Empty(_) => Element::Unknown(ragged_dtype::PType::F64),
            Content::Numpy(a) => Element::Unknown(a.ptype()),
            Content::Record(a) => Element::Record(a.to_typetracer(true), 0),
            Content::Union(a) => return a.content(0)?.unknown_element(),
            c => match (c.option_content(), c.list_content()) {
                (Some(content), _) => return content.unknown_element(),
                (_, Some(content)) => Element::Array(content.to_typetracer(true)),
                _ => ragged_bail!(AssertionFailed: "{} has no element type", c.class_name()),
            },
        })
    }

    /// Window `[start, stop)`, a view over the same children.
    pub fn slice(&self, start: Length, stop: Length) -> RaggedResult<Content> {
        if let (Length::Known(start), Length::Known(stop), Length::Known(length)) =
            (start, stop, self.length())
            && (start > stop || stop > length)
        {
            ragged_bail!(
                Index: self.class_name(),
                Some(start as i64),
                "window [{start}, {stop}) is out of bounds for length {length}"
            );
        }
        match_each_content!(self, |a| a.slice(start, stop).map(Content::from))
    }

    /// Python-style range selection. Only unit steps are windows; other steps are resolved
    /// by [`Content::getitem`].
    pub fn getitem_range(&self, range: &SliceRange) -> RaggedResult<Content> {
        if range.step.is_some_and(|step| step != 1) {
            ragged_bail!("getitem_range only takes unit steps, not {:?}", range.step);
        }
        match self.length() {
            Length::Known(length) => {
                let (start, stop, _) = slice_indices(range.start, range.stop, 1, length as i64);
                let start = start.max(0) as usize;
                let stop = (stop.max(0) as usize).max(start);
                self.slice(Length::Known(start), Length::Known(stop))
            }
            Length::Unknown => self.slice(Length::Unknown, Length::Unknown),
        }
    }

    /// Gather the elements at `carry`. With `allow_lazy`, nodes that can defer the gather
    /// wrap themselves in an indexed layer instead of copying.
    pub fn carry(&self, carry: &Index, allow_lazy: bool) -> RaggedResult<Content> {
        let carry = carry.to64()?;
        Ok(match self {
            Content::Empty(a) => a.carry(&carry)?.into(),
            Content::Numpy(a) => a.carry(&carry)?.into(),
            Content::Indexed(a) => a.carry(&carry)?.into(),
            Content::IndexedOption(a) => a.carry(&carry)?.into(),
            Content::ByteMasked(a) => a.carry(&carry, allow_lazy)?.into(),
            Content::BitMasked(a) => a.carry(&carry, allow_lazy)?.into(),
            Content::Unmasked(a) => a.carry(&carry, allow_lazy)?.into(),
            Content::ListOffset(a) => a.carry(&carry)?.into(),
            Content::List(a) => a.carry(&carry)?.into(),
            Content::Regular(a) => a.carry(&carry, allow_lazy)?.into(),
            Content::Record(a) => a.carry(&carry, allow_lazy)?,
            Content::Union(a) => a.carry(&carry)?.into(),
        })
    }

    /// Remove an option or indexed layer, gathering the present elements. `mask` (`1` for
    /// missing) drops further elements.
    pub fn project(&self, mask: Option<&Index>) -> RaggedResult<Content> {
        match self {
            Content::Indexed(a) => a.project(mask),
            Content::IndexedOption(a) => a.project(mask),
            Content::ByteMasked(a) => a.project(mask),
            Content::BitMasked(a) => a.project(mask),
            Content::Unmasked(a) => a.project(mask),
            c => ragged_bail!("{} has no option or indexed layer to project", c.class_name()),
        }
    }

    /// Fold directly nested option and indexed layers into one.
    pub fn simplify_optiontype(&self) -> RaggedResult<Content> {
        match self {
            Content::Indexed(a) => a.simplify_optiontype(),
            Content::IndexedOption(a) => a.simplify_optiontype(),
            Content::ByteMasked(a) => a.simplify_optiontype(),
            Content::BitMasked(a) => a.simplify_optiontype(),
            Content::Unmasked(a) => a.simplify_optiontype(),
            c => Ok(c.clone()),
        }
    }

    /// An option or indexed node as an [`IndexedOptionArray`] with a 64-bit index.
    pub fn to_indexed_option_array64(&self) -> RaggedResult<IndexedOptionArray> {
        match self {
            Content::Indexed(a) => Ok(IndexedOptionArray::try_new(
                a.index().to64()?,
                a.content().clone(),
            )?
            .with_parameters(a.parameters().clone())),
            Content::IndexedOption(a) => a.to_indexed_option_array64(),
            Content::ByteMasked(a) => a.to_indexed_option_array64(),
            Content::BitMasked(a) => a.to_indexed_option_array64(),
            Content::Unmasked(a) => a.to_indexed_option_array64(),
            c => ragged_bail!("{} is not an option type", c.class_name()),
        }
    }

    /// An option node as a [`ByteMaskedArray`].
    pub fn to_byte_masked_array(&self) -> RaggedResult<ByteMaskedArray> {
        match self {
            Content::IndexedOption(a) => a.to_byte_masked_array(),
            Content::ByteMasked(a) => Ok(a.clone()),
            Content::BitMasked(a) => a.to_byte_masked_array(),
            Content::Unmasked(a) => a.to_byte_masked_array(),
            c => ragged_bail!("{} is not an option type", c.class_name()),
        }
    }

    /// A list node as a [`ListOffsetArray`] with 64-bit offsets.
    pub fn to_list_offset_array64(&self, start_at_zero: bool) -> RaggedResult<ListOffsetArray> {
        match self {
            Content::ListOffset(a) => a.to_list_offset_array64(start_at_zero),
            Content::List(a) => a.to_list_offset_array64(start_at_zero),
            Content::Regular(a) => a.to_list_offset_array64(start_at_zero),
            c => ragged_bail!("{} is not a list type", c.class_name()),
        }
    }

    /// The same tree on the typetracer backend. With `forget_length`, every length becomes
    /// unknown.
    pub fn to_typetracer(&self, forget_length: bool) -> Content {
        match_each_content!(self, |a| a.to_typetracer(forget_length).into())
    }

    /// The first structural invariant this tree breaks, as a message naming its path.
    pub fn validity_error(&self, path: &str) -> Option<String> {
        match self {
            Content::Empty(_) | Content::Numpy(_) => None,
            Content::Indexed(a) => a.validity_error(path),
            Content::IndexedOption(a) => a.validity_error(path),
            Content::ByteMasked(a) => a.validity_error(path),
            Content::BitMasked(a) => a.validity_error(path),
            Content::Unmasked(a) => a.validity_error(path),
            Content::ListOffset(a) => a.validity_error(path),
            Content::List(a) => a.validity_error(path),
            Content::Regular(a) => a.validity_error(path),
            Content::Record(a) => a.validity_error(path),
            Content::Union(a) => a.validity_error(path),
        }
    }

    /// Render the visible elements as JSON.
    pub fn to_list(&self) -> RaggedResult<Value> {
        match_each_content!(self, |a| a.to_list())
    }
}

fn fold_minmax(depths: impl Iterator<Item = (usize, usize)>) -> (usize, usize) {
    depths
        .reduce(|(amin, amax), (bmin, bmax)| (amin.min(bmin), amax.max(bmax)))
        .unwrap_or((1, 1))
}

fn fold_branch(depths: impl Iterator<Item = (bool, usize)>) -> (bool, usize) {
    depths
        .reduce(|(abranch, adepth), (bbranch, bdepth)| {
            (abranch || bbranch || adepth != bdepth, adepth.min(bdepth))
        })
        .unwrap_or((false, 1))
}

#[cfg(test)]
mod test {
    use ragged_buffer::buffer;
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn jagged() -> Content {
        ListOffsetArray::try_new(
            Index::from_i64s([0, 3, 3, 5]),
            NumpyArray::new(buffer![1.1f64, 2.2, 3.3, 4.4, 5.5]),
        )
        .unwrap()
        .into()
    }

    #[rstest]
    #[case(0, json!([1.1, 2.2, 3.3]))]
    #[case(1, json!([]))]
    #[case(-1, json!([4.4, 5.5]))]
    fn getitem_at_counts_from_either_end(#[case] at: i64, #[case] expected: Value) {
        assert_eq!(jagged().getitem_at(at).unwrap().to_json().unwrap(), expected);
    }

    #[rstest]
    #[case(3)]
    #[case(-4)]
    fn getitem_at_rejects_out_of_bounds(#[case] at: i64) {
        let err = jagged().getitem_at(at).unwrap_err();
        assert!(err.is_index_error());
    }

    #[test]
    fn typetracer_skips_bounds_checks() {
        let tt = jagged().to_typetracer(true);
        assert_eq!(tt.length(), Length::Unknown);
        let element = tt.getitem_at(100).unwrap();
        let Element::Array(inner) = element else {
            panic!("expected a list element");
        };
        assert_eq!(inner.form(), jagged().children()[0].form());
    }

    #[test]
    fn ranges_are_windows() {
        let window = jagged()
            .getitem_range(&SliceRange::new(Some(1), None, None))
            .unwrap();
        assert_eq!(window.to_list().unwrap(), json!([[], [4.4, 5.5]]));
        assert!(
            jagged()
                .getitem_range(&SliceRange::new(None, None, Some(2)))
                .is_err()
        );
    }

    #[test]
    fn depths_look_through_options_and_strings() {
        let strings = ListOffsetArray::try_new(Index::from_i64s([0, 2]), NumpyArray::chars("hi"))
            .unwrap()
            .with_parameters(Parameters::empty().with("__array__", "string"));
        let nested = ListOffsetArray::try_new(
            Index::from_i64s([0, 1]),
            UnmaskedArray::new(jagged()),
        )
        .unwrap();
        assert_eq!(Content::from(strings).purelist_depth(), 1);
        assert_eq!(Content::from(nested.clone()).purelist_depth(), 3);
        assert_eq!(Content::from(nested).branch_depth(), (false, 3));

        let record = RecordArray::try_new(
            vec![jagged(), NumpyArray::new(buffer![1i8, 2, 3]).into()],
            Some(vec!["a".into(), "b".into()]),
            None,
        )
        .unwrap();
        let record = Content::from(record);
        assert_eq!(record.minmax_depth(), (1, 2));
        assert_eq!(record.branch_depth(), (true, 1));
    }
}
