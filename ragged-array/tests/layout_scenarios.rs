#![cfg(test)]

use ragged_array::reducers::{ReduceOptions, Sum};
use ragged_array::slicing::{SliceItem, SliceRange};
use ragged_array::sorting::SortOptions;
use ragged_array::{
    ByteMaskedArray, Content, Index, IndexedArray, ListOffsetArray, NumpyArray, RegularArray,
    UnionArray,
};
use ragged_buffer::buffer;
use ragged_dtype::Parameters;
use rstest::rstest;
use serde_json::json;

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

/// `[[1, 2, 3], [], [4, 5]]` viewed through a regular dimension of size zero and length zero.
fn empty_regular() -> Content {
    let lists = ListOffsetArray::try_new(
        Index::from_i64s([0, 3, 3, 5]),
        NumpyArray::new(buffer![1i64, 2, 3, 4, 5]),
    )
    .unwrap();
    RegularArray::try_new(lists, 0, 0).unwrap().into()
}

#[test]
fn indexed_values_argsort_after_projection() {
    let indexed: Content = IndexedArray::try_new(
        Index::from_i64s([1, 2, 3, 4]),
        NumpyArray::new(buffer![1.1f64, 2.2, 3.3, 4.4, 5.5]),
    )
    .unwrap()
    .into();
    assert_eq!(
        indexed
            .argsort(&SortOptions::default())
            .unwrap()
            .to_list()
            .unwrap(),
        json!([0, 1, 2, 3])
    );
}

#[test]
fn masked_lists_sort_across_the_outer_axis() {
    let content = ListOffsetArray::try_new(
        Index::from_i64s([0, 3, 3, 5, 6, 10]),
        NumpyArray::new(buffer![0.0f64, 1.1, 2.2, 3.3, 4.4, 5.5, 6.6, 7.7, 8.8, 9.9]),
    )
    .unwrap();
    let masked: Content =
        ByteMaskedArray::try_new(Index::new(buffer![0i8, 0, 1, 1, 0]), content, false)
            .unwrap()
            .into();
    let options = SortOptions {
        axis: 0,
        ..Default::default()
    };
    assert_eq!(
        masked.sort(&options).unwrap().to_list().unwrap(),
        json!([[0.0, 1.1, 2.2], [], [6.6, 7.7, 8.8, 9.9], null, null])
    );
}

#[test]
fn unions_of_numbers_and_strings_refuse_to_sort() {
    let numbers = ListOffsetArray::try_new(
        Index::from_i64s([0, 3, 3, 5]),
        NumpyArray::new(buffer![1.1f64, 2.2, 3.3, 4.4, 5.5]),
    )
    .unwrap();
    let words = ListOffsetArray::try_new(
        Index::from_i64s([0, 1, 2, 3, 4, 5]),
        strings(&["one", "two", "three", "four", "five"]),
    )
    .unwrap();
    let union: Content = UnionArray::try_new(
        Index::new(buffer![1i8, 1, 0, 0, 1, 0, 1, 1]),
        Index::from_i64s([0, 1, 0, 1, 2, 2, 4, 3]),
        vec![numbers.into(), words.into()],
    )
    .unwrap()
    .into();
    let err = union
        .sort(&SortOptions {
            axis: 1,
            ..Default::default()
        })
        .unwrap_err();
    assert!(err.is_type_error());
}

#[test]
fn no_lists_sort_to_no_lists() {
    let empty: Content = ListOffsetArray::try_new(
        Index::from_i64s([0]),
        NumpyArray::new(buffer![1.1f64, 2.2, 3.3, 4.4, 5.5, 6.6, 7.7, 8.8, 9.9]),
    )
    .unwrap()
    .into();
    let options = SortOptions::default();
    assert_eq!(empty.sort(&options).unwrap().to_list().unwrap(), json!([]));
    assert_eq!(empty.argsort(&options).unwrap().to_list().unwrap(), json!([]));
}

#[test]
fn empty_regular_counts() {
    let array = empty_regular();
    assert_eq!(array.to_list().unwrap(), json!([]));
    assert_eq!(array.num(0).unwrap().to_json().unwrap(), json!(0));
    assert_eq!(array.num(1).unwrap().to_json().unwrap(), json!([]));
    assert_eq!(array.num(2).unwrap().to_json().unwrap(), json!([]));
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(2)]
fn empty_regular_flattens_and_indexes_to_nothing(#[case] axis: i64) {
    let array = empty_regular();
    assert_eq!(array.flatten(axis).unwrap().to_list().unwrap(), json!([]));
    assert_eq!(array.local_index(axis).unwrap().to_list().unwrap(), json!([]));
}

#[rstest]
#[case(0, 0, json!([]))]
#[case(1, 0, json!([null]))]
#[case(0, 1, json!([]))]
#[case(1, 1, json!([]))]
#[case(0, 2, json!([]))]
#[case(1, 2, json!([]))]
fn empty_regular_pads(#[case] target: usize, #[case] axis: i64, #[case] expected: serde_json::Value) {
    assert_eq!(
        empty_regular()
            .pad_none(target, axis, false)
            .unwrap()
            .to_list()
            .unwrap(),
        expected
    );
}

#[test]
fn empty_regular_sorts_sums_and_concatenates() {
    let array = empty_regular();
    assert_eq!(
        array.sort(&SortOptions::default()).unwrap().to_list().unwrap(),
        json!([])
    );
    let sum = array
        .reduce(
            &Sum,
            &ReduceOptions {
                axis: 0,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(sum.to_json().unwrap(), json!([]));
    assert_eq!(array.merge(&array).unwrap().to_list().unwrap(), json!([]));
}

fn lists() -> Content {
    ListOffsetArray::try_new(
        Index::from_i64s([0, 3, 3, 5]),
        NumpyArray::new(buffer![1.1f64, 2.2, 3.3, 4.4, 5.5]),
    )
    .unwrap()
    .into()
}

#[rstest]
#[case(NumpyArray::new(buffer![1i64, 2, 3]).into(), vec![SliceItem::Array(Index::from_i64s([0, 3]))])]
#[case(NumpyArray::new(buffer![1i64, 2, 3]).into(), vec![SliceItem::Int(-4)])]
#[case(lists(), vec![SliceItem::Int(3)])]
#[case(lists(), vec![SliceRange::full().into(), SliceItem::Int(0)])]
#[case(ListOffsetArray::try_new(Index::from_i64s([0]), NumpyArray::new(buffer![1i64])).unwrap().into(), vec![SliceItem::Int(0)])]
fn out_of_range_positions_are_index_errors(#[case] array: Content, #[case] items: Vec<SliceItem>) {
    let err = array.getitem(&items).unwrap_err();
    assert!(err.is_index_error(), "{err}");
}
