#![cfg(test)]

use ragged_array::slicing::SliceItem;
use ragged_array::sorting::SortOptions;
use ragged_array::{
    BackendRef, ByteMaskedArray, Content, EmptyArray, Index, IndexedArray, IndexedOptionArray,
    ListOffsetArray, NumpyArray, RecordArray, UnionArray,
};
use ragged_buffer::{Buffer, buffer};
use ragged_dtype::Parameters;
use rstest::rstest;
use serde_json::{Value, json};

fn floats() -> Content {
    NumpyArray::new(buffer![3.3f64, 2.2, 1.1, 5.5, 4.4]).into()
}

/// `[[None, None, 2.2, 1.1, 3.3], [None, None, None], [4.4, None, 5.5], [5.5, None, None],
/// [-4.4, -5.5, -6.6]]`
fn lists_with_missing() -> Content {
    let content = IndexedOptionArray::try_new(
        Index::from_i64s([-1, -1, 0, 1, 2, -1, -1, -1, 3, -1, 4, 5, -1, -1, 6, 7, 8]),
        NumpyArray::new(buffer![2.2f64, 1.1, 3.3, 4.4, 5.5, 5.5, -4.4, -5.5, -6.6]),
    )
    .unwrap();
    ListOffsetArray::try_new(Index::from_i64s([0, 5, 8, 11, 14, 17]), content)
        .unwrap()
        .into()
}

/// `[[3, 2, 1], [], None, [4, 5]]`
fn optional_lists() -> Content {
    let lists = ListOffsetArray::try_new(
        Index::from_i64s([0, 3, 3, 5]),
        NumpyArray::new(buffer![3i64, 2, 1, 4, 5]),
    )
    .unwrap();
    IndexedOptionArray::try_new(Index::from_i64s([0, 1, -1, 2]), lists)
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

fn points() -> Content {
    RecordArray::try_new(
        vec![
            NumpyArray::new(buffer![1i64, 2, 3]).into(),
            ByteMaskedArray::try_new(
                Index::new(buffer![1i8, 0, 1]),
                NumpyArray::new(buffer![0.5f64, 1.5, 2.5]),
                true,
            )
            .unwrap()
            .into(),
        ],
        Some(vec!["x".to_string(), "y".to_string()]),
        None,
    )
    .unwrap()
    .into()
}

/// Picks `positions` out of `values`, list by list.
fn take_json(values: &Value, positions: &Value) -> Value {
    match (values, positions) {
        (Value::Array(values), Value::Array(positions))
            if positions.iter().any(Value::is_array)
                && positions.iter().all(|p| p.is_array() || p.is_null()) =>
        {
            Value::Array(
                values
                    .iter()
                    .zip(positions)
                    .map(|(v, p)| take_json(v, p))
                    .collect(),
            )
        }
        (Value::Array(values), Value::Array(positions)) => Value::Array(
            positions
                .iter()
                .map(|p| values[p.as_u64().unwrap() as usize].clone())
                .collect(),
        ),
        (values, Value::Null) => values.clone(),
        _ => panic!("mismatched nesting: {values} and {positions}"),
    }
}

#[rstest]
#[case(floats(), true)]
#[case(floats(), false)]
#[case(lists_with_missing(), true)]
#[case(lists_with_missing(), false)]
#[case(optional_lists(), true)]
#[case(optional_lists(), false)]
#[case(strings(&["one", "two", "three", "four", "five"]), true)]
fn argsort_selects_the_sorted_values(#[case] array: Content, #[case] ascending: bool) {
    let options = SortOptions {
        ascending,
        ..Default::default()
    };
    let positions = array.argsort(&options).unwrap().to_list().unwrap();
    let sorted = array.sort(&options).unwrap().to_list().unwrap();
    assert_eq!(take_json(&array.to_list().unwrap(), &positions), sorted);
}

#[test]
fn argsort_of_missing_lists_slices_back_to_the_sorted_lists() {
    let array = optional_lists();
    let positions = array.argsort(&SortOptions::default()).unwrap();
    assert_eq!(positions.to_list().unwrap(), json!([[2, 1, 0], [], null, [0, 1]]));
    let sorted = array.getitem(&[SliceItem::Jagged(positions)]).unwrap();
    assert_eq!(
        sorted.as_array().unwrap().to_list().unwrap(),
        json!([[1, 2, 3], [], null, [4, 5]])
    );
}

#[rstest]
#[case(json!([[0, 2], [], [1]]))]
#[case(json!([[true, false, true], [], [false, true]]))]
fn typetracer_slicing_matches_concrete_forms(#[case] slice: Value) {
    let array: Content = ListOffsetArray::try_new(
        Index::from_i64s([0, 3, 3, 5]),
        NumpyArray::new(buffer![1.1f64, 2.2, 3.3, 4.4, 5.5]),
    )
    .unwrap()
    .into();
    let slice = jagged_slice(&slice);
    let concrete = array.getitem(&[SliceItem::Jagged(slice.clone())]).unwrap();
    let traced = array
        .to_typetracer(true)
        .getitem(&[SliceItem::Jagged(slice.to_typetracer(true))])
        .unwrap();
    assert_eq!(
        traced.as_array().unwrap().form(),
        concrete.as_array().unwrap().form()
    );
}

/// A list-offset array of integers or booleans from nested JSON.
fn jagged_slice(rows: &Value) -> Content {
    let rows = rows.as_array().unwrap();
    let mut offsets = vec![0i64];
    for row in rows {
        offsets.push(offsets[offsets.len() - 1] + row.as_array().unwrap().len() as i64);
    }
    let items: Vec<&Value> = rows.iter().flat_map(|r| r.as_array().unwrap()).collect();
    let leaf: Content = if items.iter().all(|v| v.is_boolean()) && !items.is_empty() {
        NumpyArray::new(items.iter().map(|v| v.as_bool().unwrap()).collect::<Buffer<bool>>()).into()
    } else {
        NumpyArray::new(items.iter().map(|v| v.as_i64().unwrap()).collect::<Buffer<i64>>()).into()
    };
    ListOffsetArray::try_new(Index::from_i64s(offsets), leaf)
        .unwrap()
        .into()
}

#[rstest]
#[case(true)]
#[case(false)]
fn missing_values_sort_last_in_either_direction(#[case] ascending: bool) {
    let sorted = lists_with_missing()
        .sort(&SortOptions {
            ascending,
            ..Default::default()
        })
        .unwrap()
        .to_list()
        .unwrap();
    for list in sorted.as_array().unwrap() {
        let items = list.as_array().unwrap();
        let present = items.iter().take_while(|v| !v.is_null()).count();
        assert!(items[present..].iter().all(Value::is_null), "{list}");
    }
}

#[rstest]
#[case(lists_with_missing())]
#[case(points())]
fn typetracer_forms_match_concrete_forms(#[case] array: Content) {
    let traced = array.to_typetracer(true);
    let options = SortOptions::default();
    assert_eq!(
        traced.sort(&options).unwrap().form(),
        array.sort(&options).unwrap().form()
    );
    assert_eq!(
        traced.argsort(&options).unwrap().form(),
        array.argsort(&options).unwrap().form()
    );
}

#[test]
fn simplifying_options_is_idempotent() {
    let inner = ByteMaskedArray::try_new(
        Index::new(buffer![1i8, 0, 1, 1]),
        NumpyArray::new(buffer![1i64, 2, 3, 4]),
        true,
    )
    .unwrap();
    let nested: Content = IndexedOptionArray::try_new(Index::from_i64s([3, -1, 0, 1]), inner)
        .unwrap()
        .into();
    let once = nested.simplify_optiontype().unwrap();
    let twice = once.simplify_optiontype().unwrap();
    assert_eq!(once.form(), twice.form());
    assert_eq!(twice.to_list().unwrap(), json!([4, null, 1, null]));
    assert_eq!(twice.to_list().unwrap(), nested.to_list().unwrap());
}

#[test]
fn projecting_follows_the_index() {
    let indexed: Content = IndexedArray::try_new(
        Index::from_i64s([2, 0, 0, 1]),
        NumpyArray::new(buffer![1.5f64, 2.5, 3.5]),
    )
    .unwrap()
    .into();
    assert_eq!(
        indexed.project(None).unwrap().to_list().unwrap(),
        json!([3.5, 1.5, 1.5, 2.5])
    );
}

#[test]
fn stacked_indirection_composes_its_indices() {
    let inner = IndexedArray::try_new(
        Index::from_i64s([3, 1, 2, 0]),
        NumpyArray::new(buffer![10i64, 11, 12, 13]),
    )
    .unwrap();
    let outer: Content = IndexedArray::try_new(Index::from_i64s([0, 0, 2]), inner)
        .unwrap()
        .into();
    let simplified = outer.simplify_optiontype().unwrap();
    let Content::Indexed(single) = &simplified else {
        panic!("expected one IndexedArray, got {}", simplified.class_name());
    };
    assert_eq!(single.index().to_vec().unwrap(), vec![3, 3, 2]);
    assert_eq!(single.content().class_name(), "NumpyArray");
    assert_eq!(simplified.to_list().unwrap(), json!([13, 13, 12]));
}

#[rstest]
#[case(vec![NumpyArray::new(buffer![1i64, 2]).into(), floats()])]
#[case(vec![floats(), strings(&["a", "b"])])]
fn simplifying_unions_is_idempotent(#[case] contents: Vec<Content>) {
    let union: Content = UnionArray::try_new(
        Index::new(buffer![0i8, 1, 1, 0]),
        Index::from_i64s([0, 0, 1, 1]),
        contents,
    )
    .unwrap()
    .into();
    let once = union.simplify_uniontype(true, false).unwrap();
    let twice = once.simplify_uniontype(true, false).unwrap();
    assert_eq!(once.form(), twice.form());
    assert_eq!(once.to_list().unwrap(), twice.to_list().unwrap());
    assert_eq!(once.length(), union.length());
}

#[rstest]
#[case(floats())]
#[case(lists_with_missing())]
#[case(points())]
#[case(strings(&["a", "bc"]))]
fn merging_with_nothing_changes_nothing(#[case] array: Content) {
    let empty: Content = EmptyArray::new(BackendRef::cpu()).into();
    for merged in [array.merge(&empty).unwrap(), empty.merge(&array).unwrap()] {
        assert_eq!(merged.form(), array.form());
        assert_eq!(merged.to_list().unwrap(), array.to_list().unwrap());
    }
}

#[test]
fn merging_into_a_trailing_union_keeps_order() {
    let union: Content = UnionArray::try_new(
        Index::new(buffer![0i8, 1]),
        Index::from_i64s([0, 0]),
        vec![floats(), strings(&["a"])],
    )
    .unwrap()
    .into();
    let merged = floats().mergemany(&[union.clone(), union]).unwrap();
    assert_eq!(
        merged.to_list().unwrap(),
        json!([3.3, 2.2, 1.1, 5.5, 4.4, 3.3, "a", 3.3, "a"])
    );
}

#[rstest]
#[case(Some(0))]
#[case(Some(-2))]
fn unique_along_outer_axes_is_not_implemented(#[case] axis: Option<i64>) {
    let err = lists_with_missing().unique(axis).unwrap_err();
    assert!(err.is_not_implemented(), "{err}");
    assert!(err.to_string().contains("only the innermost axis"));
}
