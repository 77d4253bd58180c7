use std::cmp::Ordering;

use ragged_dtype::NativePType;

use crate::data::{Data, DataMut, Primitive};
use crate::kernels::{KernelResult, as_i64, at, input, output, outputs, position, scalar};

/// Number of entries in the offsets of the runs of equal parents, one more than the number
/// of runs.
fn sorting_ranges_length(outs: &mut [DataMut], inputs: &[&Data], _: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let parents = input::<i64>(inputs, 0)?;
    let runs = parents
        .iter()
        .enumerate()
        .filter(|&(i, p)| i == 0 || parents[i - 1] != *p)
        .count();
    if let Some(o) = output::<i64>(out)?.first_mut() {
        *o = as_i64(runs + 1);
    }
    Ok(())
}

register_kernel!("sorting_ranges_length", sorting_ranges_length, [i64, i64]);

fn sorting_ranges(outs: &mut [DataMut], inputs: &[&Data], _: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let parents = input::<i64>(inputs, 0)?;
    let mut k = 0;
    for i in 0..parents.len() {
        if i == 0 || parents[i - 1] != parents[i] {
            *out.get_mut(k)
                .ok_or_else(|| kernel_err!(@ i, "ranges buffer too short"))? = as_i64(i);
            k += 1;
        }
    }
    if let Some(o) = out.get_mut(k) {
        *o = as_i64(parents.len());
    }
    Ok(())
}

register_kernel!("sorting_ranges", sorting_ranges, [i64, i64]);

fn ranges(offsets: &[i64]) -> impl Iterator<Item = (usize, usize)> + '_ {
    offsets
        .windows(2)
        .map(|w| (w[0].max(0) as usize, w[1].max(0) as usize))
}

fn comparator<T: NativePType>(ascending: bool) -> impl Fn(&T, &T) -> Ordering {
    move |a, b| {
        let ord = a.total_compare(*b);
        if ascending { ord } else { ord.reverse() }
    }
}

/// Sort each range of `offsets` independently.
fn sort<T: Primitive>(outs: &mut [DataMut], inputs: &[&Data], scalars: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<T>(out)?;
    let data = input::<T>(inputs, 0)?;
    let offsets = input::<i64>(inputs, 1)?;
    let ascending = scalar(scalars, 0)? != 0;
    let stable = scalar(scalars, 1)? != 0;
    if out.len() != data.len() {
        return Err(kernel_err!(
            "output has length {} but data has length {}",
            out.len(),
            data.len()
        ));
    }
    out.copy_from_slice(data);
    let cmp = comparator::<T>(ascending);
    for (start, stop) in ranges(offsets) {
        let range = out
            .get_mut(start..stop)
            .ok_or_else(|| kernel_err!(@ start, "range out of bounds"))?;
        if stable {
            range.sort_by(&cmp);
        } else {
            range.sort_unstable_by(&cmp);
        }
    }
    Ok(())
}

register_kernel_each!(
    "NumpyArray_sort",
    sort::<T>,
    [bool, i8, u8, i16, u16, i32, u32, i64, u64, f32, f64],
    [T, T, i64]
);

/// Global positions that sort each range of `offsets`.
fn argsort<T: Primitive>(
    outs: &mut [DataMut],
    inputs: &[&Data],
    scalars: &[i64],
) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let data = input::<T>(inputs, 0)?;
    let offsets = input::<i64>(inputs, 1)?;
    let ascending = scalar(scalars, 0)? != 0;
    let stable = scalar(scalars, 1)? != 0;
    if out.len() != data.len() {
        return Err(kernel_err!(
            "output has length {} but data has length {}",
            out.len(),
            data.len()
        ));
    }
    out.iter_mut()
        .enumerate()
        .for_each(|(i, o)| *o = as_i64(i));
    let cmp = comparator::<T>(ascending);
    for (start, stop) in ranges(offsets) {
        let range = out
            .get_mut(start..stop)
            .ok_or_else(|| kernel_err!(@ start, "range out of bounds"))?;
        let by_value = |a: &i64, b: &i64| cmp(&data[*a as usize], &data[*b as usize]);
        if stable {
            range.sort_by(by_value);
        } else {
            range.sort_unstable_by(by_value);
        }
    }
    Ok(())
}

register_kernel_each!(
    "NumpyArray_argsort",
    argsort::<T>,
    [bool, i8, u8, i16, u16, i32, u32, i64, u64, f32, f64],
    [i64, T, i64]
);

/// Turn global positions `q` into positions local to their group:
/// `q - starts[parents[q]] + shifts[q]`. Negative entries pass through.
fn argsort_adjust_starts_shifts(
    outs: &mut [DataMut],
    inputs: &[&Data],
    _: &[i64],
) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let q = input::<i64>(inputs, 0)?;
    let parents = input::<i64>(inputs, 1)?;
    let starts = input::<i64>(inputs, 2)?;
    let shifts = input::<i64>(inputs, 3)?;
    for (i, (o, &qi)) in out.iter_mut().zip(q).enumerate() {
        if qi < 0 {
            *o = qi;
            continue;
        }
        let qu = position(qi, i)?;
        let parent = position(at(parents, qu, i)?, i)?;
        *o = qi - at(starts, parent, i)? + shifts.get(qu).copied().unwrap_or(0);
    }
    Ok(())
}

register_kernel!(
    "NumpyArray_argsort_adjust_starts_shifts",
    argsort_adjust_starts_shifts,
    [i64, i64, i64, i64, i64]
);

/// Global string positions, sorted bytewise within each parent group.
fn argsort_strings(outs: &mut [DataMut], inputs: &[&Data], scalars: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let parents = input::<i64>(inputs, 0)?;
    let offsets = input::<i64>(inputs, 1)?;
    let chars = input::<u8>(inputs, 2)?;
    let ascending = scalar(scalars, 0)? != 0;
    let stable = scalar(scalars, 1)? != 0;
    let string = |i: usize| -> &[u8] {
        let start = offsets[i].max(0) as usize;
        let stop = offsets[i + 1].max(0) as usize;
        chars.get(start..stop).unwrap_or_default()
    };
    out.iter_mut()
        .enumerate()
        .for_each(|(i, o)| *o = as_i64(i));
    let cmp = |a: &i64, b: &i64| {
        let (a, b) = (*a as usize, *b as usize);
        parents[a].cmp(&parents[b]).then_with(|| {
            let ord = string(a).cmp(string(b));
            if ascending { ord } else { ord.reverse() }
        })
    };
    if stable {
        out.sort_by(cmp);
    } else {
        out.sort_unstable_by(cmp);
    }
    Ok(())
}

register_kernel!(
    "ListOffsetArray_argsort_strings",
    argsort_strings,
    [i64, i64, i64, u8]
);

/// Deduplicate sorted values grouped by `parents`, writing the kept values to the front of
/// `out` and the boundaries of every group to `outoffsets`. Groups without values are empty.
fn unique_grouped<T: Primitive>(
    outs: &mut [DataMut],
    inputs: &[&Data],
    _: &[i64],
) -> KernelResult {
    let [out, outoffsets] = outputs::<2>(outs)?;
    let out = output::<T>(out)?;
    let outoffsets = output::<i64>(outoffsets)?;
    let data = input::<T>(inputs, 0)?;
    let parents = input::<i64>(inputs, 1)?;
    outoffsets.fill(0);
    let mut k = 0;
    for (i, (&value, &parent)) in data.iter().zip(parents).enumerate() {
        let first = i == 0 || parents[i - 1] != parent;
        if first || data[i - 1].total_compare(value) != Ordering::Equal {
            *out.get_mut(k)
                .ok_or_else(|| kernel_err!(@ i, "unique buffer too short"))? = value;
            k += 1;
            let slot = position(parent, i)? + 1;
            *outoffsets
                .get_mut(slot)
                .ok_or_else(|| kernel_err!(@ i, "parent out of range"))? += 1;
        }
    }
    for i in 1..outoffsets.len() {
        outoffsets[i] += outoffsets[i - 1];
    }
    Ok(())
}

register_kernel_each!(
    "NumpyArray_unique_grouped",
    unique_grouped::<T>,
    [bool, i8, u8, i16, u16, i32, u32, i64, u64, f32, f64],
    [T, i64, T, i64]
);

/// The strings to keep from strings sorted within groups of `parents`, and the boundaries
/// of every group among the kept strings.
fn unique_strings(outs: &mut [DataMut], inputs: &[&Data], _: &[i64]) -> KernelResult {
    let [carry, outoffsets] = outputs::<2>(outs)?;
    let carry = output::<i64>(carry)?;
    let outoffsets = output::<i64>(outoffsets)?;
    let parents = input::<i64>(inputs, 0)?;
    let offsets = input::<i64>(inputs, 1)?;
    let chars = input::<u8>(inputs, 2)?;
    let string = |i: usize| -> &[u8] {
        let start = offsets[i].max(0) as usize;
        let stop = offsets[i + 1].max(0) as usize;
        chars.get(start..stop).unwrap_or_default()
    };
    outoffsets.fill(0);
    let mut k = 0;
    let nstrings = offsets.len().saturating_sub(1).min(parents.len());
    for i in 0..nstrings {
        let first = i == 0 || parents[i - 1] != parents[i];
        if first || string(i - 1) != string(i) {
            *carry
                .get_mut(k)
                .ok_or_else(|| kernel_err!(@ i, "carry buffer too short"))? = as_i64(i);
            k += 1;
            let slot = position(parents[i], i)? + 1;
            *outoffsets
                .get_mut(slot)
                .ok_or_else(|| kernel_err!(@ i, "parent out of range"))? += 1;
        }
    }
    for i in 1..outoffsets.len() {
        outoffsets[i] += outoffsets[i - 1];
    }
    Ok(())
}

register_kernel!(
    "ListOffsetArray_unique_strings",
    unique_strings,
    [i64, i64, i64, i64, u8]
);

#[cfg(test)]
mod test {
    use ragged_buffer::buffer;
    use ragged_dtype::PType;

    use crate::backend::{BackendRef, Length};
    use crate::data::Data;

    fn i64s(data: &crate::data::DataMut) -> Vec<i64> {
        data.clone()
            .freeze()
            .as_slice::<i64>()
            .map(|s| s.to_vec())
            .unwrap_or_default()
    }

    #[test]
    fn ranges_follow_parents() {
        let cpu = BackendRef::cpu();
        let parents = Data::from(buffer![0i64, 0, 1, 1, 1, 3]);
        let [len] = cpu
            .call(
                "sorting_ranges_length",
                [cpu.allocate(PType::I64, Length::Known(1)).unwrap()],
                &[&parents],
                &[],
            )
            .unwrap();
        assert_eq!(i64s(&len), vec![4]);
        let [ranges] = cpu
            .call(
                "sorting_ranges",
                [cpu.allocate(PType::I64, Length::Known(4)).unwrap()],
                &[&parents],
                &[],
            )
            .unwrap();
        assert_eq!(i64s(&ranges), vec![0, 2, 5, 6]);
    }

    #[test]
    fn descending_stable_argsort_keeps_tie_order() {
        let cpu = BackendRef::cpu();
        let data = Data::from(buffer![1.0f64, 3.0, 1.0, 3.0]);
        let offsets = Data::from(buffer![0i64, 4]);
        let [out] = cpu
            .call(
                "NumpyArray_argsort",
                [cpu.allocate(PType::I64, Length::Known(4)).unwrap()],
                &[&data, &offsets],
                &[0, 1],
            )
            .unwrap();
        assert_eq!(i64s(&out), vec![1, 3, 0, 2]);
    }

    #[test]
    fn unique_values_keep_empty_groups() {
        let cpu = BackendRef::cpu();
        let data = Data::from(buffer![1i32, 1, 2, 5, 5]);
        let parents = Data::from(buffer![0i64, 0, 0, 2, 2]);
        let [out, outoffsets] = cpu
            .call(
                "NumpyArray_unique_grouped",
                [
                    cpu.allocate(PType::I32, Length::Known(5)).unwrap(),
                    cpu.allocate(PType::I64, Length::Known(4)).unwrap(),
                ],
                &[&data, &parents],
                &[],
            )
            .unwrap();
        assert_eq!(i64s(&outoffsets), vec![0, 2, 2, 3]);
        assert_eq!(&out.freeze().as_slice::<i32>().unwrap()[..3], &[1, 2, 5]);
    }
}
