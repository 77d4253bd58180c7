//! Kernels of the indirection layouts. A negative index marks a missing element wherever
//! option semantics apply.

use ragged_dtype::NativePType;

use crate::data::{Data, DataMut};
use crate::kernels::{
    IndexPrimitive, KernelResult, as_i64, at, input, output, outputs, position, scalar,
};

/// Check every index against the content length and widen it.
fn getitem_nextcarry<T: IndexPrimitive>(
    outs: &mut [DataMut],
    inputs: &[&Data],
    scalars: &[i64],
) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let index = input::<T>(inputs, 0)?;
    let lencontent = scalar(scalars, 0)?;
    for (i, (o, &j)) in out.iter_mut().zip(index).enumerate() {
        let j = j.to_i64();
        if j < 0 || j >= lencontent {
            return Err(out_of_range!(i));
        }
        *o = j;
    }
    Ok(())
}

register_kernel_each!(
    "IndexedArray_getitem_nextcarry",
    getitem_nextcarry::<T>,
    [i32, u32, i64],
    [i64, T]
);

fn numnull<T: IndexPrimitive>(outs: &mut [DataMut], inputs: &[&Data], _: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let index = input::<T>(inputs, 0)?;
    let count = index.iter().filter(|j| j.to_i64() < 0).count();
    if let Some(o) = output::<i64>(out)?.first_mut() {
        *o = as_i64(count);
    }
    Ok(())
}

register_kernel_each!("IndexedArray_numnull", numnull::<T>, [i32, u32, i64], [i64, T]);

/// The non-missing indices, in order.
fn flatten_nextcarry<T: IndexPrimitive>(
    outs: &mut [DataMut],
    inputs: &[&Data],
    scalars: &[i64],
) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let index = input::<T>(inputs, 0)?;
    let lencontent = scalar(scalars, 0)?;
    let mut k = 0;
    for (i, &j) in index.iter().enumerate() {
        let j = j.to_i64();
        if j >= lencontent {
            return Err(out_of_range!(i));
        }
        if j >= 0 {
            *out.get_mut(k)
                .ok_or_else(|| kernel_err!(@ i, "carry buffer too short"))? = j;
            k += 1;
        }
    }
    Ok(())
}

register_kernel_each!(
    "IndexedArray_flatten_nextcarry",
    flatten_nextcarry::<T>,
    [i32, u32, i64],
    [i64, T]
);

/// Like `flatten_nextcarry`, also recording where each element lands: `outindex[i]` is the
/// position of element `i` in the carried content, or `-1`.
fn getitem_nextcarry_outindex<T: IndexPrimitive>(
    outs: &mut [DataMut],
    inputs: &[&Data],
    scalars: &[i64],
) -> KernelResult {
    let [nextcarry, outindex] = outputs::<2>(outs)?;
    let nextcarry = output::<i64>(nextcarry)?;
    let outindex = output::<i64>(outindex)?;
    let index = input::<T>(inputs, 0)?;
    let lencontent = scalar(scalars, 0)?;
    let mut k = 0;
    for (i, &j) in index.iter().enumerate() {
        let j = j.to_i64();
        if j >= lencontent {
            return Err(out_of_range!(i));
        }
        if j < 0 {
            outindex[i] = -1;
        } else {
            nextcarry[k] = j;
            outindex[i] = as_i64(k);
            k += 1;
        }
    }
    Ok(())
}

register_kernel_each!(
    "IndexedArray_getitem_nextcarry_outindex",
    getitem_nextcarry_outindex::<T>,
    [i32, u32, i64],
    [i64, i64, T]
);

/// Compose an outer index with an inner one: `out[i] = inner[outer[i]]`, missing stays
/// missing.
fn simplify<T: IndexPrimitive>(
    outs: &mut [DataMut],
    inputs: &[&Data],
    scalars: &[i64],
) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let outer = input::<T>(inputs, 0)?;
    let inner = input::<i64>(inputs, 1)?;
    let innerlength = scalar(scalars, 0)?;
    for (i, (o, &j)) in out.iter_mut().zip(outer).enumerate() {
        let j = j.to_i64();
        *o = if j < 0 {
            -1
        } else if j >= innerlength {
            return Err(out_of_range!(i));
        } else {
            at(inner, position(j, i)?, i)?
        };
    }
    Ok(())
}

register_kernel_each!(
    "IndexedArray_simplify",
    simplify::<T>,
    [i32, u32, i64],
    [i64, T, i64]
);

/// Mark as missing every element whose mask byte is nonzero.
fn overlay_mask<T: IndexPrimitive>(
    outs: &mut [DataMut],
    inputs: &[&Data],
    _: &[i64],
) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let mask = input::<i8>(inputs, 0)?;
    let index = input::<T>(inputs, 1)?;
    for (i, (o, &j)) in out.iter_mut().zip(index).enumerate() {
        *o = if at(mask, i, i)? != 0 { -1 } else { j.to_i64() };
    }
    Ok(())
}

register_kernel_each!(
    "IndexedArray_overlay_mask",
    overlay_mask::<T>,
    [i32, u32, i64],
    [i64, i8, T]
);

fn mask<T: IndexPrimitive>(outs: &mut [DataMut], inputs: &[&Data], _: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i8>(out)?;
    let index = input::<T>(inputs, 0)?;
    for (o, &j) in out.iter_mut().zip(index) {
        *o = i8::from(j.to_i64() < 0);
    }
    Ok(())
}

register_kernel_each!("IndexedArray_mask", mask::<T>, [i32, u32, i64], [i8, T]);

/// A byte mask (`1` for missing) and a carry that reads position zero for missing elements.
fn to_byte_masked<T: IndexPrimitive>(
    outs: &mut [DataMut],
    inputs: &[&Data],
    _: &[i64],
) -> KernelResult {
    let [mask, carry] = outputs::<2>(outs)?;
    let mask = output::<i8>(mask)?;
    let carry = output::<i64>(carry)?;
    let index = input::<T>(inputs, 0)?;
    for (i, &j) in index.iter().enumerate() {
        let j = j.to_i64();
        mask[i] = i8::from(j < 0);
        carry[i] = j.max(0);
    }
    Ok(())
}

register_kernel_each!(
    "IndexedOptionArray_to_ByteMaskedArray",
    to_byte_masked::<T>,
    [i32, u32, i64],
    [i8, i64, T]
);

/// Remove the indirection of a reduced layer: `nextcarry` gathers the present elements,
/// `nextparents` keeps their groups and `outindex` maps each element to its gathered
/// position or `-1`.
fn reduce_next<T: IndexPrimitive>(
    outs: &mut [DataMut],
    inputs: &[&Data],
    _: &[i64],
) -> KernelResult {
    let [nextcarry, nextparents, outindex] = outputs::<3>(outs)?;
    let nextcarry = output::<i64>(nextcarry)?;
    let nextparents = output::<i64>(nextparents)?;
    let outindex = output::<i64>(outindex)?;
    let index = input::<T>(inputs, 0)?;
    let parents = input::<i64>(inputs, 1)?;
    let mut k = 0;
    for (i, &j) in index.iter().enumerate() {
        let j = j.to_i64();
        if j >= 0 {
            nextcarry[k] = j;
            nextparents[k] = at(parents, i, i)?;
            outindex[i] = as_i64(k);
            k += 1;
        } else {
            outindex[i] = -1;
        }
    }
    Ok(())
}

register_kernel_each!(
    "IndexedArray_reduce_next",
    reduce_next::<T>,
    [i32, u32, i64],
    [i64, i64, i64, T, i64]
);

/// Shifts of the present elements: the missing elements skipped so far, on top of any
/// shift inherited from the layer above.
fn reduce_next_nonlocal_nextshifts<T: IndexPrimitive>(
    outs: &mut [DataMut],
    inputs: &[&Data],
    _: &[i64],
) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let index = input::<T>(inputs, 0)?;
    let shifts = input::<i64>(inputs, 1)?;
    let mut nullsum = 0;
    let mut k = 0;
    for (i, &j) in index.iter().enumerate() {
        if j.to_i64() >= 0 {
            out[k] = nullsum + shifts.get(i).copied().unwrap_or(0);
            k += 1;
        } else {
            nullsum += 1;
        }
    }
    Ok(())
}

register_kernel_each!(
    "IndexedArray_reduce_next_nonlocal_nextshifts",
    reduce_next_nonlocal_nextshifts::<T>,
    [i32, u32, i64],
    [i64, T, i64]
);

/// For groups rebuilt from their present elements: element `i` takes the next unused
/// position of its group, and groups run out into `-1`s.
fn local_preparenext(outs: &mut [DataMut], inputs: &[&Data], _: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let parents = input::<i64>(inputs, 0)?;
    let nextparents = input::<i64>(inputs, 1)?;
    let mut j = 0;
    for (o, &parent) in out.iter_mut().zip(parents) {
        if j < nextparents.len() && parent == nextparents[j] {
            *o = as_i64(j);
            j += 1;
        } else {
            *o = -1;
        }
    }
    Ok(())
}

register_kernel!(
    "IndexedArray_local_preparenext",
    local_preparenext,
    [i64, i64, i64]
);

/// Append the local positions of the missing elements of each group after the sorted
/// positions of its present elements. `shifts` maps a missing element's position within its
/// group back to its position in the group's original order.
fn argsort_nones_to_end<T: IndexPrimitive>(
    outs: &mut [DataMut],
    inputs: &[&Data],
    _: &[i64],
) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let argout = input::<i64>(inputs, 0)?;
    let index = input::<T>(inputs, 1)?;
    let parents = input::<i64>(inputs, 2)?;
    let starts = input::<i64>(inputs, 3)?;
    let shifts = input::<i64>(inputs, 4)?;
    let mut k = 0;
    let mut o = 0;
    let mut i = 0;
    while i < parents.len() {
        let parent = parents[i];
        let stop = parents[i..]
            .iter()
            .position(|&p| p != parent)
            .map_or(parents.len(), |n| i + n);
        let start = at(starts, position(parent, i)?, i)?;
        let present = index[i..stop].iter().filter(|j| j.to_i64() >= 0).count();
        for _ in 0..present {
            out[o] = at(argout, k, i)?;
            k += 1;
            o += 1;
        }
        for (n, j) in index[i..stop].iter().enumerate() {
            if j.to_i64() < 0 {
                out[o] = as_i64(i + n) - start + shifts.get(i + n).copied().unwrap_or(0);
                o += 1;
            }
        }
        i = stop;
    }
    Ok(())
}

register_kernel_each!(
    "IndexedArray_argsort_nones_to_end",
    argsort_nones_to_end::<T>,
    [i32, u32, i64],
    [i64, i64, T, i64, i64, i64]
);

/// Point missing elements at `scalars[0]`, the position of the fill value.
fn fill_none_index<T: IndexPrimitive>(
    outs: &mut [DataMut],
    inputs: &[&Data],
    scalars: &[i64],
) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let index = input::<T>(inputs, 0)?;
    let replacement = scalar(scalars, 0)?;
    for (o, &j) in out.iter_mut().zip(index) {
        let j = j.to_i64();
        *o = if j < 0 { replacement } else { j };
    }
    Ok(())
}

register_kernel_each!(
    "IndexedArray_fill_none_index",
    fill_none_index::<T>,
    [i32, u32, i64],
    [i64, T]
);

/// Offsets of a projected list layer stretched back over the missing elements, which become
/// empty lists.
fn flatten_none2empty<T: IndexPrimitive>(
    outs: &mut [DataMut],
    inputs: &[&Data],
    _: &[i64],
) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let index = input::<T>(inputs, 0)?;
    let offsets = input::<i64>(inputs, 1)?;
    if let Some(o) = out.first_mut() {
        *o = offsets.first().copied().unwrap_or(0);
    }
    let mut k = 0;
    for (i, &j) in index.iter().enumerate() {
        out[i + 1] = if j.to_i64() < 0 {
            out[i]
        } else {
            let count = at(offsets, k + 1, i)? - at(offsets, k, i)?;
            k += 1;
            out[i] + count
        };
    }
    Ok(())
}

register_kernel_each!(
    "IndexedArray_flatten_none2empty",
    flatten_none2empty::<T>,
    [i32, u32, i64],
    [i64, T, i64]
);

fn validity<T: IndexPrimitive>(_: &mut [DataMut], inputs: &[&Data], scalars: &[i64]) -> KernelResult {
    let index = input::<T>(inputs, 0)?;
    let lencontent = scalar(scalars, 0)?;
    let isoption = scalar(scalars, 1)? != 0;
    for (i, &j) in index.iter().enumerate() {
        let j = j.to_i64();
        if !isoption && j < 0 {
            return Err(kernel_err!(@ i, "index[i] < 0"));
        }
        if j >= lencontent {
            return Err(kernel_err!(@ i, "index[i] >= len(content)"));
        }
    }
    Ok(())
}

register_kernel_each!("IndexedArray_validity", validity::<T>, [i32, u32, i64], [T]);

#[cfg(test)]
mod test {
    use ragged_buffer::buffer;
    use ragged_dtype::PType;

    use crate::backend::{BackendRef, Length};
    use crate::data::{Data, DataMut};

    fn i64s(data: DataMut) -> Vec<i64> {
        data.freeze()
            .as_slice::<i64>()
            .map(<[i64]>::to_vec)
            .unwrap_or_default()
    }

    #[test]
    fn reduce_next_skips_missing() {
        let cpu = BackendRef::cpu();
        let index = Data::from(buffer![0i64, 1, -1, -1, 4]);
        let parents = Data::from(buffer![0i64, 0, 0, 1, 1]);
        let alloc = |n| cpu.allocate(PType::I64, Length::Known(n)).unwrap();
        let [nextcarry, nextparents, outindex] = cpu
            .call(
                "IndexedArray_reduce_next",
                [alloc(3), alloc(3), alloc(5)],
                &[&index, &parents],
                &[],
            )
            .unwrap();
        assert_eq!(i64s(nextcarry), vec![0, 1, 4]);
        assert_eq!(i64s(nextparents), vec![0, 0, 1]);
        assert_eq!(i64s(outindex), vec![0, 1, -1, -1, 2]);
    }

    #[test]
    fn missing_positions_follow_sorted_ones() {
        let cpu = BackendRef::cpu();
        // [[3, None, 1], [None, 2]] sorted within each list
        let argout = Data::from(buffer![2i64, 0, 1]);
        let index = Data::from(buffer![0i32, -1, 1, -1, 2]);
        let parents = Data::from(buffer![0i64, 0, 0, 1, 1]);
        let starts = Data::from(buffer![0i64, 3]);
        let shifts = Data::from(buffer![0i64; 0]);
        let [out] = cpu
            .call(
                "IndexedArray_argsort_nones_to_end",
                [cpu.allocate(PType::I64, Length::Known(5)).unwrap()],
                &[&argout, &index, &parents, &starts, &shifts],
                &[],
            )
            .unwrap();
        assert_eq!(i64s(out), vec![2, 0, 1, 1, 0]);
    }

    #[test]
    fn simplify_composes_indices() {
        let cpu = BackendRef::cpu();
        let outer = Data::from(buffer![2u32, 0, 1]);
        let inner = Data::from(buffer![-1i64, 5, 7]);
        let [out] = cpu
            .call(
                "IndexedArray_simplify",
                [cpu.allocate(PType::I64, Length::Known(3)).unwrap()],
                &[&outer, &inner],
                &[3],
            )
            .unwrap();
        assert_eq!(i64s(out), vec![7, -1, 5]);
    }
}
