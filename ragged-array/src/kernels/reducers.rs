//! Segmented reductions. Every kernel reads a flat buffer plus a parent id per element and
//! writes one result per parent id.

use ragged_dtype::NativePType;

use crate::data::{Data, DataMut, Primitive};
use crate::kernels::{
    KernelError, KernelResult, as_i64, at, input, output, outputs, position, scalar_usize,
};

fn groups<'a>(
    parents: &'a [i64],
    outlength: usize,
) -> impl Iterator<Item = Result<(usize, usize), KernelError>> + 'a {
    parents.iter().enumerate().map(move |(i, &p)| {
        let p = position(p, i)?;
        if p >= outlength {
            return Err(kernel_err!(@ i, "parent {} out of range for {} groups", p, outlength));
        }
        Ok((i, p))
    })
}

fn count(outs: &mut [DataMut], inputs: &[&Data], _: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let parents = input::<i64>(inputs, 0)?;
    out.fill(0);
    let outlength = out.len();
    for g in groups(parents, outlength) {
        let (_, p) = g?;
        out[p] += 1;
    }
    Ok(())
}

register_kernel!("reduce_count", count, [i64, i64]);

fn count_nonzero<T: Primitive>(outs: &mut [DataMut], inputs: &[&Data], _: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let data = input::<T>(inputs, 0)?;
    let parents = input::<i64>(inputs, 1)?;
    out.fill(0);
    let outlength = out.len();
    for g in groups(parents, outlength) {
        let (i, p) = g?;
        if at(data, i, i)?.is_nonzero() {
            out[p] += 1;
        }
    }
    Ok(())
}

register_kernel_each!(
    "reduce_countnonzero",
    count_nonzero::<T>,
    [bool, i8, u8, i16, u16, i32, u32, i64, u64, f32, f64],
    [i64, T, i64]
);

#[inline]
fn cast<O: NativePType, T: NativePType>(value: T) -> O {
    if O::PTYPE.is_float() || T::PTYPE.is_float() {
        O::from_f64(value.to_f64())
    } else {
        O::from_i64(value.to_i64())
    }
}

fn sum<O: Primitive, T: Primitive>(
    outs: &mut [DataMut],
    inputs: &[&Data],
    _: &[i64],
) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<O>(out)?;
    let data = input::<T>(inputs, 0)?;
    let parents = input::<i64>(inputs, 1)?;
    out.fill(O::ZERO);
    let outlength = out.len();
    for g in groups(parents, outlength) {
        let (i, p) = g?;
        out[p] = out[p].add_wrapping(cast(at(data, i, i)?));
    }
    Ok(())
}

fn prod<O: Primitive, T: Primitive>(
    outs: &mut [DataMut],
    inputs: &[&Data],
    _: &[i64],
) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<O>(out)?;
    let data = input::<T>(inputs, 0)?;
    let parents = input::<i64>(inputs, 1)?;
    out.fill(O::ONE);
    let outlength = out.len();
    for g in groups(parents, outlength) {
        let (i, p) = g?;
        out[p] = out[p].mul_wrapping(cast(at(data, i, i)?));
    }
    Ok(())
}

register_kernel_each!("reduce_sum", sum::<i64, T>, [bool, i8, i16, i32, i64], [i64, T, i64]);
register_kernel_each!("reduce_sum", sum::<u64, T>, [u8, u16, u32, u64], [u64, T, i64]);
register_kernel_each!("reduce_sum", sum::<T, T>, [f32, f64], [T, T, i64]);
register_kernel_each!("reduce_prod", prod::<i64, T>, [bool, i8, i16, i32, i64], [i64, T, i64]);
register_kernel_each!("reduce_prod", prod::<u64, T>, [u8, u16, u32, u64], [u64, T, i64]);
register_kernel_each!("reduce_prod", prod::<T, T>, [f32, f64], [T, T, i64]);

/// `any`: true where some element of the group is nonzero.
fn sum_bool<T: Primitive>(outs: &mut [DataMut], inputs: &[&Data], _: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<bool>(out)?;
    let data = input::<T>(inputs, 0)?;
    let parents = input::<i64>(inputs, 1)?;
    out.fill(false);
    let outlength = out.len();
    for g in groups(parents, outlength) {
        let (i, p) = g?;
        out[p] |= at(data, i, i)?.is_nonzero();
    }
    Ok(())
}

/// `all`: true where every element of the group is nonzero.
fn prod_bool<T: Primitive>(outs: &mut [DataMut], inputs: &[&Data], _: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<bool>(out)?;
    let data = input::<T>(inputs, 0)?;
    let parents = input::<i64>(inputs, 1)?;
    out.fill(true);
    let outlength = out.len();
    for g in groups(parents, outlength) {
        let (i, p) = g?;
        out[p] &= at(data, i, i)?.is_nonzero();
    }
    Ok(())
}

register_kernel_each!(
    "reduce_sum_bool",
    sum_bool::<T>,
    [bool, i8, u8, i16, u16, i32, u32, i64, u64, f32, f64],
    [bool, T, i64]
);
register_kernel_each!(
    "reduce_prod_bool",
    prod_bool::<T>,
    [bool, i8, u8, i16, u16, i32, u32, i64, u64, f32, f64],
    [bool, T, i64]
);

fn min<T: Primitive>(outs: &mut [DataMut], inputs: &[&Data], _: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<T>(out)?;
    let data = input::<T>(inputs, 0)?;
    let parents = input::<i64>(inputs, 1)?;
    out.fill(T::HIGHEST);
    let outlength = out.len();
    for g in groups(parents, outlength) {
        let (i, p) = g?;
        let value = at(data, i, i)?;
        if value < out[p] {
            out[p] = value;
        }
    }
    Ok(())
}

fn max<T: Primitive>(outs: &mut [DataMut], inputs: &[&Data], _: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<T>(out)?;
    let data = input::<T>(inputs, 0)?;
    let parents = input::<i64>(inputs, 1)?;
    out.fill(T::LOWEST);
    let outlength = out.len();
    for g in groups(parents, outlength) {
        let (i, p) = g?;
        let value = at(data, i, i)?;
        if value > out[p] {
            out[p] = value;
        }
    }
    Ok(())
}

register_kernel_each!(
    "reduce_min",
    min::<T>,
    [bool, i8, u8, i16, u16, i32, u32, i64, u64, f32, f64],
    [T, T, i64]
);
register_kernel_each!(
    "reduce_max",
    max::<T>,
    [bool, i8, u8, i16, u16, i32, u32, i64, u64, f32, f64],
    [T, T, i64]
);

/// Global position of the first extreme element of each group, `-1` for empty groups.
fn arg_extreme<T: Primitive, const MAX: bool>(
    outs: &mut [DataMut],
    inputs: &[&Data],
    _: &[i64],
) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let data = input::<T>(inputs, 0)?;
    let parents = input::<i64>(inputs, 1)?;
    out.fill(-1);
    let outlength = out.len();
    for g in groups(parents, outlength) {
        let (i, p) = g?;
        let value = at(data, i, i)?;
        let replace = match position(out[p], i) {
            Err(_) => true,
            Ok(best) => {
                let best = at(data, best, i)?;
                if MAX { value > best } else { value < best }
            }
        };
        if replace {
            out[p] = as_i64(i);
        }
    }
    Ok(())
}

register_kernel_each!(
    "reduce_argmin",
    arg_extreme::<T, false>,
    [bool, i8, u8, i16, u16, i32, u32, i64, u64, f32, f64],
    [i64, T, i64]
);
register_kernel_each!(
    "reduce_argmax",
    arg_extreme::<T, true>,
    [bool, i8, u8, i16, u16, i32, u32, i64, u64, f32, f64],
    [i64, T, i64]
);

/// `1` for every group that received no element.
fn mask(outs: &mut [DataMut], inputs: &[&Data], _: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i8>(out)?;
    let parents = input::<i64>(inputs, 0)?;
    out.fill(1);
    let outlength = out.len();
    for g in groups(parents, outlength) {
        let (_, p) = g?;
        out[p] = 0;
    }
    Ok(())
}

register_kernel!("reduce_mask", mask, [i8, i64]);

/// Positions `pos[g]` made local: `pos[g] - starts[g] + shifts[pos[g]]`.
fn adjust_starts_shifts(outs: &mut [DataMut], inputs: &[&Data], _: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let pos = input::<i64>(inputs, 0)?;
    let starts = input::<i64>(inputs, 1)?;
    let shifts = input::<i64>(inputs, 2)?;
    for (g, (o, &p)) in out.iter_mut().zip(pos).enumerate() {
        *o = match position(p, g) {
            Err(_) => p,
            Ok(pu) => p - at(starts, g, g)? + shifts.get(pu).copied().unwrap_or(0),
        };
    }
    Ok(())
}

register_kernel!(
    "NumpyArray_reduce_adjust_starts_shifts",
    adjust_starts_shifts,
    [i64, i64, i64, i64]
);

/// The list each content element belongs to.
fn local_nextparents(outs: &mut [DataMut], inputs: &[&Data], _: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let offsets = input::<i64>(inputs, 0)?;
    let base = offsets.first().copied().unwrap_or(0);
    for (i, w) in offsets.windows(2).enumerate() {
        for k in w[0]..w[1] {
            let slot = position(k - base, i)?;
            *out.get_mut(slot)
                .ok_or_else(|| kernel_err!(@ i, "offsets exceed output"))? = as_i64(i);
        }
    }
    Ok(())
}

register_kernel!("ListOffsetArray_reduce_local_nextparents", local_nextparents, [i64, i64]);

/// Offsets of the groups described by sorted `parents`.
fn local_outoffsets(outs: &mut [DataMut], inputs: &[&Data], _: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let parents = input::<i64>(inputs, 0)?;
    out.fill(0);
    let outlength = out.len().saturating_sub(1);
    for g in groups(parents, outlength) {
        let (_, p) = g?;
        out[p + 1] += 1;
    }
    for i in 1..out.len() {
        out[i] += out[i - 1];
    }
    Ok(())
}

register_kernel!("ListOffsetArray_reduce_local_outoffsets", local_outoffsets, [i64, i64]);

/// The longest list.
fn nonlocal_maxcount(outs: &mut [DataMut], inputs: &[&Data], _: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let offsets = input::<i64>(inputs, 0)?;
    let maxcount = offsets.windows(2).map(|w| w[1] - w[0]).max().unwrap_or(0);
    if let Some(o) = output::<i64>(out)?.first_mut() {
        *o = maxcount;
    }
    Ok(())
}

register_kernel!("ListOffsetArray_reduce_nonlocal_maxcount", nonlocal_maxcount, [i64, i64]);

/// Regroup list elements by (parent, position in list).
///
/// Elements are emitted parent-major, then by position `j`, then by list. Group
/// `parent * maxcount + j` collects the `j`-th element of every list of `parent`.
/// `nextshifts` turns a rank within a group back into the list's position within its parent.
fn nonlocal_preparenext(
    outs: &mut [DataMut],
    inputs: &[&Data],
    scalars: &[i64],
) -> KernelResult {
    let [nextcarry, nextparents, nextshifts] = outputs::<3>(outs)?;
    let nextcarry = output::<i64>(nextcarry)?;
    let nextparents = output::<i64>(nextparents)?;
    let nextshifts = output::<i64>(nextshifts)?;
    let offsets = input::<i64>(inputs, 0)?;
    let parents = input::<i64>(inputs, 1)?;
    let starts = input::<i64>(inputs, 2)?;
    let shifts = input::<i64>(inputs, 3)?;
    let maxcount = scalar_usize(scalars, 0)?;
    let base = offsets.first().copied().unwrap_or(0);

    let nlists = offsets.len().saturating_sub(1);
    let mut lists: Vec<usize> = (0..nlists).collect();
    lists.sort_by_key(|&i| parents.get(i).copied().unwrap_or(0));

    let mut k = 0;
    for run in lists.chunk_by(|&a, &b| parents[a] == parents[b]) {
        let parent = position(at(parents, run[0], run[0])?, run[0])?;
        let parent_start = at(starts, parent, run[0])?;
        for j in 0..maxcount {
            let mut rank = 0;
            for &i in run {
                let count = position(offsets[i + 1] - offsets[i], i)?;
                if j >= count {
                    continue;
                }
                let slot = nextcarry
                    .get_mut(k)
                    .ok_or_else(|| kernel_err!(@ i, "carry buffer too short"))?;
                *slot = offsets[i] - base + as_i64(j);
                nextparents[k] = as_i64(parent * maxcount + j);
                nextshifts[k] = (as_i64(i) - parent_start) - rank
                    + shifts.get(i).copied().unwrap_or(0);
                rank += 1;
                k += 1;
            }
        }
    }
    Ok(())
}

register_kernel!(
    "ListOffsetArray_reduce_nonlocal_preparenext",
    nonlocal_preparenext,
    [i64, i64, i64, i64, i64, i64, i64]
);

/// Position of the first element of each group.
fn nonlocal_nextstarts(outs: &mut [DataMut], inputs: &[&Data], _: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let nextparents = input::<i64>(inputs, 0)?;
    out.fill(0);
    let mut last = -1;
    for (k, &p) in nextparents.iter().enumerate() {
        if p != last {
            let slot = position(p, k)?;
            *out.get_mut(slot)
                .ok_or_else(|| kernel_err!(@ k, "parent out of range"))? = as_i64(k);
            last = p;
        }
    }
    Ok(())
}

register_kernel!("ListOffsetArray_reduce_nonlocal_nextstarts", nonlocal_nextstarts, [i64, i64]);

/// Bounds of the reduced lists: parent `p` owns groups `p * maxcount` up to the length of
/// its longest list.
fn nonlocal_outstartsstops(
    outs: &mut [DataMut],
    inputs: &[&Data],
    scalars: &[i64],
) -> KernelResult {
    let [outstarts, outstops] = outputs::<2>(outs)?;
    let outstarts = output::<i64>(outstarts)?;
    let outstops = output::<i64>(outstops)?;
    let offsets = input::<i64>(inputs, 0)?;
    let parents = input::<i64>(inputs, 1)?;
    let maxcount = scalar_usize(scalars, 0)?;
    for (p, (s, t)) in outstarts.iter_mut().zip(outstops.iter_mut()).enumerate() {
        *s = as_i64(p * maxcount);
        *t = *s;
    }
    let outlength = outstarts.len();
    for g in groups(parents, outlength) {
        let (i, p) = g?;
        let count = at(offsets, i + 1, i)? - at(offsets, i, i)?;
        outstops[p] = outstops[p].max(outstarts[p] + count);
    }
    Ok(())
}

register_kernel!(
    "ListOffsetArray_reduce_nonlocal_outstartsstops",
    nonlocal_outstartsstops,
    [i64, i64, i64, i64]
);

/// The inverse of a permutation.
fn local_preparenext(outs: &mut [DataMut], inputs: &[&Data], _: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let nextcarry = input::<i64>(inputs, 0)?;
    for (k, &c) in nextcarry.iter().enumerate() {
        let slot = position(c, k)?;
        *out.get_mut(slot)
            .ok_or_else(|| kernel_err!(@ k, "carry out of range"))? = as_i64(k);
    }
    Ok(())
}

register_kernel!("ListOffsetArray_local_preparenext", local_preparenext, [i64, i64]);

#[cfg(test)]
mod test {
    use ragged_buffer::buffer;
    use ragged_dtype::PType;

    use crate::backend::{BackendRef, Length};
    use crate::data::Data;

    fn run<const N: usize>(
        kernel: &'static str,
        outputs: [(PType, usize); N],
        inputs: &[&Data],
        scalars: &[i64],
    ) -> [Data; N] {
        let cpu = BackendRef::cpu();
        cpu.call(
            kernel,
            outputs.map(|(p, n)| cpu.allocate(p, Length::Known(n)).unwrap()),
            inputs,
            scalars,
        )
        .unwrap()
        .map(|d| d.freeze())
    }

    #[test]
    fn preparenext_groups_by_parent_then_position() {
        // Two parents: lists [a b c] [d] belong to 0, [e f] to 1.
        let offsets = Data::from(buffer![0i64, 3, 4, 6]);
        let parents = Data::from(buffer![0i64, 0, 1]);
        let starts = Data::from(buffer![0i64, 2]);
        let shifts = Data::from(buffer![0i64, 0, 0]);
        let [carry, nextparents, nextshifts] = run(
            "ListOffsetArray_reduce_nonlocal_preparenext",
            [(PType::I64, 6), (PType::I64, 6), (PType::I64, 6)],
            &[&offsets, &parents, &starts, &shifts],
            &[3],
        );
        assert_eq!(carry.as_slice::<i64>().unwrap(), &[0, 3, 1, 2, 4, 5]);
        assert_eq!(nextparents.as_slice::<i64>().unwrap(), &[0, 0, 1, 2, 3, 4]);
        assert_eq!(nextshifts.as_slice::<i64>().unwrap(), &[0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn sums_widen_by_signedness() {
        let data = Data::from(buffer![250u8, 10, 1]);
        let parents = Data::from(buffer![0i64, 0, 1]);
        let [out] = run("reduce_sum", [(PType::U64, 2)], &[&data, &parents], &[]);
        assert_eq!(out.as_slice::<u64>().unwrap(), &[260, 1]);
    }

    #[test]
    fn argmax_takes_first_extreme() {
        let data = Data::from(buffer![3.0f64, 7.0, 7.0, 1.0]);
        let parents = Data::from(buffer![0i64, 0, 0, 2]);
        let [out] = run("reduce_argmax", [(PType::I64, 3)], &[&data, &parents], &[]);
        assert_eq!(out.as_slice::<i64>().unwrap(), &[1, -1, 3]);
    }
}
