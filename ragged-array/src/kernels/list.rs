use ragged_dtype::NativePType;

use crate::data::{Data, DataMut};
use crate::kernels::{
    IndexPrimitive, KernelError, KernelResult, as_i64, at, input, output, outputs, position,
    scalar, scalar_usize, slice_indices, slice_scalars,
};

fn rows<'a, T: IndexPrimitive>(
    inputs: &[&'a Data],
    first: usize,
) -> Result<(&'a [T], &'a [T]), KernelError> {
    let starts = input::<T>(inputs, first)?;
    let stops = input::<T>(inputs, first + 1)?;
    if stops.len() < starts.len() {
        return Err(kernel_err!("len(stops) < len(starts)"));
    }
    Ok((starts, stops))
}

#[inline]
fn bounds<T: NativePType>(starts: &[T], stops: &[T], i: usize) -> Result<(i64, i64), KernelError> {
    let start = starts[i].to_i64();
    let stop = stops[i].to_i64();
    if stop < start {
        return Err(kernel_err!(@ i, "stops[i] < starts[i]"));
    }
    Ok((start, stop))
}

#[inline]
fn regularize(at: i64, length: i64, id: usize) -> Result<i64, KernelError> {
    let regular = if at < 0 { at + length } else { at };
    if regular < 0 || regular >= length {
        return Err(out_of_range!(id));
    }
    Ok(regular)
}

fn getitem_next_at<T: IndexPrimitive>(
    outs: &mut [DataMut],
    inputs: &[&Data],
    scalars: &[i64],
) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let (starts, stops) = rows::<T>(inputs, 0)?;
    let at = scalar(scalars, 0)?;
    for (i, o) in out.iter_mut().enumerate().take(starts.len()) {
        let (start, stop) = bounds(starts, stops, i)?;
        *o = start + regularize(at, stop - start, i)?;
    }
    Ok(())
}

register_kernel_each!(
    "ListArray_getitem_next_at",
    getitem_next_at::<T>,
    [i32, u32, i64],
    [i64, T, T]
);

fn getitem_next_range_carrylength<T: IndexPrimitive>(
    outs: &mut [DataMut],
    inputs: &[&Data],
    scalars: &[i64],
) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let (starts, stops) = rows::<T>(inputs, 0)?;
    let (start, stop, step) = slice_scalars(scalars)?;
    let mut total = 0;
    for i in 0..starts.len() {
        let (s, t) = bounds(starts, stops, i)?;
        total += slice_indices(start, stop, step, t - s).2;
    }
    if let Some(o) = output::<i64>(out)?.first_mut() {
        *o = as_i64(total);
    }
    Ok(())
}

register_kernel_each!(
    "ListArray_getitem_next_range_carrylength",
    getitem_next_range_carrylength::<T>,
    [i32, u32, i64],
    [i64, T, T]
);

fn getitem_next_range<T: IndexPrimitive>(
    outs: &mut [DataMut],
    inputs: &[&Data],
    scalars: &[i64],
) -> KernelResult {
    let [nextoffsets, nextcarry] = outputs::<2>(outs)?;
    let nextoffsets = output::<i64>(nextoffsets)?;
    let nextcarry = output::<i64>(nextcarry)?;
    let (starts, stops) = rows::<T>(inputs, 0)?;
    let (start, stop, step) = slice_scalars(scalars)?;
    let mut k = 0;
    if let Some(o) = nextoffsets.first_mut() {
        *o = 0;
    }
    for i in 0..starts.len() {
        let (s, t) = bounds(starts, stops, i)?;
        let (first, _, count) = slice_indices(start, stop, step, t - s);
        for j in 0..count {
            *nextcarry
                .get_mut(k)
                .ok_or_else(|| kernel_err!(@ i, "carry buffer too short"))? =
                s + first + as_i64(j) * step;
            k += 1;
        }
        *nextoffsets
            .get_mut(i + 1)
            .ok_or_else(|| kernel_err!(@ i, "offsets buffer too short"))? = as_i64(k);
    }
    Ok(())
}

register_kernel_each!(
    "ListArray_getitem_next_range",
    getitem_next_range::<T>,
    [i32, u32, i64],
    [i64, i64, T, T]
);

/// Repeat `advanced[i]` once per element of the `i`-th sliced list.
fn getitem_next_range_spreadadvanced(
    outs: &mut [DataMut],
    inputs: &[&Data],
    _: &[i64],
) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let advanced = input::<i64>(inputs, 0)?;
    let offsets = input::<i64>(inputs, 1)?;
    for (i, w) in offsets.windows(2).enumerate() {
        for k in w[0]..w[1] {
            let slot = position(k, i)?;
            *out.get_mut(slot)
                .ok_or_else(|| kernel_err!(@ i, "offsets exceed output"))? = at(advanced, i, i)?;
        }
    }
    Ok(())
}

register_kernel!(
    "ListArray_getitem_next_range_spreadadvanced",
    getitem_next_range_spreadadvanced,
    [i64, i64, i64]
);

fn getitem_next_array<T: IndexPrimitive>(
    outs: &mut [DataMut],
    inputs: &[&Data],
    scalars: &[i64],
) -> KernelResult {
    let [nextcarry, nextadvanced] = outputs::<2>(outs)?;
    let nextcarry = output::<i64>(nextcarry)?;
    let nextadvanced = output::<i64>(nextadvanced)?;
    let (starts, stops) = rows::<T>(inputs, 0)?;
    let flathead = input::<i64>(inputs, 2)?;
    let lencontent = scalar(scalars, 0)?;
    let width = flathead.len();
    for i in 0..starts.len() {
        let (s, t) = bounds(starts, stops, i)?;
        if t > lencontent {
            return Err(kernel_err!(@ i, "stops[i] > len(content)"));
        }
        for (j, &h) in flathead.iter().enumerate() {
            let k = i * width + j;
            nextcarry[k] = s + regularize(h, t - s, i)?;
            nextadvanced[k] = as_i64(j);
        }
    }
    Ok(())
}

register_kernel_each!(
    "ListArray_getitem_next_array",
    getitem_next_array::<T>,
    [i32, u32, i64],
    [i64, i64, T, T, i64]
);

fn getitem_next_array_advanced<T: IndexPrimitive>(
    outs: &mut [DataMut],
    inputs: &[&Data],
    scalars: &[i64],
) -> KernelResult {
    let [nextcarry, nextadvanced] = outputs::<2>(outs)?;
    let nextcarry = output::<i64>(nextcarry)?;
    let nextadvanced = output::<i64>(nextadvanced)?;
    let (starts, stops) = rows::<T>(inputs, 0)?;
    let flathead = input::<i64>(inputs, 2)?;
    let advanced = input::<i64>(inputs, 3)?;
    let lencontent = scalar(scalars, 0)?;
    for i in 0..starts.len() {
        let (s, t) = bounds(starts, stops, i)?;
        if t > lencontent {
            return Err(kernel_err!(@ i, "stops[i] > len(content)"));
        }
        let a = position(at(advanced, i, i)?, i)?;
        nextcarry[i] = s + regularize(at(flathead, a, i)?, t - s, i)?;
        nextadvanced[i] = as_i64(i);
    }
    Ok(())
}

register_kernel_each!(
    "ListArray_getitem_next_array_advanced",
    getitem_next_array_advanced::<T>,
    [i32, u32, i64],
    [i64, i64, T, T, i64, i64]
);

fn getitem_carry<T: IndexPrimitive>(
    outs: &mut [DataMut],
    inputs: &[&Data],
    _: &[i64],
) -> KernelResult {
    let [tostarts, tostops] = outputs::<2>(outs)?;
    let tostarts = output::<T>(tostarts)?;
    let tostops = output::<T>(tostops)?;
    let (starts, stops) = rows::<T>(inputs, 0)?;
    let carry = input::<i64>(inputs, 2)?;
    for (i, &c) in carry.iter().enumerate() {
        let c = position(c, i)?;
        if c >= starts.len() {
            return Err(out_of_range!(i));
        }
        tostarts[i] = starts[c];
        tostops[i] = stops[c];
    }
    Ok(())
}

register_kernel_each!(
    "ListArray_getitem_carry",
    getitem_carry::<T>,
    [i32, u32, i64],
    [T, T, T, T, i64]
);

fn jagged_carrylen(outs: &mut [DataMut], inputs: &[&Data], _: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let slicestarts = input::<i64>(inputs, 0)?;
    let slicestops = input::<i64>(inputs, 1)?;
    let total: i64 = slicestarts
        .iter()
        .zip(slicestops)
        .map(|(s, t)| (t - s).max(0))
        .sum();
    if let Some(o) = output::<i64>(out)?.first_mut() {
        *o = total;
    }
    Ok(())
}

register_kernel!("ListArray_getitem_jagged_carrylen", jagged_carrylen, [i64, i64, i64]);

/// The number of true flags inside the lists of a boolean jagged slice.
fn jagged_numtrue(outs: &mut [DataMut], inputs: &[&Data], _: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let offsets = input::<i64>(inputs, 0)?;
    let flags = input::<bool>(inputs, 1)?;
    let mut count = 0;
    for (i, w) in offsets.windows(2).enumerate() {
        for p in w[0]..w[1] {
            if at(flags, position(p, i)?, i)? {
                count += 1;
            }
        }
    }
    if let Some(o) = output::<i64>(out)?.first_mut() {
        *o = count;
    }
    Ok(())
}

register_kernel!("ListArray_getitem_jagged_numtrue", jagged_numtrue, [i64, i64, bool]);

/// Turn a boolean jagged slice into integer rows: the positions of the true flags, counted
/// from the start of their own list.
fn jagged_localtrue(outs: &mut [DataMut], inputs: &[&Data], _: &[i64]) -> KernelResult {
    let [tooffsets, tolocal] = outputs::<2>(outs)?;
    let tooffsets = output::<i64>(tooffsets)?;
    let tolocal = output::<i64>(tolocal)?;
    let offsets = input::<i64>(inputs, 0)?;
    let flags = input::<bool>(inputs, 1)?;
    let mut k = 0;
    if let Some(o) = tooffsets.first_mut() {
        *o = 0;
    }
    for (i, w) in offsets.windows(2).enumerate() {
        for p in w[0]..w[1] {
            if at(flags, position(p, i)?, i)? {
                *tolocal
                    .get_mut(k)
                    .ok_or_else(|| kernel_err!(@ i, "positions buffer too short"))? = p - w[0];
                k += 1;
            }
        }
        *tooffsets
            .get_mut(i + 1)
            .ok_or_else(|| kernel_err!(@ i, "offsets exceed output"))? = as_i64(k);
    }
    Ok(())
}

register_kernel!(
    "ListArray_getitem_jagged_localtrue",
    jagged_localtrue,
    [i64, i64, i64, bool]
);

/// Select, within each list, the positions listed by the matching jagged slice row.
fn jagged_apply<T: IndexPrimitive>(
    outs: &mut [DataMut],
    inputs: &[&Data],
    scalars: &[i64],
) -> KernelResult {
    let [tooffsets, tocarry] = outputs::<2>(outs)?;
    let tooffsets = output::<i64>(tooffsets)?;
    let tocarry = output::<i64>(tocarry)?;
    let slicestarts = input::<i64>(inputs, 0)?;
    let slicestops = input::<i64>(inputs, 1)?;
    let sliceindex = input::<i64>(inputs, 2)?;
    let (starts, stops) = rows::<T>(inputs, 3)?;
    let contentlen = scalar(scalars, 0)?;
    if slicestarts.len() != starts.len() {
        return Err(kernel_err!(
            "jagged slice length {} differs from array length {}",
            slicestarts.len(),
            starts.len()
        ));
    }
    let mut k = 0;
    if let Some(o) = tooffsets.first_mut() {
        *o = 0;
    }
    for i in 0..starts.len() {
        let (s, t) = bounds(starts, stops, i)?;
        if t > contentlen {
            return Err(kernel_err!(@ i, "stops[i] > len(content)"));
        }
        for j in slicestarts[i]..at(slicestops, i, i)? {
            let index = at(sliceindex, position(j, i)?, i)?;
            tocarry[k] = s + regularize(index, t - s, i)?;
            k += 1;
        }
        tooffsets[i + 1] = as_i64(k);
    }
    Ok(())
}

register_kernel_each!(
    "ListArray_getitem_jagged_apply",
    jagged_apply::<T>,
    [i32, u32, i64],
    [i64, i64, i64, i64, i64, T, T]
);

/// Offsets of a doubly jagged slice, checking that every slice row has as many sublists as
/// the list it applies to.
fn jagged_descend<T: IndexPrimitive>(
    outs: &mut [DataMut],
    inputs: &[&Data],
    _: &[i64],
) -> KernelResult {
    let [tooffsets] = outputs::<1>(outs)?;
    let tooffsets = output::<i64>(tooffsets)?;
    let slicestarts = input::<i64>(inputs, 0)?;
    let slicestops = input::<i64>(inputs, 1)?;
    let (starts, stops) = rows::<T>(inputs, 2)?;
    if slicestarts.len() != starts.len() {
        return Err(kernel_err!(
            "jagged slice length {} differs from array length {}",
            slicestarts.len(),
            starts.len()
        ));
    }
    if let Some(o) = tooffsets.first_mut() {
        *o = 0;
    }
    for i in 0..starts.len() {
        let (s, t) = bounds(starts, stops, i)?;
        let slicecount = at(slicestops, i, i)? - slicestarts[i];
        if slicecount != t - s {
            return Err(kernel_err!(
                @ i,
                "jagged slice inner length differs from array inner length"
            ));
        }
        tooffsets[i + 1] = tooffsets[i] + slicecount;
    }
    Ok(())
}

register_kernel_each!(
    "ListArray_getitem_jagged_descend",
    jagged_descend::<T>,
    [i32, u32, i64],
    [i64, i64, i64, T, T]
);

/// Broadcast one jagged slice row over every list, which must all have as many items as the
/// slice has rows. scalars: `[jaggedsize]`.
fn jagged_expand<T: IndexPrimitive>(
    outs: &mut [DataMut],
    inputs: &[&Data],
    scalars: &[i64],
) -> KernelResult {
    let [multistarts, multistops, nextcarry] = outputs::<3>(outs)?;
    let multistarts = output::<i64>(multistarts)?;
    let multistops = output::<i64>(multistops)?;
    let nextcarry = output::<i64>(nextcarry)?;
    let singleoffsets = input::<i64>(inputs, 0)?;
    let (starts, stops) = rows::<T>(inputs, 1)?;
    let jaggedsize = scalar_usize(scalars, 0)?;
    if singleoffsets.len() != jaggedsize + 1 {
        return Err(kernel_err!("jagged slice offsets do not match its length"));
    }
    for i in 0..starts.len() {
        let (s, t) = bounds(starts, stops, i)?;
        if t - s != as_i64(jaggedsize) {
            return Err(kernel_err!(@ i, "cannot fit jagged slice into nested list"));
        }
        for (j, w) in singleoffsets.windows(2).enumerate() {
            let k = i * jaggedsize + j;
            multistarts[k] = w[0];
            multistops[k] = w[1];
            nextcarry[k] = s + as_i64(j);
        }
    }
    Ok(())
}

register_kernel_each!(
    "ListArray_getitem_jagged_expand",
    jagged_expand::<T>,
    [i32, u32, i64],
    [i64, i64, i64, i64, T, T]
);

fn localindex(outs: &mut [DataMut], inputs: &[&Data], _: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let offsets = input::<i64>(inputs, 0)?;
    let base = offsets.first().copied().unwrap_or(0);
    for (i, w) in offsets.windows(2).enumerate() {
        for k in w[0]..w[1] {
            let slot = position(k - base, i)?;
            *out.get_mut(slot)
                .ok_or_else(|| kernel_err!(@ i, "offsets exceed output"))? = k - w[0];
        }
    }
    Ok(())
}

register_kernel!("ListArray_localindex", localindex, [i64, i64]);

fn rpad_length_axis1(outs: &mut [DataMut], inputs: &[&Data], scalars: &[i64]) -> KernelResult {
    let [tooffsets, tolength] = outputs::<2>(outs)?;
    let tooffsets = output::<i64>(tooffsets)?;
    let offsets = input::<i64>(inputs, 0)?;
    let target = scalar(scalars, 0)?;
    if let Some(o) = tooffsets.first_mut() {
        *o = 0;
    }
    for (i, w) in offsets.windows(2).enumerate() {
        tooffsets[i + 1] = tooffsets[i] + (w[1] - w[0]).max(target);
    }
    let total = tooffsets.last().copied().unwrap_or(0);
    if let Some(o) = output::<i64>(tolength)?.first_mut() {
        *o = total;
    }
    Ok(())
}

register_kernel!(
    "ListOffsetArray_rpad_length_axis1",
    rpad_length_axis1,
    [i64, i64, i64]
);

/// Positions into the content for each padded list, `-1` for padding.
fn rpad_axis1(outs: &mut [DataMut], inputs: &[&Data], scalars: &[i64]) -> KernelResult {
    let [toindex] = outputs::<1>(outs)?;
    let toindex = output::<i64>(toindex)?;
    let offsets = input::<i64>(inputs, 0)?;
    let target = scalar(scalars, 0)?;
    let base = offsets.first().copied().unwrap_or(0);
    let mut k = 0;
    for (i, w) in offsets.windows(2).enumerate() {
        let count = w[1] - w[0];
        for j in 0..count.max(target) {
            *toindex
                .get_mut(k)
                .ok_or_else(|| kernel_err!(@ i, "index buffer too short"))? =
                if j < count { w[0] - base + j } else { -1 };
            k += 1;
        }
    }
    Ok(())
}

register_kernel!("ListOffsetArray_rpad_axis1", rpad_axis1, [i64, i64]);

/// Like `rpad_axis1`, but every list is cut or padded to exactly `target` items.
fn rpad_and_clip_axis1(outs: &mut [DataMut], inputs: &[&Data], scalars: &[i64]) -> KernelResult {
    let [toindex] = outputs::<1>(outs)?;
    let toindex = output::<i64>(toindex)?;
    let offsets = input::<i64>(inputs, 0)?;
    let target = scalar_usize(scalars, 0)?;
    let base = offsets.first().copied().unwrap_or(0);
    for (i, w) in offsets.windows(2).enumerate() {
        let count = w[1] - w[0];
        for j in 0..target {
            toindex[i * target + j] = if as_i64(j) < count {
                w[0] - base + as_i64(j)
            } else {
                -1
            };
        }
    }
    Ok(())
}

register_kernel!(
    "ListOffsetArray_rpad_and_clip_axis1",
    rpad_and_clip_axis1,
    [i64, i64]
);

/// Offsets rebased to start at zero.
fn compact_offsets<T: IndexPrimitive>(
    outs: &mut [DataMut],
    inputs: &[&Data],
    _: &[i64],
) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let offsets = input::<T>(inputs, 0)?;
    let base = offsets.first().map(|o| o.to_i64()).unwrap_or(0);
    for (i, (o, &f)) in out.iter_mut().zip(offsets).enumerate() {
        *o = f.to_i64() - base;
        if i > 0 && offsets[i - 1] > f {
            return Err(kernel_err!(@ i, "offsets must be monotonically increasing"));
        }
    }
    Ok(())
}

register_kernel_each!(
    "ListOffsetArray_compact_offsets",
    compact_offsets::<T>,
    [i32, u32, i64],
    [i64, T]
);

fn list_compact_offsets<T: IndexPrimitive>(
    outs: &mut [DataMut],
    inputs: &[&Data],
    _: &[i64],
) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let (starts, stops) = rows::<T>(inputs, 0)?;
    if let Some(o) = out.first_mut() {
        *o = 0;
    }
    for i in 0..starts.len() {
        let (s, t) = bounds(starts, stops, i)?;
        out[i + 1] = out[i] + t - s;
    }
    Ok(())
}

register_kernel_each!(
    "ListArray_compact_offsets",
    list_compact_offsets::<T>,
    [i32, u32, i64],
    [i64, T, T]
);

/// Every content position reached by the lists, in list order.
fn compact_carry<T: IndexPrimitive>(
    outs: &mut [DataMut],
    inputs: &[&Data],
    _: &[i64],
) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let (starts, stops) = rows::<T>(inputs, 0)?;
    let mut k = 0;
    for i in 0..starts.len() {
        let (s, t) = bounds(starts, stops, i)?;
        for p in s..t {
            *out.get_mut(k)
                .ok_or_else(|| kernel_err!(@ i, "carry buffer too short"))? = p;
            k += 1;
        }
    }
    Ok(())
}

register_kernel_each!(
    "ListArray_compact_carry",
    compact_carry::<T>,
    [i32, u32, i64],
    [i64, T, T]
);

/// `tooffsets[i] = inneroffsets[outeroffsets[i]]`.
fn flatten_offsets(outs: &mut [DataMut], inputs: &[&Data], _: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let outer = input::<i64>(inputs, 0)?;
    let inner = input::<i64>(inputs, 1)?;
    for (i, (o, &p)) in out.iter_mut().zip(outer).enumerate() {
        *o = at(inner, position(p, i)?, i)?;
    }
    Ok(())
}

register_kernel!(
    "ListOffsetArray_flatten_offsets",
    flatten_offsets,
    [i64, i64, i64]
);

fn num<T: IndexPrimitive>(outs: &mut [DataMut], inputs: &[&Data], _: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let (starts, stops) = rows::<T>(inputs, 0)?;
    for (i, o) in out.iter_mut().enumerate().take(starts.len()) {
        let (s, t) = bounds(starts, stops, i)?;
        *o = t - s;
    }
    Ok(())
}

register_kernel_each!("ListArray_num", num::<T>, [i32, u32, i64], [i64, T, T]);

fn validity<T: IndexPrimitive>(_: &mut [DataMut], inputs: &[&Data], scalars: &[i64]) -> KernelResult {
    let (starts, stops) = rows::<T>(inputs, 0)?;
    let lencontent = scalar(scalars, 0)?;
    for i in 0..starts.len() {
        let (s, t) = (starts[i].to_i64(), stops[i].to_i64());
        if s != t && s < 0 {
            return Err(kernel_err!(@ i, "start[i] < 0"));
        }
        if s != t && t > lencontent {
            return Err(kernel_err!(@ i, "stop[i] > len(content)"));
        }
        if s > t {
            return Err(kernel_err!(@ i, "start[i] > stop[i]"));
        }
    }
    Ok(())
}

register_kernel_each!("ListArray_validity", validity::<T>, [i32, u32, i64], [T, T]);

#[cfg(test)]
mod test {
    use ragged_buffer::buffer;
    use ragged_dtype::PType;

    use crate::backend::{BackendRef, Length};
    use crate::data::Data;

    #[test]
    fn range_slices_each_list() {
        let cpu = BackendRef::cpu();
        let starts = Data::from(buffer![0i32, 3, 3]);
        let stops = Data::from(buffer![3i32, 3, 5]);
        // [::-1]
        let scalars = [0, 0, -1, 0, 0];
        let [len] = cpu
            .call(
                "ListArray_getitem_next_range_carrylength",
                [cpu.allocate(PType::I64, Length::Known(1)).unwrap()],
                &[&starts, &stops],
                &scalars,
            )
            .unwrap();
        assert_eq!(len.freeze().as_slice::<i64>().unwrap(), &[5]);
        let [offsets, carry] = cpu
            .call(
                "ListArray_getitem_next_range",
                [
                    cpu.allocate(PType::I64, Length::Known(4)).unwrap(),
                    cpu.allocate(PType::I64, Length::Known(5)).unwrap(),
                ],
                &[&starts, &stops],
                &scalars,
            )
            .unwrap();
        assert_eq!(offsets.freeze().as_slice::<i64>().unwrap(), &[0, 3, 3, 5]);
        assert_eq!(carry.freeze().as_slice::<i64>().unwrap(), &[2, 1, 0, 4, 3]);
    }

    #[test]
    fn out_of_range_at_is_reported_with_the_row() {
        let cpu = BackendRef::cpu();
        let starts = Data::from(buffer![0i64, 2]);
        let stops = Data::from(buffer![2i64, 3]);
        let err = cpu
            .call(
                "ListArray_getitem_next_at",
                [cpu.allocate(PType::I64, Length::Known(2)).unwrap()],
                &[&starts, &stops],
                &[1],
            )
            .unwrap_err();
        assert!(err.is_index_error());
        assert!(err.to_string().contains("in ListArray: index out of range"));
        assert!(err.to_string().contains("at position 1"));
    }
}
