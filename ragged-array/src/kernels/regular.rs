//! Fixed-size lists. A regular array of `len` lists of `size` elements needs no index
//! buffers, so most of these kernels only take scalars.

use crate::data::{Data, DataMut};
use crate::kernels::{
    KernelError, KernelResult, as_i64, at, input, output, outputs, position, scalar,
    scalar_usize, slice_indices, slice_scalars,
};

fn regularize(at: i64, size: i64, id: usize) -> Result<i64, KernelError> {
    let regular = if at < 0 { at + size } else { at };
    if regular < 0 || regular >= size {
        return Err(out_of_range!(id));
    }
    Ok(regular)
}

/// scalars: `[at, len, size]`.
fn getitem_next_at(outs: &mut [DataMut], _: &[&Data], scalars: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let at = scalar(scalars, 0)?;
    let len = scalar_usize(scalars, 1)?;
    let size = scalar(scalars, 2)?;
    let regular = regularize(at, size, 0)?;
    for (i, o) in out.iter_mut().enumerate().take(len) {
        *o = as_i64(i) * size + regular;
    }
    Ok(())
}

register_kernel!("RegularArray_getitem_next_at", getitem_next_at, [i64]);

/// scalars: the five slice scalars, then `[len, size]`.
fn getitem_next_range(outs: &mut [DataMut], _: &[&Data], scalars: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let (start, stop, step) = slice_scalars(scalars)?;
    let len = scalar_usize(scalars, 5)?;
    let size = scalar(scalars, 6)?;
    let (first, _, count) = slice_indices(start, stop, step, size);
    for i in 0..len {
        for j in 0..count {
            out[i * count + j] = as_i64(i) * size + first + as_i64(j) * step;
        }
    }
    Ok(())
}

register_kernel!("RegularArray_getitem_next_range", getitem_next_range, [i64]);

/// Repeat `advanced[i]` for each of the `nextsize` elements of row `i`.
fn getitem_next_range_spreadadvanced(
    outs: &mut [DataMut],
    inputs: &[&Data],
    scalars: &[i64],
) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let advanced = input::<i64>(inputs, 0)?;
    let nextsize = scalar_usize(scalars, 0)?;
    for (i, &a) in advanced.iter().enumerate() {
        for j in 0..nextsize {
            out[i * nextsize + j] = a;
        }
    }
    Ok(())
}

register_kernel!(
    "RegularArray_getitem_next_range_spreadadvanced",
    getitem_next_range_spreadadvanced,
    [i64, i64]
);

/// Resolve negative positions of an advanced index against `size`.
fn getitem_next_array_regularize(
    outs: &mut [DataMut],
    inputs: &[&Data],
    scalars: &[i64],
) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let array = input::<i64>(inputs, 0)?;
    let size = scalar(scalars, 0)?;
    for (i, (o, &a)) in out.iter_mut().zip(array).enumerate() {
        *o = regularize(a, size, i)?;
    }
    Ok(())
}

register_kernel!(
    "RegularArray_getitem_next_array_regularize",
    getitem_next_array_regularize,
    [i64, i64]
);

/// Every row takes every position of the advanced index. scalars: `[len, size]`.
fn getitem_next_array(outs: &mut [DataMut], inputs: &[&Data], scalars: &[i64]) -> KernelResult {
    let [nextcarry, nextadvanced] = outputs::<2>(outs)?;
    let nextcarry = output::<i64>(nextcarry)?;
    let nextadvanced = output::<i64>(nextadvanced)?;
    let flathead = input::<i64>(inputs, 0)?;
    let len = scalar_usize(scalars, 0)?;
    let size = scalar(scalars, 1)?;
    let width = flathead.len();
    for i in 0..len {
        for (j, &h) in flathead.iter().enumerate() {
            nextcarry[i * width + j] = as_i64(i) * size + h;
            nextadvanced[i * width + j] = as_i64(j);
        }
    }
    Ok(())
}

register_kernel!(
    "RegularArray_getitem_next_array",
    getitem_next_array,
    [i64, i64, i64]
);

/// Row `i` takes the position its advanced counter points at. scalars: `[len, size]`.
fn getitem_next_array_advanced(
    outs: &mut [DataMut],
    inputs: &[&Data],
    scalars: &[i64],
) -> KernelResult {
    let [nextcarry, nextadvanced] = outputs::<2>(outs)?;
    let nextcarry = output::<i64>(nextcarry)?;
    let nextadvanced = output::<i64>(nextadvanced)?;
    let advanced = input::<i64>(inputs, 0)?;
    let flathead = input::<i64>(inputs, 1)?;
    let len = scalar_usize(scalars, 0)?;
    let size = scalar(scalars, 1)?;
    for i in 0..len {
        let a = position(at(advanced, i, i)?, i)?;
        nextcarry[i] = as_i64(i) * size + at(flathead, a, i)?;
        nextadvanced[i] = as_i64(i);
    }
    Ok(())
}

register_kernel!(
    "RegularArray_getitem_next_array_advanced",
    getitem_next_array_advanced,
    [i64, i64, i64, i64]
);

/// Content positions of the carried rows. scalars: `[size, len]`.
fn getitem_carry(outs: &mut [DataMut], inputs: &[&Data], scalars: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let carry = input::<i64>(inputs, 0)?;
    let size = scalar_usize(scalars, 0)?;
    let len = scalar(scalars, 1)?;
    for (i, &c) in carry.iter().enumerate() {
        if c < 0 || c >= len {
            return Err(out_of_range!(i));
        }
        for j in 0..size {
            out[i * size + j] = c * as_i64(size) + as_i64(j);
        }
    }
    Ok(())
}

register_kernel!("RegularArray_getitem_carry", getitem_carry, [i64, i64]);

/// Repeat one jagged row for every regular row. scalars: `[len]`.
fn getitem_jagged_expand(outs: &mut [DataMut], inputs: &[&Data], scalars: &[i64]) -> KernelResult {
    let [multistarts, multistops] = outputs::<2>(outs)?;
    let multistarts = output::<i64>(multistarts)?;
    let multistops = output::<i64>(multistops)?;
    let singleoffsets = input::<i64>(inputs, 0)?;
    let len = scalar_usize(scalars, 0)?;
    let width = singleoffsets.len().saturating_sub(1);
    for i in 0..len {
        for (j, w) in singleoffsets.windows(2).enumerate() {
            multistarts[i * width + j] = w[0];
            multistops[i * width + j] = w[1];
        }
    }
    Ok(())
}

register_kernel!(
    "RegularArray_getitem_jagged_expand",
    getitem_jagged_expand,
    [i64, i64, i64]
);

/// scalars: `[len, size]`.
fn localindex(outs: &mut [DataMut], _: &[&Data], scalars: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let len = scalar_usize(scalars, 0)?;
    let size = scalar_usize(scalars, 1)?;
    for i in 0..len {
        for j in 0..size {
            out[i * size + j] = as_i64(j);
        }
    }
    Ok(())
}

register_kernel!("RegularArray_localindex", localindex, [i64]);

/// Positions into the content for rows cut or padded to `target`, `-1` for padding.
/// scalars: `[target, len, size]`.
fn rpad_and_clip_axis1(outs: &mut [DataMut], _: &[&Data], scalars: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let target = scalar_usize(scalars, 0)?;
    let len = scalar_usize(scalars, 1)?;
    let size = scalar_usize(scalars, 2)?;
    for i in 0..len {
        for j in 0..target {
            out[i * target + j] = if j < size { as_i64(i * size + j) } else { -1 };
        }
    }
    Ok(())
}

register_kernel!("RegularArray_rpad_and_clip_axis1", rpad_and_clip_axis1, [i64]);

/// scalars: `[size]`.
fn compact_offsets(outs: &mut [DataMut], _: &[&Data], scalars: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let size = scalar(scalars, 0)?;
    output::<i64>(out)?
        .iter_mut()
        .enumerate()
        .for_each(|(i, o)| *o = as_i64(i) * size);
    Ok(())
}

register_kernel!("RegularArray_compact_offsets", compact_offsets, [i64]);

/// scalars: `[size]`.
fn num(outs: &mut [DataMut], _: &[&Data], scalars: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let size = scalar(scalars, 0)?;
    output::<i64>(out)?.fill(size);
    Ok(())
}

register_kernel!("RegularArray_num", num, [i64]);

#[cfg(test)]
mod test {
    use ragged_buffer::buffer;
    use ragged_dtype::PType;

    use crate::backend::{BackendRef, Length};
    use crate::data::Data;

    #[test]
    fn carry_expands_rows() {
        let cpu = BackendRef::cpu();
        let carry = Data::from(buffer![2i64, 0]);
        let [out] = cpu
            .call(
                "RegularArray_getitem_carry",
                [cpu.allocate(PType::I64, Length::Known(6)).unwrap()],
                &[&carry],
                &[3, 3],
            )
            .unwrap();
        assert_eq!(
            out.freeze().as_slice::<i64>().unwrap(),
            &[6, 7, 8, 0, 1, 2]
        );
    }

    #[test]
    fn strided_range() {
        let cpu = BackendRef::cpu();
        // [::2] over 2 rows of 3
        let [out] = cpu
            .call(
                "RegularArray_getitem_next_range",
                [cpu.allocate(PType::I64, Length::Known(4)).unwrap()],
                &[],
                &[0, 0, 2, 0, 0, 2, 3],
            )
            .unwrap();
        assert_eq!(out.freeze().as_slice::<i64>().unwrap(), &[0, 2, 3, 5]);
    }
}
