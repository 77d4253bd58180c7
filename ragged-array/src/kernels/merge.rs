//! Concatenation. Each kernel writes one input into its window of an output buffer that is
//! threaded through the calls for every input in turn.

use ragged_dtype::NativePType;

use crate::data::{Data, DataMut, Primitive};
use crate::kernels::{
    IndexPrimitive, KernelResult, as_i64, input, output, outputs, scalar, scalar_usize,
};

/// Copy `from` into `to[offset..]`, casting through `f64` if either side is floating point
/// and through `i64` otherwise.
fn fill<To: Primitive, From: Primitive>(
    outs: &mut [DataMut],
    inputs: &[&Data],
    scalars: &[i64],
) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<To>(out)?;
    let from = input::<From>(inputs, 0)?;
    let offset = scalar_usize(scalars, 0)?;
    let window = out
        .get_mut(offset..offset + from.len())
        .ok_or_else(|| kernel_err!("window {}..{} out of range", offset, offset + from.len()))?;
    let floating = To::PTYPE.is_float() || From::PTYPE.is_float();
    for (o, &f) in window.iter_mut().zip(from) {
        *o = if floating {
            To::from_f64(f.to_f64())
        } else {
            To::from_i64(f.to_i64())
        };
    }
    Ok(())
}

macro_rules! register_fill {
    ($($To:ty),+) => {
        $(
            register_kernel_each!(
                "NumpyArray_fill",
                fill::<$To, T>,
                [bool, i8, u8, i16, u16, i32, u32, i64, u64, f32, f64],
                [$To, T]
            );
        )+
    };
}

register_fill!(bool, i8, u8, i16, u16, i32, u32, i64, u64, f32, f64);

/// Shift an index into the combined content: `out[outoffset + i] = index[i] + base`,
/// missing stays `-1`. scalars: `[outoffset, base]`.
fn indexed_fill<T: IndexPrimitive>(
    outs: &mut [DataMut],
    inputs: &[&Data],
    scalars: &[i64],
) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let index = input::<T>(inputs, 0)?;
    let outoffset = scalar_usize(scalars, 0)?;
    let base = scalar(scalars, 1)?;
    for (i, &j) in index.iter().enumerate() {
        let j = j.to_i64();
        *out.get_mut(outoffset + i)
            .ok_or_else(|| kernel_err!(@ i, "index buffer too short"))? =
            if j < 0 { -1 } else { j + base };
    }
    Ok(())
}

register_kernel_each!(
    "IndexedArray_fill",
    indexed_fill::<T>,
    [i8, u8, i32, u32, i64],
    [i64, T]
);

/// `out[outoffset + i] = base + i` for `i < length`. scalars: `[outoffset, length, base]`.
fn indexed_fill_count(outs: &mut [DataMut], _: &[&Data], scalars: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let outoffset = scalar_usize(scalars, 0)?;
    let length = scalar_usize(scalars, 1)?;
    let base = scalar(scalars, 2)?;
    let window = out
        .get_mut(outoffset..outoffset + length)
        .ok_or_else(|| kernel_err!("index buffer too short"))?;
    for (i, o) in window.iter_mut().enumerate() {
        *o = base + as_i64(i);
    }
    Ok(())
}

register_kernel!("IndexedArray_fill_count", indexed_fill_count, [i64]);

/// Shift starts and stops into the combined content. scalars: `[outoffset, base]`.
fn list_fill<T: IndexPrimitive>(
    outs: &mut [DataMut],
    inputs: &[&Data],
    scalars: &[i64],
) -> KernelResult {
    let [tostarts, tostops] = outputs::<2>(outs)?;
    let tostarts = output::<i64>(tostarts)?;
    let tostops = output::<i64>(tostops)?;
    let starts = input::<T>(inputs, 0)?;
    let stops = input::<T>(inputs, 1)?;
    let outoffset = scalar_usize(scalars, 0)?;
    let base = scalar(scalars, 1)?;
    for (i, (&s, &t)) in starts.iter().zip(stops).enumerate() {
        let k = outoffset + i;
        if k >= tostarts.len() || k >= tostops.len() {
            return Err(kernel_err!(@ i, "starts buffer too short"));
        }
        tostarts[k] = s.to_i64() + base;
        tostops[k] = t.to_i64() + base;
    }
    Ok(())
}

register_kernel_each!(
    "ListArray_fill",
    list_fill::<T>,
    [i32, u32, i64],
    [i64, i64, T, T]
);

/// Copy tags, renumbered past the contents already placed. scalars: `[outoffset, base]`.
fn union_filltags(outs: &mut [DataMut], inputs: &[&Data], scalars: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i8>(out)?;
    let tags = input::<i8>(inputs, 0)?;
    let outoffset = scalar_usize(scalars, 0)?;
    let base = scalar(scalars, 1)?;
    for (i, &t) in tags.iter().enumerate() {
        let tag = i8::try_from(i64::from(t) + base)
            .map_err(|_| kernel_err!(@ i, "too many union contents"))?;
        *out.get_mut(outoffset + i)
            .ok_or_else(|| kernel_err!(@ i, "tags buffer too short"))? = tag;
    }
    Ok(())
}

register_kernel!("UnionArray_filltags", union_filltags, [i8, i8]);

/// scalars: `[outoffset]`.
fn union_fillindex<T: IndexPrimitive>(
    outs: &mut [DataMut],
    inputs: &[&Data],
    scalars: &[i64],
) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let index = input::<T>(inputs, 0)?;
    let outoffset = scalar_usize(scalars, 0)?;
    for (i, &j) in index.iter().enumerate() {
        *out.get_mut(outoffset + i)
            .ok_or_else(|| kernel_err!(@ i, "index buffer too short"))? = j.to_i64();
    }
    Ok(())
}

register_kernel_each!(
    "UnionArray_fillindex",
    union_fillindex::<T>,
    [i32, u32, i64],
    [i64, T]
);

/// scalars: `[outoffset, length, tag]`.
fn union_filltags_const(outs: &mut [DataMut], _: &[&Data], scalars: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i8>(out)?;
    let outoffset = scalar_usize(scalars, 0)?;
    let length = scalar_usize(scalars, 1)?;
    let tag = i8::try_from(scalar(scalars, 2)?)
        .map_err(|_| kernel_err!("too many union contents"))?;
    out.get_mut(outoffset..outoffset + length)
        .ok_or_else(|| kernel_err!("tags buffer too short"))?
        .fill(tag);
    Ok(())
}

register_kernel!("UnionArray_filltags_const", union_filltags_const, [i8]);

/// scalars: `[outoffset, length]`.
fn union_fillindex_count(outs: &mut [DataMut], _: &[&Data], scalars: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let outoffset = scalar_usize(scalars, 0)?;
    let length = scalar_usize(scalars, 1)?;
    let window = out
        .get_mut(outoffset..outoffset + length)
        .ok_or_else(|| kernel_err!("index buffer too short"))?;
    for (i, o) in window.iter_mut().enumerate() {
        *o = as_i64(i);
    }
    Ok(())
}

register_kernel!("UnionArray_fillindex_count", union_fillindex_count, [i64]);

#[cfg(test)]
mod test {
    use ragged_buffer::buffer;
    use ragged_dtype::PType;

    use crate::backend::{BackendRef, Length};
    use crate::data::Data;

    #[test]
    fn fill_casts_into_the_promoted_type() {
        let cpu = BackendRef::cpu();
        let ints = Data::from(buffer![1i32, 2]);
        let floats = Data::from(buffer![0.5f32]);
        let out = cpu.allocate(PType::F64, Length::Known(3)).unwrap();
        let [out] = cpu.call("NumpyArray_fill", [out], &[&ints], &[0]).unwrap();
        let [out] = cpu.call("NumpyArray_fill", [out], &[&floats], &[2]).unwrap();
        assert_eq!(out.freeze().as_slice::<f64>().unwrap(), &[1.0, 2.0, 0.5]);
    }

    #[test]
    fn fill_rejects_overflowing_windows() {
        let cpu = BackendRef::cpu();
        let ints = Data::from(buffer![1i64, 2]);
        let out = cpu.allocate(PType::I64, Length::Known(2)).unwrap();
        assert!(cpu.call("NumpyArray_fill", [out], &[&ints], &[1]).is_err());
    }
}
