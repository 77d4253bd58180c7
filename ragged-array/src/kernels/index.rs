use ragged_dtype::NativePType;

use crate::data::{Data, DataMut, Primitive};
use crate::kernels::{
    IndexPrimitive, KernelResult, as_i64, input, output, outputs, position, scalar,
    scalar_usize,
};

fn to_index64<T: IndexPrimitive>(
    outs: &mut [DataMut],
    inputs: &[&Data],
    _: &[i64],
) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let from = input::<T>(inputs, 0)?;
    out.iter_mut()
        .zip(from)
        .for_each(|(o, f)| *o = f.to_i64());
    Ok(())
}

register_kernel_each!(
    "Index_to_Index64",
    to_index64::<T>,
    [i8, u8, i32, u32, i64],
    [i64, T]
);

fn iota(outs: &mut [DataMut], _: &[&Data], _: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    output::<i64>(out)?
        .iter_mut()
        .enumerate()
        .for_each(|(i, o)| *o = as_i64(i));
    Ok(())
}

register_kernel!("Index_iota", iota, [i64]);

/// `out[i] = values[carry[i]]`.
fn carry<T: Primitive>(outs: &mut [DataMut], inputs: &[&Data], _: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<T>(out)?;
    let index = input::<T>(inputs, 0)?;
    let carry = input::<i64>(inputs, 1)?;
    for (i, (o, &c)) in out.iter_mut().zip(carry).enumerate() {
        let c = position(c, i)?;
        *o = *index
            .get(c)
            .ok_or_else(|| out_of_range!(i))?;
    }
    Ok(())
}

register_kernel_each!(
    "Index_carry",
    carry::<T>,
    [i8, u8, i32, u32, i64],
    [T, T, i64]
);

register_kernel_each!(
    "NumpyArray_carry",
    carry::<T>,
    [bool, i8, u8, i16, u16, i32, u32, i64, u64, f32, f64],
    [T, T, i64]
);

fn validate_carry(_: &mut [DataMut], inputs: &[&Data], scalars: &[i64]) -> KernelResult {
    let carry = input::<i64>(inputs, 0)?;
    let length = scalar(scalars, 0)?;
    for (i, &c) in carry.iter().enumerate() {
        if c < 0 || c >= length {
            return Err(out_of_range!(i));
        }
    }
    Ok(())
}

register_kernel!("Index_validate_carry", validate_carry, [i64]);

/// `out[i] = i` for `i < length`, missing beyond.
fn rpad_and_clip_axis0(outs: &mut [DataMut], _: &[&Data], scalars: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let length = scalar_usize(scalars, 0)?;
    output::<i64>(out)?
        .iter_mut()
        .enumerate()
        .for_each(|(i, o)| *o = if i < length { as_i64(i) } else { -1 });
    Ok(())
}

register_kernel!("Index_rpad_and_clip_axis0", rpad_and_clip_axis0, [i64]);

fn nonzero_length<T: Primitive>(
    outs: &mut [DataMut],
    inputs: &[&Data],
    _: &[i64],
) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let values = input::<T>(inputs, 0)?;
    let count = values.iter().filter(|v| v.is_nonzero()).count();
    if let Some(o) = output::<i64>(out)?.first_mut() {
        *o = as_i64(count);
    }
    Ok(())
}

fn nonzero<T: Primitive>(
    outs: &mut [DataMut],
    inputs: &[&Data],
    _: &[i64],
) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let values = input::<T>(inputs, 0)?;
    let positions = values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_nonzero())
        .map(|(i, _)| as_i64(i));
    for (o, p) in out.iter_mut().zip(positions) {
        *o = p;
    }
    Ok(())
}

register_kernel!("NumpyArray_nonzero_length", nonzero_length::<bool>, [i64, bool]);
register_kernel!("NumpyArray_nonzero", nonzero::<bool>, [i64, bool]);
