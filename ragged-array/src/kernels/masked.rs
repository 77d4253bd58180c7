//! Byte- and bit-masked option layouts.

use crate::data::{Data, DataMut};
use crate::kernels::{KernelResult, as_i64, input, output, outputs, scalar, scalar_usize};

#[inline]
fn valid(byte: i8, valid_when: bool) -> bool {
    (byte != 0) == valid_when
}

/// `index[i] = i` where valid, `-1` otherwise.
fn to_indexed_option(outs: &mut [DataMut], inputs: &[&Data], scalars: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let mask = input::<i8>(inputs, 0)?;
    let valid_when = scalar(scalars, 0)? != 0;
    for (i, (o, &m)) in out.iter_mut().zip(mask).enumerate() {
        *o = if valid(m, valid_when) { as_i64(i) } else { -1 };
    }
    Ok(())
}

register_kernel!(
    "ByteMaskedArray_toIndexedOptionArray",
    to_indexed_option,
    [i64, i8]
);

fn numnull(outs: &mut [DataMut], inputs: &[&Data], scalars: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let mask = input::<i8>(inputs, 0)?;
    let valid_when = scalar(scalars, 0)? != 0;
    let count = mask.iter().filter(|&&m| !valid(m, valid_when)).count();
    if let Some(o) = output::<i64>(out)?.first_mut() {
        *o = as_i64(count);
    }
    Ok(())
}

register_kernel!("ByteMaskedArray_numnull", numnull, [i64, i8]);

/// Positions of the valid elements.
fn getitem_nextcarry(outs: &mut [DataMut], inputs: &[&Data], scalars: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let mask = input::<i8>(inputs, 0)?;
    let valid_when = scalar(scalars, 0)? != 0;
    let mut k = 0;
    for (i, &m) in mask.iter().enumerate() {
        if valid(m, valid_when) {
            *out.get_mut(k)
                .ok_or_else(|| kernel_err!(@ i, "carry buffer too short"))? = as_i64(i);
            k += 1;
        }
    }
    Ok(())
}

register_kernel!("ByteMaskedArray_getitem_nextcarry", getitem_nextcarry, [i64, i8]);

/// Combine a caller mask (`1` for missing) with this layer's own mask. The result uses
/// `1` for missing.
fn overlay_mask(outs: &mut [DataMut], inputs: &[&Data], scalars: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i8>(out)?;
    let theirs = input::<i8>(inputs, 0)?;
    let mine = input::<i8>(inputs, 1)?;
    let valid_when = scalar(scalars, 0)? != 0;
    for (i, o) in out.iter_mut().enumerate() {
        let their = theirs
            .get(i)
            .ok_or_else(|| kernel_err!(@ i, "mask lengths differ"))?;
        let my = mine
            .get(i)
            .ok_or_else(|| kernel_err!(@ i, "mask lengths differ"))?;
        *o = i8::from(*their != 0 || !valid(*my, valid_when));
    }
    Ok(())
}

register_kernel!("ByteMaskedArray_overlay_mask", overlay_mask, [i8, i8, i8]);

/// Unpack one bit per element into one byte per element, keeping the bit polarity.
fn bits_to_bytes(outs: &mut [DataMut], inputs: &[&Data], scalars: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i8>(out)?;
    let bits = input::<u8>(inputs, 0)?;
    let lsb_order = scalar(scalars, 0)? != 0;
    let length = scalar_usize(scalars, 1)?;
    if bits.len() * 8 < length {
        return Err(kernel_err!(
            "{} mask bytes cannot describe {} elements",
            bits.len(),
            length
        ));
    }
    for (i, o) in out.iter_mut().enumerate().take(length) {
        let byte = bits[i / 8];
        let shift = if lsb_order { i % 8 } else { 7 - i % 8 };
        *o = ((byte >> shift) & 1) as i8;
    }
    Ok(())
}

register_kernel!("BitMaskedArray_to_ByteMaskedArray", bits_to_bytes, [i8, u8]);

#[cfg(test)]
mod test {
    use ragged_buffer::buffer;
    use ragged_dtype::PType;

    use crate::backend::{BackendRef, Length};
    use crate::data::Data;

    #[test]
    fn bit_order_is_respected() {
        let cpu = BackendRef::cpu();
        let bits = Data::from(buffer![0b0000_0101u8]);
        let unpack = |lsb| {
            let [out] = cpu
                .call(
                    "BitMaskedArray_to_ByteMaskedArray",
                    [cpu.allocate(PType::I8, Length::Known(4)).unwrap()],
                    &[&bits],
                    &[lsb, 4],
                )
                .unwrap();
            out.freeze().as_slice::<i8>().unwrap().to_vec()
        };
        assert_eq!(unpack(1), vec![1, 0, 1, 0]);
        assert_eq!(unpack(0), vec![0, 0, 0, 0]);
    }

    #[test]
    fn valid_when_false_marks_set_bytes_missing() {
        let cpu = BackendRef::cpu();
        let mask = Data::from(buffer![0i8, 0, 1, 1, 0]);
        let [out] = cpu
            .call(
                "ByteMaskedArray_toIndexedOptionArray",
                [cpu.allocate(PType::I64, Length::Known(5)).unwrap()],
                &[&mask],
                &[0],
            )
            .unwrap();
        assert_eq!(
            out.freeze().as_slice::<i64>().unwrap(),
            &[0, 1, -1, -1, 4]
        );
    }
}
