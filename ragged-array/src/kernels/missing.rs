//! Slices that contain missing values.

use crate::data::{Data, DataMut};
use crate::kernels::{KernelResult, as_i64, at, input, output, outputs, scalar, scalar_usize};

/// Repeat an option index once per regular row, shifting present positions by the row's
/// start. scalars: `[repetitions, regularsize]`.
fn missing_repeat(outs: &mut [DataMut], inputs: &[&Data], scalars: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let index = input::<i64>(inputs, 0)?;
    let repetitions = scalar_usize(scalars, 0)?;
    let regularsize = scalar(scalars, 1)?;
    let width = index.len();
    for i in 0..repetitions {
        for (j, &base) in index.iter().enumerate() {
            out[i * width + j] = if base >= 0 {
                base + as_i64(i) * regularsize
            } else {
                base
            };
        }
    }
    Ok(())
}

register_kernel!(
    "Content_getitem_next_missing_repeat",
    missing_repeat,
    [i64, i64]
);

/// Bounds of the jagged rows of an option-of-jagged slice. Missing rows get an empty range
/// and a `-1` in the mask; present rows consume the next jagged row.
fn missing_jagged_getmaskstartstop(
    outs: &mut [DataMut],
    inputs: &[&Data],
    _: &[i64],
) -> KernelResult {
    let [mask, starts, stops] = outputs::<3>(outs)?;
    let mask = output::<i64>(mask)?;
    let starts = output::<i64>(starts)?;
    let stops = output::<i64>(stops)?;
    let index = input::<i64>(inputs, 0)?;
    let offsets = input::<i64>(inputs, 1)?;
    let mut k = 0;
    for (i, &idx) in index.iter().enumerate() {
        starts[i] = at(offsets, k, i)?;
        if idx < 0 {
            mask[i] = -1;
            stops[i] = starts[i];
        } else {
            mask[i] = as_i64(i);
            k += 1;
            stops[i] = at(offsets, k, i)?;
        }
    }
    Ok(())
}

register_kernel!(
    "Content_getitem_next_missing_jagged_getmaskstartstop",
    missing_jagged_getmaskstartstop,
    [i64, i64, i64, i64, i64]
);

/// Keep the jagged slice rows of the present elements of an option layer.
fn jagged_project(outs: &mut [DataMut], inputs: &[&Data], _: &[i64]) -> KernelResult {
    let [tostarts, tostops] = outputs::<2>(outs)?;
    let tostarts = output::<i64>(tostarts)?;
    let tostops = output::<i64>(tostops)?;
    let index = input::<i64>(inputs, 0)?;
    let starts = input::<i64>(inputs, 1)?;
    let stops = input::<i64>(inputs, 2)?;
    let mut k = 0;
    for (i, &idx) in index.iter().enumerate() {
        if idx >= 0 {
            tostarts[k] = at(starts, i, i)?;
            tostops[k] = at(stops, i, i)?;
            k += 1;
        }
    }
    Ok(())
}

register_kernel!(
    "MaskedArray_getitem_next_jagged_project",
    jagged_project,
    [i64, i64, i64, i64, i64]
);

#[cfg(test)]
mod test {
    use ragged_buffer::buffer;
    use ragged_dtype::PType;

    use crate::backend::{BackendRef, Length};
    use crate::data::Data;

    #[test]
    fn repeat_shifts_present_positions_per_row() {
        let cpu = BackendRef::cpu();
        let [out] = cpu
            .run(
                "Content_getitem_next_missing_repeat",
                [(PType::I64, Length::Known(6))],
                &[&Data::from(buffer![0i64, -1, 1])],
                &[2, 2],
            )
            .unwrap();
        assert_eq!(out.as_slice::<i64>().unwrap(), &[0, -1, 1, 2, -1, 3]);
    }

    #[test]
    fn missing_rows_get_empty_ranges() {
        let cpu = BackendRef::cpu();
        let [mask, starts, stops] = cpu
            .run(
                "Content_getitem_next_missing_jagged_getmaskstartstop",
                [
                    (PType::I64, Length::Known(3)),
                    (PType::I64, Length::Known(3)),
                    (PType::I64, Length::Known(3)),
                ],
                &[
                    &Data::from(buffer![0i64, -1, 1]),
                    &Data::from(buffer![0i64, 2, 3]),
                ],
                &[],
            )
            .unwrap();
        assert_eq!(mask.as_slice::<i64>().unwrap(), &[0, -1, 2]);
        assert_eq!(starts.as_slice::<i64>().unwrap(), &[0, 2, 2]);
        assert_eq!(stops.as_slice::<i64>().unwrap(), &[2, 2, 3]);
    }
}
