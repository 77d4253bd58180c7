//! Tagged unions. Tags are always `i8`; the index may be any of the union index types.

use ragged_dtype::NativePType;

use crate::data::{Data, DataMut};
use crate::kernels::{
    IndexPrimitive, KernelError, KernelResult, as_i64, at, input, output, outputs, position,
    scalar,
};

fn project_length(outs: &mut [DataMut], inputs: &[&Data], scalars: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let tags = input::<i8>(inputs, 0)?;
    let which = scalar(scalars, 0)?;
    let count = tags.iter().filter(|&&t| i64::from(t) == which).count();
    if let Some(o) = output::<i64>(out)?.first_mut() {
        *o = as_i64(count);
    }
    Ok(())
}

register_kernel!("UnionArray_project_length", project_length, [i64, i8]);

/// Positions in content `which` of the elements tagged `which`.
fn project<T: IndexPrimitive>(
    outs: &mut [DataMut],
    inputs: &[&Data],
    scalars: &[i64],
) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let tags = input::<i8>(inputs, 0)?;
    let index = input::<T>(inputs, 1)?;
    let which = scalar(scalars, 0)?;
    let mut k = 0;
    for (i, &t) in tags.iter().enumerate() {
        if i64::from(t) == which {
            *out.get_mut(k)
                .ok_or_else(|| kernel_err!(@ i, "carry buffer too short"))? =
                at(index, i, i)?.to_i64();
            k += 1;
        }
    }
    Ok(())
}

register_kernel_each!(
    "UnionArray_project",
    project::<T>,
    [i32, u32, i64],
    [i64, i8, T]
);

/// Number the elements of each content in order of appearance.
fn regular_index(outs: &mut [DataMut], inputs: &[&Data], scalars: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let out = output::<i64>(out)?;
    let tags = input::<i8>(inputs, 0)?;
    let numcontents = position(scalar(scalars, 0)?, 0)?;
    let mut counts = vec![0i64; numcontents];
    for (i, (o, &t)) in out.iter_mut().zip(tags).enumerate() {
        let t = position(i64::from(t), i)?;
        let count = counts
            .get_mut(t)
            .ok_or_else(|| kernel_err!(@ i, "tag {} out of range", t))?;
        *o = *count;
        *count += 1;
    }
    Ok(())
}

register_kernel!("UnionArray_regular_index", regular_index, [i64, i8]);

/// Route the elements of inner content `innerwhich` of outer content `outerwhich` (itself a
/// union) to `towhich`, shifted by `tooffset`.
/// scalars: `[outerwhich, innerwhich, towhich, tooffset]`.
fn simplify<T: IndexPrimitive>(
    outs: &mut [DataMut],
    inputs: &[&Data],
    scalars: &[i64],
) -> KernelResult {
    let [totags, toindex] = outputs::<2>(outs)?;
    let totags = output::<i8>(totags)?;
    let toindex = output::<i64>(toindex)?;
    let outertags = input::<i8>(inputs, 0)?;
    let outerindex = input::<T>(inputs, 1)?;
    let innertags = input::<i8>(inputs, 2)?;
    let innerindex = input::<i64>(inputs, 3)?;
    let outerwhich = scalar(scalars, 0)?;
    let innerwhich = scalar(scalars, 1)?;
    let towhich = i8::try_from(scalar(scalars, 2)?)
        .map_err(|_| kernel_err!("too many union contents"))?;
    let tooffset = scalar(scalars, 3)?;
    for (i, &t) in outertags.iter().enumerate() {
        if i64::from(t) != outerwhich {
            continue;
        }
        let j = position(at(outerindex, i, i)?.to_i64(), i)?;
        if i64::from(at(innertags, j, i)?) == innerwhich {
            totags[i] = towhich;
            toindex[i] = at(innerindex, j, i)? + tooffset;
        }
    }
    Ok(())
}

register_kernel_each!(
    "UnionArray_simplify",
    simplify::<T>,
    [i32, u32, i64],
    [i8, i64, i8, T, i8, i64]
);

/// Route the elements of content `fromwhich` to `towhich`, shifted by `tooffset`.
/// scalars: `[fromwhich, towhich, tooffset]`.
fn simplify_one<T: IndexPrimitive>(
    outs: &mut [DataMut],
    inputs: &[&Data],
    scalars: &[i64],
) -> KernelResult {
    let [totags, toindex] = outputs::<2>(outs)?;
    let totags = output::<i8>(totags)?;
    let toindex = output::<i64>(toindex)?;
    let fromtags = input::<i8>(inputs, 0)?;
    let fromindex = input::<T>(inputs, 1)?;
    let fromwhich = scalar(scalars, 0)?;
    let towhich = i8::try_from(scalar(scalars, 1)?)
        .map_err(|_| kernel_err!("too many union contents"))?;
    let tooffset = scalar(scalars, 2)?;
    for (i, &t) in fromtags.iter().enumerate() {
        if i64::from(t) == fromwhich {
            totags[i] = towhich;
            toindex[i] = at(fromindex, i, i)?.to_i64() + tooffset;
        }
    }
    Ok(())
}

register_kernel_each!(
    "UnionArray_simplify_one",
    simplify_one::<T>,
    [i32, u32, i64],
    [i8, i64, i8, T]
);

/// inputs: tags, index, and the length of every content.
fn validity<T: IndexPrimitive>(_: &mut [DataMut], inputs: &[&Data], _: &[i64]) -> KernelResult {
    let tags = input::<i8>(inputs, 0)?;
    let index = input::<T>(inputs, 1)?;
    let lencontents = input::<i64>(inputs, 2)?;
    if index.len() < tags.len() {
        return Err(kernel_err!("len(index) < len(tags)"));
    }
    for (i, (&t, &j)) in tags.iter().zip(index).enumerate() {
        if t < 0 {
            return Err(kernel_err!(@ i, "tags[i] < 0"));
        }
        let j = j.to_i64();
        if j < 0 {
            return Err(kernel_err!(@ i, "index[i] < 0"));
        }
        let lencontent = lencontents
            .get(t as usize)
            .ok_or_else(|| kernel_err!(@ i, "tags[i] >= len(contents)"))?;
        if j >= *lencontent {
            return Err(kernel_err!(@ i, "index[i] >= len(content[tags[i]])"));
        }
    }
    Ok(())
}

register_kernel_each!(
    "UnionArray_validity",
    validity::<T>,
    [i32, u32, i64],
    [i8, T, i64]
);

/// The range that element `i` of a union spans in its content's flattened items. The offsets
/// of every content are concatenated in `offsets`, content `t` starting at `bases[t]`.
fn flattened_range(
    tags: &[i8],
    index: &[i64],
    offsets: &[i64],
    bases: &[i64],
    i: usize,
) -> Result<(i64, i64), KernelError> {
    let t = position(i64::from(at(tags, i, i)?), i)?;
    let j = position(at(index, i, i)?, i)?;
    let base = position(at(bases, t, i)?, i)?;
    Ok((at(offsets, base + j, i)?, at(offsets, base + j + 1, i)?))
}

fn flatten_length(outs: &mut [DataMut], inputs: &[&Data], _: &[i64]) -> KernelResult {
    let [out] = outputs::<1>(outs)?;
    let tags = input::<i8>(inputs, 0)?;
    let index = input::<i64>(inputs, 1)?;
    let offsets = input::<i64>(inputs, 2)?;
    let bases = input::<i64>(inputs, 3)?;
    let mut total = 0;
    for i in 0..tags.len() {
        let (start, stop) = flattened_range(tags, index, offsets, bases, i)?;
        total += stop - start;
    }
    if let Some(o) = output::<i64>(out)?.first_mut() {
        *o = total;
    }
    Ok(())
}

register_kernel!(
    "UnionArray_flatten_length",
    flatten_length,
    [i64, i8, i64, i64, i64]
);

/// Tags, index and offsets of a union whose elements are the flattened items of each
/// element's content.
fn flatten_combine(outs: &mut [DataMut], inputs: &[&Data], _: &[i64]) -> KernelResult {
    let [totags, toindex, tooffsets] = outputs::<3>(outs)?;
    let totags = output::<i8>(totags)?;
    let toindex = output::<i64>(toindex)?;
    let tooffsets = output::<i64>(tooffsets)?;
    let tags = input::<i8>(inputs, 0)?;
    let index = input::<i64>(inputs, 1)?;
    let offsets = input::<i64>(inputs, 2)?;
    let bases = input::<i64>(inputs, 3)?;
    if let Some(first) = tooffsets.first_mut() {
        *first = 0;
    }
    let mut k = 0;
    for i in 0..tags.len() {
        let (start, stop) = flattened_range(tags, index, offsets, bases, i)?;
        for j in start..stop {
            *totags
                .get_mut(k)
                .ok_or_else(|| kernel_err!(@ i, "tags buffer too short"))? = tags[i];
            *toindex
                .get_mut(k)
                .ok_or_else(|| kernel_err!(@ i, "index buffer too short"))? = j;
            k += 1;
        }
        *tooffsets
            .get_mut(i + 1)
            .ok_or_else(|| kernel_err!(@ i, "offsets buffer too short"))? = as_i64(k);
    }
    Ok(())
}

register_kernel!(
    "UnionArray_flatten_combine",
    flatten_combine,
    [i8, i64, i64, i8, i64, i64, i64]
);

#[cfg(test)]
mod test {
    use ragged_buffer::buffer;
    use ragged_dtype::PType;

    use crate::backend::{BackendRef, Length};
    use crate::data::Data;

    #[test]
    fn projection_picks_one_content() {
        let cpu = BackendRef::cpu();
        let tags = Data::from(buffer![1i8, 1, 0, 0, 1, 0, 1, 1]);
        let index = Data::from(buffer![0i64, 1, 0, 1, 2, 2, 4, 3]);
        let [len] = cpu
            .call(
                "UnionArray_project_length",
                [cpu.allocate(PType::I64, Length::Known(1)).unwrap()],
                &[&tags],
                &[1],
            )
            .unwrap();
        assert_eq!(len.freeze().as_slice::<i64>().unwrap(), &[5]);
        let [out] = cpu
            .call(
                "UnionArray_project",
                [cpu.allocate(PType::I64, Length::Known(5)).unwrap()],
                &[&tags, &index],
                &[1],
            )
            .unwrap();
        assert_eq!(out.freeze().as_slice::<i64>().unwrap(), &[0, 1, 2, 4, 3]);
    }

    #[test]
    fn invalid_tags_are_reported() {
        let cpu = BackendRef::cpu();
        let tags = Data::from(buffer![0i8, 2]);
        let index = Data::from(buffer![0i64, 0]);
        let lengths = Data::from(buffer![1i64, 1]);
        let err = cpu
            .call("UnionArray_validity", [], &[&tags, &index, &lengths], &[])
            .unwrap_err();
        assert!(err.to_string().contains("at item 1"));
    }

    #[test]
    fn flattening_follows_each_content() {
        let cpu = BackendRef::cpu();
        let tags = Data::from(buffer![0i8, 1, 0]);
        let index = Data::from(buffer![1i64, 0, 0]);
        // content 0 has lists of lengths [2, 1], content 1 a single list of length 3
        let offsets = Data::from(buffer![0i64, 2, 3, 0, 3]);
        let bases = Data::from(buffer![0i64, 3]);
        let inputs = [&tags, &index, &offsets, &bases];
        let [total] = cpu
            .call(
                "UnionArray_flatten_length",
                [cpu.allocate(PType::I64, Length::Known(1)).unwrap()],
                &inputs,
                &[],
            )
            .unwrap();
        assert_eq!(total.freeze().as_slice::<i64>().unwrap(), &[6]);
        let [totags, toindex, tooffsets] = cpu
            .call(
                "UnionArray_flatten_combine",
                [
                    cpu.allocate(PType::I8, Length::Known(6)).unwrap(),
                    cpu.allocate(PType::I64, Length::Known(6)).unwrap(),
                    cpu.allocate(PType::I64, Length::Known(4)).unwrap(),
                ],
                &inputs,
                &[],
            )
            .unwrap();
        assert_eq!(totags.freeze().as_slice::<i8>().unwrap(), &[0, 1, 1, 1, 0, 0]);
        assert_eq!(toindex.freeze().as_slice::<i64>().unwrap(), &[2, 0, 1, 2, 0, 1]);
        assert_eq!(tooffsets.freeze().as_slice::<i64>().unwrap(), &[0, 1, 4, 6]);
    }
}
