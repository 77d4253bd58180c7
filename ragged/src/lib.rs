pub use ragged_array::*;
pub use {ragged_buffer as buffer, ragged_dtype as dtype, ragged_error as error};

#[cfg(test)]
mod test {
    use serde_json::json;

    use crate::buffer::buffer;
    use crate::dtype::Parameters;
    use crate::{Content, Index, ListOffsetArray, NumpyArray};

    #[test]
    fn reexports_reach_every_crate() {
        let lists: Content = ListOffsetArray::try_new(
            Index::from_i64s([0, 2, 2, 3]),
            NumpyArray::new(buffer![1i32, 2, 3]),
        )
        .unwrap()
        .with_parameters(Parameters::empty().with("__doc__", "counts"))
        .into();
        assert_eq!(lists.to_list().unwrap(), json!([[1, 2], [], [3]]));
    }
}
