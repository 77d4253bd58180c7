use crate::{RaggedError, RaggedResult};

/// Extension trait for results produced while walking a layout tree.
pub trait ResultExt<T>: private::Sealed {
    /// Flatten a nested [`RaggedResult`]. Helper function until <https://github.com/rust-lang/rust/issues/70142> is stabilized.
    fn flatten(self) -> RaggedResult<T>;
}

/// Attach the name of the layout node an error passed through.
pub trait NodeContext<T> {
    /// Record `node` on the error path. Only kernel errors keep a path, everything else passes
    /// through untouched.
    fn in_node(self, node: &'static str) -> RaggedResult<T>;
}

mod private {
    use crate::RaggedResult;

    pub trait Sealed {}

    impl<T> Sealed for RaggedResult<RaggedResult<T>> {}
}

impl<T> ResultExt<T> for RaggedResult<RaggedResult<T>> {
    fn flatten(self) -> RaggedResult<T> {
        match self {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) | Err(e) => Err(e),
        }
    }
}

impl<T> NodeContext<T> for RaggedResult<T> {
    fn in_node(self, node: &'static str) -> RaggedResult<T> {
        self.map_err(|e: RaggedError| e.with_node(node))
    }
}
