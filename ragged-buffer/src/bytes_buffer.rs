use std::ops::Deref;

use bytes::{Buf, Bytes};

/// A reference-counted buffer of raw bytes, the unit exchanged by buffer round-tripping.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ByteBuffer(Bytes);

impl ByteBuffer {
    /// Wrap existing bytes without copying.
    pub fn new(bytes: Bytes) -> Self {
        Self(bytes)
    }

    /// Copy the provided slice into a new buffer.
    pub fn copy_from(bytes: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(bytes))
    }

    /// Returns the length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Access the buffer as a byte slice.
    pub fn as_slice(&self) -> &[u8] {
        self.0.as_ref()
    }

    /// Returns the underlying bytes.
    pub fn into_inner(self) -> Bytes {
        self.0
    }
}

impl Deref for ByteBuffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(value: Vec<u8>) -> Self {
        Self(Bytes::from(value))
    }
}

impl From<Bytes> for ByteBuffer {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl Buf for ByteBuffer {
    fn remaining(&self) -> usize {
        self.0.remaining()
    }

    fn chunk(&self) -> &[u8] {
        self.0.chunk()
    }

    fn advance(&mut self, cnt: usize) {
        self.0.advance(cnt)
    }
}

#[cfg(test)]
mod test {
    use bytes::Buf;

    use crate::ByteBuffer;

    #[test]
    fn read_little_endian() {
        let mut buf = ByteBuffer::from(vec![1u8, 0, 0, 0, 0, 0, 0, 0, 2, 0]);
        assert_eq!(buf.get_i64_le(), 1);
        assert_eq!(buf.remaining(), 2);
        assert_eq!(buf.get_u16_le(), 2);
    }
}
