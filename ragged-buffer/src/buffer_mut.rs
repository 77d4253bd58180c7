use std::ops::{Deref, DerefMut};

use crate::Buffer;

/// A mutable buffer of items of `T`, frozen into a [`Buffer`] once written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferMut<T> {
    values: Vec<T>,
}

impl<T> BufferMut<T> {
    /// Create a new empty buffer with room for `capacity` items.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
        }
    }

    /// Create a new empty buffer.
    pub fn empty() -> Self {
        Self::with_capacity(0)
    }

    /// Create a buffer of `len` copies of `item`.
    pub fn full(item: T, len: usize) -> Self
    where
        T: Copy,
    {
        Self {
            values: vec![item; len],
        }
    }

    /// Create a buffer of `len` default values.
    pub fn zeroed(len: usize) -> Self
    where
        T: Default + Clone,
    {
        Self {
            values: vec![T::default(); len],
        }
    }

    /// Copy the provided values into a new buffer.
    pub fn copy_from(values: impl AsRef<[T]>) -> Self
    where
        T: Clone,
    {
        Self {
            values: values.as_ref().to_vec(),
        }
    }

    /// Returns the length of the buffer.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns whether the buffer is empty.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Append one item.
    #[inline]
    pub fn push(&mut self, value: T) {
        self.values.push(value);
    }

    /// Append a slice of items.
    pub fn extend_from_slice(&mut self, values: &[T])
    where
        T: Clone,
    {
        self.values.extend_from_slice(values);
    }

    /// Shorten the buffer to `len` items.
    pub fn truncate(&mut self, len: usize) {
        self.values.truncate(len);
    }

    /// Returns the items as a mutable slice.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        self.values.as_mut_slice()
    }

    /// Freeze the buffer into an immutable [`Buffer`].
    pub fn freeze(self) -> Buffer<T> {
        Buffer::from(self.values)
    }
}

impl<T> Deref for BufferMut<T> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        self.values.as_slice()
    }
}

impl<T> DerefMut for BufferMut<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.values.as_mut_slice()
    }
}

impl<T> FromIterator<T> for BufferMut<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl<T> Extend<T> for BufferMut<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.values.extend(iter)
    }
}

impl<T> From<Vec<T>> for BufferMut<T> {
    fn from(values: Vec<T>) -> Self {
        Self { values }
    }
}

#[cfg(test)]
mod test {
    use crate::buffer_mut;

    #[test]
    fn write_then_freeze() {
        let mut buf = buffer_mut![0i32; 4];
        buf[2] = 7;
        buf.push(9);
        let frozen = buf.freeze();
        assert_eq!(frozen.as_slice(), &[0, 0, 7, 0, 9]);
    }
}
