use std::fmt::{Debug, Formatter};
use std::ops::{Bound, Deref, RangeBounds};
use std::sync::Arc;

use ragged_error::ragged_panic;

use crate::BufferMut;

/// An immutable buffer of items of `T`.
///
/// Clones share the same allocation; [`Buffer::slice`] narrows the visible window without
/// copying.
#[derive(Clone)]
pub struct Buffer<T> {
    values: Arc<[T]>,
    offset: usize,
    length: usize,
}

impl<T> Buffer<T> {
    /// Returns a new `Buffer<T>` copied from the provided `Vec<T>`, `&[T]`, etc.
    pub fn copy_from(values: impl AsRef<[T]>) -> Self
    where
        T: Clone,
    {
        Self::from(values.as_ref().to_vec())
    }

    /// Create a new empty buffer.
    pub fn empty() -> Self {
        Self::from(Vec::new())
    }

    /// Create a new buffer of `len` copies of `item`.
    pub fn full(item: T, len: usize) -> Self
    where
        T: Copy,
    {
        BufferMut::full(item, len).freeze()
    }

    /// Returns the length of the buffer in elements of type T.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.length
    }

    /// Returns whether the buffer is empty.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Returns a slice over the visible window of the buffer.
    #[inline(always)]
    pub fn as_slice(&self) -> &[T] {
        &self.values[self.offset..self.offset + self.length]
    }

    /// Returns an iterator over the buffer of elements of type T.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.as_slice().iter()
    }

    /// Returns a zero-copy view of self for the provided range.
    ///
    /// # Panics
    ///
    /// Requires that `begin <= end` and `end <= self.len()`.
    pub fn slice(&self, range: impl RangeBounds<usize>) -> Self {
        let len = self.len();
        let begin = match range.start_bound() {
            Bound::Included(&n) => n,
            Bound::Excluded(&n) => n + 1,
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&n) => n + 1,
            Bound::Excluded(&n) => n,
            Bound::Unbounded => len,
        };

        if begin > end {
            ragged_panic!(
                "range start must not be greater than end: {:?} <= {:?}",
                begin,
                end
            );
        }
        if end > len {
            ragged_panic!("range end out of bounds: {:?} <= {:?}", end, len);
        }

        Self {
            values: self.values.clone(),
            offset: self.offset + begin,
            length: end - begin,
        }
    }

    /// Whether two buffers are views over the same allocation and window.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.values, &other.values)
            && self.offset == other.offset
            && self.length == other.length
    }

    /// Copy the visible window into a [`BufferMut`].
    pub fn into_mut(self) -> BufferMut<T>
    where
        T: Clone,
    {
        BufferMut::copy_from(self.as_slice())
    }
}

impl<T: Debug> Debug for Buffer<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        const TRUNC_SIZE: usize = 64;
        let mut binding = f.debug_struct("Buffer");
        let mut fields = binding.field("length", &self.length);
        if self.length > TRUNC_SIZE {
            fields = fields.field("truncated", &true);
        }
        fields
            .field("values", &&self.as_slice()[..self.length.min(TRUNC_SIZE)])
            .finish()
    }
}

impl<T> Deref for Buffer<T> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl<T> AsRef<[T]> for Buffer<T> {
    fn as_ref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T: PartialEq> PartialEq for Buffer<T> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: Eq> Eq for Buffer<T> {}

impl<T> From<Vec<T>> for Buffer<T> {
    fn from(value: Vec<T>) -> Self {
        let length = value.len();
        Self {
            values: Arc::from(value),
            offset: 0,
            length,
        }
    }
}

impl<T> FromIterator<T> for Buffer<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}

/// Owned iterator over a `Buffer<T>`.
pub struct BufferIterator<T> {
    buffer: Buffer<T>,
    index: usize,
}

impl<T: Copy> Iterator for BufferIterator<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        (self.index < self.buffer.len()).then(|| {
            let value = self.buffer.as_slice()[self.index];
            self.index += 1;
            value
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.buffer.len() - self.index;
        (remaining, Some(remaining))
    }
}

impl<T: Copy> IntoIterator for Buffer<T> {
    type Item = T;
    type IntoIter = BufferIterator<T>;

    fn into_iter(self) -> Self::IntoIter {
        BufferIterator {
            buffer: self,
            index: 0,
        }
    }
}

impl<T> From<BufferMut<T>> for Buffer<T> {
    fn from(value: BufferMut<T>) -> Self {
        value.freeze()
    }
}

#[cfg(test)]
mod test {
    use crate::{Buffer, buffer};

    #[test]
    fn slice_is_a_view() {
        let buf = buffer![0i64, 1, 2, 3, 4];
        let sliced = buf.slice(1..4);
        assert_eq!(sliced.as_slice(), &[1, 2, 3]);
        let nested = sliced.slice(1..);
        assert_eq!(nested.as_slice(), &[2, 3]);
        assert!(!nested.ptr_eq(&sliced));
        assert!(nested.ptr_eq(&nested.clone()));
    }

    #[test]
    fn empty_slice() {
        let buf = buffer![1u8, 2, 3];
        assert!(buf.slice(3..3).is_empty());
        assert_eq!(Buffer::<u8>::empty().len(), 0);
    }

    #[test]
    #[should_panic]
    fn slice_out_of_bounds() {
        let buf = buffer![1u8, 2, 3];
        buf.slice(2..5);
    }

    #[test]
    fn into_iter_copies() {
        let buf = buffer![1.5f64; 3];
        assert_eq!(buf.into_iter().sum::<f64>(), 4.5);
    }
}
