//! Growable byte buffer reused across frames.
//!
//! A `ByteBuffer` separates the number of bytes in use (`size`) from the
//! allocated capacity so that per-frame buffers can be reset and refilled
//! without going back to the allocator. Read-only access to someone else's
//! memory is expressed with a plain `&[u8]`, which cannot grow.

use crate::error::{EssenceError, Result};
use std::io::Read;

/// Owned growable byte buffer with an explicit used size.
#[derive(Clone, Default)]
pub struct ByteBuffer {
    /// Backing storage; its length is the allocated capacity.
    data: Vec<u8>,
    /// Bytes in use.
    size: usize,
}

impl ByteBuffer {
    /// Create an empty buffer with no allocation.
    pub fn new() -> Self {
        ByteBuffer::default()
    }

    /// Create an empty buffer with `capacity` bytes allocated.
    pub fn with_capacity(capacity: usize) -> Self {
        ByteBuffer {
            data: vec![0; capacity],
            size: 0,
        }
    }

    /// Bytes in use.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Allocated capacity.
    pub fn allocated(&self) -> usize {
        self.data.len()
    }

    /// Bytes that can be written without reallocating.
    pub fn available(&self) -> usize {
        self.data.len() - self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// The bytes in use.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.size]
    }

    /// Mutable access to the bytes in use.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data[..self.size]
    }

    /// The allocated but unused region after `size`.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.size..]
    }

    /// Replace the contents with `bytes`.
    pub fn set_bytes(&mut self, bytes: &[u8]) {
        self.size = 0;
        self.append(bytes);
    }

    /// Append bytes, growing the allocation if needed.
    pub fn append(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.grow(bytes.len());
        self.data[self.size..self.size + bytes.len()].copy_from_slice(bytes);
        self.size += bytes.len();
    }

    /// Append `count` zero bytes.
    pub fn append_zeros(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        self.grow(count);
        self.data[self.size..self.size + count].fill(0);
        self.size += count;
    }

    /// Set the used size. Fails if `size` exceeds the allocation.
    pub fn set_size(&mut self, size: usize) -> Result<()> {
        if size > self.data.len() {
            return Err(EssenceError::BufferOverflow {
                requested: size,
                allocated: self.data.len(),
            });
        }
        self.size = size;
        Ok(())
    }

    /// Discard the contents and allocate exactly `capacity` bytes.
    pub fn allocate(&mut self, capacity: usize) {
        self.data = vec![0; capacity];
        self.size = 0;
    }

    /// Allocate `min_capacity` bytes if the current allocation is smaller.
    ///
    /// Like [`allocate`](Self::allocate), the contents are discarded when a
    /// reallocation happens.
    pub fn min_allocate(&mut self, min_capacity: usize) {
        if self.data.len() < min_capacity {
            self.allocate(min_capacity);
        }
    }

    /// Clear the used size, keeping the allocation.
    pub fn reset(&mut self) {
        self.size = 0;
    }

    /// Fill the spare region from `reader`, returning the number of bytes read.
    ///
    /// Reads until `count` bytes arrive or the reader reaches end of stream.
    /// The buffer grows if `count` exceeds the spare capacity.
    pub fn read_from<R: Read>(&mut self, reader: &mut R, count: usize) -> Result<usize> {
        self.grow(count);
        let mut total = 0;
        while total < count {
            let start = self.size + total;
            let n = reader.read(&mut self.data[start..self.size + count])?;
            if n == 0 {
                break;
            }
            total += n;
        }
        self.size += total;
        Ok(total)
    }

    fn grow(&mut self, additional: usize) {
        let required = self.size + additional;
        if required > self.data.len() {
            let new_capacity = required.max(self.data.len() * 2);
            self.data.resize(new_capacity, 0);
        }
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(data: Vec<u8>) -> Self {
        let size = data.len();
        ByteBuffer { data, size }
    }
}

impl From<&[u8]> for ByteBuffer {
    fn from(bytes: &[u8]) -> Self {
        ByteBuffer::from(bytes.to_vec())
    }
}

impl AsRef<[u8]> for ByteBuffer {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

/// Buffers compare by the bytes in use; capacity is ignored
impl PartialEq for ByteBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for ByteBuffer {}

impl std::fmt::Debug for ByteBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteBuffer")
            .field("size", &self.size)
            .field("allocated", &self.data.len())
            .finish()
    }
}
