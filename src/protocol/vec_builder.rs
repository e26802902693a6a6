//! Grow vectors from untrusted length prefixes without allocating the claimed size up front.

use std::io::Read;

/// Upper bound for a single up-front allocation.
///
/// A malicious or corrupt length prefix must not be able to reserve gigabytes of memory before a single byte of
/// payload has been read.
const DEFAULT_BLOCK_SIZE: usize = 1024 * 10;

#[derive(Debug)]
pub struct VecBuilder<T> {
    full_len: usize,
    block_size: usize,
    data: Vec<T>,
}

impl<T> VecBuilder<T> {
    pub fn new(expected_len: usize) -> Self {
        let block_size = (DEFAULT_BLOCK_SIZE / std::mem::size_of::<T>().max(1)).max(1);
        Self {
            full_len: expected_len,
            block_size,
            data: Vec::with_capacity(expected_len.min(block_size)),
        }
    }

    pub fn push(&mut self, elem: T) {
        if self.data.len() == self.data.capacity() {
            let remaining = self.full_len.saturating_sub(self.data.len());
            self.data.reserve(remaining.clamp(1, self.block_size));
        }
        self.data.push(elem);
    }
}

impl VecBuilder<u8> {
    /// Read exactly the expected number of bytes, block by block.
    pub fn read_exact<R>(mut self, reader: &mut R) -> Result<Self, std::io::Error>
    where
        R: Read,
    {
        let mut buf = vec![0u8; self.block_size.min(self.full_len)];
        while self.data.len() < self.full_len {
            let n = (self.full_len - self.data.len()).min(buf.len());
            reader.read_exact(&mut buf[..n])?;
            self.data.extend_from_slice(&buf[..n]);
        }
        Ok(self)
    }
}

impl<T> From<VecBuilder<T>> for Vec<T> {
    fn from(builder: VecBuilder<T>) -> Self {
        builder.data
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn read_exact_larger_than_block() {
        let data: Vec<u8> = (0..=255u8).cycle().take(DEFAULT_BLOCK_SIZE * 2 + 7).collect();
        let builder = VecBuilder::new(data.len())
            .read_exact(&mut Cursor::new(data.clone()))
            .unwrap();
        assert_eq!(Vec::from(builder), data);
    }

    #[test]
    fn read_exact_does_not_trust_length() {
        let err = VecBuilder::new(usize::MAX)
            .read_exact(&mut Cursor::new(vec![1u8, 2, 3]))
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn push_grows() {
        let mut builder = VecBuilder::new(3);
        for i in 0..5 {
            builder.push(i);
        }
        assert_eq!(Vec::from(builder), vec![0, 1, 2, 3, 4]);
    }
}
