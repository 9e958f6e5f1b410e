use bytes::Bytes;

use crate::{Result, TsError};

/// Bounds-checked sequential reader over a borrowed byte buffer.
///
/// A failed read never moves the cursor.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Current read position.
    #[inline]
    pub fn position(&self) -> usize {
        self.offset
    }

    /// Length of the underlying buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    #[inline]
    pub fn has_remaining(&self) -> bool {
        self.offset < self.data.len()
    }

    fn out_of_range(&self, requested: usize) -> TsError {
        TsError::OutOfRange {
            field: "bytes",
            position: self.offset,
            requested,
            remaining: self.remaining(),
        }
    }

    pub fn next_byte(&mut self) -> Result<u8> {
        let byte = *self
            .data
            .get(self.offset)
            .ok_or_else(|| self.out_of_range(1))?;
        self.offset += 1;
        Ok(byte)
    }

    /// Zero-copy read; the returned slice borrows the underlying buffer.
    pub fn next_bytes_view(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(self.out_of_range(n));
        }
        let data: &'a [u8] = self.data;
        let view = &data[self.offset..self.offset + n];
        self.offset += n;
        Ok(view)
    }

    /// Fixed-size zero-copy read.
    pub fn next_array<const N: usize>(&mut self) -> Result<&'a [u8; N]> {
        let view = self.next_bytes_view(N)?;
        view.try_into().map_err(|_| TsError::InvalidPacketSize(view.len()))
    }

    /// Owning read, the result outlives the underlying buffer.
    pub fn next_bytes_copy(&mut self, n: usize) -> Result<Bytes> {
        self.next_bytes_view(n).map(Bytes::copy_from_slice)
    }

    /// Moves to an absolute position in `0..=len`.
    pub fn seek(&mut self, position: usize) -> Result<()> {
        if position > self.data.len() {
            return Err(TsError::OutOfRange {
                field: "seek",
                position: self.offset,
                requested: position,
                remaining: self.remaining(),
            });
        }
        self.offset = position;
        Ok(())
    }

    /// Moves relative to the current position; negative deltas rewind.
    pub fn skip(&mut self, delta: isize) -> Result<()> {
        let target = self
            .offset
            .checked_add_signed(delta)
            .filter(|&target| target <= self.data.len())
            .ok_or(TsError::OutOfRange {
                field: "skip",
                position: self.offset,
                requested: delta.unsigned_abs(),
                remaining: self.remaining(),
            })?;
        self.offset = target;
        Ok(())
    }

    /// Copies everything after the current position and moves to the end.
    pub fn take_remainder(&mut self) -> Bytes {
        if !self.has_remaining() {
            return Bytes::new();
        }
        let rest = Bytes::copy_from_slice(&self.data[self.offset..]);
        self.offset = self.data.len();
        rest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_reads() {
        let data = [0x47, 0x01, 0x02, 0x03, 0x04];
        let mut cursor = ByteCursor::new(&data);
        assert_eq!(cursor.next_byte().unwrap(), 0x47);
        assert_eq!(cursor.next_bytes_view(2).unwrap(), &[0x01, 0x02]);
        assert_eq!(&cursor.next_bytes_copy(1).unwrap()[..], &[0x03]);
        assert_eq!(cursor.position(), 4);
        assert!(cursor.has_remaining());
        assert_eq!(&cursor.take_remainder()[..], &[0x04]);
        assert!(!cursor.has_remaining());
        assert!(cursor.take_remainder().is_empty());
    }

    #[test]
    fn test_failed_read_keeps_offset() {
        let data = [0u8; 4];
        let mut cursor = ByteCursor::new(&data);
        cursor.next_bytes_view(3).unwrap();
        let err = cursor.next_bytes_view(2).unwrap_err();
        assert_eq!(
            err,
            TsError::OutOfRange {
                field: "bytes",
                position: 3,
                requested: 2,
                remaining: 1
            }
        );
        assert_eq!(cursor.position(), 3);
        assert_eq!(cursor.next_byte().unwrap(), 0);
        assert!(cursor.next_byte().is_err());
        assert_eq!(cursor.position(), 4);
    }

    #[test]
    fn test_seek_and_skip() {
        let data = [0u8, 1, 2, 3, 4, 5];
        let mut cursor = ByteCursor::new(&data);
        cursor.seek(4).unwrap();
        assert_eq!(cursor.next_byte().unwrap(), 4);
        cursor.skip(-3).unwrap();
        assert_eq!(cursor.next_byte().unwrap(), 2);
        cursor.skip(3).unwrap();
        assert_eq!(cursor.position(), 6);
        assert!(cursor.skip(1).is_err());
        assert!(cursor.skip(-7).is_err());
        assert!(cursor.seek(7).is_err());
        assert_eq!(cursor.position(), 6);
        cursor.seek(6).unwrap();
        assert!(!cursor.has_remaining());
    }

    #[test]
    fn test_next_array() {
        let data = [9u8, 8, 7];
        let mut cursor = ByteCursor::new(&data);
        let arr: &[u8; 2] = cursor.next_array().unwrap();
        assert_eq!(arr, &[9, 8]);
        assert!(cursor.next_array::<2>().is_err());
    }
}
