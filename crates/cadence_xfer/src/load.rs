//! # Load Stream
//!
//! Reads a traversal back out of a byte slice.

use crate::error::{XferError, XferResult};
use crate::xfer::{Xfer, XferMode};

/// Xfer stream that deserializes from a borrowed buffer.
#[derive(Debug)]
pub struct XferLoad<'a> {
    /// Source bytes.
    buffer: &'a [u8],
    /// Read cursor.
    position: usize,
    /// End offsets of currently open blocks.
    block_ends: Vec<usize>,
}

impl<'a> XferLoad<'a> {
    /// Creates a load stream over `buffer`.
    #[must_use]
    pub const fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
            block_ends: Vec::new(),
        }
    }

    /// Returns the number of unread bytes.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    /// Returns the read cursor.
    #[inline]
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    fn ensure(&self, needed: usize) -> XferResult<()> {
        if needed > self.remaining() {
            return Err(XferError::UnexpectedEof {
                needed,
                remaining: self.remaining(),
            });
        }
        Ok(())
    }
}

impl Xfer for XferLoad<'_> {
    fn mode(&self) -> XferMode {
        XferMode::Load
    }

    fn xfer_bytes(&mut self, data: &mut [u8]) -> XferResult<()> {
        self.ensure(data.len())?;
        let end = self.position + data.len();
        data.copy_from_slice(&self.buffer[self.position..end]);
        self.position = end;
        Ok(())
    }

    fn begin_block(&mut self) -> XferResult<usize> {
        let mut size = 0u32;
        self.xfer_u32(&mut size)?;
        let size = size as usize;
        self.ensure(size)?;
        self.block_ends.push(self.position + size);
        Ok(size)
    }

    fn end_block(&mut self) -> XferResult<()> {
        let expected = self.block_ends.pop().ok_or(XferError::UnbalancedBlock)?;
        if expected != self.position {
            return Err(XferError::BlockSizeMismatch {
                expected,
                actual: self.position,
            });
        }
        Ok(())
    }

    fn skip(&mut self, len: usize) -> XferResult<()> {
        self.ensure(len)?;
        self.position += len;
        Ok(())
    }

    fn bytes_left(&self) -> Option<usize> {
        Some(self.remaining())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::save::XferSave;

    #[test]
    fn test_reads_back_saved_values() {
        let mut save = XferSave::new();
        save.xfer_u64(&mut 0xDEAD_BEEF_u64).unwrap();
        save.xfer_i32(&mut -12).unwrap();
        save.xfer_bool(&mut true).unwrap();
        let bytes = save.into_bytes().unwrap();

        let mut load = XferLoad::new(&bytes);
        let (mut a, mut b, mut c) = (0u64, 0i32, false);
        load.xfer_u64(&mut a).unwrap();
        load.xfer_i32(&mut b).unwrap();
        load.xfer_bool(&mut c).unwrap();

        assert_eq!((a, b, c), (0xDEAD_BEEF, -12, true));
        assert_eq!(load.remaining(), 0);
    }

    #[test]
    fn test_truncated_stream_is_an_error() {
        let mut load = XferLoad::new(&[1, 2]);
        let mut value = 0u32;
        assert_eq!(
            load.xfer_u32(&mut value),
            Err(XferError::UnexpectedEof { needed: 4, remaining: 2 })
        );
        assert_eq!(value, 0);
    }

    #[test]
    fn test_newer_version_is_rejected() {
        let mut load = XferLoad::new(&[3]);
        let mut version = 0;
        assert_eq!(
            load.xfer_version(&mut version, 2),
            Err(XferError::InvalidVersion { found: 3, current: 2 })
        );
    }

    #[test]
    fn test_under_read_block_is_detected() {
        let mut save = XferSave::new();
        save.begin_block().unwrap();
        save.xfer_u32(&mut 1).unwrap();
        save.xfer_u32(&mut 2).unwrap();
        save.end_block().unwrap();
        let bytes = save.into_bytes().unwrap();

        let mut load = XferLoad::new(&bytes);
        assert_eq!(load.begin_block().unwrap(), 8);
        let mut first = 0u32;
        load.xfer_u32(&mut first).unwrap();
        assert_eq!(
            load.end_block(),
            Err(XferError::BlockSizeMismatch { expected: 12, actual: 8 })
        );
    }

    #[test]
    fn test_marker_mismatch() {
        let mut save = XferSave::new();
        save.xfer_marker("Objects").unwrap();
        let bytes = save.into_bytes().unwrap();

        let mut load = XferLoad::new(&bytes);
        assert!(matches!(
            load.xfer_marker("Subsystems"),
            Err(XferError::MarkerMismatch { .. })
        ));
    }

    #[test]
    fn test_length_beyond_remaining_bytes_is_rejected() {
        let bytes = u32::MAX.to_le_bytes();
        let mut load = XferLoad::new(&bytes);
        let mut len = 0usize;
        assert!(matches!(load.xfer_len(&mut len), Err(XferError::Malformed(_))));
        assert_eq!(len, 0);

        let mut name = String::new();
        let mut load = XferLoad::new(&[200, 0, 0, 0, b'a', b'b']);
        assert!(matches!(load.xfer_string(&mut name), Err(XferError::Malformed(_))));
        assert!(name.is_empty());
    }

    #[test]
    fn test_length_that_fits_is_accepted() {
        let mut load = XferLoad::new(&[2, 0, 0, 0, 7, 9]);
        let mut len = 0usize;
        load.xfer_len(&mut len).unwrap();
        assert_eq!(len, 2);
        assert_eq!(load.bytes_left(), Some(2));
    }
}
