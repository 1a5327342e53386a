//! # Save Stream
//!
//! Writes a traversal into a growable byte buffer.

use crate::error::{XferError, XferResult};
use crate::xfer::{Xfer, XferMode};

/// Xfer stream that serializes to memory.
///
/// Blocks are written as a `u32` size placeholder that is patched when the
/// block closes, so readers can skip blocks they do not understand.
#[derive(Debug, Default)]
pub struct XferSave {
    /// Bytes written so far.
    buffer: Vec<u8>,
    /// Offsets of the size placeholders of currently open blocks.
    open_blocks: Vec<usize>,
}

impl XferSave {
    /// Creates an empty save stream.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a save stream with pre-reserved capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
            open_blocks: Vec::new(),
        }
    }

    /// Returns the number of bytes written.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if nothing has been written.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Returns the written bytes.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Consumes the stream and returns its bytes.
    ///
    /// # Errors
    ///
    /// Returns [`XferError::UnbalancedBlock`] if a block is still open.
    pub fn into_bytes(self) -> XferResult<Vec<u8>> {
        if !self.open_blocks.is_empty() {
            return Err(XferError::UnbalancedBlock);
        }
        Ok(self.buffer)
    }
}

impl Xfer for XferSave {
    fn mode(&self) -> XferMode {
        XferMode::Save
    }

    fn xfer_bytes(&mut self, data: &mut [u8]) -> XferResult<()> {
        self.buffer.extend_from_slice(data);
        Ok(())
    }

    fn begin_block(&mut self) -> XferResult<usize> {
        self.open_blocks.push(self.buffer.len());
        self.buffer.extend_from_slice(&0u32.to_le_bytes());
        Ok(0)
    }

    fn end_block(&mut self) -> XferResult<()> {
        let start = self.open_blocks.pop().ok_or(XferError::UnbalancedBlock)?;
        let size = self.buffer.len() - start - 4;
        let wire = u32::try_from(size).map_err(|_| XferError::LengthOverflow(size))?;
        self.buffer[start..start + 4].copy_from_slice(&wire.to_le_bytes());
        Ok(())
    }

    fn skip(&mut self, _len: usize) -> XferResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_size_is_patched() {
        let mut save = XferSave::new();
        save.begin_block().unwrap();
        save.xfer_u32(&mut 7).unwrap();
        save.xfer_u16(&mut 9).unwrap();
        save.end_block().unwrap();

        let bytes = save.into_bytes().unwrap();
        assert_eq!(&bytes[0..4], &6u32.to_le_bytes());
        assert_eq!(bytes.len(), 10);
    }

    #[test]
    fn test_unbalanced_block_rejected() {
        let mut save = XferSave::new();
        assert_eq!(save.end_block(), Err(XferError::UnbalancedBlock));

        save.begin_block().unwrap();
        assert_eq!(save.into_bytes(), Err(XferError::UnbalancedBlock));
    }

    #[test]
    fn test_strings_are_length_prefixed() {
        let mut save = XferSave::new();
        let mut name = String::from("tank");
        save.xfer_string(&mut name).unwrap();

        assert_eq!(name, "tank");
        assert_eq!(save.as_slice(), &[4, 0, 0, 0, b't', b'a', b'n', b'k']);
    }
}
