//! # Checksum Stream
//!
//! Folds a traversal into a CRC32 instead of writing it anywhere.
//! Block framing is not hashed; only the values themselves are.

use crate::error::XferResult;
use crate::xfer::{Xfer, XferMode};

/// Xfer stream that computes a rolling CRC32 over every transferred byte.
#[derive(Clone, Default)]
pub struct XferCrc {
    /// Running hash state.
    hasher: crc32fast::Hasher,
    /// Number of bytes folded in.
    bytes: u64,
}

impl XferCrc {
    /// Creates a fresh checksum stream.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the checksum of everything transferred so far.
    ///
    /// The stream stays usable; this is the value a peer would report
    /// if the traversal stopped here.
    #[must_use]
    pub fn checksum(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    /// Returns how many bytes have been folded into the checksum.
    #[inline]
    #[must_use]
    pub const fn bytes_hashed(&self) -> u64 {
        self.bytes
    }
}

impl std::fmt::Debug for XferCrc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XferCrc")
            .field("checksum", &format_args!("{:#010x}", self.checksum()))
            .field("bytes", &self.bytes)
            .finish()
    }
}

impl Xfer for XferCrc {
    fn mode(&self) -> XferMode {
        XferMode::Crc
    }

    fn xfer_bytes(&mut self, data: &mut [u8]) -> XferResult<()> {
        self.hasher.update(data);
        self.bytes += data.len() as u64;
        Ok(())
    }

    fn begin_block(&mut self) -> XferResult<usize> {
        Ok(0)
    }

    fn end_block(&mut self) -> XferResult<()> {
        Ok(())
    }

    fn skip(&mut self, _len: usize) -> XferResult<()> {
        Ok(())
    }
}
