//! # Xfer Error Types
//!
//! Data errors raised while walking persisted or checksummed state.
//! A data error aborts the traversal that raised it and nothing else.

use thiserror::Error;

/// Errors that can occur while transferring state through an [`Xfer`](crate::Xfer).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum XferError {
    /// A persisted version is newer than the code reading it.
    #[error("unknown version {found}, newest supported is {current}")]
    InvalidVersion {
        /// Version found in the stream.
        found: u8,
        /// Newest version this build understands.
        current: u8,
    },

    /// The stream ended before the requested bytes could be read.
    #[error("unexpected end of stream: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof {
        /// Bytes requested.
        needed: usize,
        /// Bytes left in the stream.
        remaining: usize,
    },

    /// A section marker did not match the expected label.
    #[error("marker mismatch: expected '{expected}', found '{found}'")]
    MarkerMismatch {
        /// Label the reader expected.
        expected: String,
        /// Label actually present.
        found: String,
    },

    /// A block was not consumed exactly to its recorded size.
    #[error("block size mismatch: block ends at {expected}, reader stopped at {actual}")]
    BlockSizeMismatch {
        /// Stream offset where the block should end.
        expected: usize,
        /// Stream offset where reading stopped.
        actual: usize,
    },

    /// `end_block` was called with no open block.
    #[error("end_block without matching begin_block")]
    UnbalancedBlock,

    /// Save file header is missing or has the wrong magic.
    #[error("invalid save header: {0}")]
    InvalidHeader(String),

    /// Save payload does not match the checksum stored in its header.
    #[error("payload checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    PayloadChecksum {
        /// Checksum stored in the header.
        stored: u32,
        /// Checksum computed over the payload.
        computed: u32,
    },

    /// A string field did not contain valid UTF-8.
    #[error("invalid utf-8 in string field")]
    InvalidUtf8,

    /// A length does not fit the on-disk width.
    #[error("length {0} does not fit in a u32 prefix")]
    LengthOverflow(usize),

    /// No factory is registered for a persisted type tag.
    #[error("no factory registered for tag '{0}'")]
    UnknownTag(String),

    /// Persisted data is structurally valid but semantically wrong.
    #[error("malformed data: {0}")]
    Malformed(String),
}

/// Result type for xfer operations.
pub type XferResult<T> = Result<T, XferError>;
