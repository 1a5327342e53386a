//! # The Xfer Contract
//!
//! One traversal, three modes. Every object and subsystem writes a single
//! `xfer` routine against this trait; the same routine saves state, restores
//! it, and feeds the rolling checksum. Keeping one routine is what guarantees
//! that a checksum covers exactly what a save would persist.
//!
//! ## Wire Rules
//!
//! - All integers are little-endian.
//! - Strings are a `u32` byte length followed by UTF-8 bytes.
//! - Versions are a single byte; reading a version newer than the code is an error.

use crate::error::{XferError, XferResult};

/// Version byte written at the start of every versioned snapshot.
pub type XferVersion = u8;

/// Direction of a traversal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum XferMode {
    /// Values are written to a byte stream.
    Save,
    /// Values are overwritten from a byte stream.
    Load,
    /// Values are folded into a checksum and left untouched.
    Crc,
}

/// A traversal stream.
///
/// Implementors provide raw byte movement and block framing. Every typed
/// method is built on [`Xfer::xfer_bytes`], so a new stream only has to
/// decide what "moving bytes" means for it.
pub trait Xfer {
    /// Returns the direction of this traversal.
    fn mode(&self) -> XferMode;

    /// Moves raw bytes.
    ///
    /// Save and checksum streams read from `data`; load streams overwrite it.
    ///
    /// # Errors
    ///
    /// Returns [`XferError::UnexpectedEof`] when a load stream runs dry.
    fn xfer_bytes(&mut self, data: &mut [u8]) -> XferResult<()>;

    /// Opens a size-prefixed block.
    ///
    /// Returns the block's payload size when loading, zero otherwise.
    ///
    /// # Errors
    ///
    /// Load streams fail if the recorded size runs past the end of the data.
    fn begin_block(&mut self) -> XferResult<usize>;

    /// Closes the innermost open block.
    ///
    /// # Errors
    ///
    /// Load streams fail if the block was not consumed exactly.
    fn end_block(&mut self) -> XferResult<()>;

    /// Skips `len` bytes of a load stream. Other modes ignore it.
    ///
    /// # Errors
    ///
    /// Returns [`XferError::UnexpectedEof`] if fewer than `len` bytes remain.
    fn skip(&mut self, len: usize) -> XferResult<()>;

    /// Returns how many unread bytes a load stream has left.
    ///
    /// Streams that do not read from a buffer return `None`.
    #[inline]
    fn bytes_left(&self) -> Option<usize> {
        None
    }

    /// Returns true when values are being restored.
    #[inline]
    fn is_loading(&self) -> bool {
        self.mode() == XferMode::Load
    }

    /// Transfers a `u8`.
    ///
    /// # Errors
    ///
    /// Propagates stream errors.
    fn xfer_u8(&mut self, value: &mut u8) -> XferResult<()> {
        let mut bytes = [*value];
        self.xfer_bytes(&mut bytes)?;
        *value = bytes[0];
        Ok(())
    }

    /// Transfers a `u16`.
    ///
    /// # Errors
    ///
    /// Propagates stream errors.
    fn xfer_u16(&mut self, value: &mut u16) -> XferResult<()> {
        let mut bytes = value.to_le_bytes();
        self.xfer_bytes(&mut bytes)?;
        *value = u16::from_le_bytes(bytes);
        Ok(())
    }

    /// Transfers a `u32`.
    ///
    /// # Errors
    ///
    /// Propagates stream errors.
    fn xfer_u32(&mut self, value: &mut u32) -> XferResult<()> {
        let mut bytes = value.to_le_bytes();
        self.xfer_bytes(&mut bytes)?;
        *value = u32::from_le_bytes(bytes);
        Ok(())
    }

    /// Transfers a `u64`.
    ///
    /// # Errors
    ///
    /// Propagates stream errors.
    fn xfer_u64(&mut self, value: &mut u64) -> XferResult<()> {
        let mut bytes = value.to_le_bytes();
        self.xfer_bytes(&mut bytes)?;
        *value = u64::from_le_bytes(bytes);
        Ok(())
    }

    /// Transfers an `i32`.
    ///
    /// # Errors
    ///
    /// Propagates stream errors.
    fn xfer_i32(&mut self, value: &mut i32) -> XferResult<()> {
        let mut bytes = value.to_le_bytes();
        self.xfer_bytes(&mut bytes)?;
        *value = i32::from_le_bytes(bytes);
        Ok(())
    }

    /// Transfers an `i64`.
    ///
    /// # Errors
    ///
    /// Propagates stream errors.
    fn xfer_i64(&mut self, value: &mut i64) -> XferResult<()> {
        let mut bytes = value.to_le_bytes();
        self.xfer_bytes(&mut bytes)?;
        *value = i64::from_le_bytes(bytes);
        Ok(())
    }

    /// Transfers an `f32` by its bit pattern.
    ///
    /// # Errors
    ///
    /// Propagates stream errors.
    fn xfer_f32(&mut self, value: &mut f32) -> XferResult<()> {
        let mut bits = value.to_bits();
        self.xfer_u32(&mut bits)?;
        *value = f32::from_bits(bits);
        Ok(())
    }

    /// Transfers a `bool` as a single byte.
    ///
    /// # Errors
    ///
    /// Returns [`XferError::Malformed`] if a loaded byte is neither 0 nor 1.
    fn xfer_bool(&mut self, value: &mut bool) -> XferResult<()> {
        let mut byte = u8::from(*value);
        self.xfer_u8(&mut byte)?;
        *value = match byte {
            0 => false,
            1 => true,
            other => return Err(XferError::Malformed(format!("bool byte {other}"))),
        };
        Ok(())
    }

    /// Transfers a snapshot version and checks it against the newest known.
    ///
    /// # Arguments
    ///
    /// * `version` - In save mode the version being written; in load mode overwritten
    /// * `current` - The newest version this build can read
    ///
    /// # Errors
    ///
    /// Returns [`XferError::InvalidVersion`] if the transferred version exceeds `current`.
    fn xfer_version(&mut self, version: &mut XferVersion, current: XferVersion) -> XferResult<()> {
        self.xfer_u8(version)?;
        if *version > current {
            return Err(XferError::InvalidVersion {
                found: *version,
                current,
            });
        }
        Ok(())
    }

    /// Transfers a collection length as a `u32`.
    ///
    /// Every element takes at least one byte on the wire, so a loaded length
    /// larger than the unread remainder cannot be genuine and is rejected
    /// before the caller allocates for it.
    ///
    /// # Errors
    ///
    /// Returns [`XferError::LengthOverflow`] if `len` exceeds `u32::MAX` and
    /// [`XferError::Malformed`] if a loaded length outruns the stream.
    fn xfer_len(&mut self, len: &mut usize) -> XferResult<()> {
        let mut wire = u32::try_from(*len).map_err(|_| XferError::LengthOverflow(*len))?;
        self.xfer_u32(&mut wire)?;
        let loaded = wire as usize;
        if let Some(left) = self.bytes_left() {
            if loaded > left {
                return Err(XferError::Malformed(format!(
                    "length {loaded} exceeds the {left} bytes left"
                )));
            }
        }
        *len = loaded;
        Ok(())
    }

    /// Transfers a length-prefixed UTF-8 string.
    ///
    /// # Errors
    ///
    /// Returns [`XferError::InvalidUtf8`] if loaded bytes are not UTF-8.
    fn xfer_string(&mut self, value: &mut String) -> XferResult<()> {
        let mut len = value.len();
        self.xfer_len(&mut len)?;

        if self.is_loading() {
            let mut bytes = vec![0u8; len];
            self.xfer_bytes(&mut bytes)?;
            *value = String::from_utf8(bytes).map_err(|_| XferError::InvalidUtf8)?;
            return Ok(());
        }

        let mut bytes = std::mem::take(value).into_bytes();
        let result = self.xfer_bytes(&mut bytes);
        *value = String::from_utf8(bytes).map_err(|_| XferError::InvalidUtf8)?;
        result
    }

    /// Transfers a section label.
    ///
    /// Save and checksum modes emit the label; load mode reads it back and
    /// fails if it differs, which catches readers that drifted out of step.
    ///
    /// # Errors
    ///
    /// Returns [`XferError::MarkerMismatch`] when loading a different label.
    fn xfer_marker(&mut self, label: &str) -> XferResult<()> {
        let mut found = if self.is_loading() {
            String::new()
        } else {
            label.to_owned()
        };
        self.xfer_string(&mut found)?;
        if found != label {
            return Err(XferError::MarkerMismatch {
                expected: label.to_owned(),
                found,
            });
        }
        Ok(())
    }
}
