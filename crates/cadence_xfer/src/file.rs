//! # Save File Framing
//!
//! ## Format
//!
//! ```text
//! [32 bytes: SaveHeader]
//!   [4 bytes: magic "CDNC"]
//!   [4 bytes: format version]
//!   [8 bytes: frame the save was taken on]
//!   [8 bytes: payload length]
//!   [4 bytes: CRC32 of payload]
//!   [4 bytes: reserved]
//! [payload]
//!   repeated: [string: block name][u32: block size][block bytes]
//!   [string: "SG_EOF"]
//! ```
//!
//! Blocks whose name the reader does not recognize are skipped, so a file
//! written by a build with an extra subsystem still loads.

use bytemuck::{Pod, Zeroable};

use crate::error::{XferError, XferResult};
use crate::snapshot::Snapshot;
use crate::xfer::Xfer;

/// Magic bytes identifying a save file.
pub const SAVE_MAGIC: [u8; 4] = *b"CDNC";

/// Current save file format version.
pub const SAVE_FORMAT_VERSION: u32 = 1;

/// Token terminating the block list.
pub const EOF_TOKEN: &str = "SG_EOF";

/// Fixed-layout save file header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct SaveHeader {
    /// Must equal [`SAVE_MAGIC`].
    pub magic: [u8; 4],
    /// Format version of the framing (not of individual blocks).
    pub format_version: u32,
    /// Logic frame the save was taken on.
    pub frame: u64,
    /// Length of the payload following the header.
    pub payload_len: u64,
    /// CRC32 of the payload.
    pub payload_crc: u32,
    /// Reserved, always zero.
    pub reserved: u32,
}

impl SaveHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Creates a header describing `payload`.
    #[must_use]
    pub fn describe(frame: u64, payload: &[u8]) -> Self {
        Self {
            magic: SAVE_MAGIC,
            format_version: SAVE_FORMAT_VERSION,
            frame,
            payload_len: payload.len() as u64,
            payload_crc: crc32fast::hash(payload),
            reserved: 0,
        }
    }
}

/// Prefixes `payload` with a header, producing a complete save file.
#[must_use]
pub fn seal(frame: u64, payload: &[u8]) -> Vec<u8> {
    let header = SaveHeader::describe(frame, payload);
    let mut bytes = Vec::with_capacity(SaveHeader::SIZE + payload.len());
    bytes.extend_from_slice(bytemuck::bytes_of(&header));
    bytes.extend_from_slice(payload);
    bytes
}

/// Validates a save file and returns its header and payload.
///
/// # Errors
///
/// Returns [`XferError::InvalidHeader`] for a short file, wrong magic, newer
/// format or wrong length, and [`XferError::PayloadChecksum`] when the
/// payload was corrupted.
pub fn unseal(bytes: &[u8]) -> XferResult<(SaveHeader, &[u8])> {
    if bytes.len() < SaveHeader::SIZE {
        return Err(XferError::InvalidHeader(format!(
            "file is {} bytes, header needs {}",
            bytes.len(),
            SaveHeader::SIZE
        )));
    }

    let header: SaveHeader = bytemuck::try_pod_read_unaligned(&bytes[..SaveHeader::SIZE])
        .map_err(|e| XferError::InvalidHeader(e.to_string()))?;

    if header.magic != SAVE_MAGIC {
        return Err(XferError::InvalidHeader("bad magic".to_owned()));
    }
    if header.format_version > SAVE_FORMAT_VERSION {
        return Err(XferError::InvalidHeader(format!(
            "format version {} is newer than {}",
            header.format_version, SAVE_FORMAT_VERSION
        )));
    }

    let payload = &bytes[SaveHeader::SIZE..];
    if payload.len() as u64 != header.payload_len {
        return Err(XferError::InvalidHeader(format!(
            "payload is {} bytes, header says {}",
            payload.len(),
            header.payload_len
        )));
    }

    let computed = crc32fast::hash(payload);
    if computed != header.payload_crc {
        return Err(XferError::PayloadChecksum {
            stored: header.payload_crc,
            computed,
        });
    }

    Ok((header, payload))
}

/// Writes one named block.
///
/// # Errors
///
/// Propagates errors from the snapshot.
pub fn write_block(xfer: &mut dyn Xfer, name: &str, snapshot: &mut dyn Snapshot) -> XferResult<()> {
    let mut token = name.to_owned();
    xfer.xfer_string(&mut token)?;
    xfer.begin_block()?;
    snapshot.xfer(xfer)?;
    xfer.end_block()
}

/// Writes the end-of-blocks token.
///
/// # Errors
///
/// Propagates stream errors.
pub fn write_eof(xfer: &mut dyn Xfer) -> XferResult<()> {
    let mut token = EOF_TOKEN.to_owned();
    xfer.xfer_string(&mut token)
}

/// Maps block names to the snapshots that should receive them.
pub trait BlockResolver {
    /// Returns the snapshot for `name`, or `None` to skip the block.
    fn resolve(&mut self, name: &str) -> Option<&mut dyn Snapshot>;
}

/// Reads blocks until the EOF token, dispatching each through `resolver`.
///
/// Returns the names of the blocks that were loaded, in file order.
///
/// # Errors
///
/// Fails on the first malformed block; blocks already read are not rolled back,
/// so callers load into scratch state.
pub fn read_blocks(xfer: &mut dyn Xfer, resolver: &mut dyn BlockResolver) -> XferResult<Vec<String>> {
    let mut loaded = Vec::new();

    loop {
        let mut token = String::new();
        xfer.xfer_string(&mut token)?;
        if token == EOF_TOKEN {
            break;
        }

        let size = xfer.begin_block()?;
        match resolver.resolve(&token) {
            Some(snapshot) => snapshot.xfer(xfer)?,
            None => {
                tracing::warn!("Skipping unknown save block '{}' ({} bytes)", token, size);
                xfer.skip(size)?;
            }
        }
        xfer.end_block()?;
        loaded.push(token);
    }

    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::XferLoad;
    use crate::save::XferSave;

    struct Counter(u32);

    impl Snapshot for Counter {
        fn xfer(&mut self, xfer: &mut dyn Xfer) -> XferResult<()> {
            xfer.xfer_u32(&mut self.0)
        }
    }

    struct OnlyCounter<'a>(&'a mut Counter);

    impl BlockResolver for OnlyCounter<'_> {
        fn resolve(&mut self, name: &str) -> Option<&mut dyn Snapshot> {
            (name == "Counter").then_some(&mut *self.0 as &mut dyn Snapshot)
        }
    }

    #[test]
    fn test_header_is_32_bytes() {
        assert_eq!(SaveHeader::SIZE, 32);
    }

    #[test]
    fn test_seal_unseal() {
        let sealed = seal(77, b"payload");
        let (header, payload) = unseal(&sealed).unwrap();
        assert_eq!(header.frame, 77);
        assert_eq!(payload, b"payload");
    }

    #[test]
    fn test_corrupted_payload_detected() {
        let mut sealed = seal(1, b"payload");
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;
        assert!(matches!(unseal(&sealed), Err(XferError::PayloadChecksum { .. })));
    }

    #[test]
    fn test_bad_magic_detected() {
        let mut sealed = seal(1, b"x");
        sealed[0] = b'X';
        assert!(matches!(unseal(&sealed), Err(XferError::InvalidHeader(_))));
        assert!(matches!(unseal(&sealed[..8]), Err(XferError::InvalidHeader(_))));
    }

    #[test]
    fn test_unknown_blocks_are_skipped() {
        let mut save = XferSave::new();
        write_block(&mut save, "Retired", &mut Counter(5)).unwrap();
        write_block(&mut save, "Counter", &mut Counter(9)).unwrap();
        write_eof(&mut save).unwrap();
        let bytes = save.into_bytes().unwrap();

        let mut target = Counter(0);
        let mut load = XferLoad::new(&bytes);
        let loaded = read_blocks(&mut load, &mut OnlyCounter(&mut target)).unwrap();

        assert_eq!(target.0, 9);
        assert_eq!(loaded, vec!["Retired".to_owned(), "Counter".to_owned()]);
        assert_eq!(load.remaining(), 0);
    }
}
