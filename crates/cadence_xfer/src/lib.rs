//! # Cadence Xfer
//!
//! Mode-polymorphic state transfer for the simulation kernel:
//! - One `xfer` routine per type, used for save, load and checksum
//! - Versioned snapshots with forward-compatible block skipping
//! - Sealed save files with a CRC-protected payload
//!
//! ## Example
//!
//! ```rust
//! use cadence_xfer::{Xfer, XferCrc, XferLoad, XferSave};
//!
//! let mut health = 250u32;
//!
//! let mut save = XferSave::new();
//! save.xfer_u32(&mut health).unwrap();
//! let bytes = save.into_bytes().unwrap();
//!
//! let mut restored = 0u32;
//! XferLoad::new(&bytes).xfer_u32(&mut restored).unwrap();
//! assert_eq!(restored, health);
//!
//! let mut crc = XferCrc::new();
//! crc.xfer_u32(&mut health).unwrap();
//! assert_eq!(crc.checksum(), crc32fast::hash(&bytes));
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod crc;
pub mod error;
pub mod file;
pub mod load;
pub mod save;
pub mod snapshot;
pub mod xfer;

pub use crc::XferCrc;
pub use error::{XferError, XferResult};
pub use file::{
    read_blocks, seal, unseal, write_block, write_eof, BlockResolver, SaveHeader, EOF_TOKEN,
    SAVE_FORMAT_VERSION, SAVE_MAGIC,
};
pub use load::XferLoad;
pub use save::XferSave;
pub use snapshot::Snapshot;
pub use xfer::{Xfer, XferMode, XferVersion};
