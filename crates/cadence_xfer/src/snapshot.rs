//! # Snapshot Contract
//!
//! Anything whose state must survive a save or take part in a checksum
//! implements [`Snapshot`].

use crate::error::XferResult;
use crate::xfer::Xfer;

/// A versioned, transferable piece of simulation state.
///
/// Implementations write a version byte first (see
/// [`Xfer::xfer_version`]) and branch on it when loading older data.
///
/// # Example
///
/// ```rust
/// use cadence_xfer::{Snapshot, Xfer, XferResult, XferVersion};
///
/// struct Ammo { rounds: u32, reloading: bool }
///
/// impl Snapshot for Ammo {
///     fn xfer(&mut self, xfer: &mut dyn Xfer) -> XferResult<()> {
///         const CURRENT: XferVersion = 2;
///         let mut version = CURRENT;
///         xfer.xfer_version(&mut version, CURRENT)?;
///         xfer.xfer_u32(&mut self.rounds)?;
///         if version >= 2 {
///             xfer.xfer_bool(&mut self.reloading)?;
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Snapshot {
    /// Transfers this value through `xfer` in the stream's mode.
    ///
    /// # Errors
    ///
    /// Propagates stream and version errors.
    fn xfer(&mut self, xfer: &mut dyn Xfer) -> XferResult<()>;

    /// Fixes up derived state once every snapshot of a load has been read.
    ///
    /// # Errors
    ///
    /// Returns an error if the loaded state is inconsistent.
    fn load_post_process(&mut self) -> XferResult<()> {
        Ok(())
    }
}
