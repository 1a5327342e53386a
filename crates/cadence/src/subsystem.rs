//! # Subsystems
//!
//! Session-wide logic that is not attached to any one object: scripts,
//! terrain, pathfinding, spatial indexes, victory checks. Each runs once per
//! frame in its phase and is saved and checksummed with the world.

use cadence_core::{FrameContext, KernelResult};
use cadence_xfer::Snapshot;

/// When in the frame a subsystem runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    /// Before any object updates.
    Script,
    /// After scripts, before the checksum.
    Terrain,
    /// After the destruction sweep.
    Auxiliary,
}

/// A named, saved piece of session logic.
///
/// Names must be unique within a session and stable across builds: they
/// key the subsystem's save block.
pub trait Subsystem: Snapshot {
    /// Stable name.
    fn name(&self) -> &'static str;

    /// Phase this subsystem runs in.
    fn phase(&self) -> Phase;

    /// Runs once per frame. The context has no running behavior.
    ///
    /// # Errors
    ///
    /// Kernel errors from operations the subsystem performs.
    fn update(&mut self, ctx: &mut FrameContext<'_>) -> KernelResult<()>;
}
