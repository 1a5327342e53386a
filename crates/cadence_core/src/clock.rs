//! # Frame Clock
//!
//! Logical time. One frame is one pass of the kernel; nothing here knows
//! about wall-clock time.

use cadence_xfer::{Snapshot, Xfer, XferResult};

use crate::error::{KernelError, KernelResult};

/// Logical frame number.
pub type Frame = u64;

/// Wake frame meaning "not until explicitly woken".
pub const FOREVER: Frame = Frame::MAX;

/// Owns the monotonically increasing frame counter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameClock {
    /// Current frame.
    frame: Frame,
}

impl FrameClock {
    /// Creates a clock at frame 0.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self { frame: 0 }
    }

    /// Returns the current frame.
    #[inline]
    #[must_use]
    pub const fn now(&self) -> Frame {
        self.frame
    }

    /// Advances to the next frame and returns it.
    #[inline]
    pub fn advance(&mut self) -> Frame {
        self.frame += 1;
        self.frame
    }

    /// Moves the clock forward to `frame`.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::FrameRegression`] if `frame` is earlier than now.
    pub fn jump_to(&mut self, frame: Frame) -> KernelResult<()> {
        if frame < self.frame {
            return Err(KernelError::FrameRegression {
                from: self.frame,
                to: frame,
            });
        }
        self.frame = frame;
        Ok(())
    }

    /// Resolves a relative sleep into an absolute wake frame.
    ///
    /// Saturates at [`FOREVER`].
    #[inline]
    #[must_use]
    pub const fn after(&self, frames: u32) -> Frame {
        self.frame.saturating_add(frames as Frame)
    }
}

impl Snapshot for FrameClock {
    fn xfer(&mut self, xfer: &mut dyn Xfer) -> XferResult<()> {
        xfer.xfer_u64(&mut self.frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances() {
        let mut clock = FrameClock::new();
        assert_eq!(clock.now(), 0);
        assert_eq!(clock.advance(), 1);
        assert_eq!(clock.advance(), 2);
        assert_eq!(clock.after(3), 5);
    }

    #[test]
    fn test_clock_never_regresses() {
        let mut clock = FrameClock::new();
        clock.jump_to(10).unwrap();
        assert_eq!(
            clock.jump_to(9),
            Err(KernelError::FrameRegression { from: 10, to: 9 })
        );
        assert_eq!(clock.now(), 10);
    }

    #[test]
    fn test_after_saturates() {
        let mut clock = FrameClock::new();
        clock.jump_to(FOREVER - 1).unwrap();
        assert_eq!(clock.after(u32::MAX), FOREVER);
    }
}
