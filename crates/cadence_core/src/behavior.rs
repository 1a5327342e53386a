//! # Behavior Contracts
//!
//! What the kernel consumes from gameplay code:
//! - [`UpdateBehavior`]: per-frame logic that chooses its own next wake
//! - [`Capability`]: a passive part of an object looked up by kind
//! - [`ModuleSource`]: rebuilds either of them from a persisted tag

use cadence_xfer::Snapshot;

use crate::clock::{Frame, FOREVER};
use crate::context::FrameContext;
use crate::id::ObjectId;

// =============================================================================
// SLEEP AND WAKE
// =============================================================================

/// What an update asks for after it has run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateSleep {
    /// Run again next frame.
    None,
    /// Sleep this many frames. `Frames(0)` is treated as [`UpdateSleep::None`].
    Frames(u32),
    /// Sleep until explicitly woken.
    Forever,
}

impl UpdateSleep {
    /// Resolves the sleep into an absolute wake frame.
    #[inline]
    #[must_use]
    pub const fn wake_frame(self, now: Frame) -> Frame {
        match self {
            Self::None | Self::Frames(0) => now.saturating_add(1),
            Self::Frames(n) => now.saturating_add(n as Frame),
            Self::Forever => FOREVER,
        }
    }
}

/// A wake frame requested from outside the behavior itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WakeRequest {
    /// As soon as possible: the frame after the current one.
    Asap,
    /// An absolute frame.
    At(Frame),
    /// A number of frames from now.
    After(u32),
    /// Never, until woken again.
    Forever,
}

impl WakeRequest {
    /// Resolves the request against the current frame.
    #[inline]
    #[must_use]
    pub const fn resolve(self, now: Frame) -> Frame {
        match self {
            Self::Asap => now.saturating_add(1),
            Self::At(frame) => frame,
            Self::After(n) => now.saturating_add(n as Frame),
            Self::Forever => FOREVER,
        }
    }
}

/// How a behavior is scheduled when its object is registered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Schedule {
    /// Runs every frame from the always-run list, never enters the heap.
    EveryFrame {
        /// Order among always-run behaviors.
        priority: u32,
    },
    /// Sleeps in the heap until its wake frame.
    Sleepy {
        /// First wake frame.
        wake: WakeRequest,
        /// Tie-break among behaviors due the same frame; lower runs first.
        priority: u32,
    },
}

impl Schedule {
    /// A behavior that never sleeps.
    #[inline]
    #[must_use]
    pub const fn every_frame(priority: u32) -> Self {
        Self::EveryFrame { priority }
    }

    /// A sleepy behavior first woken at `frame`.
    #[inline]
    #[must_use]
    pub const fn at(frame: Frame, priority: u32) -> Self {
        Self::Sleepy {
            wake: WakeRequest::At(frame),
            priority,
        }
    }

    /// A sleepy behavior first woken on the next frame.
    #[inline]
    #[must_use]
    pub const fn asap(priority: u32) -> Self {
        Self::Sleepy {
            wake: WakeRequest::Asap,
            priority,
        }
    }

    /// A sleepy behavior that waits to be woken.
    #[inline]
    #[must_use]
    pub const fn dormant(priority: u32) -> Self {
        Self::Sleepy {
            wake: WakeRequest::Forever,
            priority,
        }
    }

    /// Returns the tie-break priority.
    #[inline]
    #[must_use]
    pub const fn priority(self) -> u32 {
        match self {
            Self::EveryFrame { priority } | Self::Sleepy { priority, .. } => priority,
        }
    }
}

// =============================================================================
// DISABLED STATUS
// =============================================================================

/// Reasons an object can be disabled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum DisabledKind {
    /// Held in place by a script or a transport.
    Held = 0,
    /// Electromagnetic pulse.
    Emp = 1,
    /// Not enough power.
    Underpowered = 2,
    /// Paralyzed by a weapon.
    Paralyzed = 3,
    /// Taken over by a hacker.
    Hacked = 4,
    /// Subdued by non-lethal damage.
    Subdued = 5,
    /// Disabled by a script.
    Scripted = 6,
    /// No crew aboard.
    Unmanned = 7,
}

impl DisabledKind {
    /// Every kind, in bit order.
    pub const ALL: [Self; 8] = [
        Self::Held,
        Self::Emp,
        Self::Underpowered,
        Self::Paralyzed,
        Self::Hacked,
        Self::Subdued,
        Self::Scripted,
        Self::Unmanned,
    ];

    /// Returns the kind for a persisted bit number.
    #[must_use]
    pub fn from_bit(bit: u8) -> Option<Self> {
        Self::ALL.get(usize::from(bit)).copied()
    }
}

/// Set of [`DisabledKind`]s.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct DisabledMask(u32);

impl DisabledMask {
    /// No kinds.
    pub const EMPTY: Self = Self(0);

    /// Builds a mask from raw bits.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Builds a mask holding a single kind.
    #[inline]
    #[must_use]
    pub const fn of(kind: DisabledKind) -> Self {
        Self(1 << kind as u32)
    }

    /// Returns the raw bits.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns true if no kind is set.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns true if `kind` is set.
    #[inline]
    #[must_use]
    pub const fn contains(self, kind: DisabledKind) -> bool {
        self.0 & (1 << kind as u32) != 0
    }

    /// Returns true if the two masks share any kind.
    #[inline]
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Returns this mask with `kind` added.
    #[inline]
    #[must_use]
    pub const fn with(self, kind: DisabledKind) -> Self {
        Self(self.0 | (1 << kind as u32))
    }

    /// Adds `kind`.
    #[inline]
    pub fn insert(&mut self, kind: DisabledKind) {
        self.0 |= 1 << kind as u32;
    }

    /// Removes `kind`.
    #[inline]
    pub fn remove(&mut self, kind: DisabledKind) {
        self.0 &= !(1 << kind as u32);
    }
}

// =============================================================================
// UPDATE BEHAVIOR
// =============================================================================

/// Per-frame logic owned by exactly one object.
///
/// The value returned from [`UpdateBehavior::update`] is the only way a
/// running behavior reschedules itself; asking the kernel to awaken the
/// running behavior is rejected.
pub trait UpdateBehavior: Snapshot {
    /// Stable tag used to rebuild this behavior when loading.
    fn type_tag(&self) -> &'static str;

    /// Runs one update and says when to run next.
    fn update(&mut self, ctx: &mut FrameContext<'_>) -> UpdateSleep;

    /// Disabled kinds during which this behavior still runs.
    ///
    /// While the owning object is disabled for a kind outside this mask the
    /// behavior is skipped and retried next frame; it keeps its place in
    /// the schedule.
    fn disabled_types_to_process(&self) -> DisabledMask {
        DisabledMask::EMPTY
    }
}

// =============================================================================
// CAPABILITIES
// =============================================================================

/// Kind key of a capability; an object holds at most one per kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CapabilityKind {
    /// Current AI goal.
    Goal,
    /// Current movement path.
    Path,
    /// Contains other objects.
    Container,
    /// Upgrades applied to the object.
    Upgrade,
    /// Hit points.
    Health,
    /// Game-specific capability.
    Custom(u16),
}

/// A passive piece of an object, found by kind instead of by cast.
pub trait Capability: Snapshot {
    /// Which slot this capability occupies.
    fn kind(&self) -> CapabilityKind;

    /// Stable tag used to rebuild this capability when loading.
    fn type_tag(&self) -> &'static str;

    /// Drops in-progress goal or path state when the owner is destroyed.
    fn detach(&mut self) {}

    /// Runs once when the owner is marked destroyed.
    fn on_destroy(&mut self, _owner: ObjectId) {}

    /// Runs during the sweep, just before the owner is freed.
    ///
    /// Objects pushed onto `cascade` are destroyed in the same sweep.
    fn on_removed(&mut self, _owner: ObjectId, _cascade: &mut Vec<ObjectId>) {}
}

/// Rebuilds behaviors and capabilities from their persisted tags.
pub trait ModuleSource {
    /// Creates an empty behavior for `tag`, ready to be loaded into.
    fn behavior(&self, tag: &str) -> Option<Box<dyn UpdateBehavior>>;

    /// Creates an empty capability for `tag`, ready to be loaded into.
    fn capability(&self, tag: &str) -> Option<Box<dyn Capability>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_sleep_means_next_frame() {
        assert_eq!(UpdateSleep::Frames(0).wake_frame(10), 11);
        assert_eq!(UpdateSleep::None.wake_frame(10), 11);
        assert_eq!(UpdateSleep::Frames(5).wake_frame(10), 15);
        assert_eq!(UpdateSleep::Forever.wake_frame(10), FOREVER);
    }

    #[test]
    fn test_wake_request_resolution() {
        assert_eq!(WakeRequest::Asap.resolve(4), 5);
        assert_eq!(WakeRequest::At(9).resolve(4), 9);
        assert_eq!(WakeRequest::After(3).resolve(4), 7);
        assert_eq!(WakeRequest::Forever.resolve(4), FOREVER);
    }

    #[test]
    fn test_disabled_mask() {
        let mut mask = DisabledMask::EMPTY;
        assert!(mask.is_empty());

        mask.insert(DisabledKind::Emp);
        assert!(mask.contains(DisabledKind::Emp));
        assert!(mask.intersects(DisabledMask::of(DisabledKind::Emp).with(DisabledKind::Held)));
        assert!(!mask.intersects(DisabledMask::of(DisabledKind::Held)));

        mask.remove(DisabledKind::Emp);
        assert!(mask.is_empty());
    }

    #[test]
    fn test_disabled_kind_bits_roundtrip() {
        for kind in DisabledKind::ALL {
            assert_eq!(DisabledKind::from_bit(kind as u8), Some(kind));
        }
        assert_eq!(DisabledKind::from_bit(8), None);
    }
}
