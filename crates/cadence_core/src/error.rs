//! # Kernel Error Types
//!
//! Logic errors: a caller asked the kernel to do something that would
//! break one of its invariants. They are returned, never swallowed.

use thiserror::Error;

use crate::clock::Frame;
use crate::id::{BehaviorRef, ObjectId};

/// Errors raised when kernel invariants would be violated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    /// A wake frame earlier than the current frame was requested.
    #[error("wake frame {requested} is in the past (now {now})")]
    WakeInPast {
        /// Frame that was requested.
        requested: Frame,
        /// Current frame.
        now: Frame,
    },

    /// A behavior tried to reschedule itself from inside its own update.
    #[error("{0} attempted to awaken itself while running")]
    AwakenWhileRunning(BehaviorRef),

    /// An object with this id is already registered.
    #[error("object {0} is already registered")]
    AlreadyRegistered(ObjectId),

    /// The id is above the highest id the registry can index.
    #[error("object id {0} is beyond the id space")]
    IdSpaceExhausted(ObjectId),

    /// No registered object has this id.
    #[error("object {0} is not registered")]
    NotRegistered(ObjectId),

    /// An object was unregistered without first being marked destroyed.
    #[error("object {0} must be destroyed before it is unregistered")]
    NotDestroyed(ObjectId),

    /// The behavior reference does not resolve to a behavior.
    #[error("unknown behavior {0}")]
    UnknownBehavior(BehaviorRef),

    /// A scheduler ticket was used after it was released.
    #[error("scheduler ticket {0} is not allocated")]
    UnknownTicket(u32),

    /// The behavior is not currently in the sleepy heap.
    #[error("{0} is not in the sleepy heap")]
    NotScheduled(BehaviorRef),

    /// The behavior is already in the sleepy heap.
    #[error("{0} is already in the sleepy heap")]
    AlreadyScheduled(BehaviorRef),

    /// A heap node is out of order or its recorded index is stale.
    #[error("scheduler heap corrupted at index {index}: {reason}")]
    HeapCorrupted {
        /// Heap position where the violation was found.
        index: usize,
        /// What was wrong.
        reason: &'static str,
    },

    /// The frame clock was asked to move backwards.
    #[error("frame regression: {from} -> {to}")]
    FrameRegression {
        /// Current frame.
        from: Frame,
        /// Requested frame.
        to: Frame,
    },
}

/// Result type for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;
