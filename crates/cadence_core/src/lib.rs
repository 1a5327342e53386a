//! # Cadence Core
//!
//! Deterministic frame-stepped simulation kernel:
//! - Logical frame clock with no wall-clock dependency
//! - Sleepy update scheduling on a binary min-heap keyed by wake frame
//! - Deferred destruction swept once at the end of each frame
//! - Whole-world state transfer for saves and lockstep checksums
//!
//! ## Architecture Rules
//!
//! 1. **Same inputs, same frames** - Iteration order is always total
//! 2. **Nothing is freed mid-frame** - Destroyed objects stay findable until the sweep
//! 3. **One traversal** - Save, load and checksum share each type's `xfer`
//!
//! ## Example
//!
//! ```rust,ignore
//! use cadence_core::{ObjectBlueprint, Schedule, World, WorldSettings};
//!
//! let mut world = World::new(WorldSettings::default());
//! let id = world.spawn(ObjectBlueprint::new("tank").with_behavior(ai, Schedule::asap(0)))?;
//! world.advance_frame();
//! world.run_sleepy_updates()?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod behavior;
pub mod clock;
pub mod context;
pub mod destruction;
pub mod error;
pub mod id;
pub mod object;
pub mod random;
pub mod registry;
pub mod scheduler;
pub mod world;

#[cfg(test)]
pub(crate) mod testing;

pub use behavior::{
    Capability, CapabilityKind, DisabledKind, DisabledMask, ModuleSource, Schedule,
    UpdateBehavior, UpdateSleep, WakeRequest,
};
pub use clock::{Frame, FrameClock, FOREVER};
pub use context::FrameContext;
pub use destruction::DestructionQueue;
pub use error::{KernelError, KernelResult};
pub use id::{BehaviorRef, ObjectHandle, ObjectId};
pub use object::{ObjectBlueprint, SimulationObject};
pub use random::LogicRandom;
pub use registry::{UpdatableRegistry, DEFAULT_ID_TABLE_CAPACITY, MAX_OBJECT_ID};
pub use scheduler::{AlwaysRunList, ScheduledEntry, SleepyScheduler, UpdateTicket};
pub use world::{World, WorldSettings};
