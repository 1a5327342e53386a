//! # Frame Context
//!
//! What a running behavior or subsystem may touch during a frame. Every
//! mutation of the world during a frame goes through here.

use tracing::error;

use crate::behavior::WakeRequest;
use crate::clock::Frame;
use crate::error::{KernelError, KernelResult};
use crate::id::{BehaviorRef, ObjectId};
use crate::object::{ObjectBlueprint, SimulationObject};
use crate::random::LogicRandom;
use crate::world::World;

/// Mutable view of the world for the duration of one update.
pub struct FrameContext<'a> {
    /// The world being stepped.
    world: &'a mut World,
    /// Behavior whose update is running, if any.
    running: Option<BehaviorRef>,
}

impl<'a> FrameContext<'a> {
    pub(crate) fn new(world: &'a mut World, running: Option<BehaviorRef>) -> Self {
        Self { world, running }
    }

    /// Returns the frame being processed.
    #[inline]
    #[must_use]
    pub fn frame(&self) -> Frame {
        self.world.now()
    }

    /// Returns the behavior whose update is running.
    #[inline]
    #[must_use]
    pub const fn running(&self) -> Option<BehaviorRef> {
        self.running
    }

    /// Returns the object that owns the running behavior.
    #[inline]
    #[must_use]
    pub fn owner(&self) -> Option<ObjectId> {
        self.running.map(|running| running.object)
    }

    /// Finds an object. Objects destroyed this frame are still found.
    #[must_use]
    pub fn object(&self, id: ObjectId) -> Option<&SimulationObject> {
        self.world.find(id)
    }

    /// Finds an object for modification.
    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut SimulationObject> {
        self.world.find_mut(id)
    }

    /// Iterates the global collection in id order.
    pub fn objects(&self) -> impl Iterator<Item = &SimulationObject> + '_ {
        self.world.objects()
    }

    /// Returns the logic random stream.
    #[inline]
    pub fn random(&mut self) -> &mut LogicRandom {
        self.world.random_mut()
    }

    /// Registers a new object.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::WakeInPast`] if a behavior asks for a frame
    /// before the current one.
    pub fn spawn(&mut self, blueprint: ObjectBlueprint) -> KernelResult<ObjectId> {
        self.world.spawn(blueprint).map_err(|e| {
            error!("Spawn rejected on frame {}: {}", self.world.now(), e);
            e
        })
    }

    /// Marks an object destroyed; it is freed at the end of the frame.
    ///
    /// Returns `Ok(false)` if it was already marked.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::NotRegistered`] for an unknown id.
    pub fn destroy(&mut self, id: ObjectId) -> KernelResult<bool> {
        self.world.destroy(id)
    }

    /// Moves another behavior's wake frame.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::AwakenWhileRunning`] if `target` is the running
    /// behavior; its return value is how it reschedules itself.
    pub fn awaken(&mut self, target: BehaviorRef, request: WakeRequest) -> KernelResult<bool> {
        if self.running == Some(target) {
            let err = KernelError::AwakenWhileRunning(target);
            error!("{}", err);
            return Err(err);
        }
        self.world.awaken(target, request).map_err(|e| {
            error!("Awaken of {} failed: {}", target, e);
            e
        })
    }
}
