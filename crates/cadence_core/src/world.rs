//! # World
//!
//! Everything one simulation owns, bundled so several simulations can exist
//! side by side. The world knows how to run each stage of a frame; the
//! order of the stages belongs to whoever drives it.
//!
//! ## Stages
//!
//! ```text
//! advance_frame ─► run_always_list ─► run_sleepy_updates ─► sweep ─► expire_disabled
//! ```

use cadence_xfer::{Snapshot, Xfer, XferError, XferResult, XferVersion};
use tracing::trace;

use crate::behavior::{ModuleSource, UpdateSleep, WakeRequest};
use crate::clock::{Frame, FrameClock, FOREVER};
use crate::context::FrameContext;
use crate::destruction::DestructionQueue;
use crate::error::{KernelError, KernelResult};
use crate::id::{BehaviorRef, ObjectId};
use crate::object::{ObjectBlueprint, SimulationObject};
use crate::random::LogicRandom;
use crate::registry::{UpdatableRegistry, DEFAULT_ID_TABLE_CAPACITY, MAX_OBJECT_ID};
use crate::scheduler::SleepyScheduler;

/// Persisted layout version of the world state.
const WORLD_VERSION: XferVersion = 1;

/// Construction parameters of a [`World`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorldSettings {
    /// Initial size of the id lookup table.
    pub id_table_capacity: usize,
    /// Seed of the logic random stream.
    pub random_seed: u64,
    /// Sweep rebuilds the heap when removing more than `len / ratio` entries.
    pub batch_rebuild_ratio: u32,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            id_table_capacity: DEFAULT_ID_TABLE_CAPACITY,
            random_seed: 0,
            batch_rebuild_ratio: 2,
        }
    }
}

/// Result of offering one behavior its update.
enum RunOutcome {
    /// The update ran and asked for this sleep.
    Ran(UpdateSleep),
    /// The object is disabled for a kind the behavior does not process.
    Disabled,
    /// The object is marked destroyed.
    Inert,
}

/// One simulation: clock, objects, scheduler, pending destruction, randomness.
#[derive(Debug)]
pub struct World {
    /// Logical time.
    clock: FrameClock,
    /// Object owner.
    registry: UpdatableRegistry,
    /// Sleepy heap and always-run list.
    scheduler: SleepyScheduler,
    /// Objects awaiting the sweep.
    destruction: DestructionQueue,
    /// Logic randomness.
    random: LogicRandom,
    /// Construction parameters.
    settings: WorldSettings,
}

impl World {
    /// Creates an empty world at frame 0.
    #[must_use]
    pub fn new(settings: WorldSettings) -> Self {
        Self {
            clock: FrameClock::new(),
            registry: UpdatableRegistry::new(settings.id_table_capacity),
            scheduler: SleepyScheduler::new(),
            destruction: DestructionQueue::new(),
            random: LogicRandom::new(settings.random_seed),
            settings,
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Returns the current frame.
    #[inline]
    #[must_use]
    pub const fn now(&self) -> Frame {
        self.clock.now()
    }

    /// Returns the construction parameters.
    #[inline]
    #[must_use]
    pub const fn settings(&self) -> &WorldSettings {
        &self.settings
    }

    /// Returns the registry.
    #[inline]
    #[must_use]
    pub const fn registry(&self) -> &UpdatableRegistry {
        &self.registry
    }

    /// Returns the scheduler.
    #[inline]
    #[must_use]
    pub const fn scheduler(&self) -> &SleepyScheduler {
        &self.scheduler
    }

    /// Returns the destruction queue.
    #[inline]
    #[must_use]
    pub const fn destruction(&self) -> &DestructionQueue {
        &self.destruction
    }

    /// Returns the logic random stream.
    #[inline]
    pub fn random_mut(&mut self) -> &mut LogicRandom {
        &mut self.random
    }

    /// Finds an object by id.
    #[inline]
    #[must_use]
    pub fn find(&self, id: ObjectId) -> Option<&SimulationObject> {
        self.registry.find(id)
    }

    /// Finds an object by id for modification.
    #[inline]
    pub fn find_mut(&mut self, id: ObjectId) -> Option<&mut SimulationObject> {
        self.registry.find_mut(id)
    }

    /// Iterates the global collection in id order.
    pub fn objects(&self) -> impl Iterator<Item = &SimulationObject> + '_ {
        self.registry.objects()
    }

    /// Returns the frame a behavior will next run on.
    ///
    /// `None` for always-run behaviors, which run every frame, and for
    /// behaviors that do not exist.
    #[must_use]
    pub fn next_call_frame(&self, owner: BehaviorRef) -> Option<Frame> {
        let ticket = self.registry.ticket(owner).ok()??;
        self.scheduler.wake_frame(ticket)
    }

    /// Opens a context with no running behavior, for subsystems and tests.
    pub fn context(&mut self) -> FrameContext<'_> {
        FrameContext::new(self, None)
    }

    // -------------------------------------------------------------------------
    // Object lifecycle
    // -------------------------------------------------------------------------

    /// Registers an object at the current frame.
    ///
    /// # Errors
    ///
    /// See [`UpdatableRegistry::register`].
    pub fn spawn(&mut self, blueprint: ObjectBlueprint) -> KernelResult<ObjectId> {
        self.registry
            .register(blueprint, &mut self.scheduler, self.clock.now())
    }

    /// Marks an object destroyed.
    ///
    /// # Errors
    ///
    /// See [`DestructionQueue::mark`].
    pub fn destroy(&mut self, id: ObjectId) -> KernelResult<bool> {
        self.destruction.mark(&mut self.registry, id)
    }

    /// Moves a sleepy behavior's wake frame.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::NotScheduled`] for always-run behaviors and
    /// behaviors that are running, and see [`SleepyScheduler::awaken`].
    pub fn awaken(&mut self, owner: BehaviorRef, request: WakeRequest) -> KernelResult<bool> {
        let ticket = self
            .registry
            .ticket(owner)?
            .ok_or(KernelError::NotScheduled(owner))?;
        let now = self.clock.now();
        self.scheduler.awaken(ticket, request.resolve(now), now)
    }

    // -------------------------------------------------------------------------
    // Frame stages
    // -------------------------------------------------------------------------

    /// Advances the clock and returns the new frame.
    pub fn advance_frame(&mut self) -> Frame {
        self.clock.advance()
    }

    fn run_behavior(&mut self, owner: BehaviorRef) -> KernelResult<RunOutcome> {
        let object = self
            .registry
            .find(owner.object)
            .ok_or(KernelError::NotRegistered(owner.object))?;
        if object.is_destroyed() {
            return Ok(RunOutcome::Inert);
        }
        let disabled = object.disabled();

        let mut behavior = self.registry.take_behavior(owner)?;
        if !disabled.is_empty() && !disabled.intersects(behavior.disabled_types_to_process()) {
            self.registry.restore_behavior(owner, behavior)?;
            return Ok(RunOutcome::Disabled);
        }

        let sleep = behavior.update(&mut FrameContext::new(self, Some(owner)));
        self.registry.restore_behavior(owner, behavior)?;
        Ok(RunOutcome::Ran(sleep))
    }

    /// Runs every always-run behavior once, in priority order.
    ///
    /// Returns the number of updates that ran.
    ///
    /// # Errors
    ///
    /// Fails if a listed behavior no longer resolves.
    pub fn run_always_list(&mut self) -> KernelResult<u32> {
        let mut ran = 0;
        for owner in self.scheduler.always_run().snapshot() {
            if let RunOutcome::Ran(_) = self.run_behavior(owner)? {
                ran += 1;
            }
        }
        Ok(ran)
    }

    /// Pops and runs every sleepy behavior due this frame.
    ///
    /// Each behavior goes back into the heap at the frame its update asked
    /// for. Skipped behaviors of disabled objects retry next frame; those of
    /// destroyed objects sleep until the sweep removes them. Returns the
    /// number of updates that ran.
    ///
    /// # Errors
    ///
    /// Fails if a heap entry no longer resolves to a behavior.
    pub fn run_sleepy_updates(&mut self) -> KernelResult<u32> {
        let now = self.clock.now();
        let mut ran = 0;

        while let Some(entry) = self.scheduler.pop_due(now) {
            let wake = match self.run_behavior(entry.owner) {
                Ok(RunOutcome::Ran(sleep)) => {
                    ran += 1;
                    sleep.wake_frame(now)
                }
                Ok(RunOutcome::Disabled) => now + 1,
                Ok(RunOutcome::Inert) => FOREVER,
                Err(e) => {
                    // A ticket its slot still holds stays idle until unregister releases it.
                    if self.registry.ticket(entry.owner).ok().flatten() != Some(entry.ticket) {
                        self.scheduler.remove(entry.ticket)?;
                    }
                    return Err(e);
                }
            };
            self.scheduler.reinsert(entry.ticket, wake)?;
        }
        Ok(ran)
    }

    /// Frees every object marked destroyed. Returns their ids.
    ///
    /// # Errors
    ///
    /// See [`DestructionQueue::sweep`].
    pub fn sweep(&mut self) -> KernelResult<Vec<ObjectId>> {
        self.destruction.sweep(
            &mut self.registry,
            &mut self.scheduler,
            self.settings.batch_rebuild_ratio,
        )
    }

    /// Lifts timed disabled status that has lapsed.
    pub fn expire_disabled(&mut self) -> usize {
        self.registry.expire_disabled(self.clock.now())
    }

    /// Checks the heap invariant.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::HeapCorrupted`] on violation.
    pub fn validate_scheduler(&self) -> KernelResult<()> {
        self.scheduler.validate()
    }

    // -------------------------------------------------------------------------
    // Persistence
    // -------------------------------------------------------------------------

    /// Writes the whole world in a fixed order: clock, objects by id,
    /// pending destruction, random stream.
    ///
    /// Used for both saving and checksumming.
    ///
    /// # Errors
    ///
    /// Fails on a load stream (use [`World::read_state`]) or if a behavior
    /// is mid-update.
    pub fn write_state(&mut self, xfer: &mut dyn Xfer) -> XferResult<()> {
        if xfer.is_loading() {
            return Err(XferError::Malformed(
                "world state is restored with World::read_state".to_owned(),
            ));
        }

        let mut version = WORLD_VERSION;
        xfer.xfer_version(&mut version, WORLD_VERSION)?;

        xfer.xfer_marker("Clock")?;
        self.clock.xfer(xfer)?;

        xfer.xfer_marker("Objects")?;
        let mut next_id = self.registry.next_id().raw();
        xfer.xfer_u64(&mut next_id)?;
        self.registry.write_objects(xfer, &self.scheduler)?;

        xfer.xfer_marker("Destruction")?;
        self.destruction.xfer(xfer)?;

        xfer.xfer_marker("Random")?;
        self.random.xfer(xfer)
    }

    /// Builds a new world from state written by [`World::write_state`].
    ///
    /// Nothing outside the returned world is touched, so a failed read
    /// leaves the caller's current world as it was.
    ///
    /// # Arguments
    ///
    /// * `xfer` - A load stream
    /// * `source` - Rebuilds behaviors and capabilities from their tags
    /// * `settings` - Construction parameters of the new world
    ///
    /// # Errors
    ///
    /// Any data error in the stream, an unknown tag, or records that
    /// contradict each other.
    pub fn read_state(
        xfer: &mut dyn Xfer,
        source: &dyn ModuleSource,
        settings: WorldSettings,
    ) -> XferResult<Self> {
        let mut world = Self::new(settings);

        let mut version = WORLD_VERSION;
        xfer.xfer_version(&mut version, WORLD_VERSION)?;

        xfer.xfer_marker("Clock")?;
        world.clock.xfer(xfer)?;
        let now = world.clock.now();

        xfer.xfer_marker("Objects")?;
        let mut next_id = 0u64;
        xfer.xfer_u64(&mut next_id)?;
        if next_id > MAX_OBJECT_ID + 1 {
            return Err(XferError::Malformed(format!(
                "next object id {next_id} is beyond the id space"
            )));
        }
        let mut count = 0usize;
        xfer.xfer_len(&mut count)?;
        for _ in 0..count {
            let (blueprint, destroyed) = SimulationObject::read_record(xfer, source)?;
            if let Some(id) = blueprint.id.filter(|id| id.raw() >= next_id) {
                return Err(XferError::Malformed(format!(
                    "{id} is not below the saved next id {next_id}"
                )));
            }
            let id = world
                .registry
                .register(blueprint, &mut world.scheduler, now)
                .map_err(|e| XferError::Malformed(e.to_string()))?;
            if destroyed {
                if let Some(object) = world.registry.find_mut(id) {
                    object.set_destroyed();
                }
            }
        }
        world.registry.restore_next_id(ObjectId::new(next_id));

        xfer.xfer_marker("Destruction")?;
        world.destruction.xfer(xfer)?;
        for &id in world.destruction.pending() {
            if !world.registry.find(id).is_some_and(SimulationObject::is_destroyed) {
                return Err(XferError::Malformed(format!(
                    "{id} is queued for destruction but not marked destroyed"
                )));
            }
        }

        xfer.xfer_marker("Random")?;
        world.random.xfer(xfer)?;

        world.registry.load_post_process()?;
        world
            .scheduler
            .validate()
            .map_err(|e| XferError::Malformed(e.to_string()))?;

        trace!("Restored world at frame {} with {} objects", now, world.registry.len());
        Ok(world)
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new(WorldSettings::default())
    }
}
