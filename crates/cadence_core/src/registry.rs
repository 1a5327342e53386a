//! # Updatable Registry
//!
//! Sole owner of every live object.
//!
//! ## Layout
//!
//! ```text
//! id_table[id] ──► ObjectHandle(index, generation) ──► slots[index].object
//! collection   : BTreeMap<ObjectId, ObjectHandle>   (iteration in id order)
//! ```
//!
//! - `find` is one table index plus one generation check.
//! - The id table doubles whenever a new id does not fit.
//! - Arena slots are reused through a free list; the generation changes on
//!   every reuse so stale handles resolve to nothing.

use std::collections::BTreeMap;

use cadence_xfer::{Xfer, XferError, XferResult};
use tracing::{debug, trace};

use crate::behavior::{Schedule, UpdateBehavior};
use crate::clock::Frame;
use crate::error::{KernelError, KernelResult};
use crate::id::{BehaviorRef, ObjectHandle, ObjectId};
use crate::object::{ObjectBlueprint, SimulationObject};
use crate::scheduler::{SleepyScheduler, UpdateTicket};

/// Default initial size of the id lookup table.
pub const DEFAULT_ID_TABLE_CAPACITY: usize = 8192;

/// Highest object id the registry will hand out or accept.
///
/// The id table is indexed directly by id, so this bounds its size.
pub const MAX_OBJECT_ID: u64 = 1 << 22;

/// One arena slot.
#[derive(Debug, Default)]
struct ObjectSlot {
    /// Bumped every time the slot is vacated.
    generation: u32,
    /// Occupant.
    object: Option<SimulationObject>,
}

/// Owns objects, hands out ids, and routes behaviors into the scheduler.
#[derive(Debug)]
pub struct UpdatableRegistry {
    /// Object arena.
    slots: Vec<ObjectSlot>,
    /// Vacant arena slots, reused LIFO.
    free_slots: Vec<u32>,
    /// Id to handle, indexed by raw id.
    id_table: Vec<Option<ObjectHandle>>,
    /// Every registered object in id order.
    collection: BTreeMap<ObjectId, ObjectHandle>,
    /// Next id to hand out.
    next_id: ObjectId,
}

impl Default for UpdatableRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_ID_TABLE_CAPACITY)
    }
}

impl UpdatableRegistry {
    /// Creates an empty registry.
    ///
    /// # Arguments
    ///
    /// * `id_table_capacity` - Initial size of the id lookup table
    #[must_use]
    pub fn new(id_table_capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            free_slots: Vec::new(),
            id_table: vec![None; id_table_capacity.max(1)],
            collection: BTreeMap::new(),
            next_id: ObjectId::FIRST,
        }
    }

    /// Returns the number of registered objects.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.collection.len()
    }

    /// Returns true if nothing is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.collection.is_empty()
    }

    /// Returns the id the next registration will receive.
    #[inline]
    #[must_use]
    pub const fn next_id(&self) -> ObjectId {
        self.next_id
    }

    /// Returns the current size of the id lookup table.
    #[inline]
    #[must_use]
    pub fn id_table_len(&self) -> usize {
        self.id_table.len()
    }

    // -------------------------------------------------------------------------
    // Registration
    // -------------------------------------------------------------------------

    /// Registers an object and schedules its behaviors.
    ///
    /// Every wake frame is checked before anything changes, so a rejected
    /// blueprint leaves the registry and scheduler untouched.
    ///
    /// # Arguments
    ///
    /// * `blueprint` - The object to register
    /// * `scheduler` - Receives the object's behaviors
    /// * `now` - Current frame; initial wake frames may not precede it
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::WakeInPast`] for a wake frame before `now`,
    /// [`KernelError::AlreadyRegistered`] if a fixed id is taken and
    /// [`KernelError::IdSpaceExhausted`] for an id above [`MAX_OBJECT_ID`].
    pub fn register(
        &mut self,
        blueprint: ObjectBlueprint,
        scheduler: &mut SleepyScheduler,
        now: Frame,
    ) -> KernelResult<ObjectId> {
        for (_, schedule) in &blueprint.behaviors {
            if let Schedule::Sleepy { wake, .. } = schedule {
                let requested = wake.resolve(now);
                if requested < now {
                    return Err(KernelError::WakeInPast { requested, now });
                }
            }
        }

        let id = match blueprint.id {
            Some(id) if !id.is_valid() => return Err(KernelError::NotRegistered(id)),
            Some(id) if self.contains(id) => return Err(KernelError::AlreadyRegistered(id)),
            Some(id) => id,
            None => self.next_id,
        };
        if id.raw() > MAX_OBJECT_ID {
            return Err(KernelError::IdSpaceExhausted(id));
        }
        if id >= self.next_id {
            self.next_id = id.next();
        }

        self.ensure_id_capacity(id);
        let handle = self.allocate_slot();

        let (mut object, schedules) = SimulationObject::from_blueprint(id, blueprint);
        for (module, (slot, schedule)) in object.behaviors.iter_mut().zip(schedules).enumerate() {
            let owner = BehaviorRef::new(id, module as u16);
            match schedule {
                Schedule::EveryFrame { priority } => {
                    scheduler.always_run_mut().insert(owner, priority);
                }
                Schedule::Sleepy { wake, priority } => {
                    slot.ticket = Some(scheduler.schedule(owner, wake.resolve(now), priority));
                }
            }
        }

        trace!("Registered {} '{}' in slot {}", id, object.name(), handle.index());
        self.slots[handle.index() as usize].object = Some(object);
        self.id_table[id.raw() as usize] = Some(handle);
        self.collection.insert(id, handle);
        Ok(id)
    }

    /// Removes a destroyed object and every scheduler entry it owns.
    ///
    /// # Arguments
    ///
    /// * `id` - Object to remove; it must already be marked destroyed
    /// * `scheduler` - Loses the object's entries
    /// * `rebuild_ratio` - Passed to [`SleepyScheduler::remove_batch`]
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::NotRegistered`] if the object is unknown (including
    /// a second unregister) and [`KernelError::NotDestroyed`] if it was never marked.
    pub fn unregister(
        &mut self,
        id: ObjectId,
        scheduler: &mut SleepyScheduler,
        rebuild_ratio: u32,
    ) -> KernelResult<SimulationObject> {
        let handle = self.lookup(id).ok_or(KernelError::NotRegistered(id))?;
        let object = self
            .get(handle)
            .ok_or(KernelError::NotRegistered(id))?;
        if !object.is_destroyed() {
            return Err(KernelError::NotDestroyed(id));
        }

        scheduler.remove_batch(&object.tickets(), rebuild_ratio)?;
        for (module, slot) in object.behaviors.iter().enumerate() {
            if slot.ticket.is_none() {
                scheduler
                    .always_run_mut()
                    .remove(BehaviorRef::new(id, module as u16), slot.priority);
            }
        }

        self.collection.remove(&id);
        self.id_table[id.raw() as usize] = None;
        let slot = &mut self.slots[handle.index() as usize];
        slot.generation = slot.generation.wrapping_add(1);
        self.free_slots.push(handle.index());
        let object = slot.object.take().ok_or(KernelError::NotRegistered(id))?;

        trace!("Unregistered {}", id);
        Ok(object)
    }

    /// Raises the next id so it is at least `next`.
    pub(crate) fn restore_next_id(&mut self, next: ObjectId) {
        if next > self.next_id {
            self.next_id = next;
        }
    }

    fn ensure_id_capacity(&mut self, id: ObjectId) {
        let needed = id.raw() as usize;
        if needed < self.id_table.len() {
            return;
        }
        let mut len = self.id_table.len().max(1);
        while len <= needed {
            len *= 2;
        }
        debug!("Growing id table {} -> {}", self.id_table.len(), len);
        self.id_table.resize(len, None);
    }

    fn allocate_slot(&mut self) -> ObjectHandle {
        if let Some(index) = self.free_slots.pop() {
            let generation = self.slots[index as usize].generation;
            return ObjectHandle::new(index, generation);
        }
        self.slots.push(ObjectSlot::default());
        ObjectHandle::new((self.slots.len() - 1) as u32, 0)
    }

    // -------------------------------------------------------------------------
    // Lookup
    // -------------------------------------------------------------------------

    #[inline]
    fn lookup(&self, id: ObjectId) -> Option<ObjectHandle> {
        *self.id_table.get(id.raw() as usize)?
    }

    /// Resolves a handle, rejecting stale generations.
    #[must_use]
    pub fn get(&self, handle: ObjectHandle) -> Option<&SimulationObject> {
        let slot = self.slots.get(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.object.as_ref()
    }

    fn get_mut(&mut self, handle: ObjectHandle) -> Option<&mut SimulationObject> {
        let slot = self.slots.get_mut(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.object.as_mut()
    }

    /// Returns the arena handle of a registered object.
    #[inline]
    #[must_use]
    pub fn handle(&self, id: ObjectId) -> Option<ObjectHandle> {
        self.lookup(id)
    }

    /// Returns true if `id` is registered.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: ObjectId) -> bool {
        self.lookup(id).is_some()
    }

    /// Finds an object by id in O(1).
    #[inline]
    #[must_use]
    pub fn find(&self, id: ObjectId) -> Option<&SimulationObject> {
        self.get(self.lookup(id)?)
    }

    /// Finds an object by id for modification.
    #[inline]
    pub fn find_mut(&mut self, id: ObjectId) -> Option<&mut SimulationObject> {
        let handle = self.lookup(id)?;
        self.get_mut(handle)
    }

    /// Iterates every registered object in id order, destroyed ones included.
    pub fn objects(&self) -> impl Iterator<Item = &SimulationObject> + '_ {
        self.collection.values().filter_map(move |&handle| self.get(handle))
    }

    /// Iterates every registered id in order.
    pub fn ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.collection.keys().copied()
    }

    // -------------------------------------------------------------------------
    // Behaviors
    // -------------------------------------------------------------------------

    fn slot_mut(&mut self, owner: BehaviorRef) -> KernelResult<&mut crate::object::BehaviorSlot> {
        self.find_mut(owner.object)
            .ok_or(KernelError::NotRegistered(owner.object))?
            .behaviors
            .get_mut(usize::from(owner.module))
            .ok_or(KernelError::UnknownBehavior(owner))
    }

    /// Returns the scheduler ticket of a behavior; `None` for always-run ones.
    ///
    /// # Errors
    ///
    /// Fails if the object or behavior does not exist.
    pub fn ticket(&self, owner: BehaviorRef) -> KernelResult<Option<UpdateTicket>> {
        self.find(owner.object)
            .ok_or(KernelError::NotRegistered(owner.object))?
            .behaviors
            .get(usize::from(owner.module))
            .map(|slot| slot.ticket)
            .ok_or(KernelError::UnknownBehavior(owner))
    }

    /// Takes a behavior out of its object so it can run.
    ///
    /// # Errors
    ///
    /// Fails if the behavior does not exist or is already taken.
    pub(crate) fn take_behavior(&mut self, owner: BehaviorRef) -> KernelResult<Box<dyn UpdateBehavior>> {
        self.slot_mut(owner)?
            .behavior
            .take()
            .ok_or(KernelError::UnknownBehavior(owner))
    }

    /// Puts a behavior back after it ran.
    ///
    /// # Errors
    ///
    /// Fails if the object is gone.
    pub(crate) fn restore_behavior(
        &mut self,
        owner: BehaviorRef,
        behavior: Box<dyn UpdateBehavior>,
    ) -> KernelResult<()> {
        self.slot_mut(owner)?.behavior = Some(behavior);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Frame upkeep and persistence
    // -------------------------------------------------------------------------

    /// Lifts timed disabled status that lapsed on or before `now`.
    ///
    /// Returns the number of objects re-enabled for at least one kind.
    pub fn expire_disabled(&mut self, now: Frame) -> usize {
        self.slots
            .iter_mut()
            .filter_map(|slot| slot.object.as_mut())
            .filter(|object| object.is_disabled())
            .map(|object| object.expire_disabled(now))
            .filter(|&changed| changed)
            .count()
    }

    /// Writes every object in id order.
    pub(crate) fn write_objects(&mut self, xfer: &mut dyn Xfer, scheduler: &SleepyScheduler) -> XferResult<()> {
        let mut count = self.collection.len();
        xfer.xfer_len(&mut count)?;
        for (id, handle) in &self.collection {
            let object = self.slots[handle.index() as usize]
                .object
                .as_mut()
                .ok_or_else(|| XferError::Malformed(format!("object {id} has no slot")))?;
            object.write_record(xfer, scheduler)?;
        }
        Ok(())
    }

    /// Runs post-load fixups on every object in id order.
    pub(crate) fn load_post_process(&mut self) -> XferResult<()> {
        for handle in self.collection.values() {
            if let Some(object) = self.slots[handle.index() as usize].object.as_mut() {
                object.load_post_process()?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Dormant;

    fn blueprint(schedule: Schedule) -> ObjectBlueprint {
        ObjectBlueprint::new("unit").with_behavior(Box::new(Dormant), schedule)
    }

    #[test]
    fn test_ids_start_at_one_and_increase() {
        let mut registry = UpdatableRegistry::new(16);
        let mut scheduler = SleepyScheduler::new();

        let a = registry.register(blueprint(Schedule::at(3, 0)), &mut scheduler, 0).unwrap();
        let b = registry.register(blueprint(Schedule::every_frame(0)), &mut scheduler, 0).unwrap();

        assert_eq!(a, ObjectId::FIRST);
        assert_eq!(b, ObjectId::new(2));
        assert_eq!(registry.find(b).map(SimulationObject::id), Some(b));
        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.always_run().len(), 1);
    }

    #[test]
    fn test_id_table_doubles() {
        let mut registry = UpdatableRegistry::new(2);
        let mut scheduler = SleepyScheduler::new();
        for _ in 0..5 {
            registry.register(ObjectBlueprint::new("rock"), &mut scheduler, 0).unwrap();
        }
        assert_eq!(registry.id_table_len(), 8);
        assert!(registry.find(ObjectId::new(5)).is_some());
    }

    #[test]
    fn test_wake_in_past_rejected_without_side_effects() {
        let mut registry = UpdatableRegistry::new(16);
        let mut scheduler = SleepyScheduler::new();

        let result = registry.register(
            ObjectBlueprint::new("late")
                .with_behavior(Box::new(Dormant), Schedule::at(20, 0))
                .with_behavior(Box::new(Dormant), Schedule::at(4, 0)),
            &mut scheduler,
            10,
        );

        assert_eq!(result, Err(KernelError::WakeInPast { requested: 4, now: 10 }));
        assert!(registry.is_empty());
        assert!(scheduler.is_empty());
        assert_eq!(registry.next_id(), ObjectId::FIRST);
    }

    #[test]
    fn test_unregister_requires_destroyed_and_runs_once() {
        let mut registry = UpdatableRegistry::new(16);
        let mut scheduler = SleepyScheduler::new();
        let id = registry
            .register(
                blueprint(Schedule::at(3, 0)).with_behavior(Box::new(Dormant), Schedule::every_frame(1)),
                &mut scheduler,
                0,
            )
            .unwrap();

        assert_eq!(
            registry.unregister(id, &mut scheduler, 2).map(|o| o.id()),
            Err(KernelError::NotDestroyed(id))
        );

        registry.find_mut(id).unwrap().set_destroyed();
        let object = registry.unregister(id, &mut scheduler, 2).unwrap();
        assert_eq!(object.id(), id);
        assert!(scheduler.is_empty());
        assert!(scheduler.always_run().is_empty());
        assert!(registry.find(id).is_none());

        assert_eq!(
            registry.unregister(id, &mut scheduler, 2).map(|o| o.id()),
            Err(KernelError::NotRegistered(id))
        );
    }

    #[test]
    fn test_ids_never_reused_but_slots_are() {
        let mut registry = UpdatableRegistry::new(16);
        let mut scheduler = SleepyScheduler::new();
        let first = registry.register(ObjectBlueprint::new("a"), &mut scheduler, 0).unwrap();
        let stale = registry.handle(first).unwrap();

        registry.find_mut(first).unwrap().set_destroyed();
        registry.unregister(first, &mut scheduler, 2).unwrap();

        let second = registry.register(ObjectBlueprint::new("b"), &mut scheduler, 0).unwrap();
        let fresh = registry.handle(second).unwrap();

        assert_ne!(first, second);
        assert_eq!(stale.index(), fresh.index());
        assert!(registry.get(stale).is_none());
        assert_eq!(registry.get(fresh).map(SimulationObject::name), Some("b"));
    }

    #[test]
    fn test_fixed_id_conflict_rejected() {
        let mut registry = UpdatableRegistry::new(16);
        let mut scheduler = SleepyScheduler::new();

        let mut restored = ObjectBlueprint::new("a");
        restored.id = Some(ObjectId::new(7));
        registry.register(restored, &mut scheduler, 0).unwrap();
        assert_eq!(registry.next_id(), ObjectId::new(8));

        let mut clash = ObjectBlueprint::new("b");
        clash.id = Some(ObjectId::new(7));
        assert_eq!(
            registry.register(clash, &mut scheduler, 0),
            Err(KernelError::AlreadyRegistered(ObjectId::new(7)))
        );
    }

    #[test]
    fn test_id_beyond_id_space_rejected_without_side_effects() {
        let mut registry = UpdatableRegistry::new(16);
        let mut scheduler = SleepyScheduler::new();

        let mut huge = ObjectBlueprint::new("huge")
            .with_behavior(Box::new(Dormant), Schedule::at(3, 0));
        huge.id = Some(ObjectId::new(1 << 62));
        assert_eq!(
            registry.register(huge, &mut scheduler, 0),
            Err(KernelError::IdSpaceExhausted(ObjectId::new(1 << 62)))
        );
        assert_eq!(registry.id_table_len(), 16);
        assert_eq!(registry.next_id(), ObjectId::FIRST);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_collection_iterates_in_id_order() {
        let mut registry = UpdatableRegistry::new(16);
        let mut scheduler = SleepyScheduler::new();
        for id in [9, 2, 5] {
            let mut bp = ObjectBlueprint::new("x");
            bp.id = Some(ObjectId::new(id));
            registry.register(bp, &mut scheduler, 0).unwrap();
        }
        let ids: Vec<_> = registry.ids().map(ObjectId::raw).collect();
        assert_eq!(ids, vec![2, 5, 9]);
        assert_eq!(registry.next_id(), ObjectId::new(10));
    }
}
