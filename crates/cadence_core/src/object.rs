//! # Simulation Objects
//!
//! An object is an id, a set of update behaviors, a set of capabilities
//! and some status flags. Objects are built as an [`ObjectBlueprint`] and
//! handed to the registry, which owns them from then on.

use std::collections::BTreeMap;
use std::fmt;

use cadence_xfer::{Xfer, XferError, XferResult, XferVersion};

use crate::behavior::{
    Capability, CapabilityKind, DisabledKind, DisabledMask, ModuleSource, Schedule, UpdateBehavior,
};
use crate::clock::{Frame, FOREVER};
use crate::id::ObjectId;
use crate::scheduler::{SleepyScheduler, UpdateTicket};

/// Persisted layout version of an object record.
const OBJECT_VERSION: XferVersion = 1;

// =============================================================================
// BLUEPRINT
// =============================================================================

/// An object that has not been registered yet.
///
/// # Example
///
/// ```rust,ignore
/// let id = world.spawn(
///     ObjectBlueprint::new("harvester")
///         .with_behavior(Box::new(Harvest::default()), Schedule::asap(10))
///         .with_capability(Box::new(Health::new(300))),
/// )?;
/// ```
pub struct ObjectBlueprint {
    /// Template name.
    pub(crate) name: String,
    /// Behaviors and how to schedule them.
    pub(crate) behaviors: Vec<(Box<dyn UpdateBehavior>, Schedule)>,
    /// Capabilities, one per kind.
    pub(crate) capabilities: Vec<Box<dyn Capability>>,
    /// Timed disabled status to start with.
    pub(crate) disabled_until: BTreeMap<DisabledKind, Frame>,
    /// Fixed id, used when restoring a save.
    pub(crate) id: Option<ObjectId>,
}

impl ObjectBlueprint {
    /// Starts a blueprint for a template name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            behaviors: Vec::new(),
            capabilities: Vec::new(),
            disabled_until: BTreeMap::new(),
            id: None,
        }
    }

    /// Adds an update behavior.
    #[must_use]
    pub fn with_behavior(mut self, behavior: Box<dyn UpdateBehavior>, schedule: Schedule) -> Self {
        self.behaviors.push((behavior, schedule));
        self
    }

    /// Adds a capability, replacing any earlier one of the same kind.
    #[must_use]
    pub fn with_capability(mut self, capability: Box<dyn Capability>) -> Self {
        self.capabilities.retain(|c| c.kind() != capability.kind());
        self.capabilities.push(capability);
        self
    }

    /// Starts the object disabled for `kind` until `until`.
    #[must_use]
    pub fn disabled(mut self, kind: DisabledKind, until: Frame) -> Self {
        self.disabled_until.insert(kind, until);
        self
    }

    /// Returns the template name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for ObjectBlueprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectBlueprint")
            .field("name", &self.name)
            .field("behaviors", &self.behaviors.len())
            .field("capabilities", &self.capabilities.len())
            .field("id", &self.id)
            .finish()
    }
}

// =============================================================================
// OBJECT
// =============================================================================

/// One behavior of a registered object.
pub(crate) struct BehaviorSlot {
    /// The behavior; `None` only while its update is running.
    pub(crate) behavior: Option<Box<dyn UpdateBehavior>>,
    /// Heap ticket, or `None` for always-run behaviors.
    pub(crate) ticket: Option<UpdateTicket>,
    /// Tie-break priority.
    pub(crate) priority: u32,
}

/// A registered simulation object.
pub struct SimulationObject {
    /// Identity.
    id: ObjectId,
    /// Template name.
    name: String,
    /// Marked destroyed, awaiting the sweep.
    destroyed: bool,
    /// Disabled kinds and the frame each one lapses on ([`FOREVER`] for untimed).
    disabled_until: BTreeMap<DisabledKind, Frame>,
    /// Update behaviors, addressed by index.
    pub(crate) behaviors: Vec<BehaviorSlot>,
    /// Capabilities by kind.
    capabilities: BTreeMap<CapabilityKind, Box<dyn Capability>>,
}

impl SimulationObject {
    /// Creates the object from a blueprint; behaviors are not yet scheduled.
    pub(crate) fn from_blueprint(id: ObjectId, blueprint: ObjectBlueprint) -> (Self, Vec<Schedule>) {
        let mut schedules = Vec::with_capacity(blueprint.behaviors.len());
        let behaviors = blueprint
            .behaviors
            .into_iter()
            .map(|(behavior, schedule)| {
                schedules.push(schedule);
                BehaviorSlot {
                    behavior: Some(behavior),
                    ticket: None,
                    priority: schedule.priority(),
                }
            })
            .collect();

        let capabilities = blueprint
            .capabilities
            .into_iter()
            .map(|capability| (capability.kind(), capability))
            .collect();

        let object = Self {
            id,
            name: blueprint.name,
            destroyed: false,
            disabled_until: blueprint.disabled_until,
            behaviors,
            capabilities,
        };
        (object, schedules)
    }

    /// Returns the object's id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> ObjectId {
        self.id
    }

    /// Returns the template name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true once the object has been marked destroyed.
    #[inline]
    #[must_use]
    pub const fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub(crate) fn set_destroyed(&mut self) {
        self.destroyed = true;
    }

    // -------------------------------------------------------------------------
    // Disabled status
    // -------------------------------------------------------------------------

    /// Returns the kinds the object is currently disabled for.
    #[must_use]
    pub fn disabled(&self) -> DisabledMask {
        self.disabled_until
            .keys()
            .fold(DisabledMask::EMPTY, |mask, &kind| mask.with(kind))
    }

    /// Returns true if the object is disabled for any kind.
    #[inline]
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        !self.disabled_until.is_empty()
    }

    /// Disables the object for `kind` until frame `until`.
    ///
    /// Pass [`FOREVER`] for a status that only [`SimulationObject::enable`] clears.
    /// A later expiry replaces an earlier one, never the reverse.
    pub fn disable(&mut self, kind: DisabledKind, until: Frame) {
        let entry = self.disabled_until.entry(kind).or_insert(until);
        *entry = (*entry).max(until);
    }

    /// Clears `kind`. Returns whether it was set.
    pub fn enable(&mut self, kind: DisabledKind) -> bool {
        self.disabled_until.remove(&kind).is_some()
    }

    /// Clears every timed status that lapses on or before `now`.
    ///
    /// Returns whether anything was cleared.
    pub fn expire_disabled(&mut self, now: Frame) -> bool {
        let before = self.disabled_until.len();
        self.disabled_until.retain(|_, until| *until > now);
        before != self.disabled_until.len()
    }

    // -------------------------------------------------------------------------
    // Behaviors and capabilities
    // -------------------------------------------------------------------------

    /// Returns the number of update behaviors.
    #[inline]
    #[must_use]
    pub fn behavior_count(&self) -> usize {
        self.behaviors.len()
    }

    /// Returns a behavior by index, unless it is running right now.
    #[must_use]
    pub fn behavior(&self, module: u16) -> Option<&dyn UpdateBehavior> {
        self.behaviors.get(usize::from(module))?.behavior.as_deref()
    }

    /// Returns the capability of `kind`.
    #[must_use]
    pub fn capability(&self, kind: CapabilityKind) -> Option<&dyn Capability> {
        self.capabilities.get(&kind).map(|capability| &**capability)
    }

    /// Returns the capability of `kind` for modification.
    pub fn capability_mut(&mut self, kind: CapabilityKind) -> Option<&mut dyn Capability> {
        let capability: &mut dyn Capability = self.capabilities.get_mut(&kind)?.as_mut();
        Some(capability)
    }

    /// Returns the capability kinds present, in key order.
    pub fn capability_kinds(&self) -> impl Iterator<Item = CapabilityKind> + '_ {
        self.capabilities.keys().copied()
    }

    /// Runs destroy hooks: goal and path state is dropped, then every
    /// capability hears about the destruction.
    pub(crate) fn run_destroy_hooks(&mut self) {
        let id = self.id;
        for capability in self.capabilities.values_mut() {
            capability.detach();
        }
        for capability in self.capabilities.values_mut() {
            capability.on_destroy(id);
        }
    }

    /// Runs removal hooks and collects objects to destroy along with this one.
    pub(crate) fn run_removal_hooks(&mut self, cascade: &mut Vec<ObjectId>) {
        let id = self.id;
        for capability in self.capabilities.values_mut() {
            capability.on_removed(id, cascade);
        }
    }

    /// Returns the scheduler tickets of every sleepy behavior.
    pub(crate) fn tickets(&self) -> Vec<UpdateTicket> {
        self.behaviors.iter().filter_map(|slot| slot.ticket).collect()
    }

    // -------------------------------------------------------------------------
    // Persistence
    // -------------------------------------------------------------------------

    /// Writes the object record (save and checksum modes).
    ///
    /// Wake frames live in the scheduler, so it is consulted for each
    /// sleepy behavior.
    pub(crate) fn write_record(&mut self, xfer: &mut dyn Xfer, scheduler: &SleepyScheduler) -> XferResult<()> {
        let mut version = OBJECT_VERSION;
        xfer.xfer_version(&mut version, OBJECT_VERSION)?;

        let mut raw_id = self.id.raw();
        xfer.xfer_u64(&mut raw_id)?;
        xfer.xfer_string(&mut self.name)?;
        xfer.xfer_bool(&mut self.destroyed)?;

        let mut count = self.disabled_until.len();
        xfer.xfer_len(&mut count)?;
        for (&kind, &until) in &self.disabled_until {
            let mut bit = kind as u8;
            let mut until = until;
            xfer.xfer_u8(&mut bit)?;
            xfer.xfer_u64(&mut until)?;
        }

        let mut count = self.behaviors.len();
        xfer.xfer_len(&mut count)?;
        for slot in &mut self.behaviors {
            let behavior = slot.behavior.as_mut().ok_or_else(|| {
                XferError::Malformed(format!("object {} has a behavior mid-update", self.id))
            })?;
            let mut tag = behavior.type_tag().to_owned();
            let mut every_frame = slot.ticket.is_none();
            let mut wake = slot
                .ticket
                .and_then(|ticket| scheduler.wake_frame(ticket))
                .unwrap_or(FOREVER);

            xfer.xfer_string(&mut tag)?;
            xfer.xfer_u32(&mut slot.priority)?;
            xfer.xfer_bool(&mut every_frame)?;
            xfer.xfer_u64(&mut wake)?;
            xfer.begin_block()?;
            behavior.xfer(xfer)?;
            xfer.end_block()?;
        }

        let mut count = self.capabilities.len();
        xfer.xfer_len(&mut count)?;
        for capability in self.capabilities.values_mut() {
            let mut tag = capability.type_tag().to_owned();
            xfer.xfer_string(&mut tag)?;
            xfer.begin_block()?;
            capability.xfer(xfer)?;
            xfer.end_block()?;
        }
        Ok(())
    }

    /// Reads an object record back into a blueprint with a fixed id and
    /// absolute wake frames. Also returns the destroyed flag.
    pub(crate) fn read_record(
        xfer: &mut dyn Xfer,
        source: &dyn ModuleSource,
    ) -> XferResult<(ObjectBlueprint, bool)> {
        let mut version = OBJECT_VERSION;
        xfer.xfer_version(&mut version, OBJECT_VERSION)?;

        let mut raw_id = 0u64;
        let mut name = String::new();
        let mut destroyed = false;
        xfer.xfer_u64(&mut raw_id)?;
        xfer.xfer_string(&mut name)?;
        xfer.xfer_bool(&mut destroyed)?;

        let id = ObjectId::new(raw_id);
        if !id.is_valid() {
            return Err(XferError::Malformed("object record with invalid id".to_owned()));
        }
        let mut blueprint = ObjectBlueprint::new(name);
        blueprint.id = Some(id);

        let mut count = 0usize;
        xfer.xfer_len(&mut count)?;
        for _ in 0..count {
            let (mut bit, mut until) = (0u8, 0u64);
            xfer.xfer_u8(&mut bit)?;
            xfer.xfer_u64(&mut until)?;
            let kind = DisabledKind::from_bit(bit)
                .ok_or_else(|| XferError::Malformed(format!("disabled kind bit {bit}")))?;
            blueprint.disabled_until.insert(kind, until);
        }

        xfer.xfer_len(&mut count)?;
        for _ in 0..count {
            let mut tag = String::new();
            let (mut priority, mut every_frame, mut wake) = (0u32, false, 0u64);
            xfer.xfer_string(&mut tag)?;
            xfer.xfer_u32(&mut priority)?;
            xfer.xfer_bool(&mut every_frame)?;
            xfer.xfer_u64(&mut wake)?;

            let mut behavior = source.behavior(&tag).ok_or(XferError::UnknownTag(tag))?;
            xfer.begin_block()?;
            behavior.xfer(xfer)?;
            xfer.end_block()?;

            let schedule = if every_frame {
                Schedule::every_frame(priority)
            } else {
                Schedule::at(wake, priority)
            };
            blueprint.behaviors.push((behavior, schedule));
        }

        xfer.xfer_len(&mut count)?;
        for _ in 0..count {
            let mut tag = String::new();
            xfer.xfer_string(&mut tag)?;
            let mut capability = source.capability(&tag).ok_or(XferError::UnknownTag(tag))?;
            xfer.begin_block()?;
            capability.xfer(xfer)?;
            xfer.end_block()?;
            blueprint.capabilities.push(capability);
        }

        Ok((blueprint, destroyed))
    }

    /// Runs the post-load fixups of every behavior and capability.
    pub(crate) fn load_post_process(&mut self) -> XferResult<()> {
        for behavior in self.behaviors.iter_mut().filter_map(|slot| slot.behavior.as_mut()) {
            behavior.load_post_process()?;
        }
        for capability in self.capabilities.values_mut() {
            capability.load_post_process()?;
        }
        Ok(())
    }
}

impl fmt::Debug for SimulationObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tags: Vec<_> = self
            .behaviors
            .iter()
            .map(|slot| slot.behavior.as_ref().map_or("<running>", |b| b.type_tag()))
            .collect();
        f.debug_struct("SimulationObject")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("destroyed", &self.destroyed)
            .field("disabled", &self.disabled())
            .field("behaviors", &tags)
            .field("capabilities", &self.capabilities.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_xfer::Snapshot;

    struct Hull(u32);

    impl Snapshot for Hull {
        fn xfer(&mut self, xfer: &mut dyn Xfer) -> XferResult<()> {
            xfer.xfer_u32(&mut self.0)
        }
    }

    impl Capability for Hull {
        fn kind(&self) -> CapabilityKind {
            CapabilityKind::Health
        }

        fn type_tag(&self) -> &'static str {
            "Hull"
        }
    }

    fn object(blueprint: ObjectBlueprint) -> SimulationObject {
        SimulationObject::from_blueprint(ObjectId::FIRST, blueprint).0
    }

    #[test]
    fn test_capability_replaced_by_kind() {
        let object = object(
            ObjectBlueprint::new("wall")
                .with_capability(Box::new(Hull(10)))
                .with_capability(Box::new(Hull(20))),
        );
        assert_eq!(object.capability_kinds().collect::<Vec<_>>(), vec![CapabilityKind::Health]);
        assert_eq!(object.capability(CapabilityKind::Health).map(|c| c.type_tag()), Some("Hull"));
        assert!(object.capability(CapabilityKind::Goal).is_none());
    }

    #[test]
    fn test_timed_disable_expires() {
        let mut object = object(ObjectBlueprint::new("tank").disabled(DisabledKind::Emp, 10));
        object.disable(DisabledKind::Held, FOREVER);
        assert!(object.disabled().contains(DisabledKind::Emp));

        assert!(!object.expire_disabled(9));
        assert!(object.expire_disabled(10));
        assert_eq!(object.disabled(), DisabledMask::of(DisabledKind::Held));

        assert!(object.enable(DisabledKind::Held));
        assert!(!object.is_disabled());
    }

    #[test]
    fn test_disable_keeps_later_expiry() {
        let mut object = object(ObjectBlueprint::new("tank"));
        object.disable(DisabledKind::Paralyzed, 30);
        object.disable(DisabledKind::Paralyzed, 20);
        assert!(!object.expire_disabled(25));
        assert!(object.expire_disabled(30));
    }
}
