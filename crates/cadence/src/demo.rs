//! # Demo Content
//!
//! A small self-contained population used by the soak binary and the
//! integration tests: wanderers that sleep for random spans, spawn and
//! destroy each other, convoys whose riders die with their carrier, and two
//! subsystems. Everything random goes through the logic random stream, so
//! two sessions with the same seed stay in lockstep.

use cadence_core::{
    Capability, CapabilityKind, FrameContext, KernelResult, ObjectBlueprint, ObjectId, Schedule,
    UpdateBehavior, UpdateSleep,
};
use cadence_xfer::{Snapshot, Xfer, XferResult, XferVersion};

use crate::config::KernelConfig;
use crate::error::SessionResult;
use crate::factory::ModuleFactory;
use crate::kernel::Kernel;
use crate::subsystem::{Phase, Subsystem};

/// Wanderers stop breeding once the world holds this many objects.
pub const POPULATION_CAP: usize = 256;

// =============================================================================
// BEHAVIORS
// =============================================================================

/// Sleeps a random span, turns, and now and then breeds or kills.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Wanderer {
    /// Current heading in degrees.
    pub heading: u32,
    /// Updates run so far.
    pub moves: u32,
    /// Objects this wanderer spawned.
    pub offspring: u32,
    /// Objects this wanderer destroyed.
    pub kills: u32,
}

impl Wanderer {
    /// Blueprint of a fresh wanderer that first runs next frame.
    #[must_use]
    pub fn blueprint(name: impl Into<String>, priority: u32) -> ObjectBlueprint {
        ObjectBlueprint::new(name).with_behavior(Box::new(Self::default()), Schedule::asap(priority))
    }
}

impl Snapshot for Wanderer {
    fn xfer(&mut self, xfer: &mut dyn Xfer) -> XferResult<()> {
        const CURRENT: XferVersion = 1;
        let mut version = CURRENT;
        xfer.xfer_version(&mut version, CURRENT)?;
        xfer.xfer_u32(&mut self.heading)?;
        xfer.xfer_u32(&mut self.moves)?;
        xfer.xfer_u32(&mut self.offspring)?;
        xfer.xfer_u32(&mut self.kills)
    }
}

impl UpdateBehavior for Wanderer {
    fn type_tag(&self) -> &'static str {
        "Wanderer"
    }

    fn update(&mut self, ctx: &mut FrameContext<'_>) -> UpdateSleep {
        self.moves += 1;
        self.heading = ctx.random().range(0, 359);

        let population = ctx.objects().count();
        if population < POPULATION_CAP && ctx.random().chance(1, 30) {
            let priority = ctx.random().range(0, 7);
            let name = format!("wanderer-{}-{}", ctx.frame(), self.offspring);
            if ctx.spawn(Self::blueprint(name, priority)).is_ok() {
                self.offspring += 1;
            }
        }

        if population > 1 && ctx.random().chance(1, 40) {
            let last = u32::try_from(population - 1).unwrap_or(u32::MAX);
            let pick = ctx.random().range(0, last) as usize;
            let target = ctx
                .objects()
                .nth(pick)
                .filter(|object| !object.is_destroyed())
                .map(|object| object.id());
            if let Some(target) = target.filter(|&id| Some(id) != ctx.owner()) {
                if ctx.destroy(target).unwrap_or(false) {
                    self.kills += 1;
                }
            }
        }

        UpdateSleep::Frames(ctx.random().range(1, 8))
    }
}

/// Always-run pulse counter.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Beacon {
    /// Frames this beacon has pulsed.
    pub pulses: u64,
}

impl Snapshot for Beacon {
    fn xfer(&mut self, xfer: &mut dyn Xfer) -> XferResult<()> {
        const CURRENT: XferVersion = 1;
        let mut version = CURRENT;
        xfer.xfer_version(&mut version, CURRENT)?;
        xfer.xfer_u64(&mut self.pulses)
    }
}

impl UpdateBehavior for Beacon {
    fn type_tag(&self) -> &'static str {
        "Beacon"
    }

    fn update(&mut self, _ctx: &mut FrameContext<'_>) -> UpdateSleep {
        self.pulses += 1;
        UpdateSleep::None
    }
}

// =============================================================================
// CAPABILITIES
// =============================================================================

/// Riders that are destroyed along with their carrier.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cargo {
    /// Objects on board.
    pub riders: Vec<ObjectId>,
}

impl Snapshot for Cargo {
    fn xfer(&mut self, xfer: &mut dyn Xfer) -> XferResult<()> {
        const CURRENT: XferVersion = 1;
        let mut version = CURRENT;
        xfer.xfer_version(&mut version, CURRENT)?;

        let mut count = self.riders.len();
        xfer.xfer_len(&mut count)?;
        if xfer.is_loading() {
            let mut riders = Vec::with_capacity(count.min(xfer.bytes_left().unwrap_or(0) / 8));
            for _ in 0..count {
                let mut raw = 0u64;
                xfer.xfer_u64(&mut raw)?;
                riders.push(ObjectId::new(raw));
            }
            self.riders = riders;
            return Ok(());
        }
        for rider in &self.riders {
            let mut raw = rider.raw();
            xfer.xfer_u64(&mut raw)?;
        }
        Ok(())
    }
}

impl Capability for Cargo {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Container
    }

    fn type_tag(&self) -> &'static str {
        "Cargo"
    }

    fn on_removed(&mut self, _owner: ObjectId, cascade: &mut Vec<ObjectId>) {
        cascade.append(&mut self.riders);
    }
}

// =============================================================================
// SUBSYSTEMS
// =============================================================================

/// Script phase: launches a convoy every `period` frames.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Spawner {
    /// Frames between convoys.
    pub period: u32,
    /// Convoys launched so far.
    pub launched: u32,
}

impl Default for Spawner {
    fn default() -> Self {
        Self {
            period: 20,
            launched: 0,
        }
    }
}

impl Snapshot for Spawner {
    fn xfer(&mut self, xfer: &mut dyn Xfer) -> XferResult<()> {
        const CURRENT: XferVersion = 1;
        let mut version = CURRENT;
        xfer.xfer_version(&mut version, CURRENT)?;
        xfer.xfer_u32(&mut self.period)?;
        xfer.xfer_u32(&mut self.launched)
    }
}

impl Subsystem for Spawner {
    fn name(&self) -> &'static str {
        "Spawner"
    }

    fn phase(&self) -> Phase {
        Phase::Script
    }

    fn update(&mut self, ctx: &mut FrameContext<'_>) -> KernelResult<()> {
        if self.period == 0 || ctx.frame() % u64::from(self.period) != 0 {
            return Ok(());
        }
        if ctx.objects().count() + 3 > POPULATION_CAP {
            return Ok(());
        }

        let convoy = self.launched;
        let mut riders = Vec::with_capacity(2);
        for seat in 0..2 {
            let priority = ctx.random().range(0, 7);
            riders.push(ctx.spawn(Wanderer::blueprint(format!("rider-{convoy}-{seat}"), priority))?);
        }
        let priority = ctx.random().range(0, 7);
        ctx.spawn(
            Wanderer::blueprint(format!("carrier-{convoy}"), priority)
                .with_capability(Box::new(Cargo { riders })),
        )?;

        self.launched += 1;
        Ok(())
    }
}

/// Auxiliary phase: tracks the population after each sweep.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Census {
    /// Live objects after the last sweep.
    pub population: u32,
    /// Highest population seen.
    pub peak: u32,
}

impl Snapshot for Census {
    fn xfer(&mut self, xfer: &mut dyn Xfer) -> XferResult<()> {
        const CURRENT: XferVersion = 1;
        let mut version = CURRENT;
        xfer.xfer_version(&mut version, CURRENT)?;
        xfer.xfer_u32(&mut self.population)?;
        xfer.xfer_u32(&mut self.peak)
    }
}

impl Subsystem for Census {
    fn name(&self) -> &'static str {
        "Census"
    }

    fn phase(&self) -> Phase {
        Phase::Auxiliary
    }

    fn update(&mut self, ctx: &mut FrameContext<'_>) -> KernelResult<()> {
        self.population = u32::try_from(ctx.objects().count()).unwrap_or(u32::MAX);
        self.peak = self.peak.max(self.population);
        Ok(())
    }
}

// =============================================================================
// SESSION SETUP
// =============================================================================

/// Factory that knows every type in this module.
#[must_use]
pub fn factory() -> ModuleFactory {
    ModuleFactory::new()
        .with_behavior("Wanderer", || Box::new(Wanderer::default()))
        .with_behavior("Beacon", || Box::new(Beacon::default()))
        .with_capability("Cargo", || Box::new(Cargo::default()))
        .with_subsystem("Spawner", || Box::new(Spawner::default()))
        .with_subsystem("Census", || Box::new(Census::default()))
}

/// Builds a session with both subsystems, a beacon and `wanderers`
/// wanderers whose first wake frames and priorities are staggered.
///
/// # Errors
///
/// Returns an error if `config` is invalid.
pub fn session(config: KernelConfig, wanderers: u32) -> SessionResult<Kernel> {
    let mut kernel = Kernel::new(config, factory())?;
    kernel.add_subsystem(Box::new(Spawner::default()))?;
    kernel.add_subsystem(Box::new(Census::default()))?;

    kernel.spawn(
        ObjectBlueprint::new("beacon").with_behavior(Box::new(Beacon::default()), Schedule::every_frame(0)),
    )?;
    for n in 0..wanderers {
        let wake = 1 + u64::from(n % 5);
        kernel.spawn(
            ObjectBlueprint::new(format!("wanderer-{n}"))
                .with_behavior(Box::new(Wanderer::default()), Schedule::at(wake, n % 4)),
        )?;
    }
    Ok(kernel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_population() {
        let kernel = session(KernelConfig::default(), 10).unwrap();
        assert_eq!(kernel.world().registry().len(), 11);
        assert!(kernel.subsystem("Spawner").is_some());
        assert!(kernel.subsystem("Census").is_some());
    }

    #[test]
    fn test_spawner_launches_convoys() {
        let mut kernel = session(KernelConfig { crc_interval: 0, ..KernelConfig::default() }, 0).unwrap();
        kernel.run(20).unwrap();

        let carriers: Vec<_> = kernel
            .world()
            .objects()
            .filter(|o| o.capability(CapabilityKind::Container).is_some())
            .collect();
        assert!(!carriers.is_empty());
    }

    #[test]
    fn test_carrier_takes_riders_with_it() {
        let mut kernel = session(KernelConfig { crc_interval: 0, ..KernelConfig::default() }, 0).unwrap();
        let beacon = || Box::new(Beacon::default());
        let rider = kernel
            .spawn(ObjectBlueprint::new("rider").with_behavior(beacon(), Schedule::every_frame(0)))
            .unwrap();
        let carrier = kernel
            .spawn(
                ObjectBlueprint::new("carrier")
                    .with_behavior(beacon(), Schedule::every_frame(0))
                    .with_capability(Box::new(Cargo { riders: vec![rider] })),
            )
            .unwrap();

        kernel.destroy(carrier).unwrap();
        let report = kernel.step().unwrap();
        assert_eq!(report.swept, vec![carrier, rider]);
        assert!(kernel.world().find(rider).is_none());
    }

    #[test]
    fn test_census_counts_after_sweep() {
        let mut kernel = session(KernelConfig { crc_interval: 0, ..KernelConfig::default() }, 3).unwrap();
        kernel.step().unwrap();
        let live = kernel.world().registry().len();

        let mut census = Census::default();
        let mut save = cadence_xfer::XferSave::new();
        kernel.subsystems[1].xfer(&mut save).unwrap();
        let bytes = save.into_bytes().unwrap();
        census.xfer(&mut cadence_xfer::XferLoad::new(&bytes)).unwrap();

        assert_eq!(census.population as usize, live);
        assert!(census.peak >= census.population);
    }
}
