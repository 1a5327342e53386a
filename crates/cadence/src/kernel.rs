//! # Kernel
//!
//! The per-session context object. Owns the world, the subsystems and the
//! checksum validator, and runs frames in a fixed order:
//!
//! ```text
//! Frame N:
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │ 1. ADVANCE CLOCK                                                    │
//! │ 2. SCRIPT subsystems                                                │
//! │ 3. TERRAIN subsystems                                               │
//! │ 4. CHECKSUM (every crc_interval frames)                             │
//! │ 5. ALWAYS-RUN behaviors (priority order)                            │
//! │ 6. SLEEPY behaviors (wake frame, priority, object, module order)    │
//! │    └─ heap invariant check when validate_scheduler is on            │
//! │ 7. DESTRUCTION SWEEP                                                │
//! │ 8. AUXILIARY subsystems                                             │
//! │ 9. DISABLED STATUS EXPIRY                                           │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing here is global. Several kernels can run side by side in one
//! process, which is how the lockstep tests work.

use cadence_core::{Frame, ObjectBlueprint, ObjectId, World};
use cadence_xfer::{Xfer, XferCrc};
use tracing::debug;

use crate::checksum::ChecksumValidator;
use crate::config::KernelConfig;
use crate::desync::{DesyncPolicy, DesyncReceiver};
use crate::error::{SessionError, SessionResult};
use crate::factory::ModuleFactory;
use crate::subsystem::{Phase, Subsystem};

/// What one call to [`Kernel::step`] did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Frame that was processed.
    pub frame: Frame,
    /// Behavior updates that ran.
    pub updates: u32,
    /// Objects freed by the sweep, in order.
    pub swept: Vec<ObjectId>,
    /// Objects whose timed disabled status lapsed.
    pub reenabled: usize,
    /// Checksum taken this frame, if one was due.
    pub checksum: Option<u32>,
}

/// One simulation session.
pub struct Kernel {
    pub(crate) world: World,
    pub(crate) subsystems: Vec<Box<dyn Subsystem>>,
    pub(crate) validator: ChecksumValidator,
    pub(crate) factory: ModuleFactory,
    config: KernelConfig,
}

impl Kernel {
    /// Creates a session with the policy named in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Config`] if `config` is invalid.
    pub fn new(config: KernelConfig, factory: ModuleFactory) -> SessionResult<Self> {
        let policy = config.desync_policy.build();
        Self::with_policy(config, factory, policy)
    }

    /// Creates a session with a custom desync policy.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Config`] if `config` is invalid.
    pub fn with_policy(
        config: KernelConfig,
        factory: ModuleFactory,
        policy: Box<dyn DesyncPolicy>,
    ) -> SessionResult<Self> {
        config.validate()?;
        let validator =
            ChecksumValidator::new(config.crc_interval, config.crc_history, config.local_peer, policy);

        debug!(
            "Kernel created: crc every {} frames, {} policy, seed {}",
            config.crc_interval,
            validator.policy_name(),
            config.random_seed
        );

        Ok(Self {
            world: World::new(config.world_settings()),
            subsystems: Vec::new(),
            validator,
            factory,
            config,
        })
    }

    /// Adds a subsystem. Subsystems of one phase run in the order added.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::DuplicateSubsystem`] if the name is taken.
    pub fn add_subsystem(&mut self, subsystem: Box<dyn Subsystem>) -> SessionResult<()> {
        let name = subsystem.name();
        if self.subsystem(name).is_some() {
            return Err(SessionError::DuplicateSubsystem(name));
        }
        self.subsystems.push(subsystem);
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Returns the last processed frame.
    #[inline]
    #[must_use]
    pub const fn now(&self) -> Frame {
        self.world.now()
    }

    /// Returns the world.
    #[inline]
    #[must_use]
    pub const fn world(&self) -> &World {
        &self.world
    }

    /// Returns the world for setup between frames.
    #[inline]
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Returns the checksum validator.
    #[inline]
    #[must_use]
    pub const fn validator(&self) -> &ChecksumValidator {
        &self.validator
    }

    /// Returns the factory used for loading.
    #[inline]
    #[must_use]
    pub const fn factory(&self) -> &ModuleFactory {
        &self.factory
    }

    /// Finds a subsystem by name.
    #[must_use]
    pub fn subsystem(&self, name: &str) -> Option<&dyn Subsystem> {
        self.subsystems
            .iter()
            .find(|s| s.name() == name)
            .map(|s| &**s)
    }

    /// Returns the receiving end of the desync reporting path.
    #[must_use]
    pub fn desync_reports(&self) -> DesyncReceiver {
        self.validator.reports()
    }

    // =========================================================================
    // Session operations
    // =========================================================================

    /// Registers an object on the current frame.
    ///
    /// # Errors
    ///
    /// See [`World::spawn`].
    pub fn spawn(&mut self, blueprint: ObjectBlueprint) -> SessionResult<ObjectId> {
        Ok(self.world.spawn(blueprint)?)
    }

    /// Marks an object destroyed.
    ///
    /// # Errors
    ///
    /// See [`World::destroy`].
    pub fn destroy(&mut self, id: ObjectId) -> SessionResult<bool> {
        Ok(self.world.destroy(id)?)
    }

    /// Queues checksums recorded by an earlier run of the same inputs.
    pub fn prime_playback(&mut self, recorded: impl IntoIterator<Item = u32>) {
        self.validator.prime_playback(recorded);
    }

    /// Accepts another peer's checksum for `frame`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Desync`] on a fatal mismatch.
    pub fn submit_remote_checksum(&mut self, peer: u32, frame: Frame, checksum: u32) -> SessionResult<()> {
        self.validator.submit_remote(peer, frame, checksum)
    }

    /// Computes the checksum of the whole live state: the world, then each
    /// subsystem in the order added.
    ///
    /// # Errors
    ///
    /// Propagates state transfer errors.
    pub fn checksum(&mut self) -> SessionResult<u32> {
        let mut crc = XferCrc::new();
        crc.xfer_marker("World")?;
        self.world.write_state(&mut crc)?;
        for subsystem in &mut self.subsystems {
            crc.xfer_marker(subsystem.name())?;
            subsystem.xfer(&mut crc)?;
        }
        Ok(crc.checksum())
    }

    fn run_phase(&mut self, phase: Phase) -> SessionResult<()> {
        let world = &mut self.world;
        for subsystem in self.subsystems.iter_mut().filter(|s| s.phase() == phase) {
            subsystem.update(&mut world.context())?;
        }
        Ok(())
    }

    /// Runs one frame.
    ///
    /// # Errors
    ///
    /// Kernel logic errors, and [`SessionError::Desync`] when a checksum
    /// taken this frame disagrees with one already received and the policy
    /// is fatal. The frame is left partially processed; the session should
    /// end.
    pub fn step(&mut self) -> SessionResult<FrameReport> {
        let frame = self.world.advance_frame();

        self.run_phase(Phase::Script)?;
        self.run_phase(Phase::Terrain)?;

        let checksum = if self.validator.is_due(frame) {
            let crc = self.checksum()?;
            self.validator.record_local(frame, crc)?;
            Some(crc)
        } else {
            None
        };

        let mut updates = self.world.run_always_list()?;
        updates += self.world.run_sleepy_updates()?;
        if self.config.validate_scheduler {
            self.world.validate_scheduler()?;
        }

        let swept = self.world.sweep()?;
        self.run_phase(Phase::Auxiliary)?;
        let reenabled = self.world.expire_disabled();

        debug!(
            "Frame {}: {} updates, {} swept, {} objects, checksum {:?}",
            frame,
            updates,
            swept.len(),
            self.world.registry().len(),
            checksum
        );

        Ok(FrameReport {
            frame,
            updates,
            swept,
            reenabled,
            checksum,
        })
    }

    /// Runs `frames` frames and returns their reports.
    ///
    /// # Errors
    ///
    /// Stops at the first failing frame; see [`Kernel::step`].
    pub fn run(&mut self, frames: u64) -> SessionResult<Vec<FrameReport>> {
        (0..frames).map(|_| self.step()).collect()
    }
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("frame", &self.world.now())
            .field("objects", &self.world.registry().len())
            .field(
                "subsystems",
                &self.subsystems.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("validator", &self.validator)
            .finish_non_exhaustive()
    }
}
