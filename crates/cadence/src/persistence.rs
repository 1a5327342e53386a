//! # Persistence
//!
//! Save files carry one block for the world and one per subsystem:
//!
//! ```text
//! [SaveHeader]
//! ["World"]             world state (clock, objects, destruction, random)
//! ["Subsystem:<name>"]  one per subsystem, in the order added
//! ["SG_EOF"]
//! ```
//!
//! Loading builds a complete replacement off to the side: a new world and
//! fresh subsystems from the factory. The kernel is only touched once every
//! block has been read and post-processed, so a failed load leaves it
//! exactly as it was.

use std::path::Path;

use cadence_core::{ModuleSource, World, WorldSettings};
use cadence_xfer::{
    read_blocks, seal, unseal, write_block, write_eof, BlockResolver, Snapshot, Xfer, XferError,
    XferLoad, XferResult, XferSave,
};
use tracing::{info, warn};

use crate::error::SessionResult;
use crate::kernel::Kernel;
use crate::subsystem::Subsystem;

/// Name of the world block.
pub const WORLD_BLOCK: &str = "World";

/// Prefix of subsystem block names.
pub const SUBSYSTEM_BLOCK_PREFIX: &str = "Subsystem:";

/// Saves the world through [`World::write_state`].
struct WorldWriter<'a>(&'a mut World);

impl Snapshot for WorldWriter<'_> {
    fn xfer(&mut self, xfer: &mut dyn Xfer) -> XferResult<()> {
        self.0.write_state(xfer)
    }
}

/// Saves a subsystem through its own snapshot.
struct SubsystemWriter<'a>(&'a mut dyn Subsystem);

impl Snapshot for SubsystemWriter<'_> {
    fn xfer(&mut self, xfer: &mut dyn Xfer) -> XferResult<()> {
        self.0.xfer(xfer)
    }
}

/// Receives the world block into a new world.
struct WorldReader<'a> {
    source: &'a dyn ModuleSource,
    settings: WorldSettings,
    world: Option<World>,
}

impl Snapshot for WorldReader<'_> {
    fn xfer(&mut self, xfer: &mut dyn Xfer) -> XferResult<()> {
        if self.world.is_some() {
            return Err(XferError::Malformed("save has two world blocks".to_owned()));
        }
        self.world = Some(World::read_state(xfer, self.source, self.settings)?);
        Ok(())
    }
}

/// A fresh subsystem waiting for its block.
struct SubsystemReader {
    subsystem: Box<dyn Subsystem>,
    loaded: bool,
}

impl Snapshot for SubsystemReader {
    fn xfer(&mut self, xfer: &mut dyn Xfer) -> XferResult<()> {
        self.loaded = true;
        self.subsystem.xfer(xfer)
    }

    fn load_post_process(&mut self) -> XferResult<()> {
        self.subsystem.load_post_process()
    }
}

/// Routes block names to the replacement state.
struct LoadTarget<'a> {
    world: WorldReader<'a>,
    subsystems: Vec<SubsystemReader>,
}

impl BlockResolver for LoadTarget<'_> {
    fn resolve(&mut self, name: &str) -> Option<&mut dyn Snapshot> {
        if name == WORLD_BLOCK {
            return Some(&mut self.world);
        }
        let wanted = name.strip_prefix(SUBSYSTEM_BLOCK_PREFIX)?;
        self.subsystems
            .iter_mut()
            .find(|reader| reader.subsystem.name() == wanted)
            .map(|reader| reader as &mut dyn Snapshot)
    }
}

impl Kernel {
    /// Serializes the session into a sealed save file.
    ///
    /// # Errors
    ///
    /// Fails if a behavior is mid-update, which cannot happen between
    /// frames.
    pub fn save(&mut self) -> SessionResult<Vec<u8>> {
        let mut save = XferSave::new();
        write_block(&mut save, WORLD_BLOCK, &mut WorldWriter(&mut self.world))?;
        for subsystem in &mut self.subsystems {
            let name = format!("{SUBSYSTEM_BLOCK_PREFIX}{}", subsystem.name());
            write_block(&mut save, &name, &mut SubsystemWriter(subsystem.as_mut()))?;
        }
        write_eof(&mut save)?;

        let payload = save.into_bytes()?;
        let frame = self.world.now();
        info!("Saved frame {} ({} bytes)", frame, payload.len());
        Ok(seal(frame, &payload))
    }

    /// Replaces the session state with a save file's.
    ///
    /// Checksum history and early remote checksums are cleared, since they
    /// describe the replaced state. Recorded checksums queued with
    /// [`Kernel::prime_playback`] are dropped as well: they are matched by
    /// position from the start of a run, so prime again after loading if a
    /// replay should keep being checked.
    ///
    /// # Errors
    ///
    /// Any data error: bad header, payload CRC mismatch, unknown tags,
    /// malformed blocks, a missing world block, or a subsystem this session
    /// has but the factory cannot build. On error the session is unchanged.
    pub fn load(&mut self, bytes: &[u8]) -> SessionResult<()> {
        let (header, payload) = unseal(bytes)?;

        let mut subsystems = Vec::with_capacity(self.subsystems.len());
        for existing in &self.subsystems {
            let name = existing.name();
            let subsystem = self
                .factory
                .subsystem(name)
                .ok_or_else(|| XferError::UnknownTag(name.to_owned()))?;
            subsystems.push(SubsystemReader { subsystem, loaded: false });
        }

        let mut target = LoadTarget {
            world: WorldReader {
                source: &self.factory,
                settings: *self.world.settings(),
                world: None,
            },
            subsystems,
        };
        let blocks = read_blocks(&mut XferLoad::new(payload), &mut target)?;

        let world = target
            .world
            .world
            .ok_or_else(|| XferError::Malformed("save has no world block".to_owned()))?;
        if world.now() != header.frame {
            return Err(XferError::Malformed(format!(
                "header says frame {} but world is at frame {}",
                header.frame,
                world.now()
            ))
            .into());
        }
        for reader in &mut target.subsystems {
            if !reader.loaded {
                warn!("Save has no block for subsystem '{}', keeping defaults", reader.subsystem.name());
            }
            reader.load_post_process()?;
        }

        self.world = world;
        self.subsystems = target.subsystems.into_iter().map(|reader| reader.subsystem).collect();
        self.validator.reset();

        info!("Loaded frame {} ({} blocks)", header.frame, blocks.len());
        Ok(())
    }

    /// Saves to a file.
    ///
    /// # Errors
    ///
    /// See [`Kernel::save`], plus I/O errors.
    pub fn save_to_file(&mut self, path: impl AsRef<Path>) -> SessionResult<()> {
        let bytes = self.save()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Loads from a file.
    ///
    /// # Errors
    ///
    /// See [`Kernel::load`], plus I/O errors.
    pub fn load_from_file(&mut self, path: impl AsRef<Path>) -> SessionResult<()> {
        let bytes = std::fs::read(path)?;
        self.load(&bytes)
    }
}
