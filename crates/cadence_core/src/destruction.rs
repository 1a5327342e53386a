//! # Destruction Queue
//!
//! Deferred deletion. `mark` flags an object and queues it; the object stays
//! registered, iterable and findable until the single end-of-frame sweep.
//!
//! ```text
//! Registered ──mark──► MarkedDestroyed (still registered) ──sweep──► Freed
//! ```

use cadence_xfer::{Snapshot, Xfer, XferResult};
use tracing::{trace, warn};

use crate::error::{KernelError, KernelResult};
use crate::id::ObjectId;
use crate::registry::UpdatableRegistry;
use crate::scheduler::SleepyScheduler;

/// FIFO list of objects awaiting the sweep.
#[derive(Debug, Default)]
pub struct DestructionQueue {
    /// Marked objects in the order they were marked.
    pending: Vec<ObjectId>,
}

impl DestructionQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of objects awaiting the sweep.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns true if nothing is queued.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Returns the queued ids in sweep order.
    #[inline]
    #[must_use]
    pub fn pending(&self) -> &[ObjectId] {
        &self.pending
    }

    /// Marks an object destroyed.
    ///
    /// The first call sets the destroyed flag, drops goal and path state,
    /// runs destroy hooks and queues the object. Later calls return
    /// `Ok(false)` and change nothing.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::NotRegistered`] for an unknown id.
    pub fn mark(&mut self, registry: &mut UpdatableRegistry, id: ObjectId) -> KernelResult<bool> {
        let object = registry.find_mut(id).ok_or(KernelError::NotRegistered(id))?;
        if object.is_destroyed() {
            return Ok(false);
        }

        object.set_destroyed();
        object.run_destroy_hooks();
        self.pending.push(id);
        trace!("Marked {} destroyed ({} pending)", id, self.pending.len());
        Ok(true)
    }

    /// Frees every queued object.
    ///
    /// Objects queued while the sweep runs, including cascades named by
    /// removal hooks, are freed in the same sweep. Returns the freed ids in
    /// the order they were freed.
    ///
    /// # Arguments
    ///
    /// * `registry` - Owner of the objects
    /// * `scheduler` - Loses every entry of every freed object
    /// * `rebuild_ratio` - Passed to [`SleepyScheduler::remove_batch`]
    ///
    /// # Errors
    ///
    /// Propagates unregister failures, which mean the registry was already
    /// inconsistent.
    pub fn sweep(
        &mut self,
        registry: &mut UpdatableRegistry,
        scheduler: &mut SleepyScheduler,
        rebuild_ratio: u32,
    ) -> KernelResult<Vec<ObjectId>> {
        let mut freed = Vec::with_capacity(self.pending.len());
        let mut cascade = Vec::new();
        let mut cursor = 0;

        while cursor < self.pending.len() {
            let id = self.pending[cursor];
            cursor += 1;

            if let Some(object) = registry.find_mut(id) {
                object.run_removal_hooks(&mut cascade);
            }
            for dependent in cascade.drain(..) {
                if !registry.contains(dependent) {
                    warn!("{} named {} for removal, but it is not registered", id, dependent);
                    continue;
                }
                self.mark(registry, dependent)?;
            }

            registry.unregister(id, scheduler, rebuild_ratio)?;
            freed.push(id);
        }

        self.pending.clear();
        Ok(freed)
    }
}

impl Snapshot for DestructionQueue {
    fn xfer(&mut self, xfer: &mut dyn Xfer) -> XferResult<()> {
        let mut count = self.pending.len();
        xfer.xfer_len(&mut count)?;
        if xfer.is_loading() {
            let mut pending = Vec::with_capacity(count.min(xfer.bytes_left().unwrap_or(0) / 8));
            for _ in 0..count {
                let mut raw = 0u64;
                xfer.xfer_u64(&mut raw)?;
                pending.push(ObjectId::new(raw));
            }
            self.pending = pending;
            return Ok(());
        }
        for id in &self.pending {
            let mut raw = id.raw();
            xfer.xfer_u64(&mut raw)?;
        }
        Ok(())
    }
}
