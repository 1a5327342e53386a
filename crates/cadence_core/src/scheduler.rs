//! # Sleepy Scheduler
//!
//! An indexable binary min-heap of update behaviors keyed by wake frame.
//!
//! ## Ordering
//!
//! ```text
//! (wake frame, priority, object id, behavior index)
//! ```
//!
//! Lower wins at every position. The key is total and built only from
//! persisted values, so two instances holding the same state always pop
//! in the same order. Insertion order and memory layout never matter.
//!
//! ## Tickets
//!
//! Each scheduled behavior holds an [`UpdateTicket`]. The ticket table records
//! where in the heap the entry currently sits, and every swap rewrites the
//! two affected records, so `erase` and `awaken` are O(log n).
//!
//! ```text
//! ticket ──► Queued(heap index) ──► heap[index].ticket == ticket
//!        └─► Idle                   (popped: running or waiting to be reinserted)
//! ```

use std::collections::BTreeSet;

use tracing::trace;

use crate::clock::Frame;
use crate::error::{KernelError, KernelResult};
use crate::id::{BehaviorRef, ObjectId};

// =============================================================================
// TICKETS AND ENTRIES
// =============================================================================

/// A behavior's claim on a place in the scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UpdateTicket(u32);

impl UpdateTicket {
    /// Returns the raw ticket number.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// One node of the heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduledEntry {
    /// Ticket the entry belongs to.
    pub ticket: UpdateTicket,
    /// Behavior to run.
    pub owner: BehaviorRef,
    /// Frame the behavior wants to run on.
    pub wake: Frame,
    /// Tie-break among equal wake frames.
    pub priority: u32,
}

impl ScheduledEntry {
    /// Full ordering key of this entry.
    #[inline]
    #[must_use]
    pub const fn key(&self) -> (Frame, u32, BehaviorRef) {
        (self.wake, self.priority, self.owner)
    }
}

#[derive(Clone, Copy, Debug)]
enum TicketState {
    Free,
    Idle {
        owner: BehaviorRef,
        wake: Frame,
        priority: u32,
    },
    Queued(usize),
}

// =============================================================================
// SLEEPY SCHEDULER
// =============================================================================

/// Priority queue of sleeping behaviors plus the always-run list.
#[derive(Debug, Default)]
pub struct SleepyScheduler {
    /// Heap-ordered entries.
    heap: Vec<ScheduledEntry>,
    /// State of every ticket ever issued, indexed by ticket number.
    tickets: Vec<TicketState>,
    /// Released ticket numbers, reused LIFO.
    free_tickets: Vec<u32>,
    /// Behaviors that run every frame.
    always_run: AlwaysRunList,
}

impl SleepyScheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a scheduler with room for `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            heap: Vec::with_capacity(capacity),
            tickets: Vec::with_capacity(capacity),
            free_tickets: Vec::new(),
            always_run: AlwaysRunList::default(),
        }
    }

    /// Returns the number of entries in the heap.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Returns true if the heap is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Returns the heap in array order.
    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[ScheduledEntry] {
        &self.heap
    }

    /// Returns the always-run list.
    #[inline]
    #[must_use]
    pub const fn always_run(&self) -> &AlwaysRunList {
        &self.always_run
    }

    /// Returns the always-run list for modification.
    #[inline]
    pub fn always_run_mut(&mut self) -> &mut AlwaysRunList {
        &mut self.always_run
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    fn state(&self, ticket: UpdateTicket) -> KernelResult<TicketState> {
        match self.tickets.get(ticket.0 as usize) {
            None | Some(TicketState::Free) => Err(KernelError::UnknownTicket(ticket.0)),
            Some(state) => Ok(*state),
        }
    }

    /// Returns the heap position of `ticket`, or `None` if it is not queued.
    #[must_use]
    pub fn heap_index(&self, ticket: UpdateTicket) -> Option<usize> {
        match self.tickets.get(ticket.0 as usize) {
            Some(TicketState::Queued(index)) => Some(*index),
            _ => None,
        }
    }

    /// Returns the wake frame recorded for `ticket`.
    #[must_use]
    pub fn wake_frame(&self, ticket: UpdateTicket) -> Option<Frame> {
        match self.state(ticket).ok()? {
            TicketState::Queued(index) => Some(self.heap[index].wake),
            TicketState::Idle { wake, .. } => Some(wake),
            TicketState::Free => None,
        }
    }

    /// Returns the minimum entry without removing it.
    #[inline]
    #[must_use]
    pub fn peek(&self) -> Option<&ScheduledEntry> {
        self.heap.first()
    }

    // -------------------------------------------------------------------------
    // Mutation
    // -------------------------------------------------------------------------

    /// Issues a ticket for `owner` and pushes it at `wake`.
    ///
    /// # Arguments
    ///
    /// * `owner` - Behavior to run
    /// * `wake` - First frame it should run on
    /// * `priority` - Tie-break among equal wake frames
    pub fn schedule(&mut self, owner: BehaviorRef, wake: Frame, priority: u32) -> UpdateTicket {
        let state = TicketState::Idle {
            owner,
            wake,
            priority,
        };
        let ticket = if let Some(raw) = self.free_tickets.pop() {
            self.tickets[raw as usize] = state;
            UpdateTicket(raw)
        } else {
            self.tickets.push(state);
            UpdateTicket((self.tickets.len() - 1) as u32)
        };

        self.push_entry(ScheduledEntry {
            ticket,
            owner,
            wake,
            priority,
        });
        trace!("Scheduled {} at frame {} (priority {})", owner, wake, priority);
        ticket
    }

    /// Pushes a popped ticket back with a new wake frame.
    ///
    /// # Errors
    ///
    /// Fails if the ticket was released or is already queued.
    pub fn reinsert(&mut self, ticket: UpdateTicket, wake: Frame) -> KernelResult<()> {
        match self.state(ticket)? {
            TicketState::Idle {
                owner, priority, ..
            } => {
                self.push_entry(ScheduledEntry {
                    ticket,
                    owner,
                    wake,
                    priority,
                });
                Ok(())
            }
            TicketState::Queued(index) => Err(KernelError::AlreadyScheduled(self.heap[index].owner)),
            TicketState::Free => Err(KernelError::UnknownTicket(ticket.0)),
        }
    }

    /// Removes and returns the minimum entry.
    ///
    /// The ticket stays allocated in the idle state until it is reinserted
    /// or released.
    pub fn pop(&mut self) -> Option<ScheduledEntry> {
        if self.heap.is_empty() {
            return None;
        }
        self.erase(0)
    }

    /// Pops the minimum entry if it is due on or before `now`.
    pub fn pop_due(&mut self, now: Frame) -> Option<ScheduledEntry> {
        match self.heap.first() {
            Some(entry) if entry.wake <= now => self.pop(),
            _ => None,
        }
    }

    /// Moves a queued entry to a new wake frame.
    ///
    /// Returns whether the entry moved. Requesting the frame it already
    /// has is a no-op, and so is asking for the next frame when the entry
    /// is already due: pushing it forward would make it miss the current
    /// frame.
    ///
    /// # Arguments
    ///
    /// * `ticket` - Entry to move
    /// * `wake` - New wake frame
    /// * `now` - Current frame
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::WakeInPast`] for a frame before `now` and
    /// [`KernelError::NotScheduled`] if the entry is not in the heap.
    pub fn awaken(&mut self, ticket: UpdateTicket, wake: Frame, now: Frame) -> KernelResult<bool> {
        let index = match self.state(ticket)? {
            TicketState::Queued(index) => index,
            TicketState::Idle { owner, .. } => return Err(KernelError::NotScheduled(owner)),
            TicketState::Free => return Err(KernelError::UnknownTicket(ticket.0)),
        };
        if wake < now {
            return Err(KernelError::WakeInPast {
                requested: wake,
                now,
            });
        }

        let current = self.heap[index].wake;
        if wake == current || (current <= now && wake == now.saturating_add(1)) {
            return Ok(false);
        }

        self.heap[index].wake = wake;
        self.rebalance(index);
        trace!("Awakened {} for frame {} (was {})", self.heap_owner(ticket), wake, current);
        Ok(true)
    }

    /// Removes the entry at heap position `index`.
    ///
    /// The last entry takes its place and is sifted up or down, whichever
    /// restores order. The removed ticket stays allocated in the idle state.
    pub fn erase(&mut self, index: usize) -> Option<ScheduledEntry> {
        if index >= self.heap.len() {
            return None;
        }

        let entry = self.heap.swap_remove(index);
        self.tickets[entry.ticket.0 as usize] = TicketState::Idle {
            owner: entry.owner,
            wake: entry.wake,
            priority: entry.priority,
        };

        if index < self.heap.len() {
            self.place(index);
            self.rebalance(index);
        }
        Some(entry)
    }

    /// Releases a ticket, removing its entry from the heap if queued.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::UnknownTicket`] if it was already released.
    pub fn remove(&mut self, ticket: UpdateTicket) -> KernelResult<BehaviorRef> {
        let owner = match self.state(ticket)? {
            TicketState::Queued(index) => self.erase(index).map(|entry| entry.owner),
            TicketState::Idle { owner, .. } => Some(owner),
            TicketState::Free => None,
        }
        .ok_or(KernelError::UnknownTicket(ticket.0))?;

        self.tickets[ticket.0 as usize] = TicketState::Free;
        self.free_tickets.push(ticket.0);
        Ok(owner)
    }

    /// Releases many tickets at once.
    ///
    /// Each removal looks up the ticket's current position, since earlier
    /// removals move other entries. When more than `len / rebuild_ratio`
    /// queued entries go at once the survivors are re-heapified in one pass
    /// instead. A ratio of zero never rebuilds.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::UnknownTicket`] before touching anything if any
    /// ticket is already released.
    pub fn remove_batch(&mut self, tickets: &[UpdateTicket], rebuild_ratio: u32) -> KernelResult<usize> {
        let mut queued = 0usize;
        for &ticket in tickets {
            if let TicketState::Queued(_) = self.state(ticket)? {
                queued += 1;
            }
        }

        if rebuild_ratio > 0 && queued > 1 && queued * rebuild_ratio as usize > self.heap.len() {
            for &ticket in tickets {
                self.tickets[ticket.0 as usize] = TicketState::Free;
                self.free_tickets.push(ticket.0);
            }
            let states = &self.tickets;
            self.heap
                .retain(|entry| !matches!(states[entry.ticket.0 as usize], TicketState::Free));
            self.rebuild();
            trace!("Batch removed {} entries with rebuild", queued);
        } else {
            for &ticket in tickets {
                self.remove(ticket)?;
            }
        }
        Ok(tickets.len())
    }

    /// Restores heap order over the whole array.
    pub fn rebuild(&mut self) {
        for index in 0..self.heap.len() {
            self.place(index);
        }
        for index in (0..self.heap.len() / 2).rev() {
            self.sift_down(index);
        }
    }

    /// Checks that every recorded index matches its position and that no
    /// node precedes its parent.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::HeapCorrupted`] at the first violation.
    pub fn validate(&self) -> KernelResult<()> {
        for (index, entry) in self.heap.iter().enumerate() {
            match self.tickets.get(entry.ticket.0 as usize) {
                Some(TicketState::Queued(recorded)) if *recorded == index => {}
                _ => {
                    return Err(KernelError::HeapCorrupted {
                        index,
                        reason: "recorded index does not match position",
                    })
                }
            }
            if index > 0 && entry.key() < self.heap[(index - 1) / 2].key() {
                return Err(KernelError::HeapCorrupted {
                    index,
                    reason: "node precedes its parent",
                });
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Heap internals
    // -------------------------------------------------------------------------

    fn heap_owner(&self, ticket: UpdateTicket) -> BehaviorRef {
        match self.tickets[ticket.0 as usize] {
            TicketState::Queued(index) => self.heap[index].owner,
            TicketState::Idle { owner, .. } => owner,
            TicketState::Free => BehaviorRef::new(ObjectId::INVALID, 0),
        }
    }

    fn push_entry(&mut self, entry: ScheduledEntry) {
        let index = self.heap.len();
        self.heap.push(entry);
        self.place(index);
        self.sift_up(index);
    }

    #[inline]
    fn place(&mut self, index: usize) {
        let ticket = self.heap[index].ticket;
        self.tickets[ticket.0 as usize] = TicketState::Queued(index);
    }

    #[inline]
    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.place(a);
        self.place(b);
    }

    fn sift_up(&mut self, mut index: usize) -> bool {
        let start = index;
        while index > 0 {
            let parent = (index - 1) / 2;
            if self.heap[index].key() >= self.heap[parent].key() {
                break;
            }
            self.swap(index, parent);
            index = parent;
        }
        index != start
    }

    fn sift_down(&mut self, mut index: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * index + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let child = if right < len && self.heap[right].key() < self.heap[left].key() {
                right
            } else {
                left
            };
            if self.heap[child].key() >= self.heap[index].key() {
                break;
            }
            self.swap(index, child);
            index = child;
        }
    }

    fn rebalance(&mut self, index: usize) {
        if !self.sift_up(index) {
            self.sift_down(index);
        }
    }
}

// =============================================================================
// ALWAYS-RUN LIST
// =============================================================================

/// Behaviors that never sleep, run every frame in `(priority, owner)` order.
#[derive(Debug, Default)]
pub struct AlwaysRunList {
    /// Ordered members.
    members: BTreeSet<(u32, BehaviorRef)>,
}

impl AlwaysRunList {
    /// Adds a behavior. Returns false if it was already present.
    pub fn insert(&mut self, owner: BehaviorRef, priority: u32) -> bool {
        self.members.insert((priority, owner))
    }

    /// Removes a behavior. Returns false if it was not present.
    pub fn remove(&mut self, owner: BehaviorRef, priority: u32) -> bool {
        self.members.remove(&(priority, owner))
    }

    /// Returns the number of members.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if there are no members.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Returns the members in run order.
    ///
    /// The list is copied so behaviors may spawn or destroy objects while
    /// the frame walks it.
    #[must_use]
    pub fn snapshot(&self) -> Vec<BehaviorRef> {
        self.members.iter().map(|&(_, owner)| owner).collect()
    }
}
