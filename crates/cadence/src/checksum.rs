//! # Checksum Validator
//!
//! Keeps the last N local checksums and compares them with checksums from
//! other peers and from recordings. Remote checksums may arrive before or
//! after the local one for the same frame; whichever comes second triggers
//! the comparison.
//!
//! After the first mismatch the validator latches: the session is already
//! diverged and further comparisons would only repeat the news.

use std::collections::{BTreeMap, VecDeque};

use cadence_core::Frame;
use tracing::{error, trace, warn};

use crate::desync::{
    desync_channel, DesyncPolicy, DesyncReceiver, DesyncReport, DesyncReporter, DesyncSource,
    DesyncVerdict,
};
use crate::error::{SessionError, SessionResult};

/// Rolling checksum history and comparison state.
pub struct ChecksumValidator {
    /// Cadence in frames; 0 disables.
    interval: u64,
    /// Maximum retained local checksums.
    capacity: usize,
    /// This peer's slot.
    local_peer: u32,
    /// `(frame, checksum)`, oldest first.
    history: VecDeque<(Frame, u32)>,
    /// Remote checksums for frames not yet computed here, by frame then peer.
    early: BTreeMap<Frame, BTreeMap<u32, u32>>,
    /// Recorded checksums still to be matched, in order.
    playback: VecDeque<u32>,
    /// Decides what a mismatch does.
    policy: Box<dyn DesyncPolicy>,
    /// Sending half of the reporting path.
    reporter: DesyncReporter,
    /// Receiving half, cloned out to listeners.
    receiver: DesyncReceiver,
    /// Frame of the first mismatch.
    mismatch: Option<Frame>,
}

impl ChecksumValidator {
    /// Creates a validator.
    ///
    /// # Arguments
    ///
    /// * `interval` - Checksum cadence in frames, 0 to disable
    /// * `capacity` - Local checksums retained
    /// * `local_peer` - This peer's slot
    /// * `policy` - Verdict on mismatches
    #[must_use]
    pub fn new(interval: u64, capacity: usize, local_peer: u32, policy: Box<dyn DesyncPolicy>) -> Self {
        let (reporter, receiver) = desync_channel();
        Self {
            interval,
            capacity: capacity.max(1),
            local_peer,
            history: VecDeque::with_capacity(capacity),
            early: BTreeMap::new(),
            playback: VecDeque::new(),
            policy,
            reporter,
            receiver,
            mismatch: None,
        }
    }

    /// Returns true if a checksum should be taken on `frame`.
    #[inline]
    #[must_use]
    pub const fn is_due(&self, frame: Frame) -> bool {
        self.interval > 0 && frame % self.interval == 0
    }

    /// Returns a receiver for desync reports.
    #[must_use]
    pub fn reports(&self) -> DesyncReceiver {
        self.receiver.clone()
    }

    /// Returns the name of the active policy.
    #[must_use]
    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Returns the frame of the first mismatch, if one was seen.
    #[inline]
    #[must_use]
    pub const fn mismatch(&self) -> Option<Frame> {
        self.mismatch
    }

    /// Returns the local checksum for `frame`, if still retained.
    #[must_use]
    pub fn checksum_at(&self, frame: Frame) -> Option<u32> {
        self.history
            .iter()
            .find(|&&(f, _)| f == frame)
            .map(|&(_, crc)| crc)
    }

    /// Returns the newest local checksum.
    #[must_use]
    pub fn latest(&self) -> Option<(Frame, u32)> {
        self.history.back().copied()
    }

    /// Iterates retained local checksums, oldest first.
    pub fn history(&self) -> impl Iterator<Item = (Frame, u32)> + '_ {
        self.history.iter().copied()
    }

    /// Queues checksums recorded by an earlier run. Each local checksum is
    /// compared with the next queued one.
    pub fn prime_playback(&mut self, recorded: impl IntoIterator<Item = u32>) {
        self.playback.extend(recorded);
    }

    /// Returns the number of recorded checksums not yet matched.
    #[inline]
    #[must_use]
    pub fn playback_remaining(&self) -> usize {
        self.playback.len()
    }

    /// Forgets every checksum, recorded playback included. Used when a load
    /// replaces the state they describe. The mismatch latch survives.
    pub fn reset(&mut self) {
        if !self.playback.is_empty() {
            warn!(
                "Discarding {} recorded checksums; playback does not survive a load",
                self.playback.len()
            );
        }
        self.history.clear();
        self.early.clear();
        self.playback.clear();
    }

    /// Returns the number of remote checksums held for frames not yet
    /// computed here.
    #[must_use]
    pub fn pending_remote(&self) -> usize {
        self.early.values().map(BTreeMap::len).sum()
    }

    /// Records a checksum computed here and compares it with everything
    /// already waiting for it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Desync`] if a comparison fails and the
    /// policy calls it fatal.
    pub fn record_local(&mut self, frame: Frame, checksum: u32) -> SessionResult<()> {
        trace!("Checksum for frame {} is {:08X}", frame, checksum);
        self.history.push_back((frame, checksum));
        while self.history.len() > self.capacity {
            self.history.pop_front();
        }

        let waiting = self.early.remove(&frame).unwrap_or_default();
        let later = self.early.split_off(&(frame + 1));
        for (stale, peers) in std::mem::replace(&mut self.early, later) {
            warn!(
                "Dropping {} remote checksums for frame {}: never computed here",
                peers.len(),
                stale
            );
        }

        if let Some(expected) = self.playback.pop_front() {
            self.compare(frame, checksum, expected, DesyncSource::Playback)?;
        }
        for (peer, expected) in waiting {
            self.compare(frame, checksum, expected, DesyncSource::Peer(peer))?;
        }
        Ok(())
    }

    /// Accepts a checksum from another peer.
    ///
    /// Compared immediately if the local checksum for `frame` is retained,
    /// held if `frame` has not been computed here yet, and dropped with a
    /// warning if it is older than the retained history or not on this
    /// peer's checksum cadence.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Desync`] if the comparison fails and the
    /// policy calls it fatal.
    pub fn submit_remote(&mut self, peer: u32, frame: Frame, checksum: u32) -> SessionResult<()> {
        if self.mismatch.is_some() {
            return Ok(());
        }

        if !self.is_due(frame) {
            warn!(
                "Dropping checksum {:08X} from peer {} for frame {}: off the {}-frame cadence",
                checksum, peer, frame, self.interval
            );
            return Ok(());
        }

        if let Some(local) = self.checksum_at(frame) {
            return self.compare(frame, local, checksum, DesyncSource::Peer(peer));
        }

        let newest = self.latest().map_or(0, |(f, _)| f);
        if self.history.is_empty() || frame > newest {
            self.early.entry(frame).or_default().insert(peer, checksum);
        } else {
            warn!(
                "Dropping checksum from peer {} for frame {}: older than retained history",
                peer, frame
            );
        }
        Ok(())
    }

    fn compare(&mut self, frame: Frame, local: u32, expected: u32, source: DesyncSource) -> SessionResult<()> {
        if self.mismatch.is_some() || local == expected {
            return Ok(());
        }

        self.mismatch = Some(frame);
        let report = DesyncReport {
            frame,
            local_peer: self.local_peer,
            local,
            expected,
            source,
        };
        self.reporter.send(report.clone());

        match self.policy.verdict(&report) {
            DesyncVerdict::Fatal => {
                error!("Desync ({} policy): {}", self.policy.name(), report);
                Err(SessionError::Desync(report))
            }
            DesyncVerdict::Tolerate => {
                warn!("Desync tolerated ({} policy): {}", self.policy.name(), report);
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for ChecksumValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChecksumValidator")
            .field("interval", &self.interval)
            .field("policy", &self.policy.name())
            .field("retained", &self.history.len())
            .field("mismatch", &self.mismatch)
            .finish_non_exhaustive()
    }
}
