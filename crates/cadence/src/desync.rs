//! # Desync Reporting
//!
//! The single path a checksum mismatch travels:
//!
//! ```text
//! ┌───────────────────┐    ┌──────────────┐    ┌──────────────────┐
//! │ ChecksumValidator │───>│ DesyncPolicy │───>│  DesyncReceiver  │
//! │    (mismatch)     │    │  (verdict)   │    │ (network layer)  │
//! └───────────────────┘    └──────────────┘    └──────────────────┘
//! ```
//!
//! Every report is sent on the channel whatever the verdict. A fatal
//! verdict also fails the frame with [`SessionError::Desync`].
//!
//! [`SessionError::Desync`]: crate::SessionError::Desync

use std::fmt;

use cadence_core::Frame;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

/// Channel capacity. The validator latches after one mismatch, so this is
/// never close to full.
pub const DESYNC_CHANNEL_CAPACITY: usize = 16;

/// Where the disagreeing checksum came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DesyncSource {
    /// Another peer in the session.
    Peer(u32),
    /// A checksum recorded by an earlier run of the same inputs.
    Playback,
}

/// A checksum mismatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DesyncReport {
    /// Frame both checksums were taken on.
    pub frame: Frame,
    /// This peer's slot.
    pub local_peer: u32,
    /// Checksum computed here.
    pub local: u32,
    /// Checksum it was compared against.
    pub expected: u32,
    /// Origin of `expected`.
    pub source: DesyncSource,
}

impl fmt::Display for DesyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source {
            DesyncSource::Peer(peer) => write!(
                f,
                "frame {}: peer {} has {:08X}, peer {} has {:08X}",
                self.frame, self.local_peer, self.local, peer, self.expected
            ),
            DesyncSource::Playback => write!(
                f,
                "frame {}: computed {:08X}, recording has {:08X}",
                self.frame, self.local, self.expected
            ),
        }
    }
}

/// What a policy decides about a mismatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DesyncVerdict {
    /// End the session.
    Fatal,
    /// Report it and keep simulating.
    Tolerate,
}

/// Decides how a session reacts to a checksum mismatch.
pub trait DesyncPolicy: Send {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Returns the verdict for `report`.
    fn verdict(&self, report: &DesyncReport) -> DesyncVerdict;
}

/// Every mismatch is fatal. The multiplayer default.
#[derive(Clone, Copy, Debug, Default)]
pub struct StrictPolicy;

impl DesyncPolicy for StrictPolicy {
    fn name(&self) -> &'static str {
        "strict"
    }

    fn verdict(&self, _report: &DesyncReport) -> DesyncVerdict {
        DesyncVerdict::Fatal
    }
}

/// Mismatches are reported but never fatal. For replays and solo sessions.
#[derive(Clone, Copy, Debug, Default)]
pub struct TolerantPolicy;

impl DesyncPolicy for TolerantPolicy {
    fn name(&self) -> &'static str {
        "tolerant"
    }

    fn verdict(&self, _report: &DesyncReport) -> DesyncVerdict {
        DesyncVerdict::Tolerate
    }
}

/// Creates a connected reporter and receiver.
#[must_use]
pub fn desync_channel() -> (DesyncReporter, DesyncReceiver) {
    let (sender, receiver) = bounded(DESYNC_CHANNEL_CAPACITY);
    (DesyncReporter { sender }, DesyncReceiver { receiver })
}

/// Sending half, owned by the validator.
#[derive(Clone, Debug)]
pub struct DesyncReporter {
    sender: Sender<DesyncReport>,
}

impl DesyncReporter {
    /// Sends a report without blocking.
    ///
    /// Returns false if the report could not be queued.
    pub fn send(&self, report: DesyncReport) -> bool {
        match self.sender.try_send(report) {
            Ok(()) => true,
            Err(TrySendError::Full(report)) => {
                tracing::error!("Desync channel full, dropped report for frame {}", report.frame);
                false
            }
            // Nobody is listening; the policy verdict still applies.
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Receiving half, handed to the network layer.
#[derive(Clone, Debug)]
pub struct DesyncReceiver {
    receiver: Receiver<DesyncReport>,
}

impl DesyncReceiver {
    /// Receives one report, if any is pending.
    #[inline]
    pub fn try_recv(&self) -> Option<DesyncReport> {
        self.receiver.try_recv().ok()
    }

    /// Receives every pending report.
    pub fn drain(&self) -> Vec<DesyncReport> {
        self.receiver.try_iter().collect()
    }

    /// Returns true if a report is waiting.
    #[inline]
    #[must_use]
    pub fn has_reports(&self) -> bool {
        !self.receiver.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(frame: Frame) -> DesyncReport {
        DesyncReport {
            frame,
            local_peer: 0,
            local: 0xDEAD_BEEF,
            expected: 0x0BAD_F00D,
            source: DesyncSource::Peer(1),
        }
    }

    #[test]
    fn test_reports_reach_receiver() {
        let (reporter, receiver) = desync_channel();
        assert!(!receiver.has_reports());

        assert!(reporter.send(report(100)));
        assert!(receiver.has_reports());
        assert_eq!(receiver.try_recv(), Some(report(100)));
        assert_eq!(receiver.try_recv(), None);
    }

    #[test]
    fn test_full_channel_drops() {
        let (reporter, receiver) = desync_channel();
        for frame in 0..DESYNC_CHANNEL_CAPACITY as Frame {
            assert!(reporter.send(report(frame)));
        }
        assert!(!reporter.send(report(999)));
        assert_eq!(receiver.drain().len(), DESYNC_CHANNEL_CAPACITY);
    }

    #[test]
    fn test_disconnected_receiver() {
        let (reporter, receiver) = desync_channel();
        drop(receiver);
        assert!(!reporter.send(report(1)));
    }

    #[test]
    fn test_policies() {
        assert_eq!(StrictPolicy.verdict(&report(1)), DesyncVerdict::Fatal);
        assert_eq!(TolerantPolicy.verdict(&report(1)), DesyncVerdict::Tolerate);
    }

    #[test]
    fn test_display_names_both_sides() {
        let text = report(7).to_string();
        assert!(text.contains("DEADBEEF"));
        assert!(text.contains("0BADF00D"));
        assert!(text.contains("peer 1"));
    }
}
