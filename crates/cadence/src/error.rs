//! # Session Error Types
//!
//! Everything a running session can fail with: kernel logic errors, data
//! errors from state transfer, desyncs, and configuration problems.

use cadence_core::KernelError;
use cadence_xfer::XferError;
use thiserror::Error;

use crate::desync::DesyncReport;

/// Errors that can occur while driving a session.
#[derive(Error, Debug)]
pub enum SessionError {
    /// A kernel invariant was violated.
    #[error("kernel: {0}")]
    Kernel(#[from] KernelError),

    /// Saved state could not be written or read.
    #[error("state transfer: {0}")]
    Xfer(#[from] XferError),

    /// Peers disagree about the simulation state.
    #[error("desync: {0}")]
    Desync(DesyncReport),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Two subsystems share a name.
    #[error("subsystem '{0}' is already registered")]
    DuplicateSubsystem(&'static str),

    /// Reading or writing a file failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
