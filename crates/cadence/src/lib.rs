//! # Cadence
//!
//! Session layer over the deterministic kernel.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              KERNEL (per session)                       │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐    │
//! │  │   Subsystems    │     │   World         │     │   Checksum      │    │
//! │  │                 │────>│  (cadence_core) │────>│   Validator     │    │
//! │  │  • Script       │     │                 │     │                 │    │
//! │  │  • Terrain      │     │  • Clock        │     │  • History      │    │
//! │  │  • Auxiliary    │     │  • Registry     │     │  • Playback     │    │
//! │  └─────────────────┘     │  • Scheduler    │     │  • Policy       │    │
//! │                          │  • Destruction  │     └────────┬────────┘    │
//! │                          └─────────────────┘              │             │
//! │                                                           ▼             │
//! │                                                  desync reports         │
//! │                                                  (network layer)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `kernel`: Frame orchestration
//! - `checksum` / `desync`: Desync detection and the reporting path
//! - `persistence` / `factory`: Save and load
//! - `demo`: Sample behaviors and subsystems

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod checksum;
pub mod config;
pub mod demo;
pub mod desync;
pub mod error;
pub mod factory;
pub mod kernel;
pub mod persistence;
pub mod subsystem;

// Re-export the lower layers
pub use cadence_core as core;
pub use cadence_xfer as xfer;

pub use checksum::ChecksumValidator;
pub use config::{DesyncPolicyKind, KernelConfig};
pub use desync::{
    desync_channel, DesyncPolicy, DesyncReceiver, DesyncReport, DesyncReporter, DesyncSource,
    DesyncVerdict, StrictPolicy, TolerantPolicy,
};
pub use error::{SessionError, SessionResult};
pub use factory::ModuleFactory;
pub use kernel::{FrameReport, Kernel};
pub use subsystem::{Phase, Subsystem};
