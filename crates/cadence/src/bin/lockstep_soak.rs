//! # Lockstep Soak
//!
//! Runs two independent kernels from the same config and population, feeds
//! each one's checksums to the other as a remote peer, and prints a
//! summary. Exits non-zero on desync.
//!
//! Usage: `lockstep_soak [frames] [wanderers] [config.toml]`

use std::process::ExitCode;
use std::time::Instant;

use cadence::{
    demo, DesyncReport, DesyncSource, FrameReport, Kernel, KernelConfig, SessionError, SessionResult,
};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Default frames to run.
const DEFAULT_FRAMES: u64 = 10_000;

/// Default starting population.
const DEFAULT_WANDERERS: u32 = 64;

/// Parsed command line.
struct Args {
    frames: u64,
    wanderers: u32,
    config: KernelConfig,
}

fn parse_args() -> SessionResult<Args> {
    let mut args = std::env::args().skip(1);
    let frames = match args.next() {
        Some(text) => text
            .parse()
            .map_err(|_| SessionError::Config(format!("frames must be a number, got '{text}'")))?,
        None => DEFAULT_FRAMES,
    };
    let wanderers = match args.next() {
        Some(text) => text
            .parse()
            .map_err(|_| SessionError::Config(format!("wanderers must be a number, got '{text}'")))?,
        None => DEFAULT_WANDERERS,
    };
    let config = match args.next() {
        Some(path) => KernelConfig::from_file(path)?,
        None => KernelConfig::default(),
    };
    Ok(Args {
        frames,
        wanderers,
        config,
    })
}

/// Hands each peer's fresh checksum to the other.
fn exchange(a: &mut Kernel, b: &mut Kernel, ra: &FrameReport, rb: &FrameReport) -> SessionResult<()> {
    let (peer_a, peer_b) = (a.config().local_peer, b.config().local_peer);
    if let Some(crc) = ra.checksum {
        b.submit_remote_checksum(peer_a, ra.frame, crc)?;
    }
    if let Some(crc) = rb.checksum {
        a.submit_remote_checksum(peer_b, rb.frame, crc)?;
    }
    Ok(())
}

fn run(args: Args) -> SessionResult<()> {
    let mut a = demo::session(KernelConfig { local_peer: 0, ..args.config.clone() }, args.wanderers)?;
    let mut b = demo::session(KernelConfig { local_peer: 1, ..args.config }, args.wanderers)?;

    let start = Instant::now();
    let mut updates = 0u64;
    let mut swept = 0usize;
    let mut checks = 0u32;

    for _ in 0..args.frames {
        let ra = a.step()?;
        let rb = b.step()?;
        exchange(&mut a, &mut b, &ra, &rb)?;

        updates += u64::from(ra.updates);
        swept += ra.swept.len();
        if ra.checksum.is_some() {
            checks += 1;
        }
    }

    let elapsed = start.elapsed();
    let final_a = a.checksum()?;
    let final_b = b.checksum()?;
    info!(
        "{} frames in {:.2?}: {} updates, {} swept, {} live, {} checksums compared",
        a.now(),
        elapsed,
        updates,
        swept,
        a.world().registry().len(),
        checks
    );

    if final_a != final_b {
        return Err(SessionError::Desync(DesyncReport {
            frame: a.now(),
            local_peer: a.config().local_peer,
            local: final_a,
            expected: final_b,
            source: DesyncSource::Peer(b.config().local_peer),
        }));
    }
    for reports in [a.desync_reports(), b.desync_reports()] {
        if let Some(report) = reports.try_recv() {
            return Err(SessionError::Desync(report));
        }
    }

    info!("Peers agree: final checksum {:08X}", final_a);
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    match parse_args().and_then(run) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Soak failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
