//! # Lockstep Determinism
//!
//! Two kernels built independently from the same config and inputs must
//! agree at every checkpoint; any divergence must come out of the single
//! reporting path.

use cadence::demo::{self, Wanderer};
use cadence::{DesyncPolicyKind, DesyncSource, Kernel, KernelConfig, SessionError};

fn config(peer: u32, policy: DesyncPolicyKind) -> KernelConfig {
    KernelConfig {
        crc_interval: 10,
        crc_history: 8,
        random_seed: 0xC0FFEE,
        validate_scheduler: true,
        desync_policy: policy,
        local_peer: peer,
        ..KernelConfig::default()
    }
}

fn pair(policy: DesyncPolicyKind) -> (Kernel, Kernel) {
    (
        demo::session(config(0, policy), 40).unwrap(),
        demo::session(config(1, policy), 40).unwrap(),
    )
}

#[test]
fn test_independent_kernels_agree_at_every_checkpoint() {
    let (mut a, mut b) = pair(DesyncPolicyKind::Strict);

    let mut checkpoints = 0;
    for _ in 0..400 {
        let ra = a.step().unwrap();
        let rb = b.step().unwrap();
        assert_eq!(ra, rb);

        if let (Some(crc_a), Some(crc_b)) = (ra.checksum, rb.checksum) {
            b.submit_remote_checksum(0, ra.frame, crc_a).unwrap();
            a.submit_remote_checksum(1, rb.frame, crc_b).unwrap();
            checkpoints += 1;
        }
    }

    assert_eq!(checkpoints, 40);
    assert_eq!(a.checksum().unwrap(), b.checksum().unwrap());
    assert!(!a.desync_reports().has_reports());
    assert!(!b.desync_reports().has_reports());
    assert!(a.world().registry().len() > 1);
}

#[test]
fn test_different_seeds_diverge() {
    let mut a = demo::session(config(0, DesyncPolicyKind::Strict), 40).unwrap();
    let mut b = demo::session(
        KernelConfig {
            random_seed: 1,
            ..config(1, DesyncPolicyKind::Strict)
        },
        40,
    )
    .unwrap();

    a.run(10).unwrap();
    b.run(10).unwrap();
    assert_ne!(a.checksum().unwrap(), b.checksum().unwrap());
}

/// Steps both peers, exchanging checksums, until one call fails.
fn run_until_desync(a: &mut Kernel, b: &mut Kernel, frames: u64) -> Option<SessionError> {
    for _ in 0..frames {
        let ra = match a.step() {
            Ok(report) => report,
            Err(e) => return Some(e),
        };
        let rb = match b.step() {
            Ok(report) => report,
            Err(e) => return Some(e),
        };
        if let Some(crc) = ra.checksum {
            if let Err(e) = b.submit_remote_checksum(0, ra.frame, crc) {
                return Some(e);
            }
        }
        if let Some(crc) = rb.checksum {
            if let Err(e) = a.submit_remote_checksum(1, rb.frame, crc) {
                return Some(e);
            }
        }
    }
    None
}

#[test]
fn test_strict_divergence_is_fatal_and_reported() {
    let (mut a, mut b) = pair(DesyncPolicyKind::Strict);
    let reports = b.desync_reports();

    a.run(25).unwrap();
    b.run(25).unwrap();
    // Frames 10 and 20 were checksummed but never exchanged; exchange from here on.
    b.spawn(Wanderer::blueprint("stowaway", 0)).unwrap();

    let err = run_until_desync(&mut a, &mut b, 20).expect("peers should diverge");
    let SessionError::Desync(report) = err else {
        panic!("expected a desync");
    };
    assert_eq!(report.frame, 30);
    assert_eq!(report.local_peer, 1);
    assert_eq!(report.source, DesyncSource::Peer(0));
    assert_eq!(reports.drain(), vec![report]);
}

#[test]
fn test_tolerant_divergence_reports_once_and_continues() {
    let (mut a, mut b) = pair(DesyncPolicyKind::Tolerant);
    let reports_a = a.desync_reports();
    let reports_b = b.desync_reports();

    b.spawn(Wanderer::blueprint("stowaway", 0)).unwrap();
    assert!(run_until_desync(&mut a, &mut b, 100).is_none());

    assert_eq!(a.now(), 100);
    assert_eq!(reports_a.drain().len(), 1);
    assert_eq!(reports_b.drain().len(), 1);
    assert_eq!(a.validator().mismatch(), Some(10));
}

#[test]
fn test_playback_of_recorded_checksums() {
    let mut recorder = demo::session(config(0, DesyncPolicyKind::Strict), 20).unwrap();
    let recorded: Vec<u32> = recorder
        .run(120)
        .unwrap()
        .into_iter()
        .filter_map(|r| r.checksum)
        .collect();
    assert_eq!(recorded.len(), 12);

    let mut replay = demo::session(config(0, DesyncPolicyKind::Strict), 20).unwrap();
    replay.prime_playback(recorded.iter().copied());
    replay.run(120).unwrap();
    assert_eq!(replay.validator().playback_remaining(), 0);

    let mut tampered = recorded;
    tampered[5] ^= 1;
    let mut replay = demo::session(config(0, DesyncPolicyKind::Strict), 20).unwrap();
    replay.prime_playback(tampered);
    let err = replay.run(120).unwrap_err();
    assert!(matches!(
        err,
        SessionError::Desync(cadence::DesyncReport { frame: 60, source: DesyncSource::Playback, .. })
    ));
}
