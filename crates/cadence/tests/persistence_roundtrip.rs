//! # Persistence Round Trip
//!
//! A reloaded session must checksum exactly like the one that was saved and
//! keep doing so frame after frame.

use cadence::demo;
use cadence::{Kernel, KernelConfig, SessionError};

fn config() -> KernelConfig {
    KernelConfig {
        crc_interval: 0,
        random_seed: 77,
        validate_scheduler: true,
        ..KernelConfig::default()
    }
}

fn session(wanderers: u32) -> Kernel {
    demo::session(config(), wanderers).unwrap()
}

#[test]
fn test_reload_reproduces_checksum_and_future() {
    let mut original = session(30);
    original.run(137).unwrap();
    let before = original.checksum().unwrap();
    let bytes = original.save().unwrap();

    // Different starting population; the load replaces all of it.
    let mut restored = session(3);
    restored.load(&bytes).unwrap();

    assert_eq!(restored.now(), 137);
    assert_eq!(restored.checksum().unwrap(), before);
    assert_eq!(
        restored.world().registry().len(),
        original.world().registry().len()
    );

    for _ in 0..200 {
        let a = original.step().unwrap();
        let b = restored.step().unwrap();
        assert_eq!(a, b);
        assert_eq!(original.checksum().unwrap(), restored.checksum().unwrap());
    }
}

#[test]
fn test_save_mid_destruction_keeps_pending_queue() {
    let mut original = session(10);
    original.run(5).unwrap();
    let victim = original.world().objects().nth(3).map(|o| o.id()).unwrap();
    original.destroy(victim).unwrap();

    let bytes = original.save().unwrap();
    let mut restored = session(0);
    restored.load(&bytes).unwrap();

    let object = restored.world().find(victim).unwrap();
    assert!(object.is_destroyed());
    assert_eq!(restored.world().destruction().pending(), &[victim]);

    let report = restored.step().unwrap();
    assert_eq!(report.swept.first(), Some(&victim));
    assert!(restored.world().find(victim).is_none());
}

#[test]
fn test_ids_are_not_reused_after_reload() {
    let mut original = session(5);
    original.run(10).unwrap();
    let highest = original.world().registry().ids().max().unwrap();
    let bytes = original.save().unwrap();

    let mut restored = session(0);
    restored.load(&bytes).unwrap();
    let fresh = restored.spawn(demo::Wanderer::blueprint("late", 0)).unwrap();
    assert!(fresh > highest);
    assert_eq!(fresh, original.spawn(demo::Wanderer::blueprint("late", 0)).unwrap());
}

#[test]
fn test_file_round_trip() {
    let path = std::env::temp_dir().join(format!("cadence-roundtrip-{}.sav", std::process::id()));

    let mut original = session(8);
    original.run(42).unwrap();
    original.save_to_file(&path).unwrap();

    let mut restored = session(0);
    restored.load_from_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(restored.checksum().unwrap(), original.checksum().unwrap());
}

#[test]
fn test_truncated_file_is_rejected_without_side_effects() {
    let mut original = session(8);
    original.run(12).unwrap();
    let bytes = original.save().unwrap();

    let mut other = session(2);
    other.run(3).unwrap();
    let before = other.checksum().unwrap();

    assert!(matches!(other.load(&bytes[..bytes.len() / 2]), Err(SessionError::Xfer(_))));
    assert_eq!(other.now(), 3);
    assert_eq!(other.checksum().unwrap(), before);
}

#[test]
fn test_missing_file() {
    let mut kernel = session(0);
    assert!(matches!(
        kernel.load_from_file("/nonexistent/cadence.sav"),
        Err(SessionError::Io(_))
    ));
}
