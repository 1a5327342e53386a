//! # Logic Random
//!
//! The only source of randomness simulation code may use. Seeded, portable
//! and part of every checksum, so peers that draw the same numbers in the
//! same order stay in step, and peers that don't are caught.

use cadence_xfer::{Snapshot, Xfer, XferResult, XferVersion};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Persisted layout version.
const RANDOM_VERSION: XferVersion = 1;

/// Deterministic ChaCha stream with a persisted position.
#[derive(Clone, Debug)]
pub struct LogicRandom {
    /// Seed the stream was created from.
    seed: u64,
    /// The stream.
    rng: ChaCha8Rng,
}

impl LogicRandom {
    /// Creates a stream from `seed`.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Returns the seed.
    #[inline]
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Returns the next raw value.
    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    /// Returns a value in `low..=high`.
    #[inline]
    pub fn range(&mut self, low: u32, high: u32) -> u32 {
        if low >= high {
            return low;
        }
        self.rng.gen_range(low..=high)
    }

    /// Returns true with probability `numerator / denominator`.
    #[inline]
    pub fn chance(&mut self, numerator: u32, denominator: u32) -> bool {
        denominator > 0 && self.rng.gen_range(0..denominator) < numerator
    }
}

impl Default for LogicRandom {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Snapshot for LogicRandom {
    fn xfer(&mut self, xfer: &mut dyn Xfer) -> XferResult<()> {
        let mut version = RANDOM_VERSION;
        xfer.xfer_version(&mut version, RANDOM_VERSION)?;

        let position = self.rng.get_word_pos();
        let mut low = position as u64;
        let mut high = (position >> 64) as u64;

        xfer.xfer_u64(&mut self.seed)?;
        xfer.xfer_u64(&mut low)?;
        xfer.xfer_u64(&mut high)?;

        if xfer.is_loading() {
            self.rng = ChaCha8Rng::seed_from_u64(self.seed);
            self.rng.set_word_pos((u128::from(high) << 64) | u128::from(low));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_xfer::{XferLoad, XferSave};

    #[test]
    fn test_same_seed_same_stream() {
        let mut a = LogicRandom::new(42);
        let mut b = LogicRandom::new(42);
        for _ in 0..100 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
    }

    #[test]
    fn test_range_bounds() {
        let mut random = LogicRandom::new(7);
        for _ in 0..1_000 {
            let value = random.range(3, 9);
            assert!((3..=9).contains(&value));
        }
        assert_eq!(random.range(5, 5), 5);
        assert!(!random.chance(1, 0));
        assert!(random.chance(1, 1));
    }

    #[test]
    fn test_position_survives_save_and_load() {
        let mut original = LogicRandom::new(99);
        for _ in 0..37 {
            original.next_u32();
        }

        let mut save = XferSave::new();
        original.xfer(&mut save).unwrap();
        let bytes = save.into_bytes().unwrap();

        let mut restored = LogicRandom::new(0);
        restored.xfer(&mut XferLoad::new(&bytes)).unwrap();

        assert_eq!(restored.seed(), 99);
        for _ in 0..10 {
            assert_eq!(original.next_u32(), restored.next_u32());
        }
    }
}
