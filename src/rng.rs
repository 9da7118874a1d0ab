// =============================================================================
// Process-wide seeded RNG
// =============================================================================
//
// Two uses:
//   - The Market Updater's mock price random walk (needs a single shared
//     stream so successive ticks keep moving the same walk).
//   - Per-metric-kernel deterministic seeds, derived from the shared stream
//     once per run rather than once per process, so two different runs don't
//     reuse identical seeds.
//
// `rand_chacha::ChaCha8Rng` behind a `parking_lot::Mutex` mirrors how the rest
// of the crate guards shared mutable state that isn't itself async-aware.
// =============================================================================

use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub struct SharedRng {
    inner: Mutex<ChaCha8Rng>,
}

impl SharedRng {
    pub fn from_entropy() -> Self {
        Self {
            inner: Mutex::new(ChaCha8Rng::from_entropy()),
        }
    }

    #[cfg(test)]
    pub fn from_seed(seed: u64) -> Self {
        Self {
            inner: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }

    /// Draw a fresh 64-bit seed to hand to one Analysis Engine run.
    pub fn next_run_seed(&self) -> u64 {
        self.inner.lock().gen()
    }

    /// Draw a uniform sample in `[0.0, 1.0)` for the market-update walk.
    pub fn next_unit(&self) -> f64 {
        self.inner.lock().gen::<f64>()
    }
}

/// Advance `previous_price` by a uniform `±pct` random walk.
///
/// `pct` is a fraction, e.g. `0.02` for ±2%.
pub fn random_walk(previous_price: f64, pct: f64, rng: &SharedRng) -> f64 {
    let delta = (rng.next_unit() * 2.0 - 1.0) * pct;
    (previous_price * (1.0 + delta)).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_walk_stays_within_bound() {
        let rng = SharedRng::from_seed(7);
        let base = 100.0;
        for _ in 0..1000 {
            let next = random_walk(base, 0.02, &rng);
            assert!(next >= base * 0.98 - 1e-9);
            assert!(next <= base * 1.02 + 1e-9);
        }
    }

    #[test]
    fn random_walk_never_goes_negative() {
        let rng = SharedRng::from_seed(1);
        let next = random_walk(0.001, 0.02, &rng);
        assert!(next >= 0.0);
    }

    #[test]
    fn next_run_seed_varies_across_draws() {
        let rng = SharedRng::from_seed(42);
        let a = rng.next_run_seed();
        let b = rng.next_run_seed();
        assert_ne!(a, b);
    }
}
