use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Arc;

/// Seedable random source shared by the fallback engine and the retry jitter.
#[derive(Clone)]
pub struct SharedRng {
    inner: Arc<Mutex<StdRng>>,
}

impl SharedRng {
    pub fn from_os_rng() -> Self {
        Self::from_rng(StdRng::from_os_rng())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    /// Seeded when a seed is configured, OS entropy otherwise
    pub fn from_seed_option(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(seed),
            None => Self::from_os_rng(),
        }
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            inner: Arc::new(Mutex::new(rng)),
        }
    }

    /// Uniform index in `0..len`. Returns 0 for empty or single-element ranges.
    pub fn index(&self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        self.inner.lock().random_range(0..len)
    }

    /// Uniform value in `0..=max`
    pub fn up_to(&self, max: u64) -> u64 {
        if max == 0 {
            return 0;
        }
        self.inner.lock().random_range(0..=max)
    }
}

impl Default for SharedRng {
    fn default() -> Self {
        Self::from_os_rng()
    }
}
