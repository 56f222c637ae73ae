use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Uniform selection over a finite set, injected into the allocation engine
/// so tests can make prize draws deterministic.
pub trait Chooser: Send {
    /// Index in `0..len`, `None` when `len == 0`.
    fn choose_index(&mut self, len: usize) -> Option<usize>;
}

/// Default chooser backed by a seedable PRNG. Not cryptographically secure.
pub struct RandomChooser {
    rng: StdRng,
}

impl RandomChooser {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomChooser {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl Chooser for RandomChooser {
    fn choose_index(&mut self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        Some(self.rng.gen_range(0..len))
    }
}
