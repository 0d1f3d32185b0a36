//! Injectable randomness for the pricing engine and event generator.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

/// Source of random draws. Implementations must be `Send + Sync` so the
/// simulation state can live in an ECS resource and move across threads.
pub trait RandomSource: Send + Sync {
    /// Uniform draw in `[low, high]`.
    fn uniform(&mut self, low: f64, high: f64) -> f64;

    /// Normal draw with the given mean and standard deviation.
    fn normal(&mut self, mean: f64, std_dev: f64) -> f64;

    /// Bernoulli trial with probability `p`.
    fn chance(&mut self, p: f64) -> bool {
        self.uniform(0.0, 1.0) < p
    }

    /// Uniform index in `0..len`. `len` must be > 0.
    fn pick(&mut self, len: usize) -> usize {
        let u = self.uniform(0.0, 1.0);
        ((u * len as f64) as usize).min(len.saturating_sub(1))
    }
}

/// Reproducible ChaCha8-backed source.
#[derive(Clone, Debug)]
pub struct SeededRandom {
    rng: ChaCha8Rng,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl RandomSource for SeededRandom {
    fn uniform(&mut self, low: f64, high: f64) -> f64 {
        if high <= low {
            return low;
        }
        self.rng.gen_range(low..=high)
    }

    fn normal(&mut self, mean: f64, std_dev: f64) -> f64 {
        match Normal::new(mean, std_dev) {
            Ok(dist) => dist.sample(&mut self.rng),
            Err(_) => mean,
        }
    }
}

/// Deterministic source replaying fixed sequences, for tests and demos.
///
/// Unit draws are values in `[0, 1]` mapped onto the requested range; normal
/// draws are standard scores scaled by the requested deviation. Each sequence
/// cycles; an empty sequence yields the midpoint (0.5) or a zero score.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRandom {
    units: Vec<f64>,
    unit_idx: usize,
    scores: Vec<f64>,
    score_idx: usize,
}

impl ScriptedRandom {
    /// Source that never perturbs anything.
    pub fn neutral() -> Self {
        Self::default()
    }

    pub fn with_units(mut self, units: Vec<f64>) -> Self {
        self.units = units;
        self
    }

    pub fn with_scores(mut self, scores: Vec<f64>) -> Self {
        self.scores = scores;
        self
    }

    fn next_unit(&mut self) -> f64 {
        if self.units.is_empty() {
            return 0.5;
        }
        let u = self.units[self.unit_idx % self.units.len()];
        self.unit_idx += 1;
        u.clamp(0.0, 1.0)
    }

    fn next_score(&mut self) -> f64 {
        if self.scores.is_empty() {
            return 0.0;
        }
        let z = self.scores[self.score_idx % self.scores.len()];
        self.score_idx += 1;
        z
    }
}

impl RandomSource for ScriptedRandom {
    fn uniform(&mut self, low: f64, high: f64) -> f64 {
        low + self.next_unit() * (high - low)
    }

    fn normal(&mut self, mean: f64, std_dev: f64) -> f64 {
        mean + std_dev * self.next_score()
    }
}
