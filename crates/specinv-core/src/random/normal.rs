use super::mersenne::{MersenneTwister, MT19937};
use super::UniformDeviate;

/// A standard normal deviate source layered on a uniform generator by the
/// polar (Marsaglia) method. Pairs are drawn from the open unit disk, so
/// degenerate uniform draws of exactly 0 or 1 are rejected and the source
/// never emits NaN or infinity. The partner deviate of each accepted pair
/// is cached.
#[derive(Debug, Clone)]
pub struct NormalDeviate<U> {
    uniform: U,
    cached: Option<f64>,
}

impl NormalDeviate<MersenneTwister> {
    /// A normal source backed by MT19937 and seeded by a 64-bit seed.
    pub fn with_seed(seed: u64) -> Self {
        Self::new(MersenneTwister::new(MT19937, seed))
    }
}

impl<U: UniformDeviate> NormalDeviate<U> {
    pub fn new(uniform: U) -> Self {
        Self {
            uniform,
            cached: None,
        }
    }

    /// Returns the next standard normal deviate.
    pub fn next(&mut self) -> f64 {
        if let Some(partner) = self.cached.take() {
            return partner;
        }

        loop {
            let u = 2.0 * self.uniform.next_real() - 1.0;
            let v = 2.0 * self.uniform.next_real() - 1.0;
            let q = u * u + v * v;

            if q > 0.0 && q < 1.0 {
                let scale = (-2.0 * q.ln() / q).sqrt();
                self.cached = Some(v * scale);
                return u * scale;
            }
        }
    }
}
