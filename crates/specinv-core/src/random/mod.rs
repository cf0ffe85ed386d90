pub mod mersenne;
pub mod normal;

pub use mersenne::{MersenneTwister, MtSpec, MT11213A, MT11213B, MT19937};
pub use normal::NormalDeviate;

/// A deterministic source of uniformly distributed reals in [0, 1].
pub trait UniformDeviate {
    fn next_real(&mut self) -> f64;
}
