//! Absorption-line profile functions and their superposition.
//!
//! Every variant is a value object: the constructor consumes a fixed-arity
//! parameter slice and precomputes the derived quantities (central
//! wavelength, Doppler width, amplitude, Lorentzian width) so that
//! evaluation is branch-free arithmetic plus the truncation test.

pub mod lines;
pub mod voigt;

pub use lines::{DopplerProfile, ManyMultipletProfile, VoigtProfile};
pub use voigt::{ExtendedPseudoVoigt, PseudoVoigt, VoigtApproximation};

use crate::common::constants::{PI, SQRT_OF_PI};

/// The Gaussian kernel of width `gamma`.
#[inline]
pub(crate) fn gaussian_kernel(x: f64, gamma: f64) -> f64 {
    let ratio = x / gamma;
    (1.0 / (SQRT_OF_PI * gamma)) * (-ratio * ratio).exp()
}

/// The Lorentzian kernel of width `gamma`.
#[inline]
pub(crate) fn lorentzian_kernel(x: f64, gamma: f64) -> f64 {
    let ratio = x / gamma;
    1.0 / ((PI * gamma) * (1.0 + ratio * ratio))
}

/// The irrational kernel of the extended pseudo-Voigt approximation.
#[inline]
pub(crate) fn irrational_kernel(x: f64, gamma: f64) -> f64 {
    let ratio = x / gamma;
    1.0 / ((2.0 * gamma) * (1.0 + ratio * ratio).powf(1.5))
}

/// The squared hyperbolic secant kernel of the extended pseudo-Voigt
/// approximation.
#[inline]
pub(crate) fn sech_squared_kernel(x: f64, gamma: f64) -> f64 {
    let hyperbolic = (x / gamma).cosh();
    1.0 / (2.0 * gamma * hyperbolic * hyperbolic)
}

/// Truncates the support of a kernel: the kernel value inside `cutoff`
/// widths of the center, exactly zero outside.
#[inline]
pub(crate) fn truncate<F>(kernel: F, x: f64, width: f64, cutoff: f64) -> f64
where
    F: Fn(f64, f64) -> f64,
{
    if x.abs() < cutoff * width {
        kernel(x, width)
    } else {
        0.0
    }
}

/// The supported line shapes and their parameter arities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineShape {
    /// Gaussian intergalactic Doppler profile.
    Doppler,
    /// Intergalactic Voigt profile, pseudo-Voigt approximation.
    Voigt,
    /// Intergalactic Voigt profile, extended pseudo-Voigt approximation.
    ExtendedVoigt,
    /// Many-multiplet Doppler profile with a variable fine-structure
    /// constant.
    ManyMultiplet,
}

impl LineShape {
    /// The number of parameters per line.
    pub const fn arity(self) -> usize {
        match self {
            Self::Doppler => 6,
            Self::Voigt | Self::ExtendedVoigt => 7,
            Self::ManyMultiplet => 8,
        }
    }

    /// Constructs a profile instance from an arity-sized parameter slice.
    pub fn instantiate(self, q: &[f64]) -> ProfileInstance {
        debug_assert_eq!(q.len(), self.arity());
        match self {
            Self::Doppler => ProfileInstance::Doppler(DopplerProfile::new(q)),
            Self::Voigt => ProfileInstance::Voigt(VoigtProfile::new(q)),
            Self::ExtendedVoigt => ProfileInstance::ExtendedVoigt(VoigtProfile::new(q)),
            Self::ManyMultiplet => ProfileInstance::ManyMultiplet(ManyMultipletProfile::new(q)),
        }
    }
}

/// A constructed profile, dispatched by shape tag.
#[derive(Debug, Clone)]
pub enum ProfileInstance {
    Doppler(DopplerProfile),
    Voigt(VoigtProfile<PseudoVoigt>),
    ExtendedVoigt(VoigtProfile<ExtendedPseudoVoigt>),
    ManyMultiplet(ManyMultipletProfile),
}

impl ProfileInstance {
    /// The optical-depth contribution at a given wavelength (Angstrom).
    pub fn value(&self, wavelength: f64) -> f64 {
        match self {
            Self::Doppler(profile) => profile.value(wavelength),
            Self::Voigt(profile) => profile.value(wavelength),
            Self::ExtendedVoigt(profile) => profile.value(wavelength),
            Self::ManyMultiplet(profile) => profile.value(wavelength),
        }
    }
}

/// The superposition of many line profiles, evaluated by summation.
#[derive(Debug, Clone)]
pub struct Superposition {
    profiles: Vec<ProfileInstance>,
}

impl Superposition {
    /// Builds a superposition of `q.len() / shape.arity()` profiles from a
    /// flat parameter slice.
    pub fn new(shape: LineShape, q: &[f64]) -> Self {
        let arity = shape.arity();
        debug_assert_eq!(q.len() % arity, 0);

        let mut profiles = Vec::with_capacity(q.len() / arity);
        for chunk in q.chunks_exact(arity) {
            profiles.push(shape.instantiate(chunk));
        }

        Self { profiles }
    }

    pub fn profile_count(&self) -> usize {
        self.profiles.len()
    }

    /// The total optical depth at a given wavelength (Angstrom).
    pub fn value(&self, wavelength: f64) -> f64 {
        self.profiles
            .iter()
            .map(|profile| profile.value(wavelength))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::{gaussian_kernel, lorentzian_kernel, truncate, LineShape, Superposition};
    use crate::common::constants::{PI, SQRT_OF_PI};

    #[test]
    fn kernels_are_normalized_at_their_peaks() {
        assert!((gaussian_kernel(0.0, 2.0) - 1.0 / (SQRT_OF_PI * 2.0)).abs() <= 1.0e-15);
        assert!((lorentzian_kernel(0.0, 2.0) - 1.0 / (PI * 2.0)).abs() <= 1.0e-15);
    }

    #[test]
    fn truncation_is_exact_zero_outside_the_cutoff() {
        assert_eq!(truncate(gaussian_kernel, 4.0, 1.0, 4.0), 0.0);
        assert_eq!(truncate(gaussian_kernel, -7.3, 1.0, 4.0), 0.0);
        assert!(truncate(gaussian_kernel, 3.999, 1.0, 4.0) > 0.0);
    }

    #[test]
    fn arities_match_the_parameterizations() {
        assert_eq!(LineShape::Doppler.arity(), 6);
        assert_eq!(LineShape::Voigt.arity(), 7);
        assert_eq!(LineShape::ExtendedVoigt.arity(), 7);
        assert_eq!(LineShape::ManyMultiplet.arity(), 8);
    }

    #[test]
    fn superposition_sums_profile_contributions() {
        // Two identical lines must double the optical depth of one.
        let q = [1215.67, 0.4164, 1.0, 0.0, 5.0, 13.0];
        let mut doubled = Vec::new();
        doubled.extend_from_slice(&q);
        doubled.extend_from_slice(&q);

        let single = Superposition::new(LineShape::Doppler, &q);
        let pair = Superposition::new(LineShape::Doppler, &doubled);
        assert_eq!(single.profile_count(), 1);
        assert_eq!(pair.profile_count(), 2);

        let center = 1215.67 * 2.0;
        assert!((pair.value(center) - 2.0 * single.value(center)).abs() <= 1.0e-12);
    }
}
