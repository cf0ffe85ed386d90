//! Absorption-line profiles parameterized on the intergalactic medium.

use super::voigt::VoigtApproximation;
use super::{gaussian_kernel, truncate};
use crate::common::constants::{AMPLITUDE_COEFF, DAMPING_COEFF, MICRO, SPEED_OF_LIGHT_KMS};

/// The truncation of the Doppler core, in Doppler widths.
const DOPPLER_TRUNCATION_WIDTHS: f64 = 4.0;

/// The Doppler profile to model intergalactic absorption lines.
///
/// Parameters:
/// - `q[0]` rest wavelength (Angstrom)
/// - `q[1]` oscillator strength
/// - `q[2]` cosmological redshift
/// - `q[3]` radial velocity (km s-1)
/// - `q[4]` line broadening velocity (km s-1)
/// - `q[5]` decadic logarithm of the particle column number density (cm-2)
#[derive(Debug, Clone, Copy)]
pub struct DopplerProfile {
    /// The central wavelength (Angstrom).
    center: f64,
    /// The Doppler width (Angstrom).
    width: f64,
    /// The amplitude.
    amplitude: f64,
}

impl DopplerProfile {
    pub const PARAMETER_COUNT: usize = 6;

    pub fn new(q: &[f64]) -> Self {
        let center = q[0] * (1.0 + q[2]) * (1.0 + q[3] / SPEED_OF_LIGHT_KMS);
        Self {
            center,
            width: q[4] * center / SPEED_OF_LIGHT_KMS,
            amplitude: AMPLITUDE_COEFF * q[1] * 10.0_f64.powf(q[5]) * (q[0] * center),
        }
    }

    pub fn center(&self) -> f64 {
        self.center
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn value(&self, wavelength: f64) -> f64 {
        self.amplitude
            * truncate(
                gaussian_kernel,
                wavelength - self.center,
                self.width,
                DOPPLER_TRUNCATION_WIDTHS,
            )
    }
}

/// The Voigt profile to model intergalactic absorption lines, generic over
/// the approximation strategy.
///
/// Parameters are the Doppler set plus:
/// - `q[6]` damping constant (s-1)
#[derive(Debug, Clone, Copy)]
pub struct VoigtProfile<A> {
    center: f64,
    amplitude: f64,
    approximation: A,
}

impl<A: VoigtApproximation> VoigtProfile<A> {
    pub const PARAMETER_COUNT: usize = 7;

    pub fn new(q: &[f64]) -> Self {
        let center = q[0] * (1.0 + q[2]) * (1.0 + q[3] / SPEED_OF_LIGHT_KMS);
        Self {
            center,
            amplitude: AMPLITUDE_COEFF * q[1] * 10.0_f64.powf(q[5]) * (q[0] * center),
            approximation: A::approximate(
                q[4] * center / SPEED_OF_LIGHT_KMS,
                DAMPING_COEFF * q[6] * (q[0] * center),
            ),
        }
    }

    pub fn center(&self) -> f64 {
        self.center
    }

    pub fn value(&self, wavelength: f64) -> f64 {
        let x = wavelength - self.center;
        if x.abs() >= self.approximation.support_radius() {
            return 0.0;
        }
        self.amplitude * self.approximation.value(x)
    }
}

/// The Doppler profile to infer a variation of the fine-structure constant
/// by means of a many-multiplet analysis.
///
/// Parameters are the Doppler set plus:
/// - `q[6]` relativistic correction coefficient
/// - `q[7]` variation of the fine-structure constant (1E-06)
#[derive(Debug, Clone, Copy)]
pub struct ManyMultipletProfile {
    /// The modified rest wavelength (Angstrom).
    rest: f64,
    center: f64,
    width: f64,
    amplitude: f64,
}

impl ManyMultipletProfile {
    pub const PARAMETER_COUNT: usize = 8;

    pub fn new(q: &[f64]) -> Self {
        // The rest wavenumber (cm-1) is shifted by q (x^2 + 2 x) with
        // x = (delta alpha / alpha) in parts per one.
        let x = q[7] * MICRO;
        let rest = 1.0E+08 / (1.0E+08 / q[0] + q[6] * x * (x + 2.0));
        let center = rest * (1.0 + q[2]) * (1.0 + q[3] / SPEED_OF_LIGHT_KMS);

        Self {
            rest,
            center,
            width: q[4] * center / SPEED_OF_LIGHT_KMS,
            amplitude: AMPLITUDE_COEFF * q[1] * 10.0_f64.powf(q[5]) * (rest * center),
        }
    }

    pub fn rest_wavelength(&self) -> f64 {
        self.rest
    }

    pub fn center(&self) -> f64 {
        self.center
    }

    pub fn value(&self, wavelength: f64) -> f64 {
        self.amplitude
            * truncate(
                gaussian_kernel,
                wavelength - self.center,
                self.width,
                DOPPLER_TRUNCATION_WIDTHS,
            )
    }
}
