//! Refraction equations from the literature, used to convert photon
//! wavelengths between air and vacuum, plus the radial-velocity shift.
//!
//! All refraction equations operate on the vacuum wavenumber in nm-1,
//! i.e. 10 / wavelength (Angstrom), and return the air wavenumber in the
//! same unit.

use crate::common::constants::SPEED_OF_LIGHT_KMS;
use crate::domain::{ComputeResult, FitError};

/// The default accuracy goal of the Newton inversion.
const NEWTON_ACCURACY: f64 = 1.0e-8;

/// The iteration cap of the Newton inversion.
const NEWTON_ITERATION_LIMIT: usize = 100;

/// Used to convert photon wavelength in vacuum to photon wavelength in
/// air.
///
/// Further reading:
///
/// K. P. Birch and M. J. Downs (1994).
///   *Correction to the Updated Edlen Equation for the Refractive Index
///   of Air.* Metrologia, 31, 4, 315.
pub fn birch94(x: f64) -> f64 {
    (1.0 + 8.34254e-05 + 2.406147e-08 / (130.0e-06 - x * x) + 1.5998e-10 / (38.9e-06 - x * x)) * x
}

/// The Birch & Downs (1994) equation and its derivative.
pub fn birch94_with_derivative(x: f64) -> (f64, f64) {
    let a = 130.0e-06 - x * x;
    let b = 38.9e-06 - x * x;
    let y = (1.0 + 8.34254e-05 + 2.406147e-08 / a + 1.5998e-10 / b) * x;
    let derivative = 1.0
        + 8.34254e-05
        + 2.406147e-08 * (130.0e-06 + x * x) / (a * a)
        + 1.5998e-10 * (38.9e-06 + x * x) / (b * b);
    (y, derivative)
}

/// Used to convert photon wavelength in vacuum to photon wavelength in
/// air. This formula is the IAU standard for the vacuum to standard air
/// corrections.
///
/// Further reading:
///
/// B. Edlen (1953). *The dispersion of standard air.*
///   Journal of the Optical Society of America, 43, 5, 339.
pub fn edlen53(x: f64) -> f64 {
    (1.0 + 6.43280e-05 + 2.5540e-10 / (0.0000410 - x * x) + 2.949810e-08 / (0.000146 - x * x)) * x
}

/// The Edlen (1953) equation and its derivative.
pub fn edlen53_with_derivative(x: f64) -> (f64, f64) {
    let a = 0.0000410 - x * x;
    let b = 0.000146 - x * x;
    let y = (1.0 + 6.43280e-05 + 2.5540e-10 / a + 2.949810e-08 / b) * x;
    let derivative = 1.0
        + 6.43280e-05
        + 2.5540e-10 * (0.0000410 + x * x) / (a * a)
        + 2.949810e-08 * (0.000146 + x * x) / (b * b);
    (y, derivative)
}

/// Used to convert photon wavelength in vacuum to photon wavelength in
/// air.
///
/// Further reading:
///
/// B. Edlen (1966). *The refractive index of air.*
///   Metrologia, 2, 2, 71-80.
pub fn edlen66(x: f64) -> f64 {
    (1.0 + 8.34213e-05 + 1.5997e-10 / (0.0000389 - x * x) + 2.406030e-08 / (0.000130 - x * x)) * x
}

/// The Edlen (1966) equation and its derivative.
pub fn edlen66_with_derivative(x: f64) -> (f64, f64) {
    let a = 0.0000389 - x * x;
    let b = 0.000130 - x * x;
    let y = (1.0 + 8.34213e-05 + 1.5997e-10 / a + 2.406030e-08 / b) * x;
    let derivative = 1.0
        + 8.34213e-05
        + 1.5997e-10 * (0.0000389 + x * x) / (a * a)
        + 2.406030e-08 * (0.000130 + x * x) / (b * b);
    (y, derivative)
}

/// Solves f(x) = c by Newton's method, starting from `x`.
pub fn solve_by_newton<F>(function: F, c: f64, mut x: f64) -> ComputeResult<f64>
where
    F: Fn(f64) -> (f64, f64),
{
    for _ in 0..NEWTON_ITERATION_LIMIT {
        let (y, derivative) = function(x);
        let correction = (y - c) / derivative;
        x -= correction;
        if correction.abs() < NEWTON_ACCURACY * x.abs() {
            return Ok(x);
        }
    }

    Err(FitError::computation(
        "RUN.NEWTON_ACCURACY",
        format!("the accuracy goal was not reached within {NEWTON_ITERATION_LIMIT} iterations"),
    ))
}

/// Converts a vacuum wavelength (Angstrom) to standard air.
pub fn vacuum_to_air(wavelength: f64) -> f64 {
    10.0 / edlen66(10.0 / wavelength)
}

/// Converts a standard-air wavelength (Angstrom) to vacuum by inverting
/// the Edlen (1966) equation.
pub fn air_to_vacuum(wavelength: f64) -> ComputeResult<f64> {
    let wavenumber = solve_by_newton(
        edlen66_with_derivative,
        10.0 / wavelength,
        10.0 / wavelength,
    )?;
    Ok(10.0 / wavenumber)
}

/// Applies a radial-velocity shift to a wavelength: positive velocities
/// (km s-1) shift redward.
pub fn radial_velocity_shift(wavelength: f64, velocity: f64) -> f64 {
    wavelength * (1.0 + velocity / SPEED_OF_LIGHT_KMS)
}
