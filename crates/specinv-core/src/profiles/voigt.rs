//! Pseudo-Voigt approximations to the Voigt function (the convolution of
//! a Gaussian and a Lorentzian).
//!
//! Further reading:
//!
//! T. Ida, M. Ando, H. Toraya (2000).
//!   *Extended pseudo-Voigt function for approximating the Voigt profile.*
//!   J. Appl. Cryst., 33, 1311.

use super::{gaussian_kernel, irrational_kernel, lorentzian_kernel, sech_squared_kernel};

/// The FWHM factor of the Gaussian component, 2 sqrt(ln 2).
const C_G: f64 = 1.665_109_222_315_395_6_f64;
/// The FWHM factor of the Lorentzian component.
const C_L: f64 = 2.0;
/// The FWHM factor of the irrational component, 2 sqrt(2^(2/3) - 1).
const C_I: f64 = 1.533_751_168_755_204_4_f64;
/// The FWHM factor of the squared hyperbolic secant, 2 ln(sqrt(2) + 1).
const C_P: f64 = 1.762_747_174_039_086_3_f64;

/// The number of widths beyond which a Voigt approximation is truncated.
const TRUNCATION_WIDTHS: f64 = 4.0;

/// A strategy approximating the Voigt function, constructed from the
/// Gaussian width b and the Lorentzian width d.
pub trait VoigtApproximation {
    fn approximate(b: f64, d: f64) -> Self;

    /// The value of the approximation at a displacement from the center.
    fn value(&self, x: f64) -> f64;

    /// The truncation radius: the approximation is treated as zero at
    /// displacements of this magnitude and beyond.
    fn support_radius(&self) -> f64;
}

/// The classical pseudo-Voigt approximation.
#[derive(Debug, Clone, Copy)]
pub struct PseudoVoigt {
    gamma_g: f64,
    gamma_l: f64,
    eta: f64,
}

impl VoigtApproximation for PseudoVoigt {
    fn approximate(b: f64, d: f64) -> Self {
        let u = (C_G * b) / (C_L * d);
        let r = 1.0
            / (1.0 + u * (0.07842 + u * (4.47163 + u * (2.42843 + u * (u + 2.69269))))).powf(0.2);

        Self {
            gamma_g: (C_L * d) / (C_G * r),
            gamma_l: (C_L * d) / (C_L * r),
            eta: r * (1.36603 - r * (0.47719 - r * 0.11116)),
        }
    }

    fn value(&self, x: f64) -> f64 {
        (1.0 - self.eta) * gaussian_kernel(x, self.gamma_g)
            + self.eta * lorentzian_kernel(x, self.gamma_l)
    }

    fn support_radius(&self) -> f64 {
        TRUNCATION_WIDTHS * (self.gamma_g + self.gamma_l)
    }
}

/// The extended pseudo-Voigt approximation, accurate to 0.12 per cent of
/// the exact Voigt function over the full mixing range.
#[derive(Debug, Clone, Copy)]
pub struct ExtendedPseudoVoigt {
    gamma_g: f64,
    gamma_l: f64,
    gamma_i: f64,
    gamma_p: f64,
    eta_l: f64,
    eta_i: f64,
    eta_p: f64,
}

impl VoigtApproximation for ExtendedPseudoVoigt {
    fn approximate(b: f64, d: f64) -> Self {
        let u = C_G * b + C_L * d;
        let r = C_L * d / u;

        Self {
            gamma_g: u * poly_w_g(r) / C_G,
            gamma_l: u * poly_w_l(r) / C_L,
            gamma_i: u * poly_w_i(r) / C_I,
            gamma_p: u * poly_w_p(r) / C_P,
            eta_l: poly_eta_l(r),
            eta_i: poly_eta_i(r),
            eta_p: poly_eta_p(r),
        }
    }

    fn value(&self, x: f64) -> f64 {
        (1.0 - self.eta_l - self.eta_i - self.eta_p) * gaussian_kernel(x, self.gamma_g)
            + self.eta_l * lorentzian_kernel(x, self.gamma_l)
            + self.eta_i * irrational_kernel(x, self.gamma_i)
            + self.eta_p * sech_squared_kernel(x, self.gamma_p)
    }

    fn support_radius(&self) -> f64 {
        TRUNCATION_WIDTHS * (self.gamma_g + self.gamma_l + self.gamma_i + self.gamma_p)
    }
}

/// A univariate polynomial of degree 6 in Horner form.
#[inline]
fn poly(x: f64, h: [f64; 7]) -> f64 {
    h[0] + x * (h[1] + x * (h[2] + x * (h[3] + x * (h[4] + x * (h[5] + x * h[6])))))
}

fn poly_w_g(r: f64) -> f64 {
    1.0 - r * poly(
        r,
        [0.66000, 0.15021, -1.24984, 4.74052, -9.48291, 8.48252, -2.95553],
    )
}

fn poly_w_l(r: f64) -> f64 {
    1.0 - (1.0 - r)
        * poly(
            r,
            [-0.42179, -1.25693, 10.30003, -23.45651, 29.14158, -16.50453, 3.19974],
        )
}

fn poly_w_i(r: f64) -> f64 {
    poly(
        r,
        [1.19913, 1.43021, -15.36331, 47.06071, -73.61822, 57.92559, -17.80614],
    )
}

fn poly_w_p(r: f64) -> f64 {
    poly(
        r,
        [1.10186, -0.47745, -0.68688, 2.76622, -4.55466, 4.05475, -1.26571],
    )
}

fn poly_eta_l(r: f64) -> f64 {
    r * (1.0
        + (1.0 - r)
            * poly(
                r,
                [-0.30165, -1.38927, 9.31550, -24.10743, 34.96491, -21.18862, 3.70290],
            ))
}

fn poly_eta_i(r: f64) -> f64 {
    (r * (1.0 - r))
        * poly(
            r,
            [0.25437, -0.14107, 3.23653, -11.09215, 22.10544, -24.12407, 9.76947],
        )
}

fn poly_eta_p(r: f64) -> f64 {
    (r * (1.0 - r))
        * poly(
            r,
            [1.01579, 1.50429, -9.21815, 23.59717, -39.71134, 32.83023, -10.02142],
        )
}
