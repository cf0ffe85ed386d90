//! One contiguous spectral section: data, validity mask, continuum basis,
//! instrument convolution and the chi-square cost.

use crate::domain::{FitError, ParseResult};
use crate::numerics::special::{erf, legendre_basis};
use crate::numerics::{solve_symmetric_system, DenseMatrix};
use crate::profiles::Superposition;

/// Converts a Gaussian FWHM into the width of the exp(-(x/w)^2) kernel,
/// 1 / (2 sqrt(ln 2)).
const FWHM_TO_WIDTH: f64 = 0.600_561_204_393_224_9_f64;

/// The kernel support radius in kernel widths.
const KERNEL_SUPPORT_WIDTHS: f64 = 4.0;

/// One observed sample of a spectral section.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// The observed wavelength (Angstrom).
    pub wavelength: f64,
    /// The observed spectral flux (arbitrary unit).
    pub flux: f64,
    /// The flux uncertainty (same unit).
    pub uncertainty: f64,
}

/// The per-sample result of a forward evaluation, kept for reporting.
#[derive(Debug, Clone)]
pub struct SectionFit {
    /// The fitted continuum at each sample.
    pub continuum: Vec<f64>,
    /// The convolved, attenuated model flux at each sample.
    pub model: Vec<f64>,
    /// The total cost over valid samples.
    pub cost: f64,
}

/// A wavelength window [lower, upper] with samples, a validity mask, the
/// Legendre continuum order and a resolving power applied per evaluation.
#[derive(Debug, Clone)]
pub struct Section {
    lower: f64,
    upper: f64,
    wavelengths: Vec<f64>,
    fluxes: Vec<f64>,
    uncertainties: Vec<f64>,
    valid: Vec<bool>,
    fit: Option<SectionFit>,
}

impl Section {
    /// Builds a section from samples, retaining those inside the window.
    /// Wavelengths must increase strictly; samples with non-positive
    /// uncertainties are retained but masked out.
    pub fn from_samples(lower: f64, upper: f64, samples: &[Sample]) -> ParseResult<Self> {
        if !(lower.is_finite() && upper.is_finite()) || lower >= upper {
            return Err(FitError::input_validation(
                "INPUT.SECTION_WINDOW",
                format!("section window [{lower}, {upper}] is not a proper interval"),
            ));
        }

        let mut wavelengths = Vec::new();
        let mut fluxes = Vec::new();
        let mut uncertainties = Vec::new();
        let mut valid = Vec::new();

        for sample in samples {
            if sample.wavelength < lower || sample.wavelength > upper {
                continue;
            }
            if !(sample.wavelength.is_finite()
                && sample.flux.is_finite()
                && sample.uncertainty.is_finite())
            {
                return Err(FitError::input_validation(
                    "INPUT.SECTION_SAMPLE",
                    format!(
                        "sample at wavelength {} carries non-finite values",
                        sample.wavelength
                    ),
                ));
            }
            if let Some(&previous) = wavelengths.last() {
                if sample.wavelength <= previous {
                    return Err(FitError::input_validation(
                        "INPUT.SECTION_GRID",
                        format!(
                            "wavelengths must increase strictly, {} follows {}",
                            sample.wavelength, previous
                        ),
                    ));
                }
            }

            valid.push(sample.uncertainty > 0.0);
            wavelengths.push(sample.wavelength);
            fluxes.push(sample.flux);
            uncertainties.push(sample.uncertainty);
        }

        if wavelengths.len() < 2 {
            return Err(FitError::input_validation(
                "INPUT.SECTION_EMPTY",
                format!(
                    "section [{lower}, {upper}] covers {} samples, need at least 2",
                    wavelengths.len()
                ),
            ));
        }

        Ok(Self {
            lower,
            upper,
            wavelengths,
            fluxes,
            uncertainties,
            valid,
            fit: None,
        })
    }

    /// Masks out every sample whose wavelength lies in the closed
    /// interval [a, b].
    pub fn mask_interval(&mut self, a: f64, b: f64) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        for (index, &wavelength) in self.wavelengths.iter().enumerate() {
            if wavelength >= lo && wavelength <= hi {
                self.valid[index] = false;
            }
        }
    }

    pub fn lower_bound(&self) -> f64 {
        self.lower
    }

    pub fn upper_bound(&self) -> f64 {
        self.upper
    }

    pub fn sample_count(&self) -> usize {
        self.wavelengths.len()
    }

    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|&&flag| flag).count()
    }

    /// The cost of the forward model with the superposition and resolving
    /// power supplied. A non-finite evaluation yields the +infinity
    /// sentinel so that offending parameter vectors lose the ranking.
    pub fn cost(&self, superposition: &Superposition, resolution: f64, order: usize) -> f64 {
        match self.forward(superposition, resolution, order) {
            Some(fit) => fit.cost,
            None => f64::INFINITY,
        }
    }

    /// Runs the forward model and keeps the fitted continuum and model for
    /// reporting. Returns the cost.
    pub fn apply(&mut self, superposition: &Superposition, resolution: f64, order: usize) -> f64 {
        match self.forward(superposition, resolution, order) {
            Some(fit) => {
                let cost = fit.cost;
                self.fit = Some(fit);
                cost
            }
            None => f64::INFINITY,
        }
    }

    /// The stored fit of the last `apply` call.
    pub fn fit(&self) -> Option<&SectionFit> {
        self.fit.as_ref()
    }

    /// Iterates over (wavelength, flux, uncertainty, valid) rows.
    pub fn data_rows(&self) -> impl Iterator<Item = (f64, f64, f64, bool)> + '_ {
        (0..self.wavelengths.len()).map(move |index| {
            (
                self.wavelengths[index],
                self.fluxes[index],
                self.uncertainties[index],
                self.valid[index],
            )
        })
    }

    fn forward(
        &self,
        superposition: &Superposition,
        resolution: f64,
        order: usize,
    ) -> Option<SectionFit> {
        let n = self.wavelengths.len();

        // Optical depth and attenuation.
        let mut attenuation = Vec::with_capacity(n);
        for &wavelength in &self.wavelengths {
            let depth = superposition.value(wavelength);
            let value = (-depth).exp();
            if !value.is_finite() {
                return None;
            }
            attenuation.push(value);
        }

        // Instrumental convolution of the attenuation.
        let convolved = self.convolve_instrument(&attenuation, resolution);

        // Embedded continuum fit: linear least squares of the Legendre
        // basis times the convolved attenuation against the data.
        let coefficient_count = order + 1;
        let scaled_bases: Vec<Vec<f64>> = self
            .wavelengths
            .iter()
            .map(|&wavelength| legendre_basis(self.normalized(wavelength), order))
            .collect();

        let mut gram = DenseMatrix::zeros(coefficient_count, coefficient_count);
        let mut rhs = vec![0.0_f64; coefficient_count];
        for index in 0..n {
            if !self.valid[index] {
                continue;
            }
            let weight = 1.0 / (self.uncertainties[index] * self.uncertainties[index]);
            let t = convolved[index];
            for k in 0..coefficient_count {
                let basis_k = scaled_bases[index][k] * t;
                rhs[k] += weight * basis_k * self.fluxes[index];
                for l in k..coefficient_count {
                    gram[(k, l)] += weight * basis_k * scaled_bases[index][l] * t;
                }
            }
        }
        for k in 0..coefficient_count {
            for l in 0..k {
                gram[(k, l)] = gram[(l, k)];
            }
            if !rhs[k].is_finite() || !gram[(k, k)].is_finite() {
                return None;
            }
        }

        let coefficients = solve_symmetric_system(&gram, &rhs).ok()?;

        let mut continuum = Vec::with_capacity(n);
        let mut model = Vec::with_capacity(n);
        let mut cost = 0.0_f64;
        for index in 0..n {
            let mut level = 0.0;
            for k in 0..coefficient_count {
                level += coefficients[k] * scaled_bases[index][k];
            }
            let value = level * convolved[index];
            continuum.push(level);
            model.push(value);

            if self.valid[index] {
                let residual = (self.fluxes[index] - value) / self.uncertainties[index];
                cost += residual * residual;
            }
        }

        if !cost.is_finite() {
            return None;
        }

        Some(SectionFit {
            continuum,
            model,
            cost,
        })
    }

    /// Semi-analytic convolution with the Gaussian instrument profile of
    /// FWHM lambda / (10^3 R): per sample the kernel is integrated in
    /// closed form over the neighbouring grid cells inside the support and
    /// the weights are normalized. Samples whose kernel support spans no
    /// neighbouring cell, and every sample when R <= 0, fall through
    /// unchanged.
    fn convolve_instrument(&self, values: &[f64], resolution: f64) -> Vec<f64> {
        let n = values.len();
        if resolution <= 0.0 {
            return values.to_vec();
        }

        let mut convolved = Vec::with_capacity(n);
        for center in 0..n {
            let wavelength = self.wavelengths[center];
            let width = wavelength / (1.0e3 * resolution) * FWHM_TO_WIDTH;
            let radius = KERNEL_SUPPORT_WIDTHS * width;

            let mut weighted_sum = 0.0_f64;
            let mut weight_sum = 0.0_f64;
            let mut touched_neighbour = false;

            // Walk outward over the cells inside the support.
            let mut j = center;
            loop {
                let (lo, hi) = self.cell_bounds(j);
                if lo - wavelength > radius {
                    break;
                }
                let weight = kernel_cell_integral(wavelength, width, lo, hi);
                weighted_sum += weight * values[j];
                weight_sum += weight;
                if j != center && weight > 0.0 {
                    touched_neighbour = true;
                }
                if j + 1 >= n {
                    break;
                }
                j += 1;
                if self.wavelengths[j] - wavelength > radius {
                    break;
                }
            }
            let mut j = center;
            while j > 0 {
                j -= 1;
                if wavelength - self.wavelengths[j] > radius {
                    break;
                }
                let (lo, hi) = self.cell_bounds(j);
                let weight = kernel_cell_integral(wavelength, width, lo, hi);
                weighted_sum += weight * values[j];
                weight_sum += weight;
                if weight > 0.0 {
                    touched_neighbour = true;
                }
            }

            if touched_neighbour && weight_sum > 0.0 {
                convolved.push(weighted_sum / weight_sum);
            } else {
                convolved.push(values[center]);
            }
        }

        convolved
    }

    /// The grid cell around sample `index`, bounded by the midpoints to
    /// the neighbouring samples and clamped at the section edges.
    fn cell_bounds(&self, index: usize) -> (f64, f64) {
        let n = self.wavelengths.len();
        let lo = if index == 0 {
            self.wavelengths[0] - 0.5 * (self.wavelengths[1] - self.wavelengths[0])
        } else {
            0.5 * (self.wavelengths[index - 1] + self.wavelengths[index])
        };
        let hi = if index + 1 == n {
            self.wavelengths[n - 1] + 0.5 * (self.wavelengths[n - 1] - self.wavelengths[n - 2])
        } else {
            0.5 * (self.wavelengths[index] + self.wavelengths[index + 1])
        };
        (lo, hi)
    }

    /// Maps a wavelength onto the Legendre interval [-1, 1].
    fn normalized(&self, wavelength: f64) -> f64 {
        2.0 * (wavelength - self.lower) / (self.upper - self.lower) - 1.0
    }
}

/// The integral of the normalized Gaussian kernel of width `width`
/// centered at `center` over the cell [lo, hi].
#[inline]
fn kernel_cell_integral(center: f64, width: f64, lo: f64, hi: f64) -> f64 {
    0.5 * (erf((hi - center) / width) - erf((lo - center) / width))
}

/// Parses three-column `wavelength flux uncertainty` text. Lines starting
/// with `%` and blank lines are skipped; a `%` truncates its line.
pub fn parse_data_source(source: &str) -> ParseResult<Vec<Sample>> {
    let mut samples = Vec::new();

    for (line_number, raw_line) in source.lines().enumerate() {
        let line = match raw_line.find('%') {
            Some(position) => &raw_line[..position],
            None => raw_line,
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let mut tokens = trimmed.split_whitespace();
        let mut next_value = |field: &str| -> ParseResult<f64> {
            tokens
                .next()
                .ok_or_else(|| {
                    FitError::input_validation(
                        "INPUT.DATA_COLUMNS",
                        format!("line {}: missing {} column", line_number + 1, field),
                    )
                })?
                .parse::<f64>()
                .map_err(|_| {
                    FitError::input_validation(
                        "INPUT.DATA_COLUMNS",
                        format!("line {}: {} is not a number", line_number + 1, field),
                    )
                })
        };

        let wavelength = next_value("wavelength")?;
        let flux = next_value("flux")?;
        let uncertainty = next_value("uncertainty")?;

        samples.push(Sample {
            wavelength,
            flux,
            uncertainty,
        });
    }

    Ok(samples)
}
