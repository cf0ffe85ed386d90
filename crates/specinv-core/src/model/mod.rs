//! The parametric model: aggregated sections plus the parameter table.

pub mod parser;
pub mod section;
pub mod table;

pub use parser::parse_model;
pub use section::{Sample, Section, SectionFit};
pub use table::{ParameterSpec, ParameterTable};

use crate::common::constants::SPEED_OF_LIGHT_KMS;
use crate::optimizer::constraints::BoundedConstraint;
use crate::profiles::{LineShape, Superposition};

/// One entry of the report tables: a value with its uncertainty and a
/// flag telling whether the entry took part in the fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableEntry {
    pub value: f64,
    pub error: f64,
    pub fitted: bool,
}

/// The per-section report row.
#[derive(Debug, Clone)]
pub struct SectionSummary {
    pub id: String,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub legendre_order: usize,
    pub resolution: TableEntry,
    pub valid_count: usize,
    pub cost: f64,
}

/// The per-line report row. `alpha_variation` is populated for the
/// many-multiplet shape only.
#[derive(Debug, Clone)]
pub struct LineSummary {
    pub id: String,
    pub observed_wavelength: f64,
    pub observed_uncertainty: f64,
    pub rest_wavelength: TableEntry,
    pub oscillator_strength: TableEntry,
    pub redshift: TableEntry,
    pub radial_velocity: TableEntry,
    pub broadening_velocity: TableEntry,
    pub column_density: TableEntry,
    pub alpha_variation: Option<TableEntry>,
}

/// The aggregated model. Evaluation splices a free-parameter vector into
/// the table, instantiates per-section superpositions and sums the
/// section costs.
#[derive(Debug, Clone)]
pub struct Model {
    shape: LineShape,
    sections: Vec<Section>,
    section_ids: Vec<String>,
    entry_start: Vec<usize>,
    line_counts: Vec<usize>,
    legendre_orders: Vec<usize>,
    line_ids: Vec<(String, usize)>,
    table: ParameterTable,
}

impl Model {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        shape: LineShape,
        sections: Vec<Section>,
        section_ids: Vec<String>,
        entry_start: Vec<usize>,
        line_counts: Vec<usize>,
        legendre_orders: Vec<usize>,
        line_ids: Vec<(String, usize)>,
        table: ParameterTable,
    ) -> Self {
        Self {
            shape,
            sections,
            section_ids,
            entry_start,
            line_counts,
            legendre_orders,
            line_ids,
            table,
        }
    }

    pub fn shape(&self) -> LineShape {
        self.shape
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn section_ids(&self) -> &[String] {
        &self.section_ids
    }

    /// The number of free parameters seen by the optimizer.
    pub fn parameter_count(&self) -> usize {
        self.table.free_parameter_count()
    }

    /// The total cost of the model at a free-parameter vector.
    pub fn evaluate(&self, x: &[f64]) -> f64 {
        let values = self.table.splice(x);
        let mut total = 0.0;
        for index in 0..self.sections.len() {
            let superposition = self.superposition_for(index, &values);
            total += self.sections[index].cost(
                &superposition,
                values[self.entry_start[index]],
                self.legendre_orders[index],
            );
        }
        total
    }

    /// Midpoints of the free-parameter bounds: the optimizer start point.
    pub fn initial_values(&self) -> Vec<f64> {
        self.table.initial_values()
    }

    /// Half-widths of the free-parameter bounds: the initial local step
    /// sizes.
    pub fn initial_step_sizes(&self) -> Vec<f64> {
        self.table.initial_step_sizes()
    }

    /// The bounded constraint enforcing the free-parameter intervals.
    pub fn constraint(&self) -> BoundedConstraint {
        let (lower, upper) = self.table.free_bounds();
        BoundedConstraint::new(lower, upper)
    }

    /// Writes optimized values and uncertainties back into the table and
    /// refreshes the per-section fits so the summaries become computable.
    pub fn apply_optimum(&mut self, x: &[f64], z: &[f64]) {
        self.table.apply_optimum(x, z);
        let values = self.table.splice(x);
        for index in 0..self.sections.len() {
            let superposition = self.superposition_for(index, &values);
            let resolution = values[self.entry_start[index]];
            let order = self.legendre_orders[index];
            self.sections[index].apply(&superposition, resolution, order);
        }
    }

    /// Per-section report rows, ordered by section id.
    pub fn section_summaries(&self) -> Vec<SectionSummary> {
        let mut summaries: Vec<SectionSummary> = (0..self.sections.len())
            .map(|index| {
                let section = &self.sections[index];
                SectionSummary {
                    id: self.section_ids[index].clone(),
                    lower_bound: section.lower_bound(),
                    upper_bound: section.upper_bound(),
                    legendre_order: self.legendre_orders[index],
                    resolution: self.entry(self.entry_start[index]),
                    valid_count: section.valid_count(),
                    cost: section.fit().map_or(f64::NAN, |fit| fit.cost),
                }
            })
            .collect();
        summaries.sort_by(|lhs, rhs| lhs.id.cmp(&rhs.id));
        summaries
    }

    /// Per-line report rows, ordered by line id.
    pub fn line_summaries(&self) -> Vec<LineSummary> {
        let mut summaries: Vec<LineSummary> = self
            .line_ids
            .iter()
            .map(|(id, start)| self.line_summary(id, *start))
            .collect();
        summaries.sort_by(|lhs, rhs| lhs.id.cmp(&rhs.id));
        summaries
    }

    fn line_summary(&self, id: &str, start: usize) -> LineSummary {
        let rest = self.entry(start);
        let redshift = self.entry(start + 2);
        let velocity = self.entry(start + 3);

        // Observed wavelength with first-order error propagation.
        let beta = velocity.value / SPEED_OF_LIGHT_KMS;
        let observed = rest.value * (1.0 + redshift.value) * (1.0 + beta);
        let redshift_term = (1.0 + beta) * redshift.error;
        let velocity_term = (1.0 + redshift.value) * velocity.error / SPEED_OF_LIGHT_KMS;
        let observed_uncertainty = rest.error
            + rest.value * (redshift_term * redshift_term + velocity_term * velocity_term).sqrt();

        LineSummary {
            id: id.to_string(),
            observed_wavelength: observed,
            observed_uncertainty,
            rest_wavelength: rest,
            oscillator_strength: self.entry(start + 1),
            redshift,
            radial_velocity: velocity,
            broadening_velocity: self.entry(start + 4),
            column_density: self.entry(start + 5),
            alpha_variation: match self.shape {
                LineShape::ManyMultiplet => Some(self.entry(start + 7)),
                _ => None,
            },
        }
    }

    fn entry(&self, index: usize) -> TableEntry {
        TableEntry {
            value: self.table.value(index),
            error: self.table.error(index),
            fitted: self.table.is_fitted(index),
        }
    }

    fn superposition_for(&self, index: usize, values: &[f64]) -> Superposition {
        let start = self.entry_start[index] + 1;
        let end = start + self.line_counts[index] * self.shape.arity();
        Superposition::new(self.shape, &values[start..end])
    }
}
