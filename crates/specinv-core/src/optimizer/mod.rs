//! An optimizer based on the CMA-ES developed by Hansen and Ostermeier.
//!
//! Further reading:
//!
//! N. Hansen, S. D. Mueller, P. Koumoutsakos (2003).
//!   *Reducing the Time Complexity of the Derandomized Evolution Strategy
//!   with Covariance Matrix Adaptation (CMA-ES).*
//!   Evolutionary Computation, 11, 1.
//!
//! N. Hansen, A. Ostermeier (2001).
//!   *Completely Derandomized Self-Adaptation in Evolution Strategies.*
//!   Evolutionary Computation, 9, 159.

pub mod constraints;
pub mod tracing;

mod cmaes;

pub use constraints::{BoundedConstraint, Constraint, NoConstraint};
pub use tracing::{BufferedTracer, NoTracing, Tracer};

use crate::domain::{FitError, FitResult};
use crate::numerics::DenseMatrix;

/// The fitness ordering of an optimization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Goal {
    Minimize,
    Maximize,
}

impl Goal {
    /// Tests whether `lhs` is a better fitness than `rhs`.
    #[inline]
    pub(crate) fn is_better(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Minimize => lhs < rhs,
            Self::Maximize => lhs > rhs,
        }
    }
}

/// The strategy parameters, derived once from the problem dimension, the
/// parent number and the population size.
#[derive(Debug, Clone)]
pub struct StrategyParameters {
    /// The recombination weights, normalized to unit sum.
    weights: Vec<f64>,
    /// The variance effectiveness of recombination.
    variance_effectiveness: f64,
    /// The step size cumulation rate.
    step_size_cumulation_rate: f64,
    /// The distribution cumulation rate.
    distribution_cumulation_rate: f64,
    /// The covariance matrix adaption rate.
    covariance_adaption_rate: f64,
    /// The covariance matrix adaption mixing (rank-1 versus rank-mu).
    covariance_adaption_mixing: f64,
    /// The step size damping.
    step_size_damping: f64,
}

impl StrategyParameters {
    /// Derives the strategy parameters as a pure function of
    /// (n, mu, lambda).
    pub fn derive(n: usize, parent_number: usize, population_size: usize) -> Self {
        let n_real = n as f64;
        let lambda = population_size as f64;

        let mut weights: Vec<f64> = (1..=parent_number)
            .map(|rank| (0.5 * (lambda + 1.0)).ln() - (rank as f64).ln())
            .collect();
        let weight_sum: f64 = weights.iter().sum();
        for weight in &mut weights {
            *weight /= weight_sum;
        }
        let weight_square_sum: f64 = weights.iter().map(|w| w * w).sum();
        let variance_effectiveness = 1.0 / weight_square_sum;

        let step_size_cumulation_rate =
            (variance_effectiveness + 2.0) / (n_real + variance_effectiveness + 3.0);
        let distribution_cumulation_rate = 4.0 / (n_real + 4.0);

        let rank_one = 2.0 / ((n_real + 2.0_f64.sqrt()).powi(2) * variance_effectiveness);
        let rank_mu = (1.0 - 1.0 / variance_effectiveness)
            * (1.0_f64).min(
                (2.0 * variance_effectiveness - 1.0)
                    / ((n_real + 2.0).powi(2) + variance_effectiveness),
            );
        let covariance_adaption_rate = rank_one + rank_mu;

        let step_size_damping = 1.0
            + 2.0
                * (0.0_f64)
                    .max(((variance_effectiveness - 1.0) / (n_real + 1.0)).sqrt() - 1.0)
            + step_size_cumulation_rate;

        Self {
            weights,
            variance_effectiveness,
            step_size_cumulation_rate,
            distribution_cumulation_rate,
            covariance_adaption_rate,
            covariance_adaption_mixing: variance_effectiveness,
            step_size_damping,
        }
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn variance_effectiveness(&self) -> f64 {
        self.variance_effectiveness
    }

    pub fn step_size_cumulation_rate(&self) -> f64 {
        self.step_size_cumulation_rate
    }

    pub fn distribution_cumulation_rate(&self) -> f64 {
        self.distribution_cumulation_rate
    }

    pub fn covariance_adaption_rate(&self) -> f64 {
        self.covariance_adaption_rate
    }

    pub fn covariance_adaption_mixing(&self) -> f64 {
        self.covariance_adaption_mixing
    }

    pub fn step_size_damping(&self) -> f64 {
        self.step_size_damping
    }
}

/// The validated build configuration of an [`Optimizer`].
#[derive(Debug, Clone)]
pub struct OptimizerBuilder {
    problem_dimension: usize,
    parent_number: usize,
    population_size: usize,
    update_modulus: u64,
    accuracy_goal: f64,
    stop_generation: u64,
    random_seed: u64,
}

impl Default for OptimizerBuilder {
    fn default() -> Self {
        Self {
            problem_dimension: 1,
            parent_number: 4,
            population_size: 8,
            update_modulus: 1,
            accuracy_goal: 1.0e-4,
            stop_generation: 1000,
            random_seed: 27182,
        }
    }
}

impl OptimizerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_problem_dimension(mut self, n: usize) -> Self {
        self.problem_dimension = n;
        self
    }

    pub fn with_parent_number(mut self, parent_number: usize) -> Self {
        self.parent_number = parent_number;
        self
    }

    pub fn with_population_size(mut self, population_size: usize) -> Self {
        self.population_size = population_size;
        self
    }

    pub fn with_covariance_update_modulus(mut self, update_modulus: u64) -> Self {
        self.update_modulus = update_modulus;
        self
    }

    pub fn with_accuracy_goal(mut self, accuracy_goal: f64) -> Self {
        self.accuracy_goal = accuracy_goal;
        self
    }

    pub fn with_stop_generation(mut self, stop_generation: u64) -> Self {
        self.stop_generation = stop_generation;
        self
    }

    pub fn with_random_seed(mut self, random_seed: u64) -> Self {
        self.random_seed = random_seed;
        self
    }

    pub fn build(self) -> FitResult<Optimizer> {
        if self.problem_dimension == 0 {
            return Err(FitError::input_validation(
                "INPUT.OPTIMIZER_DIMENSION",
                "the problem dimension must be at least 1",
            ));
        }
        if self.parent_number == 0 || 2 * self.parent_number > self.population_size {
            return Err(FitError::input_validation(
                "INPUT.OPTIMIZER_SELECTION",
                format!(
                    "the parent number must satisfy 0 < mu <= lambda / 2, got mu = {}, lambda = {}",
                    self.parent_number, self.population_size
                ),
            ));
        }
        if self.update_modulus == 0 {
            return Err(FitError::input_validation(
                "INPUT.OPTIMIZER_MODULUS",
                "the covariance update modulus must be at least 1",
            ));
        }
        if !(self.accuracy_goal.is_finite() && self.accuracy_goal > 0.0) {
            return Err(FitError::input_validation(
                "INPUT.OPTIMIZER_ACCURACY",
                format!("the accuracy goal must be positive, got {}", self.accuracy_goal),
            ));
        }

        let strategy = StrategyParameters::derive(
            self.problem_dimension,
            self.parent_number,
            self.population_size,
        );

        Ok(Optimizer {
            config: self,
            strategy,
        })
    }
}

/// The CMA-ES optimizer.
#[derive(Debug, Clone)]
pub struct Optimizer {
    config: OptimizerBuilder,
    strategy: StrategyParameters,
}

impl Optimizer {
    pub fn strategy(&self) -> &StrategyParameters {
        &self.strategy
    }

    pub fn problem_dimension(&self) -> usize {
        self.config.problem_dimension
    }

    /// Minimizes an objective function from the initial mean, local step
    /// sizes and global step size supplied.
    pub fn minimize<F, C, T>(
        &self,
        objective: F,
        x0: &[f64],
        d0: &[f64],
        s0: f64,
        constraint: &C,
        tracer: &mut T,
    ) -> FitResult<OptimizerResult>
    where
        F: Fn(&[f64]) -> f64,
        C: Constraint,
        T: Tracer,
    {
        cmaes::optimize(
            &objective,
            constraint,
            &self.config,
            &self.strategy,
            Goal::Minimize,
            x0,
            d0,
            s0,
            tracer,
        )
    }

    /// Maximizes an objective function.
    pub fn maximize<F, C, T>(
        &self,
        objective: F,
        x0: &[f64],
        d0: &[f64],
        s0: f64,
        constraint: &C,
        tracer: &mut T,
    ) -> FitResult<OptimizerResult>
    where
        F: Fn(&[f64]) -> f64,
        C: Constraint,
        T: Tracer,
    {
        cmaes::optimize(
            &objective,
            constraint,
            &self.config,
            &self.strategy,
            Goal::Maximize,
            x0,
            d0,
            s0,
            tracer,
        )
    }
}

/// The optimization result.
#[derive(Debug, Clone)]
pub struct OptimizerResult {
    pub(crate) parameter_values: Vec<f64>,
    pub(crate) parameter_uncertainties: Vec<f64>,
    pub(crate) fitness: f64,
    pub(crate) global_step_size: f64,
    pub(crate) local_step_sizes: Vec<f64>,
    pub(crate) rotation_matrix: DenseMatrix,
    pub(crate) covariance_matrix: DenseMatrix,
    pub(crate) step_size_cumulation_path: Vec<f64>,
    pub(crate) distribution_cumulation_path: Vec<f64>,
    pub(crate) generation_number: u64,
    pub(crate) optimized: bool,
    pub(crate) step_size_underflow: bool,
    pub(crate) constraint_exhausted: bool,
}

impl OptimizerResult {
    pub fn parameter_values(&self) -> &[f64] {
        &self.parameter_values
    }

    pub fn parameter_uncertainties(&self) -> &[f64] {
        &self.parameter_uncertainties
    }

    pub fn fitness(&self) -> f64 {
        self.fitness
    }

    pub fn global_step_size(&self) -> f64 {
        self.global_step_size
    }

    pub fn local_step_sizes(&self) -> &[f64] {
        &self.local_step_sizes
    }

    pub fn rotation_matrix(&self) -> &DenseMatrix {
        &self.rotation_matrix
    }

    pub fn covariance_matrix(&self) -> &DenseMatrix {
        &self.covariance_matrix
    }

    pub fn step_size_cumulation_path(&self) -> &[f64] {
        &self.step_size_cumulation_path
    }

    pub fn distribution_cumulation_path(&self) -> &[f64] {
        &self.distribution_cumulation_path
    }

    pub fn generation_number(&self) -> u64 {
        self.generation_number
    }

    pub fn is_optimized(&self) -> bool {
        self.optimized
    }

    /// Whether the run terminated on a mutation variance underflow, from
    /// either the step size or constraint-resampling exhaustion.
    pub fn is_underflow(&self) -> bool {
        self.step_size_underflow || self.constraint_exhausted
    }

    pub fn is_step_size_underflow(&self) -> bool {
        self.step_size_underflow
    }

    pub fn is_constraint_exhausted(&self) -> bool {
        self.constraint_exhausted
    }
}

#[cfg(test)]
mod tests {
    use super::{OptimizerBuilder, StrategyParameters};

    #[test]
    fn strategy_parameters_match_their_formulas_for_the_reference_setup() {
        let strategy = StrategyParameters::derive(10, 10, 40);

        let weights = strategy.weights();
        assert_eq!(weights.len(), 10);
        let sum: f64 = weights.iter().sum();
        assert!((sum - 1.0).abs() <= 1.0e-12);
        assert!(weights.windows(2).all(|pair| pair[0] > pair[1]));

        let mu_eff = strategy.variance_effectiveness();
        let reference: f64 = {
            let raw: Vec<f64> = (1..=10)
                .map(|rank| (20.5_f64).ln() - (rank as f64).ln())
                .collect();
            let sum: f64 = raw.iter().sum();
            let squares: f64 = raw.iter().map(|w| (w / sum) * (w / sum)).sum();
            1.0 / squares
        };
        assert!((mu_eff - reference).abs() <= 1.0e-12);

        assert!(
            (strategy.step_size_cumulation_rate() - (mu_eff + 2.0) / (10.0 + mu_eff + 3.0)).abs()
                <= 1.0e-15
        );
        assert!((strategy.distribution_cumulation_rate() - 4.0 / 14.0).abs() <= 1.0e-15);
        assert_eq!(strategy.covariance_adaption_mixing(), mu_eff);

        let rank_one = 2.0 / ((10.0 + 2.0_f64.sqrt()).powi(2) * mu_eff);
        let rank_mu =
            (1.0 - 1.0 / mu_eff) * ((2.0 * mu_eff - 1.0) / (144.0 + mu_eff)).min(1.0);
        assert!((strategy.covariance_adaption_rate() - (rank_one + rank_mu)).abs() <= 1.0e-15);

        let damping = 1.0
            + 2.0 * (((mu_eff - 1.0) / 11.0).sqrt() - 1.0).max(0.0)
            + strategy.step_size_cumulation_rate();
        assert!((strategy.step_size_damping() - damping).abs() <= 1.0e-15);
    }

    #[test]
    fn builder_rejects_oversized_parent_numbers() {
        let error = OptimizerBuilder::new()
            .with_problem_dimension(4)
            .with_parent_number(5)
            .with_population_size(8)
            .build()
            .unwrap_err();
        assert_eq!(error.placeholder(), "INPUT.OPTIMIZER_SELECTION");
    }

    #[test]
    fn builder_rejects_degenerate_configurations() {
        assert!(OptimizerBuilder::new()
            .with_problem_dimension(0)
            .build()
            .is_err());
        assert!(OptimizerBuilder::new()
            .with_covariance_update_modulus(0)
            .build()
            .is_err());
        assert!(OptimizerBuilder::new().with_accuracy_goal(0.0).build().is_err());
        assert!(OptimizerBuilder::new().with_accuracy_goal(f64::NAN).build().is_err());
    }

    #[test]
    fn builder_accepts_the_reference_configuration() {
        let optimizer = OptimizerBuilder::new()
            .with_problem_dimension(10)
            .with_parent_number(10)
            .with_population_size(40)
            .with_accuracy_goal(1.0e-6)
            .with_random_seed(31415)
            .build()
            .expect("optimizer");
        assert_eq!(optimizer.problem_dimension(), 10);
    }
}
