//! The CMA-ES generation loop and the post-optimization uncertainty
//! estimate.

use super::constraints::Constraint;
use super::tracing::Tracer;
use super::{Goal, OptimizerBuilder, OptimizerResult, StrategyParameters};
use crate::domain::{FitError, FitResult};
use crate::numerics::{decompose, identity_matrix, DenseMatrix};
use crate::random::NormalDeviate;
use std::collections::VecDeque;

/// Attempts to resample a constraint-violating offspring before the
/// generation is declared exhausted.
const MAX_CONSTRAINT_ATTEMPTS: usize = 100;

/// The termination window holds the best fitness of the trailing
/// `TERMINATION_WINDOW_FACTOR * (n + 1)` generations.
const TERMINATION_WINDOW_FACTOR: usize = 10;

/// Bracketing and bisection depth of the uncertainty root finder.
const UNCERTAINTY_BRACKET_DOUBLINGS: usize = 64;
const UNCERTAINTY_BISECTIONS: usize = 64;

#[allow(clippy::too_many_arguments)]
pub(super) fn optimize<F, C, T>(
    objective: &F,
    constraint: &C,
    config: &OptimizerBuilder,
    strategy: &StrategyParameters,
    goal: Goal,
    x0: &[f64],
    d0: &[f64],
    s0: f64,
    tracer: &mut T,
) -> FitResult<OptimizerResult>
where
    F: Fn(&[f64]) -> f64,
    C: Constraint,
    T: Tracer,
{
    let n = config.problem_dimension;
    let mu = config.parent_number;
    let lambda = config.population_size;

    if x0.len() != n || d0.len() != n {
        return Err(FitError::input_validation(
            "INPUT.OPTIMIZER_START",
            format!(
                "the initial mean and step sizes must have dimension {n}, got {} and {}",
                x0.len(),
                d0.len()
            ),
        ));
    }

    let weights = &strategy.weights;
    let mu_eff = strategy.variance_effectiveness;
    let cs = strategy.step_size_cumulation_rate;
    let cc = strategy.distribution_cumulation_rate;
    let ccov = strategy.covariance_adaption_rate;
    let acov = strategy.covariance_adaption_mixing;
    let damping = strategy.step_size_damping;

    let n_real = n as f64;
    let expected_norm =
        n_real.sqrt() * (1.0 - 1.0 / (4.0 * n_real) + 1.0 / (21.0 * n_real * n_real));
    let stall_threshold = 1.4 + 2.0 / (n_real + 1.0);

    let mut deviate = NormalDeviate::with_seed(config.random_seed);

    // Mutable strategy state.
    let mut x = x0.to_vec();
    let mut sigma = s0;
    let mut d = d0.to_vec();
    let mut rotation = identity_matrix(n);
    let mut covariance = DenseMatrix::zeros(n, n);
    for index in 0..n {
        covariance[(index, index)] = d[index] * d[index];
    }
    let mut ps = vec![0.0_f64; n];
    let mut pc = vec![0.0_f64; n];
    let mut generation = 0_u64;

    // Offspring workspace.
    let mut z = vec![vec![0.0_f64; n]; lambda];
    let mut y = vec![vec![0.0_f64; n]; lambda];
    let mut offspring = vec![vec![0.0_f64; n]; lambda];
    let mut fitness = vec![0.0_f64; lambda];
    let mut order: Vec<usize> = (0..lambda).collect();

    let window = TERMINATION_WINDOW_FACTOR * (n + 1);
    let mut history: VecDeque<f64> = VecDeque::with_capacity(window);

    let mut best_fitness = f64::NAN;
    let mut optimized = false;
    let mut step_size_underflow = false;
    let mut constraint_exhausted = false;

    while generation < config.stop_generation {
        // Sample the population. All random draws happen here, in slot
        // order, so the sequence seen by the generator is deterministic.
        let mut any_perturbed = false;
        'sampling: for k in 0..lambda {
            for attempt in 0..=MAX_CONSTRAINT_ATTEMPTS {
                for i in 0..n {
                    z[k][i] = deviate.next();
                }
                for i in 0..n {
                    let mut sum = 0.0;
                    for j in 0..n {
                        sum += rotation[(i, j)] * d[j] * z[k][j];
                    }
                    y[k][i] = sum;
                    offspring[k][i] = x[i] + sigma * sum;
                }

                if !constraint.is_violated(&offspring[k]) {
                    if offspring[k] != x {
                        any_perturbed = true;
                    }
                    break;
                }
                if attempt == MAX_CONSTRAINT_ATTEMPTS {
                    constraint_exhausted = true;
                    break 'sampling;
                }
            }
        }
        if constraint_exhausted {
            break;
        }
        if !any_perturbed {
            step_size_underflow = true;
            break;
        }

        // Evaluate and rank.
        for k in 0..lambda {
            fitness[k] = objective(&offspring[k]) + constraint.cost(&offspring[k]);
        }
        order.sort_by(|&lhs, &rhs| {
            if goal.is_better(fitness[lhs], fitness[rhs]) {
                std::cmp::Ordering::Less
            } else if goal.is_better(fitness[rhs], fitness[lhs]) {
                std::cmp::Ordering::Greater
            } else {
                std::cmp::Ordering::Equal
            }
        });
        best_fitness = fitness[order[0]];

        // Recombine the best mu offspring.
        let mut y_mean = vec![0.0_f64; n];
        let mut z_mean = vec![0.0_f64; n];
        for (rank, &k) in order[..mu].iter().enumerate() {
            let weight = weights[rank];
            for i in 0..n {
                y_mean[i] += weight * y[k][i];
                z_mean[i] += weight * z[k][i];
            }
        }
        for i in 0..n {
            x[i] += sigma * y_mean[i];
        }

        // Cumulate the step-size path through the rotated, unscaled step.
        let cs_norm = (cs * (2.0 - cs) * mu_eff).sqrt();
        for i in 0..n {
            let mut rotated = 0.0;
            for j in 0..n {
                rotated += rotation[(i, j)] * z_mean[j];
            }
            ps[i] = (1.0 - cs) * ps[i] + cs_norm * rotated;
        }
        let ps_norm = norm(&ps);

        // The stall gate suppresses the distribution path while the
        // step-size path is still inflated.
        let unbiased =
            ps_norm / (1.0 - (1.0 - cs).powf(2.0 * (generation as f64 + 1.0))).sqrt();
        let stalled = unbiased >= stall_threshold * expected_norm;
        let h = if stalled { 0.0 } else { 1.0 };

        let cc_norm = (cc * (2.0 - cc) * mu_eff).sqrt();
        for i in 0..n {
            pc[i] = (1.0 - cc) * pc[i] + h * cc_norm * y_mean[i];
        }

        // Rank-1 + rank-mu covariance update, every update_modulus
        // generations, followed by the eigendecomposition refresh.
        if (generation + 1) % config.update_modulus == 0 {
            for i in 0..n {
                for j in i..n {
                    let mut rank_mu = 0.0;
                    for (rank, &k) in order[..mu].iter().enumerate() {
                        rank_mu += weights[rank] * y[k][i] * y[k][j];
                    }
                    let value = (1.0 - ccov) * covariance[(i, j)]
                        + (ccov / acov)
                            * (pc[i] * pc[j]
                                + (1.0 - h) * cc * (2.0 - cc) * covariance[(i, j)])
                        + ccov * (1.0 - 1.0 / acov) * rank_mu;
                    covariance[(i, j)] = value;
                    covariance[(j, i)] = value;
                }
            }

            let eig = decompose(&covariance).map_err(|source| {
                FitError::computation(
                    "RUN.COVARIANCE_DECOMPOSITION",
                    format!("generation {generation}: {source}"),
                )
            })?;
            for (index, &value) in eig.values().iter().enumerate() {
                d[index] = value.max(0.0).sqrt();
            }
            rotation = eig.vectors().clone();
        }

        // Global step-size control.
        sigma *= ((cs / damping) * (ps_norm / expected_norm - 1.0)).exp();

        generation += 1;

        let (d_min, d_max) = extrema(&d);
        if tracer.is_enabled(generation) {
            tracer.trace(generation, best_fitness, sigma * d_min, sigma * d_max);
        }

        if history.len() == window {
            history.pop_front();
        }
        history.push_back(best_fitness);

        if history.len() == window {
            let (range_min, range_max) = history
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &value| {
                    (lo.min(value), hi.max(value))
                });
            if range_max - range_min < config.accuracy_goal
                && sigma * d_max < config.accuracy_goal * (1.0 + best_fitness.abs())
            {
                optimized = true;
                break;
            }
        }

        if !(sigma * d_max).is_normal() {
            step_size_underflow = true;
            break;
        }
    }

    let mut result = OptimizerResult {
        parameter_values: x,
        parameter_uncertainties: vec![0.0; n],
        fitness: best_fitness,
        global_step_size: sigma,
        local_step_sizes: d,
        rotation_matrix: rotation,
        covariance_matrix: covariance,
        step_size_cumulation_path: ps,
        distribution_cumulation_path: pc,
        generation_number: generation,
        optimized,
        step_size_underflow,
        constraint_exhausted,
    };

    if result.optimized {
        result.parameter_uncertainties = estimate_uncertainties(
            objective,
            goal,
            &result.parameter_values,
            &result.rotation_matrix,
            &result.local_step_sizes,
            result.global_step_size,
        );
    }

    Ok(result)
}

/// Estimates per-parameter uncertainties at the optimum: along every
/// principal axis the objective is probed until it worsens by about one,
/// and the per-axis amplitudes are mapped back through the rotation.
fn estimate_uncertainties<F>(
    objective: &F,
    goal: Goal,
    x: &[f64],
    rotation: &DenseMatrix,
    d: &[f64],
    sigma: f64,
) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let n = x.len();
    let reference = objective(x);
    let mut amplitudes = vec![0.0_f64; n];

    for axis in 0..n {
        let scale = sigma * d[axis];
        if !(scale > 0.0) {
            continue;
        }

        let direction: Vec<f64> = (0..n).map(|i| scale * rotation[(i, axis)]).collect();
        let worsening = |t: f64| -> f64 {
            let plus: Vec<f64> = (0..n).map(|i| x[i] + t * direction[i]).collect();
            let minus: Vec<f64> = (0..n).map(|i| x[i] - t * direction[i]).collect();
            let deviation = match goal {
                Goal::Minimize => {
                    0.5 * ((objective(&plus) - reference) + (objective(&minus) - reference))
                }
                Goal::Maximize => {
                    0.5 * ((reference - objective(&plus)) + (reference - objective(&minus)))
                }
            };
            deviation - 1.0
        };

        // Geometric bracketing, then bisection on the symmetrized
        // worsening.
        let mut hi = 1.0_f64;
        let mut bracketed = false;
        for _ in 0..UNCERTAINTY_BRACKET_DOUBLINGS {
            if worsening(hi) >= 0.0 {
                bracketed = true;
                break;
            }
            hi *= 2.0;
        }

        let t = if bracketed {
            let mut lo = 0.0_f64;
            let mut hi = hi;
            for _ in 0..UNCERTAINTY_BISECTIONS {
                let mid = 0.5 * (lo + hi);
                if worsening(mid) >= 0.0 {
                    hi = mid;
                } else {
                    lo = mid;
                }
            }
            0.5 * (lo + hi)
        } else {
            hi
        };

        amplitudes[axis] = t * scale;
    }

    (0..n)
        .map(|i| {
            let mut sum = 0.0;
            for axis in 0..n {
                let component = rotation[(i, axis)] * amplitudes[axis];
                sum += component * component;
            }
            sum.sqrt()
        })
        .collect()
}

#[inline]
fn norm(vector: &[f64]) -> f64 {
    vector.iter().map(|&value| value * value).sum::<f64>().sqrt()
}

#[inline]
fn extrema(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &value| {
            (lo.min(value), hi.max(value))
        })
}

#[cfg(test)]
mod tests {
    use crate::optimizer::constraints::{BoundedConstraint, Constraint, NoConstraint};
    use crate::optimizer::tracing::{BufferedTracer, NoTracing};
    use crate::optimizer::OptimizerBuilder;

    fn sphere(x: &[f64]) -> f64 {
        x.iter().map(|&value| value * value).sum()
    }

    #[test]
    fn minimizes_a_two_dimensional_sphere() {
        let optimizer = OptimizerBuilder::new()
            .with_problem_dimension(2)
            .with_parent_number(4)
            .with_population_size(8)
            .with_accuracy_goal(1.0e-8)
            .with_stop_generation(400)
            .with_random_seed(27182)
            .build()
            .expect("optimizer");

        let result = optimizer
            .minimize(sphere, &[3.0, -2.0], &[1.0, 1.0], 1.0, &NoConstraint, &mut NoTracing)
            .expect("result");

        assert!(result.is_optimized());
        assert!(!result.is_underflow());
        assert!(result.fitness() <= 1.0e-10, "fitness {}", result.fitness());
        for &value in result.parameter_values() {
            assert!(value.abs() <= 1.0e-5, "parameter {value}");
        }
    }

    #[test]
    fn maximization_mirrors_minimization() {
        let optimizer = OptimizerBuilder::new()
            .with_problem_dimension(2)
            .with_parent_number(4)
            .with_population_size(8)
            .with_accuracy_goal(1.0e-8)
            .with_stop_generation(400)
            .with_random_seed(27182)
            .build()
            .expect("optimizer");

        let result = optimizer
            .maximize(
                |x| -sphere(x),
                &[3.0, -2.0],
                &[1.0, 1.0],
                1.0,
                &NoConstraint,
                &mut NoTracing,
            )
            .expect("result");

        assert!(result.is_optimized());
        assert!(result.fitness().abs() <= 1.0e-10);
    }

    #[test]
    fn identical_seeds_reproduce_identical_trajectories() {
        let build = || {
            OptimizerBuilder::new()
                .with_problem_dimension(3)
                .with_parent_number(3)
                .with_population_size(8)
                .with_accuracy_goal(1.0e-8)
                .with_stop_generation(60)
                .with_random_seed(4711)
                .build()
                .expect("optimizer")
        };

        let lhs = build()
            .minimize(sphere, &[1.0, 1.0, 1.0], &[1.0, 1.0, 1.0], 0.5, &NoConstraint, &mut NoTracing)
            .expect("lhs");
        let rhs = build()
            .minimize(sphere, &[1.0, 1.0, 1.0], &[1.0, 1.0, 1.0], 0.5, &NoConstraint, &mut NoTracing)
            .expect("rhs");

        assert_eq!(lhs.generation_number(), rhs.generation_number());
        assert_eq!(lhs.fitness().to_bits(), rhs.fitness().to_bits());
        for (a, b) in lhs
            .parameter_values()
            .iter()
            .zip(rhs.parameter_values())
        {
            assert_eq!(a.to_bits(), b.to_bits());
        }
        assert_eq!(lhs.global_step_size().to_bits(), rhs.global_step_size().to_bits());
    }

    #[test]
    fn accepted_offspring_respect_the_bounds() {
        // The objective checks every generation-loop probe; the stop
        // generation keeps the run short of the post-optimization probes,
        // which are not constrained.
        let constraint = BoundedConstraint::new(vec![-0.5, -0.5], vec![2.0, 2.0]);
        let optimizer = OptimizerBuilder::new()
            .with_problem_dimension(2)
            .with_parent_number(2)
            .with_population_size(6)
            .with_accuracy_goal(1.0e-12)
            .with_stop_generation(30)
            .build()
            .expect("optimizer");

        let result = optimizer
            .minimize(
                |x| {
                    assert!(!constraint.is_violated(x), "offspring {x:?} out of bounds");
                    sphere(x)
                },
                &[1.0, 1.0],
                &[0.5, 0.5],
                0.5,
                &constraint,
                &mut NoTracing,
            )
            .expect("result");
        assert!(!result.is_constraint_exhausted());
    }

    #[test]
    fn infeasible_constraints_exhaust_resampling() {
        struct Infeasible;
        impl Constraint for Infeasible {
            fn is_violated(&self, _x: &[f64]) -> bool {
                true
            }
            fn cost(&self, _x: &[f64]) -> f64 {
                0.0
            }
        }

        let optimizer = OptimizerBuilder::new()
            .with_problem_dimension(2)
            .with_parent_number(2)
            .with_population_size(6)
            .with_stop_generation(50)
            .build()
            .expect("optimizer");

        let result = optimizer
            .minimize(sphere, &[0.0, 0.0], &[1.0, 1.0], 1.0, &Infeasible, &mut NoTracing)
            .expect("result");

        assert!(result.is_underflow());
        assert!(result.is_constraint_exhausted());
        assert!(!result.is_optimized());
        assert_eq!(result.generation_number(), 0);
    }

    #[test]
    fn stop_generation_caps_an_unconverged_run() {
        let optimizer = OptimizerBuilder::new()
            .with_problem_dimension(2)
            .with_parent_number(4)
            .with_population_size(8)
            .with_accuracy_goal(1.0e-12)
            .with_stop_generation(3)
            .build()
            .expect("optimizer");

        let result = optimizer
            .minimize(sphere, &[5.0, 5.0], &[1.0, 1.0], 1.0, &NoConstraint, &mut NoTracing)
            .expect("result");

        assert!(!result.is_optimized());
        assert!(!result.is_underflow());
        assert_eq!(result.generation_number(), 3);
    }

    #[test]
    fn uncertainties_match_the_curvature_of_a_quadratic() {
        // For f = sum(x_i^2 / s_i^2), a unit worsening along axis i is
        // reached at |x_i| = s_i.
        let scales = [1.0, 2.0];
        let optimizer = OptimizerBuilder::new()
            .with_problem_dimension(2)
            .with_parent_number(4)
            .with_population_size(8)
            .with_accuracy_goal(1.0e-10)
            .with_stop_generation(500)
            .build()
            .expect("optimizer");

        let result = optimizer
            .minimize(
                |x| (x[0] / scales[0]).powi(2) + (x[1] / scales[1]).powi(2),
                &[0.5, 0.5],
                &[1.0, 1.0],
                0.5,
                &NoConstraint,
                &mut NoTracing,
            )
            .expect("result");

        assert!(result.is_optimized());
        let uncertainties = result.parameter_uncertainties();
        assert!(
            (uncertainties[0] - scales[0]).abs() <= 0.1 * scales[0],
            "axis 0: {}",
            uncertainties[0]
        );
        assert!(
            (uncertainties[1] - scales[1]).abs() <= 0.1 * scales[1],
            "axis 1: {}",
            uncertainties[1]
        );
    }

    #[test]
    fn best_fitness_is_monotone_in_the_trace() {
        let optimizer = OptimizerBuilder::new()
            .with_problem_dimension(2)
            .with_parent_number(4)
            .with_population_size(8)
            .with_accuracy_goal(1.0e-10)
            .with_stop_generation(120)
            .build()
            .expect("optimizer");

        let mut tracer = BufferedTracer::new(10);
        optimizer
            .minimize(sphere, &[2.0, 2.0], &[1.0, 1.0], 1.0, &NoConstraint, &mut tracer)
            .expect("result");

        let log = tracer.into_log();
        let fitnesses: Vec<f64> = log
            .lines()
            .map(|line| {
                line.split_whitespace()
                    .nth(1)
                    .expect("fitness column")
                    .parse::<f64>()
                    .expect("numeric fitness")
            })
            .collect();
        assert!(fitnesses.len() >= 2);
        for pair in fitnesses.windows(2) {
            assert!(pair[1] <= pair[0] * 1.5 + 1.0e-30, "trace not contracting: {pair:?}");
        }
    }
}
