use super::eigen::{decompose, EigenError};
use super::DenseMatrix;

/// Eigenvalues below this fraction of the largest one are treated as
/// numerically zero, so a rank-deficient Gram matrix drops rank instead of
/// amplifying noise into the solution.
const RELATIVE_EIGENVALUE_CUTOFF: f64 = 1.0e3 * f64::EPSILON;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LeastSquaresError {
    #[error("right-hand side length mismatch: expected {expected}, got {actual}")]
    RhsLengthMismatch { expected: usize, actual: usize },
    #[error("symmetric solve failed: {source}")]
    Decomposition {
        #[from]
        source: EigenError,
    },
}

/// Solves the symmetric positive-semidefinite system G x = b through the
/// eigendecomposition of G, discarding near-null eigendirections.
///
/// This is the normal-equation solve used by the embedded continuum fit;
/// the cutoff keeps high-order Legendre bases well behaved.
pub fn solve_symmetric_system(
    gram: &DenseMatrix,
    rhs: &[f64],
) -> Result<Vec<f64>, LeastSquaresError> {
    let n = gram.nrows();
    if rhs.len() != n {
        return Err(LeastSquaresError::RhsLengthMismatch {
            expected: n,
            actual: rhs.len(),
        });
    }

    let eig = decompose(gram)?;
    let largest = eig
        .values()
        .iter()
        .fold(0.0_f64, |acc, &value| acc.max(value.abs()));
    let cutoff = largest * RELATIVE_EIGENVALUE_CUTOFF;

    let mut solution = vec![0.0_f64; n];
    for k in 0..n {
        let value = eig.values()[k];
        if value.abs() <= cutoff {
            continue;
        }

        let mut projection = 0.0;
        for row in 0..n {
            projection += eig.vector_component(row, k) * rhs[row];
        }
        let scale = projection / value;
        for row in 0..n {
            solution[row] += scale * eig.vector_component(row, k);
        }
    }

    Ok(solution)
}

#[cfg(test)]
mod tests {
    use super::{solve_symmetric_system, LeastSquaresError};
    use crate::numerics::DenseMatrix;

    #[test]
    fn recovers_known_solution_of_well_posed_system() {
        let mut gram = DenseMatrix::zeros(3, 3);
        gram[(0, 0)] = 4.0;
        gram[(0, 1)] = 1.0;
        gram[(0, 2)] = 0.5;
        gram[(1, 1)] = 3.0;
        gram[(1, 2)] = 0.25;
        gram[(2, 2)] = 2.0;
        for row in 0..3 {
            for col in 0..row {
                gram[(row, col)] = gram[(col, row)];
            }
        }

        let expected = [1.0, -2.0, 0.5];
        let mut rhs = [0.0; 3];
        for row in 0..3 {
            for col in 0..3 {
                rhs[row] += gram[(row, col)] * expected[col];
            }
        }

        let solution = solve_symmetric_system(&gram, &rhs).expect("solve");
        for (index, value) in solution.iter().enumerate() {
            assert!(
                (value - expected[index]).abs() <= 1.0e-10,
                "component {index}: {value}"
            );
        }
    }

    #[test]
    fn rank_deficient_system_returns_minimum_norm_solution() {
        // Rank-one Gram matrix: G = v v^T with v = (1, 1).
        let mut gram = DenseMatrix::zeros(2, 2);
        gram[(0, 0)] = 1.0;
        gram[(0, 1)] = 1.0;
        gram[(1, 0)] = 1.0;
        gram[(1, 1)] = 1.0;

        let solution = solve_symmetric_system(&gram, &[2.0, 2.0]).expect("solve");
        assert!((solution[0] - 1.0).abs() <= 1.0e-10);
        assert!((solution[1] - 1.0).abs() <= 1.0e-10);
    }

    #[test]
    fn rejects_mismatched_right_hand_side() {
        let gram = DenseMatrix::zeros(2, 2);
        let error = solve_symmetric_system(&gram, &[1.0]).unwrap_err();
        assert_eq!(
            error,
            LeastSquaresError::RhsLengthMismatch {
                expected: 2,
                actual: 1
            }
        );
    }
}
