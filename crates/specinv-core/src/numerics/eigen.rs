use super::{identity_matrix, DenseMatrix};

/// Sweeps after which the rotation threshold drops to zero.
const COARSE_SWEEPS: usize = 4;

/// Hard cap on Jacobi sweeps before the solver reports non-convergence.
const SWEEP_LIMIT: usize = 64;

/// The smallest magnitude whose reciprocal is still a normal number. Used
/// as the absolute off-diagonal tolerance.
const SAFE_MINIMUM: f64 = f64::MIN_POSITIVE / f64::EPSILON;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EigenError {
    #[error("eigendecomposition requires a non-empty matrix")]
    EmptyProblem,
    #[error("eigendecomposition requires a square matrix, got {rows}x{cols}")]
    NonSquare { rows: usize, cols: usize },
    #[error("matrix entry ({row},{col}) must be finite, got {value}")]
    NonFiniteEntry { row: usize, col: usize, value: f64 },
    #[error("Jacobi iteration exceeded {sweeps} sweeps without converging")]
    SweepLimitExceeded { sweeps: usize },
}

/// A complete symmetric eigendecomposition A = Z diag(w) Z^T.
#[derive(Debug, Clone)]
pub struct Eigendecomposition {
    /// Eigenvalues in ascending order.
    values: Vec<f64>,
    /// Orthonormal eigenvectors; column k belongs to `values[k]`.
    vectors: DenseMatrix,
}

impl Eigendecomposition {
    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn vectors(&self) -> &DenseMatrix {
        &self.vectors
    }

    /// The component `row` of eigenvector `column`.
    pub fn vector_component(&self, row: usize, column: usize) -> f64 {
        self.vectors[(row, column)]
    }
}

/// Solves the symmetric eigenproblem for the matrix supplied. Only the
/// upper triangle of `a` is trusted; the lower triangle is ignored.
///
/// Eigenvalues are returned in ascending order with orthonormal
/// eigenvector columns, so that A = Z diag(w) Z^T to working precision
/// even when eigenvalues are clustered.
pub fn decompose(a: &DenseMatrix) -> Result<Eigendecomposition, EigenError> {
    let n = validate_symmetric_input(a)?;

    // Work on a symmetrized copy; `diag` accumulates the eigenvalues.
    let mut work = DenseMatrix::zeros(n, n);
    for row in 0..n {
        for col in row..n {
            let value = a[(row, col)];
            work[(row, col)] = value;
            work[(col, row)] = value;
        }
    }

    let mut vectors = identity_matrix(n);
    let mut diag: Vec<f64> = (0..n).map(|index| work[(index, index)]).collect();
    let mut base = diag.clone();
    let mut shift = vec![0.0_f64; n];

    for sweep in 0..SWEEP_LIMIT {
        let off_sum = upper_off_diagonal_sum(&work, n);
        if off_sum <= SAFE_MINIMUM {
            return Ok(sorted_ascending(diag, vectors, n));
        }

        let threshold = if sweep < COARSE_SWEEPS {
            0.2 * off_sum / ((n * n) as f64)
        } else {
            0.0
        };

        for p in 0..n - 1 {
            for q in (p + 1)..n {
                let scaled = 100.0 * work[(p, q)].abs();

                // Annihilate entries that no longer matter at working
                // precision once the coarse sweeps are done.
                if sweep > COARSE_SWEEPS
                    && diag[p].abs() + scaled == diag[p].abs()
                    && diag[q].abs() + scaled == diag[q].abs()
                {
                    work[(p, q)] = 0.0;
                    continue;
                }
                if work[(p, q)].abs() <= threshold {
                    continue;
                }

                let gap = diag[q] - diag[p];
                let t = if gap.abs() + scaled == gap.abs() {
                    work[(p, q)] / gap
                } else {
                    let theta = 0.5 * gap / work[(p, q)];
                    let magnitude = 1.0 / (theta.abs() + (1.0 + theta * theta).sqrt());
                    if theta < 0.0 {
                        -magnitude
                    } else {
                        magnitude
                    }
                };

                let c = 1.0 / (1.0 + t * t).sqrt();
                let s = t * c;
                let tau = s / (1.0 + c);
                let h = t * work[(p, q)];

                shift[p] -= h;
                shift[q] += h;
                diag[p] -= h;
                diag[q] += h;
                work[(p, q)] = 0.0;

                for j in 0..p {
                    rotate(&mut work, j, p, j, q, s, tau);
                }
                for j in (p + 1)..q {
                    rotate(&mut work, p, j, j, q, s, tau);
                }
                for j in (q + 1)..n {
                    rotate(&mut work, p, j, q, j, s, tau);
                }
                for j in 0..n {
                    rotate(&mut vectors, j, p, j, q, s, tau);
                }
            }
        }

        for index in 0..n {
            base[index] += shift[index];
            diag[index] = base[index];
            shift[index] = 0.0;
        }
    }

    Err(EigenError::SweepLimitExceeded {
        sweeps: SWEEP_LIMIT,
    })
}

fn validate_symmetric_input(a: &DenseMatrix) -> Result<usize, EigenError> {
    let rows = a.nrows();
    let cols = a.ncols();
    if rows == 0 || cols == 0 {
        return Err(EigenError::EmptyProblem);
    }
    if rows != cols {
        return Err(EigenError::NonSquare { rows, cols });
    }

    for row in 0..rows {
        for col in row..cols {
            let value = a[(row, col)];
            if !value.is_finite() {
                return Err(EigenError::NonFiniteEntry { row, col, value });
            }
        }
    }

    Ok(rows)
}

fn upper_off_diagonal_sum(matrix: &DenseMatrix, n: usize) -> f64 {
    let mut sum = 0.0;
    for row in 0..n - 1 {
        for col in (row + 1)..n {
            sum += matrix[(row, col)].abs();
        }
    }
    sum
}

#[inline]
fn rotate(matrix: &mut DenseMatrix, i: usize, j: usize, k: usize, l: usize, s: f64, tau: f64) {
    let g = matrix[(i, j)];
    let h = matrix[(k, l)];
    matrix[(i, j)] = g - s * (h + g * tau);
    matrix[(k, l)] = h + s * (g - h * tau);
}

fn sorted_ascending(diag: Vec<f64>, vectors: DenseMatrix, n: usize) -> Eigendecomposition {
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&lhs, &rhs| diag[lhs].total_cmp(&diag[rhs]));

    let mut values = Vec::with_capacity(n);
    let mut sorted_vectors = DenseMatrix::zeros(n, n);
    for (column, &source) in order.iter().enumerate() {
        values.push(diag[source]);
        for row in 0..n {
            sorted_vectors[(row, column)] = vectors[(row, source)];
        }
    }

    Eigendecomposition {
        values,
        vectors: sorted_vectors,
    }
}

#[cfg(test)]
mod tests {
    use super::{decompose, EigenError, Eigendecomposition};
    use crate::numerics::DenseMatrix;

    #[test]
    fn diagonal_matrix_returns_sorted_diagonal() {
        let mut a = DenseMatrix::zeros(3, 3);
        a[(0, 0)] = 5.0;
        a[(1, 1)] = -1.0;
        a[(2, 2)] = 2.0;

        let eig = decompose(&a).expect("diagonal decomposition");
        assert_eq!(eig.values(), &[-1.0, 2.0, 5.0]);
        assert_orthonormal(&eig, 1.0e-12);
    }

    #[test]
    fn two_by_two_matches_analytic_eigenvalues() {
        let mut a = DenseMatrix::zeros(2, 2);
        a[(0, 0)] = 2.0;
        a[(0, 1)] = 1.0;
        a[(1, 1)] = 2.0;

        let eig = decompose(&a).expect("2x2 decomposition");
        assert!((eig.values()[0] - 1.0).abs() <= 1.0e-12);
        assert!((eig.values()[1] - 3.0).abs() <= 1.0e-12);
    }

    #[test]
    fn reconstruction_and_orthonormality_meet_contract_bounds() {
        let n = 12;
        let mut a = DenseMatrix::zeros(n, n);
        for row in 0..n {
            for col in row..n {
                // Deterministic ill-scaled symmetric test matrix.
                let value = 1.0 / ((row + col + 1) as f64) + if row == col { 3.0 } else { 0.0 };
                a[(row, col)] = value;
            }
        }

        let eig = decompose(&a).expect("decomposition");
        assert_reconstruction(&a, &eig, 1.0e-10);
        assert_orthonormal(&eig, 1.0e-10);

        let mut previous = f64::NEG_INFINITY;
        for &value in eig.values() {
            assert!(value >= previous, "eigenvalues must ascend");
            previous = value;
        }
    }

    #[test]
    fn clustered_eigenvalues_keep_full_rank_vectors() {
        let n = 6;
        let mut a = DenseMatrix::zeros(n, n);
        for index in 0..n {
            a[(index, index)] = 1.0;
        }
        a[(0, 1)] = 1.0e-13;
        a[(3, 4)] = -1.0e-13;

        let eig = decompose(&a).expect("near-identity decomposition");
        assert_orthonormal(&eig, 1.0e-10);
        for &value in eig.values() {
            assert!((value - 1.0).abs() <= 1.0e-12);
        }
    }

    #[test]
    fn rejects_empty_and_non_square_and_non_finite_inputs() {
        let empty = DenseMatrix::zeros(0, 0);
        assert_eq!(decompose(&empty).unwrap_err(), EigenError::EmptyProblem);

        let rectangular = DenseMatrix::zeros(2, 3);
        assert_eq!(
            decompose(&rectangular).unwrap_err(),
            EigenError::NonSquare { rows: 2, cols: 3 }
        );

        let mut tainted = DenseMatrix::zeros(2, 2);
        tainted[(0, 1)] = f64::NAN;
        match decompose(&tainted).unwrap_err() {
            EigenError::NonFiniteEntry { row: 0, col: 1, value } => assert!(value.is_nan()),
            other => panic!("expected NonFiniteEntry, got {other:?}"),
        }
    }

    #[test]
    fn lower_triangle_is_ignored() {
        let mut a = DenseMatrix::zeros(2, 2);
        a[(0, 0)] = 2.0;
        a[(0, 1)] = 1.0;
        a[(1, 1)] = 2.0;
        a[(1, 0)] = 777.0;

        let eig = decompose(&a).expect("upper-triangle decomposition");
        assert!((eig.values()[0] - 1.0).abs() <= 1.0e-12);
        assert!((eig.values()[1] - 3.0).abs() <= 1.0e-12);
    }

    fn assert_orthonormal(eig: &Eigendecomposition, tolerance: f64) {
        let n = eig.dimension();
        for lhs in 0..n {
            for rhs in 0..n {
                let mut dot = 0.0;
                for row in 0..n {
                    dot += eig.vector_component(row, lhs) * eig.vector_component(row, rhs);
                }
                let expected = if lhs == rhs { 1.0 } else { 0.0 };
                assert!(
                    (dot - expected).abs() <= tolerance,
                    "Z^T Z deviates at ({lhs},{rhs}): {dot:.15e}"
                );
            }
        }
    }

    fn assert_reconstruction(a: &DenseMatrix, eig: &Eigendecomposition, tolerance: f64) {
        let n = eig.dimension();
        let mut norm_a: f64 = 0.0;
        for row in 0..n {
            let mut row_sum = 0.0;
            for col in 0..n {
                let value = if row <= col { a[(row, col)] } else { a[(col, row)] };
                row_sum += value.abs();
            }
            norm_a = norm_a.max(row_sum);
        }

        for row in 0..n {
            for col in 0..n {
                let mut reconstructed = 0.0;
                for k in 0..n {
                    reconstructed += eig.vector_component(row, k)
                        * eig.values()[k]
                        * eig.vector_component(col, k);
                }
                let reference = if row <= col { a[(row, col)] } else { a[(col, row)] };
                assert!(
                    (reconstructed - reference).abs() / norm_a <= tolerance,
                    "A Z != Z diag(w) at ({row},{col})"
                );
            }
        }
    }
}
