pub mod eigen;
pub mod leastsq;
pub mod special;

pub use eigen::{decompose, EigenError, Eigendecomposition};
pub use leastsq::{solve_symmetric_system, LeastSquaresError};
pub use special::{erf, legendre_basis};

use faer::Mat;

pub type DenseMatrix = Mat<f64>;

/// Returns the n-by-n identity matrix.
pub fn identity_matrix(n: usize) -> DenseMatrix {
    let mut matrix = DenseMatrix::zeros(n, n);
    for index in 0..n {
        matrix[(index, index)] = 1.0;
    }
    matrix
}
