//! Utilities for converting between our matrix formats and external libraries

use ndarray::Array1;
use num_traits::Num;
use sprs::{CsMat, TriMat};

use crate::matrix::{CsrMatrix, TripletMatrix};

/// Converts our CSR matrix format to sprs CsMat format
///
/// Goes through a `TriMat` because sprs requires sorted columns within a
/// row while our CSR keeps file order.
pub fn to_sprs_csr<T>(matrix: &CsrMatrix<T>) -> CsMat<T>
where
    T: Copy + Num + Default,
{
    let mut tri = TriMat::with_capacity((matrix.n_rows, matrix.n_cols), matrix.nnz());
    for row in 0..matrix.n_rows {
        for (col, &value) in matrix.row_iter(row) {
            tri.add_triplet(row, col, value);
        }
    }
    tri.to_csr()
}

/// SpMV through sprs, independent of every converter in this crate.
///
/// Duplicate entries are summed, matching the reference evaluator.
pub fn sprs_spmv(matrix: &TripletMatrix<f64>, x: &[f64]) -> Vec<f64> {
    let mut tri = TriMat::with_capacity((matrix.n_rows, matrix.n_cols), matrix.nnz());
    for t in matrix.iter() {
        tri.add_triplet(t.row, t.col, t.value);
    }
    let csr: CsMat<f64> = tri.to_csr();
    let x = Array1::from(x.to_vec());
    (&csr * &x).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_sprs_csr() {
        let m = TripletMatrix::from_tuples(3, 3, &[(0, 0, 1.0), (0, 2, 2.0), (2, 1, 3.0)]).unwrap();
        let csr = CsrMatrix::from_triplets(&m).unwrap();
        let sprs_mat = to_sprs_csr(&csr);

        assert_eq!(sprs_mat.rows(), 3);
        assert_eq!(sprs_mat.nnz(), 3);
        assert_eq!(sprs_mat.get(0, 2), Some(&2.0));
        assert_eq!(sprs_mat.get(1, 1), None);
    }

    #[test]
    fn test_sprs_spmv() {
        let m = TripletMatrix::from_tuples(
            3,
            3,
            &[(0, 0, 4.0), (0, 2, 1.0), (1, 1, 2.0), (2, 0, 3.0), (2, 2, 5.0)],
        )
        .unwrap();
        assert_eq!(sprs_spmv(&m, &[1.0, 1.0, 1.0]), vec![5.0, 2.0, 8.0]);
    }
}
