//! Reference SpMV straight from the triple stream
//!
//! This is the ground truth every packed format is checked against. It
//! never looks at a packed encoding, only at the triples as they were read.

use num_traits::Num;
use std::ops::AddAssign;

use crate::error::{Result, SpmvError};
use crate::matrix::triplet::TripletMatrix;
use crate::utils::try_filled;

/// Computes `y = A * x` by accumulating `y[row] += value * x[col]` over a
/// zero-initialized output.
pub fn reference_spmv<T>(matrix: &TripletMatrix<T>, x: &[T]) -> Result<Vec<T>>
where
    T: Copy + Num + AddAssign,
{
    if x.len() != matrix.n_cols {
        return Err(SpmvError::InvalidParameter(format!(
            "vector has {} entries, matrix has {} columns",
            x.len(),
            matrix.n_cols
        )));
    }

    matrix.check_bounds()?;

    let mut output = try_filled("reference output", matrix.n_rows, T::zero())?;
    for t in matrix.iter() {
        output[t.row] += t.value * x[t.col];
    }
    Ok(output)
}

/// Holds the triples of one matrix and evaluates it against any vector.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceEvaluator<'a, T> {
    matrix: &'a TripletMatrix<T>,
}

impl<'a, T> ReferenceEvaluator<'a, T>
where
    T: Copy + Num + AddAssign,
{
    pub fn new(matrix: &'a TripletMatrix<T>) -> Self {
        Self { matrix }
    }

    pub fn compute(&self, x: &[T]) -> Result<Vec<T>> {
        reference_spmv(self.matrix, x)
    }
}
