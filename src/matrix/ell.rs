//! ELLPACK (ELL) fixed-width padded format
//!
//! Every row occupies `width` consecutive slots in row-major order, where
//! `width` is the longest row. Unused slots hold column `-1` and value zero
//! and must be skipped by the kernel.

use num_traits::Num;

use crate::error::{FormatError, Result};
use crate::launch::{DeviceSlice, KernelPlan, LaunchGeometry, OutputInit, PlanArg};
use crate::matrix::config::{Format, FormatParams};
use crate::matrix::conversion::{longest_row, PackedFormat, SENTINEL_COL};
use crate::matrix::triplet::{Shape, Triplet, TripletMatrix};
use crate::utils::{round_up, to_device_index, try_filled};

/// Fixed-width padded row-major matrix
#[derive(Debug, Clone, PartialEq)]
pub struct EllMatrix<T> {
    pub n_rows: usize,
    pub n_cols: usize,
    /// Slots per row, the maximum row length
    pub width: usize,
    /// Column of each slot (`n_rows * width`), `-1` for padding
    pub col_idx: Vec<i32>,
    /// Value of each slot (`n_rows * width`), zero for padding
    pub values: Vec<T>,
    nnz: usize,
}

impl<T> EllMatrix<T>
where
    T: Copy + Num,
{
    /// Two passes over the triples: the first finds the longest run of a
    /// single row, the second drops each element into `row * width + k`.
    pub fn from_triplets(matrix: &TripletMatrix<T>) -> Result<Self> {
        matrix.check_row_order()?;
        to_device_index("rows", matrix.n_rows)?;
        to_device_index("columns", matrix.n_cols)?;

        let width = longest_row(matrix.iter().map(|t| t.row));
        let slots = matrix
            .n_rows
            .checked_mul(width)
            .ok_or(FormatError::TooLarge {
                what: "ell slots",
                value: usize::MAX,
            })?;
        to_device_index("ell slots", slots)?;

        let mut col_idx = try_filled("ell column indices", slots, SENTINEL_COL)?;
        let mut values = try_filled("ell values", slots, T::zero())?;

        let mut previous_row = None;
        let mut k = 0;
        for t in matrix.iter() {
            if previous_row != Some(t.row) {
                previous_row = Some(t.row);
                k = 0;
            }
            let slot = t.row * width + k;
            col_idx[slot] = t.col as i32;
            values[slot] = t.value;
            k += 1;
        }

        Ok(Self {
            n_rows: matrix.n_rows,
            n_cols: matrix.n_cols,
            width,
            col_idx,
            values,
            nnz: matrix.nnz(),
        })
    }

    pub fn nnz(&self) -> usize {
        self.nnz
    }

    /// The stored slots of row `r`, padding included.
    pub fn row_slots(&self, r: usize) -> (&[i32], &[T]) {
        let start = r * self.width;
        let end = start + self.width;
        (&self.col_idx[start..end], &self.values[start..end])
    }
}

impl<T> PackedFormat<T> for EllMatrix<T>
where
    T: Copy + Num,
{
    fn format(&self) -> Format {
        Format::Ell
    }

    fn shape(&self) -> Shape {
        Shape::new(self.n_rows, self.n_cols, self.nnz)
    }

    fn stored_elements(&self) -> usize {
        self.values.len()
    }

    fn to_triplets(&self) -> Vec<Triplet<T>> {
        let mut out = Vec::with_capacity(self.nnz);
        for r in 0..self.n_rows {
            let (cols, vals) = self.row_slots(r);
            for (&c, &v) in cols.iter().zip(vals) {
                if c != SENTINEL_COL {
                    out.push(Triplet::new(r, c as usize, v));
                }
            }
        }
        out
    }
}

impl EllMatrix<f64> {
    /// One work-item per row.
    pub fn kernel_plan(&self, params: &FormatParams) -> std::result::Result<KernelPlan<'_>, FormatError> {
        let wg = params.work_group_size;
        Ok(KernelPlan {
            format: Format::Ell,
            kernel: Format::Ell.kernel_name(),
            args: vec![
                PlanArg::Input {
                    name: "values",
                    data: DeviceSlice::Real(&self.values),
                },
                PlanArg::Input {
                    name: "col_idx",
                    data: DeviceSlice::Int(&self.col_idx),
                },
                PlanArg::Vector,
                PlanArg::Output,
                PlanArg::Int(to_device_index("rows", self.n_rows)?),
                PlanArg::Int(to_device_index("ell width", self.width)?),
            ],
            output_len: self.n_rows,
            output_init: OutputInit::Overwritten,
            geometry: LaunchGeometry {
                global: round_up(self.n_rows, wg),
                local: wg,
            },
            rows: self.n_rows,
            cols: self.n_cols,
            nnz: self.nnz,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_layout() {
        let m = TripletMatrix::from_tuples(
            3,
            3,
            &[(0, 0, 4.0), (0, 2, 1.0), (1, 1, 2.0), (2, 0, 3.0), (2, 2, 5.0)],
        )
        .unwrap();
        let ell = EllMatrix::from_triplets(&m).unwrap();

        assert_eq!(ell.width, 2);
        assert_eq!(ell.col_idx, vec![0, 2, 1, -1, 0, 2]);
        assert_eq!(ell.values, vec![4.0, 1.0, 2.0, 0.0, 3.0, 5.0]);
    }

    #[test]
    fn test_skipped_rows_stay_addressable() {
        // rows 1 and 2 are empty
        let m = TripletMatrix::from_tuples(4, 4, &[(0, 1, 1.0), (3, 0, 2.0), (3, 3, 3.0)]).unwrap();
        let ell = EllMatrix::from_triplets(&m).unwrap();

        assert_eq!(ell.width, 2);
        assert_eq!(ell.col_idx, vec![1, -1, -1, -1, -1, -1, 0, 3]);
        assert_eq!(ell.row_slots(3).1, &[2.0, 3.0]);
        assert_eq!(ell.to_triplets(), m.entries);
    }

    #[test]
    fn test_no_nonzeros() {
        let m = TripletMatrix::<f64>::new(2, 2, vec![]).unwrap();
        let ell = EllMatrix::from_triplets(&m).unwrap();
        assert_eq!(ell.width, 0);
        assert!(ell.values.is_empty());
        assert!(ell.to_triplets().is_empty());
    }
}
