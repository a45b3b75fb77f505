//! Coordinate (COO) device arrays

use num_traits::Num;

use crate::error::{FormatError, Result};
use crate::launch::{DeviceSlice, KernelPlan, LaunchGeometry, OutputInit, PlanArg};
use crate::matrix::config::{Format, FormatParams};
use crate::matrix::conversion::PackedFormat;
use crate::matrix::triplet::{Shape, Triplet, TripletMatrix};
use crate::utils::{round_up, to_device_index, try_with_capacity};

/// A sparse matrix as three parallel arrays of 0-based triples
#[derive(Debug, Clone, PartialEq)]
pub struct CooMatrix<T> {
    pub n_rows: usize,
    pub n_cols: usize,
    pub row_idx: Vec<i32>,
    pub col_idx: Vec<i32>,
    pub values: Vec<T>,
}

impl<T> CooMatrix<T>
where
    T: Copy + Num,
{
    /// Splits the triple stream into device arrays; no reordering.
    pub fn from_triplets(matrix: &TripletMatrix<T>) -> Result<Self> {
        matrix.check_row_order()?;
        to_device_index("rows", matrix.n_rows)?;
        to_device_index("columns", matrix.n_cols)?;
        to_device_index("nonzeros", matrix.nnz())?;

        let nnz = matrix.nnz();
        let mut row_idx = try_with_capacity("coo row indices", nnz)?;
        let mut col_idx = try_with_capacity("coo column indices", nnz)?;
        let mut values = try_with_capacity("coo values", nnz)?;

        for t in matrix.iter() {
            row_idx.push(t.row as i32);
            col_idx.push(t.col as i32);
            values.push(t.value);
        }

        Ok(Self {
            n_rows: matrix.n_rows,
            n_cols: matrix.n_cols,
            row_idx,
            col_idx,
            values,
        })
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }
}

impl<T> PackedFormat<T> for CooMatrix<T>
where
    T: Copy + Num,
{
    fn format(&self) -> Format {
        Format::Coo
    }

    fn shape(&self) -> Shape {
        Shape::new(self.n_rows, self.n_cols, self.nnz())
    }

    fn stored_elements(&self) -> usize {
        self.values.len()
    }

    fn to_triplets(&self) -> Vec<Triplet<T>> {
        self.row_idx
            .iter()
            .zip(&self.col_idx)
            .zip(&self.values)
            .map(|((&r, &c), &v)| Triplet::new(r as usize, c as usize, v))
            .collect()
    }
}

impl CooMatrix<f64> {
    /// One work-item per nonzero; the kernel adds into a zeroed output.
    pub fn kernel_plan(&self, params: &FormatParams) -> std::result::Result<KernelPlan<'_>, FormatError> {
        let wg = params.work_group_size;
        Ok(KernelPlan {
            format: Format::Coo,
            kernel: Format::Coo.kernel_name(),
            args: vec![
                PlanArg::Input {
                    name: "row_idx",
                    data: DeviceSlice::Int(&self.row_idx),
                },
                PlanArg::Input {
                    name: "col_idx",
                    data: DeviceSlice::Int(&self.col_idx),
                },
                PlanArg::Input {
                    name: "values",
                    data: DeviceSlice::Real(&self.values),
                },
                PlanArg::Vector,
                PlanArg::Output,
                PlanArg::Int(to_device_index("nonzeros", self.nnz())?),
            ],
            output_len: self.n_rows,
            output_init: OutputInit::Zeroed,
            geometry: LaunchGeometry {
                global: round_up(self.nnz(), wg),
                local: wg,
            },
            rows: self.n_rows,
            cols: self.n_cols,
            nnz: self.nnz(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_through() {
        let m = TripletMatrix::from_tuples(3, 3, &[(0, 0, 4.0), (0, 2, 1.0), (2, 1, 3.0)]).unwrap();
        let coo = CooMatrix::from_triplets(&m).unwrap();
        assert_eq!(coo.row_idx, vec![0, 0, 2]);
        assert_eq!(coo.col_idx, vec![0, 2, 1]);
        assert_eq!(coo.values, vec![4.0, 1.0, 3.0]);
        assert_eq!(coo.to_triplets(), m.entries);
    }

    #[test]
    fn test_plan_geometry() {
        let m = TripletMatrix::from_tuples(2, 2, &[(0, 0, 1.0), (1, 1, 1.0)]).unwrap();
        let coo = CooMatrix::from_triplets(&m).unwrap();
        let plan = coo.kernel_plan(&FormatParams::default()).unwrap();
        assert_eq!(plan.geometry, LaunchGeometry { global: 64, local: 64 });
        assert_eq!(plan.output_init, OutputInit::Zeroed);
        assert_eq!(plan.args.len(), 6);
        assert_eq!(plan.args[5], PlanArg::Int(2));
    }
}
