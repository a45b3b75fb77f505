//! Compressed Sparse Row (CSR) matrix format implementation

use num_traits::Num;

use crate::error::{FormatError, Result};
use crate::launch::{DeviceSlice, KernelPlan, LaunchGeometry, OutputInit, PlanArg};
use crate::matrix::config::{Format, FormatParams};
use crate::matrix::conversion::PackedFormat;
use crate::matrix::triplet::{Shape, Triplet, TripletMatrix};
use crate::utils::{round_up, to_device_index, try_with_capacity};

/// A sparse matrix in Compressed Sparse Row (CSR) format
///
/// The CSR format stores a sparse matrix using three arrays:
/// - row_ptr: Array of size n_rows + 1 containing offsets into col_idx and values
/// - col_idx: Array of size nnz containing column indices of non-zero elements
/// - values: Array of size nnz containing the non-zero values
///
/// Indices are `i32` so the arrays upload to the device unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix<T> {
    /// Number of rows in the matrix
    pub n_rows: usize,

    /// Number of columns in the matrix
    pub n_cols: usize,

    /// Row pointers (size: n_rows + 1)
    /// row_ptr[i] is the index in col_idx and values where row i starts
    /// row_ptr[n_rows] is equal to nnz
    pub row_ptr: Vec<i32>,

    /// Column indices (size: nnz)
    pub col_idx: Vec<i32>,

    /// Non-zero values (size: nnz)
    pub values: Vec<T>,
}

impl<T> CsrMatrix<T>
where
    T: Copy + Num,
{
    /// Packs a row-sorted triple stream in a single pass.
    ///
    /// Whenever the row changes, the current element index is appended once
    /// for every row boundary crossed, so empty rows repeat the previous
    /// offset.
    pub fn from_triplets(matrix: &TripletMatrix<T>) -> Result<Self> {
        matrix.check_row_order()?;
        to_device_index("rows", matrix.n_rows)?;
        to_device_index("columns", matrix.n_cols)?;
        to_device_index("nonzeros", matrix.nnz())?;

        let nnz = matrix.nnz();
        let mut row_ptr = try_with_capacity("csr row pointers", matrix.n_rows + 1)?;
        let mut col_idx = try_with_capacity("csr column indices", nnz)?;
        let mut values = try_with_capacity("csr values", nnz)?;

        row_ptr.push(0);
        let mut previous_row = 0;

        for (i, t) in matrix.iter().enumerate() {
            while previous_row < t.row {
                row_ptr.push(i as i32);
                previous_row += 1;
            }
            col_idx.push(t.col as i32);
            values.push(t.value);
        }

        // Fill trailing empty rows; closes row_ptr[n_rows] = nnz
        while row_ptr.len() < matrix.n_rows + 1 {
            row_ptr.push(nnz as i32);
        }

        Ok(Self {
            n_rows: matrix.n_rows,
            n_cols: matrix.n_cols,
            row_ptr,
            col_idx,
            values,
        })
    }

    /// Returns the number of non-zero elements in the matrix
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Returns an iterator over the non-zero elements in row i
    ///
    /// Each item is a tuple (col_idx, value) representing a non-zero element
    pub fn row_iter(&self, i: usize) -> impl Iterator<Item = (usize, &T)> {
        assert!(i < self.n_rows, "Row index out of bounds");

        let start = self.row_ptr[i] as usize;
        let end = self.row_ptr[i + 1] as usize;

        self.col_idx[start..end]
            .iter()
            .zip(&self.values[start..end])
            .map(|(&col, val)| (col as usize, val))
    }
}

impl<T> PackedFormat<T> for CsrMatrix<T>
where
    T: Copy + Num,
{
    fn format(&self) -> Format {
        Format::Csr
    }

    fn shape(&self) -> Shape {
        Shape::new(self.n_rows, self.n_cols, self.nnz())
    }

    fn stored_elements(&self) -> usize {
        self.values.len()
    }

    fn to_triplets(&self) -> Vec<Triplet<T>> {
        (0..self.n_rows)
            .flat_map(|r| self.row_iter(r).map(move |(c, &v)| Triplet::new(r, c, v)))
            .collect()
    }
}

impl CsrMatrix<f64> {
    /// One work-item per row.
    pub fn kernel_plan(&self, params: &FormatParams) -> std::result::Result<KernelPlan<'_>, FormatError> {
        let wg = params.work_group_size;
        Ok(KernelPlan {
            format: Format::Csr,
            kernel: Format::Csr.kernel_name(),
            args: vec![
                PlanArg::Input {
                    name: "row_ptr",
                    data: DeviceSlice::Int(&self.row_ptr),
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
                PlanArg::Int(to_device_index("rows", self.n_rows)?),
            ],
            output_len: self.n_rows,
            output_init: OutputInit::Overwritten,
            geometry: LaunchGeometry {
                global: round_up(self.n_rows, wg),
                local: wg,
            },
            rows: self.n_rows,
            cols: self.n_cols,
            nnz: self.nnz(),
        })
    }
}
