//! Sliced ELLPACK (Sigma-C) format
//!
//! Rows are grouped into slices of `height` rows. Each slice is padded only
//! to its own longest row and stored column-major with stride `height`, so
//! the `height` work-items of a work-group read consecutive addresses:
//!
//! ```text
//! element k of row r in slice s  ->  slice_offset[s] + k * height + (r % height)
//! ```

use num_traits::Num;

use crate::error::{FormatError, Result};
use crate::launch::{DeviceSlice, KernelPlan, LaunchGeometry, OutputInit, PlanArg};
use crate::matrix::config::{Format, FormatParams};
use crate::matrix::conversion::{PackedFormat, SENTINEL_COL};
use crate::matrix::triplet::{Shape, Triplet, TripletMatrix};
use crate::utils::{exclusive_scan, to_device_index, try_filled};

#[derive(Debug, Clone, PartialEq)]
pub struct SlicedEllMatrix<T> {
    pub n_rows: usize,
    pub n_cols: usize,
    /// Rows per slice
    pub height: usize,
    /// Base offset of each slice (`num_slices + 1`, last entry = buffer length)
    pub slice_offset: Vec<i32>,
    pub col_idx: Vec<i32>,
    pub values: Vec<T>,
    nnz: usize,
}

impl<T> SlicedEllMatrix<T>
where
    T: Copy + Num,
{
    /// Pass one measures each slice's width and lays out the offsets; pass
    /// two places every element at its strided slot. A trailing partial
    /// slice is still a full `height` rows tall on the device.
    pub fn from_triplets(matrix: &TripletMatrix<T>, params: &FormatParams) -> Result<Self> {
        params.validate()?;
        matrix.check_row_order()?;
        to_device_index("rows", matrix.n_rows)?;
        to_device_index("columns", matrix.n_cols)?;

        let height = params.height;
        let num_slices = matrix.n_rows.div_ceil(height);

        // Pass 1: widest row per slice
        let mut widths = vec![0usize; num_slices];
        let mut previous_row = None;
        let mut run = 0;
        for t in matrix.iter() {
            if previous_row != Some(t.row) {
                previous_row = Some(t.row);
                run = 0;
            }
            run += 1;
            let slice = t.row / height;
            widths[slice] = widths[slice].max(run);
        }

        let sizes: Vec<usize> = widths.iter().map(|w| w * height).collect();
        let offsets = exclusive_scan(&sizes);
        let total = offsets[num_slices];
        to_device_index("sliced-ell slots", total)?;

        let slice_offset = offsets.iter().map(|&o| o as i32).collect();
        let mut col_idx = try_filled("sliced-ell column indices", total, SENTINEL_COL)?;
        let mut values = try_filled("sliced-ell values", total, T::zero())?;

        // Pass 2: column-major placement inside each slice
        let mut previous_row = None;
        let mut k = 0;
        for t in matrix.iter() {
            if previous_row != Some(t.row) {
                previous_row = Some(t.row);
                k = 0;
            }
            let slot = offsets[t.row / height] + k * height + t.row % height;
            col_idx[slot] = t.col as i32;
            values[slot] = t.value;
            k += 1;
        }

        Ok(Self {
            n_rows: matrix.n_rows,
            n_cols: matrix.n_cols,
            height,
            slice_offset,
            col_idx,
            values,
            nnz: matrix.nnz(),
        })
    }

    pub fn nnz(&self) -> usize {
        self.nnz
    }

    pub fn num_slices(&self) -> usize {
        self.slice_offset.len() - 1
    }

    /// Padded width of slice `s`.
    pub fn slice_width(&self, s: usize) -> usize {
        (self.slice_offset[s + 1] - self.slice_offset[s]) as usize / self.height
    }

    /// Stored `(col, value)` pairs of row `r` in order, padding skipped.
    pub fn row_entries(&self, r: usize) -> Vec<(usize, T)> {
        let slice = r / self.height;
        let lane = r % self.height;
        let base = self.slice_offset[slice] as usize;

        (0..self.slice_width(slice))
            .map(|k| base + k * self.height + lane)
            .filter(|&slot| self.col_idx[slot] != SENTINEL_COL)
            .map(|slot| (self.col_idx[slot] as usize, self.values[slot]))
            .collect()
    }
}

impl<T> PackedFormat<T> for SlicedEllMatrix<T>
where
    T: Copy + Num,
{
    fn format(&self) -> Format {
        Format::SlicedEll
    }

    fn shape(&self) -> Shape {
        Shape::new(self.n_rows, self.n_cols, self.nnz)
    }

    fn stored_elements(&self) -> usize {
        self.values.len()
    }

    fn to_triplets(&self) -> Vec<Triplet<T>> {
        (0..self.n_rows)
            .flat_map(|r| {
                self.row_entries(r)
                    .into_iter()
                    .map(move |(c, v)| Triplet::new(r, c, v))
            })
            .collect()
    }
}

impl SlicedEllMatrix<f64> {
    /// One work-group of `height` work-items per slice. The output is
    /// padded to `num_slices * height` so no lane needs a bounds check.
    pub fn kernel_plan(&self, _params: &FormatParams) -> std::result::Result<KernelPlan<'_>, FormatError> {
        let padded_rows = self.num_slices() * self.height;
        Ok(KernelPlan {
            format: Format::SlicedEll,
            kernel: Format::SlicedEll.kernel_name(),
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
                PlanArg::Input {
                    name: "slice_offset",
                    data: DeviceSlice::Int(&self.slice_offset),
                },
                PlanArg::Int(to_device_index("rows", self.n_rows)?),
                PlanArg::Int(to_device_index("slice height", self.height)?),
            ],
            output_len: padded_rows,
            output_init: OutputInit::Overwritten,
            geometry: LaunchGeometry {
                global: padded_rows,
                local: self.height,
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

    fn scenario() -> TripletMatrix<f64> {
        TripletMatrix::from_tuples(
            3,
            3,
            &[(0, 0, 4.0), (0, 2, 1.0), (1, 1, 2.0), (2, 0, 3.0), (2, 2, 5.0)],
        )
        .unwrap()
    }

    #[test]
    fn test_column_major_layout() {
        let sell = SlicedEllMatrix::from_triplets(&scenario(), &FormatParams::with_height(2)).unwrap();

        // slice 0: rows 0-1, width 2; slice 1: row 2 (+1 padded lane), width 2
        assert_eq!(sell.slice_offset, vec![0, 4, 8]);
        assert_eq!(sell.col_idx, vec![0, 1, 2, -1, 0, -1, 2, -1]);
        assert_eq!(sell.values, vec![4.0, 2.0, 1.0, 0.0, 3.0, 0.0, 5.0, 0.0]);
    }

    #[test]
    fn test_per_slice_width() {
        // slice 0 has a row of 3, slice 1 only rows of 1
        let m = TripletMatrix::from_tuples(
            4,
            4,
            &[(0, 0, 1.0), (0, 1, 1.0), (0, 2, 1.0), (2, 3, 1.0), (3, 0, 1.0)],
        )
        .unwrap();
        let sell = SlicedEllMatrix::from_triplets(&m, &FormatParams::with_height(2)).unwrap();
        assert_eq!(sell.slice_width(0), 3);
        assert_eq!(sell.slice_width(1), 1);
        assert_eq!(sell.slice_offset, vec![0, 6, 8]);
        assert_eq!(sell.row_entries(1), vec![]);
        assert_eq!(sell.to_triplets(), m.entries);
    }

    #[test]
    fn test_zero_width_trailing_slice() {
        let m = TripletMatrix::from_tuples(5, 2, &[(0, 0, 1.0), (1, 1, 2.0)]).unwrap();
        let sell = SlicedEllMatrix::from_triplets(&m, &FormatParams::with_height(4)).unwrap();
        assert_eq!(sell.num_slices(), 2);
        assert_eq!(sell.slice_width(1), 0);
        assert_eq!(sell.slice_offset, vec![0, 4, 4]);

        let plan = sell.kernel_plan(&FormatParams::with_height(4)).unwrap();
        assert_eq!(plan.geometry, LaunchGeometry { global: 8, local: 4 });
        assert_eq!(plan.output_len, 8);
    }
}
