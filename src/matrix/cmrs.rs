//! Compressed Multi-Row Storage (CMRS)
//!
//! Rows are grouped into strips of `height` rows, but unlike Sliced-ELL
//! nothing is padded: a strip is the compacted run of its nonzeros in file
//! order. Each element carries the row slot (`0..height`) it belongs to so a
//! kernel can scatter its partial sums into the right output row.

use num_traits::Num;

use crate::error::{FormatError, Result};
use crate::launch::{DeviceSlice, KernelPlan, LaunchGeometry, OutputInit, PlanArg};
use crate::matrix::config::{Format, FormatParams};
use crate::matrix::conversion::PackedFormat;
use crate::matrix::triplet::{Shape, Triplet, TripletMatrix};
use crate::utils::{round_up, to_device_index, try_with_capacity};

#[derive(Debug, Clone, PartialEq)]
pub struct CmrsMatrix<T> {
    pub n_rows: usize,
    pub n_cols: usize,
    /// Rows per strip
    pub height: usize,
    /// Start of each strip's nonzeros (`num_strips + 1`, last entry = nnz)
    pub strip_ptr: Vec<i32>,
    /// Row slot inside the strip for each nonzero
    pub row_in_strip: Vec<i32>,
    pub col_idx: Vec<i32>,
    pub values: Vec<T>,
}

impl<T> CmrsMatrix<T>
where
    T: Copy + Num,
{
    /// Single pass. When an element lands in a later strip, every strip
    /// crossed is closed at the current element index, so skipped empty rows
    /// keep their slots and a strip with no nonzeros repeats its start offset.
    pub fn from_triplets(matrix: &TripletMatrix<T>, params: &FormatParams) -> Result<Self> {
        params.validate()?;
        matrix.check_row_order()?;
        to_device_index("rows", matrix.n_rows)?;
        to_device_index("columns", matrix.n_cols)?;
        to_device_index("nonzeros", matrix.nnz())?;

        let height = params.height;
        let nnz = matrix.nnz();
        let num_strips = matrix.n_rows.div_ceil(height);

        let mut strip_ptr = try_with_capacity("cmrs strip pointers", num_strips + 1)?;
        let mut row_in_strip = try_with_capacity("cmrs row slots", nnz)?;
        let mut col_idx = try_with_capacity("cmrs column indices", nnz)?;
        let mut values = try_with_capacity("cmrs values", nnz)?;

        strip_ptr.push(0);
        let mut current_strip = 0;

        for (i, t) in matrix.iter().enumerate() {
            let strip = t.row / height;
            while current_strip < strip {
                // close the strip at the first element that does not belong to it
                strip_ptr.push(i as i32);
                current_strip += 1;
            }
            row_in_strip.push((t.row % height) as i32);
            col_idx.push(t.col as i32);
            values.push(t.value);
        }

        while strip_ptr.len() < num_strips + 1 {
            strip_ptr.push(nnz as i32);
        }

        Ok(Self {
            n_rows: matrix.n_rows,
            n_cols: matrix.n_cols,
            height,
            strip_ptr,
            row_in_strip,
            col_idx,
            values,
        })
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn num_strips(&self) -> usize {
        self.strip_ptr.len() - 1
    }

    /// Decodes strip `s` into absolute triples.
    pub fn strip_triplets(&self, s: usize) -> Vec<Triplet<T>> {
        let start = self.strip_ptr[s] as usize;
        let end = self.strip_ptr[s + 1] as usize;
        (start..end)
            .map(|i| {
                Triplet::new(
                    s * self.height + self.row_in_strip[i] as usize,
                    self.col_idx[i] as usize,
                    self.values[i],
                )
            })
            .collect()
    }
}

impl<T> PackedFormat<T> for CmrsMatrix<T>
where
    T: Copy + Num,
{
    fn format(&self) -> Format {
        Format::Cmrs
    }

    fn shape(&self) -> Shape {
        Shape::new(self.n_rows, self.n_cols, self.nnz())
    }

    fn stored_elements(&self) -> usize {
        self.values.len()
    }

    fn to_triplets(&self) -> Vec<Triplet<T>> {
        (0..self.num_strips())
            .flat_map(|s| self.strip_triplets(s))
            .collect()
    }
}

impl CmrsMatrix<f64> {
    /// One work-item per strip, each with `height` doubles of local
    /// scratch to accumulate its rows. Output is padded to whole strips.
    pub fn kernel_plan(&self, params: &FormatParams) -> std::result::Result<KernelPlan<'_>, FormatError> {
        let wg = params.work_group_size;
        let num_strips = self.num_strips();
        Ok(KernelPlan {
            format: Format::Cmrs,
            kernel: Format::Cmrs.kernel_name(),
            args: vec![
                PlanArg::Input {
                    name: "values",
                    data: DeviceSlice::Real(&self.values),
                },
                PlanArg::Input {
                    name: "col_idx",
                    data: DeviceSlice::Int(&self.col_idx),
                },
                PlanArg::Input {
                    name: "strip_ptr",
                    data: DeviceSlice::Int(&self.strip_ptr),
                },
                PlanArg::Input {
                    name: "row_in_strip",
                    data: DeviceSlice::Int(&self.row_in_strip),
                },
                PlanArg::Vector,
                PlanArg::Output,
                PlanArg::Int(to_device_index("strips", num_strips)?),
                PlanArg::Int(to_device_index("strip height", self.height)?),
                PlanArg::LocalScratch {
                    bytes: wg * self.height * std::mem::size_of::<f64>(),
                },
            ],
            output_len: num_strips * self.height,
            output_init: OutputInit::Overwritten,
            geometry: LaunchGeometry {
                global: round_up(num_strips, wg),
                local: wg,
            },
            rows: self.n_rows,
            cols: self.n_cols,
            nnz: self.nnz(),
        })
    }
}
