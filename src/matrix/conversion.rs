//! Dispatch from a triple stream to any of the packed formats

use num_traits::Num;

use crate::error::{FormatError, Result};
use crate::launch::KernelPlan;
use crate::matrix::cmrs::CmrsMatrix;
use crate::matrix::config::{Format, FormatParams};
use crate::matrix::coo::CooMatrix;
use crate::matrix::csr::CsrMatrix;
use crate::matrix::ell::EllMatrix;
use crate::matrix::sliced_ell::SlicedEllMatrix;
use crate::matrix::triplet::{Shape, Triplet, TripletMatrix};

/// Column index marking a padding slot in ELL and Sliced-ELL.
pub const SENTINEL_COL: i32 = -1;

/// Common view over every packed encoding.
pub trait PackedFormat<T> {
    fn format(&self) -> Format;

    /// Logical shape; `nnz` counts real nonzeros, not padding.
    fn shape(&self) -> Shape;

    /// Value slots held in memory, padding included.
    fn stored_elements(&self) -> usize;

    /// Decodes the packed arrays back into row-major triples.
    fn to_triplets(&self) -> Vec<Triplet<T>>;
}

/// Length of the longest run of equal consecutive rows.
///
/// For a row-sorted stream this is the maximum row length.
pub(crate) fn longest_row(rows: impl Iterator<Item = usize>) -> usize {
    let mut longest = 0;
    let mut run = 0;
    let mut previous = None;

    for row in rows {
        if previous == Some(row) {
            run += 1;
        } else {
            previous = Some(row);
            run = 1;
        }
        longest = longest.max(run);
    }

    longest
}

/// A matrix packed into one of the supported formats
#[derive(Debug, Clone, PartialEq)]
pub enum PackedMatrix<T> {
    Coo(CooMatrix<T>),
    Csr(CsrMatrix<T>),
    Ell(EllMatrix<T>),
    SlicedEll(SlicedEllMatrix<T>),
    Cmrs(CmrsMatrix<T>),
}

impl<T> PackedMatrix<T>
where
    T: Copy + Num,
{
    /// Packs `matrix` into `format`.
    pub fn convert(
        format: Format,
        matrix: &TripletMatrix<T>,
        params: &FormatParams,
    ) -> Result<Self> {
        params.validate()?;
        Ok(match format {
            Format::Coo => PackedMatrix::Coo(CooMatrix::from_triplets(matrix)?),
            Format::Csr => PackedMatrix::Csr(CsrMatrix::from_triplets(matrix)?),
            Format::Ell => PackedMatrix::Ell(EllMatrix::from_triplets(matrix)?),
            Format::SlicedEll => {
                PackedMatrix::SlicedEll(SlicedEllMatrix::from_triplets(matrix, params)?)
            }
            Format::Cmrs => PackedMatrix::Cmrs(CmrsMatrix::from_triplets(matrix, params)?),
        })
    }

    fn inner(&self) -> &dyn PackedFormat<T> {
        match self {
            PackedMatrix::Coo(m) => m,
            PackedMatrix::Csr(m) => m,
            PackedMatrix::Ell(m) => m,
            PackedMatrix::SlicedEll(m) => m,
            PackedMatrix::Cmrs(m) => m,
        }
    }
}

impl<T> PackedFormat<T> for PackedMatrix<T>
where
    T: Copy + Num,
{
    fn format(&self) -> Format {
        self.inner().format()
    }

    fn shape(&self) -> Shape {
        self.inner().shape()
    }

    fn stored_elements(&self) -> usize {
        self.inner().stored_elements()
    }

    fn to_triplets(&self) -> Vec<Triplet<T>> {
        self.inner().to_triplets()
    }
}

impl PackedMatrix<f64> {
    /// The launch plan of the wrapped format.
    pub fn kernel_plan(&self, params: &FormatParams) -> std::result::Result<KernelPlan<'_>, FormatError> {
        match self {
            PackedMatrix::Coo(m) => m.kernel_plan(params),
            PackedMatrix::Csr(m) => m.kernel_plan(params),
            PackedMatrix::Ell(m) => m.kernel_plan(params),
            PackedMatrix::SlicedEll(m) => m.kernel_plan(params),
            PackedMatrix::Cmrs(m) => m.kernel_plan(params),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SpmvError;

    fn scenario() -> TripletMatrix<f64> {
        TripletMatrix::from_tuples(
            3,
            3,
            &[(0, 0, 4.0), (0, 2, 1.0), (1, 1, 2.0), (2, 0, 3.0), (2, 2, 5.0)],
        )
        .unwrap()
    }

    #[test]
    fn test_longest_row() {
        assert_eq!(longest_row([0, 0, 1, 2, 2, 2].into_iter()), 3);
        assert_eq!(longest_row(std::iter::empty()), 0);
        assert_eq!(longest_row([4].into_iter()), 1);
    }

    #[test]
    fn test_every_format_decodes_to_input() {
        let m = scenario();
        for format in Format::ALL {
            let packed = PackedMatrix::convert(format, &m, &FormatParams::with_height(2)).unwrap();
            assert_eq!(packed.format(), format);
            assert_eq!(packed.shape(), m.shape());
            assert_eq!(packed.to_triplets(), m.entries, "{format}");
        }
    }

    #[test]
    fn test_stored_elements_include_padding() {
        let m = scenario();
        let params = FormatParams::with_height(2);
        let stored = |f| {
            PackedMatrix::convert(f, &m, &params)
                .unwrap()
                .stored_elements()
        };
        assert_eq!(stored(Format::Csr), 5);
        assert_eq!(stored(Format::Ell), 6);
        assert_eq!(stored(Format::SlicedEll), 8);
        assert_eq!(stored(Format::Cmrs), 5);
    }

    #[test]
    fn test_unsorted_input_rejected() {
        let m = TripletMatrix::from_tuples(2, 2, &[(1, 0, 1.0), (0, 0, 1.0)]).unwrap();
        for format in Format::ALL {
            let err = PackedMatrix::convert(format, &m, &FormatParams::default()).unwrap_err();
            assert!(matches!(
                err,
                SpmvError::Format(FormatError::UnsortedRows { index: 1, .. })
            ));
        }
    }

    #[test]
    fn test_kernel_plan_dispatch() {
        let packed =
            PackedMatrix::convert(Format::Ell, &scenario(), &FormatParams::default()).unwrap();
        let plan = packed.kernel_plan(&FormatParams::default()).unwrap();
        assert_eq!(plan.kernel, "ell");
        assert_eq!(plan.rows, 3);
        assert_eq!(plan.nnz, 5);
    }

    #[test]
    fn test_packed_matrix_debug() {
        let packed =
            PackedMatrix::convert(Format::Csr, &scenario(), &FormatParams::default()).unwrap();
        let text = format!("{packed:?}");
        assert!(text.starts_with("Csr(CsrMatrix"));
        assert!(text.contains("row_ptr: [0, 2, 3, 5]"));
    }
}
