//! Storage summary of a packed matrix
//!
//! Reports how much of each encoding is real data and how much is padding,
//! which is the main trade-off between the formats.

use std::fmt;

use num_traits::Num;

use crate::matrix::config::Format;
use crate::matrix::conversion::{PackedFormat, PackedMatrix};

/// Storage footprint of one packed matrix
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct FormatSummary {
    /// Logical nonzeros
    pub nnz: usize,
    /// Value slots actually stored, padding included
    pub stored: usize,
    /// Slots holding the padding sentinel
    pub padding: usize,
    /// Host bytes of all packed arrays (indices and values)
    pub bytes: usize,
}

impl FormatSummary {
    pub fn of<T>(packed: &PackedMatrix<T>) -> Self
    where
        T: Copy + Num,
    {
        let nnz = packed.shape().nnz;
        let stored = packed.stored_elements();
        let index_len = match packed {
            PackedMatrix::Coo(m) => m.row_idx.len() + m.col_idx.len(),
            PackedMatrix::Csr(m) => m.row_ptr.len() + m.col_idx.len(),
            PackedMatrix::Ell(m) => m.col_idx.len(),
            PackedMatrix::SlicedEll(m) => m.slice_offset.len() + m.col_idx.len(),
            PackedMatrix::Cmrs(m) => m.strip_ptr.len() + m.row_in_strip.len() + m.col_idx.len(),
        };

        Self {
            nnz,
            stored,
            padding: stored - nnz,
            bytes: index_len * std::mem::size_of::<i32>() + stored * std::mem::size_of::<T>(),
        }
    }

    /// Fraction of stored slots that are padding
    pub fn padding_ratio(&self) -> f64 {
        if self.stored == 0 {
            return 0.0;
        }
        self.padding as f64 / self.stored as f64
    }
}

impl fmt::Display for FormatSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} stored ({} padding, {:.1}%), {} bytes",
            self.stored,
            self.padding,
            self.padding_ratio() * 100.0,
            self.bytes
        )
    }
}

/// Summaries for every format, in [`Format::ALL`] order.
pub fn compare_formats(
    packed: &[PackedMatrix<f64>],
) -> Vec<(Format, FormatSummary)> {
    packed
        .iter()
        .map(|p| (p.format(), FormatSummary::of(p)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::config::FormatParams;
    use crate::matrix::triplet::TripletMatrix;

    fn scenario() -> TripletMatrix<f64> {
        TripletMatrix::from_tuples(
            3,
            3,
            &[(0, 0, 4.0), (0, 2, 1.0), (1, 1, 2.0), (2, 0, 3.0), (2, 2, 5.0)],
        )
        .unwrap()
    }

    #[test]
    fn test_ell_padding() {
        let packed =
            PackedMatrix::convert(Format::Ell, &scenario(), &FormatParams::default()).unwrap();
        let summary = FormatSummary::of(&packed);
        assert_eq!(summary.stored, 6);
        assert_eq!(summary.padding, 1);
        assert_eq!(summary.bytes, 6 * 4 + 6 * 8);
    }

    #[test]
    fn test_compact_formats_have_no_padding() {
        let m = scenario();
        let params = FormatParams::with_height(2);
        let packed: Vec<_> = [Format::Coo, Format::Csr, Format::Cmrs]
            .into_iter()
            .map(|f| PackedMatrix::convert(f, &m, &params).unwrap())
            .collect();

        for (format, summary) in compare_formats(&packed) {
            assert_eq!(summary.padding, 0, "{format}");
            assert_eq!(summary.padding_ratio(), 0.0);
        }
    }

    #[test]
    fn test_empty_matrix_ratio() {
        let m = TripletMatrix::<f64>::new(4, 4, vec![]).unwrap();
        let packed = PackedMatrix::convert(Format::Ell, &m, &FormatParams::default()).unwrap();
        let summary = FormatSummary::of(&packed);
        assert_eq!(summary.stored, 0);
        assert_eq!(summary.padding_ratio(), 0.0);
    }
}
