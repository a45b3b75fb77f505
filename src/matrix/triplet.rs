//! Coordinate triples as read from a matrix file.
//!
//! A [`TripletMatrix`] is the buffered form of the triple stream. Two-pass
//! converters walk it twice instead of rewinding the source file.

use num_traits::Num;

use crate::error::FormatError;

/// Matrix dimensions and nonzero count. Immutable once parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape {
    pub rows: usize,
    pub cols: usize,
    pub nnz: usize,
}

impl Shape {
    pub fn new(rows: usize, cols: usize, nnz: usize) -> Self {
        Self { rows, cols, nnz }
    }
}

/// A single nonzero with 0-based coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triplet<T> {
    pub row: usize,
    pub col: usize,
    pub value: T,
}

impl<T> Triplet<T> {
    pub fn new(row: usize, col: usize, value: T) -> Self {
        Self { row, col, value }
    }

    fn check_bounds(&self, rows: usize, cols: usize) -> Result<(), FormatError> {
        if self.row >= rows {
            return Err(FormatError::RowOutOfRange {
                row: self.row,
                rows,
            });
        }
        if self.col >= cols {
            return Err(FormatError::ColumnOutOfRange {
                col: self.col,
                cols,
            });
        }
        Ok(())
    }
}

/// The full triple stream of a matrix, kept in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct TripletMatrix<T> {
    pub n_rows: usize,
    pub n_cols: usize,
    pub entries: Vec<Triplet<T>>,
}

impl<T> TripletMatrix<T>
where
    T: Copy + Num,
{
    /// Creates a matrix from 0-based triples, checking every coordinate.
    pub fn new(
        n_rows: usize,
        n_cols: usize,
        entries: Vec<Triplet<T>>,
    ) -> Result<Self, FormatError> {
        for t in &entries {
            t.check_bounds(n_rows, n_cols)?;
        }

        Ok(Self {
            n_rows,
            n_cols,
            entries,
        })
    }

    /// Builds a matrix from `(row, col, value)` tuples.
    pub fn from_tuples(
        n_rows: usize,
        n_cols: usize,
        tuples: &[(usize, usize, T)],
    ) -> Result<Self, FormatError> {
        let entries = tuples
            .iter()
            .map(|&(row, col, value)| Triplet::new(row, col, value))
            .collect();
        Self::new(n_rows, n_cols, entries)
    }

    pub fn shape(&self) -> Shape {
        Shape::new(self.n_rows, self.n_cols, self.entries.len())
    }

    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Triplet<T>> {
        self.entries.iter()
    }

    /// Fails on the first entry outside the shape.
    ///
    /// The fields are public, so a matrix built by hand has skipped the
    /// checks in [`TripletMatrix::new`].
    pub fn check_bounds(&self) -> Result<(), FormatError> {
        self.entries
            .iter()
            .try_for_each(|t| t.check_bounds(self.n_rows, self.n_cols))
    }

    /// Verifies that rows are non-decreasing and every entry is inside the shape.
    ///
    /// Every converter calls this before packing.
    pub fn check_row_order(&self) -> Result<(), FormatError> {
        let mut previous = 0;
        for (index, t) in self.entries.iter().enumerate() {
            t.check_bounds(self.n_rows, self.n_cols)?;
            if t.row < previous {
                return Err(FormatError::UnsortedRows {
                    index,
                    row: t.row,
                    previous,
                });
            }
            previous = t.row;
        }
        Ok(())
    }

    /// Stable sort by row, keeping file order inside each row.
    pub fn sort_by_row(&mut self) {
        self.entries.sort_by_key(|t| t.row);
    }

    /// Number of nonzeros in each row.
    pub fn row_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.n_rows];
        for t in &self.entries {
            if let Some(count) = counts.get_mut(t.row) {
                *count += 1;
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_out_of_range() {
        let err = TripletMatrix::from_tuples(2, 2, &[(2, 0, 1.0)]).unwrap_err();
        assert_eq!(err, FormatError::RowOutOfRange { row: 2, rows: 2 });

        let err = TripletMatrix::from_tuples(2, 2, &[(0, 5, 1.0)]).unwrap_err();
        assert_eq!(err, FormatError::ColumnOutOfRange { col: 5, cols: 2 });
    }

    #[test]
    fn test_row_order() {
        let sorted = TripletMatrix::from_tuples(3, 3, &[(0, 1, 1.0), (2, 0, 2.0)]).unwrap();
        assert!(sorted.check_row_order().is_ok());

        let mut unsorted =
            TripletMatrix::from_tuples(3, 3, &[(2, 1, 1.0), (0, 0, 2.0), (2, 0, 3.0)]).unwrap();
        assert_eq!(
            unsorted.check_row_order(),
            Err(FormatError::UnsortedRows {
                index: 1,
                row: 0,
                previous: 2
            })
        );

        unsorted.sort_by_row();
        assert!(unsorted.check_row_order().is_ok());
        // file order within row 2 survives the sort
        assert_eq!(unsorted.entries[1].col, 1);
        assert_eq!(unsorted.entries[2].col, 0);
    }

    #[test]
    fn test_row_counts() {
        let m = TripletMatrix::from_tuples(4, 2, &[(0, 0, 1), (0, 1, 1), (3, 1, 1)]).unwrap();
        assert_eq!(m.row_counts(), vec![2, 0, 0, 1]);
        assert_eq!(m.shape(), Shape::new(4, 2, 3));
    }

    #[test]
    fn test_hand_built_matrix_is_checked() {
        let m = TripletMatrix {
            n_rows: 2,
            n_cols: 2,
            entries: vec![Triplet::new(0, 0, 1.0), Triplet::new(1, 3, 1.0)],
        };
        assert_eq!(
            m.check_bounds(),
            Err(FormatError::ColumnOutOfRange { col: 3, cols: 2 })
        );
        assert_eq!(
            m.check_row_order(),
            Err(FormatError::ColumnOutOfRange { col: 3, cols: 2 })
        );
    }
}
