//! Matrix Market coordinate format reader/writer
//!
//! The reader is a forward-only iterator over the entries of a single file.
//! It produces exactly `nnz` triples, converted to 0-based coordinates.
//! Converters that need two passes work from the buffered
//! [`TripletMatrix`] returned by [`read_matrix_market`].

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use log::{debug, warn};

use crate::error::{FormatError, Result, SpmvError};
use crate::matrix::triplet::{Shape, Triplet, TripletMatrix};
use crate::utils::try_with_capacity;

const BANNER: &str = "%%matrixmarket";

/// Entries reserved before reading; the declared count is not trusted further.
const MAX_RESERVED_ENTRIES: usize = 1 << 20;

/// Value field declared in the banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Real,
    Integer,
    /// No value column; every entry is 1.
    Pattern,
}

/// Symmetry declared in the banner. Only the stored entries are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symmetry {
    General,
    Symmetric,
    SkewSymmetric,
}

/// Parsed banner and size line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub field: Field,
    pub symmetry: Symmetry,
    pub shape: Shape,
}

/// Lazy reader over a Matrix Market coordinate file.
pub struct MatrixMarketReader<R> {
    reader: R,
    header: Header,
    line_no: usize,
    produced: usize,
    line: String,
}

impl<R: BufRead> MatrixMarketReader<R> {
    /// Parses the banner and size line.
    ///
    /// Fails before any entry storage is touched when the banner is wrong,
    /// the matrix is complex or dense, or the size line is malformed.
    pub fn new(reader: R) -> std::result::Result<Self, FormatError> {
        let mut this = Self {
            reader,
            header: Header {
                field: Field::Real,
                symmetry: Symmetry::General,
                shape: Shape::new(0, 0, 0),
            },
            line_no: 0,
            produced: 0,
            line: String::new(),
        };

        if !this.read_line()? {
            return Err(FormatError::Banner("empty input".to_string()));
        }
        let (field, symmetry) = parse_banner(this.line.trim())?;

        if !this.read_content_line()? {
            return Err(FormatError::SizeLine {
                line: this.line_no,
                reason: "missing size line".to_string(),
            });
        }
        let shape = parse_size_line(this.line.trim(), this.line_no)?;

        this.header = Header {
            field,
            symmetry,
            shape,
        };
        Ok(this)
    }

    pub fn header(&self) -> Header {
        self.header
    }

    pub fn shape(&self) -> Shape {
        self.header.shape
    }

    fn read_line(&mut self) -> std::result::Result<bool, FormatError> {
        self.line.clear();
        let n = self
            .reader
            .read_line(&mut self.line)
            .map_err(|e| FormatError::Entry {
                line: self.line_no + 1,
                reason: e.to_string(),
            })?;
        if n > 0 {
            self.line_no += 1;
        }
        Ok(n > 0)
    }

    /// Advances to the next line that is neither blank nor a `%` comment.
    fn read_content_line(&mut self) -> std::result::Result<bool, FormatError> {
        while self.read_line()? {
            let trimmed = self.line.trim();
            if !trimmed.is_empty() && !trimmed.starts_with('%') {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn parse_entry(&self) -> std::result::Result<Triplet<f64>, FormatError> {
        let line = self.line_no;
        let shape = self.header.shape;
        let mut parts = self.line.split_whitespace();

        let mut index = |name: &str| -> std::result::Result<usize, FormatError> {
            let token = parts.next().ok_or_else(|| FormatError::Entry {
                line,
                reason: format!("missing {name} index"),
            })?;
            let value: usize = token.parse().map_err(|_| FormatError::Entry {
                line,
                reason: format!("invalid {name} index `{token}`"),
            })?;
            value.checked_sub(1).ok_or_else(|| FormatError::Entry {
                line,
                reason: format!("{name} index 0 in a 1-based file"),
            })
        };

        let row = index("row")?;
        let col = index("column")?;

        if row >= shape.rows {
            return Err(FormatError::RowOutOfRange {
                row,
                rows: shape.rows,
            });
        }
        if col >= shape.cols {
            return Err(FormatError::ColumnOutOfRange {
                col,
                cols: shape.cols,
            });
        }

        let value = match self.header.field {
            Field::Pattern => 1.0,
            Field::Real | Field::Integer => {
                let token = parts.next().ok_or_else(|| FormatError::Entry {
                    line,
                    reason: "missing value".to_string(),
                })?;
                token.parse::<f64>().map_err(|_| FormatError::Entry {
                    line,
                    reason: format!("invalid value `{token}`"),
                })?
            }
        };

        Ok(Triplet::new(row, col, value))
    }
}

impl<R: BufRead> Iterator for MatrixMarketReader<R> {
    type Item = std::result::Result<Triplet<f64>, FormatError>;

    fn next(&mut self) -> Option<Self::Item> {
        let expected = self.header.shape.nnz;
        if self.produced >= expected {
            return None;
        }

        let entry = match self.read_content_line() {
            Ok(true) => self.parse_entry(),
            Ok(false) => Err(FormatError::Truncated {
                expected,
                found: self.produced,
            }),
            Err(e) => Err(e),
        };

        // fuse after the first error
        self.produced = if entry.is_ok() { self.produced + 1 } else { expected };
        Some(entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.header.shape.nnz - self.produced;
        (0, Some(left))
    }
}

fn parse_banner(line: &str) -> std::result::Result<(Field, Symmetry), FormatError> {
    let tokens: Vec<String> = line
        .split_whitespace()
        .map(|t| t.to_ascii_lowercase())
        .collect();

    if tokens.first().map(String::as_str) != Some(BANNER) {
        return Err(FormatError::Banner(line.to_string()));
    }
    if tokens.len() != 5 {
        return Err(FormatError::Banner(format!(
            "expected 5 banner tokens, found {}",
            tokens.len()
        )));
    }

    if tokens[1] != "matrix" {
        return Err(FormatError::Unsupported(format!("object `{}`", tokens[1])));
    }
    match tokens[2].as_str() {
        "coordinate" => {}
        "array" => return Err(FormatError::Unsupported("dense array storage".to_string())),
        other => return Err(FormatError::Banner(format!("unknown format `{other}`"))),
    }

    let field = match tokens[3].as_str() {
        "real" | "double" => Field::Real,
        "integer" => Field::Integer,
        "pattern" => Field::Pattern,
        "complex" => {
            return Err(FormatError::Unsupported(
                "complex-valued matrices".to_string(),
            ))
        }
        other => return Err(FormatError::Banner(format!("unknown field `{other}`"))),
    };

    let symmetry = match tokens[4].as_str() {
        "general" => Symmetry::General,
        "symmetric" => Symmetry::Symmetric,
        "skew-symmetric" => Symmetry::SkewSymmetric,
        "hermitian" => return Err(FormatError::Unsupported("hermitian symmetry".to_string())),
        other => return Err(FormatError::Banner(format!("unknown symmetry `{other}`"))),
    };

    Ok((field, symmetry))
}

fn parse_size_line(line: &str, line_no: usize) -> std::result::Result<Shape, FormatError> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() != 3 {
        return Err(FormatError::SizeLine {
            line: line_no,
            reason: format!("expected `rows cols nnz`, found `{line}`"),
        });
    }

    let mut dims = [0usize; 3];
    for (slot, token) in dims.iter_mut().zip(&parts) {
        *slot = token.parse().map_err(|_| FormatError::SizeLine {
            line: line_no,
            reason: format!("invalid count `{token}`"),
        })?;
    }

    let [rows, cols, nnz] = dims;
    if rows == 0 || cols == 0 {
        return Err(FormatError::SizeLine {
            line: line_no,
            reason: "rows and columns must be at least 1".to_string(),
        });
    }

    Ok(Shape::new(rows, cols, nnz))
}

/// Reads a whole coordinate file from any buffered source.
pub fn parse_matrix_market<R: BufRead>(reader: R) -> Result<TripletMatrix<f64>> {
    let reader = MatrixMarketReader::new(reader)?;
    let header = reader.header();
    let shape = header.shape;

    if header.symmetry != Symmetry::General {
        warn!(
            "{:?} matrix: using the {} stored entries without mirroring",
            header.symmetry, shape.nnz
        );
    }

    let mut entries = try_with_capacity("triples", shape.nnz.min(MAX_RESERVED_ENTRIES))?;
    for entry in reader {
        entries.push(entry?);
    }

    debug!(
        "read {} x {} matrix with {} entries",
        shape.rows, shape.cols, shape.nnz
    );

    Ok(TripletMatrix {
        n_rows: shape.rows,
        n_cols: shape.cols,
        entries,
    })
}

/// Reads a matrix in Matrix Market format
pub fn read_matrix_market<P: AsRef<Path>>(path: P) -> Result<TripletMatrix<f64>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| SpmvError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_matrix_market(BufReader::new(file))
}

/// Write a matrix in Matrix Market format
pub fn write_matrix_market<P: AsRef<Path>>(path: P, matrix: &TripletMatrix<f64>) -> Result<()> {
    let path = path.as_ref();
    let io_err = |source| SpmvError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(io_err)?;
    let mut out = BufWriter::new(file);

    writeln!(out, "%%MatrixMarket matrix coordinate real general").map_err(io_err)?;
    writeln!(out, "{} {} {}", matrix.n_rows, matrix.n_cols, matrix.nnz()).map_err(io_err)?;

    for t in matrix.iter() {
        // Convert to 1-indexed
        writeln!(out, "{} {} {}", t.row + 1, t.col + 1, t.value).map_err(io_err)?;
    }

    out.flush().map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const SMALL: &str = "%%MatrixMarket matrix coordinate real general\n\
                         % a comment\n\
                         3 3 5\n\
                         1 1 4\n\
                         1 3 1\n\
                         2 2 2\n\
                         3 1 3\n\
                         3 3 5\n";

    #[test]
    fn test_header_and_entries() {
        let reader = MatrixMarketReader::new(Cursor::new(SMALL)).unwrap();
        assert_eq!(reader.shape(), Shape::new(3, 3, 5));
        assert_eq!(reader.header().field, Field::Real);

        let triples: Vec<_> = reader.map(|t| t.unwrap()).collect();
        assert_eq!(triples.len(), 5);
        assert_eq!(triples[0], Triplet::new(0, 0, 4.0));
        assert_eq!(triples[4], Triplet::new(2, 2, 5.0));
    }

    #[test]
    fn test_pattern_and_integer_fields() {
        let text = "%%MatrixMarket matrix coordinate pattern general\n2 2 2\n1 2\n2 1\n";
        let m = parse_matrix_market(Cursor::new(text)).unwrap();
        assert!(m.iter().all(|t| t.value == 1.0));

        let text = "%%MatrixMarket matrix coordinate integer general\n2 2 1\n2 2 7\n";
        let m = parse_matrix_market(Cursor::new(text)).unwrap();
        assert_eq!(m.entries, vec![Triplet::new(1, 1, 7.0)]);
    }

    #[test]
    fn test_banner_case_insensitive() {
        let text = "%%MatrixMarket MATRIX Coordinate REAL General\n1 1 1\n1 1 2.5\n";
        let m = parse_matrix_market(Cursor::new(text)).unwrap();
        assert_eq!(m.entries[0].value, 2.5);
    }

    #[test]
    fn test_rejects_bad_banner() {
        let text = "%%MatrixMarkt matrix coordinate real general\n1 1 1\n1 1 1\n";
        assert!(matches!(
            MatrixMarketReader::new(Cursor::new(text)),
            Err(FormatError::Banner(_))
        ));
    }

    #[test]
    fn test_rejects_complex_and_dense() {
        let text = "%%MatrixMarket matrix coordinate complex general\n1 1 1\n1 1 1 0\n";
        assert!(matches!(
            MatrixMarketReader::new(Cursor::new(text)),
            Err(FormatError::Unsupported(_))
        ));

        let text = "%%MatrixMarket matrix array real general\n1 1\n1\n";
        assert!(matches!(
            MatrixMarketReader::new(Cursor::new(text)),
            Err(FormatError::Unsupported(_))
        ));
    }

    #[test]
    fn test_rejects_bad_size_line() {
        let text = "%%MatrixMarket matrix coordinate real general\n3 3\n";
        assert!(matches!(
            MatrixMarketReader::new(Cursor::new(text)),
            Err(FormatError::SizeLine { line: 2, .. })
        ));

        let text = "%%MatrixMarket matrix coordinate real general\n0 3 0\n";
        assert!(matches!(
            MatrixMarketReader::new(Cursor::new(text)),
            Err(FormatError::SizeLine { .. })
        ));
    }

    #[test]
    fn test_truncated_and_out_of_range() {
        let text = "%%MatrixMarket matrix coordinate real general\n2 2 3\n1 1 1\n2 2 1\n";
        let err = parse_matrix_market(Cursor::new(text)).unwrap_err();
        assert!(matches!(
            err,
            SpmvError::Format(FormatError::Truncated {
                expected: 3,
                found: 2
            })
        ));

        let text = "%%MatrixMarket matrix coordinate real general\n2 2 1\n3 1 1\n";
        let err = parse_matrix_market(Cursor::new(text)).unwrap_err();
        assert!(matches!(
            err,
            SpmvError::Format(FormatError::RowOutOfRange { row: 2, rows: 2 })
        ));

        let text = "%%MatrixMarket matrix coordinate real general\n2 2 1\n0 1 1\n";
        let err = parse_matrix_market(Cursor::new(text)).unwrap_err();
        assert!(matches!(err, SpmvError::Format(FormatError::Entry { line: 3, .. })));
    }

    #[test]
    fn test_reader_fuses_after_error() {
        let text = "%%MatrixMarket matrix coordinate real general\n2 2 2\n1 x 1\n1 1 1\n";
        let mut reader = MatrixMarketReader::new(Cursor::new(text)).unwrap();
        assert!(reader.next().unwrap().is_err());
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_declared_count_is_not_preallocated() {
        let text = "%%MatrixMarket matrix coordinate real general\n2 2 900000000000000000\n1 1 1\n";
        let err = parse_matrix_market(Cursor::new(text)).unwrap_err();
        assert!(matches!(
            err,
            SpmvError::Format(FormatError::Truncated { found: 1, .. })
        ));
        assert_eq!(err.category(), crate::error::ExitCategory::FileError);
    }
}
