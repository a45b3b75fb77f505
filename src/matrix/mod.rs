// Matrix data structures, file reading and format conversion

pub mod cmrs;
pub mod config;
pub mod conversion;
pub mod coo;
pub mod csr;
pub mod ell;
pub mod market;
pub mod reference;
pub mod sliced_ell;
pub mod summary;
pub mod triplet;

pub use cmrs::CmrsMatrix;
pub use config::{Format, FormatParams, DEFAULT_HEIGHT, DEFAULT_WORK_GROUP_SIZE};
pub use conversion::{PackedFormat, PackedMatrix, SENTINEL_COL};
pub use coo::CooMatrix;
pub use csr::CsrMatrix;
pub use ell::EllMatrix;
pub use market::{
    parse_matrix_market, read_matrix_market, write_matrix_market, Field, Header,
    MatrixMarketReader, Symmetry,
};
pub use reference::{reference_spmv, ReferenceEvaluator};
pub use sliced_ell::SlicedEllMatrix;
pub use summary::{compare_formats, FormatSummary};
pub use triplet::{Shape, Triplet, TripletMatrix};
