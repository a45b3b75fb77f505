//! # sparsecl: sparse formats for GPU SpMV
//!
//! sparsecl reads a sparse matrix in Matrix Market coordinate form, packs it
//! into one of several storage encodings tuned for parallel sparse
//! matrix-vector multiplication, runs the matching kernel on a compute
//! backend and checks the result against a reference computed from the
//! original triples.
//!
//! ## Formats
//!
//! - **COO**: the triples themselves, one work-item per nonzero
//! - **CSR**: row offsets plus column/value arrays, one work-item per row
//! - **ELL**: every row padded to the longest row, row-major
//! - **Sliced-ELL**: rows grouped into slices of `height`, each padded to
//!   its own longest row and stored column-major with stride `height`
//! - **CMRS**: rows grouped into strips with no padding; each nonzero keeps
//!   its row slot inside the strip
//!
//! Padding slots in ELL and Sliced-ELL carry column `-1` and value `0`.
//!
//! ## Backends
//!
//! The harness is generic over [`ComputeBackend`]. [`HostBackend`] runs the
//! kernels on a rayon pool and is always available; `OpenClBackend` (cargo
//! feature `opencl`) runs the OpenCL C sources in `kernels/` on a device.
//!
//! ## Usage
//!
//! ```
//! use sparsecl::{
//!     ExecutionHarness, Format, FormatParams, HostBackend, KernelSources, PackedMatrix,
//!     ResultVerifier, TripletMatrix, reference_spmv,
//! };
//!
//! let a = TripletMatrix::from_tuples(
//!     3, 3,
//!     &[(0, 0, 4.0), (0, 2, 1.0), (1, 1, 2.0), (2, 0, 3.0), (2, 2, 5.0)],
//! ).unwrap();
//! let x = vec![1.0; 3];
//!
//! let params = FormatParams::default();
//! let packed = PackedMatrix::convert(Format::SlicedEll, &a, &params).unwrap();
//! let plan = packed.kernel_plan(&params).unwrap();
//!
//! let harness = ExecutionHarness::new(HostBackend::new().unwrap());
//! let sources = KernelSources::embedded();
//! let report = harness.run(&plan, sources.source(Format::SlicedEll), &x).unwrap();
//!
//! let expected = reference_spmv(&a, &x).unwrap();
//! assert!(ResultVerifier::default().check(&expected, &report.output).is_ok());
//! ```

pub mod backend;
pub mod error;
pub mod harness;
pub mod kernels;
pub mod launch;
pub mod matrix;
pub mod pipeline;
pub mod utils;
pub mod verify;

// Re-export primary components
pub use backend::{BufferMode, ComputeBackend, DeviceInfo, HostBackend, KernelArg};
#[cfg(feature = "opencl")]
pub use backend::OpenClBackend;
pub use error::{ExitCategory, FormatError, Result, SpmvError};
pub use harness::{ExecutionHarness, HarnessConfig, RunReport};
pub use kernels::KernelSources;
pub use launch::{KernelPlan, LaunchGeometry, OutputInit, PlanArg};
pub use matrix::{
    read_matrix_market, reference_spmv, write_matrix_market, CmrsMatrix, CooMatrix, CsrMatrix,
    EllMatrix, Format, FormatParams, FormatSummary, MatrixMarketReader, PackedFormat,
    PackedMatrix, ReferenceEvaluator, Shape, SlicedEllMatrix, Triplet, TripletMatrix,
};
pub use pipeline::{run_format, run_formats, FormatOutcome};
pub use utils::{sprs_spmv, to_sprs_csr};
pub use verify::{ResultVerifier, Verification};

/// Version information for the sparsecl library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
