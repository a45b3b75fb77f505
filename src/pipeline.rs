//! Read → convert → execute → verify, for one format or several
//!
//! The reference result is computed once from the triples and every
//! format's kernel output is checked against it.

use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::backend::ComputeBackend;
use crate::error::Result;
use crate::harness::{ExecutionHarness, RunReport};
use crate::kernels::KernelSources;
use crate::matrix::{reference_spmv, Format, FormatParams, FormatSummary, PackedMatrix, TripletMatrix};
use crate::utils::try_filled;
use crate::verify::{ResultVerifier, Verification};

/// Everything measured for one format
#[derive(Debug, Clone, PartialEq)]
pub struct FormatOutcome {
    pub format: Format,
    pub summary: FormatSummary,
    /// Host-side packing time
    pub conversion: Duration,
    pub report: RunReport,
    pub verification: Verification,
}

/// A dense vector of `len` copies of `value`.
pub fn constant_vector(len: usize, value: f64) -> Result<Vec<f64>> {
    try_filled("input vector", len, value)
}

/// Converts, runs and verifies a single format.
pub fn run_format<B: ComputeBackend>(
    harness: &ExecutionHarness<B>,
    sources: &KernelSources,
    triplets: &TripletMatrix<f64>,
    format: Format,
    params: &FormatParams,
    x: &[f64],
    epsilon: f64,
) -> Result<FormatOutcome> {
    let reference = reference_spmv(triplets, x)?;
    run_against(harness, sources, triplets, format, params, x, &reference, epsilon)
}

/// Runs every format in `formats`, stopping at the first fatal error.
pub fn run_formats<B: ComputeBackend>(
    harness: &ExecutionHarness<B>,
    sources: &KernelSources,
    triplets: &TripletMatrix<f64>,
    formats: &[Format],
    params: &FormatParams,
    x: &[f64],
    epsilon: f64,
) -> Result<Vec<FormatOutcome>> {
    let reference = reference_spmv(triplets, x)?;
    formats
        .iter()
        .map(|&format| {
            run_against(harness, sources, triplets, format, params, x, &reference, epsilon)
        })
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn run_against<B: ComputeBackend>(
    harness: &ExecutionHarness<B>,
    sources: &KernelSources,
    triplets: &TripletMatrix<f64>,
    format: Format,
    params: &FormatParams,
    x: &[f64],
    reference: &[f64],
    epsilon: f64,
) -> Result<FormatOutcome> {
    params.check_work_group_limit(harness.backend().device().max_work_group_size)?;

    let start = Instant::now();
    let packed = PackedMatrix::convert(format, triplets, params)?;
    let conversion = start.elapsed();

    let summary = FormatSummary::of(&packed);
    debug!("{format}: packed in {conversion:?}, {summary}");

    let plan = packed.kernel_plan(params)?;
    let report = harness.run(&plan, sources.source(format), x)?;

    let verification = ResultVerifier::new(epsilon).check(reference, &report.output);
    if verification.is_ok() {
        info!("{format}: {verification}");
    } else {
        warn!("{format}: {verification}");
    }

    Ok(FormatOutcome {
        format,
        summary,
        conversion,
        report,
        verification,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HostBackend;
    use crate::error::{FormatError, SpmvError};

    #[test]
    fn test_all_formats_verify() {
        let harness = ExecutionHarness::new(HostBackend::with_threads(2).unwrap());
        let m = TripletMatrix::from_tuples(
            3,
            3,
            &[(0, 0, 4.0), (0, 2, 1.0), (1, 1, 2.0), (2, 0, 3.0), (2, 2, 5.0)],
        )
        .unwrap();
        let x = constant_vector(3, 1.0).unwrap();

        let outcomes = run_formats(
            &harness,
            &KernelSources::embedded(),
            &m,
            &Format::ALL,
            &FormatParams::with_height(2),
            &x,
            1e-7,
        )
        .unwrap();

        assert_eq!(outcomes.len(), 5);
        for outcome in outcomes {
            assert_eq!(outcome.report.output, vec![5.0, 2.0, 8.0], "{}", outcome.format);
            assert!(outcome.verification.is_ok());
        }
    }

    #[test]
    fn test_unsorted_input_is_fatal() {
        let harness = ExecutionHarness::new(HostBackend::with_threads(1).unwrap());
        let m = TripletMatrix::from_tuples(2, 2, &[(1, 0, 1.0), (0, 1, 1.0)]).unwrap();
        let err = run_format(
            &harness,
            &KernelSources::embedded(),
            &m,
            Format::Csr,
            &FormatParams::default(),
            &[1.0, 1.0],
            1e-7,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SpmvError::Format(FormatError::UnsortedRows { .. })
        ));
    }

    #[test]
    fn test_missing_entry_point_is_fatal() {
        let harness = ExecutionHarness::new(HostBackend::with_threads(1).unwrap());
        let m = TripletMatrix::from_tuples(2, 2, &[(0, 0, 1.0), (1, 1, 1.0)]).unwrap();
        let sources = KernelSources::embedded().with_source(Format::Csr, "__kernel void ell() {}");
        let err = run_format(
            &harness,
            &sources,
            &m,
            Format::Csr,
            &FormatParams::default(),
            &[1.0, 1.0],
            1e-7,
        )
        .unwrap_err();
        assert!(matches!(err, SpmvError::Dispatch { stage: "create kernel", .. }));
    }
}
