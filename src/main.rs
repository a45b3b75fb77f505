//! sparsecl command-line interface.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::error;

use sparsecl::matrix::{DEFAULT_HEIGHT, DEFAULT_WORK_GROUP_SIZE};
use sparsecl::pipeline::constant_vector;
use sparsecl::verify::DEFAULT_EPSILON;
use sparsecl::{
    read_matrix_market, run_format, ComputeBackend, ExecutionHarness, ExitCategory, Format,
    FormatParams, HarnessConfig, HostBackend, KernelSources, SpmvError, TripletMatrix,
};

#[derive(Parser)]
#[command(name = "sparsecl")]
#[command(about = "Convert a sparse matrix to GPU SpMV formats, run and verify each kernel", long_about = None)]
#[command(version)]
struct Cli {
    /// Matrix Market coordinate file
    #[arg(value_name = "MATRIX")]
    matrix: PathBuf,

    /// all, coo, csr, ell, sliced-ell or cmrs
    #[arg(short, long, default_value = "all")]
    format: String,

    /// Slice height (Sliced-ELL) and strip height (CMRS)
    #[arg(long, default_value_t = DEFAULT_HEIGHT)]
    height: usize,

    /// Work-group size for row, strip and nonzero kernels
    #[arg(long, default_value_t = DEFAULT_WORK_GROUP_SIZE)]
    work_group_size: usize,

    #[arg(long, value_enum, default_value_t = BackendKind::Host)]
    backend: BackendKind,

    /// Device index for the OpenCL backend
    #[arg(long, default_value_t = 0)]
    device: usize,

    /// Read kernel sources from this directory instead of the built-in ones
    #[arg(long, value_name = "DIR")]
    kernel_dir: Option<PathBuf>,

    /// Value every entry of the input vector is set to
    #[arg(long, default_value_t = 1.0)]
    x_value: f64,

    /// Absolute tolerance for verification
    #[arg(long, default_value_t = DEFAULT_EPSILON)]
    epsilon: f64,

    /// Fail a kernel that runs longer than this
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Sort triples by row before converting
    #[arg(long)]
    sort: bool,

    /// Host backend worker threads (default: one per CPU)
    #[arg(long)]
    threads: Option<usize>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    Host,
    Opencl,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::from(ExitCategory::Success.code()),
        Err(e) => {
            error!("{e:#}");
            let category = e
                .downcast_ref::<SpmvError>()
                .map(SpmvError::category)
                .unwrap_or(ExitCategory::OtherError);
            ExitCode::from(category.code())
        }
    }
}

fn parse_formats(arg: &str) -> Result<Vec<Format>, SpmvError> {
    if arg.eq_ignore_ascii_case("all") {
        return Ok(Format::ALL.to_vec());
    }
    arg.split(',').map(|f| f.trim().parse()).collect()
}

fn run(cli: &Cli) -> Result<()> {
    let formats = parse_formats(&cli.format)?;
    let params = FormatParams {
        height: cli.height,
        work_group_size: cli.work_group_size,
    };
    params.validate()?;

    let mut triplets = read_matrix_market(&cli.matrix)
        .with_context(|| format!("failed to load {}", cli.matrix.display()))?;
    if cli.sort {
        triplets.sort_by_row();
    }
    let shape = triplets.shape();
    println!(
        "{}: {} x {}, {} nonzeros",
        cli.matrix.display(),
        shape.rows,
        shape.cols,
        shape.nnz
    );

    let sources = match &cli.kernel_dir {
        Some(dir) => KernelSources::from_dir(dir)?,
        None => KernelSources::embedded(),
    };
    let config = HarnessConfig {
        timeout: cli.timeout_ms.map(Duration::from_millis),
        ..HarnessConfig::default()
    };

    match cli.backend {
        BackendKind::Host => {
            let threads = cli.threads.unwrap_or_else(num_cpus::get);
            let harness = ExecutionHarness::with_config(HostBackend::with_threads(threads)?, config);
            execute(&harness, &sources, &triplets, &formats, &params, cli)
        }
        BackendKind::Opencl => run_opencl(config, &sources, &triplets, &formats, &params, cli),
    }
}

#[cfg(feature = "opencl")]
fn run_opencl(
    config: HarnessConfig,
    sources: &KernelSources,
    triplets: &TripletMatrix<f64>,
    formats: &[Format],
    params: &FormatParams,
    cli: &Cli,
) -> Result<()> {
    let backend = sparsecl::OpenClBackend::new(cli.device)?;
    let harness = ExecutionHarness::with_config(backend, config);
    execute(&harness, sources, triplets, formats, params, cli)
}

#[cfg(not(feature = "opencl"))]
fn run_opencl(
    _config: HarnessConfig,
    _sources: &KernelSources,
    _triplets: &TripletMatrix<f64>,
    _formats: &[Format],
    _params: &FormatParams,
    _cli: &Cli,
) -> Result<()> {
    Err(SpmvError::BackendUnavailable("built without the `opencl` feature".to_string()).into())
}

fn execute<B: ComputeBackend>(
    harness: &ExecutionHarness<B>,
    sources: &KernelSources,
    triplets: &TripletMatrix<f64>,
    formats: &[Format],
    params: &FormatParams,
    cli: &Cli,
) -> Result<()> {
    println!("device: {}", harness.backend().device());
    let x = constant_vector(triplets.n_cols, cli.x_value)?;

    for &format in formats {
        let outcome = run_format(harness, sources, triplets, format, params, &x, cli.epsilon)?;
        let report = &outcome.report;

        println!("\n{format}");
        if cli.verbose {
            println!("  storage: {}", outcome.summary);
            println!("  conversion: {:.3} ms", outcome.conversion.as_secs_f64() * 1e3);
        }
        println!("  kernel: {:.3} ms", report.elapsed_ms());
        println!("  operations: {}", 2 * triplets.nnz());
        println!("  GFLOP/s: {:.3}", report.gflops);
        println!("  {}", outcome.verification);
    }

    Ok(())
}
