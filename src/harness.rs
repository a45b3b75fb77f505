//! Execution harness: stages a launch plan on a backend and times the kernel
//!
//! A run allocates one device buffer per plan array, builds the kernel,
//! binds arguments in plan order, uploads and waits, launches, waits for
//! completion, then reads back the output. Only the launch-to-completion
//! interval is timed. Every buffer and handle is dropped at the end of the
//! run whether it succeeds or not.

use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::backend::{BufferMode, ComputeBackend, KernelArg};
use crate::error::{Result, SpmvError};
use crate::launch::{DeviceSlice, ElementKind, KernelPlan, OutputInit, PlanArg};
use crate::utils::try_filled;

/// Harness settings
#[derive(Debug, Clone, PartialEq)]
pub struct HarnessConfig {
    /// Give up on a kernel that has not completed after this long.
    /// `None` blocks until completion.
    pub timeout: Option<Duration>,
    /// Sleep between completion checks while a timeout is armed
    pub poll_interval: Duration,
    /// Passed to the backend's program build
    pub build_options: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            poll_interval: Duration::from_micros(50),
            build_options: String::new(),
        }
    }
}

/// Result of one kernel run
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// `rows` output values; device padding is cut off
    pub output: Vec<f64>,
    /// Kernel dispatch to completion
    pub elapsed: Duration,
    /// `2 * nnz / elapsed`, in GFLOP/s
    pub gflops: f64,
}

impl RunReport {
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1e3
    }
}

/// `2 * nnz` floating point operations over `elapsed`, in GFLOP/s.
pub fn gflops(nnz: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        2.0 * nnz as f64 / secs / 1e9
    } else {
        0.0
    }
}

/// A plan argument after staging.
enum Staged<Buf> {
    Buffer(Buf),
    Int(i32),
    Local(usize),
}

/// Runs launch plans on one backend session
pub struct ExecutionHarness<B: ComputeBackend> {
    backend: B,
    config: HarnessConfig,
}

impl<B: ComputeBackend> ExecutionHarness<B> {
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, HarnessConfig::default())
    }

    pub fn with_config(backend: B, config: HarnessConfig) -> Self {
        Self { backend, config }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Executes `plan` with kernel source `source` on the input vector `x`.
    pub fn run(&self, plan: &KernelPlan<'_>, source: &str, x: &[f64]) -> Result<RunReport> {
        if x.len() != plan.cols {
            return Err(SpmvError::InvalidParameter(format!(
                "vector has {} entries, matrix has {} columns",
                x.len(),
                plan.cols
            )));
        }
        let limit = self.backend.device().max_work_group_size;
        if plan.geometry.local > limit {
            return Err(SpmvError::InvalidParameter(format!(
                "`{}` needs work-groups of {}, device allows {limit}",
                plan.kernel, plan.geometry.local
            )));
        }
        let outputs = plan
            .args
            .iter()
            .filter(|a| matches!(a, PlanArg::Output))
            .count();
        if outputs != 1 {
            return Err(SpmvError::InvalidParameter(format!(
                "plan for `{}` has {outputs} output arguments",
                plan.kernel
            )));
        }

        // Allocate
        let mut staged = Vec::with_capacity(plan.args.len());
        let mut output_pos = 0;
        for (i, arg) in plan.args.iter().enumerate() {
            staged.push(match arg {
                PlanArg::Input { name, data } => {
                    debug!("{}: {name} {} x {:?}", plan.kernel, data.len(), data.kind());
                    Staged::Buffer(self.device_buffer(data.kind(), data.len(), BufferMode::ReadOnly)?)
                }
                PlanArg::Vector => {
                    Staged::Buffer(self.device_buffer(ElementKind::Real, x.len(), BufferMode::ReadOnly)?)
                }
                PlanArg::Output => {
                    output_pos = i;
                    let mode = match plan.output_init {
                        OutputInit::Overwritten => BufferMode::WriteOnly,
                        OutputInit::Zeroed => BufferMode::ReadWrite,
                    };
                    Staged::Buffer(self.device_buffer(ElementKind::Real, plan.output_len, mode)?)
                }
                PlanArg::Int(v) => Staged::Int(*v),
                PlanArg::LocalScratch { bytes } => Staged::Local(*bytes),
            });
        }

        // Build
        let program = self.backend.build_program(
            plan.format.kernel_file(),
            source,
            &self.config.build_options,
        )?;
        let mut kernel = self.backend.create_kernel(&program, plan.kernel)?;

        // Bind
        for (i, s) in staged.iter().enumerate() {
            let arg = match s {
                Staged::Buffer(b) => KernelArg::Buffer(b),
                Staged::Int(v) => KernelArg::Int(*v),
                Staged::Local(bytes) => KernelArg::Local(*bytes),
            };
            self.backend.set_arg(&mut kernel, i as u32, arg)?;
        }

        // Upload
        let zeros = match plan.output_init {
            OutputInit::Zeroed => try_filled("zeroed output", plan.output_len, 0.0)?,
            OutputInit::Overwritten => Vec::new(),
        };
        for (arg, s) in plan.args.iter().zip(staged.iter_mut()) {
            let Staged::Buffer(buffer) = s else { continue };
            let data = match arg {
                PlanArg::Input { data, .. } => *data,
                PlanArg::Vector => DeviceSlice::Real(x),
                PlanArg::Output => DeviceSlice::Real(&zeros),
                _ => continue,
            };
            if !data.is_empty() {
                self.backend.enqueue_write(buffer, data)?;
            }
        }
        self.backend.finish()?;
        debug!(
            "{}: {} bytes staged, launching global {} local {}",
            plan.kernel,
            plan.input_bytes(),
            plan.geometry.global,
            plan.geometry.local
        );

        // Launch
        let start = Instant::now();
        let event = self.backend.enqueue_nd_range(&kernel, plan.geometry)?;
        self.wait_for(&event)?;
        let elapsed = start.elapsed();

        // Read back
        let mut output = try_filled("output", plan.output_len, 0.0)?;
        if let Staged::Buffer(buffer) = &staged[output_pos] {
            if !output.is_empty() {
                self.backend.enqueue_read(buffer, &mut output)?;
            }
        }
        output.truncate(plan.rows);

        let report = RunReport {
            output,
            elapsed,
            gflops: gflops(plan.nnz, elapsed),
        };
        info!(
            "{}: {:.3} ms, {:.3} GFLOP/s",
            plan.format,
            report.elapsed_ms(),
            report.gflops
        );
        Ok(report)
    }

    /// OpenCL rejects zero-sized buffers, so empty arrays get one element.
    fn device_buffer(&self, kind: ElementKind, len: usize, mode: BufferMode) -> Result<B::Buffer> {
        self.backend.allocate(kind, len.max(1), mode)
    }

    fn wait_for(&self, event: &B::Event) -> Result<()> {
        let Some(timeout) = self.config.timeout else {
            return self.backend.wait(event);
        };

        let start = Instant::now();
        while !self.backend.is_complete(event)? {
            if start.elapsed() >= timeout {
                return Err(SpmvError::dispatch(
                    "timeout",
                    format!("kernel did not complete within {timeout:?}"),
                ));
            }
            thread::sleep(self.config.poll_interval);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::host::{HostBuffer, HostEvent, HostKernel, HostProgram};
    use crate::backend::{DeviceInfo, HostBackend};
    use crate::launch::LaunchGeometry;
    use crate::matrix::{Format, FormatParams, PackedMatrix, TripletMatrix};

    /// Host backend whose kernels never report completion.
    struct Stalled(HostBackend);

    impl ComputeBackend for Stalled {
        type Buffer = HostBuffer;
        type Program = HostProgram;
        type Kernel = HostKernel;
        type Event = HostEvent;

        fn enumerate_devices() -> Result<Vec<DeviceInfo>> {
            HostBackend::enumerate_devices()
        }
        fn device(&self) -> &DeviceInfo {
            self.0.device()
        }
        fn allocate(&self, kind: ElementKind, len: usize, mode: BufferMode) -> Result<HostBuffer> {
            self.0.allocate(kind, len, mode)
        }
        fn enqueue_write(&self, buffer: &mut HostBuffer, data: DeviceSlice<'_>) -> Result<()> {
            self.0.enqueue_write(buffer, data)
        }
        fn finish(&self) -> Result<()> {
            self.0.finish()
        }
        fn build_program(&self, name: &str, source: &str, options: &str) -> Result<HostProgram> {
            self.0.build_program(name, source, options)
        }
        fn create_kernel(&self, program: &HostProgram, name: &str) -> Result<HostKernel> {
            self.0.create_kernel(program, name)
        }
        fn set_arg(
            &self,
            kernel: &mut HostKernel,
            index: u32,
            arg: KernelArg<'_, HostBuffer>,
        ) -> Result<()> {
            self.0.set_arg(kernel, index, arg)
        }
        fn enqueue_nd_range(&self, kernel: &HostKernel, geometry: LaunchGeometry) -> Result<HostEvent> {
            self.0.enqueue_nd_range(kernel, geometry)
        }
        fn is_complete(&self, _event: &HostEvent) -> Result<bool> {
            Ok(false)
        }
        fn wait(&self, event: &HostEvent) -> Result<()> {
            self.0.wait(event)
        }
        fn enqueue_read(&self, buffer: &HostBuffer, out: &mut [f64]) -> Result<()> {
            self.0.enqueue_read(buffer, out)
        }
    }

    fn scenario() -> TripletMatrix<f64> {
        TripletMatrix::from_tuples(
            3,
            3,
            &[(0, 0, 4.0), (0, 2, 1.0), (1, 1, 2.0), (2, 0, 3.0), (2, 2, 5.0)],
        )
        .unwrap()
    }

    #[test]
    fn test_run_csr() {
        let harness = ExecutionHarness::new(HostBackend::with_threads(2).unwrap());
        let params = FormatParams::default();
        let packed = PackedMatrix::convert(Format::Csr, &scenario(), &params).unwrap();
        let plan = packed.kernel_plan(&params).unwrap();

        let src = crate::kernels::KernelSources::embedded();
        let report = harness.run(&plan, src.source(Format::Csr), &[1.0, 1.0, 1.0]).unwrap();
        assert_eq!(report.output, vec![5.0, 2.0, 8.0]);
        assert!(report.gflops >= 0.0);
    }

    #[test]
    fn test_vector_length_checked() {
        let harness = ExecutionHarness::new(HostBackend::with_threads(1).unwrap());
        let params = FormatParams::default();
        let packed = PackedMatrix::convert(Format::Ell, &scenario(), &params).unwrap();
        let plan = packed.kernel_plan(&params).unwrap();
        let err = harness.run(&plan, "", &[1.0]).unwrap_err();
        assert!(matches!(err, SpmvError::InvalidParameter(_)));
    }

    #[test]
    fn test_timeout() {
        let config = HarnessConfig {
            timeout: Some(Duration::from_millis(5)),
            poll_interval: Duration::from_millis(1),
            ..HarnessConfig::default()
        };
        let harness = ExecutionHarness::with_config(Stalled(HostBackend::with_threads(1).unwrap()), config);
        let params = FormatParams::default();
        let packed = PackedMatrix::convert(Format::Csr, &scenario(), &params).unwrap();
        let plan = packed.kernel_plan(&params).unwrap();

        let src = crate::kernels::KernelSources::embedded();
        let err = harness.run(&plan, src.source(Format::Csr), &[1.0; 3]).unwrap_err();
        assert!(matches!(err, SpmvError::Dispatch { stage: "timeout", .. }));
    }

    #[test]
    fn test_work_group_over_device_limit() {
        let harness = ExecutionHarness::new(HostBackend::with_threads(1).unwrap());
        let params = FormatParams::with_height(2048);
        let packed = PackedMatrix::convert(Format::SlicedEll, &scenario(), &params).unwrap();
        let plan = packed.kernel_plan(&params).unwrap();

        let src = crate::kernels::KernelSources::embedded();
        let err = harness.run(&plan, src.source(Format::SlicedEll), &[1.0; 3]).unwrap_err();
        assert!(matches!(err, SpmvError::InvalidParameter(_)));
    }

    #[test]
    fn test_gflops() {
        assert_eq!(gflops(500, Duration::from_secs(1)), 1e-6);
        assert_eq!(gflops(10, Duration::ZERO), 0.0);
    }
}
