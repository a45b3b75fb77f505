//! Compute backends that can run the SpMV kernels
//!
//! A backend exposes the small set of primitives the harness needs: device
//! buffers, program builds, positional kernel arguments, a one-dimensional
//! NDRange launch and completion events. The harness is written against
//! [`ComputeBackend`] only, so the same run can target an OpenCL device or
//! the host thread pool.

mod emulation;
pub mod host;
#[cfg(feature = "opencl")]
pub mod opencl;

use std::fmt;

use crate::error::Result;
use crate::launch::{DeviceSlice, ElementKind, LaunchGeometry};

pub use host::HostBackend;
#[cfg(feature = "opencl")]
pub use opencl::OpenClBackend;

/// What a backend reports about the device it is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub vendor: String,
    pub compute_units: usize,
    pub max_work_group_size: usize,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {} compute units, max work-group {})",
            self.name, self.vendor, self.compute_units, self.max_work_group_size
        )
    }
}

/// Access mode of a device buffer as seen by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

/// A positional kernel argument bound by [`ComputeBackend::set_arg`].
#[derive(Debug)]
pub enum KernelArg<'a, B> {
    Buffer(&'a B),
    Int(i32),
    /// `__local` scratch of the given size in bytes
    Local(usize),
}

/// The compute primitives the execution harness is built on.
///
/// One value of an implementing type is one session: it is bound to a
/// single device and owns its queue. All handles are released on drop.
pub trait ComputeBackend {
    type Buffer;
    type Program;
    type Kernel;
    type Event;

    /// Devices this backend could open.
    fn enumerate_devices() -> Result<Vec<DeviceInfo>>
    where
        Self: Sized;

    /// The device this session is bound to.
    fn device(&self) -> &DeviceInfo;

    /// Allocates `len` elements of `kind`.
    fn allocate(&self, kind: ElementKind, len: usize, mode: BufferMode) -> Result<Self::Buffer>;

    /// Queues a host-to-device copy into the start of `buffer`.
    fn enqueue_write(&self, buffer: &mut Self::Buffer, data: DeviceSlice<'_>) -> Result<()>;

    /// Blocks until every queued command has completed.
    fn finish(&self) -> Result<()>;

    /// Compiles `source`. On failure the error carries the build log verbatim.
    fn build_program(&self, name: &str, source: &str, options: &str) -> Result<Self::Program>;

    fn create_kernel(&self, program: &Self::Program, name: &str) -> Result<Self::Kernel>;

    fn set_arg(
        &self,
        kernel: &mut Self::Kernel,
        index: u32,
        arg: KernelArg<'_, Self::Buffer>,
    ) -> Result<()>;

    /// Launches `kernel` over a one-dimensional range.
    fn enqueue_nd_range(&self, kernel: &Self::Kernel, geometry: LaunchGeometry)
        -> Result<Self::Event>;

    /// Non-blocking completion check; an event that failed is an error.
    fn is_complete(&self, event: &Self::Event) -> Result<bool>;

    /// Blocks until `event` has completed.
    fn wait(&self, event: &Self::Event) -> Result<()>;

    /// Blocking device-to-host copy of the first `out.len()` values.
    fn enqueue_read(&self, buffer: &Self::Buffer, out: &mut [f64]) -> Result<()>;
}
