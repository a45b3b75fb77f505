//! OpenCL backend built on `opencl3`
//!
//! One session owns a context and an in-order command queue on a single
//! device. Handles release themselves on drop, so buffers, programs and
//! kernels are freed on every path out of a run.

use std::ptr;

use log::{debug, error, info};
use opencl3::command_queue::CommandQueue;
use opencl3::context::Context;
use opencl3::device::{get_all_devices, Device, CL_DEVICE_TYPE_ALL, CL_DEVICE_TYPE_GPU};
use opencl3::event::{Event, CL_COMPLETE};
use opencl3::kernel::Kernel;
use opencl3::memory::{Buffer, ClMem, CL_MEM_READ_ONLY, CL_MEM_READ_WRITE, CL_MEM_WRITE_ONLY};
use opencl3::program::Program;
use opencl3::types::{cl_device_id, cl_double, cl_int, cl_mem_flags, CL_BLOCKING};

use crate::backend::{BufferMode, ComputeBackend, DeviceInfo, KernelArg};
use crate::error::{Result, SpmvError};
use crate::launch::{DeviceSlice, ElementKind, LaunchGeometry};

/// A device buffer of one of the two kernel element types
pub enum ClBuffer {
    Int(Buffer<cl_int>),
    Real(Buffer<cl_double>),
}

impl ClBuffer {
    fn mem(&self) -> opencl3::types::cl_mem {
        match self {
            ClBuffer::Int(b) => b.get(),
            ClBuffer::Real(b) => b.get(),
        }
    }
}

pub struct OpenClBackend {
    _device: Device,
    context: Context,
    queue: CommandQueue,
    info: DeviceInfo,
}

/// GPUs first; every device type when no GPU is present.
fn device_ids() -> Result<Vec<cl_device_id>> {
    let gpus = get_all_devices(CL_DEVICE_TYPE_GPU).unwrap_or_default();
    if !gpus.is_empty() {
        return Ok(gpus);
    }
    get_all_devices(CL_DEVICE_TYPE_ALL)
        .map_err(|e| SpmvError::BackendUnavailable(format!("OpenCL platform query failed: {e}")))
}

fn describe(device: &Device) -> DeviceInfo {
    DeviceInfo {
        name: device.name().unwrap_or_default().trim().to_string(),
        vendor: device.vendor().unwrap_or_default().trim().to_string(),
        compute_units: device.max_compute_units().unwrap_or(1) as usize,
        max_work_group_size: device.max_work_group_size().unwrap_or(1),
    }
}

fn mem_flags(mode: BufferMode) -> cl_mem_flags {
    match mode {
        BufferMode::ReadOnly => CL_MEM_READ_ONLY,
        BufferMode::WriteOnly => CL_MEM_WRITE_ONLY,
        BufferMode::ReadWrite => CL_MEM_READ_WRITE,
    }
}

impl OpenClBackend {
    /// Opens a session on device `index` of [`ComputeBackend::enumerate_devices`].
    pub fn new(index: usize) -> Result<Self> {
        let ids = device_ids()?;
        let id = *ids.get(index).ok_or_else(|| {
            SpmvError::BackendUnavailable(format!(
                "device {index} requested, {} found",
                ids.len()
            ))
        })?;

        let device = Device::new(id);
        let info = describe(&device);
        let context = Context::from_device(&device)
            .map_err(|e| SpmvError::BackendUnavailable(format!("context creation: {e}")))?;

        // create_default is the OpenCL 1.2 entry point
        #[allow(deprecated)]
        let queue = CommandQueue::create_default(&context, 0)
            .map_err(|e| SpmvError::BackendUnavailable(format!("command queue: {e}")))?;

        info!("OpenCL device {index}: {info}");
        Ok(Self {
            _device: device,
            context,
            queue,
            info,
        })
    }
}

impl ComputeBackend for OpenClBackend {
    type Buffer = ClBuffer;
    type Program = Program;
    type Kernel = Kernel;
    type Event = Event;

    fn enumerate_devices() -> Result<Vec<DeviceInfo>> {
        let devices: Vec<DeviceInfo> = device_ids()?
            .into_iter()
            .map(|id| describe(&Device::new(id)))
            .collect();
        if devices.is_empty() {
            return Err(SpmvError::BackendUnavailable(
                "no OpenCL devices found".to_string(),
            ));
        }
        Ok(devices)
    }

    fn device(&self) -> &DeviceInfo {
        &self.info
    }

    fn allocate(&self, kind: ElementKind, len: usize, mode: BufferMode) -> Result<ClBuffer> {
        let flags = mem_flags(mode);
        // SAFETY: no host pointer is handed to the runtime
        let buffer = unsafe {
            match kind {
                ElementKind::Int => {
                    Buffer::<cl_int>::create(&self.context, flags, len, ptr::null_mut())
                        .map(ClBuffer::Int)
                }
                ElementKind::Real => {
                    Buffer::<cl_double>::create(&self.context, flags, len, ptr::null_mut())
                        .map(ClBuffer::Real)
                }
            }
        };
        buffer.map_err(|e| SpmvError::dispatch("allocate", format!("{len} elements: {e}")))
    }

    fn enqueue_write(&self, buffer: &mut ClBuffer, data: DeviceSlice<'_>) -> Result<()> {
        // Blocking writes: the host slice is only borrowed for this call
        // SAFETY: the slice is valid for the duration of the blocking copy
        let result = unsafe {
            match (buffer, data) {
                (ClBuffer::Int(b), DeviceSlice::Int(src)) => {
                    self.queue.enqueue_write_buffer(b, CL_BLOCKING, 0, src, &[])
                }
                (ClBuffer::Real(b), DeviceSlice::Real(src)) => {
                    self.queue.enqueue_write_buffer(b, CL_BLOCKING, 0, src, &[])
                }
                _ => return Err(SpmvError::dispatch("write", "element type mismatch")),
            }
        };
        result
            .map(|_| ())
            .map_err(|e| SpmvError::dispatch("write", e))
    }

    fn finish(&self) -> Result<()> {
        self.queue
            .finish()
            .map_err(|e| SpmvError::dispatch("finish", e))
    }

    fn build_program(&self, name: &str, source: &str, options: &str) -> Result<Program> {
        Program::create_and_build_from_source(&self.context, source, options).map_err(|log| {
            error!("build log for {name}:\n{log}");
            SpmvError::Build {
                kernel: name.to_string(),
                log,
            }
        })
    }

    fn create_kernel(&self, program: &Program, name: &str) -> Result<Kernel> {
        Kernel::create(program, name)
            .map_err(|e| SpmvError::dispatch("create kernel", format!("`{name}`: {e}")))
    }

    fn set_arg(&self, kernel: &mut Kernel, index: u32, arg: KernelArg<'_, ClBuffer>) -> Result<()> {
        // SAFETY: argument types follow the kernel signature listed in the launch plan
        let result = unsafe {
            match arg {
                KernelArg::Buffer(b) => kernel.set_arg(index, &b.mem()),
                KernelArg::Int(v) => kernel.set_arg(index, &(v as cl_int)),
                KernelArg::Local(bytes) => kernel.set_arg_local_buffer(index, bytes),
            }
        };
        result.map_err(|e| SpmvError::dispatch("set argument", format!("index {index}: {e}")))
    }

    fn enqueue_nd_range(&self, kernel: &Kernel, geometry: LaunchGeometry) -> Result<Event> {
        let global = [geometry.global];
        let local = [geometry.local];
        debug!(
            "enqueue NDRange global {} local {}",
            geometry.global, geometry.local
        );
        // SAFETY: all arguments were bound before launch
        let event = unsafe {
            self.queue.enqueue_nd_range_kernel(
                kernel.get(),
                1,
                ptr::null(),
                global.as_ptr(),
                local.as_ptr(),
                &[],
            )
        }
        .map_err(|e| SpmvError::dispatch("enqueue kernel", e))?;

        self.queue
            .flush()
            .map_err(|e| SpmvError::dispatch("flush", e))?;
        Ok(event)
    }

    fn is_complete(&self, event: &Event) -> Result<bool> {
        let status = event
            .command_execution_status()
            .map_err(|e| SpmvError::dispatch("event status", e))?;
        if status.0 < 0 {
            return Err(SpmvError::dispatch(
                "kernel",
                format!("execution failed with status {}", status.0),
            ));
        }
        Ok(status.0 == CL_COMPLETE)
    }

    fn wait(&self, event: &Event) -> Result<()> {
        event.wait().map_err(|e| SpmvError::dispatch("wait", e))
    }

    fn enqueue_read(&self, buffer: &ClBuffer, out: &mut [f64]) -> Result<()> {
        let ClBuffer::Real(b) = buffer else {
            return Err(SpmvError::dispatch("read", "element type mismatch"));
        };
        // SAFETY: blocking read into a live slice
        unsafe { self.queue.enqueue_read_buffer(b, CL_BLOCKING, 0, out, &[]) }
            .map(|_| ())
            .map_err(|e| SpmvError::dispatch("read", e))
    }
}
