//! Host backend: runs the SpMV kernels on a rayon thread pool
//!
//! Always available, so the full pipeline can be exercised on machines
//! without an OpenCL runtime. Buffers are 64-byte aligned host arrays and
//! launches complete before `enqueue_nd_range` returns.

use std::sync::{Arc, RwLock, RwLockReadGuard};

use aligned_vec::AVec;
use log::{debug, info};
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::backend::emulation::{self, ArgView, HostKernelKind};
use crate::backend::{BufferMode, ComputeBackend, DeviceInfo, KernelArg};
use crate::error::{Result, SpmvError};
use crate::launch::{DeviceSlice, ElementKind, LaunchGeometry};

/// Alignment of host buffers in bytes
const BUFFER_ALIGN: usize = 64;

/// Largest work-group the host backend accepts
const MAX_WORK_GROUP_SIZE: usize = 1024;

#[derive(Debug)]
enum HostData {
    Int(AVec<i32>),
    Real(AVec<f64>),
}

impl HostData {
    fn zeroed(kind: ElementKind, len: usize) -> Self {
        match kind {
            ElementKind::Int => HostData::Int(AVec::from_iter(BUFFER_ALIGN, (0..len).map(|_| 0))),
            ElementKind::Real => {
                HostData::Real(AVec::from_iter(BUFFER_ALIGN, (0..len).map(|_| 0.0)))
            }
        }
    }

    fn len(&self) -> usize {
        match self {
            HostData::Int(v) => v.len(),
            HostData::Real(v) => v.len(),
        }
    }
}

/// A host-side device buffer
#[derive(Debug, Clone)]
pub struct HostBuffer {
    data: Arc<RwLock<HostData>>,
    mode: BufferMode,
}

impl HostBuffer {
    pub fn mode(&self) -> BufferMode {
        self.mode
    }
}

/// The entry points found in a kernel source
#[derive(Debug, Clone)]
pub struct HostProgram {
    entry_points: Vec<String>,
}

#[derive(Debug, Clone)]
enum HostArg {
    Buffer(Arc<RwLock<HostData>>),
    Int(i32),
    Local(usize),
}

/// A kernel with its positional arguments
#[derive(Debug)]
pub struct HostKernel {
    name: String,
    kind: HostKernelKind,
    args: Vec<Option<HostArg>>,
}

/// Host launches finish synchronously, so an event is only a receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostEvent;

pub struct HostBackend {
    pool: ThreadPool,
    device: DeviceInfo,
}

impl HostBackend {
    /// Creates a session using one worker per logical CPU.
    pub fn new() -> Result<Self> {
        Self::with_threads(num_cpus::get())
    }

    pub fn with_threads(threads: usize) -> Result<Self> {
        let threads = threads.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("sparsecl-host-{i}"))
            .build()
            .map_err(|e| SpmvError::BackendUnavailable(e.to_string()))?;

        let device = host_device(threads);
        info!("host backend: {device}");
        Ok(Self { pool, device })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

fn host_device(threads: usize) -> DeviceInfo {
    DeviceInfo {
        name: "host".to_string(),
        vendor: std::env::consts::ARCH.to_string(),
        compute_units: threads,
        max_work_group_size: MAX_WORK_GROUP_SIZE,
    }
}

/// Names following `__kernel void` in an OpenCL C source.
fn kernel_entry_points(source: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = source;

    while let Some(pos) = rest.find("__kernel") {
        rest = &rest[pos + "__kernel".len()..];
        let mut tokens = rest
            .split(|c: char| c.is_whitespace() || c == '(')
            .filter(|t| !t.is_empty());
        if tokens.next() == Some("void") {
            if let Some(name) = tokens.next() {
                names.push(name.to_string());
            }
        }
    }

    names
}

impl ComputeBackend for HostBackend {
    type Buffer = HostBuffer;
    type Program = HostProgram;
    type Kernel = HostKernel;
    type Event = HostEvent;

    fn enumerate_devices() -> Result<Vec<DeviceInfo>> {
        Ok(vec![host_device(num_cpus::get())])
    }

    fn device(&self) -> &DeviceInfo {
        &self.device
    }

    fn allocate(&self, kind: ElementKind, len: usize, mode: BufferMode) -> Result<HostBuffer> {
        if len == 0 {
            return Err(SpmvError::dispatch("allocate", "zero-sized buffer"));
        }
        Ok(HostBuffer {
            data: Arc::new(RwLock::new(HostData::zeroed(kind, len))),
            mode,
        })
    }

    fn enqueue_write(&self, buffer: &mut HostBuffer, data: DeviceSlice<'_>) -> Result<()> {
        let mut guard = buffer
            .data
            .write()
            .map_err(|_| SpmvError::dispatch("write", "buffer lock poisoned"))?;

        let capacity = guard.len();
        if data.len() > capacity {
            return Err(SpmvError::dispatch(
                "write",
                format!("{} elements into a buffer of {capacity}", data.len()),
            ));
        }

        match (&mut *guard, data) {
            (HostData::Int(dst), DeviceSlice::Int(src)) => dst[..src.len()].copy_from_slice(src),
            (HostData::Real(dst), DeviceSlice::Real(src)) => {
                dst[..src.len()].copy_from_slice(src)
            }
            _ => return Err(SpmvError::dispatch("write", "element type mismatch")),
        }
        Ok(())
    }

    fn finish(&self) -> Result<()> {
        Ok(())
    }

    fn build_program(&self, name: &str, source: &str, _options: &str) -> Result<HostProgram> {
        let entry_points = kernel_entry_points(source);
        if entry_points.is_empty() {
            return Err(SpmvError::Build {
                kernel: name.to_string(),
                log: format!("{name}: no `__kernel void` entry point in source"),
            });
        }
        debug!("host program {name}: entry points {entry_points:?}");
        Ok(HostProgram { entry_points })
    }

    fn create_kernel(&self, program: &HostProgram, name: &str) -> Result<HostKernel> {
        if !program.entry_points.iter().any(|e| e == name) {
            return Err(SpmvError::dispatch(
                "create kernel",
                format!("no kernel named `{name}` in program"),
            ));
        }
        let kind = HostKernelKind::from_name(name).ok_or_else(|| {
            SpmvError::dispatch(
                "create kernel",
                format!("host backend cannot run kernel `{name}`"),
            )
        })?;

        Ok(HostKernel {
            name: name.to_string(),
            kind,
            args: vec![None; kind.arity()],
        })
    }

    fn set_arg(
        &self,
        kernel: &mut HostKernel,
        index: u32,
        arg: KernelArg<'_, HostBuffer>,
    ) -> Result<()> {
        let arity = kernel.args.len();
        let slot = kernel.args.get_mut(index as usize).ok_or_else(|| {
            SpmvError::dispatch(
                "set argument",
                format!("index {index} out of range for `{}` with {arity} arguments", kernel.name),
            )
        })?;

        *slot = Some(match arg {
            KernelArg::Buffer(b) => HostArg::Buffer(Arc::clone(&b.data)),
            KernelArg::Int(v) => HostArg::Int(v),
            KernelArg::Local(bytes) => HostArg::Local(bytes),
        });
        Ok(())
    }

    fn enqueue_nd_range(&self, kernel: &HostKernel, geometry: LaunchGeometry) -> Result<HostEvent> {
        if geometry.local == 0 || geometry.global % geometry.local != 0 {
            return Err(SpmvError::dispatch(
                "enqueue kernel",
                format!(
                    "global size {} is not a multiple of local size {}",
                    geometry.global, geometry.local
                ),
            ));
        }
        if geometry.local > MAX_WORK_GROUP_SIZE {
            return Err(SpmvError::dispatch(
                "enqueue kernel",
                format!("local size {} exceeds {MAX_WORK_GROUP_SIZE}", geometry.local),
            ));
        }

        let args = kernel
            .args
            .iter()
            .enumerate()
            .map(|(i, a)| {
                a.as_ref().ok_or_else(|| {
                    SpmvError::dispatch(
                        "enqueue kernel",
                        format!("argument {i} of `{}` is not set", kernel.name),
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let output_index = kernel.kind.output_index();
        let output = match args[output_index] {
            HostArg::Buffer(b) => Arc::clone(b),
            _ => {
                return Err(SpmvError::dispatch(
                    "enqueue kernel",
                    format!("argument {output_index} must be the output buffer"),
                ))
            }
        };

        let guards = args
            .iter()
            .enumerate()
            .map(|(i, a)| match a {
                HostArg::Buffer(b) if i != output_index => {
                    if Arc::ptr_eq(b, &output) {
                        return Err(SpmvError::dispatch(
                            "enqueue kernel",
                            format!("argument {i} aliases the output buffer"),
                        ));
                    }
                    b.read()
                        .map(Some)
                        .map_err(|_| SpmvError::dispatch("enqueue kernel", "buffer lock poisoned"))
                }
                _ => Ok(None),
            })
            .collect::<Result<Vec<Option<RwLockReadGuard<'_, HostData>>>>>()?;

        let views: Vec<ArgView<'_>> = args
            .iter()
            .zip(&guards)
            .map(|(a, g)| match (a, g) {
                (HostArg::Int(v), _) => ArgView::Scalar(*v),
                (HostArg::Local(bytes), _) => ArgView::Local(*bytes),
                (HostArg::Buffer(_), Some(g)) => match &**g {
                    HostData::Int(v) => ArgView::Int(&v[..]),
                    HostData::Real(v) => ArgView::Real(&v[..]),
                },
                (HostArg::Buffer(_), None) => ArgView::Output,
            })
            .collect();

        let mut out_guard = output
            .write()
            .map_err(|_| SpmvError::dispatch("enqueue kernel", "buffer lock poisoned"))?;
        let y = match &mut *out_guard {
            HostData::Real(v) => &mut v[..],
            HostData::Int(_) => {
                return Err(SpmvError::dispatch(
                    "enqueue kernel",
                    "output buffer must hold doubles",
                ))
            }
        };

        debug!(
            "host launch `{}`: global {} local {} on {} threads",
            kernel.name,
            geometry.global,
            geometry.local,
            self.threads()
        );
        self.pool
            .install(|| emulation::run(kernel.kind, &views, y, geometry))?;
        Ok(HostEvent)
    }

    fn is_complete(&self, _event: &HostEvent) -> Result<bool> {
        Ok(true)
    }

    fn wait(&self, _event: &HostEvent) -> Result<()> {
        Ok(())
    }

    fn enqueue_read(&self, buffer: &HostBuffer, out: &mut [f64]) -> Result<()> {
        let guard = buffer
            .data
            .read()
            .map_err(|_| SpmvError::dispatch("read", "buffer lock poisoned"))?;
        match &*guard {
            HostData::Real(src) if src.len() >= out.len() => {
                out.copy_from_slice(&src[..out.len()]);
                Ok(())
            }
            HostData::Real(src) => Err(SpmvError::dispatch(
                "read",
                format!("{} elements from a buffer of {}", out.len(), src.len()),
            )),
            HostData::Int(_) => Err(SpmvError::dispatch("read", "element type mismatch")),
        }
    }
}
