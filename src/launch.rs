//! Launch plans: what a packed matrix hands to the execution harness.
//!
//! A plan lists the kernel arguments in the positional order the kernel
//! declares them, together with the output size and the work geometry. The
//! harness stages and binds exactly what the plan says and never chooses
//! geometry itself.

use crate::matrix::config::Format;

/// Device element types used by the kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    /// `cl_int`: indices, offsets and the `-1` sentinel
    Int,
    /// `cl_double`: values, vectors and outputs
    Real,
}

impl ElementKind {
    pub fn size_bytes(&self) -> usize {
        match self {
            ElementKind::Int => std::mem::size_of::<i32>(),
            ElementKind::Real => std::mem::size_of::<f64>(),
        }
    }
}

/// Borrowed host data ready for upload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeviceSlice<'a> {
    Int(&'a [i32]),
    Real(&'a [f64]),
}

impl DeviceSlice<'_> {
    pub fn len(&self) -> usize {
        match self {
            DeviceSlice::Int(s) => s.len(),
            DeviceSlice::Real(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> ElementKind {
        match self {
            DeviceSlice::Int(_) => ElementKind::Int,
            DeviceSlice::Real(_) => ElementKind::Real,
        }
    }
}

/// One positional kernel argument.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanArg<'a> {
    /// A packed array, uploaded read-only.
    Input {
        name: &'static str,
        data: DeviceSlice<'a>,
    },
    /// The dense input vector supplied at run time.
    Vector,
    /// The output vector.
    Output,
    /// A by-value `int` argument.
    Int(i32),
    /// Work-group local scratch memory.
    LocalScratch { bytes: usize },
}

/// How the output buffer must look before the kernel runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputInit {
    /// Every element is written by the kernel.
    Overwritten,
    /// The kernel accumulates into it, so it is zero-filled first.
    Zeroed,
}

/// One-dimensional NDRange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchGeometry {
    pub global: usize,
    pub local: usize,
}

impl LaunchGeometry {
    pub fn num_groups(&self) -> usize {
        self.global / self.local
    }
}

/// Everything the harness needs to run one packed matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelPlan<'a> {
    pub format: Format,
    pub kernel: &'static str,
    pub args: Vec<PlanArg<'a>>,
    /// Device-side output length; may exceed `rows` for padded formats.
    pub output_len: usize,
    pub output_init: OutputInit,
    pub geometry: LaunchGeometry,
    pub rows: usize,
    pub cols: usize,
    pub nnz: usize,
}

impl KernelPlan<'_> {
    /// Total bytes of packed input arrays.
    pub fn input_bytes(&self) -> usize {
        self.args
            .iter()
            .map(|arg| match arg {
                PlanArg::Input { data, .. } => data.len() * data.kind().size_bytes(),
                _ => 0,
            })
            .sum()
    }
}
