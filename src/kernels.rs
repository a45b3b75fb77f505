//! OpenCL C sources of the SpMV kernels, one per format

use std::fs;
use std::path::Path;

use log::debug;

use crate::error::{Result, SpmvError};
use crate::matrix::Format;

/// Kernel source text for every format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelSources {
    coo: String,
    csr: String,
    ell: String,
    sliced_ell: String,
    cmrs: String,
}

impl KernelSources {
    /// The kernels shipped in `kernels/`, compiled into the binary.
    pub fn embedded() -> Self {
        Self {
            coo: include_str!("../kernels/coo.cl").to_string(),
            csr: include_str!("../kernels/csr.cl").to_string(),
            ell: include_str!("../kernels/ell.cl").to_string(),
            sliced_ell: include_str!("../kernels/sliced_ell.cl").to_string(),
            cmrs: include_str!("../kernels/cmrs.cl").to_string(),
        }
    }

    /// Reads `<format>.cl` for every format from `dir`.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let read = |format: Format| -> Result<String> {
            let path = dir.join(format.kernel_file());
            debug!("reading kernel source {}", path.display());
            fs::read_to_string(&path).map_err(|source| SpmvError::Io { path, source })
        };

        Ok(Self {
            coo: read(Format::Coo)?,
            csr: read(Format::Csr)?,
            ell: read(Format::Ell)?,
            sliced_ell: read(Format::SlicedEll)?,
            cmrs: read(Format::Cmrs)?,
        })
    }

    pub fn source(&self, format: Format) -> &str {
        match format {
            Format::Coo => &self.coo,
            Format::Csr => &self.csr,
            Format::Ell => &self.ell,
            Format::SlicedEll => &self.sliced_ell,
            Format::Cmrs => &self.cmrs,
        }
    }

    /// Replaces the source of one format.
    pub fn with_source(mut self, format: Format, source: impl Into<String>) -> Self {
        let source = source.into();
        match format {
            Format::Coo => self.coo = source,
            Format::Csr => self.csr = source,
            Format::Ell => self.ell = source,
            Format::SlicedEll => self.sliced_ell = source,
            Format::Cmrs => self.cmrs = source,
        }
        self
    }
}

impl Default for KernelSources {
    fn default() -> Self {
        Self::embedded()
    }
}
