//! Format selection and packing parameters

use std::fmt;
use std::str::FromStr;

use crate::error::SpmvError;

/// Default slice/strip height, matching a 16-lane work-group.
pub const DEFAULT_HEIGHT: usize = 16;

/// Default work-group size for one-work-item-per-row kernels.
pub const DEFAULT_WORK_GROUP_SIZE: usize = 64;

/// The storage encodings a triple stream can be packed into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// Coordinate list, one work-item per nonzero
    Coo,
    /// Compressed sparse row, one work-item per row
    Csr,
    /// Fixed-width padded rows, one work-item per row
    Ell,
    /// Per-slice width, column-major inside each slice, one work-group per slice
    SlicedEll,
    /// Strip-compacted rows with an explicit in-strip row index
    Cmrs,
}

impl Format {
    pub const ALL: [Format; 5] = [
        Format::Coo,
        Format::Csr,
        Format::Ell,
        Format::SlicedEll,
        Format::Cmrs,
    ];

    /// Entry point name inside the kernel source.
    pub fn kernel_name(&self) -> &'static str {
        match self {
            Format::Coo => "coo",
            Format::Csr => "csr",
            Format::Ell => "ell",
            Format::SlicedEll => "sliced_ell",
            Format::Cmrs => "cmrs",
        }
    }

    /// File name of the kernel source inside a kernel directory.
    pub fn kernel_file(&self) -> &'static str {
        match self {
            Format::Coo => "coo.cl",
            Format::Csr => "csr.cl",
            Format::Ell => "ell.cl",
            Format::SlicedEll => "sliced_ell.cl",
            Format::Cmrs => "cmrs.cl",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Format::Coo => "COO",
            Format::Csr => "CSR",
            Format::Ell => "ELL",
            Format::SlicedEll => "Sliced-ELL",
            Format::Cmrs => "CMRS",
        };
        f.write_str(name)
    }
}

impl FromStr for Format {
    type Err = SpmvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "coo" => Ok(Format::Coo),
            "csr" => Ok(Format::Csr),
            "ell" => Ok(Format::Ell),
            "sliced-ell" | "sliced_ell" | "sigma" | "sell" => Ok(Format::SlicedEll),
            "cmrs" => Ok(Format::Cmrs),
            other => Err(SpmvError::InvalidParameter(format!("unknown format `{other}`"))),
        }
    }
}

/// Format-specific packing constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatParams {
    /// Slice height for Sliced-ELL, strip height for CMRS
    pub height: usize,
    /// Work-group size for kernels that run one work-item per row, strip or nonzero
    pub work_group_size: usize,
}

impl Default for FormatParams {
    fn default() -> Self {
        Self {
            height: DEFAULT_HEIGHT,
            work_group_size: DEFAULT_WORK_GROUP_SIZE,
        }
    }
}

impl FormatParams {
    pub fn with_height(height: usize) -> Self {
        Self {
            height,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), SpmvError> {
        if self.height == 0 {
            return Err(SpmvError::InvalidParameter(
                "slice/strip height must be at least 1".to_string(),
            ));
        }
        if self.work_group_size == 0 {
            return Err(SpmvError::InvalidParameter(
                "work-group size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Sliced-ELL launches work-groups of `height`, every other format of
    /// `work_group_size`; both must fit the device.
    pub fn check_work_group_limit(&self, max_work_group_size: usize) -> Result<(), SpmvError> {
        for (what, size) in [("height", self.height), ("work-group size", self.work_group_size)] {
            if size > max_work_group_size {
                return Err(SpmvError::InvalidParameter(format!(
                    "{what} {size} exceeds the device work-group limit of {max_work_group_size}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_format() {
        assert_eq!("CSR".parse::<Format>().unwrap(), Format::Csr);
        assert_eq!("sigma".parse::<Format>().unwrap(), Format::SlicedEll);
        assert!("hyb".parse::<Format>().is_err());
    }

    #[test]
    fn test_kernel_names_are_distinct() {
        let mut names: Vec<_> = Format::ALL.iter().map(|f| f.kernel_name()).collect();
        names.dedup();
        assert_eq!(names.len(), 5);
    }

    #[test]
    fn test_validate() {
        assert!(FormatParams::default().validate().is_ok());
        assert!(FormatParams::with_height(0).validate().is_err());
    }

    #[test]
    fn test_work_group_limit() {
        assert!(FormatParams::default().check_work_group_limit(1024).is_ok());
        assert!(FormatParams::with_height(2048)
            .check_work_group_limit(1024)
            .is_err());
        let params = FormatParams {
            height: 16,
            work_group_size: 256,
        };
        assert!(params.check_work_group_limit(128).is_err());
    }
}
