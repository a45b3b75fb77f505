//! Work-item emulation of the five SpMV kernels on the host
//!
//! Each function reproduces what one NDRange launch of the matching OpenCL
//! kernel does, reading its arguments by position. Work-items past the
//! problem size do nothing, and every index is bounds-checked so a bad
//! binding is reported instead of panicking.

use rayon::prelude::*;

use crate::error::{Result, SpmvError};
use crate::launch::LaunchGeometry;

/// One bound argument, borrowed for the duration of a launch.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ArgView<'a> {
    Int(&'a [i32]),
    Real(&'a [f64]),
    Scalar(i32),
    Local(usize),
    /// The buffer the kernel writes; passed separately
    Output,
}

/// Kernels the host backend can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HostKernelKind {
    Coo,
    Csr,
    Ell,
    SlicedEll,
    Cmrs,
}

impl HostKernelKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "coo" => Some(HostKernelKind::Coo),
            "csr" => Some(HostKernelKind::Csr),
            "ell" => Some(HostKernelKind::Ell),
            "sliced_ell" => Some(HostKernelKind::SlicedEll),
            "cmrs" => Some(HostKernelKind::Cmrs),
            _ => None,
        }
    }

    /// Number of declared kernel parameters.
    pub fn arity(&self) -> usize {
        match self {
            HostKernelKind::Coo | HostKernelKind::Csr | HostKernelKind::Ell => 6,
            HostKernelKind::SlicedEll => 7,
            HostKernelKind::Cmrs => 9,
        }
    }

    /// Position of the `__global double *y` parameter.
    pub fn output_index(&self) -> usize {
        match self {
            HostKernelKind::Coo | HostKernelKind::Csr => 4,
            HostKernelKind::Ell | HostKernelKind::SlicedEll => 3,
            HostKernelKind::Cmrs => 5,
        }
    }
}

fn fault(message: String) -> SpmvError {
    SpmvError::dispatch("kernel", message)
}

fn ints<'a>(args: &[ArgView<'a>], i: usize) -> Result<&'a [i32]> {
    match args.get(i) {
        Some(ArgView::Int(v)) => Ok(*v),
        _ => Err(fault(format!("argument {i} is not an int buffer"))),
    }
}

fn reals<'a>(args: &[ArgView<'a>], i: usize) -> Result<&'a [f64]> {
    match args.get(i) {
        Some(ArgView::Real(v)) => Ok(*v),
        _ => Err(fault(format!("argument {i} is not a double buffer"))),
    }
}

fn scalar(args: &[ArgView<'_>], i: usize) -> Result<usize> {
    match args.get(i) {
        Some(ArgView::Scalar(v)) if *v >= 0 => Ok(*v as usize),
        Some(ArgView::Scalar(v)) => Err(fault(format!("argument {i} is negative ({v})"))),
        _ => Err(fault(format!("argument {i} is not an int scalar"))),
    }
}

fn local(args: &[ArgView<'_>], i: usize) -> Result<usize> {
    match args.get(i) {
        Some(ArgView::Local(bytes)) => Ok(*bytes),
        _ => Err(fault(format!("argument {i} is not local memory"))),
    }
}

fn load<T: Copy>(data: &[T], i: usize, what: &str) -> Result<T> {
    data.get(i)
        .copied()
        .ok_or_else(|| fault(format!("{what}[{i}] out of bounds (length {})", data.len())))
}

fn index(value: i32, what: &str) -> Result<usize> {
    usize::try_from(value).map_err(|_| fault(format!("negative {what} {value}")))
}

fn prefix<'y>(y: &'y mut [f64], n: usize) -> Result<&'y mut [f64]> {
    let len = y.len();
    y.get_mut(..n)
        .ok_or_else(|| fault(format!("kernel writes {n} outputs into a buffer of {len}")))
}

/// Runs one launch of `kind`. Must be called inside the backend's pool.
pub(crate) fn run(
    kind: HostKernelKind,
    args: &[ArgView<'_>],
    y: &mut [f64],
    geometry: LaunchGeometry,
) -> Result<()> {
    match kind {
        HostKernelKind::Coo => coo(args, y, geometry),
        HostKernelKind::Csr => csr(args, y, geometry),
        HostKernelKind::Ell => ell(args, y, geometry),
        HostKernelKind::SlicedEll => sliced_ell(args, y, geometry),
        HostKernelKind::Cmrs => cmrs(args, y, geometry),
    }
}

/// One work-item per nonzero, atomically adding into `y`.
fn coo(args: &[ArgView<'_>], y: &mut [f64], geometry: LaunchGeometry) -> Result<()> {
    let rows = ints(args, 0)?;
    let cols = ints(args, 1)?;
    let vals = reals(args, 2)?;
    let x = reals(args, 3)?;
    let nnz = scalar(args, 5)?;
    let items = geometry.global.min(nnz);

    // products in parallel, then the scatter that atomics serialize on a device
    let products = (0..items)
        .into_par_iter()
        .map(|i| -> Result<(usize, f64)> {
            let row = index(load(rows, i, "row_idx")?, "row")?;
            let col = index(load(cols, i, "col_idx")?, "column")?;
            Ok((row, load(vals, i, "values")? * load(x, col, "x")?))
        })
        .collect::<Result<Vec<_>>>()?;

    for (row, product) in products {
        let len = y.len();
        let slot = y
            .get_mut(row)
            .ok_or_else(|| fault(format!("y[{row}] out of bounds (length {len})")))?;
        *slot += product;
    }
    Ok(())
}

/// One work-item per row.
fn csr(args: &[ArgView<'_>], y: &mut [f64], geometry: LaunchGeometry) -> Result<()> {
    let row_ptr = ints(args, 0)?;
    let cols = ints(args, 1)?;
    let vals = reals(args, 2)?;
    let x = reals(args, 3)?;
    let rows = scalar(args, 5)?;

    prefix(y, geometry.global.min(rows))?
        .par_iter_mut()
        .enumerate()
        .try_for_each(|(r, out)| {
            let start = index(load(row_ptr, r, "row_ptr")?, "row offset")?;
            let end = index(load(row_ptr, r + 1, "row_ptr")?, "row offset")?;
            let mut sum = 0.0;
            for j in start..end {
                let col = index(load(cols, j, "col_idx")?, "column")?;
                sum += load(vals, j, "values")? * load(x, col, "x")?;
            }
            *out = sum;
            Ok(())
        })
}

/// One work-item per row, `width` slots each, sentinel slots skipped.
fn ell(args: &[ArgView<'_>], y: &mut [f64], geometry: LaunchGeometry) -> Result<()> {
    let vals = reals(args, 0)?;
    let cols = ints(args, 1)?;
    let x = reals(args, 2)?;
    let rows = scalar(args, 4)?;
    let width = scalar(args, 5)?;

    prefix(y, geometry.global.min(rows))?
        .par_iter_mut()
        .enumerate()
        .try_for_each(|(r, out)| {
            let mut sum = 0.0;
            for k in 0..width {
                let slot = r * width + k;
                let col = load(cols, slot, "col_idx")?;
                if col < 0 {
                    continue;
                }
                sum += load(vals, slot, "values")? * load(x, col as usize, "x")?;
            }
            *out = sum;
            Ok(())
        })
}

/// One work-item per padded row; lanes of a slice read with stride `h`.
fn sliced_ell(args: &[ArgView<'_>], y: &mut [f64], geometry: LaunchGeometry) -> Result<()> {
    let vals = reals(args, 0)?;
    let cols = ints(args, 1)?;
    let x = reals(args, 2)?;
    let offsets = ints(args, 4)?;
    let rows = scalar(args, 5)?;
    let h = scalar(args, 6)?;
    if h == 0 {
        return Err(fault("slice height is zero".to_string()));
    }

    prefix(y, geometry.global)?
        .par_iter_mut()
        .enumerate()
        .try_for_each(|(gid, out)| {
            if gid >= rows {
                *out = 0.0;
                return Ok(());
            }
            let slice = gid / h;
            let lane = gid % h;
            let base = index(load(offsets, slice, "slice_offset")?, "slice offset")?;
            let end = index(load(offsets, slice + 1, "slice_offset")?, "slice offset")?;
            let width = end.saturating_sub(base) / h;

            let mut sum = 0.0;
            for k in 0..width {
                let slot = base + k * h + lane;
                let col = load(cols, slot, "col_idx")?;
                if col < 0 {
                    continue;
                }
                sum += load(vals, slot, "values")? * load(x, col as usize, "x")?;
            }
            *out = sum;
            Ok(())
        })
}

/// One work-item per strip, accumulating its `h` rows in local scratch.
fn cmrs(args: &[ArgView<'_>], y: &mut [f64], geometry: LaunchGeometry) -> Result<()> {
    let vals = reals(args, 0)?;
    let cols = ints(args, 1)?;
    let strip_ptr = ints(args, 2)?;
    let row_in_strip = ints(args, 3)?;
    let x = reals(args, 4)?;
    let num_strips = scalar(args, 6)?;
    let h = scalar(args, 7)?;
    let scratch = local(args, 8)?;
    if h == 0 {
        return Err(fault("strip height is zero".to_string()));
    }

    let needed = geometry.local * h * std::mem::size_of::<f64>();
    if scratch < needed {
        return Err(fault(format!(
            "local scratch of {scratch} bytes is smaller than the {needed} bytes a work-group uses"
        )));
    }

    let strips = geometry.global.min(num_strips);
    prefix(y, strips * h)?
        .par_chunks_mut(h)
        .enumerate()
        .try_for_each(|(s, out)| {
            let start = index(load(strip_ptr, s, "strip_ptr")?, "strip offset")?;
            let end = index(load(strip_ptr, s + 1, "strip_ptr")?, "strip offset")?;

            let mut acc = vec![0.0; h];
            for i in start..end {
                let slot = index(load(row_in_strip, i, "row_in_strip")?, "row slot")?;
                let col = index(load(cols, i, "col_idx")?, "column")?;
                let value = load(vals, i, "values")? * load(x, col, "x")?;
                let cell = acc
                    .get_mut(slot)
                    .ok_or_else(|| fault(format!("row slot {slot} exceeds strip height {h}")))?;
                *cell += value;
            }
            out.copy_from_slice(&acc);
            Ok(())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(global: usize, local: usize) -> LaunchGeometry {
        LaunchGeometry { global, local }
    }

    #[test]
    fn test_csr_rows() {
        let row_ptr = [0, 2, 3, 5];
        let cols = [0, 2, 1, 0, 2];
        let vals = [4.0, 1.0, 2.0, 3.0, 5.0];
        let x = [1.0, 1.0, 1.0];
        let args = [
            ArgView::Int(&row_ptr),
            ArgView::Int(&cols),
            ArgView::Real(&vals),
            ArgView::Real(&x),
            ArgView::Output,
            ArgView::Scalar(3),
        ];
        let mut y = vec![0.0; 3];
        run(HostKernelKind::Csr, &args, &mut y, geometry(64, 64)).unwrap();
        assert_eq!(y, vec![5.0, 2.0, 8.0]);
    }

    #[test]
    fn test_short_global_leaves_rows_untouched() {
        let vals = [1.0, 1.0];
        let cols = [0, 0];
        let x = [2.0];
        let args = [
            ArgView::Real(&vals),
            ArgView::Int(&cols),
            ArgView::Real(&x),
            ArgView::Output,
            ArgView::Scalar(2),
            ArgView::Scalar(1),
        ];
        let mut y = vec![-1.0; 2];
        run(HostKernelKind::Ell, &args, &mut y, geometry(1, 1)).unwrap();
        assert_eq!(y, vec![2.0, -1.0]);
    }

    #[test]
    fn test_bad_binding_is_reported() {
        let cols = [0];
        let args = [
            ArgView::Int(&cols),
            ArgView::Int(&cols),
            ArgView::Output,
            ArgView::Output,
            ArgView::Scalar(1),
            ArgView::Scalar(1),
        ];
        let mut y = vec![0.0; 1];
        let err = run(HostKernelKind::Ell, &args, &mut y, geometry(1, 1)).unwrap_err();
        assert!(err.to_string().contains("argument 0 is not a double buffer"));
    }

    #[test]
    fn test_cmrs_scratch_check() {
        let empty_i: [i32; 0] = [];
        let empty_f: [f64; 0] = [];
        let strip_ptr = [0, 0];
        let args = [
            ArgView::Real(&empty_f),
            ArgView::Int(&empty_i),
            ArgView::Int(&strip_ptr),
            ArgView::Int(&empty_i),
            ArgView::Real(&empty_f),
            ArgView::Output,
            ArgView::Scalar(1),
            ArgView::Scalar(4),
            ArgView::Local(8),
        ];
        let mut y = vec![0.0; 4];
        let err = run(HostKernelKind::Cmrs, &args, &mut y, geometry(2, 2)).unwrap_err();
        assert!(err.to_string().contains("local scratch"));
    }
}
