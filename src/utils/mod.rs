//! Utility functions and helpers

pub mod formats;

use crate::error::{FormatError, Result, SpmvError};

pub use formats::{sprs_spmv, to_sprs_csr};

/// Computes an exclusive prefix sum (scan) for a vector
pub fn exclusive_scan(input: &[usize]) -> Vec<usize> {
    let mut result = Vec::with_capacity(input.len() + 1);
    let mut sum = 0;

    result.push(0); // First element is always 0

    for &val in input {
        sum += val;
        result.push(sum);
    }

    result
}

/// Allocates a vector of `len` copies of `value`, reporting exhaustion
/// as [`SpmvError::Allocation`] instead of aborting.
pub fn try_filled<T: Clone>(what: &'static str, len: usize, value: T) -> Result<Vec<T>> {
    let mut v = try_with_capacity(what, len)?;
    v.resize(len, value);
    Ok(v)
}

/// Reserves exactly `len` slots.
pub fn try_with_capacity<T>(what: &'static str, len: usize) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| SpmvError::Allocation { what, elements: len })?;
    Ok(v)
}

/// Narrows a host index to the device's `cl_int`.
pub fn to_device_index(what: &'static str, value: usize) -> std::result::Result<i32, FormatError> {
    i32::try_from(value).map_err(|_| FormatError::TooLarge { what, value })
}

/// Rounds `n` up to a multiple of `multiple`, never returning zero.
pub fn round_up(n: usize, multiple: usize) -> usize {
    n.max(1).div_ceil(multiple) * multiple
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusive_scan() {
        let input = vec![1, 2, 3, 4];
        let expected = vec![0, 1, 3, 6, 10];
        assert_eq!(exclusive_scan(&input), expected);

        let input = vec![0, 0, 5, 0];
        let expected = vec![0, 0, 0, 5, 5];
        assert_eq!(exclusive_scan(&input), expected);
    }

    #[test]
    fn test_round_up() {
        assert_eq!(round_up(0, 64), 64);
        assert_eq!(round_up(64, 64), 64);
        assert_eq!(round_up(65, 64), 128);
        assert_eq!(round_up(3, 1), 3);
    }

    #[test]
    fn test_to_device_index() {
        assert_eq!(to_device_index("rows", 7), Ok(7));
        assert!(matches!(
            to_device_index("rows", usize::MAX),
            Err(FormatError::TooLarge { what: "rows", .. })
        ));
    }

    #[test]
    fn test_try_filled() {
        let v = try_filled("cols", 4, -1i32).unwrap();
        assert_eq!(v, vec![-1; 4]);
        assert!(matches!(
            try_filled::<u64>("vals", usize::MAX, 0),
            Err(SpmvError::Allocation { what: "vals", .. })
        ));
    }
}
