//! Element-wise comparison of a kernel result against the reference

use std::fmt;

use log::warn;

/// Default absolute tolerance
pub const DEFAULT_EPSILON: f64 = 1e-7;

/// Outcome of a comparison. A mismatch is a reported result, not an error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verification {
    Passed,
    Mismatch {
        index: usize,
        expected: f64,
        actual: f64,
    },
    /// The vectors differ in length.
    LengthMismatch { expected: usize, actual: usize },
}

impl Verification {
    pub fn is_ok(&self) -> bool {
        matches!(self, Verification::Passed)
    }
}

impl fmt::Display for Verification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verification::Passed => write!(f, "result is ok"),
            Verification::Mismatch {
                index,
                expected,
                actual,
            } => write!(
                f,
                "result is wrong: y[{index}] = {actual}, expected {expected}"
            ),
            Verification::LengthMismatch { expected, actual } => write!(
                f,
                "result is wrong: {actual} values, expected {expected}"
            ),
        }
    }
}

/// Checks candidates against a reference vector within a tolerance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResultVerifier {
    pub epsilon: f64,
}

impl Default for ResultVerifier {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
        }
    }
}

impl ResultVerifier {
    pub fn new(epsilon: f64) -> Self {
        Self { epsilon }
    }

    /// Stops at the first index where `|reference - candidate| > epsilon`.
    /// A NaN on either side is a mismatch.
    pub fn check(&self, reference: &[f64], candidate: &[f64]) -> Verification {
        if reference.len() != candidate.len() {
            warn!(
                "length mismatch: {} values, expected {}",
                candidate.len(),
                reference.len()
            );
            return Verification::LengthMismatch {
                expected: reference.len(),
                actual: candidate.len(),
            };
        }

        for (index, (&expected, &actual)) in reference.iter().zip(candidate).enumerate() {
            // negated so NaN fails
            if !((expected - actual).abs() <= self.epsilon) {
                warn!("mismatch at {index}: {actual} != {expected}");
                return Verification::Mismatch {
                    index,
                    expected,
                    actual,
                };
            }
        }
        Verification::Passed
    }
}
