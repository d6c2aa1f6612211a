//! Error Metrics
//!
//! `error_metric` is the symmetric q-error used for cardinality benchmarks.
//! `relative_error` is the `|est - real| / real` figure written into
//! aggregate result records.

use serde::{Serialize, Serializer};

/// Sentinel written in place of a relative error whose denominator is zero
pub const UNDEFINED_RELATIVE_ERROR: &str = "result=0!";

/// Symmetric ratio error between an estimate and the true answer.
///
/// Always `>= 1` for positive inputs and exactly `1` iff the estimate is
/// exact. When one side is zero the other side is returned; both zero is 1.
pub fn error_metric(estimated: f64, actual: f64) -> f64 {
    if actual == 0.0 && estimated != 0.0 {
        return estimated;
    }
    if actual != 0.0 && estimated == 0.0 {
        return actual;
    }
    if actual == 0.0 && estimated == 0.0 {
        return 1.0;
    }
    (estimated / actual).max(actual / estimated)
}

/// A relative error that may be undefined
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RelativeError {
    /// `|est - real| / real`
    Value(f64),
    /// Real value was zero or missing
    Undefined,
}

impl RelativeError {
    /// Numeric value, if defined
    pub fn value(&self) -> Option<f64> {
        match self {
            RelativeError::Value(v) => Some(*v),
            RelativeError::Undefined => None,
        }
    }
}

impl Serialize for RelativeError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RelativeError::Value(v) => serializer.serialize_f64(*v),
            RelativeError::Undefined => serializer.serialize_str(UNDEFINED_RELATIVE_ERROR),
        }
    }
}

/// `|est - real| / real`, undefined when `real` is zero or either side is missing.
pub fn relative_error(estimated: Option<f64>, real: Option<f64>) -> RelativeError {
    match (estimated, real) {
        (Some(est), Some(real)) if real != 0.0 && est.is_finite() && real.is_finite() => {
            RelativeError::Value((est - real).abs() / real)
        }
        _ => RelativeError::Undefined,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_degenerate_cases() {
        assert_eq!(error_metric(0.0, 0.0), 1.0);
        assert_eq!(error_metric(5.0, 0.0), 5.0);
        assert_eq!(error_metric(0.0, 5.0), 5.0);
        assert_eq!(error_metric(10.0, 5.0), 2.0);
    }

    #[test]
    fn test_symmetry_and_identity() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..1000 {
            let a: f64 = if rng.gen_bool(0.1) { 0.0 } else { rng.gen_range(0.0..1e6) };
            let b: f64 = if rng.gen_bool(0.1) { 0.0 } else { rng.gen_range(0.0..1e6) };
            assert_eq!(error_metric(a, b), error_metric(b, a));
            assert!(error_metric(a, b) >= 0.0);
            if a > 0.0 {
                assert_eq!(error_metric(a, a), 1.0);
            }
            if a > 0.0 && b > 0.0 {
                assert!(error_metric(a, b) >= 1.0);
            }
        }
    }

    #[test]
    fn test_relative_error() {
        assert_eq!(relative_error(Some(12.0), Some(10.0)).value(), Some(0.2));
        assert_eq!(relative_error(Some(1.0), Some(0.0)), RelativeError::Undefined);
        assert_eq!(relative_error(None, Some(3.0)), RelativeError::Undefined);
    }
}
