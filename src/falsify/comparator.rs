//! Prediction/observation comparators.

use crate::error::ComparisonError;
use crate::value::Value;

/// Decides whether an observation agrees with a prediction.
///
/// Implementations receive a tolerance that has already been checked to be
/// finite and non-negative.
pub trait Comparator: Send + Sync {
    /// Short name recorded in logs.
    fn name(&self) -> &'static str;

    /// Returns whether `observed` is within `tolerance` of `predicted`.
    fn agrees(&self, predicted: &Value, observed: &Value, tolerance: f64) -> Result<bool, ComparisonError>;
}

/// Rejects negative or non-finite tolerances.
pub fn check_tolerance(tolerance: f64) -> Result<(), ComparisonError> {
    if tolerance.is_finite() && tolerance >= 0.0 {
        Ok(())
    } else {
        Err(ComparisonError::InvalidTolerance { value: tolerance })
    }
}

/// Numeric pair, or `None` when both sides are the same non-numeric type and
/// must be compared exactly.
fn numeric_pair(predicted: &Value, observed: &Value) -> Result<Option<(f64, f64)>, ComparisonError> {
    match (predicted.as_number(), observed.as_number()) {
        (Some(p), Some(o)) => Ok(Some((p, o))),
        _ if predicted.type_name() == observed.type_name() => Ok(None),
        _ => Err(ComparisonError::IncomparableValues {
            reason: format!("{} prediction against {} observation", predicted.type_name(), observed.type_name()),
        }),
    }
}

/// `|predicted - observed| <= tolerance`.
#[derive(Debug, Default, Clone, Copy)]
pub struct AbsoluteTolerance;

impl Comparator for AbsoluteTolerance {
    fn name(&self) -> &'static str {
        "absolute"
    }

    fn agrees(&self, predicted: &Value, observed: &Value, tolerance: f64) -> Result<bool, ComparisonError> {
        Ok(match numeric_pair(predicted, observed)? {
            Some((p, o)) => (p - o).abs() <= tolerance,
            None => predicted == observed,
        })
    }
}

/// `|predicted - observed| <= tolerance * max(|predicted|, |observed|)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RelativeTolerance;

impl Comparator for RelativeTolerance {
    fn name(&self) -> &'static str {
        "relative"
    }

    fn agrees(&self, predicted: &Value, observed: &Value, tolerance: f64) -> Result<bool, ComparisonError> {
        Ok(match numeric_pair(predicted, observed)? {
            Some((p, o)) => (p - o).abs() <= tolerance * p.abs().max(o.abs()),
            None => predicted == observed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_tolerance_is_inclusive() {
        let c = AbsoluteTolerance;
        assert!(c.agrees(&Value::from(1.0), &Value::from(1.5), 0.5).unwrap());
        assert!(!c.agrees(&Value::from(1.0), &Value::from(1.6), 0.5).unwrap());
        assert!(c.agrees(&Value::from(3_i64), &Value::from(3.0), 0.0).unwrap());
    }

    #[test]
    fn relative_tolerance_scales() {
        let c = RelativeTolerance;
        assert!(c.agrees(&Value::from(100.0), &Value::from(104.0), 0.05).unwrap());
        assert!(!c.agrees(&Value::from(1.0), &Value::from(1.2), 0.05).unwrap());
        assert!(c.agrees(&Value::from(0.0), &Value::from(0.0), 0.0).unwrap());
    }

    #[test]
    fn non_numeric_values_compare_exactly() {
        let c = AbsoluteTolerance;
        assert!(c.agrees(&Value::from("up"), &Value::from("up"), 10.0).unwrap());
        assert!(!c.agrees(&Value::from("up"), &Value::from("down"), 10.0).unwrap());
        assert!(matches!(
            c.agrees(&Value::from("up"), &Value::from(1.0), 0.0),
            Err(ComparisonError::IncomparableValues { .. })
        ));
    }

    #[test]
    fn tolerance_validation() {
        assert!(check_tolerance(0.0).is_ok());
        assert!(check_tolerance(-0.1).is_err());
        assert!(check_tolerance(f64::INFINITY).is_err());
        assert!(check_tolerance(f64::NAN).is_err());
    }
}
