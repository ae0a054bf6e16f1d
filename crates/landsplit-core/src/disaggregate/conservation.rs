//! Global conservation check for a disaggregated decomposition.

use serde::{Deserialize, Serialize};

use crate::error::{DisaggError, Result};
use crate::field::QuantityField;

/// Default residual tolerance, in the physical unit of the input areas.
pub const DEFAULT_TOLERANCE: f64 = 0.1;

/// What to do when the residual exceeds the tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationAction {
    /// Log a warning and keep the computed values.
    #[default]
    Warn,
    /// Fail the pass.
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConservationPolicy {
    pub tolerance: f64,
    pub on_violation: ViolationAction,
}

impl Default for ConservationPolicy {
    fn default() -> Self {
        Self { tolerance: DEFAULT_TOLERANCE, on_violation: ViolationAction::Warn }
    }
}

/// Outcome of one check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConservationReport {
    pub ok: bool,
    /// `|Σ children − Σ parent|` over all units and times.
    pub residual: f64,
    pub tolerance: f64,
}

/// Compare the grand totals of `children_fine` and `parent_fine_total`.
pub fn check_conservation(
    children_fine: &QuantityField,
    parent_fine_total: &QuantityField,
    tolerance: f64,
) -> ConservationReport {
    let residual = (children_fine.total() - parent_fine_total.total()).abs();
    ConservationReport { ok: residual <= tolerance, residual, tolerance }
}

impl ConservationPolicy {
    /// Run the check and apply the policy. Under `Warn` a violation is logged
    /// and returned in the report; under `Abort` it becomes an error.
    pub fn enforce(
        &self,
        pass: &str,
        children_fine: &QuantityField,
        parent_fine_total: &QuantityField,
    ) -> Result<ConservationReport> {
        let report = check_conservation(children_fine, parent_fine_total, self.tolerance);
        if report.ok {
            return Ok(report);
        }
        match self.on_violation {
            ViolationAction::Warn => {
                tracing::warn!(
                    pass,
                    residual = report.residual,
                    tolerance = self.tolerance,
                    "large difference in disaggregation detected"
                );
                Ok(report)
            }
            ViolationAction::Abort => Err(DisaggError::ConservationViolation {
                residual: report.residual,
                tolerance: self.tolerance,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{tests::labels, PhysicalUnit};

    fn field(cats: &[&str], data: Vec<f64>) -> QuantityField {
        QuantityField::from_data(labels(&["f1", "f2"]), labels(cats), vec![2020], PhysicalUnit::MhaPerCell, data)
            .unwrap()
    }

    #[test]
    fn residual_is_global_not_per_cell() {
        // Per-cell errors of +1 and −1 cancel globally.
        let children = field(&["a", "b"], vec![2.0, 1.0, 0.5, 0.5]);
        let parent = field(&["crop"], vec![2.0, 2.0]);
        let r = check_conservation(&children, &parent, 0.1);
        assert!(r.ok);
        assert_eq!(r.residual, 0.0);
    }

    #[test]
    fn violation_detected_above_tolerance() {
        let children = field(&["a"], vec![1.0, 1.0]);
        let parent = field(&["crop"], vec![1.0, 1.2]);
        let r = check_conservation(&children, &parent, 0.1);
        assert!(!r.ok);
        assert!((r.residual - 0.2).abs() < 1e-12);
    }

    #[test]
    fn warn_policy_keeps_going() {
        let children = field(&["a"], vec![0.0, 0.0]);
        let parent = field(&["crop"], vec![1.0, 1.0]);
        let r = ConservationPolicy::default().enforce("crop", &children, &parent).unwrap();
        assert!(!r.ok);
        assert_eq!(r.residual, 2.0);
    }

    #[test]
    fn abort_policy_fails() {
        let children = field(&["a"], vec![0.0, 0.0]);
        let parent = field(&["crop"], vec![1.0, 1.0]);
        let policy = ConservationPolicy { tolerance: 0.5, on_violation: ViolationAction::Abort };
        let err = policy.enforce("crop", &children, &parent).unwrap_err();
        assert_eq!(err, DisaggError::ConservationViolation { residual: 2.0, tolerance: 0.5 });
    }

    #[test]
    fn policy_deserializes_with_defaults() {
        let p: ConservationPolicy = serde_json::from_str(r#"{"on_violation":"abort"}"#).unwrap();
        assert_eq!(p.tolerance, DEFAULT_TOLERANCE);
        assert_eq!(p.on_violation, ViolationAction::Abort);
    }
}
