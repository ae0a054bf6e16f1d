//! Error types for disaggregation passes.

use serde::Serialize;
use thiserror::Error;

/// Fatal errors. Each one stops the pass that raised it, never the whole run.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DisaggError {
    /// A category label has no entry where one is required.
    #[error("unknown category '{0}'")]
    UnknownCategory(String),

    /// A category label would appear twice on one category axis.
    #[error("duplicate category '{0}'")]
    DuplicateCategory(String),

    /// A category present in a weighted field has no coefficient.
    #[error("missing coefficient for category '{0}'")]
    MissingCoefficient(String),

    /// A spatial unit id is not known to the mapping or the field.
    #[error("unknown spatial unit '{0}'")]
    UnknownUnit(String),

    /// Two fields that must share an axis do not.
    #[error("axis mismatch: {0}")]
    AxisMismatch(String),

    /// The cluster → cell relation violates the partition invariant.
    #[error("invalid spatial mapping: {0}")]
    InvalidMapping(String),

    /// A crosswalk row splits a label but no split weights were supplied.
    #[error("category '{0}' maps to several targets but no split weights were given")]
    MissingSplitWeights(String),

    /// NaN or infinite input value.
    #[error("non-finite value in '{field}' at unit '{unit}'")]
    NonFiniteValue { field: String, unit: String },

    /// Conservation residual above tolerance under the abort policy.
    #[error("conservation violated: residual {residual:.6} exceeds tolerance {tolerance}")]
    ConservationViolation { residual: f64, tolerance: f64 },

    /// A required optional input is absent.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Result type for disaggregation operations.
pub type Result<T> = std::result::Result<T, DisaggError>;
