use serde::{Deserialize, Serialize};

use crate::crosswalk::LandScheme;
use crate::disaggregate::{ConservationPolicy, DEFAULT_EPSILON};
use crate::error::{DisaggError, Result};

/// Run-wide settings, read once before any pass starts.
/// Every field has a default, so `{}` is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisaggConfig {
    /// Share denominator guard.
    pub epsilon: f64,
    pub conservation: ConservationPolicy,
    /// Pasture classification variant.
    pub scheme: LandScheme,
    /// Run split passes on the rayon pool (needs the `threading` feature).
    pub parallel: bool,
}

impl Default for DisaggConfig {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
            conservation: ConservationPolicy::default(),
            scheme: LandScheme::default(),
            parallel: false,
        }
    }
}

impl DisaggConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(DisaggError::Configuration(format!(
                "epsilon must be positive, got {}",
                self.epsilon
            )));
        }
        let tol = self.conservation.tolerance;
        if !(tol.is_finite() && tol >= 0.0) {
            return Err(DisaggError::Configuration(format!(
                "conservation tolerance must be non-negative, got {tol}"
            )));
        }
        Ok(())
    }
}
