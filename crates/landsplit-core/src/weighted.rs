//! Category-weighted aggregation into a per-cell indicator.
//!
//! Used for biodiversity-intactness style indicators: a land composition is
//! weighted by a per-category intactness coefficient and summed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{DisaggError, Result};
use crate::field::{PhysicalUnit, QuantityField};

/// Category name of the aggregated output.
pub const INDICATOR: &str = "indicator";

const COEFFICIENTS: &str = "coefficients";

/// Per-category weights, either constant or varying per cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CoefficientField {
    Uniform { coefficients: BTreeMap<String, f64> },
    /// Coefficients per unit (and time). A single-time field applies to all
    /// times.
    Spatial { field: QuantityField },
}

impl CoefficientField {
    pub fn uniform(pairs: &[(&str, f64)]) -> Self {
        CoefficientField::Uniform {
            coefficients: pairs.iter().map(|&(c, v)| (c.to_string(), v)).collect(),
        }
    }

    /// Reject NaN and infinite coefficients.
    pub fn ensure_finite(&self) -> Result<()> {
        match self {
            CoefficientField::Uniform { coefficients } => {
                match coefficients.iter().find(|(_, v)| !v.is_finite()) {
                    Some((c, v)) => Err(DisaggError::Configuration(format!(
                        "coefficient for '{c}' is {v}"
                    ))),
                    None => Ok(()),
                }
            }
            CoefficientField::Spatial { field } => field.ensure_finite(COEFFICIENTS),
        }
    }
}

/// Resolves coefficients for one field against the coefficient source.
enum Lookup<'a> {
    Const(Vec<f64>),
    Spatial {
        field: &'a QuantityField,
        /// Field category position → coefficient category position.
        cats: Vec<usize>,
        /// Field time position → coefficient time position.
        times: Vec<usize>,
    },
}

impl<'a> Lookup<'a> {
    fn build(coefficients: &'a CoefficientField, field: &QuantityField) -> Result<Self> {
        match coefficients {
            CoefficientField::Uniform { coefficients } => field
                .categories()
                .iter()
                .map(|c| {
                    coefficients
                        .get(c)
                        .copied()
                        .ok_or_else(|| DisaggError::MissingCoefficient(c.clone()))
                })
                .collect::<Result<Vec<f64>>>()
                .map(Lookup::Const),
            CoefficientField::Spatial { field: coef } => {
                let cats = field
                    .categories()
                    .iter()
                    .map(|c| {
                        coef.category_axis()
                            .position(c.as_str())
                            .ok_or_else(|| DisaggError::MissingCoefficient(c.clone()))
                    })
                    .collect::<Result<Vec<usize>>>()?;
                let times = field
                    .times()
                    .iter()
                    .map(|t| match coef.time_axis().position(t) {
                        Some(p) => Ok(p),
                        None if coef.times().len() == 1 => Ok(0),
                        None => Err(DisaggError::AxisMismatch(format!(
                            "coefficients have no time {t}"
                        ))),
                    })
                    .collect::<Result<Vec<usize>>>()?;
                Ok(Lookup::Spatial { field: coef, cats, times })
            }
        }
    }

    /// `coef_unit` is a position in the coefficient field; `c` and `t` are
    /// positions in the input field.
    #[inline]
    fn get(&self, coef_unit: usize, c: usize, t: usize) -> f64 {
        match self {
            Lookup::Const(v) => v[c],
            Lookup::Spatial { field, cats, times } => field.at(coef_unit, cats[c], times[t]),
        }
    }
}

/// `Σ_fields Σ_category value × coefficient` per unit and time.
///
/// All fields must share unit and time axes. The output is a one-category
/// field named [`INDICATOR`].
pub fn aggregate(fields: &[&QuantityField], coefficients: &CoefficientField) -> Result<QuantityField> {
    let first = fields
        .first()
        .ok_or_else(|| DisaggError::AxisMismatch("no fields to aggregate".to_string()))?;
    for f in &fields[1..] {
        first.ensure_aligned(f, "weighted aggregation")?;
    }
    coefficients.ensure_finite()?;
    let lookups = fields
        .iter()
        .map(|f| Lookup::build(coefficients, f))
        .collect::<Result<Vec<_>>>()?;

    let coef_units: Vec<usize> = match coefficients {
        CoefficientField::Uniform { .. } => vec![0; first.units().len()],
        CoefficientField::Spatial { field } => first
            .units()
            .iter()
            .map(|u| {
                field
                    .unit_axis()
                    .position(u.as_str())
                    .ok_or_else(|| DisaggError::UnknownUnit(u.clone()))
            })
            .collect::<Result<_>>()?,
    };

    let nt = first.times().len();
    let mut data = vec![0.0; first.units().len() * nt];
    for (f, lookup) in fields.iter().zip(&lookups) {
        for (u, &cu) in coef_units.iter().enumerate() {
            for c in 0..f.categories().len() {
                for t in 0..nt {
                    data[u * nt + t] += f.at(u, c, t) * lookup.get(cu, c, t);
                }
            }
        }
    }

    QuantityField::from_data(
        first.units().to_vec(),
        vec![INDICATOR.to_string()],
        first.times().to_vec(),
        PhysicalUnit::Unitless,
        data,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::tests::labels;
    use approx::assert_relative_eq;

    fn composition() -> QuantityField {
        QuantityField::from_data(
            labels(&["f1", "f2"]),
            labels(&["forest", "other"]),
            vec![2020],
            PhysicalUnit::Fraction,
            vec![0.6, 0.4, 0.1, 0.9],
        )
        .unwrap()
    }

    #[test]
    fn forest_other_example() {
        let coef = CoefficientField::uniform(&[("forest", 0.9), ("other", 0.5)]);
        let out = aggregate(&[&composition()], &coef).unwrap();
        assert_relative_eq!(out.get("f1", INDICATOR, 2020).unwrap(), 0.74, epsilon = 1e-12);
        assert_relative_eq!(out.get("f2", INDICATOR, 2020).unwrap(), 0.54, epsilon = 1e-12);
        assert_eq!(out.physical_unit(), PhysicalUnit::Unitless);
    }

    #[test]
    fn missing_coefficient_fails() {
        let coef = CoefficientField::uniform(&[("forest", 0.9)]);
        assert_eq!(
            aggregate(&[&composition()], &coef).unwrap_err(),
            DisaggError::MissingCoefficient("other".into())
        );
    }

    fn scaled(coef: &CoefficientField, k: f64) -> CoefficientField {
        match coef {
            CoefficientField::Uniform { coefficients } => CoefficientField::Uniform {
                coefficients: coefficients.iter().map(|(c, v)| (c.clone(), v * k)).collect(),
            },
            CoefficientField::Spatial { field } => CoefficientField::Spatial {
                field: QuantityField::from_fn(
                    field.units().to_vec(),
                    field.categories().to_vec(),
                    field.times().to_vec(),
                    field.physical_unit(),
                    |u, c, t| field.get(u, c, t).unwrap() * k,
                )
                .unwrap(),
            },
        }
    }

    fn spatial_coefficients() -> CoefficientField {
        let field = QuantityField::from_data(
            labels(&["f2", "f1"]),
            labels(&["forest", "other"]),
            vec![2000],
            PhysicalUnit::Unitless,
            vec![0.9, 0.8, 0.9, 0.4],
        )
        .unwrap();
        CoefficientField::Spatial { field }
    }

    fn assert_scales_linearly(coef: &CoefficientField, k: f64) {
        let base = aggregate(&[&composition()], coef).unwrap();
        let scaled_out = aggregate(&[&composition()], &scaled(coef, k)).unwrap();
        for (a, b) in base.data().iter().zip(scaled_out.data()) {
            assert_relative_eq!(*b, k * a, epsilon = 1e-12);
        }
    }

    #[test]
    fn linear_in_coefficients() {
        assert_scales_linearly(&CoefficientField::uniform(&[("forest", 0.9), ("other", 0.5)]), 3.0);
    }

    #[test]
    fn linear_in_spatial_coefficients() {
        assert_scales_linearly(&spatial_coefficients(), 3.0);
        assert_scales_linearly(&spatial_coefficients(), 0.25);
    }

    #[test]
    fn non_finite_coefficients_rejected() {
        let uniform = CoefficientField::uniform(&[("forest", f64::INFINITY), ("other", 0.5)]);
        assert!(matches!(
            aggregate(&[&composition()], &uniform).unwrap_err(),
            DisaggError::Configuration(_)
        ));

        let CoefficientField::Spatial { mut field } = spatial_coefficients() else { unreachable!() };
        field.set("f1", "other", 2000, f64::NAN).unwrap();
        assert_eq!(
            aggregate(&[&composition()], &CoefficientField::Spatial { field }).unwrap_err(),
            DisaggError::NonFiniteValue { field: "coefficients".into(), unit: "f1".into() }
        );
    }

    #[test]
    fn sums_across_several_fields() {
        let crops = QuantityField::from_data(
            labels(&["f1", "f2"]),
            labels(&["maiz"]),
            vec![2020],
            PhysicalUnit::Fraction,
            vec![0.2, 0.0],
        )
        .unwrap();
        let coef = CoefficientField::uniform(&[("forest", 1.0), ("other", 0.5), ("maiz", 0.25)]);
        let out = aggregate(&[&composition(), &crops], &coef).unwrap();
        assert_relative_eq!(out.get("f1", INDICATOR, 2020).unwrap(), 0.6 + 0.2 + 0.05, epsilon = 1e-12);
    }

    #[test]
    fn spatial_coefficients_split_other_land() {
        // "other" is more intact where it is forested: per-cell coefficient.
        let coef = QuantityField::from_data(
            labels(&["f2", "f1"]),
            labels(&["forest", "other"]),
            vec![2000],
            PhysicalUnit::Unitless,
            vec![0.9, 0.8, 0.9, 0.4],
        )
        .unwrap();
        let out = aggregate(&[&composition()], &CoefficientField::Spatial { field: coef }).unwrap();
        assert_relative_eq!(out.get("f1", INDICATOR, 2020).unwrap(), 0.6 * 0.9 + 0.4 * 0.4, epsilon = 1e-12);
        assert_relative_eq!(out.get("f2", INDICATOR, 2020).unwrap(), 0.1 * 0.9 + 0.9 * 0.8, epsilon = 1e-12);
    }

    #[test]
    fn misaligned_fields_rejected() {
        let other = QuantityField::zeros(labels(&["f1"]), labels(&["maiz"]), vec![2020], PhysicalUnit::Fraction).unwrap();
        let coef = CoefficientField::uniform(&[("forest", 1.0), ("other", 0.5), ("maiz", 0.25)]);
        assert!(matches!(
            aggregate(&[&composition(), &other], &coef).unwrap_err(),
            DisaggError::AxisMismatch(_)
        ));
        assert!(aggregate(&[], &coef).is_err());
    }

    #[test]
    fn coefficients_deserialize_tagged() {
        let c: CoefficientField =
            serde_json::from_str(r#"{"kind":"uniform","coefficients":{"forest":0.9}}"#).unwrap();
        assert_eq!(c, CoefficientField::uniform(&[("forest", 0.9)]));
    }
}
