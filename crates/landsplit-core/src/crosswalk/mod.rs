//! Category crosswalks between two classification schemes.
//!
//! A crosswalk is an ordered list of (internal, external) label pairs. Read in
//! one direction, a label with a single target is renamed, several labels
//! sharing a target are merged (summed), and a label with several targets is
//! split using weights supplied by the caller.

pub mod scheme;

use serde::{Deserialize, Serialize};

use crate::error::{DisaggError, Result};
use crate::field::QuantityField;

pub use scheme::LandScheme;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrosswalkRow {
    pub internal: String,
    pub external: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ToExternal,
    ToInternal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crosswalk {
    pub internal_scheme: String,
    pub external_scheme: String,
    pub rows: Vec<CrosswalkRow>,
}

/// Time-varying blend between two targets: `to` receives a weight rising
/// linearly from 0 at `start` to 1 at `end`, `from` the remainder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fader {
    pub from: String,
    pub to: String,
    pub start: i32,
    pub end: i32,
}

impl Fader {
    pub fn weight(&self, time: i32) -> f64 {
        if time <= self.start {
            0.0
        } else if time >= self.end {
            1.0
        } else {
            (time - self.start) as f64 / (self.end - self.start) as f64
        }
    }
}

/// Numeric weights for split rows.
#[derive(Debug, Clone, Copy)]
pub enum SplitWeights<'a> {
    /// Side layer whose categories are the split targets. A layer with a
    /// single time step is broadcast over all times; negative values count
    /// as zero.
    Layer(&'a QuantityField),
    Fader(&'a Fader),
}

impl SplitWeights<'_> {
    fn weights(&self, targets: &[&str], unit: &str, time: i32) -> Result<Vec<f64>> {
        let raw = match self {
            SplitWeights::Layer(layer) => {
                let u = layer
                    .unit_axis()
                    .position(unit)
                    .ok_or_else(|| DisaggError::UnknownUnit(unit.to_string()))?;
                let t = match layer.time_axis().position(&time) {
                    Some(t) => t,
                    None if layer.times().len() == 1 => 0,
                    None => {
                        return Err(DisaggError::AxisMismatch(format!(
                            "split layer has no time {time}"
                        )))
                    }
                };
                targets
                    .iter()
                    .map(|&label| {
                        layer
                            .category_axis()
                            .position(label)
                            .map(|c| layer.at(u, c, t))
                            .ok_or_else(|| DisaggError::UnknownCategory(label.to_string()))
                    })
                    .collect::<Result<Vec<f64>>>()?
            }
            SplitWeights::Fader(fader) => {
                let w = fader.weight(time);
                targets
                    .iter()
                    .map(|&label| {
                        if label == fader.to {
                            Ok(w)
                        } else if label == fader.from {
                            Ok(1.0 - w)
                        } else {
                            Err(DisaggError::UnknownCategory(label.to_string()))
                        }
                    })
                    .collect::<Result<Vec<f64>>>()?
            }
        };
        if raw.iter().any(|w| !w.is_finite()) {
            return Err(DisaggError::NonFiniteValue {
                field: "split weights".to_string(),
                unit: unit.to_string(),
            });
        }
        let raw: Vec<f64> = raw.into_iter().map(|w| w.max(0.0)).collect();
        let sum: f64 = raw.iter().sum();
        if sum > 0.0 {
            Ok(raw.into_iter().map(|w| w / sum).collect())
        } else {
            Ok(vec![1.0 / targets.len() as f64; targets.len()])
        }
    }
}

impl Crosswalk {
    pub fn new(
        internal_scheme: impl Into<String>,
        external_scheme: impl Into<String>,
        pairs: &[(&str, &str)],
    ) -> Self {
        Self {
            internal_scheme: internal_scheme.into(),
            external_scheme: external_scheme.into(),
            rows: pairs
                .iter()
                .map(|&(i, e)| CrosswalkRow { internal: i.to_string(), external: e.to_string() })
                .collect(),
        }
    }

    /// Distinct targets of `label`, in row order.
    pub fn targets(&self, label: &str, direction: Direction) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for r in &self.rows {
            let (src, dst) = match direction {
                Direction::ToExternal => (&r.internal, &r.external),
                Direction::ToInternal => (&r.external, &r.internal),
            };
            if src == label && !out.contains(&dst.as_str()) {
                out.push(dst);
            }
        }
        out
    }

    /// True if any label is split in `direction`.
    pub fn has_splits(&self, direction: Direction) -> bool {
        let mut labels: Vec<&str> = self
            .rows
            .iter()
            .map(|r| match direction {
                Direction::ToExternal => r.internal.as_str(),
                Direction::ToInternal => r.external.as_str(),
            })
            .collect();
        labels.sort_unstable();
        labels.dedup();
        labels.iter().any(|l| self.targets(l, direction).len() > 1)
    }

    /// Fails with the first label that has no row in `direction`.
    pub fn ensure_covers<'a>(
        &self,
        labels: impl IntoIterator<Item = &'a str>,
        direction: Direction,
    ) -> Result<()> {
        for l in labels {
            if self.targets(l, direction).is_empty() {
                return Err(DisaggError::UnknownCategory(l.to_string()));
            }
        }
        Ok(())
    }

    /// Rename and merge. Any split row is an error here; use [`apply_with`].
    ///
    /// [`apply_with`]: Crosswalk::apply_with
    pub fn apply(&self, field: &QuantityField, direction: Direction) -> Result<QuantityField> {
        self.apply_with(field, direction, None)
    }

    /// Remap the category axis of `field`. Output categories follow the
    /// first-appearance order of targets; unit and time axes are unchanged.
    pub fn apply_with(
        &self,
        field: &QuantityField,
        direction: Direction,
        weights: Option<SplitWeights<'_>>,
    ) -> Result<QuantityField> {
        let per_source: Vec<Vec<&str>> = field
            .categories()
            .iter()
            .map(|c| {
                let t = self.targets(c, direction);
                if t.is_empty() {
                    Err(DisaggError::UnknownCategory(c.clone()))
                } else if t.len() > 1 && weights.is_none() {
                    Err(DisaggError::MissingSplitWeights(c.clone()))
                } else {
                    Ok(t)
                }
            })
            .collect::<Result<_>>()?;

        let mut out_labels: Vec<String> = Vec::new();
        for targets in &per_source {
            for t in targets {
                if !out_labels.iter().any(|l| l == t) {
                    out_labels.push(t.to_string());
                }
            }
        }

        let mut out = QuantityField::zeros(
            field.units().to_vec(),
            out_labels,
            field.times().to_vec(),
            field.physical_unit(),
        )?;
        let target_pos: Vec<Vec<usize>> = per_source
            .iter()
            .map(|ts| {
                ts.iter()
                    .filter_map(|t| out.category_axis().position(*t))
                    .collect()
            })
            .collect();

        for (u, unit) in field.units().iter().enumerate() {
            for (t, &time) in field.times().iter().enumerate() {
                for (c, targets) in per_source.iter().enumerate() {
                    let v = field.at(u, c, t);
                    let pos = &target_pos[c];
                    if targets.len() == 1 {
                        let acc = out.at(u, pos[0], t);
                        out.set_at(u, pos[0], t, acc + v);
                        continue;
                    }
                    // Checked above: split rows always have weights here.
                    let Some(w) = weights else { continue };
                    let shares = w.weights(targets, unit, time)?;
                    for (&p, s) in pos.iter().zip(shares) {
                        let acc = out.at(u, p, t);
                        out.set_at(u, p, t, acc + v * s);
                    }
                }
            }
        }

        let source = match direction {
            Direction::ToExternal => self.internal_scheme.as_str(),
            Direction::ToInternal => self.external_scheme.as_str(),
        };
        tracing::debug!(source, categories = out.categories().len(), "applied crosswalk");
        Ok(out)
    }
}
