//! Named-axis quantity fields.
//!
//! A [`QuantityField`] stores one real value per (spatial unit, category, time)
//! triple. Values live in a dense row-major buffer ordered
//! `[unit][category][time]`, but every lookup from outside goes through the
//! axis labels so that two fields are never combined by position alone.

use std::collections::HashMap;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::error::{DisaggError, Result};

/// Physical unit annotation carried by every field and written with outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhysicalUnit {
    /// Mha per coarse unit.
    Mha,
    /// Mha per grid cell.
    #[default]
    MhaPerCell,
    /// Share of a per-unit total, 0–1.
    Fraction,
    /// Dimensionless indicator.
    Unitless,
}

impl PhysicalUnit {
    /// Label used by the persistence layer.
    pub fn label(self) -> &'static str {
        match self {
            PhysicalUnit::Mha => "Mha",
            PhysicalUnit::MhaPerCell => "Mha per grid cell",
            PhysicalUnit::Fraction => "fraction",
            PhysicalUnit::Unitless => "unitless",
        }
    }
}

// ── Axis ──────────────────────────────────────────────────────────────────────

/// Ordered set of unique labels with O(1) name → position lookup.
#[derive(Debug, Clone)]
pub struct Axis<K> {
    labels: Vec<K>,
    index: HashMap<K, usize>,
}

impl<K: Clone + Eq + Hash + std::fmt::Display> Axis<K> {
    /// Build an axis, rejecting duplicate labels.
    pub fn new(labels: Vec<K>) -> Result<Self> {
        let mut index = HashMap::with_capacity(labels.len());
        for (i, l) in labels.iter().enumerate() {
            if index.insert(l.clone(), i).is_some() {
                return Err(DisaggError::DuplicateCategory(l.to_string()));
            }
        }
        Ok(Self { labels, index })
    }

    #[inline]
    pub fn position<Q>(&self, label: &Q) -> Option<usize>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.get(label).copied()
    }

    pub fn contains<Q>(&self, label: &Q) -> bool
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.contains_key(label)
    }

    #[inline]
    pub fn labels(&self) -> &[K] {
        &self.labels
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl<K: PartialEq> PartialEq for Axis<K> {
    fn eq(&self, other: &Self) -> bool {
        self.labels == other.labels
    }
}

// ── QuantityField ─────────────────────────────────────────────────────────────

/// A (unit × category × time) tensor of non-negative reals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FieldRepr", into = "FieldRepr")]
pub struct QuantityField {
    units: Axis<String>,
    categories: Axis<String>,
    times: Axis<i32>,
    data: Vec<f64>,
    unit: PhysicalUnit,
}

/// Wire form: axis label lists plus the flat `[unit][category][time]` buffer.
#[derive(Serialize, Deserialize)]
struct FieldRepr {
    units: Vec<String>,
    categories: Vec<String>,
    times: Vec<i32>,
    #[serde(default)]
    unit: PhysicalUnit,
    data: Vec<f64>,
}

impl TryFrom<FieldRepr> for QuantityField {
    type Error = DisaggError;

    fn try_from(r: FieldRepr) -> Result<Self> {
        QuantityField::from_data(r.units, r.categories, r.times, r.unit, r.data)
    }
}

impl From<QuantityField> for FieldRepr {
    fn from(f: QuantityField) -> Self {
        FieldRepr {
            units: f.units.labels,
            categories: f.categories.labels,
            times: f.times.labels,
            unit: f.unit,
            data: f.data,
        }
    }
}

impl QuantityField {
    /// Create a zero-filled field.
    pub fn zeros(
        units: Vec<String>,
        categories: Vec<String>,
        times: Vec<i32>,
        unit: PhysicalUnit,
    ) -> Result<Self> {
        let n = units.len() * categories.len() * times.len();
        Self::from_data(units, categories, times, unit, vec![0.0; n])
    }

    /// Create a field from a flat `[unit][category][time]` buffer.
    pub fn from_data(
        units: Vec<String>,
        categories: Vec<String>,
        times: Vec<i32>,
        unit: PhysicalUnit,
        data: Vec<f64>,
    ) -> Result<Self> {
        let units = Axis::new(units)
            .map_err(|e| DisaggError::AxisMismatch(format!("unit axis: {e}")))?;
        let categories = Axis::new(categories)?;
        let times = Axis::new(times)
            .map_err(|e| DisaggError::AxisMismatch(format!("time axis: {e}")))?;
        let expected = units.len() * categories.len() * times.len();
        if data.len() != expected {
            return Err(DisaggError::AxisMismatch(format!(
                "data has {} values, axes require {expected}",
                data.len()
            )));
        }
        Ok(Self { units, categories, times, data, unit })
    }

    /// Create a field by evaluating `f(unit, category, time)` for every entry.
    pub fn from_fn(
        units: Vec<String>,
        categories: Vec<String>,
        times: Vec<i32>,
        unit: PhysicalUnit,
        mut f: impl FnMut(&str, &str, i32) -> f64,
    ) -> Result<Self> {
        let mut data = Vec::with_capacity(units.len() * categories.len() * times.len());
        for u in &units {
            for c in &categories {
                for &t in &times {
                    data.push(f(u, c, t));
                }
            }
        }
        Self::from_data(units, categories, times, unit, data)
    }

    // ── Axes ────────────────────────────────────────────────────────────────

    pub fn units(&self) -> &[String] {
        self.units.labels()
    }

    pub fn categories(&self) -> &[String] {
        self.categories.labels()
    }

    pub fn times(&self) -> &[i32] {
        self.times.labels()
    }

    pub fn unit_axis(&self) -> &Axis<String> {
        &self.units
    }

    pub fn category_axis(&self) -> &Axis<String> {
        &self.categories
    }

    pub fn time_axis(&self) -> &Axis<i32> {
        &self.times
    }

    pub fn physical_unit(&self) -> PhysicalUnit {
        self.unit
    }

    pub fn with_physical_unit(mut self, unit: PhysicalUnit) -> Self {
        self.unit = unit;
        self
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn has_category(&self, label: &str) -> bool {
        self.categories.contains(label)
    }

    // ── Positional access (only with positions taken from this field) ──────

    #[inline]
    fn offset(&self, u: usize, c: usize, t: usize) -> usize {
        (u * self.categories.len() + c) * self.times.len() + t
    }

    #[inline]
    pub fn at(&self, u: usize, c: usize, t: usize) -> f64 {
        self.data[self.offset(u, c, t)]
    }

    #[inline]
    pub fn set_at(&mut self, u: usize, c: usize, t: usize, val: f64) {
        let i = self.offset(u, c, t);
        self.data[i] = val;
    }

    // ── Named access ───────────────────────────────────────────────────────

    /// Value at `(unit, category, time)`, `None` if any label is unknown.
    pub fn get(&self, unit: &str, category: &str, time: i32) -> Option<f64> {
        let u = self.units.position(unit)?;
        let c = self.categories.position(category)?;
        let t = self.times.position(&time)?;
        Some(self.at(u, c, t))
    }

    pub fn set(&mut self, unit: &str, category: &str, time: i32, val: f64) -> Result<()> {
        let u = self
            .units
            .position(unit)
            .ok_or_else(|| DisaggError::UnknownUnit(unit.to_string()))?;
        let c = self
            .categories
            .position(category)
            .ok_or_else(|| DisaggError::UnknownCategory(category.to_string()))?;
        let t = self
            .times
            .position(&time)
            .ok_or_else(|| DisaggError::AxisMismatch(format!("unknown time {time}")))?;
        self.set_at(u, c, t, val);
        Ok(())
    }

    // ── Derived fields ─────────────────────────────────────────────────────

    /// Copy of a single category as a one-category field.
    pub fn category(&self, label: &str) -> Result<QuantityField> {
        let c = self
            .categories
            .position(label)
            .ok_or_else(|| DisaggError::UnknownCategory(label.to_string()))?;
        let nt = self.times.len();
        let mut data = Vec::with_capacity(self.units.len() * nt);
        for u in 0..self.units.len() {
            let start = self.offset(u, c, 0);
            data.extend_from_slice(&self.data[start..start + nt]);
        }
        QuantityField::from_data(
            self.units().to_vec(),
            vec![label.to_string()],
            self.times().to_vec(),
            self.unit,
            data,
        )
    }

    /// Per unit/time sum across categories, as a one-category field `label`.
    pub fn category_sum(&self, label: &str) -> QuantityField {
        let (nu, nc, nt) = (self.units.len(), self.categories.len(), self.times.len());
        let mut data = vec![0.0; nu * nt];
        for u in 0..nu {
            for c in 0..nc {
                for t in 0..nt {
                    data[u * nt + t] += self.at(u, c, t);
                }
            }
        }
        QuantityField {
            units: self.units.clone(),
            categories: Axis { labels: vec![label.to_string()], index: HashMap::from([(label.to_string(), 0)]) },
            times: self.times.clone(),
            data,
            unit: self.unit,
        }
    }

    /// Sum over every entry.
    pub fn total(&self) -> f64 {
        self.data.iter().sum()
    }

    /// Share variant: each value divided by its unit/time cross-category sum.
    /// A zero sum yields zero shares.
    pub fn row_normalized(&self) -> QuantityField {
        let sums = self.category_sum("total");
        let nt = self.times.len();
        let mut out = self.clone().with_physical_unit(PhysicalUnit::Fraction);
        for u in 0..self.units.len() {
            for c in 0..self.categories.len() {
                for t in 0..nt {
                    let s = sums.data[u * nt + t];
                    let v = if s > 0.0 { self.at(u, c, t) / s } else { 0.0 };
                    out.set_at(u, c, t, v);
                }
            }
        }
        out
    }

    /// Clip negative values to zero, returning how many were clipped.
    pub fn clip_negative(&mut self) -> usize {
        let mut n = 0;
        for v in &mut self.data {
            if *v < 0.0 {
                *v = 0.0;
                n += 1;
            }
        }
        n
    }

    /// Reject NaN and infinite values.
    pub fn ensure_finite(&self, name: &str) -> Result<()> {
        let per_unit = self.categories.len() * self.times.len();
        match self.data.iter().position(|v| !v.is_finite()) {
            None => Ok(()),
            Some(i) => Err(DisaggError::NonFiniteValue {
                field: name.to_string(),
                unit: self.units()[i / per_unit.max(1)].clone(),
            }),
        }
    }

    /// Fails unless `other` has the same unit and time axes (labels and order).
    pub fn ensure_aligned(&self, other: &QuantityField, what: &str) -> Result<()> {
        if self.units != other.units {
            return Err(DisaggError::AxisMismatch(format!("{what}: unit axes differ")));
        }
        if self.times != other.times {
            return Err(DisaggError::AxisMismatch(format!("{what}: time axes differ")));
        }
        Ok(())
    }
}
