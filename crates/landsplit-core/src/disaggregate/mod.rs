//! Proportional share disaggregation.
//!
//! Splits a fine-resolution parent total into sub-categories using the
//! sub-category shares observed at cluster resolution:
//!   coarse shares → piecewise-constant projection onto cells → scale by the
//!   fine parent total.

pub mod conservation;

use crate::error::{DisaggError, Result};
use crate::field::{PhysicalUnit, QuantityField};
use crate::mapping::SpatialMapping;

pub use conservation::{check_conservation, ConservationPolicy, ConservationReport, ViolationAction};

/// Guard added to share denominators so empty clusters yield zero, not NaN.
pub const DEFAULT_EPSILON: f64 = 1e-10;

#[derive(Debug, Clone, Copy)]
pub struct ShareDisaggregator {
    pub epsilon: f64,
}

impl Default for ShareDisaggregator {
    fn default() -> Self {
        Self { epsilon: DEFAULT_EPSILON }
    }
}

impl ShareDisaggregator {
    pub fn new(epsilon: f64) -> Self {
        Self { epsilon }
    }

    /// `share[c] = value[c] / (Σ value + ε)` per coarse unit and time.
    pub fn coarse_shares(&self, children_coarse: &QuantityField) -> QuantityField {
        let totals = children_coarse.category_sum("total");
        let nt = children_coarse.times().len();
        let mut shares = children_coarse.clone().with_physical_unit(PhysicalUnit::Fraction);
        for u in 0..children_coarse.units().len() {
            for c in 0..children_coarse.categories().len() {
                for t in 0..nt {
                    let denom = totals.at(u, 0, t) + self.epsilon;
                    shares.set_at(u, c, t, children_coarse.at(u, c, t) / denom);
                }
            }
        }
        shares
    }

    /// Give every cell in `cells` the share vector of its owning cluster.
    pub fn project_shares(
        &self,
        shares: &QuantityField,
        mapping: &SpatialMapping,
        cells: &[String],
    ) -> Result<QuantityField> {
        let (nc, nt) = (shares.categories().len(), shares.times().len());
        let mut data = Vec::with_capacity(cells.len() * nc * nt);
        for cell in cells {
            let cluster = mapping
                .cluster_of(cell)
                .ok_or_else(|| DisaggError::UnknownUnit(cell.clone()))?;
            let k = shares
                .unit_axis()
                .position(cluster)
                .ok_or_else(|| DisaggError::UnknownUnit(cluster.to_string()))?;
            for c in 0..nc {
                for t in 0..nt {
                    data.push(shares.at(k, c, t));
                }
            }
        }
        QuantityField::from_data(
            cells.to_vec(),
            shares.categories().to_vec(),
            shares.times().to_vec(),
            PhysicalUnit::Fraction,
            data,
        )
    }

    /// Split `parent_fine_total` into the sub-categories of `children_coarse`.
    ///
    /// `parent_fine_total` must hold exactly one category and share its time
    /// axis with `children_coarse`. The result has the parent's unit axis and
    /// physical unit and the children's category axis.
    pub fn disaggregate(
        &self,
        parent_fine_total: &QuantityField,
        children_coarse: &QuantityField,
        mapping: &SpatialMapping,
    ) -> Result<QuantityField> {
        if parent_fine_total.categories().len() != 1 {
            return Err(DisaggError::AxisMismatch(format!(
                "parent total must have one category, found {}",
                parent_fine_total.categories().len()
            )));
        }
        if parent_fine_total.times() != children_coarse.times() {
            return Err(DisaggError::AxisMismatch(
                "parent and children time axes differ".to_string(),
            ));
        }

        let shares = self.coarse_shares(children_coarse);
        let mut out = self.project_shares(&shares, mapping, parent_fine_total.units())?;

        let (nc, nt) = (out.categories().len(), out.times().len());
        for u in 0..out.units().len() {
            for t in 0..nt {
                let parent = parent_fine_total.at(u, 0, t);
                for c in 0..nc {
                    let v = out.at(u, c, t) * parent;
                    out.set_at(u, c, t, v);
                }
            }
        }

        tracing::debug!(
            parent = %parent_fine_total.categories()[0],
            children = nc,
            cells = out.units().len(),
            "disaggregated parent into children"
        );
        Ok(out.with_physical_unit(parent_fine_total.physical_unit()))
    }
}
