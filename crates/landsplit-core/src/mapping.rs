//! Cluster → cell membership.
//!
//! Every grid cell belongs to exactly one cluster and every cluster owns at
//! least one cell. Weights are non-negative; with unit weights the mapping is
//! a pure membership relation, otherwise weights are area-proportional.

use serde::{Deserialize, Serialize};

use crate::error::{DisaggError, Result};
use crate::field::{Axis, PhysicalUnit, QuantityField};

fn unit_weight() -> f64 {
    1.0
}

/// One (cluster, cell, weight) membership entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingRow {
    pub cluster: String,
    pub cell: String,
    #[serde(default = "unit_weight")]
    pub weight: f64,
}

impl MappingRow {
    pub fn new(cluster: impl Into<String>, cell: impl Into<String>, weight: f64) -> Self {
        Self { cluster: cluster.into(), cell: cell.into(), weight }
    }
}

/// How fine values are combined into their cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationMode {
    /// Σ value × weight.
    Sum,
    /// Σ value × normalized weight, with weights normalized over every member
    /// cell of the cluster. A cluster whose weights are all zero averages
    /// uniformly.
    WeightedMean,
}

/// Immutable cluster → {(cell, weight)} partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "Vec<MappingRow>", into = "Vec<MappingRow>")]
pub struct SpatialMapping {
    clusters: Axis<String>,
    cells: Axis<String>,
    /// Cell position → owning cluster position.
    owner: Vec<usize>,
    /// Cell position → weight.
    weights: Vec<f64>,
    /// Cluster position → member cell positions.
    members: Vec<Vec<usize>>,
}

impl TryFrom<Vec<MappingRow>> for SpatialMapping {
    type Error = DisaggError;

    fn try_from(rows: Vec<MappingRow>) -> Result<Self> {
        SpatialMapping::from_rows(rows)
    }
}

impl From<SpatialMapping> for Vec<MappingRow> {
    fn from(m: SpatialMapping) -> Self {
        m.rows().collect()
    }
}

impl SpatialMapping {
    /// Build from rows; clusters are ordered by first appearance.
    pub fn from_rows(rows: impl IntoIterator<Item = MappingRow>) -> Result<Self> {
        let rows: Vec<MappingRow> = rows.into_iter().collect();
        let mut clusters: Vec<String> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for r in &rows {
            if seen.insert(r.cluster.as_str()) {
                clusters.push(r.cluster.clone());
            }
        }
        Self::with_clusters(clusters, rows)
    }

    /// Build from an explicit cluster list; a listed cluster without any
    /// member cell is an error.
    pub fn with_clusters(
        clusters: Vec<String>,
        rows: impl IntoIterator<Item = MappingRow>,
    ) -> Result<Self> {
        let clusters = Axis::new(clusters)
            .map_err(|e| DisaggError::InvalidMapping(format!("cluster list: {e}")))?;
        let mut cell_labels = Vec::new();
        let mut owner = Vec::new();
        let mut weights = Vec::new();
        let mut members = vec![Vec::new(); clusters.len()];
        let mut cell_owner: std::collections::HashMap<String, String> = Default::default();

        for row in rows {
            let k = clusters.position(row.cluster.as_str()).ok_or_else(|| {
                DisaggError::InvalidMapping(format!(
                    "cell '{}' assigned to undeclared cluster '{}'",
                    row.cell, row.cluster
                ))
            })?;
            if !row.weight.is_finite() || row.weight < 0.0 {
                return Err(DisaggError::InvalidMapping(format!(
                    "cell '{}' has invalid weight {}",
                    row.cell, row.weight
                )));
            }
            if let Some(prev) = cell_owner.insert(row.cell.clone(), row.cluster.clone()) {
                return Err(DisaggError::InvalidMapping(format!(
                    "cell '{}' assigned to both '{prev}' and '{}'",
                    row.cell, row.cluster
                )));
            }
            members[k].push(cell_labels.len());
            cell_labels.push(row.cell);
            owner.push(k);
            weights.push(row.weight);
        }

        if let Some(k) = members.iter().position(|m| m.is_empty()) {
            return Err(DisaggError::InvalidMapping(format!(
                "cluster '{}' has no member cells",
                clusters.labels()[k]
            )));
        }

        let cells = Axis::new(cell_labels)
            .map_err(|e| DisaggError::InvalidMapping(e.to_string()))?;
        Ok(Self { clusters, cells, owner, weights, members })
    }

    pub fn clusters(&self) -> &[String] {
        self.clusters.labels()
    }

    pub fn cells(&self) -> &[String] {
        self.cells.labels()
    }

    pub fn n_clusters(&self) -> usize {
        self.clusters.len()
    }

    pub fn n_cells(&self) -> usize {
        self.cells.len()
    }

    /// Cluster owning `cell`.
    pub fn cluster_of(&self, cell: &str) -> Option<&str> {
        let i = self.cells.position(cell)?;
        Some(self.clusters.labels()[self.owner[i]].as_str())
    }

    pub fn weight(&self, cell: &str) -> Option<f64> {
        self.cells.position(cell).map(|i| self.weights[i])
    }

    /// Member cells of `cluster` with their weights.
    pub fn members<'a>(&'a self, cluster: &str) -> impl Iterator<Item = (&'a str, f64)> + 'a {
        let idx = self.clusters.position(cluster);
        idx.into_iter()
            .flat_map(move |k| self.members[k].iter())
            .map(move |&i| (self.cells.labels()[i].as_str(), self.weights[i]))
    }

    pub fn rows(&self) -> impl Iterator<Item = MappingRow> + '_ {
        self.cells.labels().iter().enumerate().map(move |(i, cell)| {
            MappingRow::new(self.clusters.labels()[self.owner[i]].clone(), cell.clone(), self.weights[i])
        })
    }

    /// Copy with weights rescaled to sum to 1 within each cluster. A cluster
    /// whose weights are all zero gets uniform weights.
    pub fn normalized(&self) -> SpatialMapping {
        let mut weights = self.weights.clone();
        for cells in &self.members {
            let sum: f64 = cells.iter().map(|&i| self.weights[i]).sum();
            for &i in cells {
                weights[i] = if sum > 0.0 {
                    self.weights[i] / sum
                } else {
                    1.0 / cells.len() as f64
                };
            }
        }
        SpatialMapping { weights, ..self.clone() }
    }

    /// Area-weighted aggregation of a fine field to cluster resolution.
    ///
    /// Every unit of `fine` must be a mapped cell. The result covers all
    /// clusters of the mapping, in mapping order.
    pub fn aggregate(&self, fine: &QuantityField, mode: AggregationMode) -> Result<QuantityField> {
        let normalized;
        let weights: &[f64] = match mode {
            AggregationMode::Sum => &self.weights,
            AggregationMode::WeightedMean => {
                normalized = self.normalized();
                &normalized.weights
            }
        };

        let (nc, nt) = (fine.categories().len(), fine.times().len());
        let mut acc = vec![0.0; self.n_clusters() * nc * nt];

        for (u, cell) in fine.units().iter().enumerate() {
            let i = self
                .cells
                .position(cell.as_str())
                .ok_or_else(|| DisaggError::UnknownUnit(cell.clone()))?;
            let k = self.owner[i];
            let w = weights[i];
            for c in 0..nc {
                for t in 0..nt {
                    acc[(k * nc + c) * nt + t] += fine.at(u, c, t) * w;
                }
            }
        }

        let unit = match (mode, fine.physical_unit()) {
            (AggregationMode::Sum, PhysicalUnit::MhaPerCell) => PhysicalUnit::Mha,
            (_, u) => u,
        };
        QuantityField::from_data(
            self.clusters().to_vec(),
            fine.categories().to_vec(),
            fine.times().to_vec(),
            unit,
            acc,
        )
    }
}
