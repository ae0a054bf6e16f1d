//! Pipeline orchestrator: runs every disaggregation pass over one scenario.
//!
//! Pipeline order:
//!   1. Input checks and negative-value correction
//!   2. Scheme harmonisation (pasture variant crosswalk)
//!   3. Split passes (independent; parallel with `threading`)
//!   4. Recombination of successful passes, in declaration order
//!   5. Intactness weighting
//!
//! A failing pass is recorded and skipped; it never removes the output of
//! another pass.

use serde::{Deserialize, Serialize};

use crate::config::DisaggConfig;
use crate::crosswalk::{Crosswalk, Direction, SplitWeights};
use crate::disaggregate::{ConservationReport, ShareDisaggregator};
use crate::error::{DisaggError, Result};
use crate::field::QuantityField;
use crate::mapping::SpatialMapping;
use crate::recombine;
use crate::weighted::{self, CoefficientField};

pub const LAND: &str = "land";
pub const LAND_SHARE: &str = "land_share";
pub const HARMONIZE: &str = "harmonize";
pub const PASTURE_FRACTIONS: &str = "pasture_fractions";
pub const INTACTNESS: &str = "bii";

// ── Inputs ────────────────────────────────────────────────────────────────────

/// Split one parent category of the land tensor into the sub-categories
/// given at cluster resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitPass {
    pub name: String,
    pub parent: String,
    pub children_coarse: QuantityField,
}

/// Everything a run consumes, already materialised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineInputs {
    pub mapping: SpatialMapping,
    /// Fine land tensor in the model's categories, as produced by the
    /// upstream interpolation.
    pub land: QuantityField,
    #[serde(default)]
    pub splits: Vec<SplitPass>,
    /// Per-cell managed pasture / rangeland fractions (`pastr`, `range`).
    /// Required by the `no_grass` scheme only.
    #[serde(default)]
    pub pasture_fractions: Option<QuantityField>,
    #[serde(default)]
    pub intactness: Option<CoefficientField>,
}

// ── Outputs ───────────────────────────────────────────────────────────────────

/// Non-fatal conditions. They are logged and reported but never change the
/// values written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    NegativeValueCorrected { field: String, count: usize },
    ConservationViolation { pass: String, residual: f64, tolerance: f64 },
    /// An optional sub-pass was skipped because its input is missing.
    ConfigurationError { pass: String, message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct PassFailure {
    pub pass: String,
    pub error: DisaggError,
}

#[derive(Debug, Clone, Serialize)]
pub struct NamedOutput {
    pub name: String,
    /// Physical unit label for the persistence layer.
    pub unit: &'static str,
    pub field: QuantityField,
}

impl NamedOutput {
    fn new(name: impl Into<String>, field: QuantityField) -> Self {
        Self { name: name.into(), unit: field.physical_unit().label(), field }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineOutput {
    pub outputs: Vec<NamedOutput>,
    pub diagnostics: Vec<Diagnostic>,
    pub failures: Vec<PassFailure>,
}

impl PipelineOutput {
    pub fn output(&self, name: &str) -> Option<&QuantityField> {
        self.outputs.iter().find(|o| o.name == name).map(|o| &o.field)
    }

    pub fn failure(&self, pass: &str) -> Option<&DisaggError> {
        self.failures.iter().find(|f| f.pass == pass).map(|f| &f.error)
    }

    fn fail(&mut self, pass: &str, error: DisaggError) {
        tracing::error!(pass, %error, "pass failed");
        self.failures.push(PassFailure { pass: pass.to_string(), error });
    }

    fn skip(&mut self, pass: &str, message: String) {
        tracing::warn!(pass, %message, "skipping sub-pass");
        self.diagnostics.push(Diagnostic::ConfigurationError { pass: pass.to_string(), message });
    }

    fn record_clipped(&mut self, field: &str, count: usize) {
        if count > 0 {
            tracing::warn!(field, count, "clipped negative values");
            self.diagnostics
                .push(Diagnostic::NegativeValueCorrected { field: field.to_string(), count });
        }
    }
}

/// Result of one split pass before recombination. `clipped` is kept even
/// when the split itself fails.
struct SplitOutcome {
    clipped: usize,
    result: Result<(QuantityField, ConservationReport)>,
}

/// Finite copy of an optional side layer with negatives clipped.
fn prepare_layer(
    name: &str,
    layer: Option<&QuantityField>,
    out: &mut PipelineOutput,
) -> Result<Option<QuantityField>> {
    let Some(layer) = layer else { return Ok(None) };
    layer.ensure_finite(name)?;
    let mut layer = layer.clone();
    out.record_clipped(name, layer.clip_negative());
    Ok(Some(layer))
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

pub struct DisaggregationPipeline {
    config: DisaggConfig,
}

impl DisaggregationPipeline {
    pub fn new(config: DisaggConfig) -> Self {
        Self { config }
    }

    /// Run all passes. Errors only when the configuration or the shared land
    /// tensor is unusable; per-pass errors are collected in the output.
    pub fn run(&self, inputs: &PipelineInputs) -> Result<PipelineOutput> {
        self.config.validate()?;
        let mut out = PipelineOutput::default();

        // ── 1. Input checks ─────────────────────────────────────────────────
        let mut land = inputs.land.clone();
        land.ensure_finite(LAND)?;
        out.record_clipped(LAND, land.clip_negative());

        // ── 2. Scheme harmonisation ─────────────────────────────────────────
        let crosswalk = self.config.scheme.crosswalk();
        let harmonized = if crosswalk.has_splits(Direction::ToExternal) {
            match prepare_layer(PASTURE_FRACTIONS, inputs.pasture_fractions.as_ref(), &mut out) {
                Ok(Some(fractions)) => {
                    Some(crosswalk.apply_with(&land, Direction::ToExternal, Some(SplitWeights::Layer(&fractions))))
                }
                Ok(None) => {
                    out.skip(
                        HARMONIZE,
                        format!("scheme {:?} needs pasture fractions; keeping model categories", self.config.scheme),
                    );
                    None
                }
                Err(e) => Some(Err(e)),
            }
        } else {
            Some(crosswalk.apply(&land, Direction::ToExternal))
        };
        match harmonized {
            Some(Ok(next)) => land = next,
            Some(Err(e)) => out.fail(HARMONIZE, e),
            None => {}
        }

        // ── 3. Split passes ─────────────────────────────────────────────────
        let outcomes = self.run_splits(&inputs.splits, &land, &inputs.mapping, &crosswalk);

        // ── 4. Recombination ────────────────────────────────────────────────
        for (pass, outcome) in inputs.splits.iter().zip(outcomes) {
            out.record_clipped(&pass.name, outcome.clipped);
            let (children, report) = match outcome.result {
                Ok(split) => split,
                Err(e) => {
                    out.fail(&pass.name, e);
                    continue;
                }
            };
            if !report.ok {
                out.diagnostics.push(Diagnostic::ConservationViolation {
                    pass: pass.name.clone(),
                    residual: report.residual,
                    tolerance: report.tolerance,
                });
            }
            match recombine::replace(&land, &pass.parent, &children) {
                Ok(next) => land = next,
                Err(e) => {
                    out.fail(&pass.name, e);
                    continue;
                }
            }
            let shares = children.row_normalized();
            out.outputs.push(NamedOutput::new(pass.name.clone(), children));
            out.outputs.push(NamedOutput::new(format!("{}_share", pass.name), shares));
        }

        let land_share = land.row_normalized();

        // ── 5. Intactness weighting ─────────────────────────────────────────
        match &inputs.intactness {
            Some(coefficients) => match weighted::aggregate(&[&land_share], coefficients) {
                Ok(bii) => out.outputs.push(NamedOutput::new(INTACTNESS, bii)),
                Err(e) => out.fail(INTACTNESS, e),
            },
            None => out.skip(INTACTNESS, "no intactness coefficients supplied".to_string()),
        }

        out.outputs.push(NamedOutput::new(LAND, land));
        out.outputs.push(NamedOutput::new(LAND_SHARE, land_share));

        tracing::info!(
            outputs = out.outputs.len(),
            diagnostics = out.diagnostics.len(),
            failures = out.failures.len(),
            "pipeline finished"
        );
        Ok(out)
    }

    fn run_splits(
        &self,
        splits: &[SplitPass],
        land: &QuantityField,
        mapping: &SpatialMapping,
        crosswalk: &Crosswalk,
    ) -> Vec<SplitOutcome> {
        map_passes(splits, self.config.parallel, |pass| self.run_split(pass, land, mapping, crosswalk))
    }

    fn run_split(
        &self,
        pass: &SplitPass,
        land: &QuantityField,
        mapping: &SpatialMapping,
        crosswalk: &Crosswalk,
    ) -> SplitOutcome {
        let _span = tracing::debug_span!("split", pass = %pass.name).entered();

        if let Err(e) = pass.children_coarse.ensure_finite(&pass.name) {
            return SplitOutcome { clipped: 0, result: Err(e) };
        }
        let mut children_coarse = pass.children_coarse.clone();
        let clipped = children_coarse.clip_negative();
        let result = self.split(pass, &children_coarse, land, mapping, crosswalk);
        SplitOutcome { clipped, result }
    }

    fn split(
        &self,
        pass: &SplitPass,
        children_coarse: &QuantityField,
        land: &QuantityField,
        mapping: &SpatialMapping,
        crosswalk: &Crosswalk,
    ) -> Result<(QuantityField, ConservationReport)> {
        // Parents must be reportable categories of the active scheme.
        crosswalk.ensure_covers([pass.parent.as_str()], Direction::ToInternal)?;
        let parent_total = land.category(&pass.parent)?;

        let disaggregator = ShareDisaggregator::new(self.config.epsilon);
        let children = disaggregator.disaggregate(&parent_total, children_coarse, mapping)?;
        let report = self.config.conservation.enforce(&pass.name, &children, &parent_total)?;

        tracing::debug!(residual = report.residual, "split pass done");
        Ok((children, report))
    }
}

#[cfg(feature = "threading")]
fn map_passes<F>(splits: &[SplitPass], parallel: bool, f: F) -> Vec<SplitOutcome>
where
    F: Fn(&SplitPass) -> SplitOutcome + Sync + Send,
{
    use rayon::prelude::*;
    if parallel {
        splits.par_iter().map(f).collect()
    } else {
        splits.iter().map(f).collect()
    }
}

#[cfg(not(feature = "threading"))]
fn map_passes<F>(splits: &[SplitPass], parallel: bool, f: F) -> Vec<SplitOutcome>
where
    F: Fn(&SplitPass) -> SplitOutcome,
{
    if parallel {
        tracing::debug!("built without `threading`; running split passes sequentially");
    }
    splits.iter().map(f).collect()
}
