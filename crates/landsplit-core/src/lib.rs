//! Cluster-to-cell disaggregation of land-allocation quantities.
//!
//! The upstream land-use model works on clusters of grid cells. This crate
//! turns its cluster-level results into cell-level fields:
//!
//! - [`disaggregate`]: split a fine parent total into sub-categories using
//!   cluster-level shares, with a global conservation check
//! - [`crosswalk`]: rename, merge and split categories between schemes
//! - [`recombine`]: swap a parent category for its children in a tensor
//! - [`weighted`]: category-weighted indicator (biodiversity intactness)
//! - [`pipeline`]: runs all of the above for one scenario

pub mod config;
pub mod crosswalk;
pub mod disaggregate;
pub mod error;
pub mod field;
pub mod mapping;
pub mod pipeline;
pub mod recombine;
pub mod weighted;

pub use config::DisaggConfig;
pub use crosswalk::{Crosswalk, Direction, Fader, LandScheme, SplitWeights};
pub use disaggregate::{ConservationPolicy, ConservationReport, ShareDisaggregator, ViolationAction};
pub use error::{DisaggError, Result};
pub use field::{PhysicalUnit, QuantityField};
pub use mapping::{AggregationMode, MappingRow, SpatialMapping};
pub use pipeline::{DisaggregationPipeline, Diagnostic, PipelineInputs, PipelineOutput, SplitPass};
pub use weighted::CoefficientField;
