#![forbid(unsafe_code)]
//! lunar_terrain: statistical lunar-terrain generation for synthetic navigation datasets.
//!
//! Modules:
//! - terrain: size-frequency model, coverage-driven rock and crater placement, field tables
//! - sampling: seeded draw helpers, declarative distributions, render-case enumeration
//! - config: typed YAML job configuration with includes and dotted-path overrides
//! - dataset: job planning, replayable job files, case dispatch and events
pub mod config;
pub mod dataset;
pub mod error;
pub mod sampling;
pub mod terrain;

/// Convenient re-exports for common types. Import with `use lunar_terrain::prelude::*;`.
pub mod prelude {
    pub use crate::config::{
        CameraType, CasePolicy, ConfigLoader, DatasetConfig, FieldConfig, OverrideExpr,
    };
    pub use crate::dataset::{
        render_job, CaseRenderer, DatasetEvent, DatasetEventKind, DatasetJob,
        DatasetOrchestrator, EventSink, FnSink, RenderSummary, TerrainJob, VecSink,
    };
    pub use crate::error::{Error, Result};
    pub use crate::sampling::{
        derive_seed, CaseEnumerator, DistributionSpec, RenderCase, Stream, Trajectory,
    };
    pub use crate::terrain::{
        Feature, FeatureField, FeatureKind, FieldPlacer, HeightLaw, PlacementOptions,
        SizeFrequencyModel,
    };
}
