#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Configuration, orchestration and reporting for the crime spatial
//! regression pipeline.
//!
//! [`run_pipeline`] chains ingestion, aggregation, OLS, the
//! autocorrelation diagnostics and the spatial-lag fit into one
//! [`AnalysisReport`], which [`render_report`] turns into text and
//! `serde_json` into JSON.

pub mod config;
pub mod pipeline;
pub mod report;

pub use config::{AnalysisConfig, ConfigError, DEFAULT_CONFIG};
pub use pipeline::{
    Aggregated, AnalysisReport, PipelineError, aggregate, build_weights, run_pipeline,
};
pub use report::{render_report, render_weights, write_cells_csv};
