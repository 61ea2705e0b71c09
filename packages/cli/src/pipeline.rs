//! End-to-end analysis: ingest, aggregate, fit, diagnose, correct.
//!
//! Each stage takes the previous stage's output by reference and returns
//! a new value; the cell table only ever grows by whole columns.

use std::sync::Arc;
use std::time::Instant;

use crime_spatial_analytics::design::Design;
use crime_spatial_analytics::{
    AnalyticsError, fit_lag, fit_ols, lm_tests, moran_permutation_test, moran_test,
    residual_moran_test,
};
use crime_spatial_analytics_models::{
    LagSummary, LmDiagnostics, MoranResult, OlsSummary, PermutationResult, ResidualMoranResult,
};
use crime_spatial_geography_models::{BUS_STOPS_COLUMN, CellTable, TOTAL_COLUMN};
use crime_spatial_ingest::progress::{ProgressCallback, null_progress};
use crime_spatial_ingest::{IngestError, ingest};
use crime_spatial_ingest_models::IngestStats;
use crime_spatial_spatial::{
    CellIndex, Neighbours, SpatialError, SpatialWeights, WeightsSummary, attach_counts,
};
use serde::Serialize;
use thiserror::Error;

use crate::config::{AnalysisConfig, WeightsConfig};

/// Number of stages reported by [`run_pipeline`].
pub const PIPELINE_STAGES: u64 = 6;

/// A failure in any stage. Every stage fails fast.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Loading the inputs failed.
    #[error(transparent)]
    Ingest(#[from] IngestError),

    /// Aggregation or weights construction failed.
    #[error(transparent)]
    Spatial(#[from] SpatialError),

    /// A model fit or diagnostic failed.
    #[error(transparent)]
    Analytics(#[from] AnalyticsError),
}

/// The aggregated cell table and what ingestion saw along the way.
#[derive(Debug, Clone)]
pub struct Aggregated {
    /// Cells with `trips`, `total` and `bus_stops` columns.
    pub table: CellTable,
    /// Ingestion counts.
    pub stats: IngestStats,
    /// Incidents that fell inside some cell.
    pub incidents_attributed: u64,
    /// Stops that fell inside some cell.
    pub stops_attributed: u64,
}

/// Everything a run produces, in the order it was computed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    /// Ingestion counts.
    pub ingest: IngestStats,
    /// Incidents that fell inside some cell.
    pub incidents_attributed: u64,
    /// Stops that fell inside some cell.
    pub stops_attributed: u64,
    /// Neighbour structure.
    pub weights: WeightsSummary,
    /// Moran's I of the response.
    pub response_moran: MoranResult,
    /// Permutation test of the response, when enabled.
    pub response_permutation: Option<PermutationResult>,
    /// OLS fit.
    pub ols: OlsSummary,
    /// Moran's I of the OLS residuals.
    pub residual_moran: ResidualMoranResult,
    /// Lagrange-multiplier tests and the recommended specification.
    pub lm: LmDiagnostics,
    /// Spatial-lag fit.
    pub lag: LagSummary,
}

/// Loads the inputs and adds the incident and bus-stop count columns.
///
/// # Errors
///
/// Returns [`PipelineError::Ingest`] if any input cannot be loaded, or
/// [`PipelineError::Spatial`] if the grid layer already carries a
/// `total` or `bus_stops` column.
pub fn aggregate(
    config: &AnalysisConfig,
    progress: Option<Arc<dyn ProgressCallback>>,
) -> Result<Aggregated, PipelineError> {
    let data = ingest(&config.input, progress)?;
    let index = CellIndex::new(data.cells.cells());

    let table = attach_counts(&data.cells, &index, &data.incidents, TOTAL_COLUMN)?;
    let table = attach_counts(&table, &index, &data.stops, BUS_STOPS_COLUMN)?;

    Ok(Aggregated {
        incidents_attributed: column_total(&table, TOTAL_COLUMN),
        stops_attributed: column_total(&table, BUS_STOPS_COLUMN),
        table,
        stats: data.stats,
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn column_total(table: &CellTable, column: &str) -> u64 {
    table
        .get(column)
        .map_or(0, |values| values.iter().sum::<f64>() as u64)
}

/// Builds the spatial weights for the cells of `table`.
#[must_use]
pub fn build_weights(table: &CellTable, config: &WeightsConfig) -> SpatialWeights {
    let neighbours = Neighbours::from_cells(table.cells(), config.contiguity, config.snap);
    SpatialWeights::new(neighbours, config.style)
}

/// Runs every stage and collects the results.
///
/// `stages` advances once per stage; `records` is handed to ingestion for
/// per-file progress.
///
/// # Errors
///
/// Returns the first stage failure.
pub fn run_pipeline(
    config: &AnalysisConfig,
    stages: Option<Arc<dyn ProgressCallback>>,
    records: Option<Arc<dyn ProgressCallback>>,
) -> Result<AnalysisReport, PipelineError> {
    let start = Instant::now();
    let stages = stages.unwrap_or_else(null_progress);
    stages.set_total(PIPELINE_STAGES);

    stages.set_message("Ingesting and aggregating".to_string());
    let aggregated = aggregate(config, records)?;
    log::info!(
        "Aggregated {} incidents and {} stops into {} cells",
        aggregated.incidents_attributed,
        aggregated.stops_attributed,
        aggregated.table.len()
    );
    stages.inc(1);

    stages.set_message("Building weights".to_string());
    let weights = build_weights(&aggregated.table, &config.weights);
    let weights_summary = weights.summary();
    log::info!(
        "{} contiguity: {} links, mean degree {:.2}, {} islands",
        config.weights.contiguity,
        weights_summary.links,
        weights_summary.mean_degree,
        weights_summary.islands
    );
    stages.inc(1);

    stages.set_message("Fitting OLS".to_string());
    let design = Design::from_table(&aggregated.table, &config.model.design_spec())?;
    let ols = fit_ols(&design)?;
    stages.inc(1);

    stages.set_message("Testing for autocorrelation".to_string());
    let moran_options = config.moran.options();
    let response = design.y().as_slice();
    let response_moran = moran_test(response, &weights, &moran_options)?;
    let response_permutation = if config.moran.permutations > 0 {
        Some(moran_permutation_test(
            response,
            &weights,
            &moran_options,
            config.moran.permutations,
            config.moran.seed,
        )?)
    } else {
        None
    };
    log::info!(
        "Moran's I of {}: {:.4} (p = {:.4})",
        design.response(),
        response_moran.statistic,
        response_moran.p_value
    );
    stages.inc(1);

    stages.set_message("Running diagnostics".to_string());
    let residual_moran = residual_moran_test(
        &ols,
        &weights,
        config.moran.alternative,
        config.moran.zero_policy,
    )?;
    let lm = lm_tests(
        &ols,
        &weights,
        config.lm.significance,
        config.moran.zero_policy,
    )?;
    log::info!("LM tests recommend: {}", lm.recommendation);
    stages.inc(1);

    stages.set_message("Fitting spatial lag model".to_string());
    let lag = fit_lag(&design, &weights, &config.lag)?;
    stages.inc(1);

    stages.finish(format!(
        "Analysis complete in {:.1}s",
        start.elapsed().as_secs_f64()
    ));

    Ok(AnalysisReport {
        ingest: aggregated.stats,
        incidents_attributed: aggregated.incidents_attributed,
        stops_attributed: aggregated.stops_attributed,
        weights: weights_summary,
        response_moran,
        response_permutation,
        ols: ols.summary(),
        residual_moran,
        lm,
        lag: lag.summary(),
    })
}
