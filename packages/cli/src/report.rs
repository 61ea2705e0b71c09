//! Human-readable and CSV renderings of pipeline output.

use std::fmt::Write as _;
use std::io;

use crime_spatial_analytics_models::{Coefficient, TestStatistic, significance_stars};
use crime_spatial_geography_models::CellTable;
use crime_spatial_spatial::WeightsSummary;

use crate::pipeline::AnalysisReport;

const RULE: &str = "------------------------------------------------------------------";

/// Renders the full report as plain text.
#[must_use]
pub fn render_report(report: &AnalysisReport) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = write_report(&mut out, report);
    out
}

fn write_report(out: &mut String, report: &AnalysisReport) -> std::fmt::Result {
    let ingest = &report.ingest;
    writeln!(out, "Input")?;
    writeln!(out, "{RULE}")?;
    writeln!(
        out,
        "Incidents: {} rows in {} files, {} without coordinates, {} filtered, {} in a cell",
        ingest.incident_rows,
        ingest.incident_files,
        ingest.incidents_missing_coordinates,
        ingest.incidents_filtered,
        report.incidents_attributed
    )?;
    writeln!(
        out,
        "Bus stops: {} features, {} withdrawn, {} without geometry, {} in a cell",
        ingest.stop_features,
        ingest.stops_withdrawn,
        ingest.stops_missing_geometry,
        report.stops_attributed
    )?;
    writeln!(out, "Cells:     {}", ingest.cells)?;
    writeln!(out)?;

    write_weights(out, &report.weights)?;
    writeln!(out)?;

    let moran = &report.response_moran;
    writeln!(out, "Moran's I of {} ({})", report.ols.response, moran.assumption)?;
    writeln!(out, "{RULE}")?;
    writeln!(
        out,
        "I = {:.6}  E[I] = {:.6}  Var = {:.6}",
        moran.statistic, moran.expectation, moran.variance
    )?;
    writeln!(
        out,
        "z = {:.4}  p = {} ({})",
        moran.z_score,
        format_p(moran.p_value),
        moran.alternative
    )?;
    if let Some(perm) = &report.response_permutation {
        writeln!(
            out,
            "Permutation: {} draws, mean {:.6}, variance {:.6}, pseudo p = {}",
            perm.simulations,
            perm.mean,
            perm.variance,
            format_p(perm.p_value)
        )?;
    }
    writeln!(out)?;

    let ols = &report.ols;
    writeln!(out, "OLS: {} ~ {}", ols.response, predictor_list(&ols.coefficients))?;
    writeln!(out, "{RULE}")?;
    write_coefficients(out, &ols.coefficients, "t")?;
    writeln!(
        out,
        "Residual standard error: {:.4} on {} degrees of freedom",
        ols.residual_std_error, ols.df_residual
    )?;
    writeln!(
        out,
        "R-squared: {:.4}  Adjusted R-squared: {:.4}",
        ols.r_squared, ols.adj_r_squared
    )?;
    writeln!(
        out,
        "F-statistic: {:.4} on {} and {} DF, p = {}",
        ols.f_statistic,
        ols.k.saturating_sub(1),
        ols.df_residual,
        format_p(ols.f_p_value)
    )?;
    writeln!(
        out,
        "Log likelihood: {:.4}  AIC: {:.4}",
        ols.log_likelihood, ols.aic
    )?;
    writeln!(out)?;

    let residual = &report.residual_moran;
    writeln!(out, "Moran's I of OLS residuals")?;
    writeln!(out, "{RULE}")?;
    writeln!(
        out,
        "I = {:.6}  E[I] = {:.6}  Var = {:.6}",
        residual.statistic, residual.expectation, residual.variance
    )?;
    writeln!(
        out,
        "z = {:.4}  p = {} ({})",
        residual.z_score,
        format_p(residual.p_value),
        residual.alternative
    )?;
    writeln!(out)?;

    let lm = &report.lm;
    writeln!(out, "Lagrange multiplier diagnostics")?;
    writeln!(out, "{RULE}")?;
    for (name, test) in [
        ("LMerr", &lm.lm_error),
        ("LMlag", &lm.lm_lag),
        ("RLMerr", &lm.robust_lm_error),
        ("RLMlag", &lm.robust_lm_lag),
        ("SARMA", &lm.sarma),
    ] {
        write_test(out, name, test)?;
    }
    writeln!(
        out,
        "Recommended model (alpha = {}): {}",
        lm.significance, lm.recommendation
    )?;
    writeln!(out)?;

    let lag = &report.lag;
    writeln!(
        out,
        "Spatial lag model: {} ~ {} ({} Jacobian)",
        lag.response,
        predictor_list(&lag.coefficients),
        lag.method
    )?;
    writeln!(out, "{RULE}")?;
    write_coefficients(out, &lag.coefficients, "z")?;
    writeln!(out)?;
    let rho = &lag.rho;
    if lag.rho_fixed {
        writeln!(out, "Rho: {:.6} (fixed)", rho.estimate)?;
    } else {
        writeln!(
            out,
            "Rho: {:.6}  SE: {:.6}  z = {:.4}  p = {} {}",
            rho.estimate,
            rho.std_error,
            rho.statistic,
            format_p(rho.p_value),
            significance_stars(rho.p_value)
        )?;
        writeln!(
            out,
            "Searched rho in ({:.4}, {:.4}), {} iterations",
            lag.rho_interval.0, lag.rho_interval.1, lag.iterations
        )?;
    }
    write_test(out, "Wald", &lag.wald)?;
    write_test(out, "LR", &lag.likelihood_ratio)?;
    write_test(out, "LM (residual autocorrelation)", &lag.residual_autocorrelation)?;
    writeln!(
        out,
        "Log likelihood: {:.4}  sigma^2: {:.4}",
        lag.log_likelihood, lag.sigma2
    )?;
    writeln!(
        out,
        "AIC: {:.4} (OLS: {:.4})  Pseudo R-squared: {:.4}",
        lag.aic, lag.ols_aic, lag.pseudo_r_squared
    )?;

    if !lag.impacts.is_empty() {
        writeln!(out)?;
        writeln!(
            out,
            "{:<20} {:>12} {:>12} {:>12}",
            "Impact", "Direct", "Indirect", "Total"
        )?;
        for impact in &lag.impacts {
            writeln!(
                out,
                "{:<20} {:>12.6} {:>12.6} {:>12.6}",
                impact.name, impact.direct, impact.indirect, impact.total
            )?;
        }
    }

    writeln!(out, "---")?;
    writeln!(
        out,
        "Signif. codes: 0 '***' 0.001 '**' 0.01 '*' 0.05 '.' 0.1 ' ' 1"
    )
}

/// Renders the neighbour summary printed by the `neighbours` command.
#[must_use]
pub fn render_weights(summary: &WeightsSummary) -> String {
    let mut out = String::new();
    let _ = write_weights(&mut out, summary);
    out
}

fn write_weights(out: &mut String, summary: &WeightsSummary) -> std::fmt::Result {
    writeln!(out, "Spatial weights")?;
    writeln!(out, "{RULE}")?;
    writeln!(
        out,
        "Cells: {}  Links: {}  Non-zero: {:.4}%",
        summary.cells, summary.links, summary.percent_nonzero
    )?;
    writeln!(
        out,
        "Neighbours per cell: mean {:.4}, min {}, max {}",
        summary.mean_degree, summary.min_degree, summary.max_degree
    )?;
    writeln!(out, "Cells without neighbours: {}", summary.islands)?;
    writeln!(out, "S0: {:.4}", summary.s0)
}

fn write_coefficients(
    out: &mut String,
    coefficients: &[Coefficient],
    statistic: &str,
) -> std::fmt::Result {
    writeln!(
        out,
        "{:<20} {:>12} {:>12} {:>9} {:>11}",
        "",
        "Estimate",
        "Std. Error",
        format!("{statistic} value"),
        format!("Pr(>|{statistic}|)")
    )?;
    for c in coefficients {
        writeln!(
            out,
            "{:<20} {:>12.6} {:>12.6} {:>9.4} {:>11} {}",
            c.name,
            c.estimate,
            c.std_error,
            c.statistic,
            format_p(c.p_value),
            significance_stars(c.p_value)
        )?;
    }
    Ok(())
}

fn write_test(out: &mut String, name: &str, test: &TestStatistic) -> std::fmt::Result {
    writeln!(
        out,
        "{name:<10} {:>12.6}  df = {}  p = {} {}",
        test.statistic,
        test.df,
        format_p(test.p_value),
        significance_stars(test.p_value)
    )
}

fn predictor_list(coefficients: &[Coefficient]) -> String {
    let predictors: Vec<&str> = coefficients
        .iter()
        .skip(1)
        .map(|c| c.name.as_str())
        .collect();
    if predictors.is_empty() {
        "1".to_string()
    } else {
        predictors.join(" + ")
    }
}

fn format_p(p: f64) -> String {
    if p.is_nan() {
        "NA".to_string()
    } else if p < 2.2e-16 {
        "< 2.2e-16".to_string()
    } else if p < 1e-4 {
        format!("{p:.3e}")
    } else {
        format!("{p:.4}")
    }
}

/// Writes the cell table as CSV: `id`, then every column in table order.
///
/// # Errors
///
/// Returns the underlying CSV or I/O error.
pub fn write_cells_csv<W: io::Write>(table: &CellTable, writer: W) -> Result<(), csv::Error> {
    let mut csv = csv::Writer::from_writer(writer);
    let names: Vec<&str> = table.column_names().collect();
    let columns: Vec<&[f64]> = names.iter().filter_map(|name| table.get(name)).collect();

    let mut header = vec!["id"];
    header.extend(names.iter().copied());
    csv.write_record(&header)?;

    for (row, cell) in table.cells().iter().enumerate() {
        let mut record = vec![cell.id.clone()];
        record.extend(columns.iter().map(|values| values[row].to_string()));
        csv.write_record(&record)?;
    }

    csv.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crime_spatial_geography_models::{PolygonCell, TOTAL_COLUMN, TRIPS_COLUMN};
    use geo::MultiPolygon;

    use super::*;

    #[test]
    fn p_values_are_formatted_like_r() {
        assert_eq!(format_p(f64::NAN), "NA");
        assert_eq!(format_p(1e-20), "< 2.2e-16");
        assert_eq!(format_p(0.000_012_3), "1.230e-5");
        assert_eq!(format_p(0.5), "0.5000");
    }

    #[test]
    fn cells_csv_has_id_then_columns() {
        let cells = ["a", "b"]
            .iter()
            .map(|id| PolygonCell {
                id: (*id).to_string(),
                geometry: MultiPolygon(vec![]),
            })
            .collect();
        let table = CellTable::new(cells)
            .with_column(TRIPS_COLUMN, vec![10.5, 20.0])
            .unwrap()
            .with_column(TOTAL_COLUMN, vec![2.0, 0.0])
            .unwrap();

        let mut buf = Vec::new();
        write_cells_csv(&table, &mut buf).unwrap();

        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "id,trips,total\na,10.5,2\nb,20,0\n"
        );
    }

    #[test]
    fn weights_summary_lists_islands() {
        let text = render_weights(&WeightsSummary {
            cells: 4,
            links: 6,
            percent_nonzero: 37.5,
            mean_degree: 1.5,
            min_degree: 0,
            max_degree: 3,
            islands: 1,
            s0: 4.0,
        });
        assert!(text.contains("Cells: 4  Links: 6  Non-zero: 37.5000%"));
        assert!(text.contains("Cells without neighbours: 1"));
    }
}
