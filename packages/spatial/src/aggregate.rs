//! Point-in-polygon counting onto the cell table.

use crime_spatial_crime_models::Located;
use crime_spatial_geography_models::CellTable;

use crate::SpatialError;
use crate::index::CellIndex;

/// Owning cell for each point, in point order. `None` for points outside
/// every cell.
pub fn assign_points<P: Located>(index: &CellIndex, points: &[P]) -> Vec<Option<usize>> {
    points
        .iter()
        .map(|point| {
            let (lng, lat) = point.location();
            index.locate(lng, lat)
        })
        .collect()
}

/// Number of points owned by each cell, in cell order.
///
/// Every point is counted at most once; points outside every cell are
/// not counted at all.
pub fn count_points<P: Located>(index: &CellIndex, points: &[P]) -> Vec<u64> {
    tally(index.len(), &assign_points(index, points))
}

fn tally(cells: usize, assigned: &[Option<usize>]) -> Vec<u64> {
    let mut counts = vec![0_u64; cells];
    for cell in assigned.iter().flatten() {
        counts[*cell] += 1;
    }
    counts
}

/// Returns a new table with the per-cell point counts added as `column`.
///
/// # Errors
///
/// Returns [`SpatialError::Table`] if `column` already exists or `index`
/// was not built from `table`'s cells.
pub fn attach_counts<P: Located>(
    table: &CellTable,
    index: &CellIndex,
    points: &[P],
    column: &str,
) -> Result<CellTable, SpatialError> {
    let assigned = assign_points(index, points);
    let counts = tally(index.len(), &assigned);

    let unattributed = assigned.iter().filter(|cell| cell.is_none()).count();
    if unattributed > 0 {
        log::info!(
            "{column}: {unattributed} of {} points fall outside every cell",
            points.len()
        );
    }
    log::debug!(
        "{column}: {} points counted into {} cells",
        points.len() - unattributed,
        counts.iter().filter(|c| **c > 0).count()
    );

    #[allow(clippy::cast_precision_loss)]
    let values = counts.into_iter().map(|c| c as f64).collect();
    Ok(table.with_column(column, values)?)
}
