//! R-tree index over the grid cells.
//!
//! Point lookups filter by envelope first, then test the closed polygon
//! (boundary included). A point on a boundary shared by several cells
//! belongs to the cell with the lowest index, whatever order the tree
//! yields candidates in.

use crime_spatial_geography_models::PolygonCell;
use geo::{BoundingRect, Intersects, MultiPolygon, Point};
use rstar::{AABB, RTree, RTreeObject};

/// A cell polygon stored in the R-tree with its position in the table.
struct CellEntry {
    index: usize,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl RTreeObject for CellEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Spatial index over a slice of [`PolygonCell`]s.
pub struct CellIndex {
    tree: RTree<CellEntry>,
    len: usize,
}

impl CellIndex {
    /// Builds the index. Cell indices refer to positions in `cells`.
    #[must_use]
    pub fn new(cells: &[PolygonCell]) -> Self {
        let entries: Vec<CellEntry> = cells
            .iter()
            .enumerate()
            .map(|(index, cell)| CellEntry {
                index,
                envelope: compute_envelope(&cell.geometry),
                polygon: cell.geometry.clone(),
            })
            .collect();

        Self {
            tree: RTree::bulk_load(entries),
            len: cells.len(),
        }
    }

    /// Number of indexed cells.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the index holds no cells.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Index of the cell owning the point, if any.
    ///
    /// Boundary points count as inside; ties go to the lowest index.
    #[must_use]
    pub fn locate(&self, lng: f64, lat: f64) -> Option<usize> {
        let point = Point::new(lng, lat);
        let query_env = AABB::from_point([lng, lat]);

        self.tree
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| entry.polygon.intersects(&point))
            .map(|entry| entry.index)
            .min()
    }

    /// Indices of cells whose envelope intersects `envelope`, in no
    /// particular order.
    pub fn candidates(&self, envelope: &AABB<[f64; 2]>) -> impl Iterator<Item = usize> + '_ {
        self.tree
            .locate_in_envelope_intersecting(envelope)
            .map(|entry| entry.index)
    }
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
///
/// An empty geometry gets a degenerate envelope at the origin; its polygon
/// test never succeeds, so it never owns a point.
#[must_use]
pub fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}

/// `envelope` grown by `margin` on every side.
#[must_use]
pub fn expand_envelope(envelope: &AABB<[f64; 2]>, margin: f64) -> AABB<[f64; 2]> {
    let [min_x, min_y] = envelope.lower();
    let [max_x, max_y] = envelope.upper();
    AABB::from_corners(
        [min_x - margin, min_y - margin],
        [max_x + margin, max_y + margin],
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use geo::{LineString, Polygon};

    use super::*;

    /// Unit square with its lower-left corner at `(x, y)`.
    pub fn square(id: &str, x: f64, y: f64) -> PolygonCell {
        let ring = LineString::from(vec![
            (x, y),
            (x + 1.0, y),
            (x + 1.0, y + 1.0),
            (x, y + 1.0),
            (x, y),
        ]);
        PolygonCell {
            id: id.to_string(),
            geometry: MultiPolygon(vec![Polygon::new(ring, vec![])]),
        }
    }

    /// `cols` x `rows` unit squares, row-major from the origin.
    #[allow(clippy::cast_precision_loss)]
    pub fn square_grid(cols: usize, rows: usize) -> Vec<PolygonCell> {
        let mut cells = Vec::new();
        for r in 0..rows {
            for c in 0..cols {
                cells.push(square(&format!("r{r}c{c}"), c as f64, r as f64));
            }
        }
        cells
    }

    #[test]
    fn interior_points_find_their_cell() {
        let index = CellIndex::new(&square_grid(2, 2));
        assert_eq!(index.locate(0.5, 0.5), Some(0));
        assert_eq!(index.locate(1.5, 0.5), Some(1));
        assert_eq!(index.locate(0.5, 1.5), Some(2));
        assert_eq!(index.locate(1.5, 1.5), Some(3));
    }

    #[test]
    fn shared_boundary_goes_to_lowest_index() {
        let index = CellIndex::new(&square_grid(2, 2));
        // Edge between cells 1 and 3.
        assert_eq!(index.locate(1.5, 1.0), Some(1));
        // Corner shared by all four.
        assert_eq!(index.locate(1.0, 1.0), Some(0));
        // Outer boundary of a single cell.
        assert_eq!(index.locate(2.0, 2.0), Some(3));
    }

    #[test]
    fn outside_points_are_unowned() {
        let index = CellIndex::new(&square_grid(2, 2));
        assert_eq!(index.locate(-0.1, 0.5), None);
        assert_eq!(index.locate(3.0, 3.0), None);
        assert!(CellIndex::new(&[]).locate(0.0, 0.0).is_none());
    }
}
