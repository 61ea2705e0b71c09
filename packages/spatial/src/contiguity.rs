//! Polygon contiguity: which cells touch which.
//!
//! Two cells are neighbours when their boundaries share vertices, compared
//! within a snap distance. Queen contiguity needs one shared vertex (a
//! touching corner is enough); rook needs at least two, which is what an
//! edge shared between regular polygons looks like.

use std::collections::BTreeSet;

use crime_spatial_geography_models::PolygonCell;
use geo::{Coord, CoordsIter};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::SpatialError;
use crate::index::{CellIndex, compute_envelope, expand_envelope};

/// Default vertex snap distance, `sqrt(f64::EPSILON)` in coordinate units.
pub const DEFAULT_SNAP: f64 = 1.490_116_119_384_765_6e-8;

/// Adjacency rule for contiguity neighbours.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ContiguityRule {
    /// Any shared boundary point, corners included.
    #[default]
    Queen,
    /// A shared edge (two or more shared vertices).
    Rook,
}

impl ContiguityRule {
    const fn min_shared_vertices(self) -> usize {
        match self {
            Self::Queen => 1,
            Self::Rook => 2,
        }
    }
}

/// Neighbour lists: for each cell, the sorted indices of its neighbours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Neighbours {
    lists: Vec<Vec<usize>>,
}

impl Neighbours {
    /// Derives contiguity neighbours from cell geometry.
    ///
    /// Candidate pairs come from an envelope search widened by `snap`, so
    /// the cost grows with the number of touching cells rather than the
    /// square of the cell count. The result is symmetric.
    #[must_use]
    pub fn from_cells(cells: &[PolygonCell], rule: ContiguityRule, snap: f64) -> Self {
        let index = CellIndex::new(cells);
        let vertices: Vec<Vec<Coord<f64>>> = cells.iter().map(distinct_vertices).collect();

        let mut lists = vec![Vec::new(); cells.len()];
        for (i, cell) in cells.iter().enumerate() {
            let search = expand_envelope(&compute_envelope(&cell.geometry), snap);
            for j in index.candidates(&search) {
                if j <= i {
                    continue;
                }
                if shared_vertex_count(&vertices[i], &vertices[j], snap)
                    >= rule.min_shared_vertices()
                {
                    lists[i].push(j);
                    lists[j].push(i);
                }
            }
        }

        for list in &mut lists {
            list.sort_unstable();
        }

        let neighbours = Self { lists };
        log::debug!(
            "{rule} contiguity: {} cells, {} links, {} islands",
            neighbours.len(),
            neighbours.links(),
            neighbours.islands().len()
        );
        neighbours
    }

    /// Builds neighbour lists from explicit indices. Lists are sorted and
    /// deduplicated; symmetry is not required.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::NeighbourOutOfRange`] for an index past the
    /// last cell and [`SpatialError::SelfNeighbour`] for a cell listing
    /// itself.
    pub fn from_lists(lists: Vec<Vec<usize>>) -> Result<Self, SpatialError> {
        let n = lists.len();
        let mut lists = lists;

        for (cell, list) in lists.iter_mut().enumerate() {
            if let Some(&neighbour) = list.iter().find(|&&j| j >= n) {
                return Err(SpatialError::NeighbourOutOfRange {
                    cell,
                    neighbour,
                    cells: n,
                });
            }
            if list.contains(&cell) {
                return Err(SpatialError::SelfNeighbour { cell });
            }
            list.sort_unstable();
            list.dedup();
        }

        Ok(Self { lists })
    }

    /// Number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lists.len()
    }

    /// Whether there are no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    /// Sorted neighbour indices of cell `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of range.
    #[must_use]
    pub fn of(&self, i: usize) -> &[usize] {
        &self.lists[i]
    }

    /// Neighbour lists for every cell, in cell order.
    pub fn iter(&self) -> impl Iterator<Item = &[usize]> {
        self.lists.iter().map(Vec::as_slice)
    }

    /// Total number of directed links.
    #[must_use]
    pub fn links(&self) -> usize {
        self.lists.iter().map(Vec::len).sum()
    }

    /// Cells with no neighbours.
    #[must_use]
    pub fn islands(&self) -> Vec<usize> {
        self.lists
            .iter()
            .enumerate()
            .filter(|(_, list)| list.is_empty())
            .map(|(i, _)| i)
            .collect()
    }

    /// Whether every link `i -> j` has a matching `j -> i`.
    #[must_use]
    pub fn is_symmetric(&self) -> bool {
        self.lists.iter().enumerate().all(|(i, list)| {
            list.iter()
                .all(|&j| self.lists[j].binary_search(&i).is_ok())
        })
    }
}

/// Ring vertices of a cell without the closing repeats or duplicates.
fn distinct_vertices(cell: &PolygonCell) -> Vec<Coord<f64>> {
    let mut seen = BTreeSet::new();
    cell.geometry
        .coords_iter()
        .filter(|c| seen.insert((c.x.to_bits(), c.y.to_bits())))
        .collect()
}

/// Number of vertices of `a` lying within `snap` of some vertex of `b`.
fn shared_vertex_count(a: &[Coord<f64>], b: &[Coord<f64>], snap: f64) -> usize {
    a.iter()
        .filter(|p| {
            b.iter()
                .any(|q| (p.x - q.x).abs() <= snap && (p.y - q.y).abs() <= snap)
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::tests::{square, square_grid};

    #[test]
    fn queen_grid_degrees() {
        let nb = Neighbours::from_cells(&square_grid(3, 3), ContiguityRule::Queen, DEFAULT_SNAP);
        let degrees: Vec<usize> = nb.iter().map(<[usize]>::len).collect();
        assert_eq!(degrees, [3, 5, 3, 5, 8, 5, 3, 5, 3]);
        assert_eq!(nb.of(0), [1, 3, 4]);
        assert_eq!(nb.of(4), [0, 1, 2, 3, 5, 6, 7, 8]);
        assert!(nb.is_symmetric());
        assert_eq!(nb.links(), 40);
    }

    #[test]
    fn rook_ignores_corner_contact() {
        let nb = Neighbours::from_cells(&square_grid(3, 3), ContiguityRule::Rook, DEFAULT_SNAP);
        let degrees: Vec<usize> = nb.iter().map(<[usize]>::len).collect();
        assert_eq!(degrees, [2, 3, 2, 3, 4, 3, 2, 3, 2]);
        assert_eq!(nb.of(4), [1, 3, 5, 7]);
    }

    #[test]
    fn detached_cell_is_an_island() {
        let mut cells = square_grid(2, 1);
        cells.push(square("far", 10.0, 10.0));
        let nb = Neighbours::from_cells(&cells, ContiguityRule::Queen, DEFAULT_SNAP);
        assert_eq!(nb.islands(), [2]);
        assert_eq!(nb.of(0), [1]);
    }

    #[test]
    fn snap_closes_small_gaps() {
        let cells = vec![square("a", 0.0, 0.0), square("b", 1.0 + 1e-9, 0.0)];
        let strict = Neighbours::from_cells(&cells, ContiguityRule::Rook, 0.0);
        let snapped = Neighbours::from_cells(&cells, ContiguityRule::Rook, DEFAULT_SNAP);
        assert_eq!(strict.links(), 0);
        assert_eq!(snapped.links(), 2);
    }

    #[test]
    fn explicit_lists_are_validated() {
        assert!(matches!(
            Neighbours::from_lists(vec![vec![1], vec![5]]),
            Err(SpatialError::NeighbourOutOfRange { cell: 1, neighbour: 5, cells: 2 })
        ));
        assert!(matches!(
            Neighbours::from_lists(vec![vec![0]]),
            Err(SpatialError::SelfNeighbour { cell: 0 })
        ));

        let nb = Neighbours::from_lists(vec![vec![2, 1, 1], vec![0], vec![0]]).unwrap();
        assert_eq!(nb.of(0), [1, 2]);
        assert!(nb.is_symmetric());
        assert!(!Neighbours::from_lists(vec![vec![1], vec![]]).unwrap().is_symmetric());
    }

    #[test]
    fn rule_parses_from_config_strings() {
        assert_eq!("queen".parse::<ContiguityRule>().unwrap(), ContiguityRule::Queen);
        assert_eq!("Rook".parse::<ContiguityRule>().unwrap(), ContiguityRule::Rook);
        assert_eq!(ContiguityRule::Rook.to_string(), "rook");
    }
}
