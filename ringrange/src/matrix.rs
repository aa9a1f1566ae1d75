//! Distance row and connectivity matrix storage.
//!
//! Each node owns one row of the matrix: the distances it measured as
//! initiator. The row is staged in [`MatrixStore::record_distance`] and
//! copied into the matrix by [`MatrixStore::commit_row`]. The rest of the
//! matrix only changes when a hand-off delivers a newer snapshot, which
//! replaces the local copy wholesale.

use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use crate::types::{NodeId, DEFAULT_DISTANCE};

/// Matrix storage errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatrixError {
    /// Snapshot does not have the local ring size.
    DimensionMismatch { expected: usize, actual: usize },
}

impl fmt::Display for MatrixError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatrixError::DimensionMismatch { expected, actual } => {
                write!(f, "matrix dimension {} does not match ring size {}", actual, expected)
            }
        }
    }
}

/// N×N distances in metres, row-major.
///
/// Row `i` holds node `i`'s view. Symmetry is not enforced.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectivityMatrix {
    n: usize,
    cells: Vec<f64>,
}

impl ConnectivityMatrix {
    /// Matrix of the given size with every cell at the default distance.
    pub fn new(n: usize) -> Self {
        Self {
            n,
            cells: vec![DEFAULT_DISTANCE; n * n],
        }
    }

    /// Build from row-major cells. Returns `None` unless `cells.len() == n²`.
    pub fn from_cells(n: usize, cells: Vec<f64>) -> Option<Self> {
        if cells.len() != n * n {
            return None;
        }
        Some(Self { n, cells })
    }

    /// Number of nodes (rows and columns).
    pub fn dimension(&self) -> usize {
        self.n
    }

    /// Distance from node `i` to node `j`, if both are in range.
    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        if i >= self.n || j >= self.n {
            return None;
        }
        Some(self.cells[i * self.n + j])
    }

    /// Row `i`, if in range.
    pub fn row(&self, i: usize) -> Option<&[f64]> {
        if i >= self.n {
            return None;
        }
        Some(&self.cells[i * self.n..(i + 1) * self.n])
    }

    /// True if row `i` was never committed (all cells default).
    pub fn is_row_default(&self, i: usize) -> bool {
        self.row(i)
            .map(|row| row.iter().all(|&d| d == DEFAULT_DISTANCE))
            .unwrap_or(true)
    }

    /// All cells, row-major.
    pub fn cells(&self) -> &[f64] {
        &self.cells
    }

    fn set_row(&mut self, i: usize, row: &[f64]) {
        let n = self.n;
        if i < n && row.len() == n {
            self.cells[i * n..(i + 1) * n].copy_from_slice(row);
        }
    }
}

impl fmt::Display for ConnectivityMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.cells.chunks(self.n.max(1)) {
            for (j, d) in row.iter().enumerate() {
                if j > 0 {
                    f.write_str("  ")?;
                }
                write!(f, "{:7.3} M", d)?;
            }
            f.write_str("\n")?;
        }
        Ok(())
    }
}

/// A node's own distance row plus its copy of the shared matrix.
#[derive(Clone, Debug)]
pub struct MatrixStore {
    owner: NodeId,
    row: Vec<f64>,
    matrix: ConnectivityMatrix,
}

impl MatrixStore {
    /// Empty store for node `owner` in an `n`-node ring.
    pub fn new(owner: NodeId, n: usize) -> Self {
        Self {
            owner,
            row: vec![DEFAULT_DISTANCE; n],
            matrix: ConnectivityMatrix::new(n),
        }
    }

    pub fn owner(&self) -> NodeId {
        self.owner
    }

    /// Staged distances, not yet committed.
    pub fn row(&self) -> &[f64] {
        &self.row
    }

    pub fn matrix(&self) -> &ConnectivityMatrix {
        &self.matrix
    }

    /// Stage a distance to `target`. Out-of-range targets are ignored.
    pub fn record_distance(&mut self, target: NodeId, distance: f64) {
        if let Some(slot) = self.row.get_mut(target as usize) {
            *slot = distance;
        }
    }

    /// Copy the staged row into the owner's row of the matrix.
    pub fn commit_row(&mut self) {
        self.matrix.set_row(self.owner as usize, &self.row);
    }

    /// Replace the whole matrix with a received snapshot.
    ///
    /// The staged row is left alone; the owner's matrix row is taken from
    /// the snapshot until the next commit.
    pub fn adopt(&mut self, snapshot: ConnectivityMatrix) -> Result<(), MatrixError> {
        if snapshot.dimension() != self.matrix.dimension() {
            return Err(MatrixError::DimensionMismatch {
                expected: self.matrix.dimension(),
                actual: snapshot.dimension(),
            });
        }
        self.matrix = snapshot;
        Ok(())
    }

    /// Copy of the matrix for transmission.
    pub fn snapshot(&self) -> ConnectivityMatrix {
        self.matrix.clone()
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::ToString;

    use super::*;

    #[test]
    fn test_new_store_is_default() {
        let store = MatrixStore::new(1, 3);
        assert_eq!(store.row(), &[0.0, 0.0, 0.0]);
        for i in 0..3 {
            assert!(store.matrix().is_row_default(i));
        }
    }

    #[test]
    fn test_commit_row_reproduces_row() {
        let mut store = MatrixStore::new(1, 3);
        store.record_distance(0, 2.5);
        store.record_distance(2, 7.25);
        // Staged only.
        assert!(store.matrix().is_row_default(1));

        store.commit_row();
        let snap = store.snapshot();
        assert_eq!(snap.row(1), Some(&[2.5, 0.0, 7.25][..]));
        assert!(snap.is_row_default(0));
        assert!(snap.is_row_default(2));
    }

    #[test]
    fn test_record_out_of_range_ignored() {
        let mut store = MatrixStore::new(0, 2);
        store.record_distance(5, 1.0);
        assert_eq!(store.row(), &[0.0, 0.0]);
    }

    #[test]
    fn test_adopt_is_bit_identical() {
        let cells = alloc::vec![0.0, 1.0 / 3.0, -0.125, f64::MIN_POSITIVE];
        let snapshot = ConnectivityMatrix::from_cells(2, cells.clone()).unwrap();
        let mut store = MatrixStore::new(1, 2);
        store.adopt(snapshot).unwrap();

        let got = store.snapshot();
        for (a, b) in got.cells().iter().zip(cells.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_adopt_dimension_mismatch() {
        let mut store = MatrixStore::new(0, 3);
        store.record_distance(1, 4.0);
        store.commit_row();
        let before = store.snapshot();

        let err = store.adopt(ConnectivityMatrix::new(4)).unwrap_err();
        assert_eq!(
            err,
            MatrixError::DimensionMismatch {
                expected: 3,
                actual: 4
            }
        );
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_adopt_keeps_staged_row() {
        let mut store = MatrixStore::new(0, 2);
        store.record_distance(1, 3.0);
        store.adopt(ConnectivityMatrix::new(2)).unwrap();
        assert_eq!(store.row(), &[0.0, 3.0]);
        store.commit_row();
        assert_eq!(store.matrix().get(0, 1), Some(3.0));
    }

    #[test]
    fn test_get_and_row_bounds() {
        let m = ConnectivityMatrix::new(2);
        assert_eq!(m.get(1, 1), Some(0.0));
        assert_eq!(m.get(2, 0), None);
        assert!(m.row(2).is_none());
        assert!(ConnectivityMatrix::from_cells(2, alloc::vec![0.0; 3]).is_none());
    }

    #[test]
    fn test_display() {
        let m = ConnectivityMatrix::from_cells(2, alloc::vec![0.0, 1.5, 12.25, 0.0]).unwrap();
        assert_eq!(
            m.to_string(),
            "  0.000 M    1.500 M\n 12.250 M    0.000 M\n"
        );
    }
}
