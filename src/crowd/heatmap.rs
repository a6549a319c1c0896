use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Occupancy counts of person centroids over a `rows x cols` grid of the frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DensityGrid {
    pub cells: Array2<u32>,
}

impl DensityGrid {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            cells: Array2::zeros((rows.max(1), cols.max(1))),
        }
    }

    /// Count normalized centroids into the grid. Points outside `[0, 1]` are ignored.
    pub fn from_centroids(centroids: impl IntoIterator<Item = (f32, f32)>, rows: usize, cols: usize) -> Self {
        let mut grid = Self::new(rows, cols);
        for (x, y) in centroids {
            grid.add(x, y);
        }
        grid
    }

    pub fn add(&mut self, x: f32, y: f32) {
        if !(0.0..=1.0).contains(&x) || !(0.0..=1.0).contains(&y) {
            return;
        }
        let (rows, cols) = self.cells.dim();
        let col = ((x * cols as f32) as usize).min(cols - 1);
        let row = ((y * rows as f32) as usize).min(rows - 1);
        self.cells[[row, col]] += 1;
    }

    pub fn total(&self) -> u32 {
        self.cells.sum()
    }

    /// `(row, col, count)` of the busiest cell, first in row-major order on ties.
    pub fn hottest(&self) -> Option<(usize, usize, u32)> {
        self.cells
            .indexed_iter()
            .filter(|(_, count)| **count > 0)
            .fold(None, |best: Option<(usize, usize, u32)>, ((r, c), &count)| match best {
                Some((_, _, b)) if b >= count => best,
                _ => Some((r, c, count)),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_land_in_cells() {
        let grid = DensityGrid::from_centroids([(0.05, 0.05), (0.06, 0.02), (0.95, 0.55), (1.0, 1.0)], 10, 10);
        assert_eq!(grid.cells[[0, 0]], 2);
        assert_eq!(grid.cells[[5, 9]], 1);
        assert_eq!(grid.cells[[9, 9]], 1);
        assert_eq!(grid.total(), 4);
        assert_eq!(grid.hottest(), Some((0, 0, 2)));
    }

    #[test]
    fn test_out_of_frame_ignored() {
        let grid = DensityGrid::from_centroids([(-0.1, 0.5), (0.5, 1.2)], 4, 4);
        assert_eq!(grid.total(), 0);
        assert_eq!(grid.hottest(), None);
    }
}
