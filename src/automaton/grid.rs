//! Toroidal grid storage and read-only views.
//!
//! `GridStore` keeps one `GridSnapshot` behind a single `RwLock`. Readers share
//! the lock; bulk applies, reinitialization and replacement take it exclusively,
//! so a reader sees a cell either before or after an apply and a whole grid
//! either before or after a swap.

use std::sync::{PoisonError, RwLock, RwLockReadGuard};

use serde::{Deserialize, Serialize};

use super::cell::{wrap, Cell, Point};
use crate::error::GridError;

/// A full grid: row-major `cells[y * width + x]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSnapshot {
    pub width: i32,
    pub height: i32,
    pub cells: Vec<u32>,
}

/// Largest grid, in cells, that can be created or loaded.
pub const MAX_CELLS: usize = 1 << 26;

fn check_dimensions(width: i32, height: i32) -> Result<usize, GridError> {
    if width <= 0 || height <= 0 {
        return Err(GridError::InvalidDimensions { width, height });
    }
    match (width as usize).checked_mul(height as usize) {
        Some(cells) if cells <= MAX_CELLS => Ok(cells),
        _ => Err(GridError::TooLarge {
            width,
            height,
            max: MAX_CELLS,
        }),
    }
}

impl GridSnapshot {
    /// A grid with every cell set to `fill`.
    pub fn blank(width: i32, height: i32, fill: u32) -> Result<Self, GridError> {
        let size = check_dimensions(width, height)?;
        let mut cells = Vec::new();
        cells
            .try_reserve_exact(size)
            .map_err(|_| GridError::OutOfMemory { cells: size })?;
        cells.resize(size, fill);
        Ok(GridSnapshot {
            width,
            height,
            cells,
        })
    }

    /// Cell count of a `width` x `height` grid, if it is a valid size.
    pub fn cell_count(width: i32, height: i32) -> Result<usize, GridError> {
        check_dimensions(width, height)
    }

    /// Wrap existing row-major cells, checking the count against the dimensions.
    pub fn from_cells(width: i32, height: i32, cells: Vec<u32>) -> Result<Self, GridError> {
        let expected = check_dimensions(width, height)?;
        if cells.len() != expected {
            return Err(GridError::SizeMismatch {
                width,
                height,
                expected,
                actual: cells.len(),
            });
        }
        Ok(GridSnapshot {
            width,
            height,
            cells,
        })
    }

    /// Build from rows (`rows[y][x]`). Every row must have the same length.
    pub fn from_rows(rows: &[Vec<u32>]) -> Result<Self, GridError> {
        let height = rows.len() as i32;
        let width = rows.first().map_or(0, |row| row.len() as i32);
        let cells: Vec<u32> = rows.iter().flatten().copied().collect();
        GridSnapshot::from_cells(width, height, cells)
    }

    fn validate(&self) -> Result<(), GridError> {
        let expected = check_dimensions(self.width, self.height)?;
        if self.cells.len() != expected {
            return Err(GridError::SizeMismatch {
                width: self.width,
                height: self.height,
                expected,
                actual: self.cells.len(),
            });
        }
        Ok(())
    }

    /// Linear index of a coordinate already inside the grid.
    #[inline]
    pub fn index_of(&self, x: i32, y: i32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// State at `point`, with wraparound.
    #[inline]
    pub fn get(&self, point: Point) -> u32 {
        let x = wrap(point.x, self.width);
        let y = wrap(point.y, self.height);
        self.cells[self.index_of(x, y)]
    }

    /// Write one cell, with wraparound.
    #[inline]
    pub fn set(&mut self, cell: Cell) {
        let x = wrap(cell.x, self.width);
        let y = wrap(cell.y, self.height);
        let idx = self.index_of(x, y);
        self.cells[idx] = cell.state;
    }

    pub fn dimensions(&self) -> (i32, i32) {
        (self.width, self.height)
    }

    /// Every coordinate of the grid in `(y, x)` order.
    pub fn points(&self) -> impl Iterator<Item = Point> + '_ {
        (0..self.height).flat_map(move |y| (0..self.width).map(move |x| Point::new(x, y)))
    }

    pub fn count_state(&self, state: u32) -> usize {
        self.cells.iter().filter(|&&c| c == state).count()
    }
}

/// Read access handed to rule evaluators.
pub trait GridView {
    /// State at `point`, with wraparound.
    fn get(&self, point: Point) -> u32;

    fn dimensions(&self) -> (i32, i32);

    /// Number of cells in the loaded neighborhood of `center` whose state is
    /// `state`. The zero offset is skipped.
    fn count_neighbors_in_state(&self, center: Point, state: u32) -> usize;
}

/// A grid snapshot seen through a neighborhood.
pub struct NeighborhoodView<'a> {
    grid: &'a GridSnapshot,
    neighborhood: &'a [Point],
}

impl<'a> NeighborhoodView<'a> {
    pub fn new(grid: &'a GridSnapshot, neighborhood: &'a [Point]) -> Self {
        NeighborhoodView { grid, neighborhood }
    }
}

impl GridView for NeighborhoodView<'_> {
    #[inline]
    fn get(&self, point: Point) -> u32 {
        self.grid.get(point)
    }

    fn dimensions(&self) -> (i32, i32) {
        self.grid.dimensions()
    }

    fn count_neighbors_in_state(&self, center: Point, state: u32) -> usize {
        count_neighbors(self.grid, self.neighborhood, center, state)
    }
}

/// Count neighbors of `center` in `state` over `neighborhood`, skipping (0, 0).
pub fn count_neighbors(
    grid: &GridSnapshot,
    neighborhood: &[Point],
    center: Point,
    state: u32,
) -> usize {
    neighborhood
        .iter()
        .filter(|offset| !offset.is_origin())
        .filter(|&&offset| {
            let p = center.offset_wrapped(offset, grid.width, grid.height);
            grid.cells[grid.index_of(p.x, p.y)] == state
        })
        .count()
}

#[derive(Debug)]
pub struct GridStore {
    inner: RwLock<GridSnapshot>,
}

impl GridStore {
    pub fn new(width: i32, height: i32, fill: u32) -> Result<Self, GridError> {
        Ok(GridStore {
            inner: RwLock::new(GridSnapshot::blank(width, height, fill)?),
        })
    }

    /// Shared access for a whole evaluation pass.
    pub fn read(&self) -> RwLockReadGuard<'_, GridSnapshot> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, point: Point) -> u32 {
        self.read().get(point)
    }

    pub fn dimensions(&self) -> (i32, i32) {
        self.read().dimensions()
    }

    /// Point-in-time copy of the whole grid.
    pub fn snapshot(&self) -> GridSnapshot {
        self.read().clone()
    }

    /// Apply `changes` in order, last writer wins. All writes land or none do.
    pub fn apply_batch(&self, changes: &[Cell]) -> Result<usize, GridError> {
        let mut grid = self
            .inner
            .write()
            .map_err(|_| GridError::Poisoned(changes.len()))?;
        for &cell in changes {
            grid.set(cell);
        }
        Ok(changes.len())
    }

    /// Swap in a blank `width` x `height` grid filled with `fill`.
    pub fn reinitialize(&self, width: i32, height: i32, fill: u32) -> Result<(), GridError> {
        let fresh = GridSnapshot::blank(width, height, fill)?;
        self.swap(fresh);
        Ok(())
    }

    /// Swap in `snapshot` as the new grid.
    pub fn replace(&self, snapshot: GridSnapshot) -> Result<(), GridError> {
        snapshot.validate()?;
        self.swap(snapshot);
        Ok(())
    }

    fn swap(&self, fresh: GridSnapshot) {
        let mut grid = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *grid = fresh;
        drop(grid);
        // The whole grid was replaced, so an earlier panic no longer matters.
        self.inner.clear_poison();
    }
}
