//! Coordinates and cell writes.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// A grid coordinate, or a neighborhood offset `(dx, dy)`.
///
/// Points order by row first, `(y, x)` ascending, which is the order the
/// dirty set hands candidates back in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Point { x, y }
    }

    pub fn is_origin(&self) -> bool {
        self.x == 0 && self.y == 0
    }

    /// `self + offset`, wrapped onto a `width` x `height` torus.
    #[inline]
    pub fn offset_wrapped(self, offset: Point, width: i32, height: i32) -> Point {
        Point {
            x: wrap_i64(self.x as i64 + offset.x as i64, width),
            y: wrap_i64(self.y as i64 + offset.y as i64, height),
        }
    }

    #[inline]
    pub fn wrapped(self, width: i32, height: i32) -> Point {
        Point {
            x: wrap(self.x, width),
            y: wrap(self.y, height),
        }
    }
}

impl Ord for Point {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.y, self.x).cmp(&(other.y, other.x))
    }
}

impl PartialOrd for Point {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Point { x, y }
    }
}

/// A single state write. `#[repr(C)]` so frames can be copied straight into
/// a caller's buffer across the C ABI.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
    pub state: u32,
}

impl Cell {
    pub const fn new(x: i32, y: i32, state: u32) -> Self {
        Cell { x, y, state }
    }

    pub fn at(point: Point, state: u32) -> Self {
        Cell {
            x: point.x,
            y: point.y,
            state,
        }
    }

    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn wrapped(self, width: i32, height: i32) -> Cell {
        Cell::at(self.point().wrapped(width, height), self.state)
    }
}

/// Resolve `n` onto `[0, size)` with wraparound. `size` must be positive.
#[inline]
pub fn wrap(n: i32, size: i32) -> i32 {
    n.rem_euclid(size)
}

/// Same as [`wrap`] for a wider intermediate, used when adding offsets.
#[inline]
pub fn wrap_i64(n: i64, size: i32) -> i32 {
    n.rem_euclid(size as i64) as i32
}
