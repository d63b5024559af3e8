//! Client-side copy of the simulation grid, kept current by applying frames.

use std::sync::Mutex;

use crate::automaton::{Cell, Frame, FrameKind, GridSnapshot, Point};
use crate::sync::lock;

#[derive(Debug)]
struct Mirrored {
    grid: GridSnapshot,
    generation: u64,
}

#[derive(Debug)]
pub struct GridMirror {
    inner: Mutex<Mirrored>,
}

impl GridMirror {
    pub fn new(grid: GridSnapshot, generation: u64) -> Self {
        GridMirror {
            inner: Mutex::new(Mirrored { grid, generation }),
        }
    }

    /// Apply every write in the frame, in order. Step frames also advance the generation.
    pub fn apply_frame(&self, frame: &Frame) {
        let mut mirrored = lock(&self.inner);
        for &cell in frame.cells() {
            mirrored.grid.set(cell);
        }
        if frame.kind() == FrameKind::Step {
            mirrored.generation = frame.generation();
        }
    }

    pub fn set(&self, cell: Cell) {
        lock(&self.inner).grid.set(cell);
    }

    pub fn replace(&self, grid: GridSnapshot, generation: u64) {
        *lock(&self.inner) = Mirrored { grid, generation };
    }

    pub fn get(&self, point: Point) -> u32 {
        lock(&self.inner).grid.get(point)
    }

    pub fn snapshot(&self) -> GridSnapshot {
        lock(&self.inner).grid.clone()
    }

    pub fn dimensions(&self) -> (i32, i32) {
        lock(&self.inner).grid.dimensions()
    }

    pub fn generation(&self) -> u64 {
        lock(&self.inner).generation
    }
}
