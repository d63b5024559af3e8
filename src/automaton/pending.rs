//! Writes proposed during the current generation, not yet applied.

use std::mem;
use std::sync::Mutex;

use super::cell::Cell;
use crate::sync::lock;

#[derive(Debug, Default)]
pub struct PendingChangeBuffer {
    writes: Mutex<Vec<Cell>>,
}

impl PendingChangeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, cell: Cell) {
        lock(&self.writes).push(cell);
    }

    /// Append a batch, keeping its order.
    pub fn extend(&self, cells: &[Cell]) {
        lock(&self.writes).extend_from_slice(cells);
    }

    /// Take every write in submission order, leaving the buffer empty.
    pub fn take(&self) -> Vec<Cell> {
        mem::take(&mut *lock(&self.writes))
    }

    pub fn clear(&self) {
        lock(&self.writes).clear();
    }

    pub fn len(&self) -> usize {
        lock(&self.writes).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
