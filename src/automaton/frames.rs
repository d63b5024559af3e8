//! Completed-generation diffs waiting for a consumer.

use std::collections::VecDeque;
use std::sync::Mutex;

use super::cell::Cell;
use crate::sync::lock;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    /// Writes applied by one simulation step.
    Step,
    /// Writes applied by an explicit `update_grid` outside a step.
    Edit,
}

/// Every write applied in one generation (or one edit batch), in apply order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    kind: FrameKind,
    generation: u64,
    cells: Vec<Cell>,
}

impl Frame {
    pub fn new(kind: FrameKind, generation: u64, cells: Vec<Cell>) -> Self {
        Frame {
            kind,
            generation,
            cells,
        }
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    /// For a step frame, the generation the step produced; for an edit frame,
    /// the generation the edit was applied in.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn into_cells(self) -> Vec<Cell> {
        self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Unbounded FIFO of frames. Push never blocks; reads are non-blocking polls.
#[derive(Debug, Default)]
pub struct FrameQueue {
    frames: Mutex<VecDeque<Frame>>,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, frame: Frame) {
        lock(&self.frames).push_back(frame);
    }

    pub fn try_pop(&self) -> Option<Frame> {
        lock(&self.frames).pop_front()
    }

    /// Pop the oldest frame only if `accept` agrees, atomically.
    pub fn try_pop_if(&self, accept: impl FnOnce(&Frame) -> bool) -> Option<Frame> {
        let mut frames = lock(&self.frames);
        match frames.front() {
            Some(front) if accept(front) => frames.pop_front(),
            _ => None,
        }
    }

    /// Cell count of the oldest frame, if any.
    pub fn front_len(&self) -> Option<usize> {
        lock(&self.frames).front().map(Frame::len)
    }

    pub fn len(&self) -> usize {
        lock(&self.frames).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.frames).is_empty()
    }

    pub fn clear(&self) {
        lock(&self.frames).clear();
    }
}
