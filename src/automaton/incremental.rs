//! Dirty-cell tracking for incremental stepping.
//!
//! A write at `c` can only change the next state of cells whose neighborhood
//! contains `c`, i.e. `c + r` for every `r` in the reverse neighborhood. Those
//! cells are marked as the write is submitted. Marks stay "open" until the
//! generation boundary seals them (together with the pending-buffer swap), and
//! only sealed marks are handed to the next step. So a mark always refers to a
//! write that has already been applied when its candidates are evaluated.

use std::collections::BTreeSet;
use std::mem;
use std::sync::Mutex;

use super::cell::{Cell, Point};
use crate::sync::lock;

#[derive(Debug, Default)]
struct DirtySets {
    open: BTreeSet<Point>,
    sealed: BTreeSet<Point>,
}

#[derive(Debug, Default)]
pub struct DirtySetTracker {
    sets: Mutex<DirtySets>,
}

impl DirtySetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark every cell affected by a write at `cell`.
    pub fn mark_dirty(&self, cell: Point, reverse_neighborhood: &[Point], width: i32, height: i32) {
        let mut sets = lock(&self.sets);
        for &offset in reverse_neighborhood {
            sets.open.insert(cell.offset_wrapped(offset, width, height));
        }
    }

    /// Mark for a batch of writes under one lock acquisition.
    pub fn mark_writes(
        &self,
        writes: &[Cell],
        reverse_neighborhood: &[Point],
        width: i32,
        height: i32,
    ) {
        if reverse_neighborhood.is_empty() {
            return;
        }
        let mut sets = lock(&self.sets);
        for write in writes {
            let at = write.point();
            for &offset in reverse_neighborhood {
                sets.open.insert(at.offset_wrapped(offset, width, height));
            }
        }
    }

    /// Generation boundary: everything marked so far becomes next generation's set.
    pub fn seal(&self) {
        let mut sets = lock(&self.sets);
        let open = mem::take(&mut sets.open);
        if sets.sealed.is_empty() {
            sets.sealed = open;
        } else {
            sets.sealed.extend(open);
        }
    }

    /// Snapshot and clear the sealed set, in `(y, x)` order.
    pub fn drain_for_next_generation(&self) -> Vec<Point> {
        let sealed = mem::take(&mut lock(&self.sets).sealed);
        sealed.into_iter().collect()
    }

    pub fn clear(&self) {
        let mut sets = lock(&self.sets);
        sets.open.clear();
        sets.sealed.clear();
    }

    /// (open, sealed) sizes.
    pub fn len(&self) -> (usize, usize) {
        let sets = lock(&self.sets);
        (sets.open.len(), sets.sealed.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == (0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn reverse_moore() -> Vec<Point> {
        let mut offsets = Vec::new();
        for dy in (-1..=1).rev() {
            for dx in (-1..=1).rev() {
                offsets.push(Point::new(dx, dy));
            }
        }
        offsets
    }

    #[test]
    fn test_marks_are_deduplicated_and_ordered() {
        let tracker = DirtySetTracker::new();
        let reverse = reverse_moore();
        tracker.mark_dirty(Point::new(2, 2), &reverse, 10, 10);
        tracker.mark_dirty(Point::new(3, 2), &reverse, 10, 10);
        tracker.seal();

        let drained = tracker.drain_for_next_generation();
        assert_eq!(drained.len(), 12); // 3x4 block
        assert!(drained.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(drained.first(), Some(&Point::new(1, 1)));
        assert_eq!(drained.last(), Some(&Point::new(4, 3)));
    }

    #[test]
    fn test_marks_wrap_around_edges() {
        let tracker = DirtySetTracker::new();
        tracker.mark_dirty(Point::new(0, 0), &[Point::new(-1, -1)], 5, 4);
        tracker.seal();
        assert_eq!(tracker.drain_for_next_generation(), vec![Point::new(4, 3)]);
    }

    #[test]
    fn test_open_marks_wait_for_seal() {
        let tracker = DirtySetTracker::new();
        tracker.mark_dirty(Point::new(1, 1), &[Point::new(0, 0)], 4, 4);
        assert!(tracker.drain_for_next_generation().is_empty());
        assert_eq!(tracker.len(), (1, 0));

        tracker.seal();
        assert_eq!(tracker.drain_for_next_generation(), vec![Point::new(1, 1)]);
        assert!(tracker.drain_for_next_generation().is_empty());
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_seal_merges_with_undrained_set() {
        let tracker = DirtySetTracker::new();
        tracker.mark_dirty(Point::new(0, 0), &[Point::new(0, 0)], 4, 4);
        tracker.seal();
        tracker.mark_writes(&[Cell::new(2, 2, 1)], &[Point::new(0, 0)], 4, 4);
        tracker.seal();
        assert_eq!(
            tracker.drain_for_next_generation(),
            vec![Point::new(0, 0), Point::new(2, 2)]
        );
    }

    #[test]
    fn test_clear_drops_everything() {
        let tracker = DirtySetTracker::new();
        tracker.mark_dirty(Point::new(0, 0), &reverse_moore(), 8, 8);
        tracker.seal();
        tracker.mark_dirty(Point::new(4, 4), &reverse_moore(), 8, 8);
        tracker.clear();
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_concurrent_marks_are_not_lost() {
        let tracker = Arc::new(DirtySetTracker::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let tracker = Arc::clone(&tracker);
                thread::spawn(move || {
                    for x in 0..50 {
                        tracker.mark_dirty(Point::new(x, t), &[Point::new(0, 0)], 50, 4);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        tracker.seal();
        assert_eq!(tracker.drain_for_next_generation().len(), 200);
    }
}
