// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Deferred per-row vertical offsets.

use alloc::{vec, vec::Vec};

/// Accumulates vertical offsets that apply to every row at or after a given row.
///
/// A section uses this after a self-sizing measurement changes the height of a
/// single row: instead of moving every later row immediately, it records the
/// delta once and reads the accumulated offset back when a frame is requested.
///
/// Both [`add_offset`](Self::add_offset) and [`offset_for_row`](Self::offset_for_row)
/// run in `O(log n)`. Storage is a flat tree of `2 * row_count` slots with the
/// rows stored as leaves in `row_count..2 * row_count`; a range update marks the
/// `O(log n)` nodes that cover it and a point query sums the path from a leaf to
/// the root.
///
/// The tracker has a fixed row count. Owners build a new tracker whenever the
/// number of rows changes, and discard it once its offsets have been folded back
/// into model coordinates.
#[derive(Clone, Debug, Default)]
pub struct RowOffsetTracker {
    row_count: usize,
    nodes: Vec<f64>,
    has_offsets: bool,
}

impl RowOffsetTracker {
    /// Creates a tracker for `row_count` rows, all with an offset of `0.0`.
    #[must_use]
    pub fn new(row_count: usize) -> Self {
        Self {
            row_count,
            nodes: vec![0.0; 2 * row_count],
            has_offsets: false,
        }
    }

    /// Returns the number of rows this tracker covers.
    #[must_use]
    pub const fn row_count(&self) -> usize {
        self.row_count
    }

    /// Returns `true` if any non-zero offset has been recorded.
    #[must_use]
    pub const fn has_offsets(&self) -> bool {
        self.has_offsets
    }

    /// Adds `delta` to the offset of every row at or after `starting_at_row`.
    ///
    /// A start row at or past [`row_count`](Self::row_count) affects no rows and
    /// is a no-op.
    pub fn add_offset(&mut self, delta: f64, starting_at_row: usize) {
        debug_assert!(
            delta.is_finite(),
            "RowOffsetTracker offsets must be finite; got {delta:?}"
        );
        if starting_at_row >= self.row_count || delta == 0.0 {
            return;
        }
        self.has_offsets = true;

        let mut lo = starting_at_row + self.row_count;
        let mut hi = 2 * self.row_count;
        while lo < hi {
            if lo & 1 == 1 {
                self.nodes[lo] += delta;
                lo += 1;
            }
            if hi & 1 == 1 {
                hi -= 1;
                self.nodes[hi] += delta;
            }
            lo >>= 1;
            hi >>= 1;
        }
    }

    /// Returns the total offset accumulated for `row`.
    ///
    /// Panics if `row` is out of range.
    #[must_use]
    pub fn offset_for_row(&self, row: usize) -> f64 {
        assert!(
            row < self.row_count,
            "row {row} out of range for RowOffsetTracker with {} rows",
            self.row_count
        );
        if !self.has_offsets {
            return 0.0;
        }
        let mut node = row + self.row_count;
        let mut total = 0.0;
        while node > 0 {
            total += self.nodes[node];
            node >>= 1;
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::RowOffsetTracker;
    use alloc::{vec, vec::Vec};
    use proptest::prelude::*;

    #[test]
    fn offsets_cascade_to_later_rows() {
        let mut tracker = RowOffsetTracker::new(5);
        tracker.add_offset(10.0, 2);
        tracker.add_offset(-3.0, 4);

        let offsets: Vec<f64> = (0..5).map(|row| tracker.offset_for_row(row)).collect();
        assert_eq!(offsets, vec![0.0, 0.0, 10.0, 10.0, 7.0]);
    }

    #[test]
    fn start_row_past_end_is_a_no_op() {
        let mut tracker = RowOffsetTracker::new(3);
        tracker.add_offset(5.0, 3);
        tracker.add_offset(5.0, 100);
        assert!(!tracker.has_offsets());
        assert_eq!(tracker.offset_for_row(2), 0.0);
    }

    #[test]
    fn single_row_and_empty_trackers() {
        let mut tracker = RowOffsetTracker::new(1);
        tracker.add_offset(4.0, 0);
        assert_eq!(tracker.offset_for_row(0), 4.0);

        let mut empty = RowOffsetTracker::new(0);
        empty.add_offset(4.0, 0);
        assert_eq!(empty.row_count(), 0);
        assert!(!empty.has_offsets());
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn reading_past_the_last_row_panics() {
        let tracker = RowOffsetTracker::new(2);
        let _ = tracker.offset_for_row(2);
    }

    fn naive_offsets(row_count: usize, ops: &[(i32, usize)]) -> Vec<f64> {
        let mut offsets = vec![0.0; row_count];
        for &(delta, start) in ops {
            for offset in offsets.iter_mut().skip(start) {
                *offset += f64::from(delta);
            }
        }
        offsets
    }

    proptest! {
        #[test]
        fn matches_naive_reference(
            row_count in 1_usize..1000,
            raw_ops in prop::collection::vec((-500_i32..500, 0_usize..1100), 0..64),
        ) {
            let mut tracker = RowOffsetTracker::new(row_count);
            for &(delta, start) in &raw_ops {
                tracker.add_offset(f64::from(delta), start);
            }
            let expected = naive_offsets(row_count, &raw_ops);
            for (row, expected) in expected.iter().enumerate() {
                prop_assert_eq!(tracker.offset_for_row(row), *expected);
            }
        }
    }
}
