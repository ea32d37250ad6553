// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Range queries over elements laid out top to bottom.

use alloc::vec::Vec;

#[cfg(not(feature = "std"))]
use kurbo::common::FloatFuncs as _;
use kurbo::Rect;

use crate::location::ElementLocation;

bitflags::bitflags! {
    /// Element kinds selected by [`ModelState::elements_in_rect`](crate::ModelState::elements_in_rect).
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ElementKinds: u8 {
        /// Items.
        const ITEMS       = 0b0000_0001;
        /// Section headers.
        const HEADERS     = 0b0000_0010;
        /// Section footers.
        const FOOTERS     = 0b0000_0100;
        /// Section backgrounds.
        const BACKGROUNDS = 0b0000_1000;
    }
}

/// The kind of a laid-out element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// An item.
    Item,
    /// A section header.
    Header,
    /// A section footer.
    Footer,
    /// A section background.
    Background,
}

/// Locations and frames produced by a range query, in layout order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ElementLocationFramePairs {
    pairs: Vec<(ElementLocation, Rect)>,
}

impl ElementLocationFramePairs {
    /// Creates an empty sequence.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty sequence with room for `capacity` pairs.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pairs: Vec::with_capacity(capacity),
        }
    }

    /// Appends a pair.
    pub fn push(&mut self, location: ElementLocation, frame: Rect) {
        self.pairs.push((location, frame));
    }

    /// Number of pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Returns `true` if there are no pairs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Iterates over the pairs.
    pub fn iter(&self) -> core::slice::Iter<'_, (ElementLocation, Rect)> {
        self.pairs.iter()
    }

    /// The pairs as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[(ElementLocation, Rect)] {
        &self.pairs
    }

    /// Iterates over the locations only.
    pub fn locations(&self) -> impl Iterator<Item = ElementLocation> + '_ {
        self.pairs.iter().map(|&(location, _)| location)
    }
}

impl IntoIterator for ElementLocationFramePairs {
    type Item = (ElementLocation, Rect);
    type IntoIter = alloc::vec::IntoIter<(ElementLocation, Rect)>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.into_iter()
    }
}

impl<'a> IntoIterator for &'a ElementLocationFramePairs {
    type Item = &'a (ElementLocation, Rect);
    type IntoIter = core::slice::Iter<'a, (ElementLocation, Rect)>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.iter()
    }
}

/// Strict intersection: rectangles that only share an edge do not intersect.
pub(crate) fn intersects(a: Rect, b: Rect) -> bool {
    a.x0 < b.x1 && b.x0 < a.x1 && a.y0 < b.y1 && b.y0 < a.y1
}

/// Collects every element among `0..len` whose frame intersects `rect`.
///
/// `frame_at` must produce frames whose `y0` never decreases with the index.
/// Elements sharing a row share `y0` but may differ in height, so an element
/// that ends above `rect` does not rule out earlier row-mates. The backward
/// scan therefore keeps going until it reaches an element that starts above
/// the first rejected one, which places it in an earlier row.
pub(crate) fn collect_in_rect(
    len: usize,
    rect: Rect,
    mut frame_at: impl FnMut(usize) -> (ElementLocation, Rect),
) -> ElementLocationFramePairs {
    if len == 0 {
        return ElementLocationFramePairs::new();
    }

    let mut lo = 0;
    let mut hi = len;
    let mut found_height = None;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let (_, frame) = frame_at(mid);
        if frame.y0 >= rect.y1 {
            hi = mid;
        } else if frame.y1 > rect.y0 {
            lo = mid;
            found_height = Some(frame.height());
            break;
        } else {
            lo = mid + 1;
        }
    }
    let split = lo;

    let capacity = found_height
        .filter(|height| *height > 0.0)
        .map_or(0, |height| {
            #[allow(
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss,
                reason = "A capacity hint; saturating float casts are fine."
            )]
            let rows = (rect.height() / height).ceil() as usize;
            rows.saturating_add(1).min(len)
        });
    let mut result = ElementLocationFramePairs::with_capacity(capacity);

    let mut min_rejected_y: Option<f64> = None;
    for index in (0..split).rev() {
        let (location, frame) = frame_at(index);
        if frame.y1 <= rect.y0 {
            match min_rejected_y {
                Some(min_y) if frame.y0 < min_y => break,
                _ => {
                    min_rejected_y = Some(min_rejected_y.map_or(frame.y0, |y| y.min(frame.y0)));
                }
            }
            continue;
        }
        if intersects(frame, rect) {
            result.push(location, frame);
        }
    }
    result.pairs.reverse();

    for index in split..len {
        let (location, frame) = frame_at(index);
        if frame.y0 >= rect.y1 {
            break;
        }
        if intersects(frame, rect) {
            result.push(location, frame);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::{ElementLocationFramePairs, collect_in_rect, intersects};
    use crate::location::ElementLocation;
    use alloc::vec::Vec;
    use kurbo::Rect;
    use proptest::prelude::*;

    fn locations(pairs: &ElementLocationFramePairs) -> Vec<usize> {
        pairs.locations().map(|location| location.element).collect()
    }

    fn query(frames: &[Rect], rect: Rect) -> ElementLocationFramePairs {
        collect_in_rect(frames.len(), rect, |index| {
            (ElementLocation::new(0, index), frames[index])
        })
    }

    #[test]
    fn shared_edges_do_not_intersect() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(!intersects(a, Rect::new(10.0, 0.0, 20.0, 10.0)));
        assert!(!intersects(a, Rect::new(0.0, 10.0, 10.0, 20.0)));
        assert!(intersects(a, Rect::new(9.0, 9.0, 20.0, 20.0)));
    }

    #[test]
    fn stacked_rows() {
        let frames: Vec<Rect> = (0..10)
            .map(|row| Rect::new(0.0, row as f64 * 10.0, 100.0, row as f64 * 10.0 + 10.0))
            .collect();
        let pairs = query(&frames, Rect::new(0.0, 25.0, 100.0, 45.0));
        assert_eq!(locations(&pairs), [2, 3, 4]);
        assert!(query(&frames, Rect::new(0.0, 200.0, 100.0, 300.0)).is_empty());
        assert!(query(&frames, Rect::new(0.0, 20.0, 100.0, 20.0)).is_empty());
    }

    #[test]
    fn backward_scan_keeps_tall_row_mates() {
        // One row: a tall item followed by two short ones, then a full row.
        let frames = [
            Rect::new(0.0, 0.0, 30.0, 50.0),
            Rect::new(30.0, 0.0, 60.0, 10.0),
            Rect::new(60.0, 0.0, 90.0, 10.0),
            Rect::new(0.0, 50.0, 90.0, 60.0),
        ];
        let pairs = query(&frames, Rect::new(0.0, 20.0, 90.0, 55.0));
        assert_eq!(locations(&pairs), [0, 3]);
    }

    #[test]
    fn horizontal_misses_inside_the_vertical_span_are_skipped() {
        let frames = [
            Rect::new(0.0, 0.0, 50.0, 10.0),
            Rect::new(50.0, 0.0, 100.0, 10.0),
            Rect::new(0.0, 10.0, 50.0, 20.0),
            Rect::new(50.0, 10.0, 100.0, 20.0),
        ];
        let pairs = query(&frames, Rect::new(60.0, 5.0, 70.0, 15.0));
        assert_eq!(locations(&pairs), [1, 3]);
    }

    #[derive(Clone, Debug)]
    struct RowSpec {
        heights: Vec<u32>,
        gap: u32,
    }

    fn arb_rows() -> impl Strategy<Value = Vec<RowSpec>> {
        prop::collection::vec(
            (prop::collection::vec(0_u32..40, 1..5), 0_u32..6)
                .prop_map(|(heights, gap)| RowSpec { heights, gap }),
            0..60,
        )
    }

    fn lay_out(rows: &[RowSpec]) -> Vec<Rect> {
        let mut frames = Vec::new();
        let mut y = 0.0;
        for row in rows {
            let columns = row.heights.len() as f64;
            let width = 120.0 / columns;
            let mut tallest = 0.0_f64;
            for (column, &height) in row.heights.iter().enumerate() {
                let height = f64::from(height);
                let x = column as f64 * width;
                frames.push(Rect::new(x, y, x + width, y + height));
                tallest = tallest.max(height);
            }
            y += tallest + f64::from(row.gap);
        }
        frames
    }

    proptest! {
        #[test]
        fn matches_a_brute_force_filter(
            rows in arb_rows(),
            x in 0_u32..120,
            y in 0_u32..1500,
            width in 1_u32..120,
            height in 0_u32..200,
        ) {
            let frames = lay_out(&rows);
            let rect = Rect::new(
                f64::from(x),
                f64::from(y),
                f64::from(x + width),
                f64::from(y + height),
            );
            let expected: Vec<usize> = frames
                .iter()
                .enumerate()
                .filter(|&(_, frame)| intersects(*frame, rect))
                .map(|(index, _)| index)
                .collect();
            prop_assert_eq!(locations(&query(&frames, rect)), expected);
        }
    }
}
