// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! One section: row packing, incremental invalidation, and section-local frames.

use alloc::vec::Vec;
use core::iter;
use core::mem;

#[cfg(not(feature = "std"))]
use kurbo::common::FloatFuncs as _;
use kurbo::{Point, Rect, Size};
use smallvec::SmallVec;

use crate::element::{BackgroundModel, FooterModel, HeaderModel, ItemModel, SectionId};
use crate::row_offsets::RowOffsetTracker;
use crate::types::{ItemSizeMode, ItemWidthMode, SectionMetrics};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RowKind {
    Header,
    Items,
    Footer,
}

#[derive(Clone, Debug)]
struct Row {
    kind: RowKind,
    /// Indices of the items in this row. Empty for header and footer rows.
    items: SmallVec<[usize; 4]>,
    /// Top of the row in section space, not including pending offsets.
    y: f64,
    height: f64,
}

impl Row {
    fn max_y(&self) -> f64 {
        self.y + self.height
    }
}

/// A section of items with an optional header, footer, and background.
///
/// Items are packed into rows in order. A full-width item occupies a row on
/// its own; fractional-width items share a row with up to `divisor - 1`
/// following items of the same width mode. A header, when present, is row 0
/// and a footer, when present, is the last row.
///
/// Layout is lazy. Mutations only record the first row whose geometry may be
/// stale; the next query repacks from that row onward and leaves earlier rows
/// untouched. Measured heights reported through
/// [`update_item_height`](Self::update_item_height) and friends do not repack
/// at all when the affected row is clean: the row's new height is resolved in
/// place and the difference is pushed to every later row through a
/// [`RowOffsetTracker`].
///
/// All frames returned here are in section space, with the section's top-left
/// corner at the origin.
///
/// Indices passed to this type must be in range; violating that panics.
#[derive(Clone, Debug)]
pub struct SectionModel {
    id: SectionId,
    items: Vec<ItemModel>,
    header: Option<HeaderModel>,
    footer: Option<FooterModel>,
    background: Option<BackgroundModel>,
    metrics: SectionMetrics,

    calculated_height: f64,
    rows: Vec<Row>,
    row_of_item: Vec<usize>,
    first_invalidated_row: Option<usize>,
    row_offsets: Option<RowOffsetTracker>,
}

impl SectionModel {
    /// Creates a section. Nothing is laid out until the first query.
    #[must_use]
    pub fn new(
        items: Vec<ItemModel>,
        header: Option<HeaderModel>,
        footer: Option<FooterModel>,
        background: Option<BackgroundModel>,
        metrics: SectionMetrics,
    ) -> Self {
        Self {
            id: SectionId::next(),
            items,
            header,
            footer,
            background,
            metrics,
            calculated_height: 0.0,
            rows: Vec::new(),
            row_of_item: Vec::new(),
            first_invalidated_row: Some(0),
            row_offsets: None,
        }
    }

    /// The section's stable identity.
    #[must_use]
    pub const fn id(&self) -> SectionId {
        self.id
    }

    /// Gives this section the identity of the section it replaces.
    pub(crate) const fn set_id(&mut self, id: SectionId) {
        self.id = id;
    }

    /// Spacing and insets.
    #[must_use]
    pub const fn metrics(&self) -> &SectionMetrics {
        &self.metrics
    }

    /// Number of items.
    #[must_use]
    pub fn number_of_items(&self) -> usize {
        self.items.len()
    }

    /// The item at `index`.
    #[must_use]
    pub fn item(&self, index: usize) -> &ItemModel {
        &self.items[index]
    }

    /// All items in order.
    #[must_use]
    pub fn items(&self) -> &[ItemModel] {
        &self.items
    }

    /// The header, if any.
    #[must_use]
    pub const fn header(&self) -> Option<&HeaderModel> {
        self.header.as_ref()
    }

    /// The footer, if any.
    #[must_use]
    pub const fn footer(&self) -> Option<&FooterModel> {
        self.footer.as_ref()
    }

    /// The background, if any.
    #[must_use]
    pub const fn background(&self) -> Option<&BackgroundModel> {
        self.background.as_ref()
    }

    /// The first row whose geometry is stale, or `None` when the section is clean.
    #[must_use]
    pub const fn first_invalidated_row(&self) -> Option<usize> {
        self.first_invalidated_row
    }

    /// Number of rows, including header and footer rows.
    pub fn number_of_rows(&mut self) -> usize {
        self.layout_if_needed();
        self.rows.len()
    }

    /// The row that contains the item at `index`.
    pub fn row_for_item(&mut self, index: usize) -> usize {
        self.layout_if_needed();
        self.row_of_item[index]
    }

    /// Total height of the section, including insets.
    pub fn calculate_height(&mut self) -> f64 {
        self.layout_if_needed();
        self.calculated_height
    }

    /// Frame of the item at `index`.
    pub fn calculate_frame_for_item(&mut self, index: usize) -> Rect {
        self.layout_if_needed();
        let item = &self.items[index];
        let offset = self.pending_offset(self.row_of_item[index]);
        Rect::from_origin_size(
            Point::new(item.origin.x, item.origin.y + offset),
            item.size,
        )
    }

    /// Frame of the header, if any.
    ///
    /// `visible_bounds` is the visible part of the viewport in section space.
    /// A pinned header follows its top edge, but never rises above its natural
    /// position and never moves down far enough to overlap the footer or leave
    /// the section.
    pub fn calculate_frame_for_header(&mut self, visible_bounds: Rect) -> Option<Rect> {
        self.layout_if_needed();
        let header = self.header.as_ref()?;
        let natural_y = header.origin.y + self.pending_offset(0);
        let mut y = natural_y;
        if header.pin_to_visible_bounds() {
            let footer_height = self.footer.as_ref().map_or(0.0, |footer| footer.size.height);
            let lowest_y = self.calculated_height
                - self.metrics.section_insets.y1
                - footer_height
                - header.size.height;
            y = visible_bounds.y0.min(lowest_y).max(natural_y);
        }
        Some(Rect::from_origin_size(
            Point::new(header.origin.x, y),
            header.size,
        ))
    }

    /// Frame of the footer, if any.
    ///
    /// A pinned footer follows the bottom edge of `visible_bounds`, but never
    /// drops below its natural position and never rises far enough to overlap
    /// the header or leave the section.
    pub fn calculate_frame_for_footer(&mut self, visible_bounds: Rect) -> Option<Rect> {
        self.layout_if_needed();
        let footer = self.footer.as_ref()?;
        let footer_row = self.rows.len() - 1;
        let natural_y = footer.origin.y + self.pending_offset(footer_row);
        let mut y = natural_y;
        if footer.pin_to_visible_bounds() {
            let header_height = self.header.as_ref().map_or(0.0, |header| header.size.height);
            let highest_y = self.metrics.section_insets.y0 + header_height;
            y = (visible_bounds.y1 - footer.size.height)
                .max(highest_y)
                .min(natural_y);
        }
        Some(Rect::from_origin_size(
            Point::new(footer.origin.x, y),
            footer.size,
        ))
    }

    /// Frame of the background, if any: the section inset by its section insets.
    pub fn calculate_frame_for_background(&mut self) -> Option<Rect> {
        self.layout_if_needed();
        let insets = self.metrics.section_insets;
        let origin = Point::new(insets.x0, insets.y0);
        let size = Size::new(
            self.metrics.section_content_width(),
            (self.calculated_height - insets.y0 - insets.y1).max(0.0),
        );
        let background = self.background.as_mut()?;
        background.origin = origin;
        background.size = size;
        Some(Rect::from_origin_size(origin, size))
    }

    /// Inserts `item` so that it ends up at `index`.
    pub fn insert_item(&mut self, index: usize, item: ItemModel) {
        assert!(
            index <= self.items.len(),
            "insert index {index} out of range for section with {} items",
            self.items.len()
        );
        let row = self.row_for_structural_change(index);
        self.items.insert(index, item);
        self.invalidate(row);
    }

    /// Removes and returns the item at `index`.
    pub fn delete_item(&mut self, index: usize) -> ItemModel {
        assert!(
            index < self.items.len(),
            "delete index {index} out of range for section with {} items",
            self.items.len()
        );
        let row = self.row_for_structural_change(index);
        self.invalidate(row);
        self.items.remove(index)
    }

    /// Replaces the size mode of the item at `index`.
    pub fn update_item_size_mode(&mut self, index: usize, size_mode: ItemSizeMode) {
        let row = self.row_for_structural_change(index);
        self.items[index].set_size_mode(size_mode);
        self.invalidate(row);
    }

    /// Records a measured height for the item at `index`.
    pub fn update_item_height(&mut self, index: usize, preferred_height: f64) {
        self.items[index].set_preferred_height(preferred_height);
        let Some(&row) = self.row_of_item.get(index) else {
            return;
        };
        // A stale row picks the new height up when it is repacked.
        if self.is_row_clean(row) {
            self.update_row_height(row);
        }
    }

    /// Records a measured height for the header. Does nothing without a header.
    pub fn update_header_height(&mut self, preferred_height: f64) {
        let Some(header) = self.header.as_mut() else {
            return;
        };
        header.set_preferred_height(preferred_height);
        if self
            .rows
            .first()
            .is_some_and(|row| row.kind == RowKind::Header)
            && self.is_row_clean(0)
        {
            self.update_row_height(0);
        }
    }

    /// Records a measured height for the footer. Does nothing without a footer.
    pub fn update_footer_height(&mut self, preferred_height: f64) {
        let Some(footer) = self.footer.as_mut() else {
            return;
        };
        footer.set_preferred_height(preferred_height);
        let last = self.rows.len().wrapping_sub(1);
        if self
            .rows
            .last()
            .is_some_and(|row| row.kind == RowKind::Footer)
            && self.is_row_clean(last)
        {
            self.update_row_height(last);
        }
    }

    /// Sets or replaces the header.
    pub fn set_header(&mut self, header: HeaderModel) {
        self.header = Some(header);
        self.invalidate(0);
    }

    /// Removes the header, returning it.
    pub fn remove_header(&mut self) -> Option<HeaderModel> {
        let header = self.header.take()?;
        self.invalidate(0);
        Some(header)
    }

    /// Sets or replaces the footer.
    pub fn set_footer(&mut self, footer: FooterModel) {
        let row = self.footer_row_boundary();
        self.footer = Some(footer);
        self.invalidate(row);
    }

    /// Removes the footer, returning it.
    pub fn remove_footer(&mut self) -> Option<FooterModel> {
        let row = self.footer_row_boundary();
        let footer = self.footer.take()?;
        self.invalidate(row);
        Some(footer)
    }

    /// Sets or replaces the background. Backgrounds never affect row geometry.
    pub fn set_background(&mut self, background: BackgroundModel) {
        self.background = Some(background);
    }

    /// Removes the background, returning it.
    pub fn remove_background(&mut self) -> Option<BackgroundModel> {
        self.background.take()
    }

    /// Replaces the section's metrics. Any change repacks every row.
    pub fn update_metrics(&mut self, metrics: SectionMetrics) {
        if metrics != self.metrics {
            self.metrics = metrics;
            self.invalidate(0);
        }
    }

    fn invalidate(&mut self, row: usize) {
        self.first_invalidated_row = Some(
            self.first_invalidated_row
                .map_or(row, |first| first.min(row)),
        );
    }

    fn is_row_clean(&self, row: usize) -> bool {
        row < self.rows.len() && self.first_invalidated_row.is_none_or(|first| row < first)
    }

    fn first_item_row(&self) -> usize {
        usize::from(self.header.is_some())
    }

    /// The earliest row an insertion, deletion, or width change at `index` can
    /// affect. The previous item's row is included because the changed item
    /// may join or leave it.
    fn row_for_structural_change(&self, index: usize) -> usize {
        self.row_of_item
            .get(index.saturating_sub(1))
            .copied()
            .unwrap_or_else(|| self.first_item_row())
    }

    fn footer_row_boundary(&self) -> usize {
        match self.rows.last() {
            Some(row) if row.kind == RowKind::Footer => self.rows.len() - 1,
            _ => self.rows.len(),
        }
    }

    fn pending_offset(&self, row: usize) -> f64 {
        self.row_offsets
            .as_ref()
            .map_or(0.0, |tracker| tracker.offset_for_row(row))
    }

    /// Resolves the height of a clean row in place and cascades the difference.
    fn update_row_height(&mut self, row_index: usize) {
        let old_height = self.rows[row_index].height;
        let new_height = match self.rows[row_index].kind {
            RowKind::Header => {
                let Some(header) = self.header.as_mut() else {
                    return;
                };
                header.size.height = header.resolved_height();
                header.size.height
            }
            RowKind::Footer => {
                let Some(footer) = self.footer.as_mut() else {
                    return;
                };
                footer.size.height = footer.resolved_height();
                footer.size.height
            }
            RowKind::Items => {
                let members = mem::take(&mut self.rows[row_index].items);
                let height = self.resolve_row_height(&members);
                self.rows[row_index].items = members;
                height
            }
        };

        let delta = new_height - old_height;
        if delta == 0.0 {
            return;
        }
        self.rows[row_index].height = new_height;
        self.calculated_height += delta;
        if let Some(tracker) = self.row_offsets.as_mut() {
            tracker.add_offset(delta, row_index + 1);
        }
        tracing::trace!(
            section = ?self.id,
            row = row_index,
            delta,
            "cascaded row height change"
        );
    }

    /// Sets every member's height and returns the row height.
    fn resolve_row_height(&mut self, members: &[usize]) -> f64 {
        let tallest = members
            .iter()
            .map(|&index| self.items[index].resolved_height())
            .fold(0.0, f64::max);
        for &index in members {
            let item = &mut self.items[index];
            item.size.height = if item.stretches_to_tallest_in_row() {
                tallest
            } else {
                item.resolved_height()
            };
        }
        tallest
    }

    /// Folds pending offsets of rows before `limit` into element origins and
    /// consumes the tracker. Rows at or after `limit` are about to be repacked.
    fn apply_row_offsets(&mut self, limit: usize) {
        let Some(tracker) = self.row_offsets.take() else {
            return;
        };
        if !tracker.has_offsets() {
            return;
        }
        let Self {
            rows,
            items,
            header,
            footer,
            ..
        } = self;
        let limit = limit.min(tracker.row_count());
        for (row_index, row) in rows.iter_mut().enumerate().take(limit) {
            let offset = tracker.offset_for_row(row_index);
            if offset == 0.0 {
                continue;
            }
            row.y += offset;
            match row.kind {
                RowKind::Header => {
                    if let Some(header) = header {
                        header.origin.y += offset;
                    }
                }
                RowKind::Footer => {
                    if let Some(footer) = footer {
                        footer.origin.y += offset;
                    }
                }
                RowKind::Items => {
                    for &index in &row.items {
                        items[index].origin.y += offset;
                    }
                }
            }
        }
    }

    /// Top of the next row of kind `next`, given the rows packed so far.
    fn next_row_y(&self, next: RowKind) -> f64 {
        let metrics = &self.metrics;
        let Some(prev) = self.rows.last() else {
            let item_top = if next == RowKind::Items {
                metrics.item_insets.y0
            } else {
                0.0
            };
            return metrics.section_insets.y0 + item_top;
        };
        let gap = match (prev.kind, next) {
            (RowKind::Header, RowKind::Items) => metrics.item_insets.y0,
            (RowKind::Items, RowKind::Items) => metrics.vertical_spacing,
            (RowKind::Items, RowKind::Footer) => metrics.item_insets.y1,
            _ => 0.0,
        };
        prev.max_y() + gap
    }

    fn layout_if_needed(&mut self) {
        let Some(first_row) = self.first_invalidated_row else {
            return;
        };
        self.apply_row_offsets(first_row);

        self.rows.truncate(first_row);
        if self
            .rows
            .last()
            .is_some_and(|row| row.kind == RowKind::Footer)
        {
            self.rows.pop();
        }
        let mut next_item = self
            .rows
            .iter()
            .rev()
            .find_map(|row| row.items.last())
            .map_or(0, |&last| last + 1);
        self.row_of_item.truncate(next_item);

        if self.rows.is_empty()
            && let Some(header) = self.header.as_mut()
        {
            let y = self.metrics.section_insets.y0;
            let height = header.resolved_height();
            header.origin = Point::new(self.metrics.section_insets.x0, y);
            header.size = Size::new(self.metrics.section_content_width(), height);
            self.rows.push(Row {
                kind: RowKind::Header,
                items: SmallVec::new(),
                y,
                height,
            });
        }

        while next_item < self.items.len() {
            let y = self.next_row_y(RowKind::Items);
            let row_index = self.rows.len();
            let members = self.pack_row(next_item, y);
            let height = self.resolve_row_height(&members);
            debug_assert_eq!(
                self.row_of_item.len(),
                next_item,
                "row mapping out of sync with packed items"
            );
            self.row_of_item
                .extend(iter::repeat_n(row_index, members.len()));
            next_item += members.len();
            self.rows.push(Row {
                kind: RowKind::Items,
                items: members,
                y,
                height,
            });
        }

        let footer_y = self.next_row_y(RowKind::Footer);
        if let Some(footer) = self.footer.as_mut() {
            let height = footer.resolved_height();
            footer.origin = Point::new(self.metrics.section_insets.x0, footer_y);
            footer.size = Size::new(self.metrics.section_content_width(), height);
            self.rows.push(Row {
                kind: RowKind::Footer,
                items: SmallVec::new(),
                y: footer_y,
                height,
            });
        }

        // Whatever follows the last row is spaced as if a footer came next.
        self.calculated_height =
            self.next_row_y(RowKind::Footer) + self.metrics.section_insets.y1;
        self.row_offsets = Some(RowOffsetTracker::new(self.rows.len()));
        self.first_invalidated_row = None;

        tracing::trace!(
            section = ?self.id,
            first_row,
            rows = self.rows.len(),
            height = self.calculated_height,
            "packed section rows"
        );
    }

    /// Places the items of the row starting at `start` and returns their indices.
    fn pack_row(&mut self, start: usize, y: f64) -> SmallVec<[usize; 4]> {
        let metrics = self.metrics;
        let width_mode = self.items[start].size_mode().width_mode;
        let mut members = SmallVec::new();
        match width_mode {
            ItemWidthMode::FullWidth {
                respects_horizontal_insets,
            } => {
                let (x, width) = if respects_horizontal_insets {
                    (
                        metrics.section_insets.x0 + metrics.item_insets.x0,
                        metrics.item_content_width(),
                    )
                } else {
                    (0.0, metrics.width.max(0.0))
                };
                let item = &mut self.items[start];
                item.origin = Point::new(x, y);
                item.size.width = width;
                members.push(start);
            }
            ItemWidthMode::Fractional { divisor } => {
                let columns = f64::from(divisor.get());
                let spacing = metrics.horizontal_spacing;
                let width = ((metrics.item_content_width() - spacing * (columns - 1.0)) / columns)
                    .floor()
                    .max(0.0);
                let mut x = metrics.section_insets.x0 + metrics.item_insets.x0;
                for (index, item) in self
                    .items
                    .iter_mut()
                    .enumerate()
                    .skip(start)
                    .take(width_mode.items_per_row())
                {
                    if item.size_mode().width_mode != width_mode {
                        break;
                    }
                    item.origin = Point::new(x, y);
                    item.size.width = width;
                    members.push(index);
                    x += width + spacing;
                }
            }
        }
        members
    }
}
