// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host-facing size modes, visibility modes, and section metrics.

use core::num::NonZeroU32;

use kurbo::Insets;

/// How wide an item is within its section.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemWidthMode {
    /// The item occupies a row on its own.
    FullWidth {
        /// When `true`, the item spans the area inside the section and item
        /// insets. When `false`, it spans the full section width.
        respects_horizontal_insets: bool,
    },
    /// The item shares its row with up to `divisor - 1` neighbors that use the
    /// same width mode.
    Fractional {
        /// Number of equally sized columns in the row.
        divisor: NonZeroU32,
    },
}

impl ItemWidthMode {
    /// A full-width item inset like its siblings.
    pub const FULL_WIDTH: Self = Self::FullWidth {
        respects_horizontal_insets: true,
    };
    /// Two items per row.
    pub const HALF_WIDTH: Self = Self::Fractional {
        divisor: NonZeroU32::new(2).unwrap(),
    };
    /// Three items per row.
    pub const THIRD_WIDTH: Self = Self::Fractional {
        divisor: NonZeroU32::new(3).unwrap(),
    };
    /// Four items per row.
    pub const FOURTH_WIDTH: Self = Self::Fractional {
        divisor: NonZeroU32::new(4).unwrap(),
    };

    /// Creates a fractional width mode with `divisor` items per row.
    ///
    /// Panics if `divisor` is zero.
    #[must_use]
    pub const fn fractional(divisor: u32) -> Self {
        match NonZeroU32::new(divisor) {
            Some(divisor) => Self::Fractional { divisor },
            None => panic!("fractional width divisor must be at least 1"),
        }
    }

    /// Maximum number of items that can share a row with this mode.
    #[must_use]
    pub const fn items_per_row(self) -> usize {
        match self {
            Self::FullWidth { .. } => 1,
            Self::Fractional { divisor } => divisor.get() as usize,
        }
    }
}

/// How tall an item is.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ItemHeightMode {
    /// A fixed height. Measured heights are ignored.
    Static(f64),
    /// Sized from the host's measurement, using an estimate until one arrives.
    Dynamic,
    /// Like [`Dynamic`](Self::Dynamic), then stretched to the tallest item in
    /// its row.
    DynamicAndStretchToTallestInRow,
}

impl ItemHeightMode {
    /// Returns `true` for modes that take measured heights.
    #[must_use]
    pub const fn is_dynamic(self) -> bool {
        !matches!(self, Self::Static(_))
    }
}

/// Width and height mode of an item.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ItemSizeMode {
    /// Horizontal sizing.
    pub width_mode: ItemWidthMode,
    /// Vertical sizing.
    pub height_mode: ItemHeightMode,
}

impl ItemSizeMode {
    /// Creates a size mode.
    #[must_use]
    pub const fn new(width_mode: ItemWidthMode, height_mode: ItemHeightMode) -> Self {
        Self {
            width_mode,
            height_mode,
        }
    }
}

impl Default for ItemSizeMode {
    fn default() -> Self {
        Self::new(ItemWidthMode::FULL_WIDTH, ItemHeightMode::Dynamic)
    }
}

/// How tall a header or footer is.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum HeaderFooterHeightMode {
    /// A fixed height.
    Static(f64),
    /// Sized from the host's measurement, using an estimate until one arrives.
    Dynamic,
}

/// Whether a section shows a header or footer, and how it behaves.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SupplementaryVisibility {
    /// No header or footer.
    Hidden,
    /// A header or footer with the given sizing.
    Visible {
        /// Vertical sizing.
        height_mode: HeaderFooterHeightMode,
        /// Keep the element at the visible edge of the viewport while any part
        /// of its section is visible.
        pin_to_visible_bounds: bool,
    },
}

/// Whether a section shows a background.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackgroundVisibility {
    /// No background.
    Hidden,
    /// A background spanning the section inside its insets.
    Visible,
}

/// Spacing and insets that control how a section packs its items.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SectionMetrics {
    /// Width of the section (typically the viewport's content width).
    pub width: f64,
    /// Space between items in the same row.
    pub horizontal_spacing: f64,
    /// Space between item rows.
    pub vertical_spacing: f64,
    /// Insets around the whole section, including its header and footer.
    pub section_insets: Insets,
    /// Insets around the block of items, inside the section insets.
    pub item_insets: Insets,
}

impl SectionMetrics {
    /// Creates metrics for a section of the given width with no spacing or insets.
    #[must_use]
    pub fn with_width(width: f64) -> Self {
        Self {
            width,
            ..Self::default()
        }
    }

    /// Width available to items that respect horizontal insets.
    #[must_use]
    pub fn item_content_width(&self) -> f64 {
        (self.width
            - self.section_insets.x0
            - self.section_insets.x1
            - self.item_insets.x0
            - self.item_insets.x1)
            .max(0.0)
    }

    /// Width available to headers, footers, and backgrounds.
    #[must_use]
    pub fn section_content_width(&self) -> f64 {
        (self.width - self.section_insets.x0 - self.section_insets.x1).max(0.0)
    }
}

impl Default for SectionMetrics {
    fn default() -> Self {
        Self {
            width: 0.0,
            horizontal_spacing: crate::defaults::HORIZONTAL_SPACING,
            vertical_spacing: crate::defaults::VERTICAL_SPACING,
            section_insets: Insets::ZERO,
            item_insets: Insets::ZERO,
        }
    }
}
