// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-element models and their stable identities.

use core::sync::atomic::{AtomicU64, Ordering};

use kurbo::{Point, Size};

use crate::defaults;
use crate::types::{
    BackgroundVisibility, HeaderFooterHeightMode, ItemHeightMode, ItemSizeMode,
    SupplementaryVisibility,
};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Stable identity of an item.
///
/// Identities are allocated when an [`ItemModel`] is created and are never
/// reused. They survive moves and reloads, which makes them the join key
/// between the before and after snapshots of a batch update.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemId(u64);

/// Stable identity of a section. See [`ItemId`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SectionId(u64);

impl SectionId {
    pub(crate) fn next() -> Self {
        Self(next_id())
    }
}

fn sanitize_height(height: f64) -> f64 {
    debug_assert!(
        height.is_finite(),
        "element heights must be finite; got {height:?}"
    );
    // Clamp finite negative values to `0.0`.
    if height.is_sign_negative() {
        0.0
    } else {
        height
    }
}

/// An item in a section.
#[derive(Clone, Debug)]
pub struct ItemModel {
    id: ItemId,
    size_mode: ItemSizeMode,
    estimated_height: f64,
    preferred_height: Option<f64>,
    pub(crate) origin: Point,
    pub(crate) size: Size,
}

impl ItemModel {
    /// Creates an item using the default estimated height for dynamic modes.
    #[must_use]
    pub fn new(size_mode: ItemSizeMode) -> Self {
        Self::with_estimated_height(size_mode, defaults::ESTIMATED_ITEM_HEIGHT)
    }

    /// Creates an item that uses `estimated_height` until a measured height is
    /// reported. The estimate is ignored for [`ItemHeightMode::Static`].
    #[must_use]
    pub fn with_estimated_height(size_mode: ItemSizeMode, estimated_height: f64) -> Self {
        Self {
            id: ItemId(next_id()),
            size_mode,
            estimated_height: sanitize_height(estimated_height),
            preferred_height: None,
            origin: Point::ZERO,
            size: Size::ZERO,
        }
    }

    /// The item's stable identity.
    #[must_use]
    pub const fn id(&self) -> ItemId {
        self.id
    }

    /// The item's width and height modes.
    #[must_use]
    pub const fn size_mode(&self) -> ItemSizeMode {
        self.size_mode
    }

    /// The most recently reported measured height, if any.
    #[must_use]
    pub const fn preferred_height(&self) -> Option<f64> {
        self.preferred_height
    }

    /// Origin relative to the section's top-left corner as of the last layout
    /// pass, not including pending row offsets.
    #[must_use]
    pub const fn origin_in_section(&self) -> Point {
        self.origin
    }

    /// Size as of the last layout pass.
    #[must_use]
    pub const fn size(&self) -> Size {
        self.size
    }

    /// Replaces the size mode. A previously measured height no longer applies.
    pub(crate) fn set_size_mode(&mut self, size_mode: ItemSizeMode) {
        self.size_mode = size_mode;
        self.preferred_height = None;
    }

    pub(crate) fn set_preferred_height(&mut self, height: f64) {
        self.preferred_height = Some(sanitize_height(height));
    }

    /// Height of this item on its own, before any stretching.
    pub(crate) fn resolved_height(&self) -> f64 {
        match self.size_mode.height_mode {
            ItemHeightMode::Static(height) => sanitize_height(height),
            ItemHeightMode::Dynamic | ItemHeightMode::DynamicAndStretchToTallestInRow => {
                self.preferred_height.unwrap_or(self.estimated_height)
            }
        }
    }

    pub(crate) fn stretches_to_tallest_in_row(&self) -> bool {
        matches!(
            self.size_mode.height_mode,
            ItemHeightMode::DynamicAndStretchToTallestInRow
        )
    }
}

/// A section header or footer.
///
/// Headers and footers share a shape; see [`HeaderModel`] and [`FooterModel`].
#[derive(Clone, Debug)]
pub struct SupplementaryModel {
    height_mode: HeaderFooterHeightMode,
    estimated_height: f64,
    preferred_height: Option<f64>,
    pin_to_visible_bounds: bool,
    pub(crate) origin: Point,
    pub(crate) size: Size,
}

/// A section header.
pub type HeaderModel = SupplementaryModel;

/// A section footer.
pub type FooterModel = SupplementaryModel;

impl SupplementaryModel {
    /// Creates a header or footer.
    ///
    /// Dynamic elements use `estimated_height` until a measured height is reported.
    #[must_use]
    pub fn new(
        height_mode: HeaderFooterHeightMode,
        estimated_height: f64,
        pin_to_visible_bounds: bool,
    ) -> Self {
        Self {
            height_mode,
            estimated_height: sanitize_height(estimated_height),
            preferred_height: None,
            pin_to_visible_bounds,
            origin: Point::ZERO,
            size: Size::ZERO,
        }
    }

    /// Builds a header from the host's visibility decision.
    #[must_use]
    pub fn header(visibility: SupplementaryVisibility) -> Option<Self> {
        Self::from_visibility(visibility, defaults::ESTIMATED_HEADER_HEIGHT)
    }

    /// Builds a footer from the host's visibility decision.
    #[must_use]
    pub fn footer(visibility: SupplementaryVisibility) -> Option<Self> {
        Self::from_visibility(visibility, defaults::ESTIMATED_FOOTER_HEIGHT)
    }

    fn from_visibility(visibility: SupplementaryVisibility, estimated_height: f64) -> Option<Self> {
        match visibility {
            SupplementaryVisibility::Hidden => None,
            SupplementaryVisibility::Visible {
                height_mode,
                pin_to_visible_bounds,
            } => Some(Self::new(height_mode, estimated_height, pin_to_visible_bounds)),
        }
    }

    /// Vertical sizing of this element.
    #[must_use]
    pub const fn height_mode(&self) -> HeaderFooterHeightMode {
        self.height_mode
    }

    /// Whether this element sticks to the visible edge of the viewport.
    #[must_use]
    pub const fn pin_to_visible_bounds(&self) -> bool {
        self.pin_to_visible_bounds
    }

    /// The most recently reported measured height, if any.
    #[must_use]
    pub const fn preferred_height(&self) -> Option<f64> {
        self.preferred_height
    }

    /// Size as of the last layout pass.
    #[must_use]
    pub const fn size(&self) -> Size {
        self.size
    }

    pub(crate) fn set_preferred_height(&mut self, height: f64) {
        self.preferred_height = Some(sanitize_height(height));
    }

    pub(crate) fn resolved_height(&self) -> f64 {
        match self.height_mode {
            HeaderFooterHeightMode::Static(height) => sanitize_height(height),
            HeaderFooterHeightMode::Dynamic => {
                self.preferred_height.unwrap_or(self.estimated_height)
            }
        }
    }
}

/// A section background.
///
/// Backgrounds never affect the section's height; their frame is derived from it.
#[derive(Clone, Debug, Default)]
pub struct BackgroundModel {
    pub(crate) origin: Point,
    pub(crate) size: Size,
}

impl BackgroundModel {
    /// Creates a background.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a background from the host's visibility decision.
    #[must_use]
    pub fn from_visibility(visibility: BackgroundVisibility) -> Option<Self> {
        match visibility {
            BackgroundVisibility::Hidden => None,
            BackgroundVisibility::Visible => Some(Self::new()),
        }
    }

    /// Size as of the last frame calculation.
    #[must_use]
    pub const fn size(&self) -> Size {
        self.size
    }
}
