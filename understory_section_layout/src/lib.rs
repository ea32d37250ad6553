// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=understory_section_layout --heading-base-level=0

//! Understory Section Layout: incremental, sectioned row/column layout.
//!
//! This crate computes frames for a vertically scrolling document made of
//! sections. Each section has an optional header, an ordered list of items, an
//! optional footer, and an optional background. Items are packed into rows:
//!
//! - A full-width item occupies a row on its own.
//! - Fractional-width items (halves, thirds, …) share a row with neighbors that
//!   use the same width mode, left to right.
//! - Row heights come from static heights, from measured heights reported by
//!   the host, or from estimates until a measurement arrives. Items may stretch
//!   to the tallest item in their row.
//!
//! The core concepts are:
//!
//! - [`SectionModel`]: one section. Layout is lazy and incremental: structural
//!   changes only invalidate rows from the first affected one onward, and a
//!   measured height for a clean row is applied in `O(log rows)` through a
//!   [`RowOffsetTracker`] instead of repacking the section.
//! - [`ModelState`]: the whole document. It stacks sections, caches their
//!   bottom edges, answers viewport range queries, and runs batch updates.
//! - [`ModelState::apply_updates`]: applies a list of [`CollectionUpdate`]s
//!   while keeping a frozen copy of the layout as it was before the batch, so
//!   a host can read both sides through [`BatchUpdateStage`] and animate
//!   elements between their old and new frames.
//!
//! This crate does not know about views or any UI framework. Host frameworks
//! are responsible for:
//!
//! - Describing sections and items with size modes and [`SectionMetrics`].
//! - Measuring self-sizing elements and reporting heights through
//!   [`ModelState::update_item_height`] and friends.
//! - Calling the range queries for the visible rectangle and realizing views
//!   for the returned [`ElementLocation`]s.
//!
//! ## Minimal example
//!
//! ```rust
//! use kurbo::Rect;
//! use understory_section_layout::{
//!     BatchUpdateStage, ElementLocation, ItemHeightMode, ItemModel, ItemSizeMode,
//!     ItemWidthMode, ModelState, SectionMetrics, SectionModel,
//! };
//!
//! let section = SectionModel::new(
//!     vec![
//!         ItemModel::new(ItemSizeMode::new(
//!             ItemWidthMode::FULL_WIDTH,
//!             ItemHeightMode::Static(20.0),
//!         )),
//!         ItemModel::with_estimated_height(
//!             ItemSizeMode::new(ItemWidthMode::HALF_WIDTH, ItemHeightMode::Dynamic),
//!             10.0,
//!         ),
//!     ],
//!     None,
//!     None,
//!     None,
//!     SectionMetrics::with_width(320.0),
//! );
//! let mut state = ModelState::with_sections(vec![section]);
//!
//! let item = ElementLocation::new(0, 1);
//! assert_eq!(
//!     state.frame_for_item(item, BatchUpdateStage::AfterUpdates),
//!     Some(Rect::new(0.0, 20.0, 160.0, 30.0)),
//! );
//!
//! // The host measured the second item.
//! state.update_item_height(item, 50.0);
//! assert_eq!(state.content_height(), 70.0);
//!
//! let visible = state.item_location_frame_pairs(Rect::new(0.0, 0.0, 320.0, 25.0));
//! assert_eq!(visible.len(), 2);
//! ```
//!
//! All frames live in one document coordinate space (typically logical
//! pixels) with the top of the first section at `y = 0`. Heights are expected
//! to be finite; negative heights are treated as zero.
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod defaults;
mod element;
mod location;
mod model_state;
mod query;
mod row_offsets;
mod section;
mod types;
mod update;

pub use element::{
    BackgroundModel, FooterModel, HeaderModel, ItemId, ItemModel, SectionId, SupplementaryModel,
};
pub use location::ElementLocation;
pub use model_state::ModelState;
pub use query::{ElementKind, ElementKinds, ElementLocationFramePairs};
pub use row_offsets::RowOffsetTracker;
pub use section::SectionModel;
pub use types::{
    BackgroundVisibility, HeaderFooterHeightMode, ItemHeightMode, ItemSizeMode, ItemWidthMode,
    SectionMetrics, SupplementaryVisibility,
};
pub use update::{BatchUpdateStage, CollectionUpdate};
