// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A scrolling feed driven the way a host view would drive it.
//!
//! This example shows how to:
//! - describe sections with headers, backgrounds, and mixed item widths,
//! - query the visible rectangle while scrolling,
//! - report measured heights for self-sizing items,
//! - animate a batch update by reading both the before and after layouts.
//!
//! Run:
//! - `cargo run -p understory_demos --example section_feed`

use kurbo::{Insets, Rect};
use understory_section_layout::{
    BackgroundModel, BatchUpdateStage, CollectionUpdate, ElementKind, ElementKinds,
    ElementLocation, HeaderFooterHeightMode, HeaderModel, ItemHeightMode, ItemModel, ItemSizeMode,
    ItemWidthMode, ModelState, SectionMetrics, SectionModel, SupplementaryVisibility,
};

const VIEWPORT_WIDTH: f64 = 375.0;
const VIEWPORT_HEIGHT: f64 = 600.0;

fn metrics() -> SectionMetrics {
    SectionMetrics {
        width: VIEWPORT_WIDTH,
        horizontal_spacing: 8.0,
        vertical_spacing: 8.0,
        section_insets: Insets::new(0.0, 0.0, 0.0, 24.0),
        item_insets: Insets::new(16.0, 12.0, 16.0, 12.0),
    }
}

/// A section with a pinned header, a hero card, and a grid of self-sizing tiles.
fn feed_section(tiles: usize) -> SectionModel {
    let mut items = vec![ItemModel::new(ItemSizeMode::new(
        ItemWidthMode::FullWidth {
            respects_horizontal_insets: false,
        },
        ItemHeightMode::Static(220.0),
    ))];
    items.extend((0..tiles).map(|_| {
        ItemModel::new(ItemSizeMode::new(
            ItemWidthMode::HALF_WIDTH,
            ItemHeightMode::DynamicAndStretchToTallestInRow,
        ))
    }));
    SectionModel::new(
        items,
        HeaderModel::header(SupplementaryVisibility::Visible {
            height_mode: HeaderFooterHeightMode::Static(44.0),
            pin_to_visible_bounds: true,
        }),
        None,
        Some(BackgroundModel::new()),
        metrics(),
    )
}

/// Pretends to measure an item's content.
fn measure(location: ElementLocation) -> f64 {
    let lines = (location.section * 7 + location.element * 3) % 5 + 1;
    40.0 + 18.0 * lines as f64
}

fn print_visible(state: &mut ModelState, scroll_y: f64) {
    let viewport = Rect::new(0.0, scroll_y, VIEWPORT_WIDTH, scroll_y + VIEWPORT_HEIGHT);
    state.set_visible_bounds(viewport);
    let elements = state.elements_in_rect(
        viewport,
        ElementKinds::ITEMS | ElementKinds::HEADERS | ElementKinds::BACKGROUNDS,
    );
    println!(
        "scroll {scroll_y:>6.0}: {} elements, content height {:.0}",
        elements.len(),
        state.content_height()
    );
    for (kind, location, frame) in elements {
        if kind == ElementKind::Header {
            println!(
                "  header {} at y = {:.0}{}",
                location.section,
                frame.y0,
                if frame.y0 == scroll_y { " (pinned)" } else { "" }
            );
        }
    }
}

fn main() {
    let mut state = ModelState::with_sections((0..4).map(|_| feed_section(9)).collect());
    println!(
        "estimated content height: {:.0}",
        state.content_height()
    );

    // Measure every self-sizing item that becomes visible while scrolling down.
    let mut scroll_y = 0.0;
    while scroll_y < state.content_height() {
        let viewport = Rect::new(0.0, scroll_y, VIEWPORT_WIDTH, scroll_y + VIEWPORT_HEIGHT);
        let visible = state.item_location_frame_pairs(viewport);
        for location in visible.locations() {
            let is_dynamic = state
                .item_height_mode(location, BatchUpdateStage::AfterUpdates)
                .is_some_and(ItemHeightMode::is_dynamic);
            let measured = state.sections(BatchUpdateStage::AfterUpdates)[location.section]
                .item(location.element)
                .preferred_height()
                .is_some();
            if is_dynamic && !measured {
                state.update_item_height(location, measure(location));
            }
        }
        print_visible(&mut state, scroll_y);
        scroll_y += VIEWPORT_HEIGHT / 2.0;
    }

    // Move the first tile of section 1 to the front of section 0 and drop section 2.
    let moved = ElementLocation::new(1, 1);
    let moved_id = state
        .id_for_item(moved, BatchUpdateStage::AfterUpdates)
        .expect("section 1 has tiles");
    state.apply_updates([
        CollectionUpdate::ItemMove {
            from: moved,
            to: ElementLocation::new(0, 1),
        },
        CollectionUpdate::SectionDelete { index: 2 },
    ]);

    let before = state.frame_for_item(moved, BatchUpdateStage::BeforeUpdates);
    let destination = state
        .location_for_item(moved_id, BatchUpdateStage::AfterUpdates)
        .expect("moved items keep their identity");
    let after = state.frame_for_item(destination, BatchUpdateStage::AfterUpdates);
    println!("moved tile animates from {before:?} to {after:?}");
    println!(
        "sections: {} before, {} after",
        state.number_of_sections(BatchUpdateStage::BeforeUpdates),
        state.number_of_sections(BatchUpdateStage::AfterUpdates)
    );
    state.clear_in_progress_batch_update_state();

    print_visible(&mut state, 0.0);
}
