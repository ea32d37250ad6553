// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Batch-update vocabulary.

use crate::element::ItemModel;
use crate::location::ElementLocation;
use crate::section::SectionModel;
use crate::types::ItemSizeMode;

/// Which snapshot a query reads during a batch update.
///
/// Outside a batch update both stages read the current layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BatchUpdateStage {
    /// The layout as it was when the batch update began.
    BeforeUpdates,
    /// The layout with every update applied.
    AfterUpdates,
}

/// One change in a batch passed to [`ModelState::apply_updates`](crate::ModelState::apply_updates).
///
/// Indices of reloads, deletes, and the source of moves refer to the layout
/// before the batch. Indices of inserts and the destination of moves refer to
/// the layout after it.
#[derive(Clone, Debug)]
pub enum CollectionUpdate {
    /// Replace the contents of the section at `index` with `section`, keeping
    /// the existing section's identity.
    SectionReload {
        /// Index of the section.
        index: usize,
        /// The replacement.
        section: SectionModel,
    },
    /// Give the item at `location` a new size mode, keeping its identity.
    ItemReload {
        /// Location of the item.
        location: ElementLocation,
        /// The new size mode.
        size_mode: ItemSizeMode,
    },
    /// Remove the section at `index`.
    SectionDelete {
        /// Index of the section.
        index: usize,
    },
    /// Remove the item at `location`.
    ItemDelete {
        /// Location of the item.
        location: ElementLocation,
    },
    /// Move a section, keeping its identity.
    SectionMove {
        /// Index before the batch.
        from: usize,
        /// Index after the batch.
        to: usize,
    },
    /// Move an item, keeping its identity.
    ItemMove {
        /// Location before the batch.
        from: ElementLocation,
        /// Location after the batch.
        to: ElementLocation,
    },
    /// Insert `section` so that it ends up at `index`.
    SectionInsert {
        /// Index after the batch.
        index: usize,
        /// The new section.
        section: SectionModel,
    },
    /// Insert `item` so that it ends up at `location`.
    ItemInsert {
        /// Location after the batch.
        location: ElementLocation,
        /// The new item.
        item: ItemModel,
    },
}
