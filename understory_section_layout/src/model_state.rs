// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The document-level layout model and its batch-update state machine.

use alloc::vec::Vec;
use core::mem;

use hashbrown::{HashMap, HashSet};
use kurbo::{Rect, Vec2};
use smallvec::{SmallVec, smallvec};

use crate::element::{BackgroundModel, FooterModel, HeaderModel, ItemId, SectionId};
use crate::location::ElementLocation;
use crate::query::{ElementKind, ElementKinds, ElementLocationFramePairs, collect_in_rect};
use crate::section::SectionModel;
use crate::types::{HeaderFooterHeightMode, ItemHeightMode, ItemSizeMode, SectionMetrics};
use crate::update::{BatchUpdateStage, CollectionUpdate};

/// An element queued for insertion: either new, or taken out by the delete
/// pass of the same batch.
enum Staged<T, K> {
    New(T),
    Moved(K),
}

/// Where a measured height should be recorded.
type HeightTargets<K> = SmallVec<[(BatchUpdateStage, K); 2]>;

/// Layout of a whole document: an ordered list of sections stacked top to bottom.
///
/// Frames returned by `ModelState` are in document space, with the first
/// section's top-left corner at the origin.
///
/// ## Batch updates
///
/// [`apply_updates`](Self::apply_updates) copies the current sections into a
/// frozen "before" snapshot and then applies the batch to the current
/// sections. Until
/// [`clear_in_progress_batch_update_state`](Self::clear_in_progress_batch_update_state)
/// is called, queries taking a [`BatchUpdateStage`] can read either side, which
/// is what a host needs to animate elements from their old frames to their new
/// ones. Batches do not nest.
///
/// ## Caching
///
/// The bottom edge of each current section is cached. Any change to a section
/// drops the cached values from that section onward, so sections above a
/// change keep their cached positions. The before snapshot is read rarely and
/// is not cached.
#[derive(Debug, Default)]
pub struct ModelState {
    current_sections: Vec<SectionModel>,
    sections_before_batch_update: Option<Vec<SectionModel>>,
    section_max_ys: Vec<Option<f64>>,

    section_indices_to_insert: HashSet<usize>,
    section_indices_to_delete: HashSet<usize>,
    item_locations_to_insert: HashSet<ElementLocation>,
    item_locations_to_delete: HashSet<ElementLocation>,

    item_locations: Vec<ElementLocation>,
    header_locations: Vec<ElementLocation>,
    footer_locations: Vec<ElementLocation>,
    background_locations: Vec<ElementLocation>,

    visible_bounds: Rect,
}

impl ModelState {
    /// Creates an empty model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a model holding `sections`.
    #[must_use]
    pub fn with_sections(sections: Vec<SectionModel>) -> Self {
        let mut state = Self::new();
        state.set_sections(sections);
        state
    }

    /// Replaces every section, dropping all cached positions.
    pub fn set_sections(&mut self, sections: Vec<SectionModel>) {
        self.current_sections = sections;
        self.section_max_ys.clear();
        self.section_max_ys.resize(self.current_sections.len(), None);
        self.rebuild_element_locations();
        tracing::debug!(sections = self.current_sections.len(), "replaced all sections");
    }

    /// Returns `true` between [`apply_updates`](Self::apply_updates) and
    /// [`clear_in_progress_batch_update_state`](Self::clear_in_progress_batch_update_state).
    #[must_use]
    pub const fn is_performing_batch_updates(&self) -> bool {
        self.sections_before_batch_update.is_some()
    }

    /// The visible part of the viewport in document space.
    #[must_use]
    pub const fn visible_bounds(&self) -> Rect {
        self.visible_bounds
    }

    /// Sets the visible part of the viewport. Pinned headers and footers
    /// follow its edges.
    pub fn set_visible_bounds(&mut self, visible_bounds: Rect) {
        self.visible_bounds = visible_bounds;
    }

    /// The sections of `stage`.
    #[must_use]
    pub fn sections(&self, stage: BatchUpdateStage) -> &[SectionModel] {
        match stage {
            BatchUpdateStage::BeforeUpdates => self
                .sections_before_batch_update
                .as_deref()
                .unwrap_or(&self.current_sections),
            BatchUpdateStage::AfterUpdates => &self.current_sections,
        }
    }

    fn sections_mut(&mut self, stage: BatchUpdateStage) -> &mut Vec<SectionModel> {
        if stage == BatchUpdateStage::BeforeUpdates
            && let Some(before) = self.sections_before_batch_update.as_mut()
        {
            return before;
        }
        &mut self.current_sections
    }

    /// Returns `true` if `stage` reads the current sections.
    fn reads_current(&self, stage: BatchUpdateStage) -> bool {
        stage == BatchUpdateStage::AfterUpdates || self.sections_before_batch_update.is_none()
    }

    /// Number of sections in `stage`.
    #[must_use]
    pub fn number_of_sections(&self, stage: BatchUpdateStage) -> usize {
        self.sections(stage).len()
    }

    /// Number of items in `section` in `stage`.
    ///
    /// Panics if `section` is out of range.
    #[must_use]
    pub fn number_of_items(&self, section: usize, stage: BatchUpdateStage) -> usize {
        self.sections(stage)[section].number_of_items()
    }

    /// Identity of the item at `location`, if there is one.
    #[must_use]
    pub fn id_for_item(&self, location: ElementLocation, stage: BatchUpdateStage) -> Option<ItemId> {
        let section = self.sections(stage).get(location.section)?;
        section.items().get(location.element).map(|item| item.id())
    }

    /// Location of the item with identity `id`, if it exists in `stage`.
    #[must_use]
    pub fn location_for_item(&self, id: ItemId, stage: BatchUpdateStage) -> Option<ElementLocation> {
        find_item(self.sections(stage), id)
    }

    /// Identity of the section at `index`, if there is one.
    #[must_use]
    pub fn id_for_section(&self, index: usize, stage: BatchUpdateStage) -> Option<SectionId> {
        self.sections(stage).get(index).map(SectionModel::id)
    }

    /// Index of the section with identity `id`, if it exists in `stage`.
    #[must_use]
    pub fn index_for_section(&self, id: SectionId, stage: BatchUpdateStage) -> Option<usize> {
        self.sections(stage)
            .iter()
            .position(|section| section.id() == id)
    }

    /// Height mode of the item at `location`, if there is one.
    #[must_use]
    pub fn item_height_mode(
        &self,
        location: ElementLocation,
        stage: BatchUpdateStage,
    ) -> Option<ItemHeightMode> {
        let section = self.sections(stage).get(location.section)?;
        let item = section.items().get(location.element)?;
        Some(item.size_mode().height_mode)
    }

    /// Height mode of the header of `section`, if it has one.
    #[must_use]
    pub fn header_height_mode(
        &self,
        section: usize,
        stage: BatchUpdateStage,
    ) -> Option<HeaderFooterHeightMode> {
        Some(self.sections(stage).get(section)?.header()?.height_mode())
    }

    /// Height mode of the footer of `section`, if it has one.
    #[must_use]
    pub fn footer_height_mode(
        &self,
        section: usize,
        stage: BatchUpdateStage,
    ) -> Option<HeaderFooterHeightMode> {
        Some(self.sections(stage).get(section)?.footer()?.height_mode())
    }

    /// Document-space bottom edge of the section at `index`.
    ///
    /// Panics if `index` is out of range.
    pub fn section_max_y(&mut self, index: usize, stage: BatchUpdateStage) -> f64 {
        assert!(
            index < self.number_of_sections(stage),
            "section {index} out of range"
        );
        if stage == BatchUpdateStage::BeforeUpdates
            && let Some(before) = self.sections_before_batch_update.as_mut()
        {
            return before
                .iter_mut()
                .take(index + 1)
                .map(SectionModel::calculate_height)
                .sum();
        }

        if let Some(max_y) = self.section_max_ys[index] {
            return max_y;
        }
        // Cached values always form a prefix.
        let start = self
            .section_max_ys
            .iter()
            .position(Option::is_none)
            .unwrap_or(index);
        let mut max_y = start
            .checked_sub(1)
            .and_then(|previous| self.section_max_ys[previous])
            .unwrap_or(0.0);
        for section in start..=index {
            max_y += self.current_sections[section].calculate_height();
            self.section_max_ys[section] = Some(max_y);
        }
        max_y
    }

    fn section_min_y(&mut self, index: usize, stage: BatchUpdateStage) -> f64 {
        match index.checked_sub(1) {
            Some(previous) => self.section_max_y(previous, stage),
            None => 0.0,
        }
    }

    /// Total height of the current layout.
    pub fn content_height(&mut self) -> f64 {
        match self.current_sections.len().checked_sub(1) {
            Some(last) => self.section_max_y(last, BatchUpdateStage::AfterUpdates),
            None => 0.0,
        }
    }

    fn invalidate_section_max_ys(&mut self, from: usize) {
        for max_y in self.section_max_ys.iter_mut().skip(from) {
            if max_y.take().is_none() {
                break;
            }
        }
    }

    /// Document-space frame of the item at `location`, if there is one.
    pub fn frame_for_item(
        &mut self,
        location: ElementLocation,
        stage: BatchUpdateStage,
    ) -> Option<Rect> {
        let section = self.sections(stage).get(location.section)?;
        if location.element >= section.number_of_items() {
            return None;
        }
        let offset = Vec2::new(0.0, self.section_min_y(location.section, stage));
        let frame =
            self.sections_mut(stage)[location.section].calculate_frame_for_item(location.element);
        Some(frame + offset)
    }

    /// Document-space frame of the header of `section`, pinned against the
    /// visible bounds when the header asks for it.
    pub fn frame_for_header(&mut self, section: usize, stage: BatchUpdateStage) -> Option<Rect> {
        if section >= self.number_of_sections(stage) {
            return None;
        }
        let offset = Vec2::new(0.0, self.section_min_y(section, stage));
        let visible_bounds = self.visible_bounds - offset;
        self.sections_mut(stage)[section]
            .calculate_frame_for_header(visible_bounds)
            .map(|frame| frame + offset)
    }

    /// Document-space frame of the footer of `section`, pinned against the
    /// visible bounds when the footer asks for it.
    pub fn frame_for_footer(&mut self, section: usize, stage: BatchUpdateStage) -> Option<Rect> {
        if section >= self.number_of_sections(stage) {
            return None;
        }
        let offset = Vec2::new(0.0, self.section_min_y(section, stage));
        let visible_bounds = self.visible_bounds - offset;
        self.sections_mut(stage)[section]
            .calculate_frame_for_footer(visible_bounds)
            .map(|frame| frame + offset)
    }

    /// Document-space frame of the background of `section`, if it has one.
    pub fn frame_for_background(
        &mut self,
        section: usize,
        stage: BatchUpdateStage,
    ) -> Option<Rect> {
        if section >= self.number_of_sections(stage) {
            return None;
        }
        let offset = Vec2::new(0.0, self.section_min_y(section, stage));
        self.sections_mut(stage)[section]
            .calculate_frame_for_background()
            .map(|frame| frame + offset)
    }

    fn frame_for(
        &mut self,
        kind: ElementKind,
        location: ElementLocation,
        stage: BatchUpdateStage,
    ) -> Option<Rect> {
        match kind {
            ElementKind::Item => self.frame_for_item(location, stage),
            ElementKind::Header => self.frame_for_header(location.section, stage),
            ElementKind::Footer => self.frame_for_footer(location.section, stage),
            ElementKind::Background => self.frame_for_background(location.section, stage),
        }
    }

    /// Current items whose frames intersect `rect`, in layout order.
    pub fn item_location_frame_pairs(&mut self, rect: Rect) -> ElementLocationFramePairs {
        self.location_frame_pairs(ElementKind::Item, rect)
    }

    /// Current headers whose frames intersect `rect`, in layout order.
    pub fn header_location_frame_pairs(&mut self, rect: Rect) -> ElementLocationFramePairs {
        self.location_frame_pairs(ElementKind::Header, rect)
    }

    /// Current footers whose frames intersect `rect`, in layout order.
    pub fn footer_location_frame_pairs(&mut self, rect: Rect) -> ElementLocationFramePairs {
        self.location_frame_pairs(ElementKind::Footer, rect)
    }

    /// Current backgrounds whose frames intersect `rect`, in layout order.
    pub fn background_location_frame_pairs(&mut self, rect: Rect) -> ElementLocationFramePairs {
        self.location_frame_pairs(ElementKind::Background, rect)
    }

    /// Every current element of the selected `kinds` whose frame intersects `rect`.
    ///
    /// Backgrounds come first, then items, headers, and footers, so that
    /// drawing the result in order stacks decorations the usual way.
    pub fn elements_in_rect(
        &mut self,
        rect: Rect,
        kinds: ElementKinds,
    ) -> Vec<(ElementKind, ElementLocation, Rect)> {
        let mut elements = Vec::new();
        for (flag, kind) in [
            (ElementKinds::BACKGROUNDS, ElementKind::Background),
            (ElementKinds::ITEMS, ElementKind::Item),
            (ElementKinds::HEADERS, ElementKind::Header),
            (ElementKinds::FOOTERS, ElementKind::Footer),
        ] {
            if kinds.contains(flag) {
                elements.extend(
                    self.location_frame_pairs(kind, rect)
                        .into_iter()
                        .map(|(location, frame)| (kind, location, frame)),
                );
            }
        }
        elements
    }

    fn element_locations_mut(&mut self, kind: ElementKind) -> &mut Vec<ElementLocation> {
        match kind {
            ElementKind::Item => &mut self.item_locations,
            ElementKind::Header => &mut self.header_locations,
            ElementKind::Footer => &mut self.footer_locations,
            ElementKind::Background => &mut self.background_locations,
        }
    }

    fn location_frame_pairs(&mut self, kind: ElementKind, rect: Rect) -> ElementLocationFramePairs {
        let locations = mem::take(self.element_locations_mut(kind));
        let pairs = collect_in_rect(locations.len(), rect, |index| {
            let location = locations[index];
            let frame = self
                .frame_for(kind, location, BatchUpdateStage::AfterUpdates)
                .expect("stale element location");
            (location, frame)
        });
        *self.element_locations_mut(kind) = locations;
        pairs
    }

    fn rebuild_element_locations(&mut self) {
        self.item_locations.clear();
        self.header_locations.clear();
        self.footer_locations.clear();
        self.background_locations.clear();
        for (index, section) in self.current_sections.iter().enumerate() {
            let location = ElementLocation::supplementary(index);
            if section.header().is_some() {
                self.header_locations.push(location);
            }
            if section.footer().is_some() {
                self.footer_locations.push(location);
            }
            if section.background().is_some() {
                self.background_locations.push(location);
            }
            self.item_locations.extend(
                (0..section.number_of_items()).map(|element| ElementLocation::new(index, element)),
            );
        }
    }

    /// Records a measured height for the item at `location`.
    ///
    /// During a batch update the location may refer to either snapshot. It is
    /// resolved in this order:
    ///
    /// 1. An item or section inserted by the batch: only the after snapshot.
    /// 2. An item or section deleted by the batch: only the before snapshot.
    /// 3. An item in the before snapshot that still exists after the batch,
    ///    possibly elsewhere: both snapshots, each at its own location.
    /// 4. Anything else: only the after snapshot.
    ///
    /// Locations that do not exist in the resolved snapshot are ignored.
    pub fn update_item_height(&mut self, location: ElementLocation, preferred_height: f64) {
        for (stage, location) in self.item_height_targets(location) {
            let reads_current = self.reads_current(stage);
            let Some(section) = self.sections_mut(stage).get_mut(location.section) else {
                tracing::debug!(?location, ?stage, "ignoring height for a missing section");
                continue;
            };
            if location.element >= section.number_of_items() {
                tracing::debug!(?location, ?stage, "ignoring height for a missing item");
                continue;
            }
            section.update_item_height(location.element, preferred_height);
            if reads_current {
                self.invalidate_section_max_ys(location.section);
            }
        }
    }

    /// Records a measured height for the header of `section`. Resolved like
    /// [`update_item_height`](Self::update_item_height).
    pub fn update_header_height(&mut self, section: usize, preferred_height: f64) {
        for (stage, section) in self.section_height_targets(section) {
            let reads_current = self.reads_current(stage);
            let Some(model) = self.sections_mut(stage).get_mut(section) else {
                tracing::debug!(section, ?stage, "ignoring header height for a missing section");
                continue;
            };
            model.update_header_height(preferred_height);
            if reads_current {
                self.invalidate_section_max_ys(section);
            }
        }
    }

    /// Records a measured height for the footer of `section`. Resolved like
    /// [`update_item_height`](Self::update_item_height).
    pub fn update_footer_height(&mut self, section: usize, preferred_height: f64) {
        for (stage, section) in self.section_height_targets(section) {
            let reads_current = self.reads_current(stage);
            let Some(model) = self.sections_mut(stage).get_mut(section) else {
                tracing::debug!(section, ?stage, "ignoring footer height for a missing section");
                continue;
            };
            model.update_footer_height(preferred_height);
            if reads_current {
                self.invalidate_section_max_ys(section);
            }
        }
    }

    fn item_height_targets(&self, location: ElementLocation) -> HeightTargets<ElementLocation> {
        let after = (BatchUpdateStage::AfterUpdates, location);
        let Some(before) = self.sections_before_batch_update.as_deref() else {
            return smallvec![after];
        };
        if self.section_indices_to_insert.contains(&location.section)
            || self.item_locations_to_insert.contains(&location)
        {
            return smallvec![after];
        }
        if self.section_indices_to_delete.contains(&location.section)
            || self.item_locations_to_delete.contains(&location)
        {
            return smallvec![(BatchUpdateStage::BeforeUpdates, location)];
        }
        let id = before
            .get(location.section)
            .and_then(|section| section.items().get(location.element))
            .map(|item| item.id());
        if let Some(id) = id
            && let Some(after_location) = find_item(&self.current_sections, id)
        {
            return smallvec![
                (BatchUpdateStage::BeforeUpdates, location),
                (BatchUpdateStage::AfterUpdates, after_location),
            ];
        }
        smallvec![after]
    }

    fn section_height_targets(&self, section: usize) -> HeightTargets<usize> {
        let after = (BatchUpdateStage::AfterUpdates, section);
        let Some(before) = self.sections_before_batch_update.as_deref() else {
            return smallvec![after];
        };
        if self.section_indices_to_insert.contains(&section) {
            return smallvec![after];
        }
        if self.section_indices_to_delete.contains(&section) {
            return smallvec![(BatchUpdateStage::BeforeUpdates, section)];
        }
        if let Some(id) = before.get(section).map(SectionModel::id)
            && let Some(after_section) = self
                .current_sections
                .iter()
                .position(|model| model.id() == id)
        {
            return smallvec![
                (BatchUpdateStage::BeforeUpdates, section),
                (BatchUpdateStage::AfterUpdates, after_section),
            ];
        }
        smallvec![after]
    }

    /// Changes the size mode of the current item at `location`.
    ///
    /// Panics if `location` is out of range.
    pub fn update_item_size_mode(&mut self, location: ElementLocation, size_mode: ItemSizeMode) {
        self.current_sections[location.section].update_item_size_mode(location.element, size_mode);
        self.invalidate_section_max_ys(location.section);
    }

    /// Replaces the metrics of the current section at `section`.
    ///
    /// Panics if `section` is out of range.
    pub fn update_metrics(&mut self, section: usize, metrics: SectionMetrics) {
        self.current_sections[section].update_metrics(metrics);
        self.invalidate_section_max_ys(section);
    }

    /// Sets or replaces the header of the current section at `section`.
    pub fn set_header(&mut self, section: usize, header: HeaderModel) {
        self.current_sections[section].set_header(header);
        self.invalidate_section_max_ys(section);
        self.rebuild_element_locations();
    }

    /// Removes the header of the current section at `section`.
    pub fn remove_header(&mut self, section: usize) -> Option<HeaderModel> {
        let header = self.current_sections[section].remove_header()?;
        self.invalidate_section_max_ys(section);
        self.rebuild_element_locations();
        Some(header)
    }

    /// Sets or replaces the footer of the current section at `section`.
    pub fn set_footer(&mut self, section: usize, footer: FooterModel) {
        self.current_sections[section].set_footer(footer);
        self.invalidate_section_max_ys(section);
        self.rebuild_element_locations();
    }

    /// Removes the footer of the current section at `section`.
    pub fn remove_footer(&mut self, section: usize) -> Option<FooterModel> {
        let footer = self.current_sections[section].remove_footer()?;
        self.invalidate_section_max_ys(section);
        self.rebuild_element_locations();
        Some(footer)
    }

    /// Sets or replaces the background of the current section at `section`.
    pub fn set_background(&mut self, section: usize, background: BackgroundModel) {
        self.current_sections[section].set_background(background);
        self.rebuild_element_locations();
    }

    /// Removes the background of the current section at `section`.
    pub fn remove_background(&mut self, section: usize) -> Option<BackgroundModel> {
        let background = self.current_sections[section].remove_background()?;
        self.rebuild_element_locations();
        Some(background)
    }

    /// Begins a batch update and applies `updates` to the current sections.
    ///
    /// Updates are applied in a fixed order no matter how they are listed:
    /// item reloads, section reloads, item deletes from last to first, section
    /// deletes from last to first, section inserts from first to last, then
    /// item inserts from first to last. A move is a delete at its source
    /// followed by an insert of the same element at its destination.
    ///
    /// Panics if a batch update is already in progress, or if any index does
    /// not fit the layout it refers to.
    pub fn apply_updates(&mut self, updates: impl IntoIterator<Item = CollectionUpdate>) {
        assert!(
            self.sections_before_batch_update.is_none(),
            "batch updates cannot nest; call `clear_in_progress_batch_update_state` first"
        );
        self.sections_before_batch_update = Some(self.current_sections.clone());

        let mut item_reloads = Vec::new();
        let mut section_reloads = Vec::new();
        let mut item_deletes = Vec::new();
        let mut section_deletes = Vec::new();
        let mut section_inserts = Vec::new();
        let mut item_inserts = Vec::new();
        let mut first_changed_section = usize::MAX;

        for update in updates {
            match update {
                CollectionUpdate::SectionReload { index, section } => {
                    first_changed_section = first_changed_section.min(index);
                    section_reloads.push((index, section));
                }
                CollectionUpdate::ItemReload {
                    location,
                    size_mode,
                } => {
                    first_changed_section = first_changed_section.min(location.section);
                    item_reloads.push((location, size_mode));
                }
                CollectionUpdate::SectionDelete { index } => {
                    first_changed_section = first_changed_section.min(index);
                    self.section_indices_to_delete.insert(index);
                    section_deletes.push((index, false));
                }
                CollectionUpdate::ItemDelete { location } => {
                    first_changed_section = first_changed_section.min(location.section);
                    self.item_locations_to_delete.insert(location);
                    item_deletes.push((location, false));
                }
                CollectionUpdate::SectionMove { from, to } => {
                    first_changed_section = first_changed_section.min(from).min(to);
                    section_deletes.push((from, true));
                    section_inserts.push((to, Staged::Moved(from)));
                }
                CollectionUpdate::ItemMove { from, to } => {
                    first_changed_section = first_changed_section.min(from.section).min(to.section);
                    item_deletes.push((from, true));
                    item_inserts.push((to, Staged::Moved(from)));
                }
                CollectionUpdate::SectionInsert { index, section } => {
                    first_changed_section = first_changed_section.min(index);
                    self.section_indices_to_insert.insert(index);
                    section_inserts.push((index, Staged::New(section)));
                }
                CollectionUpdate::ItemInsert { location, item } => {
                    first_changed_section = first_changed_section.min(location.section);
                    self.item_locations_to_insert.insert(location);
                    item_inserts.push((location, Staged::New(item)));
                }
            }
        }

        tracing::debug!(
            item_reloads = item_reloads.len(),
            section_reloads = section_reloads.len(),
            item_deletes = item_deletes.len(),
            section_deletes = section_deletes.len(),
            section_inserts = section_inserts.len(),
            item_inserts = item_inserts.len(),
            "applying batch update"
        );

        for (location, size_mode) in item_reloads {
            self.current_sections[location.section]
                .update_item_size_mode(location.element, size_mode);
        }
        for (index, mut section) in section_reloads {
            section.set_id(self.current_sections[index].id());
            self.current_sections[index] = section;
        }

        item_deletes.sort_by(|a, b| b.0.cmp(&a.0));
        let mut moved_items = HashMap::new();
        for (location, moved) in item_deletes {
            let item = self.current_sections[location.section].delete_item(location.element);
            if moved {
                moved_items.insert(location, item);
            }
        }

        section_deletes.sort_by(|a, b| b.0.cmp(&a.0));
        let mut moved_sections = HashMap::new();
        for (index, moved) in section_deletes {
            let section = self.current_sections.remove(index);
            if moved {
                moved_sections.insert(index, section);
            }
        }

        section_inserts.sort_by_key(|&(index, _)| index);
        for (index, staged) in section_inserts {
            let section = match staged {
                Staged::New(section) => section,
                Staged::Moved(from) => moved_sections
                    .remove(&from)
                    .expect("moved section missing from the delete pass"),
            };
            self.current_sections.insert(index, section);
        }

        item_inserts.sort_by_key(|&(location, _)| location);
        for (location, staged) in item_inserts {
            let item = match staged {
                Staged::New(item) => item,
                Staged::Moved(from) => moved_items
                    .remove(&from)
                    .expect("moved item missing from the delete pass"),
            };
            self.current_sections[location.section].insert_item(location.element, item);
        }

        self.section_max_ys
            .resize(self.current_sections.len(), None);
        self.invalidate_section_max_ys(first_changed_section);
        self.rebuild_element_locations();
    }

    /// Ends the batch update, dropping the before snapshot.
    pub fn clear_in_progress_batch_update_state(&mut self) {
        if self.sections_before_batch_update.take().is_some() {
            tracing::debug!("finished batch update");
        }
        self.section_indices_to_insert.clear();
        self.section_indices_to_delete.clear();
        self.item_locations_to_insert.clear();
        self.item_locations_to_delete.clear();
    }
}

fn find_item(sections: &[SectionModel], id: ItemId) -> Option<ElementLocation> {
    sections
        .iter()
        .enumerate()
        .find_map(|(section_index, section)| {
            section
                .items()
                .iter()
                .position(|item| item.id() == id)
                .map(|element| ElementLocation::new(section_index, element))
        })
}

#[cfg(test)]
mod tests {
    use super::ModelState;
    use crate::element::{BackgroundModel, HeaderModel, ItemModel};
    use crate::location::ElementLocation;
    use crate::query::{ElementKind, ElementKinds, intersects};
    use crate::section::SectionModel;
    use crate::types::{
        HeaderFooterHeightMode, ItemHeightMode, ItemSizeMode, ItemWidthMode, SectionMetrics,
    };
    use crate::update::{
        BatchUpdateStage::{AfterUpdates, BeforeUpdates},
        CollectionUpdate,
    };
    use alloc::{vec, vec::Vec};
    use kurbo::Rect;
    use proptest::prelude::*;

    fn fixed(width_mode: ItemWidthMode, height: f64) -> ItemModel {
        ItemModel::new(ItemSizeMode::new(width_mode, ItemHeightMode::Static(height)))
    }

    fn dynamic(estimate: f64) -> ItemModel {
        ItemModel::with_estimated_height(
            ItemSizeMode::new(ItemWidthMode::FULL_WIDTH, ItemHeightMode::Dynamic),
            estimate,
        )
    }

    fn section(items: Vec<ItemModel>) -> SectionModel {
        SectionModel::new(items, None, None, None, SectionMetrics::with_width(320.0))
    }

    fn loc(section: usize, element: usize) -> ElementLocation {
        ElementLocation::new(section, element)
    }

    fn preferred(state: &ModelState, location: ElementLocation, stage: super::BatchUpdateStage) -> Option<f64> {
        state.sections(stage)[location.section]
            .item(location.element)
            .preferred_height()
    }

    #[test]
    fn measured_height_shifts_only_later_sections() {
        let mut state = ModelState::with_sections(vec![
            section(vec![fixed(ItemWidthMode::FULL_WIDTH, 100.0)]),
            section(vec![
                fixed(ItemWidthMode::FULL_WIDTH, 20.0),
                ItemModel::with_estimated_height(
                    ItemSizeMode::new(ItemWidthMode::HALF_WIDTH, ItemHeightMode::Dynamic),
                    10.0,
                ),
            ]),
            section(vec![fixed(ItemWidthMode::FULL_WIDTH, 50.0)]),
        ]);
        assert_eq!(state.content_height(), 180.0);
        assert_eq!(
            state.frame_for_item(loc(1, 1), AfterUpdates),
            Some(Rect::new(0.0, 120.0, 160.0, 130.0))
        );
        assert_eq!(state.frame_for_item(loc(2, 0), AfterUpdates).unwrap().y0, 130.0);

        state.update_item_height(loc(1, 1), 50.0);
        assert_eq!(state.section_max_ys[0], Some(100.0), "earlier sections keep their cache");
        assert_eq!(state.section_max_ys[1], None);
        assert_eq!(state.section_max_y(0, AfterUpdates), 100.0);
        assert_eq!(state.section_max_y(1, AfterUpdates), 170.0);
        assert_eq!(
            state.frame_for_item(loc(1, 1), AfterUpdates),
            Some(Rect::new(0.0, 120.0, 160.0, 170.0))
        );
        assert_eq!(state.frame_for_item(loc(2, 0), AfterUpdates).unwrap().y0, 170.0);
        assert_eq!(state.content_height(), 220.0);
    }

    #[test]
    fn before_snapshot_is_isolated_from_the_batch() {
        let mut state = ModelState::with_sections(vec![section(vec![
            fixed(ItemWidthMode::FULL_WIDTH, 10.0),
            fixed(ItemWidthMode::FULL_WIDTH, 10.0),
            fixed(ItemWidthMode::FULL_WIDTH, 10.0),
        ])]);
        let first = state.id_for_item(loc(0, 0), AfterUpdates);

        state.apply_updates([CollectionUpdate::ItemInsert {
            location: loc(0, 0),
            item: fixed(ItemWidthMode::FULL_WIDTH, 5.0),
        }]);
        assert!(state.is_performing_batch_updates());
        assert_eq!(state.number_of_items(0, BeforeUpdates), 3);
        assert_eq!(state.number_of_items(0, AfterUpdates), 4);
        assert_eq!(
            state.frame_for_item(loc(0, 0), BeforeUpdates),
            Some(Rect::new(0.0, 0.0, 320.0, 10.0))
        );
        assert_eq!(
            state.frame_for_item(loc(0, 1), AfterUpdates),
            Some(Rect::new(0.0, 5.0, 320.0, 15.0))
        );
        assert_eq!(state.id_for_item(loc(0, 0), BeforeUpdates), first);
        assert_eq!(state.location_for_item(first.unwrap(), AfterUpdates), Some(loc(0, 1)));
        assert_eq!(state.frame_for_item(loc(0, 3), BeforeUpdates), None);

        state.clear_in_progress_batch_update_state();
        assert!(!state.is_performing_batch_updates());
        assert_eq!(state.number_of_items(0, BeforeUpdates), 4);
    }

    #[test]
    fn reloaded_items_keep_their_identity() {
        let mut state = ModelState::with_sections(vec![section(vec![dynamic(10.0)])]);
        state.apply_updates([CollectionUpdate::ItemInsert {
            location: loc(0, 1),
            item: dynamic(10.0),
        }]);
        state.clear_in_progress_batch_update_state();
        let id = state.id_for_item(loc(0, 1), AfterUpdates).unwrap();
        state.update_item_height(loc(0, 1), 33.0);

        let half = ItemSizeMode::new(ItemWidthMode::HALF_WIDTH, ItemHeightMode::Static(40.0));
        state.apply_updates([
            CollectionUpdate::ItemReload {
                location: loc(0, 1),
                size_mode: half,
            },
            CollectionUpdate::ItemInsert {
                location: loc(0, 0),
                item: dynamic(10.0),
            },
        ]);
        assert_eq!(state.location_for_item(id, BeforeUpdates), Some(loc(0, 1)));
        assert_eq!(state.location_for_item(id, AfterUpdates), Some(loc(0, 2)));
        let reloaded = state.sections(AfterUpdates)[0].item(2);
        assert_eq!(reloaded.size_mode(), half);
        assert_eq!(reloaded.preferred_height(), None);
        assert_eq!(preferred(&state, loc(0, 1), BeforeUpdates), Some(33.0));
    }

    #[test]
    fn reloaded_sections_keep_their_identity() {
        let mut state = ModelState::with_sections(vec![
            section(vec![fixed(ItemWidthMode::FULL_WIDTH, 10.0)]),
            section(vec![dynamic(10.0)]),
        ]);
        let id = state.id_for_section(1, AfterUpdates).unwrap();

        state.apply_updates([CollectionUpdate::SectionReload {
            index: 1,
            section: section(vec![dynamic(10.0), fixed(ItemWidthMode::FULL_WIDTH, 25.0)]),
        }]);
        assert_eq!(state.id_for_section(1, BeforeUpdates), Some(id));
        assert_eq!(state.id_for_section(1, AfterUpdates), Some(id));
        assert_eq!(state.index_for_section(id, AfterUpdates), Some(1));
        assert_eq!(state.number_of_items(1, BeforeUpdates), 1);
        assert_eq!(state.number_of_items(1, AfterUpdates), 2);
        assert_eq!(state.section_max_y(1, BeforeUpdates), 20.0);
        assert_eq!(state.section_max_y(1, AfterUpdates), 45.0);
    }

    fn packing_items() -> Vec<ItemModel> {
        vec![
            fixed(ItemWidthMode::HALF_WIDTH, 10.0),
            fixed(ItemWidthMode::HALF_WIDTH, 20.0),
            fixed(ItemWidthMode::THIRD_WIDTH, 5.0),
            fixed(ItemWidthMode::THIRD_WIDTH, 15.0),
            fixed(ItemWidthMode::FULL_WIDTH, 30.0),
        ]
    }

    #[test]
    fn delete_then_insert_packs_like_a_replacement() {
        let replacement = fixed(ItemWidthMode::FULL_WIDTH, 12.0);
        let mut expected_items = packing_items();
        expected_items[2] = replacement.clone();
        let mut expected = ModelState::with_sections(vec![section(expected_items)]);

        let mut state = ModelState::with_sections(vec![section(packing_items())]);
        state.apply_updates([
            CollectionUpdate::ItemInsert {
                location: loc(0, 2),
                item: replacement,
            },
            CollectionUpdate::ItemDelete { location: loc(0, 2) },
        ]);

        let mut reloaded = ModelState::with_sections(vec![section(packing_items())]);
        reloaded.apply_updates([CollectionUpdate::ItemReload {
            location: loc(0, 2),
            size_mode: ItemSizeMode::new(ItemWidthMode::FULL_WIDTH, ItemHeightMode::Static(12.0)),
        }]);

        for element in 0..5 {
            let frame = expected.frame_for_item(loc(0, element), AfterUpdates);
            assert_eq!(state.frame_for_item(loc(0, element), AfterUpdates), frame);
            assert_eq!(reloaded.frame_for_item(loc(0, element), AfterUpdates), frame);
        }
        assert_eq!(state.content_height(), expected.content_height());
    }

    #[test]
    fn heights_for_inserted_items_go_to_the_after_snapshot() {
        let mut state =
            ModelState::with_sections(vec![section(vec![dynamic(10.0), dynamic(10.0)])]);
        state.apply_updates([CollectionUpdate::ItemInsert {
            location: loc(0, 0),
            item: dynamic(10.0),
        }]);
        state.update_item_height(loc(0, 0), 30.0);
        assert_eq!(preferred(&state, loc(0, 0), AfterUpdates), Some(30.0));
        assert_eq!(preferred(&state, loc(0, 0), BeforeUpdates), None);
    }

    #[test]
    fn heights_for_deleted_items_go_to_the_before_snapshot() {
        let mut state = ModelState::with_sections(vec![section(vec![
            dynamic(10.0),
            dynamic(10.0),
            dynamic(10.0),
        ])]);
        state.apply_updates([CollectionUpdate::ItemDelete { location: loc(0, 1) }]);
        state.update_item_height(loc(0, 1), 40.0);
        assert_eq!(preferred(&state, loc(0, 1), BeforeUpdates), Some(40.0));
        assert_eq!(preferred(&state, loc(0, 1), AfterUpdates), None);
        assert_eq!(state.frame_for_item(loc(0, 1), BeforeUpdates).unwrap().height(), 40.0);
    }

    #[test]
    fn heights_for_deleted_sections_go_to_the_before_snapshot() {
        let mut state = ModelState::with_sections(vec![
            section(vec![dynamic(10.0)]),
            section(vec![dynamic(10.0)]),
        ]);
        state.apply_updates([CollectionUpdate::SectionDelete { index: 1 }]);
        state.update_item_height(loc(1, 0), 25.0);
        assert_eq!(preferred(&state, loc(1, 0), BeforeUpdates), Some(25.0));
        assert_eq!(state.section_max_y(1, BeforeUpdates), 35.0);
        assert_eq!(state.content_height(), 10.0);
    }

    #[test]
    fn heights_for_moved_items_go_to_both_snapshots() {
        let mut state = ModelState::with_sections(vec![section(vec![
            dynamic(10.0),
            dynamic(10.0),
            dynamic(10.0),
        ])]);
        let moved = state.id_for_item(loc(0, 0), AfterUpdates).unwrap();
        state.apply_updates([CollectionUpdate::ItemMove {
            from: loc(0, 0),
            to: loc(0, 2),
        }]);
        assert_eq!(state.location_for_item(moved, AfterUpdates), Some(loc(0, 2)));

        state.update_item_height(loc(0, 0), 25.0);
        assert_eq!(preferred(&state, loc(0, 0), BeforeUpdates), Some(25.0));
        assert_eq!(preferred(&state, loc(0, 2), AfterUpdates), Some(25.0));
        assert_eq!(preferred(&state, loc(0, 0), AfterUpdates), None);
        assert_eq!(
            state.frame_for_item(loc(0, 2), AfterUpdates),
            Some(Rect::new(0.0, 20.0, 320.0, 45.0))
        );
    }

    #[test]
    fn heights_outside_a_batch_go_to_the_current_sections() {
        let mut state = ModelState::with_sections(vec![section(vec![dynamic(10.0)])]);
        state.update_item_height(loc(0, 0), 12.0);
        assert_eq!(preferred(&state, loc(0, 0), AfterUpdates), Some(12.0));
        assert_eq!(state.content_height(), 12.0);

        // Stale coordinates are ignored.
        state.update_item_height(loc(0, 5), 99.0);
        state.update_item_height(loc(3, 0), 99.0);
        state.update_header_height(3, 99.0);
        assert_eq!(state.content_height(), 12.0);
    }

    #[test]
    fn section_moves_deletes_and_inserts() {
        let sections: Vec<SectionModel> = (0..4).map(|_| section(Vec::new())).collect();
        let ids: Vec<_> = sections.iter().map(SectionModel::id).collect();
        let inserted = section(Vec::new());
        let inserted_id = inserted.id();
        let mut state = ModelState::with_sections(sections);

        state.apply_updates([
            CollectionUpdate::SectionInsert {
                index: 0,
                section: inserted,
            },
            CollectionUpdate::SectionMove { from: 1, to: 2 },
            CollectionUpdate::SectionDelete { index: 0 },
        ]);
        let after: Vec<_> = (0..4)
            .map(|index| state.id_for_section(index, AfterUpdates).unwrap())
            .collect();
        assert_eq!(after, [inserted_id, ids[2], ids[1], ids[3]]);
        assert_eq!(state.index_for_section(ids[0], AfterUpdates), None);
        assert_eq!(state.index_for_section(ids[0], BeforeUpdates), Some(0));
    }

    #[test]
    fn header_heights_follow_moved_sections() {
        let with_header = |estimate| {
            SectionModel::new(
                vec![dynamic(10.0)],
                Some(HeaderModel::new(HeaderFooterHeightMode::Dynamic, estimate, false)),
                None,
                None,
                SectionMetrics::with_width(100.0),
            )
        };
        let mut state = ModelState::with_sections(vec![with_header(5.0), with_header(5.0)]);
        state.apply_updates([CollectionUpdate::SectionMove { from: 0, to: 1 }]);
        state.update_header_height(0, 20.0);
        assert_eq!(state.section_max_y(0, BeforeUpdates), 30.0);
        assert_eq!(state.section_max_y(0, AfterUpdates), 15.0);
        assert_eq!(state.section_max_y(1, AfterUpdates), 45.0);
        assert_eq!(
            state.frame_for_header(1, AfterUpdates),
            Some(Rect::new(0.0, 15.0, 100.0, 35.0))
        );
    }

    #[test]
    #[should_panic(expected = "batch updates cannot nest")]
    fn nested_batch_updates_panic() {
        let mut state = ModelState::with_sections(vec![section(Vec::new())]);
        state.apply_updates([]);
        state.apply_updates([]);
    }

    fn sections_with_headers() -> Vec<SectionModel> {
        (0..2)
            .map(|_| {
                SectionModel::new(
                    (0..4).map(|_| fixed(ItemWidthMode::HALF_WIDTH, 20.0)).collect(),
                    Some(HeaderModel::new(HeaderFooterHeightMode::Static(10.0), 0.0, false)),
                    None,
                    None,
                    SectionMetrics::with_width(100.0),
                )
            })
            .collect()
    }

    #[test]
    fn range_queries_span_sections() {
        let mut state = ModelState::with_sections(sections_with_headers());
        let rect = Rect::new(0.0, 25.0, 100.0, 65.0);

        let items: Vec<_> = state.item_location_frame_pairs(rect).locations().collect();
        assert_eq!(
            items,
            [loc(0, 0), loc(0, 1), loc(0, 2), loc(0, 3), loc(1, 0), loc(1, 1)]
        );
        let headers = state.header_location_frame_pairs(rect);
        assert_eq!(headers.as_slice(), [(loc(1, 0), Rect::new(0.0, 50.0, 100.0, 60.0))]);
        assert!(state.footer_location_frame_pairs(rect).is_empty());

        let right_column: Vec<_> = state
            .item_location_frame_pairs(Rect::new(60.0, 0.0, 100.0, 35.0))
            .locations()
            .collect();
        assert_eq!(right_column, [loc(0, 1), loc(0, 3)]);

        let elements = state.elements_in_rect(rect, ElementKinds::ITEMS | ElementKinds::HEADERS);
        assert_eq!(elements.len(), 7);
        assert_eq!(elements.last().map(|element| element.0), Some(ElementKind::Header));
        assert!(state.elements_in_rect(rect, ElementKinds::BACKGROUNDS).is_empty());

        state.set_background(1, BackgroundModel::new());
        let backgrounds = state.background_location_frame_pairs(rect);
        assert_eq!(backgrounds.as_slice(), [(loc(1, 0), Rect::new(0.0, 50.0, 100.0, 100.0))]);
    }

    #[test]
    fn pinned_headers_follow_the_visible_bounds() {
        let mut sections = sections_with_headers();
        sections[1].set_header(HeaderModel::new(HeaderFooterHeightMode::Static(10.0), 0.0, true));
        let mut state = ModelState::with_sections(sections);

        state.set_visible_bounds(Rect::new(0.0, 70.0, 100.0, 170.0));
        assert_eq!(
            state.frame_for_header(1, AfterUpdates),
            Some(Rect::new(0.0, 70.0, 100.0, 80.0))
        );
        state.set_visible_bounds(Rect::new(0.0, 95.0, 100.0, 195.0));
        assert_eq!(state.frame_for_header(1, AfterUpdates).unwrap().y0, 90.0);
        state.set_visible_bounds(Rect::new(0.0, 0.0, 100.0, 100.0));
        assert_eq!(state.frame_for_header(1, AfterUpdates).unwrap().y0, 50.0);
        assert_eq!(state.frame_for_header(0, AfterUpdates).unwrap().y0, 0.0);
    }

    #[test]
    fn pinned_footers_follow_the_visible_bounds() {
        let mut sections = sections_with_headers();
        sections[1].set_footer(HeaderModel::new(HeaderFooterHeightMode::Static(10.0), 0.0, true));
        let mut state = ModelState::with_sections(sections);
        assert_eq!(state.section_max_y(1, AfterUpdates), 110.0);

        state.set_visible_bounds(Rect::new(0.0, -10.0, 100.0, 90.0));
        assert_eq!(
            state.frame_for_footer(1, AfterUpdates),
            Some(Rect::new(0.0, 80.0, 100.0, 90.0))
        );
        state.set_visible_bounds(Rect::new(0.0, 100.0, 100.0, 200.0));
        assert_eq!(state.frame_for_footer(1, AfterUpdates).unwrap().y0, 100.0);
        state.set_visible_bounds(Rect::new(0.0, -45.0, 100.0, 55.0));
        assert_eq!(state.frame_for_footer(1, AfterUpdates).unwrap().y0, 60.0);
        assert_eq!(state.frame_for_footer(0, AfterUpdates), None);
    }

    #[test]
    fn supplementary_mutations_update_locations_and_positions() {
        let mut state = ModelState::with_sections(sections_with_headers());
        assert_eq!(state.section_max_y(1, AfterUpdates), 100.0);

        let header = state.remove_header(0).unwrap();
        assert_eq!(header.height_mode(), HeaderFooterHeightMode::Static(10.0));
        assert_eq!(state.header_height_mode(0, AfterUpdates), None);
        assert_eq!(state.content_height(), 90.0);
        assert_eq!(state.header_location_frame_pairs(Rect::new(0.0, 0.0, 100.0, 100.0)).len(), 1);

        state.set_footer(1, HeaderModel::new(HeaderFooterHeightMode::Static(4.0), 0.0, false));
        assert_eq!(state.content_height(), 94.0);
        assert_eq!(
            state.frame_for_footer(1, AfterUpdates),
            Some(Rect::new(0.0, 90.0, 100.0, 94.0))
        );

        state.update_metrics(0, SectionMetrics::with_width(50.0));
        assert_eq!(state.frame_for_item(loc(0, 1), AfterUpdates).unwrap().x0, 25.0);
        state.update_item_size_mode(
            loc(0, 0),
            ItemSizeMode::new(ItemWidthMode::FULL_WIDTH, ItemHeightMode::Static(20.0)),
        );
        assert_eq!(state.section_max_y(0, AfterUpdates), 60.0);
    }

    fn arb_section() -> impl Strategy<Value = SectionModel> {
        (
            prop::collection::vec((0_u32..=4, 0_u32..50), 0..30),
            prop::option::of(1_u32..30),
            prop::option::of(1_u32..30),
        )
            .prop_map(|(items, header, footer)| {
                let items = items
                    .into_iter()
                    .map(|(divisor, height)| {
                        let width_mode = if divisor == 0 {
                            ItemWidthMode::FULL_WIDTH
                        } else {
                            ItemWidthMode::fractional(divisor)
                        };
                        fixed(width_mode, f64::from(height))
                    })
                    .collect();
                let supplementary = |height: u32| {
                    HeaderModel::new(HeaderFooterHeightMode::Static(f64::from(height)), 0.0, false)
                };
                SectionModel::new(
                    items,
                    header.map(supplementary),
                    footer.map(supplementary),
                    Some(BackgroundModel::new()),
                    SectionMetrics {
                        vertical_spacing: 4.0,
                        horizontal_spacing: 2.0,
                        ..SectionMetrics::with_width(300.0)
                    },
                )
            })
    }

    proptest! {
        #[test]
        fn range_queries_match_a_brute_force_filter(
            sections in prop::collection::vec(arb_section(), 0..5),
            x in 0_u32..300,
            y in 0_u32..2000,
            width in 1_u32..300,
            height in 0_u32..400,
        ) {
            let mut state = ModelState::with_sections(sections);
            let rect = Rect::new(
                f64::from(x),
                f64::from(y),
                f64::from(x + width),
                f64::from(y + height),
            );

            for kind in [ElementKind::Item, ElementKind::Header, ElementKind::Footer, ElementKind::Background] {
                let all = state.element_locations_mut(kind).clone();
                let expected: Vec<ElementLocation> = all
                    .into_iter()
                    .filter(|&location| {
                        let frame = state.frame_for(kind, location, AfterUpdates).unwrap();
                        intersects(frame, rect)
                    })
                    .collect();
                let actual: Vec<ElementLocation> =
                    state.location_frame_pairs(kind, rect).locations().collect();
                prop_assert_eq!(actual, expected);
            }
        }
    }
}
