// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Section/element coordinates.

/// The position of an element as a `(section, element)` pair.
///
/// For items, `element` is the item's index within its section. Headers,
/// footers, and backgrounds occur at most once per section and always use
/// `element == 0`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElementLocation {
    /// Index of the owning section.
    pub section: usize,
    /// Index of the element within the section.
    pub element: usize,
}

impl ElementLocation {
    /// Creates a location from a section index and an element index.
    #[inline]
    #[must_use]
    pub const fn new(section: usize, element: usize) -> Self {
        Self { section, element }
    }

    /// The location used for a section's single header, footer, or background.
    #[inline]
    #[must_use]
    pub const fn supplementary(section: usize) -> Self {
        Self::new(section, 0)
    }
}
