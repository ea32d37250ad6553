// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Default estimates and spacing.

/// Height used for a dynamic item until its measured height is reported.
pub const ESTIMATED_ITEM_HEIGHT: f64 = 150.0;

/// Height used for a dynamic header until its measured height is reported.
pub const ESTIMATED_HEADER_HEIGHT: f64 = 44.0;

/// Height used for a dynamic footer until its measured height is reported.
pub const ESTIMATED_FOOTER_HEIGHT: f64 = 44.0;

/// Default space between items in the same row.
pub const HORIZONTAL_SPACING: f64 = 0.0;

/// Default space between item rows.
pub const VERTICAL_SPACING: f64 = 0.0;
