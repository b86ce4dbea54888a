//! Coordinate conversion between the rendered view and native page space
//!
//! Lines are captured in the coordinate space of the page as it is displayed
//! (after zoom/fit scaling). Segmentation works in the page's native space.
//! Scaling is assumed uniform on the vertical axis: no rotation, no per-axis
//! distortion.

use crate::error::HymnSplitError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Width and height of a page, in whatever units the owner says
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl PageSize {
    /// US Letter in PDF points (72 per inch)
    pub const LETTER: PageSize = PageSize {
        width: 612.0,
        height: 792.0,
    };

    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn aspect(&self) -> f64 {
        self.width / self.height
    }

    fn is_usable(&self) -> bool {
        usable(self.width) && usable(self.height)
    }
}

fn usable(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

/// Convert a rendered-view y coordinate to native page units.
///
/// Returns `None` when either height is unknown (zero, negative or NaN).
pub fn to_native_y(rendered_y: f64, native_height: f64, rendered_height: f64) -> Option<f64> {
    if !usable(native_height) || !usable(rendered_height) {
        return None;
    }
    Some(rendered_y * (native_height / rendered_height))
}

/// Inverse of [`to_native_y`].
pub fn to_rendered_y(native_y: f64, native_height: f64, rendered_height: f64) -> Option<f64> {
    if !usable(native_height) || !usable(rendered_height) {
        return None;
    }
    Some(native_y * (rendered_height / native_height))
}

/// What is currently known about one page's dimensions
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct PageMetrics {
    /// Native size; fixed once known
    pub native: Option<PageSize>,
    /// Size as last rendered; replaced on every measurement
    pub rendered: Option<PageSize>,
}

impl PageMetrics {
    pub fn native_height(&self) -> Option<f64> {
        self.native.filter(PageSize::is_usable).map(|s| s.height)
    }

    pub fn rendered_height(&self) -> Option<f64> {
        self.rendered.filter(PageSize::is_usable).map(|s| s.height)
    }
}

/// Per-page dimension table keyed by 1-based page number
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PageTable {
    pages: BTreeMap<u32, PageMetrics>,
}

impl PageTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table with native sizes only (nothing rendered yet)
    pub fn from_native(sizes: &[PageSize]) -> Self {
        let mut table = Self::new();
        for (i, size) in sizes.iter().enumerate() {
            table.set_native(i as u32 + 1, *size);
        }
        table
    }

    /// Record a page's native size. A size that is already known is kept.
    pub fn set_native(&mut self, page: u32, size: PageSize) {
        let entry = self.pages.entry(page).or_default();
        if entry.native_height().is_none() {
            entry.native = Some(size);
        }
    }

    /// Record the page's current rendered size, replacing any previous measurement.
    pub fn set_rendered(&mut self, page: u32, size: PageSize) {
        self.pages.entry(page).or_default().rendered = Some(size);
    }

    /// Forget all rendered sizes (e.g. viewport resize before re-measurement).
    pub fn invalidate_rendered(&mut self) {
        for metrics in self.pages.values_mut() {
            metrics.rendered = None;
        }
    }

    pub fn get(&self, page: u32) -> PageMetrics {
        self.pages.get(&page).copied().unwrap_or_default()
    }

    pub fn page_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.pages.keys().copied()
    }

    /// Highest page number with any metrics
    pub fn last_page(&self) -> Option<u32> {
        self.pages.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn native_height(&self, page: u32) -> Result<f64, HymnSplitError> {
        self.get(page)
            .native_height()
            .ok_or(HymnSplitError::MissingDimensionData { page })
    }

    /// Convert a rendered y on `page` to native units.
    pub fn native_y(&self, page: u32, rendered_y: f64) -> Result<f64, HymnSplitError> {
        let metrics = self.get(page);
        match (metrics.native_height(), metrics.rendered_height()) {
            (Some(native), Some(rendered)) => to_native_y(rendered_y, native, rendered)
                .ok_or(HymnSplitError::MissingDimensionData { page }),
            _ => Err(HymnSplitError::MissingDimensionData { page }),
        }
    }
}
