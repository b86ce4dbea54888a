//! Region rasterizer
//!
//! Pages are stacked top to bottom at the oversampling scale. Each crop band,
//! given in viewer coordinates over the same stack, is converted to
//! oversampled pixels, cut out at full width, optionally desaturated and
//! fitted onto its own output page.

use crate::coords::PageSize;
use crate::crop::{CropBox, CropId};
use crate::error::HymnSplitError;
use crate::fit::{fit_to_page, Placement};
use crate::render::{PageRender, StackPage};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// What to do when a band needs a page that has not finished rendering
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IncompletePolicy {
    /// Fail the whole export
    #[default]
    Abort,
    /// Drop the affected bands and export the rest
    SkipPage,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterOptions {
    /// Pixels per native unit of the page rasters
    pub oversampling: f64,
    /// Rendered units per native unit of the viewer the bands were drawn in
    pub viewer_scale: f64,
    pub greyscale: bool,
    pub output_page: PageSize,
    pub incomplete: IncompletePolicy,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            oversampling: 3.0,
            viewer_scale: 1.5,
            greyscale: false,
            output_page: PageSize::LETTER,
            incomplete: IncompletePolicy::Abort,
        }
    }
}

/// One output page: a cut band and where it goes on the page
#[derive(Debug, Clone)]
pub struct FittedPage {
    pub source: CropId,
    pub band: RgbaImage,
    pub placement: Placement,
    pub page_size: PageSize,
}

impl FittedPage {
    /// Draw the output page at `scale` pixels per page unit on white.
    pub fn compose(&self, scale: f64) -> RgbaImage {
        let width = ((self.page_size.width * scale).round() as u32).max(1);
        let height = ((self.page_size.height * scale).round() as u32).max(1);
        let mut canvas = RgbaImage::from_pixel(width, height, WHITE);

        let draw_w = ((self.placement.draw_width * scale).round() as u32).clamp(1, width);
        let draw_h = ((self.placement.draw_height * scale).round() as u32).clamp(1, height);
        let scaled = imageops::resize(&self.band, draw_w, draw_h, FilterType::Triangle);

        let x = (self.placement.pad_x * scale).round() as i64;
        let y = (self.placement.pad_y * scale).round() as i64;
        imageops::overlay(&mut canvas, &scaled, x, y);
        canvas
    }
}

/// Outcome of a rasterization run
#[derive(Debug, Clone, Default)]
pub struct RasterOutput {
    pub pages: Vec<FittedPage>,
    /// Bands dropped under [`IncompletePolicy::SkipPage`]
    pub skipped: Vec<CropId>,
    /// Still-rendering pages those bands needed, ascending
    pub pending_pages: Vec<u32>,
}

/// Pixel rows each page occupies in the stack
#[derive(Debug, Clone, PartialEq)]
pub struct StackLayout {
    offsets: Vec<u32>,
    heights: Vec<u32>,
    pub width: u32,
}

impl StackLayout {
    /// Lay pages out at `oversampling` pixels per native unit. A rendered
    /// page uses its actual raster size, a pending one the expected size.
    pub fn new(pages: &[StackPage], oversampling: f64) -> Self {
        let mut offsets = Vec::with_capacity(pages.len());
        let mut heights = Vec::with_capacity(pages.len());
        let mut width = 0;
        let mut y = 0u32;

        for page in pages {
            let (w, h) = match &page.render {
                PageRender::Ready(img) => img.dimensions(),
                PageRender::Pending => (
                    (page.native.width * oversampling).round() as u32,
                    (page.native.height * oversampling).round() as u32,
                ),
            };
            offsets.push(y);
            heights.push(h);
            width = width.max(w);
            y = y.saturating_add(h);
        }

        Self {
            offsets,
            heights,
            width,
        }
    }

    pub fn height(&self) -> u32 {
        match (self.offsets.last(), self.heights.last()) {
            (Some(o), Some(h)) => o + h,
            _ => 0,
        }
    }

    /// Indices of pages overlapping rows `[top, top + height)`
    pub fn pages_in(&self, top: u32, height: u32) -> Vec<usize> {
        let bottom = top.saturating_add(height);
        (0..self.offsets.len())
            .filter(|&i| {
                let start = self.offsets[i];
                let end = start + self.heights[i];
                start < bottom && end > top && self.heights[i] > 0
            })
            .collect()
    }
}

/// Convert a viewer-space band to oversampled pixel rows, clamped to the stack.
pub fn band_rows(crop: &CropBox, options: &RasterOptions, stack_height: u32) -> (u32, u32) {
    let ratio = options.oversampling / options.viewer_scale;
    let top = ((crop.top * ratio).round().max(0.0) as u32).min(stack_height);
    let height = ((crop.height * ratio).round().max(1.0) as u32).min(stack_height - top);
    (top, height)
}

/// Replace each pixel with its Rec.601 luminance on all three channels.
pub fn desaturate(img: &mut RgbaImage) {
    for pixel in img.pixels_mut() {
        let [r, g, b, a] = pixel.0;
        let y = (0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64)
            .round()
            .clamp(0.0, 255.0) as u8;
        *pixel = Rgba([y, y, y, a]);
    }
}

/// Copy rows `[top, top + height)` of the stack into a new full-width image.
fn extract_band(pages: &[StackPage], layout: &StackLayout, top: u32, height: u32) -> RgbaImage {
    let mut band = RgbaImage::from_pixel(layout.width.max(1), height.max(1), WHITE);

    for i in layout.pages_in(top, height) {
        let PageRender::Ready(img) = &pages[i].render else {
            continue;
        };
        let page_top = layout.offsets[i];
        let from = top.max(page_top) - page_top;
        let to = (top + height).min(page_top + layout.heights[i]) - page_top;
        let rows = to.saturating_sub(from).min(img.height().saturating_sub(from));
        if rows == 0 {
            continue;
        }
        let slice = imageops::crop_imm(img, 0, from, img.width(), rows).to_image();
        let dest_y = page_top + from - top;
        imageops::replace(&mut band, &slice, 0, dest_y as i64);
    }

    band
}

/// Cut, desaturate and fit every band, one output page per band in band order.
pub fn rasterize_bands(
    pages: &[StackPage],
    crops: &[CropBox],
    options: &RasterOptions,
) -> Result<RasterOutput, HymnSplitError> {
    if !(options.oversampling > 0.0 && options.viewer_scale > 0.0) {
        return Err(HymnSplitError::OperationError(
            "Oversampling and viewer scale must be positive".into(),
        ));
    }

    let layout = StackLayout::new(pages, options.oversampling);
    let stack_height = layout.height();

    let rows: Vec<(u32, u32)> = crops
        .iter()
        .map(|c| band_rows(c, options, stack_height))
        .collect();

    let pending = |top: u32, height: u32| -> Vec<u32> {
        layout
            .pages_in(top, height)
            .into_iter()
            .filter(|&i| !pages[i].render.is_ready())
            .map(|i| i as u32 + 1)
            .collect()
    };

    if options.incomplete == IncompletePolicy::Abort {
        let missing: BTreeSet<u32> = rows.iter().flat_map(|&(t, h)| pending(t, h)).collect();
        if !missing.is_empty() {
            return Err(HymnSplitError::RenderingIncomplete {
                pages: missing.into_iter().collect(),
            });
        }
    }

    let mut output = RasterOutput::default();
    for (crop, &(top, height)) in crops.iter().zip(&rows) {
        let waiting = pending(top, height);
        if !waiting.is_empty() {
            warn!(crop = crop.id, pages = ?waiting, "Pages still rendering, skipping band");
            output.skipped.push(crop.id);
            for page in waiting {
                if let Err(at) = output.pending_pages.binary_search(&page) {
                    output.pending_pages.insert(at, page);
                }
            }
            continue;
        }
        if height == 0 || layout.width == 0 {
            warn!(crop = crop.id, "Band lies outside the page stack, skipping");
            output.skipped.push(crop.id);
            continue;
        }

        let mut band = extract_band(pages, &layout, top, height);
        if options.greyscale {
            desaturate(&mut band);
        }

        let placement = fit_to_page(
            band.width() as f64,
            band.height() as f64,
            options.output_page,
        )
        .ok_or_else(|| HymnSplitError::InvalidCropBox(format!("Band {} is empty", crop.id)))?;

        output.pages.push(FittedPage {
            source: crop.id,
            band,
            placement,
            page_size: options.output_page,
        });
    }

    debug!(
        pages = output.pages.len(),
        skipped = output.skipped.len(),
        "Rasterized crop bands"
    );
    Ok(output)
}
