//! Stateful splitting session
//!
//! Holds everything the user edits for one source document: cut lines,
//! page-end dispositions, crop bands, the greyscale flag and what is known
//! about page sizes. Every run (segmentation, planning, export) works on a
//! copy of that state taken when the run starts.

use crate::annotations::{AnnotationStore, HistoryEntry, LineId, PageEndDisposition};
use crate::clip::{plan_documents, DocumentPlan};
use crate::command::{submit_documents, SegmentSubmitter, SplitRequest};
use crate::config::{ClickPolicy, SplitterConfig};
use crate::coords::{PageSize, PageTable};
use crate::crop::{CropBox, CropBoxes, CropId};
use crate::error::HymnSplitError;
use crate::export::assemble_pdf;
use crate::raster::{rasterize_bands, RasterOutput};
use crate::render::{measure_document, StackPage};
use crate::segment::{segment_pages, OutputDocument, Segmentation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// What a click on a page did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    Added(LineId),
    /// An existing line was flipped; carries its new boundary flag
    Toggled(LineId, bool),
}

/// Serializable state of a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSnapshot {
    pub annotations: AnnotationStore,
    pub pages: PageTable,
    pub crops: CropBoxes,
    pub greyscale: bool,
}

pub struct SplitSession {
    config: SplitterConfig,
    annotations: AnnotationStore,
    pages: PageTable,
    crops: CropBoxes,
    greyscale: bool,
    /// Latest line created on each page, with its creation time
    recent: BTreeMap<u32, (LineId, u64)>,
}

impl SplitSession {
    pub fn new(config: SplitterConfig) -> Self {
        let crops = CropBoxes::new(0.0, config.min_crop_height, config.default_crop_height);
        let greyscale = config.greyscale;
        Self {
            config,
            annotations: AnnotationStore::new(),
            pages: PageTable::new(),
            crops,
            greyscale,
            recent: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &SplitterConfig {
        &self.config
    }

    pub fn annotations(&self) -> &AnnotationStore {
        &self.annotations
    }

    pub fn pages(&self) -> &PageTable {
        &self.pages
    }

    // ============ Page measurement ============

    /// Record native page sizes, 1-based in slice order.
    pub fn set_native_sizes(&mut self, sizes: &[PageSize]) {
        for (i, size) in sizes.iter().enumerate() {
            let page = i as u32 + 1;
            self.pages.set_native(page, *size);
            self.annotations.ensure_page(page);
        }
        self.crops.set_container_height(self.stack_height());
    }

    /// Read native page sizes from PDF bytes. Returns the page count.
    pub fn load_pdf(&mut self, bytes: &[u8]) -> Result<u32, HymnSplitError> {
        let sizes = measure_document(bytes)?;
        self.set_native_sizes(&sizes);
        info!(pages = sizes.len(), "Loaded document");
        Ok(sizes.len() as u32)
    }

    /// A page finished rendering at `size` in the annotation view.
    pub fn page_rendered(&mut self, page: u32, size: PageSize) {
        self.pages.set_rendered(page, size);
        self.annotations.ensure_page(page);
    }

    /// The view is about to re-render (zoom, resize); rendered sizes are stale.
    pub fn viewport_changed(&mut self) {
        self.pages.invalidate_rendered();
    }

    /// Height of all pages stacked in the crop viewer
    pub fn stack_height(&self) -> f64 {
        self.pages
            .page_numbers()
            .filter_map(|p| self.pages.get(p).native_height())
            .sum::<f64>()
            * self.config.viewer_scale
    }

    // ============ Lines ============

    /// Interpret a click at `rendered_y` on `page` at time `at_ms`.
    ///
    /// Lands near an existing line: that line's boundary flag flips.
    /// Otherwise a new line is added.
    pub fn click(&mut self, page: u32, rendered_y: f64, at_ms: u64) -> ClickOutcome {
        if let Some(id) = self.click_target(page, rendered_y, at_ms) {
            if let Ok(flag) = self.annotations.toggle_line_boundary(id) {
                debug!(page, line = id, boundary = flag, "Toggled line");
                return ClickOutcome::Toggled(id, flag);
            }
        }
        let id = self.add_line(page, rendered_y);
        self.recent.insert(page, (id, at_ms));
        ClickOutcome::Added(id)
    }

    fn click_target(&self, page: u32, rendered_y: f64, at_ms: u64) -> Option<LineId> {
        let tolerance = self.config.click_tolerance;
        match self.config.click_policy {
            ClickPolicy::Nearest => self
                .annotations
                .page(page)
                .nearest_line(rendered_y, tolerance)
                .map(|l| l.id),
            ClickPolicy::Recent => {
                let (id, created) = *self.recent.get(&page)?;
                let line = self.annotations.page(page).line(id)?.clone();
                let in_time = at_ms.saturating_sub(created) <= self.config.double_click_window_ms;
                let in_reach = (line.y - rendered_y).abs() <= tolerance;
                (in_time && in_reach).then_some(id)
            }
        }
    }

    pub fn add_line(&mut self, page: u32, rendered_y: f64) -> LineId {
        let id = self.annotations.add_line(page, rendered_y);
        debug!(page, line = id, y = rendered_y, "Added line");
        id
    }

    pub fn toggle_line_boundary(&mut self, id: LineId) -> Result<bool, HymnSplitError> {
        self.annotations.toggle_line_boundary(id)
    }

    pub fn remove_line(&mut self, page: u32, id: LineId) -> Result<(), HymnSplitError> {
        self.annotations.remove_line(page, id)?;
        self.recent.retain(|_, (line, _)| *line != id);
        Ok(())
    }

    pub fn cycle_disposition(&mut self, page: u32) -> PageEndDisposition {
        self.annotations.cycle_disposition(page)
    }

    pub fn set_disposition(&mut self, page: u32, disposition: PageEndDisposition) {
        self.annotations.set_disposition(page, disposition)
    }

    pub fn undo_last_line(&mut self) -> Result<HistoryEntry, HymnSplitError> {
        let entry = self.annotations.undo_last_line()?;
        self.recent.retain(|_, (line, _)| *line != entry.line_id);
        Ok(entry)
    }

    // ============ Segmentation ============

    pub fn segments(&self) -> Segmentation {
        let (store, pages) = (self.annotations.clone(), self.pages.clone());
        segment_pages(store.pages(), &pages)
    }

    pub fn documents(&self) -> Vec<OutputDocument> {
        self.segments().documents()
    }

    pub fn split_request(&self, pdf_id: &str) -> SplitRequest {
        SplitRequest::new(pdf_id, &self.documents())
    }

    /// Per-document output pages for the current annotations
    pub fn plan(&self) -> Result<Vec<DocumentPlan>, HymnSplitError> {
        let pages = self.pages.clone();
        plan_documents(&self.documents(), &pages, self.config.output_page)
    }

    /// Send the current documents to the packaging service. Session state is
    /// left as it was whatever the outcome.
    pub fn submit(
        &self,
        submitter: &dyn SegmentSubmitter,
        pdf_id: &str,
    ) -> Result<Vec<u8>, HymnSplitError> {
        submit_documents(submitter, &self.split_request(pdf_id))
    }

    // ============ Crop mode ============

    pub fn crops(&self) -> &[CropBox] {
        self.crops.boxes()
    }

    pub fn add_crop(&mut self, top: f64) -> Result<CropId, HymnSplitError> {
        self.crops.add(top)
    }

    /// Add a band of a given height, keeping `top` unless it would overhang.
    pub fn insert_crop(&mut self, top: f64, height: f64) -> Result<CropId, HymnSplitError> {
        self.crops.insert(top, height)
    }

    pub fn remove_crop(&mut self, id: CropId) -> bool {
        self.crops.remove(id)
    }

    pub fn drag_crop(&mut self, id: CropId, start_top: f64, dy: f64) -> bool {
        self.crops.drag(id, start_top, dy)
    }

    pub fn resize_crop_top(&mut self, id: CropId, start_top: f64, start_height: f64, dy: f64) -> bool {
        self.crops.resize_top(id, start_top, start_height, dy)
    }

    pub fn resize_crop_bottom(&mut self, id: CropId, start_height: f64, dy: f64) -> bool {
        self.crops.resize_bottom(id, start_height, dy)
    }

    pub fn greyscale(&self) -> bool {
        self.greyscale
    }

    pub fn toggle_greyscale(&mut self) -> bool {
        self.greyscale = !self.greyscale;
        self.greyscale
    }

    /// Cut and fit every crop band from `stack`.
    pub fn rasterize(&self, stack: &[StackPage]) -> Result<RasterOutput, HymnSplitError> {
        let crops = self.crops.boxes().to_vec();
        rasterize_bands(stack, &crops, &self.config.raster_options(self.greyscale))
    }

    /// Rasterize every band and assemble the output PDF.
    pub fn export(&self, stack: &[StackPage]) -> Result<Vec<u8>, HymnSplitError> {
        if self.crops.is_empty() {
            return Err(HymnSplitError::InvalidCropBox("No crop bands to export".into()));
        }
        let output = self.rasterize(stack)?;
        let pdf = assemble_pdf(&output.pages)?;
        info!(
            pages = output.pages.len(),
            skipped = output.skipped.len(),
            "Exported crop bands"
        );
        Ok(pdf)
    }

    // ============ Persistence ============

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            annotations: self.annotations.clone(),
            pages: self.pages.clone(),
            crops: self.crops.clone(),
            greyscale: self.greyscale,
        }
    }

    pub fn restore(&mut self, snapshot: SessionSnapshot) {
        self.annotations = snapshot.annotations;
        self.pages = snapshot.pages;
        self.crops = snapshot.crops;
        self.greyscale = snapshot.greyscale;
        self.recent.clear();
    }

    pub fn to_json(&self) -> Result<String, HymnSplitError> {
        Ok(serde_json::to_string(&self.snapshot())?)
    }

    pub fn restore_json(&mut self, json: &str) -> Result<(), HymnSplitError> {
        let snapshot: SessionSnapshot = serde_json::from_str(json)?;
        self.restore(snapshot);
        Ok(())
    }
}
