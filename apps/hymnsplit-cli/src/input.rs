//! On-disk input formats
//!
//! Annotation file:
//!
//! ```json
//! {
//!   "pages": [
//!     {
//!       "page": 1,
//!       "renderedHeight": 396.0,
//!       "lines": [{ "y": 100.0, "documentBoundary": false }],
//!       "disposition": "pageEnd"
//!     }
//!   ]
//! }
//! ```
//!
//! Line positions are in the rendered view of that page. Crop boxes file:
//! `[{ "top": 0.0, "height": 300.0 }]`, in crop viewer units.

use anyhow::{bail, Context, Result};
use hymnsplit_core::{PageEndDisposition, PageSize, SplitSession};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AnnotationFile {
    pub pages: Vec<PageEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageEntry {
    pub page: u32,
    pub rendered_height: Option<f64>,
    #[serde(default)]
    pub lines: Vec<LineEntry>,
    #[serde(default)]
    pub disposition: PageEndDisposition,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineEntry {
    pub y: f64,
    #[serde(default)]
    pub document_boundary: bool,
}

#[derive(Debug, Deserialize)]
pub struct BoxEntry {
    pub top: f64,
    pub height: f64,
}

impl AnnotationFile {
    /// Replay the file through the session's editing operations, so ids and
    /// history come out as if the lines had been drawn in file order.
    pub fn apply(&self, session: &mut SplitSession) -> Result<()> {
        for entry in &self.pages {
            if entry.page == 0 {
                bail!("Page numbers start at 1");
            }
            if let Some(height) = entry.rendered_height {
                let width = session
                    .pages()
                    .get(entry.page)
                    .native
                    .map(|n| n.aspect() * height)
                    .unwrap_or(height);
                session.page_rendered(entry.page, PageSize::new(width, height));
            }
            session.set_disposition(entry.page, entry.disposition);
            for line in &entry.lines {
                let id = session.add_line(entry.page, line.y);
                if line.document_boundary {
                    session.toggle_line_boundary(id)?;
                }
            }
        }
        Ok(())
    }
}

/// Add each box to the session exactly where the file places it.
pub fn apply_boxes(boxes: &[BoxEntry], session: &mut SplitSession) -> Result<()> {
    for (i, entry) in boxes.iter().enumerate() {
        let id = session
            .insert_crop(entry.top, entry.height)
            .with_context(|| format!("Crop box {}", i))?;
        let placed = session.crops().iter().find(|b| b.id == id).map(|b| b.top);
        if placed != Some(entry.top) {
            session.remove_crop(id);
            bail!(
                "Crop box {} at {} runs past the bottom of the pages ({})",
                i,
                entry.top,
                session.stack_height()
            );
        }
    }
    Ok(())
}
