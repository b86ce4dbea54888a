//! Page measurement and the rendering seam
//!
//! Turning a page into pixels is left to the embedding application through
//! [`PageRenderer`]. Native page sizes are read here from the PDF's MediaBox.

use crate::coords::PageSize;
use crate::error::HymnSplitError;
use image::RgbaImage;
use lopdf::{Dictionary, Document, Object};
use tracing::debug;

/// Points per inch; native page units are PDF points
pub const BASE_DPI: f64 = 72.0;

/// Something that can measure and rasterize the pages of one source document.
///
/// Implementations must be callable repeatedly at different scales without
/// touching the source document.
pub trait PageRenderer {
    fn page_count(&self) -> u32;

    /// Native size of a 1-based page
    fn measure_page(&self, page: u32) -> Result<PageSize, HymnSplitError>;

    /// Rasterize a 1-based page at `scale` pixels per native unit
    fn render_page(&self, page: u32, scale: f64) -> Result<RgbaImage, HymnSplitError>;
}

/// Raster state of one page in the stack
#[derive(Debug, Clone)]
pub enum PageRender {
    /// Still rendering
    Pending,
    Ready(RgbaImage),
}

impl PageRender {
    pub fn is_ready(&self) -> bool {
        matches!(self, PageRender::Ready(_))
    }
}

/// A page of the stacked view: native size plus whatever has been rendered
#[derive(Debug, Clone)]
pub struct StackPage {
    pub native: PageSize,
    pub render: PageRender,
}

/// Render every page of `renderer` at `scale`, in page order.
pub fn render_stack(
    renderer: &dyn PageRenderer,
    scale: f64,
) -> Result<Vec<StackPage>, HymnSplitError> {
    (1..=renderer.page_count())
        .map(|page| {
            Ok(StackPage {
                native: renderer.measure_page(page)?,
                render: PageRender::Ready(renderer.render_page(page, scale)?),
            })
        })
        .collect()
}

/// Read the native size of every page, in page order.
pub fn measure_document(bytes: &[u8]) -> Result<Vec<PageSize>, HymnSplitError> {
    let doc = Document::load_mem(bytes).map_err(|e| HymnSplitError::ParseError(e.to_string()))?;
    let pages = doc.get_pages();

    let mut sizes = Vec::with_capacity(pages.len());
    for (page_num, page_id) in pages {
        let page_dict = doc
            .get_object(page_id)
            .and_then(Object::as_dict)
            .map_err(|_| {
                HymnSplitError::ParseError(format!("Page {} is not a dictionary", page_num))
            })?;
        let media_box = get_media_box(&doc, page_dict)?;
        sizes.push(PageSize::new(
            (media_box[2] - media_box[0]).abs(),
            (media_box[3] - media_box[1]).abs(),
        ));
    }

    debug!(pages = sizes.len(), "Measured document");
    Ok(sizes)
}

/// MediaBox of a page, inherited from the parent node when absent; Letter by default
fn get_media_box(doc: &Document, page_dict: &Dictionary) -> Result<[f64; 4], HymnSplitError> {
    if let Ok(array) = page_dict.get(b"MediaBox").and_then(Object::as_array) {
        return parse_box_array(array);
    }

    let parent = page_dict
        .get(b"Parent")
        .and_then(Object::as_reference)
        .and_then(|id| doc.get_object(id))
        .and_then(Object::as_dict);
    if let Ok(parent_dict) = parent {
        if let Ok(array) = parent_dict.get(b"MediaBox").and_then(Object::as_array) {
            return parse_box_array(array);
        }
    }

    Ok([0.0, 0.0, PageSize::LETTER.width, PageSize::LETTER.height])
}

fn parse_box_array(array: &[Object]) -> Result<[f64; 4], HymnSplitError> {
    if array.len() != 4 {
        return Err(HymnSplitError::ParseError(
            "MediaBox must have 4 elements".to_string(),
        ));
    }

    let mut result = [0.0; 4];
    for (i, obj) in array.iter().enumerate() {
        result[i] = match obj {
            Object::Integer(n) => *n as f64,
            Object::Real(n) => *n as f64,
            _ => {
                return Err(HymnSplitError::ParseError(format!(
                    "MediaBox element {} is not a number",
                    i
                )))
            }
        };
    }

    Ok(result)
}
