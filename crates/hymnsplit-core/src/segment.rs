//! Segmentation walker
//!
//! Walks the annotated pages in ascending order and cuts the document into
//! contiguous segments:
//! 1. Start a cursor at the top of the first page
//! 2. For every page with a known native height:
//!    a. Sort its lines by native y
//!    b. Emit a segment from the cursor to each line, moving the cursor there
//!    c. Unless the disposition is `off`, emit a segment to the page bottom and
//!       move the cursor to the top of the next page. A line sitting on the
//!       bottom edge already made that cut, so no empty segment is added.
//! 3. Flush whatever is left after the last page
//!
//! Segments are then grouped into output documents at boundary segments.

use crate::annotations::PageStore;
use crate::coords::PageTable;
use crate::error::HymnSplitError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// One contiguous vertical range of content, in native units
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Segment {
    pub start_page: u32,
    pub start_y: f64,
    pub end_page: u32,
    pub end_y: f64,
    /// Closes the current output document
    #[serde(rename = "stopDocument", default)]
    pub is_document_boundary: bool,
}

impl Segment {
    pub fn start(&self) -> Cursor {
        Cursor {
            page: self.start_page,
            y: self.start_y,
        }
    }

    pub fn end(&self) -> Cursor {
        Cursor {
            page: self.end_page,
            y: self.end_y,
        }
    }
}

/// Start of the segment currently being accumulated
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Cursor {
    pub page: u32,
    pub y: f64,
}

/// A page that was left out of the walk
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Diagnostic {
    pub page: u32,
    pub message: String,
}

impl Diagnostic {
    pub(crate) fn skipped(err: &HymnSplitError, page: u32) -> Self {
        Self {
            page,
            message: format!("Skipped: {}", err),
        }
    }
}

/// Result of one segmentation run
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Segmentation {
    pub segments: Vec<Segment>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Segmentation {
    pub fn documents(&self) -> Vec<OutputDocument> {
        group_documents(&self.segments)
    }

    pub fn skipped_pages(&self) -> Vec<u32> {
        self.diagnostics.iter().map(|d| d.page).collect()
    }
}

/// Cut the annotated pages into segments.
///
/// Pages are the union of those with dimension data and those with
/// annotations. A page without a native height, or one holding lines but no
/// rendered height, is skipped with a diagnostic; the cursor carries over it.
pub fn segment_pages(store: &PageStore, pages: &PageTable) -> Segmentation {
    let page_numbers: BTreeSet<u32> = pages
        .page_numbers()
        .chain(store.pages().map(|(p, _)| p))
        .collect();

    let mut result = Segmentation::default();
    let Some(&first_page) = page_numbers.first() else {
        return result;
    };

    let mut cursor = Cursor {
        page: first_page,
        y: 0.0,
    };
    // Last page actually walked, with its native height
    let mut last_walked: Option<(u32, f64)> = None;

    for page in page_numbers {
        let annotations = store.page(page);

        let native_height = match pages.native_height(page) {
            Ok(h) => h,
            Err(e) => {
                warn!(page, "Page has no native height, skipping");
                result.diagnostics.push(Diagnostic::skipped(&e, page));
                continue;
            }
        };

        // Scaling is monotonic, so rendered order is native order
        let mut cut_ys = Vec::with_capacity(annotations.lines.len());
        let mut missing = None;
        for line in annotations.sorted_lines() {
            match pages.native_y(page, line.y) {
                Ok(y) => cut_ys.push((y.clamp(0.0, native_height), line.document_boundary)),
                Err(e) => {
                    missing = Some(e);
                    break;
                }
            }
        }
        if let Some(e) = missing {
            warn!(page, "Page lines cannot be normalized, skipping");
            result.diagnostics.push(Diagnostic::skipped(&e, page));
            continue;
        }

        for (y, boundary) in cut_ys {
            result.segments.push(Segment {
                start_page: cursor.page,
                start_y: cursor.y,
                end_page: page,
                end_y: y,
                is_document_boundary: boundary,
            });
            cursor = Cursor { page, y };
        }

        if annotations.disposition.cuts() {
            let splits = annotations.disposition.splits_document();
            let at_bottom = cursor.page == page && cursor.y >= native_height;
            // A line on the bottom edge already made this cut
            let merged = match result.segments.last_mut() {
                Some(last) if at_bottom => {
                    last.is_document_boundary |= splits;
                    true
                }
                _ => false,
            };
            if !merged {
                result.segments.push(Segment {
                    start_page: cursor.page,
                    start_y: cursor.y,
                    end_page: page,
                    end_y: native_height,
                    is_document_boundary: splits,
                });
            }
            cursor = Cursor {
                page: page + 1,
                y: 0.0,
            };
        }

        last_walked = Some((page, native_height));
    }

    // Flush content left open by a trailing `off` disposition
    if let Some((last_page, last_height)) = last_walked {
        let open = cursor.page < last_page || (cursor.page == last_page && cursor.y < last_height);
        if open {
            result.segments.push(Segment {
                start_page: cursor.page,
                start_y: cursor.y,
                end_page: last_page,
                end_y: last_height,
                is_document_boundary: false,
            });
        }
    }

    debug!(
        segments = result.segments.len(),
        skipped = result.diagnostics.len(),
        "Segmentation finished"
    );
    result
}

/// One output file: a non-empty run of segments ending at a boundary
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputDocument {
    pub segments: Vec<Segment>,
}

/// Group segments into documents, closing a document after each boundary segment.
pub fn group_documents(segments: &[Segment]) -> Vec<OutputDocument> {
    let mut documents = Vec::new();
    let mut current = Vec::new();

    for segment in segments {
        current.push(*segment);
        if segment.is_document_boundary {
            documents.push(OutputDocument {
                segments: std::mem::take(&mut current),
            });
        }
    }

    if !current.is_empty() {
        documents.push(OutputDocument { segments: current });
    }

    documents
}

/// Flatten already grouped documents and group them again.
pub fn regroup(documents: &[OutputDocument]) -> Vec<OutputDocument> {
    let segments: Vec<Segment> = documents
        .iter()
        .flat_map(|d| d.segments.iter().copied())
        .collect();
    group_documents(&segments)
}

/// Whether `next` starts exactly where `prev` ends.
///
/// The bottom of a page and the top of the following page are the same
/// position, so a page-end cut followed by `(page + 1, 0)` is contiguous.
pub fn continues(prev: &Segment, next: &Segment, pages: &PageTable) -> bool {
    if prev.end_page == next.start_page && prev.end_y == next.start_y {
        return true;
    }
    next.start_page == prev.end_page + 1
        && next.start_y == 0.0
        && pages
            .native_height(prev.end_page)
            .is_ok_and(|h| prev.end_y == h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::{AnnotationStore, PageEndDisposition};
    use crate::coords::PageSize;
    use pretty_assertions::assert_eq;

    fn seg(sp: u32, sy: f64, ep: u32, ey: f64, boundary: bool) -> Segment {
        Segment {
            start_page: sp,
            start_y: sy,
            end_page: ep,
            end_y: ey,
            is_document_boundary: boundary,
        }
    }

    /// `n` Letter pages rendered at native size
    fn letter_pages(n: u32) -> PageTable {
        let mut table = PageTable::new();
        for p in 1..=n {
            table.set_native(p, PageSize::LETTER);
            table.set_rendered(p, PageSize::LETTER);
        }
        table
    }

    #[test]
    fn test_empty_input_yields_nothing() {
        let result = segment_pages(&PageStore::new(), &PageTable::new());
        assert!(result.segments.is_empty());
        assert!(result.documents().is_empty());
    }

    #[test]
    fn test_default_disposition_cuts_every_page() {
        let store = AnnotationStore::new();
        let result = segment_pages(store.pages(), &letter_pages(3));
        assert_eq!(
            result.segments,
            vec![
                seg(1, 0.0, 1, 792.0, false),
                seg(2, 0.0, 2, 792.0, false),
                seg(3, 0.0, 3, 792.0, false),
            ]
        );
        assert_eq!(result.documents().len(), 1);
    }

    #[test]
    fn test_off_pages_carry_cursor_across_pages() {
        let mut store = AnnotationStore::new();
        store.set_disposition(1, PageEndDisposition::Off);
        store.set_disposition(2, PageEndDisposition::Off);
        store.add_line(3, 100.0);
        let result = segment_pages(store.pages(), &letter_pages(3));
        assert_eq!(
            result.segments,
            vec![seg(1, 0.0, 3, 100.0, false), seg(3, 100.0, 3, 792.0, false)]
        );
    }

    #[test]
    fn test_trailing_off_page_is_flushed() {
        let mut store = AnnotationStore::new();
        store.add_line(2, 400.0);
        store.set_disposition(2, PageEndDisposition::Off);
        let result = segment_pages(store.pages(), &letter_pages(2));
        assert_eq!(
            result.segments,
            vec![
                seg(1, 0.0, 1, 792.0, false),
                seg(2, 0.0, 2, 400.0, false),
                seg(2, 400.0, 2, 792.0, false),
            ]
        );
    }

    #[test]
    fn test_line_at_page_bottom_with_off_is_not_flushed_twice() {
        let mut store = AnnotationStore::new();
        store.add_line(1, 792.0);
        store.set_disposition(1, PageEndDisposition::Off);
        let result = segment_pages(store.pages(), &letter_pages(1));
        assert_eq!(result.segments, vec![seg(1, 0.0, 1, 792.0, false)]);
    }

    #[test]
    fn test_boundary_line_closes_document() {
        let mut store = AnnotationStore::new();
        let id = store.add_line(1, 300.0);
        store.toggle_line_boundary(id).unwrap();
        let result = segment_pages(store.pages(), &letter_pages(1));
        let docs = result.documents();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].segments, vec![seg(1, 0.0, 1, 300.0, true)]);
        assert_eq!(docs[1].segments, vec![seg(1, 300.0, 1, 792.0, false)]);
    }

    #[test]
    fn test_boundary_line_at_page_bottom_adds_no_empty_segment() {
        let mut store = AnnotationStore::new();
        let id = store.add_line(1, 792.0);
        store.toggle_line_boundary(id).unwrap();
        let result = segment_pages(store.pages(), &letter_pages(2));
        assert_eq!(
            result.segments,
            vec![seg(1, 0.0, 1, 792.0, true), seg(2, 0.0, 2, 792.0, false)]
        );
        let docs = result.documents();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1].segments, vec![seg(2, 0.0, 2, 792.0, false)]);
    }

    #[test]
    fn test_document_split_on_bottom_line_moves_to_that_line() {
        let mut store = AnnotationStore::new();
        store.add_line(1, 792.0);
        store.set_disposition(1, PageEndDisposition::DocumentSplit);
        let result = segment_pages(store.pages(), &letter_pages(2));
        assert_eq!(
            result.segments,
            vec![seg(1, 0.0, 1, 792.0, true), seg(2, 0.0, 2, 792.0, false)]
        );
    }

    #[test]
    fn test_line_below_page_is_clamped() {
        let mut store = AnnotationStore::new();
        store.add_line(1, 900.0);
        let result = segment_pages(store.pages(), &letter_pages(1));
        assert!(result.segments.iter().all(|s| s.end_y <= 792.0));
    }

    #[test]
    fn test_unmeasured_page_is_skipped_not_fatal() {
        let mut pages = letter_pages(3);
        pages.invalidate_rendered();
        pages.set_rendered(1, PageSize::LETTER);
        pages.set_rendered(3, PageSize::LETTER);
        let mut store = AnnotationStore::new();
        store.add_line(2, 50.0);
        let result = segment_pages(store.pages(), &pages);
        assert_eq!(result.skipped_pages(), vec![2]);
        assert_eq!(
            result.segments,
            vec![seg(1, 0.0, 1, 792.0, false), seg(2, 0.0, 3, 792.0, false)]
        );
    }

    #[test]
    fn test_page_without_native_height_is_skipped() {
        let mut pages = letter_pages(1);
        pages.set_rendered(2, PageSize::LETTER);
        let result = segment_pages(&PageStore::new(), &pages);
        assert_eq!(result.skipped_pages(), vec![2]);
        assert_eq!(result.segments, vec![seg(1, 0.0, 1, 792.0, false)]);
    }

    #[test]
    fn test_no_boundaries_yields_single_document() {
        let segments = vec![seg(1, 0.0, 1, 10.0, false), seg(1, 10.0, 1, 20.0, false)];
        let docs = group_documents(&segments);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].segments, segments);
    }

    #[test]
    fn test_trailing_boundary_does_not_create_empty_document() {
        let segments = vec![seg(1, 0.0, 1, 10.0, false), seg(1, 10.0, 1, 20.0, true)];
        let docs = group_documents(&segments);
        assert_eq!(docs.len(), 1);
    }

    #[test]
    fn test_segment_serializes_stop_document() {
        let json = serde_json::to_string(&seg(1, 0.0, 2, 12.5, true)).unwrap();
        assert_eq!(
            json,
            r#"{"start_page":1,"start_y":0.0,"end_page":2,"end_y":12.5,"stopDocument":true}"#
        );
    }
}
