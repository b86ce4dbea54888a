//! Clip planning for segment output
//!
//! A segment can start mid-page and run across several pages. Each source
//! page it touches contributes one clip rectangle:
//! - single page: `start_y..end_y`
//! - first page: `start_y..bottom`
//! - middle pages: the whole page
//! - last page: `top..end_y`
//!
//! Clips taller than the output page are sliced into consecutive output-page
//! sized pieces, one output page each. A page inside the document whose size
//! is unknown contributes no clip and is reported instead.

use crate::coords::{PageSize, PageTable};
use crate::error::HymnSplitError;
use crate::fit::{fit_to_page, Placement};
use crate::segment::{Diagnostic, OutputDocument, Segment};
use serde::Serialize;
use tracing::warn;

/// Rectangle on a source page in native units, origin top-left
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct ClipRect {
    pub page: u32,
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl ClipRect {
    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }
}

/// One output page: the source clip and where it lands
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct ClipSlice {
    pub clip: ClipRect,
    pub placement: Placement,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DocumentPlan {
    /// 0-based position in the output list
    pub index: usize,
    pub slices: Vec<ClipSlice>,
    /// Pages left out for lack of a native size
    pub diagnostics: Vec<Diagnostic>,
}

/// Clips of one segment, plus the pages that could not be clipped
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentClips {
    pub clips: Vec<ClipRect>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Per-page clips for one segment, before slicing
pub fn segment_clips(segment: &Segment, pages: &PageTable) -> Result<SegmentClips, HymnSplitError> {
    if segment.start_page == 0 {
        return Err(HymnSplitError::InvalidSegment(
            "Page numbers must be >= 1".into(),
        ));
    }
    if segment.start_page > segment.end_page {
        return Err(HymnSplitError::InvalidSegment(format!(
            "start_page {} > end_page {}",
            segment.start_page, segment.end_page
        )));
    }

    if pages.last_page().map_or(true, |last| segment.end_page > last) {
        return Err(HymnSplitError::InvalidSegment(format!(
            "Invalid page number: {}",
            segment.end_page
        )));
    }

    let mut out = SegmentClips::default();
    for page in segment.start_page..=segment.end_page {
        let metrics = pages.get(page);
        let Some(size) = metrics.native.filter(|_| metrics.native_height().is_some()) else {
            let e = HymnSplitError::MissingDimensionData { page };
            warn!(page, "Page has no native size, leaving it out of the clip plan");
            out.diagnostics.push(Diagnostic::skipped(&e, page));
            continue;
        };

        let y0 = if page == segment.start_page {
            segment.start_y
        } else {
            0.0
        };
        let y1 = if page == segment.end_page {
            segment.end_y
        } else {
            size.height
        };

        out.clips.push(ClipRect {
            page,
            x0: 0.0,
            y0: y0.clamp(0.0, size.height),
            x1: size.width,
            y1: y1.clamp(0.0, size.height),
        });
    }
    Ok(out)
}

/// Slice one clip into output-page-high pieces; empty clips give no slices.
pub fn paginate(clip: &ClipRect, output_page: PageSize) -> Vec<ClipSlice> {
    let mut slices = Vec::new();
    let mut remaining = clip.height();
    let mut y = clip.y0;

    while remaining > 0.0 {
        let slice_height = remaining.min(output_page.height);
        let piece = ClipRect {
            y0: y,
            y1: y + slice_height,
            ..*clip
        };
        if let Some(placement) = fit_to_page(piece.width(), piece.height(), output_page) {
            slices.push(ClipSlice {
                clip: piece,
                placement,
            });
        }
        y += slice_height;
        remaining -= slice_height;
    }
    slices
}

/// Output pages for one segment, in order, and the pages left out.
pub fn plan_clips(
    segment: &Segment,
    pages: &PageTable,
    output_page: PageSize,
) -> Result<(Vec<ClipSlice>, Vec<Diagnostic>), HymnSplitError> {
    let SegmentClips { clips, diagnostics } = segment_clips(segment, pages)?;
    let slices = clips
        .iter()
        .flat_map(|clip| paginate(clip, output_page))
        .collect();
    Ok((slices, diagnostics))
}

/// Output pages for every document.
pub fn plan_documents(
    documents: &[OutputDocument],
    pages: &PageTable,
    output_page: PageSize,
) -> Result<Vec<DocumentPlan>, HymnSplitError> {
    documents
        .iter()
        .enumerate()
        .map(|(index, doc)| {
            let mut plan = DocumentPlan {
                index,
                slices: Vec::new(),
                diagnostics: Vec::new(),
            };
            for segment in &doc.segments {
                let (slices, diagnostics) = plan_clips(segment, pages, output_page)?;
                plan.slices.extend(slices);
                for d in diagnostics {
                    if !plan.diagnostics.contains(&d) {
                        plan.diagnostics.push(d);
                    }
                }
            }
            Ok(plan)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn seg(sp: u32, sy: f64, ep: u32, ey: f64) -> Segment {
        Segment {
            start_page: sp,
            start_y: sy,
            end_page: ep,
            end_y: ey,
            is_document_boundary: false,
        }
    }

    fn clip(page: u32, y0: f64, y1: f64) -> ClipRect {
        ClipRect {
            page,
            x0: 0.0,
            y0,
            x1: 612.0,
            y1,
        }
    }

    fn table(n: usize) -> PageTable {
        PageTable::from_native(&vec![PageSize::LETTER; n])
    }

    #[test]
    fn test_single_page_clip() {
        let clips = segment_clips(&seg(1, 100.0, 1, 300.0), &table(1)).unwrap().clips;
        assert_eq!(clips, vec![clip(1, 100.0, 300.0)]);
    }

    #[test]
    fn test_multi_page_clips() {
        let clips = segment_clips(&seg(1, 500.0, 3, 200.0), &table(3)).unwrap().clips;
        assert_eq!(
            clips,
            vec![
                clip(1, 500.0, 792.0),
                clip(2, 0.0, 792.0),
                clip(3, 0.0, 200.0)
            ]
        );
    }

    #[test]
    fn test_reversed_segment_fails() {
        assert!(segment_clips(&seg(2, 0.0, 1, 10.0), &table(2)).is_err());
    }

    #[test]
    fn test_unknown_page_fails() {
        let err = segment_clips(&seg(1, 0.0, 4, 10.0), &table(2)).unwrap_err();
        assert!(matches!(err, HymnSplitError::InvalidSegment(_)));
    }

    #[test]
    fn test_page_without_size_is_left_out() {
        let mut pages = table(1);
        pages.set_rendered(2, PageSize::LETTER);
        pages.set_native(3, PageSize::LETTER);
        let out = segment_clips(&seg(1, 500.0, 3, 200.0), &pages).unwrap();
        assert_eq!(out.clips, vec![clip(1, 500.0, 792.0), clip(3, 0.0, 200.0)]);
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].page, 2);
    }

    #[test]
    fn test_plan_reports_left_out_pages_once() {
        let mut pages = table(1);
        pages.set_rendered(2, PageSize::LETTER);
        pages.set_native(3, PageSize::LETTER);
        let docs = vec![OutputDocument {
            segments: vec![seg(1, 0.0, 3, 100.0), seg(3, 100.0, 3, 792.0)],
        }];
        let plans = plan_documents(&docs, &pages, PageSize::LETTER).unwrap();
        assert_eq!(plans[0].slices.len(), 3);
        let skipped: Vec<u32> = plans[0].diagnostics.iter().map(|d| d.page).collect();
        assert_eq!(skipped, vec![2]);
    }

    #[test]
    fn test_page_zero_fails() {
        assert!(segment_clips(&seg(0, 0.0, 1, 10.0), &table(2)).is_err());
    }

    #[test]
    fn test_tall_clip_is_sliced() {
        let tall = ClipRect {
            page: 1,
            x0: 0.0,
            y0: 0.0,
            x1: 612.0,
            y1: 2000.0,
        };
        let slices = paginate(&tall, PageSize::LETTER);
        let heights: Vec<f64> = slices.iter().map(|s| s.clip.height()).collect();
        assert_eq!(heights, vec![792.0, 792.0, 416.0]);
        assert_eq!(slices[1].clip.y0, 792.0);
    }

    #[test]
    fn test_empty_clip_has_no_slices() {
        assert!(paginate(&clip(1, 200.0, 200.0), PageSize::LETTER).is_empty());
    }

    #[test]
    fn test_plan_documents_keeps_order() {
        let docs = vec![
            OutputDocument {
                segments: vec![seg(1, 0.0, 1, 792.0)],
            },
            OutputDocument {
                segments: vec![seg(2, 0.0, 2, 100.0), seg(2, 100.0, 2, 792.0)],
            },
        ];
        let plans = plan_documents(&docs, &table(2), PageSize::LETTER).unwrap();
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].slices.len(), 1);
        assert_eq!(plans[1].index, 1);
        assert_eq!(plans[1].slices.len(), 2);
        assert_eq!(plans[1].slices[0].clip, clip(2, 0.0, 100.0));
    }
}
