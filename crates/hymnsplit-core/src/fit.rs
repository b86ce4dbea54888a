//! Aspect-preserving fit of arbitrary content onto a fixed output page

use crate::coords::PageSize;
use serde::{Deserialize, Serialize};

/// Where fitted content lands on the output page, in page units
/// (origin top-left, y down)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Placement {
    pub draw_width: f64,
    pub draw_height: f64,
    pub pad_x: f64,
    pub pad_y: f64,
}

impl Placement {
    /// Bottom edge of the placed content measured from the page bottom,
    /// which is where PDF puts the y origin
    pub fn pdf_y(&self, page: PageSize) -> f64 {
        page.height - self.pad_y - self.draw_height
    }
}

/// Fit content of `content_width` x `content_height` onto `page`.
///
/// Wider-than-page content fills the width and is centred vertically.
/// Otherwise it fills the height; since it then already spans the page
/// height it is top-aligned (`pad_y == 0`). Draw sizes are rounded to whole
/// units and never drop below 1. Returns `None` for empty content.
pub fn fit_to_page(content_width: f64, content_height: f64, page: PageSize) -> Option<Placement> {
    if !(content_width > 0.0 && content_height > 0.0) {
        return None;
    }
    let aspect = content_width / content_height;

    let (draw_width, draw_height) = if aspect > page.aspect() {
        (page.width, page.width / aspect)
    } else {
        (page.height * aspect, page.height)
    };

    // Rounding may push one side a unit past the page; clamp it back
    let draw_width = draw_width.round().clamp(1.0, page.width.max(1.0));
    let draw_height = draw_height.round().clamp(1.0, page.height.max(1.0));

    let pad_x = (page.width - draw_width) / 2.0;
    let pad_y = if draw_height >= page.height {
        0.0
    } else {
        (page.height - draw_height) / 2.0
    };

    Some(Placement {
        draw_width,
        draw_height,
        pad_x,
        pad_y,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_wide_content_fills_width_and_centres() {
        let p = fit_to_page(1224.0, 396.0, PageSize::LETTER).unwrap();
        assert_eq!(p.draw_width, 612.0);
        assert_eq!(p.draw_height, 198.0);
        assert_eq!(p.pad_x, 0.0);
        assert_eq!(p.pad_y, 297.0);
    }

    #[test]
    fn test_tall_content_fills_height_top_aligned() {
        let p = fit_to_page(300.0, 792.0, PageSize::LETTER).unwrap();
        assert_eq!(p.draw_height, 792.0);
        assert_eq!(p.draw_width, 300.0);
        assert_eq!(p.pad_x, 156.0);
        assert_eq!(p.pad_y, 0.0);
    }

    #[test]
    fn test_same_aspect_fills_page() {
        let p = fit_to_page(1836.0, 2376.0, PageSize::LETTER).unwrap();
        assert_eq!(
            p,
            Placement {
                draw_width: 612.0,
                draw_height: 792.0,
                pad_x: 0.0,
                pad_y: 0.0
            }
        );
    }

    #[test]
    fn test_extreme_aspect_floors_at_one() {
        let p = fit_to_page(1_000_000.0, 1.0, PageSize::LETTER).unwrap();
        assert_eq!(p.draw_height, 1.0);
    }

    #[test]
    fn test_empty_content() {
        assert!(fit_to_page(0.0, 10.0, PageSize::LETTER).is_none());
        assert!(fit_to_page(10.0, f64::NAN, PageSize::LETTER).is_none());
    }

    #[test]
    fn test_pdf_y_flips_origin() {
        let p = fit_to_page(1224.0, 396.0, PageSize::LETTER).unwrap();
        assert_eq!(p.pdf_y(PageSize::LETTER), 297.0);
    }
}
