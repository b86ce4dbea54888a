//! Assemble fitted crop bands into a PDF
//!
//! One output page per band. Each band becomes a Flate-compressed RGB image
//! XObject drawn at the fitter's placement.

use crate::error::HymnSplitError;
use crate::raster::FittedPage;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::RgbaImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::io::Write;
use tracing::debug;

/// Build a PDF holding `pages` in order.
pub fn assemble_pdf(pages: &[FittedPage]) -> Result<Vec<u8>, HymnSplitError> {
    if pages.is_empty() {
        return Err(HymnSplitError::OperationError("No pages to export".into()));
    }

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut kids = Vec::with_capacity(pages.len());
    for page in pages {
        let page_id = add_page(&mut doc, pages_id, page)?;
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| HymnSplitError::OperationError(format!("Save failed: {}", e)))?;

    debug!(pages = pages.len(), bytes = buffer.len(), "Assembled export");
    Ok(buffer)
}

fn add_page(
    doc: &mut Document,
    pages_id: ObjectId,
    page: &FittedPage,
) -> Result<ObjectId, HymnSplitError> {
    let (width, height) = page.band.dimensions();
    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => i64::from(width),
            "Height" => i64::from(height),
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "FlateDecode",
        },
        deflate(&flatten_rgb(&page.band))?,
    ));

    let p = &page.placement;
    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Real(p.draw_width as f32),
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Real(p.draw_height as f32),
                    Object::Real(p.pad_x as f32),
                    Object::Real(p.pdf_y(page.page_size) as f32),
                ],
            ),
            Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let encoded = content
        .encode()
        .map_err(|e| HymnSplitError::OperationError(format!("Content encoding failed: {}", e)))?;
    let content_id = doc.add_object(Stream::new(Dictionary::new(), encoded));

    Ok(doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => Object::Reference(pages_id),
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Real(page.page_size.width as f32),
            Object::Real(page.page_size.height as f32),
        ],
        "Resources" => dictionary! {
            "XObject" => dictionary! {
                "Im0" => Object::Reference(image_id),
            },
        },
        "Contents" => Object::Reference(content_id),
    }))
}

/// RGB bytes with alpha composited over white
fn flatten_rgb(img: &RgbaImage) -> Vec<u8> {
    let mut out = Vec::with_capacity(img.width() as usize * img.height() as usize * 3);
    for pixel in img.pixels() {
        let [r, g, b, a] = pixel.0;
        let a = a as u32;
        for c in [r, g, b] {
            out.push(((c as u32 * a + 255 * (255 - a)) / 255) as u8);
        }
    }
    out
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, HymnSplitError> {
    let compression_failed =
        |e: std::io::Error| HymnSplitError::OperationError(format!("Compression failed: {}", e));
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).map_err(compression_failed)?;
    encoder.finish().map_err(compression_failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::PageSize;
    use crate::fit::fit_to_page;
    use image::Rgba;

    fn fitted(w: u32, h: u32) -> FittedPage {
        FittedPage {
            source: 0,
            band: RgbaImage::from_pixel(w, h, Rgba([10, 20, 30, 255])),
            placement: fit_to_page(w as f64, h as f64, PageSize::LETTER).unwrap(),
            page_size: PageSize::LETTER,
        }
    }

    #[test]
    fn test_empty_export_fails() {
        assert!(assemble_pdf(&[]).is_err());
    }

    #[test]
    fn test_one_page_per_band() {
        let pdf = assemble_pdf(&[fitted(30, 10), fitted(10, 30)]).unwrap();
        let doc = Document::load_mem(&pdf).unwrap();
        assert_eq!(doc.get_pages().len(), 2);
    }

    #[test]
    fn test_flatten_composites_over_white() {
        let img = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 0]));
        assert_eq!(flatten_rgb(&img), vec![255, 255, 255]);
        let img = RgbaImage::from_pixel(1, 1, Rgba([0, 100, 200, 255]));
        assert_eq!(flatten_rgb(&img), vec![0, 100, 200]);
    }
}
