//! hymnsplit command line
//!
//! Lines mode and crop mode over files on disk.

mod input;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use hymnsplit_core::{
    assemble_pdf, PageRender, PageSize, ProcessMetrics, ProcessResult, SplitRequest,
    SplitSession, SplitterConfig, StackPage,
};
use input::{apply_boxes, AnnotationFile, BoxEntry};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "hymnsplit")]
#[command(version, about = "Split scanned song books at drawn cut lines or crop bands")]
struct Args {
    /// Splitter configuration (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the output documents for an annotated PDF
    Segments {
        #[arg(long)]
        pdf: PathBuf,
        /// Annotation file (JSON)
        #[arg(long)]
        annotations: PathBuf,
    },
    /// Print the per-document clip plan for an annotated PDF
    Plan {
        #[arg(long)]
        pdf: PathBuf,
        #[arg(long)]
        annotations: PathBuf,
    },
    /// Cut crop bands out of pre-rendered page images into a new PDF
    Crop {
        /// Page images in page order, rendered at the configured oversampling
        #[arg(long, num_args = 1.., required = true)]
        pages: Vec<PathBuf>,
        /// Crop boxes file (JSON)
        #[arg(long)]
        boxes: PathBuf,
        #[arg(short, long)]
        out: PathBuf,
        #[arg(long)]
        greyscale: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // stdout carries results; logs go to stderr
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match &args.config {
        Some(path) => SplitterConfig::from_file(path)
            .with_context(|| format!("Loading config {}", path.display()))?,
        None => SplitterConfig::default(),
    };

    match args.command {
        Command::Segments { pdf, annotations } => {
            let start = Instant::now();
            let session = annotated_session(config, &pdf, &annotations)?;
            let segmentation = session.segments();
            let request = SplitRequest::new(pdf_id(&pdf), &segmentation.documents());
            let metrics = ProcessMetrics {
                input_pages: session.pages().len() as u32,
                output_documents: request.documents.len(),
                output_pages: request.segment_count(),
                skipped_pages: segmentation.skipped_pages(),
                skipped_bands: Vec::new(),
                processing_time_ms: start.elapsed().as_millis() as u64,
            };
            let output = json!({
                "request": request,
                "diagnostics": segmentation.diagnostics,
                "metrics": metrics,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Plan { pdf, annotations } => {
            let session = annotated_session(config, &pdf, &annotations)?;
            let plans = session.plan()?;
            println!("{}", serde_json::to_string_pretty(&plans)?);
        }
        Command::Crop {
            pages,
            boxes,
            out,
            greyscale,
        } => {
            let result = crop(config, &pages, &boxes, &out, greyscale)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}

fn pdf_id(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn annotated_session(config: SplitterConfig, pdf: &Path, annotations: &Path) -> Result<SplitSession> {
    let bytes = fs::read(pdf).with_context(|| format!("Reading {}", pdf.display()))?;
    let text = fs::read_to_string(annotations)
        .with_context(|| format!("Reading {}", annotations.display()))?;
    let file: AnnotationFile = serde_json::from_str(&text)
        .with_context(|| format!("Parsing annotations {}", annotations.display()))?;

    let mut session = SplitSession::new(config);
    let count = session.load_pdf(&bytes)?;
    tracing::info!("Loaded {} ({} pages)", pdf.display(), count);
    file.apply(&mut session)?;
    Ok(session)
}

fn crop(
    config: SplitterConfig,
    page_paths: &[PathBuf],
    boxes_path: &Path,
    out: &Path,
    greyscale: bool,
) -> Result<ProcessResult> {
    let start = Instant::now();
    let oversampling = config.oversampling;

    let mut stack = Vec::with_capacity(page_paths.len());
    for path in page_paths {
        let raster = image::open(path)
            .with_context(|| format!("Loading page image {}", path.display()))?
            .to_rgba8();
        let native = PageSize::new(
            raster.width() as f64 / oversampling,
            raster.height() as f64 / oversampling,
        );
        stack.push(StackPage {
            native,
            render: PageRender::Ready(raster),
        });
    }

    let text = fs::read_to_string(boxes_path)
        .with_context(|| format!("Reading {}", boxes_path.display()))?;
    let boxes: Vec<BoxEntry> = serde_json::from_str(&text)
        .with_context(|| format!("Parsing crop boxes {}", boxes_path.display()))?;
    if boxes.is_empty() {
        bail!("{} holds no crop boxes", boxes_path.display());
    }

    let mut session = SplitSession::new(config);
    let sizes: Vec<PageSize> = stack.iter().map(|p| p.native).collect();
    session.set_native_sizes(&sizes);
    apply_boxes(&boxes, &mut session)?;
    if greyscale && !session.greyscale() {
        session.toggle_greyscale();
    }

    let output = session.rasterize(&stack)?;
    if output.pages.is_empty() {
        bail!("No crop box produced an output page");
    }
    let pdf = assemble_pdf(&output.pages)?;
    fs::write(out, &pdf).with_context(|| format!("Writing {}", out.display()))?;
    tracing::info!("Wrote {} ({} pages)", out.display(), output.pages.len());
    if !output.skipped.is_empty() {
        tracing::warn!("Left out crop boxes {:?}", output.skipped);
    }

    Ok(ProcessResult {
        success: true,
        data: Some(out.display().to_string()),
        error: None,
        metrics: Some(ProcessMetrics {
            input_pages: stack.len() as u32,
            output_documents: 1,
            output_pages: output.pages.len(),
            skipped_pages: output.pending_pages,
            skipped_bands: output.skipped,
            processing_time_ms: start.elapsed().as_millis() as u64,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::ZlibDecoder;
    use image::{Rgba, RgbaImage};
    use lopdf::{Document, Object};
    use pretty_assertions::assert_eq;
    use std::io::Read;

    /// A Letter page at 3x whose red channel encodes the pixel row / 10
    fn write_page(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        RgbaImage::from_fn(1836, 2376, |_, y| Rgba([(y / 10) as u8, 0, 0, 255]))
            .save(&path)
            .unwrap();
        path
    }

    fn image_streams(pdf: &[u8]) -> Vec<(i64, i64, Vec<u8>)> {
        let doc = Document::load_mem(pdf).unwrap();
        let mut images = Vec::new();
        for (_, page_id) in doc.get_pages() {
            let page = doc.get_object(page_id).and_then(Object::as_dict).unwrap();
            let resources = page.get(b"Resources").and_then(Object::as_dict).unwrap();
            let xobjects = resources.get(b"XObject").and_then(Object::as_dict).unwrap();
            let id = xobjects.get(b"Im0").and_then(Object::as_reference).unwrap();
            let stream = doc.get_object(id).and_then(Object::as_stream).unwrap();
            let width = stream.dict.get(b"Width").and_then(Object::as_i64).unwrap();
            let height = stream.dict.get(b"Height").and_then(Object::as_i64).unwrap();
            let mut rgb = Vec::new();
            ZlibDecoder::new(stream.content.as_slice())
                .read_to_end(&mut rgb)
                .unwrap();
            images.push((width, height, rgb));
        }
        images
    }

    #[test]
    fn test_crop_writes_one_page_per_box() {
        let dir = tempfile::tempdir().unwrap();
        let page = write_page(dir.path(), "page1.png");
        let boxes = dir.path().join("boxes.json");
        // viewer container is 792 * 1.5 = 1188; the second box sits at the bottom
        fs::write(
            &boxes,
            r#"[{"top": 0.0, "height": 300.0}, {"top": 1100.0, "height": 50.0}]"#,
        )
        .unwrap();
        let out = dir.path().join("out.pdf");

        let result = crop(SplitterConfig::default(), &[page], &boxes, &out, false).unwrap();
        assert!(result.success);
        let metrics = result.metrics.unwrap();
        assert_eq!(metrics.output_pages, 2);
        assert!(metrics.skipped_bands.is_empty());

        let pdf = fs::read(&out).unwrap();
        let images = image_streams(&pdf);
        assert_eq!(images.len(), 2);

        // viewer 1100..1150 is raster rows 2200..2300
        let (width, height, rgb) = &images[1];
        assert_eq!((*width, *height), (1836, 100));
        assert_eq!(rgb[0], 220);
        let last_row = (*height as usize - 1) * *width as usize * 3;
        assert_eq!(rgb[last_row], 229);
    }

    #[test]
    fn test_crop_greyscale_output() {
        let dir = tempfile::tempdir().unwrap();
        let page = write_page(dir.path(), "page1.png");
        let boxes = dir.path().join("boxes.json");
        fs::write(&boxes, r#"[{"top": 300.0, "height": 100.0}]"#).unwrap();
        let out = dir.path().join("out.pdf");

        crop(SplitterConfig::default(), &[page], &boxes, &out, true).unwrap();
        let images = image_streams(&fs::read(&out).unwrap());
        assert!(images[0]
            .2
            .chunks_exact(3)
            .all(|px| px[0] == px[1] && px[1] == px[2]));
    }

    #[test]
    fn test_crop_rejects_empty_box_list() {
        let dir = tempfile::tempdir().unwrap();
        let page = write_page(dir.path(), "page1.png");
        let boxes = dir.path().join("boxes.json");
        fs::write(&boxes, "[]").unwrap();
        let out = dir.path().join("out.pdf");

        assert!(crop(SplitterConfig::default(), &[page], &boxes, &out, false).is_err());
        assert!(!out.exists());
    }
}
