//! Cut-line segmentation and crop rasterization for scanned song books
//!
//! Two ways of splitting one source PDF:
//! - Lines mode: horizontal cut lines drawn on rendered pages, plus a
//!   per-page end disposition, are walked into ordered segments grouped into
//!   output documents (`segment_pages`). Segments become clip rectangles on
//!   source pages (`plan_documents`) or are handed to a packaging service
//!   (`submit_documents`).
//! - Crop mode: vertical bands over the stacked page view are cut from an
//!   oversampled raster, fitted onto fixed-size pages and assembled into a
//!   new PDF (`rasterize_bands`, `assemble_pdf`).
//!
//! [`SplitSession`] ties both together for one document.

pub mod annotations;
pub mod clip;
pub mod command;
pub mod config;
pub mod coords;
pub mod crop;
pub mod error;
pub mod export;
pub mod fit;
pub mod raster;
pub mod render;
pub mod segment;
pub mod session;

pub use annotations::{AnnotationStore, LineId, PageEndDisposition};
pub use clip::{plan_documents, ClipRect, DocumentPlan};
pub use command::{
    submit_documents, ProcessMetrics, ProcessResult, SegmentSubmitter, SplitRequest,
    SubmissionResponse,
};
pub use config::{ClickPolicy, SplitterConfig};
pub use coords::{PageSize, PageTable};
pub use crop::{CropBox, CropBoxes};
pub use error::HymnSplitError;
pub use export::assemble_pdf;
pub use fit::{fit_to_page, Placement};
pub use raster::{rasterize_bands, IncompletePolicy, RasterOptions};
pub use render::{measure_document, PageRender, PageRenderer, StackPage};
pub use segment::{segment_pages, OutputDocument, Segment, Segmentation};
pub use session::{ClickOutcome, SplitSession};

