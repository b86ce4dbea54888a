use thiserror::Error;

#[derive(Error, Debug)]
pub enum HymnSplitError {
    /// A page's native or rendered size has not been measured yet
    #[error("Page {page} has no dimension data yet")]
    MissingDimensionData { page: u32 },

    #[error("Nothing to undo")]
    EmptyHistory,

    /// The submission collaborator answered with a non-success status
    #[error("Submission failed ({status}): {detail}")]
    SubmissionFailure { status: u16, detail: String },

    #[error("Pages still rendering: {pages:?}")]
    RenderingIncomplete { pages: Vec<u32> },

    #[error("Unknown line {0}")]
    UnknownLine(u64),

    #[error("Invalid segment: {0}")]
    InvalidSegment(String),

    #[error("Invalid crop box: {0}")]
    InvalidCropBox(String),

    #[error("Failed to parse PDF: {0}")]
    ParseError(String),

    #[error("PDF operation failed: {0}")]
    OperationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for HymnSplitError {
    fn from(e: serde_json::Error) -> Self {
        HymnSplitError::SerializationError(e.to_string())
    }
}
