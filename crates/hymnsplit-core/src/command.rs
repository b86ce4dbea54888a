use crate::error::HymnSplitError;
use crate::segment::{OutputDocument, Segment};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Body sent to the packaging service: documents in order, segments in order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SplitRequest {
    pub pdf_id: String,
    pub documents: Vec<Vec<Segment>>,
}

impl SplitRequest {
    pub fn new(pdf_id: impl Into<String>, documents: &[OutputDocument]) -> Self {
        Self {
            pdf_id: pdf_id.into(),
            documents: documents.iter().map(|d| d.segments.clone()).collect(),
        }
    }

    pub fn segment_count(&self) -> usize {
        self.documents.iter().map(Vec::len).sum()
    }
}

/// Raw answer from the packaging service
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl SubmissionResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The packaging collaborator: turns documents into an archive.
pub trait SegmentSubmitter {
    fn submit(&self, request: &SplitRequest) -> Result<SubmissionResponse, HymnSplitError>;
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    detail: serde_json::Value,
}

/// Submit once. The archive bytes on success; otherwise the service's own
/// message, unchanged. No retry.
pub fn submit_documents(
    submitter: &dyn SegmentSubmitter,
    request: &SplitRequest,
) -> Result<Vec<u8>, HymnSplitError> {
    if request.documents.iter().all(Vec::is_empty) {
        return Err(HymnSplitError::InvalidSegment(
            "No split regions provided".into(),
        ));
    }

    let response = submitter.submit(request)?;
    if response.is_success() {
        info!(
            documents = request.documents.len(),
            bytes = response.body.len(),
            "Submission accepted"
        );
        return Ok(response.body);
    }

    let detail = match serde_json::from_slice::<ErrorPayload>(&response.body) {
        Ok(ErrorPayload {
            detail: serde_json::Value::String(s),
        }) => s,
        Ok(ErrorPayload { detail }) => detail.to_string(),
        Err(_) => String::from_utf8_lossy(&response.body).into_owned(),
    };
    warn!(status = response.status, %detail, "Submission failed");
    Err(HymnSplitError::SubmissionFailure {
        status: response.status,
        detail,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessResult {
    pub success: bool,
    /// Where the output was written, when the run produced a file
    pub data: Option<String>,
    pub error: Option<String>,
    pub metrics: Option<ProcessMetrics>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessMetrics {
    pub input_pages: u32,
    pub output_documents: usize,
    pub output_pages: usize,
    pub skipped_pages: Vec<u32>,
    /// Crop bands left out of a crop export
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_bands: Vec<u64>,
    pub processing_time_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Canned {
        response: SubmissionResponse,
        calls: Cell<u32>,
    }

    impl SegmentSubmitter for Canned {
        fn submit(&self, _request: &SplitRequest) -> Result<SubmissionResponse, HymnSplitError> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.response.clone())
        }
    }

    fn canned(status: u16, body: &[u8]) -> Canned {
        Canned {
            response: SubmissionResponse {
                status,
                body: body.to_vec(),
            },
            calls: Cell::new(0),
        }
    }

    fn request() -> SplitRequest {
        SplitRequest::new(
            "abc.pdf",
            &[OutputDocument {
                segments: vec![Segment {
                    start_page: 1,
                    start_y: 0.0,
                    end_page: 1,
                    end_y: 792.0,
                    is_document_boundary: false,
                }],
            }],
        )
    }

    #[test]
    fn test_request_serializes_payload_shape() {
        let json = serde_json::to_value(request()).unwrap();
        assert_eq!(json["pdf_id"], "abc.pdf");
        assert_eq!(json["documents"][0][0]["start_page"], 1);
        assert_eq!(json["documents"][0][0]["stopDocument"], false);
    }

    #[test]
    fn test_success_returns_archive() {
        let svc = canned(200, b"PK\x03\x04");
        assert_eq!(submit_documents(&svc, &request()).unwrap(), b"PK\x03\x04");
    }

    #[test]
    fn test_failure_surfaces_detail_verbatim() {
        let svc = canned(500, br#"{"detail":"Invalid page number: 9"}"#);
        let err = submit_documents(&svc, &request()).unwrap_err();
        match err {
            HymnSplitError::SubmissionFailure { status, detail } => {
                assert_eq!(status, 500);
                assert_eq!(detail, "Invalid page number: 9");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(svc.calls.get(), 1);
    }

    #[test]
    fn test_failure_with_plain_body() {
        let svc = canned(502, b"Bad Gateway");
        let err = submit_documents(&svc, &request()).unwrap_err();
        assert!(matches!(
            err,
            HymnSplitError::SubmissionFailure { status: 502, ref detail } if detail == "Bad Gateway"
        ));
    }

    #[test]
    fn test_empty_request_is_rejected_before_sending() {
        let svc = canned(200, b"");
        let empty = SplitRequest::new("abc.pdf", &[]);
        assert!(submit_documents(&svc, &empty).is_err());
        assert_eq!(svc.calls.get(), 0);
    }
}
