//! Submission port to the signing backend.
//!
//! The core hands the payload over by value and relinquishes interest;
//! retry and user-facing reporting stay with the caller.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("submission failed in transit: {0}")]
    Network(String),
    #[error("submission rejected by backend: {0}")]
    Rejected(String),
}

/// Everything the signing backend needs to record a verification.
#[derive(Debug)]
pub struct SubmissionRequest {
    pub session_id: String,
    pub similarity_score: f64,
    pub passed: bool,
    pub selfie_image: Option<Vec<u8>>,
    pub document_image: Option<Vec<u8>>,
}

/// Backend submission capability. Returns an opaque verification record id.
pub trait SubmissionApi {
    fn submit(&mut self, request: SubmissionRequest) -> Result<String, SubmissionError>;
}
