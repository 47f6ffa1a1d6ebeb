//! Session value types and the durable-safe metadata projection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Durable store key for the live session's metadata.
pub const SESSION_KEY: &str = "currentVerificationSession";
/// Durable store key for the bounded completion history.
pub const HISTORY_KEY: &str = "verificationHistory";
/// FIFO retention bound for completed-session metadata.
pub const HISTORY_CAPACITY: usize = 10;

/// Steps of the verification flow, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    Welcome,
    SelfieCapture,
    DocumentCapture,
    Analysis,
    Result,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocType {
    Passport,
    NationalId,
    DriversLicense,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationStatus {
    InProgress,
    Approved,
    Rejected,
}

/// Outcome summary handed back by the analysis collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub score: f64,
    pub passed: bool,
    pub reason: Option<String>,
}

/// One in-flight verification session.
///
/// Deliberately NOT `Serialize`: the image payloads live only in memory and
/// must never be writable to the durable store by construction. Persist via
/// [`SessionMetadata`].
#[derive(Debug, Clone)]
pub struct VerificationSession {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub selfie_image: Option<Vec<u8>>,
    pub selfie_timestamp: Option<DateTime<Utc>>,
    pub document_image: Option<Vec<u8>>,
    pub document_type: Option<DocType>,
    pub completed_at: Option<DateTime<Utc>>,
    pub similarity_score: Option<f64>,
    pub status: VerificationStatus,
    pub result: Option<VerificationResult>,
}

impl VerificationSession {
    /// Fresh session with a time+random derived opaque id.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: format!("{:x}-{}", now.timestamp_millis(), Uuid::new_v4().simple()),
            started_at: now,
            selfie_image: None,
            selfie_timestamp: None,
            document_image: None,
            document_type: None,
            completed_at: None,
            similarity_score: None,
            status: VerificationStatus::InProgress,
            result: None,
        }
    }
}

impl Default for VerificationSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Durable-safe projection of a session: image payloads collapse to
/// presence booleans. This is the only session shape ever serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub has_selfie: bool,
    pub selfie_timestamp: Option<DateTime<Utc>>,
    pub has_document: bool,
    pub document_type: Option<DocType>,
    pub completed_at: Option<DateTime<Utc>>,
    pub similarity_score: Option<f64>,
    pub status: VerificationStatus,
    pub result: Option<VerificationResult>,
}

impl From<&VerificationSession> for SessionMetadata {
    fn from(s: &VerificationSession) -> Self {
        Self {
            id: s.id.clone(),
            started_at: s.started_at,
            has_selfie: s.selfie_image.is_some(),
            selfie_timestamp: s.selfie_timestamp,
            has_document: s.document_image.is_some(),
            document_type: s.document_type,
            completed_at: s.completed_at,
            similarity_score: s.similarity_score,
            status: s.status,
            result: s.result.clone(),
        }
    }
}
