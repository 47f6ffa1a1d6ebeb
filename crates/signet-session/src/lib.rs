//! signet-session: verification flow state and metadata persistence.
//!
//! Owns the in-memory session, including its biometric payloads, for the
//! session's lifetime. Only the metadata projection (booleans in place of
//! image bytes) ever reaches the durable store.

pub mod manager;
pub mod store;
pub mod submit;
pub mod types;

pub use manager::SessionManager;
pub use store::{MemoryStore, MetadataStore, SqliteKvStore, StoreError};
pub use submit::{SubmissionApi, SubmissionError, SubmissionRequest};
pub use types::{
    DocType, SessionMetadata, Step, VerificationResult, VerificationSession, VerificationStatus,
};
