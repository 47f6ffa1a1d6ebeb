//! Verification session manager.
//!
//! Serializes all mutation through the single owned session value. Durable
//! writes are best-effort: a quota or availability failure is logged and
//! swallowed, because the in-memory session is the source of truth while
//! the flow is live.

use crate::store::MetadataStore;
use crate::submit::{SubmissionApi, SubmissionError, SubmissionRequest};
use crate::types::{
    DocType, SessionMetadata, Step, VerificationResult, VerificationSession, VerificationStatus,
    HISTORY_CAPACITY, HISTORY_KEY, SESSION_KEY,
};
use chrono::Utc;

pub struct SessionManager<S: MetadataStore> {
    store: S,
    session: Option<VerificationSession>,
    current_step: Step,
    history: Vec<SessionMetadata>,
}

impl<S: MetadataStore> SessionManager<S> {
    /// Wrap a store and load any persisted history. Read failures degrade
    /// to an empty history rather than blocking the flow.
    pub fn new(store: S) -> Self {
        let history = match store.get(HISTORY_KEY) {
            Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "stored history is corrupt; starting empty");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "history read failed; starting empty");
                Vec::new()
            }
        };

        Self {
            store,
            session: None,
            current_step: Step::Welcome,
            history,
        }
    }

    pub fn session(&self) -> Option<&VerificationSession> {
        self.session.as_ref()
    }

    pub fn current_step(&self) -> Step {
        self.current_step
    }

    pub fn history(&self) -> &[SessionMetadata] {
        &self.history
    }

    /// Explicit step transition. The only computed transition is the one
    /// [`complete_verification`](Self::complete_verification) performs.
    pub fn go_to_step(&mut self, step: Step) {
        tracing::debug!(?step, "step transition");
        self.current_step = step;
    }

    /// Create a fresh in-progress session and persist its metadata.
    pub fn start_session(&mut self) -> &VerificationSession {
        let session = VerificationSession::new();
        tracing::info!(id = %session.id, "verification session started");
        self.session = Some(session);
        self.persist_session_metadata();
        self.session.as_ref().expect("session was just stored")
    }

    /// Attach the selfie bytes to the in-memory session. Only the metadata
    /// projection is re-persisted.
    pub fn save_selfie(&mut self, image: Vec<u8>) {
        let Some(session) = self.session.as_mut() else {
            tracing::warn!("save_selfie with no active session; dropping image");
            return;
        };
        session.selfie_image = Some(image);
        session.selfie_timestamp = Some(Utc::now());
        self.persist_session_metadata();
    }

    /// Attach the document bytes and type to the in-memory session.
    pub fn save_document(&mut self, image: Vec<u8>, doc_type: DocType) {
        let Some(session) = self.session.as_mut() else {
            tracing::warn!("save_document with no active session; dropping image");
            return;
        };
        session.document_image = Some(image);
        session.document_type = Some(doc_type);
        self.persist_session_metadata();
    }

    /// Finalize the session: record the score, compute the terminal status,
    /// persist metadata, and append it to the bounded history.
    pub fn complete_verification(
        &mut self,
        score: f64,
        passed: bool,
        result: Option<VerificationResult>,
    ) {
        let Some(session) = self.session.as_mut() else {
            tracing::warn!("complete_verification with no active session");
            return;
        };

        session.completed_at = Some(Utc::now());
        session.similarity_score = Some(score);
        session.status = if passed {
            VerificationStatus::Approved
        } else {
            VerificationStatus::Rejected
        };
        session.result = result;
        self.current_step = Step::Result;

        let meta = SessionMetadata::from(&*session);
        tracing::info!(id = %meta.id, status = ?meta.status, score, "verification completed");

        self.persist_session_metadata();

        // Bounded FIFO retention: evict the oldest once over capacity.
        self.history.push(meta);
        while self.history.len() > HISTORY_CAPACITY {
            self.history.remove(0);
        }
        self.persist_history();
    }

    /// Drop the in-memory session and clear its persisted key. History is
    /// deliberately untouched.
    pub fn reset_session(&mut self) {
        if let Some(session) = &self.session {
            tracing::info!(id = %session.id, "session reset");
        }
        self.session = None;
        self.current_step = Step::Welcome;
        if let Err(e) = self.store.delete(SESSION_KEY) {
            tracing::warn!(error = %e, "failed to clear persisted session metadata");
        }
    }

    /// Hand the payload to the signing backend by value. The image bytes
    /// move out of the session; the core keeps no further interest in them.
    pub fn submit(&mut self, api: &mut dyn SubmissionApi) -> Result<String, SubmissionError> {
        let Some(session) = self.session.as_mut() else {
            return Err(SubmissionError::Rejected("no active session".to_string()));
        };
        let Some(score) = session.similarity_score else {
            return Err(SubmissionError::Rejected(
                "session has not completed verification".to_string(),
            ));
        };

        let request = SubmissionRequest {
            session_id: session.id.clone(),
            similarity_score: score,
            passed: session.status == VerificationStatus::Approved,
            selfie_image: session.selfie_image.take(),
            document_image: session.document_image.take(),
        };
        api.submit(request)
    }

    fn persist_session_metadata(&mut self) {
        let Some(session) = &self.session else {
            return;
        };
        let meta = SessionMetadata::from(session);
        match serde_json::to_string(&meta) {
            Ok(json) => Self::persist(&mut self.store, SESSION_KEY, &json),
            Err(e) => tracing::warn!(error = %e, "session metadata failed to serialize"),
        }
    }

    fn persist_history(&mut self) {
        match serde_json::to_string(&self.history) {
            Ok(json) => Self::persist(&mut self.store, HISTORY_KEY, &json),
            Err(e) => tracing::warn!(error = %e, "history failed to serialize"),
        }
    }

    /// Best-effort durable write. Mobile browsers routinely run out of
    /// quota mid-flow; losing metadata persistence never aborts the session.
    fn persist(store: &mut S, key: &str, json: &str) {
        if let Err(e) = store.put(key, json) {
            tracing::warn!(key, error = %e, "metadata persistence failed; continuing in memory");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, MetadataStore, StoreError};

    fn manager() -> SessionManager<MemoryStore> {
        SessionManager::new(MemoryStore::new())
    }

    fn sample_result(score: f64, passed: bool) -> VerificationResult {
        VerificationResult {
            score,
            passed,
            reason: None,
        }
    }

    #[test]
    fn test_start_session_persists_metadata() {
        let mut m = manager();
        let id = m.start_session().id.clone();
        let stored = m.store.get(SESSION_KEY).unwrap().unwrap();
        assert!(stored.contains(&id));
        assert!(stored.contains("InProgress"));
    }

    #[test]
    fn test_complete_verification_approves() {
        let mut m = manager();
        m.start_session();
        m.save_selfie(vec![1, 2, 3]);
        m.complete_verification(0.92, true, Some(sample_result(0.92, true)));

        let s = m.session().unwrap();
        assert_eq!(s.status, VerificationStatus::Approved);
        assert_eq!(s.similarity_score, Some(0.92));
        assert!(s.completed_at.is_some());
        assert_eq!(m.current_step(), Step::Result);
        assert_eq!(m.history().len(), 1);

        let stored = m.store.get(SESSION_KEY).unwrap().unwrap();
        assert!(stored.contains("Approved"));
    }

    #[test]
    fn test_complete_verification_rejects() {
        let mut m = manager();
        m.start_session();
        m.complete_verification(0.31, false, Some(sample_result(0.31, false)));
        assert_eq!(m.session().unwrap().status, VerificationStatus::Rejected);
    }

    #[test]
    fn test_history_bounded_to_capacity() {
        let mut m = manager();
        let mut ids = Vec::new();
        for _ in 0..15 {
            let id = m.start_session().id.clone();
            ids.push(id);
            m.complete_verification(0.8, true, None);
            m.reset_session();
        }

        assert_eq!(m.history().len(), HISTORY_CAPACITY);
        // The 10 most recent, in chronological order.
        let kept: Vec<&str> = m.history().iter().map(|h| h.id.as_str()).collect();
        let expected: Vec<&str> = ids[5..].iter().map(String::as_str).collect();
        assert_eq!(kept, expected);
    }

    #[test]
    fn test_history_survives_reset_and_reload() {
        let mut m = manager();
        m.start_session();
        m.complete_verification(0.9, true, None);
        m.reset_session();
        assert_eq!(m.history().len(), 1);

        // A new manager over the same store sees the persisted history.
        let store = m.store;
        let m2 = SessionManager::new(store);
        assert_eq!(m2.history().len(), 1);
    }

    #[test]
    fn test_no_raw_bytes_ever_persisted() {
        let mut m = manager();
        m.start_session();
        m.save_selfie(vec![0xAB; 4096]);
        m.save_document(vec![0xCD; 4096], DocType::Passport);
        m.complete_verification(0.88, true, Some(sample_result(0.88, true)));

        for value in m.store.values() {
            assert!(!value.contains("selfie_image"), "raw selfie field persisted");
            assert!(!value.contains("document_image"), "raw document field persisted");
            // 4 KiB of image bytes would dwarf any metadata record.
            assert!(value.len() < 2048, "suspiciously large store value: {}", value.len());
        }
        let stored = m.store.get(SESSION_KEY).unwrap().unwrap();
        assert!(stored.contains("\"has_selfie\":true"));
        assert!(stored.contains("\"has_document\":true"));
    }

    #[test]
    fn test_reset_clears_session_key_not_history() {
        let mut m = manager();
        m.start_session();
        m.complete_verification(0.7, true, None);
        m.reset_session();

        assert!(m.session().is_none());
        assert_eq!(m.current_step(), Step::Welcome);
        assert!(!m.store.contains_key(SESSION_KEY));
        assert!(m.store.contains_key(HISTORY_KEY));
    }

    #[test]
    fn test_save_without_session_is_noop() {
        let mut m = manager();
        m.save_selfie(vec![1, 2, 3]);
        m.save_document(vec![4, 5], DocType::NationalId);
        assert!(m.session().is_none());
        assert!(!m.store.contains_key(SESSION_KEY));
    }

    #[test]
    fn test_go_to_step() {
        let mut m = manager();
        m.go_to_step(Step::SelfieCapture);
        assert_eq!(m.current_step(), Step::SelfieCapture);
        m.go_to_step(Step::Analysis);
        assert_eq!(m.current_step(), Step::Analysis);
    }

    /// Store whose writes always fail; storage loss must never abort the flow.
    struct FailingStore;

    impl MetadataStore for FailingStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        fn put(&mut self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::QuotaExceeded)
        }
        fn delete(&mut self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
    }

    #[test]
    fn test_persistence_failure_is_swallowed() {
        let mut m = SessionManager::new(FailingStore);
        m.start_session();
        m.save_selfie(vec![9; 64]);
        m.complete_verification(0.95, true, None);
        m.reset_session();

        // In-memory flow unaffected; history still tracked in memory.
        assert_eq!(m.history().len(), 1);
        assert!(m.session().is_none());
    }

    #[test]
    fn test_corrupt_history_degrades_to_empty() {
        let mut store = MemoryStore::new();
        store.put(HISTORY_KEY, "not-json").unwrap();
        let m = SessionManager::new(store);
        assert!(m.history().is_empty());
    }

    struct RecordingApi {
        last: Option<SubmissionRequest>,
    }

    impl SubmissionApi for RecordingApi {
        fn submit(&mut self, request: SubmissionRequest) -> Result<String, SubmissionError> {
            self.last = Some(request);
            Ok("record-1".to_string())
        }
    }

    #[test]
    fn test_submit_moves_bytes_out_of_session() {
        let mut m = manager();
        m.start_session();
        m.save_selfie(vec![7; 128]);
        m.complete_verification(0.92, true, None);

        let mut api = RecordingApi { last: None };
        let record = m.submit(&mut api).unwrap();
        assert_eq!(record, "record-1");

        let sent = api.last.unwrap();
        assert_eq!(sent.similarity_score, 0.92);
        assert!(sent.passed);
        assert_eq!(sent.selfie_image.as_deref(), Some(&[7u8; 128][..]));
        // The session no longer owns the bytes.
        assert!(m.session().unwrap().selfie_image.is_none());
    }

    #[test]
    fn test_submit_requires_completed_session() {
        let mut m = manager();
        let mut api = RecordingApi { last: None };
        assert!(matches!(m.submit(&mut api), Err(SubmissionError::Rejected(_))));

        m.start_session();
        assert!(matches!(m.submit(&mut api), Err(SubmissionError::Rejected(_))));
    }
}
