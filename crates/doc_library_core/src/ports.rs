//! crates/doc_library_core/src/ports.rs
//!
//! Defines the service contracts (traits) the core talks to.
//! Together they form the boundary of the hexagonal architecture: the managed
//! backend, the preference store and the clock are all injected through here,
//! so tests can swap in the in-memory implementations.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{
    AuthSession, Document, DocumentChanges, DocumentDraft, Subject, SubjectChanges, SubjectDraft,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., HTTP, storage).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Backend Gateway Ports
//=========================================================================================

/// Receives session updates pushed by the authentication backend.
pub trait SessionListener: Send + Sync {
    fn on_session_changed(&self, session: Option<AuthSession>);
}

#[async_trait]
pub trait AuthGateway: Send + Sync {
    /// Returns the session the backend currently holds, if any.
    async fn get_session(&self) -> PortResult<Option<AuthSession>>;

    /// Fails with `PortError::Unauthorized` when the credentials are rejected.
    async fn sign_in_with_password(&self, email: &str, password: &str)
        -> PortResult<AuthSession>;

    async fn sign_out(&self) -> PortResult<()>;

    /// Registers a listener that is notified after every sign-in and sign-out.
    /// Sessions are not refreshed; once `expires_at` passes the caller has to
    /// sign in again.
    fn on_auth_state_change(&self, listener: Arc<dyn SessionListener>);
}

/// Row-oriented access to the `subjects` and `documents` collections.
/// Every list is ordered by `created_at` descending.
#[async_trait]
pub trait RecordStore: Send + Sync {
    // --- Subjects ---
    async fn list_subjects(&self) -> PortResult<Vec<Subject>>;

    /// Fails with `PortError::NotFound` when no row matches.
    async fn get_subject(&self, subject_id: Uuid) -> PortResult<Subject>;

    async fn insert_subject(&self, draft: &SubjectDraft) -> PortResult<Subject>;

    async fn update_subject(&self, subject_id: Uuid, changes: &SubjectChanges) -> PortResult<()>;

    async fn delete_subject(&self, subject_id: Uuid) -> PortResult<()>;

    // --- Documents ---
    /// Lists all documents, or only those of `subject_id` when given.
    async fn list_documents(&self, subject_id: Option<Uuid>) -> PortResult<Vec<Document>>;

    /// Fails with `PortError::NotFound` when no row matches.
    async fn get_document(&self, document_id: Uuid) -> PortResult<Document>;

    async fn insert_document(&self, draft: &DocumentDraft) -> PortResult<Document>;

    async fn update_document(
        &self,
        document_id: Uuid,
        changes: &DocumentChanges,
    ) -> PortResult<()>;

    async fn delete_document(&self, document_id: Uuid) -> PortResult<()>;

    /// Case-insensitive substring match on name or description.
    async fn search_documents(
        &self,
        query: &str,
        subject_id: Option<Uuid>,
    ) -> PortResult<Vec<Document>>;
}

/// The blob bucket large documents are offloaded to.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    async fn upload(
        &self,
        path: &str,
        data: Bytes,
        content_type: &str,
        upsert: bool,
    ) -> PortResult<()>;

    fn public_url(&self, path: &str) -> String;

    async fn remove(&self, paths: &[String]) -> PortResult<()>;
}

/// The full managed backend: authentication, records and blob storage.
pub trait BackendGateway: AuthGateway + RecordStore + BlobStorage {}

impl<T> BackendGateway for T where T: AuthGateway + RecordStore + BlobStorage {}

//=========================================================================================
// Local Ports
//=========================================================================================

/// Small key-value persistence for user preferences such as the theme.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get(&self, key: &str) -> PortResult<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> PortResult<()>;
}

/// Time source for cache ageing and storage path generation.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock using system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-driven clock for deterministic tests.
#[derive(Debug)]
pub struct ManualClock {
    now: std::sync::Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Mutex::new(start),
        }
    }

    pub fn advance(&self, by: std::time::Duration) {
        let step = chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::weeks(52_000));
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += step;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
