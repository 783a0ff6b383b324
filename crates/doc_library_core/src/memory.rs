//! crates/doc_library_core/src/memory.rs
//!
//! In-memory implementations of the ports: a complete backend gateway (records,
//! blob bucket and password auth) plus a preference store.
//!
//! Used for offline runs of the service and as the fake backend in tests. Every
//! call is recorded, and failures can be injected per call.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::domain::{
    AuthSession, Document, DocumentChanges, DocumentDraft, Subject, SubjectChanges, SubjectDraft,
    User,
};
use crate::ports::{
    AuthGateway, BlobStorage, Clock, PortError, PortResult, PreferenceStore, RecordStore,
    SessionListener, SystemClock,
};

const DEFAULT_PUBLIC_BASE: &str = "memory://documents";

/// One recorded gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    GetSession,
    SignIn(String),
    SignOut,
    ListSubjects,
    GetSubject(Uuid),
    InsertSubject,
    UpdateSubject(Uuid),
    DeleteSubject(Uuid),
    ListDocuments(Option<Uuid>),
    GetDocument(Uuid),
    InsertDocument,
    UpdateDocument(Uuid),
    DeleteDocument(Uuid),
    SearchDocuments(String, Option<Uuid>),
    Upload(String),
    Remove(Vec<String>),
}

impl GatewayCall {
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            GatewayCall::InsertSubject
                | GatewayCall::UpdateSubject(_)
                | GatewayCall::DeleteSubject(_)
                | GatewayCall::InsertDocument
                | GatewayCall::UpdateDocument(_)
                | GatewayCall::DeleteDocument(_)
                | GatewayCall::Upload(_)
                | GatewayCall::Remove(_)
        )
    }
}

type FailurePredicate = Box<dyn Fn(&GatewayCall) -> bool + Send + Sync>;

struct Account {
    user: User,
    password: String,
}

#[derive(Clone)]
struct StoredBlob {
    content_type: String,
    data: Bytes,
}

pub struct InMemoryGateway {
    clock: Arc<dyn Clock>,
    public_base: String,
    subjects: Mutex<Vec<Subject>>,
    documents: Mutex<Vec<Document>>,
    blobs: Mutex<HashMap<String, StoredBlob>>,
    accounts: Mutex<HashMap<String, Account>>,
    session: Mutex<Option<AuthSession>>,
    listeners: Mutex<Vec<Arc<dyn SessionListener>>>,
    calls: Mutex<Vec<GatewayCall>>,
    failures: Mutex<Vec<FailurePredicate>>,
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            public_base: DEFAULT_PUBLIC_BASE.to_string(),
            subjects: Mutex::new(Vec::new()),
            documents: Mutex::new(Vec::new()),
            blobs: Mutex::new(HashMap::new()),
            accounts: Mutex::new(HashMap::new()),
            session: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
        }
    }

    /// Registers an account that `sign_in_with_password` accepts.
    pub fn add_account(&self, email: &str, password: &str) -> User {
        let user = User {
            id: Uuid::new_v4(),
            email: Some(email.to_string()),
        };
        lock(&self.accounts).insert(
            email.to_string(),
            Account {
                user: user.clone(),
                password: password.to_string(),
            },
        );
        user
    }

    /// Makes every subsequent call matching `predicate` fail with
    /// `PortError::Unavailable`. The call is still recorded.
    pub fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(&GatewayCall) -> bool + Send + Sync + 'static,
    {
        lock(&self.failures).push(Box::new(predicate));
    }

    pub fn clear_failures(&self) {
        lock(&self.failures).clear();
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        lock(&self.calls).clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    pub fn count_calls<F>(&self, predicate: F) -> usize
    where
        F: Fn(&GatewayCall) -> bool,
    {
        lock(&self.calls).iter().filter(|c| predicate(*c)).count()
    }

    pub fn blob_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = lock(&self.blobs).keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Content type and bytes of a stored blob.
    pub fn blob(&self, path: &str) -> Option<(String, Bytes)> {
        lock(&self.blobs)
            .get(path)
            .map(|b| (b.content_type.clone(), b.data.clone()))
    }

    pub fn document_count(&self) -> usize {
        lock(&self.documents).len()
    }

    pub fn subject_count(&self) -> usize {
        lock(&self.subjects).len()
    }

    /// Pushes a session change to every listener, as a token refresh would.
    pub fn emit_session(&self, session: Option<AuthSession>) {
        *lock(&self.session) = session.clone();
        self.notify(session);
    }

    fn record(&self, call: GatewayCall) -> PortResult<()> {
        let failing = lock(&self.failures).iter().any(|p| p(&call));
        let description = format!("{:?}", call);
        lock(&self.calls).push(call);
        if failing {
            return Err(PortError::Unavailable(format!("injected failure on {}", description)));
        }
        Ok(())
    }

    fn notify(&self, session: Option<AuthSession>) {
        let listeners: Vec<Arc<dyn SessionListener>> = lock(&self.listeners).clone();
        for listener in listeners {
            listener.on_session_changed(session.clone());
        }
    }
}

/// Newest first; rows are kept in insertion order.
fn newest_first<T: Clone>(rows: &[T], keep: impl Fn(&T) -> bool) -> Vec<T> {
    rows.iter().rev().filter(|r| keep(*r)).cloned().collect()
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

//=========================================================================================
// `AuthGateway` Implementation
//=========================================================================================

#[async_trait]
impl AuthGateway for InMemoryGateway {
    async fn get_session(&self) -> PortResult<Option<AuthSession>> {
        self.record(GatewayCall::GetSession)?;
        Ok(lock(&self.session).clone())
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> PortResult<AuthSession> {
        self.record(GatewayCall::SignIn(email.to_string()))?;
        let user = {
            let accounts = lock(&self.accounts);
            match accounts.get(email) {
                Some(account) if account.password == password => account.user.clone(),
                _ => return Err(PortError::Unauthorized("Invalid login credentials".to_string())),
            }
        };
        let session = AuthSession {
            user,
            access_token: Uuid::new_v4().to_string(),
            refresh_token: Some(Uuid::new_v4().to_string()),
            expires_at: Some(self.clock.now() + chrono::Duration::hours(1)),
        };
        *lock(&self.session) = Some(session.clone());
        self.notify(Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> PortResult<()> {
        self.record(GatewayCall::SignOut)?;
        *lock(&self.session) = None;
        self.notify(None);
        Ok(())
    }

    fn on_auth_state_change(&self, listener: Arc<dyn SessionListener>) {
        lock(&self.listeners).push(listener);
    }
}

//=========================================================================================
// `RecordStore` Implementation
//=========================================================================================

#[async_trait]
impl RecordStore for InMemoryGateway {
    async fn list_subjects(&self) -> PortResult<Vec<Subject>> {
        self.record(GatewayCall::ListSubjects)?;
        Ok(newest_first(&lock(&self.subjects), |_| true))
    }

    async fn get_subject(&self, subject_id: Uuid) -> PortResult<Subject> {
        self.record(GatewayCall::GetSubject(subject_id))?;
        lock(&self.subjects)
            .iter()
            .find(|s| s.id == subject_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Subject {} not found", subject_id)))
    }

    async fn insert_subject(&self, draft: &SubjectDraft) -> PortResult<Subject> {
        self.record(GatewayCall::InsertSubject)?;
        let subject = Subject {
            id: Uuid::new_v4(),
            name: draft.name.clone(),
            description: draft.description.clone(),
            image: draft.image.clone(),
            created_at: self.clock.now(),
            updated_at: None,
        };
        lock(&self.subjects).push(subject.clone());
        Ok(subject)
    }

    async fn update_subject(&self, subject_id: Uuid, changes: &SubjectChanges) -> PortResult<()> {
        self.record(GatewayCall::UpdateSubject(subject_id))?;
        if let Some(subject) = lock(&self.subjects).iter_mut().find(|s| s.id == subject_id) {
            subject.name = changes.name.clone();
            subject.description = changes.description.clone();
            subject.image = changes.image.clone();
            subject.updated_at = Some(changes.updated_at);
        }
        Ok(())
    }

    async fn delete_subject(&self, subject_id: Uuid) -> PortResult<()> {
        self.record(GatewayCall::DeleteSubject(subject_id))?;
        if lock(&self.documents).iter().any(|d| d.subject_id == subject_id) {
            return Err(PortError::Unexpected(format!(
                "subject {} is still referenced by documents",
                subject_id
            )));
        }
        lock(&self.subjects).retain(|s| s.id != subject_id);
        Ok(())
    }

    async fn list_documents(&self, subject_id: Option<Uuid>) -> PortResult<Vec<Document>> {
        self.record(GatewayCall::ListDocuments(subject_id))?;
        Ok(newest_first(&lock(&self.documents), |d| {
            subject_id.map_or(true, |id| d.subject_id == id)
        }))
    }

    async fn get_document(&self, document_id: Uuid) -> PortResult<Document> {
        self.record(GatewayCall::GetDocument(document_id))?;
        lock(&self.documents)
            .iter()
            .find(|d| d.id == document_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Document {} not found", document_id)))
    }

    async fn insert_document(&self, draft: &DocumentDraft) -> PortResult<Document> {
        self.record(GatewayCall::InsertDocument)?;
        if !lock(&self.subjects).iter().any(|s| s.id == draft.subject_id) {
            return Err(PortError::Unexpected(format!(
                "subject {} does not exist",
                draft.subject_id
            )));
        }
        let document = Document {
            id: Uuid::new_v4(),
            subject_id: draft.subject_id,
            name: draft.name.clone(),
            description: draft.description.clone(),
            doc_type: draft.doc_type,
            content: draft.content.clone(),
            is_storage_file: draft.is_storage_file,
            file_size: draft.file_size,
            created_at: self.clock.now(),
            updated_at: None,
        };
        lock(&self.documents).push(document.clone());
        Ok(document)
    }

    async fn update_document(
        &self,
        document_id: Uuid,
        changes: &DocumentChanges,
    ) -> PortResult<()> {
        self.record(GatewayCall::UpdateDocument(document_id))?;
        if let Some(document) = lock(&self.documents).iter_mut().find(|d| d.id == document_id) {
            document.name = changes.name.clone();
            document.description = changes.description.clone();
            document.doc_type = changes.doc_type;
            document.updated_at = Some(changes.updated_at);
            if let Some(stored) = &changes.content {
                document.content = stored.content.clone();
                document.is_storage_file = stored.is_storage_file;
                document.file_size = stored.file_size;
            }
        }
        Ok(())
    }

    async fn delete_document(&self, document_id: Uuid) -> PortResult<()> {
        self.record(GatewayCall::DeleteDocument(document_id))?;
        lock(&self.documents).retain(|d| d.id != document_id);
        Ok(())
    }

    async fn search_documents(
        &self,
        query: &str,
        subject_id: Option<Uuid>,
    ) -> PortResult<Vec<Document>> {
        self.record(GatewayCall::SearchDocuments(query.to_string(), subject_id))?;
        let needle = query.to_lowercase();
        Ok(newest_first(&lock(&self.documents), |d| {
            subject_id.map_or(true, |id| d.subject_id == id)
                && (contains_ignore_case(&d.name, &needle)
                    || contains_ignore_case(&d.description, &needle))
        }))
    }
}

//=========================================================================================
// `BlobStorage` Implementation
//=========================================================================================

#[async_trait]
impl BlobStorage for InMemoryGateway {
    async fn upload(
        &self,
        path: &str,
        data: Bytes,
        content_type: &str,
        upsert: bool,
    ) -> PortResult<()> {
        self.record(GatewayCall::Upload(path.to_string()))?;
        let mut blobs = lock(&self.blobs);
        if !upsert && blobs.contains_key(path) {
            return Err(PortError::Unexpected(format!("The resource {} already exists", path)));
        }
        blobs.insert(
            path.to_string(),
            StoredBlob {
                content_type: content_type.to_string(),
                data,
            },
        );
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.public_base, path)
    }

    async fn remove(&self, paths: &[String]) -> PortResult<()> {
        self.record(GatewayCall::Remove(paths.to_vec()))?;
        let mut blobs = lock(&self.blobs);
        for path in paths {
            blobs.remove(path);
        }
        Ok(())
    }
}

//=========================================================================================
// Preferences
//=========================================================================================

#[derive(Default)]
pub struct InMemoryPreferences {
    values: Mutex<HashMap<String, String>>,
}

impl InMemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PreferenceStore for InMemoryPreferences {
    async fn get(&self, key: &str) -> PortResult<Option<String>> {
        Ok(lock(&self.values).get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> PortResult<()> {
        lock(&self.values).insert(key.to_string(), value.to_string());
        Ok(())
    }
}
