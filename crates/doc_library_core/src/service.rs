//! crates/doc_library_core/src/service.rs
//!
//! The data-access core. `DataService` mediates every read and write between the
//! view layer and the backend gateway, owns the list cache and the session, and
//! applies size-based storage placement and image recompression on writes.
//!
//! Operations do not lock against each other. Two overlapping writes to the
//! same record can race, and a list read that was in flight when a write
//! cleared the cache can put the older list back into the cache.

use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cache::{CacheKey, ResourceCache};
use crate::compress::compress_image;
use crate::config::CoreConfig;
use crate::domain::{
    AuthSession, Document, DocumentChanges, DocumentDraft, DocumentInput, DocumentUpdateInput,
    LoginOutcome, StoredContent, Subject, SubjectChanges, SubjectDraft, SubjectInput, Theme,
};
use crate::error::{CoreError, CoreResult};
use crate::ports::{
    AuthGateway, BackendGateway, BlobStorage, Clock, PortError, PreferenceStore, RecordStore,
    SessionListener, SystemClock,
};
use crate::tiering::{
    blob_path_from_url, check_file_size, decode_data_url, estimate_encoded_size,
    is_inline_payload, placement_for, storage_path, Placement,
};

const THEME_KEY: &str = "theme";
const ADMIN_IDENTIFIER: &str = "admin";

//=========================================================================================
// Session Slot
//=========================================================================================

/// Holds the current session. The auth backend pushes every change into it.
#[derive(Debug, Default)]
pub struct SessionSlot {
    current: RwLock<Option<AuthSession>>,
}

impl SessionSlot {
    pub fn get(&self) -> Option<AuthSession> {
        self.current.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set(&self, session: Option<AuthSession>) {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = session;
    }
}

impl SessionListener for SessionSlot {
    fn on_session_changed(&self, session: Option<AuthSession>) {
        debug!(signed_in = session.is_some(), "Auth state changed");
        self.set(session);
    }
}

//=========================================================================================
// DataService
//=========================================================================================

pub struct DataService {
    gateway: Arc<dyn BackendGateway>,
    preferences: Arc<dyn PreferenceStore>,
    clock: Arc<dyn Clock>,
    config: CoreConfig,
    cache: Mutex<ResourceCache>,
    session: Arc<SessionSlot>,
    initialized: AtomicBool,
}

impl DataService {
    pub fn new(
        gateway: Arc<dyn BackendGateway>,
        preferences: Arc<dyn PreferenceStore>,
        config: CoreConfig,
    ) -> Self {
        Self::with_clock(gateway, preferences, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        gateway: Arc<dyn BackendGateway>,
        preferences: Arc<dyn PreferenceStore>,
        config: CoreConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = ResourceCache::new(&config, clock.clone());
        Self {
            gateway,
            preferences,
            clock,
            config,
            cache: Mutex::new(cache),
            session: Arc::new(SessionSlot::default()),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    fn cache(&self) -> MutexGuard<'_, ResourceCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_cache_valid(&self, key: CacheKey) -> bool {
        self.cache().is_valid(key)
    }

    pub fn clear_cache(&self, key: Option<CacheKey>) {
        self.cache().clear(key);
    }

    // --- Session ---

    /// Loads the backend's current session and subscribes to auth changes.
    /// Calling it again after a successful run does nothing; a failed run is
    /// logged and may be retried.
    pub async fn init(&self) {
        if self.initialized.load(Ordering::Acquire) {
            return;
        }
        match self.gateway.get_session().await {
            Ok(session) => {
                self.session.set(session);
                if !self.initialized.swap(true, Ordering::AcqRel) {
                    self.gateway.on_auth_state_change(self.session.clone());
                }
                info!(signed_in = self.is_logged_in(), "DataService initialized");
            }
            Err(e) => error!(error = %e, "DataService init failed"),
        }
    }

    /// Signs in. Rejected credentials come back as an unsuccessful outcome, not
    /// as an error. The identifier `admin` stands for the configured admin email.
    pub async fn login(&self, identifier: &str, password: &str) -> LoginOutcome {
        let email = if identifier == ADMIN_IDENTIFIER {
            self.config.admin_email.as_str()
        } else {
            identifier
        };

        match self.gateway.sign_in_with_password(email, password).await {
            Ok(session) => {
                let token = session.access_token.clone();
                info!(user_id = %session.user.id, "Login successful");
                self.session.set(Some(session));
                LoginOutcome::accepted(token)
            }
            Err(PortError::Unauthorized(message)) => {
                warn!(email, "Login rejected");
                if message.is_empty() {
                    LoginOutcome::rejected("Invalid credentials")
                } else {
                    LoginOutcome::rejected(message)
                }
            }
            Err(e) => {
                error!(error = %e, "Login failed");
                LoginOutcome::rejected(format!("Login failed: {}", e))
            }
        }
    }

    /// Signs out and drops the local session and every cached list, even when
    /// the backend sign-out call fails.
    pub async fn logout(&self) {
        if let Err(e) = self.gateway.sign_out().await {
            warn!(error = %e, "Sign-out call failed; clearing local session anyway");
        }
        self.session.set(None);
        self.cache().clear(None);
    }

    pub fn is_logged_in(&self) -> bool {
        self.current_session().is_some()
    }

    /// The active session. One whose `expires_at` has passed counts as signed out.
    pub fn current_session(&self) -> Option<AuthSession> {
        let now = self.clock.now();
        self.session
            .get()
            .filter(|s| s.expires_at.map_or(true, |at| at > now))
    }

    /// True when `token` is the access token of the active session.
    pub fn is_session_token(&self, token: &str) -> bool {
        match self.current_session() {
            Some(session) => constant_time_eq(session.access_token.as_bytes(), token.as_bytes()),
            None => false,
        }
    }

    // --- Subjects ---

    /// All subjects, newest first. Served from the cache while it is valid.
    pub async fn get_all_subjects(&self) -> CoreResult<Vec<Subject>> {
        let cached = self.cache().subjects();
        if let Some(subjects) = cached {
            debug!(count = subjects.len(), "Subjects served from cache");
            return Ok(subjects);
        }

        let subjects = self.gateway.list_subjects().await?;
        self.cache().set_subjects(subjects.clone());
        Ok(subjects)
    }

    pub async fn get_subject_by_id(&self, subject_id: Uuid) -> CoreResult<Subject> {
        self.gateway
            .get_subject(subject_id)
            .await
            .map_err(CoreError::lookup("Subject", subject_id))
    }

    pub async fn add_subject(&self, input: SubjectInput) -> CoreResult<Subject> {
        let name = required_name("Subject", &input.name)?;
        let image = self.prepare_image(input.image)?;

        let draft = SubjectDraft {
            name,
            description: input.description.unwrap_or_default(),
            image,
        };
        let subject = self.gateway.insert_subject(&draft).await?;
        self.cache().clear(Some(CacheKey::Subjects));

        info!(subject_id = %subject.id, "Subject created");
        Ok(subject)
    }

    pub async fn update_subject(&self, subject_id: Uuid, input: SubjectInput) -> CoreResult<()> {
        let name = required_name("Subject", &input.name)?;
        let image = self.prepare_image(input.image)?;

        let changes = SubjectChanges {
            name,
            description: input.description.unwrap_or_default(),
            image,
            updated_at: self.clock.now(),
        };
        self.gateway.update_subject(subject_id, &changes).await?;
        self.cache().clear(Some(CacheKey::Subjects));

        info!(%subject_id, "Subject updated");
        Ok(())
    }

    /// Deletes every document of the subject, then the subject itself.
    ///
    /// Documents go one at a time so their stored files can be removed too. If
    /// any document record fails to delete, the subject is left in place and
    /// the error is returned. The whole cache is cleared either way.
    pub async fn delete_subject(&self, subject_id: Uuid) -> CoreResult<()> {
        let documents = self.gateway.list_documents(Some(subject_id)).await?;

        let mut outcome = Ok(());
        for document in &documents {
            self.remove_stored_file(document).await;
            if let Err(e) = self.gateway.delete_document(document.id).await {
                error!(%subject_id, document_id = %document.id, error = %e, "Aborting subject delete");
                outcome = Err(e);
                break;
            }
        }
        if outcome.is_ok() {
            outcome = self.gateway.delete_subject(subject_id).await;
        }
        self.cache().clear(None);
        outcome?;

        info!(%subject_id, documents = documents.len(), "Subject deleted");
        Ok(())
    }

    // --- Documents ---

    /// All documents, newest first. Served from the cache while it is valid.
    pub async fn get_all_documents(&self) -> CoreResult<Vec<Document>> {
        let cached = self.cache().documents();
        if let Some(documents) = cached {
            debug!(count = documents.len(), "Documents served from cache");
            return Ok(documents);
        }

        let documents = self.gateway.list_documents(None).await?;
        self.cache().set_documents(documents.clone());
        Ok(documents)
    }

    pub async fn get_documents_by_subject(&self, subject_id: Uuid) -> CoreResult<Vec<Document>> {
        Ok(self.gateway.list_documents(Some(subject_id)).await?)
    }

    pub async fn get_document_by_id(&self, document_id: Uuid) -> CoreResult<Document> {
        self.gateway
            .get_document(document_id)
            .await
            .map_err(CoreError::lookup("Document", document_id))
    }

    /// Stores a new document. The payload size decides whether the content
    /// stays inline or is uploaded to blob storage.
    pub async fn upload_document(&self, input: DocumentInput) -> CoreResult<Document> {
        let name = required_name("Document", &input.name)?;
        let stored = self.store_content(&input.content, &name).await?;

        let draft = DocumentDraft {
            subject_id: input.subject_id,
            name,
            description: input.description.unwrap_or_default(),
            doc_type: input.doc_type,
            content: stored.content,
            is_storage_file: stored.is_storage_file,
            file_size: stored.file_size,
        };
        let document = self.gateway.insert_document(&draft).await?;
        self.cache().clear(Some(CacheKey::Documents));

        info!(
            document_id = %document.id,
            bytes = document.file_size,
            in_storage = document.is_storage_file,
            "Document uploaded"
        );
        Ok(document)
    }

    pub async fn add_document(&self, input: DocumentInput) -> CoreResult<Document> {
        self.upload_document(input).await
    }

    /// Updates the metadata, and the file when `content` carries a new inline
    /// payload. A previously uploaded blob is not removed when its content is
    /// replaced.
    pub async fn update_document(
        &self,
        document_id: Uuid,
        input: DocumentUpdateInput,
    ) -> CoreResult<()> {
        let name = required_name("Document", &input.name)?;
        let content = match input.content.as_deref() {
            Some(payload) if is_inline_payload(payload) => {
                Some(self.store_content(payload, &name).await?)
            }
            Some(_) | None => None,
        };

        let changes = DocumentChanges {
            name,
            description: input.description.unwrap_or_default(),
            doc_type: input.doc_type,
            updated_at: self.clock.now(),
            content,
        };
        self.gateway.update_document(document_id, &changes).await?;
        self.cache().clear(Some(CacheKey::Documents));

        info!(%document_id, content_replaced = changes.content.is_some(), "Document updated");
        Ok(())
    }

    pub async fn delete_document(&self, document_id: Uuid) -> CoreResult<()> {
        let document = self.get_document_by_id(document_id).await?;
        self.remove_stored_file(&document).await;

        self.gateway.delete_document(document_id).await?;
        self.cache().clear(Some(CacheKey::Documents));

        info!(%document_id, "Document deleted");
        Ok(())
    }

    /// Case-insensitive match on name or description, optionally within one
    /// subject. Always read live.
    pub async fn search_documents(
        &self,
        query: &str,
        subject_id: Option<Uuid>,
    ) -> CoreResult<Vec<Document>> {
        Ok(self.gateway.search_documents(query, subject_id).await?)
    }

    // --- Preferences ---

    pub async fn get_theme(&self) -> CoreResult<Theme> {
        let stored = self.preferences.get(THEME_KEY).await?;
        Ok(stored
            .and_then(|value| value.parse::<Theme>().ok())
            .unwrap_or_default())
    }

    pub async fn set_theme(&self, theme: Theme) -> CoreResult<()> {
        Ok(self.preferences.set(THEME_KEY, theme.as_str()).await?)
    }

    // --- Helpers ---

    /// Recompresses a fresh inline image; URL references pass through.
    fn prepare_image(&self, image: Option<String>) -> CoreResult<Option<String>> {
        match image {
            Some(image) if image.is_empty() => Ok(None),
            Some(image) if is_inline_payload(&image) => compress_image(
                &image,
                self.config.image_max_size,
                self.config.max_image_dimension,
            )
            .map(Some),
            other => Ok(other),
        }
    }

    /// Checks the size limit and places the payload inline or in blob storage.
    async fn store_content(&self, payload: &str, name: &str) -> CoreResult<StoredContent> {
        let file_size = estimate_encoded_size(payload);
        check_file_size(file_size, self.config.max_file_size)?;
        if !is_inline_payload(payload) {
            return Err(CoreError::InvalidPayload(
                "document content must be a data: payload".to_string(),
            ));
        }

        match placement_for(file_size, self.config.small_file_threshold) {
            Placement::Inline => Ok(StoredContent {
                content: payload.to_string(),
                is_storage_file: false,
                file_size,
            }),
            Placement::Blob => Ok(StoredContent {
                content: self.upload_to_storage(payload, name).await?,
                is_storage_file: true,
                file_size,
            }),
        }
    }

    async fn upload_to_storage(&self, payload: &str, name: &str) -> CoreResult<String> {
        let decoded = decode_data_url(payload)?;
        let path = storage_path(self.clock.now().timestamp_millis(), name);
        let bytes = decoded.bytes.len();

        self.gateway
            .upload(&path, Bytes::from(decoded.bytes), &decoded.content_type, false)
            .await?;

        debug!(%path, bytes, "Uploaded file to blob storage");
        Ok(self.gateway.public_url(&path))
    }

    /// Removes the blob behind a storage-backed document. Failure is logged and
    /// swallowed so the record deletion that follows still runs.
    async fn remove_stored_file(&self, document: &Document) {
        if !document.is_storage_file || document.content.is_empty() {
            return;
        }
        let path = blob_path_from_url(&document.content).to_string();
        match self.gateway.remove(std::slice::from_ref(&path)).await {
            Ok(()) => debug!(document_id = %document.id, %path, "Stored file removed"),
            Err(e) => warn!(
                document_id = %document.id,
                %path,
                error = %e,
                "Could not remove stored file; deleting the record anyway"
            ),
        }
    }
}

/// Compares without short-circuiting on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn required_name(kind: &str, name: &str) -> CoreResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CoreError::InvalidInput(format!("{} name is required", kind)));
    }
    Ok(name.to_string())
}
