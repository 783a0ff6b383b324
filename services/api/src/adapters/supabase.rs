//! services/api/src/adapters/supabase.rs
//!
//! This module contains the managed-backend adapter, the concrete implementation
//! of the `AuthGateway`, `RecordStore` and `BlobStorage` ports from the core
//! crate. It talks to a Supabase project over HTTP: PostgREST for rows, GoTrue
//! for password sign-in and the Storage API for the document bucket.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, TimeZone, Utc};
use doc_library_core::domain::{
    AuthSession, Document, DocumentChanges, DocumentDraft, DocumentType, Subject, SubjectChanges,
    SubjectDraft, User,
};
use doc_library_core::ports::{
    AuthGateway, BlobStorage, PortError, PortResult, RecordStore, SessionListener,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

const SUBJECTS: &str = "subjects";
const DOCUMENTS: &str = "documents";
const NEWEST_FIRST: &str = "created_at.desc";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the backend ports against a Supabase project.
pub struct SupabaseAdapter {
    client: Client,
    base_url: String,
    anon_key: String,
    bucket: String,
    session: RwLock<Option<AuthSession>>,
    listeners: Mutex<Vec<Arc<dyn SessionListener>>>,
}

impl SupabaseAdapter {
    /// Creates a new `SupabaseAdapter`.
    pub fn new(client: Client, base_url: &str, anon_key: &str, bucket: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            bucket: bucket.to_string(),
            session: RwLock::new(None),
            listeners: Mutex::new(Vec::new()),
        }
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, path)
    }

    /// The signed-in user's token, or the anon key for public reads and once
    /// the session has expired.
    fn bearer(&self) -> String {
        let session = self.session.read().unwrap_or_else(|e| e.into_inner());
        live_token(session.as_ref(), Utc::now())
            .unwrap_or(self.anon_key.as_str())
            .to_string()
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(self.bearer())
    }

    fn replace_session(&self, session: Option<AuthSession>) {
        *self.session.write().unwrap_or_else(|e| e.into_inner()) = session.clone();
        let listeners: Vec<Arc<dyn SessionListener>> = self
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for listener in listeners {
            listener.on_session_changed(session.clone());
        }
    }

    async fn fetch_rows<T>(&self, request: RequestBuilder) -> PortResult<Vec<T>>
    where
        T: for<'de> Deserialize<'de>,
    {
        let response = send(self.authorized(request)).await?;
        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))
    }

    async fn fetch_one<T>(&self, request: RequestBuilder, what: String) -> PortResult<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        self.fetch_rows::<T>(request.query(&[("limit", "1")]))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| PortError::NotFound(what))
    }

    async fn execute(&self, request: RequestBuilder) -> PortResult<()> {
        send(self.authorized(request)).await?;
        Ok(())
    }
}

//=========================================================================================
// "Impure" Row Structs
//=========================================================================================

#[derive(Deserialize)]
struct SubjectRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    image: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}
impl SubjectRow {
    fn to_domain(self) -> Subject {
        Subject {
            id: self.id,
            name: self.name,
            description: self.description.unwrap_or_default(),
            image: self.image.filter(|i| !i.is_empty()),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Deserialize)]
struct DocumentRow {
    id: Uuid,
    subject_id: Uuid,
    name: String,
    description: Option<String>,
    #[serde(rename = "type")]
    doc_type: DocumentType,
    content: Option<String>,
    is_storage_file: Option<bool>,
    file_size: Option<f64>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}
impl DocumentRow {
    fn to_domain(self) -> Document {
        Document {
            id: self.id,
            subject_id: self.subject_id,
            name: self.name,
            description: self.description.unwrap_or_default(),
            doc_type: self.doc_type,
            content: self.content.unwrap_or_default(),
            is_storage_file: self.is_storage_file.unwrap_or(false),
            file_size: self.file_size.map(|s| s.max(0.0) as u64).unwrap_or(0),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Deserialize)]
struct UserRow {
    id: Uuid,
    email: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    expires_at: Option<i64>,
    user: UserRow,
}
impl TokenResponse {
    fn to_domain(self) -> AuthSession {
        let expires_at = match (self.expires_at, self.expires_in) {
            (Some(at), _) => Utc.timestamp_opt(at, 0).single(),
            (None, Some(seconds)) => Some(Utc::now() + Duration::seconds(seconds)),
            (None, None) => None,
        };
        AuthSession {
            user: User {
                id: self.user.id,
                email: self.user.email,
            },
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
        }
    }
}

/// The backends disagree on the field that carries the message.
#[derive(Deserialize, Default)]
struct ErrorBody {
    msg: Option<String>,
    message: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
}
impl ErrorBody {
    fn into_message(self) -> Option<String> {
        self.msg
            .or(self.message)
            .or(self.error_description)
            .or(self.error)
    }
}

//=========================================================================================
// Request Helpers
//=========================================================================================

async fn send(request: RequestBuilder) -> PortResult<Response> {
    let response = request
        .send()
        .await
        .map_err(|e| PortError::Unavailable(e.to_string()))?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body))
}

/// Maps a failed response onto the port error taxonomy.
fn status_error(status: StatusCode, body: &str) -> PortError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(ErrorBody::into_message)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

    match status {
        StatusCode::NOT_FOUND => PortError::NotFound(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PortError::Unauthorized(message),
        s if s.is_server_error() => PortError::Unavailable(message),
        _ => PortError::Unexpected(message),
    }
}

/// PostgREST `or` filter matching name or description, case-insensitively.
///
/// `%` and `_` are escaped so they match literally, as the in-memory store
/// does. The term is then double-quoted so commas and parentheses stay
/// literal. PostgREST turns every `*` into a wildcard and offers no escape
/// for it, so a `*` in the query still matches anything.
fn name_or_description_filter(query: &str) -> String {
    let pattern = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    let escaped = pattern.replace('\\', "\\\\").replace('"', "\\\"");
    format!(
        "(name.ilike.\"*{0}*\",description.ilike.\"*{0}*\")",
        escaped
    )
}

fn live_token(session: Option<&AuthSession>, now: DateTime<Utc>) -> Option<&str> {
    session
        .filter(|s| s.expires_at.map_or(true, |at| at > now))
        .map(|s| s.access_token.as_str())
}

fn eq(id: Uuid) -> String {
    format!("eq.{}", id)
}

//=========================================================================================
// `AuthGateway` Trait Implementation
//=========================================================================================

#[async_trait]
impl AuthGateway for SupabaseAdapter {
    async fn get_session(&self) -> PortResult<Option<AuthSession>> {
        Ok(self.session.read().unwrap_or_else(|e| e.into_inner()).clone())
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> PortResult<AuthSession> {
        let request = self
            .client
            .post(format!("{}/auth/v1/token", self.base_url))
            .query(&[("grant_type", "password")])
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({ "email": email, "password": password }));

        let response = match send(request).await {
            Ok(response) => response,
            // GoTrue answers bad credentials with 400 `invalid_grant`.
            Err(PortError::Unexpected(message)) => return Err(PortError::Unauthorized(message)),
            Err(e) => return Err(e),
        };
        let session = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .to_domain();

        self.replace_session(Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> PortResult<()> {
        let token = self.session
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|s| s.access_token.clone());

        let result = match token {
            Some(token) => send(
                self.client
                    .post(format!("{}/auth/v1/logout", self.base_url))
                    .header("apikey", &self.anon_key)
                    .bearer_auth(token),
            )
            .await
            .map(|_| ()),
            None => Ok(()),
        };
        self.replace_session(None);
        result
    }

    fn on_auth_state_change(&self, listener: Arc<dyn SessionListener>) {
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }
}

//=========================================================================================
// `RecordStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl RecordStore for SupabaseAdapter {
    async fn list_subjects(&self) -> PortResult<Vec<Subject>> {
        let request = self
            .client
            .get(self.rest_url(SUBJECTS))
            .query(&[("select", "*"), ("order", NEWEST_FIRST)]);
        let rows = self.fetch_rows::<SubjectRow>(request).await?;
        Ok(rows.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn get_subject(&self, subject_id: Uuid) -> PortResult<Subject> {
        let request = self
            .client
            .get(self.rest_url(SUBJECTS))
            .query(&[("select", "*".to_string()), ("id", eq(subject_id))]);
        let row = self
            .fetch_one::<SubjectRow>(request, format!("Subject {} not found", subject_id))
            .await?;
        Ok(row.to_domain())
    }

    async fn insert_subject(&self, draft: &SubjectDraft) -> PortResult<Subject> {
        let request = self
            .client
            .post(self.rest_url(SUBJECTS))
            .header("Prefer", "return=representation")
            .json(&[draft]);
        let row = self
            .fetch_one::<SubjectRow>(request, "Inserted subject was not returned".to_string())
            .await?;
        Ok(row.to_domain())
    }

    async fn update_subject(&self, subject_id: Uuid, changes: &SubjectChanges) -> PortResult<()> {
        let request = self
            .client
            .patch(self.rest_url(SUBJECTS))
            .query(&[("id", eq(subject_id))])
            .json(changes);
        self.execute(request).await
    }

    async fn delete_subject(&self, subject_id: Uuid) -> PortResult<()> {
        let request = self
            .client
            .delete(self.rest_url(SUBJECTS))
            .query(&[("id", eq(subject_id))]);
        self.execute(request).await
    }

    async fn list_documents(&self, subject_id: Option<Uuid>) -> PortResult<Vec<Document>> {
        let mut request = self
            .client
            .get(self.rest_url(DOCUMENTS))
            .query(&[("select", "*"), ("order", NEWEST_FIRST)]);
        if let Some(subject_id) = subject_id {
            request = request.query(&[("subject_id", eq(subject_id))]);
        }
        let rows = self.fetch_rows::<DocumentRow>(request).await?;
        Ok(rows.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn get_document(&self, document_id: Uuid) -> PortResult<Document> {
        let request = self
            .client
            .get(self.rest_url(DOCUMENTS))
            .query(&[("select", "*".to_string()), ("id", eq(document_id))]);
        let row = self
            .fetch_one::<DocumentRow>(request, format!("Document {} not found", document_id))
            .await?;
        Ok(row.to_domain())
    }

    async fn insert_document(&self, draft: &DocumentDraft) -> PortResult<Document> {
        let request = self
            .client
            .post(self.rest_url(DOCUMENTS))
            .header("Prefer", "return=representation")
            .json(&[draft]);
        let row = self
            .fetch_one::<DocumentRow>(request, "Inserted document was not returned".to_string())
            .await?;
        Ok(row.to_domain())
    }

    async fn update_document(
        &self,
        document_id: Uuid,
        changes: &DocumentChanges,
    ) -> PortResult<()> {
        let request = self
            .client
            .patch(self.rest_url(DOCUMENTS))
            .query(&[("id", eq(document_id))])
            .json(changes);
        self.execute(request).await
    }

    async fn delete_document(&self, document_id: Uuid) -> PortResult<()> {
        let request = self
            .client
            .delete(self.rest_url(DOCUMENTS))
            .query(&[("id", eq(document_id))]);
        self.execute(request).await
    }

    async fn search_documents(
        &self,
        query: &str,
        subject_id: Option<Uuid>,
    ) -> PortResult<Vec<Document>> {
        let mut request = self
            .client
            .get(self.rest_url(DOCUMENTS))
            .query(&[("select", "*".to_string()), ("or", name_or_description_filter(query))]);
        if let Some(subject_id) = subject_id {
            request = request.query(&[("subject_id", eq(subject_id))]);
        }
        let rows = self.fetch_rows::<DocumentRow>(request).await?;
        Ok(rows.into_iter().map(|r| r.to_domain()).collect())
    }
}

//=========================================================================================
// `BlobStorage` Trait Implementation
//=========================================================================================

#[async_trait]
impl BlobStorage for SupabaseAdapter {
    async fn upload(
        &self,
        path: &str,
        data: Bytes,
        content_type: &str,
        upsert: bool,
    ) -> PortResult<()> {
        let size = data.len();
        let request = self
            .client
            .post(self.object_url(path))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", if upsert { "true" } else { "false" })
            .body(data);
        self.execute(request).await?;
        debug!(path, size, "Uploaded object");
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, path
        )
    }

    async fn remove(&self, paths: &[String]) -> PortResult<()> {
        let request = self
            .client
            .delete(format!("{}/storage/v1/object/{}", self.base_url, self.bucket))
            .json(&serde_json::json!({ "prefixes": paths }));
        let result = self.execute(request).await;
        if let Err(e) = &result {
            warn!(?paths, error = %e, "Object removal failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> SupabaseAdapter {
        SupabaseAdapter::new(Client::new(), "https://demo.supabase.co/", "anon", "documents")
    }

    #[test]
    fn builds_endpoint_urls() {
        let adapter = adapter();
        assert_eq!(adapter.rest_url("subjects"), "https://demo.supabase.co/rest/v1/subjects");
        assert_eq!(
            adapter.object_url("1_a.pdf"),
            "https://demo.supabase.co/storage/v1/object/documents/1_a.pdf"
        );
        assert_eq!(
            adapter.public_url("1_a.pdf"),
            "https://demo.supabase.co/storage/v1/object/public/documents/1_a.pdf"
        );
    }

    #[test]
    fn anon_key_is_used_until_sign_in() {
        let adapter = adapter();
        assert_eq!(adapter.bearer(), "anon");

        adapter.replace_session(Some(AuthSession {
            user: User {
                id: Uuid::new_v4(),
                email: None,
            },
            access_token: "user-token".to_string(),
            refresh_token: None,
            expires_at: None,
        }));
        assert_eq!(adapter.bearer(), "user-token");
    }

    #[test]
    fn expired_session_falls_back_to_anon_key() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let mut session = AuthSession {
            user: User {
                id: Uuid::new_v4(),
                email: None,
            },
            access_token: "user-token".to_string(),
            refresh_token: None,
            expires_at: Some(now + Duration::minutes(5)),
        };
        assert_eq!(live_token(Some(&session), now), Some("user-token"));

        session.expires_at = Some(now - Duration::seconds(1));
        assert_eq!(live_token(Some(&session), now), None);

        session.expires_at = None;
        assert_eq!(live_token(Some(&session), now), Some("user-token"));
        assert_eq!(live_token(None, now), None);
    }

    #[test]
    fn search_filter_quotes_the_term() {
        assert_eq!(
            name_or_description_filter("intro"),
            "(name.ilike.\"*intro*\",description.ilike.\"*intro*\")"
        );
        assert_eq!(
            name_or_description_filter("a_b%"),
            r#"(name.ilike."*a\\_b\\%*",description.ilike."*a\\_b\\%*")"#
        );
        assert_eq!(
            name_or_description_filter(r"a\b"),
            r#"(name.ilike."*a\\\\b*",description.ilike."*a\\\\b*")"#
        );
        assert_eq!(
            name_or_description_filter("a,\"b\""),
            "(name.ilike.\"*a,\\\"b\\\"*\",description.ilike.\"*a,\\\"b\\\"*\")"
        );
    }

    #[test]
    fn maps_error_statuses() {
        let body = r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#;
        assert_eq!(
            status_error(StatusCode::BAD_REQUEST, body),
            PortError::Unexpected("Invalid login credentials".to_string())
        );
        assert_eq!(
            status_error(StatusCode::UNAUTHORIZED, r#"{"msg":"JWT expired"}"#),
            PortError::Unauthorized("JWT expired".to_string())
        );
        assert_eq!(
            status_error(StatusCode::SERVICE_UNAVAILABLE, "upstream down"),
            PortError::Unavailable("HTTP 503".to_string())
        );
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, r#"{"message":"Object not found"}"#),
            PortError::NotFound(_)
        ));
    }

    #[test]
    fn document_rows_fill_defaults() {
        let row: DocumentRow = serde_json::from_value(serde_json::json!({
            "id": "6f1c2a4e-7b1d-4c59-9a34-0d6e2b3f9a10",
            "subject_id": "0b9e3f0c-2a53-4a61-8f6e-1c2d3e4f5a6b",
            "name": "Intro",
            "description": null,
            "type": "pdf",
            "content": "https://demo.supabase.co/storage/v1/object/public/documents/1_intro.pdf",
            "is_storage_file": true,
            "file_size": 2097152,
            "created_at": "2024-01-01T00:00:00+00:00",
            "updated_at": null
        }))
        .unwrap();
        let document = row.to_domain();
        assert_eq!(document.description, "");
        assert_eq!(document.doc_type, DocumentType::Pdf);
        assert!(document.is_storage_file);
        assert_eq!(document.file_size, 2_097_152);
    }

    #[test]
    fn token_response_becomes_session() {
        let token: TokenResponse = serde_json::from_value(serde_json::json!({
            "access_token": "abc",
            "refresh_token": "def",
            "expires_in": 3600,
            "expires_at": 1704070800,
            "user": { "id": "0b9e3f0c-2a53-4a61-8f6e-1c2d3e4f5a6b", "email": "admin@code-mitra.com" }
        }))
        .unwrap();
        let session = token.to_domain();
        assert_eq!(session.access_token, "abc");
        assert_eq!(session.user.email.as_deref(), Some("admin@code-mitra.com"));
        assert_eq!(session.expires_at.map(|t| t.timestamp()), Some(1_704_070_800));
    }
}
