//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::auth::{LoginRequest, LoginResponse, SessionStatus};
use crate::web::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use doc_library_core::{
    CoreError, Document, DocumentInput, DocumentType, DocumentUpdateInput, PortError, Subject,
    SubjectInput, Theme,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{IntoParams, Modify, OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::web::auth::login_handler,
        crate::web::auth::logout_handler,
        crate::web::auth::session_handler,
        list_subjects_handler,
        get_subject_handler,
        create_subject_handler,
        update_subject_handler,
        delete_subject_handler,
        list_subject_documents_handler,
        list_documents_handler,
        get_document_handler,
        create_document_handler,
        update_document_handler,
        delete_document_handler,
        search_handler,
        get_theme_handler,
        set_theme_handler,
    ),
    components(
        schemas(
            LoginRequest, LoginResponse, SessionStatus,
            SubjectResponse, SubjectRequest,
            DocumentResponse, DocumentRequest, DocumentUpdateRequest,
            ThemeBody,
        )
    ),
    tags(
        (name = "Document Library API", description = "Subjects, documents and their stored files.")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// The generated API description. `server_url`, when given, is listed as the
/// only server so that clients built from the document target it.
pub fn api_doc(server_url: Option<&str>) -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    if let Some(url) = server_url {
        doc.servers = Some(vec![utoipa::openapi::Server::new(url)]);
    }
    doc
}

/// Registers the session token scheme used by the write routes.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some("The token returned by /auth/login"))
                        .build(),
                ),
            );
        }
    }
}

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct SubjectResponse {
    id: Uuid,
    name: String,
    description: String,
    /// A URL or an inline `data:` image.
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

impl From<Subject> for SubjectResponse {
    fn from(s: Subject) -> Self {
        Self {
            id: s.id,
            name: s.name,
            description: s.description,
            image: s.image,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct SubjectRequest {
    name: String,
    #[serde(default)]
    description: Option<String>,
    /// A URL, or a `data:` image which is recompressed before storing.
    #[serde(default)]
    image: Option<String>,
}

impl From<SubjectRequest> for SubjectInput {
    fn from(r: SubjectRequest) -> Self {
        Self {
            name: r.name,
            description: r.description,
            image: r.image,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct DocumentResponse {
    id: Uuid,
    subject_id: Uuid,
    name: String,
    description: String,
    /// One of `pdf`, `word`, `text`.
    #[serde(rename = "type")]
    doc_type: String,
    /// The inline payload, or the public URL when `is_storage_file` is set.
    content: String,
    is_storage_file: bool,
    file_size: u64,
    created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

impl From<Document> for DocumentResponse {
    fn from(d: Document) -> Self {
        Self {
            id: d.id,
            subject_id: d.subject_id,
            name: d.name,
            description: d.description,
            doc_type: d.doc_type.to_string(),
            content: d.content,
            is_storage_file: d.is_storage_file,
            file_size: d.file_size,
            created_at: d.created_at,
            updated_at: d.updated_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct DocumentRequest {
    subject_id: Uuid,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "type")]
    doc_type: String,
    /// The file as a base64 `data:` payload.
    content: String,
}

impl DocumentRequest {
    fn into_input(self) -> Result<DocumentInput, (StatusCode, String)> {
        Ok(DocumentInput {
            subject_id: self.subject_id,
            name: self.name,
            description: self.description,
            doc_type: parse_doc_type(&self.doc_type)?,
            content: self.content,
        })
    }
}

#[derive(Deserialize, ToSchema)]
pub struct DocumentUpdateRequest {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "type")]
    doc_type: String,
    /// A new `data:` payload replaces the file; anything else leaves it as is.
    #[serde(default)]
    content: Option<String>,
}

impl DocumentUpdateRequest {
    fn into_input(self) -> Result<DocumentUpdateInput, (StatusCode, String)> {
        Ok(DocumentUpdateInput {
            name: self.name,
            description: self.description,
            doc_type: parse_doc_type(&self.doc_type)?,
            content: self.content,
        })
    }
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchParams {
    /// Matched case-insensitively against name and description.
    q: String,
    /// Restrict matches to one subject.
    subject_id: Option<Uuid>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ThemeBody {
    /// `dark` or `light`.
    theme: String,
}

//=========================================================================================
// Error Mapping
//=========================================================================================

fn status_for(e: &CoreError) -> StatusCode {
    match e {
        CoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        CoreError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        CoreError::ImageDecode(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CoreError::InvalidPayload(_) | CoreError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        CoreError::BackendUnavailable(PortError::Unauthorized(_)) => StatusCode::UNAUTHORIZED,
        CoreError::BackendUnavailable(_) => StatusCode::BAD_GATEWAY,
    }
}

/// Logs a failed core call and turns it into the handler's error response.
fn failure(action: &str, e: CoreError) -> (StatusCode, String) {
    let status = status_for(&e);
    if status.is_server_error() {
        error!("Failed to {}: {:?}", action, e);
    } else {
        warn!("Could not {}: {}", action, e);
    }
    (status, e.to_string())
}

fn parse_doc_type(raw: &str) -> Result<DocumentType, (StatusCode, String)> {
    raw.parse::<DocumentType>()
        .map_err(|e| (StatusCode::BAD_REQUEST, e))
}

//=========================================================================================
// Subject Handlers
//=========================================================================================

/// List all subjects, newest first.
#[utoipa::path(
    get,
    path = "/subjects",
    responses(
        (status = 200, description = "All subjects", body = [SubjectResponse]),
        (status = 502, description = "Backend unavailable")
    )
)]
pub async fn list_subjects_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let subjects = app_state
        .core
        .get_all_subjects()
        .await
        .map_err(|e| failure("list subjects", e))?;
    let response: Vec<SubjectResponse> = subjects.into_iter().map(Into::into).collect();
    Ok(Json(response))
}

/// Fetch one subject.
#[utoipa::path(
    get,
    path = "/subjects/{id}",
    responses(
        (status = 200, description = "The subject", body = SubjectResponse),
        (status = 404, description = "No such subject")
    ),
    params(
        ("id" = Uuid, Path, description = "The subject's ID.")
    )
)]
pub async fn get_subject_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let subject = app_state
        .core
        .get_subject_by_id(id)
        .await
        .map_err(|e| failure("fetch subject", e))?;
    Ok(Json(SubjectResponse::from(subject)))
}

/// Create a subject.
#[utoipa::path(
    post,
    path = "/subjects",
    request_body = SubjectRequest,
    responses(
        (status = 201, description = "Subject created", body = SubjectResponse),
        (status = 400, description = "Missing name"),
        (status = 401, description = "Missing or invalid session token"),
        (status = 422, description = "Image could not be decoded")
    ),
    security(
        ("bearer" = [])
    )
)]
pub async fn create_subject_handler(
    State(app_state): State<Arc<AppState>>,
    Json(req): Json<SubjectRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let subject = app_state
        .core
        .add_subject(req.into())
        .await
        .map_err(|e| failure("create subject", e))?;
    Ok((StatusCode::CREATED, Json(SubjectResponse::from(subject))))
}

/// Replace a subject's name, description and image.
#[utoipa::path(
    put,
    path = "/subjects/{id}",
    request_body = SubjectRequest,
    responses(
        (status = 204, description = "Subject updated"),
        (status = 400, description = "Missing name"),
        (status = 401, description = "Missing or invalid session token"),
        (status = 422, description = "Image could not be decoded")
    ),
    params(
        ("id" = Uuid, Path, description = "The subject's ID.")
    ),
    security(
        ("bearer" = [])
    )
)]
pub async fn update_subject_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<SubjectRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    app_state
        .core
        .update_subject(id, req.into())
        .await
        .map_err(|e| failure("update subject", e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Delete a subject together with its documents and their stored files.
#[utoipa::path(
    delete,
    path = "/subjects/{id}",
    responses(
        (status = 204, description = "Subject deleted"),
        (status = 401, description = "Missing or invalid session token"),
        (status = 502, description = "Backend failed; the subject was kept")
    ),
    params(
        ("id" = Uuid, Path, description = "The subject's ID.")
    ),
    security(
        ("bearer" = [])
    )
)]
pub async fn delete_subject_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    app_state
        .core
        .delete_subject(id)
        .await
        .map_err(|e| failure("delete subject", e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// List the documents of one subject.
#[utoipa::path(
    get,
    path = "/subjects/{id}/documents",
    responses(
        (status = 200, description = "The subject's documents", body = [DocumentResponse])
    ),
    params(
        ("id" = Uuid, Path, description = "The subject's ID.")
    )
)]
pub async fn list_subject_documents_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let documents = app_state
        .core
        .get_documents_by_subject(id)
        .await
        .map_err(|e| failure("list subject documents", e))?;
    let response: Vec<DocumentResponse> = documents.into_iter().map(Into::into).collect();
    Ok(Json(response))
}

//=========================================================================================
// Document Handlers
//=========================================================================================

/// List all documents, newest first.
#[utoipa::path(
    get,
    path = "/documents",
    responses(
        (status = 200, description = "All documents", body = [DocumentResponse]),
        (status = 502, description = "Backend unavailable")
    )
)]
pub async fn list_documents_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let documents = app_state
        .core
        .get_all_documents()
        .await
        .map_err(|e| failure("list documents", e))?;
    let response: Vec<DocumentResponse> = documents.into_iter().map(Into::into).collect();
    Ok(Json(response))
}

/// Fetch one document.
#[utoipa::path(
    get,
    path = "/documents/{id}",
    responses(
        (status = 200, description = "The document", body = DocumentResponse),
        (status = 404, description = "No such document")
    ),
    params(
        ("id" = Uuid, Path, description = "The document's ID.")
    )
)]
pub async fn get_document_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let document = app_state
        .core
        .get_document_by_id(id)
        .await
        .map_err(|e| failure("fetch document", e))?;
    Ok(Json(DocumentResponse::from(document)))
}

/// Upload a document. Small files are stored inline, larger ones in the bucket.
#[utoipa::path(
    post,
    path = "/documents",
    request_body = DocumentRequest,
    responses(
        (status = 201, description = "Document stored", body = DocumentResponse),
        (status = 400, description = "Bad payload or document type"),
        (status = 401, description = "Missing or invalid session token"),
        (status = 413, description = "File exceeds the size limit")
    ),
    security(
        ("bearer" = [])
    )
)]
pub async fn create_document_handler(
    State(app_state): State<Arc<AppState>>,
    Json(req): Json<DocumentRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let input = req.into_input()?;
    let document = app_state
        .core
        .upload_document(input)
        .await
        .map_err(|e| failure("upload document", e))?;
    Ok((StatusCode::CREATED, Json(DocumentResponse::from(document))))
}

/// Update a document's metadata and optionally replace its file.
#[utoipa::path(
    put,
    path = "/documents/{id}",
    request_body = DocumentUpdateRequest,
    responses(
        (status = 204, description = "Document updated"),
        (status = 400, description = "Bad payload or document type"),
        (status = 401, description = "Missing or invalid session token"),
        (status = 413, description = "File exceeds the size limit")
    ),
    params(
        ("id" = Uuid, Path, description = "The document's ID.")
    ),
    security(
        ("bearer" = [])
    )
)]
pub async fn update_document_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<DocumentUpdateRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let input = req.into_input()?;
    app_state
        .core
        .update_document(id, input)
        .await
        .map_err(|e| failure("update document", e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Delete a document and its stored file.
#[utoipa::path(
    delete,
    path = "/documents/{id}",
    responses(
        (status = 204, description = "Document deleted"),
        (status = 401, description = "Missing or invalid session token"),
        (status = 404, description = "No such document")
    ),
    params(
        ("id" = Uuid, Path, description = "The document's ID.")
    ),
    security(
        ("bearer" = [])
    )
)]
pub async fn delete_document_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    app_state
        .core
        .delete_document(id)
        .await
        .map_err(|e| failure("delete document", e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Search documents by name or description.
#[utoipa::path(
    get,
    path = "/search",
    params(SearchParams),
    responses(
        (status = 200, description = "Matching documents", body = [DocumentResponse])
    )
)]
pub async fn search_handler(
    State(app_state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let documents = app_state
        .core
        .search_documents(&params.q, params.subject_id)
        .await
        .map_err(|e| failure("search documents", e))?;
    let response: Vec<DocumentResponse> = documents.into_iter().map(Into::into).collect();
    Ok(Json(response))
}

//=========================================================================================
// Preference Handlers
//=========================================================================================

/// Read the UI theme. Defaults to `dark`.
#[utoipa::path(
    get,
    path = "/theme",
    responses(
        (status = 200, description = "The current theme", body = ThemeBody)
    )
)]
pub async fn get_theme_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let theme = app_state
        .core
        .get_theme()
        .await
        .map_err(|e| failure("read theme", e))?;
    Ok(Json(ThemeBody {
        theme: theme.as_str().to_string(),
    }))
}

/// Persist the UI theme.
#[utoipa::path(
    put,
    path = "/theme",
    request_body = ThemeBody,
    responses(
        (status = 204, description = "Theme saved"),
        (status = 400, description = "Unknown theme")
    )
)]
pub async fn set_theme_handler(
    State(app_state): State<Arc<AppState>>,
    Json(body): Json<ThemeBody>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let theme = body
        .theme
        .parse::<Theme>()
        .map_err(|e| (StatusCode::BAD_REQUEST, e))?;
    app_state
        .core
        .set_theme(theme)
        .await
        .map_err(|e| failure("save theme", e))?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_statuses() {
        let not_found = CoreError::NotFound {
            resource: "Document",
            id: "x".to_string(),
        };
        assert_eq!(status_for(&not_found), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&CoreError::FileTooLarge { size: 11, limit: 10 }),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            status_for(&CoreError::ImageDecode("bad".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&CoreError::InvalidPayload("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&CoreError::BackendUnavailable(PortError::Unavailable("down".into()))),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&CoreError::BackendUnavailable(PortError::Unauthorized("jwt".into()))),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn unknown_document_type_is_a_bad_request() {
        let (status, message) = parse_doc_type("spreadsheet").unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(message.contains("spreadsheet"));
    }

    #[test]
    fn openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/auth/login",
            "/subjects",
            "/subjects/{id}",
            "/subjects/{id}/documents",
            "/documents",
            "/documents/{id}",
            "/search",
            "/theme",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }
        let components = doc.components.expect("components are generated");
        assert!(components.security_schemes.contains_key("bearer"));
    }

    #[test]
    fn api_doc_lists_the_given_server() {
        assert!(api_doc(None).servers.is_none());

        let doc = api_doc(Some("https://library.example.com"));
        let servers = doc.servers.as_ref().expect("server is set");
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].url, "https://library.example.com");

        let json = doc.to_pretty_json().unwrap();
        assert!(json.contains("\"bearer\""));
    }
}
