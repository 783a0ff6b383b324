use api_lib::config::Config;
use api_lib::web::{self, state::AppState};
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use doc_library_core::{DataService, GatewayCall, InMemoryGateway, InMemoryPreferences};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

const ADMIN_PASSWORD: &str = "correct horse";

struct TestApp {
    router: Router,
    gateway: Arc<InMemoryGateway>,
    /// Sent as the bearer token by `call` once `login` has run.
    token: Mutex<Option<String>>,
}

impl TestApp {
    fn new() -> Self {
        Self::with_env(&[])
    }

    fn with_env(overrides: &[(&str, &str)]) -> Self {
        let mut vars: HashMap<String, String> = HashMap::new();
        vars.insert("BACKEND".into(), "memory".into());
        for (k, v) in overrides {
            vars.insert(k.to_string(), v.to_string());
        }
        let config = Config::from_lookup(|name| vars.get(name).cloned()).unwrap();

        let gateway = Arc::new(InMemoryGateway::new());
        gateway.add_account(&config.core.admin_email, ADMIN_PASSWORD);
        let core = Arc::new(DataService::new(
            gateway.clone(),
            Arc::new(InMemoryPreferences::new()),
            config.core.clone(),
        ));
        let state = Arc::new(AppState {
            core,
            config: Arc::new(config),
        });

        Self {
            router: web::router(state),
            gateway,
            token: Mutex::new(None),
        }
    }

    async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let token = self.token.lock().unwrap().clone();
        self.call_as(token.as_deref(), method, uri, body).await
    }

    async fn call_as(
        &self,
        token: Option<&str>,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, value)
    }

    async fn login(&self) -> String {
        let (status, body) = self
            .call_as(
                None,
                Method::POST,
                "/auth/login",
                Some(json!({ "email": "admin", "password": ADMIN_PASSWORD })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        let token = body["token"].as_str().unwrap().to_string();
        *self.token.lock().unwrap() = Some(token.clone());
        token
    }

    async fn create_subject(&self, name: &str) -> String {
        let (status, body) = self
            .call(Method::POST, "/subjects", Some(json!({ "name": name })))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["id"].as_str().unwrap().to_string()
    }
}

fn data_url(bytes: &[u8]) -> String {
    format!("data:application/pdf;base64,{}", STANDARD.encode(bytes))
}

#[tokio::test]
async fn writes_require_a_session() {
    let app = TestApp::new();

    let (status, _) = app
        .call(Method::POST, "/subjects", Some(json!({ "name": "Physics" })))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.gateway.count_calls(GatewayCall::is_write), 0);

    // Reads stay open.
    let (status, body) = app.call(Method::GET, "/subjects", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn login_reports_rejection_in_the_body() {
    let app = TestApp::new();

    let (status, body) = app
        .call(
            Method::POST,
            "/auth/login",
            Some(json!({ "email": "admin", "password": "wrong" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["message"], json!("Invalid login credentials"));

    let (_, session) = app.call(Method::GET, "/auth/session", None).await;
    assert_eq!(session["logged_in"], json!(false));
}

#[tokio::test]
async fn login_then_logout() {
    let app = TestApp::new();
    app.login().await;

    let (_, session) = app.call(Method::GET, "/auth/session", None).await;
    assert_eq!(session["logged_in"], json!(true));
    assert_eq!(session["email"], json!("admin@code-mitra.com"));

    let (status, _) = app.call(Method::POST, "/auth/logout", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // The old token is dead.
    let (status, _) = app
        .call(Method::POST, "/subjects", Some(json!({ "name": "Physics" })))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, session) = app.call(Method::GET, "/auth/session", None).await;
    assert_eq!(session["logged_in"], json!(false));
}

#[tokio::test]
async fn writes_need_the_session_token_not_just_a_session() {
    let app = TestApp::new();
    let token = app.login().await;

    let (status, _) = app
        .call_as(None, Method::POST, "/subjects", Some(json!({ "name": "Physics" })))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .call_as(
            Some("not-the-token"),
            Method::POST,
            "/subjects",
            Some(json!({ "name": "Physics" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert_eq!(app.gateway.count_calls(GatewayCall::is_write), 0);

    let (status, _) = app
        .call_as(
            Some(&token),
            Method::POST,
            "/subjects",
            Some(json!({ "name": "Physics" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    // Anonymous callers see no session either.
    let (_, session) = app.call_as(None, Method::GET, "/auth/session", None).await;
    assert_eq!(session["logged_in"], json!(false));
}

#[tokio::test]
async fn logout_requires_the_session_token() {
    let app = TestApp::new();
    app.login().await;

    let (status, _) = app.call_as(None, Method::POST, "/auth/logout", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app
        .call_as(Some("guess"), Method::POST, "/auth/logout", None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // The admin is still signed in.
    let (_, session) = app.call(Method::GET, "/auth/session", None).await;
    assert_eq!(session["logged_in"], json!(true));
    let id = app.create_subject("Physics").await;
    assert!(!id.is_empty());
}

#[tokio::test]
async fn subject_lifecycle() {
    let app = TestApp::new();
    app.login().await;
    let id = app.create_subject("Physics").await;

    let (status, list) = app.call(Method::GET, "/subjects", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list[0]["name"], json!("Physics"));

    let (status, _) = app
        .call(
            Method::PUT,
            &format!("/subjects/{}", id),
            Some(json!({ "name": "Mechanics", "description": "Year one" })),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, subject) = app.call(Method::GET, &format!("/subjects/{}", id), None).await;
    assert_eq!(subject["name"], json!("Mechanics"));
    assert_eq!(subject["description"], json!("Year one"));
    assert!(subject["updated_at"].is_string());

    let (status, _) = app.call(Method::DELETE, &format!("/subjects/{}", id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.call(Method::GET, &format!("/subjects/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn blank_subject_name_is_a_bad_request() {
    let app = TestApp::new();
    app.login().await;

    let (status, _) = app
        .call(Method::POST, "/subjects", Some(json!({ "name": "   " })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn documents_are_tiered_by_size() {
    let app = TestApp::with_env(&[("SMALL_FILE_THRESHOLD", "16"), ("MAX_FILE_SIZE", "64")]);
    app.login().await;
    let subject_id = app.create_subject("Physics").await;

    let (status, small) = app
        .call(
            Method::POST,
            "/documents",
            Some(json!({
                "subject_id": subject_id,
                "name": "notes",
                "type": "text",
                "content": data_url(&[b'a'; 16]),
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", small);
    assert_eq!(small["is_storage_file"], json!(false));
    assert_eq!(small["file_size"], json!(16));

    let (status, large) = app
        .call(
            Method::POST,
            "/documents",
            Some(json!({
                "subject_id": subject_id,
                "name": "slides",
                "type": "pdf",
                "content": data_url(&[b'b'; 17]),
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", large);
    assert_eq!(large["is_storage_file"], json!(true));
    assert!(large["content"].as_str().unwrap().starts_with("memory://documents/"));
    assert_eq!(app.gateway.blob_paths().len(), 1);

    let (_, listed) = app
        .call(Method::GET, &format!("/subjects/{}/documents", subject_id), None)
        .await;
    assert_eq!(listed.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn oversized_document_is_rejected() {
    let app = TestApp::with_env(&[("SMALL_FILE_THRESHOLD", "16"), ("MAX_FILE_SIZE", "64")]);
    app.login().await;
    let subject_id = app.create_subject("Physics").await;

    let (status, message) = app
        .call(
            Method::POST,
            "/documents",
            Some(json!({
                "subject_id": subject_id,
                "name": "huge",
                "type": "pdf",
                "content": data_url(&[0u8; 65]),
            })),
        )
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(message.as_str().unwrap().contains("limit"));
    assert_eq!(app.gateway.document_count(), 0);
}

#[tokio::test]
async fn unknown_document_type_is_rejected() {
    let app = TestApp::new();
    app.login().await;
    let subject_id = app.create_subject("Physics").await;

    let (status, _) = app
        .call(
            Method::POST,
            "/documents",
            Some(json!({
                "subject_id": subject_id,
                "name": "sheet",
                "type": "spreadsheet",
                "content": data_url(b"x"),
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_document_is_not_found() {
    let app = TestApp::new();
    app.login().await;
    let id = uuid::Uuid::new_v4();

    let (status, _) = app.call(Method::GET, &format!("/documents/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.call(Method::DELETE, &format!("/documents/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn search_filters_by_query_and_subject() {
    let app = TestApp::new();
    app.login().await;
    let physics = app.create_subject("Physics").await;
    let maths = app.create_subject("Maths").await;

    for (subject, name) in [(&physics, "Optics Notes"), (&maths, "Linear notes"), (&maths, "Proofs")] {
        let (status, _) = app
            .call(
                Method::POST,
                "/documents",
                Some(json!({
                    "subject_id": subject,
                    "name": name,
                    "type": "text",
                    "content": data_url(b"hello"),
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, all) = app.call(Method::GET, "/search?q=NOTES", None).await;
    assert_eq!(all.as_array().unwrap().len(), 2);

    let (_, scoped) = app
        .call(Method::GET, &format!("/search?q=notes&subject_id={}", maths), None)
        .await;
    let scoped = scoped.as_array().unwrap();
    assert_eq!(scoped.len(), 1);
    assert_eq!(scoped[0]["name"], json!("Linear notes"));
}

#[tokio::test]
async fn theme_defaults_to_dark_and_persists() {
    let app = TestApp::new();

    let (_, body) = app.call(Method::GET, "/theme", None).await;
    assert_eq!(body, json!({ "theme": "dark" }));

    let (status, _) = app
        .call(Method::PUT, "/theme", Some(json!({ "theme": "light" })))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = app.call(Method::GET, "/theme", None).await;
    assert_eq!(body, json!({ "theme": "light" }));

    let (status, _) = app
        .call(Method::PUT, "/theme", Some(json!({ "theme": "sepia" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn backend_outage_is_a_bad_gateway() {
    let app = TestApp::new();
    app.gateway
        .fail_when(|call| matches!(call, GatewayCall::ListSubjects));

    let (status, _) = app.call(Method::GET, "/subjects", None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}
