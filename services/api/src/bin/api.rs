//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{FilePreferenceStore, SupabaseAdapter},
    config::{BackendKind, Config},
    error::ApiError,
    web::{self, rest::ApiDoc, state::AppState},
};
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use axum::Router;
use doc_library_core::{BackendGateway, DataService, InMemoryGateway};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Initialize the Backend Gateway ---
    let gateway: Arc<dyn BackendGateway> = match &config.backend {
        BackendKind::Supabase { url, anon_key } => {
            info!(%url, bucket = %config.storage_bucket, "Using Supabase backend");
            let client = reqwest::Client::builder().build()?;
            Arc::new(SupabaseAdapter::new(
                client,
                url,
                anon_key,
                &config.storage_bucket,
            ))
        }
        BackendKind::Memory => {
            warn!("Using the in-memory backend; nothing will survive a restart");
            let memory = InMemoryGateway::new();
            match &config.admin_password {
                Some(password) => {
                    memory.add_account(&config.core.admin_email, password);
                }
                None => warn!("ADMIN_PASSWORD is not set; logins will be rejected"),
            }
            Arc::new(memory)
        }
    };
    let preferences = Arc::new(FilePreferenceStore::new(config.preferences_path.clone()));

    // --- 3. Build the Data Service & Shared AppState ---
    let core = Arc::new(DataService::new(gateway, preferences, config.core.clone()));
    core.init().await;

    let app_state = Arc::new(AppState {
        core,
        config: config.clone(),
    });

    // --- 4. Create the Web Router ---
    let origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid CORS_ORIGIN '{}': {}", config.cors_origin, e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    let api_router = web::router(app_state).layer(cors);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
