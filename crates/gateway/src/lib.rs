//! HTTP gateway for CRAB AI.
//!
//! Exposes the chat app over HTTP: account routes, the session-gated chat
//! view, `/run`, translation, deletes and a health check.
//!
//! Built on Axum for high performance async HTTP.

pub mod auth;
pub mod chat;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    http::StatusCode,
    response::{IntoResponse, Json, Redirect, Response},
    routing::{get, post},
};
use serde::Serialize;
use std::any::Any;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crabai_agent::RequestCoordinator;
use crabai_config::AppConfig;
use crabai_core::provider::AnswerSource;
use crabai_security::{Accounts, SessionStore};
use crabai_store::{ConversationStore, SqliteStore};

pub use auth::{AuthRejection, CurrentUser};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub coordinator: RequestCoordinator,
    pub accounts: Accounts,
    /// Backs `/translate`; `None` when it could not be built
    pub translator: Option<Arc<dyn AnswerSource>>,
}

pub type SharedState = Arc<GatewayState>;

impl GatewayState {
    /// Open the database and build every subsystem from `config`.
    pub async fn from_config(config: &AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let db_path = config.database_path();
        let rows = Arc::new(SqliteStore::open(&db_path, config.database.max_connections).await?);

        let conversations = ConversationStore::new(rows.clone())
            .with_context_turns(config.chat.context_turns)
            .with_title_max_chars(config.chat.title_max_chars);
        let chain = crabai_providers::build_from_config(config);
        let coordinator = RequestCoordinator::from_config(&config.chat, chain, conversations);

        let accounts = Accounts::new(
            rows,
            SessionStore::with_ttl_minutes(config.gateway.session_ttl_minutes),
        );

        let translator = match crabai_providers::build_translator(config) {
            Ok(t) => Some(Arc::new(t) as Arc<dyn AnswerSource>),
            Err(e) => {
                warn!(error = %e, "Translation unavailable");
                None
            }
        };

        Ok(Self {
            coordinator,
            accounts,
            translator,
        })
    }
}

/// JSON error body. `auth_error` is only present on session failures.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_error: Option<bool>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            auth_error: None,
        }
    }

    pub fn auth(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            auth_error: Some(true),
        }
    }
}

pub(crate) type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse::new(message)))
}

/// Build the Axum router with all gateway routes.
///
/// Layers applied:
/// - Same-origin CORS policy
/// - Request body size limit (1 MB)
/// - Panics in handlers become a JSON 500
/// - HTTP trace logging
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .route("/", get(|| async { Redirect::to("/app") }))
        .route("/signup", get(auth::signup_page).post(auth::signup_handler))
        .route("/login", get(auth::login_page).post(auth::login_handler))
        .route("/logout", get(auth::logout_handler))
        .route("/app", get(chat::app_handler))
        .route("/app/{chat_id}", get(chat::app_chat_handler))
        .route("/new_chat", get(chat::new_chat_handler))
        .route("/run", get(chat::run_handler))
        .route("/translate", post(chat::translate_handler))
        .route("/delete_history/{id}", post(chat::delete_history_handler))
        .route("/delete_chat/{id}", post(chat::delete_chat_handler))
        .route("/delete_all_history", post(chat::delete_all_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let state = Arc::new(GatewayState::from_config(&config).await?);
    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".into());
    error!(panic = %detail, "Handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("Internal error")),
    )
        .into_response()
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
