//! HTTP API gateway for Emberchat.
//!
//! Exposes the account, conversation and profile endpoints plus a public
//! health check. Built on Axum.

pub mod api;
pub mod error;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::{
    Router,
    extract::State,
    middleware::Next,
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use emberchat_auth::AuthService;
use emberchat_chat::{ChatService, ModelGateway, ReplyGateway};
use emberchat_config::{AppConfig, GatewayConfig};
use emberchat_core::store::{ConversationStore, ProfileStore, UserStore};
use emberchat_core::{IdentityProvider, UserId};
use emberchat_store::SqliteStore;

use crate::error::ApiError;

/// Shared application state for the gateway.
pub struct AppState {
    pub config: AppConfig,
    pub auth: Arc<AuthService>,
    pub identity: Arc<dyn IdentityProvider>,
    pub chat: Arc<ChatService>,
    /// "live" or "demo", reported by `/health`
    pub model_mode: &'static str,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Wire services over one store that holds users, profiles and
    /// conversations.
    pub fn new<S>(
        config: AppConfig,
        store: Arc<S>,
        gateway: Arc<dyn ReplyGateway>,
        model_mode: &'static str,
    ) -> Self
    where
        S: UserStore + ProfileStore + ConversationStore + 'static,
    {
        let users: Arc<dyn UserStore> = store.clone();
        let profiles: Arc<dyn ProfileStore> = store.clone();
        let conversations: Arc<dyn ConversationStore> = store;

        let auth = Arc::new(AuthService::from_config(
            &config.auth,
            users,
            profiles.clone(),
        ));
        let chat = Arc::new(ChatService::new(
            &config.chat,
            conversations,
            profiles,
            gateway,
        ));

        Self {
            identity: auth.clone(),
            auth,
            chat,
            model_mode,
            config,
        }
    }
}

/// The authenticated caller, inserted by [`auth_middleware`].
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub UserId);

/// Build the full router.
///
/// Layers applied:
/// - Bearer token authentication on all chat routes and `/auth/me`
/// - CORS limited to the configured origins
/// - Request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(state: SharedState) -> Router {
    let gateway = &state.config.gateway;
    let prefix = gateway.api_prefix.trim_end_matches('/').to_string();
    let cors = cors_layer(gateway);

    let health = Router::new()
        .route("/health", get(health_handler))
        .with_state(state.clone());
    let api = api::api_router(state);

    // Health answers at the root and under the prefix.
    let app = if prefix.is_empty() {
        health.merge(api)
    } else {
        health.clone().nest(&prefix, api.merge(health))
    };

    app.layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn cors_layer(config: &GatewayConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600))
}

/// Start the gateway HTTP server on a SQLite store.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let store = Arc::new(SqliteStore::new(&config.database.url).await?);
    let gateway = ModelGateway::from_config(&config)?;
    let mode = gateway.mode();
    let state = Arc::new(AppState::new(config, store, Arc::new(gateway), mode));

    let app = build_router(state);

    info!(addr = %addr, model_mode = mode, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    model_mode: &'static str,
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        model_mode: state.model_mode,
    })
}

/// Authentication middleware for the API.
///
/// Requires `Authorization: Bearer <token>`; the token is resolved through
/// the identity provider and the user id stored as an [`AuthUser`]
/// extension.
pub async fn auth_middleware(
    State(state): State<SharedState>,
    mut req: axum::extract::Request,
    next: Next,
) -> Response {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    let Some(token) = token else {
        return ApiError::unauthenticated("Not authenticated").into_response();
    };

    match state.identity.resolve(token).await {
        Ok(user_id) => {
            req.extensions_mut().insert(AuthUser(user_id));
            next.run(req).await
        }
        Err(e) => {
            warn!(path = %req.uri().path(), error = %e, "Rejected bearer token");
            ApiError(e).into_response()
        }
    }
}
