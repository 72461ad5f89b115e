//! REST API for accounts, conversations, and profiles.
//!
//! Endpoints (relative to the configured prefix, default `/api`):
//!
//! - `POST   /auth/register`  Create an account
//! - `POST   /auth/login`  Exchange credentials for a token
//! - `GET    /auth/me`  The authenticated account
//! - `GET    /chat/conversations`  List conversations
//! - `POST   /chat/conversations`  Create a conversation
//! - `GET    /chat/conversations/{id}`  Conversation with transcript
//! - `DELETE /chat/conversations/{id}`  Delete a conversation
//! - `POST   /chat/conversations/{id}/messages` Send a message
//! - `POST   /chat/message`  Send, creating a conversation if needed
//! - `GET    /chat/profile`  The caller's profile
//! - `PATCH  /chat/profile`  Update profile fields

use axum::{
    Extension, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::Json,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use emberchat_auth::{AccessToken, Credentials};
use emberchat_chat::TurnOutcome;
use emberchat_core::message::{Conversation, ConversationDetail, ConversationId};
use emberchat_core::{ProfileUpdate, User, UserProfile};

use crate::error::ApiError;
use crate::{AuthUser, SharedState, auth_middleware};

type ApiResult<T> = Result<T, ApiError>;

// ── Request / Response Types ──────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateConversationRequest {
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Deserialize)]
pub struct QuickSendQuery {
    #[serde(default)]
    pub conversation_id: Option<i64>,
}

#[derive(Serialize, Deserialize)]
pub struct ConversationListResponse {
    pub conversations: Vec<Conversation>,
}

// ── Router ────────────────────────────────────────────────────────────────

/// Routes under the API prefix. Everything except register and login
/// requires a bearer token.
pub fn api_router(state: SharedState) -> Router {
    let protected = Router::new()
        .route("/auth/me", get(me_handler))
        .route(
            "/chat/conversations",
            get(list_conversations_handler).post(create_conversation_handler),
        )
        .route(
            "/chat/conversations/{id}",
            get(get_conversation_handler).delete(delete_conversation_handler),
        )
        .route(
            "/chat/conversations/{id}/messages",
            post(send_message_handler),
        )
        .route("/chat/message", post(quick_send_handler))
        .route(
            "/chat/profile",
            get(get_profile_handler).patch(update_profile_handler),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler))
        .merge(protected)
        .with_state(state)
}

// ── Auth Handlers ─────────────────────────────────────────────────────────

async fn register_handler(
    State(state): State<SharedState>,
    Json(payload): Json<Credentials>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let user = state.auth.register(&payload).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn login_handler(
    State(state): State<SharedState>,
    Json(payload): Json<Credentials>,
) -> ApiResult<Json<AccessToken>> {
    Ok(Json(state.auth.login(&payload).await?))
}

async fn me_handler(
    State(state): State<SharedState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> ApiResult<Json<User>> {
    Ok(Json(state.auth.current_user(user_id).await?))
}

// ── Chat Handlers ─────────────────────────────────────────────────────────

async fn list_conversations_handler(
    State(state): State<SharedState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> ApiResult<Json<ConversationListResponse>> {
    let conversations = state.chat.list_conversations(user_id).await?;
    Ok(Json(ConversationListResponse { conversations }))
}

async fn create_conversation_handler(
    State(state): State<SharedState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    payload: Option<Json<CreateConversationRequest>>,
) -> ApiResult<(StatusCode, Json<Conversation>)> {
    let title = payload.as_ref().and_then(|Json(p)| p.title.as_deref());
    let conversation = state.chat.create_conversation(user_id, title).await?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

async fn get_conversation_handler(
    State(state): State<SharedState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ConversationDetail>> {
    Ok(Json(
        state
            .chat
            .get_conversation(user_id, ConversationId(id))
            .await?,
    ))
}

async fn delete_conversation_handler(
    State(state): State<SharedState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    state
        .chat
        .delete_conversation(user_id, ConversationId(id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn send_message_handler(
    State(state): State<SharedState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(payload): Json<SendMessageRequest>,
) -> ApiResult<Json<TurnOutcome>> {
    info!(conversation_id = id, "Chat message received");
    let outcome = state
        .chat
        .send_message(user_id, Some(ConversationId(id)), &payload.content)
        .await?;
    Ok(Json(outcome))
}

async fn quick_send_handler(
    State(state): State<SharedState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(query): Query<QuickSendQuery>,
    Json(payload): Json<SendMessageRequest>,
) -> ApiResult<Json<TurnOutcome>> {
    let outcome = state
        .chat
        .send_message(
            user_id,
            query.conversation_id.map(ConversationId),
            &payload.content,
        )
        .await?;
    Ok(Json(outcome))
}

async fn get_profile_handler(
    State(state): State<SharedState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> ApiResult<Json<UserProfile>> {
    Ok(Json(state.chat.get_profile(user_id).await?))
}

async fn update_profile_handler(
    State(state): State<SharedState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(update): Json<ProfileUpdate>,
) -> ApiResult<Json<UserProfile>> {
    Ok(Json(state.chat.update_profile(user_id, update).await?))
}

// ── Tests ─────────────────────────────────────────────────────────────────
