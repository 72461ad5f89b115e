//! End-to-end tests for the Emberchat backend.
//!
//! These drive the HTTP router the server runs, wired to real stores and
//! model gateways, from registration through multi-turn conversations.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use emberchat_chat::{DemoGateway, LiveGateway, ModelGateway, ReplyGateway};
use emberchat_config::AppConfig;
use emberchat_core::error::ProviderError;
use emberchat_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use emberchat_core::Role;
use emberchat_gateway::{AppState, build_router};
use emberchat_store::{InMemoryStore, SqliteStore};

// ── Mock Provider ────────────────────────────────────────────────────────

/// Replies from a script in order and records every request.
struct ScriptedProvider {
    replies: Mutex<Vec<Result<String, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(replies: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(replies),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        let mut replies = self.replies.lock().unwrap();
        let next = if replies.is_empty() {
            Ok("(script exhausted)".to_string())
        } else {
            replies.remove(0)
        };
        next.map(|content| ProviderResponse {
            content,
            usage: Some(Usage {
                prompt_tokens: 20,
                completion_tokens: 8,
                total_tokens: 28,
            }),
            model: request.model,
        })
    }
}

// ── Harness ──────────────────────────────────────────────────────────────

async fn sqlite_app(gateway: Arc<dyn ReplyGateway>, mode: &'static str) -> Router {
    let store = Arc::new(SqliteStore::new("sqlite::memory:").await.unwrap());
    build_router(Arc::new(AppState::new(
        AppConfig::default(),
        store,
        gateway,
        mode,
    )))
}

fn memory_app(gateway: Arc<dyn ReplyGateway>, mode: &'static str) -> Router {
    build_router(Arc::new(AppState::new(
        AppConfig::default(),
        Arc::new(InMemoryStore::new()),
        gateway,
        mode,
    )))
}

fn live(provider: Arc<ScriptedProvider>) -> Arc<dyn ReplyGateway> {
    Arc::new(LiveGateway::new(
        provider,
        "claude-sonnet-4-20250514",
        Duration::from_secs(5),
    ))
}

async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        req = req.header("authorization", format!("Bearer {token}"));
    }
    let req = match body {
        Some(json) => req
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn signup(app: &Router, email: &str) -> String {
    let creds = json!({"email": email, "password": "correct-horse"});
    let (status, _) = call(app, "POST", "/api/auth/register", None, Some(creds.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = call(app, "POST", "/api/auth/login", None, Some(creds)).await;
    assert_eq!(status, StatusCode::OK);
    body["access_token"].as_str().unwrap().to_string()
}

// ── Scenarios ────────────────────────────────────────────────────────────

#[tokio::test]
async fn live_conversation_carries_profile_and_history() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Ok("A 5 lb ABC unit covers most offices.".into()),
        Ok("Inspect monthly, service annually.".into()),
    ]));
    let app = sqlite_app(live(provider.clone()), "live").await;
    let token = signup(&app, "dana@harbor.example").await;

    let (status, _) = call(
        &app,
        "PATCH",
        "/api/chat/profile",
        Some(&token),
        Some(json!({"company_name": "Harbor Logistics"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, first) = call(
        &app,
        "POST",
        "/api/chat/message",
        Some(&token),
        Some(json!({"content": "Which extinguisher for a small office?"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["created_conversation"], true);
    assert_eq!(first["assistant_message"]["source"], "model");
    let conversation_id = first["conversation_id"].as_i64().unwrap();

    let (status, second) = call(
        &app,
        "POST",
        &format!("/api/chat/conversations/{conversation_id}/messages"),
        Some(&token),
        Some(json!({"content": "How often should it be inspected?"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        second["assistant_message"]["content"],
        "Inspect monthly, service annually."
    );

    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    let turns = &requests[1].turns;
    assert_eq!(turns[0].role, Role::System);
    assert!(turns
        .iter()
        .any(|t| t.role == Role::System && t.content.contains("Harbor Logistics")));
    let dialogue: Vec<(Role, &str)> = turns
        .iter()
        .filter(|t| t.role != Role::System)
        .map(|t| (t.role, t.content.as_str()))
        .collect();
    assert_eq!(
        dialogue,
        vec![
            (Role::User, "Which extinguisher for a small office?"),
            (Role::Assistant, "A 5 lb ABC unit covers most offices."),
            (Role::User, "How often should it be inspected?"),
        ]
    );

    let (status, detail) = call(
        &app,
        "GET",
        &format!("/api/chat/conversations/{conversation_id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["title"], "Which extinguisher for a small office?");
    assert_eq!(detail["messages"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn provider_outage_is_persisted_as_fallback_and_recovers() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Err(ProviderError::RateLimited {
            retry_after_secs: 30,
        }),
        Ok("Back online. How can I help?".into()),
    ]));
    let app = memory_app(live(provider.clone()), "live");
    let token = signup(&app, "lee@example.com").await;

    let (status, first) = call(
        &app,
        "POST",
        "/api/chat/message",
        Some(&token),
        Some(json!({"content": "Are you there?"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["assistant_message"]["source"], "fallback");
    let conversation_id = first["conversation_id"].as_i64().unwrap();

    let (status, second) = call(
        &app,
        "POST",
        &format!("/api/chat/message?conversation_id={conversation_id}"),
        Some(&token),
        Some(json!({"content": "Hello again"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["created_conversation"], false);
    assert_eq!(second["assistant_message"]["source"], "model");

    let (_, detail) = call(
        &app,
        "GET",
        &format!("/api/chat/conversations/{conversation_id}"),
        Some(&token),
        None,
    )
    .await;
    let roles: Vec<&str> = detail["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["role"].as_str().unwrap())
        .collect();
    assert_eq!(roles, vec!["user", "assistant", "user", "assistant"]);
}

#[tokio::test]
async fn demo_mode_echoes_without_a_provider() {
    let config = AppConfig::default();
    let gateway = ModelGateway::from_config(&config).unwrap();
    assert_eq!(gateway.mode(), "demo");

    let app = sqlite_app(Arc::new(DemoGateway), "demo").await;
    let (_, health) = call(&app, "GET", "/health", None, None).await;
    assert_eq!(health["model_mode"], "demo");

    let token = signup(&app, "sam@example.com").await;
    let (status, out) = call(
        &app,
        "POST",
        "/api/chat/message",
        Some(&token),
        Some(json!({"content": "Do you refill CO2 units?"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(out["assistant_message"]["source"], "demo");
    assert!(out["assistant_message"]["content"]
        .as_str()
        .unwrap()
        .contains("Do you refill CO2 units?"));
}

#[tokio::test]
async fn users_are_isolated_from_each_other() {
    let app = memory_app(Arc::new(DemoGateway), "demo");
    let alice = signup(&app, "alice@example.com").await;
    let bob = signup(&app, "bob@example.com").await;

    let (_, created) = call(
        &app,
        "POST",
        "/api/chat/conversations",
        Some(&alice),
        Some(json!({"title": "Sprinkler retrofit"})),
    )
    .await;
    let id = created["id"].as_i64().unwrap();

    let uri = format!("/api/chat/conversations/{id}");
    let (status, _) = call(&app, "GET", &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&app, "DELETE", &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(
        &app,
        "POST",
        &format!("{uri}/messages"),
        Some(&bob),
        Some(json!({"content": "hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, listed) = call(&app, "GET", "/api/chat/conversations", Some(&bob), None).await;
    assert!(listed["conversations"].as_array().unwrap().is_empty());

    let (status, _) = call(&app, "DELETE", &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app, "GET", &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn live_gateway_from_config_talks_to_anthropic_api() {
    let stub = Router::new().route(
        "/v1/messages",
        axum::routing::post(|axum::Json(body): axum::Json<Value>| async move {
            assert!(body["system"].as_str().unwrap().contains("Frederick"));
            axum::Json(json!({
                "id": "msg_e2e",
                "model": "claude-sonnet-4-20250514",
                "content": [{"type": "text", "text": "We service extinguishers on site."}],
                "usage": {"input_tokens": 90, "output_tokens": 9}
            }))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, stub).await.unwrap();
    });

    let mut config = AppConfig::default();
    config.api_key = Some("sk-ant-e2e".into());
    config.api_url = Some(format!("http://{addr}"));
    let gateway = ModelGateway::from_config(&config).unwrap();
    assert_eq!(gateway.mode(), "live");

    let store = Arc::new(SqliteStore::new("sqlite::memory:").await.unwrap());
    let app = build_router(Arc::new(AppState::new(
        config,
        store,
        Arc::new(gateway),
        "live",
    )));
    let token = signup(&app, "ops@example.com").await;

    let (status, out) = call(
        &app,
        "POST",
        "/api/chat/message",
        Some(&token),
        Some(json!({"content": "Do you come to us?"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(out["assistant_message"]["source"], "model");
    assert_eq!(
        out["assistant_message"]["content"],
        "We service extinguishers on site."
    );
}
