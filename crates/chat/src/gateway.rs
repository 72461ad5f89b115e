//! Model gateway: one model call per turn, degrading to a placeholder reply.
//!
//! [`ModelGateway`] is picked once at startup. With a provider credential
//! it is [`LiveGateway`]; without one it is [`DemoGateway`], which never
//! touches the network. Neither variant returns an error: every provider
//! failure becomes a [`ReplySource::Fallback`] reply.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use emberchat_config::AppConfig;
use emberchat_core::error::ProviderError;
use emberchat_core::message::ReplySource;
use emberchat_core::provider::{Provider, ProviderRequest};
use emberchat_core::{Error, Result};
use emberchat_providers::AnthropicProvider;
use tracing::{debug, info, warn};

use crate::context::AssembledContext;

/// An assistant reply and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub source: ReplySource,
}

impl Reply {
    /// True for any reply the model did not write.
    pub fn is_fallback(&self) -> bool {
        self.source != ReplySource::Model
    }
}

/// Produces a reply for an assembled context.
#[async_trait]
pub trait ReplyGateway: Send + Sync {
    async fn reply(&self, context: &AssembledContext) -> Reply;
}

// ── Demo ──────────────────────────────────────────────────────────────────

/// Echoes the latest user message. No network.
#[derive(Debug, Clone, Default)]
pub struct DemoGateway;

impl DemoGateway {
    pub fn reply_text(user_message: &str) -> String {
        format!(
            "[Demo mode - model provider not configured] I received your message: \
             '{user_message}'. To enable real responses, set ANTHROPIC_API_KEY."
        )
    }
}

#[async_trait]
impl ReplyGateway for DemoGateway {
    async fn reply(&self, context: &AssembledContext) -> Reply {
        Reply {
            text: Self::reply_text(context.latest_user_message()),
            source: ReplySource::Demo,
        }
    }
}

// ── Live ──────────────────────────────────────────────────────────────────

/// Calls a real provider under a timeout.
pub struct LiveGateway {
    provider: Arc<dyn Provider>,
    model: String,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
}

impl LiveGateway {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            provider,
            model: model.into(),
            max_tokens: 1024,
            temperature: 0.7,
            timeout,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn fallback_text(reason: &str) -> String {
        format!(
            "[Assistant unavailable] I apologize, but I couldn't get a response from the \
             assistant service ({reason}). Please try again."
        )
    }

    async fn call(&self, context: &AssembledContext) -> std::result::Result<String, ProviderError> {
        let request = ProviderRequest {
            model: self.model.clone(),
            turns: context.turns.clone(),
            temperature: self.temperature,
            max_tokens: Some(self.max_tokens),
        };

        let response = tokio::time::timeout(self.timeout, self.provider.complete(request))
            .await
            .map_err(|_| {
                ProviderError::Timeout(format!(
                    "no reply within {}s",
                    self.timeout.as_secs_f32()
                ))
            })??;

        if response.content.trim().is_empty() {
            return Err(ProviderError::MalformedResponse("empty reply".into()));
        }
        if let Some(usage) = &response.usage {
            debug!(
                provider = %self.provider.name(),
                model = %response.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Model replied"
            );
        }
        Ok(response.content)
    }
}

#[async_trait]
impl ReplyGateway for LiveGateway {
    async fn reply(&self, context: &AssembledContext) -> Reply {
        match self.call(context).await {
            Ok(text) => Reply {
                text,
                source: ReplySource::Model,
            },
            Err(e) => {
                warn!(
                    provider = %self.provider.name(),
                    conversation_id = %context.conversation_id,
                    error = %e,
                    "Model call failed, replying with fallback"
                );
                Reply {
                    text: Self::fallback_text(&describe(&e)),
                    source: ReplySource::Fallback,
                }
            }
        }
    }
}

/// A short, user-safe reason for a provider failure.
fn describe(err: &ProviderError) -> String {
    match err {
        ProviderError::Timeout(_) => "the request timed out".into(),
        ProviderError::RateLimited { .. } => "the service is busy".into(),
        ProviderError::AuthenticationFailed(_) => "the service rejected our credentials".into(),
        ProviderError::ApiError { status_code, .. } => format!("service error {status_code}"),
        ProviderError::Network(_) => "the service could not be reached".into(),
        ProviderError::MalformedResponse(_) => "the service returned an unusable reply".into(),
        ProviderError::NotConfigured(_) => "the service is not configured".into(),
    }
}

// ── Selection ─────────────────────────────────────────────────────────────

/// The gateway in use, fixed for the life of the process.
pub enum ModelGateway {
    Live(LiveGateway),
    Demo(DemoGateway),
}

impl ModelGateway {
    /// Live when an API key is configured, demo otherwise.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let Some(api_key) = config.api_key.as_deref().filter(|_| config.has_api_key()) else {
            info!("No model credential configured; running in demo mode");
            return Ok(Self::Demo(DemoGateway));
        };

        let timeout = Duration::from_secs(config.provider_timeout_secs);
        let mut provider = AnthropicProvider::with_timeout(api_key, timeout).map_err(|e| {
            Error::Config {
                message: e.to_string(),
            }
        })?;
        if let Some(url) = &config.api_url {
            provider = provider.with_base_url(url);
        }

        info!(model = %config.model, "Model gateway live");
        Ok(Self::Live(
            LiveGateway::new(Arc::new(provider), &config.model, timeout)
                .with_max_tokens(config.max_tokens)
                .with_temperature(config.temperature),
        ))
    }

    pub fn mode(&self) -> &'static str {
        match self {
            Self::Live(_) => "live",
            Self::Demo(_) => "demo",
        }
    }
}

#[async_trait]
impl ReplyGateway for ModelGateway {
    async fn reply(&self, context: &AssembledContext) -> Reply {
        match self {
            Self::Live(live) => live.reply(context).await,
            Self::Demo(demo) => demo.reply(context).await,
        }
    }
}
