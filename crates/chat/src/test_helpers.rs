//! Shared test helpers for the chat crate.

use emberchat_core::error::ProviderError;
use emberchat_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use std::sync::Mutex;
use std::time::Duration;

/// One scripted outcome for [`ScriptedProvider`].
#[derive(Clone)]
pub enum Step {
    Reply(String),
    Fail(ProviderError),
    /// Sleep this long, then reply `"late"`.
    Stall(Duration),
}

/// A mock provider that plays back scripted outcomes and records requests.
///
/// When the script runs out, the last step repeats.
pub struct ScriptedProvider {
    steps: Mutex<Vec<Step>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(text: &str) -> Self {
        Self::new(vec![Step::Reply(text.into())])
    }

    pub fn failing(err: ProviderError) -> Self {
        Self::new(vec![Step::Fail(err)])
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<ProviderRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let step = {
            let mut steps = self.steps.lock().unwrap();
            if steps.len() > 1 {
                steps.remove(0)
            } else {
                steps.first().cloned().expect("ScriptedProvider has no steps")
            }
        };

        match step {
            Step::Reply(text) => Ok(make_text_response(&text)),
            Step::Fail(err) => Err(err),
            Step::Stall(delay) => {
                tokio::time::sleep(delay).await;
                Ok(make_text_response("late"))
            }
        }
    }
}

pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        content: text.into(),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}
