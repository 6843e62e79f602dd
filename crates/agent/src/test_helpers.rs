//! Shared test helpers: a scripted streaming provider and a recording tool
//! handler.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use toolgate_config::RateLimitConfig;
use toolgate_core::{
    Credential, DeltaReceiver, MessageToolCall, Provider, ProviderError, ProviderRequest,
    StreamDelta, ToolCall, ToolError, ToolHandler, ToolOutcome,
};
use toolgate_tools::{DryRunHandler, ToolExecutor, ToolRegistry};

/// One scripted item of a provider stream.
#[derive(Debug, Clone)]
pub enum Step {
    Delta(StreamDelta),
    Fail(ProviderError),
    /// Go silent until the idle watchdog fires.
    Stall,
}

/// A mock provider that streams a sequence of scripted turns.
///
/// Each call to `stream_chat` plays the next script. Fails with
/// `NotConfigured` once the scripts run out.
pub struct ScriptedProvider {
    scripts: Mutex<VecDeque<Vec<Step>>>,
    requests: Mutex<Vec<ProviderRequest>>,
    idle_timeout: Duration,
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<Vec<Step>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
            idle_timeout: Duration::from_secs(30),
        }
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn default_model(&self) -> &str {
        "mock-model"
    }

    async fn stream_chat(
        &self,
        _credential: &Credential,
        request: ProviderRequest,
        cancel: CancellationToken,
    ) -> Result<DeltaReceiver, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::NotConfigured("script exhausted".into()))?;

        let (tx, rx) = mpsc::channel(128);
        let idle = self.idle_timeout;
        tokio::spawn(async move {
            for step in script {
                if cancel.is_cancelled() {
                    return;
                }
                let item = match step {
                    Step::Delta(delta) => Ok(delta),
                    Step::Fail(err) => Err(err),
                    Step::Stall => {
                        tokio::select! {
                            _ = cancel.cancelled() => return,
                            _ = tokio::time::sleep(idle) => Err(ProviderError::Timeout(format!(
                                "no data received for {} seconds",
                                idle.as_secs()
                            ))),
                        }
                    }
                };
                if tx.send(item).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }
}

pub fn content(text: &str) -> Step {
    Step::Delta(StreamDelta::content(text))
}

pub fn done() -> Step {
    Step::Delta(StreamDelta::Done)
}

/// A turn that answers with text only.
pub fn text_turn(text: &str) -> Vec<Step> {
    vec![content(text), done()]
}

/// A turn that requests the given calls as `(name, args)`, ids `call_<i>`.
pub fn tool_turn(text: &str, calls: &[(&str, serde_json::Value)]) -> Vec<Step> {
    let mut steps = Vec::new();
    if !text.is_empty() {
        steps.push(content(text));
    }
    for (i, (name, args)) in calls.iter().enumerate() {
        steps.push(Step::Delta(StreamDelta::ToolCall {
            index: i as u32,
            call: MessageToolCall {
                id: format!("call_{i}"),
                name: name.to_string(),
                arguments: args.to_string(),
            },
        }));
    }
    steps.push(done());
    steps
}

/// Records every call and answers like [`DryRunHandler`], failing the
/// tools it was told to fail.
#[derive(Default)]
pub struct ScriptedHandler {
    calls: Mutex<Vec<String>>,
    failing: Vec<String>,
}

impl ScriptedHandler {
    pub fn failing(tools: &[&str]) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: tools.iter().map(|t| t.to_string()).collect(),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolHandler for ScriptedHandler {
    async fn call(&self, call: &ToolCall) -> Result<ToolOutcome, ToolError> {
        self.calls.lock().unwrap().push(call.name.clone());
        if self.failing.contains(&call.name) {
            return Err(ToolError::ExecutionFailed {
                tool_name: call.name.clone(),
                reason: "Chat not found".into(),
            });
        }
        DryRunHandler.call(call).await
    }
}

pub fn executor_with(handler: Arc<ScriptedHandler>) -> ToolExecutor {
    executor_with_limits(handler, RateLimitConfig::default())
}

pub fn executor_with_limits(handler: Arc<ScriptedHandler>, limits: RateLimitConfig) -> ToolExecutor {
    let registry = Arc::new(ToolRegistry::builtin().unwrap());
    ToolExecutor::new(registry, handler, &limits)
}
