//! The agent loop: stream a turn, gate its tool calls, dispatch or pause,
//! repeat.
//!
//! One run is a single task. It owns its transcript, pulls deltas from the
//! provider channel in arrival order and appends tool results in call
//! order. The only places it waits are the provider read and, between
//! `run` and `resume`, the confirmation store.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use toolgate_config::{AppConfig, PromptContext, SkillConfig, SkillKind};
use toolgate_core::{
    AgentError, AgentMode, Credential, DomainEvent, Error, EventBus, Message, MessageToolCall,
    Provider, ProviderError, ProviderRequest, Result, StreamDelta, ToolCall, ToolDefinition,
};
use toolgate_tools::{
    ToolExecutor, ToolRegistry, USE_EXTRA_TOOL, group_tools_for_mode, tools_for_mode,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::accumulator::{ToolCallAccumulator, to_message_call, validate_tool_calls};
use crate::confirmation::{ConfirmationStore, PendingPlan};
use crate::dispatch::execute_step;
use crate::gate::{GateDecision, decide};
use crate::history::validate_conversation_history;
use crate::ledger::{
    AgentExecution, ConfirmationRequest, ExecutionStep, PlanStatus, build_confirmation,
    build_execution, complete_plan, completion_summary,
};
use crate::prompt::{build_system_prompt, invoked_skills, parse_skill_tags, skills_of};
use crate::stream_event::AgentStreamEvent;
use crate::thinking::{ThinkingIndicator, preparing_label};

pub const DEFAULT_MAX_ITERATIONS: u32 = 100;
const DEFAULT_THINKING_IDLE: Duration = Duration::from_millis(500);
const EVENT_CHANNEL_CAPACITY: usize = 128;

/// A new user message plus the turns before it.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub message: String,
    pub history: Vec<Message>,
}

impl RunRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            history: Vec::new(),
        }
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }
}

/// How a run ended, short of an error.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The model answered without calling tools.
    Completed {
        run_id: String,
        answer: Message,
        transcript: Vec<Message>,
        /// Present when the run dispatched any tool.
        execution: Option<AgentExecution>,
        iterations: u32,
    },

    /// A batch was held. Resolve it with [`AgentLoop::resume`].
    AwaitingConfirmation {
        run_id: String,
        confirmation: ConfirmationRequest,
        transcript: Vec<Message>,
        /// Steps dispatched in earlier iterations of this run.
        execution: Option<AgentExecution>,
    },

    /// Cancelled. `partial` is the content streamed before the abort.
    Aborted {
        run_id: String,
        partial: String,
        transcript: Vec<Message>,
        /// Steps dispatched before the abort.
        execution: Option<AgentExecution>,
    },
}

impl RunOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            RunOutcome::Completed { .. } => "completed",
            RunOutcome::AwaitingConfirmation { .. } => "awaiting_confirmation",
            RunOutcome::Aborted { .. } => "aborted",
        }
    }

    pub fn run_id(&self) -> &str {
        match self {
            RunOutcome::Completed { run_id, .. }
            | RunOutcome::AwaitingConfirmation { run_id, .. }
            | RunOutcome::Aborted { run_id, .. } => run_id,
        }
    }

    pub fn transcript(&self) -> &[Message] {
        match self {
            RunOutcome::Completed { transcript, .. }
            | RunOutcome::AwaitingConfirmation { transcript, .. }
            | RunOutcome::Aborted { transcript, .. } => transcript,
        }
    }
}

/// A run that failed, with the steps it dispatched before failing.
///
/// Only the failing iteration is lost; tools that already ran stay on
/// record so they can be audited or undone.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct RunError {
    pub run_id: String,
    pub error: Error,
    pub execution: Option<AgentExecution>,
}

impl RunError {
    pub fn is_timeout(&self) -> bool {
        self.error.is_timeout()
    }
}

/// What resolving a held plan did.
#[derive(Debug, Clone)]
pub enum Resolution {
    Executed {
        execution: AgentExecution,
        message: Message,
    },
    Rejected {
        plan_id: String,
    },
}

/// Optional sink for stream events.
struct Emitter<'a>(Option<&'a mpsc::Sender<AgentStreamEvent>>);

impl Emitter<'_> {
    async fn send(&self, event: AgentStreamEvent) {
        if let Some(tx) = self.0 {
            // A caller that stopped listening does not stop the run
            let _ = tx.send(event).await;
        }
    }

    async fn send_opt(&self, event: Option<AgentStreamEvent>) {
        if let Some(event) = event {
            self.send(event).await;
        }
    }
}

/// Iterations run and steps dispatched so far.
#[derive(Default)]
struct Progress {
    iterations: u32,
    steps: Vec<ExecutionStep>,
}

/// One streamed assistant turn.
#[derive(Default)]
struct Turn {
    content: String,
    reasoning: String,
    calls: Vec<MessageToolCall>,
    aborted: bool,
}

/// The agent loop.
///
/// Cheap to clone; clones share the provider, executor, event bus and
/// confirmation store.
#[derive(Clone)]
pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    credential: Credential,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    executor: ToolExecutor,
    mode: AgentMode,
    max_iterations: u32,
    thinking_idle: Duration,
    context: PromptContext,
    skills: Vec<SkillConfig>,
    event_bus: Arc<EventBus>,
    confirmations: Arc<ConfirmationStore>,
}

impl AgentLoop {
    pub fn new(provider: Arc<dyn Provider>, credential: Credential, executor: ToolExecutor) -> Self {
        let model = provider.default_model().to_string();
        Self {
            provider,
            credential,
            model,
            temperature: 0.7,
            max_tokens: None,
            executor,
            mode: AgentMode::default(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            thinking_idle: DEFAULT_THINKING_IDLE,
            context: PromptContext::default(),
            skills: Vec::new(),
            event_bus: Arc::new(EventBus::default()),
            confirmations: Arc::new(ConfirmationStore::new()),
        }
    }

    /// Build a loop with the settings from `config`. The configured model
    /// applies only when `provider` is the configured default provider.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        credential: Credential,
        executor: ToolExecutor,
    ) -> Self {
        let model = if provider.name() == config.default_provider {
            config.default_model.clone()
        } else {
            provider.default_model().to_string()
        };
        Self::new(provider, credential, executor)
            .with_model(model)
            .with_temperature(config.default_temperature)
            .with_max_tokens(config.default_max_tokens)
            .with_mode(config.agent.mode)
            .with_max_iterations(config.agent.max_iterations)
            .with_thinking_idle(Duration::from_millis(config.agent.thinking_idle_ms))
            .with_context(config.context.clone())
            .with_skills(config.skills.clone())
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_mode(mut self, mode: AgentMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the maximum number of streaming/dispatch cycles per run.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_thinking_idle(mut self, idle: Duration) -> Self {
        self.thinking_idle = idle;
        self
    }

    pub fn with_context(mut self, context: PromptContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_skills(mut self, skills: Vec<SkillConfig>) -> Self {
        self.skills = skills;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = bus;
        self
    }

    pub fn with_confirmation_store(mut self, store: Arc<ConfirmationStore>) -> Self {
        self.confirmations = store;
        self
    }

    pub fn mode(&self) -> AgentMode {
        self.mode
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn confirmations(&self) -> &Arc<ConfirmationStore> {
        &self.confirmations
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Run to a terminal state without streaming events.
    pub async fn run(
        &self,
        request: RunRequest,
        cancel: CancellationToken,
    ) -> std::result::Result<RunOutcome, RunError> {
        self.drive(request, cancel, Emitter(None)).await
    }

    /// Run on a spawned task, streaming events as they happen.
    ///
    /// The last event is always terminal (`done`, `confirmation_required`,
    /// `error` or `aborted`). The handle yields the same outcome `run`
    /// would.
    pub fn run_stream(
        &self,
        request: RunRequest,
        cancel: CancellationToken,
    ) -> (
        mpsc::Receiver<AgentStreamEvent>,
        JoinHandle<std::result::Result<RunOutcome, RunError>>,
    ) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let this = self.clone();
        let handle = tokio::spawn(async move { this.drive(request, cancel, Emitter(Some(&tx))).await });
        (rx, handle)
    }

    async fn drive(
        &self,
        request: RunRequest,
        cancel: CancellationToken,
        events: Emitter<'_>,
    ) -> std::result::Result<RunOutcome, RunError> {
        let run_id = Uuid::new_v4().to_string();
        let executor = self.executor.for_request();
        let message = request.message.clone();

        info!(
            run_id = %run_id,
            provider = %self.provider.name(),
            model = %self.model,
            mode = %self.mode,
            "Run started"
        );
        self.event_bus.publish(DomainEvent::RunStarted {
            run_id: run_id.clone(),
            provider: self.provider.name().to_string(),
            mode: self.mode.to_string(),
            timestamp: Utc::now(),
        });

        let mut thinking = ThinkingIndicator::new(self.thinking_idle);
        let mut progress = Progress::default();
        let result = self
            .run_loop(&run_id, &executor, request, &cancel, &events, &mut thinking, &mut progress)
            .await;
        let iterations = progress.iterations;

        events.send_opt(thinking.stop()).await;
        let status = match &result {
            Ok(outcome) => {
                let terminal = match outcome {
                    RunOutcome::Completed { execution, .. } => AgentStreamEvent::Done {
                        run_id: run_id.clone(),
                        iterations,
                        tool_calls_made: execution.as_ref().map_or(0, |e| e.steps.len()),
                    },
                    RunOutcome::AwaitingConfirmation { confirmation, .. } => {
                        AgentStreamEvent::ConfirmationRequired {
                            request: confirmation.clone(),
                        }
                    }
                    RunOutcome::Aborted { .. } => AgentStreamEvent::Aborted {
                        run_id: run_id.clone(),
                    },
                };
                events.send(terminal).await;
                outcome.status()
            }
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "Run failed");
                events
                    .send(AgentStreamEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
                "error"
            }
        };

        info!(run_id = %run_id, status, iterations, "Run finished");
        self.event_bus.publish(DomainEvent::RunFinished {
            run_id: run_id.clone(),
            status: status.to_string(),
            iterations,
            timestamp: Utc::now(),
        });
        result.map_err(|error| RunError {
            run_id,
            error,
            execution: take_execution(&message, &mut progress.steps),
        })
    }

    async fn run_loop(
        &self,
        run_id: &str,
        executor: &ToolExecutor,
        request: RunRequest,
        cancel: &CancellationToken,
        events: &Emitter<'_>,
        thinking: &mut ThinkingIndicator,
        progress: &mut Progress,
    ) -> Result<RunOutcome> {
        let registry = executor.registry().clone();

        let (tags, cleaned) = parse_skill_tags(&request.message);
        let invoked = invoked_skills(&self.skills, &tags);
        if !tags.is_empty() {
            let found: Vec<&str> = invoked.iter().map(|s| s.name.as_str()).collect();
            info!(requested = ?tags, found = ?found, "Skill tags parsed from user message");
        }
        let user_text = if cleaned.is_empty() {
            request.message.clone()
        } else {
            cleaned
        };

        let mut transcript = vec![Message::system(build_system_prompt(
            self.mode,
            &self.context,
            &self.skills,
            &invoked,
        ))];
        transcript.extend(validate_conversation_history(&request.history));
        transcript.push(Message::user(user_text));

        let mut tools = tools_for_mode(&registry, self.mode);
        let mut loaded_groups = HashSet::new();
        if !skills_of(&self.skills, SkillKind::Tool).is_empty() {
            self.load_group(&registry, "skills", &mut tools, &mut loaded_groups);
        }

        events.send_opt(thinking.start(None)).await;

        while progress.iterations < self.max_iterations {
            progress.iterations += 1;

            if cancel.is_cancelled() {
                return Ok(RunOutcome::Aborted {
                    run_id: run_id.to_string(),
                    partial: String::new(),
                    transcript,
                    execution: take_execution(&request.message, &mut progress.steps),
                });
            }

            events.send_opt(thinking.start(None)).await;
            let turn = self
                .stream_turn(&transcript, &tools, cancel, events, thinking)
                .await?;

            if turn.aborted {
                info!(run_id = %run_id, iteration = progress.iterations, "Run aborted");
                if !turn.content.is_empty() {
                    transcript.push(
                        Message::assistant(turn.content.clone()).with_reasoning(turn.reasoning),
                    );
                }
                return Ok(RunOutcome::Aborted {
                    run_id: run_id.to_string(),
                    partial: turn.content,
                    transcript,
                    execution: take_execution(&request.message, &mut progress.steps),
                });
            }

            let calls = validate_tool_calls(&turn.calls);
            let assistant = Message::assistant(turn.content.clone())
                .with_reasoning(turn.reasoning)
                .with_tool_calls(calls.iter().map(to_message_call).collect());
            transcript.push(assistant.clone());

            debug!(
                run_id = %run_id,
                iteration = progress.iterations,
                raw_calls = turn.calls.len(),
                valid_calls = calls.len(),
                "Turn finished"
            );

            match decide(&registry, calls) {
                GateDecision::Terminal => {
                    let execution = take_execution(&request.message, &mut progress.steps);
                    return Ok(RunOutcome::Completed {
                        run_id: run_id.to_string(),
                        answer: assistant,
                        transcript,
                        execution,
                        iterations: progress.iterations,
                    });
                }

                GateDecision::Confirm(calls) => {
                    let (plan, confirmation) = build_confirmation(&calls, &turn.content);
                    info!(
                        run_id = %run_id,
                        plan_id = %plan.id,
                        steps = plan.steps.len(),
                        "Batch held for confirmation"
                    );
                    self.event_bus.publish(DomainEvent::ConfirmationRequested {
                        run_id: run_id.to_string(),
                        plan_id: plan.id.clone(),
                        steps: plan.steps.len(),
                        timestamp: Utc::now(),
                    });
                    self.confirmations.insert(PendingPlan {
                        plan,
                        confirmation: confirmation.clone(),
                    });
                    let execution = take_execution(&request.message, &mut progress.steps);
                    return Ok(RunOutcome::AwaitingConfirmation {
                        run_id: run_id.to_string(),
                        confirmation,
                        transcript,
                        execution,
                    });
                }

                GateDecision::Dispatch(calls) => {
                    let plan_id = Uuid::new_v4().to_string();
                    for call in &calls {
                        events
                            .send_opt(thinking.start(Some(format!("Executing {}", call.name))))
                            .await;
                        events
                            .send(AgentStreamEvent::ToolCall {
                                id: call.id.clone(),
                                name: call.name.clone(),
                                input: call.arguments.clone(),
                            })
                            .await;

                        let step = self
                            .dispatch(executor, run_id, call, &plan_id, self.mode)
                            .await;
                        let output = step.message_content();
                        events
                            .send(AgentStreamEvent::ToolResult {
                                id: call.id.clone(),
                                name: call.name.clone(),
                                output: output.clone(),
                                success: step.succeeded(),
                            })
                            .await;
                        transcript.push(Message::tool_result(call.id.clone(), output));

                        if step.tool == USE_EXTRA_TOOL
                            && step.succeeded()
                            && let Some(group) = step.args.get("extraTool").and_then(|v| v.as_str())
                        {
                            self.load_group(&registry, group, &mut tools, &mut loaded_groups);
                        }
                        progress.steps.push(step);
                    }
                }
            }
        }

        warn!(run_id = %run_id, max = self.max_iterations, "Iteration cap reached");
        Err(AgentError::IterationLimit {
            max: self.max_iterations,
        }
        .into())
    }

    async fn stream_turn(
        &self,
        transcript: &[Message],
        tools: &[ToolDefinition],
        cancel: &CancellationToken,
        events: &Emitter<'_>,
        thinking: &mut ThinkingIndicator,
    ) -> Result<Turn> {
        let mut request = ProviderRequest::new(self.model.clone(), transcript.to_vec());
        request.tools = tools.to_vec();
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;

        debug!(
            model = %self.model,
            messages = transcript.len(),
            tools = tools.len(),
            "Streaming turn"
        );

        let mut turn = Turn::default();
        let stream_cancel = cancel.child_token();
        let mut rx = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                turn.aborted = true;
                return Ok(turn);
            }
            rx = self.provider.stream_chat(&self.credential, request, stream_cancel.clone()) => rx?,
        };

        let mut calls = ToolCallAccumulator::new();
        let mut last_title: Option<String> = None;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    stream_cancel.cancel();
                    turn.aborted = true;
                    break;
                }
                item = rx.recv() => {
                    // A closed channel without `done` ends the turn as-is
                    let Some(item) = item else { break };
                    match item? {
                        StreamDelta::Content { text } => {
                            if text.is_empty() {
                                continue;
                            }
                            events.send_opt(thinking.on_content()).await;
                            turn.content.push_str(&text);
                            events.send(AgentStreamEvent::Chunk { content: text }).await;
                        }
                        StreamDelta::Reasoning { text, title } => {
                            turn.reasoning.push_str(&text);
                            if let Some(t) = &title
                                && last_title.as_ref() != Some(t)
                            {
                                last_title = Some(t.clone());
                                events.send_opt(thinking.start(Some(t.clone()))).await;
                            }
                            events.send(AgentStreamEvent::Reasoning { content: text, title }).await;
                        }
                        delta @ (StreamDelta::ToolCallFragment { .. } | StreamDelta::ToolCall { .. }) => {
                            if calls.apply(&delta) {
                                let label = preparing_label(calls.len(), calls.first_name());
                                events.send_opt(thinking.start(Some(label))).await;
                            }
                        }
                        StreamDelta::Error { message } => {
                            warn!(provider = %self.provider.name(), error = %message, "Provider reported an error mid-stream");
                            stream_cancel.cancel();
                            return Err(ProviderError::StreamInterrupted(message).into());
                        }
                        StreamDelta::Done => break,
                    }
                }
                _ = thinking.rearm_elapsed(), if thinking.is_rearm_pending() => {
                    events.send_opt(thinking.rearm()).await;
                }
            }
        }

        turn.calls = calls.raw();
        Ok(turn)
    }

    /// Execute one call and publish it.
    async fn dispatch(
        &self,
        executor: &ToolExecutor,
        run_id: &str,
        call: &ToolCall,
        plan_id: &str,
        mode: AgentMode,
    ) -> ExecutionStep {
        let started = Instant::now();
        let step = execute_step(executor, call, plan_id, mode).await;
        self.event_bus.publish(DomainEvent::ToolExecuted {
            run_id: run_id.to_string(),
            tool_name: call.name.clone(),
            success: step.succeeded(),
            duration_ms: started.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
        });
        step
    }

    fn load_group(
        &self,
        registry: &ToolRegistry,
        name: &str,
        tools: &mut Vec<ToolDefinition>,
        loaded: &mut HashSet<String>,
    ) {
        if !loaded.insert(name.to_string()) {
            return;
        }
        let Some(group) = registry.extra_group(name) else {
            return;
        };
        let added = group_tools_for_mode(group, self.mode);
        info!(group = %name, tools = added.len(), "Extra tool group loaded");
        for def in added {
            if !tools.iter().any(|t| t.name == def.name) {
                tools.push(def);
            }
        }
    }

    /// Approve or reject a held plan.
    ///
    /// Approval runs exactly the plan's steps, in order, in agent mode. It
    /// does not stream a follow-up turn. Rejection discards the plan.
    pub async fn resume(&self, plan_id: &str, approve: bool) -> Result<Resolution> {
        let PendingPlan {
            mut plan,
            confirmation,
        } = self.confirmations.take(plan_id)?;

        self.event_bus.publish(DomainEvent::PlanResolved {
            plan_id: plan.id.clone(),
            approved: approve,
            timestamp: Utc::now(),
        });

        if !approve {
            info!(plan_id = %plan.id, "Plan rejected");
            return Ok(Resolution::Rejected { plan_id: plan.id });
        }

        let executor = self.executor.for_request();
        plan.status = PlanStatus::Executing;
        info!(plan_id = %plan.id, steps = plan.steps.len(), "Executing confirmed plan");

        let mut steps = Vec::with_capacity(plan.steps.len());
        for planned in &plan.steps {
            let call = ToolCall {
                id: planned.id.clone(),
                name: planned.tool.clone(),
                arguments: planned.args.clone(),
            };
            steps.push(
                self.dispatch(&executor, &plan.id, &call, &plan.id, AgentMode::Agent)
                    .await,
            );
        }

        let execution = complete_plan(plan, &confirmation.description, steps);
        let message = Message::assistant(completion_summary(&execution));
        info!(
            plan_id = %execution.id,
            status = %execution.plan.status,
            "Confirmed plan finished"
        );
        Ok(Resolution::Executed { execution, message })
    }

    /// Run every recorded undo action of `execution`, in order.
    ///
    /// Failures are logged; the remaining actions still run.
    pub async fn undo(&self, execution: &AgentExecution) -> Message {
        let executor = self.executor.for_request();
        for action in execution.steps.iter().filter_map(|s| s.undo_action.as_ref()) {
            let call = ToolCall {
                id: Uuid::new_v4().to_string(),
                name: action.tool.clone(),
                arguments: action.args.clone(),
            };
            let outcome = executor.execute(&call).await;
            if !outcome.success {
                warn!(tool = %action.tool, error = ?outcome.error, "Undo step failed");
            }
        }
        info!(execution_id = %execution.id, "Execution undone");
        Message::assistant(format!("Undone: {}", execution.request))
    }
}

/// The run's dispatched steps so far as an execution, or `None` if none ran.
fn take_execution(request: &str, steps: &mut Vec<ExecutionStep>) -> Option<AgentExecution> {
    (!steps.is_empty()).then(|| build_execution(request, std::mem::take(steps)))
}
