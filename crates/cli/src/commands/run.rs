//! `toolgate run` — run the agent on one message.

use std::io::Write;
use std::sync::Arc;

use tokio::io::AsyncBufReadExt;
use tokio_util::sync::CancellationToken;
use toolgate_agent::{
    AgentExecution, AgentLoop, AgentStreamEvent, ConfirmationRequest, Resolution, RunOutcome,
    RunRequest,
};
use toolgate_config::AppConfig;
use toolgate_core::{AgentMode, Credential};
use toolgate_providers::build_from_config;
use toolgate_tools::{DryRunHandler, ToolExecutor, ToolRegistry};

pub struct RunArgs {
    pub message: String,
    pub mode: Option<AgentMode>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub yes: bool,
}

pub async fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if let Some(provider) = &args.provider {
        config.default_provider = provider.clone();
    }

    let router = build_from_config(&config)?;
    let provider = router.default().ok_or("No default provider configured")?;

    let Some(key) = config.credential_for(provider.name()) else {
        print_missing_key_help(provider.name());
        return Err("No API key found. See above for setup instructions.".into());
    };

    let registry = Arc::new(ToolRegistry::builtin()?);
    let executor = ToolExecutor::new(registry, Arc::new(DryRunHandler), &config.rate_limit);

    let mut agent = AgentLoop::from_config(&config, provider, Credential::new(key), executor);
    if let Some(mode) = args.mode {
        agent = agent.with_mode(mode);
    }
    if let Some(model) = args.model {
        agent = agent.with_model(model);
    }

    eprintln!("  Provider: {}  Model: {}  Mode: {}", config.default_provider, agent.model(), agent.mode());
    eprintln!();

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let (mut rx, handle) = agent.run_stream(RunRequest::new(args.message), cancel);
    while let Some(event) = rx.recv().await {
        if let Some(text) = render_event(&event) {
            eprint!("{text}");
        }
    }
    let outcome = match handle.await? {
        Ok(outcome) => outcome,
        Err(err) => {
            if let Some(execution) = &err.execution {
                eprintln!("{}", format_dispatched(execution));
            }
            return Err(err.into());
        }
    };

    match outcome {
        RunOutcome::Completed { answer, .. } => println!("{}", answer.content),
        RunOutcome::AwaitingConfirmation { confirmation, .. } => {
            eprintln!("{}", format_plan(&confirmation));
            let approve = if args.yes {
                eprintln!("  Approved with --yes");
                true
            } else {
                prompt_approval().await?
            };

            match agent.resume(&confirmation.plan_id, approve).await? {
                Resolution::Executed { message, .. } => println!("{}", message.content),
                Resolution::Rejected { .. } => eprintln!("  Plan discarded. Nothing was executed."),
            }
        }
        RunOutcome::Aborted {
            partial, execution, ..
        } => {
            if !partial.is_empty() {
                println!("{partial}");
            }
            if let Some(execution) = &execution {
                eprintln!("{}", format_dispatched(execution));
            }
        }
    }

    Ok(())
}

/// Progress text for one event, or `None` to stay quiet.
pub fn render_event(event: &AgentStreamEvent) -> Option<String> {
    match event {
        AgentStreamEvent::Thinking {
            active: true,
            step: Some(step),
        } => Some(format!("  … {step}\n")),
        AgentStreamEvent::Chunk { content } => Some(content.clone()),
        AgentStreamEvent::ToolCall { name, input, .. } => Some(format!("\n  → {name} {input}\n")),
        AgentStreamEvent::ToolResult { name, success, .. } => {
            let mark = if *success { "✓" } else { "✗" };
            Some(format!("  {mark} {name}\n"))
        }
        AgentStreamEvent::Done { .. } => Some("\n".into()),
        AgentStreamEvent::Error { message } => Some(format!("\n  [Error] {message}\n")),
        AgentStreamEvent::Aborted { .. } => Some("\n  Aborted.\n".into()),
        _ => None,
    }
}

pub fn format_plan(request: &ConfirmationRequest) -> String {
    let mut out = format!(
        "\n  Confirmation required: {}\n  {} step(s){}:\n",
        request.description,
        request.estimated_impact.steps_affected,
        if request.estimated_impact.is_destructive {
            ", destructive"
        } else {
            ""
        }
    );
    for (i, step) in request.steps.iter().enumerate() {
        out.push_str(&format!("    {}. {} {}\n", i + 1, step.tool, step.args));
    }
    out
}

/// Tools that already ran when a run stopped early.
pub fn format_dispatched(execution: &AgentExecution) -> String {
    let mut out = format!("  {} action(s) ran before the run stopped:\n", execution.steps.len());
    for step in &execution.steps {
        let mark = if step.succeeded() { "✓" } else { "✗" };
        out.push_str(&format!("    {mark} {} {}\n", step.tool, step.args));
    }
    out
}

/// `y` or `yes`, any case. Anything else declines.
pub fn parse_approval(line: &str) -> bool {
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

async fn prompt_approval() -> Result<bool, std::io::Error> {
    eprint!("  Proceed? [y/N] ");
    std::io::stderr().flush()?;
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    Ok(lines.next_line().await?.is_some_and(|line| parse_approval(&line)))
}

fn print_missing_key_help(provider: &str) {
    eprintln!();
    eprintln!("  ERROR: No API key configured for '{provider}'!");
    eprintln!();
    eprintln!("  Set one of these environment variables:");
    eprintln!("    OPENROUTER_API_KEY=sk-or-v1-...   (recommended)");
    eprintln!("    ANTHROPIC_API_KEY=sk-ant-...");
    eprintln!("    OPENAI_API_KEY=sk-...");
    eprintln!("    GEMINI_API_KEY=...");
    eprintln!("    TOOLGATE_API_KEY=...              (any provider)");
    eprintln!();
    eprintln!("  Or add it to your config file:");
    eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
    eprintln!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use toolgate_agent::{EstimatedImpact, PlanStep, StepStatus};

    #[test]
    fn approval_answers() {
        assert!(parse_approval("y"));
        assert!(parse_approval(" YES \n"));
        assert!(!parse_approval(""));
        assert!(!parse_approval("no"));
        assert!(!parse_approval("yep"));
    }

    #[test]
    fn quiet_events_render_nothing() {
        assert!(render_event(&AgentStreamEvent::Thinking { active: true, step: None }).is_none());
        assert!(render_event(&AgentStreamEvent::Thinking { active: false, step: None }).is_none());
        assert!(render_event(&AgentStreamEvent::Reasoning {
            content: "hmm".into(),
            title: None
        })
        .is_none());
    }

    #[test]
    fn tool_events_render_marks() {
        let ok = render_event(&AgentStreamEvent::ToolResult {
            id: "c".into(),
            name: "pinChat".into(),
            output: "{}".into(),
            success: true,
        })
        .unwrap();
        assert_eq!(ok, "  ✓ pinChat\n");
        let call = render_event(&AgentStreamEvent::ToolCall {
            id: "c".into(),
            name: "pinChat".into(),
            input: json!({"chatId": "1"}),
        })
        .unwrap();
        assert!(call.contains(r#"pinChat {"chatId":"1"}"#));
    }

    #[test]
    fn plan_lists_every_step() {
        let step = |tool: &str, id: &str| PlanStep {
            id: id.into(),
            tool: tool.into(),
            description: format!("Execute {tool}"),
            args: json!({"chatId": id}),
            status: StepStatus::Pending,
            result: None,
        };
        let request = ConfirmationRequest {
            plan_id: "p".into(),
            description: "Delete and pin".into(),
            steps: vec![step("deleteChat", "1"), step("pinChat", "2")],
            estimated_impact: EstimatedImpact {
                steps_affected: 2,
                is_destructive: true,
            },
        };
        let text = format_plan(&request);
        assert!(text.contains("Confirmation required: Delete and pin"));
        assert!(text.contains("2 step(s), destructive"));
        assert!(text.contains(r#"1. deleteChat {"chatId":"1"}"#));
        assert!(text.contains("2. pinChat"));
    }
}
