//! Toolgate CLI.
//!
//! Commands:
//! - `run`     — Run the agent on one message
//! - `bridge`  — Serve the tool registry over WebSocket or stdio
//! - `tools`   — List the tools a mode exposes
//! - `config`  — Show or initialize the configuration

use clap::{Parser, Subcommand};
use toolgate_core::AgentMode;

mod commands;

#[derive(Parser)]
#[command(
    name = "toolgate",
    about = "Toolgate — streaming tool-calling agent with a destructive-action gate",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent on a single message
    Run {
        /// The user message
        message: String,

        /// Agent mode: ask, plan or agent
        #[arg(long)]
        mode: Option<AgentMode>,

        /// Override the provider (openrouter, openai, anthropic, gemini)
        #[arg(long)]
        provider: Option<String>,

        /// Override the model
        #[arg(long)]
        model: Option<String>,

        /// Approve confirmation requests without asking
        #[arg(short, long)]
        yes: bool,
    },

    /// Serve the tool registry to external clients
    Bridge {
        /// Serve line-delimited JSON on stdin/stdout instead of WebSocket
        #[arg(long)]
        stdio: bool,

        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List tools visible in a mode
    Tools {
        #[arg(long, default_value = "agent")]
        mode: AgentMode,
    },

    /// Show the effective configuration
    Config {
        /// Write the default config file
        #[arg(long)]
        init: bool,

        /// Overwrite an existing file with --init
        #[arg(long, requires = "init")]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // stdout carries answers and the stdio bridge; logs go to stderr
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }

    match cli.command {
        Commands::Run {
            message,
            mode,
            provider,
            model,
            yes,
        } => {
            commands::run::run(commands::run::RunArgs {
                message,
                mode,
                provider,
                model,
                yes,
            })
            .await?
        }
        Commands::Bridge { stdio, port } => commands::bridge::run(stdio, port).await?,
        Commands::Tools { mode } => commands::tools::run(mode)?,
        Commands::Config { init, force } => commands::config_cmd::run(init, force)?,
    }

    Ok(())
}
