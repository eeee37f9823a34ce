//! Console for the toolgate runtime: list, search and call tools from a shell.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;
use toolgate::Runtime;
use toolgate::config::ConfigLoader;
use toolgate::kernel::ToolCall;
use toolgate::policy::TerminalApprover;
use toolgate::primitives::{ExecutionContext, PolicyMode};
use toolgate::telemetry::init_tracing;
use tracing::info;

#[derive(Parser)]
#[command(name = "tool-console")]
#[command(about = "List, search and call toolgate tools", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured permission mode (auto, prompt or deny)
    #[arg(short, long)]
    mode: Option<PolicyMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the tools that would be advertised to the assistant
    List,
    /// Rank tools by keyword matches
    Search {
        /// Space-separated keywords
        query: String,
    },
    /// Run one tool call
    Call {
        /// Tool name
        name: String,
        /// Arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        args: String,
        /// Call id echoed in the result
        #[arg(long)]
        id: Option<String>,
    },
    /// Show which sources registered and which failed
    Sources,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("warn");
    let cli = Cli::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_file(path);
    }
    let mut config = loader.load().context("failed to load configuration")?;
    if let Some(mode) = cli.mode {
        config.permission_mode = mode;
    }

    let runtime = Runtime::start(&config, Arc::new(TerminalApprover::stdio()))
        .await
        .context("failed to start the tool runtime")?;
    let orchestrator = runtime.orchestrator();
    let context = ExecutionContext::new();

    match cli.command {
        Commands::List => {
            for descriptor in orchestrator.get_available_tools(&context) {
                println!(
                    "{:<24} {:<10} {:<10} {}",
                    descriptor.name(),
                    descriptor.permission_level(),
                    descriptor.source_type(),
                    descriptor.description()
                );
            }
        }
        Commands::Search { query } => {
            for hit in orchestrator.registry().search(&query) {
                println!("{:>3}  {:<24} {}", hit.score, hit.descriptor.name(), hit.descriptor.description());
            }
        }
        Commands::Call { name, args, id } => {
            let arguments = match serde_json::from_str::<Value>(&args).context("--args is not valid JSON")? {
                Value::Object(arguments) => arguments,
                other => bail!("--args must be a JSON object, got {other}"),
            };
            let mut call = ToolCall::new(name, arguments);
            if let Some(id) = id {
                call = call.with_id(id);
            }
            let result = orchestrator.execute_tool(call, &context).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            info!(stats = ?orchestrator.stats(), "call finished");
        }
        Commands::Sources => {
            println!("{}", serde_json::to_string_pretty(runtime.report())?);
        }
    }

    Ok(())
}
