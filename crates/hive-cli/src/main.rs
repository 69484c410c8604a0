//! The `hive` binary: loads a workflow spec, wires up the orchestrator, and
//! maps the run outcome to a process exit code.

use clap::Parser;
use hive_agent::{BackendFactory, HttpBackend, LlmBackend, LlmProvider, ModelConfig};
use hive_core::{HiveResult, RunContext, WorkflowSpec};
use hive_orchestrator::{Orchestrator, OrchestratorConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hive", version, about = "Drive a swarm of LLM-backed agents through a declared workflow")]
struct Cli {
    /// Workflow spec file (TOML by default, JSON by extension)
    workflow: PathBuf,

    /// Directory the swarm writes the project into
    #[arg(long, default_value = "./hive-project")]
    project_root: PathBuf,

    /// Requirements file injected into every agent prompt
    #[arg(long)]
    requirements: Option<PathBuf>,

    /// Maximum agents admitted to one wave
    #[arg(long, default_value_t = 3)]
    max_parallel: usize,

    /// Resume from <project_root>/checkpoint.json
    #[arg(long)]
    resume: bool,

    /// LLM provider: claude or openai
    #[arg(long, default_value = "claude")]
    provider: String,

    /// Model id (provider default when omitted)
    #[arg(long)]
    model: Option<String>,

    /// API key
    #[arg(long, env = "HIVE_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Outbound LLM request budget per minute, shared by all sessions
    #[arg(long, default_value_t = 20.0)]
    requests_per_min: f64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("hive: {e}");
            std::process::exit(2);
        }
    }
}

async fn run(cli: Cli) -> HiveResult<i32> {
    let spec = WorkflowSpec::load(&cli.workflow)?;
    info!(workflow = %cli.workflow.display(), agents = spec.tasks.len(), "Workflow loaded");

    let requirements = match &cli.requirements {
        Some(path) => std::fs::read_to_string(path)?,
        None => String::new(),
    };
    let run_ctx = RunContext::new(&cli.project_root, requirements);

    let provider = match cli.provider.as_str() {
        "openai" => LlmProvider::OpenAi,
        _ => LlmProvider::Claude,
    };
    let model = ModelConfig {
        provider,
        model_id: cli.model.clone().unwrap_or_else(|| default_model(provider)),
        api_key: cli.api_key.clone(),
        api_base_url: None,
        temperature: 0.7,
        max_tokens: 4096,
    };
    let factory: BackendFactory = Arc::new(move |_task| {
        Box::new(HttpBackend::new(model.clone())) as Box<dyn LlmBackend>
    });

    let config = OrchestratorConfig {
        max_parallel: cli.max_parallel,
        requests_per_min: cli.requests_per_min,
        ..OrchestratorConfig::default()
    };
    let orchestrator = Orchestrator::new(&spec, run_ctx, factory, config)?;

    // Ctrl-C stops admitting waves, grants running sessions the grace
    // period, then kills them; locks release on cascade.
    let cancel = orchestrator.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    if cli.resume {
        let checkpoint = cli.project_root.join("checkpoint.json");
        orchestrator.resume_from(&checkpoint).await?;
    }

    let report = orchestrator.run().await?;
    Ok(report.exit_code())
}

fn default_model(provider: LlmProvider) -> String {
    match provider {
        LlmProvider::Claude => "claude-sonnet-4-5".to_string(),
        LlmProvider::OpenAi => "gpt-4o".to_string(),
    }
}
