use anyhow::Result;
use appforge_core::config::LlmProvider;
use appforge_core::constants::cli::DEFAULT_REQUEST;
use appforge_core::{ApprovalMatch, Settings};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "appforge")]
#[command(about = "AppForge - a Business Analyst, Software Engineer and Product Owner build a web app for you")]
#[command(version)]
struct Cli {
    /// What to build
    request: Option<String>,

    /// Config file (defaults to ~/.config/appforge/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for index.html and the publish script
    #[arg(short, long)]
    workdir: Option<PathBuf>,

    /// Approval matching: contains, exact, contained-in
    #[arg(long)]
    approval_match: Option<String>,

    /// Maximum automatic turns between two approvals
    #[arg(long)]
    max_turns: Option<usize>,

    /// Do not write or push the artifact
    #[arg(long)]
    no_publish: bool,

    /// Write the artifact but skip the git script
    #[arg(long)]
    no_push: bool,

    /// LLM provider (azure, openai)
    #[arg(long)]
    provider: Option<String>,

    /// Model name for the openai provider
    #[arg(short, long)]
    model: Option<String>,

    /// Log progress at info level
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut settings = match cli.config {
        Some(ref path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };

    if let Some(ref provider) = cli.provider {
        let provider: LlmProvider = provider.parse()?;
        if provider != settings.llm.provider {
            settings.llm.api_key_env = provider.default_api_key_env().to_string();
        }
        settings.llm.provider = provider;
    }
    if let Some(ref model) = cli.model {
        settings.llm.model = Some(model.clone());
    }
    if let Some(ref matching) = cli.approval_match {
        settings.orchestration.approval_match = matching.parse::<ApprovalMatch>()?;
    }
    if let Some(max_turns) = cli.max_turns {
        settings.orchestration.max_turns_per_round = max_turns;
    }
    if let Some(ref workdir) = cli.workdir {
        settings.publish.workdir = Some(workdir.clone());
    }
    if cli.no_publish {
        settings.publish.enabled = false;
    }
    if cli.no_push {
        settings.publish.run_script = false;
    }

    settings.validate()?;

    let request = cli.request.as_deref().unwrap_or(DEFAULT_REQUEST);
    appforge_cli::app::run_request(&settings, request).await?;

    Ok(())
}
