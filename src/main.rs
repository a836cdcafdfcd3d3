use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use techcode::api::ApiClient;
use techcode::app::App;
use techcode::config::Config;
use techcode::logging;

#[derive(Parser)]
#[command(name = "techcode")]
#[command(about = "TechCode - describe a website and watch it being built", long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.techcode/config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Model provider: gemini or openai
    #[arg(long)]
    provider: Option<String>,

    /// Model name
    #[arg(long)]
    model: Option<String>,

    /// API endpoint to connect to
    #[arg(long)]
    endpoint: Option<String>,

    /// Ground builds with a web search
    #[arg(long)]
    search: bool,

    /// Build this description once, export it and exit
    #[arg(short, long)]
    prompt: Option<String>,

    /// Enable debug mode
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match logging::init(cli.debug) {
        Ok(path) if cli.debug => eprintln!("Logging to {}", path.display()),
        Ok(_) => {}
        Err(e) => eprintln!("Logging disabled: {:#}", e),
    }

    let mut config = match &cli.config {
        Some(path) => Config::load_or_default_from(path)?,
        None => Config::load_or_default()?,
    };
    if let Some(provider) = &cli.provider {
        config.ai.set_provider(provider);
    }
    if let Some(model) = cli.model {
        config.ai.model = model;
    }
    if let Some(endpoint) = cli.endpoint {
        config.ai.api_url = endpoint;
    }
    if cli.search {
        config.session.search_enabled = true;
    }

    let api = ApiClient::from_config(&config.ai).context("configuring the model client")?;
    tracing::info!(provider = %config.ai.provider, model = api.model(), "starting");

    let mut app = App::new(config, Arc::new(api));
    match cli.prompt {
        Some(prompt) => {
            if app.run_once(&prompt).await?.is_none() {
                std::process::exit(1);
            }
        }
        None => app.run_repl().await?,
    }
    Ok(())
}
