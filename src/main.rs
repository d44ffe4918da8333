mod ai;
mod api;
mod cli;
mod config;
mod export;
mod loading;
mod report;
mod topic;
mod workflow;

use crate::ai::gemini::GeminiClient;
use crate::ai::prompt::ReportRequest;
use crate::ai::{ReportBackend, ReportFetcher};
use crate::cli::session::Session;
use crate::cli::{AiCommands, Cli, Commands, ConfigCommands};
use crate::config::Config;
use crate::export::Rasterizer;
use crate::export::browserless::BrowserlessRasterizer;
use crate::topic::Topic;
use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Topics => {
            handle_topics();
            Ok(())
        }
        Commands::Generate {
            topics,
            export,
            raw,
        } => handle_generate(topics, export, raw).await,
        Commands::Dashboard => handle_dashboard().await,
        Commands::Config { command } => handle_config_command(command),
        Commands::Doctor => handle_doctor(),
        Commands::Ai { command } => handle_ai_command(command).await,
    }
}

fn handle_topics() {
    for topic in Topic::ALL {
        println!(
            "{:<14} {}  ({})",
            topic.slug(),
            topic.label(),
            topic.english_name()
        );
    }
}

async fn handle_generate(raw_topics: Vec<String>, export: bool, raw: bool) -> Result<()> {
    let config = Config::load_or_default()?;
    let topics = raw_topics
        .iter()
        .map(|raw| raw.parse::<Topic>())
        .collect::<Result<Vec<_>>>()?;

    let fetcher = build_fetcher(&config)?;
    let rasterizer = BrowserlessRasterizer::from_config(&config)?;
    let session = Session::new(&config, fetcher, &rasterizer);

    if topics.is_empty() {
        session.run_interactive().await
    } else {
        session.run_once(&topics, export, raw).await
    }
}

async fn handle_dashboard() -> Result<()> {
    let config = Arc::new(Config::load_or_default()?);
    let fetcher = build_fetcher(&config)?;
    let rasterizer: Arc<dyn Rasterizer> = Arc::new(BrowserlessRasterizer::from_config(&config)?);

    println!("Dashboard URL: http://127.0.0.1:{}", config.api_port);

    tokio::select! {
        api_result = api::run_server(Arc::clone(&config), fetcher, rasterizer) => {
            api_result?;
        }
        _ = signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    Ok(())
}

fn handle_config_command(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Set { key, value } => {
            let mut config = Config::load_or_default()?;
            config.set_value(&key, &value)?;
            config.save()?;

            println!("Config saved: {key} = {value}");
            Ok(())
        }
        ConfigCommands::Get { key } => {
            let config = Config::load_or_default()?;
            let value = config
                .get_value(&key)
                .with_context(|| format!("Unsupported config key: {key}"))?;

            println!("{value}");
            Ok(())
        }
    }
}

fn handle_doctor() -> Result<()> {
    let config_path = Config::config_path()?;
    let mut issues = Vec::new();

    if config_path.exists() {
        println!("[OK] config.json found: {}", config_path.display());
    } else {
        println!(
            "[OK] config.json not found, using defaults: {}",
            config_path.display()
        );
    }

    let config = Config::load_or_default()?;

    if ai::has_api_key() {
        println!("[OK] AI API key is set in the environment");
    } else {
        println!(
            "[WARN] AI API key missing: export {} or {}",
            ai::API_KEY_ENV,
            ai::FALLBACK_API_KEY_ENV
        );
        issues.push("ai api key missing".to_string());
    }

    match Url::parse(&config.ai_api_base_url) {
        Ok(_) => println!("[OK] AI base URL: {}", config.ai_api_base_url),
        Err(error) => {
            println!("[WARN] invalid AI base URL: {error}");
            issues.push("invalid ai base url".to_string());
        }
    }

    match config.ensure_export_dir() {
        Ok(()) => println!("[OK] export dir ready: {}", config.export_dir.display()),
        Err(error) => {
            println!("[WARN] export dir unavailable: {error:#}");
            issues.push("export dir unavailable".to_string());
        }
    }

    match Url::parse(&config.browserless_url) {
        Ok(_) => println!(
            "[OK] Browserless URL (used for image export): {}",
            config.browserless_url
        ),
        Err(error) => {
            println!("[WARN] invalid Browserless URL: {error}");
            issues.push("invalid browserless url".to_string());
        }
    }

    if issues.is_empty() {
        println!("doctor result: no issues");
    } else {
        println!("doctor result: {} warning(s)", issues.len());
    }

    Ok(())
}

async fn handle_ai_command(command: AiCommands) -> Result<()> {
    match command {
        AiCommands::Test { base_url, model } => {
            let mut config = Config::load_or_default()?;

            if let Some(value) = base_url {
                config.set_value("ai.base_url", &value)?;
            }
            if let Some(value) = model {
                config.set_value("ai.model", &value)?;
            }

            let client = GeminiClient::from_config(&config)?;
            let response = client
                .generate(&ReportRequest {
                    prompt: "Health check for zhaowen.".to_string(),
                    system_instruction:
                        "Return exactly one short sentence in Chinese indicating AI API connectivity is healthy."
                            .to_string(),
                    search_grounding: false,
                })
                .await?;

            println!("AI API connection successful");
            println!("{}", response.text.unwrap_or_default());

            Ok(())
        }
    }
}

fn build_fetcher(config: &Config) -> Result<ReportFetcher> {
    let client = GeminiClient::from_config(config)?;
    info!(model = %config.ai_model, "AI backend configured");
    Ok(ReportFetcher::new(Arc::new(client)))
}
