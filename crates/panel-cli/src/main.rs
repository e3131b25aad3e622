use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod render;

use config::PanelConfig;
use panel_core::present::FieldOptions;
use panel_core::{
    ComparisonBackend, ComparisonOrchestrator, HealthIndicator, HealthMonitor, HttpBackend,
};
use render::CardOptions;

#[derive(Parser)]
#[command(name = "panel")]
#[command(version)]
#[command(about = "Ask several LLMs the same question and compare their answers")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one prompt to several providers and print every answer
    Compare {
        /// The prompt to send
        prompt: String,

        /// Provider id to include (repeatable); defaults to all available
        #[arg(short = 'm', long = "model")]
        models: Vec<String>,

        /// Hide token, rate-limit and model details
        #[arg(long)]
        no_metadata: bool,

        /// Print the final results as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the provider ids the backend offers by default
    Models,

    /// Probe the backend once; exits non-zero when unreachable
    Health,

    /// Monitor backend reachability until Ctrl-C
    Watch {
        /// Show the full indicator message instead of the badge
        #[arg(long)]
        expand: bool,
    },

    /// Initialize config directory and default config
    Init,

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over the --debug default
    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config).await,
        Commands::Models => cmd_models(&cli.config).await,
        Commands::Health => cmd_health(&cli.config).await,
        Commands::Watch { expand } => cmd_watch(&cli.config, expand).await,
        Commands::Compare {
            prompt,
            models,
            no_metadata,
            json,
        } => cmd_compare(&cli.config, &prompt, &models, no_metadata, json).await,
    }
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        let default_config = include_str!("../../../config/default.toml");
        tokio::fs::write(&config_path, default_config).await?;
        info!("Created default config at {}", config_path.display());
    }

    println!("panel initialized at {}", config_dir.display());
    println!("Edit {} to point at your comparison service.", config_path.display());
    Ok(())
}

async fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = PanelConfig::load(config_path)?;
    println!("{}", toml::to_string_pretty(&cfg)?);
    Ok(())
}

fn build_backend(cfg: &PanelConfig) -> Result<Arc<HttpBackend>> {
    let backend = HttpBackend::new(&cfg.backend.base_url)
        .with_context(|| format!("Cannot use backend at {}", cfg.backend.base_url))?;
    debug!("Using backend {}", backend.base_url());
    Ok(Arc::new(backend))
}

async fn cmd_models(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = PanelConfig::load(config_path)?;
    let backend = build_backend(&cfg)?;

    let providers = tokio::time::timeout(cfg.available_timeout(), backend.available_providers())
        .await
        .context("Timed out listing providers")?
        .context("Failed to list providers")?;

    if providers.is_empty() {
        println!("The backend offers no providers.");
    }
    for id in providers {
        println!("{}", id);
    }
    Ok(())
}

async fn cmd_health(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = PanelConfig::load(config_path)?;
    let monitor = HealthMonitor::new(build_backend(&cfg)?, cfg.health_config());
    let handle = monitor.handle();

    monitor.poll_once().await;
    let state = handle.current();
    println!("{}", render::health_line(&state));

    if state.is_unhealthy() {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_watch(config_path: &Option<PathBuf>, expand: bool) -> Result<()> {
    let cfg = PanelConfig::load(config_path)?;
    let monitor = HealthMonitor::new(build_backend(&cfg)?, cfg.health_config());
    let mut handle = monitor.handle();

    let mut indicator = HealthIndicator::default();
    let cancel = CancellationToken::new();
    let task = monitor.spawn(cancel.clone());
    info!("Watching backend health (Ctrl-C to stop)");

    let mut last = None;
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Received Ctrl-C, stopping");
                break;
            }
            state = handle.changed() => {
                let Some(state) = state else { break };
                if last == Some(state.reachability) {
                    continue;
                }
                last = Some(state.reachability);

                indicator.observe(&state);
                if expand && state.is_unhealthy() {
                    indicator.hover_enter();
                }
                match render::indicator(indicator.view(&state)) {
                    Some(badge) => println!("{} {}", render::health_line(&state), badge),
                    None => println!("{}", render::health_line(&state)),
                }
            }
        }
    }

    cancel.cancel();
    task.await.context("Health monitor task failed")?;
    Ok(())
}

async fn cmd_compare(
    config_path: &Option<PathBuf>,
    prompt: &str,
    models: &[String],
    no_metadata: bool,
    json: bool,
) -> Result<()> {
    let cfg = PanelConfig::load(config_path)?;
    let backend = build_backend(&cfg)?;

    // Health is tracked alongside the run, never in its way
    let cancel = CancellationToken::new();
    let monitor = HealthMonitor::new(backend.clone(), cfg.health_config());
    let health = monitor.handle();
    let monitor_task = monitor.spawn(cancel.clone());

    let orchestrator = ComparisonOrchestrator::new(backend, cfg.orchestrator_config());
    let started = tokio::time::timeout(cfg.available_timeout(), orchestrator.compare(prompt, models))
        .await
        .context("Timed out resolving the provider set")?;
    let mut run = match started {
        Ok(run) => run,
        Err(e) => {
            cancel.cancel();
            bail!("Comparison not started: {}", e);
        }
    };

    info!("Waiting on {} providers", run.len());
    while let Some((index, entry)) = run.next_settled().await {
        match entry.error_message() {
            Some(err) => warn!("[{}] {} failed: {}", index + 1, entry.provider_id, err),
            None => info!("[{}] {} answered", index + 1, entry.provider_id),
        }
    }
    let results = run.snapshot();

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        let opts = CardOptions {
            show_metadata: cfg.display.show_metadata && !no_metadata,
            fields: FieldOptions {
                show_zero_remaining: cfg.display.show_zero_remaining,
            },
        };
        for result in &results {
            println!("{}", render::card(result, opts));
        }
    }

    let state = health.current();
    if state.is_unhealthy() {
        let mut indicator = HealthIndicator::default();
        indicator.hover_enter();
        if let Some(badge) = render::indicator(indicator.view(&state)) {
            eprintln!("{}", badge);
        }
    }

    cancel.cancel();
    if let Err(e) = monitor_task.await {
        debug!("Health monitor ended abnormally: {}", e);
    }

    let failed = results.iter().filter(|r| r.is_error()).count();
    if failed == results.len() {
        bail!("All {} providers failed", failed);
    }
    Ok(())
}
