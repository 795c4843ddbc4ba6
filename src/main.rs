mod cli;
mod ui;

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use menulens::analysis::{AnalysisRequest, ContentPart, DietaryPreferences, DietaryType, MenuItem};
use menulens::config::Settings;
use menulens::core::{AlwaysOnline, ConnectivityProbe, HttpConnectivityProbe};
use menulens::llm::{CacheStore, ResultCache, SqliteCacheStore};
use menulens::{Orchestrator, OrchestratorDeps};

use crate::cli::{CacheCommands, Cli, Commands};
use crate::ui::Console;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut settings = Settings::load()?;
    if let Some(provider) = &cli.provider {
        settings.provider = provider.parse().map_err(anyhow::Error::msg)?;
    }
    let console = Console::new();

    match cli.command {
        Commands::Analyze {
            diet,
            restrictions,
            items,
            item_names,
            text,
            images,
            context,
            json,
        } => {
            let dietary_type: DietaryType = diet.parse().map_err(anyhow::Error::msg)?;
            let mut prefs = DietaryPreferences::new(dietary_type);
            if let Some(restrictions) = restrictions {
                prefs = prefs.with_restrictions(restrictions);
            }

            let mut request = build_request(prefs, items.as_deref(), item_names, text, &images)?;
            if let Some(context) = context {
                request = request.with_context(context);
            }
            let multimodal = !images.is_empty();

            let orchestrator = open_orchestrator(settings, cli.no_cache_persist)?;
            let spinner = spinner("Analyzing menu...");
            let response = if multimodal {
                orchestrator.analyze_menu_multimodal(request).await
            } else {
                orchestrator.analyze_menu(request).await
            };
            spinner.finish_and_clear();

            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                console.analysis(&response);
            }
            if cli.verbose {
                console.metrics(&orchestrator.metrics());
            }
            if !response.success {
                std::process::exit(1);
            }
        }
        Commands::Test => {
            let orchestrator = open_orchestrator(settings, true)?;
            console.info(&format!(
                "Testing {} ({} backend)...",
                orchestrator.active_provider().await,
                orchestrator.backend_mode().await
            ));
            let status = orchestrator.test_connection().await;
            console.connection(&status);
            if !status.success {
                std::process::exit(1);
            }
        }
        Commands::Providers => {
            console.list_providers(&settings, settings.provider);
        }
        Commands::Cache { command } => {
            let cache = open_cache(&settings)?;
            match command {
                CacheCommands::Stats => console.cache_stats(&cache.stats().await?),
                CacheCommands::Clear => {
                    let removed = cache.clear().await?;
                    console.success(&format!("Removed {} cached analyses", removed));
                }
                CacheCommands::Purge => {
                    let purged = cache.purge_expired().await?;
                    console.success(&format!("Purged {} expired entries", purged));
                }
            }
        }
        Commands::Config => {
            console.banner();
            console.show_config(&settings);
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "menulens=debug" } else { "menulens=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

fn open_store(settings: &Settings) -> Result<Arc<dyn CacheStore>> {
    let path = settings.cache_path()?;
    let store = SqliteCacheStore::open(&path)
        .with_context(|| format!("Failed to open cache at {}", path.display()))?;
    Ok(Arc::new(store))
}

fn open_cache(settings: &Settings) -> Result<ResultCache> {
    Ok(ResultCache::new(open_store(settings)?, settings.cache_ttl()))
}

fn open_orchestrator(settings: Settings, in_memory: bool) -> Result<Orchestrator> {
    let connectivity: Arc<dyn ConnectivityProbe> = match &settings.connectivity.probe_url {
        Some(url) => Arc::new(HttpConnectivityProbe::new(url.clone(), settings.probe_timeout())?),
        None => Arc::new(AlwaysOnline),
    };

    let mut deps = OrchestratorDeps::in_memory()
        .with_connectivity(connectivity)
        .with_cache_ttl(settings.cache_ttl());
    if !in_memory {
        deps = deps.with_store(open_store(&settings)?);
    }

    Ok(Orchestrator::new(settings, deps)?)
}

fn build_request(
    prefs: DietaryPreferences,
    items_file: Option<&str>,
    item_names: Vec<String>,
    text: Option<String>,
    images: &[String],
) -> Result<AnalysisRequest> {
    if !images.is_empty() || (text.is_some() && items_file.is_none() && item_names.is_empty()) {
        let mut parts = Vec::new();
        if let Some(text) = text {
            parts.push(ContentPart::text(text));
        }
        for image in images {
            parts.push(read_image(Path::new(image))?);
        }
        return Ok(AnalysisRequest::multimodal(prefs, parts));
    }

    let mut items: Vec<MenuItem> = match items_file {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read menu items from {}", path))?;
            serde_json::from_str(&raw).context("Menu items file must be a JSON array of items")?
        }
        None => Vec::new(),
    };
    items.extend(item_names.into_iter().map(|name| MenuItem::new("", name)));

    if items.is_empty() {
        bail!("Nothing to analyze: pass --items, --item, --text or --image");
    }
    for (i, item) in items.iter_mut().enumerate() {
        if item.id.trim().is_empty() {
            item.id = format!("item-{}", i + 1);
        }
    }

    Ok(AnalysisRequest::for_items(prefs, items))
}

fn read_image(path: &Path) -> Result<ContentPart> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    let mime_type = match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "heic" => "image/heic",
        other => bail!("Unsupported image type: {}", other),
    };

    let data = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(ContentPart::image(mime_type, data))
}
