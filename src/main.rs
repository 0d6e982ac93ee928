use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use content_digest::ai::Summarizer;
use content_digest::db::Repository;
use content_digest::models::{ItemStatus, NewApiKey};
use content_digest::pipeline::process_item;
use content_digest::services::{classify_url, ContentExtractor, Extractor};
use content_digest::{build_router, AppState, Config};

#[derive(Debug, Parser)]
#[command(name = "content-digest", version, about)]
struct Args {
    /// Config file to use instead of the default location
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Address to listen on, e.g. 0.0.0.0:3000
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,

    /// Bearer token required for submissions and settings changes
    #[arg(long, env = "CONTENT_DIGEST_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    /// Summarize one URL, print the result and exit
    #[arg(long, value_name = "URL")]
    summarize: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(Config::config_path);
    let mut config = Config::load_from(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(token) = args.api_token {
        config.api_token = Some(token);
    }

    let repository = Repository::new(&config.db_path)
        .await
        .with_context(|| format!("opening database {}", config.db_path))?;

    let seeds: Vec<NewApiKey> = config.seed_api_keys.iter().cloned().map(Into::into).collect();
    let seeded = repository.seed_api_keys(seeds).await?;
    if seeded > 0 {
        tracing::info!("Seeded {} API keys from config", seeded);
    }

    let extractor: Arc<dyn Extractor> = Arc::new(ContentExtractor::new(&config.extraction)?);
    let summarizer = Arc::new(Summarizer::new(repository.clone(), &config)?);

    if let Some(url) = args.summarize {
        return summarize_once(&repository, extractor.as_ref(), &summarizer, &url).await;
    }

    if config.api_token.is_none() {
        tracing::warn!("No API token configured; submissions and settings changes are disabled");
    }

    let state = AppState::new(
        repository,
        extractor,
        summarizer,
        config.api_token.clone(),
    )
    .with_processing(config.process_on_submit);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn summarize_once(
    repository: &Repository,
    extractor: &dyn Extractor,
    summarizer: &Summarizer,
    url: &str,
) -> anyhow::Result<()> {
    let (_, content_type) = classify_url(url)?;
    let id = repository
        .insert_pending_item(url.trim().to_string(), content_type)
        .await?;

    let status = process_item(repository, extractor, summarizer, id).await?;
    let item = repository
        .get_item(id)
        .await?
        .context("content item disappeared while processing")?;

    if status == ItemStatus::Failed {
        let error = item
            .metadata
            .get("error")
            .and_then(|e| e.as_str())
            .unwrap_or("unknown error");
        anyhow::bail!("could not summarize {}: {}", url, error);
    }

    println!("# {}\n", item.title.as_deref().unwrap_or("Untitled"));
    println!("{}", item.summary.as_deref().unwrap_or_default());
    Ok(())
}
