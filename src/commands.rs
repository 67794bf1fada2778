use anyhow::{Context, Result};
use console::style;
use std::net::SocketAddr;
use std::path::Path;
use tracing::{error, info};

use crate::app::App;
use crate::config::Config;
use crate::database::{Database, LanceVectorIndex, VectorIndex};
use crate::embeddings::OllamaClient;
use crate::ingest::{export_snapshot, import_snapshot, spawn_scheduler};
use crate::rag::RagQuery;
use crate::server;

/// Print the effective configuration
#[inline]
pub fn show_config(config: &Config) -> Result<()> {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Embedding (Ollama):").bold().yellow());
    match config.embedding.ollama_url() {
        Ok(url) => eprintln!("  URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  URL: {} ({})", style("Invalid").red(), e),
    }
    eprintln!("  Model: {}", style(&config.embedding.model).cyan());
    eprintln!("  Dimension: {}", style(config.embedding.dimension).cyan());
    eprintln!("  Normalize: {}", style(config.embedding.normalize).cyan());
    eprintln!("  Batch Size: {}", style(config.embedding.batch_size).cyan());

    eprintln!();
    eprintln!("{}", style("Vector Store:").bold().yellow());
    eprintln!("  Collection: {}", style(&config.vector_store.collection).cyan());
    eprintln!("  Metric: {}", style(config.vector_store.metric).cyan());
    eprintln!(
        "  Path: {}",
        style(config.vector_database_path().display()).dim()
    );

    eprintln!();
    eprintln!("{}", style("Generation (Gemini):").bold().yellow());
    eprintln!("  Base URL: {}", style(&config.generation.base_url).cyan());
    eprintln!("  Model: {}", style(&config.generation.model).cyan());
    let key_status = if config.generation.resolved_api_key().is_some() {
        style("set").green()
    } else {
        style("missing").red()
    };
    eprintln!("  API Key: {}", key_status);

    eprintln!();
    eprintln!("{}", style("Retrieval:").bold().yellow());
    eprintln!("  Default top_k: {}", style(config.retrieval.default_top_k).cyan());
    eprintln!("  Max top_k: {}", style(config.retrieval.max_top_k).cyan());
    eprintln!(
        "  Context Budget: {} chars",
        style(config.retrieval.max_context_chars).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Feed:").bold().yellow());
    match &config.feed.source {
        Some(source) => eprintln!("  Source: {}", style(source).cyan()),
        None => eprintln!("  Source: {}", style("not configured").red()),
    }
    eprintln!("  Batch Size: {}", style(config.ingest.batch_size).cyan());
    if config.ingest.interval_secs > 0 {
        eprintln!(
            "  Schedule: every {}s while serving",
            style(config.ingest.interval_secs).cyan()
        );
    }

    eprintln!();
    eprintln!(
        "{}",
        style(format!(
            "Server: http://{}:{}",
            config.server.host, config.server.port
        ))
        .bold()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

/// Write the current configuration to disk so it can be edited
#[inline]
pub fn write_config(config: &Config) -> Result<()> {
    config.save().context("Failed to save configuration")?;
    eprintln!(
        "{} {}",
        style("✅ Configuration written to").green(),
        style(config.config_file_path().display()).dim()
    );
    Ok(())
}

/// Run one ingestion pass over the configured feed
#[inline]
pub async fn ingest(app: &App, snapshot: Option<&Path>) -> Result<()> {
    let ingestor = app.ingestor().context("Failed to set up ingestion")?;

    let report = match snapshot {
        Some(path) => ingestor.run_with_snapshot(path).await,
        None => ingestor.run().await,
    }
    .context("Ingestion failed")?;

    println!("Ingestion complete:");
    println!("  Fetched:  {}", report.fetched);
    println!("  Embedded: {}", report.embedded);
    println!("  Skipped:  {}", report.skipped);
    println!("  Upserted: {}", report.upserted);
    if let Some(path) = snapshot {
        println!("  Snapshot: {}", path.display());
    }
    Ok(())
}

/// Answer a question from the command line
#[inline]
pub async fn ask(app: &App, question: String, top_k: Option<usize>) -> Result<()> {
    let orchestrator = app.orchestrator().context("Failed to set up generation")?;
    let answer = orchestrator
        .answer(&RagQuery { question, top_k })
        .await
        .context("Failed to answer question")?;

    println!("{}", answer.text);
    if !answer.used_context.is_empty() {
        println!();
        println!("{}", style("Sources:").bold());
        for (i, doc) in answer.used_context.iter().enumerate() {
            println!("  [{}] {} {}", i + 1, doc.title, style(&doc.link).dim());
        }
    }
    Ok(())
}

/// Print the articles most similar to a query
#[inline]
pub async fn retrieve(app: &App, query: String, top_k: Option<usize>) -> Result<()> {
    let orchestrator = app.orchestrator().context("Failed to set up retrieval")?;
    let results = orchestrator
        .retrieve(&RagQuery {
            question: query,
            top_k,
        })
        .await
        .context("Failed to retrieve articles")?;

    if results.is_empty() {
        println!("No articles found. Run 'news-rag ingest' first.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. {} {}",
            i + 1,
            style(&result.document.title).bold(),
            style(format!("({:.3})", result.score)).dim()
        );
        println!("   {}", result.document.link);
    }
    Ok(())
}

/// Write the whole collection to a snapshot file
#[inline]
pub async fn export(app: &App, path: &Path) -> Result<()> {
    let count = export_snapshot(
        app.index().as_ref(),
        &app.config().vector_store.collection,
        path,
    )
    .await
    .context("Failed to export snapshot")?;

    println!("Exported {} articles to {}", count, path.display());
    Ok(())
}

/// Load a snapshot file without re-embedding
#[inline]
pub async fn import(app: &App, path: &Path) -> Result<()> {
    let report = import_snapshot(
        app.index().as_ref(),
        &app.config().vector_store.collection,
        path,
        app.config().ingest.batch_size,
    )
    .await
    .context("Failed to import snapshot")?;

    println!("Imported {} of {} records", report.upserted, report.read);
    if report.skipped > 0 {
        println!("  Skipped {} invalid records", report.skipped);
    }
    Ok(())
}

/// Start the HTTP API, plus scheduled ingestion when configured
#[inline]
pub async fn serve(app: &App) -> Result<()> {
    let config = app.config();
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let state = app
        .server_state(app.generator().context("Failed to set up generation")?)
        .context("Failed to set up server")?;

    let scheduler = match (&state.ingestor, config.ingest.interval_secs) {
        (Some(ingestor), secs) if secs > 0 => Some(spawn_scheduler(
            std::sync::Arc::clone(ingestor),
            std::time::Duration::from_secs(secs),
        )),
        _ => None,
    };

    let result = server::serve(state, addr, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Shutdown signal received");
    })
    .await;

    if let Some(handle) = scheduler {
        handle.abort();
    }
    result
}

/// Report connectivity and collection statistics
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    println!("📊 news-rag Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🗄️  Database Status:");
    let database = match Database::new(config.database_path()).await {
        Ok(db) => {
            println!("   ✅ SQLite: Connected");
            Some(db)
        }
        Err(e) => {
            println!("   ❌ SQLite: Failed to connect - {}", e);
            None
        }
    };

    println!("🤖 Ollama Status:");
    match OllamaClient::new(&config.embedding) {
        Ok(client) => {
            match tokio::task::spawn_blocking(move || client.health_check()).await? {
                Ok(()) => {
                    println!(
                        "   ✅ Ollama: Connected ({}:{})",
                        config.embedding.host, config.embedding.port
                    );
                    println!("   📋 Model: {}", config.embedding.model);
                }
                Err(e) => println!("   ⚠️  Ollama: Unhealthy - {}", e),
            }
        }
        Err(e) => println!("   ❌ Ollama: Invalid configuration - {}", e),
    }

    let Some(database) = database else {
        return Ok(());
    };

    println!("🔍 Vector Database Status:");
    match LanceVectorIndex::from_config(config, database.clone()).await {
        Ok(index) => {
            println!("   ✅ LanceDB: Connected");
            let name = &config.vector_store.collection;
            match index.collection(name).await {
                Ok(Some(collection)) => {
                    println!(
                        "   📚 Collection '{}': {} dimensions, {} metric",
                        name, collection.dimension, collection.metric
                    );
                    match index.count(name).await {
                        Ok(count) => println!("   📰 Articles: {}", count),
                        Err(e) => println!("   ⚠️  Articles: Unknown - {}", e),
                    }
                }
                Ok(None) => println!("   💤 Collection '{}' not created yet", name),
                Err(e) => println!("   ⚠️  Collection: Unknown - {}", e),
            }
        }
        Err(e) => println!("   ❌ LanceDB: Failed to connect - {}", e),
    }

    println!();
    println!("🔄 Recent Ingestion Runs:");
    match database.recent_ingest_runs(5).await {
        Ok(runs) if runs.is_empty() => println!("   No runs recorded yet"),
        Ok(runs) => {
            for run in runs {
                let duration = run
                    .duration()
                    .map(|d| format!(" in {}s", d.num_seconds()))
                    .unwrap_or_default();
                println!(
                    "   #{} {} {} (fetched {}, upserted {}, skipped {}){}",
                    run.id,
                    run.started_date.format("%Y-%m-%d %H:%M:%S"),
                    run.status,
                    run.fetched,
                    run.upserted,
                    run.skipped,
                    duration
                );
                if let Some(message) = &run.error_message {
                    println!("      ⚠️  {}", message);
                }
            }
        }
        Err(e) => println!("   ⚠️  History unavailable - {}", e),
    }

    database.close().await;
    Ok(())
}
