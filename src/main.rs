use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use news_rag::app::App;
use news_rag::commands::{
    ask, export, import, ingest, retrieve, serve, show_config, show_status, write_config,
};
use news_rag::config::load_config;

#[derive(Parser)]
#[command(name = "news-rag")]
#[command(about = "Retrieval-augmented question answering over news articles")]
#[command(version)]
struct Cli {
    /// Data directory (defaults to $NEWS_RAG_HOME or ~/.news-rag)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or write the configuration file
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Fetch the feed, embed new articles and store them
    Ingest {
        /// Also write the embedded collection to this snapshot file
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
    /// Answer a question using retrieved articles as context
    Ask {
        question: String,
        /// Number of articles to retrieve
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// List the articles most similar to a query
    Retrieve {
        query: String,
        /// Number of articles to retrieve
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Write every stored article and its embedding to a JSON snapshot
    Export { path: PathBuf },
    /// Load a JSON snapshot without re-embedding
    Import { path: PathBuf },
    /// Start the HTTP API
    Serve,
    /// Show connectivity and ingestion status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.home).context("Failed to load configuration")?;

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&config)?;
            } else {
                write_config(&config)?;
            }
            return Ok(());
        }
        Commands::Status => {
            return show_status(&config).await;
        }
        _ => {}
    }

    let app = App::open(config)
        .await
        .context("Failed to open news-rag storage")?;

    let result = match cli.command {
        Commands::Ingest { snapshot } => ingest(&app, snapshot.as_deref()).await,
        Commands::Ask { question, top_k } => ask(&app, question, top_k).await,
        Commands::Retrieve { query, top_k } => retrieve(&app, query, top_k).await,
        Commands::Export { path } => export(&app, &path).await,
        Commands::Import { path } => import(&app, &path).await,
        Commands::Serve => serve(&app).await,
        Commands::Config { .. } | Commands::Status => Ok(()),
    };

    app.shutdown().await;
    result
}
