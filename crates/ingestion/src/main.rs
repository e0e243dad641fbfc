//! Drunken Bot index builder
//!
//! Indexes every artist artifact under a directory:
//! 1. Optionally resets the collection
//! 2. Cleans and chunks each song's lyrics
//! 3. Embeds the chunks and upserts them into the configured index

use clap::Parser;
use drunkenbot_common::{config::AppConfig, embeddings, index, VERSION};
use drunkenbot_ingestion::{Chunker, Indexer};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "build-index", version, about = "Build the lyric retrieval index")]
struct Args {
    /// Directory containing artist JSON artifacts
    #[arg(long)]
    lyrics_dir: PathBuf,

    /// Collection to write into
    #[arg(long, default_value = drunkenbot_common::DEFAULT_COLLECTION)]
    collection_name: String,

    /// Delete the collection before indexing
    #[arg(long)]
    reset: bool,

    /// Only index files directly inside the lyrics directory
    #[arg(long)]
    no_recursive: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = AppConfig::load()?;
    init_tracing(&config);

    info!("Starting Drunken Bot index builder v{}", VERSION);

    let embedder = embeddings::create_embedder(&config.embedding)?;
    let index = index::open_index(&config.index).await?;
    let chunker = Chunker::new(&config.chunking)?;
    info!(
        embedder = embedder.model_name(),
        dimension = embedder.dimension(),
        index = index.name(),
        chunk_size = chunker.chunk_size(),
        chunk_overlap = chunker.chunk_overlap(),
        "Pipeline ready"
    );

    let indexer = Indexer::new(embedder, index, chunker, &args.collection_name);
    if args.reset {
        indexer.reset().await?;
    }

    let report = indexer.index_dir(&args.lyrics_dir, !args.no_recursive).await?;

    println!(
        "Indexed {} songs ({} chunks) from {} files into '{}'; {} songs and {} files skipped; collection now holds {} chunks",
        report.songs_indexed,
        report.chunks_written,
        report.files_seen,
        indexer.collection(),
        report.songs_skipped,
        report.files_skipped,
        report.collection_count
    );
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}
