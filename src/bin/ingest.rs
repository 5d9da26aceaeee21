use clap::Parser;
use market_insights_analyst::{
    config::AnalystConfig,
    gemini::GeminiClient,
    index::{build_index, Chunker, GeminiEmbedder},
    logging::init_tracing,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "ingest", about = "Build the news index from a directory of .txt articles")]
struct Args {
    /// Directory of plain-text news articles
    #[arg(long, default_value = "data/news_articles")]
    data_dir: PathBuf,

    /// Where to write the index
    #[arg(long, default_value = "vector_stores/news_index.json")]
    index_path: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();

    let config = AnalystConfig::from_env()?;
    let client = Arc::new(GeminiClient::from_config(&config)?);
    let embedder = GeminiEmbedder::new(client, &config.embedding_model);

    info!(
        data_dir = %args.data_dir.display(),
        model = %config.embedding_model,
        "Building news index"
    );

    let index = build_index(&args.data_dir, &embedder, &Chunker::default()).await?;
    index.save(&args.index_path).await?;

    println!(
        "Indexed {} chunks into {}",
        index.len(),
        args.index_path.display()
    );
    Ok(())
}
