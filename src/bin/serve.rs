use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::info;
use scorefeed::store::{DocumentStore, MemoryStore, SetOptions};
use scorefeed::{Config, Feed, Post, ScoreEngine, POSTS};

#[derive(Parser, Debug)]
struct Args {
    /// Address to serve on. Overrides `FEED_BIND_ADDRESS`.
    #[arg(long)]
    address: Option<SocketAddr>,

    /// JSON file with an array of posts to load (and score) before serving
    #[arg(long)]
    seed: Option<PathBuf>,

    /// SQLite database file. Overrides `FEED_SQLITE_PATH`; without either the
    /// feed lives in memory.
    #[arg(long)]
    sqlite: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let mut config = Config::load_env_config()?;
    if let Some(address) = args.address {
        config.bind_address = address;
    }
    if let Some(path) = args.sqlite {
        config.sqlite_path = Some(path);
    }

    match config.sqlite_path.clone() {
        Some(path) => serve_sqlite(&path, config, args.seed.as_deref()).await,
        None => run(MemoryStore::new(), config, args.seed.as_deref()).await,
    }
}

#[cfg(feature = "sqlite")]
async fn serve_sqlite(path: &Path, config: Config, seed: Option<&Path>) -> Result<()> {
    let store = scorefeed::store::SqliteStore::open(path)
        .with_context(|| format!("Couldn't open {}", path.display()))?;
    run(store, config, seed).await
}

#[cfg(not(feature = "sqlite"))]
async fn serve_sqlite(path: &Path, _config: Config, _seed: Option<&Path>) -> Result<()> {
    anyhow::bail!(
        "{} requested but this binary was built without the `sqlite` feature",
        path.display()
    )
}

async fn run<S: DocumentStore + Clone + 'static>(
    store: S,
    config: Config,
    seed: Option<&Path>,
) -> Result<()> {
    if let Some(seed) = seed {
        let engine = ScoreEngine::new(config.score_weights.clone());
        let count = load_seed(&store, &engine, seed).await?;
        info!("Loaded {} posts from {}", count, seed.display());
    }
    Feed::new(store, config).start().await;
    Ok(())
}

async fn load_seed<S: DocumentStore>(
    store: &S,
    engine: &ScoreEngine,
    path: &Path,
) -> Result<usize> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Couldn't read {}", path.display()))?;
    let posts: Vec<Post> =
        serde_json::from_str(&raw).context("Seed file is not a list of posts")?;
    let count = posts.len();
    for mut post in posts {
        if post.id.0.is_empty() {
            anyhow::bail!("Seed post {:?} has no id", post.metadata.headline);
        }
        post.score = Some(engine.score(&post.metadata));
        let value = serde_json::to_value(&post)?;
        store
            .set_document(POSTS, &post.id.0, value, SetOptions::default())
            .await?;
    }
    Ok(count)
}
