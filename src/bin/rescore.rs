use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use scorefeed::store::SqliteStore;
use scorefeed::{Config, EngagementCoordinator, FeedPaginator, PostId, ScoreEngine};

/// Recomputes stored scores from the stored like and share counters.
#[derive(Parser, Debug)]
struct Args {
    /// SQLite database file. Defaults to `FEED_SQLITE_PATH`.
    #[arg(long)]
    sqlite: Option<PathBuf>,

    /// Only rescore these posts; a post without a score yet gets one. Without
    /// it every post already in the feed is visited, which leaves out posts
    /// that were never scored.
    #[arg(long = "post")]
    posts: Vec<String>,

    /// Posts fetched per page while walking the feed
    #[arg(long, default_value_t = 100)]
    page_size: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load_env_config()?;
    let path = args
        .sqlite
        .or(config.sqlite_path)
        .context("No database given, pass --sqlite or set FEED_SQLITE_PATH")?;
    let store = SqliteStore::open(&path)
        .with_context(|| format!("Couldn't open {}", path.display()))?;
    let coordinator =
        EngagementCoordinator::new(store.clone(), ScoreEngine::new(config.score_weights));

    let targets = if args.posts.is_empty() {
        println!("Collecting posts...");
        let paginator = FeedPaginator::new(store);
        let mut ids = Vec::new();
        let mut cursor = None;
        loop {
            let page = paginator.next_page(cursor.as_ref(), args.page_size).await?;
            if page.items.is_empty() {
                break;
            }
            ids.extend(page.items.into_iter().map(|post| post.id));
            cursor = Some(page.cursor);
        }
        ids
    } else {
        args.posts.into_iter().map(PostId).collect()
    };

    println!("Rescoring {} posts...", targets.len());
    for id in &targets {
        let score = coordinator.recompute_score(id).await?;
        println!("{id}: {score}");
    }
    println!("Successfully rescored");
    Ok(())
}
