//! CLI command implementations.
//!
//! Each `run_*` function opens the SQLite store, wires the pipeline pieces
//! it needs, and prints results to stdout.

use std::sync::Arc;

use anyhow::Result;
use sqlx::SqlitePool;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::cache::ReviewCache;
use crate::config::Config;
use crate::db;
use crate::embedding::create_provider;
use crate::explorer::PlaceExplorer;
use crate::fetcher::ReviewFetcher;
use crate::index::IndexBuilder;
use crate::llm::create_synthesizer;
use crate::migrate;
use crate::models::PlaceId;
use crate::places::{GooglePlacesLookup, PlaceLookup};
use crate::source::{ReviewSource, SerpApiSource, UnavailableSource};
use crate::store::sqlite::SqliteStore;
use crate::store::Store;

/// Open handles shared by the pipeline commands.
struct Pipeline {
    pool: SqlitePool,
    store: Arc<dyn Store>,
    cache: Arc<ReviewCache>,
}

impl Pipeline {
    async fn open(config: &Config, min_count: Option<usize>) -> Result<Self> {
        let pool = db::connect(config).await?;
        let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool.clone()));

        let source: Arc<dyn ReviewSource> = match SerpApiSource::new(&config.fetch) {
            Ok(source) => Arc::new(source),
            Err(e) => {
                tracing::debug!(error = %e, "review source not configured; serving cache only");
                Arc::new(UnavailableSource::new(e.to_string()))
            }
        };
        let cache = Arc::new(ReviewCache::new(
            store.clone(),
            ReviewFetcher::new(source),
            min_count.unwrap_or(config.fetch.min_count),
        ));

        Ok(Self { pool, store, cache })
    }

    fn index_builder(&self, config: &Config) -> Result<Arc<IndexBuilder>> {
        let embedder = create_provider(&config.embedding)?;
        Ok(Arc::new(IndexBuilder::new(
            self.store.clone(),
            Arc::from(embedder),
            config.embedding.batch_size,
        )))
    }

    fn explorer(&self, config: &Config) -> Result<PlaceExplorer> {
        let builder = self.index_builder(config)?;
        let synthesizer = create_synthesizer(&config.llm)?;
        Ok(PlaceExplorer::new(
            self.cache.clone(),
            builder,
            Arc::from(synthesizer),
            config.retrieval.top_k,
        ))
    }

    async fn close(self) {
        self.pool.close().await;
    }
}

/// `rh init`: create the database and both namespaces.
pub async fn run_init(config: &Config) -> Result<()> {
    migrate::run_migrations(config).await?;
    println!("Database initialized successfully.");
    Ok(())
}

/// `rh suggest`: print place suggestions for a partial name.
pub async fn run_suggest(config: &Config, text: &str) -> Result<()> {
    let lookup = GooglePlacesLookup::new(&config.places)?;
    let suggestions = lookup.suggest(text).await?;

    if suggestions.is_empty() {
        println!("No places found.");
        return Ok(());
    }

    for s in &suggestions {
        println!("{:<40}  {}", s.place_id.as_str(), s.display_name);
    }
    Ok(())
}

/// `rh fetch`: read-through fetch of a place's reviews.
pub async fn run_fetch(config: &Config, place: &str, min_count: Option<usize>) -> Result<()> {
    if min_count == Some(0) {
        anyhow::bail!("--min-count must be > 0");
    }
    let place_id = PlaceId::new(place)?;
    let pipeline = Pipeline::open(config, min_count).await?;

    let lookup = pipeline.cache.get_or_fetch(&place_id).await?;
    let with_text = lookup
        .reviews
        .iter()
        .filter(|r| r.indexable_text().is_some())
        .count();

    if lookup.hit {
        println!("Cached:   {} reviews for {}", lookup.reviews.len(), place_id);
    } else {
        println!("Fetched:  {} reviews for {}", lookup.reviews.len(), place_id);
    }
    println!("  with text: {}", with_text);
    println!("  pages:     {}", lookup.pages);
    if let Some(err) = &lookup.upstream_error {
        println!("  warning:   fetch stopped early: {}", err);
    }

    pipeline.close().await;
    Ok(())
}

/// `rh index`: get or build the vector index for a place.
pub async fn run_index(config: &Config, place: &str) -> Result<()> {
    let place_id = PlaceId::new(place)?;
    let pipeline = Pipeline::open(config, None).await?;
    let builder = pipeline.index_builder(config)?;

    let cache = &pipeline.cache;
    let key = &place_id;
    let index = builder
        .get_or_build(key, || async move { Ok(cache.get_or_fetch(key).await?.reviews) })
        .await?;

    println!("Index for {}", index.place_id);
    println!("  documents: {}", index.len());
    println!("  model:     {} ({} dims)", index.model, index.dims);
    println!("  built:     {}", crate::stats::format_ts_relative(index.built_at));

    pipeline.close().await;
    Ok(())
}

/// `rh ask`: answer one question about a place.
pub async fn run_ask(config: &Config, place: &str, question: &str) -> Result<()> {
    let place_id = PlaceId::new(place)?;
    let pipeline = Pipeline::open(config, None).await?;
    let mut explorer = pipeline.explorer(config)?;

    let selection = explorer.select_place(&place_id).await?;
    if let Some(err) = &selection.upstream_error {
        eprintln!("warning: reviews are incomplete: {}", err);
    }

    let answer = explorer.ask(question).await?;
    println!("{}", answer);

    pipeline.close().await;
    Ok(())
}

/// `rh chat`: interactive multi-turn session on stdin.
///
/// `/reset` starts a fresh conversation about the same place; `/quit` (or
/// end of input) exits.
pub async fn run_chat(config: &Config, place: &str) -> Result<()> {
    let place_id = PlaceId::new(place)?;
    let pipeline = Pipeline::open(config, None).await?;
    let mut explorer = pipeline.explorer(config)?;

    let selection = explorer.select_place(&place_id).await?;
    println!(
        "Chatting about {} ({} reviews indexed). /reset clears history, /quit exits.",
        selection.place_id, selection.documents
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();

        match question {
            "" => continue,
            "/quit" => break,
            "/reset" => {
                explorer.reset();
                explorer.select_place(&place_id).await?;
                println!("History cleared.");
            }
            _ => match explorer.ask(question).await {
                Ok(answer) => println!("{}\n", answer),
                // A failed turn leaves history intact; keep the session.
                Err(e) => eprintln!("error: {:#}", e),
            },
        }
    }

    pipeline.close().await;
    Ok(())
}

/// `rh forget`: drop a place's index, and optionally its cached reviews.
pub async fn run_forget(config: &Config, place: &str, reviews: bool) -> Result<()> {
    let place_id = PlaceId::new(place)?;
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());

    let removed = store.delete_place(&place_id, reviews).await?;
    match (removed, reviews) {
        (false, true) => println!("Nothing stored for {}.", place_id),
        (false, false) => println!("No index stored for {}.", place_id),
        (true, true) => println!("Removed index and cached reviews for {}.", place_id),
        (true, false) => println!("Removed index for {}.", place_id),
    }

    pool.close().await;
    Ok(())
}
