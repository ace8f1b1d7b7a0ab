//! # Review Harness CLI (`rh`)
//!
//! The `rh` binary fetches and caches a place's reviews, builds a vector
//! index over them, and answers questions from that index.
//!
//! ## Usage
//!
//! ```bash
//! rh --config ./config/reviews.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rh init` | Create the SQLite database and both namespaces |
//! | `rh suggest "<text>"` | List matching places and their ids |
//! | `rh fetch <place_id>` | Fetch (or read cached) reviews |
//! | `rh index <place_id>` | Get or build the place's vector index |
//! | `rh ask <place_id> "<question>"` | Answer one question |
//! | `rh chat <place_id>` | Interactive multi-turn conversation |
//! | `rh forget <place_id>` | Drop a place's index (and optionally reviews) |
//! | `rh stats` | Cached places and index status |
//! | `rh completions <shell>` | Print shell completions |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! rh init --config ./config/reviews.toml
//!
//! # Find a place id
//! rh suggest "lalbagh botanical garden"
//!
//! # Ask about it
//! rh ask ChIJ... "Is it good for an early morning walk?"
//! ```

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use review_harness::{commands, config, logging, stats};

/// Review Harness CLI: question answering over a place's public reviews.
///
/// All commands except `completions` read a TOML configuration file.
#[derive(Parser)]
#[command(
    name = "rh",
    about = "Review Harness: ask questions about a place, answered from its reviews",
    version,
    long_about = "Review Harness fetches a bounded number of public reviews for a place, \
    caches them in SQLite, embeds their text into a per-place vector index, and answers \
    free-form questions using only the most relevant reviews."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/reviews.toml")]
    config: PathBuf,

    /// Enable debug logging (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database.
    ///
    /// Creates the SQLite file and the review and index tables. Idempotent.
    Init,

    /// Suggest places matching a partial name.
    Suggest {
        /// Partial place name.
        text: String,
    },

    /// Fetch a place's reviews, or read them from the cache.
    ///
    /// Pagination stops once at least `--min-count` reviews are collected
    /// or no further page exists. Cached reviews are never refreshed.
    Fetch {
        /// Place identifier.
        place_id: String,

        /// Override `fetch.min_count` for this fetch.
        #[arg(long)]
        min_count: Option<usize>,
    },

    /// Get or build the vector index for a place.
    Index {
        /// Place identifier.
        place_id: String,
    },

    /// Answer a single question about a place.
    Ask {
        /// Place identifier.
        place_id: String,
        /// The question.
        question: String,
    },

    /// Start an interactive conversation about a place.
    Chat {
        /// Place identifier.
        place_id: String,
    },

    /// Remove a place's persisted index so the next use rebuilds it.
    Forget {
        /// Place identifier.
        place_id: String,

        /// Also remove the cached reviews, forcing a fresh fetch.
        #[arg(long)]
        reviews: bool,
    },

    /// Show cached places, review counts, and index status.
    Stats,

    /// Print shell completions to stdout.
    Completions {
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "rh", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => commands::run_init(&cfg).await?,
        Commands::Suggest { text } => commands::run_suggest(&cfg, &text).await?,
        Commands::Fetch {
            place_id,
            min_count,
        } => commands::run_fetch(&cfg, &place_id, min_count).await?,
        Commands::Index { place_id } => commands::run_index(&cfg, &place_id).await?,
        Commands::Ask { place_id, question } => {
            commands::run_ask(&cfg, &place_id, &question).await?
        }
        Commands::Chat { place_id } => commands::run_chat(&cfg, &place_id).await?,
        Commands::Forget { place_id, reviews } => {
            commands::run_forget(&cfg, &place_id, reviews).await?
        }
        Commands::Stats => stats::run_stats(&cfg).await?,
        Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
