//! # Concierge CLI (`concierge`)
//!
//! ## Usage
//!
//! ```bash
//! concierge --config ./config/concierge.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `concierge init` | Create the SQLite database and run schema migrations |
//! | `concierge import <file>` | Bulk import a JSON array of knowledge entries |
//! | `concierge sync [source]` | Resync one or all configured knowledge sources |
//! | `concierge search "<query>"` | Two-stage knowledge retrieval |
//! | `concierge ask "<question>"` | Run one assistant turn |
//! | `concierge feedback "<question>" --value 1` | Rate the latest answer |
//! | `concierge queries` | List recent traced queries |
//! | `concierge resolve <query-id> "<answer>"` | Answer a traced query by hand |
//! | `concierge reindex` | Re-embed stored entries |
//! | `concierge serve` | Start the HTTP server |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`
//! (default `concierge_harness=info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use concierge_harness::app::App;
use concierge_harness::commands;
use concierge_harness::config;
use concierge_harness::migrate;
use concierge_harness::server;
use concierge_harness::trace::Feedback;

/// Concierge: knowledge retrieval and a tool-calling assistant for
/// restaurant customer service.
#[derive(Parser)]
#[command(
    name = "concierge",
    about = "Knowledge retrieval and tool-calling assistant for restaurant customer service",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/concierge.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Bulk import knowledge entries from a JSON file.
    ///
    /// The file holds an array of `{title, content, section?, categoryId?,
    /// source?, language?}` objects. Entries already stored with the same
    /// content hash, source and language are skipped.
    Import {
        file: PathBuf,

        /// Import entries even when an identical one already exists.
        #[arg(long)]
        keep_duplicates: bool,
    },

    /// Replace the entries of configured sources with their current contents.
    Sync {
        /// Source name under `[sources.*]`; all sources when omitted.
        source: Option<String>,
    },

    /// Search the knowledge base.
    Search {
        query: String,

        /// Restrict results to one category id.
        #[arg(long)]
        category: Option<String>,
    },

    /// Ask the assistant one question.
    Ask {
        question: String,

        /// Default category for knowledge searches.
        #[arg(long)]
        category: Option<String>,

        /// Staff member id recorded on the trace.
        #[arg(long)]
        actor: Option<String>,
    },

    /// Rate the most recent answer to a question.
    Feedback {
        query: String,

        #[arg(long)]
        actor: Option<String>,

        /// Channel the question was asked on; defaults to `[trace].channel`.
        #[arg(long)]
        channel: Option<String>,

        /// `1` (helpful) or `-1` (not helpful).
        #[arg(long, allow_hyphen_values = true, value_parser = commands::parse_feedback)]
        value: Feedback,
    },

    /// List the most recent traced queries.
    Queries {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Answer a traced query by hand and mark it resolved.
    Resolve {
        query_id: String,
        response: String,
    },

    /// Re-embed stored entries and rewrite their vectors.
    Reindex {
        /// Only entries from this source.
        #[arg(long)]
        source: Option<String>,

        #[arg(long, default_value_t = 100)]
        batch_size: usize,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "concierge_harness=info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import {
            file,
            keep_duplicates,
        } => {
            commands::run_import(&cfg, &file, keep_duplicates).await?;
        }
        Commands::Sync { source } => {
            commands::run_sync_command(&cfg, source.as_deref()).await?;
        }
        Commands::Search { query, category } => {
            commands::run_search(&cfg, &query, category.as_deref()).await?;
        }
        Commands::Ask {
            question,
            category,
            actor,
        } => {
            commands::run_ask(&cfg, &question, category, actor).await?;
        }
        Commands::Feedback {
            query,
            actor,
            channel,
            value,
        } => {
            commands::run_feedback(&cfg, &query, actor.as_deref(), channel.as_deref(), value).await?;
        }
        Commands::Queries { limit } => {
            commands::run_queries(&cfg, limit).await?;
        }
        Commands::Resolve { query_id, response } => {
            commands::run_resolve(&cfg, &query_id, &response).await?;
        }
        Commands::Reindex { source, batch_size } => {
            commands::run_reindex(&cfg, source, batch_size).await?;
        }
        Commands::Serve => {
            let app = App::open(&cfg).await?;
            server::run_server(app).await?;
        }
    }

    Ok(())
}
