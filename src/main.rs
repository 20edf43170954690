//! # Grounded Chat CLI (`gchat`)
//!
//! ## Usage
//!
//! ```bash
//! gchat --config ./config/chat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `gchat init` | Write a starter config and create `./data` |
//! | `gchat index [--rebuild]` | Load, chunk, and embed the documents |
//! | `gchat search "<query>"` | Show the passages a question would retrieve |
//! | `gchat ask "<question>"` | Answer one question and exit |
//! | `gchat chat` | Interactive terminal chat |
//! | `gchat serve` | Web chat server |
//! | `gchat status` | Show what the index holds |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use grounded_chat::{commands, config, logging, server};

/// Grounded Chat: answer questions from your own documents.
///
/// All commands except `init` read a TOML configuration file given by
/// `--config`. See `config/chat.example.toml` for every option.
#[derive(Parser)]
#[command(
    name = "gchat",
    about = "Grounded Chat: answer questions from your own documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/chat.toml")]
    config: PathBuf,

    /// Log level when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter configuration file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Build the vector index from the data directory.
    ///
    /// Passages already embedded with the configured model are reused, so
    /// re-running on an unchanged corpus makes no embedding calls.
    Index {
        /// Discard stored embeddings and embed everything again.
        #[arg(long)]
        rebuild: bool,
    },

    /// Print the passages retrieved for a query.
    Search {
        query: String,

        /// Number of passages (defaults to `retrieval.k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Answer a single question, streaming the answer to stdout.
    Ask { question: String },

    /// Start an interactive chat in the terminal. `/exit` or Ctrl-D ends it.
    Chat,

    /// Start the web chat server on `[server].bind`.
    Serve,

    /// Show index location, model, and passage counts.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    if let Commands::Init { force } = cli.command {
        return commands::run_init(&cli.config, force);
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init { .. } => {}
        Commands::Index { rebuild } => commands::run_index(&cfg, rebuild).await?,
        Commands::Search { query, k } => commands::run_search(&cfg, &query, k).await?,
        Commands::Ask { question } => commands::run_ask(&cfg, &question).await?,
        Commands::Chat => commands::run_chat(&cfg).await?,
        Commands::Serve => server::run_server(&cfg).await?,
        Commands::Status => commands::run_status(&cfg).await?,
    }

    Ok(())
}
