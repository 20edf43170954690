//! # Grounded Chat
//!
//! A retrieval-augmented chat assistant that answers questions from a local
//! folder of documents.
//!
//! Documents under a data directory are loaded, split into overlapping
//! passages, embedded, and stored in a SQLite-backed vector index. Each
//! question retrieves the closest passages and sends them, together with
//! the conversation so far, to a hosted language model whose answer is
//! streamed back to the user.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌─────────────┐
//! │  Loader  │──▶│ Chunker  │──▶│ VectorIndex │
//! │ md/txt/… │   │ 300 / 50 │   │   SQLite    │
//! └──────────┘   └──────────┘   └──────┬──────┘
//!                                      │ top-k
//!                ┌─────────────┐   ┌───▼───────┐
//!                │   Memory    │──▶│Synthesizer│──▶ streamed answer
//!                └─────────────┘   └───────────┘
//!                         ▲               │
//!                         └── Assistant::run_turn (terminal or web)
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! gchat init                     # write config/chat.toml
//! export GOOGLE_API_KEY=...
//! gchat index                    # load, chunk, embed
//! gchat ask "What does Program X cost?"
//! gchat chat                     # terminal session
//! gchat serve                    # web chat on 127.0.0.1:8501
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy |
//! | [`loader`] | Document loading from the data directory |
//! | [`extract`] | Text extraction for PDF and DOCX |
//! | [`chunk`] | Fixed-size overlapping chunking |
//! | [`embedding`] | Embedding providers and vector utilities |
//! | [`index`] | Persistent vector index |
//! | [`completion`] | Streaming completion providers |
//! | [`memory`] | Per-session conversation log |
//! | [`prompt`] | Answer prompt template |
//! | [`synthesizer`] | Prompt + completion |
//! | [`session`] | Sessions and the question-answering turn |
//! | [`surface`] | Terminal and channel chat surfaces |
//! | [`runtime`] | Process-lifetime clients and index |
//! | [`server`] | Web chat server |
//! | [`commands`] | CLI command implementations |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunk;
pub mod commands;
pub mod completion;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod loader;
pub mod logging;
pub mod memory;
pub mod migrate;
pub mod models;
pub mod prompt;
pub mod runtime;
pub mod server;
pub mod session;
pub mod surface;
pub mod synthesizer;

/// Deterministic providers and surfaces shared by unit and integration tests.
#[doc(hidden)]
pub mod testing;
