//! Process-lifetime resources.
//!
//! The embedding client, the completion client, and the built index are
//! each created at most once per process and then shared. The first caller
//! of [`Runtime::index`] pays for loading, chunking, and embedding the
//! corpus; every later caller gets the same `Arc<VectorIndex>`.

use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::chunk::chunk_documents;
use crate::completion::{create_completion, CompletionProvider};
use crate::config::Config;
use crate::embedding::{create_embedder, EmbeddingProvider};
use crate::error::Result;
use crate::index::{BuildReport, VectorIndex};
use crate::loader::load_documents;
use crate::prompt::PromptTemplate;
use crate::session::Assistant;
use crate::synthesizer::AnswerSynthesizer;

pub struct Runtime {
    config: Config,
    embedder: OnceCell<Arc<dyn EmbeddingProvider>>,
    completion: OnceCell<Arc<dyn CompletionProvider>>,
    index: OnceCell<Arc<VectorIndex>>,
}

impl Runtime {
    /// Runtime whose model clients are created from `config` on first use.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            embedder: OnceCell::new(),
            completion: OnceCell::new(),
            index: OnceCell::new(),
        }
    }

    /// Runtime with caller-supplied model clients.
    pub fn with_providers(
        config: Config,
        embedder: Arc<dyn EmbeddingProvider>,
        completion: Arc<dyn CompletionProvider>,
    ) -> Self {
        Self {
            config,
            embedder: OnceCell::from(embedder),
            completion: OnceCell::from(completion),
            index: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn embedder(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        self.embedder
            .get_or_try_init(|| async { create_embedder(&self.config.embedding) })
            .await
            .cloned()
    }

    pub async fn completion(&self) -> Result<Arc<dyn CompletionProvider>> {
        self.completion
            .get_or_try_init(|| async { create_completion(&self.config.llm) })
            .await
            .cloned()
    }

    /// The built index, building it on first call.
    pub async fn index(&self) -> Result<Arc<VectorIndex>> {
        self.index
            .get_or_try_init(|| async {
                let embedder = self.embedder().await?;
                let (index, _) = build_index(&self.config, embedder, false).await?;
                Ok(Arc::new(index))
            })
            .await
            .cloned()
    }

    /// Create the credentials-dependent clients and build the index.
    ///
    /// Fails on missing credentials, a missing data directory, or an empty
    /// corpus; callers treat these as fatal.
    pub async fn assistant(&self) -> Result<Assistant> {
        let completion = self.completion().await?;
        let index = self.index().await?;
        let synthesizer = AnswerSynthesizer::new(
            completion,
            PromptTemplate::from_config(&self.config.assistant),
        );
        Ok(Assistant::new(
            index,
            synthesizer,
            self.config.retrieval.k,
            self.config.assistant.greeting_text(),
        ))
    }
}

/// Load, chunk, and index the corpus described by `config`.
///
/// With `rebuild`, stored embeddings for the current model are discarded first.
pub async fn build_index(
    config: &Config,
    embedder: Arc<dyn EmbeddingProvider>,
    rebuild: bool,
) -> Result<(VectorIndex, BuildReport)> {
    let report = load_documents(&config.data)?;
    let passages = chunk_documents(
        &report.documents,
        config.chunking.chunk_size,
        config.chunking.overlap,
    )?;
    tracing::info!(
        documents = report.documents.len(),
        passages = passages.len(),
        chunk_size = config.chunking.chunk_size,
        overlap = config.chunking.overlap,
        "chunked corpus"
    );

    let mut index = VectorIndex::open(&config.index.path, embedder, config.embedding.batch_size)
        .await?
        .with_min_similarity(config.retrieval.min_similarity);
    if rebuild {
        let removed = index.clear().await?;
        tracing::info!(removed, "cleared stored embeddings");
    }
    let build = index.build(&passages).await?;
    Ok((index, build))
}
