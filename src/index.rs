//! Persistent vector index over passages.
//!
//! Passages and their embeddings live in SQLite (see [`crate::migrate`]),
//! keyed by a content hash of `(source, offset, text)` plus the embedding
//! model. [`VectorIndex::build`] only embeds passages the database has not
//! seen for the current model, so rebuilding an unchanged corpus makes no
//! embedding calls at all.
//!
//! After build the index keeps an in-memory snapshot of every vector and
//! answers [`VectorIndex::search`] by brute-force cosine similarity. The
//! snapshot is only replaced by `build`/`clear`, which take `&mut self`;
//! share a built index across sessions as `Arc<VectorIndex>`.

use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::migrate;
use crate::models::{Passage, ScoredPassage};

struct IndexedPassage {
    passage: Passage,
    position: i64,
    vector: Vec<f32>,
}

/// Counts from one [`VectorIndex::build`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Distinct passages in the input.
    pub total: usize,
    /// Passages embedded during this call.
    pub embedded: usize,
    /// Passages already present from an earlier build.
    pub reused: usize,
    /// Stored passages removed because they are no longer in the input.
    pub pruned: usize,
}

impl BuildReport {
    pub fn is_cache_hit(&self) -> bool {
        self.embedded == 0 && self.pruned == 0
    }
}

/// Summary of what is stored, for `gchat status`.
#[derive(Debug, Clone)]
pub struct IndexStatus {
    pub path: PathBuf,
    pub model: String,
    pub dims: usize,
    pub passages: i64,
    pub sources: i64,
    pub size_bytes: u64,
    pub other_models: Vec<(String, i64)>,
}

pub struct VectorIndex {
    pool: SqlitePool,
    path: PathBuf,
    embedder: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    min_similarity: Option<f32>,
    entries: Vec<IndexedPassage>,
}

impl VectorIndex {
    /// Open the index file, creating the schema if needed, and load any
    /// passages already embedded with `embedder`'s model.
    pub async fn open(
        path: &Path,
        embedder: Arc<dyn EmbeddingProvider>,
        batch_size: usize,
    ) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;

        let mut index = Self {
            pool,
            path: path.to_path_buf(),
            embedder,
            batch_size: batch_size.max(1),
            min_similarity: None,
            entries: Vec::new(),
        };
        index.reload().await?;
        Ok(index)
    }

    /// Drop search hits scoring below `min`.
    pub fn with_min_similarity(mut self, min: Option<f32>) -> Self {
        self.min_similarity = min;
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn model_name(&self) -> &str {
        self.embedder.model_name()
    }

    /// Make the stored passage set equal to `passages`, embedding only what is new.
    ///
    /// Embedding failures abort the build; batches stored before the
    /// failure stay cached for the next attempt.
    pub async fn build(&mut self, passages: &[Passage]) -> Result<BuildReport> {
        let model = self.embedder.model_name().to_string();
        let dims = self.embedder.dims();

        // Deduplicate the input by content key, keeping first occurrence order.
        let mut seen = HashSet::new();
        let keyed: Vec<(String, &Passage)> = passages
            .iter()
            .map(|p| (content_key(p), p))
            .filter(|(key, _)| seen.insert(key.clone()))
            .collect();

        let stored: HashSet<String> =
            sqlx::query_scalar("SELECT content_key FROM passages WHERE model = ?")
                .bind(&model)
                .fetch_all(&self.pool)
                .await?
                .into_iter()
                .collect();

        let missing: Vec<&(String, &Passage)> = keyed
            .iter()
            .filter(|(key, _)| !stored.contains(key))
            .collect();

        let mut report = BuildReport {
            total: keyed.len(),
            reused: keyed.len() - missing.len(),
            ..BuildReport::default()
        };

        let mut next_position: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM passages WHERE model = ?",
        )
        .bind(&model)
        .fetch_one(&self.pool)
        .await?;

        for batch in missing.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|(_, p)| p.text.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(RagError::embedding(
                    &model,
                    format!("asked for {} embeddings, got {}", batch.len(), vectors.len()),
                ));
            }

            let now = chrono::Utc::now().timestamp();
            let mut tx = self.pool.begin().await?;
            for ((key, passage), vector) in batch.iter().zip(vectors.iter()) {
                sqlx::query(
                    r#"
                    INSERT INTO passages (content_key, model, source, char_offset, text, position, dims, embedding, created_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT(content_key, model) DO NOTHING
                    "#,
                )
                .bind(key)
                .bind(&model)
                .bind(&passage.source)
                .bind(passage.offset as i64)
                .bind(&passage.text)
                .bind(next_position)
                .bind(dims as i64)
                .bind(vec_to_blob(vector))
                .bind(now)
                .execute(&mut *tx)
                .await?;
                next_position += 1;
            }
            tx.commit().await?;

            report.embedded += batch.len();
            tracing::info!(
                "index  embedding  {} / {} new passages",
                report.embedded,
                missing.len()
            );
        }

        let wanted: HashSet<&str> = keyed.iter().map(|(key, _)| key.as_str()).collect();
        let stale: Vec<&String> = stored
            .iter()
            .filter(|key| !wanted.contains(key.as_str()))
            .collect();
        if !stale.is_empty() {
            let mut tx = self.pool.begin().await?;
            for key in &stale {
                sqlx::query("DELETE FROM passages WHERE content_key = ? AND model = ?")
                    .bind(key)
                    .bind(&model)
                    .execute(&mut *tx)
                    .await?;
            }
            tx.commit().await?;
            report.pruned = stale.len();
        }

        self.reload().await?;

        if report.is_cache_hit() {
            tracing::info!(passages = report.total, "index up to date; reusing stored embeddings");
        } else {
            tracing::info!(
                passages = report.total,
                embedded = report.embedded,
                reused = report.reused,
                pruned = report.pruned,
                "index built"
            );
        }
        Ok(report)
    }

    /// Return the `k` passages most similar to `query`, best first.
    ///
    /// Equal scores keep insertion order.
    ///
    /// # Errors
    ///
    /// [`RagError::InvalidArgument`] if `k < 1` or `query` is blank; no
    /// embedding call is made in that case.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredPassage>> {
        if k < 1 {
            return Err(RagError::InvalidArgument(format!(
                "k must be >= 1, got {}",
                k
            )));
        }
        if query.trim().is_empty() {
            return Err(RagError::InvalidArgument(
                "query must not be empty".to_string(),
            ));
        }
        if self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = self.embedder.embed(query).await?;
        if query_vec.len() != self.entries[0].vector.len() {
            return Err(RagError::embedding(
                self.embedder.model_name(),
                format!(
                    "query vector has {} dimensions, index has {}",
                    query_vec.len(),
                    self.entries[0].vector.len()
                ),
            ));
        }

        let mut scored: Vec<(f32, &IndexedPassage)> = self
            .entries
            .iter()
            .map(|e| (cosine_similarity(&query_vec, &e.vector), e))
            .filter(|(score, _)| self.min_similarity.map_or(true, |min| *score >= min))
            .collect();

        scored.sort_by(|(sa, a), (sb, b)| sb.total_cmp(sa).then(a.position.cmp(&b.position)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(score, e)| ScoredPassage {
                passage: e.passage.clone(),
                score,
            })
            .collect())
    }

    /// Delete every stored passage for the current model.
    pub async fn clear(&mut self) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM passages WHERE model = ?")
            .bind(self.embedder.model_name())
            .execute(&self.pool)
            .await?
            .rows_affected();
        self.entries.clear();
        Ok(deleted)
    }

    pub async fn status(&self) -> Result<IndexStatus> {
        let model = self.embedder.model_name().to_string();
        let row = sqlx::query(
            "SELECT COUNT(*) AS passages, COUNT(DISTINCT source) AS sources FROM passages WHERE model = ?",
        )
        .bind(&model)
        .fetch_one(&self.pool)
        .await?;

        let other_models: Vec<(String, i64)> = sqlx::query(
            "SELECT model, COUNT(*) AS n FROM passages WHERE model != ? GROUP BY model ORDER BY model",
        )
        .bind(&model)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|r| (r.get("model"), r.get("n")))
        .collect();

        Ok(IndexStatus {
            path: self.path.clone(),
            model,
            dims: self.embedder.dims(),
            passages: row.get("passages"),
            sources: row.get("sources"),
            size_bytes: std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0),
            other_models,
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn reload(&mut self) -> Result<()> {
        let rows = sqlx::query(
            r#"
            SELECT source, char_offset, text, position, embedding
            FROM passages
            WHERE model = ?
            ORDER BY position
            "#,
        )
        .bind(self.embedder.model_name())
        .fetch_all(&self.pool)
        .await?;

        self.entries = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let offset: i64 = row.get("char_offset");
                IndexedPassage {
                    passage: Passage {
                        text: row.get("text"),
                        source: row.get("source"),
                        offset: offset as usize,
                    },
                    position: row.get("position"),
                    vector: blob_to_vec(&blob),
                }
            })
            .collect();
        Ok(())
    }
}

/// Content address of a passage: SHA-256 over source, offset, and text.
pub fn content_key(passage: &Passage) -> String {
    let mut hasher = Sha256::new();
    hasher.update(passage.source.as_bytes());
    hasher.update([0u8]);
    hasher.update((passage.offset as u64).to_le_bytes());
    hasher.update([0u8]);
    hasher.update(passage.text.as_bytes());
    hex::encode(hasher.finalize())
}
