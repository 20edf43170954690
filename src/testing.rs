//! Deterministic in-process collaborators for unit tests.

use async_trait::async_trait;
use futures::stream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::completion::{CompletionProvider, TextStream};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::models::Message;
use crate::surface::ChatSurface;

pub const DIMS: usize = 64;

/// Bag-of-words embedder: each lowercase word is hashed into one of [`DIMS`] buckets.
#[derive(Default)]
pub struct WordEmbedder {
    pub calls: AtomicUsize,
    pub texts_embedded: AtomicUsize,
}

pub fn word_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let mut h: u32 = 2166136261;
        for b in word.to_lowercase().bytes() {
            h ^= b as u32;
            h = h.wrapping_mul(16777619);
        }
        v[(h as usize) % DIMS] += 1.0;
    }
    v
}

#[async_trait]
impl EmbeddingProvider for WordEmbedder {
    fn model_name(&self) -> &str {
        "test-words"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts_embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| word_vector(t)).collect())
    }
}

/// Completion provider that replays scripted increments and records prompts.
pub struct ScriptedCompletion {
    pub increments: Vec<String>,
    /// Emit an error after this many increments.
    pub fail_after: Option<usize>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedCompletion {
    pub fn new(increments: &[&str]) -> Self {
        Self {
            increments: increments.iter().map(|s| s.to_string()).collect(),
            fail_after: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_after(increments: &[&str], n: usize) -> Self {
        Self {
            fail_after: Some(n),
            ..Self::new(increments)
        }
    }
}

#[async_trait]
impl CompletionProvider for ScriptedCompletion {
    fn name(&self) -> &str {
        "scripted"
    }
    fn model_name(&self) -> &str {
        "scripted-model"
    }
    async fn complete(&self, prompt: &str) -> Result<TextStream> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prompt.to_string());
        let mut items: Vec<Result<String>> = Vec::new();
        for (i, inc) in self.increments.iter().enumerate() {
            if self.fail_after == Some(i) {
                items.push(Err(RagError::completion("scripted", "stream interrupted")));
                return Ok(Box::pin(stream::iter(items)));
            }
            items.push(Ok(inc.clone()));
        }
        if self.fail_after == Some(self.increments.len()) {
            items.push(Err(RagError::completion("scripted", "stream interrupted")));
        }
        Ok(Box::pin(stream::iter(items)))
    }
}

/// Surface that records everything and replays canned input.
#[derive(Default)]
pub struct RecordingSurface {
    pub inputs: Vec<String>,
    pub displayed: Vec<Message>,
    pub increments: Vec<String>,
    pub finished: Vec<String>,
    pub errors: Vec<String>,
    /// Refuse increments after this many, as a disconnected client would.
    pub accept_increments: Option<usize>,
}

impl RecordingSurface {
    pub fn with_inputs(inputs: &[&str]) -> Self {
        Self {
            inputs: inputs.iter().rev().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl ChatSurface for RecordingSurface {
    async fn display(&mut self, message: &Message) -> Result<()> {
        self.displayed.push(message.clone());
        Ok(())
    }
    async fn capture_input(&mut self) -> Result<Option<String>> {
        Ok(self.inputs.pop())
    }
    async fn render_increment(&mut self, text: &str) -> Result<()> {
        if self.accept_increments == Some(self.increments.len()) {
            return Err(RagError::Surface("client disconnected".into()));
        }
        self.increments.push(text.to_string());
        Ok(())
    }
    async fn finish_answer(&mut self, full: &str) -> Result<()> {
        self.finished.push(full.to_string());
        Ok(())
    }
    async fn show_error(&mut self, message: &str) -> Result<()> {
        self.errors.push(message.to_string());
        Ok(())
    }
}
