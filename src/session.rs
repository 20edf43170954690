//! Chat sessions and the question-answering turn.
//!
//! A turn runs retrieve → generate → stream → commit. The question and the
//! answer are appended to the session's memory together, and only after the
//! whole answer has streamed to the surface. A failure at any step (search,
//! completion, a broken or empty stream, or a surface that stops accepting
//! output) leaves the memory exactly as it was.

use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::memory::ConversationMemory;
use crate::models::{Message, Passage};
use crate::surface::ChatSurface;
use crate::synthesizer::AnswerSynthesizer;

/// One user's conversation.
#[derive(Debug, Clone)]
pub struct ChatSession {
    pub id: Uuid,
    pub memory: ConversationMemory,
}

impl ChatSession {
    pub fn new(greeting: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            memory: ConversationMemory::new(greeting),
        }
    }
}

/// Everything a turn needs, shared by all sessions.
pub struct Assistant {
    index: Arc<VectorIndex>,
    synthesizer: AnswerSynthesizer,
    k: usize,
    greeting: String,
}

impl Assistant {
    pub fn new(
        index: Arc<VectorIndex>,
        synthesizer: AnswerSynthesizer,
        k: usize,
        greeting: impl Into<String>,
    ) -> Self {
        Self {
            index,
            synthesizer,
            k,
            greeting: greeting.into(),
        }
    }

    pub fn new_session(&self) -> ChatSession {
        ChatSession::new(self.greeting.clone())
    }

    /// Answer `question` in `session`, streaming to `surface`.
    ///
    /// Returns the full answer. On error the session memory is unchanged.
    pub async fn run_turn(
        &self,
        session: &mut ChatSession,
        question: &str,
        surface: &mut dyn ChatSurface,
    ) -> Result<String> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::InvalidArgument(
                "question must not be empty".to_string(),
            ));
        }

        let hits = self.index.search(question, self.k).await?;
        tracing::debug!(
            session = %session.id,
            hits = hits.len(),
            top_score = hits.first().map(|h| h.score).unwrap_or(0.0),
            "retrieved context"
        );
        let passages: Vec<Passage> = hits.into_iter().map(|h| h.passage).collect();

        let mut stream = self
            .synthesizer
            .generate(question, &passages, session.memory.transcript())
            .await?;

        let mut answer = String::new();
        while let Some(increment) = stream.next().await {
            let increment = increment?;
            surface.render_increment(&increment).await?;
            answer.push_str(&increment);
        }
        if answer.trim().is_empty() {
            return Err(RagError::completion(
                self.synthesizer.provider_name(),
                "reply contained no text",
            ));
        }
        surface.finish_answer(&answer).await?;

        session.memory.append(Message::user(question));
        session.memory.append(Message::assistant(answer.clone()));
        tracing::info!(
            session = %session.id,
            messages = session.memory.len(),
            answer_chars = answer.len(),
            "turn complete"
        );
        Ok(answer)
    }

    /// Drive a full interactive session until the surface reports end of input.
    ///
    /// Per-turn failures are shown on the surface and the loop continues.
    pub async fn chat_loop(
        &self,
        session: &mut ChatSession,
        surface: &mut dyn ChatSurface,
    ) -> Result<()> {
        for message in session.memory.transcript() {
            surface.display(message).await?;
        }
        while let Some(question) = surface.capture_input().await? {
            match self.run_turn(session, &question, surface).await {
                Ok(_) => {}
                Err(e) if e.is_per_turn() => {
                    tracing::warn!(session = %session.id, error = %e, "turn failed");
                    surface.show_error(&e.to_string()).await?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Live sessions for the web surface, each behind its own lock so one
/// session runs at most one turn at a time.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, SessionEntry>>,
}

struct SessionEntry {
    session: Arc<Mutex<ChatSession>>,
    last_used: Instant,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: ChatSession) -> Uuid {
        let id = session.id;
        self.sessions.write().await.insert(
            id,
            SessionEntry {
                session: Arc::new(Mutex::new(session)),
                last_used: Instant::now(),
            },
        );
        id
    }

    /// Look up a session and mark it as used.
    pub async fn get(&self, id: &Uuid) -> Option<Arc<Mutex<ChatSession>>> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(id)?;
        entry.last_used = Instant::now();
        Some(entry.session.clone())
    }

    /// End a session. Returns false if it did not exist.
    pub async fn remove(&self, id: &Uuid) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    /// Drop sessions unused for at least `max_idle`. A session whose handle
    /// is still held (a turn in flight) is kept. Returns the number dropped.
    pub async fn sweep_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| {
            entry.last_used.elapsed() < max_idle || Arc::strong_count(&entry.session) > 1
        });
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::prompt::PromptTemplate;
    use crate::testing::{RecordingSurface, ScriptedCompletion, WordEmbedder};
    use tempfile::TempDir;

    async fn assistant(tmp: &TempDir, completion: ScriptedCompletion) -> Assistant {
        let mut index = VectorIndex::open(
            &tmp.path().join("chat.sqlite"),
            Arc::new(WordEmbedder::default()),
            16,
        )
        .await
        .unwrap();
        index
            .build(&[
                Passage {
                    text: "Program X costs $500 for the full package".into(),
                    source: "pricing.md".into(),
                    offset: 0,
                },
                Passage {
                    text: "Sessions run on weekdays".into(),
                    source: "about.md".into(),
                    offset: 0,
                },
            ])
            .await
            .unwrap();
        let template = PromptTemplate::new("Acme", "pricing");
        let synth = AnswerSynthesizer::new(Arc::new(completion), template);
        Assistant::new(Arc::new(index), synth, 3, "Hello!")
    }

    #[tokio::test]
    async fn test_successful_turn_appends_two_messages() {
        let tmp = TempDir::new().unwrap();
        let assistant = assistant(&tmp, ScriptedCompletion::new(&["It costs ", "$500."])).await;
        let mut session = assistant.new_session();
        let mut surface = RecordingSurface::default();

        let answer = assistant
            .run_turn(&mut session, "  How much is Program X?  ", &mut surface)
            .await
            .unwrap();

        assert_eq!(answer, "It costs $500.");
        assert_eq!(surface.increments, vec!["It costs ", "$500."]);
        assert_eq!(surface.finished, vec!["It costs $500."]);
        let t = session.memory.transcript();
        assert_eq!(t.len(), 3);
        assert_eq!(t[1].role, Role::User);
        assert_eq!(t[1].content, "How much is Program X?");
        assert_eq!(t[2].content, "It costs $500.");
    }

    #[tokio::test]
    async fn test_mid_stream_failure_commits_nothing() {
        let tmp = TempDir::new().unwrap();
        let assistant =
            assistant(&tmp, ScriptedCompletion::failing_after(&["It costs ", "$500."], 1)).await;
        let mut session = assistant.new_session();
        let mut surface = RecordingSurface::default();

        let err = assistant
            .run_turn(&mut session, "How much is Program X?", &mut surface)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Completion { .. }));
        assert_eq!(surface.increments, vec!["It costs "]);
        assert!(surface.finished.is_empty());
        assert_eq!(session.memory.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_reply_commits_nothing() {
        for script in [&[][..], &["  ", "\n"][..]] {
            let tmp = TempDir::new().unwrap();
            let assistant = assistant(&tmp, ScriptedCompletion::new(script)).await;
            let mut session = assistant.new_session();
            let mut surface = RecordingSurface::default();

            let err = assistant
                .run_turn(&mut session, "Program X?", &mut surface)
                .await
                .unwrap_err();
            assert!(matches!(err, RagError::Completion { .. }));
            assert!(err.is_per_turn());
            assert!(surface.finished.is_empty());
            assert_eq!(session.memory.len(), 1);
        }
    }

    #[tokio::test]
    async fn test_surface_disconnect_cancels_turn() {
        let tmp = TempDir::new().unwrap();
        let assistant = assistant(&tmp, ScriptedCompletion::new(&["a", "b", "c"])).await;
        let mut session = assistant.new_session();
        let mut surface = RecordingSurface {
            accept_increments: Some(1),
            ..RecordingSurface::default()
        };

        let err = assistant
            .run_turn(&mut session, "Program X?", &mut surface)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Surface(_)));
        assert_eq!(session.memory.len(), 1);
    }

    #[tokio::test]
    async fn test_blank_question_rejected() {
        let tmp = TempDir::new().unwrap();
        let assistant = assistant(&tmp, ScriptedCompletion::new(&["x"])).await;
        let mut session = assistant.new_session();
        let mut surface = RecordingSurface::default();
        let err = assistant
            .run_turn(&mut session, "   ", &mut surface)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::InvalidArgument(_)));
        assert_eq!(session.memory.len(), 1);
    }

    #[tokio::test]
    async fn test_chat_loop_continues_after_turn_error() {
        let tmp = TempDir::new().unwrap();
        let assistant =
            assistant(&tmp, ScriptedCompletion::failing_after(&["boom"], 0)).await;
        let mut session = assistant.new_session();
        let mut surface = RecordingSurface::with_inputs(&["first?", "second?"]);

        assistant.chat_loop(&mut session, &mut surface).await.unwrap();
        assert_eq!(surface.displayed.len(), 1);
        assert_eq!(surface.errors.len(), 2);
        assert_eq!(session.memory.len(), 1);
    }

    #[tokio::test]
    async fn test_registry_lifecycle() {
        let registry = SessionRegistry::new();
        let id = registry.insert(ChatSession::new("hi")).await;
        assert_eq!(registry.len().await, 1);

        let handle = registry.get(&id).await.unwrap();
        assert_eq!(handle.lock().await.memory.len(), 1);

        assert!(registry.remove(&id).await);
        assert!(!registry.remove(&id).await);
        assert!(registry.get(&id).await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_registry_sweeps_idle_sessions() {
        let registry = SessionRegistry::new();
        let idle = registry.insert(ChatSession::new("hi")).await;
        let busy = registry.insert(ChatSession::new("hi")).await;

        assert_eq!(registry.sweep_idle(Duration::from_secs(3600)).await, 0);
        assert_eq!(registry.len().await, 2);

        let handle = registry.get(&busy).await.unwrap();
        assert_eq!(registry.sweep_idle(Duration::ZERO).await, 1);
        assert!(registry.get(&idle).await.is_none());
        assert!(registry.get(&busy).await.is_some());

        drop(handle);
        assert_eq!(registry.sweep_idle(Duration::ZERO).await, 1);
        assert!(registry.is_empty().await);
    }
}
