//! Chat surfaces: where transcripts are shown and questions come from.
//!
//! The [`ChatSurface`] trait is the only thing the turn loop knows about its
//! frontend. Two implementations ship with the crate:
//! - [`TerminalSurface`]: line-based stdin/stdout, used by `gchat chat` and `gchat ask`.
//! - [`ChannelSurface`]: forwards output as [`SurfaceEvent`]s over an mpsc
//!   channel; the web server turns those into SSE events.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin, Stdout};
use tokio::sync::mpsc;

use crate::error::{RagError, Result};
use crate::models::{Message, Role};

#[async_trait]
pub trait ChatSurface: Send {
    /// Show a complete message (history replay, greeting).
    async fn display(&mut self, message: &Message) -> Result<()>;

    /// Wait for the next question. `None` ends the session.
    async fn capture_input(&mut self) -> Result<Option<String>>;

    /// Show the next piece of the answer being streamed.
    ///
    /// Returning an error cancels the turn.
    async fn render_increment(&mut self, text: &str) -> Result<()>;

    /// The answer is complete; `full` is the concatenation of all increments.
    async fn finish_answer(&mut self, full: &str) -> Result<()>;

    /// Show a per-turn failure without ending the session.
    async fn show_error(&mut self, message: &str) -> Result<()>;
}

// ============ Terminal ============

/// Line-oriented terminal chat.
pub struct TerminalSurface {
    input: Lines<BufReader<Stdin>>,
    out: Stdout,
    prompt: String,
}

impl TerminalSurface {
    pub fn new() -> Self {
        Self {
            input: BufReader::new(tokio::io::stdin()).lines(),
            out: tokio::io::stdout(),
            prompt: "> ".to_string(),
        }
    }

    async fn write(&mut self, text: &str) -> Result<()> {
        self.out
            .write_all(text.as_bytes())
            .await
            .map_err(|e| RagError::Surface(e.to_string()))?;
        self.out
            .flush()
            .await
            .map_err(|e| RagError::Surface(e.to_string()))
    }
}

impl Default for TerminalSurface {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatSurface for TerminalSurface {
    async fn display(&mut self, message: &Message) -> Result<()> {
        let line = match message.role {
            Role::Assistant => format!("{}\n\n", message.content),
            Role::User => format!("{}{}\n", self.prompt, message.content),
        };
        self.write(&line).await
    }

    async fn capture_input(&mut self) -> Result<Option<String>> {
        loop {
            let prompt = self.prompt.clone();
            self.write(&prompt).await?;
            let line = self
                .input
                .next_line()
                .await
                .map_err(|e| RagError::Surface(e.to_string()))?;
            match line {
                None => return Ok(None),
                Some(line) => {
                    let line = line.trim();
                    if line == "/exit" || line == "/quit" {
                        return Ok(None);
                    }
                    if !line.is_empty() {
                        return Ok(Some(line.to_string()));
                    }
                }
            }
        }
    }

    async fn render_increment(&mut self, text: &str) -> Result<()> {
        self.write(text).await
    }

    async fn finish_answer(&mut self, _full: &str) -> Result<()> {
        self.write("\n\n").await
    }

    async fn show_error(&mut self, message: &str) -> Result<()> {
        eprintln!("Error: {}", message);
        Ok(())
    }
}

// ============ Channel ============

/// Output of one turn, as sent by [`ChannelSurface`].
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    Message(Message),
    Chunk(String),
    Done(String),
    Error(String),
}

/// Surface that forwards everything to a channel.
///
/// Input never comes through this surface; the web layer receives questions
/// as HTTP requests. A dropped receiver (client went away) makes every
/// method fail with [`RagError::Surface`], which cancels the running turn.
pub struct ChannelSurface {
    tx: mpsc::Sender<SurfaceEvent>,
}

impl ChannelSurface {
    pub fn new(tx: mpsc::Sender<SurfaceEvent>) -> Self {
        Self { tx }
    }

    async fn send(&self, event: SurfaceEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| RagError::Surface("client disconnected".to_string()))
    }
}

#[async_trait]
impl ChatSurface for ChannelSurface {
    async fn display(&mut self, message: &Message) -> Result<()> {
        self.send(SurfaceEvent::Message(message.clone())).await
    }

    async fn capture_input(&mut self) -> Result<Option<String>> {
        Ok(None)
    }

    async fn render_increment(&mut self, text: &str) -> Result<()> {
        self.send(SurfaceEvent::Chunk(text.to_string())).await
    }

    async fn finish_answer(&mut self, full: &str) -> Result<()> {
        self.send(SurfaceEvent::Done(full.to_string())).await
    }

    async fn show_error(&mut self, message: &str) -> Result<()> {
        self.send(SurfaceEvent::Error(message.to_string())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_surface_forwards_events() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut surface = ChannelSurface::new(tx);
        surface.render_increment("Hello ").await.unwrap();
        surface.render_increment("world").await.unwrap();
        surface.finish_answer("Hello world").await.unwrap();
        drop(surface);

        let mut events = Vec::new();
        while let Some(e) = rx.recv().await {
            events.push(e);
        }
        assert_eq!(
            events,
            vec![
                SurfaceEvent::Chunk("Hello ".into()),
                SurfaceEvent::Chunk("world".into()),
                SurfaceEvent::Done("Hello world".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_channel_surface_fails_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut surface = ChannelSurface::new(tx);
        assert!(matches!(
            surface.render_increment("x").await,
            Err(RagError::Surface(_))
        ));
        assert_eq!(surface.capture_input().await.unwrap(), None);
    }
}
