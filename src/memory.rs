//! Per-session conversation log.

use serde::{Deserialize, Serialize};

use crate::models::Message;

/// Append-only, ordered message log for one chat session.
///
/// Every log starts with a single assistant greeting. Messages can only be
/// added; there is no edit or delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMemory {
    messages: Vec<Message>,
}

impl ConversationMemory {
    pub fn new(greeting: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::assistant(greeting)],
        }
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn transcript(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// `Role: content` lines in log order, as the prompt's chat history.
    pub fn render_as_text(&self) -> String {
        render_transcript(&self.messages)
    }
}

pub fn render_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    #[test]
    fn test_new_memory_holds_only_greeting() {
        let memory = ConversationMemory::new("Hello! How can I help?");
        assert_eq!(memory.len(), 1);
        assert_eq!(memory.transcript()[0].role, Role::Assistant);
        assert_eq!(memory.transcript()[0].content, "Hello! How can I help?");
    }

    #[test]
    fn test_append_preserves_order() {
        let mut memory = ConversationMemory::new("hi");
        memory.append(Message::user("What does Program X cost?"));
        memory.append(Message::assistant("$500."));
        memory.append(Message::user("Thanks"));

        assert_eq!(memory.len(), 4);
        let roles: Vec<Role> = memory.transcript().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::Assistant, Role::User, Role::Assistant, Role::User]
        );
    }

    #[test]
    fn test_render_as_text() {
        let mut memory = ConversationMemory::new("Hello!");
        memory.append(Message::user("Hi"));
        memory.append(Message::assistant("How can I help?"));
        assert_eq!(
            memory.render_as_text(),
            "Assistant: Hello!\nUser: Hi\nAssistant: How can I help?"
        );
    }

    #[test]
    fn test_serializes_as_message_list() {
        let memory = ConversationMemory::new("Hello!");
        let json = serde_json::to_value(&memory).unwrap();
        assert_eq!(json["messages"][0]["role"], "assistant");
        assert_eq!(json["messages"][0]["content"], "Hello!");
    }
}
