//! Instruction template for grounded answers.
//!
//! The template is fixed apart from the assistant's name and subject. It
//! has three slots, filled on every turn:
//!
//! | Slot | Filled with |
//! |------|-------------|
//! | context | retrieved passages, separated by blank lines |
//! | chat history | the transcript as `Role: content` lines |
//! | input | the user's question |

use crate::config::AssistantConfig;
use crate::memory::render_transcript;
use crate::models::{Message, Passage};

/// Exact reply the model is told to give when the context has no answer.
pub const DECLINE_SENTENCE: &str = "I'm sorry, I don't have that information.";

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    name: String,
    subject: String,
}

impl PromptTemplate {
    pub fn new(name: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subject: subject.into(),
        }
    }

    pub fn from_config(config: &AssistantConfig) -> Self {
        Self::new(&config.name, &config.subject)
    }

    pub fn render(&self, passages: &[Passage], history: &[Message], input: &str) -> String {
        let context = passages
            .iter()
            .map(|p| p.text.trim())
            .collect::<Vec<_>>()
            .join("\n\n");
        let chat_history = render_transcript(history);
        let name = &self.name;
        let subject = &self.subject;

        format!(
            "You are a knowledgeable and friendly assistant for {name}.

Your goal is to give clear, concise, and helpful answers based only on the given context when the user's question is about {subject}.

If the user asks a general knowledge or unrelated question (for example about capitals, jokes, or personal matters), answer it appropriately and then gently steer the conversation back to {name}.

Use the chat history to tell whether the user is confused or unsatisfied with an earlier reply. If so, rephrase or clarify that reply.

After answering a question about {name}, you may add a natural follow-up such as \"Was that helpful?\" or \"Would you like to know more?\", but only when it adds value.

Do not make up information that is not in the context.

If the answer is not in the context, respond with: \"{DECLINE_SENTENCE}\"

Context:
{context}

Chat History:
{chat_history}

User Question:
{input}

Answer:
"
        )
    }
}
