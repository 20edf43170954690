//! Answer synthesis: prompt rendering plus a streaming completion call.

use std::sync::Arc;

use crate::completion::{CompletionProvider, TextStream};
use crate::error::Result;
use crate::models::{Message, Passage};
use crate::prompt::PromptTemplate;

pub struct AnswerSynthesizer {
    completion: Arc<dyn CompletionProvider>,
    template: PromptTemplate,
}

impl AnswerSynthesizer {
    pub fn new(completion: Arc<dyn CompletionProvider>, template: PromptTemplate) -> Self {
        Self {
            completion,
            template,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.completion.name()
    }

    /// Render the prompt and start streaming the answer.
    ///
    /// Does not touch conversation memory; the caller commits the turn.
    pub async fn generate(
        &self,
        question: &str,
        passages: &[Passage],
        transcript: &[Message],
    ) -> Result<TextStream> {
        let prompt = self.template.render(passages, transcript, question);
        tracing::debug!(
            provider = self.completion.name(),
            model = self.completion.model_name(),
            passages = passages.len(),
            history = transcript.len(),
            "generating answer"
        );
        self.completion.complete(&prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedCompletion;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_generate_streams_increments_in_order() {
        let completion = Arc::new(ScriptedCompletion::new(&["Program X ", "costs ", "$500."]));
        let template = PromptTemplate::new("Acme", "pricing");
        let synth = AnswerSynthesizer::new(completion.clone(), template);
        let passages = vec![Passage {
            text: "Program X costs $500.".into(),
            source: "pricing.md".into(),
            offset: 0,
        }];

        let stream = synth
            .generate("What does Program X cost?", &passages, &[Message::assistant("Hello!")])
            .await
            .unwrap();
        let parts: Vec<String> = stream.try_collect().await.unwrap();
        assert_eq!(parts.concat(), "Program X costs $500.");

        let prompts = completion.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Program X costs $500."));
        assert!(prompts[0].contains("Assistant: Hello!"));
        assert!(prompts[0].contains("What does Program X cost?"));
    }

    #[tokio::test]
    async fn test_generate_surfaces_stream_failure() {
        let completion = Arc::new(ScriptedCompletion::failing_after(&["partial", "never"], 1));
        let synth = AnswerSynthesizer::new(completion, PromptTemplate::new("Acme", "pricing"));
        let stream = synth.generate("q", &[], &[]).await.unwrap();
        let result: Result<Vec<String>> = stream.try_collect().await;
        assert!(result.is_err());
    }
}
