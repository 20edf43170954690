#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use futures::stream;
use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use grounded_chat::completion::{CompletionProvider, TextStream};
use grounded_chat::error::{RagError, Result};
use grounded_chat::prompt::DECLINE_SENTENCE;

pub use grounded_chat::testing::{word_vector, WordEmbedder, DIMS};

fn section<'a>(prompt: &'a str, start: &str, end: &str) -> &'a str {
    let Some(from) = prompt.find(start).map(|i| i + start.len()) else {
        return "";
    };
    let to = prompt[from..].find(end).map(|i| from + i).unwrap_or(prompt.len());
    &prompt[from..to]
}

/// Answers "Program X" questions from context only, and declines otherwise.
pub fn fake_answer(prompt: &str) -> Vec<String> {
    let context = section(prompt, "Context:\n", "\n\nChat History:");
    let question = section(prompt, "User Question:\n", "\n\nAnswer:");
    if question.contains("Program X") && context.contains("Program X costs $500") {
        vec!["Program X ".into(), "costs ".into(), "$500.".into()]
    } else {
        vec![DECLINE_SENTENCE.to_string()]
    }
}

/// Completion provider that answers via [`fake_answer`], optionally failing
/// after a number of increments.
#[derive(Default)]
pub struct FakeCompletion {
    pub fail_after: Option<usize>,
    pub prompts: Mutex<Vec<String>>,
}

impl FakeCompletion {
    pub fn failing_after(n: usize) -> Self {
        Self {
            fail_after: Some(n),
            ..Self::default()
        }
    }

    pub fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl CompletionProvider for FakeCompletion {
    fn name(&self) -> &str {
        "fake"
    }
    fn model_name(&self) -> &str {
        "fake-model"
    }
    async fn complete(&self, prompt: &str) -> Result<TextStream> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let mut items: Vec<Result<String>> = Vec::new();
        for (i, part) in fake_answer(prompt).into_iter().enumerate() {
            if self.fail_after == Some(i) {
                items.push(Err(RagError::completion("fake", "connection reset")));
                break;
            }
            items.push(Ok(part));
        }
        Ok(Box::pin(stream::iter(items)))
    }
}

/// A small corpus: one short pricing page plus filler long enough to span
/// several passages.
pub fn write_corpus(data: &std::path::Path) {
    fs::create_dir_all(data.join("programs")).unwrap();
    fs::write(
        data.join("pricing.md"),
        "# Pricing\n\nProgram X costs $500 and includes three counselling sessions.",
    )
    .unwrap();
    fs::write(
        data.join("programs/overview.md"),
        "Our counsellors work with students from grade eight onwards. \
         Each engagement begins with an aptitude assessment, followed by a \
         one-to-one session that walks through the report. Parents are \
         welcome to join. Follow-up sessions can be booked at any time and \
         are held online or at one of our centres. We also run workshops \
         for schools, covering stream selection, entrance exams, and study \
         habits. Workshops last half a day and are tailored to each class.",
    )
    .unwrap();
    fs::write(
        data.join("contact.txt"),
        "Office hours are Monday to Saturday, ten to six. Call or email to book.",
    )
    .unwrap();
}

/// Temp workspace with `data/` filled by [`write_corpus`].
pub fn setup_workspace() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let data = tmp.path().join("data");
    write_corpus(&data);
    (tmp, data)
}

// ============ Fake Gemini API ============

#[derive(Default)]
pub struct FakeGeminiStats {
    pub embed_requests: AtomicUsize,
    pub generate_requests: AtomicUsize,
}

/// Serve the two Gemini endpoints the crate calls on an ephemeral port.
/// Returns the base URL.
pub async fn spawn_fake_gemini() -> (String, Arc<FakeGeminiStats>) {
    let stats = Arc::new(FakeGeminiStats::default());
    let app = Router::new()
        .route("/v1beta/models/{action}", post(handle_gemini))
        .with_state(stats.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), stats)
}

async fn handle_gemini(
    State(stats): State<Arc<FakeGeminiStats>>,
    Path(action): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    if action.ends_with(":batchEmbedContents") {
        stats.embed_requests.fetch_add(1, Ordering::SeqCst);
        let embeddings: Vec<Value> = body["requests"]
            .as_array()
            .map(|reqs| {
                reqs.iter()
                    .map(|r| {
                        let text = r["content"]["parts"][0]["text"].as_str().unwrap_or("");
                        json!({ "values": word_vector(text) })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Json(json!({ "embeddings": embeddings })).into_response()
    } else if action.ends_with(":streamGenerateContent") {
        stats.generate_requests.fetch_add(1, Ordering::SeqCst);
        let prompt = body["contents"][0]["parts"][0]["text"]
            .as_str()
            .unwrap_or("");
        let mut sse = String::new();
        for part in fake_answer(prompt) {
            let event = json!({
                "candidates": [{ "content": { "role": "model", "parts": [{ "text": part }] } }]
            });
            sse.push_str(&format!("data: {}\r\n\r\n", event));
        }
        ([(CONTENT_TYPE, "text/event-stream")], sse).into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

/// Config file pointing both providers at `base_url`, reading the key from `key_env`.
pub fn write_config(root: &std::path::Path, base_url: &str, key_env: &str) -> PathBuf {
    let config = format!(
        r#"[data]
root = "{root}/data"

[index]
path = "{root}/index/chat.sqlite"

[embedding]
provider = "gemini"
model = "models/embedding-001"
dims = {DIMS}
api_key_env = "{key_env}"
base_url = "{base_url}"

[llm]
provider = "gemini"
api_key_env = "{key_env}"
base_url = "{base_url}"

[assistant]
name = "Acme Counselling"
"#,
        root = root.display(),
    );
    let path = root.join("config").join("chat.toml");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, config).unwrap();
    path
}
