//! Web chat server.
//!
//! Serves a single-page chat UI and a small JSON/SSE API on top of the
//! shared [`Assistant`]. Each browser tab creates its own session and deletes
//! it when the page is closed. Sessions left behind are dropped once they have
//! been idle for `[server].session_idle_secs`.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/` | Chat page |
//! | `POST`   | `/api/sessions` | Start a session; returns its id and greeting |
//! | `GET`    | `/api/sessions/{id}` | Session transcript |
//! | `DELETE` | `/api/sessions/{id}` | End a session |
//! | `POST`   | `/api/sessions/{id}/messages` | Ask a question; answer streams as SSE |
//! | `GET`    | `/health` | Health check (returns version) |
//!
//! # Streaming
//!
//! `POST /api/sessions/{id}/messages` takes `{ "content": "..." }` and
//! responds with `text/event-stream`:
//!
//! - `chunk`: `{ "text": "..." }`, one per answer increment
//! - `done`: `{ "answer": "..." }` with the full answer
//! - `error`: `{ "message": "..." }` if the turn failed; nothing was committed
//!
//! Closing the connection mid-answer cancels the turn.
//!
//! # Error Contract
//!
//! Non-streaming errors use:
//!
//! ```json
//! { "error": { "code": "not_found", "message": "no session with id ..." } }
//! ```

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Html, IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::config::Config;
use crate::models::Message;
use crate::runtime::Runtime;
use crate::session::{Assistant, SessionRegistry};
use crate::surface::{ChannelSurface, ChatSurface, SurfaceEvent};

/// Shared state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    assistant: Arc<Assistant>,
    sessions: Arc<SessionRegistry>,
    title: Arc<String>,
}

/// Build the index, then serve on `[server].bind` until the process ends.
///
/// Missing credentials or an empty corpus fail here, before binding.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let runtime = Runtime::new(config.clone());
    let assistant = Arc::new(runtime.assistant().await?);
    let sessions = Arc::new(SessionRegistry::new());
    spawn_idle_sweeper(
        sessions.clone(),
        Duration::from_secs(config.server.session_idle_secs),
    );
    let app = build_router(assistant, sessions, config.assistant.title_text());

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!("chat server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Periodically drop sessions idle for longer than `max_idle`.
pub fn spawn_idle_sweeper(
    sessions: Arc<SessionRegistry>,
    max_idle: Duration,
) -> tokio::task::JoinHandle<()> {
    let period = max_idle.min(Duration::from_secs(60));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let dropped = sessions.sweep_idle(max_idle).await;
            if dropped > 0 {
                let live = sessions.len().await;
                tracing::info!(dropped, live, "dropped idle sessions");
            }
        }
    })
}

pub fn build_router(
    assistant: Arc<Assistant>,
    sessions: Arc<SessionRegistry>,
    title: String,
) -> Router {
    let state = AppState {
        assistant,
        sessions,
        title: Arc::new(title),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_index))
        .route("/api/sessions", post(handle_create_session))
        .route(
            "/api/sessions/{id}",
            get(handle_get_session).delete(handle_delete_session),
        )
        .route("/api/sessions/{id}/messages", post(handle_post_message))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn parse_session_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| bad_request(format!("invalid session id: {}", raw)))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET / ============

async fn handle_index(State(state): State<AppState>) -> Html<String> {
    Html(INDEX_HTML.replace("{{title}}", &html_escape(&state.title)))
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

// ============ Sessions ============

#[derive(Serialize)]
struct SessionResponse {
    id: Uuid,
    messages: Vec<Message>,
}

async fn handle_create_session(
    State(state): State<AppState>,
) -> (StatusCode, Json<SessionResponse>) {
    let session = state.assistant.new_session();
    let messages = session.memory.transcript().to_vec();
    let id = state.sessions.insert(session).await;
    tracing::info!(session = %id, "session started");
    (StatusCode::CREATED, Json(SessionResponse { id, messages }))
}

async fn handle_get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, AppError> {
    let id = parse_session_id(&id)?;
    let handle = state
        .sessions
        .get(&id)
        .await
        .ok_or_else(|| not_found(format!("no session with id {}", id)))?;
    let session = handle.lock().await;
    Ok(Json(SessionResponse {
        id,
        messages: session.memory.transcript().to_vec(),
    }))
}

async fn handle_delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_session_id(&id)?;
    if state.sessions.remove(&id).await {
        tracing::info!(session = %id, "session ended");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(format!("no session with id {}", id)))
    }
}

// ============ POST /api/sessions/{id}/messages ============

#[derive(Deserialize)]
struct PostMessageRequest {
    content: String,
}

async fn handle_post_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PostMessageRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let id = parse_session_id(&id)?;
    if req.content.trim().is_empty() {
        return Err(bad_request("content must not be empty"));
    }
    let handle = state
        .sessions
        .get(&id)
        .await
        .ok_or_else(|| not_found(format!("no session with id {}", id)))?;

    let (tx, mut rx) = mpsc::channel::<SurfaceEvent>(64);
    let assistant = state.assistant.clone();
    tokio::spawn(async move {
        let mut session = handle.lock().await;
        let mut surface = ChannelSurface::new(tx);
        if let Err(e) = assistant
            .run_turn(&mut session, &req.content, &mut surface)
            .await
        {
            tracing::warn!(session = %id, error = %e, "turn failed");
            // Fails only when the client is already gone.
            let _ = surface.show_error(&e.to_string()).await;
        }
    });

    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            match event {
                SurfaceEvent::Chunk(text) => {
                    yield Ok(Event::default()
                        .event("chunk")
                        .data(serde_json::json!({ "text": text }).to_string()));
                }
                SurfaceEvent::Done(answer) => {
                    yield Ok(Event::default()
                        .event("done")
                        .data(serde_json::json!({ "answer": answer }).to_string()));
                }
                SurfaceEvent::Error(message) => {
                    yield Ok(Event::default()
                        .event("error")
                        .data(serde_json::json!({ "message": message }).to_string()));
                }
                SurfaceEvent::Message(_) => {}
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

const INDEX_HTML: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{{title}}</title>
<style>
  body { font-family: system-ui, sans-serif; max-width: 760px; margin: 0 auto; padding: 1rem; }
  #log { display: flex; flex-direction: column; gap: .75rem; margin-bottom: 5rem; }
  .msg { padding: .6rem .9rem; border-radius: .6rem; white-space: pre-wrap; line-height: 1.4; }
  .user { background: #e8f0fe; align-self: flex-end; }
  .assistant { background: #f3f3f3; align-self: flex-start; }
  .error { background: #fdecea; color: #8a1c1c; }
  form { position: fixed; bottom: 0; left: 0; right: 0; display: flex; gap: .5rem;
         max-width: 760px; margin: 0 auto; padding: 1rem; background: #fff; }
  input { flex: 1; padding: .6rem; font-size: 1rem; }
</style>
</head>
<body>
<h1>{{title}}</h1>
<div id="log"></div>
<form id="ask"><input id="q" autocomplete="off" placeholder="Ask a question"><button>Send</button></form>
<script>
const log = document.getElementById('log');
const form = document.getElementById('ask');
const input = document.getElementById('q');
let sessionId = null;

function bubble(role, text) {
  const div = document.createElement('div');
  div.className = 'msg ' + role;
  div.textContent = text;
  log.appendChild(div);
  window.scrollTo(0, document.body.scrollHeight);
  return div;
}

async function start() {
  const res = await fetch('/api/sessions', { method: 'POST' });
  const body = await res.json();
  sessionId = body.id;
  body.messages.forEach(m => bubble(m.role, m.content));
}

form.addEventListener('submit', async (e) => {
  e.preventDefault();
  const question = input.value.trim();
  if (!question || !sessionId) return;
  input.value = '';
  input.disabled = true;
  bubble('user', question);
  const answer = bubble('assistant', '▌');
  let text = '';

  const res = await fetch(`/api/sessions/${sessionId}/messages`, {
    method: 'POST',
    headers: { 'Content-Type': 'application/json' },
    body: JSON.stringify({ content: question }),
  });
  if (!res.ok) {
    const body = await res.json();
    answer.className = 'msg error';
    answer.textContent = body.error.message;
    input.disabled = false;
    return;
  }

  const reader = res.body.getReader();
  const decoder = new TextDecoder();
  let buf = '';
  for (;;) {
    const { value, done } = await reader.read();
    if (done) break;
    buf += decoder.decode(value, { stream: true });
    let idx;
    while ((idx = buf.indexOf('\n\n')) >= 0) {
      const raw = buf.slice(0, idx);
      buf = buf.slice(idx + 2);
      let event = 'message', data = '';
      raw.split('\n').forEach(line => {
        if (line.startsWith('event:')) event = line.slice(6).trim();
        else if (line.startsWith('data:')) data += line.slice(5).trim();
      });
      if (!data) continue;
      const payload = JSON.parse(data);
      if (event === 'chunk') {
        text += payload.text;
        answer.textContent = text + '▌';
      } else if (event === 'done') {
        answer.textContent = payload.answer;
      } else if (event === 'error') {
        answer.className = 'msg error';
        answer.textContent = 'Error: ' + payload.message;
      }
    }
  }
  input.disabled = false;
  input.focus();
});

window.addEventListener('pagehide', () => {
  if (sessionId) fetch(`/api/sessions/${sessionId}`, { method: 'DELETE', keepalive: true });
});

start();
</script>
</body>
</html>
"#;
