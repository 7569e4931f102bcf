use std::sync::Arc;

use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use trafficlens_capture::{BrowserListener, CaptureHandle, CaptureRuntime, ControlRequest};
use trafficlens_core::types::{ChatMessage, SerializedCall};
use trafficlens_core::{Config, Paths};
use trafficlens_providers::{OllamaProvider, Provider};
use trafficlens_storage::{FlagStore, SessionStore};

// ---------------------------------------------------------------------------
// Shared state passed to HTTP handlers
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct GatewayState {
    capture: CaptureHandle,
    provider: Arc<dyn Provider>,
    session_store: Arc<SessionStore>,
    config: Config,
}

pub async fn run(host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let paths = Paths::new();
    paths.ensure_dirs()?;

    let mut config = Config::load_or_default(&paths)?;
    if let Some(host) = host {
        config.gateway.host = host;
    }
    if let Some(port) = port {
        config.gateway.port = port;
    }

    // start() reads the persisted recording flag before handing out the
    // event sender, so the listener can never race a stale default.
    let flags = FlagStore::new(&paths);
    let (capture, events_tx, _runtime_task) =
        CaptureRuntime::start(config.capture.max_calls_per_tab, flags);

    let listener = BrowserListener::new(&config.browser, events_tx);
    tokio::spawn(async move {
        if let Err(e) = listener.run().await {
            // keep serving whatever was captured; the gateway outlives the browser
            warn!(error = %e, "browser listener stopped");
        }
    });

    let provider: Arc<dyn Provider> = Arc::new(OllamaProvider::new(
        config.model.api_base.as_deref(),
        &config.model.model,
        config.model.max_tokens,
        config.model.temperature,
    ));

    let state = GatewayState {
        capture,
        provider,
        session_store: Arc::new(SessionStore::new(paths.clone())),
        config: config.clone(),
    };

    let app = Router::new()
        .route("/chat", post(handle_chat))
        .route("/v1/control", post(handle_control))
        .route("/v1/health", get(handle_health))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = config.gateway_addr();
    info!(addr = %addr, model = %config.model.model, "gateway listening");
    let tcp = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(tcp, app).await?;

    Ok(())
}

// ---------------------------------------------------------------------------
// HTTP request / response types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    message: String,
    #[serde(default)]
    network_calls: Vec<SerializedCall>,
    #[serde(default = "default_session")]
    session: String,
}

fn default_session() -> String {
    "panel:default".to_string()
}

/// One entry of the message sequence the panel renders.
#[derive(Debug, Serialize)]
struct PanelMessage {
    #[serde(rename = "type")]
    kind: String,
    data: PanelData,
}

#[derive(Debug, Serialize)]
struct PanelData {
    content: String,
}

impl PanelMessage {
    fn from_chat(msg: &ChatMessage) -> Self {
        let kind = match msg.role.as_str() {
            "user" => "human",
            "assistant" => "ai",
            _ => "system",
        };
        Self {
            kind: kind.to_string(),
            data: PanelData {
                content: msg.content.clone(),
            },
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    model: String,
    uptime_secs: u64,
    version: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /chat: answer a question about the supplied network calls.
///
/// A provider failure is narrated as an assistant message in a normal 200
/// response; the panel treats any well-formed body as success.
async fn handle_chat(
    State(state): State<GatewayState>,
    Json(req): Json<ChatRequest>,
) -> impl IntoResponse {
    let history = match state.session_store.load(&req.session) {
        Ok(history) => history,
        Err(e) => {
            warn!(error = %e, session = %req.session, "failed to load session, starting fresh");
            Vec::new()
        }
    };

    // the panel already ships only the most-recent subset; enforce the wire
    // cap anyway before anything reaches the prompt
    let mut network_calls = req.network_calls;
    network_calls.sort_by_key(|c| c.request.timestamp_ms);
    if network_calls.len() > state.config.capture.chat_call_limit {
        let excess = network_calls.len() - state.config.capture.chat_call_limit;
        network_calls.drain(..excess);
    }

    let prompt = build_prompt(&network_calls, state.config.capture.prompt_call_limit);

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(&prompt));
    messages.extend(history.iter().cloned());
    messages.push(ChatMessage::user(&req.message));

    let answer = match state.provider.chat(&messages).await {
        Ok(reply) => reply
            .content
            .unwrap_or_else(|| "The model returned an empty reply.".to_string()),
        Err(e) => {
            error!(error = %e, "model invocation failed");
            format!(
                "I couldn't reach the model runtime: {}. Is Ollama running?",
                e
            )
        }
    };

    let user_msg = ChatMessage::user(&req.message);
    let ai_msg = ChatMessage::assistant(&answer);
    for msg in [&user_msg, &ai_msg] {
        if let Err(e) = state.session_store.append(&req.session, msg) {
            warn!(error = %e, "failed to persist chat message");
        }
    }

    let mut updated = history;
    updated.push(user_msg);
    updated.push(ai_msg);

    let body: Vec<PanelMessage> = updated.iter().map(PanelMessage::from_chat).collect();
    Json(body)
}

/// POST /v1/control: the capture control surface.
async fn handle_control(
    State(state): State<GatewayState>,
    Json(req): Json<ControlRequest>,
) -> impl IntoResponse {
    Json(state.capture.dispatch(req).await)
}

async fn handle_health(State(state): State<GatewayState>) -> impl IntoResponse {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    let start = START.get_or_init(std::time::Instant::now);

    Json(HealthResponse {
        status: "ok".to_string(),
        model: state.config.model.model.clone(),
        uptime_secs: start.elapsed().as_secs(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ---------------------------------------------------------------------------
// Prompt construction
// ---------------------------------------------------------------------------

/// Format the captured calls into the system prompt, most recent first,
/// capped for prompt size.
fn build_prompt(calls: &[SerializedCall], limit: usize) -> String {
    let mut recent: Vec<&SerializedCall> = calls.iter().collect();
    recent.sort_by_key(|c| std::cmp::Reverse(c.request.timestamp_ms));
    recent.truncate(limit);

    let mut prompt = String::from(
        "You are a network-traffic analyst embedded in the user's browser.\n\
         Answer questions about the captured HTTP calls below. Be concise and \
         concrete; refer to calls by method and URL.\n\n",
    );

    if recent.is_empty() {
        prompt.push_str("No network calls have been captured yet.\n");
    } else {
        prompt.push_str("## Captured network calls (most recent first)\n");
        for call in &recent {
            prompt.push_str(&format_call(call));
            prompt.push('\n');
        }
    }

    prompt
}

fn format_call(call: &SerializedCall) -> String {
    let when = chrono::DateTime::from_timestamp_millis(call.request.timestamp_ms)
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string());

    let mut line = match &call.response {
        Some(resp) => format!(
            "- [{}] {} {} -> {} {}",
            when, call.request.method, call.request.url, resp.status, resp.status_text
        ),
        None => format!(
            "- [{}] {} {} -> (no response)",
            when, call.request.method, call.request.url
        ),
    };

    if let Some(body) = &call.request.body {
        line.push_str(&format!("\n  request body: {}", body));
    }
    if let Some(content_type) = call
        .response
        .as_ref()
        .and_then(|r| r.headers.get("content-type"))
    {
        line.push_str(&format!("\n  content-type: {}", content_type));
    }

    line
}
