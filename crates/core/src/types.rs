use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifier of a browser tab, as assigned by the DevTools protocol
/// (the page target id). Stable for the lifetime of the tab.
pub type TabId = String;

/// The request half of an observed network call.
///
/// `request_id` is the DevTools-assigned identifier, unique within the
/// browser session. It is the only link between the request-start and
/// request-completion events.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestRecord {
    pub request_id: String,
    pub method: String,
    pub url: String,
    pub timestamp_ms: i64,
    pub body: Option<RequestBody>,
}

/// A request payload as observed at capture time.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Textual payload, stored as delivered by the browser.
    Text(String),
    /// The browser reported a payload but withheld it (binary, streaming,
    /// or too large to ship over the protocol).
    Unavailable,
}

/// The response half of an observed network call. Response bodies are
/// never captured; `headers` holds the raw protocol value until the
/// serialization boundary flattens it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseRecord {
    pub request_id: String,
    pub status: u16,
    pub status_text: String,
    pub timestamp_ms: i64,
    pub headers: serde_json::Value,
}

/// One observed request paired with its (possibly absent) response.
///
/// Created with `response: None` the instant a qualifying request is seen;
/// transitions at most once to `Some` and never reverts. A permanently
/// `None` response is an expected terminal state, not an error.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkCall {
    pub request: RequestRecord,
    pub response: Option<ResponseRecord>,
}

impl NetworkCall {
    pub fn started(request: RequestRecord) -> Self {
        Self {
            request,
            response: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.response.is_some()
    }
}

// ─── Serialized forms ───────────────────────────────────────────────────────
//
// Plain-data shapes crossing the process boundary: the control surface
// reply, the panel, and the /chat request body all speak these.

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SerializedRequest {
    pub request_id: String,
    pub method: String,
    pub url: String,
    pub timestamp_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SerializedResponse {
    pub request_id: String,
    pub status: u16,
    pub status_text: String,
    pub timestamp_ms: i64,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SerializedCall {
    pub request: SerializedRequest,
    pub response: Option<SerializedResponse>,
}

impl SerializedCall {
    pub fn is_completed(&self) -> bool {
        self.response.is_some()
    }
}

// ─── Chat types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        Self {
            role: "system".to_string(),
            content: content.to_string(),
        }
    }

    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }

    pub fn assistant(content: &str) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.to_string(),
        }
    }
}

/// A provider's answer to one chat turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMReply {
    pub content: Option<String>,
    pub finish_reason: String,
    pub usage: serde_json::Value,
}

impl Default for LLMReply {
    fn default() -> Self {
        Self {
            content: None,
            finish_reason: String::new(),
            usage: serde_json::Value::Null,
        }
    }
}
