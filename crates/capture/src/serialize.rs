use std::collections::BTreeMap;

use serde_json::Value;
use trafficlens_core::types::{
    NetworkCall, RequestBody, SerializedCall, SerializedRequest, SerializedResponse,
};

/// Upper bound on the request-body preview shipped across the boundary.
/// Anything beyond it is lost by design.
pub const MAX_BODY_PREVIEW: usize = 1000;

/// Placeholder for payloads the browser reported but did not deliver.
pub const BODY_NOT_CAPTURED: &str = "[body not captured]";

/// Truncate a string to at most `max_bytes`, respecting UTF-8 char boundaries.
fn truncate_preview(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Flatten a raw protocol header payload into a plain string map.
/// Anything that is not a JSON object degrades to an empty map; non-string
/// values are stringified.
pub fn flatten_headers(raw: &Value) -> BTreeMap<String, String> {
    let Some(obj) = raw.as_object() else {
        return BTreeMap::new();
    };
    obj.iter()
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), value)
        })
        .collect()
}

fn serialize_body(body: &RequestBody) -> String {
    match body {
        RequestBody::Text(text) => truncate_preview(text, MAX_BODY_PREVIEW).to_string(),
        RequestBody::Unavailable => BODY_NOT_CAPTURED.to_string(),
    }
}

/// Convert one internal record into the plain-data shape used for
/// cross-context messaging and the /chat body.
pub fn serialize_call(call: &NetworkCall) -> SerializedCall {
    SerializedCall {
        request: SerializedRequest {
            request_id: call.request.request_id.clone(),
            method: call.request.method.clone(),
            url: call.request.url.clone(),
            timestamp_ms: call.request.timestamp_ms,
            body: call.request.body.as_ref().map(serialize_body),
        },
        response: call.response.as_ref().map(|resp| SerializedResponse {
            request_id: resp.request_id.clone(),
            status: resp.status,
            status_text: resp.status_text.clone(),
            timestamp_ms: resp.timestamp_ms,
            headers: flatten_headers(&resp.headers),
        }),
    }
}

pub fn serialize_calls(calls: &[NetworkCall]) -> Vec<SerializedCall> {
    calls.iter().map(serialize_call).collect()
}
