//! Bridges the browser's request-lifecycle notifications into capture
//! runtime events.
//!
//! Observation is strictly passive: only the `Network` domain is enabled,
//! never `Fetch` interception, so no request can be blocked, delayed, or
//! cancelled by this component regardless of recording state.

use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use trafficlens_core::config::BrowserConfig;
use trafficlens_core::types::{RequestBody, RequestRecord, ResponseRecord};
use trafficlens_core::{Error, Result};

use crate::cdp::{CdpConnection, CdpEvent};
use crate::runtime::NetworkEvent;

/// Resource types that mean "programmatic HTTP call". Everything else
/// (page navigations, images, scripts) is discarded.
fn is_programmatic(resource_type: Option<&str>) -> bool {
    matches!(resource_type, Some("XHR") | Some("Fetch"))
}

pub struct BrowserListener {
    endpoint: String,
    poll_interval: Duration,
    events_tx: mpsc::Sender<NetworkEvent>,
}

impl BrowserListener {
    pub fn new(config: &BrowserConfig, events_tx: mpsc::Sender<NetworkEvent>) -> Self {
        Self {
            endpoint: config.cdp_endpoint.trim_end_matches('/').to_string(),
            poll_interval: Duration::from_millis(config.active_tab_poll_ms.max(100)),
            events_tx,
        }
    }

    /// Attach to the browser and translate its events until the connection
    /// drops. Individual event delivery is never retried: the protocol
    /// delivers each lifecycle stage at most once.
    pub async fn run(self) -> Result<()> {
        let ws_url = discover_ws_url(&self.endpoint).await?;
        let (conn, mut cdp_events) = CdpConnection::connect(&ws_url).await?;
        let conn = std::sync::Arc::new(conn);
        info!(endpoint = %self.endpoint, "attached to browser");

        conn.send_command("Target.setDiscoverTargets", None, json!({"discover": true}))
            .await?;
        conn.send_command(
            "Target.setAutoAttach",
            None,
            json!({"autoAttach": true, "waitForDebuggerOnStart": false, "flatten": true}),
        )
        .await?;

        let watcher = tokio::spawn(watch_active_tab(
            self.endpoint.clone(),
            self.poll_interval,
            self.events_tx.clone(),
        ));

        // session id -> page target id, maintained from attach/detach events
        let mut sessions: HashMap<String, String> = HashMap::new();
        let mut page_targets: HashSet<String> = HashSet::new();

        while let Some(event) = cdp_events.recv().await {
            match event.method.as_str() {
                "Target.attachedToTarget" => {
                    let info = &event.params["targetInfo"];
                    if info["type"].as_str() != Some("page") {
                        continue;
                    }
                    let (Some(session_id), Some(target_id)) = (
                        event.params["sessionId"].as_str(),
                        info["targetId"].as_str(),
                    ) else {
                        continue;
                    };
                    sessions.insert(session_id.to_string(), target_id.to_string());
                    page_targets.insert(target_id.to_string());
                    // spawned so a slow command response can never stall
                    // the event loop that has to deliver it
                    let conn = conn.clone();
                    let session_id = session_id.to_string();
                    let target_id = target_id.to_string();
                    tokio::spawn(async move {
                        if let Err(e) = conn
                            .send_command("Network.enable", Some(&session_id), json!({}))
                            .await
                        {
                            warn!(target = %target_id, error = %e, "failed to enable network domain");
                        }
                    });
                }
                "Target.detachedFromTarget" => {
                    if let Some(session_id) = event.params["sessionId"].as_str() {
                        sessions.remove(session_id);
                    }
                }
                "Target.targetCreated" => {
                    let info = &event.params["targetInfo"];
                    if info["type"].as_str() == Some("page") {
                        if let Some(target_id) = info["targetId"].as_str() {
                            page_targets.insert(target_id.to_string());
                        }
                    }
                }
                "Target.targetDestroyed" => {
                    let Some(target_id) = event.params["targetId"].as_str() else {
                        continue;
                    };
                    if page_targets.remove(target_id) {
                        self.emit(NetworkEvent::TabClosed {
                            tab_id: target_id.to_string(),
                        })
                        .await?;
                    }
                }
                "Network.requestWillBeSent" => {
                    let Some(tab_id) = tab_for(&sessions, &event) else {
                        continue;
                    };
                    if let Some(translated) = decode_request_started(&tab_id, &event.params) {
                        self.emit(translated).await?;
                    }
                }
                "Network.responseReceived" => {
                    if tab_for(&sessions, &event).is_none() {
                        continue;
                    }
                    if let Some(translated) = decode_request_completed(&event.params) {
                        self.emit(translated).await?;
                    }
                }
                _ => {}
            }
        }

        watcher.abort();
        Err(Error::Browser("browser connection closed".to_string()))
    }

    async fn emit(&self, event: NetworkEvent) -> Result<()> {
        self.events_tx
            .send(event)
            .await
            .map_err(|_| Error::Capture("capture runtime is not running".to_string()))
    }
}

fn tab_for(sessions: &HashMap<String, String>, event: &CdpEvent) -> Option<String> {
    sessions.get(event.session_id.as_deref()?).cloned()
}

/// Resolve the browser-level WebSocket URL from the debugging endpoint.
async fn discover_ws_url(endpoint: &str) -> Result<String> {
    let url = format!("{}/json/version", endpoint);
    let version: Value = reqwest::get(&url)
        .await
        .map_err(|e| Error::Browser(format!("cannot reach browser at {}: {}", endpoint, e)))?
        .json()
        .await
        .map_err(|e| Error::Browser(format!("bad /json/version payload: {}", e)))?;

    version["webSocketDebuggerUrl"]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| Error::Browser("no webSocketDebuggerUrl in /json/version".to_string()))
}

/// Translate a `Network.requestWillBeSent` payload, applying the resource
/// filter. Returns None for anything that is not a programmatic call.
fn decode_request_started(tab_id: &str, params: &Value) -> Option<NetworkEvent> {
    if !is_programmatic(params["type"].as_str()) {
        return None;
    }
    let request = &params["request"];
    let body = match request["postData"].as_str() {
        Some(text) => Some(RequestBody::Text(text.to_string())),
        None if request["hasPostData"].as_bool() == Some(true) => Some(RequestBody::Unavailable),
        None => None,
    };

    Some(NetworkEvent::RequestStarted {
        tab_id: tab_id.to_string(),
        request: RequestRecord {
            request_id: params["requestId"].as_str()?.to_string(),
            method: request["method"].as_str().unwrap_or("GET").to_string(),
            url: request["url"].as_str()?.to_string(),
            timestamp_ms: wall_time_ms(params),
            body,
        },
    })
}

/// Translate a `Network.responseReceived` payload. Header payloads the
/// browser withholds (cross-origin) degrade to an empty object; status and
/// text are still recorded.
fn decode_request_completed(params: &Value) -> Option<NetworkEvent> {
    if !is_programmatic(params["type"].as_str()) {
        return None;
    }
    let response = &params["response"];
    let headers = response
        .get("headers")
        .filter(|h| h.is_object())
        .cloned()
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()));

    Some(NetworkEvent::RequestCompleted {
        response: ResponseRecord {
            request_id: params["requestId"].as_str()?.to_string(),
            status: response["status"].as_u64().unwrap_or(0) as u16,
            status_text: response["statusText"].as_str().unwrap_or("").to_string(),
            timestamp_ms: wall_time_ms(params),
            headers,
        },
    })
}

/// Epoch millis for an event: the protocol's wallTime when present
/// (seconds since epoch), wall clock otherwise.
fn wall_time_ms(params: &Value) -> i64 {
    params["wallTime"]
        .as_f64()
        .map(|secs| (secs * 1000.0) as i64)
        .unwrap_or_else(|| chrono::Utc::now().timestamp_millis())
}

/// Pick the active page target out of a `/json/list` payload. Chromium
/// orders the list most-recently-used first, which is the only activation
/// signal the protocol offers.
fn front_page_target(targets: &Value) -> Option<String> {
    targets
        .as_array()?
        .iter()
        .find(|t| t["type"].as_str() == Some("page"))
        .and_then(|t| t["id"].as_str())
        .map(|s| s.to_string())
}

/// Poll the target list and emit a `TabActivated` whenever the front page
/// target changes. Poll failures are transient (browser restarting) and
/// only logged.
async fn watch_active_tab(
    endpoint: String,
    interval: Duration,
    events_tx: mpsc::Sender<NetworkEvent>,
) {
    let url = format!("{}/json/list", endpoint);
    let mut current: Option<String> = None;

    loop {
        tokio::time::sleep(interval).await;

        let targets = match reqwest::get(&url).await {
            Ok(resp) => match resp.json::<Value>().await {
                Ok(v) => v,
                Err(e) => {
                    debug!(error = %e, "bad /json/list payload");
                    continue;
                }
            },
            Err(e) => {
                debug!(error = %e, "active-tab poll failed");
                continue;
            }
        };

        let Some(front) = front_page_target(&targets) else {
            continue;
        };
        if current.as_deref() == Some(front.as_str()) {
            continue;
        }
        current = Some(front.clone());
        if events_tx
            .send(NetworkEvent::TabActivated { tab_id: front })
            .await
            .is_err()
        {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn xhr_request(request_id: &str, resource_type: &str) -> Value {
        json!({
            "requestId": request_id,
            "type": resource_type,
            "wallTime": 1_700_000_000.5,
            "request": {
                "url": "https://api.example.com/items",
                "method": "POST",
                "postData": "{\"page\": 1}",
            }
        })
    }

    #[test]
    fn test_decode_request_started_xhr() {
        let event = decode_request_started("tab-1", &xhr_request("r1", "XHR")).unwrap();
        let NetworkEvent::RequestStarted { tab_id, request } = event else {
            panic!("wrong event kind");
        };
        assert_eq!(tab_id, "tab-1");
        assert_eq!(request.request_id, "r1");
        assert_eq!(request.method, "POST");
        assert_eq!(request.url, "https://api.example.com/items");
        assert_eq!(request.timestamp_ms, 1_700_000_000_500);
        assert_eq!(request.body, Some(RequestBody::Text("{\"page\": 1}".to_string())));
    }

    #[test]
    fn test_decode_filters_non_programmatic_types() {
        for kind in ["Document", "Image", "Script", "Stylesheet", "Font"] {
            assert!(decode_request_started("tab-1", &xhr_request("r1", kind)).is_none());
        }
        assert!(decode_request_started("tab-1", &xhr_request("r1", "Fetch")).is_some());
    }

    #[test]
    fn test_decode_withheld_body_marks_unavailable() {
        let mut params = xhr_request("r1", "Fetch");
        params["request"].as_object_mut().unwrap().remove("postData");
        params["request"]["hasPostData"] = json!(true);

        let NetworkEvent::RequestStarted { request, .. } =
            decode_request_started("tab-1", &params).unwrap()
        else {
            panic!("wrong event kind");
        };
        assert_eq!(request.body, Some(RequestBody::Unavailable));
    }

    #[test]
    fn test_decode_bodyless_request() {
        let mut params = xhr_request("r1", "XHR");
        params["request"].as_object_mut().unwrap().remove("postData");
        params["request"]["method"] = json!("GET");

        let NetworkEvent::RequestStarted { request, .. } =
            decode_request_started("tab-1", &params).unwrap()
        else {
            panic!("wrong event kind");
        };
        assert_eq!(request.body, None);
    }

    #[test]
    fn test_decode_response_received() {
        let params = json!({
            "requestId": "r1",
            "type": "XHR",
            "wallTime": 1_700_000_001.0,
            "response": {
                "status": 404,
                "statusText": "Not Found",
                "headers": {"content-type": "application/json"},
            }
        });

        let NetworkEvent::RequestCompleted { response } =
            decode_request_completed(&params).unwrap()
        else {
            panic!("wrong event kind");
        };
        assert_eq!(response.request_id, "r1");
        assert_eq!(response.status, 404);
        assert_eq!(response.status_text, "Not Found");
        assert_eq!(response.headers["content-type"], "application/json");
    }

    #[test]
    fn test_decode_response_without_headers_still_records_status() {
        let params = json!({
            "requestId": "r1",
            "type": "Fetch",
            "response": {"status": 204, "statusText": ""}
        });

        let NetworkEvent::RequestCompleted { response } =
            decode_request_completed(&params).unwrap()
        else {
            panic!("wrong event kind");
        };
        assert_eq!(response.status, 204);
        assert!(response.headers.as_object().unwrap().is_empty());
    }

    #[test]
    fn test_decode_response_type_filter() {
        let params = json!({
            "requestId": "r1",
            "type": "Document",
            "response": {"status": 200, "statusText": "OK"}
        });
        assert!(decode_request_completed(&params).is_none());
    }

    #[test]
    fn test_front_page_target_skips_non_pages() {
        let targets = json!([
            {"id": "devtools-1", "type": "other"},
            {"id": "worker-1", "type": "service_worker"},
            {"id": "tab-7", "type": "page"},
            {"id": "tab-3", "type": "page"},
        ]);
        assert_eq!(front_page_target(&targets).unwrap(), "tab-7");
        assert_eq!(front_page_target(&json!([])), None);
    }
}
