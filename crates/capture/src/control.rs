use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use trafficlens_core::types::SerializedCall;
use trafficlens_core::{Error, Result};

/// Commands the control surface accepts. These are the only four request
/// kinds; replies travel back over the enclosed oneshot.
#[derive(Debug)]
pub enum ControlCommand {
    GetNetworkCalls {
        reply: oneshot::Sender<Vec<SerializedCall>>,
    },
    ClearNetworkCalls {
        reply: oneshot::Sender<()>,
    },
    ToggleRecording {
        enabled: bool,
        reply: oneshot::Sender<bool>,
    },
    GetRecordingStatus {
        reply: oneshot::Sender<bool>,
    },
}

/// The wire shape of a control request: `{type, enabled?}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ControlRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// Cloneable handle to the capture runtime. The only way any other
/// component reads or mutates capture state.
#[derive(Clone)]
pub struct CaptureHandle {
    tx: mpsc::Sender<ControlCommand>,
}

impl CaptureHandle {
    pub fn new(tx: mpsc::Sender<ControlCommand>) -> Self {
        Self { tx }
    }

    async fn request<T>(
        &self,
        command: ControlCommand,
        rx: oneshot::Receiver<T>,
    ) -> Result<T> {
        self.tx
            .send(command)
            .await
            .map_err(|_| Error::Capture("capture runtime is not running".to_string()))?;
        rx.await
            .map_err(|_| Error::Capture("capture runtime dropped the request".to_string()))
    }

    /// Flattened snapshot of every tab's calls, already serialized.
    pub async fn network_calls(&self) -> Result<Vec<SerializedCall>> {
        let (tx, rx) = oneshot::channel();
        self.request(ControlCommand::GetNetworkCalls { reply: tx }, rx)
            .await
    }

    pub async fn clear(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.request(ControlCommand::ClearNetworkCalls { reply: tx }, rx)
            .await
    }

    pub async fn toggle_recording(&self, enabled: bool) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.request(ControlCommand::ToggleRecording { enabled, reply: tx }, rx)
            .await
    }

    pub async fn recording_status(&self) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.request(ControlCommand::GetRecordingStatus { reply: tx }, rx)
            .await
    }

    /// Dispatch a wire-format control request and produce its JSON reply.
    ///
    /// A failing snapshot degrades to an empty call list so the caller's UI
    /// never sees a thrown error from a transient capture fault; the other
    /// kinds report `success: false` when the runtime is unreachable.
    pub async fn dispatch(&self, request: ControlRequest) -> Value {
        match request.kind.as_str() {
            "GET_NETWORK_CALLS" => match self.network_calls().await {
                Ok(calls) => json!({"success": true, "calls": calls}),
                Err(e) => {
                    warn!(error = %e, "network-call snapshot failed, returning empty set");
                    json!({"success": true, "calls": []})
                }
            },
            "CLEAR_NETWORK_CALLS" => match self.clear().await {
                Ok(()) => json!({"success": true}),
                Err(e) => json!({"success": false, "error": e.to_string()}),
            },
            "TOGGLE_RECORDING" => match request.enabled {
                Some(enabled) => match self.toggle_recording(enabled).await {
                    Ok(enabled) => json!({"success": true, "enabled": enabled}),
                    Err(e) => json!({"success": false, "error": e.to_string()}),
                },
                None => json!({
                    "success": false,
                    "error": "TOGGLE_RECORDING requires 'enabled'",
                }),
            },
            "GET_RECORDING_STATUS" => match self.recording_status().await {
                Ok(enabled) => json!({"success": true, "enabled": enabled}),
                Err(e) => json!({"success": false, "error": e.to_string()}),
            },
            other => json!({
                "success": false,
                "error": format!("unknown control message type: {}", other),
            }),
        }
    }
}
