use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use trafficlens_core::types::{NetworkCall, RequestRecord, ResponseRecord, TabId};
use trafficlens_storage::FlagStore;

use crate::control::{CaptureHandle, ControlCommand};
use crate::serialize;
use crate::store::CaptureStore;

/// Translated browser lifecycle notifications, as produced by the event
/// listener. The runtime is their only consumer.
#[derive(Debug)]
pub enum NetworkEvent {
    RequestStarted { tab_id: TabId, request: RequestRecord },
    RequestCompleted { response: ResponseRecord },
    TabActivated { tab_id: TabId },
    TabClosed { tab_id: TabId },
}

/// Owns the capture store and the recording flag, and is the single task
/// that ever touches them. Events and control requests drain through one
/// loop, one message at a time, so store mutations never interleave and
/// snapshots are always consistent.
pub struct CaptureRuntime {
    store: CaptureStore,
    recording: bool,
    flags: FlagStore,
    events_rx: mpsc::Receiver<NetworkEvent>,
    control_rx: mpsc::Receiver<ControlCommand>,
}

/// Channel depth for both the event and the control queue.
const CHANNEL_BUFFER: usize = 256;

impl CaptureRuntime {
    /// Load the persisted recording flag, build the runtime, and spawn it.
    ///
    /// The flag is read here, synchronously, before the caller gets the
    /// event sender, so no listener can feed traffic through a stale
    /// default flag.
    pub fn start(
        max_calls_per_tab: usize,
        flags: FlagStore,
    ) -> (CaptureHandle, mpsc::Sender<NetworkEvent>, JoinHandle<()>) {
        let recording = match flags.load() {
            Ok(Some(enabled)) => enabled,
            Ok(None) => true,
            Err(e) => {
                warn!(error = %e, "failed to load recording flag, defaulting to enabled");
                true
            }
        };

        let (events_tx, events_rx) = mpsc::channel(CHANNEL_BUFFER);
        let (control_tx, control_rx) = mpsc::channel(CHANNEL_BUFFER);

        let runtime = Self {
            store: CaptureStore::new(max_calls_per_tab),
            recording,
            flags,
            events_rx,
            control_rx,
        };
        let task = tokio::spawn(runtime.run());

        (CaptureHandle::new(control_tx), events_tx, task)
    }

    async fn run(mut self) {
        info!(recording = self.recording, "capture runtime started");
        loop {
            tokio::select! {
                // Drain observed traffic before answering reads, so a
                // snapshot reflects everything already delivered.
                biased;
                Some(event) = self.events_rx.recv() => self.handle_event(event),
                Some(command) = self.control_rx.recv() => self.handle_control(command),
                else => break,
            }
        }
        debug!("capture runtime stopped");
    }

    fn handle_event(&mut self, event: NetworkEvent) {
        match event {
            NetworkEvent::RequestStarted { tab_id, request } => {
                if !self.recording {
                    return;
                }
                debug!(tab = %tab_id, method = %request.method, url = %request.url, "request captured");
                self.store.append_call(&tab_id, NetworkCall::started(request));
            }
            NetworkEvent::RequestCompleted { response } => {
                // Completion is gated on the flag independently of the
                // start: a request recorded while recording was on gets no
                // response once it is off.
                if !self.recording {
                    return;
                }
                if !self.store.attach_response(&response) {
                    debug!(request_id = %response.request_id, "response for unknown request dropped");
                }
            }
            NetworkEvent::TabActivated { tab_id } => {
                // Global reset across every tab, not just the one left.
                debug!(tab = %tab_id, "active tab changed, clearing capture");
                self.store.clear_all();
            }
            NetworkEvent::TabClosed { tab_id } => {
                debug!(tab = %tab_id, "tab closed, removing capture entry");
                self.store.remove_tab(&tab_id);
            }
        }
    }

    fn handle_control(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::GetNetworkCalls { reply } => {
                let calls = serialize::serialize_calls(&self.store.flatten());
                let _ = reply.send(calls);
            }
            ControlCommand::ClearNetworkCalls { reply } => {
                self.store.clear_all();
                let _ = reply.send(());
            }
            ControlCommand::ToggleRecording { enabled, reply } => {
                self.recording = enabled;
                if let Err(e) = self.flags.save(enabled) {
                    // The in-memory toggle still applies; a read-only disk
                    // must not freeze recording state.
                    warn!(error = %e, "failed to persist recording flag");
                }
                info!(enabled, "recording toggled");
                let _ = reply.send(enabled);
            }
            ControlCommand::GetRecordingStatus { reply } => {
                let _ = reply.send(self.recording);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trafficlens_core::Paths;

    fn request(id: &str, ts: i64) -> RequestRecord {
        RequestRecord {
            request_id: id.to_string(),
            method: "GET".to_string(),
            url: format!("https://api.example.com/{}", id),
            timestamp_ms: ts,
            body: None,
        }
    }

    fn response(id: &str, status: u16) -> ResponseRecord {
        ResponseRecord {
            request_id: id.to_string(),
            status,
            status_text: "OK".to_string(),
            timestamp_ms: 0,
            headers: serde_json::json!({}),
        }
    }

    fn start_runtime(
        dir: &tempfile::TempDir,
    ) -> (CaptureHandle, mpsc::Sender<NetworkEvent>, JoinHandle<()>) {
        let flags = FlagStore::new(&Paths::with_base(dir.path().to_path_buf()));
        CaptureRuntime::start(100, flags)
    }

    #[tokio::test]
    async fn test_capture_then_complete_then_tab_switch() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, events, _task) = start_runtime(&dir);

        events
            .send(NetworkEvent::RequestStarted {
                tab_id: "tab-5".to_string(),
                request: request("r1", 10),
            })
            .await
            .unwrap();

        let calls = handle.network_calls().await.unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].response.is_none());

        events
            .send(NetworkEvent::RequestCompleted {
                response: response("r1", 200),
            })
            .await
            .unwrap();

        let calls = handle.network_calls().await.unwrap();
        assert_eq!(calls[0].response.as_ref().unwrap().status, 200);

        events
            .send(NetworkEvent::TabActivated {
                tab_id: "tab-6".to_string(),
            })
            .await
            .unwrap();

        assert!(handle.network_calls().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recording_off_gates_starts_and_completions() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, events, _task) = start_runtime(&dir);

        events
            .send(NetworkEvent::RequestStarted {
                tab_id: "tab-1".to_string(),
                request: request("r1", 10),
            })
            .await
            .unwrap();

        assert!(!handle.toggle_recording(false).await.unwrap());

        // a new start is ignored
        events
            .send(NetworkEvent::RequestStarted {
                tab_id: "tab-1".to_string(),
                request: request("r2", 20),
            })
            .await
            .unwrap();
        // and so is the completion of the already-recorded request
        events
            .send(NetworkEvent::RequestCompleted {
                response: response("r1", 200),
            })
            .await
            .unwrap();

        let calls = handle.network_calls().await.unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].request.request_id, "r1");
        assert!(calls[0].response.is_none());
    }

    #[tokio::test]
    async fn test_orphan_response_leaves_store_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, events, _task) = start_runtime(&dir);

        events
            .send(NetworkEvent::RequestStarted {
                tab_id: "tab-1".to_string(),
                request: request("r1", 10),
            })
            .await
            .unwrap();
        events
            .send(NetworkEvent::RequestCompleted {
                response: response("never-seen", 200),
            })
            .await
            .unwrap();

        let calls = handle.network_calls().await.unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].response.is_none());
    }

    #[tokio::test]
    async fn test_tab_close_removes_and_later_append_is_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, events, _task) = start_runtime(&dir);

        events
            .send(NetworkEvent::RequestStarted {
                tab_id: "tab-1".to_string(),
                request: request("r1", 10),
            })
            .await
            .unwrap();
        events
            .send(NetworkEvent::TabClosed {
                tab_id: "tab-1".to_string(),
            })
            .await
            .unwrap();
        events
            .send(NetworkEvent::RequestStarted {
                tab_id: "tab-1".to_string(),
                request: request("r2", 20),
            })
            .await
            .unwrap();

        let calls = handle.network_calls().await.unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].request.request_id, "r2");
    }

    #[tokio::test]
    async fn test_explicit_clear() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, events, _task) = start_runtime(&dir);

        events
            .send(NetworkEvent::RequestStarted {
                tab_id: "tab-1".to_string(),
                request: request("r1", 10),
            })
            .await
            .unwrap();

        handle.clear().await.unwrap();
        assert!(handle.network_calls().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_toggle_persists_and_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, _events, task) = start_runtime(&dir);

        handle.toggle_recording(false).await.unwrap();
        drop(handle);
        drop(_events);
        let _ = task.await;

        // a fresh runtime over the same paths comes up disabled
        let (handle, events, _task) = start_runtime(&dir);
        assert!(!handle.recording_status().await.unwrap());

        events
            .send(NetworkEvent::RequestStarted {
                tab_id: "tab-1".to_string(),
                request: request("r1", 10),
            })
            .await
            .unwrap();
        assert!(handle.network_calls().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_status_reports_current_flag() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, _events, _task) = start_runtime(&dir);

        assert!(handle.recording_status().await.unwrap());
        handle.toggle_recording(false).await.unwrap();
        assert!(!handle.recording_status().await.unwrap());
        handle.toggle_recording(true).await.unwrap();
        assert!(handle.recording_status().await.unwrap());
    }
}
