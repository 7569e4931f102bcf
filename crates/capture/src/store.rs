use std::collections::{HashMap, VecDeque};

use trafficlens_core::types::{NetworkCall, ResponseRecord, TabId};

/// One tab's captured calls: the ordered sequence plus a request-id index
/// so response attachment does not scan the sequence.
///
/// Records are addressed by monotonically increasing sequence numbers;
/// `base_seq` is the sequence number of the front record, which keeps the
/// index valid across front eviction.
#[derive(Debug, Default)]
struct TabCapture {
    calls: VecDeque<NetworkCall>,
    /// request id -> sequence number of the newest record for that id.
    index: HashMap<String, u64>,
    base_seq: u64,
    next_seq: u64,
}

impl TabCapture {
    fn append(&mut self, call: NetworkCall, cap: usize) {
        while self.calls.len() >= cap {
            self.evict_front();
        }
        self.index
            .insert(call.request.request_id.clone(), self.next_seq);
        self.calls.push_back(call);
        self.next_seq += 1;
    }

    fn evict_front(&mut self) {
        if let Some(evicted) = self.calls.pop_front() {
            let id = &evicted.request.request_id;
            // A redirect re-appends under the same id; only drop the index
            // entry if it still points at the record being evicted.
            if self.index.get(id) == Some(&self.base_seq) {
                self.index.remove(id);
            }
            self.base_seq += 1;
        }
    }

    fn attach(&mut self, response: &ResponseRecord) -> bool {
        let Some(&seq) = self.index.get(&response.request_id) else {
            return false;
        };
        let idx = (seq - self.base_seq) as usize;
        match self.calls.get_mut(idx) {
            Some(call) if call.response.is_none() => {
                call.response = Some(response.clone());
                true
            }
            _ => false,
        }
    }

    fn clear(&mut self) {
        self.calls.clear();
        self.index.clear();
        self.base_seq = self.next_seq;
    }
}

/// The Tab Capture Set: every tab's ordered call sequence.
///
/// Plain owned data, no interior locking: the capture runtime task is the
/// sole owner and the only code that mutates it. Everything else goes
/// through the control surface.
#[derive(Debug)]
pub struct CaptureStore {
    tabs: HashMap<TabId, TabCapture>,
    max_calls_per_tab: usize,
}

impl CaptureStore {
    pub fn new(max_calls_per_tab: usize) -> Self {
        Self {
            tabs: HashMap::new(),
            max_calls_per_tab: max_calls_per_tab.max(1),
        }
    }

    /// Append a freshly observed call to its tab, creating the tab entry
    /// lazily. No deduplication: repeated requests to the same URL each get
    /// their own record.
    pub fn append_call(&mut self, tab_id: &str, call: NetworkCall) {
        self.tabs
            .entry(tab_id.to_string())
            .or_default()
            .append(call, self.max_calls_per_tab);
    }

    /// Attach a response to the call that started it. The completion event
    /// does not carry the tab, so every tab's index is consulted.
    ///
    /// Returns false when no live record matches: the request was evicted,
    /// cleared, or filtered at start time. Callers drop such responses
    /// silently; this is an expected race outcome, not an error.
    pub fn attach_response(&mut self, response: &ResponseRecord) -> bool {
        self.tabs.values_mut().any(|tab| tab.attach(response))
    }

    /// Empty every tab's sequence, keeping the tab keys.
    pub fn clear_all(&mut self) {
        for tab in self.tabs.values_mut() {
            tab.clear();
        }
    }

    /// Empty one tab's sequence.
    pub fn clear_tab(&mut self, tab_id: &str) {
        if let Some(tab) = self.tabs.get_mut(tab_id) {
            tab.clear();
        }
    }

    /// Delete a tab's key entirely (tab closed).
    pub fn remove_tab(&mut self, tab_id: &str) {
        self.tabs.remove(tab_id);
    }

    /// All tabs' calls in one sequence, ordered by request timestamp.
    ///
    /// Within a tab this coincides with observation order; across tabs it
    /// replaces map-iteration order with chronology so callers see a
    /// deterministic sequence.
    pub fn flatten(&self) -> Vec<NetworkCall> {
        let mut calls: Vec<NetworkCall> = self
            .tabs
            .values()
            .flat_map(|tab| tab.calls.iter().cloned())
            .collect();
        calls.sort_by_key(|c| c.request.timestamp_ms);
        calls
    }

    pub fn total_calls(&self) -> usize {
        self.tabs.values().map(|tab| tab.calls.len()).sum()
    }

    pub fn tab_count(&self) -> usize {
        self.tabs.len()
    }

    pub fn tab_len(&self, tab_id: &str) -> usize {
        self.tabs.get(tab_id).map(|t| t.calls.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trafficlens_core::types::{RequestBody, RequestRecord};

    fn call(id: &str, ts: i64) -> NetworkCall {
        NetworkCall::started(RequestRecord {
            request_id: id.to_string(),
            method: "GET".to_string(),
            url: format!("https://api.example.com/{}", id),
            timestamp_ms: ts,
            body: None,
        })
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

    #[test]
    fn test_append_preserves_observation_order() {
        let mut store = CaptureStore::new(100);
        store.append_call("tab-1", call("r1", 10));
        store.append_call("tab-1", call("r2", 20));
        store.append_call("tab-1", call("r3", 30));

        let flat = store.flatten();
        assert_eq!(flat.len(), 3);
        let ids: Vec<&str> = flat.iter().map(|c| c.request.request_id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r2", "r3"]);
    }

    #[test]
    fn test_attach_fills_exactly_one_record() {
        let mut store = CaptureStore::new(100);
        store.append_call("tab-1", call("r1", 10));
        store.append_call("tab-1", call("r2", 20));

        assert!(store.attach_response(&response("r1", 200)));
        assert_eq!(store.total_calls(), 2);

        let flat = store.flatten();
        assert_eq!(flat[0].response.as_ref().unwrap().status, 200);
        assert!(flat[1].response.is_none());
    }

    #[test]
    fn test_attach_across_tabs() {
        let mut store = CaptureStore::new(100);
        store.append_call("tab-1", call("r1", 10));
        store.append_call("tab-2", call("r2", 20));

        assert!(store.attach_response(&response("r2", 404)));
        let flat = store.flatten();
        assert!(flat[0].response.is_none());
        assert_eq!(flat[1].response.as_ref().unwrap().status, 404);
    }

    #[test]
    fn test_orphan_response_is_noop() {
        let mut store = CaptureStore::new(100);
        store.append_call("tab-1", call("r1", 10));
        let before = store.flatten();

        assert!(!store.attach_response(&response("ghost", 200)));
        assert_eq!(store.flatten(), before);
    }

    #[test]
    fn test_attach_does_not_overwrite() {
        let mut store = CaptureStore::new(100);
        store.append_call("tab-1", call("r1", 10));
        assert!(store.attach_response(&response("r1", 200)));
        assert!(!store.attach_response(&response("r1", 500)));
        assert_eq!(store.flatten()[0].response.as_ref().unwrap().status, 200);
    }

    #[test]
    fn test_clear_all_keeps_keys_but_empties() {
        let mut store = CaptureStore::new(100);
        store.append_call("tab-1", call("r1", 10));
        store.append_call("tab-2", call("r2", 20));

        store.clear_all();
        assert_eq!(store.total_calls(), 0);
        assert_eq!(store.tab_count(), 2);
        assert!(store.flatten().is_empty());

        // a response for a cleared request is dropped
        assert!(!store.attach_response(&response("r1", 200)));
    }

    #[test]
    fn test_clear_tab_leaves_other_tabs_alone() {
        let mut store = CaptureStore::new(100);
        store.append_call("tab-1", call("r1", 10));
        store.append_call("tab-2", call("r2", 20));

        store.clear_tab("tab-1");
        assert_eq!(store.tab_len("tab-1"), 0);
        assert_eq!(store.tab_len("tab-2"), 1);
        assert_eq!(store.tab_count(), 2);
    }

    #[test]
    fn test_remove_tab_then_fresh_append() {
        let mut store = CaptureStore::new(100);
        store.append_call("tab-1", call("r1", 10));
        store.remove_tab("tab-1");
        assert_eq!(store.tab_count(), 0);

        store.append_call("tab-1", call("r2", 20));
        assert_eq!(store.tab_len("tab-1"), 1);
        assert_eq!(store.flatten()[0].request.request_id, "r2");
    }

    #[test]
    fn test_eviction_drops_oldest_and_its_index_entry() {
        let mut store = CaptureStore::new(3);
        for (i, id) in ["r1", "r2", "r3", "r4"].iter().enumerate() {
            store.append_call("tab-1", call(id, i as i64 * 10));
        }

        assert_eq!(store.tab_len("tab-1"), 3);
        let ids: Vec<String> = store
            .flatten()
            .iter()
            .map(|c| c.request.request_id.clone())
            .collect();
        assert_eq!(ids, vec!["r2", "r3", "r4"]);

        // the evicted request's response is now an orphan
        assert!(!store.attach_response(&response("r1", 200)));
        // survivors still attach by index
        assert!(store.attach_response(&response("r3", 200)));
    }

    #[test]
    fn test_redirect_reappend_attaches_newest() {
        let mut store = CaptureStore::new(100);
        store.append_call("tab-1", call("r1", 10));
        store.append_call("tab-1", call("r1", 20));

        assert!(store.attach_response(&response("r1", 200)));
        let flat = store.flatten();
        assert!(flat[0].response.is_none());
        assert_eq!(flat[1].response.as_ref().unwrap().status, 200);
    }

    #[test]
    fn test_flatten_sorts_across_tabs_by_timestamp() {
        let mut store = CaptureStore::new(100);
        store.append_call("tab-b", call("r2", 200));
        store.append_call("tab-a", call("r1", 100));
        store.append_call("tab-b", call("r3", 300));

        let ids: Vec<String> = store
            .flatten()
            .iter()
            .map(|c| c.request.request_id.clone())
            .collect();
        assert_eq!(ids, vec!["r1", "r2", "r3"]);
    }
}
