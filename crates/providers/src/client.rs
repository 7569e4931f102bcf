use reqwest::Client;
use std::time::Duration;
use tracing::warn;

/// Build the reqwest client used to talk to the model runtime.
///
/// The runtime is local, so no proxy plumbing. It can still chew on a
/// prompt for minutes, hence the caller-supplied timeout.
pub fn build_http_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .no_proxy()
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "Failed to build HTTP client, using default");
            Client::new()
        })
}
