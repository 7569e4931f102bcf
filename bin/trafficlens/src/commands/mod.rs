pub mod calls;
pub mod clear;
pub mod gateway;
pub mod onboard;
pub mod record;
pub mod status;

use anyhow::Context;
use trafficlens_core::{Config, Paths};

/// Send a control-surface message to a running gateway and return its reply.
pub(crate) async fn post_control(body: serde_json::Value) -> anyhow::Result<serde_json::Value> {
    let paths = Paths::new();
    let config = Config::load_or_default(&paths)?;
    let url = format!("http://{}/v1/control", config.gateway_addr());

    let response = reqwest::Client::new()
        .post(&url)
        .json(&body)
        .send()
        .await
        .with_context(|| format!("cannot reach gateway at {} (is it running?)", url))?;

    response
        .json()
        .await
        .context("gateway returned a malformed reply")
}
