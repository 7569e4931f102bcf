use serde_json::json;
use trafficlens_core::types::SerializedCall;

pub async fn run(limit: Option<usize>, completed_only: bool) -> anyhow::Result<()> {
    let reply = super::post_control(json!({"type": "GET_NETWORK_CALLS"})).await?;

    let mut calls: Vec<SerializedCall> =
        serde_json::from_value(reply["calls"].clone()).unwrap_or_default();

    if completed_only {
        calls.retain(|c| c.is_completed());
    }
    if let Some(limit) = limit {
        let skip = calls.len().saturating_sub(limit);
        calls.drain(..skip);
    }

    if calls.is_empty() {
        println!("No captured network calls.");
        return Ok(());
    }

    for call in &calls {
        let when = chrono::DateTime::from_timestamp_millis(call.request.timestamp_ms)
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "--:--:--".to_string());
        match &call.response {
            Some(resp) => println!(
                "[{}] {:<6} {} -> {} {}",
                when, call.request.method, call.request.url, resp.status, resp.status_text
            ),
            None => println!(
                "[{}] {:<6} {} -> (no response)",
                when, call.request.method, call.request.url
            ),
        }
    }
    println!();
    println!("{} call(s)", calls.len());

    Ok(())
}
