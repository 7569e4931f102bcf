use serde_json::json;

pub async fn run() -> anyhow::Result<()> {
    let reply = super::post_control(json!({"type": "CLEAR_NETWORK_CALLS"})).await?;

    if reply["success"].as_bool() == Some(true) {
        println!("Captured network calls cleared.");
    } else {
        anyhow::bail!(
            "gateway refused the clear: {}",
            reply["error"].as_str().unwrap_or("unknown error")
        );
    }

    Ok(())
}
