use serde_json::json;

pub async fn run(enabled: bool) -> anyhow::Result<()> {
    let reply =
        super::post_control(json!({"type": "TOGGLE_RECORDING", "enabled": enabled})).await?;

    if reply["success"].as_bool() == Some(true) {
        println!(
            "Recording {}",
            if reply["enabled"].as_bool() == Some(true) {
                "enabled"
            } else {
                "disabled"
            }
        );
    } else {
        anyhow::bail!(
            "gateway refused the toggle: {}",
            reply["error"].as_str().unwrap_or("unknown error")
        );
    }

    Ok(())
}
