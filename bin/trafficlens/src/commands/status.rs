use trafficlens_core::{Config, Paths};
use trafficlens_storage::FlagStore;

pub async fn run() -> anyhow::Result<()> {
    let paths = Paths::new();

    println!("trafficlens status");
    println!("==================");
    println!();

    let config_path = paths.config_file();
    let config_exists = config_path.exists();
    println!(
        "Config:    {} {}",
        config_path.display(),
        if config_exists { "✓" } else { "✗ (not found)" }
    );

    if !config_exists {
        println!();
        println!("Run `trafficlens onboard` to initialize.");
        return Ok(());
    }

    let config = Config::load(&config_path)?;

    println!("Model:     {}", config.model.model);
    println!("Browser:   {}", config.browser.cdp_endpoint);
    println!("Gateway:   http://{}", config.gateway_addr());
    println!("Sessions:  {}", paths.sessions_dir().display());

    let flag = FlagStore::new(&paths).load().unwrap_or(None);
    println!(
        "Recording: {}",
        match flag {
            Some(true) => "enabled",
            Some(false) => "disabled",
            None => "enabled (default, never toggled)",
        }
    );

    Ok(())
}
