use trafficlens_core::{Config, Paths};

pub async fn run(force: bool) -> anyhow::Result<()> {
    let paths = Paths::new();
    paths.ensure_dirs()?;

    let config_path = paths.config_file();
    if config_path.exists() && !force {
        println!(
            "Config already exists at {} (use --force to overwrite)",
            config_path.display()
        );
        return Ok(());
    }

    let config = Config::default();
    config.save(&config_path)?;

    println!("trafficlens initialized");
    println!();
    println!("Config: {}", config_path.display());
    println!("Model:  {}", config.model.model);
    println!();
    println!("Next steps:");
    println!("  1. Start Chrome with remote debugging:");
    println!("       google-chrome --remote-debugging-port=9222");
    println!("  2. Make sure the model is available:");
    println!("       ollama pull llama3.2");
    println!("  3. Start the gateway:");
    println!("       trafficlens gateway");

    Ok(())
}
