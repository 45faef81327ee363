//! `crabai serve`: Start the web app.

use crabai_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("🦀 CRAB AI");
    println!("   Listening: http://{}:{}", config.gateway.host, config.gateway.port);
    println!("   Database:  {}", config.database_path().display());
    println!(
        "   Providers: {}",
        config
            .enabled_providers()
            .map(|p| p.name.as_str())
            .collect::<Vec<_>>()
            .join(" → ")
    );

    crabai_gateway::start(config).await?;

    Ok(())
}
