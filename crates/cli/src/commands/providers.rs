//! `crabai providers`: Show the provider chain in the order it is tried.

use crabai_config::{AppConfig, ProviderEntryConfig};

fn describe(entry: &ProviderEntryConfig) -> String {
    match (&entry.api_url, &entry.model) {
        (Some(url), Some(model)) => format!("{url} ({model})"),
        (Some(url), None) => url.clone(),
        (None, _) => entry
            .language
            .as_deref()
            .map(|l| format!("language: {l}"))
            .unwrap_or_default(),
    }
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    println!("🤖 Provider chain (tried in order)");
    println!("==================================");

    for (i, entry) in config.providers.iter().enumerate() {
        let status = if !entry.enabled {
            "disabled".to_string()
        } else {
            match crabai_providers::build_source(entry) {
                Ok(_) => "ready".to_string(),
                Err(e) => format!("broken: {e}"),
            }
        };
        println!(
            "  {}. {:<12} {:<14} {}  [{status}]",
            i + 1,
            entry.name,
            entry.kind.to_string(),
            describe(entry)
        );
    }

    println!();
    println!("  Fallback message: {}", config.chat.fallback_message);
    println!(
        "  Translation: {} → {}",
        config.translation.api_url, config.translation.target_language
    );

    Ok(())
}
