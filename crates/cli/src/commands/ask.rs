//! `crabai ask`: Run one query through the chain without saving it.

use crabai_agent::PromptBuilder;
use crabai_config::AppConfig;
use crabai_providers::{AttemptStatus, ResponseSanitizer};

pub async fn run(query: String, detailed: bool) -> Result<(), Box<dyn std::error::Error>> {
    if query.trim().is_empty() {
        return Err("Query must not be empty".into());
    }

    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let chain = crabai_providers::build_from_config(&config);
    let sanitizer = ResponseSanitizer::new(config.chat.blocked_markers.iter().cloned());
    let prompt = PromptBuilder::from_config(&config.chat).build(&query, &[], detailed);

    let outcome = chain.run(&prompt).await;

    for attempt in &outcome.attempts {
        match &attempt.status {
            AttemptStatus::Answered => println!("  ✅ {}", attempt.provider),
            AttemptStatus::Empty => println!("  ⚠️  {}: empty answer", attempt.provider),
            AttemptStatus::Failed(e) => println!("  ❌ {}: {e}", attempt.provider),
        }
    }
    println!();

    if outcome.success {
        println!("{}", sanitizer.sanitize(&outcome.text));
    } else {
        println!("{}", outcome.text);
    }

    Ok(())
}
