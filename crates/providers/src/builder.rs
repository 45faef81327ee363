//! Builds the answer-source chain from configuration.
//!
//! The chain is declared statically in config and assembled once at startup.
//! An entry that cannot be built keeps its place and fails at request time.

use std::sync::Arc;
use std::time::Duration;
use crabai_config::{AppConfig, ProviderEntryConfig, ProviderKind};
use crabai_core::error::ProviderError;
use crabai_core::provider::AnswerSource;
use tracing::{info, warn};
use crate::fallback::FallbackChain;
use crate::openai_compat::OpenAiCompatSource;
use crate::translate::TranslateSource;
use crate::wikipedia::WikipediaSource;

/// Build one answer source from its config entry.
pub fn build_source(entry: &ProviderEntryConfig) -> Result<Arc<dyn AnswerSource>, ProviderError> {
    let timeout = Duration::from_secs(entry.timeout_secs);

    let source: Arc<dyn AnswerSource> = match entry.kind {
        ProviderKind::OpenaiCompat => {
            let base_url = entry.api_url.as_deref().ok_or_else(|| {
                ProviderError::NotConfigured(format!("provider '{}' has no api_url", entry.name))
            })?;
            let model = entry.model.as_deref().ok_or_else(|| {
                ProviderError::NotConfigured(format!("provider '{}' has no model", entry.name))
            })?;
            Arc::new(OpenAiCompatSource::new(
                &entry.name,
                base_url,
                entry.api_key.clone().unwrap_or_default(),
                model,
                timeout,
            )?)
        }
        ProviderKind::Wikipedia => match entry.api_url.as_deref() {
            Some(url) => Arc::new(WikipediaSource::with_base_url(&entry.name, url, timeout)?),
            None => Arc::new(WikipediaSource::new(
                &entry.name,
                entry.language.as_deref().unwrap_or("en"),
                timeout,
            )?),
        },
        ProviderKind::Translate => Arc::new(TranslateSource::new(
            &entry.name,
            entry
                .api_url
                .clone()
                .unwrap_or_else(|| crabai_config::TranslationConfig::default().api_url),
            entry.target_language.as_deref().unwrap_or("ta"),
            timeout,
        )?),
    };

    Ok(source)
}

/// Build the fallback chain from the enabled provider entries, in order.
pub fn build_from_config(config: &AppConfig) -> FallbackChain {
    let chain = config
        .enabled_providers()
        .fold(FallbackChain::new(&config.chat.fallback_message), |chain, entry| {
            let built = build_source(entry);
            if let Err(e) = &built {
                warn!(provider = %entry.name, kind = %entry.kind, error = %e, "Provider could not be built");
            }
            chain.add_built(&entry.name, built)
        });

    info!(providers = chain.len(), "Answer chain ready");
    chain
}

/// Build the standalone translator used by the translate route.
pub fn build_translator(config: &AppConfig) -> Result<TranslateSource, ProviderError> {
    TranslateSource::new(
        "translate",
        &config.translation.api_url,
        &config.translation.target_language,
        Duration::from_secs(config.translation.timeout_secs),
    )
}
