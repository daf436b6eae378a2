use std::sync::Arc;

use chat_provider::{ChatBackend, ProviderInitError};
use chat_provider_gemini::{GeminiBackend, GeminiProviderConfig, GEMINI_PROVIDER_ID};
use chat_provider_mock::{MockBackend, MOCK_PROVIDER_ID};

use crate::config::EnvConfig;

pub const DEFAULT_PROVIDER_ID: &str = GEMINI_PROVIDER_ID;

pub fn backend_from_env(env: &EnvConfig) -> Result<Arc<dyn ChatBackend>, ProviderInitError> {
    backend_for_id(env.provider.as_deref().unwrap_or(DEFAULT_PROVIDER_ID), env)
}

pub fn backend_for_id(
    provider_id: &str,
    env: &EnvConfig,
) -> Result<Arc<dyn ChatBackend>, ProviderInitError> {
    match provider_id {
        GEMINI_PROVIDER_ID => {
            let api_key = env.api_key.clone().ok_or_else(|| {
                ProviderInitError::new(
                    "GEMINI_API_KEY environment variable not set. Please set it before running.",
                )
            })?;
            let backend = GeminiBackend::new(GeminiProviderConfig::new(api_key))?;
            Ok(Arc::new(backend))
        }
        MOCK_PROVIDER_ID => Ok(Arc::new(MockBackend::default())),
        unknown => Err(ProviderInitError::new(format!(
            "Unsupported provider '{unknown}'. Available providers: {GEMINI_PROVIDER_ID}, {MOCK_PROVIDER_ID}"
        ))),
    }
}
