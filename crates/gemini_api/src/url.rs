/// Default base URL for Gemini transport requests.
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Normalize a configured base URL.
///
/// Normalization rules:
/// 1) blank input falls back to [`DEFAULT_GEMINI_BASE_URL`]
/// 2) trailing slashes are removed
/// 3) a trailing `/models` segment is removed so endpoint paths are not doubled
pub fn normalize_base_url(input: &str) -> String {
    let base = if input.trim().is_empty() {
        DEFAULT_GEMINI_BASE_URL
    } else {
        input.trim()
    };

    let trimmed = base.trim_end_matches('/');
    trimmed
        .strip_suffix("/models")
        .unwrap_or(trimmed)
        .to_string()
}

/// Accepts both `gemini-2.5-flash` and `models/gemini-2.5-flash`.
pub fn model_path(model: &str) -> String {
    let model = model.trim();
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

pub fn stream_generate_content_url(base_url: &str, model: &str) -> String {
    format!(
        "{}/{}:streamGenerateContent?alt=sse",
        normalize_base_url(base_url),
        model_path(model)
    )
}

pub fn generate_content_url(base_url: &str, model: &str) -> String {
    format!(
        "{}/{}:generateContent",
        normalize_base_url(base_url),
        model_path(model)
    )
}

pub fn models_url(base_url: &str) -> String {
    format!("{}/models", normalize_base_url(base_url))
}
