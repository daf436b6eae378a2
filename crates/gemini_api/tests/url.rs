use gemini_api::url::{
    generate_content_url, model_path, models_url, stream_generate_content_url,
};
use gemini_api::{normalize_base_url, DEFAULT_GEMINI_BASE_URL};

#[test]
fn url_normalization_defaults_blank_input() {
    assert_eq!(normalize_base_url("  "), DEFAULT_GEMINI_BASE_URL);
}

#[test]
fn url_normalization_strips_trailing_slash_and_models_segment() {
    assert_eq!(
        normalize_base_url("https://example.test/v1beta/models/"),
        "https://example.test/v1beta"
    );
}

#[test]
fn model_path_accepts_prefixed_and_bare_names() {
    assert_eq!(model_path("gemini-2.5-flash"), "models/gemini-2.5-flash");
    assert_eq!(model_path("models/gemini-2.5-flash"), "models/gemini-2.5-flash");
}

#[test]
fn endpoint_urls_follow_rest_layout() {
    assert_eq!(
        stream_generate_content_url(DEFAULT_GEMINI_BASE_URL, "gemini-2.5-flash"),
        "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:streamGenerateContent?alt=sse"
    );
    assert_eq!(
        generate_content_url("https://example.test/v1beta/", "m"),
        "https://example.test/v1beta/models/m:generateContent"
    );
    assert_eq!(
        models_url("https://example.test/v1beta"),
        "https://example.test/v1beta/models"
    );
}
