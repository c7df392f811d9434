use once_cell::sync::Lazy;
use std::env;

pub static API_ROOT: Lazy<String> = Lazy::new(|| {
    env::var("TWELVELABS_BASE_URL")
        .map(|v| v.trim_end_matches('/').to_string())
        .unwrap_or_else(|_| "https://api.twelvelabs.io/v1.3".to_string())
});

/// Model every index is created with. Pegasus handles both the visual and
/// the audio track, which the theme analysis prompt relies on.
pub const INDEX_MODEL_NAME: &str = "pegasus1.2";
pub const INDEX_MODEL_OPTIONS: &[&str] = &["visual", "audio"];

pub const DEFAULT_INDEX_NAME: &str = "video-analysis-index";

pub const INDEX_PAGE_LIMIT: u32 = 50;
pub const MAX_INDEX_PAGES: u32 = 100;
