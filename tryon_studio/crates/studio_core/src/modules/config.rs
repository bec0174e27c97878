use std::path::PathBuf;
use std::time::Duration;
use zeroize::Zeroizing;

pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image-preview";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";
pub const DEFAULT_DATA_DIR: &str = ".tryon";

#[derive(Clone)]
pub struct GatewayConfig {
    pub api_key: Option<Zeroizing<String>>,
    pub text_model: String,
    pub image_model: String,
    pub base_url: String,
    /// Explicit override; otherwise derived per model.
    pub http_timeout: Option<Duration>,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("text_model", &self.text_model)
            .field("image_model", &self.image_model)
            .field("base_url", &self.base_url)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            http_timeout: None,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        let api_key = non_empty_env("GEMINI_API_KEY").map(Zeroizing::new);
        let http_timeout = std::env::var("GEMINI_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(|secs| Duration::from_secs(secs.clamp(15, 300)));

        Self {
            api_key,
            text_model: non_empty_env("GEMINI_TEXT_MODEL")
                .unwrap_or_else(|| DEFAULT_TEXT_MODEL.to_string()),
            image_model: non_empty_env("GEMINI_IMAGE_MODEL")
                .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
            base_url: non_empty_env("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            http_timeout,
        }
    }

    pub fn timeout_for(&self, model: &str) -> Duration {
        self.http_timeout
            .unwrap_or_else(|| http_timeout_for_model(model))
    }
}

pub fn data_dir_from_env() -> PathBuf {
    non_empty_env("TRYON_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

/// Image models and "pro" models get the longer budget.
pub fn http_timeout_for_model(model: &str) -> Duration {
    let m = model.to_ascii_lowercase();
    let secs = if m.contains("image") || m.contains("pro") {
        120
    } else {
        60
    };
    Duration::from_secs(secs)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
