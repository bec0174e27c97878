use crate::modules::config::GatewayConfig;
use crate::modules::prompts::{
    clothing_image_prompt, suggestions_prompt, try_on_prompt, REMOVE_BACKGROUND_PROMPT,
};
use crate::modules::protocol::{ClothingSuggestion, ImagePayload, Language, StyleTheme};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use url::Url;

const MAX_ATTEMPTS: u32 = 3;
const MAX_ERROR_BODY_CHARS: usize = 2000;
const BLOCKING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "PROHIBITED_CONTENT",
    "IMAGE_SAFETY",
    "BLOCKLIST",
    "SPII",
    "RECITATION",
];

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("gemini request failed: status={status} body={body}")]
    BadStatus { status: StatusCode, body: String },
    #[error("gemini auth error: {0}")]
    Auth(String),
    #[error("request blocked by the model: {0}")]
    Blocked(String),
    #[error("the model returned no image: {0}")]
    NoImage(String),
    #[error("gemini response parse failed: {0}")]
    Parse(String),
    #[error("invalid gemini endpoint: {0}")]
    Url(#[from] url::ParseError),
}

/// The four model operations the studio depends on.
#[async_trait]
pub trait StylistGateway: Send + Sync {
    async fn clothing_suggestions(
        &self,
        prompt: &str,
        language: Language,
        preferred_colors: Option<&str>,
    ) -> Result<Vec<ClothingSuggestion>, GeminiError>;

    async fn generate_clothing_image(
        &self,
        description: &str,
        theme: StyleTheme,
    ) -> Result<ImagePayload, GeminiError>;

    async fn remove_background(&self, image: &ImagePayload) -> Result<ImagePayload, GeminiError>;

    async fn virtual_try_on(
        &self,
        person: &ImagePayload,
        clothing: &ImagePayload,
        theme: StyleTheme,
    ) -> Result<ImagePayload, GeminiError>;
}

pub struct GeminiClient {
    http: reqwest::Client,
    config: GatewayConfig,
    base: Url,
}

impl GeminiClient {
    pub fn new(config: GatewayConfig) -> Result<Self, GeminiError> {
        let http = reqwest::Client::builder().build()?;
        let mut base = Url::parse(config.base_url.trim())?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { http, config, base })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn api_key(&self) -> Result<&str, GeminiError> {
        self.config
            .api_key
            .as_ref()
            .map(|k| k.as_str())
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| GeminiError::Auth("missing GEMINI_API_KEY".to_string()))
    }

    fn endpoint(&self, model: &str) -> Result<Url, GeminiError> {
        Ok(self
            .base
            .join(&format!("models/{}:generateContent", model.trim()))?)
    }

    /// POSTs a generateContent payload; 429/5xx are retried with backoff.
    async fn generate_content(
        &self,
        model: &str,
        payload: &Value,
        fallback_payload: Option<&Value>,
    ) -> Result<String, GeminiError> {
        let api_key = self.api_key()?;
        let url = self.endpoint(model)?;
        let timeout = self.config.timeout_for(model);

        let mut body_to_send = payload;
        let mut backoff = Duration::from_millis(500);
        for attempt in 1..=MAX_ATTEMPTS {
            tracing::debug!(model, attempt, "gemini generateContent");
            let resp = self
                .http
                .post(url.clone())
                .header("x-goog-api-key", api_key)
                .timeout(timeout)
                .json(body_to_send)
                .send()
                .await?;
            if resp.status().is_success() {
                return Ok(resp.text().await?);
            }

            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();

            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(GeminiError::Auth(format!(
                    "status={status} body={}",
                    truncate_chars(&body, MAX_ERROR_BODY_CHARS)
                )));
            }

            // Some endpoints reject schema fields; retry once without schema.
            if let Some(fallback) = fallback_payload {
                if attempt == 1
                    && status == StatusCode::BAD_REQUEST
                    && body.to_ascii_lowercase().contains("unknown")
                {
                    body_to_send = fallback;
                    continue;
                }
            }

            let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            if !retryable || attempt == MAX_ATTEMPTS {
                return Err(GeminiError::BadStatus {
                    status,
                    body: truncate_chars(&body, MAX_ERROR_BODY_CHARS),
                });
            }
            tracing::warn!(model, attempt, %status, "gemini transient failure, retrying");
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(Duration::from_secs(5));
        }

        Err(GeminiError::Parse("exhausted retries".to_string()))
    }

    async fn generate_image(&self, parts: Vec<Value>) -> Result<ImagePayload, GeminiError> {
        let payload = json!({
            "contents": [ { "role": "user", "parts": parts } ],
            "generationConfig": {
                "responseModalities": ["IMAGE", "TEXT"]
            }
        });
        let body = self
            .generate_content(&self.config.image_model, &payload, None)
            .await?;
        parse_image_response(&body)
    }
}

#[async_trait]
impl StylistGateway for GeminiClient {
    async fn clothing_suggestions(
        &self,
        prompt: &str,
        language: Language,
        preferred_colors: Option<&str>,
    ) -> Result<Vec<ClothingSuggestion>, GeminiError> {
        let full_prompt = suggestions_prompt(prompt, language, preferred_colors);

        let payload_with_schema = json!({
            "contents": [
                { "role": "user", "parts": [ { "text": full_prompt } ] }
            ],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "ARRAY",
                    "items": {
                        "type": "OBJECT",
                        "properties": {
                            "name": { "type": "STRING" },
                            "description": { "type": "STRING" }
                        },
                        "required": ["name", "description"]
                    }
                }
            }
        });

        let payload_no_schema = json!({
            "contents": [
                { "role": "user", "parts": [ { "text": full_prompt } ] }
            ],
            "generationConfig": {
                "responseMimeType": "application/json"
            }
        });

        let body = self
            .generate_content(
                &self.config.text_model,
                &payload_with_schema,
                Some(&payload_no_schema),
            )
            .await?;
        let text = extract_candidate_text(&body)?;
        parse_suggestions(&text)
    }

    async fn generate_clothing_image(
        &self,
        description: &str,
        theme: StyleTheme,
    ) -> Result<ImagePayload, GeminiError> {
        self.generate_image(vec![text_part(&clothing_image_prompt(description, theme))])
            .await
    }

    async fn remove_background(&self, image: &ImagePayload) -> Result<ImagePayload, GeminiError> {
        self.generate_image(vec![image_part(image), text_part(REMOVE_BACKGROUND_PROMPT)])
            .await
    }

    async fn virtual_try_on(
        &self,
        person: &ImagePayload,
        clothing: &ImagePayload,
        theme: StyleTheme,
    ) -> Result<ImagePayload, GeminiError> {
        self.generate_image(vec![
            image_part(person),
            image_part(clothing),
            text_part(&try_on_prompt(theme)),
        ])
        .await
    }
}

fn text_part(text: &str) -> Value {
    json!({ "text": text })
}

fn image_part(image: &ImagePayload) -> Value {
    json!({ "inlineData": { "mimeType": image.mime_type, "data": image.data } })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    candidates: Option<Vec<Candidate>>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
    block_reason_message: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct Content {
    parts: Option<Vec<Part>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

fn parse_envelope(body: &str) -> Result<Envelope, GeminiError> {
    let env: Envelope = serde_json::from_str(body)
        .map_err(|e| GeminiError::Parse(format!("{e}: {}", truncate_chars(body, 500))))?;

    if let Some(fb) = &env.prompt_feedback {
        if let Some(reason) = &fb.block_reason {
            let msg = match &fb.block_reason_message {
                Some(m) if !m.trim().is_empty() => format!("{reason} ({})", m.trim()),
                _ => reason.clone(),
            };
            return Err(GeminiError::Blocked(msg));
        }
    }
    Ok(env)
}

fn blocked_finish_reason(env: &Envelope) -> Option<String> {
    env.candidates
        .iter()
        .flatten()
        .filter_map(|c| c.finish_reason.as_deref())
        .find(|r| BLOCKING_FINISH_REASONS.contains(r))
        .map(str::to_string)
}

pub fn parse_image_response(body: &str) -> Result<ImagePayload, GeminiError> {
    let env = parse_envelope(body)?;

    let parts = env
        .candidates
        .iter()
        .flatten()
        .filter_map(|c| c.content.as_ref())
        .filter_map(|c| c.parts.as_ref())
        .flatten();

    let mut texts: Vec<&str> = Vec::new();
    for part in parts {
        if let Some(data) = &part.inline_data {
            if !data.data.is_empty() {
                return Ok(ImagePayload {
                    mime_type: data.mime_type.clone(),
                    data: data.data.clone(),
                });
            }
        }
        if let Some(t) = part.text.as_deref() {
            texts.push(t.trim());
        }
    }

    if let Some(reason) = blocked_finish_reason(&env) {
        return Err(GeminiError::Blocked(reason));
    }

    let said = texts.join(" ");
    if said.trim().is_empty() {
        Err(GeminiError::NoImage("empty response".to_string()))
    } else {
        Err(GeminiError::NoImage(truncate_chars(said.trim(), 300)))
    }
}

pub fn extract_candidate_text(body: &str) -> Result<String, GeminiError> {
    let env = parse_envelope(body)?;
    let text: String = env
        .candidates
        .iter()
        .flatten()
        .take(1)
        .filter_map(|c| c.content.as_ref())
        .filter_map(|c| c.parts.as_ref())
        .flatten()
        .filter_map(|p| p.text.as_deref())
        .collect();

    if text.trim().is_empty() {
        if let Some(reason) = blocked_finish_reason(&env) {
            return Err(GeminiError::Blocked(reason));
        }
        return Err(GeminiError::Parse(format!(
            "missing candidates.content.parts.text: {}",
            truncate_chars(body, 500)
        )));
    }
    Ok(text)
}

pub fn parse_suggestions(text: &str) -> Result<Vec<ClothingSuggestion>, GeminiError> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Shape {
        List(Vec<ClothingSuggestion>),
        Wrapped { suggestions: Vec<ClothingSuggestion> },
    }

    let extracted = extract_json_like(text).unwrap_or(text.trim());
    let parsed: Shape = serde_json::from_str(extracted)
        .map_err(|e| GeminiError::Parse(format!("{e}: {}", truncate_chars(extracted, 500))))?;
    let list = match parsed {
        Shape::List(l) => l,
        Shape::Wrapped { suggestions } => suggestions,
    };

    Ok(list
        .into_iter()
        .map(|s| ClothingSuggestion {
            name: s.name.trim().to_string(),
            description: s.description.trim().to_string(),
        })
        .filter(|s| !s.name.is_empty() && !s.description.is_empty())
        .collect())
}

fn extract_json_like(text: &str) -> Option<&str> {
    let t = text.trim();
    let is_json = |s: &str| {
        (s.starts_with('[') && s.ends_with(']')) || (s.starts_with('{') && s.ends_with('}'))
    };
    if is_json(t) {
        return Some(t);
    }

    if let Some(stripped) = t.strip_prefix("```") {
        // Common model output: ```json\n[...]\n```
        let stripped = stripped.trim_start();
        let stripped = stripped.strip_prefix("json").unwrap_or(stripped).trim_start();
        let stripped = stripped.strip_suffix("```").unwrap_or(stripped).trim();
        if is_json(stripped) {
            return Some(stripped);
        }
    }

    let (open, close) = match (t.find('['), t.find('{')) {
        (Some(a), Some(o)) if a < o => ('[', ']'),
        (Some(_), None) => ('[', ']'),
        _ => ('{', '}'),
    };
    let start = t.find(open)?;
    let end = t.rfind(close)?;
    if end > start {
        Some(&t[start..=end])
    } else {
        None
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars).collect();
    out.push_str("…(truncated)");
    out
}
