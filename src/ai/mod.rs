//! Copywriting assistant backed by an OpenAI-compatible chat-completions
//! endpoint.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::config::AiConfig;
use crate::error::StoreError;

pub const META_TITLE_MAX_CHARS: usize = 60;
pub const META_DESCRIPTION_MAX_CHARS: usize = 160;

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("AI assistant is not configured")]
    NotConfigured,

    #[error("{0}")]
    Upstream(String),
}

impl From<AiError> for StoreError {
    fn from(error: AiError) -> Self {
        match error {
            AiError::NotConfigured => StoreError::Unavailable(error.to_string()),
            AiError::Upstream(msg) => StoreError::Upstream(msg),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DescriptionRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(max = 100))]
    pub category: Option<String>,
    #[serde(default)]
    #[validate(length(max = 20))]
    pub keywords: Vec<String>,
    #[validate(length(max = 40))]
    pub tone: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SeoMetaRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeoMeta {
    pub meta_title: String,
    pub meta_description: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[derive(Clone)]
pub struct AiClient {
    client: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
    model: String,
}

impl AiClient {
    pub fn new(config: &AiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    pub async fn generate_product_description(&self, request: &DescriptionRequest) -> Result<String, AiError> {
        let mut prompt = format!("Write a product description for \"{}\".", request.name.trim());
        if let Some(category) = request.category.as_deref().filter(|c| !c.trim().is_empty()) {
            prompt.push_str(&format!(" Category: {category}."));
        }
        if !request.keywords.is_empty() {
            prompt.push_str(&format!(" Work in these keywords: {}.", request.keywords.join(", ")));
        }
        let tone = request.tone.as_deref().unwrap_or("friendly");
        prompt.push_str(&format!(" Use a {tone} tone. Two short paragraphs, no headings."));

        let text = self
            .complete("You write concise, persuasive e-commerce product copy.", &prompt)
            .await?;
        Ok(text.trim().to_string())
    }

    pub async fn generate_seo_meta(&self, request: &SeoMetaRequest) -> Result<SeoMeta, AiError> {
        let excerpt: String = request.content.chars().take(2_000).collect();
        let prompt = format!(
            "Title: {}\n\nContent:\n{excerpt}\n\nReturn JSON with keys \"meta_title\" (at most \
             {META_TITLE_MAX_CHARS} characters) and \"meta_description\" (at most \
             {META_DESCRIPTION_MAX_CHARS} characters).",
            request.title.trim()
        );
        let text = self.complete("You are an SEO assistant. Reply with JSON only.", &prompt).await?;
        Ok(parse_seo_meta(&text, &request.title))
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String, AiError> {
        let api_key = self.api_key.as_deref().ok_or(AiError::NotConfigured)?;
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: prompt },
            ],
            temperature: 0.7,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AiError::Upstream(format!("AI request failed: {e}")))?;

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "AI provider returned an error");
            return Err(AiError::Upstream(format!("AI provider returned status {}", response.status())));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AiError::Upstream(format!("AI response parse error: {e}")))?;
        parsed
            .choices
            .into_iter()
            .find_map(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| AiError::Upstream("AI provider returned no content".to_string()))
    }
}

/// Reads the model's reply as JSON, tolerating a surrounding code fence.
/// Falls back to the first line as the title and the rest as the
/// description. Both fields are cut to their length limits.
fn parse_seo_meta(reply: &str, fallback_title: &str) -> SeoMeta {
    let trimmed = reply
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let meta = serde_json::from_str::<SeoMeta>(trimmed).unwrap_or_else(|_| {
        let mut lines = trimmed.lines().map(str::trim).filter(|l| !l.is_empty());
        let title = lines.next().unwrap_or(fallback_title).to_string();
        let description = lines.collect::<Vec<_>>().join(" ");
        SeoMeta { meta_title: title, meta_description: description }
    });
    SeoMeta {
        meta_title: truncate_chars(&meta.meta_title, META_TITLE_MAX_CHARS),
        meta_description: truncate_chars(&meta.meta_description, META_DESCRIPTION_MAX_CHARS),
    }
}

/// Cuts `s` to at most `max` characters, never splitting a character.
pub fn truncate_chars(s: &str, max: usize) -> String {
    let s = s.trim();
    match s.char_indices().nth(max) {
        Some((byte_index, _)) => s[..byte_index].trim_end().to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client(base_url: &str, api_key: Option<&str>) -> AiClient {
        AiClient::new(&AiConfig {
            api_key: api_key.map(str::to_string),
            base_url: base_url.to_string(),
            model: "test-model".to_string(),
        })
    }

    fn reply(content: &str) -> serde_json::Value {
        serde_json::json!({ "choices": [{ "message": { "role": "assistant", "content": content } }] })
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo");
        assert_eq!(truncate_chars("short", 60), "short");
        assert_eq!(truncate_chars("日本語テキスト", 3), "日本語");
    }

    #[test]
    fn seo_meta_falls_back_to_lines() {
        let meta = parse_seo_meta("Great Tee\nSoft and breathable.", "ignored");
        assert_eq!(meta.meta_title, "Great Tee");
        assert_eq!(meta.meta_description, "Soft and breathable.");
    }

    #[tokio::test]
    async fn missing_key_is_not_configured() {
        let ai = client("http://127.0.0.1:9", None);
        assert!(!ai.is_configured());
        let err = ai
            .generate_seo_meta(&SeoMetaRequest { title: "t".into(), content: "c".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::NotConfigured));
    }

    #[tokio::test]
    async fn description_is_returned_trimmed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("  A lovely tee.  ")))
            .expect(1)
            .mount(&server)
            .await;

        let ai = client(&server.uri(), Some("sk-test"));
        let text = ai
            .generate_product_description(&DescriptionRequest {
                name: "Tee".into(),
                category: Some("Shirts".into()),
                keywords: vec!["cotton".into()],
                tone: None,
            })
            .await
            .unwrap();
        assert_eq!(text, "A lovely tee.");
    }

    #[tokio::test]
    async fn seo_meta_is_parsed_and_truncated() {
        let server = MockServer::start().await;
        let long_description = "x".repeat(300);
        let content = format!(
            "```json\n{{\"meta_title\": \"{}\", \"meta_description\": \"{long_description}\"}}\n```",
            "T".repeat(80)
        );
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply(&content)))
            .mount(&server)
            .await;

        let ai = client(&server.uri(), Some("sk-test"));
        let meta = ai
            .generate_seo_meta(&SeoMetaRequest { title: "Tee".into(), content: "body".into() })
            .await
            .unwrap();
        assert_eq!(meta.meta_title.chars().count(), META_TITLE_MAX_CHARS);
        assert_eq!(meta.meta_description.chars().count(), META_DESCRIPTION_MAX_CHARS);
    }

    #[tokio::test]
    async fn provider_errors_are_upstream_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let ai = client(&server.uri(), Some("sk-test"));
        let err = ai
            .generate_seo_meta(&SeoMetaRequest { title: "t".into(), content: "c".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::Upstream(_)));
        assert!(matches!(StoreError::from(err), StoreError::Upstream(_)));
    }
}
