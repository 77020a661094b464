//! The captioning collaborator.
//!
//! `Captioner` is the capability the pipeline calls three times per image
//! (description, tags, text extraction). The production implementation
//! talks to an Ollama vision model using structured outputs: each request
//! carries a JSON schema and the reply's message content must parse into
//! the matching response type. Anything else is a captioner failure.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::config::CaptionerConfig;

const DESCRIBE_PROMPT: &str = "Describe this image in one or two sentences.";
const TAG_PROMPT: &str =
    "List 5-10 relevant tags for this image. Include both objects and artistic style.";
const TEXT_PROMPT: &str = "Analyze this image for text content. Respond with JSON where \
    'has_text' is true only if there is actual text visible in the image, and 'text_content' \
    contains the extracted text. If no text is visible, set 'has_text' to false and \
    'text_content' to empty string.";

#[derive(Debug, Clone, Deserialize)]
pub struct ImageDescription {
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageTags {
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageText {
    pub has_text: bool,
    #[serde(default)]
    pub text_content: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CaptionerError {
    #[error("captioner request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("captioner returned malformed structured output: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("captioner returned an error: {0}")]
    Upstream(String),
}

/// Vision-model capability behind the annotation pipeline. Injectable
/// with a fake in tests.
pub trait Captioner: Send + Sync {
    fn describe(&self, image: &[u8]) -> Result<ImageDescription, CaptionerError>;
    fn tag(&self, image: &[u8]) -> Result<ImageTags, CaptionerError>;
    fn extract_text(&self, image: &[u8]) -> Result<ImageText, CaptionerError>;
}

/// Ollama-backed captioner. Requests run under the configured timeout; a
/// timed-out request surfaces as a `Request` error and is never retried
/// here.
pub struct OllamaCaptioner {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

impl OllamaCaptioner {
    pub fn new(config: &CaptionerConfig) -> Result<Self, CaptionerError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    /// One structured-output chat round: prompt + image + schema in,
    /// the raw message content (a JSON document) out.
    fn ask(
        &self,
        prompt: &str,
        image: &[u8],
        schema: serde_json::Value,
    ) -> Result<String, CaptionerError> {
        let payload = json!({
            "model": self.model,
            "stream": false,
            "format": schema,
            "messages": [{
                "role": "user",
                "content": prompt,
                "images": [STANDARD.encode(image)],
            }],
        });

        let response = self
            .client
            .post(format!("{}/api/chat", self.endpoint))
            .json(&payload)
            .send()?;

        if !response.status().is_success() {
            return Err(CaptionerError::Upstream(format!(
                "status {}",
                response.status()
            )));
        }

        let reply: ChatReply = response.json()?;
        Ok(reply.message.content)
    }
}

impl Captioner for OllamaCaptioner {
    fn describe(&self, image: &[u8]) -> Result<ImageDescription, CaptionerError> {
        log::debug!("requesting description");
        let schema = json!({
            "type": "object",
            "properties": { "description": { "type": "string" } },
            "required": ["description"],
        });
        Ok(serde_json::from_str(&self.ask(DESCRIBE_PROMPT, image, schema)?)?)
    }

    fn tag(&self, image: &[u8]) -> Result<ImageTags, CaptionerError> {
        log::debug!("requesting tags");
        let schema = json!({
            "type": "object",
            "properties": {
                "tags": { "type": "array", "items": { "type": "string" } },
            },
            "required": ["tags"],
        });
        Ok(serde_json::from_str(&self.ask(TAG_PROMPT, image, schema)?)?)
    }

    fn extract_text(&self, image: &[u8]) -> Result<ImageText, CaptionerError> {
        log::debug!("requesting text extraction");
        let schema = json!({
            "type": "object",
            "properties": {
                "has_text": { "type": "boolean" },
                "text_content": { "type": "string" },
            },
            "required": ["has_text", "text_content"],
        });
        Ok(serde_json::from_str(&self.ask(TEXT_PROMPT, image, schema)?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_replies_parse() {
        let description: ImageDescription =
            serde_json::from_str(r#"{"description": "a red car"}"#).unwrap();
        assert_eq!(description.description, "a red car");

        let tags: ImageTags = serde_json::from_str(r#"{"tags": ["car", "street"]}"#).unwrap();
        assert_eq!(tags.tags.len(), 2);

        let text: ImageText =
            serde_json::from_str(r#"{"has_text": true, "text_content": "STOP"}"#).unwrap();
        assert!(text.has_text);
        assert_eq!(text.text_content, "STOP");
    }

    #[test]
    fn test_missing_text_content_defaults_empty() {
        let text: ImageText = serde_json::from_str(r#"{"has_text": false}"#).unwrap();
        assert!(!text.has_text);
        assert!(text.text_content.is_empty());
    }

    #[test]
    fn test_nonconforming_reply_is_malformed() {
        let result: Result<ImageDescription, _> = serde_json::from_str("not json at all");
        assert!(result.is_err());
    }
}
