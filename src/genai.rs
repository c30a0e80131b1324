//! Generative-AI provider abstraction and the Gemini implementation.
//!
//! The response envelope varies across provider versions: some return a
//! top-level text field, others nest text under candidate → content →
//! parts. [`GenerateResponse::shape`] classifies the envelope into a tagged
//! union resolved in a fixed priority order instead of probing attributes
//! ad hoc.
//!
//! Quota exhaustion is a first-class failure mode ([`GenAiError::Quota`])
//! so batch callers can degrade a single file instead of aborting.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;

use crate::config::ClassifierConfig;
use crate::error::GenAiError;

/// One piece of a multimodal generation request.
#[derive(Debug, Clone)]
pub enum Part {
    Text(String),
    InlineImage { mime_type: String, data: Vec<u8> },
}

/// A generative-AI capability: text or multimodal input in, loosely-shaped
/// response out.
#[async_trait]
pub trait GenAi: Send + Sync {
    async fn generate(&self, parts: &[Part]) -> Result<GenerateResponse, GenAiError>;
}

/// Wire response from a generation call. Both shapes are optional; callers
/// go through [`GenerateResponse::extract_text`].
#[derive(Debug, Default, Clone, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<CandidateContent>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<CandidatePart>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct CandidatePart {
    #[serde(default)]
    pub text: Option<String>,
}

/// Classified response shape, in extraction priority order.
#[derive(Debug, PartialEq)]
pub enum ResponseShape<'a> {
    /// Top-level text field.
    DirectText(&'a str),
    /// Text nested under the first candidate's first content part.
    CandidateParts(&'a str),
    /// No usable text anywhere.
    Unrecognized,
}

impl GenerateResponse {
    /// Resolve the envelope into its shape: direct text wins over candidate
    /// parts; anything else is unrecognized.
    pub fn shape(&self) -> ResponseShape<'_> {
        if let Some(text) = self.text.as_deref() {
            if !text.is_empty() {
                return ResponseShape::DirectText(text);
            }
        }
        let nested = self
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .and_then(|c| c.parts.first())
            .and_then(|p| p.text.as_deref());
        match nested {
            Some(text) if !text.is_empty() => ResponseShape::CandidateParts(text),
            _ => ResponseShape::Unrecognized,
        }
    }

    /// The response text, whichever shape carried it.
    pub fn extract_text(&self) -> Option<&str> {
        match self.shape() {
            ResponseShape::DirectText(t) | ResponseShape::CandidateParts(t) => Some(t),
            ResponseShape::Unrecognized => None,
        }
    }

    /// Convenience constructor for tests and fakes.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            candidates: Vec::new(),
        }
    }
}

/// Gemini provider calling `models/{model}:generateContent`.
///
/// Requires the `GEMINI_API_KEY` environment variable. Transient failures
/// (5xx, network) are retried with exponential backoff capped at 2^5
/// seconds; HTTP 429 and an explicit `RESOURCE_EXHAUSTED` status map to
/// [`GenAiError::Quota`] without retrying.
pub struct GeminiProvider {
    model: String,
    timeout_secs: u64,
    max_retries: u32,
}

impl GeminiProvider {
    pub fn new(config: &ClassifierConfig) -> anyhow::Result<Self> {
        if std::env::var("GEMINI_API_KEY").is_err() {
            anyhow::bail!("GEMINI_API_KEY environment variable not set");
        }
        Ok(Self {
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.model
        )
    }

    fn request_body(parts: &[Part]) -> serde_json::Value {
        let wire_parts: Vec<serde_json::Value> = parts
            .iter()
            .map(|part| match part {
                Part::Text(text) => serde_json::json!({ "text": text }),
                Part::InlineImage { mime_type, data } => serde_json::json!({
                    "inline_data": {
                        "mime_type": mime_type,
                        "data": base64::engine::general_purpose::STANDARD.encode(data),
                    }
                }),
            })
            .collect();
        serde_json::json!({
            "contents": [{ "role": "user", "parts": wire_parts }]
        })
    }
}

#[async_trait]
impl GenAi for GeminiProvider {
    async fn generate(&self, parts: &[Part]) -> Result<GenerateResponse, GenAiError> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| GenAiError::Provider("GEMINI_API_KEY not set".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| GenAiError::Provider(e.to_string()))?;

        let body = Self::request_body(parts);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client
                .post(self.endpoint())
                .header("x-goog-api-key", &api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.as_u16() == 429 {
                        let body_text = response.text().await.unwrap_or_default();
                        return Err(GenAiError::Quota(body_text));
                    }

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| GenAiError::Provider(e.to_string()))?;
                        if error_status(&json) == Some("RESOURCE_EXHAUSTED") {
                            return Err(GenAiError::Quota(json.to_string()));
                        }
                        return serde_json::from_value(json)
                            .map_err(|e| GenAiError::Provider(e.to_string()));
                    }

                    // Server error, retry
                    if status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(GenAiError::Provider(format!(
                            "Gemini API error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    // Other client error, don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(GenAiError::Provider(format!(
                        "Gemini API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(GenAiError::Provider(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| GenAiError::Provider("generation failed after retries".to_string())))
    }
}

fn error_status(json: &serde_json::Value) -> Option<&str> {
    json.get("error")
        .and_then(|e| e.get("status"))
        .and_then(|s| s.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_text_shape_wins() {
        let resp: GenerateResponse = serde_json::from_str(
            r#"{"text": "hello", "candidates": [{"content": {"parts": [{"text": "nested"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(resp.shape(), ResponseShape::DirectText("hello"));
        assert_eq!(resp.extract_text(), Some("hello"));
    }

    #[test]
    fn candidate_parts_shape_is_fallback() {
        let resp: GenerateResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"text": "from parts"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(resp.shape(), ResponseShape::CandidateParts("from parts"));
        assert_eq!(resp.extract_text(), Some("from parts"));
    }

    #[test]
    fn empty_envelope_is_unrecognized() {
        let resp: GenerateResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(resp.shape(), ResponseShape::Unrecognized);
        assert_eq!(resp.extract_text(), None);
    }

    #[test]
    fn candidate_without_parts_is_unrecognized() {
        let resp: GenerateResponse =
            serde_json::from_str(r#"{"candidates": [{"content": {"parts": []}}]}"#).unwrap();
        assert_eq!(resp.shape(), ResponseShape::Unrecognized);
    }

    #[test]
    fn inline_image_parts_are_base64_encoded() {
        let body = GeminiProvider::request_body(&[
            Part::Text("describe".to_string()),
            Part::InlineImage {
                mime_type: "image/png".to_string(),
                data: vec![1, 2, 3],
            },
        ]);
        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], "describe");
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/png");
        assert_eq!(parts[1]["inline_data"]["data"], "AQID");
    }
}
