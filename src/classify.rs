//! Document classification via the generative-AI capability.
//!
//! Builds a categorize-and-tag prompt, invokes the provider, and parses the
//! response into a category label. Parsing is deliberately defensive: a
//! provider error (quota included), an unrecognized response shape, or a
//! response with no `Category:` marker all degrade to the
//! [`UNCATEGORIZED`] sentinel so a batch never aborts on one file.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use tracing::warn;

use crate::error::GenAiError;
use crate::genai::{GenAi, Part};

/// Sentinel category for files that could not be classified.
pub const UNCATEGORIZED: &str = "Uncategorized";

pub struct Classifier {
    genai: Arc<dyn GenAi>,
}

impl Classifier {
    pub fn new(genai: Arc<dyn GenAi>) -> Self {
        Self { genai }
    }

    /// Classify extracted text. Blank input short-circuits to
    /// [`UNCATEGORIZED`] without a provider round trip.
    pub async fn classify_text(&self, text: &str) -> String {
        if text.trim().is_empty() {
            return UNCATEGORIZED.to_string();
        }
        let parts = [Part::Text(text_prompt(text))];
        self.generate_category(&parts).await
    }

    /// Classify an image directly, for files whose OCR yielded nothing.
    pub async fn classify_image(&self, mime_type: &str, image: &[u8]) -> String {
        let parts = [
            Part::Text(image_prompt()),
            Part::InlineImage {
                mime_type: mime_type.to_string(),
                data: image.to_vec(),
            },
        ];
        self.generate_category(&parts).await
    }

    async fn generate_category(&self, parts: &[Part]) -> String {
        match self.genai.generate(parts).await {
            Ok(response) => match response.extract_text() {
                Some(raw) => extract_category(raw),
                None => UNCATEGORIZED.to_string(),
            },
            Err(GenAiError::Quota(msg)) => {
                warn!(reason = %msg, "generation quota exhausted, falling back to Uncategorized");
                UNCATEGORIZED.to_string()
            }
            Err(e) => {
                warn!(error = %e, "classification failed, falling back to Uncategorized");
                UNCATEGORIZED.to_string()
            }
        }
    }
}

fn text_prompt(text: &str) -> String {
    format!(
        "Categorize the following document and suggest 3-5 relevant tags.\n\
         Respond with a line starting with \"Category:\" followed by a short \
         category name, then a \"Tags:\" line.\n\nText:\n{}\n\n",
        text
    )
}

fn image_prompt() -> String {
    "Categorize the attached image document and suggest 3-5 relevant tags.\n\
     Respond with a line starting with \"Category:\" followed by a short \
     category name, then a \"Tags:\" line.\n"
        .to_string()
}

/// Pull the category out of a raw model response.
///
/// Looks for a `Category:` marker (optionally wrapped in markdown bold),
/// captures the text on the same or the next line, strips markdown
/// emphasis, keeps only the first line, and trims. Anything unusable maps
/// to [`UNCATEGORIZED`].
pub fn extract_category(raw: &str) -> String {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    let marker = MARKER.get_or_init(|| {
        Regex::new(r"\*{0,2}Category:\*{0,2}\s*\n?\s*[*-]?\s*(.+)").expect("category marker regex")
    });

    let Some(captures) = marker.captures(raw) else {
        return UNCATEGORIZED.to_string();
    };

    let line = captures
        .get(1)
        .map(|m| m.as_str())
        .unwrap_or_default()
        .replace(['*', '`'], "");
    let category = line.lines().next().unwrap_or_default().trim();

    if category.is_empty() {
        UNCATEGORIZED.to_string()
    } else {
        category.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genai::GenerateResponse;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedGenAi {
        reply: Result<GenerateResponse, fn() -> GenAiError>,
        calls: AtomicUsize,
    }

    impl ScriptedGenAi {
        fn replying(text: &str) -> Self {
            Self {
                reply: Ok(GenerateResponse::from_text(text)),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(err: fn() -> GenAiError) -> Self {
            Self {
                reply: Err(err),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl GenAi for ScriptedGenAi {
        async fn generate(&self, _parts: &[Part]) -> Result<GenerateResponse, GenAiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Ok(r) => Ok(r.clone()),
                Err(make) => Err(make()),
            }
        }
    }

    #[test]
    fn category_from_bold_marker() {
        let raw = "**Category:** Invoices\n**Tags:** billing, finance";
        assert_eq!(extract_category(raw), "Invoices");
    }

    #[test]
    fn category_on_next_line_with_bullet() {
        let raw = "Category:\n- Meeting Notes\nTags: planning";
        assert_eq!(extract_category(raw), "Meeting Notes");
    }

    #[test]
    fn markdown_emphasis_is_stripped() {
        let raw = "Category: `*Contracts*`";
        assert_eq!(extract_category(raw), "Contracts");
    }

    #[test]
    fn only_first_line_of_capture_is_kept() {
        let raw = "**Category:** Receipts\nextra trailing prose";
        assert_eq!(extract_category(raw), "Receipts");
    }

    #[test]
    fn missing_marker_is_uncategorized() {
        assert_eq!(extract_category("no structure here"), UNCATEGORIZED);
    }

    #[test]
    fn empty_capture_is_uncategorized() {
        assert_eq!(extract_category("Category: **"), UNCATEGORIZED);
    }

    #[tokio::test]
    async fn blank_text_short_circuits_without_provider_call() {
        let genai = Arc::new(ScriptedGenAi::replying("Category: ShouldNotHappen"));
        let classifier = Classifier::new(genai.clone());
        let category = classifier.classify_text("   \n\t ").await;
        assert_eq!(category, UNCATEGORIZED);
        assert_eq!(genai.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn quota_error_degrades_to_uncategorized() {
        let genai = Arc::new(ScriptedGenAi::failing(|| {
            GenAiError::Quota("out of tokens".to_string())
        }));
        let classifier = Classifier::new(genai);
        assert_eq!(classifier.classify_text("some document").await, UNCATEGORIZED);
    }

    #[tokio::test]
    async fn provider_error_degrades_to_uncategorized() {
        let genai = Arc::new(ScriptedGenAi::failing(|| {
            GenAiError::Provider("boom".to_string())
        }));
        let classifier = Classifier::new(genai);
        assert_eq!(classifier.classify_text("some document").await, UNCATEGORIZED);
    }

    #[tokio::test]
    async fn usable_response_yields_category() {
        let genai = Arc::new(ScriptedGenAi::replying("**Category:** Tax Documents"));
        let classifier = Classifier::new(genai);
        assert_eq!(classifier.classify_text("w2 form text").await, "Tax Documents");
    }
}
