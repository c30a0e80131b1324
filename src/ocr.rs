//! Optical character recognition capability.
//!
//! OCR is strictly best-effort: any failure yields an empty string and the
//! caller falls back to vision-based classification with the raw bytes.

use std::io::Write;
use std::process::{Command, Stdio};

use tracing::warn;

use crate::config::OcrConfig;

/// Best-effort image-to-text capability.
pub trait Ocr: Send + Sync {
    /// Recognize text in an image. Returns an empty string on any failure.
    fn image_to_text(&self, image: &[u8]) -> String;
}

/// OCR via the `tesseract` binary, reading the image from stdin.
pub struct TesseractOcr {
    command: String,
    lang: String,
}

impl TesseractOcr {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            command: "tesseract".to_string(),
            lang: config.lang.clone(),
        }
    }

    #[cfg(test)]
    fn with_command(command: &str, lang: &str) -> Self {
        Self {
            command: command.to_string(),
            lang: lang.to_string(),
        }
    }
}

impl Ocr for TesseractOcr {
    fn image_to_text(&self, image: &[u8]) -> String {
        let spawned = Command::new(&self.command)
            .args(["stdin", "stdout", "-l", &self.lang])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                warn!(error = %e, "failed to spawn tesseract, skipping OCR");
                return String::new();
            }
        };

        // A broken pipe here still needs the child reaped below.
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(image) {
                warn!(error = %e, "failed to write image to tesseract stdin");
            }
        }

        match child.wait_with_output() {
            Ok(output) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout).into_owned()
            }
            Ok(output) => {
                warn!(status = %output.status, "tesseract exited nonzero, skipping OCR");
                String::new()
            }
            Err(e) => {
                warn!(error = %e, "tesseract failed, skipping OCR");
                String::new()
            }
        }
    }
}

/// No-op OCR used when `ocr.provider = "disabled"`. Every image routes to
/// the vision classification path.
pub struct DisabledOcr;

impl Ocr for DisabledOcr {
    fn image_to_text(&self, _image: &[u8]) -> String {
        String::new()
    }
}

/// Instantiate the OCR backend named by the configuration.
pub fn create_ocr(config: &OcrConfig) -> Box<dyn Ocr> {
    match config.provider.as_str() {
        "tesseract" => Box::new(TesseractOcr::new(config)),
        _ => Box::new(DisabledOcr),
    }
}
