//! Multi-format content extraction for remote files (PDF, DOCX, images).
//!
//! Returns plain UTF-8 text. Images go through OCR first; if that yields
//! nothing, the raw bytes are handed back so a vision-capable
//! classification call can run instead. A corrupt file never aborts a
//! batch: every failure degrades to empty text.

use std::io::Read;

use tracing::warn;

use crate::ocr::Ocr;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Result of content extraction for one file.
#[derive(Debug, Default)]
pub struct Extracted {
    pub text: String,
    /// Raw image bytes, present only when OCR produced nothing usable and a
    /// vision-based classification path should run instead.
    pub image: Option<Vec<u8>>,
}

impl Extracted {
    fn text_only(text: String) -> Self {
        Self { text, image: None }
    }

    /// True when no text was recovered (empty or whitespace-only).
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Extract plain text from a file's raw bytes.
///
/// Unsupported content types yield empty text. Parse failures are logged
/// and degrade to empty text rather than erroring, so one bad file cannot
/// halt processing of the rest.
pub fn extract(bytes: &[u8], content_type: &str, ocr: &dyn Ocr) -> Extracted {
    let result = match content_type {
        MIME_PDF => extract_pdf(bytes).map(Extracted::text_only),
        MIME_DOCX => extract_docx(bytes).map(Extracted::text_only),
        ct if ct.starts_with("image/") => Ok(extract_image(bytes, ocr)),
        _ => Ok(Extracted::default()),
    };

    match result {
        Ok(extracted) => extracted,
        Err(e) => {
            warn!(content_type, error = %e, "extraction failed, continuing with empty text");
            Extracted::default()
        }
    }
}

fn extract_pdf(bytes: &[u8]) -> anyhow::Result<String> {
    // pdf-extract concatenates per-page text itself; a page with no text
    // layer contributes nothing but does not fail the document.
    Ok(pdf_extract::extract_text_from_mem(bytes)?)
}

fn extract_docx(bytes: &[u8]) -> anyhow::Result<String> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))?;
    let entry = archive.by_name("word/document.xml")?;
    let mut doc_xml = Vec::new();
    entry.take(MAX_XML_ENTRY_BYTES).read_to_end(&mut doc_xml)?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        anyhow::bail!("word/document.xml exceeds size limit");
    }
    extract_paragraph_text(&doc_xml)
}

/// Walk `word/document.xml` collecting `w:t` runs, joining paragraphs
/// (`w:p` elements) with newlines.
fn extract_paragraph_text(xml: &[u8]) -> anyhow::Result<String> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        out.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"p" {
                    out.push('\n');
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => anyhow::bail!("malformed document.xml: {}", e),
            _ => {}
        }
        buf.clear();
    }
    // Trailing newline from the final paragraph close.
    if out.ends_with('\n') {
        out.pop();
    }
    Ok(out)
}

fn extract_image(bytes: &[u8], ocr: &dyn Ocr) -> Extracted {
    let text = ocr.image_to_text(bytes);
    if text.trim().is_empty() {
        Extracted {
            text: String::new(),
            image: Some(bytes.to_vec()),
        }
    } else {
        Extracted::text_only(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::DisabledOcr;
    use std::io::Write;

    fn docx_with_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file(
                "word/document.xml",
                zip::write::SimpleFileOptions::default(),
            )
            .unwrap();
            let body: String = paragraphs
                .iter()
                .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
                .collect();
            let xml = format!(
                "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
                body
            );
            zip.write_all(xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn docx_paragraphs_joined_with_newlines() {
        let bytes = docx_with_paragraphs(&["first paragraph", "second paragraph"]);
        let extracted = extract(&bytes, MIME_DOCX, &DisabledOcr);
        assert_eq!(extracted.text, "first paragraph\nsecond paragraph");
        assert!(extracted.image.is_none());
    }

    #[test]
    fn corrupt_pdf_degrades_to_empty_text() {
        let extracted = extract(b"not a pdf", MIME_PDF, &DisabledOcr);
        assert!(extracted.is_blank());
        assert!(extracted.image.is_none());
    }

    #[test]
    fn corrupt_docx_degrades_to_empty_text() {
        let extracted = extract(b"not a zip", MIME_DOCX, &DisabledOcr);
        assert!(extracted.is_blank());
    }

    #[test]
    fn unsupported_type_yields_empty_text() {
        let extracted = extract(b"anything", "application/octet-stream", &DisabledOcr);
        assert!(extracted.is_blank());
        assert!(extracted.image.is_none());
    }

    #[test]
    fn image_with_no_ocr_text_returns_raw_bytes() {
        let extracted = extract(b"\x89PNG fake", "image/png", &DisabledOcr);
        assert!(extracted.is_blank());
        assert_eq!(extracted.image.as_deref(), Some(&b"\x89PNG fake"[..]));
    }
}
