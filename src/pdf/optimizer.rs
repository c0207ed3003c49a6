//! PDF size optimization
//!
//! Two explicit modes: a lossless structural re-pack through qpdf, and a
//! recompression pass delegated to Ghostscript (see [`crate::engine`]).

use crate::engine::{self, locate::Probe, EngineLocator};
use crate::error::{Error, Result};
use crate::pdf::output::{ensure_writable_destination, OutputGuard};
use crate::pdf::read_pdf_bytes;
use qpdf::{ObjectStreamMode, QPdf, QPdfDictionary, QPdfObject};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;

/// Page attributes a page may inherit from its ancestors in the page tree
const INHERITABLE_KEYS: [&str; 4] = ["/MediaBox", "/CropBox", "/Resources", "/Rotate"];

/// Guard against cyclic `/Parent` chains in damaged files
const MAX_TREE_DEPTH: usize = 64;

/// Quality profile for the external engine
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum CompressionQuality {
    /// Lowest fidelity, smallest output
    Screen,
    #[default]
    Ebook,
    /// Highest fidelity
    Printer,
}

impl CompressionQuality {
    /// Ghostscript `-dPDFSETTINGS` value
    pub fn preset(&self) -> &'static str {
        match self {
            CompressionQuality::Screen => "/screen",
            CompressionQuality::Ebook => "/ebook",
            CompressionQuality::Printer => "/printer",
        }
    }
}

/// How a PDF is optimized
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CompressionMode {
    /// Structural re-serialization, no content is re-encoded
    #[default]
    Lossless,
    /// Recompression by the external engine with a quality preset
    ExternalEngine(CompressionQuality),
}

impl CompressionMode {
    pub fn name(&self) -> &'static str {
        match self {
            CompressionMode::Lossless => "lossless",
            CompressionMode::ExternalEngine(_) => "ghostscript",
        }
    }
}

/// Optimize `pdf_path` into `output_path` with the selected mode
pub fn optimize<P: Probe>(
    pdf_path: &Path,
    output_path: &Path,
    mode: CompressionMode,
    locator: &EngineLocator<P>,
) -> Result<()> {
    match mode {
        CompressionMode::Lossless => optimize_lossless(pdf_path, output_path),
        CompressionMode::ExternalEngine(quality) => {
            engine::optimize_external(pdf_path, output_path, quality, locator)
        }
    }
}

/// Re-serialize every page of `pdf_path` into a fresh document.
///
/// Page content streams are copied untouched, each page keeps its own media
/// box, and the writer packs objects into compressed object streams and
/// drops unreferenced objects. The destination must not exist yet and is
/// removed again if writing fails.
pub fn optimize_lossless(pdf_path: &Path, output_path: &Path) -> Result<()> {
    let started = Instant::now();
    let data = read_pdf_bytes(pdf_path)?;

    let source = QPdf::read_from_memory(&data).map_err(map_open_error)?;
    let pages = source.get_pages().map_err(map_open_error)?;
    if pages.is_empty() {
        return Err(Error::NoPages);
    }
    ensure_writable_destination(output_path)?;

    let guard = OutputGuard::create(output_path)?;

    let dest = QPdf::empty();
    for (index, page) in pages.iter().enumerate() {
        push_inherited_attributes(page);
        let copied = dest.copy_from_foreign(page);
        dest.add_page(&copied, false).map_err(map_qpdf_error)?;
        tracing::debug!(page = index + 1, "Copied page");
    }

    let mut writer = dest.writer();
    writer
        .object_stream_mode(ObjectStreamMode::Generate)
        .compress_streams(true)
        .preserve_unreferenced_objects(false)
        .preserve_encryption(false);
    let bytes = writer.write_to_memory().map_err(map_qpdf_error)?;
    guard.commit(&bytes)?;

    tracing::info!(
        output = %output_path.display(),
        pages = pages.len(),
        original_bytes = data.len(),
        optimized_bytes = bytes.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Lossless optimization finished"
    );

    Ok(())
}

/// Copy attributes inherited through the page tree onto the page itself.
///
/// Only the page dictionary crosses into the new document, so a media box
/// declared on an ancestor `/Pages` node would otherwise be lost.
fn push_inherited_attributes(page: &QPdfDictionary) {
    for key in INHERITABLE_KEYS {
        if page.get(key).is_some() {
            continue;
        }
        if let Some(value) = inherited_value(page, key) {
            page.set(key, &value);
        }
    }
}

fn inherited_value(page: &QPdfDictionary, key: &str) -> Option<QPdfObject> {
    let mut node = page.get("/Parent");
    for _ in 0..MAX_TREE_DEPTH {
        let parent: QPdfDictionary = node?.into();
        if let Some(value) = parent.get(key) {
            return Some(value);
        }
        node = parent.get("/Parent");
    }
    None
}

fn map_open_error(e: qpdf::QPdfError) -> Error {
    match e.error_code() {
        qpdf::QPdfErrorCode::InvalidPassword => Error::InvalidDocument {
            reason: "PDF is password protected".to_string(),
        },
        _ => Error::InvalidDocument {
            reason: e.to_string(),
        },
    }
}

fn map_qpdf_error(e: qpdf::QPdfError) -> Error {
    Error::Qpdf {
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    #[case(CompressionQuality::Screen, "/screen")]
    #[case(CompressionQuality::Ebook, "/ebook")]
    #[case(CompressionQuality::Printer, "/printer")]
    fn test_quality_presets(#[case] quality: CompressionQuality, #[case] expected: &str) {
        assert_eq!(quality.preset(), expected);
    }

    #[test]
    fn test_defaults() {
        assert_eq!(CompressionMode::default(), CompressionMode::Lossless);
        assert_eq!(CompressionQuality::default(), CompressionQuality::Ebook);
    }

    #[test]
    fn test_quality_deserializes_lowercase() {
        let quality: CompressionQuality = serde_json::from_str("\"printer\"").unwrap();
        assert_eq!(quality, CompressionQuality::Printer);
    }

    #[test]
    fn test_lossless_missing_source() {
        let dir = TempDir::new().unwrap();
        let result = optimize_lossless(&dir.path().join("missing.pdf"), &dir.path().join("out.pdf"));
        assert!(matches!(result, Err(Error::FileNotFound { .. })));
    }

    #[test]
    fn test_lossless_rejects_non_pdf() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("notes.pdf");
        std::fs::write(&source, b"definitely not a pdf").unwrap();
        let output = dir.path().join("out.pdf");

        let result = optimize_lossless(&source, &output);
        assert!(matches!(result, Err(Error::InvalidDocument { .. })));
        assert!(!output.exists());
    }
}
