//! PDF processing layer
//!
//! Rasterization and image assembly go through PDFium; lossless
//! re-serialization goes through qpdf.

pub mod assembler;
pub mod optimizer;
pub mod output;
pub mod pdfium;
pub mod rasterizer;

pub use assembler::{merge, page_size_for_image};
pub use optimizer::{optimize, optimize_lossless, CompressionMode, CompressionQuality};
pub use pdfium::{inspect, PageGeometry, PdfBox};
pub use rasterizer::{extract, PageAsset, PageSize, RasterGeometry, POINTS_PER_INCH};

use crate::error::{Error, Result};
use std::path::Path;

/// Read a PDF file, failing early when it does not start with a PDF header
pub(crate) fn read_pdf_bytes(path: &Path) -> Result<Vec<u8>> {
    if !path.is_file() {
        return Err(Error::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let data = std::fs::read(path)?;
    // The header may be preceded by up to 1024 bytes of junk
    let window = &data[..data.len().min(1024 + 5)];
    if !window.windows(5).any(|w| w == b"%PDF-") {
        return Err(Error::InvalidDocument {
            reason: "missing %PDF header".to_string(),
        });
    }

    Ok(data)
}
