//! PDFium bootstrap and error mapping

use crate::error::{Error, Result};
use crate::pdf::read_pdf_bytes;
use pdfium_render::prelude::*;
use serde::Serialize;
use std::path::Path;

/// Get PDFium instance (creates new instance each time - PDFium is not thread-safe)
pub(crate) fn create_pdfium() -> Result<Pdfium> {
    // Try to bind to system library or use static linking
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                "/opt/pdfium/lib",
            ))
        })
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| Error::Pdfium {
            reason: format!("Failed to initialize PDFium: {}", e),
        })?;

    Ok(Pdfium::new(bindings))
}

/// Open PDF bytes with PDFium. Encrypted documents are rejected as invalid.
pub(crate) fn load_document<'a>(pdfium: &'a Pdfium, data: &'a [u8]) -> Result<PdfDocument<'a>> {
    pdfium
        .load_pdf_from_byte_slice(data, None)
        .map_err(map_open_error)
}

fn map_open_error(err: PdfiumError) -> Error {
    match err {
        PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError) => {
            Error::InvalidDocument {
                reason: "PDF is password protected".to_string(),
            }
        }
        other => Error::InvalidDocument {
            reason: format!("{}", other),
        },
    }
}

/// A rectangle in PDF user space (points, origin bottom-left)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, schemars::JsonSchema)]
pub struct PdfBox {
    pub left: f32,
    pub bottom: f32,
    pub width: f32,
    pub height: f32,
}

impl PdfBox {
    pub fn from_rect(rect: &PdfRect) -> Self {
        Self {
            left: rect.left().value,
            bottom: rect.bottom().value,
            width: rect.width().value,
            height: rect.height().value,
        }
    }
}

/// Crop box of a page, falling back to the media box and then to the page
/// size when the document does not declare the box explicitly.
pub(crate) fn crop_box(page: &PdfPage) -> PdfBox {
    let boundaries = page.boundaries();
    boundaries
        .crop()
        .or_else(|_| boundaries.media())
        .map(|b| PdfBox::from_rect(&b.bounds))
        .unwrap_or_else(|_| PdfBox {
            left: 0.0,
            bottom: 0.0,
            width: page.width().value,
            height: page.height().value,
        })
}

/// Media box of a page, falling back to the page size
pub(crate) fn media_box(page: &PdfPage) -> PdfBox {
    page.boundaries()
        .media()
        .map(|b| PdfBox::from_rect(&b.bounds))
        .unwrap_or_else(|_| PdfBox {
            left: 0.0,
            bottom: 0.0,
            width: page.width().value,
            height: page.height().value,
        })
}

/// Whether the page is displayed rotated by a quarter turn
pub(crate) fn is_quarter_turned(page: &PdfPage) -> bool {
    matches!(
        page.rotation(),
        Ok(PdfPageRenderRotation::Degrees90) | Ok(PdfPageRenderRotation::Degrees270)
    )
}

/// Page geometry as reported by [`inspect`]
#[derive(Debug, Clone, PartialEq, Serialize, schemars::JsonSchema)]
pub struct PageGeometry {
    /// 1-based page number
    pub page: usize,
    pub crop_box: PdfBox,
    pub media_box: PdfBox,
    /// Display rotation in degrees (0, 90, 180 or 270)
    pub rotation: u16,
}

/// Read the page boxes of every page without rendering anything
pub fn inspect<P: AsRef<Path>>(pdf_path: P) -> Result<Vec<PageGeometry>> {
    let data = read_pdf_bytes(pdf_path.as_ref())?;
    let pdfium = create_pdfium()?;
    let document = load_document(&pdfium, &data)?;

    Ok(document
        .pages()
        .iter()
        .enumerate()
        .map(|(index, page)| PageGeometry {
            page: index + 1,
            crop_box: crop_box(&page),
            media_box: media_box(&page),
            rotation: rotation_degrees(&page),
        })
        .collect())
}

fn rotation_degrees(page: &PdfPage) -> u16 {
    match page.rotation() {
        Ok(PdfPageRenderRotation::Degrees90) => 90,
        Ok(PdfPageRenderRotation::Degrees180) => 180,
        Ok(PdfPageRenderRotation::Degrees270) => 270,
        _ => 0,
    }
}
