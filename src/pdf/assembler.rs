//! Assemble a sequence of images into one PDF, one page per image

use crate::codec;
use crate::error::{Error, Result};
use crate::pdf::output::{ensure_writable_destination, OutputGuard};
use crate::pdf::pdfium::create_pdfium;
use crate::pdf::rasterizer::{validate_dpi, PageSize, POINTS_PER_INCH};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use std::time::Instant;

/// Page size in points for an image shown at `dpi`
pub fn page_size_for_image(pixel_width: u32, pixel_height: u32, dpi: f32) -> PageSize {
    let scale = dpi / POINTS_PER_INCH;
    PageSize {
        width: pixel_width as f32 / scale,
        height: pixel_height as f32 / scale,
    }
}

/// Merge images into a new PDF at `output_path`.
///
/// Every image becomes one page sized `pixels / (dpi / 72)` points and is
/// stretched to fill it. The destination must not exist yet. Any failure
/// after the file was created removes it again.
///
/// Returns the size of every written page, in input order.
pub fn merge<P: AsRef<Path>>(image_paths: &[P], output_path: &Path, dpi: f32) -> Result<Vec<PageSize>> {
    if image_paths.is_empty() {
        return Err(Error::NoImages);
    }
    validate_dpi(dpi)?;
    ensure_writable_destination(output_path)?;

    let started = Instant::now();
    let mut pending = Some(load_full_resolution(image_paths[0].as_ref())?);

    let pdfium = create_pdfium()?;
    let mut document = pdfium
        .create_new_pdf()
        .map_err(|e| Error::DocumentCreationFailed {
            reason: format!("{}", e),
        })?;
    let guard = OutputGuard::create(output_path)?;

    let mut page_sizes = Vec::with_capacity(image_paths.len());
    for (index, path) in image_paths.iter().enumerate() {
        let image = match pending.take() {
            Some(first) => first,
            None => load_full_resolution(path.as_ref())?,
        };

        let page_size = page_size_for_image(image.width(), image.height(), dpi);
        add_image_page(&mut document, &image, page_size).map_err(|e| {
            Error::DocumentCreationFailed {
                reason: format!("page {}: {}", index + 1, e),
            }
        })?;

        tracing::debug!(
            page = index + 1,
            width_pt = page_size.width,
            height_pt = page_size.height,
            "Added image page"
        );
        page_sizes.push(page_size);
    }

    let bytes = document
        .save_to_bytes()
        .map_err(|e| Error::DocumentCreationFailed {
            reason: format!("{}", e),
        })?;
    guard.commit(&bytes)?;

    tracing::info!(
        output = %output_path.display(),
        pages = page_sizes.len(),
        dpi,
        bytes = bytes.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Merged images into PDF"
    );

    Ok(page_sizes)
}

fn load_full_resolution(path: &Path) -> Result<DynamicImage> {
    codec::decode(path, None).map_err(|e| {
        tracing::warn!(path = %path.display(), error = %e, "Image load failed");
        Error::ImageLoadFailed {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
        }
    })
}

fn add_image_page(
    document: &mut PdfDocument,
    image: &DynamicImage,
    page_size: PageSize,
) -> std::result::Result<(), PdfiumError> {
    let width = PdfPoints::new(page_size.width);
    let height = PdfPoints::new(page_size.height);

    let mut page = document
        .pages_mut()
        .create_page_at_end(PdfPagePaperSize::Custom(width, height))?;

    // Image objects start as a 1x1 point square at the origin
    let mut image_object = PdfPageImageObject::new(document, image)?;
    image_object.scale(width.value, height.value)?;

    page.objects_mut()
        .add_object(PdfPageObject::Image(image_object))?;

    Ok(())
}
