//! PDF page rasterization

use crate::error::{Error, Result};
use crate::pdf::pdfium::{create_pdfium, crop_box, is_quarter_turned, load_document};
use crate::pdf::read_pdf_bytes;
use image::{DynamicImage, Rgba, RgbaImage};
use pdfium_render::prelude::*;
use serde::Serialize;
use std::path::Path;
use std::time::Instant;

/// PDF user space is 72 points per inch
pub const POINTS_PER_INCH: f32 = 72.0;

/// Distance from a whole pixel count, in f32 ulps of that count, treated as
/// representation noise of the f32 inputs rather than a partial pixel
const ROUNDING_ULPS: f64 = 2.0;

/// Page dimensions in PDF points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, schemars::JsonSchema)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

/// Maps a page box in points onto a raster at a given DPI
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterGeometry {
    page_size: PageSize,
    dpi: f32,
}

impl RasterGeometry {
    pub fn new(page_size: PageSize, dpi: f32) -> Self {
        Self { page_size, dpi }
    }

    /// `dpi / 72`: pixels per PDF point
    pub fn scale(&self) -> f32 {
        self.dpi / POINTS_PER_INCH
    }

    /// Bitmap size, `ceil(points * dpi / 72)` per axis (at least one pixel)
    pub fn pixel_size(&self) -> (u32, u32) {
        (
            points_to_pixels(self.page_size.width, self.dpi),
            points_to_pixels(self.page_size.height, self.dpi),
        )
    }

    /// [`pixel_size`](Self::pixel_size) with the axes swapped for pages
    /// displayed a quarter turn from their crop box
    pub fn display_pixel_size(&self, quarter_turned: bool) -> (u32, u32) {
        let (width, height) = self.pixel_size();
        if quarter_turned {
            (height, width)
        } else {
            (width, height)
        }
    }
}

fn points_to_pixels(points: f32, dpi: f32) -> u32 {
    let exact = points as f64 * dpi as f64 / POINTS_PER_INCH as f64;
    let nearest = exact.round();
    let noise = nearest.abs() * ROUNDING_ULPS * f32::EPSILON as f64;
    let pixels = if (exact - nearest).abs() <= noise {
        nearest
    } else {
        exact.ceil()
    };
    pixels.max(1.0) as u32
}

/// Reject DPI values that cannot produce a raster
pub(crate) fn validate_dpi(dpi: f32) -> Result<()> {
    if dpi.is_finite() && dpi > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidDpi { dpi })
    }
}

/// One rasterized PDF page.
///
/// Everything but the selection flag is fixed at construction.
#[derive(Debug, Clone)]
pub struct PageAsset {
    page_index: usize,
    page_size: PageSize,
    render_scale: f32,
    image: DynamicImage,
    is_selected: bool,
}

impl PageAsset {
    pub fn new(page_index: usize, page_size: PageSize, render_scale: f32, image: DynamicImage) -> Self {
        Self {
            page_index,
            page_size,
            render_scale,
            image,
            is_selected: true,
        }
    }

    /// Zero-based position in the source document
    pub fn page_index(&self) -> usize {
        self.page_index
    }

    /// Crop box size in points, before any page rotation.
    ///
    /// For pages rotated by 90 or 270 degrees the bitmap is in display
    /// orientation, so its axes are swapped relative to this size.
    pub fn page_size(&self) -> PageSize {
        self.page_size
    }

    pub fn render_scale(&self) -> f32 {
        self.render_scale
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn is_selected(&self) -> bool {
        self.is_selected
    }

    pub fn set_selected(&mut self, selected: bool) {
        self.is_selected = selected;
    }

    /// Pixel dimensions of the rendered bitmap
    pub fn pixel_size(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }
}

/// Rasterize every page of a PDF at `dpi`.
///
/// Pages are rendered in document order from their crop box onto an opaque
/// white background. A document without pages yields an empty list; any
/// page that fails to render aborts the whole extraction.
pub fn extract<P: AsRef<Path>>(pdf_path: P, dpi: f32) -> Result<Vec<PageAsset>> {
    let pdf_path = pdf_path.as_ref();
    validate_dpi(dpi)?;

    let started = Instant::now();
    let data = read_pdf_bytes(pdf_path)?;
    let pdfium = create_pdfium()?;
    let document = load_document(&pdfium, &data)?;

    let pages = document.pages();
    let page_count = pages.len();
    let mut assets = Vec::with_capacity(page_count as usize);

    for index in 0..page_count {
        let page_index = index as usize;
        let page = pages.get(index).map_err(|e| Error::PageRenderFailed {
            page_index,
            reason: format!("{}", e),
        })?;

        let asset = render_page(&page, page_index, dpi)?;
        tracing::debug!(
            page = page_index + 1,
            width = asset.pixel_size().0,
            height = asset.pixel_size().1,
            "Rendered page"
        );
        assets.push(asset);
    }

    tracing::info!(
        path = %pdf_path.display(),
        pages = assets.len(),
        dpi,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Extracted page images"
    );

    Ok(assets)
}

fn render_page(page: &PdfPage, page_index: usize, dpi: f32) -> Result<PageAsset> {
    let crop = crop_box(page);
    let page_size = PageSize {
        width: crop.width,
        height: crop.height,
    };

    let geometry = RasterGeometry::new(page_size, dpi);
    // PDFium renders rotated pages in display orientation
    let (width, height) = geometry.display_pixel_size(is_quarter_turned(page));

    // PDFium's display matrix maps the crop box origin to the bitmap origin;
    // the target size supplies the dpi/72 scale on top of it.
    let config = PdfRenderConfig::new()
        .set_target_size(width as i32, height as i32)
        .set_clear_color(PdfColor::new(255, 255, 255, 255))
        .render_form_data(true)
        .render_annotations(true);

    let bitmap = page
        .render_with_config(&config)
        .map_err(|e| Error::PageRenderFailed {
            page_index,
            reason: format!("{}", e),
        })?;

    let image = flatten_on_white(&bitmap.as_image(), width, height);

    Ok(PageAsset::new(page_index, page_size, geometry.scale(), image))
}

/// Composite onto an opaque white canvas of exactly `width` x `height`
fn flatten_on_white(rendered: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    let mut canvas = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
    image::imageops::overlay(&mut canvas, &rendered.to_rgba8(), 0, 0);
    DynamicImage::ImageRgba8(canvas)
}
