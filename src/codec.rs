//! Image decoding and encoding
//!
//! Thin layer over the `image` crate that maps its errors onto the crate's
//! error kinds and applies embedded EXIF orientation on decode.

use crate::error::{Error, Result};
use image::{DynamicImage, ImageDecoder, ImageError, ImageFormat, ImageReader};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Cursor, Write};
use std::path::Path;

/// Output format for exported page images
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Png,
    Jpeg,
}

impl ExportFormat {
    /// File extension without the leading dot
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpeg => "jpg",
        }
    }

    fn image_format(&self) -> ImageFormat {
        match self {
            ExportFormat::Png => ImageFormat::Png,
            ExportFormat::Jpeg => ImageFormat::Jpeg,
        }
    }
}

/// Whether a path names an image type accepted as merge input (PNG or JPEG)
pub fn is_supported_image_path<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
        .unwrap_or(false)
}

/// Decode an image file.
///
/// With `max_pixel_dimension`, the result is downsampled so that its larger
/// side does not exceed the limit (aspect ratio preserved, never upscaled).
/// Without it, the image is returned at native resolution.
pub fn decode<P: AsRef<Path>>(path: P, max_pixel_dimension: Option<u32>) -> Result<DynamicImage> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(Error::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let reader = ImageReader::open(path)?.with_guessed_format()?;
    if reader.format().is_none() {
        return Err(Error::UnsupportedFormat {
            path: path.display().to_string(),
        });
    }

    let mut decoder = reader
        .into_decoder()
        .map_err(|e| map_decode_error(path, e))?;
    let orientation = decoder
        .orientation()
        .map_err(|e| map_decode_error(path, e))?;
    let mut image = DynamicImage::from_decoder(decoder).map_err(|e| map_decode_error(path, e))?;
    image.apply_orientation(orientation);

    match max_pixel_dimension {
        Some(max) if max > 0 && image.width().max(image.height()) > max => {
            Ok(image.thumbnail(max, max))
        }
        _ => Ok(image),
    }
}

/// Encode a bitmap as a single-frame PNG file
pub fn encode_png<P: AsRef<Path>>(image: &DynamicImage, path: P) -> Result<()> {
    encode(image, path, ExportFormat::Png)
}

/// Encode a bitmap in the requested format
pub fn encode<P: AsRef<Path>>(image: &DynamicImage, path: P, format: ExportFormat) -> Result<()> {
    let path = path.as_ref();
    let encode_failed = |reason: String| Error::EncodeFailed {
        path: path.display().to_string(),
        reason,
    };

    let file = File::create(path).map_err(|e| encode_failed(e.to_string()))?;
    let mut writer = BufWriter::new(file);

    let result = match format {
        // JPEG has no alpha channel
        ExportFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8())
            .write_to(&mut writer, format.image_format()),
        ExportFormat::Png => image.write_to(&mut writer, format.image_format()),
    };
    result.map_err(|e| encode_failed(e.to_string()))?;

    writer.flush().map_err(|e| encode_failed(e.to_string()))?;
    Ok(())
}

/// Downsample to `max_pixel_dimension` and encode as PNG bytes
pub fn preview_png(image: &DynamicImage, max_pixel_dimension: u32) -> Result<Vec<u8>> {
    let preview = if image.width().max(image.height()) > max_pixel_dimension {
        image.thumbnail(max_pixel_dimension, max_pixel_dimension)
    } else {
        image.clone()
    };

    let mut bytes = Vec::new();
    preview
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| Error::EncodeFailed {
            path: "<preview>".to_string(),
            reason: e.to_string(),
        })?;
    Ok(bytes)
}

fn map_decode_error(path: &Path, err: ImageError) -> Error {
    match err {
        ImageError::Unsupported(_) => Error::UnsupportedFormat {
            path: path.display().to_string(),
        },
        other => Error::DecodeFailed {
            path: path.display().to_string(),
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    fn write_png(dir: &TempDir, name: &str, width: u32, height: u32) -> std::path::PathBuf {
        let path = dir.path().join(name);
        RgbaImage::from_pixel(width, height, Rgba([200, 10, 10, 255]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn test_decode_native_resolution() {
        let dir = TempDir::new().unwrap();
        let path = write_png(&dir, "a.png", 300, 400);

        let image = decode(&path, None).unwrap();
        assert_eq!((image.width(), image.height()), (300, 400));
    }

    #[test]
    fn test_decode_downsamples_larger_side() {
        let dir = TempDir::new().unwrap();
        let path = write_png(&dir, "wide.png", 800, 400);

        let image = decode(&path, Some(320)).unwrap();
        assert_eq!(image.width(), 320);
        assert_eq!(image.height(), 160);
    }

    #[test]
    fn test_decode_never_upscales() {
        let dir = TempDir::new().unwrap();
        let path = write_png(&dir, "small.png", 50, 40);

        let image = decode(&path, Some(320)).unwrap();
        assert_eq!((image.width(), image.height()), (50, 40));
    }

    #[test]
    fn test_decode_missing_file() {
        let result = decode("/nonexistent/image.png", None);
        assert!(matches!(result, Err(Error::FileNotFound { .. })));
    }

    #[test]
    fn test_decode_unrecognized_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"plain text, not pixels").unwrap();

        let result = decode(&path, None);
        assert!(matches!(result, Err(Error::UnsupportedFormat { .. })));
    }

    #[test]
    fn test_decode_truncated_png() {
        let dir = TempDir::new().unwrap();
        let path = write_png(&dir, "full.png", 64, 64);
        let bytes = std::fs::read(&path).unwrap();
        let truncated = dir.path().join("broken.png");
        std::fs::write(&truncated, &bytes[..bytes.len() / 2]).unwrap();

        let result = decode(&truncated, None);
        assert!(matches!(result, Err(Error::DecodeFailed { .. })));
    }

    #[test]
    fn test_encode_png_then_decode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.png");
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 12, Rgba([1, 2, 3, 255])));

        encode_png(&image, &path).unwrap();

        let decoded = decode(&path, None).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (10, 12));
    }

    #[test]
    fn test_encode_into_missing_directory_fails() {
        let image = DynamicImage::ImageRgba8(RgbaImage::new(4, 4));
        let result = encode_png(&image, "/nonexistent/dir/out.png");
        assert!(matches!(result, Err(Error::EncodeFailed { .. })));
    }

    #[test]
    fn test_encode_jpeg_drops_alpha() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.jpg");
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([9, 9, 9, 128])));

        encode(&image, &path, ExportFormat::Jpeg).unwrap();

        let decoded = decode(&path, None).unwrap();
        assert!(!decoded.color().has_alpha());
    }

    #[test]
    fn test_preview_png_is_bounded() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(640, 200, Rgba([5, 5, 5, 255])));

        let bytes = preview_png(&image, 320).unwrap();
        let preview = image::load_from_memory(&bytes).unwrap();
        assert_eq!((preview.width(), preview.height()), (320, 100));
    }

    #[test]
    fn test_supported_image_paths() {
        assert!(is_supported_image_path("scan.PNG"));
        assert!(is_supported_image_path("/a/b/photo.jpeg"));
        assert!(is_supported_image_path("photo.jpg"));
        assert!(!is_supported_image_path("doc.pdf"));
        assert!(!is_supported_image_path("noext"));
    }
}
