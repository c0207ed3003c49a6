//! Error types for PDF image tools

use thiserror::Error;

/// Result type alias for PDF image tools
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for PDF image tools
#[derive(Error, Debug)]
pub enum Error {
    /// Input file does not exist
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    /// Image type could not be recognized
    #[error("Unsupported image format: {path}")]
    UnsupportedFormat { path: String },

    /// Image type was recognized but the data could not be decoded
    #[error("Failed to decode image {path}: {reason}")]
    DecodeFailed { path: String, reason: String },

    /// Image could not be encoded or the destination could not be finalized
    #[error("Failed to encode image {path}: {reason}")]
    EncodeFailed { path: String, reason: String },

    /// PDF could not be opened (corrupt, not a PDF, or password protected)
    #[error("Invalid PDF document: {reason}")]
    InvalidDocument { reason: String },

    /// PDF opened but contains no pages
    #[error("PDF has no pages")]
    NoPages,

    /// A single page could not be rasterized
    #[error("Failed to render page {}: {reason}", .page_index + 1)]
    PageRenderFailed { page_index: usize, reason: String },

    /// Image list was empty
    #[error("No images to merge")]
    NoImages,

    /// DPI was zero, negative or not finite
    #[error("Invalid DPI: {dpi}")]
    InvalidDpi { dpi: f32 },

    /// Parent directory of the destination does not exist
    #[error("Output directory not found: {path}")]
    OutputDirectoryNotFound { path: String },

    /// Destination file already exists
    #[error("Output file already exists: {path}")]
    OutputFileExists { path: String },

    /// An input image could not be decoded at full resolution
    #[error("Failed to load image: {name}")]
    ImageLoadFailed { name: String },

    /// Output PDF could not be created or finalized
    #[error("Failed to create PDF document: {reason}")]
    DocumentCreationFailed { reason: String },

    /// No executable recompression engine was found
    #[error("Ghostscript (gs) not found")]
    EngineNotFound,

    /// Recompression engine ran but did not succeed
    #[error("Ghostscript failed: {detail}")]
    EngineFailed { detail: String },

    /// Export directory could not be created
    #[error("Failed to create directory: {path}")]
    DirectoryCreationFailed { path: String },

    /// A page image could not be written during export
    #[error("Failed to write page {}", .page_index + 1)]
    ImageWriteFailed { page_index: usize },

    /// Invalid page range
    #[error("Invalid page range: {range}")]
    InvalidPageRange { range: String },

    /// Export folder name is not a single path component
    #[error("Invalid folder name: {name}")]
    InvalidFolderName { name: String },

    /// Glob pattern for image inputs could not be parsed
    #[error("Invalid file pattern: {pattern}")]
    InvalidPattern { pattern: String },

    /// Path access denied (outside allowed resource directories)
    #[error("Path access denied: {path}")]
    PathAccessDenied { path: String },

    /// PDFium error
    #[error("PDFium error: {reason}")]
    Pdfium { reason: String },

    /// qpdf error
    #[error("qpdf error: {reason}")]
    Qpdf { reason: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Return a sanitized error message safe to send to clients.
    /// Absolute paths and library internals are omitted; file names and
    /// page numbers are kept so the message stays actionable.
    /// Full details should be logged via tracing before calling this.
    pub fn client_message(&self) -> String {
        match self {
            Error::FileNotFound { path } => format!("File not found: {}", file_name(path)),
            Error::UnsupportedFormat { path } => {
                format!("Unsupported image format: {}", file_name(path))
            }
            Error::DecodeFailed { path, .. } => {
                format!("Image file is malformed: {}", file_name(path))
            }
            Error::EncodeFailed { path, .. } => {
                format!("Failed to write image: {}", file_name(path))
            }
            Error::InvalidDocument { .. } => "PDF file is corrupt or malformed".to_string(),
            Error::NoPages => "PDF has no pages".to_string(),
            Error::PageRenderFailed { page_index, .. } => {
                format!("Failed to render page {}", page_index + 1)
            }
            Error::NoImages => "Add at least one image".to_string(),
            Error::InvalidDpi { .. } => "Invalid DPI setting".to_string(),
            Error::OutputDirectoryNotFound { .. } => "Output directory does not exist".to_string(),
            Error::OutputFileExists { path } => {
                format!("Output file already exists: {}", file_name(path))
            }
            Error::ImageLoadFailed { name } => format!("Failed to load image: {}", name),
            Error::DocumentCreationFailed { .. } => "Failed to create PDF file".to_string(),
            Error::EngineNotFound => {
                "Ghostscript (gs) not found; install it or use lossless mode".to_string()
            }
            Error::EngineFailed { detail } => {
                if detail.is_empty() {
                    "Ghostscript compression failed".to_string()
                } else {
                    format!("Ghostscript compression failed: {}", detail)
                }
            }
            Error::DirectoryCreationFailed { .. } => {
                "Failed to create output directory".to_string()
            }
            Error::ImageWriteFailed { page_index } => {
                format!("Failed to write page {}", page_index + 1)
            }
            Error::InvalidPageRange { range } => format!("Invalid page range: {}", range),
            Error::InvalidFolderName { name } => format!("Invalid folder name: {}", name),
            Error::InvalidPattern { pattern } => format!("Invalid file pattern: {}", pattern),
            Error::PathAccessDenied { .. } => "Access denied".to_string(),
            Error::Pdfium { .. } => "PDF processing error".to_string(),
            Error::Qpdf { .. } => "PDF processing error".to_string(),
            Error::Io(_) => "I/O error".to_string(),
            Error::Serialization(_) => "Serialization error".to_string(),
        }
    }
}

fn file_name(path: &str) -> String {
    std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}
