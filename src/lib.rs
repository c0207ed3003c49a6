//! PDF image tools
//!
//! Converts between PDF documents and raster images and shrinks PDFs:
//! - `pdf_to_images`: rasterize pages at a DPI and write one image per page
//! - `images_to_pdf`: assemble PNG/JPEG images into a PDF, one page each
//! - `optimize_pdf`: lossless re-serialization or Ghostscript recompression
//! - `inspect_pdf`: report page boxes
//!
//! The core operations are synchronous and live in [`pdf`], [`engine`] and
//! [`exporter`]; [`server`] exposes them as MCP tools.

pub mod codec;
pub mod engine;
pub mod error;
pub mod exporter;
pub mod pages;
pub mod pdf;
pub mod server;

pub use error::{Error, Result};
pub use server::{
    run_server, run_server_with_config, run_server_with_dirs, PdfImageServer, ServerConfig,
};
