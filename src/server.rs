//! MCP Server implementation using rmcp

use crate::codec::{self, ExportFormat};
use crate::engine::EngineLocator;
use crate::error::Error;
use crate::exporter;
use crate::pages;
use crate::pdf::{self, CompressionMode, CompressionQuality, PageGeometry, PageSize};
use anyhow::Result;
use base64::Engine;
use rmcp::{
    handler::server::tool::ToolRouter, handler::server::wrapper::Parameters, model::*,
    schemars::JsonSchema, tool, tool_handler, tool_router, ServerHandler, ServiceExt,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Service configuration for the PDF image tools server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directories every input and output path must stay inside (empty = unrestricted)
    pub resource_dirs: Vec<String>,
    /// Rendering and assembly DPI when a request does not name one (default: 144)
    pub default_dpi: f32,
    /// Largest accepted DPI (default: 1200)
    pub max_dpi: f32,
    /// Longest side of preview thumbnails in pixels (default: 320)
    pub preview_max_pixels: u32,
    /// Ghostscript executable tried before the regular search
    pub engine_path: Option<PathBuf>,
    /// Bundle directory holding `gs` and a `ghostscript/` resource tree
    pub engine_bundle_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            resource_dirs: Vec::new(),
            default_dpi: 144.0,
            max_dpi: 1200.0,
            preview_max_pixels: 320,
            engine_path: None,
            engine_bundle_dir: None,
        }
    }
}

/// PDF image tools MCP server
#[derive(Clone)]
pub struct PdfImageServer {
    tool_router: ToolRouter<Self>,
    config: Arc<ServerConfig>,
    locator: Arc<EngineLocator>,
}

// ============================================================================
// Request/Response types for pdf_to_images
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PdfToImagesParams {
    /// Path to the source PDF
    pub path: String,
    /// Directory that receives the export folder
    pub output_directory: String,
    /// Rendering resolution in dots per inch (default: 144)
    #[serde(default)]
    pub dpi: Option<f32>,
    /// Pages to export (e.g., "1-3,5", "z", "1-10:odd"). Defaults to all pages.
    #[serde(default)]
    pub pages: Option<String>,
    /// Image format: "png" (default) or "jpeg"
    #[serde(default)]
    pub format: ExportFormat,
    /// Export folder name, a single directory name (default: the PDF's file name without extension)
    #[serde(default)]
    pub folder_name: Option<String>,
    /// Include base64 PNG thumbnails of every page
    #[serde(default)]
    pub include_previews: bool,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ExportedPageInfo {
    /// Page number (1-indexed)
    pub page: usize,
    /// Crop box size in points
    pub page_size: PageSize,
    /// Rendered width in pixels
    pub width: u32,
    /// Rendered height in pixels
    pub height: u32,
    /// Whether the page was part of the selection
    pub selected: bool,
    /// Written file (selected pages only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Base64-encoded PNG thumbnail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_base64: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct PdfToImagesResult {
    pub source: String,
    pub dpi: f32,
    pub page_count: usize,
    /// Folder the images were written to
    pub folder: String,
    pub pages: Vec<ExportedPageInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Request/Response types for images_to_pdf
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ImagesToPdfParams {
    /// Image files (PNG or JPEG), one page each, in order
    #[serde(default)]
    pub images: Vec<String>,
    /// Glob pattern appended after `images` in sorted order (e.g., "/scans/*.jpg")
    #[serde(default)]
    pub pattern: Option<String>,
    /// Output PDF path. Must not exist yet.
    #[serde(default)]
    pub output_path: Option<String>,
    /// Directory for an automatically named output (Merged_yyyyMMdd_HHmmss.pdf)
    #[serde(default)]
    pub output_directory: Option<String>,
    /// Image resolution in dots per inch; sets the page size (default: 144)
    #[serde(default)]
    pub dpi: Option<f32>,
    /// Include base64 PNG thumbnails of every input image
    #[serde(default)]
    pub include_previews: bool,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ImagePreview {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub data_base64: String,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ImagesToPdfResult {
    /// Path of the written PDF
    pub output_path: String,
    pub page_count: usize,
    /// Page sizes in points, in input order
    pub pages: Vec<PageSize>,
    /// Inputs ignored because they are not PNG or JPEG files
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub previews: Vec<ImagePreview>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Request/Response types for optimize_pdf
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OptimizeMode {
    /// Structural re-serialization through qpdf, no quality loss
    #[default]
    Lossless,
    /// Recompression through Ghostscript
    Ghostscript,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct OptimizePdfParams {
    /// Path to the source PDF
    pub path: String,
    /// Output PDF path. Must not exist yet.
    #[serde(default)]
    pub output_path: Option<String>,
    /// Directory for an automatically named output (<name>_optimized.pdf).
    /// Defaults to the source's directory.
    #[serde(default)]
    pub output_directory: Option<String>,
    /// "lossless" (default) or "ghostscript"
    #[serde(default)]
    pub mode: OptimizeMode,
    /// Ghostscript preset: "screen", "ebook" (default) or "printer"
    #[serde(default)]
    pub quality: CompressionQuality,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct OptimizePdfResult {
    pub source: String,
    pub output_path: String,
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<CompressionQuality>,
    /// Original file size in bytes
    pub original_size: u64,
    /// Optimized file size in bytes
    pub optimized_size: u64,
    /// optimized/original, lower is better
    pub compression_ratio: f32,
    pub bytes_saved: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Request/Response types for inspect_pdf
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct InspectPdfParams {
    /// Path to the PDF
    pub path: String,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct InspectPdfResult {
    pub source: String,
    pub page_count: usize,
    pub pages: Vec<PageGeometry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Tool implementations
// ============================================================================

#[tool_router]
impl PdfImageServer {
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    /// Create a new server with specified resource directories
    pub fn with_resource_dirs(dirs: Vec<String>) -> Self {
        Self::with_config(ServerConfig {
            resource_dirs: dirs,
            ..ServerConfig::default()
        })
    }

    /// Create a new server with full configuration
    pub fn with_config(config: ServerConfig) -> Self {
        let locator = EngineLocator::new()
            .with_executable(config.engine_path.clone())
            .with_bundle_dir(config.engine_bundle_dir.clone());
        Self {
            tool_router: Self::tool_router(),
            config: Arc::new(config),
            locator: Arc::new(locator),
        }
    }

    /// Rasterize PDF pages into image files
    #[tool(
        description = "Render the pages of a PDF into image files, one file per page.

Pages are rendered from their crop box onto a white background at the given DPI (default 144). Files are written to <output_directory>/<folder_name>/page_001.png, page_002.png, ... Numbering follows the page number, so a page selection such as \"1,3\" writes page_001 and page_003.

Options:
- pages: qpdf-style selection (\"1-3,5\", \"z\" = last page, \"r2\" = second to last, \":odd\"/\":even\" suffixes)
- format: \"png\" (default) or \"jpeg\"
- include_previews: add base64 PNG thumbnails to the response"
    )]
    async fn pdf_to_images(&self, Parameters(params): Parameters<PdfToImagesParams>) -> String {
        let result = self.process_pdf_to_images(&params).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "pdf_to_images failed");
            PdfToImagesResult {
                source: params.path.clone(),
                dpi: params.dpi.unwrap_or(self.config.default_dpi),
                page_count: 0,
                folder: String::new(),
                pages: vec![],
                error: Some(e.client_message()),
            }
        });

        let response = serde_json::json!({ "results": [result] });
        serde_json::to_string_pretty(&response).unwrap_or_default()
    }

    /// Assemble images into a PDF
    #[tool(
        description = "Combine PNG and JPEG images into a single PDF, one page per image, in the given order.

Each page is sized from its image: pixels / (dpi / 72) points, so at the default 144 DPI a 300x400 image becomes a 150x200 pt page. Images are stretched to fill their page without cropping.

Inputs: list files in `images` and/or give a glob `pattern` (matches are appended in sorted order). Other file types are skipped and reported.
Output: `output_path`, or an automatically named Merged_yyyyMMdd_HHmmss.pdf inside `output_directory`. An existing file is never overwritten."
    )]
    async fn images_to_pdf(&self, Parameters(params): Parameters<ImagesToPdfParams>) -> String {
        let result = self.process_images_to_pdf(&params).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "images_to_pdf failed");
            ImagesToPdfResult {
                output_path: params.output_path.clone().unwrap_or_default(),
                page_count: 0,
                pages: vec![],
                skipped: vec![],
                previews: vec![],
                error: Some(e.client_message()),
            }
        });

        let response = serde_json::json!({ "results": [result] });
        serde_json::to_string_pretty(&response).unwrap_or_default()
    }

    /// Reduce PDF file size
    #[tool(
        description = "Write a smaller copy of a PDF.

Modes:
- lossless (default): pages are re-serialized with compressed object streams and unused objects removed. Content is not re-encoded, so quality is unchanged.
- ghostscript: pages are re-encoded by Ghostscript using a quality preset: \"screen\" (smallest), \"ebook\" (default, balanced) or \"printer\" (highest quality). Requires Ghostscript to be installed.

The output defaults to <name>_optimized.pdf next to the source. An existing file is never overwritten. The response reports original and optimized sizes."
    )]
    async fn optimize_pdf(&self, Parameters(params): Parameters<OptimizePdfParams>) -> String {
        let result = self.process_optimize_pdf(&params).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "optimize_pdf failed");
            OptimizePdfResult {
                source: params.path.clone(),
                output_path: params.output_path.clone().unwrap_or_default(),
                mode: Self::compression_mode(&params).name().to_string(),
                quality: None,
                original_size: 0,
                optimized_size: 0,
                compression_ratio: 1.0,
                bytes_saved: 0,
                error: Some(e.client_message()),
            }
        });

        let response = serde_json::json!({ "results": [result] });
        serde_json::to_string_pretty(&response).unwrap_or_default()
    }

    /// Report page boxes
    #[tool(
        description = "Report the page count and the crop box, media box and rotation of every page (in PDF points, 72 per inch). Useful for choosing a DPI before pdf_to_images: the rendered width is ceil(crop width * dpi / 72) pixels."
    )]
    async fn inspect_pdf(&self, Parameters(params): Parameters<InspectPdfParams>) -> String {
        let result = self.process_inspect_pdf(&params).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "inspect_pdf failed");
            InspectPdfResult {
                source: params.path.clone(),
                page_count: 0,
                pages: vec![],
                error: Some(e.client_message()),
            }
        });

        let response = serde_json::json!({ "results": [result] });
        serde_json::to_string_pretty(&response).unwrap_or_default()
    }
}

impl PdfImageServer {
    /// Validate that a path is within allowed resource directories.
    /// If no resource_dirs are configured, all paths are allowed.
    fn validate_path_access(&self, path: &str) -> crate::error::Result<PathBuf> {
        if self.config.resource_dirs.is_empty() {
            return Ok(PathBuf::from(path));
        }

        let canonical = std::fs::canonicalize(path).map_err(|_| Error::PathAccessDenied {
            path: path.to_string(),
        })?;

        if self.is_inside_resource_dirs(&canonical) {
            Ok(canonical)
        } else {
            Err(Error::PathAccessDenied {
                path: path.to_string(),
            })
        }
    }

    /// Validate that an output path is within allowed resource directories.
    /// Canonicalizes the parent directory since the output may not exist yet.
    fn validate_output_path_access(&self, path: &Path) -> crate::error::Result<PathBuf> {
        if self.config.resource_dirs.is_empty() {
            return Ok(path.to_path_buf());
        }

        let denied = || Error::PathAccessDenied {
            path: path.display().to_string(),
        };
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let file_name = path.file_name().ok_or_else(denied)?;
        let canonical_parent = std::fs::canonicalize(parent).map_err(|_| denied())?;
        let canonical_target = canonical_parent.join(file_name);

        if self.is_inside_resource_dirs(&canonical_target) {
            Ok(canonical_target)
        } else {
            Err(denied())
        }
    }

    fn is_inside_resource_dirs(&self, canonical: &Path) -> bool {
        self.config.resource_dirs.iter().any(|dir| {
            std::fs::canonicalize(dir)
                .map(|cd| canonical.starts_with(&cd))
                .unwrap_or(false)
        })
    }

    fn resolve_dpi(&self, requested: Option<f32>) -> crate::error::Result<f32> {
        let dpi = requested.unwrap_or(self.config.default_dpi);
        if !(dpi.is_finite() && dpi > 0.0 && dpi <= self.config.max_dpi) {
            return Err(Error::InvalidDpi { dpi });
        }
        Ok(dpi)
    }

    fn compression_mode(params: &OptimizePdfParams) -> CompressionMode {
        match params.mode {
            OptimizeMode::Lossless => CompressionMode::Lossless,
            OptimizeMode::Ghostscript => CompressionMode::ExternalEngine(params.quality),
        }
    }

    pub async fn process_pdf_to_images(
        &self,
        params: &PdfToImagesParams,
    ) -> crate::error::Result<PdfToImagesResult> {
        let source = self.validate_path_access(&params.path)?;
        let dpi = self.resolve_dpi(params.dpi)?;

        let folder_name = params
            .folder_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| exporter::folder_name_for(&source));
        exporter::validate_folder_name(&folder_name)?;
        let folder = self.validate_output_path_access(&Path::new(&params.output_directory).join(&folder_name))?;
        let output_directory = folder
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(&params.output_directory));

        let selection = params.pages.clone();
        let format = params.format;
        let preview_max = params.include_previews.then_some(self.config.preview_max_pixels);

        let exported = run_blocking(move || {
            let mut assets = pdf::extract(&source, dpi)?;
            if let Some(range) = &selection {
                let selected = pages::parse_selection(range, assets.len())?;
                pages::apply_selection(&mut assets, &selected);
            }

            let written = exporter::export(&assets, &output_directory, format, &folder_name)?;
            let mut written = written.into_iter();

            assets
                .iter()
                .map(|asset| {
                    let (width, height) = asset.pixel_size();
                    let file = if asset.is_selected() {
                        written.next().map(|p| p.display().to_string())
                    } else {
                        None
                    };
                    let preview_base64 = match preview_max {
                        Some(max) => Some(
                            base64::engine::general_purpose::STANDARD
                                .encode(codec::preview_png(asset.image(), max)?),
                        ),
                        None => None,
                    };
                    Ok(ExportedPageInfo {
                        page: asset.page_index() + 1,
                        page_size: asset.page_size(),
                        width,
                        height,
                        selected: asset.is_selected(),
                        file,
                        preview_base64,
                    })
                })
                .collect::<crate::error::Result<Vec<_>>>()
        })
        .await?;

        Ok(PdfToImagesResult {
            source: params.path.clone(),
            dpi,
            page_count: exported.len(),
            folder: folder.display().to_string(),
            pages: exported,
            error: None,
        })
    }

    /// Explicit images followed by sorted glob matches, split into accepted
    /// inputs and skipped non-image paths
    fn collect_images(
        &self,
        params: &ImagesToPdfParams,
    ) -> crate::error::Result<(Vec<PathBuf>, Vec<String>)> {
        let mut candidates: Vec<PathBuf> = params.images.iter().map(PathBuf::from).collect();

        if let Some(pattern) = &params.pattern {
            let mut matched: Vec<PathBuf> = glob::glob(pattern)
                .map_err(|_| Error::InvalidPattern {
                    pattern: pattern.clone(),
                })?
                .filter_map(|entry| entry.ok())
                .filter(|path| path.is_file())
                .collect();
            matched.sort();
            candidates.extend(matched);
        }

        let mut accepted = Vec::new();
        let mut skipped = Vec::new();
        for candidate in candidates {
            if codec::is_supported_image_path(&candidate) {
                accepted.push(self.validate_path_access(&candidate.to_string_lossy())?);
            } else {
                skipped.push(candidate.display().to_string());
            }
        }

        Ok((accepted, skipped))
    }

    pub async fn process_images_to_pdf(
        &self,
        params: &ImagesToPdfParams,
    ) -> crate::error::Result<ImagesToPdfResult> {
        let dpi = self.resolve_dpi(params.dpi)?;
        let (images, skipped) = self.collect_images(params)?;
        if images.is_empty() {
            return Err(Error::NoImages);
        }

        let requested = match (&params.output_path, &params.output_directory) {
            (Some(path), _) => PathBuf::from(path),
            (None, directory) => {
                let directory = directory
                    .as_deref()
                    .map(PathBuf::from)
                    .or_else(|| images[0].parent().map(Path::to_path_buf))
                    .unwrap_or_else(|| PathBuf::from("."));
                directory.join(merged_file_name(chrono::Local::now().naive_local()))
            }
        };
        let output_path = self.validate_output_path_access(&requested)?;

        let preview_max = params.include_previews.then_some(self.config.preview_max_pixels);
        let output = output_path.clone();
        let (pages, previews) = run_blocking(move || {
            let pages = pdf::merge(&images, &output, dpi)?;

            let mut previews = Vec::new();
            if let Some(max) = preview_max {
                for path in &images {
                    let thumbnail = codec::decode(path, Some(max))?;
                    previews.push(ImagePreview {
                        name: path
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default(),
                        width: thumbnail.width(),
                        height: thumbnail.height(),
                        data_base64: base64::engine::general_purpose::STANDARD
                            .encode(codec::preview_png(&thumbnail, max)?),
                    });
                }
            }
            Ok((pages, previews))
        })
        .await?;

        Ok(ImagesToPdfResult {
            output_path: output_path.display().to_string(),
            page_count: pages.len(),
            pages,
            skipped,
            previews,
            error: None,
        })
    }

    pub async fn process_optimize_pdf(
        &self,
        params: &OptimizePdfParams,
    ) -> crate::error::Result<OptimizePdfResult> {
        let source = self.validate_path_access(&params.path)?;

        let requested = match (&params.output_path, &params.output_directory) {
            (Some(path), _) => PathBuf::from(path),
            (None, directory) => {
                let directory = directory
                    .as_deref()
                    .map(PathBuf::from)
                    .or_else(|| source.parent().map(Path::to_path_buf))
                    .unwrap_or_else(|| PathBuf::from("."));
                directory.join(optimized_file_name(&source))
            }
        };
        let output_path = self.validate_output_path_access(&requested)?;

        let mode = Self::compression_mode(params);
        let locator = Arc::clone(&self.locator);
        let (input, output) = (source.clone(), output_path.clone());
        run_blocking(move || pdf::optimize(&input, &output, mode, &*locator)).await?;

        let original_size = std::fs::metadata(&source)?.len();
        let optimized_size = std::fs::metadata(&output_path)?.len();
        let compression_ratio = if original_size > 0 {
            optimized_size as f32 / original_size as f32
        } else {
            1.0
        };

        Ok(OptimizePdfResult {
            source: params.path.clone(),
            output_path: output_path.display().to_string(),
            mode: mode.name().to_string(),
            quality: match mode {
                CompressionMode::ExternalEngine(quality) => Some(quality),
                CompressionMode::Lossless => None,
            },
            original_size,
            optimized_size,
            compression_ratio,
            bytes_saved: original_size as i64 - optimized_size as i64,
            error: None,
        })
    }

    pub async fn process_inspect_pdf(
        &self,
        params: &InspectPdfParams,
    ) -> crate::error::Result<InspectPdfResult> {
        let source = self.validate_path_access(&params.path)?;
        let pages = run_blocking(move || pdf::inspect(&source)).await?;

        Ok(InspectPdfResult {
            source: params.path.clone(),
            page_count: pages.len(),
            pages,
            error: None,
        })
    }
}

/// Run a blocking core operation off the async runtime
async fn run_blocking<T, F>(task: F) -> crate::error::Result<T>
where
    F: FnOnce() -> crate::error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| Error::Io(std::io::Error::other(format!("Task join error: {}", e))))?
}

/// `Merged_yyyyMMdd_HHmmss.pdf`
pub fn merged_file_name(now: chrono::NaiveDateTime) -> String {
    format!("Merged_{}.pdf", now.format("%Y%m%d_%H%M%S"))
}

/// `<stem>_optimized.pdf`
pub fn optimized_file_name(source: &Path) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string());
    format!("{}_optimized.pdf", stem)
}

impl Default for PdfImageServer {
    fn default() -> Self {
        Self::new()
    }
}

#[tool_handler]
impl ServerHandler for PdfImageServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "PDF image tools convert PDF pages to image files, combine images into a PDF, \
                 and shrink PDFs losslessly or with Ghostscript."
                    .into(),
            ),
        }
    }
}

/// Run the MCP server without resource directories
pub async fn run_server() -> Result<()> {
    run_server_with_config(ServerConfig::default()).await
}

/// Run the MCP server with specified resource directories
pub async fn run_server_with_dirs(resource_dirs: Vec<String>) -> Result<()> {
    run_server_with_config(ServerConfig {
        resource_dirs,
        ..ServerConfig::default()
    })
    .await
}

/// Run the MCP server with full configuration
pub async fn run_server_with_config(config: ServerConfig) -> Result<()> {
    let server = PdfImageServer::with_config(config);

    tracing::info!("PDF image tools server ready, waiting for connections...");

    let service = server.serve(rmcp::transport::io::stdio()).await?;
    service.waiting().await?;

    Ok(())
}
