//! PDF image tools - MCP server entry point
//!
//! Positional arguments are resource directories. `PDF_IMAGE_TOOLS_GS`
//! names an explicit Ghostscript executable and `PDF_IMAGE_TOOLS_BUNDLE` a
//! directory holding a bundled `gs` with its `ghostscript/` resources.

use pdf_image_tools::{run_server_with_config, ServerConfig};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging (stdout carries the MCP protocol)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pdf_image_tools=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ServerConfig {
        resource_dirs: std::env::args().skip(1).collect(),
        engine_path: std::env::var_os("PDF_IMAGE_TOOLS_GS").map(PathBuf::from),
        engine_bundle_dir: std::env::var_os("PDF_IMAGE_TOOLS_BUNDLE").map(PathBuf::from),
        ..ServerConfig::default()
    };

    tracing::info!(
        resource_dirs = config.resource_dirs.len(),
        "Starting PDF image tools server"
    );

    run_server_with_config(config).await
}
