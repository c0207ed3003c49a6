//! Write rasterized pages to individual image files

use crate::codec::{self, ExportFormat};
use crate::error::{Error, Result};
use crate::pdf::PageAsset;
use std::path::{Component, Path, PathBuf};

/// Folder name used when no better one can be derived
pub const DEFAULT_FOLDER_NAME: &str = "ExportedPages";

/// `page_001.png` for page index 0
pub fn page_file_name(page_index: usize, format: ExportFormat) -> String {
    format!("page_{:03}.{}", page_index + 1, format.extension())
}

/// Export folder name for a source document: its file stem, or
/// [`DEFAULT_FOLDER_NAME`] when it has none
pub fn folder_name_for(source: &Path) -> String {
    source
        .file_stem()
        .map(|s| s.to_string_lossy().trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_FOLDER_NAME.to_string())
}

/// Accept only names that are one plain path component, so the export
/// folder is always a direct child of the output directory
pub fn validate_folder_name(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(Error::InvalidFolderName {
            name: name.to_string(),
        }),
    }
}

/// Write every selected asset into `output_directory/subfolder_name`.
///
/// File names derive from the page index, so skipped pages leave gaps in
/// the numbering. The first failing page aborts the export; files written
/// before it are kept.
///
/// Returns the written paths in asset order.
pub fn export(
    assets: &[PageAsset],
    output_directory: &Path,
    format: ExportFormat,
    subfolder_name: &str,
) -> Result<Vec<PathBuf>> {
    validate_folder_name(subfolder_name)?;
    let folder = output_directory.join(subfolder_name);
    std::fs::create_dir_all(&folder).map_err(|e| {
        tracing::warn!(path = %folder.display(), error = %e, "Failed to create export folder");
        Error::DirectoryCreationFailed {
            path: folder.display().to_string(),
        }
    })?;

    let mut written = Vec::new();
    for asset in assets.iter().filter(|a| a.is_selected()) {
        let path = folder.join(page_file_name(asset.page_index(), format));
        codec::encode(asset.image(), &path, format).map_err(|e| {
            tracing::warn!(page = asset.page_index() + 1, error = %e, "Failed to write page image");
            Error::ImageWriteFailed {
                page_index: asset.page_index(),
            }
        })?;
        tracing::debug!(page = asset.page_index() + 1, path = %path.display(), "Wrote page image");
        written.push(path);
    }

    tracing::info!(
        folder = %folder.display(),
        files = written.len(),
        format = format.extension(),
        "Exported page images"
    );

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::PageSize;
    use image::{DynamicImage, Rgba, RgbaImage};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use tempfile::TempDir;

    fn asset(page_index: usize) -> PageAsset {
        PageAsset::new(
            page_index,
            PageSize {
                width: 8.0,
                height: 8.0,
            },
            1.0,
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([0, 128, 255, 255]))),
        )
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_page_file_names() {
        assert_eq!(page_file_name(0, ExportFormat::Png), "page_001.png");
        assert_eq!(page_file_name(41, ExportFormat::Jpeg), "page_042.jpg");
        assert_eq!(page_file_name(1233, ExportFormat::Png), "page_1234.png");
    }

    #[test]
    fn test_folder_name_for() {
        assert_eq!(folder_name_for(Path::new("/docs/Report 2024.pdf")), "Report 2024");
        assert_eq!(folder_name_for(Path::new("/")), DEFAULT_FOLDER_NAME);
    }

    #[rstest]
    #[case("pages")]
    #[case("Report 2024")]
    #[case("page.v2")]
    fn test_single_component_folder_names(#[case] name: &str) {
        assert!(validate_folder_name(name).is_ok());
    }

    #[rstest]
    #[case("")]
    #[case("a/b")]
    #[case("..")]
    #[case(".")]
    #[case("/abs")]
    #[case("../escape")]
    fn test_nested_or_relative_folder_names_rejected(#[case] name: &str) {
        assert!(matches!(
            validate_folder_name(name),
            Err(Error::InvalidFolderName { .. })
        ));
    }

    #[test]
    fn test_export_refuses_nested_folder_name() {
        let dir = TempDir::new().unwrap();

        let result = export(&[asset(0)], dir.path(), ExportFormat::Png, "a/b");

        assert!(matches!(result, Err(Error::InvalidFolderName { .. })));
        assert!(!dir.path().join("a").exists());
    }

    #[test]
    fn test_export_keeps_index_gaps() {
        let dir = TempDir::new().unwrap();
        let assets = vec![asset(0), asset(2)];

        let written = export(&assets, dir.path(), ExportFormat::Png, "X").unwrap();

        assert_eq!(file_names(&dir.path().join("X")), vec!["page_001.png", "page_003.png"]);
        assert_eq!(written.len(), 2);
    }

    #[test]
    fn test_export_skips_unselected() {
        let dir = TempDir::new().unwrap();
        let mut assets = vec![asset(0), asset(1), asset(2)];
        assets[1].set_selected(false);

        export(&assets, dir.path(), ExportFormat::Jpeg, "doc").unwrap();

        assert_eq!(
            file_names(&dir.path().join("doc")),
            vec!["page_001.jpg", "page_003.jpg"]
        );
    }

    #[test]
    fn test_export_creates_intermediate_directories() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a/b");

        export(&[asset(4)], &nested, ExportFormat::Png, "c").unwrap();

        assert!(nested.join("c/page_005.png").is_file());
    }

    #[test]
    fn test_export_folder_blocked_by_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("X"), b"not a directory").unwrap();

        let result = export(&[asset(0)], dir.path(), ExportFormat::Png, "X");
        assert!(matches!(result, Err(Error::DirectoryCreationFailed { .. })));
    }

    #[test]
    fn test_write_failure_keeps_earlier_pages() {
        let dir = TempDir::new().unwrap();
        let folder = dir.path().join("X");
        // A directory squatting on the second file name makes its write fail
        std::fs::create_dir_all(folder.join("page_002.png")).unwrap();

        let result = export(&[asset(0), asset(1), asset(2)], dir.path(), ExportFormat::Png, "X");

        assert!(matches!(result, Err(Error::ImageWriteFailed { page_index: 1 })));
        assert!(folder.join("page_001.png").is_file());
        assert!(!folder.join("page_003.png").exists());
    }
}
