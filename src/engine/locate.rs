//! Ghostscript executable and resource discovery
//!
//! Both searches are ordered lists of strategies; the first strategy that
//! yields a result wins. All filesystem access goes through [`Probe`] so
//! the search order can be tested without a real installation.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Executable name looked up in every candidate directory
pub const EXECUTABLE_NAME: &str = "gs";

/// Common installation locations, checked after the bundle
const INSTALL_CANDIDATES: [&str; 3] = ["/opt/homebrew/bin/gs", "/usr/local/bin/gs", "/usr/bin/gs"];

/// Resource roots checked after the ones derived from the executable
const SHARE_CANDIDATES: [&str; 3] = [
    "/opt/homebrew/share/ghostscript",
    "/usr/local/share/ghostscript",
    "/usr/share/ghostscript",
];

/// Filesystem queries needed by the search
pub trait Probe {
    fn is_executable(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    /// Immediate subdirectories of `path`, in any order
    fn subdirectories(&self, path: &Path) -> Vec<PathBuf>;
}

/// [`Probe`] backed by the real filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl Probe for SystemProbe {
    #[cfg(unix)]
    fn is_executable(&self, path: &Path) -> bool {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(path)
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    fn is_executable(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn subdirectories(&self, path: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(path)
            .map(|entries| {
                entries
                    .filter_map(|entry| entry.ok())
                    .map(|entry| entry.path())
                    .filter(|p| p.is_dir())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Auxiliary directories passed to the engine
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EngineResources {
    /// Init scripts and resource directories, in search order
    pub library_paths: Vec<PathBuf>,
    pub font_path: Option<PathBuf>,
    pub icc_path: Option<PathBuf>,
}

impl EngineResources {
    /// Library paths joined with the platform's list separator
    pub fn library_path_list(&self) -> Option<OsString> {
        if self.library_paths.is_empty() {
            return None;
        }
        std::env::join_paths(&self.library_paths).ok()
    }
}

/// Finds the engine executable and its resources
#[derive(Debug, Clone)]
pub struct EngineLocator<P: Probe = SystemProbe> {
    probe: P,
    executable: Option<PathBuf>,
    bundle_dir: Option<PathBuf>,
    search_path: Option<OsString>,
}

impl Default for EngineLocator<SystemProbe> {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineLocator<SystemProbe> {
    /// Search the real filesystem and the process `PATH`
    pub fn new() -> Self {
        Self::with_probe(SystemProbe).with_search_path(std::env::var_os("PATH"))
    }
}

impl<P: Probe> EngineLocator<P> {
    pub fn with_probe(probe: P) -> Self {
        Self {
            probe,
            executable: None,
            bundle_dir: None,
            search_path: None,
        }
    }

    /// Explicit executable, tried before any other location
    pub fn with_executable(mut self, executable: Option<PathBuf>) -> Self {
        self.executable = executable;
        self
    }

    /// Directory holding a bundled `gs` and `ghostscript/` resource tree
    pub fn with_bundle_dir(mut self, bundle_dir: Option<PathBuf>) -> Self {
        self.bundle_dir = bundle_dir;
        self
    }

    pub fn with_search_path(mut self, search_path: Option<OsString>) -> Self {
        self.search_path = search_path;
        self
    }

    /// Every executable location in search order
    pub fn executable_candidates(&self) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        candidates.extend(self.executable.clone());
        if let Some(bundle) = &self.bundle_dir {
            candidates.push(bundle.join(EXECUTABLE_NAME));
        }
        candidates.extend(INSTALL_CANDIDATES.iter().map(PathBuf::from));
        if let Some(search_path) = &self.search_path {
            candidates.extend(std::env::split_paths(search_path).map(|dir| dir.join(EXECUTABLE_NAME)));
        }
        candidates
    }

    /// First executable candidate
    pub fn locate_executable(&self) -> Option<PathBuf> {
        self.executable_candidates()
            .into_iter()
            .find(|candidate| self.probe.is_executable(candidate))
    }

    /// Resource directories for `executable`: bundle layout first, then
    /// installs derived from the executable's prefix, then fixed locations
    pub fn locate_resources(&self, executable: &Path) -> Option<EngineResources> {
        self.bundled_resources()
            .or_else(|| self.derived_resources(executable))
            .or_else(|| self.installed_resources())
    }

    fn bundled_resources(&self) -> Option<EngineResources> {
        let bundle = self.bundle_dir.as_ref()?;
        self.resources_under(&bundle.join("ghostscript"))
    }

    fn derived_resources(&self, executable: &Path) -> Option<EngineResources> {
        // <prefix>/bin/gs -> <prefix>/share/ghostscript
        let prefix = executable.parent()?.parent()?;
        self.resources_under(&prefix.join("share").join("ghostscript"))
    }

    fn installed_resources(&self) -> Option<EngineResources> {
        SHARE_CANDIDATES
            .iter()
            .find_map(|root| self.resources_under(Path::new(root)))
    }

    /// Accept a flat `Resource/` layout at `root`, or the newest version
    /// subdirectory that contains one
    fn resources_under(&self, root: &Path) -> Option<EngineResources> {
        if !self.probe.is_dir(root) {
            return None;
        }
        if self.probe.is_dir(&root.join("Resource")) {
            return self.layout_at(root);
        }

        let mut versions = self.probe.subdirectories(root);
        versions.sort_by_key(|dir| version_key(dir));
        versions
            .iter()
            .rev()
            .find_map(|version| self.layout_at(version))
    }

    fn layout_at(&self, dir: &Path) -> Option<EngineResources> {
        let resource = dir.join("Resource");
        let init = resource.join("Init");
        let lib = dir.join("lib");

        let mut library_paths = Vec::new();
        if self.probe.is_dir(&resource) {
            if self.probe.is_dir(&init) {
                library_paths.push(init);
            }
            library_paths.push(resource.clone());
        }
        if self.probe.is_dir(&lib) {
            library_paths.push(lib);
        }
        if library_paths.is_empty() {
            return None;
        }

        let font_path = [resource.join("Font"), dir.join("fonts")]
            .into_iter()
            .find(|p| self.probe.is_dir(p));
        let icc_path = Some(dir.join("iccprofiles")).filter(|p| self.probe.is_dir(p));

        Some(EngineResources {
            library_paths,
            font_path,
            icc_path,
        })
    }
}

/// Numeric ordering for names like `9.56` and `10.02.1`
fn version_key(dir: &Path) -> Vec<u64> {
    dir.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.split('.').map(|part| part.parse().unwrap_or(0)).collect())
        .unwrap_or_default()
}
