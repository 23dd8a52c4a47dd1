//! Locating the native shared library, building it from source when it is missing

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{info, warn};

use super::cleanup;
use crate::config::LibrarySettings;
use crate::error::{BridgeError, Result};

/// Directory holding a prebuilt library; replaces the search list when set
pub const LIBRARY_PATH_ENV: &str = "MLFLOW_GO_LIBRARY_PATH";
pub const SOURCE_DIR_ENV: &str = "MLFLOW_GO_SOURCE_DIR";
pub const TOOLCHAIN_ENV: &str = "MLFLOW_GO_TOOLCHAIN";
pub const TARGET_OS_ENV: &str = "MLFLOW_GO_TARGET_OS";
pub const TARGET_ARCH_ENV: &str = "MLFLOW_GO_TARGET_ARCH";

const LIBRARY_STEM: &str = "libmlflow-go";
const BUILD_DIR_PREFIX: &str = "mlflow-go-";

/// File name of the shared library for the host OS
pub fn library_file_name() -> String {
    library_file_name_for(host_go_os())
}

/// File name of the shared library for a Go OS name
pub fn library_file_name_for(go_os: &str) -> String {
    let extension = match go_os {
        "windows" => "dll",
        "darwin" => "dylib",
        _ => "so",
    };
    format!("{}.{}", LIBRARY_STEM, extension)
}

/// Go name of the host OS
pub fn host_go_os() -> &'static str {
    match env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

/// Go name of the host architecture
pub fn host_go_arch() -> &'static str {
    match env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        other => other,
    }
}

/// Platform the library is built for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTarget {
    pub os: String,
    pub arch: String,
}

impl BuildTarget {
    pub fn host() -> Self {
        Self {
            os: host_go_os().to_string(),
            arch: host_go_arch().to_string(),
        }
    }

    fn from_env() -> Self {
        let host = Self::host();
        Self {
            os: env::var(TARGET_OS_ENV).unwrap_or(host.os),
            arch: env::var(TARGET_ARCH_ENV).unwrap_or(host.arch),
        }
    }

    /// A library built for another OS cannot be loaded into this process
    fn check_loadable(&self) -> Result<()> {
        if self.os != host_go_os() {
            return Err(BridgeError::Build(format!(
                "target OS '{}' does not match host OS '{}'",
                self.os,
                host_go_os()
            )));
        }
        Ok(())
    }
}

/// A library file on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedLibrary {
    pub path: PathBuf,
    /// Whether the file was produced by a build in this process
    pub built: bool,
}

impl LocatedLibrary {
    pub fn header_path(&self) -> PathBuf {
        self.path.with_extension("h")
    }
}

/// Search and build settings for the shared library
#[derive(Debug, Clone)]
pub struct LibraryLocator {
    search_paths: Vec<PathBuf>,
    source_dir: PathBuf,
    toolchain: String,
    target: BuildTarget,
}

impl Default for LibraryLocator {
    fn default() -> Self {
        Self {
            search_paths: default_search_paths(),
            source_dir: PathBuf::from("."),
            toolchain: "go".to_string(),
            target: BuildTarget::host(),
        }
    }
}

impl LibraryLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locator configured from the environment only
    pub fn from_env() -> Self {
        Self::from_settings(&LibrarySettings::default())
    }

    /// Locator configured from settings, with environment variables taking precedence
    pub fn from_settings(settings: &LibrarySettings) -> Self {
        let mut locator = Self::default();

        if !settings.search_paths.is_empty() {
            locator.search_paths = settings.search_paths.clone();
        }
        if let Some(dir) = &settings.source_dir {
            locator.source_dir = dir.clone();
        }

        if let Some(dir) = env::var_os(LIBRARY_PATH_ENV) {
            locator.search_paths = vec![PathBuf::from(dir)];
        }
        if let Some(dir) = env::var_os(SOURCE_DIR_ENV) {
            locator.source_dir = PathBuf::from(dir);
        }
        if let Ok(toolchain) = env::var(TOOLCHAIN_ENV) {
            locator.toolchain = toolchain;
        }
        locator.target = BuildTarget::from_env();
        locator
    }

    pub fn with_search_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.search_paths = paths;
        self
    }

    pub fn with_source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.source_dir = dir.into();
        self
    }

    pub fn with_toolchain(mut self, toolchain: impl Into<String>) -> Self {
        self.toolchain = toolchain.into();
        self
    }

    pub fn with_target(mut self, target: BuildTarget) -> Self {
        self.target = target;
        self
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// First search directory that contains the library
    pub fn locate(&self) -> Option<PathBuf> {
        let file_name = library_file_name();
        self.search_paths
            .iter()
            .map(|dir| dir.join(&file_name))
            .find(|path| path.is_file())
    }

    /// Locate the library, building it into a fresh directory when no search path has it
    pub fn locate_or_build(&self) -> Result<LocatedLibrary> {
        if let Some(path) = self.locate() {
            info!(path = %path.display(), "Found native library");
            return Ok(LocatedLibrary { path, built: false });
        }

        warn!(
            searched = ?self.search_paths,
            "Native library not found, building it now"
        );
        let dir = tempfile::Builder::new().prefix(BUILD_DIR_PREFIX).tempdir()?;
        // An error return drops `dir`, which removes it.
        let path = build_library_for(&self.toolchain, &self.target, &self.source_dir, dir.path())?;

        let header = path.with_extension("h");
        if !header.is_file() {
            return Err(BridgeError::NotFound {
                what: "library header",
                path: header,
            });
        }

        cleanup::register(dir);
        Ok(LocatedLibrary { path, built: true })
    }
}

fn default_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(dir) = env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        paths.push(dir);
    }
    paths.push(PathBuf::from("."));
    paths
}

/// Build the library from `source_dir` into `out_dir` with the host toolchain
///
/// Returns the path of the built library.
pub fn build_library(source_dir: &Path, out_dir: &Path) -> Result<PathBuf> {
    let toolchain = env::var(TOOLCHAIN_ENV).unwrap_or_else(|_| "go".to_string());
    build_library_for(&toolchain, &BuildTarget::from_env(), source_dir, out_dir)
}

fn build_library_for(
    toolchain: &str,
    target: &BuildTarget,
    source_dir: &Path,
    out_dir: &Path,
) -> Result<PathBuf> {
    target.check_loadable()?;
    let out_path = absolute(&out_dir.join(library_file_name_for(&target.os)))?;
    let package = absolute(&source_dir.join("pkg").join("lib"))?;

    info!(
        toolchain,
        os = %target.os,
        arch = %target.arch,
        output = %out_path.display(),
        "Building native library"
    );

    let output = Command::new(toolchain)
        .args(["build", "-trimpath", "-ldflags", "-w -s", "-o"])
        .arg(&out_path)
        .args(["-buildmode", "c-shared"])
        .arg(&package)
        .current_dir(source_dir)
        .env("CGO_ENABLED", "1")
        .env("GOOS", &target.os)
        .env("GOARCH", &target.arch)
        .output()
        .map_err(|e| BridgeError::Build(format!("failed to run '{}': {}", toolchain, e)))?;

    if !output.status.success() {
        return Err(BridgeError::Build(format!(
            "'{} build' exited with {}: {}",
            toolchain,
            output.status,
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    if !out_path.is_file() {
        return Err(BridgeError::NotFound {
            what: "shared library",
            path: out_path,
        });
    }

    Ok(out_path)
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(env::current_dir()?.join(path))
    }
}
