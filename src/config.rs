//! Driver configuration
//!
//! Built once at startup and passed to whoever needs it. Values are layered:
//! built-in defaults, then an optional TOML file (`--config`), then the
//! environment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ErrorRecord, StageResult};

/// Overrides the runtime library directory
pub const RUNTIME_DIR_ENV: &str = "FORTC_RUNTIME_LIBRARY_DIR";
/// Kokkos installation used by the C++ backend
pub const KOKKOS_DIR_ENV: &str = "FORTC_KOKKOS_DIR";

pub const RUNTIME_LIBRARY: &str = "fortc_runtime";
pub const RUNTIME_LIBRARY_STATIC: &str = "fortc_runtime_static";

/// External programs the driver shells out to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tools {
    pub cc: String,
    pub cxx: String,
    pub fc: String,
    pub llc: String,
    pub assembler: String,
    pub linker: String,
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            cc: "gcc".into(),
            cxx: "g++".into(),
            fc: "gfortran".into(),
            llc: "llc".into(),
            assembler: "as".into(),
            linker: "ld".into(),
        }
    }
}

/// `[paths]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsSection {
    pub runtime_library_dir: Option<PathBuf>,
    pub kokkos_dir: Option<PathBuf>,
}

/// `[cpp]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CppSection {
    pub kokkos: Option<bool>,
}

/// Contents of a `--config` file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub toolchain: Tools,
    pub paths: PathsSection,
    pub cpp: CppSection,
}

impl ConfigFile {
    pub fn parse(text: &str, origin: &Path) -> StageResult<Self> {
        toml::from_str(text).map_err(|e| {
            ErrorRecord::configuration(format!(
                "Failed to parse config file {}: {}",
                origin.display(),
                e
            ))
        })
    }

    pub fn load(path: &Path) -> StageResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ErrorRecord::io(path, &e))?;
        Self::parse(&text, path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// Path of the running executable, when it could be determined
    pub exe_path: Option<PathBuf>,
    pub runtime_library_dir: PathBuf,
    pub kokkos_dir: Option<PathBuf>,
    pub tools: Tools,
    /// Whether generated C++ uses (and links against) Kokkos
    pub require_kokkos: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self::from_parts(None, ConfigFile::default(), |_| None)
    }
}

impl DriverConfig {
    /// Configuration for this process: executable location, optional
    /// config file and the real environment
    pub fn load(config_file: Option<&Path>) -> StageResult<Self> {
        let file = match config_file {
            Some(path) => ConfigFile::load(path)?,
            None => ConfigFile::default(),
        };
        let exe = std::env::current_exe().ok();
        let config = Self::from_parts(exe, file, |key| std::env::var(key).ok());
        tracing::debug!(
            "runtime library directory: {}",
            config.runtime_library_dir.display()
        );
        Ok(config)
    }

    /// Layer `file` and the environment looked up through `env` over the
    /// defaults
    pub fn from_parts<F>(exe_path: Option<PathBuf>, file: ConfigFile, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let derived = exe_path
            .as_deref()
            .and_then(Path::parent)
            .map(runtime_dir_for_exe_dir)
            .unwrap_or_else(|| PathBuf::from("runtime"));
        let runtime_library_dir = env(RUNTIME_DIR_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or(file.paths.runtime_library_dir)
            .unwrap_or(derived);
        let kokkos_dir = env(KOKKOS_DIR_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or(file.paths.kokkos_dir);

        Self {
            exe_path,
            runtime_library_dir,
            kokkos_dir,
            tools: file.toolchain,
            require_kokkos: file.cpp.kokkos.unwrap_or(true),
        }
    }

    /// Kokkos installation, or a configuration error explaining how to
    /// provide one
    pub fn kokkos_dir(&self) -> StageResult<&Path> {
        self.kokkos_dir.as_deref().ok_or_else(|| {
            ErrorRecord::configuration(format!(
                "The C++ code generated by the cpp backend uses the Kokkos library \
                 (https://github.com/kokkos/kokkos). Please define the {} environment \
                 variable to point to the Kokkos installation.",
                KOKKOS_DIR_ENV
            ))
        })
    }

    /// Runtime library to link against
    pub fn runtime_library(&self, static_link: bool) -> &'static str {
        if static_link {
            RUNTIME_LIBRARY_STATIC
        } else {
            RUNTIME_LIBRARY
        }
    }
}

/// Runtime library directory relative to the directory holding the
/// executable
///
/// A development build (`.../target/debug/fortc`) finds the runtime in the
/// checkout; an installed binary (`<prefix>/bin/fortc`) uses
/// `<prefix>/share/fortc/lib`.
pub fn runtime_dir_for_exe_dir(exe_dir: &Path) -> PathBuf {
    if exe_dir.ends_with("target/debug") || exe_dir.ends_with("target/release") {
        exe_dir.join("..").join("..").join("runtime")
    } else {
        exe_dir.join("..").join("share").join("fortc").join("lib")
    }
}
