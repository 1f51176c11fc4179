//! Code generation backends
//!
//! Three mutually exclusive targets share one capability: turn a verified
//! ASR into a [`BackendArtifact`]. What happens to the artifact afterwards
//! (printing it, assembling it, linking it) is decided by the driver.

pub mod cpp;
#[cfg(feature = "llvm")]
pub mod llvm;
pub mod x86;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::asr::TranslationUnit;
use crate::error::{ErrorRecord, StageResult};

/// Backend selected with `--backend`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Llvm,
    Cpp,
    X86,
}

impl BackendKind {
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Llvm => "llvm",
            BackendKind::Cpp => "cpp",
            BackendKind::X86 => "x86",
        }
    }

    /// Whether this build carries the backend
    pub fn is_enabled(self) -> bool {
        match self {
            BackendKind::Llvm => cfg!(feature = "llvm"),
            BackendKind::Cpp | BackendKind::X86 => true,
        }
    }

    pub fn ensure_enabled(self) -> StageResult<()> {
        if self.is_enabled() {
            Ok(())
        } else {
            Err(ErrorRecord::configuration(format!(
                "The {} backend is not enabled; rebuild fortc with the `{}` feature",
                self.name(),
                self.name()
            )))
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = ErrorRecord;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "llvm" => Ok(BackendKind::Llvm),
            "cpp" => Ok(BackendKind::Cpp),
            "x86" => Ok(BackendKind::X86),
            _ => Err(ErrorRecord::configuration(
                "The backend must be one of: llvm, cpp, x86.",
            )),
        }
    }
}

/// Output of a code generation stage
#[derive(Debug)]
pub enum BackendArtifact {
    /// In-memory LLVM module
    #[cfg(feature = "llvm")]
    IrModule(llvm::IrModule),
    /// Generated source text (C++ or assembler)
    Source(String),
    /// Object or assembly file on disk
    File(PathBuf),
}

impl BackendArtifact {
    /// Textual form, for artifacts that have one
    pub fn text(&self) -> Option<&str> {
        match self {
            #[cfg(feature = "llvm")]
            BackendArtifact::IrModule(module) => Some(module.print_to_string()),
            BackendArtifact::Source(text) => Some(text),
            BackendArtifact::File(_) => None,
        }
    }
}

/// A code generator
pub trait Backend {
    fn kind(&self) -> BackendKind;

    fn generate(&self, tu: &TranslationUnit) -> StageResult<BackendArtifact>;
}

#[cfg(feature = "llvm")]
pub struct LlvmBackend {
    pub module_name: String,
}

#[cfg(feature = "llvm")]
impl Backend for LlvmBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Llvm
    }

    fn generate(&self, tu: &TranslationUnit) -> StageResult<BackendArtifact> {
        llvm::LlvmCodegen::new(self.module_name.clone())
            .generate(tu)
            .map(BackendArtifact::IrModule)
    }
}

pub struct CppBackend {
    pub kokkos: bool,
}

impl Backend for CppBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Cpp
    }

    fn generate(&self, tu: &TranslationUnit) -> StageResult<BackendArtifact> {
        cpp::CppCodegen::new(self.kokkos)
            .generate(tu)
            .map(BackendArtifact::Source)
    }
}

pub struct X86Backend;

impl Backend for X86Backend {
    fn kind(&self) -> BackendKind {
        BackendKind::X86
    }

    fn generate(&self, tu: &TranslationUnit) -> StageResult<BackendArtifact> {
        x86::X86Codegen::new()
            .generate(tu)
            .map(BackendArtifact::Source)
    }
}

/// Instantiate the backend for `kind`
///
/// Fails with a configuration error when the backend is not part of this
/// build.
pub fn backend_for(kind: BackendKind, module_name: &str, kokkos: bool) -> StageResult<Box<dyn Backend>> {
    kind.ensure_enabled()?;
    Ok(match kind {
        #[cfg(feature = "llvm")]
        BackendKind::Llvm => Box::new(LlvmBackend {
            module_name: module_name.to_string(),
        }),
        #[cfg(not(feature = "llvm"))]
        BackendKind::Llvm => {
            return Err(ErrorRecord::internal(
                "AssertFailed",
                "llvm backend requested in a build without it",
            ));
        }
        BackendKind::Cpp => Box::new(CppBackend { kokkos }),
        BackendKind::X86 => Box::new(X86Backend),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_names() {
        assert_eq!("cpp".parse::<BackendKind>().unwrap(), BackendKind::Cpp);
        assert_eq!("x86".parse::<BackendKind>().unwrap(), BackendKind::X86);
        assert_eq!(BackendKind::default(), BackendKind::Llvm);
    }

    #[test]
    fn test_invalid_backend_message() {
        let err = "wasm".parse::<BackendKind>().unwrap_err();
        assert_eq!(err.message, "The backend must be one of: llvm, cpp, x86.");
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_backend_for_cpp() {
        let backend = backend_for(BackendKind::Cpp, "demo", false).unwrap();
        assert_eq!(backend.kind(), BackendKind::Cpp);
        let artifact = backend.generate(&TranslationUnit::new()).unwrap();
        assert!(artifact.text().unwrap().contains("int main"));
    }
}
