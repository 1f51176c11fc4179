//! What one invocation asks for

use std::fmt;
use std::path::{Path, PathBuf};

use crate::codegen::BackendKind;
use crate::passes::PassKind;

/// Stage after which the pipeline halts, in pipeline order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StopPoint {
    /// `-E`: preprocess only
    Preprocess,
    Tokens,
    Ast,
    /// Fortran source regenerated from the AST
    AstF90,
    Asr,
    LlvmIr,
    Cpp,
    /// `-S`
    Assembly,
    /// `-c`
    Object,
    Executable,
}

impl StopPoint {
    pub fn name(self) -> &'static str {
        match self {
            StopPoint::Preprocess => "preprocess",
            StopPoint::Tokens => "tokens",
            StopPoint::Ast => "ast",
            StopPoint::AstF90 => "ast-f90",
            StopPoint::Asr => "asr",
            StopPoint::LlvmIr => "llvm",
            StopPoint::Cpp => "cpp",
            StopPoint::Assembly => "assembly",
            StopPoint::Object => "object",
            StopPoint::Executable => "executable",
        }
    }

    /// Printed representations rather than build products
    pub fn is_inspection(self) -> bool {
        self <= StopPoint::Cpp
    }
}

impl fmt::Display for StopPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Stop-point flags as given on the command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopPointFlags {
    pub preprocess_only: bool,
    pub show_tokens: bool,
    pub show_ast: bool,
    pub show_ast_f90: bool,
    pub show_asr: bool,
    /// `--pass` was given, which implies `show_asr`
    pub passes: bool,
    pub show_llvm: bool,
    pub show_cpp: bool,
    pub assembly: bool,
    pub object: bool,
}

impl StopPointFlags {
    /// The one stop-point honored when several flags are set
    pub fn resolve(&self) -> StopPoint {
        let ranked = [
            (self.preprocess_only, StopPoint::Preprocess),
            (self.show_tokens, StopPoint::Tokens),
            (self.show_ast, StopPoint::Ast),
            (self.show_ast_f90, StopPoint::AstF90),
            (self.show_asr || self.passes, StopPoint::Asr),
            (self.show_llvm, StopPoint::LlvmIr),
            (self.show_cpp, StopPoint::Cpp),
            (self.assembly, StopPoint::Assembly),
            (self.object, StopPoint::Object),
        ];
        ranked
            .into_iter()
            .find(|(set, _)| *set)
            .map(|(_, stop)| stop)
            .unwrap_or(StopPoint::Executable)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkMode {
    #[default]
    Dynamic,
    Static,
}

const FORTRAN_EXTENSIONS: &[&str] = &["f90", "f95", "f03", "f08", "f", "F90", "F"];

/// A fully resolved invocation, built once from the command line
#[derive(Debug, Clone)]
pub struct CompilationRequest {
    pub input: PathBuf,
    /// `-o`; `None` selects the default for the stop-point
    pub output: Option<PathBuf>,
    pub stop: StopPoint,
    pub backend: BackendKind,
    pub link_mode: LinkMode,
    pub passes: Vec<PassKind>,
    /// `--cpp`
    pub preprocess: bool,
    pub include_dirs: Vec<PathBuf>,
    pub library_dirs: Vec<PathBuf>,
    pub color: bool,
    pub time_report: bool,
}

impl CompilationRequest {
    pub fn new(input: impl Into<PathBuf>, stop: StopPoint) -> Self {
        Self {
            input: input.into(),
            output: None,
            stop,
            backend: BackendKind::default(),
            link_mode: LinkMode::default(),
            passes: Vec::new(),
            preprocess: false,
            include_dirs: Vec::new(),
            library_dirs: Vec::new(),
            color: false,
            time_report: false,
        }
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_passes(mut self, passes: Vec<PassKind>) -> Self {
        self.passes = passes;
        self
    }

    /// Input file name without directory and extension
    pub fn basename(&self) -> String {
        self.input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "a".to_string())
    }

    /// Where the artifact goes; `None` means standard output
    pub fn output_path(&self) -> Option<PathBuf> {
        if let Some(out) = &self.output {
            return Some(out.clone());
        }
        match self.stop {
            StopPoint::Assembly => Some(PathBuf::from(format!("{}.s", self.basename()))),
            StopPoint::Object => Some(PathBuf::from(format!("{}.o", self.basename()))),
            StopPoint::Executable => Some(PathBuf::from("a.out")),
            _ => None,
        }
    }

    pub fn is_fortran_source(&self) -> bool {
        is_fortran_path(&self.input)
    }
}

pub fn is_fortran_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| FORTRAN_EXTENSIONS.contains(&e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_executable() {
        assert_eq!(StopPointFlags::default().resolve(), StopPoint::Executable);
    }

    #[test]
    fn test_precedence() {
        let flags = StopPointFlags {
            show_tokens: true,
            show_ast: true,
            object: true,
            ..Default::default()
        };
        assert_eq!(flags.resolve(), StopPoint::Tokens);

        let flags = StopPointFlags {
            show_llvm: true,
            passes: true,
            assembly: true,
            ..Default::default()
        };
        assert_eq!(flags.resolve(), StopPoint::Asr);

        let flags = StopPointFlags {
            show_cpp: true,
            assembly: true,
            object: true,
            ..Default::default()
        };
        assert_eq!(flags.resolve(), StopPoint::Cpp);

        let flags = StopPointFlags {
            preprocess_only: true,
            show_tokens: true,
            ..Default::default()
        };
        assert_eq!(flags.resolve(), StopPoint::Preprocess);
    }

    #[test]
    fn test_output_names() {
        let req = CompilationRequest::new("src/demo.f90", StopPoint::Object);
        assert_eq!(req.output_path(), Some(PathBuf::from("demo.o")));
        let req = CompilationRequest::new("src/demo.f90", StopPoint::Assembly);
        assert_eq!(req.output_path(), Some(PathBuf::from("demo.s")));
        let req = CompilationRequest::new("demo.f90", StopPoint::Executable);
        assert_eq!(req.output_path(), Some(PathBuf::from("a.out")));
        let req = CompilationRequest::new("demo.f90", StopPoint::Ast);
        assert_eq!(req.output_path(), None);
        let req = CompilationRequest::new("demo.f90", StopPoint::Ast).with_output("demo.ast");
        assert_eq!(req.output_path(), Some(PathBuf::from("demo.ast")));
    }

    #[test]
    fn test_fortran_extensions() {
        assert!(is_fortran_path(Path::new("a.f90")));
        assert!(is_fortran_path(Path::new("b.F")));
        assert!(!is_fortran_path(Path::new("c.o")));
        assert!(!is_fortran_path(Path::new("noext")));
    }
}
