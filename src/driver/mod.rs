//! Pipeline orchestrator
//!
//! Sequences one [`CompilationRequest`] through
//! Source → Tokens → AST → ASR → Passes → Backend → Assemble/Link and stops
//! at the requested stop-point. Every stage returns a [`StageResult`]; the
//! first failure ends the run and is handed back unchanged for the caller
//! to report.
//!
//! Intermediate files (`.preprocessed`, `.tmp.ll`, `.tmp.cpp`, `.tmp.s`,
//! `.tmp.o`) are written next to their final output and are not removed,
//! whether or not a later stage fails.

pub mod request;

pub use request::{CompilationRequest, LinkMode, StopPoint, StopPointFlags, is_fortran_path};

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::asr::modfile::{ModuleFile, save_module_files};
use crate::asr::{self, TranslationUnit};
use crate::ast::{self, unparse::FormatOptions};
use crate::codegen::{self, BackendArtifact, BackendKind};
use crate::config::DriverConfig;
use crate::error::{ErrorRecord, StageResult, ToolStage};
use crate::lexer::{self, Token};
use crate::parser;
use crate::passes;
use crate::toolchain::{self, EmitKind, LinkOptions, SystemToolchain, Toolchain, execute};

/// How many times each in-process stage was entered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageCounts {
    pub tokenize: usize,
    pub parse: usize,
    pub build: usize,
    pub passes: usize,
    pub codegen: usize,
}

/// Wall-clock time spent per stage
#[derive(Debug, Clone, Copy, Default)]
pub struct Timings {
    pub file_read: Duration,
    pub src_to_ast: Duration,
    pub ast_to_asr: Duration,
    pub codegen: Duration,
}

impl Timings {
    pub fn total(&self) -> Duration {
        self.file_read + self.src_to_ast + self.ast_to_asr + self.codegen
    }

    /// `--time-report` output for the native backend
    pub fn report(&self, tu: &TranslationUnit) -> String {
        let ms = |d: Duration| d.as_millis();
        format!(
            "Arena usage: {} symbols, {} scopes\n\
             \n\
             Time report:\n\
             File reading:{:>5}\n\
             Src -> AST:  {:>5}\n\
             AST -> ASR:  {:>5}\n\
             ASR -> x86:  {:>5}\n\
             Total:       {:>5}\n",
            tu.symbols.len(),
            tu.scopes.len(),
            ms(self.file_read),
            ms(self.src_to_ast),
            ms(self.ast_to_asr),
            ms(self.codegen),
            ms(self.total()),
        )
    }
}

/// `path` with `suffix` appended to its full file name
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn write_file(path: &Path, contents: &str) -> StageResult<()> {
    fs::write(path, contents).map_err(|e| ErrorRecord::io(path, &e))
}

/// Directory that receives `.mod` files for an output
fn output_dir(out: &Path) -> &Path {
    match out.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

pub struct Driver<T: Toolchain = SystemToolchain> {
    config: DriverConfig,
    toolchain: T,
    counts: StageCounts,
    timings: Timings,
}

impl Driver<SystemToolchain> {
    /// Driver that runs the real system tools
    pub fn system(config: DriverConfig) -> Self {
        Self::new(config, SystemToolchain)
    }
}

impl<T: Toolchain> Driver<T> {
    pub fn new(config: DriverConfig, toolchain: T) -> Self {
        Self {
            config,
            toolchain,
            counts: StageCounts::default(),
            timings: Timings::default(),
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn toolchain(&self) -> &T {
        &self.toolchain
    }

    pub fn counts(&self) -> StageCounts {
        self.counts
    }

    pub fn timings(&self) -> Timings {
        self.timings
    }

    /// Run the pipeline for `req`
    pub fn run(&mut self, req: &CompilationRequest) -> StageResult<()> {
        tracing::info!(
            "compiling {} (stop-point {}, backend {})",
            req.input.display(),
            req.stop,
            req.backend
        );
        self.check_request(req)?;

        let mut input = req.input.clone();
        if req.preprocess || req.stop == StopPoint::Preprocess {
            input = self.preprocess(req)?;
            if req.stop == StopPoint::Preprocess {
                let text = self.read(&input)?;
                return self.emit(req, &text);
            }
        }

        if req.stop == StopPoint::Executable && !req.is_fortran_source() {
            let out = self.output_path(req)?;
            tracing::info!("linking {} directly", input.display());
            return self.link(req, &input, &out);
        }

        let source = self.read(&input)?;
        let name = input.display().to_string();

        let tokens = self.tokenize(&name, &source)?;
        if req.stop == StopPoint::Tokens {
            return self.emit(req, &lexer::pickle_tokens(&tokens));
        }

        let unit = self.parse(&name, &tokens, &source)?;
        match req.stop {
            StopPoint::Ast => return self.emit(req, &ast::pickle::pickle(&unit, req.color)),
            StopPoint::AstF90 => {
                let options = FormatOptions {
                    color: req.color,
                    ..FormatOptions::default()
                };
                return self.emit(req, &ast::unparse::unparse(&unit, options));
            }
            _ => {}
        }

        let tu = self.build(req, &unit)?;
        match req.stop {
            StopPoint::Asr => self.emit(req, &asr::pickle::pickle(&tu, req.color)),
            StopPoint::LlvmIr => {
                let artifact = self.generate(BackendKind::Llvm, req, &tu)?;
                self.emit_artifact(req, &artifact)
            }
            StopPoint::Cpp => {
                let artifact = self.generate(BackendKind::Cpp, req, &tu)?;
                self.emit_artifact(req, &artifact)
            }
            StopPoint::Assembly => {
                let out = self.output_path(req)?;
                self.compile_assembly(req, &tu, &out)
            }
            StopPoint::Object => {
                let out = self.output_path(req)?;
                self.compile_object(req, &tu, &out)?;
                save_module_files(&tu, output_dir(&out))?;
                self.finish_native(req, &tu);
                Ok(())
            }
            StopPoint::Executable => {
                let out = self.output_path(req)?;
                self.compile_executable(req, &tu, &out)?;
                save_module_files(&tu, output_dir(&out))?;
                self.finish_native(req, &tu);
                Ok(())
            }
            StopPoint::Preprocess | StopPoint::Tokens | StopPoint::Ast | StopPoint::AstF90 => Ok(()),
        }
    }

    /// Reject requests this build or backend cannot serve, before any I/O
    fn check_request(&self, req: &CompilationRequest) -> StageResult<()> {
        match req.stop {
            StopPoint::LlvmIr => BackendKind::Llvm.ensure_enabled(),
            StopPoint::Assembly => match req.backend {
                BackendKind::Llvm => BackendKind::Llvm.ensure_enabled(),
                BackendKind::Cpp => Err(ErrorRecord::unsupported(
                    "The C++ backend does not work with the -S option yet.",
                )),
                BackendKind::X86 => Err(ErrorRecord::unsupported(
                    "The x86 backend does not work with the -S option; it produces machine code directly.",
                )),
            },
            StopPoint::Object => req.backend.ensure_enabled(),
            StopPoint::Executable if req.is_fortran_source() => req.backend.ensure_enabled(),
            _ => Ok(()),
        }
    }

    fn output_path(&self, req: &CompilationRequest) -> StageResult<PathBuf> {
        req.output_path().ok_or_else(|| {
            ErrorRecord::internal("AssertFailed", format!("no output path for stop-point {}", req.stop))
        })
    }

    // ==================== FRONT END ====================

    fn preprocess(&mut self, req: &CompilationRequest) -> StageResult<PathBuf> {
        let first = with_suffix(&req.input, ".preprocessed");
        let inv = toolchain::preprocess(&self.config, &req.input, &first, &req.include_dirs);
        execute(&mut self.toolchain, &inv)?;

        let text = fs::read_to_string(&first).map_err(|e| ErrorRecord::io(&first, &e))?;
        let second = with_suffix(&req.input, ".preprocessed2");
        write_file(&second, &toolchain::fix_continuation(&text))?;
        tracing::debug!("preprocessed source in {}", second.display());
        Ok(second)
    }

    fn read(&mut self, path: &Path) -> StageResult<String> {
        let start = Instant::now();
        let text = fs::read_to_string(path).map_err(|e| ErrorRecord::io(path, &e))?;
        self.timings.file_read += start.elapsed();
        tracing::debug!("read {} ({} bytes)", path.display(), text.len());
        Ok(text)
    }

    fn tokenize(&mut self, name: &str, source: &str) -> StageResult<Vec<Token>> {
        self.counts.tokenize += 1;
        let start = Instant::now();
        let tokens = lexer::lex_named(name, source)?;
        self.timings.src_to_ast += start.elapsed();
        tracing::debug!("lexed {} tokens", tokens.len());
        Ok(tokens)
    }

    fn parse(&mut self, name: &str, tokens: &[Token], source: &str) -> StageResult<ast::TranslationUnit> {
        self.counts.parse += 1;
        let start = Instant::now();
        let unit = parser::parse_named(name, tokens, source)?;
        self.timings.src_to_ast += start.elapsed();
        tracing::debug!("parsed {} items", unit.items.len());
        Ok(unit)
    }

    fn build(&mut self, req: &CompilationRequest, unit: &ast::TranslationUnit) -> StageResult<TranslationUnit> {
        self.counts.build += 1;
        let start = Instant::now();
        let mut tu = asr::build(unit)?;
        if !req.passes.is_empty() {
            self.counts.passes += 1;
            passes::run_passes(&mut tu, &req.passes)?;
        }
        asr::verify::verify(&tu)?;
        self.timings.ast_to_asr += start.elapsed();
        Ok(tu)
    }

    // ==================== BACK END ====================

    fn generate(&mut self, kind: BackendKind, req: &CompilationRequest, tu: &TranslationUnit) -> StageResult<BackendArtifact> {
        self.counts.codegen += 1;
        let start = Instant::now();
        let backend = codegen::backend_for(kind, &req.basename(), self.config.require_kokkos)?;
        tracing::info!("generating code with the {} backend", backend.kind());
        let artifact = backend.generate(tu)?;
        self.timings.codegen += start.elapsed();
        Ok(artifact)
    }

    /// Write a textual artifact next to `out`
    fn stage_artifact(&self, artifact: &BackendArtifact, out: &Path, suffix: &str) -> StageResult<PathBuf> {
        let path = with_suffix(out, suffix);
        match artifact {
            BackendArtifact::File(existing) => return Ok(existing.clone()),
            other => {
                let text = other.text().unwrap_or_default();
                write_file(&path, text)?;
            }
        }
        Ok(path)
    }

    fn kokkos(&self) -> StageResult<Option<PathBuf>> {
        if self.config.require_kokkos {
            Ok(Some(self.config.kokkos_dir()?.to_path_buf()))
        } else {
            Ok(None)
        }
    }

    fn compile_assembly(&mut self, req: &CompilationRequest, tu: &TranslationUnit, out: &Path) -> StageResult<()> {
        let artifact = self.generate(BackendKind::Llvm, req, tu)?;
        let ir = self.stage_artifact(&artifact, out, ".tmp.ll")?;
        let inv = toolchain::llc(&self.config, &ir, out, EmitKind::Assembly);
        execute(&mut self.toolchain, &inv)
    }

    fn compile_object(&mut self, req: &CompilationRequest, tu: &TranslationUnit, out: &Path) -> StageResult<()> {
        match req.backend {
            BackendKind::Llvm => {
                let artifact = self.generate(BackendKind::Llvm, req, tu)?;
                let ir = self.stage_artifact(&artifact, out, ".tmp.ll")?;
                let inv = toolchain::llc(&self.config, &ir, out, EmitKind::Object);
                execute(&mut self.toolchain, &inv)
            }
            BackendKind::Cpp => {
                let kokkos = self.kokkos()?;
                let artifact = self.generate(BackendKind::Cpp, req, tu)?;
                let source = self.stage_artifact(&artifact, out, ".tmp.cpp")?;
                let inv = toolchain::compile_cpp(&self.config, &source, out, kokkos.as_deref());
                execute(&mut self.toolchain, &inv)
            }
            BackendKind::X86 => {
                let artifact = self.generate(BackendKind::X86, req, tu)?;
                let asm = self.stage_artifact(&artifact, out, ".tmp.s")?;
                let inv = toolchain::assemble(&self.config, &asm, out);
                execute(&mut self.toolchain, &inv)
            }
        }
    }

    fn compile_executable(&mut self, req: &CompilationRequest, tu: &TranslationUnit, out: &Path) -> StageResult<()> {
        let object = with_suffix(out, ".tmp.o");
        self.compile_object(req, tu, &object)?;
        match req.backend {
            BackendKind::X86 => {
                let inv = toolchain::link_freestanding(&self.config, &object, out);
                execute(&mut self.toolchain, &inv)
            }
            BackendKind::Llvm | BackendKind::Cpp => self.link(req, &object, out),
        }
    }

    /// Turn an object file into an executable
    fn link(&mut self, req: &CompilationRequest, object: &Path, out: &Path) -> StageResult<()> {
        let options = LinkOptions {
            static_link: req.link_mode == LinkMode::Static,
            library_dirs: req.library_dirs.clone(),
        };
        match req.backend {
            BackendKind::Llvm => {
                let inv = toolchain::link_with_runtime(&self.config, object, out, &options);
                execute(&mut self.toolchain, &inv)
            }
            BackendKind::Cpp => {
                let kokkos = self.kokkos()?;
                let inv = toolchain::link_cpp(&self.config, object, out, &options, kokkos.as_deref());
                execute(&mut self.toolchain, &inv)
            }
            BackendKind::X86 => {
                tracing::debug!("copying {} to {}", object.display(), out.display());
                fs::copy(object, out).map(|_| ()).map_err(|e| {
                    tracing::warn!("copy failed: {}", e);
                    let command_line = format!("cp {} {}", object.display(), out.display());
                    ErrorRecord::toolchain(ToolStage::Link, &command_line)
                })
            }
        }
    }

    fn finish_native(&self, req: &CompilationRequest, tu: &TranslationUnit) {
        if req.time_report && req.backend == BackendKind::X86 {
            print!("{}", self.timings.report(tu));
        }
    }

    // ==================== OUTPUT ====================

    fn emit(&self, req: &CompilationRequest, text: &str) -> StageResult<()> {
        let mut text = text.to_string();
        if !text.ends_with('\n') {
            text.push('\n');
        }
        match req.output_path() {
            Some(path) => write_file(&path, &text),
            None => {
                print!("{}", text);
                Ok(())
            }
        }
    }

    fn emit_artifact(&self, req: &CompilationRequest, artifact: &BackendArtifact) -> StageResult<()> {
        match artifact.text() {
            Some(text) => self.emit(req, text),
            None => Err(ErrorRecord::internal(
                "AssertFailed",
                "backend produced no printable artifact",
            )),
        }
    }
}

// ==================== SUBCOMMANDS ====================

/// `fmt`: parse a file and print it back in canonical form
pub fn format_source(path: &Path, options: FormatOptions) -> StageResult<String> {
    let source = fs::read_to_string(path).map_err(|e| ErrorRecord::io(path, &e))?;
    let name = path.display().to_string();
    let tokens = lexer::lex_named(&name, &source)?;
    let unit = parser::parse_named(&name, &tokens, &source)?;
    Ok(ast::unparse::unparse(&unit, options))
}

/// `mod`: load a module file into a fresh ASR and print it
pub fn show_module_file(path: &Path, color: bool) -> StageResult<String> {
    let text = fs::read_to_string(path).map_err(|e| ErrorRecord::io(path, &e))?;
    let file = ModuleFile::parse(&text, path)?;
    let mut tu = TranslationUnit::new();
    file.load_into(&mut tu)?;
    Ok(asr::pickle::pickle(&tu, color))
}

/// `mod` without `--show-asr`: one line per exported entity
pub fn summarize_module_file(path: &Path) -> StageResult<String> {
    let text = fs::read_to_string(path).map_err(|e| ErrorRecord::io(path, &e))?;
    let file = ModuleFile::parse(&text, path)?;
    let mut out = format!("module {}\n", file.name);
    for v in &file.variables {
        let kind = if v.parameter { "parameter" } else { "variable" };
        out.push_str(&format!("  {} {}: {}\n", kind, v.name, v.ty.name()));
    }
    for p in &file.procedures {
        let args: Vec<&str> = p.args.iter().map(|a| a.name.as_str()).collect();
        match &p.result {
            Some(r) => out.push_str(&format!("  function {}({}) -> {}\n", p.name, args.join(", "), r.ty.name())),
            None => out.push_str(&format!("  subroutine {}({})\n", p.name, args.join(", "))),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolchain::RecordingToolchain;

    fn driver() -> Driver<RecordingToolchain> {
        Driver::new(DriverConfig::default(), RecordingToolchain::new())
    }

    #[test]
    fn test_with_suffix() {
        assert_eq!(
            with_suffix(Path::new("out/a.out"), ".tmp.o"),
            PathBuf::from("out/a.out.tmp.o")
        );
    }

    #[test]
    fn test_output_dir() {
        assert_eq!(output_dir(Path::new("a.o")), Path::new("."));
        assert_eq!(output_dir(Path::new("build/a.o")), Path::new("build"));
    }

    #[test]
    fn test_cpp_assembly_is_unsupported() {
        let req = CompilationRequest::new("missing.f90", StopPoint::Assembly).with_backend(BackendKind::Cpp);
        let err = driver().run(&req).unwrap_err();
        assert_eq!(err.exit_code(), 1);
        assert!(err.message.contains("-S"));
    }

    #[test]
    fn test_missing_input_is_io_error() {
        let req = CompilationRequest::new("definitely/missing.f90", StopPoint::Tokens);
        let mut d = driver();
        let err = d.run(&req).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Io);
        assert_eq!(d.counts().tokenize, 0);
    }

    #[test]
    fn test_time_report_layout() {
        let report = Timings::default().report(&TranslationUnit::new());
        assert!(report.starts_with("Arena usage: 0 symbols, 1 scopes"));
        assert!(report.contains("ASR -> x86:      0"));
    }
}
