//! External toolchain invocation
//!
//! Every preprocessor, compiler, assembler and linker call goes through the
//! [`Toolchain`] trait. Calls are synchronous and only the exit status is
//! observed; inputs and outputs are exchanged through files named on the
//! command line.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::DriverConfig;
use crate::error::{ErrorRecord, StageResult, ToolStage};

/// One external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Which exit code a failure maps to
    pub stage: ToolStage,
}

impl Invocation {
    pub fn new(program: impl Into<String>, stage: ToolStage) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stage,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn path(self, path: &Path) -> Self {
        self.arg(path.display().to_string())
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Value following `-o`, if any
    pub fn output(&self) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == "-o")
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Runs external commands and reports their exit status
pub trait Toolchain {
    /// Exit code of the finished command; `-1` when killed by a signal
    fn run(&mut self, invocation: &Invocation) -> io::Result<i32>;
}

/// Spawns real processes
#[derive(Debug, Default)]
pub struct SystemToolchain;

impl Toolchain for SystemToolchain {
    fn run(&mut self, invocation: &Invocation) -> io::Result<i32> {
        let status = Command::new(&invocation.program)
            .args(&invocation.args)
            .status()?;
        Ok(status.code().unwrap_or(-1))
    }
}

/// Records invocations instead of running them
///
/// Successful calls create an empty file at the `-o` path, so later stages
/// that expect the tool's output find one.
#[derive(Debug, Default)]
pub struct RecordingToolchain {
    pub invocations: Vec<Invocation>,
    failures: Vec<(String, i32)>,
}

impl RecordingToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call to `program` exit with `code`
    pub fn failing(mut self, program: impl Into<String>, code: i32) -> Self {
        self.failures.push((program.into(), code));
        self
    }

    pub fn count(&self, stage: ToolStage) -> usize {
        self.invocations.iter().filter(|i| i.stage == stage).count()
    }

    pub fn programs(&self) -> Vec<&str> {
        self.invocations.iter().map(|i| i.program.as_str()).collect()
    }
}

impl Toolchain for RecordingToolchain {
    fn run(&mut self, invocation: &Invocation) -> io::Result<i32> {
        self.invocations.push(invocation.clone());
        if let Some((_, code)) = self
            .failures
            .iter()
            .find(|(program, _)| *program == invocation.program)
        {
            return Ok(*code);
        }
        if let Some(out) = invocation.output() {
            std::fs::write(out, b"")?;
        }
        Ok(0)
    }
}

/// Run `invocation`, turning a spawn failure or non-zero exit into a
/// toolchain error
pub fn execute(toolchain: &mut dyn Toolchain, invocation: &Invocation) -> StageResult<()> {
    let command_line = invocation.command_line();
    tracing::debug!("running `{}`", command_line);
    match toolchain.run(invocation) {
        Ok(0) => Ok(()),
        Ok(code) => {
            tracing::debug!("`{}` exited with status {}", invocation.program, code);
            Err(ErrorRecord::toolchain(invocation.stage, &command_line))
        }
        Err(err) => {
            tracing::warn!("could not start `{}`: {}", invocation.program, err);
            Err(ErrorRecord::toolchain(invocation.stage, &command_line))
        }
    }
}

// ==================== COMMAND BUILDERS ====================

/// `gfortran -cpp -E <file> -o <out> [-I...]`
pub fn preprocess(config: &DriverConfig, input: &Path, output: &Path, include_dirs: &[PathBuf]) -> Invocation {
    let mut inv = Invocation::new(&config.tools.fc, ToolStage::Compile)
        .args(["-cpp", "-E"])
        .path(input)
        .arg("-o")
        .path(output);
    for dir in include_dirs {
        inv = inv.arg(format!("-I{}", dir.display()));
    }
    inv
}

/// What `llc` should produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitKind {
    Object,
    Assembly,
}

/// `llc -filetype=obj|asm <ir> -o <out>`
pub fn llc(config: &DriverConfig, ir: &Path, output: &Path, kind: EmitKind) -> Invocation {
    let filetype = match kind {
        EmitKind::Object => "-filetype=obj",
        EmitKind::Assembly => "-filetype=asm",
    };
    Invocation::new(&config.tools.llc, ToolStage::Compile)
        .arg(filetype)
        .arg("-relocation-model=pic")
        .path(ir)
        .arg("-o")
        .path(output)
}

/// `g++ [-fopenmp -I<kokkos>/include] -o <out> -c <src>`
pub fn compile_cpp(config: &DriverConfig, source: &Path, output: &Path, kokkos: Option<&Path>) -> Invocation {
    let mut inv = Invocation::new(&config.tools.cxx, ToolStage::Compile);
    if let Some(dir) = kokkos {
        inv = inv
            .arg("-fopenmp")
            .arg(format!("-I{}", dir.join("include").display()));
    }
    inv.arg("-o").path(output).arg("-c").path(source)
}

/// `as -o <out> <src>`
pub fn assemble(config: &DriverConfig, source: &Path, output: &Path) -> Invocation {
    Invocation::new(&config.tools.assembler, ToolStage::Compile)
        .arg("-o")
        .path(output)
        .path(source)
}

/// `ld -o <out> <obj>` for freestanding executables
pub fn link_freestanding(config: &DriverConfig, object: &Path, output: &Path) -> Invocation {
    Invocation::new(&config.tools.linker, ToolStage::Link)
        .arg("-o")
        .path(output)
        .path(object)
}

/// Link options shared by the C-runtime based link lines
#[derive(Debug, Clone, Default)]
pub struct LinkOptions {
    pub static_link: bool,
    pub library_dirs: Vec<PathBuf>,
}

/// `gcc [-static] -o <out> <obj> -L<rt> -Wl,-rpath=<rt> -l<runtime> -lm`
pub fn link_with_runtime(config: &DriverConfig, object: &Path, output: &Path, options: &LinkOptions) -> Invocation {
    let rt = config.runtime_library_dir.display().to_string();
    let mut inv = Invocation::new(&config.tools.cc, ToolStage::Link);
    if options.static_link {
        inv = inv.arg("-static");
    }
    inv = inv.arg("-o").path(output).path(object);
    for dir in &options.library_dirs {
        inv = inv.arg(format!("-L{}", dir.display()));
    }
    inv.arg(format!("-L{}", rt))
        .arg(format!("-Wl,-rpath={}", rt))
        .arg(format!("-l{}", config.runtime_library(options.static_link)))
        .arg("-lm")
}

/// `g++ [-static] [-fopenmp] -o <out> <obj> [kokkos libs -ldl] -lm`
pub fn link_cpp(config: &DriverConfig, object: &Path, output: &Path, options: &LinkOptions, kokkos: Option<&Path>) -> Invocation {
    let mut inv = Invocation::new(&config.tools.cxx, ToolStage::Link);
    if options.static_link {
        inv = inv.arg("-static");
    }
    if kokkos.is_some() {
        inv = inv.arg("-fopenmp");
    }
    inv = inv.arg("-o").path(output).path(object);
    for dir in &options.library_dirs {
        inv = inv.arg(format!("-L{}", dir.display()));
    }
    if let Some(dir) = kokkos {
        inv = inv
            .path(&dir.join("lib").join("libkokkoscontainers.a"))
            .path(&dir.join("lib").join("libkokkoscore.a"))
            .arg("-ldl");
    }
    inv.arg("-lm")
}

// ==================== PREPROCESSED SOURCE ====================

/// Rejoin free-form continuation lines
///
/// A line ending in `&` (ignoring trailing blanks and a `!` comment) is
/// joined with the next line; a leading `&` on the continuation line is
/// dropped. Newlines are emitted for the joined lines so that later line
/// numbers still match the preprocessed file.
pub fn fix_continuation(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut pending_newlines = 0;
    let mut continuing = false;

    for line in source.lines() {
        let mut text = line;
        if continuing {
            let trimmed = text.trim_start();
            if let Some(rest) = trimmed.strip_prefix('&') {
                text = rest;
            }
        }
        let code = strip_comment(text).trim_end();
        if let Some(head) = code.strip_suffix('&') {
            out.push_str(head);
            pending_newlines += 1;
            continuing = true;
            continue;
        }
        out.push_str(text);
        for _ in 0..=pending_newlines {
            out.push('\n');
        }
        pending_newlines = 0;
        continuing = false;
    }
    for _ in 0..pending_newlines {
        out.push('\n');
    }
    out
}

/// Code part of a line, outside string literals
pub(crate) fn strip_comment(line: &str) -> &str {
    let mut quote = None;
    for (i, c) in line.char_indices() {
        match (quote, c) {
            (None, '\'' | '"') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, '!') => return &line[..i],
            _ => {}
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_command_line() {
        let inv = Invocation::new("as", ToolStage::Compile)
            .arg("-o")
            .arg("a.o")
            .arg("a.s");
        assert_eq!(inv.command_line(), "as -o a.o a.s");
        assert_eq!(inv.output(), Some("a.o"));
    }

    #[test]
    fn test_static_link_uses_static_runtime() {
        let mut config = DriverConfig::default();
        config.runtime_library_dir = PathBuf::from("/rt");
        let options = LinkOptions {
            static_link: true,
            library_dirs: vec![],
        };
        let inv = link_with_runtime(&config, Path::new("a.o"), Path::new("a.out"), &options);
        assert_eq!(
            inv.command_line(),
            "gcc -static -o a.out a.o -L/rt -Wl,-rpath=/rt -lfortc_runtime_static -lm"
        );
        assert_eq!(inv.stage, ToolStage::Link);
    }

    #[test]
    fn test_cpp_compile_with_kokkos() {
        let config = DriverConfig::default();
        let inv = compile_cpp(
            &config,
            Path::new("x.tmp.cpp"),
            Path::new("x.o"),
            Some(Path::new("/opt/kokkos")),
        );
        assert_eq!(
            inv.command_line(),
            "g++ -fopenmp -I/opt/kokkos/include -o x.o -c x.tmp.cpp"
        );
    }

    #[test]
    fn test_failure_maps_to_stage() {
        let mut tc = RecordingToolchain::new().failing("ld", 1);
        let inv = Invocation::new("ld", ToolStage::Link).arg("x.o");
        let err = execute(&mut tc, &inv).unwrap_err();
        assert_eq!(err.exit_code(), 10);
        assert_eq!(err.message, "The command 'ld x.o' failed.");
        assert_eq!(tc.count(ToolStage::Link), 1);
    }

    #[test]
    fn test_fix_continuation() {
        let src = "x = 1 + &\n    & 2\nprint *, x\n";
        assert_eq!(fix_continuation(src), "x = 1 +  2\n\nprint *, x\n");
    }

    #[test]
    fn test_fix_continuation_comment_and_string() {
        let src = "print *, 'a&' ! trailing &\ny = 3 & ! more\n+ 4\n";
        assert_eq!(
            fix_continuation(src),
            "print *, 'a&' ! trailing &\ny = 3 + 4\n\n"
        );
    }
}
