//! Orchestrator tests
//!
//! The external toolchain is replaced by a recording mock, so these run
//! without a compiler, assembler or linker installed.

use std::fs;
use std::path::PathBuf;

use fortc::codegen::BackendKind;
use fortc::config::DriverConfig;
use fortc::driver::{self, CompilationRequest, Driver, LinkMode, StopPoint};
use fortc::error::{ErrorKind, ToolStage};
use fortc::toolchain::RecordingToolchain;
use tempfile::TempDir;

const LOOP_PROGRAM: &str = "\
program count
integer :: i
do i = 1, 3
print *, i
end do
end program
";

const MODULE_PROGRAM: &str = "\
module geometry
integer, parameter :: sides = 4
integer :: scale = 2
contains
integer function perimeter(n)
integer, intent(in) :: n
perimeter = sides * n * scale
end function
end module

program main
use geometry
print *, perimeter(3)
end program
";

fn source(dir: &TempDir, name: &str, text: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, text).expect("write source");
    path
}

fn config() -> DriverConfig {
    let mut config = DriverConfig::default();
    config.runtime_library_dir = PathBuf::from("/opt/fortc/lib");
    config
}

fn driver() -> Driver<RecordingToolchain> {
    Driver::new(config(), RecordingToolchain::new())
}

fn request(dir: &TempDir, input: &PathBuf, stop: StopPoint, out: &str) -> CompilationRequest {
    CompilationRequest::new(input, stop).with_output(dir.path().join(out))
}

/// Executable request on the x86 backend, which every build carries
fn native(dir: &TempDir, input: &PathBuf, out: &str) -> CompilationRequest {
    request(dir, input, StopPoint::Executable, out).with_backend(BackendKind::X86)
}

// ==================== EXIT CODES ====================

#[test]
fn test_tokenizer_error_exits_1() {
    let dir = TempDir::new().unwrap();
    let input = source(&dir, "bad.f90", "x = 1 @ 2\n");
    let mut d = driver();
    let err = d.run(&native(&dir, &input, "a.out")).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Tokenizer);
    assert_eq!(err.exit_code(), 1);
    assert_eq!(d.counts().tokenize, 1);
    assert_eq!(d.counts().parse, 0);
    assert!(d.toolchain().invocations.is_empty());
}

#[test]
fn test_parse_error_exits_2() {
    let dir = TempDir::new().unwrap();
    let input = source(&dir, "bad.f90", "print *, 1 +\n");
    let mut d = driver();
    let err = d.run(&native(&dir, &input, "a.out")).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Parser);
    assert_eq!(err.exit_code(), 2);
    assert_eq!(d.counts().parse, 1);
    assert_eq!(d.counts().build, 0);
}

#[test]
fn test_semantic_error_exits_2() {
    let dir = TempDir::new().unwrap();
    let input = source(
        &dir,
        "bad.f90",
        "program p\nimplicit none\ny = 1\nend program\n",
    );
    let mut d = driver();
    let err = d.run(&native(&dir, &input, "a.out")).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Semantic);
    assert_eq!(err.exit_code(), 2);
    assert_eq!(d.counts().codegen, 0);
    assert!(d.toolchain().invocations.is_empty());
}

#[cfg(feature = "llvm")]
#[test]
fn test_codegen_error_exits_5() {
    let dir = TempDir::new().unwrap();
    let input = source(
        &dir,
        "chars.f90",
        "program p\ncharacter(len=5) :: s\ns = 'hello'\nprint *, s\nend program\n",
    );
    let mut d = driver();
    let err = d
        .run(&request(&dir, &input, StopPoint::Object, "chars.o"))
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::CodeGen);
    assert_eq!(err.exit_code(), 5);
    assert!(d.toolchain().invocations.is_empty());
    assert!(!dir.path().join("chars.o").exists());
}

#[cfg(feature = "llvm")]
#[test]
fn test_link_failure_exits_10() {
    let dir = TempDir::new().unwrap();
    let input = source(&dir, "count.f90", LOOP_PROGRAM);
    let mut d = Driver::new(config(), RecordingToolchain::new().failing("gcc", 1));
    let err = d
        .run(&request(&dir, &input, StopPoint::Executable, "count"))
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Toolchain(ToolStage::Link));
    assert_eq!(err.exit_code(), 10);
    assert!(err.message.starts_with("The command 'gcc "));
    assert_eq!(d.toolchain().programs(), vec!["llc", "gcc"]);
}

#[cfg(feature = "llvm")]
#[test]
fn test_compile_failure_exits_11() {
    let dir = TempDir::new().unwrap();
    let input = source(&dir, "count.f90", LOOP_PROGRAM);
    let mut d = Driver::new(config(), RecordingToolchain::new().failing("llc", 1));
    let err = d
        .run(&request(&dir, &input, StopPoint::Executable, "count"))
        .unwrap_err();
    assert_eq!(err.exit_code(), 11);
    assert_eq!(d.toolchain().count(ToolStage::Link), 0);
}

#[test]
fn test_native_codegen_error_exits_5() {
    let dir = TempDir::new().unwrap();
    let input = source(&dir, "real.f90", "program p\nreal :: x\nx = 1.5\nend program\n");
    let mut d = driver();
    let err = d.run(&native(&dir, &input, "real")).unwrap_err();
    assert_eq!(err.kind, ErrorKind::CodeGen);
    assert_eq!(err.exit_code(), 5);
    assert!(d.toolchain().invocations.is_empty());
}

#[test]
fn test_native_tool_failures() {
    let dir = TempDir::new().unwrap();
    let input = source(&dir, "count.f90", LOOP_PROGRAM);

    let mut d = Driver::new(config(), RecordingToolchain::new().failing("ld", 1));
    let err = d.run(&native(&dir, &input, "count")).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Toolchain(ToolStage::Link));
    assert_eq!(err.exit_code(), 10);
    assert!(err.message.starts_with("The command 'ld "));

    let mut d = Driver::new(config(), RecordingToolchain::new().failing("as", 1));
    let err = d.run(&native(&dir, &input, "count")).unwrap_err();
    assert_eq!(err.exit_code(), 11);
    assert_eq!(d.toolchain().count(ToolStage::Link), 0);
}

#[test]
fn test_earliest_stage_wins() {
    // Both a tokenizer error and a semantic error; only the first is seen
    let dir = TempDir::new().unwrap();
    let input = source(
        &dir,
        "bad.f90",
        "program p\nimplicit none\ny = 1 # 2\nend program\n",
    );
    let mut d = driver();
    let err = d
        .run(&request(&dir, &input, StopPoint::Asr, "bad.asr"))
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Tokenizer);
    assert_eq!(d.counts().parse, 0);
    assert_eq!(d.counts().build, 0);
}

// ==================== ISOLATION ====================

#[test]
fn test_inspection_never_invokes_tools() {
    let dir = TempDir::new().unwrap();
    let input = source(&dir, "count.f90", LOOP_PROGRAM);
    let mut stops = vec![
        StopPoint::Tokens,
        StopPoint::Ast,
        StopPoint::AstF90,
        StopPoint::Asr,
        StopPoint::Cpp,
    ];
    if cfg!(feature = "llvm") {
        stops.push(StopPoint::LlvmIr);
    }
    for stop in stops {
        let mut d = driver();
        let out = format!("count.{}", stop);
        d.run(&request(&dir, &input, stop, &out))
            .unwrap_or_else(|e| panic!("{} failed: {}", stop, e));
        assert!(
            d.toolchain().invocations.is_empty(),
            "{} invoked {:?}",
            stop,
            d.toolchain().programs()
        );
        let written = fs::read_to_string(dir.path().join(&out)).unwrap();
        assert!(!written.is_empty(), "{} wrote nothing", stop);
    }
}

#[test]
fn test_object_never_links() {
    let dir = TempDir::new().unwrap();
    let input = source(&dir, "count.f90", LOOP_PROGRAM);
    let mut backends = vec![BackendKind::X86];
    if cfg!(feature = "llvm") {
        backends.push(BackendKind::Llvm);
    }
    for backend in backends {
        let mut d = driver();
        let req = request(&dir, &input, StopPoint::Object, "count.o").with_backend(backend);
        d.run(&req).unwrap();
        assert_eq!(d.toolchain().count(ToolStage::Link), 0);
        assert_eq!(d.toolchain().count(ToolStage::Compile), 1);
    }
}

#[cfg(feature = "llvm")]
#[test]
fn test_assembly_uses_llc() {
    let dir = TempDir::new().unwrap();
    let input = source(&dir, "count.f90", LOOP_PROGRAM);
    let mut d = driver();
    d.run(&request(&dir, &input, StopPoint::Assembly, "count.s"))
        .unwrap();
    let inv = &d.toolchain().invocations[0];
    assert_eq!(inv.program, "llc");
    assert!(inv.args.contains(&"-filetype=asm".to_string()));
    assert!(dir.path().join("count.s.tmp.ll").exists());
}

// ==================== BACKENDS AND LINKING ====================

#[cfg(feature = "llvm")]
#[test]
fn test_static_executable() {
    let dir = TempDir::new().unwrap();
    let input = source(&dir, "count.f90", LOOP_PROGRAM);
    let mut d = driver();
    let mut req = request(&dir, &input, StopPoint::Executable, "count");
    req.link_mode = LinkMode::Static;
    d.run(&req).unwrap();

    let link = d.toolchain().invocations.last().unwrap();
    assert_eq!(link.stage, ToolStage::Link);
    assert!(link.args.contains(&"-static".to_string()));
    assert!(link.args.contains(&"-lfortc_runtime_static".to_string()));
    assert!(link.args.contains(&"-L/opt/fortc/lib".to_string()));
}

#[test]
fn test_cpp_backend_requires_kokkos() {
    let dir = TempDir::new().unwrap();
    let input = source(&dir, "count.f90", LOOP_PROGRAM);
    let mut d = driver();
    let req = request(&dir, &input, StopPoint::Object, "count.o").with_backend(BackendKind::Cpp);
    let err = d.run(&req).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Configuration);
    assert_eq!(err.exit_code(), 1);
    assert!(err.message.contains("FORTC_KOKKOS_DIR"));
    assert!(d.toolchain().invocations.is_empty());
}

#[test]
fn test_cpp_backend_with_kokkos() {
    let dir = TempDir::new().unwrap();
    let input = source(&dir, "count.f90", LOOP_PROGRAM);
    let mut config = config();
    config.kokkos_dir = Some(PathBuf::from("/opt/kokkos"));
    let mut d = Driver::new(config, RecordingToolchain::new());
    let req = request(&dir, &input, StopPoint::Executable, "count").with_backend(BackendKind::Cpp);
    d.run(&req).unwrap();

    assert_eq!(d.toolchain().programs(), vec!["g++", "g++"]);
    let link = &d.toolchain().invocations[1];
    assert!(link.args.contains(&"/opt/kokkos/lib/libkokkoscore.a".to_string()));
    let generated = fs::read_to_string(dir.path().join("count.tmp.o.tmp.cpp")).unwrap();
    assert!(generated.contains("Kokkos::initialize"));
}

#[test]
fn test_x86_executable() {
    let dir = TempDir::new().unwrap();
    let input = source(&dir, "count.f90", LOOP_PROGRAM);
    let mut d = driver();
    let req = request(&dir, &input, StopPoint::Executable, "count").with_backend(BackendKind::X86);
    d.run(&req).unwrap();
    assert_eq!(d.toolchain().programs(), vec!["as", "ld"]);
}

#[test]
fn test_x86_rejects_assembly_only() {
    let dir = TempDir::new().unwrap();
    let input = source(&dir, "count.f90", LOOP_PROGRAM);
    let req = request(&dir, &input, StopPoint::Assembly, "count.s").with_backend(BackendKind::X86);
    let err = driver().run(&req).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unsupported);
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn test_non_fortran_input_is_linked_directly() {
    let dir = TempDir::new().unwrap();
    let object = source(&dir, "prog.o", "not really an object");

    let mut d = driver();
    d.run(&request(&dir, &object, StopPoint::Executable, "prog"))
        .unwrap();
    assert_eq!(d.toolchain().programs(), vec!["gcc"]);
    assert_eq!(d.counts().tokenize, 0);

    let mut d = driver();
    let req = request(&dir, &object, StopPoint::Executable, "prog-x86").with_backend(BackendKind::X86);
    d.run(&req).unwrap();
    assert!(d.toolchain().invocations.is_empty());
    assert_eq!(
        fs::read_to_string(dir.path().join("prog-x86")).unwrap(),
        "not really an object"
    );
}

// ==================== PREPROCESSING AND MODULE FILES ====================

#[test]
fn test_preprocessing_runs_first() {
    let dir = TempDir::new().unwrap();
    let input = source(&dir, "count.F90", LOOP_PROGRAM);
    let mut d = driver();
    let mut req = request(&dir, &input, StopPoint::Tokens, "count.tokens");
    req.preprocess = true;
    req.include_dirs.push(PathBuf::from("inc"));
    d.run(&req).unwrap();

    let pre = &d.toolchain().invocations[0];
    assert_eq!(pre.program, "gfortran");
    assert!(pre.args.contains(&"-Iinc".to_string()));
    assert!(dir.path().join("count.F90.preprocessed2").exists());
}

#[test]
fn test_preprocessor_failure_exits_11() {
    let dir = TempDir::new().unwrap();
    let input = source(&dir, "count.F90", LOOP_PROGRAM);
    let mut d = Driver::new(config(), RecordingToolchain::new().failing("gfortran", 1));
    let mut req = request(&dir, &input, StopPoint::Tokens, "count.tokens");
    req.preprocess = true;
    let err = d.run(&req).unwrap_err();
    assert_eq!(err.exit_code(), 11);
    assert_eq!(d.counts().tokenize, 0);
}

#[test]
fn test_module_files_written_with_object() {
    let dir = TempDir::new().unwrap();
    let input = source(&dir, "geo.f90", MODULE_PROGRAM);
    let mut config = config();
    config.kokkos_dir = Some(PathBuf::from("/opt/kokkos"));
    let mut d = Driver::new(config, RecordingToolchain::new());
    let req = request(&dir, &input, StopPoint::Object, "geo.o").with_backend(BackendKind::Cpp);
    d.run(&req).unwrap();

    let modfile = dir.path().join("geometry.mod");
    assert!(modfile.exists());
    let summary = driver::summarize_module_file(&modfile).unwrap();
    assert!(summary.starts_with("module geometry\n"));
    assert!(summary.contains("parameter sides: integer"));
    assert!(summary.contains("function perimeter(n) -> integer"));

    let asr = driver::show_module_file(&modfile, false).unwrap();
    assert!(asr.contains("perimeter"));
}

#[test]
fn test_passes_apply_before_asr_dump() {
    let dir = TempDir::new().unwrap();
    let input = source(&dir, "count.f90", LOOP_PROGRAM);
    let passes = fortc::passes::resolve(&["do_loops"]).unwrap();
    let mut d = driver();
    let req = request(&dir, &input, StopPoint::Asr, "count.asr").with_passes(passes);
    d.run(&req).unwrap();
    assert_eq!(d.counts().passes, 1);
    let asr = fs::read_to_string(dir.path().join("count.asr")).unwrap();
    assert!(asr.contains("WhileLoop"));
    assert!(!asr.contains("DoLoop"));
}

#[test]
fn test_unknown_pass_is_unsupported() {
    let err = fortc::passes::resolve(&["do_loops,inline"]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unsupported);
    assert_eq!(err.exit_code(), 1);
}

#[cfg(not(feature = "llvm"))]
#[test]
fn test_disabled_backend_fails_before_io() {
    for stop in [
        StopPoint::LlvmIr,
        StopPoint::Assembly,
        StopPoint::Object,
        StopPoint::Executable,
    ] {
        let req = CompilationRequest::new("does/not/exist.f90", stop);
        let err = driver().run(&req).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration, "{}", stop);
        assert!(err.message.contains("not enabled"));
    }
}
