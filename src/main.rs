//! fortc command line
//!
//! Main entry point for the `fortc` command.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use fortc::ast::unparse::FormatOptions;
use fortc::codegen::BackendKind;
use fortc::config::DriverConfig;
use fortc::driver::{self, CompilationRequest, Driver, LinkMode, StopPointFlags};
use fortc::error::{ErrorKind, ErrorRecord, Failure, StageResult, funnel};
use fortc::passes;

#[derive(Parser)]
#[command(name = "fortc")]
#[command(about = "A Fortran compiler", long_about = None)]
#[command(disable_version_flag = true)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Source file; without one the interactive evaluator starts
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// Emit assembly, do not assemble or link
    #[arg(short = 'S')]
    assembly: bool,

    /// Compile and assemble, do not link
    #[arg(short = 'c')]
    object: bool,

    /// Output file
    #[arg(short = 'o', value_name = "FILE")]
    output: Option<PathBuf>,

    /// Verbose diagnostics and debug logging
    #[arg(short = 'v')]
    verbose: bool,

    /// Preprocess only
    #[arg(short = 'E')]
    preprocess_only: bool,

    /// Include directory for the preprocessor
    #[arg(short = 'I', value_name = "DIR")]
    include_dirs: Vec<PathBuf>,

    /// Extra library search directory for the linker
    #[arg(short = 'L', value_name = "DIR")]
    library_dirs: Vec<PathBuf>,

    /// Display compiler version information
    #[arg(long)]
    version: bool,

    /// Run the C preprocessor before compiling
    #[arg(long)]
    cpp: bool,

    /// Show tokens for the given file and exit
    #[arg(long)]
    show_tokens: bool,

    /// Show AST for the given file and exit
    #[arg(long)]
    show_ast: bool,

    /// Show ASR for the given file and exit
    #[arg(long)]
    show_asr: bool,

    /// Regenerate Fortran source from the AST and exit
    #[arg(long = "show-ast-f90")]
    show_ast_f90: bool,

    /// Turn off colored AST/ASR
    #[arg(long)]
    no_color: bool,

    /// Apply ASR passes (comma separated) and show the ASR
    #[arg(long, value_name = "PASSES")]
    pass: Vec<String>,

    /// Show LLVM IR for the given file and exit
    #[arg(long)]
    show_llvm: bool,

    /// Show C++ translation source for the given file and exit
    #[arg(long)]
    show_cpp: bool,

    /// Show internal stacktrace on compiler errors
    #[arg(long)]
    show_stacktrace: bool,

    /// Show compilation time report
    #[arg(long)]
    time_report: bool,

    /// Create a static executable
    #[arg(long = "static")]
    static_link: bool,

    /// Select a backend (llvm, cpp, x86)
    #[arg(long, default_value = "llvm")]
    backend: String,

    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Format Fortran source files
    Fmt {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Modify the file in place
        #[arg(short = 'i')]
        in_place: bool,

        /// Number of spaces per indentation level
        #[arg(long, default_value_t = 4)]
        spaces: usize,

        /// Indent the contents of program units
        #[arg(long)]
        indent_unit: bool,

        /// Turn off color
        #[arg(long)]
        no_color: bool,
    },

    /// Run in Jupyter kernel mode
    Kernel {
        /// Connection file
        #[arg(short = 'f', value_name = "FILE")]
        connection_file: PathBuf,
    },

    /// Inspect a compiled module file
    Mod {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Show the module's ASR
        #[arg(long)]
        show_asr: bool,

        /// Turn off color
        #[arg(long)]
        no_color: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() { 1 } else { 0 };
            // Printing only fails when the stream is gone
            let _ = err.print();
            std::process::exit(code);
        }
    };
    init_tracing(cli.verbose);

    let show_stacktrace = cli.show_stacktrace;
    let code = funnel(show_stacktrace, || dispatch(cli));
    std::process::exit(code);
}

/// Report a stage result; internal errors go to the top-level handler
fn finish(result: StageResult<()>, color: bool, show_stacktrace: bool) -> Result<i32, Failure> {
    match result {
        Ok(()) => Ok(0),
        Err(err) if matches!(err.kind, ErrorKind::Internal(_)) => Err(Failure::from_record(err)),
        Err(err) => {
            eprintln!("{}", err.render(color, show_stacktrace));
            Ok(err.exit_code())
        }
    }
}

fn dispatch(cli: Cli) -> Result<i32, Failure> {
    if cli.version {
        println!("fortc version: {}", fortc::VERSION);
        return Ok(0);
    }
    let color = !cli.no_color;
    let show_stacktrace = cli.show_stacktrace;

    match &cli.command {
        Some(Command::Fmt {
            file,
            in_place,
            spaces,
            indent_unit,
            no_color,
        }) => {
            let options = FormatOptions {
                indent: *spaces,
                indent_unit: *indent_unit,
                color: !no_color && !in_place,
            };
            return finish(format_file(file, options, *in_place), !no_color, show_stacktrace);
        }
        Some(Command::Kernel { connection_file }) => {
            return finish(kernel(connection_file), color, show_stacktrace);
        }
        Some(Command::Mod {
            file,
            show_asr,
            no_color,
        }) => {
            return finish(module_file(file, *show_asr, !no_color), !no_color, show_stacktrace);
        }
        None => {}
    }

    let backend: BackendKind = match cli.backend.parse() {
        Ok(backend) => backend,
        Err(err) => return finish(Err(err), color, show_stacktrace),
    };
    let passes = match passes::resolve(&cli.pass) {
        Ok(passes) => passes,
        Err(err) => return finish(Err(err), color, show_stacktrace),
    };

    let Some(file) = cli.file.clone() else {
        return interactive(cli.verbose, color, show_stacktrace);
    };

    let config = match DriverConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => return finish(Err(err), color, show_stacktrace),
    };

    let flags = StopPointFlags {
        preprocess_only: cli.preprocess_only,
        show_tokens: cli.show_tokens,
        show_ast: cli.show_ast,
        show_ast_f90: cli.show_ast_f90,
        show_asr: cli.show_asr,
        passes: !passes.is_empty(),
        show_llvm: cli.show_llvm,
        show_cpp: cli.show_cpp,
        assembly: cli.assembly,
        object: cli.object,
    };
    let mut req = CompilationRequest::new(file, flags.resolve())
        .with_backend(backend)
        .with_passes(passes);
    req.output = cli.output;
    req.link_mode = if cli.static_link {
        LinkMode::Static
    } else {
        LinkMode::Dynamic
    };
    req.preprocess = cli.cpp;
    req.include_dirs = cli.include_dirs;
    req.library_dirs = cli.library_dirs;
    req.color = color;
    req.time_report = cli.time_report;

    let mut driver = Driver::system(config);
    finish(driver.run(&req), color, show_stacktrace)
}

#[cfg(feature = "llvm")]
fn interactive(verbose: bool, color: bool, show_stacktrace: bool) -> Result<i32, Failure> {
    fortc::repl::run(fortc::repl::ReplOptions {
        verbose,
        color,
        show_stacktrace,
    })
}

#[cfg(not(feature = "llvm"))]
fn interactive(_verbose: bool, color: bool, show_stacktrace: bool) -> Result<i32, Failure> {
    let err = ErrorRecord::configuration(
        "Interactive mode requires the llvm backend; rebuild fortc with the `llvm` feature or pass a source file",
    );
    finish(Err(err), color, show_stacktrace)
}

fn format_file(path: &Path, options: FormatOptions, in_place: bool) -> StageResult<()> {
    let formatted = driver::format_source(path, options)?;
    if in_place {
        std::fs::write(path, formatted).map_err(|e| ErrorRecord::io(path, &e))
    } else {
        print!("{}", formatted);
        Ok(())
    }
}

fn module_file(path: &Path, show_asr: bool, color: bool) -> StageResult<()> {
    let text = if show_asr {
        driver::show_module_file(path, color)?
    } else {
        driver::summarize_module_file(path)?
    };
    print!("{}", text);
    Ok(())
}

fn kernel(connection_file: &Path) -> StageResult<()> {
    if !connection_file.is_file() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "connection file not found");
        return Err(ErrorRecord::io(connection_file, &err));
    }
    Err(ErrorRecord::configuration(
        "Kernel support is not compiled into this build of fortc",
    ))
}
