//! galluzc — AOT compiler front-end for the Galluz language.
//!
//! Galluz source is a fully parenthesized sequence of S-expressions.
//! The pipeline normalizes the text, parses it into an expression
//! tree, and lowers it through a priority-ordered generator dispatcher
//! into a typed LLVM module: lexical scopes, structured control flow,
//! user functions, structs, formatted I/O against the host C runtime,
//! and named modules imported from `.glz` files. The result is a
//! verified textual IR module written as `<base>.ll`.

pub mod ast;
pub mod compiler;
pub mod context;
pub mod diagnostics;
pub mod dispatch;
pub mod generators;
pub mod modules;
pub mod parser;
pub mod preprocess;
pub mod types;

use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::compiler::Compiler;

/// Compilation options for the Galluz compiler.
///
/// This structure separates the compiler from CLI argument parsing:
/// the compiler accepts explicit options rather than discovering
/// project structure.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Path to the source file to compile
    pub src_file: String,

    /// Override the output base name (the compiler writes `<base>.ll`);
    /// defaults to the source file without its extension
    pub out_base: Option<String>,

    /// Print the textual IR to stdout instead of writing a file
    pub emit_ir: bool,
}

impl CompileOptions {
    pub fn new(src_file: String) -> Self {
        Self {
            src_file,
            out_base: None,
            emit_ir: false,
        }
    }
}

/// Compiles a source file with the given options.
///
/// Returns the path of the written `.ll` file, or `None` when the IR
/// was printed to stdout instead.
pub fn compile(options: CompileOptions) -> anyhow::Result<Option<PathBuf>> {
    let src_path = Path::new(&options.src_file);
    let program = std::fs::read_to_string(src_path)
        .with_context(|| format!("cannot read source file: {}", src_path.display()))?;

    let current_dir = src_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let context = inkwell::context::Context::create();
    let compiler = Compiler::new(&context, current_dir);
    compiler.set_entry_file(src_path.to_path_buf());

    let outcome = if options.emit_ir {
        compiler.compile_source(&program).map(|ir| {
            println!("{ir}");
            None
        })
    } else {
        let out_base = options.out_base.clone().unwrap_or_else(|| {
            src_path
                .with_extension("")
                .to_string_lossy()
                .into_owned()
        });
        compiler.execute(&program, &out_base).map(Some)
    };

    outcome.map_err(|mut diag| {
        if diag.note.is_none() {
            diag.note = compiler.traceback_note();
        }
        diagnostics::emit_diagnostic(&diag);
        anyhow::anyhow!("{}", diag.message)
    })
}
