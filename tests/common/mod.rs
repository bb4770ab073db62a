//! Common testing utilities for the Galluz compiler test suite.
//!
//! Tests compile source straight to a textual IR string and assert on
//! its contents, with diagnostic output suppressed so failures stay
//! readable.

use std::path::{Path, PathBuf};

use anyhow::Result;
use inkwell::context::Context;

use galluzc::compiler::Compiler;

/// Compiles Galluz source to LLVM IR text.
#[allow(dead_code)]
pub fn gen_ir_for_source(src: &str) -> Result<String> {
    gen_ir_in_dir(src, Path::new("."))
}

/// Compiles Galluz source with the given module-resolution directory.
#[allow(dead_code)]
pub fn gen_ir_in_dir(src: &str, dir: &Path) -> Result<String> {
    let _diag_guard = galluzc::diagnostics::suppress();
    let context = Context::create();
    let compiler = Compiler::new(&context, dir.to_path_buf());
    compiler.set_entry_file(dir.join("<test>"));
    compiler
        .compile_source(src)
        .map_err(|diag| anyhow::anyhow!("{}", diag.message))
}

/// Compiles source that is expected to fail, returning the message.
#[allow(dead_code)]
pub fn compile_error(src: &str) -> String {
    compile_error_in_dir(src, Path::new("."))
}

#[allow(dead_code)]
pub fn compile_error_in_dir(src: &str, dir: &Path) -> String {
    let _diag_guard = galluzc::diagnostics::suppress();
    let context = Context::create();
    let compiler = Compiler::new(&context, dir.to_path_buf());
    compiler.set_entry_file(dir.join("<test>"));
    match compiler.compile_source(src) {
        Ok(_) => panic!("expected compilation to fail:\n{src}"),
        Err(diag) => diag.message,
    }
}

/// Directory for module-import tests, seeded with the given files.
#[allow(dead_code)]
pub fn module_dir(files: &[(&str, &str)]) -> Result<tempfile::TempDir> {
    let dir = tempfile::tempdir()?;
    for (name, content) in files {
        std::fs::write(dir.path().join(name), content)?;
    }
    Ok(dir)
}

/// Convenience wrapper returning the entry path used for tests.
#[allow(dead_code)]
pub fn entry_in(dir: &Path) -> PathBuf {
    dir.join("<test>")
}
