//! Top-level compilation pipeline.
//!
//! A `Compiler` owns one compilation unit: the code generation context
//! and the generator dispatcher. `compile_source` runs normalization,
//! parsing, and lowering, wraps the program in a synthesized
//! `main() -> i32`, verifies the module, and renders the textual IR.

use std::path::PathBuf;

use inkwell::context::Context;

use crate::ast::Expr;
use crate::context::{CodeGen, GlobalBinding};
use crate::diagnostics::{Diagnostic, DiagnosticResult};
use crate::dispatch::Dispatcher;
use crate::generators;
use crate::parser;
use crate::preprocess;

/// LLVM major version backing this build; surfaced to compiled
/// programs through the `_GALLUZ_LLVM_VERSION` global.
const GALLUZ_LLVM_VERSION: u64 = 18;

pub struct Compiler<'ctx> {
    pub cg: CodeGen<'ctx>,
    dispatcher: Dispatcher,
}

impl<'ctx> Compiler<'ctx> {
    pub fn new(context: &'ctx Context, current_dir: PathBuf) -> Self {
        let cg = CodeGen::new(context, "GalluzCompilationUnit", current_dir);
        let mut dispatcher = Dispatcher::new();
        generators::register_default_generators(&mut dispatcher);

        let compiler = Compiler { cg, dispatcher };
        compiler.declare_runtime();
        compiler
    }

    /// Records the unit's entry file for module dependency tracking.
    pub fn set_entry_file(&self, file: PathBuf) {
        self.cg.modules.borrow_mut().set_entry_file(file);
    }

    /// Declares the external C runtime surface referenced by emitted
    /// IR.
    fn declare_runtime(&self) {
        let cg = &self.cg;
        let ptr = cg.ptr_t;
        let i32_t = cg.i32_t;
        let i64_t = cg.i64_t;
        let f64_t = cg.f64_t;

        cg.runtime_function("printf", i32_t.fn_type(&[ptr.into()], true));
        cg.runtime_function("scanf", i32_t.fn_type(&[ptr.into()], true));
        cg.runtime_function(
            "fgets",
            ptr.fn_type(&[ptr.into(), i64_t.into(), ptr.into()], false),
        );
        cg.runtime_function("fprintf", i32_t.fn_type(&[ptr.into(), ptr.into()], true));
        cg.runtime_function("fscanf", i32_t.fn_type(&[ptr.into(), ptr.into()], true));
        cg.runtime_function("sscanf", i32_t.fn_type(&[ptr.into(), ptr.into()], true));
        cg.runtime_function("atoi", i32_t.fn_type(&[ptr.into()], false));
        cg.runtime_function("atof", f64_t.fn_type(&[ptr.into()], false));
        cg.runtime_function(
            "strtol",
            i64_t.fn_type(&[ptr.into(), ptr.into(), i32_t.into()], false),
        );
        cg.runtime_function("strtod", f64_t.fn_type(&[ptr.into(), ptr.into()], false));
        cg.runtime_function("malloc", ptr.fn_type(&[i64_t.into()], false));
        cg.runtime_function("free", cg.context.void_type().fn_type(&[ptr.into()], false));
        cg.runtime_function("strlen", i64_t.fn_type(&[ptr.into()], false));
        cg.runtime_function("strcpy", ptr.fn_type(&[ptr.into(), ptr.into()], false));
        cg.runtime_function("fflush", i32_t.fn_type(&[ptr.into()], false));

        cg.extern_global("stdin", ptr.into());
        cg.extern_global("stdout", ptr.into());
    }

    /// Compiles raw source text and returns the verified textual IR.
    pub fn compile_source(&self, program: &str) -> DiagnosticResult<String> {
        let processed = preprocess::normalize(program)?;
        let ast = parser::parse(&processed)?;
        self.generate_ir(&ast)?;

        self.cg.module.verify().map_err(|message| {
            Diagnostic::error(format!(
                "module verification failed: {}",
                message.to_string().trim_end()
            ))
        })?;

        Ok(self.cg.module.print_to_string().to_string())
    }

    /// Compiles and writes `<output_base>.ll`.
    pub fn execute(&self, program: &str, output_base: &str) -> DiagnosticResult<PathBuf> {
        let ir = self.compile_source(program)?;
        let path = PathBuf::from(format!("{output_base}.ll"));
        std::fs::write(&path, ir)
            .map_err(|e| Diagnostic::error(format!("cannot write {}: {e}", path.display())))?;
        Ok(path)
    }

    /// Traceback of the most recent dispatches, for diagnostics.
    pub fn traceback_note(&self) -> Option<String> {
        self.dispatcher.traceback_note()
    }

    fn generate_ir(&self, ast: &Expr) -> DiagnosticResult<()> {
        let cg = &self.cg;

        let main_type = cg.i32_t.fn_type(&[], false);
        let main_func = cg.module.add_function("main", main_type, None);
        let entry = cg.context.append_basic_block(main_func, "entry");
        cg.builder.position_at_end(entry);
        cg.current_function.set(Some(main_func));

        self.emit_version_global();

        self.dispatcher.lower(ast, cg)?;

        if !cg.block_terminated() {
            cg.builder
                .build_return(Some(&cg.i32_t.const_int(0, false)))
                .map_err(|_| Diagnostic::error("failed to close main"))?;
        }
        Ok(())
    }

    fn emit_version_global(&self) {
        let cg = &self.cg;
        let init = cg.i32_t.const_int(GALLUZ_LLVM_VERSION, false);
        let gv = cg.module.add_global(cg.i32_t, None, "_GALLUZ_LLVM_VERSION");
        gv.set_initializer(&init);
        gv.set_constant(true);
        gv.set_alignment(4);
        cg.globals.borrow_mut().insert(
            "_GALLUZ_LLVM_VERSION".to_string(),
            GlobalBinding {
                value: gv,
                ty: cg.i32_t.into(),
            },
        );
    }
}
