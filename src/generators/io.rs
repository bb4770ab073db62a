//! Formatted I/O lowering: `fprint` and `finput`.
//!
//! `fprint` lowers its arguments and calls the external `printf` with
//! the literal format string; sub-int integers are sign-extended for
//! the C varargs ABI and the i32 result is widened to i64.
//!
//! `finput` has two shapes. Prompt-only reads a line into a 1024-byte
//! stack buffer through `fgets`, trims the trailing newline, and
//! yields the buffer pointer; a read failure prints `Input error` and
//! returns 1 from the current function. The scanf-like shape prints
//! the format as a prompt, flushes stdout, scans with a conversion
//! string built from the target types (`%d` int/bool, `%lf` double,
//! `%255s` str), verifies the conversion count, consumes the rest of
//! the line on mismatch, and copies scanned strings to heap storage so
//! they outlive the stack buffers.

use inkwell::IntPredicate;
use inkwell::values::{BasicMetadataValueEnum, BasicValueEnum, PointerValue};

use crate::ast::Expr;
use crate::context::{CodeGen, VarInfo};
use crate::diagnostics::{Diagnostic, DiagnosticResult};
use crate::dispatch::{Dispatcher, Generator, Lowered};
use crate::preprocess;
use crate::types::{TypeId, TypeKind};

pub struct PrintGenerator;

fn printf_fn<'ctx>(cg: &CodeGen<'ctx>) -> inkwell::values::FunctionValue<'ctx> {
    cg.runtime_function("printf", cg.i32_t.fn_type(&[cg.ptr_t.into()], true))
}

fn scanf_fn<'ctx>(cg: &CodeGen<'ctx>) -> inkwell::values::FunctionValue<'ctx> {
    cg.runtime_function("scanf", cg.i32_t.fn_type(&[cg.ptr_t.into()], true))
}

/// Loads the value of an external stdio stream global.
fn load_stdio<'ctx>(cg: &CodeGen<'ctx>, name: &str) -> DiagnosticResult<BasicValueEnum<'ctx>> {
    let global = cg.extern_global(name, cg.ptr_t.into());
    cg.builder
        .build_load(global.as_pointer_value(), name)
        .map_err(|_| Diagnostic::error(format!("failed to load {name}")))
}

/// Returns constant 1 from the current function, matching its return
/// type so the emitted IR stays verifiable.
fn emit_abort_return<'ctx>(cg: &CodeGen<'ctx>) -> DiagnosticResult<()> {
    let function = cg.current_function()?;
    let emitted = match function.get_type().get_return_type() {
        None => cg.builder.build_return(None),
        Some(ty) if ty.is_int_type() => {
            let one = ty.into_int_type().const_int(1, false);
            cg.builder.build_return(Some(&one))
        }
        Some(ty) if ty.is_float_type() => {
            let one = ty.into_float_type().const_float(1.0);
            cg.builder.build_return(Some(&one))
        }
        Some(ty) => {
            let null = ty.const_zero();
            cg.builder.build_return(Some(&null))
        }
    };
    emitted
        .map(|_| ())
        .map_err(|_| Diagnostic::error("failed to emit abort return"))
}

impl Generator for PrintGenerator {
    fn name(&self) -> &'static str {
        "print"
    }

    fn priority(&self) -> i32 {
        300
    }

    fn accepts(&self, node: &Expr, _cg: &CodeGen<'_>) -> bool {
        node.is_form("fprint")
    }

    fn lower<'ctx>(
        &self,
        node: &Expr,
        cg: &CodeGen<'ctx>,
        dispatcher: &Dispatcher,
    ) -> DiagnosticResult<Lowered<'ctx>> {
        let items = node.as_list().unwrap_or_default();
        if items.len() < 2 {
            return Err(Diagnostic::error("fprint requires at least a format string"));
        }
        let Expr::Str(raw) = &items[1] else {
            return Err(Diagnostic::error(
                "First argument to fprint must be a format string",
            ));
        };

        let format_str = preprocess::postprocess_string(raw);
        let format_ptr = cg.intern_string_literal(&format_str)?;

        let mut args: Vec<BasicMetadataValueEnum<'ctx>> = vec![format_ptr.into()];
        for arg_exp in &items[2..] {
            let value = dispatcher
                .lower(arg_exp, cg)?
                .ok_or_else(|| Diagnostic::error("fprint argument produced no value"))?;
            args.push(promote_vararg(cg, value)?.into());
        }

        let call = cg
            .builder
            .build_call(printf_fn(cg), &args, "printf")
            .map_err(|_| Diagnostic::error("failed to call printf"))?;
        let result = call
            .try_as_basic_value()
            .left()
            .ok_or_else(|| Diagnostic::error("printf returned no value"))?;
        let widened = cg
            .builder
            .build_int_cast_sign_flag(result.into_int_value(), cg.i64_t, true, "print.result")
            .map_err(|_| Diagnostic::error("failed to widen printf result"))?;
        Ok(Some(widened.into()))
    }
}

/// C default argument promotions for the varargs call: integers
/// narrower than `int` are sign-extended.
fn promote_vararg<'ctx>(
    cg: &CodeGen<'ctx>,
    value: BasicValueEnum<'ctx>,
) -> DiagnosticResult<BasicValueEnum<'ctx>> {
    match value {
        BasicValueEnum::IntValue(v) if v.get_type().get_bit_width() < 32 => cg
            .builder
            .build_int_s_extend(v, cg.i32_t, "promote")
            .map(Into::into)
            .map_err(|_| Diagnostic::error("failed to promote printf argument")),
        other => Ok(other),
    }
}

pub struct FinputGenerator;

/// One scanf destination.
struct ScanTarget<'ctx> {
    /// Where the scanned value ultimately lands
    storage: PointerValue<'ctx>,
    llvm_ty: inkwell::types::BasicTypeEnum<'ctx>,
    kind: TypeKind,
    /// Stack buffer handed to scanf for string targets
    scan_buf: Option<PointerValue<'ctx>>,
}

impl Generator for FinputGenerator {
    fn name(&self) -> &'static str {
        "finput"
    }

    fn priority(&self) -> i32 {
        300
    }

    fn accepts(&self, node: &Expr, _cg: &CodeGen<'_>) -> bool {
        node.is_form("finput")
    }

    fn lower<'ctx>(
        &self,
        node: &Expr,
        cg: &CodeGen<'ctx>,
        _dispatcher: &Dispatcher,
    ) -> DiagnosticResult<Lowered<'ctx>> {
        let items = node.as_list().unwrap_or_default();
        if items.len() < 2 {
            return Err(Diagnostic::error("finput requires at least a format string"));
        }
        let Expr::Str(raw) = &items[1] else {
            return Err(Diagnostic::error(
                "First argument to finput must be a format string",
            ));
        };
        let prompt = preprocess::postprocess_string(raw);

        if items.len() == 2 {
            self.read_line_input(cg, &prompt)
        } else {
            self.read_formatted_input(cg, &prompt, &items[2..])
        }
    }
}

impl FinputGenerator {
    fn read_line_input<'ctx>(
        &self,
        cg: &CodeGen<'ctx>,
        prompt: &str,
    ) -> DiagnosticResult<Lowered<'ctx>> {
        if prompt.is_empty() {
            return Err(Diagnostic::error(
                "Line input requires a prompt or empty string",
            ));
        }
        let function = cg.current_function()?;
        let printf = printf_fn(cg);

        let prompt_ptr = cg.intern_string_literal(prompt)?;
        cg.builder
            .build_call(printf, &[prompt_ptr.into()], "prompt")
            .map_err(|_| Diagnostic::error("failed to print prompt"))?;

        const BUFFER_SIZE: u64 = 1024;
        let size = cg.i64_t.const_int(BUFFER_SIZE, false);
        let buffer = cg
            .builder
            .build_array_alloca(cg.i8_t, size, "input_buffer")
            .map_err(|_| Diagnostic::error("failed to allocate input buffer"))?;

        let fgets = cg.runtime_function(
            "fgets",
            cg.ptr_t
                .fn_type(&[cg.ptr_t.into(), cg.i64_t.into(), cg.ptr_t.into()], false),
        );
        let stdin_val = load_stdio(cg, "stdin")?;
        let read = cg
            .builder
            .build_call(fgets, &[buffer.into(), size.into(), stdin_val.into()], "read")
            .map_err(|_| Diagnostic::error("failed to call fgets"))?;
        let read_ptr = read
            .try_as_basic_value()
            .left()
            .ok_or_else(|| Diagnostic::error("fgets returned no value"))?
            .into_pointer_value();
        let is_null = cg
            .builder
            .build_is_null(read_ptr, "check_null")
            .map_err(|_| Diagnostic::error("failed to test fgets result"))?;

        let error_bb = cg.context.append_basic_block(function, "input.error");
        let ok_bb = cg.context.append_basic_block(function, "input.ok");
        cg.builder
            .build_conditional_branch(is_null, error_bb, ok_bb)
            .map_err(|_| Diagnostic::error("failed to branch on read result"))?;

        cg.builder.position_at_end(error_bb);
        let error_msg = cg.intern_string_literal("Input error\n")?;
        cg.builder
            .build_call(printf, &[error_msg.into()], "report")
            .map_err(|_| Diagnostic::error("failed to print input error"))?;
        emit_abort_return(cg)?;

        cg.builder.position_at_end(ok_bb);
        self.trim_trailing_newline(cg, buffer)?;
        Ok(Some(buffer.into()))
    }

    /// Replaces a trailing newline in the buffer with NUL.
    fn trim_trailing_newline<'ctx>(
        &self,
        cg: &CodeGen<'ctx>,
        buffer: PointerValue<'ctx>,
    ) -> DiagnosticResult<()> {
        let function = cg.current_function()?;
        let fail = |what: &str| Diagnostic::error(format!("failed to {what}"));

        let strlen = cg.runtime_function("strlen", cg.i64_t.fn_type(&[cg.ptr_t.into()], false));
        let len = cg
            .builder
            .build_call(strlen, &[buffer.into()], "len")
            .map_err(|_| fail("measure input"))?
            .try_as_basic_value()
            .left()
            .ok_or_else(|| fail("measure input"))?
            .into_int_value();

        let check_bb = cg.context.append_basic_block(function, "nl.check");
        let strip_bb = cg.context.append_basic_block(function, "nl.strip");
        let done_bb = cg.context.append_basic_block(function, "nl.done");

        let has_len = cg
            .builder
            .build_int_compare(IntPredicate::SGT, len, cg.i64_t.const_zero(), "has_len")
            .map_err(|_| fail("test input length"))?;
        cg.builder
            .build_conditional_branch(has_len, check_bb, done_bb)
            .map_err(|_| fail("branch on input length"))?;

        cg.builder.position_at_end(check_bb);
        let last_index = cg
            .builder
            .build_int_sub(len, cg.i64_t.const_int(1, false), "last")
            .map_err(|_| fail("index input"))?;
        let last_ptr = unsafe {
            cg.builder
                .build_in_bounds_gep(buffer, &[last_index], "last.ptr")
        }
        .map_err(|_| fail("address input tail"))?;
        let last_char = cg
            .builder
            .build_load(last_ptr, "last.char")
            .map_err(|_| fail("read input tail"))?
            .into_int_value();
        let is_newline = cg
            .builder
            .build_int_compare(
                IntPredicate::EQ,
                last_char,
                cg.i8_t.const_int(u64::from(b'\n'), false),
                "is_nl",
            )
            .map_err(|_| fail("test newline"))?;
        cg.builder
            .build_conditional_branch(is_newline, strip_bb, done_bb)
            .map_err(|_| fail("branch on newline"))?;

        cg.builder.position_at_end(strip_bb);
        cg.builder
            .build_store(last_ptr, cg.i8_t.const_zero())
            .map_err(|_| fail("strip newline"))?;
        cg.builder
            .build_unconditional_branch(done_bb)
            .map_err(|_| fail("close newline strip"))?;

        cg.builder.position_at_end(done_bb);
        Ok(())
    }

    fn read_formatted_input<'ctx>(
        &self,
        cg: &CodeGen<'ctx>,
        prompt: &str,
        arg_exprs: &[Expr],
    ) -> DiagnosticResult<Lowered<'ctx>> {
        let function = cg.current_function()?;
        let printf = printf_fn(cg);

        // The format doubles as the prompt; flush so it shows before
        // the read blocks.
        if !prompt.is_empty() {
            let prompt_ptr = cg.intern_string_literal(prompt)?;
            cg.builder
                .build_call(printf, &[prompt_ptr.into()], "prompt")
                .map_err(|_| Diagnostic::error("failed to print prompt"))?;
        }
        let fflush = cg.runtime_function("fflush", cg.i32_t.fn_type(&[cg.ptr_t.into()], false));
        let stdout_val = load_stdio(cg, "stdout")?;
        cg.builder
            .build_call(fflush, &[stdout_val.into()], "flush")
            .map_err(|_| Diagnostic::error("failed to flush stdout"))?;

        let mut targets = Vec::with_capacity(arg_exprs.len());
        let mut scan_format = String::new();
        for arg_exp in arg_exprs {
            let target = self.resolve_target(cg, arg_exp)?;
            scan_format.push_str(match target.kind {
                TypeKind::Int | TypeKind::Bool => "%d",
                TypeKind::Double => "%lf",
                TypeKind::String => "%255s",
                _ => {
                    return Err(Diagnostic::error(
                        "finput target must be int, bool, double, or str",
                    ));
                }
            });
            targets.push(target);
        }

        let format_ptr = cg.intern_string_literal(&scan_format)?;
        let mut scanf_args: Vec<BasicMetadataValueEnum<'ctx>> = vec![format_ptr.into()];
        for target in &targets {
            let dest = target.scan_buf.unwrap_or(target.storage);
            scanf_args.push(dest.into());
        }

        let count = cg
            .builder
            .build_call(scanf_fn(cg), &scanf_args, "scan")
            .map_err(|_| Diagnostic::error("failed to call scanf"))?
            .try_as_basic_value()
            .left()
            .ok_or_else(|| Diagnostic::error("scanf returned no value"))?
            .into_int_value();

        let expected = cg.i32_t.const_int(targets.len() as u64, false);
        let mismatch = cg
            .builder
            .build_int_compare(IntPredicate::NE, count, expected, "scan.check")
            .map_err(|_| Diagnostic::error("failed to check scanf count"))?;

        let err_bb = cg.context.append_basic_block(function, "scan.error");
        let cont_bb = cg.context.append_basic_block(function, "scan.cont");
        cg.builder
            .build_conditional_branch(mismatch, err_bb, cont_bb)
            .map_err(|_| Diagnostic::error("failed to branch on scanf count"))?;

        // Mismatch reports, drains the rest of the line, and falls
        // through.
        cg.builder.position_at_end(err_bb);
        let error_msg =
            cg.intern_string_literal("Input format error. Expected %d values, got %d\n")?;
        cg.builder
            .build_call(
                printf,
                &[error_msg.into(), expected.into(), count.into()],
                "report",
            )
            .map_err(|_| Diagnostic::error("failed to print scanf error"))?;
        let discard = cg.intern_string_literal("%*[^\n]")?;
        cg.builder
            .build_call(scanf_fn(cg), &[discard.into()], "drain")
            .map_err(|_| Diagnostic::error("failed to drain input line"))?;
        cg.builder
            .build_unconditional_branch(cont_bb)
            .map_err(|_| Diagnostic::error("failed to close scanf error path"))?;

        cg.builder.position_at_end(cont_bb);

        // Scanned strings move to heap storage so they outlive the
        // stack buffers.
        for target in &targets {
            if let Some(scan_buf) = target.scan_buf {
                self.heap_copy_string(cg, scan_buf, target.storage)?;
            }
        }

        if let [only] = targets.as_slice() {
            let loaded = cg
                .builder
                .build_load(only.storage, "input_value")
                .map_err(|_| Diagnostic::error("failed to load scanned value"))?;
            return Ok(Some(loaded));
        }
        Ok(Some(count.into()))
    }

    /// Resolves one `finput` argument to a scan target: an existing
    /// variable name, a bare `!T` marker for a fresh temporary, or a
    /// `(name !T)` pair that also binds the name.
    fn resolve_target<'ctx>(
        &self,
        cg: &CodeGen<'ctx>,
        arg_exp: &Expr,
    ) -> DiagnosticResult<ScanTarget<'ctx>> {
        match arg_exp {
            Expr::Symbol(text) if text.starts_with('!') => {
                let type_id = cg
                    .types
                    .borrow()
                    .from_annotation(text)
                    .ok_or_else(|| Diagnostic::error(format!("Unknown type: {text}")))?;
                self.fresh_target(cg, type_id, None)
            }
            Expr::Symbol(name) => {
                let var = cg
                    .env
                    .borrow()
                    .lookup_var(name)
                    .ok_or_else(|| {
                        Diagnostic::error(format!("Variable not found for finput: {name}"))
                    })?;
                if cg.is_struct_var(&var) {
                    return Err(Diagnostic::error(
                        "Cannot read directly into struct with finput",
                    ));
                }
                let BasicValueEnum::PointerValue(storage) = var.storage else {
                    return Err(Diagnostic::error(format!(
                        "finput target {name} has no storage address"
                    )));
                };
                let kind = var
                    .type_id
                    .map(|tid| cg.types.borrow().kind(tid))
                    .unwrap_or(TypeKind::Int);
                let scan_buf = self.string_scan_buffer(cg, kind)?;
                Ok(ScanTarget {
                    storage,
                    llvm_ty: var.llvm_ty,
                    kind,
                    scan_buf,
                })
            }
            Expr::List(parts) if parts.len() == 2 => {
                let Some(name) = parts[0].as_symbol() else {
                    return Err(Diagnostic::error("Invalid argument to finput"));
                };
                let Some(type_id) = cg.types.borrow().parse_type_spec(&parts[1]) else {
                    return Err(Diagnostic::error("Invalid type specification in finput"));
                };
                self.fresh_target(cg, type_id, Some(name))
            }
            _ => Err(Diagnostic::error("Invalid argument to finput")),
        }
    }

    /// Allocates a temporary for a typed target, optionally binding it
    /// as a variable.
    fn fresh_target<'ctx>(
        &self,
        cg: &CodeGen<'ctx>,
        type_id: TypeId,
        bind_name: Option<&str>,
    ) -> DiagnosticResult<ScanTarget<'ctx>> {
        let info = cg.type_info(type_id);
        if info.kind == TypeKind::Struct {
            return Err(Diagnostic::error(
                "Cannot read directly into struct with finput",
            ));
        }
        let llvm_ty = info
            .llvm
            .ok_or_else(|| Diagnostic::error(format!("Unknown type: {}", info.name)))?;
        let storage = cg
            .builder
            .build_alloca(llvm_ty, bind_name.unwrap_or("input_tmp"))
            .map_err(|_| Diagnostic::error("failed to allocate input temporary"))?;

        if let Some(name) = bind_name {
            cg.env.borrow_mut().bind_var(
                name,
                VarInfo {
                    storage: storage.into(),
                    llvm_ty,
                    type_id: Some(type_id),
                    is_global: false,
                    name: name.to_string(),
                },
            );
        }

        let scan_buf = self.string_scan_buffer(cg, info.kind)?;
        Ok(ScanTarget {
            storage,
            llvm_ty,
            kind: info.kind,
            scan_buf,
        })
    }

    /// Stack buffer handed to scanf for `%255s` conversions.
    fn string_scan_buffer<'ctx>(
        &self,
        cg: &CodeGen<'ctx>,
        kind: TypeKind,
    ) -> DiagnosticResult<Option<PointerValue<'ctx>>> {
        if kind != TypeKind::String {
            return Ok(None);
        }
        let size = cg.i64_t.const_int(256, false);
        cg.builder
            .build_array_alloca(cg.i8_t, size, "scan_buf")
            .map(Some)
            .map_err(|_| Diagnostic::error("failed to allocate scan buffer"))
    }

    /// `malloc(strlen + 1)` and `strcpy`, storing the heap pointer into
    /// the target.
    fn heap_copy_string<'ctx>(
        &self,
        cg: &CodeGen<'ctx>,
        scan_buf: PointerValue<'ctx>,
        storage: PointerValue<'ctx>,
    ) -> DiagnosticResult<()> {
        let fail = |what: &str| Diagnostic::error(format!("failed to {what}"));
        let call_result = |call: inkwell::values::CallSiteValue<'ctx>, what: &str| {
            call.try_as_basic_value()
                .left()
                .ok_or_else(|| fail(what))
        };

        let strlen = cg.runtime_function("strlen", cg.i64_t.fn_type(&[cg.ptr_t.into()], false));
        let malloc = cg.runtime_function("malloc", cg.ptr_t.fn_type(&[cg.i64_t.into()], false));
        let strcpy = cg.runtime_function(
            "strcpy",
            cg.ptr_t.fn_type(&[cg.ptr_t.into(), cg.ptr_t.into()], false),
        );

        let len = call_result(
            cg.builder
                .build_call(strlen, &[scan_buf.into()], "len")
                .map_err(|_| fail("measure scanned string"))?,
            "measure scanned string",
        )?
        .into_int_value();
        let size = cg
            .builder
            .build_int_add(len, cg.i64_t.const_int(1, false), "size")
            .map_err(|_| fail("size scanned string"))?;
        let heap = call_result(
            cg.builder
                .build_call(malloc, &[size.into()], "heap")
                .map_err(|_| fail("allocate scanned string"))?,
            "allocate scanned string",
        )?
        .into_pointer_value();
        cg.builder
            .build_call(strcpy, &[heap.into(), scan_buf.into()], "copy")
            .map_err(|_| fail("copy scanned string"))?;
        cg.builder
            .build_store(storage, heap)
            .map_err(|_| fail("store scanned string"))?;
        Ok(())
    }
}
