//! Function call lowering.
//!
//! Any list whose head symbol is neither a reserved keyword nor an
//! operator is a call. Dotted names (`Mod.fn`) try the full name first
//! and then the suffix. The module-aware dispatcher additionally
//! recognizes `(ModuleName fn args…)` when the head names a known
//! module and the second element is one of its exported symbols.

use inkwell::values::BasicMetadataValueEnum;

use crate::ast::Expr;
use crate::context::{CodeGen, FnInfo};
use crate::diagnostics::{Diagnostic, DiagnosticResult};
use crate::dispatch::{Dispatcher, Generator, Lowered};

/// Keywords that may never be used as call targets.
pub const RESERVED_KEYWORDS: &[&str] = &[
    "defn",
    "var",
    "global",
    "set",
    "scope",
    "do",
    "fprint",
    "if",
    "while",
    "break",
    "continue",
    "struct",
    "struct-alloc",
    "new",
    "getprop",
    "setprop",
    "hasprop",
    "defmodule",
    "import",
    "moduleuse",
    "finput",
];

/// Reserved operator tokens.
pub const OPERATORS: &[&str] = &["+", "-", "*", "/", "%", ">", "<", ">=", "<=", "==", "!="];

/// Lowers and coerces arguments, then emits the call.
fn emit_call<'ctx>(
    cg: &CodeGen<'ctx>,
    dispatcher: &Dispatcher,
    info: &FnInfo<'ctx>,
    display_name: &str,
    arg_exprs: &[Expr],
) -> DiagnosticResult<Lowered<'ctx>> {
    if arg_exprs.len() != info.params.len() {
        return Err(Diagnostic::error(format!(
            "Function {display_name} expects {} arguments, got {}",
            info.params.len(),
            arg_exprs.len()
        )));
    }

    let mut args: Vec<BasicMetadataValueEnum<'ctx>> = Vec::with_capacity(arg_exprs.len());
    for (arg_exp, param) in arg_exprs.iter().zip(&info.params) {
        let value = dispatcher
            .lower(arg_exp, cg)?
            .ok_or_else(|| Diagnostic::error("call argument produced no value"))?;
        let expected = cg.type_info(param.type_id);
        let coerced = cg.coerce_value(
            value,
            &expected,
            &format!("argument {} of {display_name}", param.name),
        )?;
        args.push(coerced.into());
    }

    let call = cg
        .builder
        .build_call(info.function, &args, "call")
        .map_err(|_| Diagnostic::error(format!("failed to call {display_name}")))?;
    Ok(call.try_as_basic_value().left())
}

pub struct FunctionCallGenerator;

impl Generator for FunctionCallGenerator {
    fn name(&self) -> &'static str {
        "call"
    }

    fn priority(&self) -> i32 {
        250
    }

    fn accepts(&self, node: &Expr, _cg: &CodeGen<'_>) -> bool {
        let Some(head) = node.head_symbol() else {
            return false;
        };
        !RESERVED_KEYWORDS.contains(&head) && !OPERATORS.contains(&head)
    }

    fn lower<'ctx>(
        &self,
        node: &Expr,
        cg: &CodeGen<'ctx>,
        dispatcher: &Dispatcher,
    ) -> DiagnosticResult<Lowered<'ctx>> {
        let items = node.as_list().unwrap_or_default();
        let func_name = items[0].as_symbol().unwrap_or_default();

        let info = if let Some((_, suffix)) = func_name.split_once('.') {
            let env = cg.env.borrow();
            env.lookup_fn(func_name)
                .or_else(|| env.lookup_fn(suffix))
                .ok_or_else(|| Diagnostic::error(format!("Function not found: {func_name}")))?
        } else {
            cg.env
                .borrow()
                .lookup_fn(func_name)
                .ok_or_else(|| Diagnostic::error(format!("Undefined function: {func_name}")))?
        };

        emit_call(cg, dispatcher, &info, func_name, &items[1..])
    }
}

/// Dispatches `(ModuleName fn args…)` when the head names a loaded
/// module exporting the second element; anything else falls through to
/// the plain call path.
pub struct ModuleCallGenerator;

impl Generator for ModuleCallGenerator {
    fn name(&self) -> &'static str {
        "module_call"
    }

    fn priority(&self) -> i32 {
        880
    }

    fn accepts(&self, node: &Expr, cg: &CodeGen<'_>) -> bool {
        let Some(items) = node.as_list() else {
            return false;
        };
        let (Some(module), Some(symbol)) = (
            items.first().and_then(Expr::as_symbol),
            items.get(1).and_then(Expr::as_symbol),
        ) else {
            return false;
        };
        if RESERVED_KEYWORDS.contains(&module) || OPERATORS.contains(&module) {
            return false;
        }
        // The registry may be mid-mutation while module bodies lower;
        // in that window nothing is a module call.
        let Ok(modules) = cg.modules.try_borrow() else {
            return false;
        };
        modules.has_module(module) && modules.exports_symbol(module, symbol)
    }

    fn lower<'ctx>(
        &self,
        node: &Expr,
        cg: &CodeGen<'ctx>,
        dispatcher: &Dispatcher,
    ) -> DiagnosticResult<Lowered<'ctx>> {
        let items = node.as_list().unwrap_or_default();
        if items.len() < 2 {
            return Err(Diagnostic::error(
                "Module call requires module and function names",
            ));
        }
        let module_name = items[0].as_symbol().unwrap_or_default();
        let func_name = items[1].as_symbol().unwrap_or_default();
        let full_name = format!("{module_name}.{func_name}");

        let info = {
            let env = cg.env.borrow();
            env.lookup_fn(&full_name)
                .or_else(|| env.lookup_fn(func_name))
                .ok_or_else(|| {
                    Diagnostic::error(format!(
                        "Function {func_name} not found in module {module_name}"
                    ))
                })?
        };

        emit_call(cg, dispatcher, &info, &full_name, &items[2..])
    }
}
