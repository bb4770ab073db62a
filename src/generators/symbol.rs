//! Symbol reference lowering.
//!
//! `true`/`false` are the boolean literals; every other symbol is a
//! name lookup walking the lexical environment, then the globals map,
//! then (for dotted names) the module registry. Non-struct bindings
//! load through their storage address; struct bindings and direct SSA
//! values pass through unchanged.

use inkwell::values::BasicValueEnum;

use crate::ast::Expr;
use crate::context::{CodeGen, VarInfo};
use crate::diagnostics::{Diagnostic, DiagnosticResult};
use crate::dispatch::{Dispatcher, Generator, Lowered};
use crate::modules::ResolvedSymbol;

pub struct SymbolGenerator;

pub(crate) fn load_variable<'ctx>(
    cg: &CodeGen<'ctx>,
    var: &VarInfo<'ctx>,
) -> DiagnosticResult<BasicValueEnum<'ctx>> {
    if cg.is_struct_var(var) {
        return Ok(var.storage);
    }
    match var.storage {
        BasicValueEnum::PointerValue(ptr) => cg
            .builder
            .build_load(ptr, &var.name)
            .map_err(|_| Diagnostic::error(format!("failed to load variable: {}", var.name))),
        direct => Ok(direct),
    }
}

impl Generator for SymbolGenerator {
    fn name(&self) -> &'static str {
        "symbol"
    }

    fn priority(&self) -> i32 {
        900
    }

    fn accepts(&self, node: &Expr, _cg: &CodeGen<'_>) -> bool {
        matches!(node, Expr::Symbol(_))
    }

    fn lower<'ctx>(
        &self,
        node: &Expr,
        cg: &CodeGen<'ctx>,
        _dispatcher: &Dispatcher,
    ) -> DiagnosticResult<Lowered<'ctx>> {
        let Expr::Symbol(symbol) = node else {
            return Err(Diagnostic::error("symbol generator got a non-symbol"));
        };

        if symbol == "true" || symbol == "false" {
            let bit = u64::from(symbol == "true");
            return Ok(Some(cg.bool_t.const_int(bit, false).into()));
        }

        let var = cg.env.borrow().lookup_var(symbol);
        if let Some(var) = var {
            return load_variable(cg, &var).map(Some);
        }

        let global = cg.globals.borrow().get(symbol.as_str()).cloned();
        if let Some(global) = global {
            let loaded = cg
                .builder
                .build_load(global.value.as_pointer_value(), symbol)
                .map_err(|_| Diagnostic::error(format!("failed to load global: {symbol}")))?;
            return Ok(Some(loaded));
        }

        if symbol.contains('.') {
            let resolved = cg.modules.borrow().resolve_symbol(symbol)?;
            match resolved {
                Some(ResolvedSymbol::Variable(var)) => {
                    return load_variable(cg, &var).map(Some);
                }
                Some(ResolvedSymbol::Function(_)) => {
                    return Err(Diagnostic::error(format!(
                        "symbol names a function, not a value: {symbol}"
                    )));
                }
                None => {}
            }
        }

        Err(Diagnostic::error(format!("Undefined symbol: {symbol}")))
    }
}
