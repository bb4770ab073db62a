//! Assignment lowering.
//!
//! The destination is resolved in the environment first and then in
//! the globals map. The value is coerced to the binding's declared
//! type when one is known, otherwise the lowered types must agree
//! exactly. Struct bindings accept a pointer source (the binding is
//! re-pointed at the new instance) or an aggregate source (stored
//! through the instance pointer).

use inkwell::values::BasicValueEnum;

use crate::ast::Expr;
use crate::context::CodeGen;
use crate::diagnostics::{Diagnostic, DiagnosticResult};
use crate::dispatch::{Dispatcher, Generator, Lowered};
use crate::types::TypeKind;

pub struct SetGenerator;

impl Generator for SetGenerator {
    fn name(&self) -> &'static str {
        "set"
    }

    fn priority(&self) -> i32 {
        700
    }

    fn accepts(&self, node: &Expr, _cg: &CodeGen<'_>) -> bool {
        node.is_form("set")
    }

    fn lower<'ctx>(
        &self,
        node: &Expr,
        cg: &CodeGen<'ctx>,
        dispatcher: &Dispatcher,
    ) -> DiagnosticResult<Lowered<'ctx>> {
        let items = node.as_list().unwrap_or_default();
        if items.len() != 3 {
            return Err(Diagnostic::error("Invalid set syntax: (set variable value)"));
        }

        let var_name = match &items[1] {
            Expr::Symbol(s) => s.clone(),
            Expr::List(parts) if parts.len() == 2 => parts[0]
                .as_symbol()
                .ok_or_else(|| Diagnostic::error("Variable name must be a symbol"))?
                .to_string(),
            _ => return Err(Diagnostic::error("Invalid variable name in set operation")),
        };

        let value = dispatcher
            .lower(&items[2], cg)?
            .ok_or_else(|| Diagnostic::error("set value produced no value"))?;

        let var = cg.env.borrow().lookup_var(&var_name);
        if let Some(var) = var {
            if let Some(tid) = var.type_id {
                let info = cg.type_info(tid);
                if info.kind == TypeKind::Struct {
                    return self.assign_struct(cg, &var_name, value);
                }
                let coerced =
                    cg.coerce_value(value, &info, &format!("set of {var_name}"))?;
                return self.store(cg, &var_name, var.is_global, var.storage, coerced);
            }

            if value.get_type() != var.llvm_ty {
                return Err(Diagnostic::error(format!(
                    "Type mismatch in set operation for variable: {var_name}"
                )));
            }
            return self.store(cg, &var_name, var.is_global, var.storage, value);
        }

        // Globals declared outside the current lexical chain
        let global = cg.globals.borrow().get(var_name.as_str()).cloned();
        if let Some(global) = global {
            if value.get_type() != global.ty {
                return Err(Diagnostic::error(format!(
                    "Type mismatch in set operation for variable: {var_name}"
                )));
            }
            cg.builder
                .build_store(global.value.as_pointer_value(), value)
                .map_err(|_| Diagnostic::error(format!("failed to store to {var_name}")))?;
            return Ok(Some(value));
        }

        Err(Diagnostic::error(format!(
            "Cannot set undefined variable: {var_name}"
        )))
    }
}

impl SetGenerator {
    fn assign_struct<'ctx>(
        &self,
        cg: &CodeGen<'ctx>,
        var_name: &str,
        value: BasicValueEnum<'ctx>,
    ) -> DiagnosticResult<Lowered<'ctx>> {
        match value {
            BasicValueEnum::PointerValue(_) => {
                cg.env.borrow_mut().update_var_value(var_name, value);
                Ok(Some(value))
            }
            BasicValueEnum::StructValue(sv) => {
                let var = cg
                    .env
                    .borrow()
                    .lookup_var(var_name)
                    .ok_or_else(|| Diagnostic::error(format!("unbound variable: {var_name}")))?;
                let BasicValueEnum::PointerValue(ptr) = var.storage else {
                    return Err(Diagnostic::error(format!(
                        "struct variable {var_name} has no instance pointer"
                    )));
                };
                cg.builder
                    .build_store(ptr, sv)
                    .map_err(|_| Diagnostic::error(format!("failed to store to {var_name}")))?;
                Ok(Some(value))
            }
            _ => Err(Diagnostic::error(format!(
                "Type mismatch in set operation for struct variable: {var_name}"
            ))),
        }
    }

    fn store<'ctx>(
        &self,
        cg: &CodeGen<'ctx>,
        var_name: &str,
        is_global: bool,
        storage: BasicValueEnum<'ctx>,
        value: BasicValueEnum<'ctx>,
    ) -> DiagnosticResult<Lowered<'ctx>> {
        if is_global {
            let global = cg.globals.borrow().get(var_name).cloned();
            if let Some(global) = global {
                cg.builder
                    .build_store(global.value.as_pointer_value(), value)
                    .map_err(|_| Diagnostic::error(format!("failed to store to {var_name}")))?;
                return Ok(Some(value));
            }
        }

        let BasicValueEnum::PointerValue(ptr) = storage else {
            return Err(Diagnostic::error(format!(
                "cannot assign to {var_name}: binding has no storage address"
            )));
        };
        cg.builder
            .build_store(ptr, value)
            .map_err(|_| Diagnostic::error(format!("failed to store to {var_name}")))?;
        Ok(Some(value))
    }
}
