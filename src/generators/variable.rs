//! Variable declaration lowering: `var` (stack locals) and `global`
//! (module-level globals with constant initializers).
//!
//! Both forms accept `(var name value)` or `(var (name !T) value)`;
//! with an annotation the initializer is coerced to the declared type.
//! Non-struct locals get stack storage with the value stored into it;
//! struct locals bind the instance pointer itself.

use inkwell::values::BasicValueEnum;

use crate::ast::Expr;
use crate::context::{CodeGen, GlobalBinding, VarInfo};
use crate::diagnostics::{Diagnostic, DiagnosticResult};
use crate::dispatch::{Dispatcher, Generator, Lowered};
use crate::types::{TypeId, TypeKind};

pub struct VariableGenerator;

/// Parses a binding head: a bare symbol or a `(name !T)` pair.
pub(crate) fn parse_binding<'ctx>(
    cg: &CodeGen<'ctx>,
    node: &Expr,
    form: &str,
) -> DiagnosticResult<(String, Option<TypeId>)> {
    match node {
        Expr::Symbol(name) => Ok((name.clone(), None)),
        Expr::List(items) if items.len() == 2 => {
            let Some(name) = items[0].as_symbol() else {
                return Err(Diagnostic::error(format!(
                    "{form} name must be a symbol"
                )));
            };
            let Some(type_id) = cg.types.borrow().parse_type_spec(&items[1]) else {
                return Err(Diagnostic::error(format!(
                    "unknown type in {form} annotation: {}",
                    items[1]
                )));
            };
            Ok((name.to_string(), Some(type_id)))
        }
        other => Err(Diagnostic::error(format!(
            "invalid {form} name: {other}"
        ))),
    }
}

/// Infers the declared type of an unannotated binding from the lowered
/// initializer; a `new`/`struct-alloc` initializer names its struct.
fn infer_type_id<'ctx>(
    cg: &CodeGen<'ctx>,
    value_exp: &Expr,
    value: BasicValueEnum<'ctx>,
) -> Option<TypeId> {
    if value_exp.is_form("new") || value_exp.is_form("struct-alloc") {
        if let Some(items) = value_exp.as_list()
            && let Some(struct_name) = items.get(1).and_then(Expr::as_symbol)
        {
            return cg.types.borrow().get(struct_name);
        }
        return None;
    }

    let types = cg.types.borrow();
    match value {
        BasicValueEnum::IntValue(v) if v.get_type().get_bit_width() == 1 => types.get("bool"),
        BasicValueEnum::IntValue(_) => types.get("int"),
        BasicValueEnum::FloatValue(_) => types.get("double"),
        BasicValueEnum::PointerValue(_) => types.get("str"),
        _ => None,
    }
}

fn is_compile_time_constant(value: BasicValueEnum<'_>) -> bool {
    match value {
        BasicValueEnum::IntValue(v) => v.is_const(),
        BasicValueEnum::FloatValue(v) => v.is_const(),
        BasicValueEnum::PointerValue(v) => v.is_const(),
        _ => false,
    }
}

/// Constant-level coercion for global initializers. LLVM 18 dropped
/// most constant cast expressions, so constants are re-materialized at
/// the target type instead of going through the builder.
fn coerce_constant<'ctx>(
    cg: &CodeGen<'ctx>,
    value: BasicValueEnum<'ctx>,
    type_id: TypeId,
) -> DiagnosticResult<BasicValueEnum<'ctx>> {
    let info = cg.type_info(type_id);
    let Some(expected_llvm) = info.llvm else {
        return Err(Diagnostic::error(format!(
            "global cannot have type {}",
            info.name
        )));
    };
    if value.get_type() == expected_llvm {
        return Ok(value);
    }

    let mismatch = || {
        Diagnostic::error(format!(
            "type mismatch in global initializer: expected {}",
            info.name
        ))
    };

    match (info.kind, value) {
        (TypeKind::Int, BasicValueEnum::IntValue(v)) => {
            let n = v.get_sign_extended_constant().ok_or_else(mismatch)?;
            Ok(cg.i64_t.const_int(n as u64, false).into())
        }
        (TypeKind::Int, BasicValueEnum::FloatValue(v)) => {
            let (x, _) = v.get_constant().ok_or_else(mismatch)?;
            Ok(cg.i64_t.const_int(x as i64 as u64, false).into())
        }
        (TypeKind::Double, BasicValueEnum::IntValue(v)) => {
            let n = v.get_sign_extended_constant().ok_or_else(mismatch)?;
            Ok(cg.f64_t.const_float(n as f64).into())
        }
        (TypeKind::Double, BasicValueEnum::FloatValue(v)) => {
            let (x, _) = v.get_constant().ok_or_else(mismatch)?;
            Ok(cg.f64_t.const_float(x).into())
        }
        (TypeKind::Bool, BasicValueEnum::IntValue(v)) => {
            let n = v.get_sign_extended_constant().ok_or_else(mismatch)?;
            Ok(cg.bool_t.const_int((n & 1) as u64, false).into())
        }
        _ => Err(mismatch()),
    }
}

impl Generator for VariableGenerator {
    fn name(&self) -> &'static str {
        "variable"
    }

    fn priority(&self) -> i32 {
        800
    }

    fn accepts(&self, node: &Expr, _cg: &CodeGen<'_>) -> bool {
        node.is_form("var") || node.is_form("global")
    }

    fn lower<'ctx>(
        &self,
        node: &Expr,
        cg: &CodeGen<'ctx>,
        dispatcher: &Dispatcher,
    ) -> DiagnosticResult<Lowered<'ctx>> {
        let items = node.as_list().unwrap_or_default();
        let form = items[0].as_symbol().unwrap_or("var");
        if items.len() != 3 {
            return Err(Diagnostic::error(format!(
                "Invalid {form} syntax: ({form} name value)"
            )));
        }

        let (name, annotation) = parse_binding(cg, &items[1], form)?;
        let value = dispatcher
            .lower(&items[2], cg)?
            .ok_or_else(|| Diagnostic::error(format!("{form} initializer produced no value")))?;

        if form == "global" {
            return self.lower_global(cg, &name, annotation, &items[2], value);
        }
        self.lower_local(cg, &name, annotation, &items[2], value)
    }
}

impl VariableGenerator {
    fn lower_local<'ctx>(
        &self,
        cg: &CodeGen<'ctx>,
        name: &str,
        annotation: Option<TypeId>,
        value_exp: &Expr,
        value: BasicValueEnum<'ctx>,
    ) -> DiagnosticResult<Lowered<'ctx>> {
        let (value, type_id) = match annotation {
            Some(tid) => {
                let info = cg.type_info(tid);
                let coerced =
                    cg.coerce_value(value, &info, &format!("declaration of {name}"))?;
                (coerced, Some(tid))
            }
            None => (value, infer_type_id(cg, value_exp, value)),
        };

        if let Some(tid) = type_id
            && cg.types.borrow().kind(tid) == TypeKind::Struct
        {
            let BasicValueEnum::PointerValue(_) = value else {
                return Err(Diagnostic::error(format!(
                    "struct variable {name} must bind an instance pointer"
                )));
            };
            let llvm_ty = cg
                .type_info(tid)
                .llvm
                .ok_or_else(|| Diagnostic::error("struct type has no layout"))?;
            cg.env.borrow_mut().bind_var(
                name,
                VarInfo {
                    storage: value,
                    llvm_ty,
                    type_id,
                    is_global: false,
                    name: name.to_string(),
                },
            );
            return Ok(Some(value));
        }

        let llvm_ty = value.get_type();
        let alloca = cg
            .builder
            .build_alloca(llvm_ty, name)
            .map_err(|_| Diagnostic::error(format!("failed to allocate storage for {name}")))?;
        cg.builder
            .build_store(alloca, value)
            .map_err(|_| Diagnostic::error(format!("failed to initialize {name}")))?;

        cg.env.borrow_mut().bind_var(
            name,
            VarInfo {
                storage: alloca.into(),
                llvm_ty,
                type_id,
                is_global: false,
                name: name.to_string(),
            },
        );
        Ok(Some(value))
    }

    fn lower_global<'ctx>(
        &self,
        cg: &CodeGen<'ctx>,
        name: &str,
        annotation: Option<TypeId>,
        value_exp: &Expr,
        value: BasicValueEnum<'ctx>,
    ) -> DiagnosticResult<Lowered<'ctx>> {
        if !is_compile_time_constant(value) {
            return Err(Diagnostic::error(format!(
                "Global variable initializer must be constant: {name}"
            )));
        }

        let value = match annotation {
            Some(tid) => coerce_constant(cg, value, tid)?,
            None => value,
        };
        let type_id = match annotation {
            Some(tid) => Some(tid),
            None => infer_type_id(cg, value_exp, value),
        };
        let llvm_ty = value.get_type();

        let existing = cg.globals.borrow().get(name).cloned();
        let global = match existing {
            Some(binding) => {
                // Redeclaration with the same lowered type replaces the
                // initializer; a different type is a type error.
                if binding.ty != llvm_ty {
                    return Err(Diagnostic::error(format!(
                        "global {name} redeclared with a different type"
                    )));
                }
                binding.value.set_initializer(&value);
                binding.value
            }
            None => {
                let gv = cg.module.add_global(llvm_ty, None, name);
                gv.set_initializer(&value);
                gv.set_constant(false);
                cg.globals.borrow_mut().insert(
                    name.to_string(),
                    GlobalBinding {
                        value: gv,
                        ty: llvm_ty,
                    },
                );
                gv
            }
        };

        cg.env.borrow_mut().bind_var(
            name,
            VarInfo {
                storage: global.as_pointer_value().into(),
                llvm_ty,
                type_id,
                is_global: true,
                name: name.to_string(),
            },
        );
        Ok(Some(value))
    }
}
