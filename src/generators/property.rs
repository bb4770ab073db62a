//! Property access on struct-typed bindings: `getprop`, `setprop`,
//! `hasprop`.
//!
//! The subject expression is lowered and traced back to its binding
//! through the storage handle (or by name when the subject is a bare
//! symbol). `getprop` loads the field, `setprop` coerces and stores
//! (yielding the stored value), and `hasprop` yields an i1 that is
//! false rather than an error when the subject is not a struct.

use inkwell::values::BasicValueEnum;

use crate::ast::Expr;
use crate::context::{CodeGen, VarInfo};
use crate::diagnostics::{Diagnostic, DiagnosticResult};
use crate::dispatch::{Dispatcher, Generator, Lowered};
use crate::types::{StructId, TypeKind};

pub struct PropertyGenerator;

const OPS: &[&str] = &["getprop", "setprop", "hasprop"];

/// Finds the binding behind a lowered subject value.
fn subject_binding<'ctx>(
    cg: &CodeGen<'ctx>,
    subject_exp: &Expr,
    subject: BasicValueEnum<'ctx>,
) -> Option<VarInfo<'ctx>> {
    let env = cg.env.borrow();
    env.lookup_var_by_storage(subject)
        .or_else(|| subject_exp.as_symbol().and_then(|name| env.lookup_var(name)))
}

/// Resolves the subject to a struct binding, or errors.
fn struct_binding<'ctx>(
    cg: &CodeGen<'ctx>,
    subject_exp: &Expr,
    subject: BasicValueEnum<'ctx>,
) -> DiagnosticResult<(VarInfo<'ctx>, StructId)> {
    let var = subject_binding(cg, subject_exp, subject)
        .ok_or_else(|| Diagnostic::error("Cannot find variable info for struct"))?;
    let types = cg.types.borrow();
    let sid = var
        .type_id
        .map(|tid| types.info(tid).clone())
        .filter(|info| info.kind == TypeKind::Struct)
        .and_then(|info| info.struct_id)
        .ok_or_else(|| Diagnostic::error("Variable is not a struct"))?;
    drop(types);
    Ok((var, sid))
}

impl Generator for PropertyGenerator {
    fn name(&self) -> &'static str {
        "property"
    }

    fn priority(&self) -> i32 {
        850
    }

    fn accepts(&self, node: &Expr, _cg: &CodeGen<'_>) -> bool {
        node.head_symbol().is_some_and(|head| OPS.contains(&head))
    }

    fn lower<'ctx>(
        &self,
        node: &Expr,
        cg: &CodeGen<'ctx>,
        dispatcher: &Dispatcher,
    ) -> DiagnosticResult<Lowered<'ctx>> {
        let items = node.as_list().unwrap_or_default();
        match items[0].as_symbol().unwrap_or_default() {
            "getprop" => self.lower_getprop(items, cg, dispatcher),
            "setprop" => self.lower_setprop(items, cg, dispatcher),
            "hasprop" => self.lower_hasprop(items, cg, dispatcher),
            other => Err(Diagnostic::error(format!(
                "Unknown property operation: {other}"
            ))),
        }
    }
}

impl PropertyGenerator {
    fn lower_getprop<'ctx>(
        &self,
        items: &[Expr],
        cg: &CodeGen<'ctx>,
        dispatcher: &Dispatcher,
    ) -> DiagnosticResult<Lowered<'ctx>> {
        if items.len() != 3 {
            return Err(Diagnostic::error(
                "getprop requires exactly 2 arguments: (getprop struct-instance field-name)",
            ));
        }
        let subject = dispatcher
            .lower(&items[1], cg)?
            .ok_or_else(|| Diagnostic::error("getprop subject produced no value"))?;
        let Some(field_name) = items[2].as_symbol() else {
            return Err(Diagnostic::error("Field name must be a symbol"));
        };

        let (_, sid) = struct_binding(cg, &items[1], subject)?;
        let BasicValueEnum::PointerValue(instance) = subject else {
            return Err(Diagnostic::error("struct subject is not a pointer"));
        };

        let (struct_name, struct_llvm, field_index, field_ty) = {
            let types = cg.types.borrow();
            let info = types.struct_info(sid);
            let Some(&index) = info.field_indices.get(field_name) else {
                return Err(Diagnostic::error(format!(
                    "Struct {} has no field named {field_name}",
                    info.name
                )));
            };
            (
                info.name.clone(),
                info.llvm,
                index,
                info.fields[index].ty,
            )
        };

        let field_llvm = cg
            .type_info(field_ty)
            .llvm
            .ok_or_else(|| {
                Diagnostic::error(format!("field {field_name} of {struct_name} has no value type"))
            })?;

        let gep = cg
            .builder
            .build_struct_gep(instance, field_index as u32, field_name)
            .map_err(|_| Diagnostic::error(format!("failed to address field {field_name}")))?;
        let loaded = cg
            .builder
            .build_load(gep, field_name)
            .map_err(|_| Diagnostic::error(format!("failed to load field {field_name}")))?;
        Ok(Some(loaded))
    }

    fn lower_setprop<'ctx>(
        &self,
        items: &[Expr],
        cg: &CodeGen<'ctx>,
        dispatcher: &Dispatcher,
    ) -> DiagnosticResult<Lowered<'ctx>> {
        if items.len() != 4 {
            return Err(Diagnostic::error(
                "setprop requires exactly 3 arguments: (setprop struct-instance field-name value)",
            ));
        }
        let subject = dispatcher
            .lower(&items[1], cg)?
            .ok_or_else(|| Diagnostic::error("setprop subject produced no value"))?;
        let Some(field_name) = items[2].as_symbol() else {
            return Err(Diagnostic::error("Field name must be a symbol"));
        };
        let value = dispatcher
            .lower(&items[3], cg)?
            .ok_or_else(|| Diagnostic::error("setprop value produced no value"))?;

        let (_, sid) = struct_binding(cg, &items[1], subject)?;
        let BasicValueEnum::PointerValue(instance) = subject else {
            return Err(Diagnostic::error("struct subject is not a pointer"));
        };

        let (struct_name, struct_llvm, field_index, field_ty) = {
            let types = cg.types.borrow();
            let info = types.struct_info(sid);
            let Some(&index) = info.field_indices.get(field_name) else {
                return Err(Diagnostic::error(format!(
                    "Struct {} has no field named {field_name}",
                    info.name
                )));
            };
            (
                info.name.clone(),
                info.llvm,
                index,
                info.fields[index].ty,
            )
        };

        let expected = cg.type_info(field_ty);
        let coerced = cg.coerce_value(
            value,
            &expected,
            &format!("setprop of {field_name} in {struct_name}"),
        )?;

        let gep = cg
            .builder
            .build_struct_gep(instance, field_index as u32, field_name)
            .map_err(|_| Diagnostic::error(format!("failed to address field {field_name}")))?;
        cg.builder
            .build_store(gep, coerced)
            .map_err(|_| Diagnostic::error(format!("failed to store field {field_name}")))?;
        Ok(Some(coerced))
    }

    fn lower_hasprop<'ctx>(
        &self,
        items: &[Expr],
        cg: &CodeGen<'ctx>,
        dispatcher: &Dispatcher,
    ) -> DiagnosticResult<Lowered<'ctx>> {
        if items.len() != 3 {
            return Err(Diagnostic::error(
                "hasprop requires exactly 2 arguments: (hasprop struct-instance field-name)",
            ));
        }
        let subject = dispatcher
            .lower(&items[1], cg)?
            .ok_or_else(|| Diagnostic::error("hasprop subject produced no value"))?;
        let Some(field_name) = items[2].as_symbol() else {
            return Err(Diagnostic::error("Field name must be a symbol"));
        };

        // A non-struct subject yields false rather than an error
        let has = subject_binding(cg, &items[1], subject)
            .and_then(|var| {
                let types = cg.types.borrow();
                let info = var.type_id.map(|tid| types.info(tid).clone())?;
                if info.kind != TypeKind::Struct {
                    return None;
                }
                let sid = info.struct_id?;
                Some(
                    types
                        .struct_info(sid)
                        .field_indices
                        .contains_key(field_name),
                )
            })
            .unwrap_or(false);

        Ok(Some(cg.bool_t.const_int(u64::from(has), false).into()))
    }
}
