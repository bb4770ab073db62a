//! Struct forms: definition, `new` with field initializers, and the
//! bare `struct-alloc` allocation.
//!
//! `(struct Name ((f !T) …))` registers a fresh aggregate; redefining
//! an existing struct is a silent no-op. `(new Name (field value) …)`
//! allocates a zero-initialized instance on the stack, stores each
//! field through its field address (duplicate or unknown field names
//! are fatal), and yields the instance pointer. `(struct-alloc Name)`
//! is `new` without initializers.

use std::collections::HashSet;

use inkwell::values::PointerValue;

use crate::ast::Expr;
use crate::context::CodeGen;
use crate::diagnostics::{Diagnostic, DiagnosticResult};
use crate::dispatch::{Dispatcher, Generator, Lowered};
use crate::types::{StructId, TypeKind};

pub struct StructGenerator;

impl Generator for StructGenerator {
    fn name(&self) -> &'static str {
        "struct"
    }

    fn priority(&self) -> i32 {
        950
    }

    fn accepts(&self, node: &Expr, _cg: &CodeGen<'_>) -> bool {
        node.is_form("struct")
    }

    fn lower<'ctx>(
        &self,
        node: &Expr,
        cg: &CodeGen<'ctx>,
        _dispatcher: &Dispatcher,
    ) -> DiagnosticResult<Lowered<'ctx>> {
        let items = node.as_list().unwrap_or_default();
        if items.len() != 3 {
            return Err(Diagnostic::error(
                "Invalid struct definition: (struct name ((field1 !type) ...))",
            ));
        }

        let Some(struct_name) = items[1].as_symbol() else {
            return Err(Diagnostic::error("Struct name must be a symbol"));
        };
        let Some(field_exprs) = items[2].as_list() else {
            return Err(Diagnostic::error("Struct fields must be a list"));
        };

        let mut fields = Vec::with_capacity(field_exprs.len());
        for field_exp in field_exprs {
            let Some([name_exp, type_exp]) = field_exp.as_list() else {
                return Err(Diagnostic::error("Field definition must be (name !type)"));
            };
            let Some(field_name) = name_exp.as_symbol() else {
                return Err(Diagnostic::error("Field name must be a symbol"));
            };
            let Some(type_id) = cg.types.borrow().parse_type_spec(type_exp) else {
                return Err(Diagnostic::error(format!(
                    "Unknown field type: {type_exp}"
                )));
            };
            fields.push((field_name.to_string(), type_id));
        }

        cg.types
            .borrow_mut()
            .define_struct(cg.context, struct_name, &fields)?;

        Ok(Some(cg.i64_t.const_int(0, false).into()))
    }
}

/// Allocates a zero-initialized instance of the named struct and
/// returns (the pointer, the struct id).
fn alloc_instance<'ctx>(
    cg: &CodeGen<'ctx>,
    struct_name: &str,
) -> DiagnosticResult<(PointerValue<'ctx>, StructId)> {
    let (struct_llvm, sid) = {
        let types = cg.types.borrow();
        let Some(type_id) = types.get(struct_name) else {
            return Err(Diagnostic::error(format!(
                "Unknown struct type: {struct_name}"
            )));
        };
        let info = types.info(type_id);
        let (Some(sid), TypeKind::Struct) = (info.struct_id, info.kind) else {
            return Err(Diagnostic::error(format!(
                "Unknown struct type: {struct_name}"
            )));
        };
        (types.struct_info(sid).llvm, sid)
    };

    let alloca = cg
        .builder
        .build_alloca(struct_llvm, &format!("{struct_name}_inst"))
        .map_err(|_| Diagnostic::error(format!("failed to allocate {struct_name}")))?;
    cg.builder
        .build_store(alloca, struct_llvm.const_zero())
        .map_err(|_| Diagnostic::error(format!("failed to zero {struct_name}")))?;
    Ok((alloca, sid))
}

pub struct NewGenerator;

impl Generator for NewGenerator {
    fn name(&self) -> &'static str {
        "new"
    }

    fn priority(&self) -> i32 {
        860
    }

    fn accepts(&self, node: &Expr, _cg: &CodeGen<'_>) -> bool {
        node.is_form("new")
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
                "new requires at least struct name: (new StructName ...)",
            ));
        }
        let Some(struct_name) = items[1].as_symbol() else {
            return Err(Diagnostic::error("Struct name must be a symbol"));
        };

        let (alloca, sid) = alloc_instance(cg, struct_name)?;

        let mut seen = HashSet::new();
        for assignment in &items[2..] {
            let Some([field_name_exp, value_exp]) = assignment.as_list() else {
                return Err(Diagnostic::error(
                    "Field assignment must be (field-name value)",
                ));
            };
            let Some(field_name) = field_name_exp.as_symbol() else {
                return Err(Diagnostic::error("Field name must be a symbol"));
            };
            if !seen.insert(field_name.to_string()) {
                return Err(Diagnostic::error(format!(
                    "Duplicate field assignment for: {field_name}"
                )));
            }

            let (field_index, field_ty, struct_llvm) = {
                let types = cg.types.borrow();
                let info = types.struct_info(sid);
                let Some(&index) = info.field_indices.get(field_name) else {
                    return Err(Diagnostic::error(format!(
                        "Struct {struct_name} has no field named {field_name}"
                    )));
                };
                (index, info.fields[index].ty, info.llvm)
            };

            let value = dispatcher
                .lower(value_exp, cg)?
                .ok_or_else(|| Diagnostic::error("field initializer produced no value"))?;
            let expected = cg.type_info(field_ty);
            let coerced = cg.coerce_value(
                value,
                &expected,
                &format!("field {field_name} of {struct_name}"),
            )?;

            let gep = cg
                .builder
                .build_struct_gep(alloca, field_index as u32, field_name)
                .map_err(|_| {
                    Diagnostic::error(format!("failed to address field {field_name}"))
                })?;
            cg.builder
                .build_store(gep, coerced)
                .map_err(|_| Diagnostic::error(format!("failed to store field {field_name}")))?;
        }

        Ok(Some(alloca.into()))
    }
}

pub struct StructAllocGenerator;

impl Generator for StructAllocGenerator {
    fn name(&self) -> &'static str {
        "struct_alloc"
    }

    fn priority(&self) -> i32 {
        940
    }

    fn accepts(&self, node: &Expr, _cg: &CodeGen<'_>) -> bool {
        node.is_form("struct-alloc")
    }

    fn lower<'ctx>(
        &self,
        node: &Expr,
        cg: &CodeGen<'ctx>,
        _dispatcher: &Dispatcher,
    ) -> DiagnosticResult<Lowered<'ctx>> {
        let items = node.as_list().unwrap_or_default();
        if items.len() != 2 {
            return Err(Diagnostic::error(
                "struct-alloc requires exactly 1 argument: (struct-alloc StructName)",
            ));
        }
        let Some(struct_name) = items[1].as_symbol() else {
            return Err(Diagnostic::error("Struct name must be a symbol"));
        };
        let (alloca, _) = alloc_instance(cg, struct_name)?;
        Ok(Some(alloca.into()))
    }
}
