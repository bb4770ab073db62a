//! Function definition lowering: `(defn (name !Ret) ((p !T) …) body)`.
//!
//! The function is bound in the enclosing frame before the body is
//! lowered, permitting self-recursion and calls after the definition.
//! Arguments get stack slots (struct arguments bind their incoming
//! pointer directly), the body's value is coerced to the return type,
//! and the outer insertion point is restored afterwards.

use inkwell::types::{BasicMetadataTypeEnum, BasicType};
use inkwell::values::BasicValueEnum;

use crate::ast::Expr;
use crate::context::{CodeGen, FnInfo, ParamInfo, VarInfo};
use crate::diagnostics::{Diagnostic, DiagnosticResult};
use crate::dispatch::{Dispatcher, Generator, Lowered};
use crate::types::{TypeId, TypeKind};

pub struct FunctionGenerator;

fn parse_typed_name<'ctx>(
    cg: &CodeGen<'ctx>,
    node: &Expr,
) -> DiagnosticResult<(String, TypeId)> {
    let Some([name_exp, ret_exp]) = node.as_list() else {
        return Err(Diagnostic::error("Invalid function name format"));
    };
    let Some(name) = name_exp.as_symbol() else {
        return Err(Diagnostic::error("Function name must be a symbol"));
    };
    let Some(ret) = cg.types.borrow().parse_type_spec(ret_exp) else {
        return Err(Diagnostic::error(format!(
            "Invalid return type specification: {ret_exp}"
        )));
    };
    Ok((name.to_string(), ret))
}

fn parse_params<'ctx>(
    cg: &CodeGen<'ctx>,
    node: &Expr,
) -> DiagnosticResult<Vec<ParamInfo<'ctx>>> {
    let Some(items) = node.as_list() else {
        return Err(Diagnostic::error("Function parameters must be a list"));
    };

    let mut params = Vec::with_capacity(items.len());
    for item in items {
        let Some([name_exp, type_exp]) = item.as_list() else {
            return Err(Diagnostic::error("Invalid parameter syntax"));
        };
        let Some(name) = name_exp.as_symbol() else {
            return Err(Diagnostic::error("Parameter name must be a symbol"));
        };
        let Some(type_id) = cg.types.borrow().parse_type_spec(type_exp) else {
            return Err(Diagnostic::error(format!(
                "Unknown parameter type: {type_exp}"
            )));
        };
        let info = cg.type_info(type_id);
        let llvm_ty = match info.kind {
            // Struct parameters are passed as instance pointers
            TypeKind::Struct => cg.ptr_t.into(),
            _ => info.llvm.ok_or_else(|| {
                Diagnostic::error(format!("parameter {name} cannot have type {}", info.name))
            })?,
        };
        params.push(ParamInfo {
            name: name.to_string(),
            type_id,
            llvm_ty,
        });
    }
    Ok(params)
}

impl Generator for FunctionGenerator {
    fn name(&self) -> &'static str {
        "function"
    }

    fn priority(&self) -> i32 {
        200
    }

    fn accepts(&self, node: &Expr, _cg: &CodeGen<'_>) -> bool {
        node.is_form("defn")
    }

    fn lower<'ctx>(
        &self,
        node: &Expr,
        cg: &CodeGen<'ctx>,
        dispatcher: &Dispatcher,
    ) -> DiagnosticResult<Lowered<'ctx>> {
        let items = node.as_list().unwrap_or_default();
        if items.len() != 4 {
            return Err(Diagnostic::error("Invalid function definition syntax"));
        }

        let (func_name, return_type) = parse_typed_name(cg, &items[1])?;
        let params = parse_params(cg, &items[2])?;
        let body = &items[3];

        let ret_info = cg.type_info(return_type);
        let param_types: Vec<BasicMetadataTypeEnum<'ctx>> =
            params.iter().map(|p| p.llvm_ty.into()).collect();
        let fn_type = match ret_info.kind {
            TypeKind::Void => cg.context.void_type().fn_type(&param_types, false),
            TypeKind::Struct => cg.ptr_t.fn_type(&param_types, false),
            _ => ret_info
                .llvm
                .ok_or_else(|| {
                    Diagnostic::error(format!(
                        "function {func_name} cannot return {}",
                        ret_info.name
                    ))
                })?
                .fn_type(&param_types, false),
        };

        let function = cg.module.add_function(&func_name, fn_type, None);
        let fn_info = FnInfo {
            function,
            return_type,
            params: params.clone(),
            is_external: false,
        };

        // Bind in the enclosing frame before lowering the body so the
        // function can call itself and remains visible afterwards.
        cg.env.borrow_mut().bind_fn(&func_name, fn_info);

        let old_block = cg.builder.get_insert_block();
        let old_function = cg.current_function.replace(Some(function));

        let entry = cg.context.append_basic_block(function, "entry");
        cg.builder.position_at_end(entry);
        cg.env.borrow_mut().push_frame();

        for (index, param) in params.iter().enumerate() {
            let arg = function.get_nth_param(index as u32).ok_or_else(|| {
                Diagnostic::error(format!("missing argument {index} of {func_name}"))
            })?;

            let is_struct = cg.types.borrow().kind(param.type_id) == TypeKind::Struct;
            let storage: BasicValueEnum<'ctx> = if is_struct {
                // The incoming pointer is the instance itself
                arg
            } else {
                let alloca = cg.builder.build_alloca(param.llvm_ty, &param.name).map_err(
                    |_| Diagnostic::error(format!("failed to allocate parameter {}", param.name)),
                )?;
                cg.builder.build_store(alloca, arg).map_err(|_| {
                    Diagnostic::error(format!("failed to spill parameter {}", param.name))
                })?;
                alloca.into()
            };

            cg.env.borrow_mut().bind_var(
                &param.name,
                VarInfo {
                    storage,
                    llvm_ty: param.llvm_ty,
                    type_id: Some(param.type_id),
                    is_global: false,
                    name: param.name.clone(),
                },
            );
        }

        let result = dispatcher.lower(body, cg)?;

        if !cg.block_terminated() {
            match (ret_info.kind, result) {
                (TypeKind::Void, _) => {
                    cg.builder
                        .build_return(None)
                        .map_err(|_| Diagnostic::error("failed to emit return"))?;
                }
                (_, Some(value)) => {
                    let coerced = cg.coerce_value(
                        value,
                        &ret_info,
                        &format!("return of {func_name}"),
                    )?;
                    cg.builder
                        .build_return(Some(&coerced))
                        .map_err(|_| Diagnostic::error("failed to emit return"))?;
                }
                (_, None) => {
                    let null = match ret_info.kind {
                        TypeKind::Struct => cg.ptr_t.const_null().into(),
                        _ => ret_info
                            .llvm
                            .ok_or_else(|| Diagnostic::error("return type has no value"))?
                            .const_zero(),
                    };
                    cg.builder
                        .build_return(Some(&null))
                        .map_err(|_| Diagnostic::error("failed to emit return"))?;
                }
            }
        }

        cg.env.borrow_mut().pop_frame();
        cg.current_function.set(old_function);
        if let Some(block) = old_block {
            cg.builder.position_at_end(block);
        }

        Ok(None)
    }
}
