//! Comparison lowering: strictly binary `> < >= <= == !=`.
//!
//! Two integer operands use signed integer predicates; any floating
//! operand promotes both sides to double and uses ordered predicates.
//! The i1 result is zero-extended to i64 so comparisons compose with
//! arithmetic.

use inkwell::values::BasicValueEnum;
use inkwell::{FloatPredicate, IntPredicate};

use crate::ast::Expr;
use crate::context::CodeGen;
use crate::diagnostics::{Diagnostic, DiagnosticResult};
use crate::dispatch::{Dispatcher, Generator, Lowered};

pub struct ComparisonGenerator;

const OPS: &[&str] = &[">", "<", ">=", "<=", "==", "!="];

impl Generator for ComparisonGenerator {
    fn name(&self) -> &'static str {
        "comparison"
    }

    fn priority(&self) -> i32 {
        400
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
        if items.len() != 3 {
            return Err(Diagnostic::error(
                "Comparison operation requires exactly two operands",
            ));
        }
        let op = items[0].as_symbol().unwrap_or_default();

        let lower_operand = |child| {
            dispatcher.lower(child, cg)?.ok_or_else(|| {
                Diagnostic::error("comparison operand produced no value")
            })
        };
        let left = lower_operand(&items[1])?;
        let right = lower_operand(&items[2])?;

        let failed = || Diagnostic::error(format!("failed to build comparison: {op}"));

        let flag = if let (BasicValueEnum::IntValue(l), BasicValueEnum::IntValue(r)) =
            (left, right)
        {
            let (l, r) = unify(cg, l, r)?;
            let predicate = match op {
                ">" => IntPredicate::SGT,
                "<" => IntPredicate::SLT,
                ">=" => IntPredicate::SGE,
                "<=" => IntPredicate::SLE,
                "==" => IntPredicate::EQ,
                "!=" => IntPredicate::NE,
                _ => return Err(Diagnostic::error(format!("unknown comparison: {op}"))),
            };
            cg.builder
                .build_int_compare(predicate, l, r, "cmp")
                .map_err(|_| failed())?
        } else {
            let l = to_double(cg, left)?;
            let r = to_double(cg, right)?;
            let predicate = match op {
                ">" => FloatPredicate::OGT,
                "<" => FloatPredicate::OLT,
                ">=" => FloatPredicate::OGE,
                "<=" => FloatPredicate::OLE,
                "==" => FloatPredicate::OEQ,
                "!=" => FloatPredicate::ONE,
                _ => return Err(Diagnostic::error(format!("unknown comparison: {op}"))),
            };
            cg.builder
                .build_float_compare(predicate, l, r, "fcmp")
                .map_err(|_| failed())?
        };

        let lifted = cg
            .builder
            .build_int_z_extend(flag, cg.i64_t, "cmp.i64")
            .map_err(|_| failed())?;
        Ok(Some(lifted.into()))
    }
}

fn unify<'ctx>(
    cg: &CodeGen<'ctx>,
    left: inkwell::values::IntValue<'ctx>,
    right: inkwell::values::IntValue<'ctx>,
) -> DiagnosticResult<(inkwell::values::IntValue<'ctx>, inkwell::values::IntValue<'ctx>)> {
    let lw = left.get_type().get_bit_width();
    let rw = right.get_type().get_bit_width();
    if lw == rw {
        return Ok((left, right));
    }
    let widen = |v, to| {
        cg.builder
            .build_int_cast_sign_flag(v, to, true, "widen")
            .map_err(|_| Diagnostic::error("failed to widen comparison operand"))
    };
    if lw < rw {
        Ok((widen(left, right.get_type())?, right))
    } else {
        Ok((left, widen(right, left.get_type())?))
    }
}

fn to_double<'ctx>(
    cg: &CodeGen<'ctx>,
    value: BasicValueEnum<'ctx>,
) -> DiagnosticResult<inkwell::values::FloatValue<'ctx>> {
    match value {
        BasicValueEnum::FloatValue(v) => Ok(v),
        BasicValueEnum::IntValue(v) => cg
            .builder
            .build_signed_int_to_float(v, cg.f64_t, "promote")
            .map_err(|_| Diagnostic::error("failed to promote comparison operand")),
        _ => Err(Diagnostic::error("comparison on a non-numeric value")),
    }
}
