//! Arithmetic lowering: variadic `+ - * / %` with left-to-right folds.
//!
//! Unary `+` is identity and unary `-` negates. When both operands of
//! a step are integers the integer ops are used (`/` is signed
//! division, `%` signed remainder); otherwise both sides are promoted
//! to double and the floating ops are used. `%` on floats is fatal.

use inkwell::values::{BasicValueEnum, FloatValue, IntValue};

use crate::ast::Expr;
use crate::context::CodeGen;
use crate::diagnostics::{Diagnostic, DiagnosticResult};
use crate::dispatch::{Dispatcher, Generator, Lowered};

pub struct ArithmeticGenerator;

const OPS: &[&str] = &["+", "-", "*", "/", "%"];

fn promote_to_double<'ctx>(
    cg: &CodeGen<'ctx>,
    value: BasicValueEnum<'ctx>,
) -> DiagnosticResult<FloatValue<'ctx>> {
    match value {
        BasicValueEnum::FloatValue(v) => Ok(v),
        BasicValueEnum::IntValue(v) => cg
            .builder
            .build_signed_int_to_float(v, cg.f64_t, "promote")
            .map_err(|_| Diagnostic::error("failed to promote operand to double")),
        _ => Err(Diagnostic::error("arithmetic on a non-numeric value")),
    }
}

/// Widens mismatched integer operands to a common width, following the
/// sign-extension rule used by every other integer coercion.
fn unify_int_widths<'ctx>(
    cg: &CodeGen<'ctx>,
    left: IntValue<'ctx>,
    right: IntValue<'ctx>,
) -> DiagnosticResult<(IntValue<'ctx>, IntValue<'ctx>)> {
    let lw = left.get_type().get_bit_width();
    let rw = right.get_type().get_bit_width();
    if lw == rw {
        return Ok((left, right));
    }
    let widen = |v: IntValue<'ctx>, to| {
        cg.builder
            .build_int_cast_sign_flag(v, to, true, "widen")
            .map_err(|_| Diagnostic::error("failed to widen integer operand"))
    };
    if lw < rw {
        Ok((widen(left, right.get_type())?, right))
    } else {
        Ok((left, widen(right, left.get_type())?))
    }
}

impl Generator for ArithmeticGenerator {
    fn name(&self) -> &'static str {
        "arithmetic"
    }

    fn priority(&self) -> i32 {
        500
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
        if items.len() < 2 {
            return Err(Diagnostic::error(
                "Arithmetic operation requires at least one operand",
            ));
        }
        let op = items[0].as_symbol().unwrap_or_default();

        let mut operands = Vec::with_capacity(items.len() - 1);
        for child in &items[1..] {
            let value = dispatcher.lower(child, cg)?.ok_or_else(|| {
                Diagnostic::error("arithmetic operand produced no value")
            })?;
            operands.push(value);
        }

        if operands.len() == 1 {
            return self.lower_unary(cg, op, operands[0]).map(Some);
        }

        let mut result = operands[0];
        for &rhs in &operands[1..] {
            result = self.lower_binary(cg, op, result, rhs)?;
        }
        Ok(Some(result))
    }
}

impl ArithmeticGenerator {
    fn lower_unary<'ctx>(
        &self,
        cg: &CodeGen<'ctx>,
        op: &str,
        operand: BasicValueEnum<'ctx>,
    ) -> DiagnosticResult<BasicValueEnum<'ctx>> {
        if op != "-" {
            return Ok(operand);
        }
        match operand {
            BasicValueEnum::IntValue(v) => cg
                .builder
                .build_int_neg(v, "neg")
                .map(Into::into)
                .map_err(|_| Diagnostic::error("failed to negate operand")),
            BasicValueEnum::FloatValue(v) => cg
                .builder
                .build_float_neg(v, "fneg")
                .map(Into::into)
                .map_err(|_| Diagnostic::error("failed to negate operand")),
            _ => Err(Diagnostic::error("arithmetic on a non-numeric value")),
        }
    }

    fn lower_binary<'ctx>(
        &self,
        cg: &CodeGen<'ctx>,
        op: &str,
        left: BasicValueEnum<'ctx>,
        right: BasicValueEnum<'ctx>,
    ) -> DiagnosticResult<BasicValueEnum<'ctx>> {
        let failed = || Diagnostic::error(format!("failed to build arithmetic op: {op}"));

        if let (BasicValueEnum::IntValue(l), BasicValueEnum::IntValue(r)) = (left, right) {
            let (l, r) = unify_int_widths(cg, l, r)?;
            let b = &cg.builder;
            let result = match op {
                "+" => b.build_int_add(l, r, "add"),
                "-" => b.build_int_sub(l, r, "sub"),
                "*" => b.build_int_mul(l, r, "mul"),
                "/" => b.build_int_signed_div(l, r, "div"),
                "%" => b.build_int_signed_rem(l, r, "rem"),
                _ => return Err(Diagnostic::error(format!("unknown operator: {op}"))),
            };
            return result.map(Into::into).map_err(|_| failed());
        }

        if op == "%" {
            return Err(Diagnostic::error(
                "Modulo operation not supported for floating point",
            ));
        }

        let l = promote_to_double(cg, left)?;
        let r = promote_to_double(cg, right)?;
        let b = &cg.builder;
        let result = match op {
            "+" => b.build_float_add(l, r, "fadd"),
            "-" => b.build_float_sub(l, r, "fsub"),
            "*" => b.build_float_mul(l, r, "fmul"),
            "/" => b.build_float_div(l, r, "fdiv"),
            _ => return Err(Diagnostic::error(format!("unknown operator: {op}"))),
        };
        result.map(Into::into).map_err(|_| failed())
    }
}
