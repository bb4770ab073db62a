//! Literal lowering: integers to i64, fractionals to f64, strings to
//! interned global constants.

use crate::ast::Expr;
use crate::context::CodeGen;
use crate::diagnostics::{Diagnostic, DiagnosticResult};
use crate::dispatch::{Dispatcher, Generator, Lowered};
use crate::preprocess;

pub struct NumberGenerator;

impl Generator for NumberGenerator {
    fn name(&self) -> &'static str {
        "number"
    }

    fn priority(&self) -> i32 {
        1000
    }

    fn accepts(&self, node: &Expr, _cg: &CodeGen<'_>) -> bool {
        matches!(node, Expr::Number(_))
    }

    fn lower<'ctx>(
        &self,
        node: &Expr,
        cg: &CodeGen<'ctx>,
        _dispatcher: &Dispatcher,
    ) -> DiagnosticResult<Lowered<'ctx>> {
        let Expr::Number(n) = node else {
            return Err(Diagnostic::error("number generator got a non-number"));
        };
        Ok(Some(cg.i64_t.const_int(*n as u64, false).into()))
    }
}

pub struct FractionalGenerator;

impl Generator for FractionalGenerator {
    fn name(&self) -> &'static str {
        "fractional"
    }

    fn priority(&self) -> i32 {
        1000
    }

    fn accepts(&self, node: &Expr, _cg: &CodeGen<'_>) -> bool {
        matches!(node, Expr::Fractional(_))
    }

    fn lower<'ctx>(
        &self,
        node: &Expr,
        cg: &CodeGen<'ctx>,
        _dispatcher: &Dispatcher,
    ) -> DiagnosticResult<Lowered<'ctx>> {
        let Expr::Fractional(x) = node else {
            return Err(Diagnostic::error(
                "fractional generator got a non-fractional",
            ));
        };
        Ok(Some(cg.f64_t.const_float(*x).into()))
    }
}

pub struct StringGenerator;

impl Generator for StringGenerator {
    fn name(&self) -> &'static str {
        "string"
    }

    fn priority(&self) -> i32 {
        1000
    }

    fn accepts(&self, node: &Expr, _cg: &CodeGen<'_>) -> bool {
        matches!(node, Expr::Str(_))
    }

    fn lower<'ctx>(
        &self,
        node: &Expr,
        cg: &CodeGen<'ctx>,
        _dispatcher: &Dispatcher,
    ) -> DiagnosticResult<Lowered<'ctx>> {
        let Expr::Str(raw) = node else {
            return Err(Diagnostic::error("string generator got a non-string"));
        };
        let processed = preprocess::postprocess_string(raw);
        let ptr = cg.intern_string_literal(&processed)?;
        Ok(Some(ptr.into()))
    }
}
