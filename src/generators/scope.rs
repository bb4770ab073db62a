//! Block forms: `scope`, `do`, and the generic-list catch-all.
//!
//! Both block forms push a lexical frame, lower children left to
//! right, pop the frame, and yield the last child's value. They differ
//! only in the default result when nothing produced a value: `scope`
//! yields i32 0, `do` yields i64 0 (retained for source-level
//! compatibility).

use crate::ast::Expr;
use crate::context::CodeGen;
use crate::diagnostics::DiagnosticResult;
use crate::dispatch::{Dispatcher, Generator, Lowered};

fn lower_block<'ctx>(
    items: &[Expr],
    cg: &CodeGen<'ctx>,
    dispatcher: &Dispatcher,
) -> DiagnosticResult<Lowered<'ctx>> {
    cg.env.borrow_mut().push_frame();

    let mut last = None;
    for child in &items[1..] {
        last = dispatcher.lower(child, cg)?;
    }

    cg.env.borrow_mut().pop_frame();
    Ok(last)
}

pub struct ScopeGenerator;

impl Generator for ScopeGenerator {
    fn name(&self) -> &'static str {
        "scope"
    }

    fn priority(&self) -> i32 {
        600
    }

    fn accepts(&self, node: &Expr, _cg: &CodeGen<'_>) -> bool {
        node.is_form("scope")
    }

    fn lower<'ctx>(
        &self,
        node: &Expr,
        cg: &CodeGen<'ctx>,
        dispatcher: &Dispatcher,
    ) -> DiagnosticResult<Lowered<'ctx>> {
        let items = node.as_list().unwrap_or_default();
        let last = lower_block(items, cg, dispatcher)?;
        Ok(last.or_else(|| Some(cg.i32_t.const_int(0, false).into())))
    }
}

pub struct DoGenerator;

impl Generator for DoGenerator {
    fn name(&self) -> &'static str {
        "do"
    }

    fn priority(&self) -> i32 {
        100
    }

    fn accepts(&self, node: &Expr, _cg: &CodeGen<'_>) -> bool {
        node.is_form("do")
    }

    fn lower<'ctx>(
        &self,
        node: &Expr,
        cg: &CodeGen<'ctx>,
        dispatcher: &Dispatcher,
    ) -> DiagnosticResult<Lowered<'ctx>> {
        let items = node.as_list().unwrap_or_default();
        if items.len() < 2 {
            return Ok(Some(cg.i64_t.const_int(0, false).into()));
        }
        let last = lower_block(items, cg, dispatcher)?;
        Ok(last.or_else(|| Some(cg.i64_t.const_int(0, false).into())))
    }
}

/// Catch-all for lists no other generator claims (empty lists, lists
/// headed by a non-symbol). Yields i64 0.
pub struct ListGenerator;

impl Generator for ListGenerator {
    fn name(&self) -> &'static str {
        "list"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn accepts(&self, node: &Expr, _cg: &CodeGen<'_>) -> bool {
        matches!(node, Expr::List(_))
    }

    fn lower<'ctx>(
        &self,
        _node: &Expr,
        cg: &CodeGen<'ctx>,
        _dispatcher: &Dispatcher,
    ) -> DiagnosticResult<Lowered<'ctx>> {
        Ok(Some(cg.i64_t.const_int(0, false).into()))
    }
}
