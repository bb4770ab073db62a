//! Structured control flow: `if`, `while`, `break`, `continue`.
//!
//! Both `if` arms and the `while` body lower inside a pushed lexical
//! frame. Fall-through jumps are only emitted when the current block
//! has not already been terminated by a nested branch. After `break`
//! and `continue` the builder is parked in a fresh continuation block
//! so sibling forms never append to a terminated block.

use inkwell::values::BasicValueEnum;

use crate::ast::Expr;
use crate::context::{CodeGen, LoopFrame};
use crate::diagnostics::{Diagnostic, DiagnosticResult};
use crate::dispatch::{Dispatcher, Generator, Lowered};

pub struct ControlFlowGenerator;

const KEYWORDS: &[&str] = &["if", "while", "break", "continue"];

impl Generator for ControlFlowGenerator {
    fn name(&self) -> &'static str {
        "control_flow"
    }

    fn priority(&self) -> i32 {
        150
    }

    fn accepts(&self, node: &Expr, _cg: &CodeGen<'_>) -> bool {
        node.head_symbol().is_some_and(|head| KEYWORDS.contains(&head))
    }

    fn lower<'ctx>(
        &self,
        node: &Expr,
        cg: &CodeGen<'ctx>,
        dispatcher: &Dispatcher,
    ) -> DiagnosticResult<Lowered<'ctx>> {
        let items = node.as_list().unwrap_or_default();
        match items[0].as_symbol().unwrap_or_default() {
            "if" => self.lower_if(items, cg, dispatcher),
            "while" => self.lower_while(items, cg, dispatcher),
            "break" => self.lower_break(cg),
            "continue" => self.lower_continue(cg),
            other => Err(Diagnostic::error(format!(
                "unknown control flow form: {other}"
            ))),
        }
    }
}

impl ControlFlowGenerator {
    fn lower_if<'ctx>(
        &self,
        items: &[Expr],
        cg: &CodeGen<'ctx>,
        dispatcher: &Dispatcher,
    ) -> DiagnosticResult<Lowered<'ctx>> {
        if items.len() < 3 || items.len() > 4 {
            return Err(Diagnostic::error(
                "if statement requires condition and then-branch",
            ));
        }
        let has_else = items.len() == 4;
        let function = cg.current_function()?;

        let cond_value = dispatcher
            .lower(&items[1], cg)?
            .ok_or_else(|| Diagnostic::error("if condition produced no value"))?;
        let cond = cg.to_condition_i1(cond_value)?;

        let then_bb = cg.context.append_basic_block(function, "if.then");
        let else_bb = has_else.then(|| cg.context.append_basic_block(function, "if.else"));
        let merge_bb = cg.context.append_basic_block(function, "if.end");

        // Block issuing the conditional branch; the merge PHI's null
        // edge comes from here when there is no else arm.
        let branch_bb = cg
            .builder
            .get_insert_block()
            .ok_or_else(|| Diagnostic::error("no insertion block for if"))?;
        cg.builder
            .build_conditional_branch(cond, then_bb, else_bb.unwrap_or(merge_bb))
            .map_err(|_| Diagnostic::error("failed to branch on if condition"))?;

        cg.builder.position_at_end(then_bb);
        cg.env.borrow_mut().push_frame();
        let then_result = dispatcher.lower(&items[2], cg)?;
        cg.env.borrow_mut().pop_frame();
        let then_terminated = cg.block_terminated();
        let then_end = cg.builder.get_insert_block();
        if !then_terminated {
            cg.builder
                .build_unconditional_branch(merge_bb)
                .map_err(|_| Diagnostic::error("failed to close then branch"))?;
        }

        let mut else_result = None;
        let mut else_terminated = false;
        let mut else_end = None;
        if let Some(else_bb) = else_bb {
            cg.builder.position_at_end(else_bb);
            cg.env.borrow_mut().push_frame();
            else_result = dispatcher.lower(&items[3], cg)?;
            cg.env.borrow_mut().pop_frame();
            else_terminated = cg.block_terminated();
            else_end = cg.builder.get_insert_block();
            if !else_terminated {
                cg.builder
                    .build_unconditional_branch(merge_bb)
                    .map_err(|_| Diagnostic::error("failed to close else branch"))?;
            }
        }

        cg.builder.position_at_end(merge_bb);

        // A PHI is only meaningful when the then-arm produced a value
        // and actually falls through to the merge block.
        if let (Some(then_value), false, Some(then_end)) =
            (then_result, then_terminated, then_end)
        {
            let result_ty = then_value.get_type();
            let phi = cg
                .builder
                .build_phi(result_ty, "if.result")
                .map_err(|_| Diagnostic::error("failed to build if result"))?;
            phi.add_incoming(&[(&then_value, then_end)]);

            let null: BasicValueEnum<'ctx> = result_ty.const_zero();
            if has_else {
                if !else_terminated
                    && let Some(else_end) = else_end
                {
                    match else_result {
                        Some(v) => phi.add_incoming(&[(&v, else_end)]),
                        None => phi.add_incoming(&[(&null, else_end)]),
                    }
                }
            } else {
                phi.add_incoming(&[(&null, branch_bb)]);
            }
            return Ok(Some(phi.as_basic_value()));
        }

        Ok(Some(cg.i32_t.const_int(0, false).into()))
    }

    fn lower_while<'ctx>(
        &self,
        items: &[Expr],
        cg: &CodeGen<'ctx>,
        dispatcher: &Dispatcher,
    ) -> DiagnosticResult<Lowered<'ctx>> {
        if items.len() != 3 {
            return Err(Diagnostic::error(
                "while statement requires condition and body",
            ));
        }
        let function = cg.current_function()?;

        let cond_bb = cg.context.append_basic_block(function, "while.cond");
        let body_bb = cg.context.append_basic_block(function, "while.body");
        let exit_bb = cg.context.append_basic_block(function, "while.end");

        cg.builder
            .build_unconditional_branch(cond_bb)
            .map_err(|_| Diagnostic::error("failed to enter while loop"))?;

        cg.builder.position_at_end(cond_bb);
        let cond_value = dispatcher
            .lower(&items[1], cg)?
            .ok_or_else(|| Diagnostic::error("while condition produced no value"))?;
        let cond = cg.to_condition_i1(cond_value)?;
        cg.builder
            .build_conditional_branch(cond, body_bb, exit_bb)
            .map_err(|_| Diagnostic::error("failed to branch on while condition"))?;

        cg.builder.position_at_end(body_bb);
        cg.loop_stack.borrow_mut().push(LoopFrame {
            condition_block: cond_bb,
            body_block: body_bb,
            continue_block: cond_bb,
            exit_block: exit_bb,
        });
        cg.env.borrow_mut().push_frame();

        dispatcher.lower(&items[2], cg)?;

        cg.env.borrow_mut().pop_frame();
        cg.loop_stack.borrow_mut().pop();

        // A body that does not terminate its block falls back to the
        // condition.
        cg.ensure_unconditional_branch(cond_bb);

        cg.builder.position_at_end(exit_bb);
        Ok(Some(cg.i32_t.const_int(0, false).into()))
    }

    fn lower_break<'ctx>(&self, cg: &CodeGen<'ctx>) -> DiagnosticResult<Lowered<'ctx>> {
        let target = cg
            .loop_stack
            .borrow()
            .last()
            .map(|frame| frame.exit_block);
        let Some(exit_block) = target else {
            return Err(Diagnostic::error("break statement outside loop"));
        };
        cg.builder
            .build_unconditional_branch(exit_block)
            .map_err(|_| Diagnostic::error("failed to emit break"))?;
        self.park_in_dead_block(cg, "break.cont")?;
        Ok(Some(cg.i32_t.const_int(0, false).into()))
    }

    fn lower_continue<'ctx>(&self, cg: &CodeGen<'ctx>) -> DiagnosticResult<Lowered<'ctx>> {
        let target = cg
            .loop_stack
            .borrow()
            .last()
            .map(|frame| frame.continue_block);
        let Some(continue_block) = target else {
            return Err(Diagnostic::error("continue statement outside loop"));
        };
        cg.builder
            .build_unconditional_branch(continue_block)
            .map_err(|_| Diagnostic::error("failed to emit continue"))?;
        self.park_in_dead_block(cg, "continue.cont")?;
        Ok(Some(cg.i32_t.const_int(0, false).into()))
    }

    /// Repositions the builder into a fresh unreachable block so forms
    /// following a branch do not append to a terminated block.
    fn park_in_dead_block<'ctx>(
        &self,
        cg: &CodeGen<'ctx>,
        name: &str,
    ) -> DiagnosticResult<()> {
        let function = cg.current_function()?;
        let dead = cg.context.append_basic_block(function, name);
        cg.builder.position_at_end(dead);
        Ok(())
    }
}
