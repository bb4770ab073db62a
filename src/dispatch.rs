//! Generator dispatch for the Galluz compiler.
//!
//! The dispatcher owns an ordered set of generators, each advertising a
//! predicate over AST nodes, a lowering routine, and a priority. Given
//! a node it selects the highest-priority generator whose predicate
//! accepts it and delegates lowering; this is the sole entry point for
//! recursive lowering. Priorities encode form specificity: whenever two
//! predicates can both match the same list, the more specific form
//! carries the strictly higher priority.
//!
//! Every dispatch also pushes the node onto a bounded traceback stack
//! (head symbol plus truncated printed form) which the driver appends
//! to fatal diagnostics.

use std::cell::RefCell;
use std::collections::VecDeque;

use inkwell::values::BasicValueEnum;

use crate::ast::Expr;
use crate::context::CodeGen;
use crate::diagnostics::{Diagnostic, DiagnosticResult};

/// The value produced by lowering a node; `None` for void-typed forms.
pub type Lowered<'ctx> = Option<BasicValueEnum<'ctx>>;

/// A lowering rule keyed to a syntactic form.
pub trait Generator {
    /// Name used in diagnostics and debug output.
    fn name(&self) -> &'static str;

    /// Position in the dispatch order; higher runs first.
    fn priority(&self) -> i32;

    /// Predicate deciding whether this generator lowers the node. The
    /// context is available because some predicates consult compiler
    /// state (the module-aware call dispatch checks loaded modules).
    fn accepts(&self, node: &Expr, cg: &CodeGen<'_>) -> bool;

    /// Lowers the node, recursing through the dispatcher for children.
    fn lower<'ctx>(
        &self,
        node: &Expr,
        cg: &CodeGen<'ctx>,
        dispatcher: &Dispatcher,
    ) -> DiagnosticResult<Lowered<'ctx>>;
}

/// Maximum retained traceback entries; oldest are evicted.
const TRACEBACK_DEPTH: usize = 32;

/// Entries shown when a fatal diagnostic is reported.
const TRACEBACK_NOTE_ENTRIES: usize = 6;

#[derive(Default)]
struct Traceback {
    entries: VecDeque<(String, String)>,
}

impl Traceback {
    fn push(&mut self, node: &Expr) {
        let context = match node {
            Expr::List(items) => items
                .first()
                .and_then(Expr::as_symbol)
                .unwrap_or("list")
                .to_string(),
            other => other.tag_name().to_string(),
        };
        if self.entries.len() == TRACEBACK_DEPTH {
            self.entries.pop_front();
        }
        self.entries.push_back((context, node.display_truncated()));
    }

    fn tail_note(&self) -> Option<String> {
        if self.entries.is_empty() {
            return None;
        }
        let lines: Vec<String> = self
            .entries
            .iter()
            .rev()
            .take(TRACEBACK_NOTE_ENTRIES)
            .map(|(context, printed)| format!("in {context}: {printed}"))
            .collect();
        Some(lines.join("\n      "))
    }
}

/// Priority-ordered generator registry.
#[derive(Default)]
pub struct Dispatcher {
    generators: Vec<Box<dyn Generator>>,
    traceback: RefCell<Traceback>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Dispatcher::default()
    }

    /// Registers a generator, keeping the set sorted by descending
    /// priority.
    pub fn register(&mut self, generator: Box<dyn Generator>) {
        self.generators.push(generator);
        self.generators.sort_by_key(|g| std::cmp::Reverse(g.priority()));
    }

    pub fn generator_count(&self) -> usize {
        self.generators.len()
    }

    /// Lowers a node through the first-accepting generator. Failing to
    /// find one is a fatal dispatch error reporting the node's tag.
    pub fn lower<'ctx>(
        &self,
        node: &Expr,
        cg: &CodeGen<'ctx>,
    ) -> DiagnosticResult<Lowered<'ctx>> {
        self.traceback.borrow_mut().push(node);

        for generator in &self.generators {
            if generator.accepts(node, cg) {
                return generator.lower(node, cg, self);
            }
        }

        Err(Diagnostic::error(format!(
            "no generator accepts {} node: {}",
            node.tag_name(),
            node.display_truncated()
        )))
    }

    /// The tail of the traceback stack, formatted for a diagnostic
    /// note.
    pub fn traceback_note(&self) -> Option<String> {
        self.traceback.borrow().tail_note()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub {
        name: &'static str,
        priority: i32,
        head: &'static str,
    }

    impl Generator for Stub {
        fn name(&self) -> &'static str {
            self.name
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        fn accepts(&self, node: &Expr, _cg: &CodeGen<'_>) -> bool {
            node.is_form(self.head)
        }
        fn lower<'ctx>(
            &self,
            _node: &Expr,
            cg: &CodeGen<'ctx>,
            _dispatcher: &Dispatcher,
        ) -> DiagnosticResult<Lowered<'ctx>> {
            Ok(Some(cg.i64_t.const_int(self.priority as u64, false).into()))
        }
    }

    #[test]
    fn highest_priority_accepting_generator_wins() {
        let context = inkwell::context::Context::create();
        let cg = CodeGen::new(&context, "dispatch_test", std::path::PathBuf::from("."));
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(Box::new(Stub {
            name: "low",
            priority: 10,
            head: "x",
        }));
        dispatcher.register(Box::new(Stub {
            name: "high",
            priority: 600,
            head: "x",
        }));

        let node = Expr::List(vec![Expr::Symbol("x".into())]);
        let value = dispatcher.lower(&node, &cg).unwrap().unwrap();
        assert_eq!(
            value.into_int_value().get_zero_extended_constant(),
            Some(600)
        );
    }

    #[test]
    fn dispatch_failure_reports_node_tag() {
        let context = inkwell::context::Context::create();
        let cg = CodeGen::new(&context, "dispatch_test", std::path::PathBuf::from("."));
        let dispatcher = Dispatcher::new();
        let err = dispatcher.lower(&Expr::Number(1), &cg).unwrap_err();
        assert!(err.message.contains("number"));
    }

    #[test]
    fn traceback_records_head_symbols() {
        let context = inkwell::context::Context::create();
        let cg = CodeGen::new(&context, "dispatch_test", std::path::PathBuf::from("."));
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(Box::new(Stub {
            name: "x",
            priority: 1,
            head: "x",
        }));
        let node = Expr::List(vec![Expr::Symbol("x".into()), Expr::Number(1)]);
        let _ = dispatcher.lower(&node, &cg);
        let note = dispatcher.traceback_note().unwrap();
        assert!(note.contains("in x: (x 1)"));
    }
}
