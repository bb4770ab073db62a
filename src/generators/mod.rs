//! The generator suite: one lowering rule per syntactic form family.
//!
//! Priorities encode form specificity. The full table, highest first:
//! literals 1000, defmodule 960, struct 950, struct-alloc 940, import
//! 930, moduleuse 920, symbol 900, module-aware call 880, new 860,
//! property ops 850, var/global 800, set 700, scope 600, arithmetic
//! 500, comparison 400, fprint/finput 300, call fallback 250, defn 200,
//! control flow 150, do 100, generic list 10. Generators sharing a
//! number have disjoint predicates.

pub mod arithmetic;
pub mod call;
pub mod comparison;
pub mod control_flow;
pub mod function;
pub mod io;
pub mod literals;
pub mod modules;
pub mod property;
pub mod scope;
pub mod set;
pub mod structs;
pub mod symbol;
pub mod variable;

use crate::dispatch::Dispatcher;

/// Registers the default generator set on a dispatcher.
pub fn register_default_generators(dispatcher: &mut Dispatcher) {
    dispatcher.register(Box::new(literals::NumberGenerator));
    dispatcher.register(Box::new(literals::FractionalGenerator));
    dispatcher.register(Box::new(literals::StringGenerator));
    dispatcher.register(Box::new(symbol::SymbolGenerator));
    dispatcher.register(Box::new(variable::VariableGenerator));
    dispatcher.register(Box::new(set::SetGenerator));
    dispatcher.register(Box::new(scope::ScopeGenerator));
    dispatcher.register(Box::new(scope::DoGenerator));
    dispatcher.register(Box::new(scope::ListGenerator));
    dispatcher.register(Box::new(arithmetic::ArithmeticGenerator));
    dispatcher.register(Box::new(comparison::ComparisonGenerator));
    dispatcher.register(Box::new(control_flow::ControlFlowGenerator));
    dispatcher.register(Box::new(function::FunctionGenerator));
    dispatcher.register(Box::new(call::FunctionCallGenerator));
    dispatcher.register(Box::new(call::ModuleCallGenerator));
    dispatcher.register(Box::new(structs::StructGenerator));
    dispatcher.register(Box::new(structs::StructAllocGenerator));
    dispatcher.register(Box::new(structs::NewGenerator));
    dispatcher.register(Box::new(property::PropertyGenerator));
    dispatcher.register(Box::new(io::PrintGenerator));
    dispatcher.register(Box::new(io::FinputGenerator));
    dispatcher.register(Box::new(modules::ModuleGenerator));
    dispatcher.register(Box::new(modules::ImportGenerator));
    dispatcher.register(Box::new(modules::ModuleUseGenerator));
}
