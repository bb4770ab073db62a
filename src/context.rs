//! Compilation context for the Galluz compiler.
//!
//! This module provides the `CodeGen` structure which holds the LLVM
//! `Context`, `Module`, `Builder`, cached primitive type handles, and
//! the mutable lowering state: the lexical environment, the loop-frame
//! stack, the globals map, the module manager, and the string-literal
//! intern table. Mutable state lives behind `RefCell`/`Cell` so that
//! lowering routines can share the context by reference while the
//! dispatcher recurses.
//!
//! The builder is treated as a cursor machine: generators that create
//! functions save and restore the insertion point, and anything that
//! emits a terminator goes through `ensure_unconditional_branch` /
//! `block_terminated` before adding fall-through jumps.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::PathBuf;

use inkwell::AddressSpace;
use inkwell::basic_block::BasicBlock;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::types::{BasicTypeEnum, FloatType, FunctionType, IntType, PointerType};
use inkwell::values::{
    BasicValueEnum, FunctionValue, GlobalValue, IntValue, PointerValue,
};
use inkwell::{FloatPredicate, IntPredicate};

use crate::diagnostics::{Diagnostic, DiagnosticResult};
use crate::modules::ModuleManager;
use crate::types::{TypeId, TypeInfo, TypeKind, TypeRegistry};

/// A bound variable: its storage handle, lowered type, declared type
/// descriptor, and linkage class.
///
/// For non-struct variables the storage handle is an address (alloca or
/// global) that loads and stores go through; for struct variables it is
/// the pointer to the aggregate itself.
#[derive(Clone)]
pub struct VarInfo<'ctx> {
    pub storage: BasicValueEnum<'ctx>,
    pub llvm_ty: BasicTypeEnum<'ctx>,
    pub type_id: Option<TypeId>,
    pub is_global: bool,
    pub name: String,
}

#[derive(Clone)]
pub struct ParamInfo<'ctx> {
    pub name: String,
    pub type_id: TypeId,
    pub llvm_ty: BasicTypeEnum<'ctx>,
}

/// A bound function: IR handle, return type, and ordered parameters.
#[derive(Clone)]
pub struct FnInfo<'ctx> {
    pub function: FunctionValue<'ctx>,
    pub return_type: TypeId,
    pub params: Vec<ParamInfo<'ctx>>,
    pub is_external: bool,
}

/// One lexical scope's bindings.
#[derive(Default)]
pub struct Frame<'ctx> {
    vars: HashMap<String, VarInfo<'ctx>>,
    fns: HashMap<String, FnInfo<'ctx>>,
}

/// Stack of lexical frames. The root frame is created on construction
/// and never popped; lookup walks frames inside-out and binding always
/// writes to the innermost frame.
pub struct Environment<'ctx> {
    frames: Vec<Frame<'ctx>>,
}

impl<'ctx> Environment<'ctx> {
    pub fn new() -> Self {
        Environment {
            frames: vec![Frame::default()],
        }
    }

    pub fn push_frame(&mut self) {
        self.frames.push(Frame::default());
    }

    pub fn pop_frame(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Binds a variable in the innermost frame, replacing any prior
    /// binding of the same name in that frame.
    pub fn bind_var(&mut self, name: &str, info: VarInfo<'ctx>) {
        if let Some(frame) = self.frames.last_mut() {
            frame.vars.insert(name.to_string(), info);
        }
    }

    pub fn bind_fn(&mut self, name: &str, info: FnInfo<'ctx>) {
        if let Some(frame) = self.frames.last_mut() {
            frame.fns.insert(name.to_string(), info);
        }
    }

    pub fn lookup_var(&self, name: &str) -> Option<VarInfo<'ctx>> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.vars.get(name).cloned())
    }

    pub fn lookup_fn(&self, name: &str) -> Option<FnInfo<'ctx>> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.fns.get(name).cloned())
    }

    /// Reverse lookup from a storage handle to the variable bound to
    /// it, used by property access on struct pointers.
    pub fn lookup_var_by_storage(&self, value: BasicValueEnum<'ctx>) -> Option<VarInfo<'ctx>> {
        self.frames.iter().rev().find_map(|frame| {
            frame
                .vars
                .values()
                .find(|var| var.storage == value)
                .cloned()
        })
    }

    /// Replaces the storage handle of an existing binding, walking
    /// frames inside-out. Returns false when the name is unbound.
    pub fn update_var_value(&mut self, name: &str, value: BasicValueEnum<'ctx>) -> bool {
        for frame in self.frames.iter_mut().rev() {
            if let Some(var) = frame.vars.get_mut(name) {
                var.storage = value;
                return true;
            }
        }
        false
    }
}

impl<'ctx> Default for Environment<'ctx> {
    fn default() -> Self {
        Self::new()
    }
}

/// Loop targets consulted by `break` and `continue`.
#[derive(Clone, Copy)]
pub struct LoopFrame<'ctx> {
    pub condition_block: BasicBlock<'ctx>,
    pub body_block: BasicBlock<'ctx>,
    pub continue_block: BasicBlock<'ctx>,
    pub exit_block: BasicBlock<'ctx>,
}

/// A module-level global together with its value type. The value type
/// is tracked here because opaque pointers make it unrecoverable from
/// the global handle alone.
#[derive(Clone)]
pub struct GlobalBinding<'ctx> {
    pub value: GlobalValue<'ctx>,
    pub ty: BasicTypeEnum<'ctx>,
}

/// Main code generation context holding LLVM state and lowering state.
///
/// See module-level documentation for the architecture overview.
pub struct CodeGen<'ctx> {
    /// LLVM context
    pub context: &'ctx Context,
    /// LLVM module being generated
    pub module: Module<'ctx>,
    /// LLVM IR builder
    pub builder: Builder<'ctx>,
    /// Cached LLVM type: i64
    pub i64_t: IntType<'ctx>,
    /// Cached LLVM type: i32
    pub i32_t: IntType<'ctx>,
    /// Cached LLVM type: i8
    pub i8_t: IntType<'ctx>,
    /// Cached LLVM type: bool (i1)
    pub bool_t: IntType<'ctx>,
    /// Cached LLVM type: f64
    pub f64_t: FloatType<'ctx>,
    /// Cached LLVM type: opaque pointer
    pub ptr_t: PointerType<'ctx>,
    /// Function currently receiving instructions
    pub current_function: Cell<Option<FunctionValue<'ctx>>>,
    /// Type registry for this unit
    pub types: RefCell<TypeRegistry<'ctx>>,
    /// Lexical environment
    pub env: RefCell<Environment<'ctx>>,
    /// Stack of active loop frames for break/continue
    pub loop_stack: RefCell<Vec<LoopFrame<'ctx>>>,
    /// Module-level globals by name
    pub globals: RefCell<HashMap<String, GlobalBinding<'ctx>>>,
    /// Module loader and cross-file resolver
    pub modules: RefCell<ModuleManager<'ctx>>,
    /// Next unique string literal ID
    pub next_str_id: Cell<u32>,
    /// Cached string literal pointers
    pub string_literals: RefCell<HashMap<String, PointerValue<'ctx>>>,
}

impl<'ctx> CodeGen<'ctx> {
    pub fn new(context: &'ctx Context, module_name: &str, current_dir: PathBuf) -> Self {
        let module = context.create_module(module_name);
        let builder = context.create_builder();
        CodeGen {
            context,
            module,
            builder,
            i64_t: context.i64_type(),
            i32_t: context.i32_type(),
            i8_t: context.i8_type(),
            bool_t: context.bool_type(),
            f64_t: context.f64_type(),
            ptr_t: context.i8_type().ptr_type(AddressSpace::default()),
            current_function: Cell::new(None),
            types: RefCell::new(TypeRegistry::new(context)),
            env: RefCell::new(Environment::new()),
            loop_stack: RefCell::new(Vec::new()),
            globals: RefCell::new(HashMap::new()),
            modules: RefCell::new(ModuleManager::new(current_dir)),
            next_str_id: Cell::new(0),
            string_literals: RefCell::new(HashMap::new()),
        }
    }

    pub fn current_function(&self) -> DiagnosticResult<FunctionValue<'ctx>> {
        self.current_function
            .get()
            .ok_or_else(|| Diagnostic::error("no current function for code emission"))
    }

    /// Clones a type descriptor out of the registry.
    pub fn type_info(&self, id: TypeId) -> TypeInfo<'ctx> {
        self.types.borrow().info(id).clone()
    }

    /// True when the variable's declared type is a struct.
    pub fn is_struct_var(&self, var: &VarInfo<'ctx>) -> bool {
        var.type_id
            .is_some_and(|id| self.types.borrow().kind(id) == TypeKind::Struct)
    }

    /// Returns the named external function, declaring it on first use.
    pub fn runtime_function(
        &self,
        name: &str,
        fn_type: FunctionType<'ctx>,
    ) -> FunctionValue<'ctx> {
        self.module
            .get_function(name)
            .unwrap_or_else(|| self.module.add_function(name, fn_type, None))
    }

    /// Returns the named external global (e.g. `stdin`), declaring it
    /// on first use. External globals carry no initializer.
    pub fn extern_global(&self, name: &str, ty: BasicTypeEnum<'ctx>) -> GlobalValue<'ctx> {
        self.module
            .get_global(name)
            .unwrap_or_else(|| self.module.add_global(ty, None, name))
    }

    /// Interns a string literal as a module-level constant and returns
    /// the pointer to its data. Identical literals share one global.
    /// The caller passes the escape-processed text.
    pub fn intern_string_literal(&self, s: &str) -> DiagnosticResult<PointerValue<'ctx>> {
        if let Some(ptr) = self.string_literals.borrow().get(s) {
            return Ok(*ptr);
        }

        let id = self.next_str_id.get();
        self.next_str_id.set(id.wrapping_add(1));
        let name = format!(".str.{id}");
        let gv = self
            .builder
            .build_global_string_ptr(s, &name)
            .map_err(|_| Diagnostic::error("failed to intern string literal"))?;
        let ptr = gv.as_pointer_value();
        self.string_literals
            .borrow_mut()
            .insert(s.to_string(), ptr);
        Ok(ptr)
    }

    /// True when the current insertion block already ends in a
    /// terminator.
    pub fn block_terminated(&self) -> bool {
        self.builder
            .get_insert_block()
            .is_some_and(|bb| bb.get_terminator().is_some())
    }

    /// Emits an unconditional branch to `bb` only if the current block
    /// does not already have a terminator. Guards against duplicate
    /// branch instructions when lowering constructs that may have
    /// branched earlier.
    pub fn ensure_unconditional_branch(&self, bb: BasicBlock<'ctx>) {
        if let Some(cur) = self.builder.get_insert_block()
            && cur.get_terminator().is_none()
        {
            let _ = self.builder.build_unconditional_branch(bb);
        }
    }

    /// Coerces a value to an i1 condition: integers compare against
    /// zero, floats against 0.0.
    pub fn to_condition_i1(&self, value: BasicValueEnum<'ctx>) -> DiagnosticResult<IntValue<'ctx>> {
        match value {
            BasicValueEnum::IntValue(v) if v.get_type().get_bit_width() == 1 => Ok(v),
            BasicValueEnum::IntValue(v) => self
                .builder
                .build_int_compare(IntPredicate::NE, v, v.get_type().const_zero(), "cond")
                .map_err(|_| Diagnostic::error("failed to build condition compare")),
            BasicValueEnum::FloatValue(v) => self
                .builder
                .build_float_compare(
                    FloatPredicate::ONE,
                    v,
                    v.get_type().const_zero(),
                    "cond",
                )
                .map_err(|_| Diagnostic::error("failed to build condition compare")),
            other => Err(Diagnostic::error(format!(
                "condition must be numeric, got {:?}",
                other.get_type()
            ))),
        }
    }

    /// Applies the implicit coercion rules to make `value` fit the
    /// expected type. Used for variable binds with annotation, `set`,
    /// function arguments and returns, and struct field stores.
    pub fn coerce_value(
        &self,
        value: BasicValueEnum<'ctx>,
        expected: &TypeInfo<'ctx>,
        what: &str,
    ) -> DiagnosticResult<BasicValueEnum<'ctx>> {
        if expected.kind == TypeKind::Unknown {
            // `auto` accepts whatever the value already is
            return Ok(value);
        }

        let Some(expected_llvm) = expected.llvm else {
            return Err(Diagnostic::error(format!(
                "cannot coerce a value to {} in {what}",
                expected.name
            )));
        };

        if value.get_type() == expected_llvm {
            return Ok(value);
        }

        let mismatch = || {
            Diagnostic::error(format!(
                "type mismatch in {what}: expected {}, got {:?}",
                expected.name,
                value.get_type()
            ))
        };
        let build_failed = || Diagnostic::error(format!("failed to build coercion in {what}"));

        match (expected.kind, value) {
            (TypeKind::Struct, BasicValueEnum::PointerValue(_)) => Ok(value),
            (TypeKind::Int, BasicValueEnum::IntValue(v)) => self
                .builder
                .build_int_cast_sign_flag(v, expected_llvm.into_int_type(), true, "int.cast")
                .map(Into::into)
                .map_err(|_| build_failed()),
            (TypeKind::Int, BasicValueEnum::FloatValue(v)) => self
                .builder
                .build_float_to_signed_int(v, expected_llvm.into_int_type(), "fp.to.int")
                .map(Into::into)
                .map_err(|_| build_failed()),
            (TypeKind::Double, BasicValueEnum::FloatValue(v)) => self
                .builder
                .build_float_cast(v, expected_llvm.into_float_type(), "fp.cast")
                .map(Into::into)
                .map_err(|_| build_failed()),
            (TypeKind::Double, BasicValueEnum::IntValue(v)) => self
                .builder
                .build_signed_int_to_float(v, expected_llvm.into_float_type(), "int.to.fp")
                .map(Into::into)
                .map_err(|_| build_failed()),
            (TypeKind::Bool, BasicValueEnum::IntValue(v)) => self
                .builder
                .build_int_cast_sign_flag(v, self.bool_t, false, "bool.cast")
                .map(Into::into)
                .map_err(|_| build_failed()),
            _ => Err(mismatch()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_var<'ctx>(cg: &CodeGen<'ctx>, name: &str) -> VarInfo<'ctx> {
        VarInfo {
            storage: cg.i64_t.const_int(7, false).into(),
            llvm_ty: cg.i64_t.into(),
            type_id: cg.types.borrow().get("int"),
            is_global: false,
            name: name.to_string(),
        }
    }

    #[test]
    fn bindings_shadow_across_frames_and_restore_on_pop() {
        let context = Context::create();
        let cg = CodeGen::new(&context, "env_test", PathBuf::from("."));
        let mut env = Environment::new();

        let outer = dummy_var(&cg, "x");
        env.bind_var("x", outer);
        env.push_frame();
        let mut inner = dummy_var(&cg, "x");
        inner.is_global = true; // marker to tell the bindings apart
        env.bind_var("x", inner);

        assert!(env.lookup_var("x").unwrap().is_global);
        env.pop_frame();
        assert!(!env.lookup_var("x").unwrap().is_global);
    }

    #[test]
    fn scope_purity_names_die_with_their_frame() {
        let context = Context::create();
        let cg = CodeGen::new(&context, "env_test", PathBuf::from("."));
        let mut env = Environment::new();

        env.push_frame();
        env.bind_var("tmp", dummy_var(&cg, "tmp"));
        assert!(env.lookup_var("tmp").is_some());
        env.pop_frame();
        assert!(env.lookup_var("tmp").is_none());
    }

    #[test]
    fn root_frame_survives_extra_pops() {
        let context = Context::create();
        let cg = CodeGen::new(&context, "env_test", PathBuf::from("."));
        let mut env = Environment::new();
        env.bind_var("root", dummy_var(&cg, "root"));
        env.pop_frame();
        env.pop_frame();
        assert_eq!(env.depth(), 1);
        assert!(env.lookup_var("root").is_some());
    }

    #[test]
    fn storage_reverse_lookup_finds_binding() {
        let context = Context::create();
        let cg = CodeGen::new(&context, "env_test", PathBuf::from("."));
        let mut env = Environment::new();
        let var = dummy_var(&cg, "p");
        let storage = var.storage;
        env.bind_var("p", var);
        assert_eq!(env.lookup_var_by_storage(storage).unwrap().name, "p");
    }
}
