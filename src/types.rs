//! Type registry for the Galluz compiler.
//!
//! Names map to type descriptors: the six primitive kinds plus user
//! structs. Struct descriptors and their back-references are
//! represented as indices (`TypeId` / `StructId`) into the registry's
//! arenas rather than pointers, so descriptors stay valid as the
//! registry grows. The registry lives for one compilation unit.

use std::collections::HashMap;

use inkwell::AddressSpace;
use inkwell::context::Context;
use inkwell::types::{BasicTypeEnum, StructType};

use crate::ast::Expr;
use crate::diagnostics::{Diagnostic, DiagnosticResult};

/// Primitive and aggregate type kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Int,
    Double,
    String,
    Bool,
    Void,
    Struct,
    Unknown,
}

/// Index of a type descriptor in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(usize);

/// Index of a struct descriptor in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StructId(usize);

/// A registered type descriptor.
///
/// `llvm` is `None` for `void` and the `auto` sentinel, which have no
/// value representation.
#[derive(Clone)]
pub struct TypeInfo<'ctx> {
    pub kind: TypeKind,
    pub llvm: Option<BasicTypeEnum<'ctx>>,
    pub name: String,
    pub struct_id: Option<StructId>,
}

#[derive(Clone)]
pub struct StructField {
    pub name: String,
    pub ty: TypeId,
    pub index: usize,
}

/// Layout record for a user struct. Field indices are dense `[0, n)`
/// and agree with the LLVM aggregate layout.
#[derive(Clone)]
pub struct StructInfo<'ctx> {
    pub name: String,
    pub llvm: StructType<'ctx>,
    pub fields: Vec<StructField>,
    pub field_indices: HashMap<String, usize>,
}

pub struct TypeRegistry<'ctx> {
    types: Vec<TypeInfo<'ctx>>,
    by_name: HashMap<String, TypeId>,
    structs: Vec<StructInfo<'ctx>>,
}

impl<'ctx> TypeRegistry<'ctx> {
    /// Creates a registry preloaded with the primitive types.
    pub fn new(context: &'ctx Context) -> Self {
        let mut registry = TypeRegistry {
            types: Vec::new(),
            by_name: HashMap::new(),
            structs: Vec::new(),
        };

        let ptr_t: BasicTypeEnum<'ctx> = context.i8_type().ptr_type(AddressSpace::default()).into();
        registry.register("int", TypeKind::Int, Some(context.i64_type().into()));
        registry.register("double", TypeKind::Double, Some(context.f64_type().into()));
        registry.register("str", TypeKind::String, Some(ptr_t));
        registry.register("bool", TypeKind::Bool, Some(context.bool_type().into()));
        registry.register("void", TypeKind::Void, None);
        registry.register("auto", TypeKind::Unknown, None);
        registry
    }

    pub fn register(
        &mut self,
        name: &str,
        kind: TypeKind,
        llvm: Option<BasicTypeEnum<'ctx>>,
    ) -> TypeId {
        let id = TypeId(self.types.len());
        self.types.push(TypeInfo {
            kind,
            llvm,
            name: name.to_string(),
            struct_id: None,
        });
        self.by_name.insert(name.to_string(), id);
        id
    }

    pub fn get(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    pub fn info(&self, id: TypeId) -> &TypeInfo<'ctx> {
        &self.types[id.0]
    }

    pub fn kind(&self, id: TypeId) -> TypeKind {
        self.types[id.0].kind
    }

    pub fn struct_info(&self, id: StructId) -> &StructInfo<'ctx> {
        &self.structs[id.0]
    }

    /// Registers a struct type with the given fields in declaration
    /// order. Redefinition is a no-op that returns the existing
    /// descriptor.
    pub fn define_struct(
        &mut self,
        context: &'ctx Context,
        name: &str,
        fields: &[(String, TypeId)],
    ) -> DiagnosticResult<StructId> {
        if let Some(existing) = self.get(name) {
            if let Some(sid) = self.info(existing).struct_id {
                return Ok(sid);
            }
            return Err(Diagnostic::error(format!(
                "type name already in use: {name}"
            )));
        }

        let mut llvm_fields = Vec::with_capacity(fields.len());
        let mut struct_fields = Vec::with_capacity(fields.len());
        let mut field_indices = HashMap::new();

        for (index, (field_name, field_ty)) in fields.iter().enumerate() {
            let Some(llvm) = self.info(*field_ty).llvm else {
                return Err(Diagnostic::error(format!(
                    "struct field {field_name} has no value representation"
                )));
            };
            llvm_fields.push(llvm);
            struct_fields.push(StructField {
                name: field_name.clone(),
                ty: *field_ty,
                index,
            });
            field_indices.insert(field_name.clone(), index);
        }

        let llvm_struct = context.opaque_struct_type(name);
        llvm_struct.set_body(&llvm_fields, false);

        let sid = StructId(self.structs.len());
        self.structs.push(StructInfo {
            name: name.to_string(),
            llvm: llvm_struct,
            fields: struct_fields,
            field_indices,
        });

        let id = TypeId(self.types.len());
        self.types.push(TypeInfo {
            kind: TypeKind::Struct,
            llvm: Some(llvm_struct.into()),
            name: name.to_string(),
            struct_id: Some(sid),
        });
        self.by_name.insert(name.to_string(), id);

        Ok(sid)
    }

    pub fn struct_field_index(&self, struct_name: &str, field_name: &str) -> Option<usize> {
        let id = self.get(struct_name)?;
        let sid = self.info(id).struct_id?;
        self.struct_info(sid).field_indices.get(field_name).copied()
    }

    /// Resolves a `!name` type reference.
    pub fn from_annotation(&self, spec: &str) -> Option<TypeId> {
        let name = spec.strip_prefix('!')?;
        self.get(name)
    }

    /// Resolves a type reference held in a symbol node.
    pub fn parse_type_spec(&self, expr: &Expr) -> Option<TypeId> {
        self.from_annotation(expr.as_symbol()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_are_preloaded() {
        let context = Context::create();
        let registry = TypeRegistry::new(&context);
        for name in ["int", "double", "str", "bool", "void", "auto"] {
            assert!(registry.get(name).is_some(), "missing {name}");
        }
        let int_id = registry.get("int").unwrap();
        assert_eq!(registry.kind(int_id), TypeKind::Int);
        assert!(registry.info(int_id).llvm.unwrap().is_int_type());
    }

    #[test]
    fn struct_definition_and_redefinition() {
        let context = Context::create();
        let mut registry = TypeRegistry::new(&context);
        let int_id = registry.get("int").unwrap();
        let fields = vec![("x".to_string(), int_id), ("y".to_string(), int_id)];

        let sid = registry.define_struct(&context, "Pt", &fields).unwrap();
        assert_eq!(registry.struct_info(sid).fields.len(), 2);
        assert_eq!(registry.struct_field_index("Pt", "y"), Some(1));
        assert_eq!(registry.struct_field_index("Pt", "z"), None);

        // Redefinition hands back the same descriptor
        let again = registry.define_struct(&context, "Pt", &fields).unwrap();
        assert_eq!(sid, again);
    }

    #[test]
    fn annotations_resolve_through_bang_prefix() {
        let context = Context::create();
        let registry = TypeRegistry::new(&context);
        assert_eq!(registry.from_annotation("!int"), registry.get("int"));
        assert_eq!(registry.from_annotation("int"), None);
        assert_eq!(registry.from_annotation("!nosuch"), None);
        let spec = Expr::Symbol("!double".into());
        assert_eq!(registry.parse_type_spec(&spec), registry.get("double"));
    }
}
