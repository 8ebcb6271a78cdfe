//! Scoped symbol and type tables for the Mica language.
//!
//! Every lexical scope owns three tables: the set of concrete types
//! declared in it, a map from type name to an index into that set, and
//! a map from variable/function name to a [`VarEntry`]. Scopes live in
//! an index-stable arena ([`ScopeArena`]) and are never individually
//! freed; their lifetime is the whole compilation. Name lookup walks
//! innermost-to-outermost along parent links.

use std::collections::HashMap;

/// Stable handle to a scope in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u32);

/// Built-in primitive types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prim {
    U8,
    U16,
    U32,
    U64,
    S8,
    S16,
    S32,
    S64,
    F32,
    F64,
    /// Machine-sized signed integer (native pointer width).
    Int,
    /// Machine-sized unsigned integer (native pointer width).
    Uint,
    Bool,
}

impl Prim {
    pub const ALL: [Prim; 13] = [
        Prim::U8,
        Prim::U16,
        Prim::U32,
        Prim::U64,
        Prim::S8,
        Prim::S16,
        Prim::S32,
        Prim::S64,
        Prim::F32,
        Prim::F64,
        Prim::Int,
        Prim::Uint,
        Prim::Bool,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Prim::U8 => "u8",
            Prim::U16 => "u16",
            Prim::U32 => "u32",
            Prim::U64 => "u64",
            Prim::S8 => "s8",
            Prim::S16 => "s16",
            Prim::S32 => "s32",
            Prim::S64 => "s64",
            Prim::F32 => "f32",
            Prim::F64 => "f64",
            Prim::Int => "int",
            Prim::Uint => "uint",
            Prim::Bool => "bool",
        }
    }

    /// Arithmetic is defined on everything but `bool`.
    pub fn is_numeric(self) -> bool {
        !matches!(self, Prim::Bool)
    }

    pub fn is_integer(self) -> bool {
        !matches!(self, Prim::F32 | Prim::F64 | Prim::Bool)
    }
}

/// A concrete type declared in some scope.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDef {
    Prim(Prim),
    /// Function signature. Functions carry no data layout.
    Func {
        params: Vec<TypeRef>,
        ret: Option<TypeRef>,
    },
    /// Struct with fields in declaration order.
    Struct {
        name: String,
        fields: Vec<(String, TypeRef)>,
    },
}

/// Handle identifying a resolved type: owning scope, index into that
/// scope's type set, indirection depth, and the untyped-zero-literal
/// marker.
///
/// Equality compares scope, index and indirection; the zero-literal
/// flag always matches. Convertibility is the looser pairwise test
/// used to narrow candidate sets: equal handles convert, and the
/// literal `0` converts to any pointer type (the null special case).
#[derive(Debug, Clone, Copy)]
pub struct TypeRef {
    pub scope: ScopeId,
    pub index: u32,
    pub indirection: u32,
    pub zero_lit: bool,
}

impl PartialEq for TypeRef {
    fn eq(&self, other: &TypeRef) -> bool {
        self.scope == other.scope
            && self.index == other.index
            && self.indirection == other.indirection
    }
}

impl Eq for TypeRef {}

impl TypeRef {
    pub fn new(scope: ScopeId, index: u32) -> TypeRef {
        TypeRef {
            scope,
            index,
            indirection: 0,
            zero_lit: false,
        }
    }

    pub fn pointer_to(mut self) -> TypeRef {
        self.indirection += 1;
        self.zero_lit = false;
        self
    }

    pub fn deref(mut self) -> Option<TypeRef> {
        if self.indirection == 0 {
            return None;
        }
        self.indirection -= 1;
        Some(self)
    }

    pub fn is_pointer(&self) -> bool {
        self.indirection > 0
    }

    /// Pairwise compatibility test. Reflexive and symmetric, not a
    /// total order; used only to merge/narrow candidate sets.
    pub fn convertible(&self, other: &TypeRef) -> bool {
        if self == other {
            return true;
        }
        if self.zero_lit && other.indirection > 0 {
            return true;
        }
        if other.zero_lit && self.indirection > 0 {
            return true;
        }
        false
    }
}

/// What a scope knows about one variable or function name.
#[derive(Debug, Clone, Default)]
pub struct VarEntry {
    /// Still-possible resolved types; narrows monotonically toward a
    /// singleton during resolution.
    pub candidates: Vec<TypeRef>,
    /// Frame-relative byte offset, assigned during code generation.
    pub slot: Option<u32>,
    /// For functions: instruction index of the definition's prologue.
    pub code_offset: Option<usize>,
}

impl VarEntry {
    pub fn with_candidates(candidates: Vec<TypeRef>) -> VarEntry {
        VarEntry {
            candidates,
            slot: None,
            code_offset: None,
        }
    }
}

/// One lexical scope.
#[derive(Debug, Default)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    types: Vec<TypeDef>,
    type_names: HashMap<String, u32>,
    vars: HashMap<String, VarEntry>,
    /// Variable names in declaration order, so stack-slot assignment
    /// during code generation is deterministic.
    var_order: Vec<String>,
}

impl Scope {
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    pub fn var(&self, name: &str) -> Option<&VarEntry> {
        self.vars.get(name)
    }

    pub fn var_mut(&mut self, name: &str) -> Option<&mut VarEntry> {
        self.vars.get_mut(name)
    }

    /// Variables in declaration order.
    pub fn vars_in_order(&self) -> impl Iterator<Item = (&str, &VarEntry)> {
        self.var_order
            .iter()
            .map(|name| (name.as_str(), &self.vars[name]))
    }
}

/// Arena owning every scope of one compilation unit.
#[derive(Debug)]
pub struct ScopeArena {
    scopes: Vec<Scope>,
}

impl ScopeArena {
    /// The root scope, pre-seeded with the primitive types.
    pub const ROOT: ScopeId = ScopeId(0);

    pub fn new() -> ScopeArena {
        let mut arena = ScopeArena {
            scopes: vec![Scope::default()],
        };
        for prim in Prim::ALL {
            arena.add_type(Self::ROOT, Some(prim.name()), TypeDef::Prim(prim));
        }
        arena
    }

    pub fn push_scope(&mut self, parent: ScopeId) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            parent: Some(parent),
            ..Scope::default()
        });
        id
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.0 as usize]
    }

    /// Register a type in `scope`, optionally binding a name to it.
    pub fn add_type(&mut self, scope: ScopeId, name: Option<&str>, def: TypeDef) -> TypeRef {
        let s = self.scope_mut(scope);
        let index = s.types.len() as u32;
        s.types.push(def);
        if let Some(name) = name {
            s.type_names.insert(name.to_string(), index);
        }
        TypeRef::new(scope, index)
    }

    /// The definition a handle points at, ignoring indirection.
    pub fn type_def(&self, ty: &TypeRef) -> &TypeDef {
        &self.scope(ty.scope).types[ty.index as usize]
    }

    /// Handle for a primitive; primitives live at fixed indices in the
    /// root scope.
    pub fn prim(&self, prim: Prim) -> TypeRef {
        let index = Prim::ALL.iter().position(|p| *p == prim).unwrap() as u32;
        TypeRef::new(Self::ROOT, index)
    }

    /// Resolve a type name, walking innermost-to-outermost.
    pub fn lookup_type(&self, from: ScopeId, name: &str) -> Option<TypeRef> {
        let mut current = Some(from);
        while let Some(id) = current {
            let scope = self.scope(id);
            if let Some(&index) = scope.type_names.get(name) {
                return Some(TypeRef::new(id, index));
            }
            current = scope.parent;
        }
        None
    }

    /// Resolve a variable name, walking innermost-to-outermost.
    pub fn lookup_var(&self, from: ScopeId, name: &str) -> Option<(ScopeId, &VarEntry)> {
        let mut current = Some(from);
        while let Some(id) = current {
            let scope = self.scope(id);
            if let Some(entry) = scope.var(name) {
                return Some((id, entry));
            }
            current = scope.parent;
        }
        None
    }

    pub fn lookup_var_mut(&mut self, from: ScopeId, name: &str) -> Option<&mut VarEntry> {
        let mut current = Some(from);
        while let Some(id) = current {
            if self.scope(id).var(name).is_some() {
                return self.scope_mut(id).var_mut(name);
            }
            current = self.scope(id).parent;
        }
        None
    }

    /// Declare a variable in `scope`. Returns false if the name is
    /// already bound there.
    pub fn declare_var(&mut self, scope: ScopeId, name: &str, entry: VarEntry) -> bool {
        let s = self.scope_mut(scope);
        if s.vars.contains_key(name) {
            return false;
        }
        s.vars.insert(name.to_string(), entry);
        s.var_order.push(name.to_string());
        true
    }
}

impl Default for ScopeArena {
    fn default() -> Self {
        ScopeArena::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_scope_knows_the_primitives() {
        let arena = ScopeArena::new();
        let u32_ref = arena.lookup_type(ScopeArena::ROOT, "u32").unwrap();
        assert_eq!(u32_ref, arena.prim(Prim::U32));
        assert_eq!(arena.type_def(&u32_ref), &TypeDef::Prim(Prim::U32));
        assert!(arena.lookup_type(ScopeArena::ROOT, "u7").is_none());
    }

    #[test]
    fn lookup_walks_outward_through_parents() {
        let mut arena = ScopeArena::new();
        let inner = arena.push_scope(ScopeArena::ROOT);
        let innermost = arena.push_scope(inner);
        assert!(arena.lookup_type(innermost, "s16").is_some());

        arena.declare_var(
            inner,
            "x",
            VarEntry::with_candidates(vec![arena.prim(Prim::U8)]),
        );
        let (owner, entry) = arena.lookup_var(innermost, "x").unwrap();
        assert_eq!(owner, inner);
        assert_eq!(entry.candidates, vec![arena.prim(Prim::U8)]);
    }

    #[test]
    fn inner_declarations_shadow_outer_ones() {
        let mut arena = ScopeArena::new();
        let inner = arena.push_scope(ScopeArena::ROOT);
        arena.declare_var(
            ScopeArena::ROOT,
            "x",
            VarEntry::with_candidates(vec![arena.prim(Prim::U8)]),
        );
        arena.declare_var(
            inner,
            "x",
            VarEntry::with_candidates(vec![arena.prim(Prim::S64)]),
        );
        let (owner, entry) = arena.lookup_var(inner, "x").unwrap();
        assert_eq!(owner, inner);
        assert_eq!(entry.candidates, vec![arena.prim(Prim::S64)]);
    }

    #[test]
    fn redeclaration_in_the_same_scope_is_rejected() {
        let mut arena = ScopeArena::new();
        let entry = VarEntry::with_candidates(vec![arena.prim(Prim::U8)]);
        assert!(arena.declare_var(ScopeArena::ROOT, "x", entry.clone()));
        assert!(!arena.declare_var(ScopeArena::ROOT, "x", entry));
    }

    #[test]
    fn typeref_equality_ignores_the_zero_flag() {
        let arena = ScopeArena::new();
        let plain = arena.prim(Prim::U32);
        let mut zero = plain;
        zero.zero_lit = true;
        assert_eq!(plain, zero);
    }

    #[test]
    fn zero_literal_converts_to_pointers() {
        let arena = ScopeArena::new();
        let mut zero = arena.prim(Prim::U32);
        zero.zero_lit = true;
        let ptr = arena.prim(Prim::S64).pointer_to();
        assert!(zero.convertible(&ptr));
        assert!(ptr.convertible(&zero));

        let plain = arena.prim(Prim::U32);
        assert!(!plain.convertible(&ptr));
        assert!(!ptr.convertible(&plain));
    }

    #[test]
    fn convertibility_requires_matching_indirection() {
        let arena = ScopeArena::new();
        let value = arena.prim(Prim::U32);
        let pointer = arena.prim(Prim::U32).pointer_to();
        assert!(!value.convertible(&pointer));
        assert!(value.convertible(&value));
        assert!(pointer.convertible(&pointer));
    }
}
