use std::collections::HashMap;

use crate::error::CompileError;
use crate::parser::{VarKind, VarType, Variable};

/// The VM memory segment a variable's kind lowers to (spec §3/§4.4). Every
/// kind maps 1:1 to its own name except `field`, which aliases `this`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Static,
    This,
    Argument,
    Local,
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Segment::Static => "static",
            Segment::This => "this",
            Segment::Argument => "argument",
            Segment::Local => "local",
        };
        write!(f, "{}", text)
    }
}

fn segment_for(kind: VarKind) -> Segment {
    match kind {
        VarKind::Field => Segment::This,
        VarKind::Static => Segment::Static,
        VarKind::Argument => Segment::Argument,
        VarKind::Local => Segment::Local,
    }
}

/// A variable as resolved by the symbol table: its declared shape plus the
/// segment/offset the code generator emits for every reference to it.
#[derive(Debug, Clone)]
pub struct ResolvedVar {
    pub var_type: VarType,
    pub segment: Segment,
    pub offset: usize,
}

/// Two-level scoped table: a subroutine table owns a snapshot of its class's
/// table as `parent`, so field/static lookups fall through automatically
/// once the class-level declarations are frozen (spec §3's "scoped symbol
/// table"). Mirrors the owning-`Box` parent chain other scopes in this
/// crate use, rather than borrowing with an explicit lifetime.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    table: HashMap<String, ResolvedVar>,
    field_counter: usize,
    static_counter: usize,
    argument_counter: usize,
    local_counter: usize,
    parent: Option<Box<SymbolTable>>,
}

impl SymbolTable {
    pub fn new_class() -> Self {
        SymbolTable::default()
    }

    pub fn new_subroutine(class_table: &SymbolTable) -> Self {
        SymbolTable {
            parent: Some(Box::new(class_table.clone())),
            ..SymbolTable::default()
        }
    }

    /// Pre-inserts the synthetic `this` argument at offset 0, as every
    /// method's symbol table must (spec §3's `this` pre-insertion invariant).
    /// Its type is `pointer`, per spec §3.
    pub fn declare_method_this(&mut self) -> Result<(), CompileError> {
        self.insert(
            "this",
            Variable {
                name: "this".to_string(),
                var_type: VarType::Pointer,
                kind: VarKind::Argument,
                offset: 0,
                line: 0,
            },
            0,
        )
    }

    fn next_offset(&self, kind: VarKind) -> usize {
        match kind {
            VarKind::Field => self.field_counter,
            VarKind::Static => self.static_counter,
            VarKind::Argument => self.argument_counter,
            VarKind::Local => self.local_counter,
        }
    }

    fn bump(&mut self, kind: VarKind) {
        match kind {
            VarKind::Field => self.field_counter += 1,
            VarKind::Static => self.static_counter += 1,
            VarKind::Argument => self.argument_counter += 1,
            VarKind::Local => self.local_counter += 1,
        }
    }

    /// Inserts `var` at the next free offset for its kind in this scope
    /// only (no fall-through to `parent` — redeclaration is scope-local).
    pub fn insert(&mut self, name: &str, var: Variable, line: usize) -> Result<(), CompileError> {
        if self.table.contains_key(name) {
            return Err(CompileError::semantic(
                format!("redeclared var:{}", name),
                line,
            ));
        }
        let offset = self.next_offset(var.kind);
        self.bump(var.kind);
        self.table.insert(
            name.to_string(),
            ResolvedVar {
                var_type: var.var_type,
                segment: segment_for(var.kind),
                offset,
            },
        );
        Ok(())
    }

    fn get_local(&self, name: &str) -> Option<&ResolvedVar> {
        self.table.get(name)
    }

    /// Looks up `name` in this scope, then the parent scope if any (spec
    /// §3's two-level lookup chain).
    pub fn resolve(&self, name: &str, line: usize) -> Result<&ResolvedVar, CompileError> {
        if let Some(var) = self.get_local(name) {
            return Ok(var);
        }
        if let Some(parent) = &self.parent {
            if let Some(var) = parent.get_local(name) {
                return Ok(var);
            }
        }
        Err(CompileError::semantic(
            format!("undefined var {}", name),
            line,
        ))
    }

    pub fn field_count(&self) -> usize {
        self.field_counter
    }

    pub fn local_count(&self) -> usize {
        self.local_counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str, kind: VarKind) -> Variable {
        Variable {
            name: name.to_string(),
            var_type: VarType::Int,
            kind,
            offset: 0,
            line: 1,
        }
    }

    #[test]
    fn fields_map_to_this_segment() {
        let mut class_table = SymbolTable::new_class();
        class_table.insert("x", var("x", VarKind::Field), 1).unwrap();
        let resolved = class_table.resolve("x", 1).unwrap();
        assert_eq!(resolved.segment, Segment::This);
        assert_eq!(resolved.offset, 0);
    }

    #[test]
    fn offsets_increment_per_kind_independently() {
        let mut class_table = SymbolTable::new_class();
        class_table.insert("a", var("a", VarKind::Field), 1).unwrap();
        class_table.insert("b", var("b", VarKind::Static), 1).unwrap();
        class_table.insert("c", var("c", VarKind::Field), 1).unwrap();
        assert_eq!(class_table.resolve("c", 1).unwrap().offset, 1);
        assert_eq!(class_table.resolve("b", 1).unwrap().offset, 0);
    }

    #[test]
    fn subroutine_table_falls_through_to_class_table() {
        let mut class_table = SymbolTable::new_class();
        class_table.insert("x", var("x", VarKind::Field), 1).unwrap();
        let mut sub_table = SymbolTable::new_subroutine(&class_table);
        sub_table.insert("y", var("y", VarKind::Local), 1).unwrap();
        assert_eq!(sub_table.resolve("x", 1).unwrap().segment, Segment::This);
        assert_eq!(sub_table.resolve("y", 1).unwrap().segment, Segment::Local);
    }

    #[test]
    fn method_this_is_preinserted_at_offset_zero_with_pointer_type() {
        let class_table = SymbolTable::new_class();
        let mut sub_table = SymbolTable::new_subroutine(&class_table);
        sub_table.declare_method_this().unwrap();
        sub_table.insert("a", var("a", VarKind::Argument), 1).unwrap();
        let this = sub_table.resolve("this", 1).unwrap();
        assert_eq!(this.offset, 0);
        assert_eq!(this.var_type, VarType::Pointer);
        assert_eq!(sub_table.resolve("a", 1).unwrap().offset, 1);
    }

    #[test]
    fn redeclaration_in_same_scope_is_a_semantic_error() {
        let mut class_table = SymbolTable::new_class();
        class_table.insert("x", var("x", VarKind::Field), 1).unwrap();
        let err = class_table.insert("x", var("x", VarKind::Field), 2).unwrap_err();
        assert!(matches!(err, CompileError::Semantic { .. }));
    }

    #[test]
    fn undeclared_reference_is_a_semantic_error() {
        let class_table = SymbolTable::new_class();
        let sub_table = SymbolTable::new_subroutine(&class_table);
        let err = sub_table.resolve("nope", 1).unwrap_err();
        assert!(matches!(err, CompileError::Semantic { .. }));
    }
}
