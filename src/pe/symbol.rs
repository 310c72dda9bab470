//! Symbol handles and the table that resolves them to section-relative
//! offsets.
//!
//! Symbols are referenced long before the section that defines them has a
//! final RVA — a relocation can be recorded against a symbol that hasn't
//! been defined yet, as long as it's defined by the time [`SymbolTable`] is
//! queried for the *content* of that symbol (its owning section and
//! in-section offset), which only happens once the whole graph is laid out.
//! A dense arena of integer handles, rather than an interned `Rc<str>` or a
//! polymorphic node, keeps lookups a single `Vec` index.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::pe::section::SectionIndex;

/// An opaque handle to a symbol name, interned by [`SymbolTable::intern`].
/// Stable for the lifetime of the table; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub(crate) u32);

impl SymbolId {
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Where a defined symbol actually lives: a section plus a byte offset into
/// that section's content, resolved to an RVA only after layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolTarget {
    pub section: SectionIndex,
    pub offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding {
    Undefined,
    Defined(SymbolTarget),
}

/// Interns symbol names to [`SymbolId`]s and records, for each, either that
/// it is still undefined or where it was defined.
///
/// A relocation may be recorded against an undefined symbol (it is resolved
/// before the matching [`crate::pe::builder::SectionBuilder::add_object_data`]
/// call runs); [`SymbolTable::target`] only needs to succeed by the time the
/// [`crate::pe::layout::Layouter`] runs.
#[derive(Debug, Default)]
pub struct SymbolTable {
    names: HashMap<String, SymbolId>,
    names_by_id: Vec<String>,
    bindings: Vec<Binding>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            names: HashMap::new(),
            names_by_id: Vec::new(),
            bindings: Vec::new(),
        }
    }

    /// Returns the existing handle for `name`, interning a fresh undefined
    /// one if this is the first time it's been seen.
    pub fn intern(&mut self, name: &str) -> SymbolId {
        if let Some(id) = self.names.get(name) {
            return *id;
        }
        let id = SymbolId(self.bindings.len() as u32);
        self.bindings.push(Binding::Undefined);
        self.names_by_id.push(name.to_string());
        self.names.insert(name.to_string(), id);
        id
    }

    /// Looks up an already-interned symbol without creating one.
    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.names.get(name).copied()
    }

    pub fn name_of(&self, id: SymbolId) -> &str {
        &self.names_by_id[id.0 as usize]
    }

    /// Records that `id` is now defined at `target`. Fails with
    /// [`Error::DuplicateSymbol`] if `id` was already defined — a symbol may
    /// be defined exactly once.
    pub fn define(&mut self, id: SymbolId, target: SymbolTarget) -> Result<()> {
        match self.bindings[id.0 as usize] {
            Binding::Undefined => {
                self.bindings[id.0 as usize] = Binding::Defined(target);
                Ok(())
            }
            Binding::Defined(_) => Err(Error::DuplicateSymbol(self.name_of(id).to_string())),
        }
    }

    /// Resolves `id` to its defining section and offset. Fails with
    /// [`Error::UndefinedSymbol`] if the symbol was referenced (via
    /// [`SymbolTable::intern`]) but never defined.
    pub fn target(&self, id: SymbolId) -> Result<SymbolTarget> {
        match self.bindings.get(id.0 as usize) {
            Some(Binding::Defined(target)) => Ok(*target),
            _ => Err(Error::UndefinedSymbol(self.name_of(id).to_string())),
        }
    }

    pub fn is_defined(&self, id: SymbolId) -> bool {
        matches!(self.bindings.get(id.0 as usize), Some(Binding::Defined(_)))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pe::section::SectionIndex;

    #[test]
    fn interning_is_stable() {
        let mut table = SymbolTable::new();
        let a = table.intern("foo");
        let b = table.intern("foo");
        assert_eq!(a, b);
        let c = table.intern("bar");
        assert_ne!(a, c);
    }

    #[test]
    fn undefined_symbol_is_reported() {
        let mut table = SymbolTable::new();
        let id = table.intern("missing");
        assert!(table.target(id).is_err());
    }

    #[test]
    fn duplicate_definition_is_rejected() {
        let mut table = SymbolTable::new();
        let id = table.intern("sym");
        let target = SymbolTarget {
            section: SectionIndex(0),
            offset: 0,
        };
        table.define(id, target).unwrap();
        assert!(table.define(id, target).is_err());
    }
}
