//! The input format [`crate::pe::builder::SectionBuilder::add_object_data`]
//! accepts: a chunk of raw bytes plus the symbols it defines and the
//! relocations it needs applied against them.

use crate::pe::section::{DefinedSymbol, RelocationRecord};

/// One code generator's worth of output destined for a single section:
/// raw bytes, the alignment its first byte must land on within the
/// section, the symbols defined at offsets within them, and the
/// relocation sites that reference (possibly not-yet-defined) symbols.
///
/// `alignment` is this block's own requirement, distinct from a
/// [`crate::pe::section::Section`]'s `combining_alignment`, which only
/// governs how whole logical sections sharing a name are padded against
/// each other at layout time. Two `ObjectData` appended to the same
/// section may carry different alignments.
#[derive(Debug, Clone)]
pub struct ObjectData {
    pub bytes: Vec<u8>,
    pub alignment: u32,
    pub symbols: Vec<DefinedSymbol>,
    pub relocations: Vec<RelocationRecord>,
}

impl Default for ObjectData {
    fn default() -> Self {
        ObjectData::new(Vec::new())
    }
}

impl ObjectData {
    /// Alignment defaults to 1 (no padding); use [`ObjectData::align_to`]
    /// to request a stricter one.
    pub fn new(bytes: Vec<u8>) -> Self {
        ObjectData {
            bytes,
            alignment: 1,
            symbols: Vec::new(),
            relocations: Vec::new(),
        }
    }

    /// Sets the alignment this block's first byte must land on within its
    /// section, overriding the default of 1. Must be a power of two;
    /// [`crate::pe::builder::SectionBuilder::add_object_data`] rejects
    /// anything else as a fatal misuse.
    pub fn align_to(mut self, alignment: u32) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn define(mut self, name: impl Into<String>, offset: u32) -> Self {
        self.symbols.push(DefinedSymbol {
            name: name.into(),
            offset,
        });
        self
    }

    pub fn relocate(
        mut self,
        offset: u32,
        symbol: crate::pe::symbol::SymbolId,
        kind: crate::pe::reloc::RelocationKind,
    ) -> Self {
        self.relocations.push(RelocationRecord {
            offset,
            symbol,
            kind,
        });
        self
    }
}
