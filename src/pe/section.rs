//! Section configuration and the append-only byte store backing it.

use crate::error::Result;
use crate::pe::symbol::SymbolId;
use crate::pe::utils::align_to;

/// A dense arena index into [`crate::pe::builder::SectionBuilder`]'s section
/// list. Stable once [`crate::pe::builder::SectionBuilder::add_section`]
/// returns it; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SectionIndex(pub(crate) u32);

impl SectionIndex {
    pub fn index(self) -> u32 {
        self.0
    }
}

/// A symbol definition recorded while appending object data, expressed as an
/// offset relative to the start of that append (not yet the section-wide
/// offset — [`BlockStore::append`] rebase it before storing).
#[derive(Debug, Clone)]
pub struct DefinedSymbol {
    pub name: String,
    pub offset: u32,
}

/// A relocation site recorded while appending object data: "at byte `offset`
/// of this chunk, patch in a reference to `symbol` using `kind`'s encoding."
/// Offsets are chunk-relative like [`DefinedSymbol::offset`].
#[derive(Debug, Clone)]
pub struct RelocationRecord {
    pub offset: u32,
    pub symbol: SymbolId,
    pub kind: crate::pe::reloc::RelocationKind,
}

/// A relocation rebased to the section's own byte offset, ready to be
/// consumed by the [`crate::pe::layout::Layouter`] once every section has a
/// final RVA.
#[derive(Debug, Clone, Copy)]
pub struct PendingRelocation {
    pub offset: u32,
    pub symbol: SymbolId,
    pub kind: crate::pe::reloc::RelocationKind,
}

/// An append-only byte buffer for one section's raw content, with
/// alignment-aware padding between successive appends.
#[derive(Debug, Default)]
pub struct BlockStore {
    content: Vec<u8>,
    pub(crate) relocations: Vec<PendingRelocation>,
}

impl BlockStore {
    pub fn new() -> Self {
        BlockStore::default()
    }

    pub fn len(&self) -> u32 {
        self.content.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.content
    }

    /// Pads to `alignment`, then appends `bytes`, rebasing `symbols` and
    /// `relocations` (chunk-relative) onto the section-wide offset at which
    /// this chunk landed. Returns the base offset the chunk landed at,
    /// together with each defined symbol rebased to a section-wide offset
    /// (the caller registers these in the [`crate::pe::symbol::SymbolTable`]
    /// — the store itself only owns bytes and pending relocations).
    pub fn append(
        &mut self,
        bytes: &[u8],
        alignment: u32,
        symbols: &[DefinedSymbol],
        relocations: &[RelocationRecord],
    ) -> Result<(u32, Vec<(String, u32)>)> {
        let padded = align_to(self.content.len() as u32, alignment.max(1));
        if padded > self.content.len() as u32 {
            self.content.resize(padded as usize, 0u8);
        }
        let base = self.content.len() as u32;
        self.content.extend_from_slice(bytes);

        let rebased_symbols = symbols
            .iter()
            .map(|sym| (sym.name.clone(), base + sym.offset))
            .collect();
        for reloc in relocations {
            self.relocations.push(PendingRelocation {
                offset: base + reloc.offset,
                symbol: reloc.symbol,
                kind: reloc.kind,
            });
        }
        Ok((base, rebased_symbols))
    }

    /// Replaces the entire content with `bytes`, discarding any pending
    /// relocations. Used only by the [`crate::pe::layout::Layouter`] to
    /// install the encoded `.reloc`/`.edata` content, which never carries
    /// relocations of its own.
    pub(crate) fn replace_content(&mut self, bytes: Vec<u8>) {
        self.content = bytes;
        self.relocations.clear();
    }
}

/// The final RVA and file offset of a laid-out section, populated only by
/// [`crate::pe::layout::Layouter::layout`]. Its absence (no entry in the
/// side table) is what makes "placement is frozen once set" free: there's
/// nowhere to mutate it after the fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionPlacement {
    pub rva: u32,
    pub file_pos: u32,
    pub virtual_size: u32,
    pub raw_size: u32,
}

/// An immutable section's configuration, plus its accumulated content.
#[derive(Debug)]
pub struct Section {
    pub name: String,
    pub characteristics: u32,
    pub combining_alignment: u32,
    pub(crate) store: BlockStore,
}

impl Section {
    pub(crate) fn new(name: impl Into<String>, characteristics: u32, combining_alignment: u32) -> Self {
        Section {
            name: name.into(),
            characteristics,
            combining_alignment,
            store: BlockStore::new(),
        }
    }

    /// Truncates (or null-pads) the section name to the 8 bytes a COFF
    /// section header can hold. Names longer than 8 bytes are a caller
    /// error the envelope writer is expected to resolve via a string table;
    /// this crate just truncates, matching the common short-name case R2R
    /// sections always use (`.text`, `.rdata`, `.reloc`, `.edata`, ...).
    pub fn raw_name(&self) -> [u8; 8] {
        let mut raw = [0u8; 8];
        let bytes = self.name.as_bytes();
        let n = bytes.len().min(8);
        raw[..n].copy_from_slice(&bytes[..n]);
        raw
    }

    /// The section's accumulated raw content, as the envelope writer should
    /// write it at the file offset its [`SectionPlacement`] names. Reflects
    /// whatever the [`crate::pe::layout::Layouter`] last installed — for
    /// `.reloc`/`.edata` that means the synthesized bytes, not whatever (if
    /// anything) was appended before layout.
    pub fn content(&self) -> &[u8] {
        self.store.as_bytes()
    }

    pub(crate) fn replace_content(&mut self, bytes: Vec<u8>) {
        self.store.replace_content(bytes);
    }
}
