//! [`SectionBuilder`]: the caller-facing entry point. Accumulates sections,
//! object data and symbol definitions while `Configuring`, then hands off to
//! [`crate::pe::layout::Layouter`] to freeze section placement.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::pe::export::ExportSymbol;
use crate::pe::object_data::ObjectData;
use crate::pe::options::ExportPolicy;
use crate::pe::section::{Section, SectionIndex};
use crate::pe::symbol::{SymbolId, SymbolTable, SymbolTarget};

/// The one-way state machine every [`SectionBuilder`] moves through:
/// `Configuring → LaidOut → Sealed → Done`. Configuration calls
/// (`add_section`, `add_object_data`, `add_export_symbol`, the `set_*`
/// methods) are only valid in `Configuring`; calling them afterwards is a
/// fatal [`Error::AlreadyLaidOut`] misuse, not a silent no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderState {
    Configuring,
    LaidOut,
    Sealed,
    Done,
}

/// Accumulates section content, symbol definitions and relocations for one
/// compilation unit's worth of PE output.
#[derive(Debug)]
pub struct SectionBuilder {
    pub(crate) sections: Vec<Section>,
    name_index: HashMap<String, SectionIndex>,
    pub(crate) symbols: SymbolTable,
    pub(crate) state: BuilderState,
    pub(crate) export_symbols: Vec<ExportSymbol>,
    pub(crate) dll_name: Option<String>,
    pub(crate) entry_point: Option<SymbolId>,
    pub(crate) ready_to_run_header: Option<(SymbolId, u32)>,
    pub(crate) cor_header_symbol: Option<SymbolId>,
    pub(crate) export_policy: ExportPolicy,
}

impl Default for SectionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionBuilder {
    pub fn new() -> Self {
        SectionBuilder {
            sections: Vec::new(),
            name_index: HashMap::new(),
            symbols: SymbolTable::new(),
            state: BuilderState::Configuring,
            export_symbols: Vec::new(),
            dll_name: None,
            entry_point: None,
            ready_to_run_header: None,
            cor_header_symbol: None,
            export_policy: ExportPolicy::default(),
        }
    }

    fn check_configuring(&self) -> Result<()> {
        if self.state != BuilderState::Configuring {
            return Err(Error::AlreadyLaidOut);
        }
        Ok(())
    }

    /// Registers a section named `name`, or returns the existing one if a
    /// section by that name was already added — logical sections that share
    /// a name are folded into a single physical section, their content
    /// concatenated in the order [`SectionBuilder::add_object_data`] is
    /// called, each append padded to `combining_alignment`.
    pub fn add_section(
        &mut self,
        name: impl Into<String>,
        characteristics: u32,
        combining_alignment: u32,
    ) -> Result<SectionIndex> {
        self.check_configuring()?;
        if !combining_alignment.is_power_of_two() {
            return Err(Error::Malformed(format!(
                "combining alignment {combining_alignment} is not a power of two"
            )));
        }
        let name = name.into();
        if let Some(&idx) = self.name_index.get(&name) {
            return Ok(idx);
        }
        let idx = SectionIndex(self.sections.len() as u32);
        #[cfg(feature = "log")]
        log::debug!("add_section: {} -> {:?}", name, idx);
        self.sections
            .push(Section::new(name.clone(), characteristics, combining_alignment));
        self.name_index.insert(name, idx);
        Ok(idx)
    }

    pub fn find_section(&self, name: &str) -> Option<SectionIndex> {
        self.name_index.get(name).copied()
    }

    /// Appends `data` to `section`: its bytes are padded up to `data`'s own
    /// `alignment` (`aligned_offset = round_up(current_size, data.alignment)`)
    /// — not the section's `combining_alignment`, which is a separate knob
    /// the [`crate::pe::layout::Layouter`] applies when folding same-named
    /// logical sections together — and appended to the section's
    /// [`crate::pe::section::BlockStore`]. Its symbol definitions
    /// are registered (duplicate names fail with [`Error::DuplicateSymbol`]),
    /// and its relocations are recorded against possibly-not-yet-defined
    /// symbols (interned on first reference).
    pub fn add_object_data(&mut self, section: SectionIndex, data: ObjectData) -> Result<()> {
        self.check_configuring()?;
        if !data.alignment.is_power_of_two() {
            return Err(Error::Malformed(format!(
                "object data alignment {} is not a power of two",
                data.alignment
            )));
        }
        let relocations: Vec<_> = data
            .relocations
            .iter()
            .map(|r| crate::pe::section::RelocationRecord {
                offset: r.offset,
                symbol: r.symbol,
                kind: r.kind,
            })
            .collect();
        let (_, rebased_symbols) = self.sections[section.0 as usize].store.append(
            &data.bytes,
            data.alignment,
            &data.symbols,
            &relocations,
        )?;
        for (name, offset) in rebased_symbols {
            let id = self.symbols.intern(&name);
            self.symbols.define(id, SymbolTarget { section, offset })?;
        }
        Ok(())
    }

    /// Interns `name` as a symbol handle without requiring it to be defined
    /// yet — used by callers building up relocation records before the
    /// referenced symbol's `add_object_data` call has happened.
    pub fn intern_symbol(&mut self, name: &str) -> SymbolId {
        self.symbols.intern(name)
    }

    /// Records an export: `ordinal` is caller-assigned and drives both the
    /// export directory's `ordinal_base` and the address table's indexing
    /// once [`crate::pe::layout::Layouter::layout`] runs. Neither name nor
    /// ordinal uniqueness is enforced here — the caller owns that invariant.
    pub fn add_export_symbol(
        &mut self,
        name: impl Into<String>,
        ordinal: u16,
        symbol: SymbolId,
    ) -> Result<()> {
        self.check_configuring()?;
        self.export_symbols.push(ExportSymbol {
            name: name.into(),
            ordinal,
            symbol,
        });
        Ok(())
    }

    pub fn set_entry_point(&mut self, symbol: SymbolId) -> Result<()> {
        self.check_configuring()?;
        self.entry_point = Some(symbol);
        Ok(())
    }

    /// Records the symbol and byte size of the R2R header blob, so
    /// [`crate::pe::layout::Layouter`] can point
    /// [`crate::pe::clr::Cor20Header::managed_native_header`] at its
    /// resolved RVA once layout completes.
    pub fn set_ready_to_run_header(&mut self, symbol: SymbolId, size: u32) -> Result<()> {
        self.check_configuring()?;
        self.ready_to_run_header = Some((symbol, size));
        Ok(())
    }

    /// Points at a Cor20Header-sized placeholder the caller already emitted
    /// via `add_object_data` (zero-filled is fine). If set, the
    /// [`crate::pe::layout::Layouter`] includes a direct byte patch for this
    /// location in the returned [`crate::pe::layout::Layout`] so the
    /// [`crate::pe::patch::Patcher`] writes the resolved header there
    /// alongside the ordinary symbol relocations.
    pub fn set_cor_header_symbol(&mut self, symbol: SymbolId) -> Result<()> {
        self.check_configuring()?;
        self.cor_header_symbol = Some(symbol);
        Ok(())
    }

    pub fn set_dll_name(&mut self, name: impl Into<String>) -> Result<()> {
        self.check_configuring()?;
        self.dll_name = Some(name.into());
        Ok(())
    }

    pub fn set_export_policy(&mut self, policy: ExportPolicy) -> Result<()> {
        self.check_configuring()?;
        self.export_policy = policy;
        Ok(())
    }

    /// The sections registered so far, in first-appearance order. Does not
    /// include the synthesized `.reloc`/`.edata` sections until after
    /// [`crate::pe::layout::Layouter::layout`] has run.
    pub fn get_sections(&self) -> impl Iterator<Item = (SectionIndex, &Section)> {
        self.sections
            .iter()
            .enumerate()
            .map(|(i, s)| (SectionIndex(i as u32), s))
    }

    pub fn state(&self) -> BuilderState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pe::object_data::ObjectData;
    use crate::pe::section_table::{IMAGE_SCN_CNT_CODE, IMAGE_SCN_MEM_EXECUTE, IMAGE_SCN_MEM_READ};

    #[test]
    fn sections_with_the_same_name_are_folded() {
        let mut builder = SectionBuilder::new();
        let a = builder.add_section(".text", IMAGE_SCN_CNT_CODE, 4).unwrap();
        let b = builder.add_section(".text", IMAGE_SCN_CNT_CODE, 4).unwrap();
        assert_eq!(a, b);
        assert_eq!(builder.sections.len(), 1);
    }

    #[test]
    fn object_data_is_concatenated_in_append_order() {
        let mut builder = SectionBuilder::new();
        let text = builder
            .add_section(".text", IMAGE_SCN_CNT_CODE | IMAGE_SCN_MEM_EXECUTE, 4)
            .unwrap();
        builder
            .add_object_data(text, ObjectData::new(vec![0xaa; 3]).define("first", 0))
            .unwrap();
        builder
            .add_object_data(
                text,
                ObjectData::new(vec![0xbb; 2]).align_to(4).define("second", 0),
            )
            .unwrap();

        let first = builder.symbols.lookup("first").unwrap();
        let second = builder.symbols.lookup("second").unwrap();
        assert_eq!(builder.symbols.target(first).unwrap().offset, 0);
        // First chunk is 3 bytes; the second chunk asks for 4-byte alignment,
        // so it lands at offset 4, not the section's own combining_alignment.
        assert_eq!(builder.symbols.target(second).unwrap().offset, 4);
    }

    #[test]
    fn object_data_alignment_is_independent_of_combining_alignment() {
        let mut builder = SectionBuilder::new();
        // combining_alignment of 1 would let two back-to-back appends land
        // unaligned; an ObjectData asking for 8-byte alignment still gets it.
        let text = builder.add_section(".text", IMAGE_SCN_CNT_CODE, 1).unwrap();
        builder
            .add_object_data(text, ObjectData::new(vec![0u8; 1]).define("first", 0))
            .unwrap();
        builder
            .add_object_data(
                text,
                ObjectData::new(vec![0u8; 1]).align_to(8).define("second", 0),
            )
            .unwrap();
        let second = builder.symbols.lookup("second").unwrap();
        assert_eq!(builder.symbols.target(second).unwrap().offset, 8);
    }

    #[test]
    fn non_power_of_two_object_data_alignment_is_rejected() {
        let mut builder = SectionBuilder::new();
        let text = builder.add_section(".text", IMAGE_SCN_CNT_CODE, 1).unwrap();
        let err = builder.add_object_data(text, ObjectData::new(vec![0u8; 1]).align_to(3));
        assert!(err.is_err());
    }

    #[test]
    fn relocation_against_an_undefined_symbol_is_allowed_before_layout() {
        let mut builder = SectionBuilder::new();
        let rdata = builder
            .add_section(".rdata", crate::pe::section_table::IMAGE_SCN_CNT_INITIALIZED_DATA | IMAGE_SCN_MEM_READ, 8)
            .unwrap();
        let not_yet_defined = builder.intern_symbol("later");
        builder
            .add_object_data(
                rdata,
                ObjectData::new(vec![0u8; 8]).relocate(0, not_yet_defined, crate::pe::reloc::RelocationKind::Dir64),
            )
            .unwrap();
        assert!(!builder.symbols.is_defined(not_yet_defined));
    }

    #[test]
    fn duplicate_symbol_definition_is_rejected() {
        let mut builder = SectionBuilder::new();
        let text = builder.add_section(".text", IMAGE_SCN_CNT_CODE, 1).unwrap();
        builder
            .add_object_data(text, ObjectData::new(vec![0u8; 1]).define("dup", 0))
            .unwrap();
        let err = builder.add_object_data(text, ObjectData::new(vec![0u8; 1]).define("dup", 0));
        assert!(err.is_err());
    }

    #[test]
    fn configuration_after_state_change_is_rejected() {
        let mut builder = SectionBuilder::new();
        builder.state = BuilderState::LaidOut;
        assert!(builder.add_section(".text", IMAGE_SCN_CNT_CODE, 1).is_err());
        assert!(matches!(
            builder.add_section(".text", IMAGE_SCN_CNT_CODE, 1),
            Err(Error::AlreadyLaidOut)
        ));
    }
}
